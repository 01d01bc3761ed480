//! Log metadata sanitation.
//!
//! Whatever a device (or an internal caller) attaches as metadata is
//! coerced into a JSON object before it is persisted. Nothing here can
//! fail: values JSON cannot represent are replaced by their string form.
//!
//! | Input                     | Stored as                          |
//! |---------------------------|------------------------------------|
//! | map                       | object, values sanitised in turn   |
//! | list / tuple              | array, element order kept          |
//! | set                       | array, sorted by rendered value    |
//! | non-finite float          | string (`"NaN"`, `"inf"`)          |
//! | opaque object             | its `Display` string               |
//! | nesting deeper than 32    | compact JSON string of the subtree |
//!
//! A top-level value that is not a map is wrapped as `{"value": ...}`.
//!
//! Request bodies go through [`parse_capped`] first. serde_json refuses
//! documents nested past 128 levels; the capped parser keeps the structure
//! only as deep as it will be stored and carries the rest as text, so deep
//! metadata is stringified instead of failing the whole request.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::value::RawValue;
use serde_json::{Map, Number, Value};

/// Deepest container nesting stored structurally.
pub const MAX_DEPTH: usize = 32;

/// Metadata as handed to the ingest path.
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<MetaValue>),
    Tuple(Vec<MetaValue>),
    /// Unordered; stored as a sorted list.
    Set(Vec<MetaValue>),
    Map(BTreeMap<String, MetaValue>),
    /// Anything else; stored as its display form.
    Opaque(Box<dyn fmt::Display + Send + Sync>),
}

impl MetaValue {
    pub fn opaque(value: impl fmt::Display + Send + Sync + 'static) -> Self {
        Self::Opaque(Box::new(value))
    }
}

impl fmt::Debug for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetaValue({})", to_json(self, usize::MAX))
    }
}

impl From<Value> for MetaValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                // u64 beyond i64 and all floats.
                None => n.as_f64().map_or(Self::Text(n.to_string()), Self::Float),
            },
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map_or_else(|| Value::String(f.to_string()), Value::Number)
}

fn to_json(value: &MetaValue, depth_left: usize) -> Value {
    let nested = matches!(
        value,
        MetaValue::List(_) | MetaValue::Tuple(_) | MetaValue::Set(_) | MetaValue::Map(_)
    );
    if nested && depth_left == 0 {
        return Value::String(to_json(value, usize::MAX).to_string());
    }
    let inner = depth_left.saturating_sub(1);
    match value {
        MetaValue::Null => Value::Null,
        MetaValue::Bool(b) => Value::Bool(*b),
        MetaValue::Int(i) => Value::Number((*i).into()),
        MetaValue::Float(f) => float(*f),
        MetaValue::Text(s) => Value::String(s.clone()),
        MetaValue::List(items) | MetaValue::Tuple(items) => {
            Value::Array(items.iter().map(|v| to_json(v, inner)).collect())
        }
        MetaValue::Set(items) => {
            let mut out: Vec<Value> = items.iter().map(|v| to_json(v, inner)).collect();
            out.sort_by_cached_key(Value::to_string);
            Value::Array(out)
        }
        MetaValue::Map(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), to_json(v, inner)))
                .collect(),
        ),
        MetaValue::Opaque(obj) => Value::String(obj.to_string()),
    }
}

/// Coerce `value` into a JSON object suitable for storage.
pub fn sanitize_metadata(value: &MetaValue) -> Map<String, Value> {
    match to_json(value, MAX_DEPTH) {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Parse a JSON document, keeping `depth_left` container levels.
///
/// Containers below that become a string holding their compact JSON text.
/// Skipping over a raw subtree does not recurse, so any nesting depth that
/// fits in the body is accepted.
pub fn parse_capped(text: &str, depth_left: usize) -> serde_json::Result<Value> {
    let raw: &RawValue = serde_json::from_str(text)?;
    capped(raw, depth_left)
}

fn capped(raw: &RawValue, depth_left: usize) -> serde_json::Result<Value> {
    let text = raw.get().trim_start();
    match text.as_bytes().first() {
        Some(b'{' | b'[') if depth_left == 0 => Ok(Value::String(compact(text))),
        Some(b'{') => {
            let fields: BTreeMap<String, &RawValue> = serde_json::from_str(text)?;
            fields
                .into_iter()
                .map(|(k, v)| Ok((k, capped(v, depth_left - 1)?)))
                .collect::<serde_json::Result<Map<_, _>>>()
                .map(Value::Object)
        }
        Some(b'[') => {
            let items: Vec<&RawValue> = serde_json::from_str(text)?;
            items
                .into_iter()
                .map(|v| capped(v, depth_left - 1))
                .collect::<serde_json::Result<Vec<_>>>()
                .map(Value::Array)
        }
        _ => serde_json::from_str(text),
    }
}

/// Strip insignificant whitespace from valid JSON text.
fn compact(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if !matches!(c, ' ' | '\t' | '\n' | '\r') {
            in_string = c == '"';
            out.push(c);
        }
    }
    out
}

/// Sanitise metadata received as raw JSON.
pub fn sanitize_json(value: Value) -> Map<String, Value> {
    sanitize_metadata(&MetaValue::from(value))
}
