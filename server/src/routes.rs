//! HTTP surface: the four device endpoints.
//!
//! Bodies are parsed leniently. A body that is not JSON is treated as an
//! empty object, so the handler reports the missing field instead of a
//! decode error.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{Json, Router};
use doorlink::protocol::{
    ACK_ENDPOINT, COMMAND_ENDPOINT, CommandOffer, DEVICE_TOKEN_HEADER, FIRMWARE_ENDPOINT,
    FirmwarePayload, LOG_ENDPOINT, StatusReply,
};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::queue::{ClientInfo, CommandQueue};
use crate::sanitize;
use crate::storage::Device;

const FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Clone)]
pub struct AppState {
    pub queue: CommandQueue,
}

/// The device that owns the request's `X-DEVICE-TOKEN`.
pub struct DeviceAuth(pub Device);

impl FromRequestParts<AppState> for DeviceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(DEVICE_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        state.queue.authenticate(token).await.map(DeviceAuth)
    }
}

fn header_text<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // First hop of X-Forwarded-For, else the socket peer.
        let forwarded = header_text(parts, FORWARDED_FOR)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let ip = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_default();
        let user_agent = header_text(parts, USER_AGENT.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(ClientInfo { ip, user_agent })
    }
}

/// Request body as JSON, or `Null` when it is not JSON at all.
///
/// Structure is kept one level past the metadata storage depth; anything
/// deeper arrives as text and is stored that way.
fn lenient_json(body: &Bytes) -> Value {
    std::str::from_utf8(body)
        .ok()
        .and_then(|text| sanitize::parse_capped(text, sanitize::MAX_DEPTH + 1).ok())
        .unwrap_or(Value::Null)
}

async fn poll_command(
    State(state): State<AppState>,
    DeviceAuth(device): DeviceAuth,
) -> Result<Json<CommandOffer>, ApiError> {
    state.queue.poll(&device).await.map(Json)
}

async fn ack_command(
    State(state): State<AppState>,
    DeviceAuth(device): DeviceAuth,
    body: Bytes,
) -> Result<Json<StatusReply>, ApiError> {
    state.queue.acknowledge(&device, &lenient_json(&body)).await?;
    Ok(Json(StatusReply::ok()))
}

async fn fetch_firmware(
    State(state): State<AppState>,
    DeviceAuth(device): DeviceAuth,
) -> Result<Json<FirmwarePayload>, ApiError> {
    state.queue.fetch_firmware(&device).await.map(Json)
}

async fn ingest_log(
    State(state): State<AppState>,
    DeviceAuth(device): DeviceAuth,
    client: ClientInfo,
    body: Bytes,
) -> Result<Json<StatusReply>, ApiError> {
    state
        .queue
        .ingest_log(&device, &lenient_json(&body), &client)
        .await?;
    Ok(Json(StatusReply::ok()))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(COMMAND_ENDPOINT, get(poll_command))
        .route(ACK_ENDPOINT, post(ack_command))
        .route(FIRMWARE_ENDPOINT, get(fetch_firmware))
        .route(LOG_ENDPOINT, post(ingest_log))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
