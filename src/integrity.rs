//! Content checksums for firmware and config artifacts.
//!
//! SHA-256 over the raw artifact bytes, rendered as 64 lowercase hex
//! characters. The backend computes the digest on every release save and
//! the agent recomputes it before installing anything.
//!
//! An empty expected checksum verifies trivially: releases published before
//! checksums existed carry none, and the agent must still accept them. Only
//! the empty string counts as absent; whitespace or any other text that is
//! not the digest is a mismatch. Hex letter case is not significant.

use core::fmt;

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// The recomputed digest does not match the one the server supplied.
    Mismatch { expected: String, actual: String },
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch { expected, actual } => {
                write!(f, "checksum mismatch (expected {expected}, got {actual})")
            }
        }
    }
}

/// Raw SHA-256 digest of `content`.
pub fn digest(content: &[u8]) -> [u8; 32] {
    hmac_sha256::Hash::hash(content)
}

/// SHA-256 of `content` as lowercase hex.
pub fn digest_hex(content: &[u8]) -> String {
    hex::encode(digest(content))
}

/// Whether `expected` is absent for verification purposes.
pub fn is_unchecked(expected: &str) -> bool {
    expected.is_empty()
}

/// Verify `content` against the server-supplied `expected` checksum.
///
/// Comparison ignores hex letter case only.
pub fn verify(content: &[u8], expected: &str) -> Result<(), IntegrityError> {
    if is_unchecked(expected) {
        return Ok(());
    }
    let actual = digest_hex(content);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(IntegrityError::Mismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
