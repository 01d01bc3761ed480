//! Unified error types for the DoorLink agent.
//!
//! Every backend call and storage operation funnels into [`Error`] so the
//! control loop can classify a failure with one `match`:
//!
//! | Variant       | Loop reaction                                       |
//! |---------------|-----------------------------------------------------|
//! | `Auth`        | log at error level, keep polling on the next tick   |
//! | `NotFound`    | terminal for that command, logged, never retried    |
//! | `Transport`   | retried by the next iteration, never escalated      |
//! | `Integrity`   | artifact discarded, retried at the next OTA check   |
//! | `Persistence` | operation abandoned, loop continues                 |
//! | `Flash`       | firmware not installed, retried at the next check   |

use core::fmt;

use crate::app::ports::{FlashError, StorageError};
pub use crate::integrity::IntegrityError;

// ---------------------------------------------------------------------------
// Top-level agent error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The backend rejected the device token (HTTP 401).
    Auth,
    /// Acknowledgement target is absent or already terminal (HTTP 404).
    NotFound,
    /// Network, timeout, unexpected status or undecodable response.
    Transport(TransportError),
    /// An OTA artifact failed checksum verification.
    Integrity(IntegrityError),
    /// Local storage write/rename failed.
    Persistence(StorageError),
    /// Writing or selecting the new firmware image failed.
    Flash(FlashError),
}

impl Error {
    /// Whether the next loop iteration should simply try again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth => write!(f, "auth: invalid device token"),
            Self::NotFound => write!(f, "not found"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Integrity(e) => write!(f, "integrity: {e}"),
            Self::Persistence(e) => write!(f, "persistence: {e}"),
            Self::Flash(e) => write!(f, "flash: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Could not open a connection to the backend.
    Connect,
    /// The request did not complete within the per-call timeout.
    Timeout,
    /// Reading or writing the request/response body failed.
    Io,
    /// The backend answered with a status this protocol does not expect.
    Status(u16),
    /// The response body was not the JSON document we expected.
    Decode,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connection failed"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Io => write!(f, "I/O error"),
            Self::Status(code) => write!(f, "unexpected HTTP status {code}"),
            Self::Decode => write!(f, "malformed response body"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<IntegrityError> for Error {
    fn from(e: IntegrityError) -> Self {
        Self::Integrity(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Persistence(e)
    }
}

impl From<FlashError> for Error {
    fn from(e: FlashError) -> Self {
        Self::Flash(e)
    }
}

/// Agent-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
