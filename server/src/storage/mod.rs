//! SQLite storage for the DoorLink backend.
//!
//! Devices, their command queues, the current release per device, and
//! ingested diagnostics. All timestamps are Unix milliseconds supplied by
//! the caller, so expiration is driven by the injected clock.

mod db;
mod models;
mod queries;


pub use db::{DatabaseError, DoorLinkDatabase};
pub use models::*;
