//! DoorLink backend.
//!
//! Serves the four device endpoints defined in [`doorlink::protocol`]:
//! command poll and acknowledgement, release fetch, and log ingestion.
//! Devices authenticate with the opaque token in `X-DEVICE-TOKEN`.

pub mod clock;
pub mod error;
pub mod queue;
pub mod routes;
pub mod sanitize;
pub mod storage;
