//! DoorLink agent library.
//!
//! Exposes the hardware-agnostic agent core for host testing and for the
//! `doorlink-server` crate, which shares [`protocol`] and [`integrity`].
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod command;
pub mod config;
pub mod connectivity;
pub mod diagnostics;
pub mod error;
pub mod integrity;
pub mod ota;
pub mod protocol;

pub mod pins;

// ESP-IDF-backed implementations are cfg-gated inside; host builds get
// simulation stubs.
pub mod adapters;
pub mod drivers;
