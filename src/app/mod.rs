//! Application core: the agent loop and the port boundary.
//!
//! The loop logic (connectivity, command channel, OTA, diagnostics) lives
//! in the top-level modules; this module holds what ties them together:
//! the shared [`context::AgentContext`], the [`events::AgentEvent`]s they
//! emit, the **port traits** in [`ports`] through which all hardware and
//! network access flows, and the [`service::AgentService`] that runs them
//! in order.

pub mod context;
pub mod events;
pub mod ports;
pub mod service;
