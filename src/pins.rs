//! GPIO assignments for the DoorLink controller board.
//!
//! Single source of truth: drivers and the default configuration reference
//! this module rather than hard-coding pin numbers.

/// Digital output driving the door-strike relay module.
pub const RELAY_GPIO: i32 = 5;
