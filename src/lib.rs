//! # Fixture Link Library
//!
//! Communication core for a relay-based hardware test fixture controller.
//!
//! This library turns an unreliable serial byte stream into validated, typed
//! frames, and interprets a relay-sequencing command language that drives
//! electrically-isolated relays in timed, safety-checked patterns while
//! collecting per-step measurements.

pub mod config;
pub mod error;
pub mod frame;
pub mod sequence;
pub mod serial;
