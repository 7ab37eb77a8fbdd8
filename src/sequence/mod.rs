//! # Relay Sequencing Module
//!
//! The relay-sequencing command language and its execution engine.
//!
//! This module handles:
//! - Parsing the text grammar (`"1,2,3:500;OFF:100;4,5,6:500"`) into steps
//! - Hardware-safety validation (overlap, load, timing limits)
//! - Timed execution against the relay/measurement hardware abstraction
//! - Formatting per-step measurements into a response payload
//!
//! A sequence is created fresh per incoming command, validated, executed and
//! discarded; it is never mutated after parsing.

pub mod executor;
pub mod grammar;
pub mod validator;

pub use executor::{Measurement, RelayBank, SequenceExecutor, SequenceResult, SimulatedBank};
pub use grammar::{parse_sequence, Sequence, Step};
pub use validator::validate;
