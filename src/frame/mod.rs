//! # Wire Frame Module
//!
//! Implementation of the delimited, checksummed frame protocol used on the
//! serial link to the test fixture.
//!
//! This module handles:
//! - Frame encoding: `START LLL:TTT:PAYLOAD END CCCC`
//! - Byte-stuffing so reserved markers never appear inside a payload
//! - CRC-16 checksum calculation
//! - Incremental frame reassembly from an arbitrarily-chunked byte stream

pub mod codec;
pub mod crc;
pub mod escape;
pub mod parser;
pub mod protocol;

pub use parser::FrameParser;
pub use protocol::{Frame, FrameStats};
