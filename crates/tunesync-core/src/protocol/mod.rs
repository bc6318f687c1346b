//! Serial Protocol Communication
//!
//! Implements the MegaSquirt-style byte-oriented serial protocol: a fixed
//! single-byte command layout with region-addressed reads and writes, and a
//! separate burn command for committing a region to flash.

mod error;
mod link;
pub mod serial;

pub use error::LinkError;
pub use link::{EcuIo, Link, LinkPort};

/// Fixed baud rate of the ECU serial link
pub const BAUD_RATE: u32 = 115200;
