//! # TuneSync Core Library
//!
//! Keeps ECU calibration tables synchronized between their persisted file
//! representation and the live copies on a MegaSquirt-compatible device,
//! over the fixed byte-oriented serial protocol.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - The serial link layer: bounded-retry command exchanges with the
//!   mandatory inter-phase timing of the device's page-switch logic
//! - The wire value codec (fixed-width big-endian integers to and from
//!   engineering units)
//! - In-memory 2-D calibration tables
//! - The synchronization engine: tolerant reconciliation, dirty-region
//!   tracking, and burn-to-flash commits
//! - Telemetry snapshot decoding and the external-scheduler command seam
//!
//! ## Example
//!
//! ```rust,ignore
//! use tunesync_core::protocol::Link;
//! use tunesync_core::sync::TableSync;
//!
//! let mut link = Link::connect("/dev/ttyUSB0")?;
//! let mut table = TableSync::new("veTable1", geometry);
//!
//! table.read_device(&mut link)?;
//! table.read_file(&mut storage)?;
//! if table.has_divergence() {
//!     table.reconcile_to_device(&mut link)?;
//!     table.commit_burn(&mut link)?;
//! }
//! ```

pub mod codec;
pub mod protocol;
pub mod scheduler;
pub mod sync;
pub mod table;
pub mod telemetry;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::codec::WireType;
    pub use crate::protocol::{EcuIo, Link, LinkError};
    pub use crate::scheduler::{Agent, CommandQueue, SyncCommand, SyncUnit, Trigger};
    pub use crate::sync::{SyncError, TableSync, EPSILON};
    pub use crate::table::{AxisGroup, CalFileStorage, Table, TableGeometry};
    pub use crate::telemetry::{Channel, ChannelValue, TelemetryConfig, TelemetrySample};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
