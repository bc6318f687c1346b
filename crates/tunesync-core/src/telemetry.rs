//! Real-time telemetry polling
//!
//! Issues the fixed-layout telemetry snapshot exchange and decodes each
//! configured channel through the codec. Formatting and appending samples
//! to a log file belongs to an external collaborator; this module only
//! produces decoded samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{self, WireType};
use crate::protocol::{EcuIo, LinkError};

/// One channel of the telemetry block.
///
/// A closed set: scalar channels carry an affine-scaled integer, bit
/// channels carry a single flag bit mapped to one of two labels. Matching
/// is exhaustive, so there is no "unknown type, ignore" path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Channel {
    /// Affine-scaled integer channel
    Scalar {
        /// Column name
        name: String,
        /// Integer representation on the wire
        wire_type: WireType,
        /// Byte offset within the snapshot block
        offset: usize,
        /// Translate term
        add: f64,
        /// Scale term
        mult: f64,
    },
    /// Single-bit flag channel
    Bits {
        /// Column name
        name: String,
        /// Byte offset within the snapshot block
        offset: usize,
        /// Bit position within the byte (0 = LSB)
        bit: u8,
        /// Label reported when the bit is set
        one_value: String,
        /// Label reported when the bit is clear
        zero_value: String,
    },
}

impl Channel {
    /// Column name of this channel
    pub fn name(&self) -> &str {
        match self {
            Channel::Scalar { name, .. } => name,
            Channel::Bits { name, .. } => name,
        }
    }
}

/// Telemetry block layout, supplied by the same external configuration
/// that supplies table geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Total size in bytes of one snapshot block
    pub block_size: usize,
    /// Channels to decode out of the block
    pub channels: Vec<Channel>,
}

impl TelemetryConfig {
    /// Column names in channel order, for the external writer's header row
    pub fn column_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }
}

/// One decoded channel value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelValue {
    /// Scalar channel in engineering units
    Number(f64),
    /// Bit channel label
    Flag(String),
}

/// One decoded snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Host time the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Values in channel order
    pub values: Vec<ChannelValue>,
}

/// Issue one snapshot exchange and decode every configured channel.
///
/// Must be serialized with table synchronization by the external scheduler;
/// both run over the same exclusively-owned link.
pub fn poll(config: &TelemetryConfig, link: &mut impl EcuIo) -> Result<TelemetrySample, LinkError> {
    let block = link.telemetry_snapshot(config.block_size)?;

    let values = config
        .channels
        .iter()
        .map(|channel| match channel {
            Channel::Scalar {
                wire_type,
                offset,
                add,
                mult,
                ..
            } => ChannelValue::Number(codec::decode(*wire_type, &block[*offset..], *add, *mult)),
            Channel::Bits {
                offset,
                bit,
                one_value,
                zero_value,
                ..
            } => {
                let set = (block[*offset] >> bit) & 1 != 0;
                ChannelValue::Flag(if set {
                    one_value.clone()
                } else {
                    zero_value.clone()
                })
            }
        })
        .collect();

    Ok(TelemetrySample {
        timestamp: Utc::now(),
        values,
    })
}
