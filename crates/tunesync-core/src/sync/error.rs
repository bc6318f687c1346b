//! Synchronization errors

use thiserror::Error;

use crate::protocol::LinkError;

/// Errors surfaced by the synchronization engine
#[derive(Error, Debug)]
pub enum SyncError {
    /// A link exchange exhausted its retry budget or failed fatally
    #[error(transparent)]
    Link(#[from] LinkError),

    /// The calibration file could not be loaded after bounded retries.
    /// Valid calibration data is a hard dependency; callers should treat
    /// this as fatal to the process.
    #[error("calibration file load failed after {tries} attempts: {source}")]
    Persistence {
        /// Number of load attempts made
        tries: u32,
        /// Last load failure
        #[source]
        source: anyhow::Error,
    },

    /// A reconcile pass aborted partway through. Writes already sent remain
    /// applied on the device; the partial state is not rolled back.
    #[error("write to region {region} failed, reconcile aborted: {source}")]
    PartialWrite {
        /// Region whose element write failed
        region: u8,
        /// Underlying link failure
        #[source]
        source: LinkError,
    },
}
