//! Scheduling seam
//!
//! The core never reacts to signals or timers itself. An external scheduler
//! (daemon main loop, signal handler thread, test harness) enqueues opaque
//! commands through a [`Trigger`]; the [`Agent`] drains one command per tick
//! and invokes the corresponding engine primitives. With no command pending,
//! a tick falls through to one telemetry poll.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};

use crate::protocol::EcuIo;
use crate::sync::{SyncError, TableSync};
use crate::table::CalFileStorage;
use crate::telemetry::{self, TelemetryConfig, TelemetrySample};

/// Commands an external trigger may enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Re-read calibration files and reconcile the device to them
    UpdateDevice,
    /// Copy device-resident tables into the file stores and persist them
    UpdateFile,
    /// Burn all regions pending a durable commit
    Burn,
}

/// Cloneable command source handed to asynchronous triggers.
///
/// `raise` only enqueues; it never touches engine state, so it is safe to
/// call from a signal-handling thread.
#[derive(Debug, Clone)]
pub struct Trigger(Sender<SyncCommand>);

impl Trigger {
    /// Enqueue a command. Silently dropped if the queue is gone.
    pub fn raise(&self, cmd: SyncCommand) {
        let _ = self.0.send(cmd);
    }
}

/// Queue of pending commands, drained one per tick
pub struct CommandQueue {
    tx: Sender<SyncCommand>,
    rx: Receiver<SyncCommand>,
}

impl CommandQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self { tx, rx }
    }

    /// Create a new trigger handle for this queue
    pub fn trigger(&self) -> Trigger {
        Trigger(self.tx.clone())
    }

    /// Take the oldest pending command, if any, without blocking
    pub fn poll(&self) -> Option<SyncCommand> {
        match self.rx.try_recv() {
            Ok(cmd) => Some(cmd),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// One synchronized table with its calibration-file collaborator
pub struct SyncUnit {
    /// The table's synchronization engine
    pub sync: TableSync,
    /// Storage for the table's persisted representation
    pub storage: Box<dyn CalFileStorage>,
}

/// Drives a set of tables and the telemetry poller over one shared link.
///
/// Operations run strictly one at a time; the link is never shared between
/// an in-flight exchange and anything else.
pub struct Agent {
    tables: Vec<SyncUnit>,
    telemetry: Option<TelemetryConfig>,
}

impl Agent {
    /// Create an agent over the given tables; `telemetry` enables the
    /// idle-tick snapshot poll
    pub fn new(tables: Vec<SyncUnit>, telemetry: Option<TelemetryConfig>) -> Self {
        Self { tables, telemetry }
    }

    /// The managed tables
    pub fn tables(&self) -> &[SyncUnit] {
        &self.tables
    }

    /// Mutable access to the managed tables
    pub fn tables_mut(&mut self) -> &mut [SyncUnit] {
        &mut self.tables
    }

    /// Run one scheduler tick.
    ///
    /// A failed reconcile or burn is logged and left for the next trigger;
    /// the engine never retries on its own. A persistence failure is
    /// unrecoverable and propagates, since running without valid
    /// calibration data is not an option. Returns a telemetry sample when
    /// the tick fell through to a poll that succeeded.
    pub fn tick(
        &mut self,
        queue: &CommandQueue,
        link: &mut impl EcuIo,
    ) -> Result<Option<TelemetrySample>, SyncError> {
        match queue.poll() {
            Some(SyncCommand::UpdateDevice) => {
                tracing::info!("updating device from calibration files");
                for SyncUnit { sync, storage } in &mut self.tables {
                    match sync.read_file(storage.as_mut()) {
                        Ok(()) => {}
                        Err(e @ SyncError::Persistence { .. }) => return Err(e),
                        Err(e) => {
                            tracing::warn!("table '{}': file read failed: {}", sync.name(), e);
                            continue;
                        }
                    }
                    if sync.has_divergence() {
                        if let Err(e) = sync.reconcile_to_device(link) {
                            tracing::warn!("table '{}': reconcile failed: {}", sync.name(), e);
                        }
                    }
                }
                Ok(None)
            }
            Some(SyncCommand::UpdateFile) => {
                tracing::info!("updating calibration files from device");
                for SyncUnit { sync, storage } in &mut self.tables {
                    if sync.has_divergence() {
                        sync.copy_device_to_file();
                        if let Err(e) = sync.write_file(storage.as_mut()) {
                            tracing::warn!("table '{}': file save failed: {}", sync.name(), e);
                        }
                    }
                }
                Ok(None)
            }
            Some(SyncCommand::Burn) => {
                tracing::info!("burning modified regions to flash");
                for SyncUnit { sync, .. } in &mut self.tables {
                    if sync.has_pending_burn() {
                        if let Err(e) = sync.commit_burn(link) {
                            tracing::warn!("table '{}': burn failed: {}", sync.name(), e);
                        }
                    }
                }
                Ok(None)
            }
            None => {
                let Some(config) = &self.telemetry else {
                    return Ok(None);
                };
                match telemetry::poll(config, link) {
                    Ok(sample) => Ok(Some(sample)),
                    Err(e) => {
                        tracing::warn!("telemetry poll failed: {}", e);
                        Ok(None)
                    }
                }
            }
        }
    }
}
