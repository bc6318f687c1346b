//! Table synchronization engine
//!
//! Keeps one logical table synchronized between its persisted file copy and
//! the live copy on the ECU. Owns both in-memory stores, drives the link to
//! read and write them, reconciles differences with floating-point
//! tolerance, and tracks which regions still need a burn to flash.

mod error;

pub use error::SyncError;

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use crate::codec;
use crate::protocol::EcuIo;
use crate::table::{AxisGroup, CalFileStorage, Table, TableGeometry};

/// Absolute-difference tolerance below which two values are considered
/// unchanged for write-back purposes
pub const EPSILON: f64 = 0.001;

/// Calibration file load attempts before giving up
const LOAD_RETRIES: u32 = 5;

/// Synchronizes one logical table between file and device.
///
/// Canonical row order is ascending logical index. The device transmits
/// rows in the opposite order, so the y dimension is index-reversed on
/// every read and write.
pub struct TableSync {
    name: String,
    geometry: TableGeometry,
    file: Table,
    device: Table,
    /// Regions written since the last successful burn
    dirty: HashSet<u8>,
    load_retry_pause: Duration,
}

impl TableSync {
    /// Create a new engine for one table. Both stores start zeroed and must
    /// be populated by [`read_file`](Self::read_file) and
    /// [`read_device`](Self::read_device) before reconciliation.
    pub fn new(name: &str, geometry: TableGeometry) -> Self {
        let file = Table::new(
            geometry.x_size,
            geometry.y_size,
            &geometry.x_title,
            &geometry.y_title,
        );
        let device = file.clone();
        Self {
            name: name.to_string(),
            geometry,
            file,
            device,
            dirty: HashSet::new(),
            load_retry_pause: Duration::from_secs(1),
        }
    }

    /// Override the pause between calibration file load attempts
    pub fn with_load_retry_pause(mut self, pause: Duration) -> Self {
        self.load_retry_pause = pause;
        self
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table geometry
    pub fn geometry(&self) -> &TableGeometry {
        &self.geometry
    }

    /// The file-resident store
    pub fn file(&self) -> &Table {
        &self.file
    }

    /// Mutable access to the file-resident store (for external edits prior
    /// to a reconcile)
    pub fn file_mut(&mut self) -> &mut Table {
        &mut self.file
    }

    /// The device-resident store
    pub fn device(&self) -> &Table {
        &self.device
    }

    /// Refresh the device-resident store from the ECU.
    ///
    /// Reads the three axis groups in order {X, Y, Value}, one read-region
    /// exchange each, and decodes every element. All exchanges complete
    /// before anything is stored; a failure leaves the store untouched.
    pub fn read_device(&mut self, link: &mut impl EcuIo) -> Result<(), SyncError> {
        let g = self.geometry.clone();

        let x_vals = read_group(link, &g.x_axis, g.x_size)?;
        let y_vals = read_group(link, &g.y_axis, g.y_size)?;
        let v_vals = read_group(link, &g.values, g.x_size * g.y_size)?;

        for (i, v) in x_vals.iter().enumerate() {
            self.device.set_x_coord(i, *v);
        }
        // Device sends rows top-down; canonical order is ascending
        for (i, v) in y_vals.iter().enumerate() {
            self.device.set_y_coord(g.y_size - 1 - i, *v);
        }
        for y in 0..g.y_size {
            for x in 0..g.x_size {
                self.device.set(x, g.y_size - 1 - y, v_vals[y * g.x_size + x]);
            }
        }

        tracing::debug!("table '{}': device store refreshed", self.name);
        Ok(())
    }

    /// Refresh the file-resident store from the persisted calibration file.
    ///
    /// Retries with a fixed pause up to [`LOAD_RETRIES`] times, then
    /// reports an unrecoverable persistence error.
    pub fn read_file(&mut self, storage: &mut dyn CalFileStorage) -> Result<(), SyncError> {
        let mut last = match storage.load(&mut self.file) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        for attempt in 1..LOAD_RETRIES {
            tracing::warn!(
                "table '{}': file load attempt {}/{} failed: {}",
                self.name,
                attempt,
                LOAD_RETRIES,
                last
            );
            thread::sleep(self.load_retry_pause);
            match storage.load(&mut self.file) {
                Ok(()) => return Ok(()),
                Err(e) => last = e,
            }
        }

        Err(SyncError::Persistence {
            tries: LOAD_RETRIES,
            source: last,
        })
    }

    /// Persist the file-resident store via the storage collaborator
    pub fn write_file(&mut self, storage: &mut dyn CalFileStorage) -> anyhow::Result<()> {
        storage.save(&self.file)
    }

    /// Write-back: bring the device store into agreement with the file
    /// store, one element at a time.
    ///
    /// Elements whose difference is within [`EPSILON`] are skipped, so
    /// unchanged cells generate no wire traffic and no flash wear. Each
    /// written element marks its owning region dirty. The first write
    /// failure aborts immediately; writes already sent stay applied on the
    /// device. On success both stores are defined as identical, including
    /// elements that were within tolerance and never rewritten.
    pub fn reconcile_to_device(&mut self, link: &mut impl EcuIo) -> Result<(), SyncError> {
        let g = self.geometry.clone();

        for j in 0..g.x_size {
            let dv = self.device.get_x_coord(j).unwrap_or(0.0);
            let fv = self.file.get_x_coord(j).unwrap_or(0.0);
            if (dv - fv).abs() < EPSILON {
                continue;
            }
            self.write_element(link, &g.x_axis, j, fv)?;
        }

        for j in 0..g.y_size {
            let dv = self.device.get_y_coord(j).unwrap_or(0.0);
            let fv = self.file.get_y_coord(j).unwrap_or(0.0);
            if (dv - fv).abs() < EPSILON {
                continue;
            }
            // Logical row j lives at the mirrored device index
            self.write_element(link, &g.y_axis, g.y_size - 1 - j, fv)?;
        }

        for dev_y in 0..g.y_size {
            let y = g.y_size - 1 - dev_y;
            for x in 0..g.x_size {
                let dv = self.device.get(x, y).unwrap_or(0.0);
                let fv = self.file.get(x, y).unwrap_or(0.0);
                if (dv - fv).abs() < EPSILON {
                    continue;
                }
                self.write_element(link, &g.values, dev_y * g.x_size + x, fv)?;
            }
        }

        // After a full pass the stores agree by definition, including
        // elements that were already within tolerance
        self.device.replace_with(&self.file);

        tracing::debug!(
            "table '{}': reconciled, {} region(s) pending burn",
            self.name,
            self.dirty.len()
        );
        Ok(())
    }

    /// Encode one element and write it at its computed device offset,
    /// marking the owning region dirty.
    fn write_element(
        &mut self,
        link: &mut impl EcuIo,
        group: &AxisGroup,
        element_index: usize,
        value: f64,
    ) -> Result<(), SyncError> {
        let bytes = codec::encode(group.wire_type, value, group.add, group.mult);
        let offset = group.offset + (element_index * group.wire_type.byte_width()) as u16;

        link.write_region(group.region, offset, &bytes)
            .map_err(|e| SyncError::PartialWrite {
                region: group.region,
                source: e,
            })?;

        self.dirty.insert(group.region);
        Ok(())
    }

    /// Burn every dirty region to non-volatile storage.
    ///
    /// Iteration order across regions is unspecified. The first failure
    /// aborts and leaves the dirty set unchanged; burn is idempotent on the
    /// device, so a retry safely re-burns regions already committed. Only a
    /// fully successful pass clears the set.
    pub fn commit_burn(&mut self, link: &mut impl EcuIo) -> Result<(), SyncError> {
        for &region in &self.dirty {
            link.burn_region(region)?;
        }
        if !self.dirty.is_empty() {
            tracing::info!(
                "table '{}': burned {} region(s)",
                self.name,
                self.dirty.len()
            );
        }
        self.dirty.clear();
        Ok(())
    }

    /// Whether any region awaits a durable commit
    pub fn has_pending_burn(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Regions currently awaiting a burn, in no particular order
    pub fn dirty_regions(&self) -> Vec<u8> {
        self.dirty.iter().copied().collect()
    }

    /// Replace the file store's content with the device store's, in memory
    /// only. Durability requires [`write_file`](Self::write_file).
    pub fn copy_device_to_file(&mut self) {
        self.file.replace_with(&self.device);
    }

    /// Exact structural comparison of the two stores.
    ///
    /// Stricter than the epsilon-tolerant comparison reconciliation uses;
    /// a sub-epsilon difference reports divergence here yet generates no
    /// wire traffic there.
    pub fn has_divergence(&self) -> bool {
        !self.file.structurally_equal(&self.device)
    }
}

/// Issue one read-region exchange for a whole axis group and decode every
/// element into engineering units.
fn read_group(
    link: &mut impl EcuIo,
    group: &AxisGroup,
    count: usize,
) -> Result<Vec<f64>, SyncError> {
    let width = group.wire_type.byte_width();
    let len = (width * count) as u16;

    let bytes = link.read_region(group.region, group.offset, len)?;

    let mut vals = Vec::with_capacity(count);
    for chunk in bytes.chunks_exact(width) {
        vals.push(codec::decode(group.wire_type, chunk, group.add, group.mult));
    }
    Ok(vals)
}
