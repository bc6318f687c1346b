//! In-memory calibration tables
//!
//! A `Table` holds one 2-D lookup table: x-axis coordinates, y-axis
//! coordinates, and the value matrix, in canonical ascending row order.
//! Loading and saving the on-disk representation is delegated to an
//! external collaborator through [`CalFileStorage`].

use serde::{Deserialize, Serialize};

use crate::codec::WireType;

/// Wire addressing and scaling for one axis group of a table
///
/// The X coordinates, Y coordinates, and value matrix of a table are each
/// independently addressable on the ECU and may live in different regions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisGroup {
    /// Addressable page/table index on the device
    pub region: u8,
    /// Integer representation on the wire
    pub wire_type: WireType,
    /// Byte offset of the first element within the region
    pub offset: u16,
    /// Translate term of the affine transform
    pub add: f64,
    /// Scale term of the affine transform
    pub mult: f64,
}

/// Fixed geometry of one logical table, supplied by external configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableGeometry {
    /// Number of columns (x coordinates)
    pub x_size: usize,
    /// Number of rows (y coordinates)
    pub y_size: usize,
    /// Wire layout of the x coordinates
    pub x_axis: AxisGroup,
    /// Wire layout of the y coordinates
    pub y_axis: AxisGroup,
    /// Wire layout of the value matrix
    pub values: AxisGroup,
    /// X axis title
    pub x_title: String,
    /// Y axis title
    pub y_title: String,
}

/// One in-memory copy of a 2-D calibration table
///
/// Rows are kept in ascending logical index order regardless of the order
/// the device transmits them in; the sync engine performs the reversal.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    x_size: usize,
    y_size: usize,
    x_coords: Vec<f64>,
    y_coords: Vec<f64>,
    /// Row-major: values[y * x_size + x]
    values: Vec<f64>,
    x_title: String,
    y_title: String,
}

impl Table {
    /// Create an empty table. Both dimensions must be non-zero.
    pub fn new(x_size: usize, y_size: usize, x_title: &str, y_title: &str) -> Self {
        assert!(x_size > 0 && y_size > 0, "table dimensions must be non-zero");
        Self {
            x_size,
            y_size,
            x_coords: vec![0.0; x_size],
            y_coords: vec![0.0; y_size],
            values: vec![0.0; x_size * y_size],
            x_title: x_title.to_string(),
            y_title: y_title.to_string(),
        }
    }

    /// Number of columns
    pub fn x_size(&self) -> usize {
        self.x_size
    }

    /// Number of rows
    pub fn y_size(&self) -> usize {
        self.y_size
    }

    /// X axis title
    pub fn x_title(&self) -> &str {
        &self.x_title
    }

    /// Y axis title
    pub fn y_title(&self) -> &str {
        &self.y_title
    }

    /// Get a cell value, `None` if out of bounds
    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        if x < self.x_size && y < self.y_size {
            Some(self.values[y * self.x_size + x])
        } else {
            None
        }
    }

    /// Set a cell value, returning false if out of bounds
    pub fn set(&mut self, x: usize, y: usize, value: f64) -> bool {
        if x < self.x_size && y < self.y_size {
            self.values[y * self.x_size + x] = value;
            true
        } else {
            false
        }
    }

    /// Get an x-axis coordinate, `None` if out of bounds
    pub fn get_x_coord(&self, i: usize) -> Option<f64> {
        self.x_coords.get(i).copied()
    }

    /// Set an x-axis coordinate, returning false if out of bounds
    pub fn set_x_coord(&mut self, i: usize, v: f64) -> bool {
        if let Some(slot) = self.x_coords.get_mut(i) {
            *slot = v;
            true
        } else {
            false
        }
    }

    /// Get a y-axis coordinate, `None` if out of bounds
    pub fn get_y_coord(&self, i: usize) -> Option<f64> {
        self.y_coords.get(i).copied()
    }

    /// Set a y-axis coordinate, returning false if out of bounds
    pub fn set_y_coord(&mut self, i: usize, v: f64) -> bool {
        if let Some(slot) = self.y_coords.get_mut(i) {
            *slot = v;
            true
        } else {
            false
        }
    }

    /// Replace this table's entire content with another's.
    ///
    /// Both tables must share the same geometry.
    pub fn replace_with(&mut self, other: &Table) {
        assert_eq!(self.x_size, other.x_size, "geometry mismatch");
        assert_eq!(self.y_size, other.y_size, "geometry mismatch");
        self.x_coords.copy_from_slice(&other.x_coords);
        self.y_coords.copy_from_slice(&other.y_coords);
        self.values.copy_from_slice(&other.values);
    }

    /// Exact comparison of every coordinate and cell, no tolerance.
    ///
    /// Distinct from the epsilon-tolerant comparison used during
    /// reconciliation; the two can disagree for sub-epsilon differences.
    pub fn structurally_equal(&self, other: &Table) -> bool {
        self.x_size == other.x_size
            && self.y_size == other.y_size
            && self.x_coords == other.x_coords
            && self.y_coords == other.y_coords
            && self.values == other.values
    }
}

/// Collaborator contract for the persisted calibration-file format.
///
/// The file's own layout and load/save mechanics are outside the core; the
/// sync engine only needs to populate a [`Table`] from it and write one back.
pub trait CalFileStorage {
    /// Load the persisted table into `table`
    fn load(&mut self, table: &mut Table) -> anyhow::Result<()>;

    /// Persist `table`
    fn save(&mut self, table: &Table) -> anyhow::Result<()>;
}
