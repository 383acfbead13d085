//! Intra-room seam markers.
//!
//! A connector separates two cells of the same room into different
//! sections without being a joint between rooms. It takes no part in the
//! structural graph beyond that: the cells it separates are still
//! neighbors, and the destruction cascade traverses the seam freely.

use serde::{Deserialize, Serialize};

use crate::error::StructureError;
use crate::grid::{Dir, Vec2};

/// Seam marker between two adjacent cells of one room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connector {
    /// Cell index on the first side, cleared once that cell is destroyed.
    pub cell_a: Option<usize>,
    /// Cell index on the second side.
    pub cell_b: Option<usize>,
    /// Direction from `cell_a` toward `cell_b`.
    pub seam_dir: Dir,
    /// Offset of the seam centre from the room origin.
    pub offset: Vec2,
    /// True once one attached cell has been destroyed.
    pub damaged: bool,
    /// True once both attached cells are gone.
    pub destroyed: bool,
}

impl Connector {
    pub fn new(cell_a: usize, cell_b: usize, seam_dir: Dir, offset: Vec2) -> Self {
        Self {
            cell_a: Some(cell_a),
            cell_b: Some(cell_b),
            seam_dir,
            offset,
            damaged: false,
            destroyed: false,
        }
    }

    /// True if this connector sits on the seam between the two given cells.
    pub fn joins(&self, a: usize, b: usize) -> bool {
        (self.cell_a == Some(a) && self.cell_b == Some(b))
            || (self.cell_a == Some(b) && self.cell_b == Some(a))
    }

    /// Other attached cell, if both sides are still present.
    pub fn other_cell(&self, cell: usize) -> Option<usize> {
        if self.cell_a == Some(cell) {
            self.cell_b
        } else if self.cell_b == Some(cell) {
            self.cell_a
        } else {
            None
        }
    }

    /// Notify the connector that one of its cells was destroyed. The first
    /// loss leaves it in a damaged state; the second destroys it.
    pub fn on_cell_destroyed(&mut self, cell: usize) -> Result<(), StructureError> {
        if self.cell_a != Some(cell) && self.cell_b != Some(cell) {
            return Err(StructureError::UnrelatedCell);
        }
        if self.cell_a == Some(cell) {
            self.cell_a = None;
        } else {
            self.cell_b = None;
        }
        if self.damaged {
            self.destroyed = true;
        } else {
            self.damaged = true;
        }
        Ok(())
    }
}
