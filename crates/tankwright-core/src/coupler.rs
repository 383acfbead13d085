//! Structural joints between cells.
//!
//! A coupler joins the closest cell of one room to the closest cell of
//! another (or, for a hatch, a cell to itself). It is created in ghost
//! state while a room is being positioned, promoted to mounted when the
//! room mounts, and destroyed individually or with its room. Locking a
//! coupler blocks traversal without touching the structural graph.

use serde::{Deserialize, Serialize};

use crate::cell::{CellRef, RoomId};
use crate::error::StructureError;
use crate::grid::{Vec2, CELL_SIZE, COUPLER_WIDTH, EPS};

/// Which way the joint connects its rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    /// Hatch-like: the rooms are stacked, the joint lies in a floor or
    /// ceiling, its seam runs horizontally.
    Vertical,
    /// Door-like: the rooms sit side by side, the seam runs vertically.
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouplerState {
    /// Tentative, created during placement preview; not structurally active.
    Ghost,
    /// Active: registered in both rooms' and cells' adjacency.
    Mounted,
    Destroyed,
}

/// How a coupler modifies the wall face it sits in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WallTrim {
    /// No overlap with this wall.
    None,
    /// Coupler sits exactly on the cell boundary: bisect into two stubs.
    Split,
    /// Single wall resized to the given remaining fraction of its width.
    Trimmed(f32),
}

/// Structural joint between two cells of the same or different rooms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupler {
    pub room_a: RoomId,
    pub room_b: RoomId,
    /// Closest cell on the `room_a` side; cleared once severed.
    pub cell_a: Option<CellRef>,
    /// Closest cell on the `room_b` side.
    pub cell_b: Option<CellRef>,
    pub orientation: Orientation,
    pub state: CouplerState,
    /// A locked coupler blocks traversal without affecting connectivity.
    pub locked: bool,
    pub passable: bool,
    /// World position, snapped to the joint grid.
    pub position: Vec2,
}

impl Coupler {
    pub fn ghost(
        room_a: RoomId,
        room_b: RoomId,
        cell_a: CellRef,
        cell_b: CellRef,
        orientation: Orientation,
        position: Vec2,
    ) -> Self {
        Self {
            room_a,
            room_b,
            cell_a: Some(cell_a),
            cell_b: Some(cell_b),
            orientation,
            state: CouplerState::Ghost,
            locked: false,
            passable: true,
            position,
        }
    }

    /// True for a hatch: both anchors are the same cell.
    pub fn is_hatch(&self) -> bool {
        self.room_a == self.room_b && self.cell_a == self.cell_b
    }

    pub fn is_ghost(&self) -> bool {
        self.state == CouplerState::Ghost
    }

    pub fn is_mounted(&self) -> bool {
        self.state == CouplerState::Mounted
    }

    pub fn lock(&mut self) {
        self.locked = true;
        self.passable = false;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
        self.passable = true;
    }

    /// Room on the other end of the coupler.
    pub fn connected_room(&self, room: RoomId) -> Result<RoomId, StructureError> {
        if room == self.room_a {
            Ok(self.room_b)
        } else if room == self.room_b {
            Ok(self.room_a)
        } else {
            Err(StructureError::UnrelatedRoom(room))
        }
    }

    /// True if the coupler still references the given cell on either side.
    pub fn touches(&self, cell: CellRef) -> bool {
        self.cell_a == Some(cell) || self.cell_b == Some(cell)
    }

    /// Clear whichever side references the given cell.
    pub fn sever(&mut self, cell: CellRef) {
        if self.cell_a == Some(cell) {
            self.cell_a = None;
        }
        if self.cell_b == Some(cell) {
            self.cell_b = None;
        }
    }

    /// Signed distance of a point from the coupler's splitting line. The
    /// line runs along the seam: horizontal for a vertical (hatch-like)
    /// coupler, vertical for a horizontal one.
    fn split_side(&self, point: Vec2) -> f32 {
        match self.orientation {
            Orientation::Vertical => point.y - self.position.y,
            Orientation::Horizontal => point.x - self.position.x,
        }
    }

    /// Structurally-opposite cell for `cell`.
    ///
    /// If `cell` is one of the two anchors this is a direct lookup.
    /// Otherwise the cell is classified by which side of the splitting
    /// line its centre falls on, relative to the `cell_a` anchor. A cell
    /// whose centre lies exactly on the line cannot be classified and is
    /// rejected as unrelated.
    pub fn other_cell(
        &self,
        cell: CellRef,
        cell_world: Vec2,
        a_world: Vec2,
    ) -> Result<CellRef, StructureError> {
        if self.cell_a == Some(cell) {
            return self.cell_b.ok_or(StructureError::UnrelatedCell);
        }
        if self.cell_b == Some(cell) {
            return self.cell_a.ok_or(StructureError::UnrelatedCell);
        }
        let side = self.split_side(cell_world);
        let a_side = self.split_side(a_world);
        if side.abs() < EPS || a_side.abs() < EPS {
            return Err(StructureError::UnrelatedCell);
        }
        if side.signum() == a_side.signum() {
            self.cell_b.ok_or(StructureError::UnrelatedCell)
        } else {
            self.cell_a.ok_or(StructureError::UnrelatedCell)
        }
    }
}

/// Compute how a mounted coupler modifies the wall of the cell whose face
/// it sits in. Coordinates run along the seam axis.
pub fn trim_for_wall(coupler_along: f32, cell_along: f32) -> WallTrim {
    let wall_min = cell_along - CELL_SIZE / 2.0;
    let wall_max = cell_along + CELL_SIZE / 2.0;
    // Exactly on a cell boundary: bisect the wall into two stubs.
    if (coupler_along - wall_min).abs() < EPS || (coupler_along - wall_max).abs() < EPS {
        return WallTrim::Split;
    }
    let c_min = coupler_along - COUPLER_WIDTH / 2.0;
    let c_max = coupler_along + COUPLER_WIDTH / 2.0;
    let overlap = (c_max.min(wall_max) - c_min.max(wall_min)).max(0.0);
    if overlap <= EPS {
        return WallTrim::None;
    }
    WallTrim::Trimmed(((CELL_SIZE - overlap) / CELL_SIZE).max(0.0))
}
