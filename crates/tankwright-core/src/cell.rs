//! Cell data: the atomic 1×1 structural block.
//!
//! Cells are owned by their room's arena and refer to everything else
//! through plain index handles — neighbor links are `CellRef`s, connector
//! slots are per-room indices, coupler links are arena ids. The graph
//! operations that read or mutate links across rooms live on
//! [`crate::tank::Tank`]; this module holds the data and the purely local
//! helpers.

use serde::{Deserialize, Serialize};

use crate::grid::Vec2;

/// Index of a room in the structure arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomId(pub u32);

/// Id of a coupler in the structure arena. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CouplerId(pub u64);

/// Non-owning handle to a cell: room arena index plus the cell's stable
/// position in that room's cell list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub room: RoomId,
    pub cell: usize,
}

impl CellRef {
    pub fn new(room: RoomId, cell: usize) -> Self {
        Self { room, cell }
    }
}

/// Collision footprint of one cell face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WallState {
    /// Intact full-width wall.
    Full,
    /// Disabled because a neighbor cell shares this face.
    Open,
    /// Resized by a coupler to the given remaining fraction of its width.
    Trimmed(f32),
    /// Bisected into two stubs by a coupler sitting on the cell boundary.
    Split,
}

/// Atomic structural unit. Up to four neighbor links, four connector
/// slots, any number of coupler links, health, and a section tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    /// Stable index within the owning room; doubles as the manifest bit.
    pub index: usize,
    /// Name used by the design format to address equipment and hatches.
    pub name: String,
    /// Offset from the room origin, in the room's current orientation.
    pub offset: Vec2,
    /// Adjacent cells in N/W/S/E order. Symmetric by invariant.
    pub neighbors: [Option<CellRef>; 4],
    /// Connector indices in the same slots; same-room seams only.
    pub connectors: [Option<usize>; 4],
    /// Couplers touching this cell.
    pub couplers: Vec<CouplerId>,
    /// Connected-component id within the room (connector seams excluded).
    pub section: u32,
    pub health: f32,
    pub max_health: f32,
    /// Guard against re-entrant destruction.
    pub dying: bool,
    pub alive: bool,
    pub walls: [WallState; 4],
    /// Avatar currently parented to this cell, if any.
    pub occupant: Option<u32>,
}

impl Cell {
    pub fn new(index: usize, name: impl Into<String>, offset: Vec2, max_health: f32) -> Self {
        Self {
            index,
            name: name.into(),
            offset,
            neighbors: [None; 4],
            connectors: [None; 4],
            couplers: Vec::new(),
            section: 0,
            health: max_health,
            max_health,
            dying: false,
            alive: true,
            walls: [WallState::Full; 4],
            occupant: None,
        }
    }

    /// Reduce health by `amount`, clamped at zero. Returns the health
    /// actually lost.
    pub fn apply_damage(&mut self, amount: f32) -> f32 {
        let lost = amount.min(self.health).max(0.0);
        self.health -= lost;
        lost
    }

    /// Restore health, clamped at `max_health`. Returns the health
    /// actually regained.
    pub fn repair(&mut self, amount: f32) -> f32 {
        let gained = amount.max(0.0).min(self.max_health - self.health);
        self.health += gained;
        gained
    }

    pub fn has_coupler(&self, id: CouplerId) -> bool {
        self.couplers.contains(&id)
    }

    pub fn forget_coupler(&mut self, id: CouplerId) {
        self.couplers.retain(|c| *c != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_damage_clamps_at_zero() {
        let mut cell = Cell::new(0, "c0", Vec2::ZERO, 30.0);
        assert_eq!(cell.apply_damage(10.0), 10.0);
        assert_eq!(cell.health, 20.0);
        assert_eq!(cell.apply_damage(50.0), 20.0);
        assert_eq!(cell.health, 0.0);
        assert_eq!(cell.apply_damage(5.0), 0.0);
    }

    #[test]
    fn test_repair_clamps_at_max() {
        let mut cell = Cell::new(0, "c0", Vec2::ZERO, 30.0);
        cell.apply_damage(25.0);
        assert_eq!(cell.repair(10.0), 10.0);
        assert_eq!(cell.repair(100.0), 15.0);
        assert_eq!(cell.health, 30.0);
    }

    #[test]
    fn test_coupler_bookkeeping() {
        let mut cell = Cell::new(0, "c0", Vec2::ZERO, 30.0);
        cell.couplers.push(CouplerId(7));
        assert!(cell.has_coupler(CouplerId(7)));
        cell.forget_coupler(CouplerId(7));
        assert!(!cell.has_coupler(CouplerId(7)));
    }
}
