//! Rooms: rigid groups of cells and connectors that move, rotate and
//! mount as a unit.
//!
//! A room owns its cell and connector arenas (fixed after creation) and a
//! dynamic list of coupler ids it has generated or mounted. Placement,
//! mounting and destruction span rooms and live on
//! [`crate::tank::Tank`]; this module holds the room data, the template
//! library the design format instantiates from, and the section
//! partitioning that runs entirely within one room.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CouplerId, RoomId};
use crate::connector::Connector;
use crate::grid::{Dir, Vec2, SEAM_SPACING};

/// Core categories which indicate room function and properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomType {
    /// Does nothing (has not been given a type).
    Null,
    /// Governs tank behavior and makes decisions.
    Command,
    /// Maintains tank propulsion and integrity.
    Engineering,
    /// Acquires and attacks other tanks.
    Weapons,
    /// Prevents and mitigates damage.
    Defense,
    /// Manages crew and cargo.
    Logistics,
}

impl RoomType {
    /// Multiplier applied to the template's base integrity.
    pub fn integrity_modifier(self) -> f32 {
        match self {
            RoomType::Defense => 1.5,
            RoomType::Command => 1.25,
            RoomType::Null | RoomType::Engineering | RoomType::Weapons | RoomType::Logistics => 1.0,
        }
    }

    /// Flat damage absorbed per hit before it is applied to cell health.
    pub fn armor_absorb(self) -> f32 {
        match self {
            RoomType::Defense => 5.0,
            _ => 0.0,
        }
    }
}

/// Equipment installed in a named cell, replayed by the design format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellEquipment {
    pub cell: String,
    pub item: String,
    pub flipped: bool,
}

/// Hatch request: cell name plus the direction the hatch opens toward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HatchRequest {
    pub cell: String,
    pub dir: Dir,
}

/// Rigid group of cells and connectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    /// Template ("prefab") this room was instantiated from.
    pub template: String,
    pub room_type: RoomType,
    pub cells: Vec<Cell>,
    pub connectors: Vec<Connector>,
    /// Mounted couplers touching this room.
    pub couplers: Vec<CouplerId>,
    /// Ghost couplers created while moving the room before it is mounted.
    pub ghost_couplers: Vec<CouplerId>,
    pub mounted: bool,
    pub is_core: bool,
    /// Quarter turns applied, 0–3. Persisted by the design format.
    pub rotation_index: u8,
    /// World position of the room origin.
    pub position: Vec2,
    /// Result of the latest placement validation.
    pub can_mount: bool,
    /// True while the latest snap-move found overlapping placed cells.
    pub obstructed: bool,
    pub base_integrity: f32,
    /// Hatches to validate and place on mount.
    pub pending_hatches: Vec<HatchRequest>,
    pub equipment: Vec<CellEquipment>,
}

impl Room {
    /// World position of a cell's centre.
    pub fn cell_world(&self, index: usize) -> Vec2 {
        self.position + self.cells[index].offset
    }

    pub fn alive_cells(&self) -> impl Iterator<Item = (usize, &Cell)> {
        self.cells.iter().enumerate().filter(|(_, c)| c.alive)
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|c| c.alive).count()
    }

    pub fn cell_by_name(&self, name: &str) -> Option<usize> {
        self.cells.iter().position(|c| c.name == name)
    }

    /// Connector sitting on the seam between two cells, if any.
    pub fn connector_between(&self, a: usize, b: usize) -> Option<usize> {
        self.connectors
            .iter()
            .position(|c| !c.destroyed && c.joins(a, b))
    }

    /// Apply a room type, rescaling cell health to the new maximum.
    pub fn set_type(&mut self, room_type: RoomType) {
        self.room_type = room_type;
        let max = self.base_integrity * room_type.integrity_modifier();
        for cell in &mut self.cells {
            cell.max_health = max;
            if cell.alive {
                cell.health = max;
            }
        }
    }

    /// Rotate the room a quarter turn around its origin. Only the local
    /// geometry changes here; adjacency and sections are recomputed by the
    /// owning structure afterwards.
    pub fn rotate_local(&mut self, clockwise: bool) {
        self.rotation_index = if clockwise {
            (self.rotation_index + 1) % 4
        } else {
            (self.rotation_index + 3) % 4
        };
        for cell in &mut self.cells {
            cell.offset = if clockwise {
                crate::grid::rotate_cw(cell.offset)
            } else {
                crate::grid::rotate_ccw(cell.offset)
            };
        }
        for conn in &mut self.connectors {
            conn.offset = if clockwise {
                crate::grid::rotate_cw(conn.offset)
            } else {
                crate::grid::rotate_ccw(conn.offset)
            };
            conn.seam_dir = if clockwise {
                conn.seam_dir.rotated_cw()
            } else {
                conn.seam_dir.rotated_ccw()
            };
        }
    }

    /// Partition live cells into sections: connected components over
    /// neighbor edges, where an edge exists only if no connector separates
    /// the two cells. Components are numbered in cell-list order.
    pub fn compute_sections(&mut self) {
        let n = self.cells.len();
        let mut visited = vec![false; n];
        let mut next_section = 0u32;

        for start in 0..n {
            if visited[start] || !self.cells[start].alive {
                continue;
            }
            let mut queue = VecDeque::new();
            visited[start] = true;
            queue.push_back(start);

            while let Some(current) = queue.pop_front() {
                self.cells[current].section = next_section;
                for slot in 0..4 {
                    if self.cells[current].connectors[slot].is_some() {
                        continue; // connector seam: different section
                    }
                    let Some(neighbor) = self.cells[current].neighbors[slot] else {
                        continue;
                    };
                    if neighbor.room != self.id {
                        continue;
                    }
                    let j = neighbor.cell;
                    if !visited[j] && self.cells[j].alive {
                        visited[j] = true;
                        queue.push_back(j);
                    }
                }
            }
            next_section += 1;
        }
    }

    pub fn section_count(&self) -> u32 {
        self.alive_cells()
            .map(|(_, c)| c.section + 1)
            .max()
            .unwrap_or(0)
    }
}

// ── Templates ───────────────────────────────────────────────────────────

/// Named cell layout a room is instantiated from. Cells separated by a
/// connector sit [`SEAM_SPACING`] apart; plain neighbors sit one cell
/// apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomTemplate {
    pub name: String,
    pub base_integrity: f32,
    /// (cell name, local offset) in stable manifest order.
    pub cells: Vec<(String, Vec2)>,
    /// (cell index a, cell index b, direction from a to b).
    pub connectors: Vec<(usize, usize, Dir)>,
}

impl RoomTemplate {
    pub fn new(name: impl Into<String>, base_integrity: f32) -> Self {
        Self {
            name: name.into(),
            base_integrity,
            cells: Vec::new(),
            connectors: Vec::new(),
        }
    }

    pub fn with_cell(mut self, name: impl Into<String>, x: f32, y: f32) -> Self {
        self.cells.push((name.into(), Vec2::new(x, y)));
        self
    }

    pub fn with_connector(mut self, a: usize, b: usize, dir: Dir) -> Self {
        self.connectors.push((a, b, dir));
        self
    }

    /// Instantiate a room at the origin. The id is assigned by the
    /// structure when the room is added.
    pub fn instantiate(&self) -> Room {
        let cells = self
            .cells
            .iter()
            .enumerate()
            .map(|(i, (name, offset))| Cell::new(i, name.clone(), *offset, self.base_integrity))
            .collect();
        let connectors = self
            .connectors
            .iter()
            .map(|&(a, b, dir)| {
                let mid = self.cells[a].1 + dir.offset().scaled(SEAM_SPACING / 2.0);
                Connector::new(a, b, dir, mid)
            })
            .collect();
        Room {
            id: RoomId(u32::MAX),
            template: self.name.clone(),
            room_type: RoomType::Null,
            cells,
            connectors,
            couplers: Vec::new(),
            ghost_couplers: Vec::new(),
            mounted: false,
            is_core: false,
            rotation_index: 0,
            position: Vec2::ZERO,
            can_mount: false,
            obstructed: false,
            base_integrity: self.base_integrity,
            pending_hatches: Vec::new(),
            equipment: Vec::new(),
        }
    }
}

/// Lookup table of room templates, addressed by the design format's
/// room prefab ids.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: HashMap<String, RoomTemplate>,
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library with the stock room layouts.
    pub fn builtin() -> Self {
        let mut lib = Self::new();
        // Single-cell anchor, used for core rooms.
        lib.register(RoomTemplate::new("anchor", 200.0).with_cell("a0", 0.0, 0.0));
        // 2x2 block, one section.
        lib.register(
            RoomTemplate::new("quad", 100.0)
                .with_cell("q0", 0.0, 0.0)
                .with_cell("q1", 1.0, 0.0)
                .with_cell("q2", 0.0, 1.0)
                .with_cell("q3", 1.0, 1.0),
        );
        // Four cells in a row with a connector between the second and
        // third, giving two sections.
        lib.register(
            RoomTemplate::new("bar", 100.0)
                .with_cell("b0", 0.0, 0.0)
                .with_cell("b1", 1.0, 0.0)
                .with_cell("b2", 1.0 + SEAM_SPACING, 0.0)
                .with_cell("b3", 2.0 + SEAM_SPACING, 0.0)
                .with_connector(1, 2, Dir::East),
        );
        // Two vertically stacked cells.
        lib.register(
            RoomTemplate::new("column", 100.0)
                .with_cell("v0", 0.0, 0.0)
                .with_cell("v1", 0.0, 1.0),
        );
        // Three cells in a row, one section.
        lib.register(
            RoomTemplate::new("hall", 100.0)
                .with_cell("h0", 0.0, 0.0)
                .with_cell("h1", 1.0, 0.0)
                .with_cell("h2", 2.0, 0.0),
        );
        lib
    }

    pub fn register(&mut self, template: RoomTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn get(&self, name: &str) -> Option<&RoomTemplate> {
        self.templates.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(|s| s.as_str())
    }
}
