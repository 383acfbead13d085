//! The structure: owns every room, designates the core, and runs the
//! placement and destruction algorithms that span rooms.
//!
//! Ownership is strictly Tank → Room → {Cell, Connector}; couplers live
//! in their own id-stable arena on the tank because they join cells of
//! two rooms. All links between parts are plain indices, so tearing a
//! part down never has to break a reference cycle.
//!
//! All mutating operations are `&mut self` methods that run to
//! completion; a multi-threaded host serializes access per structure.

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, trace, warn};
use rand::Rng;

use crate::cell::{CellRef, CouplerId, RoomId, WallState};
use crate::coupler::{trim_for_wall, Coupler, CouplerState, Orientation, WallTrim};
use crate::error::StructureError;
use crate::events::{EventBuffer, StructureEvent};
use crate::grid::{
    snap_point, Dir, Vec2, ADJACENCY_RANGE, CARDINALS, CELL_SIZE, COUPLER_WIDTH, EPS, JOINT_STEP,
    MIN_COUPLER_CLEARANCE, MOVE_STEP, PROBE_RANGE,
};
use crate::room::{HatchRequest, Room, RoomTemplate, RoomType};
use crate::spatial::{GridIndex, Occupant, QueryFilter, SpatialQuery};

/// Mass of one cell in structure units.
pub const PER_CELL_MASS: f32 = 2.5;
/// Global mass multiplier applied on top of the per-cell weight.
pub const MASS_MULTIPLIER: f32 = 1.0;
/// Size of the core health pool all core damage routes into.
pub const CORE_MAX_HEALTH: f32 = 500.0;

/// Bounding envelope of the structure relative to its physical base.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SizeEnvelope {
    /// Topmost cell face above the base line.
    pub height: f32,
    /// Leftmost cell face, measured from the core column.
    pub left_extent: f32,
    /// Rightmost cell face, measured from the core column.
    pub right_extent: f32,
}

/// One ghost coupler candidate produced by the placement scan.
struct GhostCandidate {
    cell_a: CellRef,
    cell_b: CellRef,
    orientation: Orientation,
    position: Vec2,
}

/// Symmetric neighbor link discovered by an adjacency pass.
struct LinkOp {
    a: CellRef,
    b: CellRef,
    dir: Dir,
    connector: Option<usize>,
    shared_face: bool,
}

/// A player-built vehicle: mounted rooms around a single indestructible
/// core, plus any rooms still being positioned.
#[derive(Debug)]
pub struct Tank {
    pub name: String,
    rooms: Vec<Room>,
    couplers: HashMap<CouplerId, Coupler>,
    next_coupler: u64,
    core_room: Option<RoomId>,
    pub core_health: f32,
    pub core_max_health: f32,
    pub mass: f32,
    pub center_of_mass: Vec2,
    pub envelope: SizeEnvelope,
    mount_order: Vec<RoomId>,
    pub events: EventBuffer,
    index: GridIndex,
    pub per_cell_mass: f32,
    pub mass_multiplier: f32,
}

impl Tank {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rooms: Vec::new(),
            couplers: HashMap::new(),
            next_coupler: 0,
            core_room: None,
            core_health: CORE_MAX_HEALTH,
            core_max_health: CORE_MAX_HEALTH,
            mass: 0.0,
            center_of_mass: Vec2::ZERO,
            envelope: SizeEnvelope::default(),
            mount_order: Vec::new(),
            events: EventBuffer::new(),
            index: GridIndex::new(),
            per_cell_mass: PER_CELL_MASS,
            mass_multiplier: MASS_MULTIPLIER,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn room(&self, id: RoomId) -> Result<&Room, StructureError> {
        self.rooms
            .get(id.0 as usize)
            .ok_or(StructureError::UnknownRoom(id))
    }

    fn room_mut(&mut self, id: RoomId) -> Result<&mut Room, StructureError> {
        self.rooms
            .get_mut(id.0 as usize)
            .ok_or(StructureError::UnknownRoom(id))
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.iter()
    }

    pub fn mounted_rooms(&self) -> impl Iterator<Item = &Room> {
        self.mount_order
            .iter()
            .map(|id| &self.rooms[id.0 as usize])
    }

    pub fn core_room(&self) -> Option<RoomId> {
        self.core_room
    }

    pub fn coupler(&self, id: CouplerId) -> Option<&Coupler> {
        self.couplers.get(&id)
    }

    pub fn couplers(&self) -> impl Iterator<Item = (CouplerId, &Coupler)> {
        self.couplers.iter().map(|(id, c)| (*id, c))
    }

    pub fn cell(&self, cell: CellRef) -> Result<&crate::cell::Cell, StructureError> {
        self.room(cell.room)?
            .cells
            .get(cell.cell)
            .ok_or(StructureError::UnknownCell(cell))
    }

    /// World position of a cell's centre.
    pub fn cell_world(&self, cell: CellRef) -> Vec2 {
        let room = &self.rooms[cell.room.0 as usize];
        room.cell_world(cell.cell)
    }

    fn cell_alive(&self, cell: CellRef) -> bool {
        self.room(cell.room)
            .ok()
            .and_then(|r| r.cells.get(cell.cell))
            .map(|c| c.alive)
            .unwrap_or(false)
    }

    /// Live cells across all mounted rooms.
    pub fn total_cell_count(&self) -> usize {
        self.mounted_rooms().map(|r| r.alive_count()).sum()
    }

    pub fn spatial(&self) -> &impl SpatialQuery {
        &self.index
    }

    // ── Room lifecycle ──────────────────────────────────────────────────

    /// Instantiate a template as a free (unmounted) room.
    pub fn add_room(&mut self, template: &RoomTemplate) -> RoomId {
        let id = RoomId(self.rooms.len() as u32);
        let mut room = template.instantiate();
        room.id = id;
        self.rooms.push(room);
        self.rebuild_index();
        self.refresh_adjacency(id, true);
        self.rooms[id.0 as usize].compute_sections();
        id
    }

    /// Instantiate a template as the structure's core room: placed
    /// immediately, indestructible, the root of every connectivity check.
    pub fn add_core_room(
        &mut self,
        template: &RoomTemplate,
        position: Vec2,
    ) -> Result<RoomId, StructureError> {
        if let Some(existing) = self.core_room {
            return Err(StructureError::CoreAlreadySet(existing));
        }
        let id = self.add_room(template);
        let room = &mut self.rooms[id.0 as usize];
        room.is_core = true;
        room.mounted = true;
        room.position = snap_point(position, MOVE_STEP);
        room.set_type(RoomType::Command);
        self.core_room = Some(id);
        self.mount_order.push(id);
        self.rebuild_index();
        self.refresh_adjacency(id, true);
        self.rooms[id.0 as usize].compute_sections();
        self.recalculate_mass();
        self.update_size_values();
        Ok(id)
    }

    pub fn set_room_type(&mut self, id: RoomId, room_type: RoomType) -> Result<(), StructureError> {
        self.room_mut(id)?.set_type(room_type);
        Ok(())
    }

    /// Queue a hatch to be validated and placed when the room mounts.
    pub fn request_hatch(
        &mut self,
        id: RoomId,
        cell_name: &str,
        dir: Dir,
    ) -> Result<(), StructureError> {
        let room = self.room_mut(id)?;
        room.pending_hatches.push(HatchRequest {
            cell: cell_name.to_string(),
            dir,
        });
        Ok(())
    }

    /// Queue randomized hatches on distinct cells of an unmounted room.
    pub fn request_random_hatches<R: Rng>(
        &mut self,
        id: RoomId,
        count: usize,
        rng: &mut R,
    ) -> Result<(), StructureError> {
        let room = self.room_mut(id)?;
        let names: Vec<String> = room.alive_cells().map(|(_, c)| c.name.clone()).collect();
        for _ in 0..count {
            if names.is_empty() {
                break;
            }
            let cell = names[rng.gen_range(0..names.len())].clone();
            let dir = CARDINALS[rng.gen_range(0..4)];
            room.pending_hatches.push(HatchRequest { cell, dir });
        }
        Ok(())
    }

    // ── Placement ───────────────────────────────────────────────────────

    /// Move an unmounted room as close as possible to the target point,
    /// snapping to the movement grid and recomputing ghost couplers from
    /// scratch.
    pub fn snap_move(&mut self, id: RoomId, target: Vec2) -> Result<(), StructureError> {
        if self.room(id)?.mounted {
            return Err(StructureError::MoveWhileMounted(id));
        }

        let new_pos = snap_point(target, MOVE_STEP);
        {
            let room = self.room_mut(id)?;
            room.position = new_pos;
            room.obstructed = false;
            room.can_mount = false;
        }
        self.clear_ghosts(id);
        self.rebuild_index();

        // Obstruction: enlarge each cell footprint slightly and look for
        // overlap with cells of other, already-placed rooms. An overlap is
        // recoverable — the room just cannot generate couplers here.
        let cell_positions: Vec<(usize, Vec2)> = {
            let room = &self.rooms[id.0 as usize];
            room.alive_cells().map(|(i, _)| (i, room.cell_world(i))).collect()
        };
        let obstruction_filter = QueryFilter {
            exclude_room: Some(id),
            cells_only: true,
            placed_only: true,
            ..Default::default()
        };
        for (_, world) in &cell_positions {
            let hits = self.index.query_box(
                *world,
                Vec2::new(CELL_SIZE / 2.0 + 0.05, CELL_SIZE / 2.0 + 0.05),
                obstruction_filter,
            );
            if !hits.is_empty() {
                trace!("room {} obstructed at {:?}", id.0, new_pos);
                self.rooms[id.0 as usize].obstructed = true;
                return Ok(());
            }
        }

        let candidates = self.scan_coupler_candidates(id, &cell_positions);
        let candidates = self.cull_redundant(id, candidates);

        // Height gate: a structure may not be extended beneath its anchor.
        if let Some(core) = self.core_room {
            let touches_core = candidates.iter().any(|c| c.cell_b.room == core);
            if touches_core {
                let base = self.core_base_height();
                let violation = cell_positions.iter().any(|(_, w)| w.y < base - EPS);
                if violation {
                    debug!("room {} rejected: extends below core base {}", id.0, base);
                    self.rooms[id.0 as usize].can_mount = false;
                    return Ok(());
                }
            }
        }

        for cand in candidates {
            let cid = self.alloc_coupler(Coupler::ghost(
                id,
                cand.cell_b.room,
                cand.cell_a,
                cand.cell_b,
                cand.orientation,
                cand.position,
            ));
            self.rooms[id.0 as usize].ghost_couplers.push(cid);
        }
        let room = &mut self.rooms[id.0 as usize];
        room.can_mount = !room.ghost_couplers.is_empty();
        Ok(())
    }

    /// For every open cell face, cast two parallel probes offset to the
    /// face edges; a strike on a placed cell of another room produces a
    /// ghost coupler candidate at the seam midpoint.
    fn scan_coupler_candidates(
        &self,
        id: RoomId,
        cell_positions: &[(usize, Vec2)],
    ) -> Vec<GhostCandidate> {
        let mut candidates = Vec::new();
        let probe_filter = QueryFilter {
            exclude_room: Some(id),
            cells_only: true,
            ..Default::default()
        };

        for &(ci, origin) in cell_positions {
            for dir in CARDINALS {
                if self.rooms[id.0 as usize].cells[ci].neighbors[dir.index()].is_some() {
                    continue;
                }
                let dir_vec = dir.offset();
                let off = dir.perp().scaled(COUPLER_WIDTH / 2.0);

                let first_cell = |hits: Vec<crate::spatial::Hit>| -> Option<(CellRef, f32)> {
                    hits.into_iter().find_map(|h| match h.occupant {
                        Occupant::Cell(c) => Some((c, h.distance)),
                        _ => None,
                    })
                };
                let hit1 = first_cell(self.index.query_directional(
                    origin + off,
                    dir_vec,
                    PROBE_RANGE,
                    probe_filter,
                ));
                let hit2 = first_cell(self.index.query_directional(
                    origin - off,
                    dir_vec,
                    PROBE_RANGE,
                    probe_filter,
                ));
                let primary = match hit1.or(hit2) {
                    Some((c, _)) => c,
                    None => continue,
                };

                // If only one probe connected, the faces overlap partially:
                // re-cast from the struck cell back toward the origin to get
                // the best-aligned pair.
                let (pair, anchor, flip) = if hit1.is_none() || hit2.is_none() {
                    let back = self.cell_world(primary);
                    let back_filter = QueryFilter {
                        exclude_cell: Some(primary),
                        cells_only: true,
                        ..Default::default()
                    };
                    let inv_dir = dir.opposite().offset();
                    let inv1 = first_cell(self.index.query_directional(
                        back + off,
                        inv_dir,
                        PROBE_RANGE,
                        back_filter,
                    ));
                    let inv2 = first_cell(self.index.query_directional(
                        back - off,
                        inv_dir,
                        PROBE_RANGE,
                        back_filter,
                    ));
                    ((inv1, inv2), back, -1.0)
                } else {
                    ((hit1, hit2), origin, 1.0)
                };

                // Open faces must fully overlap.
                let (Some((c1, d1)), Some((c2, _))) = pair else {
                    continue;
                };
                // Too close for a coupler to fit.
                if d1 < MIN_COUPLER_CLEARANCE {
                    continue;
                }
                if c1 != c2 {
                    // Probes straddle two cells: both must belong to one
                    // room and must not be separated by a connector seam.
                    if c1.room != c2.room {
                        continue;
                    }
                    let struck_room = &self.rooms[c1.room.0 as usize];
                    if struck_room.connector_between(c1.cell, c2.cell).is_some() {
                        continue;
                    }
                }
                // A coupler needs at least one placed side; two held rooms
                // cannot be joined to each other.
                let target = if flip > 0.0 { c1 } else { primary };
                if !self.rooms[target.room.0 as usize].mounted {
                    continue;
                }

                let position = snap_point(
                    anchor + dir_vec.scaled(crate::grid::COUPLER_OFFSET * flip),
                    JOINT_STEP,
                );
                candidates.push(GhostCandidate {
                    cell_a: CellRef::new(id, ci),
                    cell_b: target,
                    orientation: if dir.is_lateral() {
                        Orientation::Horizontal
                    } else {
                        Orientation::Vertical
                    },
                    position,
                });
            }
        }
        candidates
    }

    /// Two couplers joining the same pair of sections along the same seam
    /// line are redundant; keep the first in room layout order.
    fn cull_redundant(&self, id: RoomId, candidates: Vec<GhostCandidate>) -> Vec<GhostCandidate> {
        let mut seen: HashSet<(bool, i32, u32, RoomId, u32)> = HashSet::new();
        let mut kept = Vec::new();
        for cand in candidates {
            let line = match cand.orientation {
                Orientation::Vertical => cand.position.y,
                Orientation::Horizontal => cand.position.x,
            };
            let line_key = (line / JOINT_STEP).round() as i32;
            let origin_section = self.rooms[id.0 as usize].cells[cand.cell_a.cell].section;
            let target_section =
                self.rooms[cand.cell_b.room.0 as usize].cells[cand.cell_b.cell].section;
            let key = (
                cand.orientation == Orientation::Vertical,
                line_key,
                origin_section,
                cand.cell_b.room,
                target_section,
            );
            if seen.insert(key) {
                kept.push(cand);
            }
        }
        kept
    }

    /// Rotate an unmounted room a quarter turn around its origin and
    /// recompute its internal adjacency and sections.
    pub fn rotate_room(&mut self, id: RoomId, clockwise: bool) -> Result<(), StructureError> {
        if self.room(id)?.mounted {
            return Err(StructureError::RotateWhileMounted(id));
        }
        self.clear_ghosts(id);
        self.clear_adjacency(id);
        self.rooms[id.0 as usize].rotate_local(clockwise);
        self.rebuild_index();
        self.refresh_adjacency(id, true);
        self.rooms[id.0 as usize].compute_sections();
        Ok(())
    }

    // ── Mount / dismount ────────────────────────────────────────────────

    /// Attach a positioned room to the structure, promoting its ghost
    /// couplers and placing any queued hatches.
    pub fn mount_room(&mut self, id: RoomId) -> Result<(), StructureError> {
        if self.room(id)?.mounted {
            return Err(StructureError::AlreadyMounted(id));
        }
        if self.room(id)?.ghost_couplers.is_empty() {
            return Err(StructureError::NoGhostCouplers(id));
        }
        // Re-validate the height gate so mount is safe on its own.
        if let Some(core) = self.core_room {
            let touches_core = self.rooms[id.0 as usize]
                .ghost_couplers
                .iter()
                .any(|cid| self.couplers[cid].room_b == core);
            if touches_core {
                let base = self.core_base_height();
                let room = &self.rooms[id.0 as usize];
                let violation = room
                    .alive_cells()
                    .any(|(i, _)| room.cell_world(i).y < base - EPS);
                if violation {
                    self.clear_ghosts(id);
                    self.rooms[id.0 as usize].can_mount = false;
                    return Err(StructureError::BelowCoreBase(id));
                }
            }
        }

        let ghosts = std::mem::take(&mut self.rooms[id.0 as usize].ghost_couplers);
        for cid in ghosts {
            self.promote_coupler(cid);
        }
        self.rooms[id.0 as usize].mounted = true;
        self.rooms[id.0 as usize].can_mount = false;
        self.mount_order.push(id);
        self.rebuild_index();
        self.refresh_adjacency(id, false);
        self.place_pending_hatches(id);

        debug!("room {} mounted ({} cells)", id.0, self.rooms[id.0 as usize].alive_count());
        self.events.push(StructureEvent::RoomMounted { room: id });
        self.events
            .play("room_mounted", self.rooms[id.0 as usize].position);
        self.recalculate_mass();
        self.update_size_values();
        Ok(())
    }

    /// Detach a mounted room: its couplers die non-destructively (the
    /// whole room leaves together, so nothing it joined should cascade),
    /// cross-room links are severed, and aggregates recompute.
    pub fn dismount_room(&mut self, id: RoomId) -> Result<(), StructureError> {
        if !self.room(id)?.mounted {
            return Err(StructureError::NotMounted(id));
        }
        if self.room(id)?.is_core {
            return Err(StructureError::DismountCore);
        }

        let attached: Vec<CouplerId> = self.rooms[id.0 as usize].couplers.clone();
        for cid in attached {
            self.kill_coupler(cid, true);
        }
        self.clear_adjacency(id);
        self.rooms[id.0 as usize].mounted = false;
        self.mount_order.retain(|r| *r != id);
        self.rebuild_index();
        self.refresh_adjacency(id, true);

        debug!("room {} dismounted", id.0);
        self.events.push(StructureEvent::RoomDismounted { room: id });
        self.recalculate_mass();
        self.update_size_values();
        Ok(())
    }

    /// Promote a ghost coupler to mounted: register it on both rooms and
    /// both anchor cells and trim the walls it bisects.
    fn promote_coupler(&mut self, cid: CouplerId) {
        let Some(c) = self.couplers.get_mut(&cid) else {
            return;
        };
        c.state = CouplerState::Mounted;
        let (room_a, room_b, cell_a, cell_b) = (c.room_a, c.room_b, c.cell_a, c.cell_b);
        self.rooms[room_a.0 as usize].couplers.push(cid);
        if room_b != room_a {
            self.rooms[room_b.0 as usize].couplers.push(cid);
        }
        if let Some(a) = cell_a {
            self.rooms[a.room.0 as usize].cells[a.cell].couplers.push(cid);
        }
        if let Some(b) = cell_b {
            if cell_b != cell_a {
                self.rooms[b.room.0 as usize].cells[b.cell].couplers.push(cid);
            }
        }
        self.trim_walls(cid);
        trace!("coupler {:?} promoted", cid);
    }

    /// Queued hatches become mounted self-couplers if the face has room
    /// to open: of the two edge probes cast outward, at least one must be
    /// clear.
    fn place_pending_hatches(&mut self, id: RoomId) {
        let pending = std::mem::take(&mut self.rooms[id.0 as usize].pending_hatches);
        for request in pending {
            let Some(ci) = self.rooms[id.0 as usize].cell_by_name(&request.cell) else {
                warn!("hatch request on unknown cell {:?}", request.cell);
                continue;
            };
            if !self.rooms[id.0 as usize].cells[ci].alive {
                continue;
            }
            let origin = self.rooms[id.0 as usize].cell_world(ci);
            let dir_vec = request.dir.offset();
            let off = request.dir.perp().scaled(COUPLER_WIDTH / 2.0);
            let cell_ref = CellRef::new(id, ci);
            let filter = QueryFilter {
                exclude_cell: Some(cell_ref),
                ..Default::default()
            };
            let blocked1 = !self
                .index
                .query_directional(origin + off, dir_vec, PROBE_RANGE, filter)
                .is_empty();
            let blocked2 = !self
                .index
                .query_directional(origin - off, dir_vec, PROBE_RANGE, filter)
                .is_empty();
            if blocked1 && blocked2 {
                trace!("hatch on {} discarded: no room to open", request.cell);
                continue;
            }
            let position = snap_point(
                origin + dir_vec.scaled(CELL_SIZE / 2.0),
                JOINT_STEP,
            );
            let orientation = if request.dir.is_lateral() {
                Orientation::Horizontal
            } else {
                Orientation::Vertical
            };
            let cid = self.alloc_coupler(Coupler::ghost(
                id, id, cell_ref, cell_ref, orientation, position,
            ));
            self.promote_coupler(cid);
        }
        self.rebuild_index();
    }

    // ── Damage and destruction ──────────────────────────────────────────

    /// Apply damage to a cell. Core cells route everything into the
    /// structure's core health pool; a Defense room absorbs a flat amount
    /// first, credited back into the reported loss.
    pub fn damage_cell(&mut self, cell: CellRef, amount: f32) -> Result<f32, StructureError> {
        self.room(cell.room)?;
        if !self.cell_alive(cell) {
            return Ok(0.0);
        }
        if self.rooms[cell.room.0 as usize].is_core {
            let lost = amount.max(0.0).min(self.core_health);
            self.core_health -= lost;
            let fraction = if self.core_max_health > 0.0 {
                self.core_health / self.core_max_health
            } else {
                0.0
            };
            self.events
                .push(StructureEvent::CoreDamaged { fraction_remaining: fraction });
            self.events.play("core_hit", self.cell_world(cell));
            return Ok(lost);
        }

        let absorbed = self.rooms[cell.room.0 as usize]
            .room_type
            .armor_absorb()
            .min(amount.max(0.0));
        let applied = amount.max(0.0) - absorbed;
        let room = &mut self.rooms[cell.room.0 as usize];
        let lost = room.cells[cell.cell].apply_damage(applied);
        let dead = room.cells[cell.cell].health <= 0.0;
        if dead {
            self.kill_cell_inner(cell, false);
        }
        Ok(lost + absorbed)
    }

    /// Restore a cell's health. Core cells refill the core pool instead.
    pub fn repair_cell(&mut self, cell: CellRef, amount: f32) -> Result<f32, StructureError> {
        self.room(cell.room)?;
        if !self.cell_alive(cell) {
            return Ok(0.0);
        }
        if self.rooms[cell.room.0 as usize].is_core {
            let gained = amount
                .max(0.0)
                .min(self.core_max_health - self.core_health);
            self.core_health += gained;
            return Ok(gained);
        }
        let room = &mut self.rooms[cell.room.0 as usize];
        Ok(room.cells[cell.cell].repair(amount))
    }

    /// Destroy a cell and cascade-destroy anything the loss disconnects
    /// from the core.
    pub fn kill_cell(&mut self, cell: CellRef) {
        self.kill_cell_inner(cell, false);
    }

    /// Destroy the cell if it can no longer reach the core.
    pub fn kill_if_disconnected(&mut self, cell: CellRef) {
        if !self.cell_alive(cell) {
            return;
        }
        if self.rooms[cell.room.0 as usize].is_core {
            return;
        }
        let (_, reached_core) = self.flood_from(cell);
        if !reached_core {
            self.kill_cell_inner(cell, false);
        }
    }

    /// The destruction algorithm. `proxy` marks a cascade kill: the
    /// original kill already ran breakoff detection and owns the single
    /// aggregate recomputation.
    fn kill_cell_inner(&mut self, cell: CellRef, proxy: bool) {
        let Ok(room) = self.room(cell.room) else {
            return;
        };
        if room.is_core {
            return; // core cells are never destroyed directly
        }
        let Some(c) = room.cells.get(cell.cell) else {
            return;
        };
        if !c.alive || c.dying {
            if !proxy {
                warn!("double kill absorbed on {:?}", cell);
            }
            return;
        }
        self.rooms[cell.room.0 as usize].cells[cell.cell].dying = true;
        debug!("cell {:?} dying (proxy={})", cell, proxy);

        // Direct casualties: sever every neighbor and coupler link, noting
        // each cell that just lost an edge.
        let mut detached: Vec<CellRef> = Vec::new();
        for dir in CARDINALS {
            let neighbor = {
                let c = &mut self.rooms[cell.room.0 as usize].cells[cell.cell];
                c.walls[dir.index()] = WallState::Full;
                c.connectors[dir.index()] = None;
                c.neighbors[dir.index()].take()
            };
            if let Some(nb) = neighbor {
                let back = &mut self.rooms[nb.room.0 as usize].cells[nb.cell];
                let opp = dir.opposite().index();
                if back.neighbors[opp] == Some(cell) {
                    back.neighbors[opp] = None;
                    back.connectors[opp] = None;
                    // the face now opens onto a breach
                    if matches!(back.walls[opp], WallState::Open) {
                        back.walls[opp] = WallState::Full;
                    }
                }
                detached.push(nb);
            }
        }
        let attached_couplers: Vec<CouplerId> =
            self.rooms[cell.room.0 as usize].cells[cell.cell].couplers.clone();
        for cid in &attached_couplers {
            if let Some(coupler) = self.couplers.get_mut(cid) {
                let other = if coupler.cell_a == Some(cell) {
                    coupler.cell_b
                } else {
                    coupler.cell_a
                };
                coupler.sever(cell);
                if let Some(other) = other {
                    if other != cell {
                        detached.push(other);
                    }
                }
            }
        }

        // Breakoff detection, once per original kill: flood each detached
        // cell's component; anything that cannot reach the core dies as a
        // proxy. Components already visited — safe or doomed — subsume
        // later candidates.
        if !proxy {
            let mut settled: HashSet<CellRef> = HashSet::new();
            for candidate in detached.clone() {
                if settled.contains(&candidate) || !self.cell_alive(candidate) {
                    continue;
                }
                let (component, reached_core) = self.flood_from(candidate);
                settled.extend(component.iter().copied());
                if !reached_core {
                    debug!(
                        "breakoff: {} cells disconnected via {:?}",
                        component.len(),
                        candidate
                    );
                    for lost in component {
                        self.kill_cell_inner(lost, true);
                    }
                }
            }
        }

        // Local cleanup: connectors, remaining couplers, occupant, arena.
        let connector_count = self.rooms[cell.room.0 as usize].connectors.len();
        for j in 0..connector_count {
            let conn = &mut self.rooms[cell.room.0 as usize].connectors[j];
            if conn.cell_a == Some(cell.cell) || conn.cell_b == Some(cell.cell) {
                if let Err(err) = conn.on_cell_destroyed(cell.cell) {
                    warn!("connector {} out of sync with {:?}: {}", j, cell, err);
                }
            }
        }
        for cid in attached_couplers {
            self.kill_coupler(cid, true);
        }
        let position = self.cell_world(cell);
        {
            let c = &mut self.rooms[cell.room.0 as usize].cells[cell.cell];
            c.couplers.clear();
            if let Some(occupant) = c.occupant.take() {
                self.events
                    .push(StructureEvent::OccupantEjected { occupant, position });
            }
            c.alive = false;
            c.health = 0.0;
        }
        self.rooms[cell.room.0 as usize].compute_sections();
        self.events
            .push(StructureEvent::CellDestroyed { cell, position });
        self.events.play("cell_destroyed", position);

        // Cascades share one recomputation, owned by the original kill.
        if !proxy {
            self.rebuild_index();
            self.recalculate_mass();
            self.update_size_values();
        }
    }

    /// Tear down a coupler, reverting its wall modifications. Unless
    /// `non_destructive`, the cells it used to join are checked for
    /// disconnection, since removing a joint can split the graph.
    pub fn kill_coupler(&mut self, cid: CouplerId, non_destructive: bool) {
        let Some(coupler) = self.couplers.get(&cid) else {
            return; // double kill absorbed
        };
        let was_mounted = coupler.is_mounted();
        let (room_a, room_b, cell_a, cell_b, position) = (
            coupler.room_a,
            coupler.room_b,
            coupler.cell_a,
            coupler.cell_b,
            coupler.position,
        );
        if was_mounted {
            self.restore_walls(cid);
        }
        self.couplers.remove(&cid);

        for rid in [room_a, room_b] {
            if let Some(room) = self.rooms.get_mut(rid.0 as usize) {
                room.couplers.retain(|c| *c != cid);
                room.ghost_couplers.retain(|c| *c != cid);
            }
        }
        for cref in [cell_a, cell_b].into_iter().flatten() {
            if let Ok(room) = self.room_mut(cref.room) {
                if let Some(cell) = room.cells.get_mut(cref.cell) {
                    cell.forget_coupler(cid);
                }
            }
        }
        trace!("coupler {:?} destroyed (non_destructive={})", cid, non_destructive);

        if was_mounted && !non_destructive {
            self.events.play("coupler_break", position);
            for cref in [cell_a, cell_b].into_iter().flatten() {
                self.kill_if_disconnected(cref);
            }
        }
    }

    /// Replay recorded damage onto a freshly mounted room: cells absent
    /// from the manifest die as proxies, since any disconnection their
    /// loss caused was itself recorded, then aggregates recompute once.
    pub fn apply_manifest(
        &mut self,
        id: RoomId,
        present: &crate::design::CellManifest,
    ) -> Result<(), StructureError> {
        let cell_count = self.room(id)?.cells.len();
        let mut changed = false;
        for i in 0..cell_count {
            if !present.get(i) && self.rooms[id.0 as usize].cells[i].alive {
                self.kill_cell_inner(CellRef::new(id, i), true);
                changed = true;
            }
        }
        if changed {
            self.rebuild_index();
            self.recalculate_mass();
            self.update_size_values();
        }
        Ok(())
    }

    /// Replace the equipment mounted in a room's cells.
    pub fn set_equipment(
        &mut self,
        id: RoomId,
        equipment: Vec<crate::room::CellEquipment>,
    ) -> Result<(), StructureError> {
        self.room_mut(id)?.equipment = equipment;
        Ok(())
    }

    pub fn lock_coupler(&mut self, cid: CouplerId) {
        if let Some(c) = self.couplers.get_mut(&cid) {
            c.lock();
        }
    }

    pub fn unlock_coupler(&mut self, cid: CouplerId) {
        if let Some(c) = self.couplers.get_mut(&cid) {
            c.unlock();
        }
    }

    /// Structurally-opposite cell across a coupler.
    pub fn coupler_other_cell(
        &self,
        cid: CouplerId,
        cell: CellRef,
    ) -> Result<CellRef, StructureError> {
        let coupler = self.couplers.get(&cid).ok_or(StructureError::UnrelatedCell)?;
        let a_world = coupler
            .cell_a
            .map(|a| self.cell_world(a))
            .unwrap_or(coupler.position);
        coupler.other_cell(cell, self.cell_world(cell), a_world)
    }

    // ── Connectivity ────────────────────────────────────────────────────

    /// Breadth-first reachability from a cell over neighbor and coupler
    /// edges. Returns the whole flooded component and whether it contains
    /// a core cell.
    fn flood_from(&self, start: CellRef) -> (Vec<CellRef>, bool) {
        let mut visited: HashSet<CellRef> = HashSet::new();
        let mut queue = VecDeque::new();
        let mut component = Vec::new();
        let mut reached_core = false;
        visited.insert(start);
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            component.push(current);
            if self.rooms[current.room.0 as usize].is_core {
                reached_core = true;
            }
            let cell = &self.rooms[current.room.0 as usize].cells[current.cell];
            let mut push = |next: CellRef,
                            visited: &mut HashSet<CellRef>,
                            queue: &mut VecDeque<CellRef>| {
                if self.cell_alive(next) && visited.insert(next) {
                    queue.push_back(next);
                }
            };
            for slot in 0..4 {
                if let Some(nb) = cell.neighbors[slot] {
                    push(nb, &mut visited, &mut queue);
                }
            }
            for cid in &cell.couplers {
                if let Some(coupler) = self.couplers.get(cid) {
                    if !coupler.is_mounted() {
                        continue;
                    }
                    let other = if coupler.cell_a == Some(current) {
                        coupler.cell_b
                    } else {
                        coupler.cell_a
                    };
                    if let Some(other) = other {
                        push(other, &mut visited, &mut queue);
                    }
                }
            }
        }
        (component, reached_core)
    }

    /// True if the cell can reach the core over live edges.
    pub fn reaches_core(&self, cell: CellRef) -> bool {
        if !self.cell_alive(cell) {
            return false;
        }
        self.flood_from(cell).1
    }

    // ── Adjacency ───────────────────────────────────────────────────────

    /// Reset all neighbor/connector slots of a room's cells, severing the
    /// symmetric back-references, and re-enable the wall faces. Always
    /// run before re-running an adjacency pass so no stale one-sided link
    /// survives.
    fn clear_adjacency(&mut self, id: RoomId) {
        let cell_count = self.rooms[id.0 as usize].cells.len();
        for i in 0..cell_count {
            for dir in CARDINALS {
                let neighbor = {
                    let c = &mut self.rooms[id.0 as usize].cells[i];
                    c.connectors[dir.index()] = None;
                    if matches!(c.walls[dir.index()], WallState::Open) {
                        c.walls[dir.index()] = WallState::Full;
                    }
                    c.neighbors[dir.index()].take()
                };
                if let Some(nb) = neighbor {
                    let this = CellRef::new(id, i);
                    let back = &mut self.rooms[nb.room.0 as usize].cells[nb.cell];
                    let opp = dir.opposite().index();
                    if back.neighbors[opp] == Some(this) {
                        back.neighbors[opp] = None;
                        back.connectors[opp] = None;
                        if matches!(back.walls[opp], WallState::Open) {
                            back.walls[opp] = WallState::Full;
                        }
                    }
                }
            }
        }
    }

    /// Probe every open face of the room's cells and record symmetric
    /// neighbor links (and connector slots for same-room seams).
    /// Idempotent: occupied directions are skipped.
    fn refresh_adjacency(&mut self, id: RoomId, exclude_external: bool) {
        let mut ops: Vec<LinkOp> = Vec::new();
        {
            let room = &self.rooms[id.0 as usize];
            for (i, cell) in room.alive_cells() {
                let origin = room.cell_world(i);
                let this = CellRef::new(id, i);
                for dir in CARDINALS {
                    if cell.neighbors[dir.index()].is_some() {
                        continue; // already occupied
                    }
                    let filter = QueryFilter {
                        exclude_cell: Some(this),
                        ..Default::default()
                    };
                    let hits = self.index.query_directional(
                        origin,
                        dir.offset(),
                        ADJACENCY_RANGE,
                        filter,
                    );
                    let mut connector: Option<usize> = None;
                    let mut found: Option<(CellRef, f32)> = None;
                    for hit in hits {
                        match hit.occupant {
                            Occupant::Connector { room: cr, index } if cr == id => {
                                if connector.is_none() {
                                    connector = Some(index);
                                }
                            }
                            Occupant::Cell(other) => {
                                // Skip foreign cells before committing to a
                                // hit, so overlapping placed geometry cannot
                                // shadow a same-room neighbor at equal range.
                                if exclude_external && other.room != id {
                                    continue;
                                }
                                found = Some((other, hit.distance));
                                break;
                            }
                            _ => {}
                        }
                    }
                    let Some((other, distance)) = found else {
                        continue;
                    };
                    // Only a connector actually sitting on this seam counts.
                    let connector = connector.filter(|&j| {
                        other.room == id
                            && self.rooms[id.0 as usize].connectors[j].joins(i, other.cell)
                    });
                    ops.push(LinkOp {
                        a: this,
                        b: other,
                        dir,
                        connector,
                        shared_face: distance < CELL_SIZE * 0.6,
                    });
                }
            }
        }
        for op in ops {
            let (a, b, di, opp) = (op.a, op.b, op.dir.index(), op.dir.opposite().index());
            {
                let cell = &mut self.rooms[a.room.0 as usize].cells[a.cell];
                if cell.neighbors[di].is_some() {
                    continue; // linked by an earlier op this pass
                }
                cell.neighbors[di] = Some(b);
                cell.connectors[di] = op.connector;
                if op.shared_face {
                    cell.walls[di] = WallState::Open;
                }
            }
            let back = &mut self.rooms[b.room.0 as usize].cells[b.cell];
            back.neighbors[opp] = Some(a);
            back.connectors[opp] = op.connector;
            if op.shared_face {
                back.walls[opp] = WallState::Open;
            }
        }
    }

    // ── Walls ───────────────────────────────────────────────────────────

    /// Face of `cell` that a coupler at `position` sits against.
    fn facing_dir(&self, cell: CellRef, position: Vec2) -> Dir {
        let delta = position - self.cell_world(cell);
        if delta.x.abs() > delta.y.abs() {
            if delta.x > 0.0 {
                Dir::East
            } else {
                Dir::West
            }
        } else if delta.y > 0.0 {
            Dir::North
        } else {
            Dir::South
        }
    }

    /// Apply the coupler's wall modification on both anchor cells: split
    /// the wall in two when the coupler sits on a cell boundary, shrink it
    /// proportionally otherwise.
    fn trim_walls(&mut self, cid: CouplerId) {
        let Some(coupler) = self.couplers.get(&cid) else {
            return;
        };
        let (position, orientation) = (coupler.position, coupler.orientation);
        let anchors: Vec<CellRef> = [coupler.cell_a, coupler.cell_b]
            .into_iter()
            .flatten()
            .collect();
        let mut done: Vec<CellRef> = Vec::new();
        for anchor in anchors {
            if done.contains(&anchor) {
                continue; // hatch: both anchors are the same cell
            }
            done.push(anchor);
            let dir = self.facing_dir(anchor, position);
            let world = self.cell_world(anchor);
            let (c_along, w_along) = match orientation {
                Orientation::Vertical => (position.x, world.x),
                Orientation::Horizontal => (position.y, world.y),
            };
            let trim = trim_for_wall(c_along, w_along);
            let wall = &mut self.rooms[anchor.room.0 as usize].cells[anchor.cell].walls
                [dir.index()];
            match trim {
                WallTrim::Split => *wall = WallState::Split,
                WallTrim::Trimmed(f) => *wall = WallState::Trimmed(f),
                WallTrim::None => {}
            }
        }
    }

    /// Revert the coupler's wall modifications, unless the face is shared
    /// with a neighbor cell that still occupies it.
    fn restore_walls(&mut self, cid: CouplerId) {
        let Some(coupler) = self.couplers.get(&cid) else {
            return;
        };
        let position = coupler.position;
        let anchors: Vec<CellRef> = [coupler.cell_a, coupler.cell_b]
            .into_iter()
            .flatten()
            .collect();
        for anchor in anchors {
            let dir = self.facing_dir(anchor, position);
            let cell = &mut self.rooms[anchor.room.0 as usize].cells[anchor.cell];
            if matches!(
                cell.walls[dir.index()],
                WallState::Trimmed(_) | WallState::Split
            ) {
                cell.walls[dir.index()] = if cell.neighbors[dir.index()].is_some() {
                    WallState::Open
                } else {
                    WallState::Full
                };
            }
        }
    }

    // ── Aggregates ──────────────────────────────────────────────────────

    /// Centre height of the core room's lowest cell: the reference the
    /// height gate measures against.
    fn core_base_height(&self) -> f32 {
        let Some(core) = self.core_room else {
            return f32::NEG_INFINITY;
        };
        let room = &self.rooms[core.0 as usize];
        room.alive_cells()
            .map(|(i, _)| room.cell_world(i).y)
            .fold(f32::INFINITY, f32::min)
    }

    /// Mass is cell count × per-cell weight × the global multiplier. The
    /// centre of mass is the plain average of live cell positions.
    pub fn recalculate_mass(&mut self) {
        let count = self.total_cell_count();
        self.mass = count as f32 * self.per_cell_mass * self.mass_multiplier;

        let mut sum = Vec2::ZERO;
        for room in self.mounted_rooms() {
            for (i, _) in room.alive_cells() {
                sum = sum + room.cell_world(i);
            }
        }
        self.center_of_mass = if count > 0 {
            sum.scaled(1.0 / count as f32)
        } else {
            Vec2::ZERO
        };
        self.events.push(StructureEvent::MassChanged { mass: self.mass });
    }

    /// Scan all cells for the extreme faces relative to the physical
    /// base, for camera framing and locomotion.
    pub fn update_size_values(&mut self) {
        let base_y = self.core_base_height() - CELL_SIZE / 2.0;
        let ref_x = self
            .core_room
            .map(|c| self.rooms[c.0 as usize].position.x)
            .unwrap_or(0.0);
        let mut top = f32::NEG_INFINITY;
        let mut left = f32::INFINITY;
        let mut right = f32::NEG_INFINITY;
        let mut any = false;
        for room in self.mounted_rooms() {
            for (i, _) in room.alive_cells() {
                let w = room.cell_world(i);
                top = top.max(w.y + CELL_SIZE / 2.0);
                left = left.min(w.x - CELL_SIZE / 2.0);
                right = right.max(w.x + CELL_SIZE / 2.0);
                any = true;
            }
        }
        self.envelope = if any {
            SizeEnvelope {
                height: top - base_y,
                left_extent: ref_x - left,
                right_extent: right - ref_x,
            }
        } else {
            SizeEnvelope::default()
        };
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn alloc_coupler(&mut self, coupler: Coupler) -> CouplerId {
        let id = CouplerId(self.next_coupler);
        self.next_coupler += 1;
        self.couplers.insert(id, coupler);
        id
    }

    /// Destroy every ghost coupler the room generated.
    fn clear_ghosts(&mut self, id: RoomId) {
        let ghosts = std::mem::take(&mut self.rooms[id.0 as usize].ghost_couplers);
        for cid in ghosts {
            self.couplers.remove(&cid);
        }
    }

    /// Rebuild the spatial index from scratch: every live cell, intact
    /// connector and mounted coupler.
    fn rebuild_index(&mut self) {
        self.index.clear();
        for room in &self.rooms {
            for (i, _) in room.alive_cells() {
                self.index.insert(
                    Occupant::Cell(CellRef::new(room.id, i)),
                    room.cell_world(i),
                    Vec2::new(CELL_SIZE / 2.0, CELL_SIZE / 2.0),
                    Some(room.id),
                    room.mounted,
                );
            }
            for (j, conn) in room.connectors.iter().enumerate() {
                if conn.destroyed {
                    continue;
                }
                let half = if conn.seam_dir.is_lateral() {
                    Vec2::new(0.125, CELL_SIZE / 2.0)
                } else {
                    Vec2::new(CELL_SIZE / 2.0, 0.125)
                };
                self.index.insert(
                    Occupant::Connector { room: room.id, index: j },
                    room.position + conn.offset,
                    half,
                    Some(room.id),
                    room.mounted,
                );
            }
        }
        for (cid, coupler) in &self.couplers {
            if !coupler.is_mounted() {
                continue;
            }
            let half = match coupler.orientation {
                Orientation::Vertical => Vec2::new(COUPLER_WIDTH / 2.0, 0.125),
                Orientation::Horizontal => Vec2::new(0.125, COUPLER_WIDTH / 2.0),
            };
            self.index
                .insert(Occupant::Coupler(*cid), coupler.position, half, None, true);
        }
    }
}
