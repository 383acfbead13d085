//! Integration scenarios for the structural core.
//!
//! Exercises: placement → coupling → mounting → damage → cascade →
//! design capture, over multi-room structures, checking the invariants
//! the whole crate is built around.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tankwright_core::cell::CellRef;
use tankwright_core::grid::{Dir, Vec2, SEAM_SPACING};
use tankwright_core::room::TemplateLibrary;
use tankwright_core::tank::{Tank, PER_CELL_MASS};
use tankwright_core::{RoomId, RoomType, StructureError, TankDesign};

// ── Helpers ────────────────────────────────────────────────────────────

fn library() -> TemplateLibrary {
    TemplateLibrary::builtin()
}

/// Quad core at the origin, a column mounted to the east, a rotated
/// hall mounted above the core.
fn standard_tank() -> (Tank, RoomId, RoomId) {
    let lib = library();
    let mut tank = Tank::new("standard");
    tank.add_core_room(lib.get("quad").unwrap(), Vec2::ZERO)
        .unwrap();

    let column = tank.add_room(lib.get("column").unwrap());
    tank.snap_move(column, Vec2::new(1.0 + SEAM_SPACING, 0.0))
        .unwrap();
    tank.mount_room(column).unwrap();

    let tower = tank.add_room(lib.get("hall").unwrap());
    tank.rotate_room(tower, false).unwrap(); // cells now run upward
    tank.snap_move(tower, Vec2::new(0.0, 1.0 + SEAM_SPACING))
        .unwrap();
    tank.mount_room(tower).unwrap();

    (tank, column, tower)
}

/// Every live cell of every mounted room must reach the core.
fn assert_connectivity(tank: &Tank) {
    for room in tank.mounted_rooms() {
        for (i, _) in room.alive_cells() {
            let cell = CellRef::new(room.id, i);
            assert!(
                tank.reaches_core(cell),
                "live cell {:?} cannot reach the core",
                cell
            );
        }
    }
}

/// Mass must always equal live cell count times per-cell weight.
fn assert_mass(tank: &Tank) {
    let expected = tank.total_cell_count() as f32 * PER_CELL_MASS;
    assert!(
        (tank.mass - expected).abs() < 1e-5,
        "mass {} != {}",
        tank.mass,
        expected
    );
}

// ── Adjacency and sections ─────────────────────────────────────────────

#[test]
fn neighbor_links_are_symmetric() {
    let (tank, _, _) = standard_tank();
    for room in tank.rooms() {
        for (i, cell) in room.alive_cells() {
            let this = CellRef::new(room.id, i);
            for dir in [Dir::North, Dir::West, Dir::South, Dir::East] {
                if let Some(nb) = cell.neighbors[dir.index()] {
                    let back = tank.cell(nb).unwrap();
                    assert_eq!(
                        back.neighbors[dir.opposite().index()],
                        Some(this),
                        "asymmetric link {:?} -> {:?}",
                        this,
                        nb
                    );
                }
            }
        }
    }
}

#[test]
fn connector_splits_a_room_into_sections() {
    let lib = library();
    let mut tank = Tank::new("bar");
    tank.add_core_room(lib.get("anchor").unwrap(), Vec2::ZERO)
        .unwrap();
    let bar = tank.add_room(lib.get("bar").unwrap());
    let room = tank.room(bar).unwrap();
    assert_eq!(room.section_count(), 2);
    assert_eq!(room.cells[0].section, room.cells[1].section);
    assert_eq!(room.cells[2].section, room.cells[3].section);
    assert_ne!(room.cells[1].section, room.cells[2].section);
    // The seam cells are neighbors, with the connector recorded on both.
    assert_eq!(
        room.cells[1].neighbors[Dir::East.index()],
        Some(CellRef::new(bar, 2))
    );
    assert!(room.cells[1].connectors[Dir::East.index()].is_some());
    assert!(room.connector_between(1, 2).is_some());
}

#[test]
fn seamless_room_is_one_section() {
    let lib = library();
    let mut tank = Tank::new("quad");
    tank.add_core_room(lib.get("quad").unwrap(), Vec2::ZERO)
        .unwrap();
    let core = tank.core_room().unwrap();
    assert_eq!(tank.room(core).unwrap().section_count(), 1);
}

// ── Coupling rules ─────────────────────────────────────────────────────

#[test]
fn one_coupler_per_shared_seam_and_section_pair() {
    // Quad against quad: two facing cell pairs on one seam line, all in
    // the same sections on both sides, collapse to a single coupler.
    let lib = library();
    let mut tank = Tank::new("quads");
    tank.add_core_room(lib.get("quad").unwrap(), Vec2::ZERO)
        .unwrap();
    let other = tank.add_room(lib.get("quad").unwrap());
    tank.snap_move(other, Vec2::new(1.0 + SEAM_SPACING, 0.0))
        .unwrap();
    assert_eq!(tank.room(other).unwrap().ghost_couplers.len(), 1);
    tank.mount_room(other).unwrap();
    assert_eq!(tank.couplers().count(), 1);
    assert_connectivity(&tank);
}

#[test]
fn sectioned_room_gets_one_coupler_per_section() {
    // The bar's two sections each face the long wall of a hall; each
    // section keeps its own coupler.
    let lib = library();
    let mut tank = Tank::new("sections");
    let mut hall_wide = tankwright_core::room::RoomTemplate::new("hall5", 100.0);
    for i in 0..5 {
        hall_wide = hall_wide.with_cell(format!("w{i}"), i as f32, 0.0);
    }
    let mut lib2 = lib;
    lib2.register(hall_wide);

    tank.add_core_room(lib2.get("hall5").unwrap(), Vec2::ZERO)
        .unwrap();
    let bar = tank.add_room(lib2.get("bar").unwrap());
    tank.snap_move(bar, Vec2::new(0.0, SEAM_SPACING)).unwrap();
    let ghosts = tank.room(bar).unwrap().ghost_couplers.len();
    assert_eq!(ghosts, 2);
}

#[test]
fn too_close_placement_is_obstructed_not_coupled() {
    let lib = library();
    let mut tank = Tank::new("close");
    tank.add_core_room(lib.get("quad").unwrap(), Vec2::ZERO)
        .unwrap();
    let column = tank.add_room(lib.get("column").unwrap());
    // One cell-width away: inside the obstruction margin.
    tank.snap_move(column, Vec2::new(1.0, 0.0)).unwrap();
    assert!(tank.room(column).unwrap().obstructed);
    assert!(matches!(
        tank.mount_room(column),
        Err(StructureError::NoGhostCouplers(_))
    ));
}

#[test]
fn snap_move_is_idempotent() {
    let lib = library();
    let mut tank = Tank::new("idem");
    tank.add_core_room(lib.get("quad").unwrap(), Vec2::ZERO)
        .unwrap();
    let column = tank.add_room(lib.get("column").unwrap());
    let target = Vec2::new(1.0 + SEAM_SPACING + 0.07, 0.11);
    tank.snap_move(column, target).unwrap();
    let first_pos = tank.room(column).unwrap().position;
    let first_ghosts = tank.room(column).unwrap().ghost_couplers.len();
    tank.snap_move(column, target).unwrap();
    assert_eq!(tank.room(column).unwrap().position, first_pos);
    assert_eq!(tank.room(column).unwrap().ghost_couplers.len(), first_ghosts);
    // The snapped position sits on the movement grid.
    assert_eq!(first_pos.x % 0.25, 0.0);
    assert_eq!(first_pos.y % 0.25, 0.0);
}

#[test]
fn height_gate_only_applies_against_the_core() {
    let lib = library();
    let mut tank = Tank::new("gate");
    tank.add_core_room(lib.get("anchor").unwrap(), Vec2::ZERO)
        .unwrap();
    // Column straight at core level: fine.
    let stem = tank.add_room(lib.get("column").unwrap());
    tank.snap_move(stem, Vec2::new(SEAM_SPACING, 0.0)).unwrap();
    tank.mount_room(stem).unwrap();
    // A room hanging below core height but coupling only to the stem
    // mounts fine.
    let lower = tank.add_room(lib.get("column").unwrap());
    tank.snap_move(lower, Vec2::new(SEAM_SPACING * 2.0, -1.0))
        .unwrap();
    if tank.room(lower).unwrap().can_mount {
        tank.mount_room(lower).unwrap();
        assert_connectivity(&tank);
    }
    // But a room coupling to the core itself may not dip below its base.
    let offender = tank.add_room(lib.get("column").unwrap());
    tank.snap_move(offender, Vec2::new(-SEAM_SPACING, -1.0))
        .unwrap();
    assert!(!tank.room(offender).unwrap().can_mount);
}

// ── Destruction ────────────────────────────────────────────────────────

#[test]
fn chain_break_kills_the_hanging_segment() {
    let lib = library();
    let mut tank = Tank::new("chain");
    tank.add_core_room(lib.get("anchor").unwrap(), Vec2::ZERO)
        .unwrap();
    let hall = tank.add_room(lib.get("hall").unwrap());
    tank.snap_move(hall, Vec2::new(SEAM_SPACING, 0.0)).unwrap();
    tank.mount_room(hall).unwrap();
    assert_eq!(tank.total_cell_count(), 4);

    // Severing the middle cell strands the far end.
    tank.kill_cell(CellRef::new(hall, 1));
    assert!(tank.cell(CellRef::new(hall, 0)).unwrap().alive);
    assert!(!tank.cell(CellRef::new(hall, 2)).unwrap().alive);
    assert_eq!(tank.total_cell_count(), 2);
    assert_connectivity(&tank);
    assert_mass(&tank);
}

#[test]
fn cross_room_break_cascades_through_couplers() {
    // core ── column ── far column: killing the near column's coupled
    // cell must take the whole far room down with it.
    let lib = library();
    let mut tank = Tank::new("cascade");
    tank.add_core_room(lib.get("quad").unwrap(), Vec2::ZERO)
        .unwrap();
    let near = tank.add_room(lib.get("column").unwrap());
    tank.snap_move(near, Vec2::new(1.0 + SEAM_SPACING, 0.0))
        .unwrap();
    tank.mount_room(near).unwrap();
    let far = tank.add_room(lib.get("column").unwrap());
    tank.snap_move(far, Vec2::new(1.0 + SEAM_SPACING * 2.0, 0.0))
        .unwrap();
    tank.mount_room(far).unwrap();
    assert_eq!(tank.total_cell_count(), 8);
    assert_connectivity(&tank);

    // The near column connects to the core through both of its cells;
    // killing both orphans the far room entirely.
    tank.kill_cell(CellRef::new(near, 0));
    tank.kill_cell(CellRef::new(near, 1));
    assert_eq!(tank.total_cell_count(), 4);
    for i in 0..2 {
        assert!(!tank.cell(CellRef::new(far, i)).unwrap().alive);
    }
    assert_connectivity(&tank);
    assert_mass(&tank);
}

#[test]
fn connector_takes_two_stages_of_damage() {
    let lib = library();
    let mut tank = Tank::new("connector");
    tank.add_core_room(lib.get("anchor").unwrap(), Vec2::ZERO)
        .unwrap();
    let bar = tank.add_room(lib.get("bar").unwrap());
    tank.snap_move(bar, Vec2::new(SEAM_SPACING, 0.0)).unwrap();
    tank.mount_room(bar).unwrap();

    // b3 hangs off b2; killing b2 strands it, and damages the seam.
    tank.kill_cell(CellRef::new(bar, 2));
    {
        let room = tank.room(bar).unwrap();
        assert!(room.connectors[0].damaged);
        assert!(!room.connectors[0].destroyed);
        assert!(!room.cells[3].alive);
    }
    // Losing the other seam cell finishes the connector off.
    tank.kill_cell(CellRef::new(bar, 1));
    let room = tank.room(bar).unwrap();
    assert!(room.connectors[0].destroyed);
    assert_connectivity(&tank);
}

#[test]
fn core_cells_survive_everything() {
    let (mut tank, _, _) = standard_tank();
    let core = tank.core_room().unwrap();
    for i in 0..4 {
        tank.damage_cell(CellRef::new(core, i), 10_000.0).unwrap();
        tank.kill_cell(CellRef::new(core, i));
    }
    for i in 0..4 {
        assert!(tank.cell(CellRef::new(core, i)).unwrap().alive);
    }
    // The pool bottoms out at zero instead.
    assert_eq!(tank.core_health, 0.0);
    assert_connectivity(&tank);
}

#[test]
fn randomized_damage_never_breaks_the_invariants() {
    let (mut tank, _, _) = standard_tank();
    let mut rng = StdRng::seed_from_u64(7);
    let targets: Vec<CellRef> = tank
        .mounted_rooms()
        .flat_map(|r| r.alive_cells().map(move |(i, _)| CellRef::new(r.id, i)))
        .collect();
    for _ in 0..200 {
        let target = targets[rng.gen_range(0..targets.len())];
        let amount = rng.gen_range(0.0..80.0);
        tank.damage_cell(target, amount).unwrap();
        assert_connectivity(&tank);
        assert_mass(&tank);
    }
}

#[test]
fn double_kills_and_dead_damage_are_absorbed() {
    let (mut tank, column, _) = standard_tank();
    let cell = CellRef::new(column, 1);
    tank.kill_cell(cell);
    let count = tank.total_cell_count();
    tank.kill_cell(cell);
    assert_eq!(tank.damage_cell(cell, 50.0).unwrap(), 0.0);
    assert_eq!(tank.total_cell_count(), count);
}

// ── Dismount ───────────────────────────────────────────────────────────

#[test]
fn dismounted_room_can_be_repositioned_and_remounted() {
    let (mut tank, column, _) = standard_tank();
    tank.dismount_room(column).unwrap();
    assert_connectivity(&tank);
    tank.snap_move(column, Vec2::new(-SEAM_SPACING, 0.0)).unwrap();
    assert!(tank.room(column).unwrap().can_mount);
    tank.mount_room(column).unwrap();
    assert_connectivity(&tank);
    assert_mass(&tank);
}

// ── Design round trip ──────────────────────────────────────────────────

#[test]
fn damaged_structure_round_trips_through_its_design() {
    let (mut tank, column, tower) = standard_tank();
    tank.set_room_type(column, RoomType::Engineering).unwrap();
    tank.set_room_type(tower, RoomType::Weapons).unwrap();
    tank.kill_cell(CellRef::new(tower, 2));

    let design = tank.current_design().unwrap();
    let rebuilt = Tank::build(&design, &library()).unwrap();
    assert_eq!(rebuilt.total_cell_count(), tank.total_cell_count());
    assert_eq!(rebuilt.couplers().count(), tank.couplers().count());
    assert_connectivity(&rebuilt);
    assert_mass(&rebuilt);

    let json = design.to_json().unwrap();
    let back = TankDesign::from_json(&json).unwrap();
    assert_eq!(back, design);
}
