//! Tankwright Headless Structure Harness
//!
//! Validates the structural core end-to-end without any engine or
//! renderer: placement sweeps, destruction cascades, design replay.
//! Runs entirely in-process.
//!
//! Usage:
//!   cargo run -p tankwright-simtest
//!   cargo run -p tankwright-simtest -- --verbose

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tankwright_core::cell::CellRef;
use tankwright_core::grid::{Vec2, SEAM_SPACING};
use tankwright_core::room::TemplateLibrary;
use tankwright_core::tank::{Tank, PER_CELL_MASS};
use tankwright_core::{RoomId, TankDesign};

// ── Design fixture (same JSON a client would ship) ──────────────────────
const STANDARD_DESIGN_JSON: &str = include_str!("../data/standard_design.json");

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn check(name: &str, passed: bool, detail: impl Into<String>) -> TestResult {
    TestResult {
        name: name.into(),
        passed,
        detail: detail.into(),
    }
}

fn main() {
    env_logger::init();
    let verbose = std::env::args().any(|a| a == "--verbose");
    log::info!("harness starting (verbose={verbose})");
    println!("=== Tankwright Structure Harness ===\n");

    let mut results = Vec::new();

    // 1. Design fixture replay
    results.extend(validate_design_fixture(verbose));

    // 2. Placement sweep around a core
    results.extend(validate_placement_sweep(verbose));

    // 3. Randomized destruction
    results.extend(validate_destruction(verbose));

    // 4. Capture / replay / binary round trip
    results.extend(validate_persistence(verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── 1. Design fixture ───────────────────────────────────────────────────

fn validate_design_fixture(verbose: bool) -> Vec<TestResult> {
    println!("--- Design Fixture ---");
    let mut results = Vec::new();
    let lib = TemplateLibrary::builtin();

    let design: TankDesign = match serde_json::from_str(STANDARD_DESIGN_JSON) {
        Ok(d) => d,
        Err(e) => {
            results.push(check("fixture_parse", false, format!("{e}")));
            return results;
        }
    };
    results.push(check(
        "fixture_parse",
        design.steps.len() == 2,
        format!("{} build steps", design.steps.len()),
    ));

    let tank = match Tank::build(&design, &lib) {
        Ok(t) => t,
        Err(e) => {
            results.push(check("fixture_build", false, format!("{e}")));
            return results;
        }
    };
    // 4 core + 2 column + 3 hall cells.
    results.push(check(
        "fixture_build",
        tank.total_cell_count() == 9,
        format!("{} cells mounted", tank.total_cell_count()),
    ));
    // Two seam couplers plus the column hatch.
    let couplers = tank.couplers().count();
    results.push(check(
        "fixture_couplers",
        couplers == 3,
        format!("{couplers} couplers"),
    ));
    let hatches = tank.couplers().filter(|(_, c)| c.is_hatch()).count();
    results.push(check(
        "fixture_hatch",
        hatches == 1,
        format!("{hatches} hatches"),
    ));
    results.push(check(
        "fixture_connectivity",
        fully_connected(&tank),
        "all live cells reach the core",
    ));

    if verbose {
        println!(
            "  built {:?}: {} rooms, mass {}",
            tank.name,
            tank.mounted_rooms().count(),
            tank.mass
        );
    }
    results
}

// ── 2. Placement sweep ──────────────────────────────────────────────────

fn validate_placement_sweep(_verbose: bool) -> Vec<TestResult> {
    println!("--- Placement Sweep ---");
    let mut results = Vec::new();
    let lib = TemplateLibrary::builtin();

    let mut tank = Tank::new("sweep");
    tank.add_core_room(lib.get("quad").unwrap(), Vec2::ZERO)
        .unwrap();
    let column = tank.add_room(lib.get("column").unwrap());

    let mut mountable = 0usize;
    let mut obstructed = 0usize;
    let mut floating = 0usize;
    let mut consistent = true;
    for xi in -24..=24 {
        for yi in -24..=24 {
            let target = Vec2::new(xi as f32 * 0.25, yi as f32 * 0.25);
            if tank.snap_move(column, target).is_err() {
                consistent = false;
                continue;
            }
            let room = tank.room(column).unwrap();
            if room.obstructed {
                obstructed += 1;
                // Obstructed placements never produce couplers.
                consistent &= room.ghost_couplers.is_empty() && !room.can_mount;
            } else if room.can_mount {
                mountable += 1;
                consistent &= !room.ghost_couplers.is_empty();
            } else {
                floating += 1;
                consistent &= room.ghost_couplers.is_empty();
            }
        }
    }
    results.push(check(
        "sweep_consistent",
        consistent,
        "flags and ghost lists always agree",
    ));
    results.push(check(
        "sweep_finds_mounts",
        mountable > 0 && obstructed > 0 && floating > 0,
        format!("{mountable} mountable / {obstructed} obstructed / {floating} floating"),
    ));

    // Whatever the sweep left behind, a known-good seam must still work.
    tank.snap_move(column, Vec2::new(1.0 + SEAM_SPACING, 0.0))
        .unwrap();
    let ok = tank.mount_room(column).is_ok();
    results.push(check("sweep_then_mount", ok, "seam placement mounts"));
    results
}

// ── 3. Randomized destruction ───────────────────────────────────────────

fn validate_destruction(verbose: bool) -> Vec<TestResult> {
    println!("--- Randomized Destruction ---");
    let mut results = Vec::new();
    let lib = TemplateLibrary::builtin();
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);

    let mut invariants_held = true;
    let mut total_kills = 0usize;
    for round in 0..20 {
        let mut tank = chain_tank(&lib, 4 + (round % 3));
        let rooms: Vec<RoomId> = tank
            .mounted_rooms()
            .filter(|r| !r.is_core)
            .map(|r| r.id)
            .collect();
        for _ in 0..40 {
            let room = rooms[rng.gen_range(0..rooms.len())];
            let cell_count = tank.room(room).unwrap().cells.len();
            let cell = CellRef::new(room, rng.gen_range(0..cell_count));
            let amount = rng.gen_range(10.0..120.0);
            if tank.damage_cell(cell, amount).is_err() {
                invariants_held = false;
            }
            total_kills += 1;
            if !fully_connected(&tank) {
                invariants_held = false;
            }
            let expected = tank.total_cell_count() as f32 * PER_CELL_MASS;
            if (tank.mass - expected).abs() > 1e-4 {
                invariants_held = false;
            }
        }
    }
    results.push(check(
        "destruction_invariants",
        invariants_held,
        format!("connectivity and mass held over {total_kills} hits"),
    ));

    // Deterministic cascade: cutting a chain at the root removes
    // everything beyond the cut.
    let mut tank = chain_tank(&lib, 5);
    let first = tank
        .mounted_rooms()
        .find(|r| !r.is_core)
        .map(|r| r.id)
        .unwrap();
    tank.kill_cell(CellRef::new(first, 0));
    let survivors = tank.total_cell_count();
    results.push(check(
        "destruction_cascade",
        survivors == 1,
        format!("{survivors} cells left after root cut"),
    ));

    if verbose {
        println!("  cascade left mass {}", tank.mass);
    }
    results
}

// ── 4. Persistence ──────────────────────────────────────────────────────

fn validate_persistence(_verbose: bool) -> Vec<TestResult> {
    println!("--- Persistence ---");
    let mut results = Vec::new();
    let lib = TemplateLibrary::builtin();

    let mut tank = match TankDesign::from_json(STANDARD_DESIGN_JSON)
        .and_then(|d| Tank::build(&d, &lib))
    {
        Ok(t) => t,
        Err(e) => {
            results.push(check("persist_setup", false, format!("{e}")));
            return results;
        }
    };
    // Take some battle damage, then capture.
    let victim = tank
        .mounted_rooms()
        .find(|r| !r.is_core)
        .map(|r| CellRef::new(r.id, 1))
        .unwrap();
    tank.kill_cell(victim);

    let captured = match tank.current_design() {
        Ok(d) => d,
        Err(e) => {
            results.push(check("persist_capture", false, format!("{e}")));
            return results;
        }
    };
    let rebuilt = match Tank::build(&captured, &lib) {
        Ok(t) => t,
        Err(e) => {
            results.push(check("persist_replay", false, format!("{e}")));
            return results;
        }
    };
    results.push(check(
        "persist_replay",
        rebuilt.total_cell_count() == tank.total_cell_count(),
        format!(
            "{} cells rebuilt of {}",
            rebuilt.total_cell_count(),
            tank.total_cell_count()
        ),
    ));

    // Binary file round trip through a scratch path.
    let path = std::env::temp_dir().join("tankwright-simtest.design");
    let file_ok = captured
        .save(&path)
        .and_then(|_| TankDesign::load(&path))
        .map(|loaded| loaded == captured)
        .unwrap_or(false);
    std::fs::remove_file(&path).ok();
    results.push(check("persist_file", file_ok, "binary save/load round trip"));
    results
}

// ── Shared builders ─────────────────────────────────────────────────────

/// Anchor core with `halls` three-cell halls chained eastward.
fn chain_tank(lib: &TemplateLibrary, halls: usize) -> Tank {
    let mut tank = Tank::new("chain");
    tank.add_core_room(lib.get("anchor").unwrap(), Vec2::ZERO)
        .unwrap();
    let mut x = SEAM_SPACING;
    for _ in 0..halls {
        let hall = tank.add_room(lib.get("hall").unwrap());
        tank.snap_move(hall, Vec2::new(x, 0.0)).unwrap();
        tank.mount_room(hall).unwrap();
        x += 2.0 + SEAM_SPACING;
    }
    tank
}

fn fully_connected(tank: &Tank) -> bool {
    tank.mounted_rooms().all(|room| {
        room.alive_cells()
            .all(|(i, _)| tank.reaches_core(CellRef::new(room.id, i)))
    })
}
