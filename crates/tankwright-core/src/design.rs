//! Design persistence: a compact, versioned description of a built
//! structure that can be replayed onto a fresh tank.
//!
//! A design records the build as a sequence of steps against template
//! names, not as a dump of live state: replaying the steps through the
//! normal placement operations reproduces the couplers, adjacency and
//! walls without serializing any of them. Battle damage is carried by
//! each step's cell manifest.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::StructureError;
use crate::grid::{Dir, Vec2};
use crate::room::{CellEquipment, RoomType, TemplateLibrary};
use crate::tank::Tank;

/// Bump when the design layout changes incompatibly.
pub const DESIGN_VERSION: u32 = 1;

/// Bitset over a room's cell arena. A set bit means the cell is present;
/// cleared bits are cells destroyed since the room was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CellManifest {
    words: Vec<u64>,
}

impl CellManifest {
    pub fn with_len(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
        }
    }

    /// Manifest with the first `len` bits set.
    pub fn all_set(len: usize) -> Self {
        let mut m = Self::with_len(len);
        for i in 0..len {
            m.set(i);
        }
        m
    }

    pub fn set(&mut self, index: usize) {
        let word = index / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (index % 64);
    }

    pub fn clear(&mut self, index: usize) {
        if let Some(w) = self.words.get_mut(index / 64) {
            *w &= !(1 << (index % 64));
        }
    }

    pub fn get(&self, index: usize) -> bool {
        self.words
            .get(index / 64)
            .map(|w| w & (1 << (index % 64)) != 0)
            .unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// A hatch recorded against a named cell face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HatchPlacement {
    pub cell: String,
    pub dir: Dir,
}

/// One room of the build sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStep {
    /// Template name in the library the design is replayed against.
    pub template: String,
    pub room_type: RoomType,
    /// Placement target, in the structure's frame.
    pub spawn: Vec2,
    /// Quarter turns clockwise applied before mounting.
    pub rotate: u8,
    pub manifest: CellManifest,
    pub equipment: Vec<CellEquipment>,
    pub hatches: Vec<HatchPlacement>,
}

/// Complete recorded design of a structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankDesign {
    pub name: String,
    pub core_template: String,
    pub core_position: Vec2,
    pub core_equipment: Vec<CellEquipment>,
    pub steps: Vec<BuildStep>,
}

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum DesignError {
    Io(std::io::Error),
    Encode(bincode::Error),
    Json(serde_json::Error),
    WrongVersion { found: u32, expected: u32 },
    UnknownTemplate(String),
    Structure(StructureError),
}

impl From<std::io::Error> for DesignError {
    fn from(e: std::io::Error) -> Self {
        DesignError::Io(e)
    }
}

impl From<bincode::Error> for DesignError {
    fn from(e: bincode::Error) -> Self {
        DesignError::Encode(e)
    }
}

impl From<serde_json::Error> for DesignError {
    fn from(e: serde_json::Error) -> Self {
        DesignError::Json(e)
    }
}

impl From<StructureError> for DesignError {
    fn from(e: StructureError) -> Self {
        DesignError::Structure(e)
    }
}

impl std::fmt::Display for DesignError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DesignError::Io(e) => write!(f, "Design file io error: {e}"),
            DesignError::Encode(e) => write!(f, "Design encode error: {e}"),
            DesignError::Json(e) => write!(f, "Design json error: {e}"),
            DesignError::WrongVersion { found, expected } => {
                write!(f, "Design version {found}, expected {expected}")
            }
            DesignError::UnknownTemplate(name) => {
                write!(f, "Design references unknown template {name:?}")
            }
            DesignError::Structure(e) => write!(f, "Design replay failed: {e}"),
        }
    }
}

impl std::error::Error for DesignError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DesignError::Io(e) => Some(e),
            DesignError::Encode(e) => Some(e),
            DesignError::Json(e) => Some(e),
            DesignError::Structure(e) => Some(e),
            _ => None,
        }
    }
}

// ── Serialization ───────────────────────────────────────────────────────

impl TankDesign {
    pub fn to_json(&self) -> Result<String, DesignError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, DesignError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Write a versioned binary design file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DesignError> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        bincode::serialize_into(&mut writer, &DESIGN_VERSION)?;
        bincode::serialize_into(&mut writer, self)?;
        info!("design {:?} saved to {:?}", self.name, path.as_ref());
        Ok(())
    }

    /// Read a binary design file, rejecting mismatched versions.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DesignError> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);
        let found: u32 = bincode::deserialize_from(&mut reader)?;
        if found != DESIGN_VERSION {
            return Err(DesignError::WrongVersion {
                found,
                expected: DESIGN_VERSION,
            });
        }
        let design: TankDesign = bincode::deserialize_from(&mut reader)?;
        info!("design {:?} loaded from {:?}", design.name, path.as_ref());
        Ok(design)
    }
}

// ── Replay and capture ──────────────────────────────────────────────────

impl Tank {
    /// Build a structure from a recorded design by replaying each step
    /// through the normal placement operations.
    pub fn build(design: &TankDesign, library: &TemplateLibrary) -> Result<Tank, DesignError> {
        let mut tank = Tank::new(design.name.clone());
        let core_template = library
            .get(&design.core_template)
            .ok_or_else(|| DesignError::UnknownTemplate(design.core_template.clone()))?;
        let core = tank.add_core_room(core_template, design.core_position)?;
        tank.set_equipment(core, design.core_equipment.clone())?;

        for step in &design.steps {
            let template = library
                .get(&step.template)
                .ok_or_else(|| DesignError::UnknownTemplate(step.template.clone()))?;
            let id = tank.add_room(template);
            tank.set_room_type(id, step.room_type)?;
            for _ in 0..(step.rotate % 4) {
                tank.rotate_room(id, true)?;
            }
            for hatch in &step.hatches {
                tank.request_hatch(id, &hatch.cell, hatch.dir)?;
            }
            tank.snap_move(id, step.spawn)?;
            tank.mount_room(id)?;
            tank.apply_manifest(id, &step.manifest)?;
            tank.set_equipment(id, step.equipment.clone())?;
        }
        Ok(tank)
    }

    /// Capture the current structure as a replayable design: mounted
    /// rooms in mount order, with manifests reflecting battle damage.
    pub fn current_design(&self) -> Result<TankDesign, StructureError> {
        let core = self.core_room().ok_or(StructureError::NoCoreRoom)?;
        let core_room = self.room(core)?;
        let mut steps = Vec::new();

        for room in self.mounted_rooms() {
            if room.is_core {
                continue;
            }
            let mut manifest = CellManifest::with_len(room.cells.len());
            for (i, _) in room.alive_cells() {
                manifest.set(i);
            }
            let mut hatches = Vec::new();
            for cid in &room.couplers {
                let Some(coupler) = self.coupler(*cid) else {
                    continue;
                };
                if !coupler.is_hatch() {
                    continue;
                }
                let Some(anchor) = coupler.cell_a else {
                    continue;
                };
                let world = self.cell_world(anchor);
                let delta = coupler.position - world;
                let dir = if delta.x.abs() > delta.y.abs() {
                    if delta.x > 0.0 {
                        Dir::East
                    } else {
                        Dir::West
                    }
                } else if delta.y > 0.0 {
                    Dir::North
                } else {
                    Dir::South
                };
                hatches.push(HatchPlacement {
                    cell: room.cells[anchor.cell].name.clone(),
                    dir,
                });
            }
            steps.push(BuildStep {
                template: room.template.clone(),
                room_type: room.room_type,
                spawn: room.position,
                rotate: room.rotation_index % 4,
                manifest,
                equipment: room.equipment.clone(),
                hatches,
            });
        }

        Ok(TankDesign {
            name: self.name.clone(),
            core_template: core_room.template.clone(),
            core_position: core_room.position,
            core_equipment: core_room.equipment.clone(),
            steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellRef;
    use crate::grid::SEAM_SPACING;

    fn sample_design() -> TankDesign {
        TankDesign {
            name: "sample".into(),
            core_template: "quad".into(),
            core_position: Vec2::ZERO,
            core_equipment: Vec::new(),
            steps: vec![BuildStep {
                template: "column".into(),
                room_type: RoomType::Engineering,
                spawn: Vec2::new(1.0 + SEAM_SPACING, 0.0),
                rotate: 0,
                manifest: CellManifest::all_set(2),
                equipment: vec![CellEquipment {
                    cell: "v0".into(),
                    item: "pump".into(),
                    flipped: false,
                }],
                hatches: vec![HatchPlacement {
                    cell: "v1".into(),
                    dir: Dir::North,
                }],
            }],
        }
    }

    #[test]
    fn manifest_bits() {
        let mut m = CellManifest::with_len(70);
        assert_eq!(m.count(), 0);
        m.set(0);
        m.set(69);
        assert!(m.get(0));
        assert!(m.get(69));
        assert!(!m.get(1));
        assert_eq!(m.count(), 2);
        m.clear(69);
        assert!(!m.get(69));
        // Out-of-range reads are simply absent.
        assert!(!m.get(500));
    }

    #[test]
    fn replay_builds_the_structure() {
        let lib = TemplateLibrary::builtin();
        let tank = Tank::build(&sample_design(), &lib).unwrap();
        assert_eq!(tank.total_cell_count(), 6);
        assert_eq!(tank.couplers().count(), 2); // seam coupler + hatch
        let column = tank.mounted_rooms().find(|r| !r.is_core).unwrap();
        assert_eq!(column.room_type, RoomType::Engineering);
        assert_eq!(column.equipment.len(), 1);
    }

    #[test]
    fn unknown_template_is_rejected() {
        let lib = TemplateLibrary::builtin();
        let mut design = sample_design();
        design.steps[0].template = "nonesuch".into();
        assert!(matches!(
            Tank::build(&design, &lib),
            Err(DesignError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn capture_round_trips_through_replay() {
        let lib = TemplateLibrary::builtin();
        let tank = Tank::build(&sample_design(), &lib).unwrap();
        let captured = tank.current_design().unwrap();
        assert_eq!(captured.steps.len(), 1);
        assert_eq!(captured.steps[0].template, "column");
        assert_eq!(captured.steps[0].hatches.len(), 1);

        let rebuilt = Tank::build(&captured, &lib).unwrap();
        assert_eq!(rebuilt.total_cell_count(), tank.total_cell_count());
        assert_eq!(rebuilt.couplers().count(), tank.couplers().count());
    }

    #[test]
    fn manifest_carries_battle_damage() {
        let lib = TemplateLibrary::builtin();
        let mut tank = Tank::build(&sample_design(), &lib).unwrap();
        let column = tank
            .mounted_rooms()
            .find(|r| !r.is_core)
            .map(|r| r.id)
            .unwrap();
        tank.kill_cell(CellRef::new(column, 1));
        let captured = tank.current_design().unwrap();
        assert_eq!(captured.steps[0].manifest.count(), 1);

        let rebuilt = Tank::build(&captured, &lib).unwrap();
        assert_eq!(rebuilt.total_cell_count(), tank.total_cell_count());
        assert!(!rebuilt
            .cell(CellRef::new(
                rebuilt.mounted_rooms().find(|r| !r.is_core).unwrap().id,
                1
            ))
            .unwrap()
            .alive);
    }

    #[test]
    fn json_round_trip() {
        let design = sample_design();
        let text = design.to_json().unwrap();
        let back = TankDesign::from_json(&text).unwrap();
        assert_eq!(back, design);
    }

    #[test]
    fn binary_file_round_trip_and_version_check() {
        let dir = std::env::temp_dir().join("tankwright-design-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sample.design");
        let design = sample_design();
        design.save(&path).unwrap();
        let back = TankDesign::load(&path).unwrap();
        assert_eq!(back, design);

        // Corrupt the version header.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] = 99;
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            TankDesign::load(&path),
            Err(DesignError::WrongVersion { found: 99, .. })
        ));
        std::fs::remove_dir_all(&dir).ok();
    }
}
