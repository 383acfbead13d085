//! Structural simulation core for Tankwright.
//!
//! This crate models a player-built vehicle as a connectivity graph of
//! rooms, cells, connectors and couplers anchored to a single core. It
//! is independent of any engine or renderer: geometry is plain 2D data,
//! side effects surface as drainable event buffers, and every operation
//! is an ordinary method call a host can drive from anywhere.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`cell`] | Cells, ids, wall states, per-cell health |
//! | [`connector`] | Intra-room seam markers with two-stage damage |
//! | [`coupler`] | Inter-room joints: ghost/mounted lifecycle, locks, wall trims |
//! | [`design`] | Versioned replayable designs (binary and JSON) |
//! | [`error`] | Contract-violation errors for structural operations |
//! | [`events`] | Drainable structure events and presentation cues |
//! | [`grid`] | 2D vectors, snapping, cardinal directions, tuning constants |
//! | [`room`] | Rooms, templates, section flood fill, room types |
//! | [`spatial`] | Hash-grid spatial index and probe/box queries |
//! | [`tank`] | The structure: placement, mounting, destruction cascade |

pub mod cell;
pub mod connector;
pub mod coupler;
pub mod design;
pub mod error;
pub mod events;
pub mod grid;
pub mod room;
pub mod spatial;
pub mod tank;

pub use cell::{Cell, CellRef, CouplerId, RoomId, WallState};
pub use coupler::{Coupler, CouplerState, Orientation};
pub use design::{BuildStep, CellManifest, DesignError, TankDesign, DESIGN_VERSION};
pub use error::StructureError;
pub use events::{Cue, EventBuffer, StructureEvent};
pub use grid::{Dir, Vec2};
pub use room::{Room, RoomTemplate, RoomType, TemplateLibrary};
pub use tank::{SizeEnvelope, Tank};
