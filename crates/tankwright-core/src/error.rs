//! Error types for structural operations.
//!
//! Invalid structural operations are programming-contract violations:
//! they signal an error and leave state untouched. Double-kills and
//! placement obstructions are deliberately *not* errors — the former are
//! absorbed by state guards, the latter are recoverable conditions.

use crate::cell::{CellRef, RoomId};

/// Contract violation on a structural operation. The operation is a no-op
/// beyond the error itself.
#[derive(Debug, Clone, PartialEq)]
pub enum StructureError {
    /// Tried to move a room that is already mounted.
    MoveWhileMounted(RoomId),
    /// Tried to rotate a room that is already mounted.
    RotateWhileMounted(RoomId),
    /// Tried to mount a room that is already mounted.
    AlreadyMounted(RoomId),
    /// Tried to mount a room with no ghost couplers.
    NoGhostCouplers(RoomId),
    /// Mount rejected: a cell of the room sits below the core's base.
    BelowCoreBase(RoomId),
    /// Tried to dismount a room that is not mounted.
    NotMounted(RoomId),
    /// The core room cannot be dismounted.
    DismountCore,
    /// A structure may designate at most one core room.
    CoreAlreadySet(RoomId),
    /// Queried a coupler or connector with a cell on neither side.
    UnrelatedCell,
    /// Queried a coupler with a room on neither side.
    UnrelatedRoom(RoomId),
    /// Room id not present in the structure.
    UnknownRoom(RoomId),
    /// Cell reference does not name a live cell.
    UnknownCell(CellRef),
    /// No core room has been designated yet.
    NoCoreRoom,
}

impl std::fmt::Display for StructureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StructureError::MoveWhileMounted(id) => {
                write!(f, "Tried to move room #{} while it is mounted", id.0)
            }
            StructureError::RotateWhileMounted(id) => {
                write!(f, "Tried to rotate room #{} while it is mounted", id.0)
            }
            StructureError::AlreadyMounted(id) => {
                write!(f, "Room #{} is already mounted", id.0)
            }
            StructureError::NoGhostCouplers(id) => {
                write!(f, "Room #{} has no ghost couplers to mount with", id.0)
            }
            StructureError::BelowCoreBase(id) => {
                write!(f, "Room #{} extends below the core's base height", id.0)
            }
            StructureError::NotMounted(id) => {
                write!(f, "Room #{} is not mounted", id.0)
            }
            StructureError::DismountCore => write!(f, "The core room cannot be dismounted"),
            StructureError::CoreAlreadySet(id) => {
                write!(f, "A core room is already designated (#{})", id.0)
            }
            StructureError::UnrelatedCell => {
                write!(f, "Cell is not related to this joint")
            }
            StructureError::UnrelatedRoom(id) => {
                write!(f, "Room #{} is not connected to this coupler", id.0)
            }
            StructureError::UnknownRoom(id) => write!(f, "No room #{} in structure", id.0),
            StructureError::UnknownCell(c) => {
                write!(f, "No live cell {} in room #{}", c.cell, c.room.0)
            }
            StructureError::NoCoreRoom => write!(f, "Structure has no core room"),
        }
    }
}

impl std::error::Error for StructureError {}
