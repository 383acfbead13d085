//! Structural events and audio/VFX cues, buffered per tick.
//!
//! Collaborators (HUD, sound, camera framing) do not register callbacks;
//! the structure appends to these buffers during mutations and the host
//! drains them once per tick. Cues are fire-and-forget: nothing in the
//! core ever consults their outcome.

use serde::{Deserialize, Serialize};

use crate::cell::{CellRef, RoomId};
use crate::grid::Vec2;

/// Structural change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StructureEvent {
    CellDestroyed { cell: CellRef, position: Vec2 },
    RoomMounted { room: RoomId },
    RoomDismounted { room: RoomId },
    MassChanged { mass: f32 },
    /// Fraction of the core health pool remaining after core damage.
    CoreDamaged { fraction_remaining: f32 },
    /// An avatar was parented to a destroyed cell and has been detached.
    OccupantEjected { occupant: u32, position: Vec2 },
}

/// Fire-and-forget audio/particle trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub name: String,
    pub position: Vec2,
}

/// Per-tick buffers drained by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBuffer {
    events: Vec<StructureEvent>,
    cues: Vec<Cue>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: StructureEvent) {
        self.events.push(event);
    }

    pub fn play(&mut self, name: impl Into<String>, position: Vec2) {
        self.cues.push(Cue {
            name: name.into(),
            position,
        });
    }

    pub fn events(&self) -> &[StructureEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<StructureEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn drain_cues(&mut self) -> Vec<Cue> {
        std::mem::take(&mut self.cues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empties_buffer() {
        let mut buffer = EventBuffer::new();
        buffer.push(StructureEvent::MassChanged { mass: 10.0 });
        buffer.play("cell_destroyed", Vec2::ZERO);
        assert_eq!(buffer.drain_events().len(), 1);
        assert!(buffer.drain_events().is_empty());
        assert_eq!(buffer.drain_cues().len(), 1);
        assert!(buffer.drain_cues().is_empty());
    }
}
