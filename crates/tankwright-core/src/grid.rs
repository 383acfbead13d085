//! Grid and geometry utilities.
//!
//! Pure functions and small value types: snapping arbitrary positions to
//! the movement and joint grids, cardinal direction algebra, and the
//! geometry constants everything else is built on. No state.

use serde::{Deserialize, Serialize};

/// Side length of a cell in world units.
pub const CELL_SIZE: f32 = 1.0;
/// Resolution of the movement grid rooms snap to while being positioned.
pub const MOVE_STEP: f32 = 0.25;
/// Resolution of the finer grid coupler joints snap to.
pub const JOINT_STEP: f32 = 0.125;
/// Width of a coupler along its seam.
pub const COUPLER_WIDTH: f32 = 0.9;
/// Length of the directional probes used during coupler inference.
pub const PROBE_RANGE: f32 = 0.875;
/// Minimum face-to-face probe distance at which a coupler still fits.
pub const MIN_COUPLER_CLEARANCE: f32 = 0.75;
/// Distance from an anchor cell centre to the coupler centre.
pub const COUPLER_OFFSET: f32 = 0.625;
/// Centre-to-centre spacing of cells across a seam (coupler or connector).
pub const SEAM_SPACING: f32 = 1.25;
/// Length of the adjacency probe cast from a cell centre.
pub const ADJACENCY_RANGE: f32 = 1.0;

pub const EPS: f32 = 1e-4;

/// 2D position or direction in world units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance_to(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }

    pub fn scaled(&self, s: f32) -> Vec2 {
        Vec2::new(self.x * s, self.y * s)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Round a scalar to the nearest multiple of `step`.
pub fn snap(value: f32, step: f32) -> f32 {
    (value / step).round() * step
}

/// Round a point to the nearest point on a grid of the given resolution.
pub fn snap_point(p: Vec2, step: f32) -> Vec2 {
    Vec2::new(snap(p.x, step), snap(p.y, step))
}

/// Cardinal direction, in the order cells index their neighbor slots:
/// North (0), West (1), South (2), East (3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dir {
    North,
    West,
    South,
    East,
}

pub const CARDINALS: [Dir; 4] = [Dir::North, Dir::West, Dir::South, Dir::East];

impl Dir {
    pub fn index(self) -> usize {
        match self {
            Dir::North => 0,
            Dir::West => 1,
            Dir::South => 2,
            Dir::East => 3,
        }
    }

    pub fn from_index(i: usize) -> Dir {
        CARDINALS[i % 4]
    }

    pub fn opposite(self) -> Dir {
        Dir::from_index(self.index() + 2)
    }

    /// Unit vector pointing in this direction.
    pub fn offset(self) -> Vec2 {
        match self {
            Dir::North => Vec2::new(0.0, 1.0),
            Dir::West => Vec2::new(-1.0, 0.0),
            Dir::South => Vec2::new(0.0, -1.0),
            Dir::East => Vec2::new(1.0, 0.0),
        }
    }

    /// True for West/East: the probed faces sit beside each other rather
    /// than stacked.
    pub fn is_lateral(self) -> bool {
        matches!(self, Dir::West | Dir::East)
    }

    /// Unit vector perpendicular to this direction, used to offset the
    /// paired probes toward the two edges of a face.
    pub fn perp(self) -> Vec2 {
        if self.is_lateral() {
            Vec2::new(0.0, 1.0)
        } else {
            Vec2::new(1.0, 0.0)
        }
    }

    /// Direction after rotating the owning room a quarter turn clockwise.
    pub fn rotated_cw(self) -> Dir {
        match self {
            Dir::North => Dir::East,
            Dir::East => Dir::South,
            Dir::South => Dir::West,
            Dir::West => Dir::North,
        }
    }

    pub fn rotated_ccw(self) -> Dir {
        match self {
            Dir::North => Dir::West,
            Dir::West => Dir::South,
            Dir::South => Dir::East,
            Dir::East => Dir::North,
        }
    }
}

/// Rotate a local offset a quarter turn clockwise around the origin.
pub fn rotate_cw(p: Vec2) -> Vec2 {
    Vec2::new(p.y, -p.x)
}

/// Rotate a local offset a quarter turn counter-clockwise around the origin.
pub fn rotate_ccw(p: Vec2) -> Vec2 {
    Vec2::new(-p.y, p.x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snap_idempotent() {
        for raw in [-3.7, -0.13, 0.0, 0.12, 1.99, 523.61] {
            let once = snap(raw, MOVE_STEP);
            assert_eq!(once, snap(once, MOVE_STEP));
            let fine = snap(raw, JOINT_STEP);
            assert_eq!(fine, snap(fine, JOINT_STEP));
        }
    }

    #[test]
    fn test_snap_quarter_grid() {
        assert_eq!(snap(0.13, MOVE_STEP), 0.25);
        assert_eq!(snap(0.12, MOVE_STEP), 0.0);
        assert_eq!(snap(-0.88, MOVE_STEP), -1.0);
    }

    #[test]
    fn test_opposite_direction() {
        assert_eq!(Dir::North.opposite(), Dir::South);
        assert_eq!(Dir::West.opposite(), Dir::East);
        for d in CARDINALS {
            assert_eq!(d.opposite().opposite(), d);
        }
    }

    #[test]
    fn test_offsets_cancel() {
        for d in CARDINALS {
            let sum = d.offset() + d.opposite().offset();
            assert_eq!(sum, Vec2::ZERO);
        }
    }

    #[test]
    fn test_perp_is_perpendicular() {
        for d in CARDINALS {
            let o = d.offset();
            let p = d.perp();
            assert_eq!(o.x * p.x + o.y * p.y, 0.0);
        }
    }

    #[test]
    fn test_rotation_cycle() {
        for d in CARDINALS {
            assert_eq!(d.rotated_cw().rotated_cw().rotated_cw().rotated_cw(), d);
            assert_eq!(d.rotated_cw().rotated_ccw(), d);
        }
        let p = Vec2::new(1.0, 2.0);
        assert_eq!(rotate_ccw(rotate_cw(p)), p);
        assert_eq!(rotate_cw(rotate_cw(p)), Vec2::new(-1.0, -2.0));
    }
}
