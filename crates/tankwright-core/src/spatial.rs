//! Spatial queries against currently-placed structure parts.
//!
//! The structural core only consumes the [`SpatialQuery`] contract:
//! short-range directional probes and box overlap tests whose hits expose
//! cell/connector/coupler handles. [`GridIndex`] is the bucketed
//! hash-grid implementation the structure maintains itself, rebuilt
//! wholesale whenever geometry changes — mutations are rare relative to
//! queries, so correctness wins over incremental bookkeeping.

use std::collections::HashMap;

use crate::cell::{CellRef, CouplerId, RoomId};
use crate::grid::Vec2;

/// Handle exposed by a spatial hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occupant {
    Cell(CellRef),
    Connector { room: RoomId, index: usize },
    Coupler(CouplerId),
}

/// One intersection result.
#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub occupant: Occupant,
    /// Distance from the probe origin to the struck face.
    pub distance: f32,
    pub point: Vec2,
}

/// Restricts what a query may strike.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryFilter {
    /// Skip everything belonging to this room.
    pub exclude_room: Option<RoomId>,
    /// Skip this one cell (typically the probe's own origin cell).
    pub exclude_cell: Option<CellRef>,
    /// Only strike cells, not connectors or couplers.
    pub cells_only: bool,
    /// Only strike parts of rooms that are already placed.
    pub placed_only: bool,
}

/// Point/box/ray intersection queries against placed structure parts.
pub trait SpatialQuery {
    fn query_directional(
        &self,
        origin: Vec2,
        dir: Vec2,
        max_distance: f32,
        filter: QueryFilter,
    ) -> Vec<Hit>;

    fn query_box(&self, center: Vec2, half_extents: Vec2, filter: QueryFilter) -> Vec<Hit>;
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    occupant: Occupant,
    center: Vec2,
    half: Vec2,
    room: Option<RoomId>,
    placed: bool,
}

impl Entry {
    fn passes(&self, filter: &QueryFilter) -> bool {
        if let Some(excluded) = filter.exclude_room {
            if self.room == Some(excluded) {
                return false;
            }
        }
        if let Some(excluded) = filter.exclude_cell {
            if self.occupant == Occupant::Cell(excluded) {
                return false;
            }
        }
        if filter.cells_only && !matches!(self.occupant, Occupant::Cell(_)) {
            return false;
        }
        if filter.placed_only && !self.placed {
            return false;
        }
        true
    }
}

/// Bucketed hash grid over axis-aligned part footprints.
#[derive(Debug, Default)]
pub struct GridIndex {
    buckets: HashMap<(i32, i32), Vec<Entry>>,
}

const BUCKET_SIZE: f32 = 2.0;

impl GridIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    fn bucket_of(v: f32) -> i32 {
        (v / BUCKET_SIZE).floor() as i32
    }

    /// Insert a part footprint. The entry lands in every bucket its
    /// bounding box overlaps.
    pub fn insert(
        &mut self,
        occupant: Occupant,
        center: Vec2,
        half: Vec2,
        room: Option<RoomId>,
        placed: bool,
    ) {
        let entry = Entry {
            occupant,
            center,
            half,
            room,
            placed,
        };
        let min_x = Self::bucket_of(center.x - half.x);
        let max_x = Self::bucket_of(center.x + half.x);
        let min_y = Self::bucket_of(center.y - half.y);
        let max_y = Self::bucket_of(center.y + half.y);
        for bx in min_x..=max_x {
            for by in min_y..=max_y {
                self.buckets.entry((bx, by)).or_default().push(entry);
            }
        }
    }

    fn candidates(&self, min: Vec2, max: Vec2) -> Vec<Entry> {
        let mut seen: Vec<Occupant> = Vec::new();
        let mut out = Vec::new();
        for bx in Self::bucket_of(min.x)..=Self::bucket_of(max.x) {
            for by in Self::bucket_of(min.y)..=Self::bucket_of(max.y) {
                if let Some(entries) = self.buckets.get(&(bx, by)) {
                    for entry in entries {
                        if !seen.contains(&entry.occupant) {
                            seen.push(entry.occupant);
                            out.push(*entry);
                        }
                    }
                }
            }
        }
        out
    }
}

/// Slab-method ray/AABB intersection. Returns the entry distance, or
/// `None` when the ray misses or starts inside the box.
fn ray_aabb(origin: Vec2, dir: Vec2, center: Vec2, half: Vec2) -> Option<f32> {
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;
    for (o, d, c, h) in [
        (origin.x, dir.x, center.x, half.x),
        (origin.y, dir.y, center.y, half.y),
    ] {
        if d.abs() < 1e-6 {
            if (o - c).abs() > h {
                return None;
            }
        } else {
            let t1 = (c - h - o) / d;
            let t2 = (c + h - o) / d;
            let (near, far) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
            t_min = t_min.max(near);
            t_max = t_max.min(far);
        }
    }
    if t_max < t_min || t_min < 0.0 {
        return None; // miss, or origin inside/behind
    }
    Some(t_min)
}

impl SpatialQuery for GridIndex {
    fn query_directional(
        &self,
        origin: Vec2,
        dir: Vec2,
        max_distance: f32,
        filter: QueryFilter,
    ) -> Vec<Hit> {
        let end = origin + dir.scaled(max_distance);
        let min = Vec2::new(origin.x.min(end.x) - 1.0, origin.y.min(end.y) - 1.0);
        let max = Vec2::new(origin.x.max(end.x) + 1.0, origin.y.max(end.y) + 1.0);

        let mut hits = Vec::new();
        for entry in self.candidates(min, max) {
            if !entry.passes(&filter) {
                continue;
            }
            if let Some(t) = ray_aabb(origin, dir, entry.center, entry.half) {
                if t <= max_distance {
                    hits.push(Hit {
                        occupant: entry.occupant,
                        distance: t,
                        point: origin + dir.scaled(t),
                    });
                }
            }
        }
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits
    }

    fn query_box(&self, center: Vec2, half_extents: Vec2, filter: QueryFilter) -> Vec<Hit> {
        let min = center - half_extents;
        let max = center + half_extents;
        let mut hits = Vec::new();
        for entry in self.candidates(min, max) {
            if !entry.passes(&filter) {
                continue;
            }
            // Strict overlap: touching edges do not count.
            let dx = (entry.center.x - center.x).abs();
            let dy = (entry.center.y - center.y).abs();
            if dx < entry.half.x + half_extents.x - crate::grid::EPS
                && dy < entry.half.y + half_extents.y - crate::grid::EPS
            {
                hits.push(Hit {
                    occupant: entry.occupant,
                    distance: entry.center.distance_to(center),
                    point: entry.center,
                });
            }
        }
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(room: u32, index: usize) -> Occupant {
        Occupant::Cell(CellRef::new(RoomId(room), index))
    }

    fn half_cell() -> Vec2 {
        Vec2::new(0.5, 0.5)
    }

    #[test]
    fn test_ray_hits_adjacent_cell_face() {
        let mut index = GridIndex::new();
        index.insert(cell(0, 0), Vec2::new(0.0, 0.0), half_cell(), Some(RoomId(0)), true);
        index.insert(cell(1, 0), Vec2::new(1.25, 0.0), half_cell(), Some(RoomId(1)), true);

        let filter = QueryFilter {
            exclude_cell: Some(CellRef::new(RoomId(0), 0)),
            ..Default::default()
        };
        let hits = index.query_directional(Vec2::ZERO, Vec2::new(1.0, 0.0), 1.0, filter);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].distance - 0.75).abs() < 1e-5);
        assert_eq!(hits[0].occupant, cell(1, 0));
    }

    #[test]
    fn test_ray_misses_out_of_range() {
        let mut index = GridIndex::new();
        index.insert(cell(1, 0), Vec2::new(3.0, 0.0), half_cell(), Some(RoomId(1)), true);
        let hits =
            index.query_directional(Vec2::ZERO, Vec2::new(1.0, 0.0), 1.0, QueryFilter::default());
        assert!(hits.is_empty());
    }

    #[test]
    fn test_ray_skips_origin_cell() {
        let mut index = GridIndex::new();
        index.insert(cell(0, 0), Vec2::ZERO, half_cell(), Some(RoomId(0)), true);
        // Origin is inside the only entry; slab test rejects it even
        // without the exclude filter.
        let hits =
            index.query_directional(Vec2::ZERO, Vec2::new(0.0, 1.0), 1.0, QueryFilter::default());
        assert!(hits.is_empty());
    }

    #[test]
    fn test_hits_sorted_by_distance() {
        let mut index = GridIndex::new();
        index.insert(cell(1, 1), Vec2::new(2.5, 0.0), half_cell(), Some(RoomId(1)), true);
        index.insert(cell(1, 0), Vec2::new(1.25, 0.0), half_cell(), Some(RoomId(1)), true);
        let hits =
            index.query_directional(Vec2::ZERO, Vec2::new(1.0, 0.0), 3.0, QueryFilter::default());
        assert_eq!(hits.len(), 2);
        assert!(hits[0].distance < hits[1].distance);
    }

    #[test]
    fn test_box_overlap_excludes_touching() {
        let mut index = GridIndex::new();
        index.insert(cell(0, 0), Vec2::ZERO, half_cell(), Some(RoomId(0)), true);
        // Touching exactly at x=1.0: not an overlap.
        let hits = index.query_box(Vec2::new(2.0, 0.0), half_cell(), QueryFilter::default());
        assert!(hits.is_empty());
        // Enlarged footprint overlaps.
        let hits = index.query_box(
            Vec2::new(2.0, 0.0),
            Vec2::new(0.55, 0.55),
            QueryFilter::default(),
        );
        assert!(hits.is_empty());
        let hits = index.query_box(
            Vec2::new(1.0, 0.0),
            Vec2::new(0.55, 0.55),
            QueryFilter::default(),
        );
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_filters() {
        let mut index = GridIndex::new();
        index.insert(cell(0, 0), Vec2::ZERO, half_cell(), Some(RoomId(0)), true);
        index.insert(
            Occupant::Connector { room: RoomId(0), index: 0 },
            Vec2::new(0.0, 0.625),
            Vec2::new(0.5, 0.125),
            Some(RoomId(0)),
            true,
        );
        index.insert(cell(1, 0), Vec2::new(0.0, 1.25), half_cell(), Some(RoomId(1)), false);

        let all = index.query_box(Vec2::ZERO, Vec2::new(2.0, 2.0), QueryFilter::default());
        assert_eq!(all.len(), 3);

        let cells_only = index.query_box(
            Vec2::ZERO,
            Vec2::new(2.0, 2.0),
            QueryFilter {
                cells_only: true,
                ..Default::default()
            },
        );
        assert_eq!(cells_only.len(), 2);

        let placed = index.query_box(
            Vec2::ZERO,
            Vec2::new(2.0, 2.0),
            QueryFilter {
                placed_only: true,
                exclude_room: Some(RoomId(0)),
                ..Default::default()
            },
        );
        assert!(placed.is_empty());
    }
}
