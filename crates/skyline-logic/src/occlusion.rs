//! Building-vs-point occlusion with a reusable per-viewer scratch arena.

use glam::Vec3;
use rustc_hash::FxHashSet;

use crate::building::Building;
use crate::geom::Cube;

/// View cone used to pick candidate occluders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewFrustum {
    pub pos: Vec3,
    /// Unit view direction.
    pub dir: Vec3,
    pub cos_half_angle: f32,
    pub far: f32,
}

impl ViewFrustum {
    pub fn new(pos: Vec3, dir: Vec3, half_angle: f32, far: f32) -> Self {
        Self {
            pos,
            dir: dir.normalize_or_zero(),
            cos_half_angle: half_angle.cos(),
            far,
        }
    }

    /// Conservative bounding-sphere test against the view cone.
    pub fn cube_visible(&self, c: &Cube) -> bool {
        let radius = 0.5 * c.size().length();
        let d = c.center() - self.pos;
        let dist = d.length();
        if dist - radius > self.far {
            return false;
        }
        if dist <= radius {
            return true;
        }
        // Widen the cone by the angle the sphere subtends.
        let sin_half = (1.0 - self.cos_half_angle * self.cos_half_angle).max(0.0).sqrt();
        let sin_a = radius / dist;
        let cos_a = (1.0 - sin_a * sin_a).max(0.0).sqrt();
        let cos_lim = self.cos_half_angle * cos_a - sin_half * sin_a;
        d.dot(self.dir) >= dist * cos_lim
    }
}

/// Scratch state for occlusion queries from one viewer.
///
/// Candidate occluders are cached for the current viewer; the buffers are cleared, not
/// reallocated, when the viewer moves.
#[derive(Debug, Clone, Default)]
pub struct OcclusionState {
    pub pos: Vec3,
    pub dir: Vec3,
    pub xlate: Vec3,
    /// Candidate occluders, nearest first.
    pub building_ids: Vec<usize>,
    pub temp_points: Vec<Vec3>,
    hit_points: Vec<Vec3>,
    /// Buildings never used as occluders, e.g. the owner of the geometry being tested.
    excluded: FxHashSet<usize>,
    valid: bool,
}

impl OcclusionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self, pos: Vec3, dir: Vec3, xlate: Vec3) {
        self.pos = pos;
        self.dir = dir;
        self.xlate = xlate;
        self.building_ids.clear();
        self.valid = true;
    }

    pub fn is_current(&self, f: &ViewFrustum, xlate: Vec3) -> bool {
        self.valid && self.pos == f.pos && self.dir == f.dir && self.xlate == xlate
    }

    pub fn set_excluded(&mut self, ids: impl IntoIterator<Item = usize>) {
        self.excluded.clear();
        self.excluded.extend(ids);
        self.valid = false;
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

/// Collect the buildings that may occlude anything in view. Returns false on a cache hit.
pub fn get_building_occluders(
    buildings: &[Building],
    frustum: &ViewFrustum,
    xlate: Vec3,
    state: &mut OcclusionState,
) -> bool {
    if state.is_current(frustum, xlate) {
        return false;
    }
    state.init(frustum.pos, frustum.dir, xlate);
    for (i, b) in buildings.iter().enumerate() {
        if state.excluded.contains(&i) || !b.is_valid() {
            continue;
        }
        let bc = b.bcube.translated(xlate);
        // A building around the viewer hides nothing outside it.
        if bc.contains_pt(frustum.pos) || !frustum.cube_visible(&bc) {
            continue;
        }
        state.building_ids.push(i);
    }
    let pos = frustum.pos;
    state.building_ids.sort_by(|&a, &b| {
        let da = buildings[a].bcube.translated(xlate).dist_sq(pos);
        let db = buildings[b].bcube.translated(xlate).dist_sq(pos);
        da.total_cmp(&db)
    });
    true
}

/// True if every point is hidden from the viewer by some candidate occluder.
pub fn check_pts_occluded(buildings: &[Building], pts: &[Vec3], state: &mut OcclusionState) -> bool {
    if pts.is_empty() || state.building_ids.is_empty() {
        return false;
    }
    let (pos, xlate) = (state.pos, state.xlate);
    pts.iter().all(|&p| {
        state.building_ids.iter().any(|&bi| {
            state.hit_points.clear();
            buildings[bi]
                .check_line_coll(pos, p, xlate, true, &mut state.hit_points)
                .is_some()
        })
    })
}

/// True if all eight corners of `c` are hidden.
pub fn check_cube_occluded(buildings: &[Building], c: &Cube, state: &mut OcclusionState) -> bool {
    let mut pts = std::mem::take(&mut state.temp_points);
    pts.clear();
    for z in [c.lo.z, c.hi.z] {
        pts.extend(c.corners_xy(z));
    }
    let occluded = check_pts_occluded(buildings, &pts, state);
    state.temp_points = pts;
    occluded
}
