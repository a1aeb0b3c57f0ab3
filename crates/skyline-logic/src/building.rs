//! The `Building` entity: parts, roof, doors, geometry descriptor and colors.
//!
//! Parts are stored in the building's local frame. For rotated buildings the local
//! frame is rotated about `rot_center` to get world space. `bcube` is always the
//! world-space (unrotated, untranslated) bounding box of everything the building owns.

use glam::Vec3;

use crate::color::Color;
use crate::constants::{building_flags, proportions};
use crate::geom::{do_xy_rotate, do_xy_rotate_inv, point_in_polygon_xy, Cube};
use crate::interior::Interior;

/// Footprint shape descriptor shared by all parts of a building.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildingGeom {
    pub num_sides: u32,
    /// Per-part (first four parts) bitmask of sides with exterior doors, bit `2*dim + dir`.
    pub door_sides: [u8; 4],
    pub half_offset: bool,
    pub is_pointed: bool,
    pub rot_sin: f32,
    pub rot_cos: f32,
    pub flat_side_amt: f32,
    pub alt_step_factor: f32,
    pub start_angle: f32,
}

impl Default for BuildingGeom {
    fn default() -> Self {
        Self {
            num_sides: 4,
            door_sides: [0; 4],
            half_offset: false,
            is_pointed: false,
            rot_sin: 0.0,
            rot_cos: 1.0,
            flat_side_amt: 0.0,
            alt_step_factor: 0.0,
            start_angle: 0.0,
        }
    }
}

impl BuildingGeom {
    pub fn is_rotated(&self) -> bool {
        self.rot_sin != 0.0
    }
    pub fn is_cube(&self) -> bool {
        self.num_sides == 4
    }
    pub fn is_simple_cube(&self) -> bool {
        self.is_cube() && !self.half_offset && self.flat_side_amt == 0.0 && self.alt_step_factor == 0.0
    }
    pub fn use_cylinder_coll(&self) -> bool {
        self.num_sides > 8 && self.flat_side_amt == 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoofType {
    #[default]
    Flat,
    Sloped,
    Peak,
    Hipped,
    Dome,
    Onion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TQuadKind {
    Roof,
    RoofAccess,
    Wall,
    ChimneyCap,
    HouseDoor,
    BuildingDoor,
    GarageDoor,
    InteriorDoor,
    InteriorDoor2,
    RoofDoor,
}

impl TQuadKind {
    pub fn is_exterior_door(&self) -> bool {
        matches!(self, Self::HouseDoor | Self::BuildingDoor | Self::GarageDoor)
    }
}

/// Tagged triangle or quad in the building's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TQuad {
    pub pts: [Vec3; 4],
    pub npts: u8,
    pub kind: TQuadKind,
}

impl TQuad {
    pub fn quad(pts: [Vec3; 4], kind: TQuadKind) -> Self {
        Self { pts, npts: 4, kind }
    }

    pub fn tri(a: Vec3, b: Vec3, c: Vec3, kind: TQuadKind) -> Self {
        Self {
            pts: [a, b, c, c],
            npts: 3,
            kind,
        }
    }

    pub fn points(&self) -> &[Vec3] {
        &self.pts[..self.npts as usize]
    }

    pub fn bcube(&self) -> Cube {
        let mut bc = Cube::from_point(self.pts[0]);
        for p in self.points() {
            bc.union_with_pt(*p);
        }
        bc
    }

    pub fn center(&self) -> Vec3 {
        let sum: Vec3 = self.points().iter().copied().sum();
        sum / f32::from(self.npts)
    }

    pub fn normal(&self) -> Vec3 {
        (self.pts[1] - self.pts[0])
            .cross(self.pts[2] - self.pts[0])
            .normalize_or_zero()
    }

    /// Bounding box expanded by `thick` on all axes so flat quads have volume.
    pub fn thick_bcube(&self, thick: f32) -> Cube {
        self.bcube().expand_by(thick)
    }

    /// Segment/polygon intersection fraction along p1→p2 (triangles of the fan).
    pub fn line_intersection(&self, p1: Vec3, p2: Vec3) -> Option<f32> {
        let n = self.npts as usize;
        let mut best: Option<f32> = None;
        for i in 1..n - 1 {
            if let Some(t) = line_tri_intersection(p1, p2, self.pts[0], self.pts[i], self.pts[i + 1]) {
                best = Some(best.map_or(t, |b: f32| b.min(t)));
            }
        }
        best
    }
}

/// Möller–Trumbore, two-sided, restricted to the segment.
fn line_tri_intersection(p1: Vec3, p2: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let dir = p2 - p1;
    let e1 = b - a;
    let e2 = c - a;
    let h = dir.cross(e2);
    let det = e1.dot(h);
    if det.abs() < 1.0e-12 {
        return None;
    }
    let inv = 1.0 / det;
    let s = p1 - a;
    let u = s.dot(h) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = dir.dot(q) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv;
    (0.0..=1.0).contains(&t).then_some(t)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoofObjKind {
    Block,
    Antenna,
    Wall,
    ECap,
    AcUnit,
    SCap,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoofObj {
    pub cube: Cube,
    pub kind: RoofObjKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BuildingColors {
    pub side: Color,
    pub roof: Color,
    pub wall: Color,
    pub ceil: Color,
    pub floor: Color,
}

#[derive(Debug, Clone)]
pub struct Building {
    pub mat_ix: usize,
    pub seed1: u64,
    pub seed2: u64,
    /// Placement position (footprint center at ground level).
    pub pos: Vec3,
    pub rot_center: Vec3,
    pub geom: BuildingGeom,
    pub roof_type: RoofType,
    pub flags: u8,
    pub colors: BuildingColors,
    pub floor_spacing: f32,
    pub bcube: Cube,
    pub parts: Vec<Cube>,
    /// Parts before this index form the primary structure; the rest are garages, sheds and chimneys.
    pub real_num_parts: usize,
    pub details: Vec<RoofObj>,
    pub roof_tquads: Vec<TQuad>,
    /// Exterior door quads.
    pub doors: Vec<TQuad>,
    /// Part index each exterior door belongs to.
    pub door_parts: Vec<u8>,
    pub interior: Option<Box<Interior>>,
}

impl Building {
    pub fn new(mat_ix: usize, seed1: u64, seed2: u64, pos: Vec3) -> Self {
        Self {
            mat_ix,
            seed1,
            seed2,
            pos,
            rot_center: pos,
            geom: BuildingGeom::default(),
            roof_type: RoofType::Flat,
            flags: 0,
            colors: BuildingColors::default(),
            floor_spacing: 1.0,
            bcube: Cube::from_point(pos),
            parts: Vec::new(),
            real_num_parts: 0,
            details: Vec::new(),
            roof_tquads: Vec::new(),
            doors: Vec::new(),
            door_parts: Vec::new(),
            interior: None,
        }
    }

    pub fn is_house(&self) -> bool {
        self.flags & building_flags::IS_HOUSE != 0
    }

    pub fn has_interior(&self) -> bool {
        self.interior.is_some()
    }

    pub fn is_valid(&self) -> bool {
        !self.parts.is_empty() && self.bcube.is_strictly_normalized()
    }

    pub fn ground_z(&self) -> f32 {
        self.parts.first().map_or(self.pos.z, |p| p.lo.z)
    }

    pub fn real_parts(&self) -> &[Cube] {
        &self.parts[..self.real_num_parts.min(self.parts.len())]
    }

    // ── Frames ─────────────────────────────────────────────────────────

    pub fn local_to_world(&self, mut p: Vec3) -> Vec3 {
        if self.geom.is_rotated() {
            do_xy_rotate(self.geom.rot_cos, self.geom.rot_sin, self.rot_center, &mut p);
        }
        p
    }

    pub fn world_to_local(&self, mut p: Vec3) -> Vec3 {
        if self.geom.is_rotated() {
            do_xy_rotate_inv(self.geom.rot_cos, self.geom.rot_sin, self.rot_center, &mut p);
        }
        p
    }

    /// Rotate a direction vector from world into local space.
    pub fn world_dir_to_local(&self, d: Vec3) -> Vec3 {
        self.world_to_local(d + self.rot_center) - self.rot_center
    }

    pub fn local_dir_to_world(&self, d: Vec3) -> Vec3 {
        self.local_to_world(d + self.rot_center) - self.rot_center
    }

    /// World-space bounding box of a local-frame cube.
    pub fn local_cube_to_world(&self, c: &Cube) -> Cube {
        if !self.geom.is_rotated() {
            return *c;
        }
        let mut bc = Cube::from_point(self.local_to_world(c.lo));
        for z in [c.lo.z, c.hi.z] {
            for p in c.corners_xy(z) {
                bc.union_with_pt(self.local_to_world(p));
            }
        }
        bc
    }

    // ── Footprint ──────────────────────────────────────────────────────

    /// Footprint polygon of a part at its base height, in the local frame.
    pub fn calc_poly_pts(&self, part: &Cube, expand: f32, out: &mut Vec<Vec3>) {
        out.clear();
        if self.geom.is_cube() {
            out.extend(part.expand_by_xy(expand).corners_xy(part.lo.z));
            return;
        }
        let n = self.geom.num_sides.max(3) as usize;
        let c = part.center();
        let rx = 0.5 * part.dx() + expand;
        let ry = 0.5 * part.dy() + expand;
        let step = std::f32::consts::TAU / n as f32;
        let asf = if n % 2 == 0 { self.geom.alt_step_factor } else { 0.0 };
        let mut angle = self.geom.start_angle;
        if self.geom.half_offset {
            angle += 0.5 * step;
        }
        // Flat side cuts the footprint at this y; zero leaves the polygon untouched.
        let flat_y = part.hi.y + expand - self.geom.flat_side_amt * part.dy();

        for i in 0..n {
            let (s, cs) = angle.sin_cos();
            let y = (c.y + ry * s).min(flat_y);
            out.push(Vec3::new(c.x + rx * cs, y, part.lo.z));
            angle += if i % 2 == 0 {
                step * (1.0 + asf)
            } else {
                step * (1.0 - asf)
            };
        }
    }

    /// Local-frame point (xy) inside the footprint of `part`, expanded by `radius`.
    pub fn is_pt_in_part_xy(&self, part: &Cube, p: Vec3, radius: f32, scratch: &mut Vec<Vec3>) -> bool {
        if !part.expand_by_xy(radius).contains_pt_xy(p) {
            return false;
        }
        if self.geom.is_cube() {
            return true;
        }
        if self.geom.use_cylinder_coll() {
            let c = part.center();
            let rx = 0.5 * part.dx() + radius;
            let ry = 0.5 * part.dy() + radius;
            let (dx, dy) = ((p.x - c.x) / rx, (p.y - c.y) / ry);
            return dx * dx + dy * dy <= 1.0;
        }
        self.calc_poly_pts(part, radius, scratch);
        point_in_polygon_xy(p, scratch)
    }

    /// Index of the first real part containing local point `p` (xy footprint and z range).
    pub fn get_part_containing_pt(&self, p: Vec3) -> Option<usize> {
        let mut scratch = Vec::new();
        self.real_parts().iter().position(|part| {
            p.z >= part.lo.z && p.z <= part.hi.z && self.is_pt_in_part_xy(part, p, 0.0, &mut scratch)
        })
    }

    // ── Bounds ─────────────────────────────────────────────────────────

    /// Recompute `bcube` from parts, roof quads and details.
    pub fn calc_bcube_from_parts(&mut self) {
        let Some(first) = self.parts.first() else {
            return;
        };
        let mut bc = *first;
        for p in &self.parts {
            bc.union_with(p);
        }
        for q in &self.roof_tquads {
            bc.union_with(&q.bcube());
        }
        for d in &self.details {
            bc.union_with(&d.cube);
        }
        self.bcube = self.local_cube_to_world(&bc);
    }

    /// Grow `bcube` to include a roof that rises `roof_dz` above `part`.
    pub fn add_roof_to_bcube(&mut self, part: &Cube, roof_dz: f32) {
        let mut top = *part;
        top.hi.z += roof_dz.max(0.0);
        let wc = self.local_cube_to_world(&top);
        self.bcube.union_with(&wc);
    }

    // ── Doors ──────────────────────────────────────────────────────────

    /// Door boxes with a small positive thickness, in the local frame.
    pub fn door_cube(&self, door_ix: usize) -> Option<Cube> {
        self.doors
            .get(door_ix)
            .map(|d| d.thick_bcube(proportions::DOOR_THICK * self.floor_spacing))
    }

    pub fn num_ext_doors(&self) -> usize {
        self.doors.len()
    }

    /// True if part `part_ix` has at least one exterior door.
    pub fn part_has_ext_door(&self, part_ix: usize) -> bool {
        self.door_parts.iter().any(|&p| p as usize == part_ix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_building() -> Building {
        let mut b = Building::new(0, 1, 2, Vec3::ZERO);
        b.parts.push(Cube::from_bounds(-5.0, 5.0, -4.0, 4.0, 0.0, 9.0));
        b.real_num_parts = 1;
        b.calc_bcube_from_parts();
        b
    }

    #[test]
    fn bcube_covers_parts() {
        let b = simple_building();
        assert_eq!(b.bcube, b.parts[0]);
        assert!(b.is_valid());
    }

    #[test]
    fn rotated_bcube_grows() {
        let mut b = simple_building();
        let a = 0.4f32;
        b.geom.rot_sin = a.sin();
        b.geom.rot_cos = a.cos();
        b.calc_bcube_from_parts();
        assert!(b.bcube.dx() > 10.0);
        for c in b.parts[0].corners_xy(0.0) {
            assert!(b.bcube.expand_by(1e-4).contains_pt(b.local_to_world(c)));
        }
        let p = Vec3::new(3.0, 1.0, 2.0);
        let back = b.world_to_local(b.local_to_world(p));
        assert!((back - p).length() < 1e-4);
    }

    #[test]
    fn polygon_footprint_points() {
        let mut b = simple_building();
        b.geom.num_sides = 8;
        let mut pts = Vec::new();
        b.calc_poly_pts(&b.parts[0].clone(), 0.0, &mut pts);
        assert_eq!(pts.len(), 8);
        for p in &pts {
            assert!(b.parts[0].expand_by(1e-3).contains_pt_xy(*p));
        }
        let mut scratch = Vec::new();
        let part = b.parts[0];
        assert!(b.is_pt_in_part_xy(&part, Vec3::new(0.0, 0.0, 1.0), 0.0, &mut scratch));
        assert!(!b.is_pt_in_part_xy(&part, Vec3::new(4.9, 3.9, 1.0), 0.0, &mut scratch));
    }

    #[test]
    fn tquad_line_intersection() {
        let q = TQuad::quad(
            [
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(1.0, 1.0, 1.0),
                Vec3::new(0.0, 1.0, 1.0),
            ],
            TQuadKind::Roof,
        );
        let t = q
            .line_intersection(Vec3::new(0.5, 0.5, 2.0), Vec3::new(0.5, 0.5, 0.0))
            .unwrap();
        assert!((t - 0.5).abs() < 1e-5);
        assert!(q
            .line_intersection(Vec3::new(2.0, 0.5, 2.0), Vec3::new(2.0, 0.5, 0.0))
            .is_none());
        assert_eq!(q.normal(), Vec3::Z);
    }

    #[test]
    fn part_containing_point() {
        let b = simple_building();
        assert_eq!(b.get_part_containing_pt(Vec3::new(0.0, 0.0, 1.0)), Some(0));
        assert_eq!(b.get_part_containing_pt(Vec3::new(0.0, 0.0, 10.0)), None);
    }
}
