//! Producer side of the draw interface: emits building surfaces into an external batch.
//!
//! Geometry is emitted in building space (rotated, without any tile offset). Each call
//! returns the number of primitives it emitted.

use glam::Vec3;

use crate::building::Building;
use crate::color::Color;
use crate::constants::obj_tex;
use crate::geom::Cube;
use crate::materials::{BuildingMaterial, TexDesc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawGroup {
    Sides,
    Roofs,
    Details,
    ExtDoors,
    Windows,
    WindowLights,
    Walls,
    Floors,
    Ceilings,
    IntDoors,
}

/// Consumer of emitted primitives (owned by the renderer).
pub trait DrawBatch {
    fn add_quad(&mut self, group: DrawGroup, tex: &TexDesc, pts: &[Vec3; 4], normal: Vec3, color: Color);
    fn add_triangle(&mut self, group: DrawGroup, tex: &TexDesc, pts: &[Vec3; 3], normal: Vec3, color: Color);
}

const GLASS: Color = Color::rgb(0.35, 0.4, 0.5);
const DOOR_COLOR: Color = Color::rgb(0.6, 0.45, 0.3);

struct Emitter<'a, S> {
    b: &'a Building,
    sink: &'a mut S,
    count: usize,
}

impl<S: DrawBatch> Emitter<'_, S> {
    fn quad(&mut self, group: DrawGroup, tex: &TexDesc, pts: [Vec3; 4], normal: Vec3, color: Color) {
        let w = pts.map(|p| self.b.local_to_world(p));
        self.sink
            .add_quad(group, tex, &w, self.b.local_dir_to_world(normal), color);
        self.count += 1;
    }

    fn tri(&mut self, group: DrawGroup, tex: &TexDesc, pts: [Vec3; 3], normal: Vec3, color: Color) {
        let w = pts.map(|p| self.b.local_to_world(p));
        self.sink
            .add_triangle(group, tex, &w, self.b.local_dir_to_world(normal), color);
        self.count += 1;
    }

    /// Faces of `c`; bit `2 * dim + dir` of `skip` suppresses a face.
    fn cube(&mut self, group: DrawGroup, tex: &TexDesc, c: &Cube, color: Color, skip: u8) {
        for dim in 0..3 {
            for dir in [false, true] {
                if skip & (1 << (2 * dim + usize::from(dir))) != 0 {
                    continue;
                }
                let (pts, n) = cube_face(c, dim, dir);
                self.quad(group, tex, pts, n, color);
            }
        }
    }
}

/// Corners and outward normal of one face of `c`, counter-clockwise seen from outside.
fn cube_face(c: &Cube, dim: usize, dir: bool) -> ([Vec3; 4], Vec3) {
    let (d1, d2) = ((dim + 1) % 3, (dim + 2) % 3);
    let v = c.d(dim, dir);
    let corner = |a: bool, b: bool| {
        let mut p = Vec3::ZERO;
        p[dim] = v;
        p[d1] = c.d(d1, a);
        p[d2] = c.d(d2, b);
        p
    };
    let mut pts = [corner(false, false), corner(true, false), corner(true, true), corner(false, true)];
    if !dir {
        pts.reverse();
    }
    let mut n = Vec3::ZERO;
    n[dim] = if dir { 1.0 } else { -1.0 };
    (pts, n)
}

const SKIP_BOTTOM: u8 = 1 << 4;
const SKIP_TOP: u8 = 1 << 5;
const SKIP_Z: u8 = SKIP_BOTTOM | SKIP_TOP;

impl Building {
    fn has_roof_over(&self, part: &Cube) -> bool {
        self.roof_tquads.iter().any(|q| {
            let bc = q.bcube();
            bc.lo.z >= part.hi.z - 1.0e-3 && bc.intersects_xy(part)
        })
    }

    /// Faces of real part `pi` that are buried inside another part are not drawn.
    fn side_is_hidden(&self, pi: usize, center: Vec3, n: Vec3) -> bool {
        let probe = center + n * 0.01 * self.floor_spacing;
        self.real_parts()
            .iter()
            .enumerate()
            .any(|(j, p)| j != pi && p.contains_pt(probe))
    }

    /// Emit exterior and/or interior surfaces.
    pub fn get_all_drawn_verts(
        &self,
        mat: &BuildingMaterial,
        sink: &mut impl DrawBatch,
        get_exterior: bool,
        get_interior: bool,
    ) -> usize {
        let mut n = 0;
        if get_exterior {
            n += self.get_exterior_drawn_verts(mat, sink);
        }
        if get_interior {
            n += self.get_interior_drawn_verts(mat, sink);
        }
        n
    }

    pub fn get_exterior_drawn_verts(&self, mat: &BuildingMaterial, sink: &mut impl DrawBatch) -> usize {
        let mut e = Emitter { b: self, sink, count: 0 };
        let ground = self.ground_z();
        let mut pts = Vec::new();

        for (i, part) in self.parts.iter().enumerate() {
            let mut skip = 0;
            if part.lo.z <= ground + 1.0e-3 {
                skip |= SKIP_BOTTOM;
            }
            if self.has_roof_over(part) {
                skip |= SKIP_TOP;
            }
            if self.geom.is_cube() || i >= self.real_num_parts {
                for dim in 0..2 {
                    for dir in [false, true] {
                        let (face, nrm) = cube_face(part, dim, dir);
                        let fc = face.iter().copied().sum::<Vec3>() * 0.25;
                        if i < self.real_num_parts && self.side_is_hidden(i, fc, nrm) {
                            continue;
                        }
                        e.quad(DrawGroup::Sides, &mat.side_tex, face, nrm, self.colors.side);
                    }
                }
                e.cube(DrawGroup::Roofs, &mat.roof_tex, part, self.colors.roof, skip | 0x0F | SKIP_BOTTOM);
                if skip & SKIP_BOTTOM == 0 {
                    let (face, nrm) = cube_face(part, 2, false);
                    e.quad(DrawGroup::Sides, &mat.side_tex, face, nrm, self.colors.side);
                }
                continue;
            }
            self.calc_poly_pts(part, 0.0, &mut pts);
            let center = part.center();
            for k in 0..pts.len() {
                let (a, b) = (pts[k], pts[(k + 1) % pts.len()]);
                let edge = b - a;
                let mut nrm = Vec3::new(edge.y, -edge.x, 0.0).normalize_or_zero();
                if nrm.dot(a - center) < 0.0 {
                    nrm = -nrm;
                }
                // Wind counter-clockwise seen from outside.
                let (a, b) = if edge.cross(Vec3::Z).dot(nrm) < 0.0 { (b, a) } else { (a, b) };
                let quad = [a, b, b.with_z(part.hi.z), a.with_z(part.hi.z)];
                e.quad(DrawGroup::Sides, &mat.side_tex, quad, nrm, self.colors.side);
                if skip & SKIP_TOP == 0 {
                    let top = [center.with_z(part.hi.z), a.with_z(part.hi.z), b.with_z(part.hi.z)];
                    e.tri(DrawGroup::Roofs, &mat.roof_tex, top, Vec3::Z, self.colors.roof);
                }
            }
        }
        for q in &self.roof_tquads {
            let p = q.pts;
            if q.npts == 3 {
                e.tri(DrawGroup::Roofs, &mat.roof_tex, [p[0], p[1], p[2]], q.normal(), self.colors.roof);
            } else {
                e.quad(DrawGroup::Roofs, &mat.roof_tex, p, q.normal(), self.colors.roof);
            }
        }
        for d in &self.details {
            e.cube(DrawGroup::Details, &mat.roof_tex, &d.cube, self.colors.roof, SKIP_BOTTOM);
        }
        let door_tex = TexDesc::new(obj_tex::DOOR, 1.0);
        for d in &self.doors {
            e.quad(DrawGroup::ExtDoors, &door_tex, d.pts, d.normal(), DOOR_COLOR);
        }
        e.count
    }

    /// Floors, ceilings, interior walls and closed interior doors.
    pub fn get_interior_drawn_verts(&self, mat: &BuildingMaterial, sink: &mut impl DrawBatch) -> usize {
        let Some(int) = self.interior.as_deref() else {
            return 0;
        };
        let mut e = Emitter { b: self, sink, count: 0 };
        for f in &int.floors {
            let (face, n) = cube_face(f, 2, true);
            e.quad(DrawGroup::Floors, &mat.floor_tex, face, n, self.colors.floor);
        }
        for c in &int.ceilings {
            let (face, n) = cube_face(c, 2, false);
            e.quad(DrawGroup::Ceilings, &mat.ceil_tex, face, n, self.colors.ceil);
        }
        for w in int.all_walls() {
            e.cube(DrawGroup::Walls, &mat.wall_tex, w, self.colors.wall, SKIP_Z);
        }
        let door_tex = TexDesc::new(obj_tex::DOOR, 1.0);
        for d in int.doors.iter().filter(|d| !d.open) {
            e.cube(DrawGroup::IntDoors, &door_tex, &d.cube, DOOR_COLOR, SKIP_Z);
        }
        e.count
    }

    /// Window quads on the exterior sides of real parts.
    ///
    /// The lights pass emits only the floor bands whose lit bit is set. With
    /// `only_cont_pt` (world point), only the part containing that point is drawn.
    pub fn get_all_drawn_window_verts(
        &self,
        mat: &BuildingMaterial,
        sink: &mut impl DrawBatch,
        lights_pass: bool,
        offset_scale: f32,
        only_cont_pt: Option<Vec3>,
    ) -> usize {
        if mat.window_tx <= 0.0 || mat.window_ty <= 0.0 {
            return 0;
        }
        let int = self.interior.as_deref();
        if lights_pass && int.map_or(true, |i| i.lit_by_floor == 0) {
            return 0;
        }
        let only_part = match only_cont_pt {
            Some(p) => match self.get_part_containing_pt(self.world_to_local(p)) {
                Some(pi) => Some(pi),
                None => return 0,
            },
            None => None,
        };
        let (group, color) = if lights_pass {
            (DrawGroup::WindowLights, Color::WARM_LIGHT)
        } else {
            (DrawGroup::Windows, GLASS)
        };
        let tex = TexDesc {
            tscale_x: mat.window_tx,
            tscale_y: mat.window_ty,
            emissive: lights_pass,
            ..TexDesc::new(obj_tex::WINDOW, 1.0)
        };
        let offset = 0.002 * offset_scale * self.floor_spacing;
        let mut e = Emitter { b: self, sink, count: 0 };
        let mut pts = Vec::new();

        for (pi, part) in self.real_parts().iter().enumerate() {
            if only_part.is_some_and(|o| o != pi) {
                continue;
            }
            // Each side as a horizontal segment a-b with its outward normal.
            let mut sides: Vec<(Vec3, Vec3, Vec3)> = Vec::new();
            if self.geom.is_cube() {
                for dim in 0..2 {
                    for dir in [false, true] {
                        let (face, n) = cube_face(part, dim, dir);
                        let (a, b) = lowest_edge(&face);
                        sides.push((a, b, n));
                    }
                }
            } else {
                self.calc_poly_pts(part, 0.0, &mut pts);
                let center = part.center();
                for k in 0..pts.len() {
                    let (a, b) = (pts[k], pts[(k + 1) % pts.len()]);
                    let edge = b - a;
                    let mut n = Vec3::new(edge.y, -edge.x, 0.0).normalize_or_zero();
                    if n.dot(a - center) < 0.0 {
                        n = -n;
                    }
                    if edge.cross(Vec3::Z).dot(n) < 0.0 {
                        sides.push((b, a, n));
                    } else {
                        sides.push((a, b, n));
                    }
                }
            }
            for (a, b, n) in sides {
                let mid = (a + b) * 0.5;
                if self.side_is_hidden(pi, mid.with_z(0.5 * (part.lo.z + part.hi.z)), n) {
                    continue;
                }
                let (a, b) = (a + n * offset, b + n * offset);
                if !lights_pass {
                    let quad = [a.with_z(part.lo.z), b.with_z(part.lo.z), b.with_z(part.hi.z), a.with_z(part.hi.z)];
                    e.quad(group, &tex, quad, n, color);
                    continue;
                }
                let Some(int) = int else {
                    continue;
                };
                let f0 = int.get_floor_for_z(part.lo.z + 0.5 * int.slab_thick);
                let nf = int.floors_in_part(pi, part.dz());
                for f in f0..f0 + nf {
                    if !int.is_floor_lit(f) {
                        continue;
                    }
                    let z1 = part.lo.z + (f - f0) as f32 * self.floor_spacing;
                    // The top floor absorbs any partial floor above it.
                    let z2 = if f + 1 == f0 + nf { part.hi.z } else { (z1 + self.floor_spacing).min(part.hi.z) };
                    if z2 <= z1 {
                        continue;
                    }
                    e.quad(group, &tex, [a.with_z(z1), b.with_z(z1), b.with_z(z2), a.with_z(z2)], n, color);
                }
            }
        }
        e.count
    }

    /// Index of the exterior door nearest to world point `pos` within `dist`.
    pub fn find_door_close_to_point(&self, pos: Vec3, dist: f32) -> Option<usize> {
        let p = self.world_to_local(pos);
        let dist_sq = dist * dist;
        self.doors
            .iter()
            .enumerate()
            .map(|(i, d)| (i, d.bcube().dist_sq(p)))
            .filter(|&(_, d)| d <= dist_sq)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Emit exterior doors within `dist` of world point `pos`. Returns the number emitted.
    pub fn get_nearby_ext_door_verts(&self, sink: &mut impl DrawBatch, pos: Vec3, dist: f32) -> usize {
        let p = self.world_to_local(pos);
        let door_tex = TexDesc::new(obj_tex::DOOR, 1.0);
        let mut e = Emitter { b: self, sink, count: 0 };
        for d in self.doors.iter().filter(|d| d.bcube().dist_sq(p) <= dist * dist) {
            e.quad(DrawGroup::ExtDoors, &door_tex, d.pts, d.normal(), DOOR_COLOR);
        }
        e.count
    }
}

/// The two lowest corners of a vertical face, ordered counter-clockwise.
fn lowest_edge(face: &[Vec3; 4]) -> (Vec3, Vec3) {
    let lo = face.iter().map(|p| p.z).fold(f32::MAX, f32::min);
    let mut it = (0..4).filter(|&i| face[i].z <= lo && face[(i + 1) % 4].z <= lo);
    match it.next() {
        Some(i) => (face[i], face[(i + 1) % 4]),
        None => (face[0], face[1]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::building::{TQuad, TQuadKind};
    use crate::interior::{Door, Interior};
    use crate::materials::BuildingParams;
    use rustc_hash::FxHashMap;

    #[derive(Default)]
    struct Counter {
        quads: FxHashMap<DrawGroup, usize>,
        tris: FxHashMap<DrawGroup, usize>,
        normals_ok: bool,
    }

    impl DrawBatch for Counter {
        fn add_quad(&mut self, group: DrawGroup, _tex: &TexDesc, pts: &[Vec3; 4], normal: Vec3, _color: Color) {
            *self.quads.entry(group).or_default() += 1;
            let n = (pts[1] - pts[0]).cross(pts[2] - pts[0]).normalize_or_zero();
            self.normals_ok &= n.dot(normal) > 0.99;
        }
        fn add_triangle(&mut self, group: DrawGroup, _tex: &TexDesc, _pts: &[Vec3; 3], _normal: Vec3, _color: Color) {
            *self.tris.entry(group).or_default() += 1;
        }
    }

    impl Counter {
        fn new() -> Self {
            Self {
                normals_ok: true,
                ..Self::default()
            }
        }
        fn q(&self, g: DrawGroup) -> usize {
            self.quads.get(&g).copied().unwrap_or(0)
        }
    }

    fn windowed_mat() -> BuildingMaterial {
        let mut params = BuildingParams::test_params();
        params.window_width = 1.0;
        params.window_height = 1.0;
        params.window_xspace = 1.0;
        params.window_yspace = 2.0;
        params.finalize();
        params.get_material(0).clone()
    }

    fn two_floor_box() -> Building {
        let mut b = Building::new(0, 1, 1, Vec3::ZERO);
        b.floor_spacing = 3.0;
        b.parts.push(Cube::from_bounds(-5.0, 5.0, -5.0, 5.0, 0.0, 6.0));
        b.real_num_parts = 1;
        b.calc_bcube_from_parts();
        let mut int = Interior::new(0.0, 3.0, 0.15);
        int.num_floors = 2;
        int.floors.push(Cube::from_bounds(-5.0, 5.0, -5.0, 5.0, 0.0, 0.075));
        int.ceilings.push(Cube::from_bounds(-5.0, 5.0, -5.0, 5.0, 2.925, 3.0));
        int.walls[0].push(Cube::from_bounds(-0.05, 0.05, -5.0, 5.0, 0.075, 2.925));
        int.doors.push(Door {
            cube: Cube::from_bounds(-0.02, 0.02, 1.0, 2.0, 0.075, 2.0),
            dim: 0,
            open_dir: false,
            open: false,
        });
        int.set_floor_lit(0, true);
        b.interior = Some(Box::new(int));
        b
    }

    #[test]
    fn exterior_box_faces_point_outward() {
        let b = two_floor_box();
        let mut c = Counter::new();
        let n = b.get_all_drawn_verts(&BuildingMaterial::default(), &mut c, true, false);
        assert_eq!(c.q(DrawGroup::Sides), 4);
        assert_eq!(c.q(DrawGroup::Roofs), 1);
        assert_eq!(n, 5);
        assert!(c.normals_ok);
    }

    #[test]
    fn interior_surfaces() {
        let b = two_floor_box();
        let mut c = Counter::new();
        b.get_all_drawn_verts(&BuildingMaterial::default(), &mut c, false, true);
        assert_eq!(c.q(DrawGroup::Floors), 1);
        assert_eq!(c.q(DrawGroup::Ceilings), 1);
        assert_eq!(c.q(DrawGroup::Walls), 4);
        assert_eq!(c.q(DrawGroup::IntDoors), 4);
        assert!(c.normals_ok);
    }

    #[test]
    fn window_lights_follow_lit_floors() {
        let b = two_floor_box();
        let mat = windowed_mat();
        let mut c = Counter::new();
        assert_eq!(b.get_all_drawn_window_verts(&mat, &mut c, false, 1.0, None), 4);
        let mut c = Counter::new();
        assert_eq!(b.get_all_drawn_window_verts(&mat, &mut c, true, 1.0, None), 4);
        assert_eq!(c.q(DrawGroup::WindowLights), 4);

        let mut b2 = b.clone();
        if let Some(int) = b2.interior.as_deref_mut() {
            int.set_floor_lit(1, true);
        }
        assert_eq!(b2.get_all_drawn_window_verts(&mat, &mut Counter::new(), true, 1.0, None), 8);
        // Outside every part.
        let far = Some(Vec3::new(50.0, 0.0, 1.0));
        assert_eq!(b2.get_all_drawn_window_verts(&mat, &mut Counter::new(), false, 1.0, far), 0);
        // No windows without window settings.
        assert_eq!(b2.get_all_drawn_window_verts(&BuildingMaterial::default(), &mut Counter::new(), false, 1.0, None), 0);
    }

    #[test]
    fn window_lights_stop_at_the_tall_top_floor() {
        // 8 units at spacing 3: two floors, the upper one 5 units tall.
        let mut b = two_floor_box();
        b.parts[0].hi.z = 8.0;
        b.calc_bcube_from_parts();
        if let Some(int) = b.interior.as_deref_mut() {
            int.part_floors = vec![2];
            for f in 0..3 {
                int.set_floor_lit(f, true);
            }
        }
        let mat = windowed_mat();
        let mut c = Counter::new();
        assert_eq!(b.get_all_drawn_window_verts(&mat, &mut c, true, 1.0, None), 8);
        assert_eq!(c.q(DrawGroup::WindowLights), 8);
    }

    #[test]
    fn nearby_doors() {
        let mut b = two_floor_box();
        let y = -5.0;
        b.doors.push(TQuad::quad(
            [
                Vec3::new(-0.5, y, 0.0),
                Vec3::new(0.5, y, 0.0),
                Vec3::new(0.5, y, 2.0),
                Vec3::new(-0.5, y, 2.0),
            ],
            TQuadKind::BuildingDoor,
        ));
        assert_eq!(b.find_door_close_to_point(Vec3::new(0.0, -7.0, 1.0), 3.0), Some(0));
        assert_eq!(b.find_door_close_to_point(Vec3::new(0.0, -17.0, 1.0), 3.0), None);
        let mut c = Counter::new();
        assert_eq!(b.get_nearby_ext_door_verts(&mut c, Vec3::new(0.0, -7.0, 1.0), 3.0), 1);
        assert_eq!(b.get_nearby_ext_door_verts(&mut c, Vec3::new(30.0, -7.0, 1.0), 3.0), 0);
    }
}
