//! Room geometry: furniture, fixtures, stair and elevator markers, and their vertex batches.
//!
//! Created lazily by `Building::ensure_room_geom` and dropped by `clear_room_geom`.
//! Objects are appended to the material group whose texture matches, so objects that
//! share a texture share a draw call. Vertex upload is deferred to `RoomGeom::build`,
//! which runs at most once per dirty cycle.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::building::Building;
use crate::color::Color;
use crate::constants::{obj_flags, obj_tex, proportions, tries};
use crate::geom::Cube;
use crate::interior::{Interior, Room, StairsShape};
use crate::lighting::refine_light_bcube;
use crate::materials::{BuildingMaterial, TexDesc};
use crate::rng::{rand_chance, rand_index, rand_int, rand_uniform, rng_for_seeds_stream, streams, GenRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomObjectKind {
    #[default]
    None,
    Table,
    Chair,
    Stair,
    Elevator,
    Light,
    Book,
    Bookcase,
    TrashCan,
    Desk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjShape {
    #[default]
    Cube,
    Cylinder,
    StairsU,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomObject {
    pub cube: Cube,
    pub kind: RoomObjectKind,
    pub shape: ObjShape,
    pub flags: u8,
    pub room_id: u8,
    pub obj_id: u16,
    /// Facing axis and side, used by chairs, desks and stairs.
    pub dim: u8,
    pub dir: bool,
    pub light_amt: f32,
    pub color: Color,
}

impl RoomObject {
    pub fn new(cube: Cube, kind: RoomObjectKind, room_id: u8) -> Self {
        debug_assert!(cube.is_strictly_normalized(), "degenerate room object {:?}", cube);
        Self {
            cube,
            kind,
            shape: ObjShape::Cube,
            flags: 0,
            room_id,
            obj_id: 0,
            dim: 0,
            dir: false,
            light_amt: 1.0,
            color: Color::WHITE,
        }
    }

    pub fn is_lit(&self) -> bool {
        self.flags & obj_flags::LIT != 0
    }

    pub fn set_lit(&mut self, lit: bool) {
        if lit {
            self.flags |= obj_flags::LIT;
        } else {
            self.flags &= !obj_flags::LIT;
        }
    }

    pub fn is_visible(&self) -> bool {
        self.flags & obj_flags::INVIS == 0
    }

    pub fn no_coll(&self) -> bool {
        self.flags & obj_flags::NOCOLL != 0
    }

    pub fn is_light(&self) -> bool {
        self.kind == RoomObjectKind::Light
    }

    fn tex(&self, mat: &BuildingMaterial) -> TexDesc {
        match self.kind {
            RoomObjectKind::Table | RoomObjectKind::Chair | RoomObjectKind::Desk | RoomObjectKind::Bookcase => {
                TexDesc::new(obj_tex::WOOD, 4.0)
            }
            RoomObjectKind::Stair => mat.floor_tex,
            RoomObjectKind::Elevator => TexDesc::new(obj_tex::METAL, 2.0),
            RoomObjectKind::Light => TexDesc {
                emissive: true,
                ..TexDesc::new(obj_tex::LIGHT, 1.0)
            },
            RoomObjectKind::Book => TexDesc::new(obj_tex::PAPER, 1.0),
            RoomObjectKind::TrashCan => TexDesc::new(obj_tex::METAL, 2.0),
            RoomObjectKind::None => TexDesc::default(),
        }
    }
}

// ── Vertex batches ─────────────────────────────────────────────────────

/// Packed vertex layout handed to the renderer as raw bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub tc: [f32; 2],
    pub norm: [i8; 4],
    pub color: [u8; 4],
}

impl Vertex {
    pub fn new(pos: Vec3, tc: [f32; 2], n: Vec3, color: [u8; 4]) -> Self {
        let q = |v: f32| (v.clamp(-1.0, 1.0) * 127.0).round() as i8;
        Self {
            pos: pos.to_array(),
            tc,
            norm: [q(n.x), q(n.y), q(n.z), 0],
            color,
        }
    }
}

/// All geometry sharing one texture.
#[derive(Debug, Clone, Default)]
pub struct MaterialGroup {
    pub tex: TexDesc,
    pub quad_verts: Vec<Vertex>,
    pub tri_verts: Vec<Vertex>,
}

impl MaterialGroup {
    pub fn new(tex: TexDesc) -> Self {
        Self {
            tex,
            ..Self::default()
        }
    }

    pub fn num_verts(&self) -> usize {
        self.quad_verts.len() + self.tri_verts.len()
    }

    pub fn clear(&mut self) {
        self.quad_verts.clear();
        self.tri_verts.clear();
    }

    /// Six faces of `c`; bit `2*dim + dir` of `skip_faces` omits that face.
    pub fn add_cube_to_verts(&mut self, c: &Cube, color: Color, skip_faces: u8) {
        let col = color.to_rgba8();
        for dim in 0..3 {
            let d1 = (dim + 1) % 3;
            let d2 = (dim + 2) % 3;
            for dir in [false, true] {
                if skip_faces & (1 << (2 * dim + usize::from(dir))) != 0 {
                    continue;
                }
                let mut n = Vec3::ZERO;
                n[dim] = if dir { 1.0 } else { -1.0 };
                let mut corners = [Vec3::ZERO; 4];
                for (i, (s1, s2)) in [(false, false), (true, false), (true, true), (false, true)].into_iter().enumerate() {
                    let mut p = Vec3::ZERO;
                    p[dim] = c.d(dim, dir);
                    p[d1] = c.d(d1, s1);
                    p[d2] = c.d(d2, s2);
                    corners[i] = p;
                }
                if !dir {
                    corners.reverse();
                }
                for p in corners {
                    let tc = [p[d1] * self.tex.tscale_x, p[d2] * self.tex.tscale_y];
                    self.quad_verts.push(Vertex::new(p, tc, n, col));
                }
            }
        }
    }

    /// Vertical cylinder inscribed in `c`, with optional caps.
    pub fn add_vcylin_to_verts(&mut self, c: &Cube, ndiv: u32, color: Color, draw_bot: bool, draw_top: bool) {
        let col = color.to_rgba8();
        let ndiv = ndiv.max(3);
        let center = c.center();
        let (rx, ry) = (0.5 * c.dx(), 0.5 * c.dy());
        let ring: Vec<Vec3> = (0..=ndiv)
            .map(|i| {
                let a = std::f32::consts::TAU * i as f32 / ndiv as f32;
                Vec3::new(a.cos(), a.sin(), 0.0)
            })
            .collect();
        let at = |v: Vec3, z: f32| Vec3::new(center.x + rx * v.x, center.y + ry * v.y, z);

        for i in 0..ndiv as usize {
            let (v0, v1) = (ring[i], ring[i + 1]);
            let u0 = i as f32 / ndiv as f32 * self.tex.tscale_x;
            let u1 = (i + 1) as f32 / ndiv as f32 * self.tex.tscale_x;
            let vtop = c.dz() * self.tex.tscale_y;
            self.quad_verts.push(Vertex::new(at(v0, c.lo.z), [u0, 0.0], v0, col));
            self.quad_verts.push(Vertex::new(at(v1, c.lo.z), [u1, 0.0], v1, col));
            self.quad_verts.push(Vertex::new(at(v1, c.hi.z), [u1, vtop], v1, col));
            self.quad_verts.push(Vertex::new(at(v0, c.hi.z), [u0, vtop], v0, col));
        }
        for (draw, z, n) in [(draw_bot, c.lo.z, -Vec3::Z), (draw_top, c.hi.z, Vec3::Z)] {
            if !draw {
                continue;
            }
            let mid = Vec3::new(center.x, center.y, z);
            for i in 0..ndiv as usize {
                let (mut a, mut b) = (at(ring[i], z), at(ring[i + 1], z));
                if n.z < 0.0 {
                    std::mem::swap(&mut a, &mut b);
                }
                for p in [mid, a, b] {
                    let tc = [p.x * self.tex.tscale_x, p.y * self.tex.tscale_y];
                    self.tri_verts.push(Vertex::new(p, tc, n, col));
                }
            }
        }
    }
}

/// Receives vertex data for one material group when room geometry is built.
pub trait GeomUploader {
    fn upload(&mut self, tex: &TexDesc, quad_verts: &[u8], tri_verts: &[u8]);
}

#[derive(Debug, Clone, Default)]
pub struct RoomGeom {
    pub objs: Vec<RoomObject>,
    pub materials: Vec<MaterialGroup>,
    /// Index of the first stair marker in `objs`.
    pub stairs_start: usize,
    /// Refined influence box per light, keyed by object index.
    pub light_bcubes: Vec<(usize, Cube)>,
    /// Lights whose state changed since the last volumetric bake.
    pub pending_bake: Vec<usize>,
    pub dirty: bool,
    pub num_builds: u32,
}

impl RoomGeom {
    pub fn get_material_group(&mut self, tex: &TexDesc) -> &mut MaterialGroup {
        let ix = match self.materials.iter().position(|m| m.tex == *tex) {
            Some(ix) => ix,
            None => {
                self.materials.push(MaterialGroup::new(*tex));
                self.materials.len() - 1
            }
        };
        &mut self.materials[ix]
    }

    pub fn light_ixs(&self) -> impl Iterator<Item = usize> + '_ {
        self.objs.iter().enumerate().filter(|(_, o)| o.is_light()).map(|(i, _)| i)
    }

    pub fn light_bcube(&self, obj_ix: usize) -> Option<Cube> {
        self.light_bcubes.iter().find(|(i, _)| *i == obj_ix).map(|(_, c)| *c)
    }

    pub fn set_light_bcube(&mut self, obj_ix: usize, c: Cube) {
        match self.light_bcubes.iter_mut().find(|(i, _)| *i == obj_ix) {
            Some(e) => e.1 = c,
            None => self.light_bcubes.push((obj_ix, c)),
        }
    }

    /// Regenerate every material group from the object list.
    pub fn rebuild_geometry(&mut self, mat: &BuildingMaterial) {
        for m in &mut self.materials {
            m.clear();
        }
        let objs = std::mem::take(&mut self.objs);
        for obj in objs.iter().filter(|o| o.is_visible()) {
            let tex = obj.tex(mat);
            let color = obj.color;
            let group = self.get_material_group(&tex);
            match (obj.kind, obj.shape) {
                (RoomObjectKind::Stair, shape) => add_stair_steps(group, obj, shape, color),
                (_, ObjShape::Cylinder) => group.add_vcylin_to_verts(&obj.cube, 16, color, false, true),
                _ => group.add_cube_to_verts(&obj.cube, color, 0),
            }
        }
        self.objs = objs;
        self.materials.retain(|m| m.num_verts() > 0);
        self.dirty = true;
    }

    /// Hand dirty batches to `uploader`. Returns false if nothing needed building.
    pub fn build(&mut self, uploader: &mut impl GeomUploader) -> bool {
        if !self.dirty {
            return false;
        }
        for m in &self.materials {
            uploader.upload(
                &m.tex,
                bytemuck::cast_slice(&m.quad_verts),
                bytemuck::cast_slice(&m.tri_verts),
            );
        }
        self.dirty = false;
        self.num_builds += 1;
        true
    }

    pub fn num_verts(&self) -> usize {
        self.materials.iter().map(MaterialGroup::num_verts).sum()
    }
}

/// Emit stair steps rising along the marker's run direction.
fn add_stair_steps(group: &mut MaterialGroup, obj: &RoomObject, shape: ObjShape, color: Color) {
    const NUM_STEPS: usize = 8;
    let c = obj.cube;
    let dim = obj.dim as usize;
    if obj.flags & obj_flags::TOS != 0 {
        group.add_cube_to_verts(&c, color, 0);
        return;
    }
    // U-shaped stairs climb half the height in each of two side-by-side flights.
    let flights: Vec<(Cube, bool, f32, f32)> = if shape == ObjShape::StairsU {
        let od = 1 - dim;
        let (a, b) = c.split(od, c.center_dim(od));
        let zm = c.lo.z + 0.5 * c.dz();
        vec![(a, obj.dir, c.lo.z, zm), (b, !obj.dir, zm, c.hi.z)]
    } else {
        vec![(c, obj.dir, c.lo.z, c.hi.z)]
    };
    for (fc, dir, z1, z2) in flights {
        let len = fc.get_sz_dim(dim);
        let rise = (z2 - z1) / NUM_STEPS as f32;
        let run = len / NUM_STEPS as f32;
        for i in 0..NUM_STEPS {
            let mut step = fc;
            if dir {
                step.lo[dim] = fc.lo[dim] + i as f32 * run;
            } else {
                step.hi[dim] = fc.hi[dim] - i as f32 * run;
            }
            step.lo.z = z1;
            step.hi.z = z1 + (i + 1) as f32 * rise;
            group.add_cube_to_verts(&step, color, 1 << 4);
        }
    }
}

// ── Object placement ───────────────────────────────────────────────────

/// Usable floor area of a room on one of its floors.
fn room_floor_cube(int: &Interior, room: &Room, f: usize, nfloors: usize) -> Cube {
    let spacing = int.floor_spacing;
    let slab = int.slab_thick;
    let fz = room.cube.lo.z + f as f32 * spacing;
    let top = if f + 1 == nfloors { room.cube.hi.z } else { fz + spacing };
    let mut c = room.cube.expand_by_xy(-proportions::WALL_THICK * spacing);
    c.lo.z = fz + slab;
    c.hi.z = top - slab;
    c
}

/// `c` is inside `bounds` and clear of blockers and door swing zones.
pub fn is_valid_placement_for_room(c: &Cube, bounds: &Cube, blockers: &[Cube], int: &Interior) -> bool {
    bounds.contains_cube_xy(c)
        && !blockers.iter().any(|bc| bc.intersects(c))
        && !int.is_cube_close_to_doorway(c, proportions::DOOR_CLEARANCE * int.floor_spacing)
}

struct Placer<'a> {
    int: &'a Interior,
    rng: GenRng,
    objs: Vec<RoomObject>,
    spacing: f32,
}

impl Placer<'_> {
    fn push(&mut self, mut obj: RoomObject) -> usize {
        obj.obj_id = self.objs.len().min(u16::MAX as usize) as u16;
        self.objs.push(obj);
        self.objs.len() - 1
    }

    fn blockers_for(&self, floor_c: &Cube, fixed: &[Cube], first_obj: usize) -> Vec<Cube> {
        let mut out: Vec<Cube> = fixed.iter().filter(|c| c.intersects(floor_c)).copied().collect();
        out.extend(self.objs[first_obj..].iter().filter(|o| !o.is_light() && !o.no_coll()).map(|o| o.cube));
        out
    }

    /// Table with up to four chairs around it. Returns false if the table did not fit.
    fn add_table_and_chairs(&mut self, room: &Room, bounds: &Cube, fixed: &[Cube], first_obj: usize) -> bool {
        let s = self.spacing;
        let round = rand_chance(&mut self.rng, 0.3);
        let (hx, hy) = if round {
            let r = rand_uniform(&mut self.rng, 0.25, 0.35) * s;
            (r, r)
        } else {
            (rand_uniform(&mut self.rng, 0.25, 0.35) * s, rand_uniform(&mut self.rng, 0.18, 0.25) * s)
        };
        let chair_sz = 0.18 * s;
        let margin = 2.0 * chair_sz;
        let inner = bounds.expand_by_xy(-margin);
        if inner.dx() <= 2.0 * hx || inner.dy() <= 2.0 * hy {
            return false;
        }
        for _ in 0..tries::FURNITURE {
            let center = Vec3::new(
                rand_uniform(&mut self.rng, inner.lo.x + hx, inner.hi.x - hx),
                rand_uniform(&mut self.rng, inner.lo.y + hy, inner.hi.y - hy),
                bounds.lo.z,
            );
            let table = Cube::new(
                Vec3::new(center.x - hx, center.y - hy, bounds.lo.z),
                Vec3::new(center.x + hx, center.y + hy, bounds.lo.z + 0.25 * s),
            );
            let blockers = self.blockers_for(bounds, fixed, first_obj);
            if !is_valid_placement_for_room(&table, bounds, &blockers, self.int) {
                continue;
            }
            let mut obj = RoomObject::new(table, RoomObjectKind::Table, room.room_id);
            obj.shape = if round { ObjShape::Cylinder } else { ObjShape::Cube };
            obj.color = Color::LT_BROWN;
            self.push(obj);

            for dim in 0..2 {
                for dir in [false, true] {
                    let mut pos = center;
                    let half = if dim == 0 { hx } else { hy };
                    pos[dim] += if dir { half + 0.6 * chair_sz } else { -(half + 0.6 * chair_sz) };
                    let chair = Cube::new(
                        Vec3::new(pos.x - 0.5 * chair_sz, pos.y - 0.5 * chair_sz, bounds.lo.z),
                        Vec3::new(pos.x + 0.5 * chair_sz, pos.y + 0.5 * chair_sz, bounds.lo.z + 0.3 * s),
                    );
                    let blockers = self.blockers_for(bounds, fixed, first_obj);
                    if is_valid_placement_for_room(&chair, bounds, &blockers, self.int) {
                        let mut c = RoomObject::new(chair, RoomObjectKind::Chair, room.room_id);
                        c.dim = dim as u8;
                        c.dir = !dir;
                        c.color = Color::BROWN;
                        self.push(c);
                    }
                }
            }
            return true;
        }
        false
    }

    /// Box of `size` pushed against a random wall of `bounds`, facing into the room.
    fn against_wall(&mut self, bounds: &Cube, along: f32, depth: f32, height: f32) -> Option<(Cube, usize, bool)> {
        let dim = rand_index(&mut self.rng, 2);
        let dir = rand_chance(&mut self.rng, 0.5);
        let od = 1 - dim;
        if height <= 0.0 || bounds.get_sz_dim(od) <= along || bounds.get_sz_dim(dim) <= depth {
            return None;
        }
        let p = rand_uniform(&mut self.rng, bounds.lo[od], bounds.hi[od] - along);
        let mut c = *bounds;
        c.lo[od] = p;
        c.hi[od] = p + along;
        if dir {
            c.lo[dim] = bounds.hi[dim] - depth;
        } else {
            c.hi[dim] = bounds.lo[dim] + depth;
        }
        c.hi.z = bounds.lo.z + height;
        Some((c, dim, !dir))
    }

    fn add_office_furniture(&mut self, room: &Room, bounds: &Cube, fixed: &[Cube], first_obj: usize) {
        let s = self.spacing;
        for _ in 0..tries::FURNITURE {
            let Some((desk, dim, facing)) = self.against_wall(bounds, 0.6 * s, 0.3 * s, 0.25 * s) else {
                break;
            };
            let blockers = self.blockers_for(bounds, fixed, first_obj);
            if !is_valid_placement_for_room(&desk, bounds, &blockers, self.int) {
                continue;
            }
            let mut d = RoomObject::new(desk, RoomObjectKind::Desk, room.room_id);
            d.dim = dim as u8;
            d.dir = facing;
            d.color = Color::BROWN;
            self.push(d);

            let mut chair = desk;
            let cw = 0.18 * s;
            let cc = desk.center_dim(1 - dim);
            chair.lo[1 - dim] = cc - 0.5 * cw;
            chair.hi[1 - dim] = cc + 0.5 * cw;
            let front = desk.d(dim, facing);
            chair.lo[dim] = if facing { front } else { front - cw };
            chair.hi[dim] = chair.lo[dim] + cw;
            chair.hi.z = bounds.lo.z + 0.3 * s;
            let blockers = self.blockers_for(bounds, fixed, first_obj);
            if is_valid_placement_for_room(&chair, bounds, &blockers, self.int) {
                let mut c = RoomObject::new(chair, RoomObjectKind::Chair, room.room_id);
                c.dim = dim as u8;
                c.dir = !facing;
                self.push(c);
            }
            break;
        }
        self.add_trashcan(room, bounds, fixed, first_obj);
    }

    fn add_trashcan(&mut self, room: &Room, bounds: &Cube, fixed: &[Cube], first_obj: usize) {
        let r = 0.06 * self.spacing;
        let h = 0.12 * self.spacing;
        for _ in 0..tries::FURNITURE {
            let x = if rand_chance(&mut self.rng, 0.5) { bounds.lo.x } else { bounds.hi.x - 2.0 * r };
            let y = if rand_chance(&mut self.rng, 0.5) { bounds.lo.y } else { bounds.hi.y - 2.0 * r };
            let c = Cube::new(Vec3::new(x, y, bounds.lo.z), Vec3::new(x + 2.0 * r, y + 2.0 * r, bounds.lo.z + h));
            let blockers = self.blockers_for(bounds, fixed, first_obj);
            if is_valid_placement_for_room(&c, bounds, &blockers, self.int) {
                let mut obj = RoomObject::new(c, RoomObjectKind::TrashCan, room.room_id);
                obj.shape = ObjShape::Cylinder;
                obj.color = Color::GRAY;
                self.push(obj);
                return;
            }
        }
    }

    fn add_bookcase(&mut self, room: &Room, bounds: &Cube, fixed: &[Cube], first_obj: usize) {
        let s = self.spacing;
        let height = (0.6 * s).min(bounds.dz() - 0.05 * s);
        if height <= 0.0 {
            return;
        }
        for _ in 0..tries::FURNITURE {
            let Some((bc, dim, facing)) = self.against_wall(bounds, 0.5 * s, 0.15 * s, height) else {
                return;
            };
            let blockers = self.blockers_for(bounds, fixed, first_obj);
            if !is_valid_placement_for_room(&bc, bounds, &blockers, self.int) {
                continue;
            }
            let mut obj = RoomObject::new(bc, RoomObjectKind::Bookcase, room.room_id);
            obj.dim = dim as u8;
            obj.dir = facing;
            obj.color = Color::BROWN;
            self.push(obj);

            let od = 1 - dim;
            let num_shelves = 3;
            let shelf_h = bc.dz() / num_shelves as f32;
            for shelf in 0..num_shelves {
                let z0 = bc.lo.z + shelf as f32 * shelf_h + 0.02 * s;
                let mut pos = bc.lo[od] + 0.02 * s;
                let nbooks = rand_int(&mut self.rng, 3, 8);
                for _ in 0..nbooks {
                    let w = rand_uniform(&mut self.rng, 0.02, 0.04) * s;
                    let h = rand_uniform(&mut self.rng, 0.5, 0.85) * shelf_h;
                    if pos + w > bc.hi[od] - 0.02 * s {
                        break;
                    }
                    let mut book = bc.expand_by_xy(-0.01 * s);
                    book.lo[od] = pos;
                    book.hi[od] = pos + w;
                    book.lo.z = z0;
                    book.hi.z = z0 + h;
                    let mut b = RoomObject::new(book, RoomObjectKind::Book, room.room_id);
                    b.flags |= obj_flags::NOCOLL;
                    b.color = Color::rgb(
                        rand_uniform(&mut self.rng, 0.2, 0.9),
                        rand_uniform(&mut self.rng, 0.2, 0.9),
                        rand_uniform(&mut self.rng, 0.2, 0.9),
                    );
                    self.push(b);
                    pos += w + 0.005 * s;
                }
            }
            return;
        }
    }

    /// Ceiling lights for one room floor; hallways get one every two floor spacings.
    fn add_lights(&mut self, room: &Room, bounds: &Cube, fixed: &[Cube], lit_prob: f32) -> usize {
        let s = self.spacing;
        let d = room.cube.longer_xy_dim();
        let n = if room.is_hallway {
            ((bounds.get_sz_dim(d) / (2.0 * s)).floor() as usize).max(1)
        } else {
            1
        };
        let half = 0.1 * s;
        let mut added = 0;
        for i in 0..n {
            let mut center = bounds.center();
            center[d] = bounds.lo[d] + (i as f32 + 0.5) * bounds.get_sz_dim(d) / n as f32;
            let light_at = |c: Vec3| {
                Cube::new(
                    Vec3::new(c.x - half, c.y - half, bounds.hi.z - 0.02 * s),
                    Vec3::new(c.x + half, c.y + half, bounds.hi.z),
                )
            };
            // Slide off stair and elevator holes in the ceiling.
            let mut cube = light_at(center);
            for step in 1..=4 {
                if !fixed.iter().any(|f| f.intersects_xy(&cube)) {
                    break;
                }
                let mut c2 = center;
                let od = 1 - d;
                c2[od] += step as f32 * 0.25 * s * if step % 2 == 0 { 1.0 } else { -1.0 };
                cube = light_at(c2);
            }
            if !bounds.contains_cube_xy(&cube) {
                continue;
            }
            let mut obj = RoomObject::new(cube, RoomObjectKind::Light, room.room_id);
            obj.flags |= obj_flags::NOCOLL;
            obj.color = Color::WARM_LIGHT;
            obj.set_lit(rand_chance(&mut self.rng, lit_prob));
            self.push(obj);
            added += 1;
        }
        added
    }
}

/// Populate the room objects of `int` for building `b`.
///
/// `peds` are the current bounding boxes of dynamic agents; furniture never overlaps them.
/// Lights are placed first from their own stream and ignore `peds`, so the light list is
/// the same for any set of agents. Updates each floor's lit bit and each room's light
/// count as a side effect.
pub fn gen_room_details(b: &Building, int: &mut Interior, peds: &[Cube]) -> RoomGeom {
    let spacing = int.floor_spacing;
    let mut fixed: Vec<Cube> = Vec::new();
    for s in &int.stairwells {
        let mut c = s.cube.expand_by_xy(0.1 * spacing);
        c.expand_in_dim(s.dim as usize, 0.5 * spacing);
        fixed.push(c);
    }
    for e in &int.elevators {
        let mut c = e.cube.expand_by_xy(0.1 * spacing);
        c.expand_in_dim(e.dim as usize, 0.5 * spacing);
        fixed.push(c);
    }
    // Walled stairs add walls that are not on room boundaries.
    fixed.extend(int.all_walls().copied());
    for i in 0..b.doors.len() {
        if let Some(mut dc) = b.door_cube(i) {
            let dim = usize::from(dc.dy() < dc.dx());
            dc.expand_in_dim(dim, proportions::DOOR_CLEARANCE * spacing);
            fixed.push(dc);
        }
    }
    let num_static = fixed.len();
    fixed.extend_from_slice(peds);

    let mut placer = Placer {
        int: &*int,
        rng: rng_for_seeds_stream(b.seed1, b.seed2, streams::ROOM_LIGHTS),
        objs: Vec::new(),
        spacing,
    };
    let mut lit_floors: Vec<usize> = Vec::new();
    let mut room_lights: Vec<u8> = vec![0; int.rooms.len()];

    // Lights
    for (ri, room) in int.rooms.iter().enumerate() {
        let nfloors = int.room_floors(room);
        let first_floor = int.room_first_floor(room);
        for f in 0..nfloors {
            let bounds = room_floor_cube(int, room, f, nfloors);
            if !bounds.is_strictly_normalized() {
                continue;
            }
            let first_obj = placer.objs.len();
            let lit_prob = if room.is_office || room.is_hallway { 0.7 } else { 0.5 };
            let n_lights = placer.add_lights(room, &bounds, &fixed[..num_static], lit_prob);
            room_lights[ri] = room_lights[ri].saturating_add(n_lights as u8);
            if placer.objs[first_obj..].iter().any(|o| o.is_lit()) {
                lit_floors.push(first_floor + f);
            }
        }
    }

    // Furniture
    placer.rng = rng_for_seeds_stream(b.seed1, b.seed2, streams::ROOM_CONTENTS);
    for room in &int.rooms {
        if room.is_hallway {
            continue;
        }
        let nfloors = int.room_floors(room);
        for f in 0..nfloors {
            let bounds = room_floor_cube(int, room, f, nfloors);
            if !bounds.is_strictly_normalized() || bounds.area_xy() < 2.0 * spacing * spacing {
                continue;
            }
            let first_obj = placer.objs.len();
            if room.is_office {
                placer.add_office_furniture(room, &bounds, &fixed, first_obj);
            } else if rand_chance(&mut placer.rng, 0.75) {
                placer.add_table_and_chairs(room, &bounds, &fixed, first_obj);
            }
            if rand_chance(&mut placer.rng, 0.4) {
                placer.add_bookcase(room, &bounds, &fixed, first_obj);
            }
        }
    }

    let stairs_start = placer.objs.len();
    for s in &int.stairwells {
        let n = s.num_floors as usize;
        for f in 0..n {
            let fz = s.cube.lo.z + f as f32 * spacing;
            let mut c = s.cube;
            c.lo.z = fz;
            let top = f + 1 == n;
            c.hi.z = if top { fz + int.slab_thick } else { (fz + spacing).min(s.cube.hi.z) };
            if !c.is_strictly_normalized() {
                continue;
            }
            let probe = Vec3::new(c.center().x, c.center().y, fz + int.slab_thick + 0.01);
            let room_id = int.find_room_containing(probe).map_or(0, |r| int.rooms[r].room_id);
            let mut obj = RoomObject::new(c, RoomObjectKind::Stair, room_id);
            obj.shape = if s.shape == StairsShape::U { ObjShape::StairsU } else { ObjShape::Cube };
            obj.flags |= obj_flags::RSTAIRS | obj_flags::NOCOLL;
            if top {
                obj.flags |= obj_flags::TOS;
            }
            obj.dim = s.dim;
            obj.dir = s.dir;
            obj.color = b.colors.floor;
            placer.push(obj);
        }
    }
    for e in &int.elevators {
        let room_id = int.find_room_containing(e.cube.center()).map_or(0, |r| int.rooms[r].room_id);
        let mut obj = RoomObject::new(e.cube, RoomObjectKind::Elevator, room_id);
        obj.flags |= obj_flags::NOCOLL;
        obj.dim = e.dim;
        obj.dir = e.dir;
        obj.color = Color::LT_GRAY;
        placer.push(obj);
    }

    let objs = std::mem::take(&mut placer.objs);
    drop(placer);
    int.lit_by_floor = 0;
    for f in lit_floors {
        int.set_floor_lit(f, true);
    }
    for (room, n) in int.rooms.iter_mut().zip(room_lights) {
        room.num_lights = n;
    }

    let mut rg = RoomGeom {
        objs,
        stairs_start,
        ..RoomGeom::default()
    };
    let reach = 2.5 * spacing;
    for i in rg.light_ixs().collect::<Vec<_>>() {
        let c = rg.objs[i].cube;
        let mut lpos = c.center();
        lpos.z = c.lo.z - 0.01 * spacing;
        let mut lb = refine_light_bcube(int, lpos, reach);
        lb.hi.z = lb.hi.z.max(c.hi.z);
        rg.set_light_bcube(i, lb);
        // Nothing is baked yet, so every lit light is a pending change.
        if rg.objs[i].is_lit() {
            rg.pending_bake.push(i);
        }
    }
    rg
}

impl Building {
    /// Create room objects and geometry if they do not exist yet. Returns true if created.
    pub fn ensure_room_geom(&mut self, mat: &BuildingMaterial, peds: &[Cube]) -> bool {
        let Some(mut int) = self.interior.take() else {
            return false;
        };
        let created = if int.room_geom.is_none() {
            let mut rg = gen_room_details(self, &mut int, peds);
            rg.rebuild_geometry(mat);
            log::debug!(
                "room geom for building ({}, {}): {} objects, {} material groups",
                self.seed1,
                self.seed2,
                rg.objs.len(),
                rg.materials.len()
            );
            int.room_geom = Some(Box::new(rg));
            int.bvh = None;
            true
        } else {
            false
        };
        self.interior = Some(int);
        created
    }

    /// Drop room objects and their geometry; lights go with them.
    pub fn clear_room_geom(&mut self) {
        if let Some(int) = self.interior.as_deref_mut() {
            int.room_geom = None;
            int.bvh = None;
            int.lit_by_floor = 0;
        }
    }

    pub fn room_objects(&self) -> &[RoomObject] {
        self.interior
            .as_deref()
            .and_then(|i| i.room_geom.as_deref())
            .map_or(&[], |rg| rg.objs.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::BuildingParams;
    use crate::shape::gen_geometry;

    struct CountingUploader {
        calls: usize,
        bytes: usize,
    }

    impl GeomUploader for CountingUploader {
        fn upload(&mut self, _tex: &TexDesc, quad_verts: &[u8], tri_verts: &[u8]) {
            self.calls += 1;
            self.bytes += quad_verts.len() + tri_verts.len();
        }
    }

    /// First office building at or after `seed` that has an interior.
    fn office(seed: u64) -> (Building, BuildingParams) {
        let params = BuildingParams::test_params();
        let b = (seed..seed + 100)
            .map(|s| gen_geometry(&params, 0, Vec3::ZERO, s, 3))
            .find(|b| b.has_interior())
            .expect("no office with an interior");
        (b, params)
    }

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 28);
    }

    #[test]
    fn cube_faces_and_skips() {
        let mut g = MaterialGroup::new(TexDesc::default());
        let c = Cube::from_bounds(0.0, 1.0, 0.0, 1.0, 0.0, 1.0);
        g.add_cube_to_verts(&c, Color::WHITE, 0);
        assert_eq!(g.quad_verts.len(), 24);
        g.clear();
        g.add_cube_to_verts(&c, Color::WHITE, 1 << 4);
        assert_eq!(g.quad_verts.len(), 20);
        assert!(g.quad_verts.iter().all(|v| v.norm[2] >= 0));
    }

    #[test]
    fn cylinder_verts() {
        let mut g = MaterialGroup::new(TexDesc::default());
        let c = Cube::from_bounds(0.0, 2.0, 0.0, 2.0, 0.0, 1.0);
        g.add_vcylin_to_verts(&c, 8, Color::WHITE, true, true);
        assert_eq!(g.quad_verts.len(), 32);
        assert_eq!(g.tri_verts.len(), 48);
        for v in &g.quad_verts {
            let d = Vec3::new(v.pos[0] - 1.0, v.pos[1] - 1.0, 0.0).length();
            assert!((d - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn room_geom_is_lazy_and_built_once() {
        let (mut b, params) = office(11);
        assert!(b.has_interior());
        let mat = params.get_material(b.mat_ix).clone();
        assert!(b.ensure_room_geom(&mat, &[]));
        assert!(!b.ensure_room_geom(&mat, &[]));
        let rg = b.interior.as_mut().unwrap().room_geom.as_mut().unwrap();
        assert!(rg.dirty);
        let mut up = CountingUploader { calls: 0, bytes: 0 };
        assert!(rg.build(&mut up));
        assert!(!rg.build(&mut up));
        assert_eq!(up.calls, rg.materials.len());
        assert_eq!(up.bytes, rg.num_verts() * std::mem::size_of::<Vertex>());
        b.clear_room_geom();
        assert!(b.room_objects().is_empty());
    }

    #[test]
    fn objects_are_normalized_and_avoid_doors() {
        for seed in 0..10 {
            let (mut b, params) = office(seed);
            let mat = params.get_material(b.mat_ix).clone();
            assert!(b.ensure_room_geom(&mat, &[]));
            let int = b.interior.as_ref().unwrap();
            let spacing = int.floor_spacing;
            for o in b.room_objects() {
                assert!(o.cube.is_strictly_normalized());
                if matches!(o.kind, RoomObjectKind::Table | RoomObjectKind::Chair | RoomObjectKind::Desk) {
                    assert!(!int.is_cube_close_to_doorway(&o.cube, proportions::DOOR_CLEARANCE * spacing));
                }
            }
        }
    }

    #[test]
    fn stair_markers_follow_stairs_start() {
        let (mut b, params) = office(5);
        let mat = params.get_material(b.mat_ix).clone();
        b.ensure_room_geom(&mat, &[]);
        let Some(rg) = b.interior.as_ref().and_then(|i| i.room_geom.as_ref()) else {
            return;
        };
        assert!(rg.objs[..rg.stairs_start].iter().all(|o| o.kind != RoomObjectKind::Stair));
        for o in rg.objs[rg.stairs_start..].iter().filter(|o| o.kind == RoomObjectKind::Stair) {
            assert!(o.flags & obj_flags::RSTAIRS != 0);
            assert!(o.no_coll());
        }
    }

    #[test]
    fn furniture_avoids_pedestrians() {
        let (mut b, params) = office(7);
        let mat = params.get_material(b.mat_ix).clone();
        let int = b.interior.as_ref().unwrap();
        // One agent standing in the middle of every room.
        let peds: Vec<Cube> = int
            .rooms
            .iter()
            .map(|r| Cube::from_center_half(Vec3::new(r.cube.center().x, r.cube.center().y, r.cube.lo.z + 1.0), Vec3::new(0.3, 0.3, 1.0)))
            .collect();
        b.ensure_room_geom(&mat, &peds);
        for o in b.room_objects().iter().filter(|o| !o.no_coll() && !o.is_light()) {
            assert!(peds.iter().all(|p| !p.intersects(&o.cube)), "{:?} overlaps an agent", o.kind);
        }
    }

    #[test]
    fn lights_do_not_depend_on_pedestrians() {
        for seed in 0..8 {
            let (b, params) = office(seed * 3);
            let mat = params.get_material(b.mat_ix).clone();
            let int = b.interior.as_ref().unwrap();
            let peds: Vec<Cube> = int
                .rooms
                .iter()
                .map(|r| Cube::from_center_half(Vec3::new(r.cube.center().x, r.cube.center().y, r.cube.lo.z + 1.0), Vec3::new(0.3, 0.3, 1.0)))
                .collect();

            let lights = |peds: &[Cube]| {
                let mut b = b.clone();
                b.ensure_room_geom(&mat, peds);
                let lit_by_floor = b.interior.as_ref().unwrap().lit_by_floor;
                let list: Vec<(Cube, bool)> =
                    b.room_objects().iter().filter(|o| o.is_light()).map(|o| (o.cube, o.is_lit())).collect();
                (list, lit_by_floor)
            };
            assert_eq!(lights(&[]), lights(&peds));
        }
    }
}
