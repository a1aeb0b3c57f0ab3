//! Interior layout generator.
//!
//! Runs strictly in order for one building:
//! 1. Floor slicing: floor and ceiling slabs per floor of every real part
//! 2. Room subdivision: hallway plans for long office parts, recursive splits otherwise
//! 3. Vertical connectors: stairs per part, elevators in tall office parts, and
//!    stairs between vertically stacked parts
//! 4. Interior doors from the door openings, plus doors between adjacent parts
//!
//! Steps 1-3 run in `gen_interior`. The exterior doors are placed next, since they must
//! avoid walls and stairs. Step 4 then runs in `finish_interior`. A placement that runs
//! out of retries is dropped silently. The building stays valid with fewer features.

use glam::Vec3;

use crate::building::Building;
use crate::constants::{proportions, tries, FLOOR_THICK_VAL, MAX_ROOMS_PER_FLOOR, TOLERANCE};
use crate::geom::{set_wall_width, subtract_cube_from_cube, Cube};
use crate::interior::{floors_in_height, Door, Elevator, Interior, Landing, Room, StairsShape, Stairwell};
use crate::materials::BuildingParams;
use crate::rng::{rand_chance, rand_index, rand_uniform, rng_for_seeds_stream, streams, GenRng};

/// Door opening cut through an interior wall on every floor of its part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingDoor {
    pub cube: Cube,
    pub dim: u8,
    pub part: u8,
}

/// Interior wall footprint spanning its part's full height; cut into floors later.
#[derive(Debug, Clone, Copy, PartialEq)]
struct WallSeg {
    cube: Cube,
    dim: u8,
    part: u8,
}

/// Shared face between two adjacent real parts.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PartLink {
    wall: Cube,
    dim: u8,
    part_a: u8,
    part_b: u8,
    opening: Option<Cube>,
    floors: u32,
}

/// Layout data carried from `gen_interior` to `finish_interior`.
pub struct LayoutState {
    pending_doors: Vec<PendingDoor>,
    wall_segs: Vec<WallSeg>,
    links: Vec<PartLink>,
    part_floors: Vec<u32>,
    rng: GenRng,
}

impl LayoutState {
    pub fn pending_doors(&self) -> &[PendingDoor] {
        &self.pending_doors
    }
}

/// Number of floors that fit in `part`, counting a partial top floor as part of the floor below.
///
/// Returns 0 if the part is shorter than half a floor. With `exact_mult` the part's top is
/// moved so the height is exactly `spacing * floors`.
pub fn calc_num_floors(part: &mut Cube, spacing: f32, thickness: f32, exact_mult: bool) -> u32 {
    if spacing <= 0.0 {
        return 0;
    }
    let dz = part.dz();
    if dz < 0.5 * spacing || dz <= thickness {
        return 0;
    }
    let n = floors_in_height(dz, spacing) as u32;
    if exact_mult {
        part.hi.z = part.lo.z + n as f32 * spacing;
    }
    n
}

fn wall_half(spacing: f32) -> f32 {
    proportions::WALL_THICK * spacing
}

// ── Step 1-3 ───────────────────────────────────────────────────────────

/// Attach an interior to `b`. Only rectangular footprints get interiors.
pub fn gen_interior(b: &mut Building, params: &BuildingParams) -> Option<LayoutState> {
    if !b.geom.is_cube() || b.real_num_parts == 0 || b.interior.is_some() {
        return None;
    }
    let spacing = b.floor_spacing;
    let slab = 0.5 * FLOOR_THICK_VAL * spacing;
    let mut int = Interior::new(b.ground_z(), spacing, slab);
    let mut st = LayoutState {
        pending_doors: Vec::new(),
        wall_segs: Vec::new(),
        links: Vec::new(),
        part_floors: Vec::with_capacity(b.real_num_parts),
        rng: rng_for_seeds_stream(b.seed1, b.seed2, streams::INTERIOR),
    };

    // 1. Floors and ceilings
    for p in 0..b.real_num_parts {
        let mut part = b.parts[p];
        let n = calc_num_floors(&mut part, spacing, 2.0 * slab, false);
        st.part_floors.push(n);
        for f in 0..n {
            let fz = part.lo.z + f as f32 * spacing;
            let ctop = if f + 1 == n { part.hi.z } else { fz + spacing };
            let mut floor = part;
            floor.lo.z = fz;
            floor.hi.z = fz + slab;
            let mut ceil = part;
            ceil.lo.z = ctop - slab;
            ceil.hi.z = ctop;
            int.floors.push(floor);
            int.ceilings.push(ceil);
        }
        int.part_floors.push(n as usize);
        if n > 0 {
            let first_floor = int.get_floor_for_z(part.lo.z + 0.5 * slab);
            int.num_floors = int.num_floors.max(first_floor + n as usize);
        }
    }

    // 2. Rooms
    for p in 0..b.real_num_parts {
        if st.part_floors[p] == 0 || int.rooms.len() >= MAX_ROOMS_PER_FLOOR {
            continue;
        }
        let part = b.parts[p];
        let d = part.longer_xy_dim();
        let aspect = part.get_sz_dim(d) / part.get_sz_dim(1 - d);
        if !b.is_house() && aspect > 1.5 && gen_hallway_layout(&mut int, &mut st, &part, p, spacing) {
            continue;
        }
        subdivide_rec(&mut int, &mut st, part, p, spacing, params.wall_split_thresh, 0);
    }
    set_room_ext_sides(b, &mut int);
    find_part_links(b, &int, &mut st);

    // 3. Stairs, elevators, stacked-part connectors
    for p in 0..b.real_num_parts {
        place_stairs_in_part(b, &mut int, &mut st, p);
        if !b.is_house() && st.part_floors[p] >= 4 {
            place_elevator_in_part(b, &mut int, &mut st, p);
        }
    }
    connect_stacked_parts_with_stairs(b, &mut int, &mut st);
    clip_slabs_for_connectors(&mut int);

    materialize_walls(b, &mut int, &st);
    log::debug!(
        "interior: {} rooms, {} stairwells, {} elevators, {} wall segs",
        int.rooms.len(),
        int.stairwells.len(),
        int.elevators.len(),
        st.wall_segs.len()
    );
    b.interior = Some(Box::new(int));
    Some(st)
}

fn add_room(int: &mut Interior, cube: Cube, part: usize) -> Option<usize> {
    if int.rooms.len() >= MAX_ROOMS_PER_FLOOR {
        return None;
    }
    let id = int.rooms.len();
    int.rooms.push(Room::new(cube, part as u8, id as u8));
    Some(id)
}

/// Does a wall at `w` come too close to an existing door opening?
fn wall_blocks_opening(st: &LayoutState, w: &Cube, spacing: f32) -> bool {
    st.pending_doors.iter().any(|pd| {
        let mut zone = pd.cube;
        zone.expand_in_dim(pd.dim as usize, proportions::DOOR_CLEARANCE * spacing);
        zone.expand_in_dim(1 - pd.dim as usize, 0.1 * spacing);
        zone.intersects(w)
    })
}

/// Recursively split `c` until its aspect ratio and length fall under `thresh`.
fn subdivide_rec(
    int: &mut Interior,
    st: &mut LayoutState,
    c: Cube,
    part: usize,
    spacing: f32,
    thresh: f32,
    depth: u32,
) {
    let d = c.longer_xy_dim();
    let od = 1 - d;
    let len = c.get_sz_dim(d);
    let other = c.get_sz_dim(od);
    let min_side = proportions::MIN_ROOM_SIDE * spacing;
    let wh = wall_half(spacing);
    let dw = proportions::DOOR_WIDTH * spacing;
    let want = len / other > thresh || len / spacing > thresh;
    let room_budget = int.rooms.len() + 2 + depth as usize <= MAX_ROOMS_PER_FLOOR;

    if want && room_budget && depth < 16 && len >= 2.0 * min_side && other >= dw + 4.0 * wh {
        for _ in 0..10 {
            let pos = (c.lo[d] + len * rand_uniform(&mut st.rng, 0.35, 0.65))
                .clamp(c.lo[d] + min_side, c.hi[d] - min_side);
            let mut wall = c;
            set_wall_width(&mut wall, pos, wh, d);
            if wall_blocks_opening(st, &wall, spacing) {
                continue;
            }
            let oc = rand_uniform(
                &mut st.rng,
                c.lo[od] + 0.5 * dw + 2.0 * wh,
                c.hi[od] - 0.5 * dw - 2.0 * wh,
            );
            let mut opening = wall;
            opening.expand_in_dim(d, 0.1 * wh);
            opening.lo[od] = oc - 0.5 * dw;
            opening.hi[od] = oc + 0.5 * dw;
            st.wall_segs.push(WallSeg { cube: wall, dim: d as u8, part: part as u8 });
            st.pending_doors.push(PendingDoor { cube: opening, dim: d as u8, part: part as u8 });

            let (a, b) = c.split(d, pos);
            subdivide_rec(int, st, a, part, spacing, thresh, depth + 1);
            subdivide_rec(int, st, b, part, spacing, thresh, depth + 1);
            return;
        }
    }
    add_room(int, c, part);
}

/// Central hallway along the long dimension with offices on both sides.
fn gen_hallway_layout(int: &mut Interior, st: &mut LayoutState, part: &Cube, p: usize, spacing: f32) -> bool {
    let d = part.longer_xy_dim();
    let od = 1 - d;
    let hw = proportions::HALL_WIDTH * spacing;
    let min_side = proportions::MIN_ROOM_SIDE * spacing;
    let wh = wall_half(spacing);
    let dw = proportions::DOOR_WIDTH * spacing;
    let len = part.get_sz_dim(d);
    if part.get_sz_dim(od) < hw + 2.0 * min_side {
        return false;
    }
    let office_len = 2.5 * spacing;
    let n = ((len / office_len).floor() as usize).max(1);
    if int.rooms.len() + 2 * n + 1 > MAX_ROOMS_PER_FLOOR {
        return false;
    }
    let hc = part.center_dim(od);
    let mut hall = *part;
    hall.lo[od] = hc - 0.5 * hw;
    hall.hi[od] = hc + 0.5 * hw;
    if let Some(ix) = add_room(int, hall, p) {
        int.rooms[ix].is_hallway = true;
    }

    for dir in [false, true] {
        let mut strip = *part;
        if dir {
            strip.lo[od] = hall.hi[od];
        } else {
            strip.hi[od] = hall.lo[od];
        }
        let mut long_wall = strip;
        set_wall_width(&mut long_wall, hall.d(od, dir), wh, od);
        st.wall_segs.push(WallSeg { cube: long_wall, dim: od as u8, part: p as u8 });

        let step = len / n as f32;
        for i in 0..n {
            let mut office = strip;
            office.lo[d] = part.lo[d] + i as f32 * step;
            office.hi[d] = if i + 1 == n { part.hi[d] } else { part.lo[d] + (i + 1) as f32 * step };
            if i > 0 {
                let mut cross = strip;
                set_wall_width(&mut cross, office.lo[d], wh, d);
                st.wall_segs.push(WallSeg { cube: cross, dim: d as u8, part: p as u8 });
            }
            let center = office.center_dim(d);
            let mut opening = long_wall;
            opening.expand_in_dim(od, 0.1 * wh);
            opening.lo[d] = center - 0.5 * dw;
            opening.hi[d] = center + 0.5 * dw;
            st.pending_doors.push(PendingDoor { cube: opening, dim: od as u8, part: p as u8 });
            if let Some(ix) = add_room(int, office, p) {
                int.rooms[ix].is_office = true;
            }
        }
    }
    true
}

/// Mark room sides that lie on the building's exterior.
fn set_room_ext_sides(b: &Building, int: &mut Interior) {
    let spacing = b.floor_spacing;
    for room in &mut int.rooms {
        let part = b.parts[room.part_id as usize];
        for d in 0..2 {
            for dir in [false, true] {
                if (room.cube.d(d, dir) - part.d(d, dir)).abs() > TOLERANCE {
                    continue;
                }
                let step = if dir { 0.01 * spacing } else { -0.01 * spacing };
                let mut p = room.cube.center();
                p[d] = room.cube.d(d, dir) + step;
                p.z = room.cube.lo.z + 0.5 * spacing;
                let covered = b
                    .real_parts()
                    .iter()
                    .enumerate()
                    .any(|(i, o)| i != room.part_id as usize && o.contains_pt(p));
                if !covered {
                    room.ext_sides |= 1 << (2 * d + usize::from(dir));
                }
            }
        }
    }
}

/// Find vertical faces shared by two real parts and choose a connecting door opening.
fn find_part_links(b: &Building, int: &Interior, st: &mut LayoutState) {
    let spacing = b.floor_spacing;
    let wh = wall_half(spacing);
    let dw = proportions::DOOR_WIDTH * spacing;
    let parts = b.real_parts();

    for i in 0..parts.len() {
        for j in (i + 1)..parts.len() {
            let floors = st.part_floors[i].min(st.part_floors[j]);
            if floors == 0 || (parts[i].lo.z - parts[j].lo.z).abs() > TOLERANCE {
                continue;
            }
            for d in 0..2 {
                let od = 1 - d;
                let (lo_part, hi_part) = if (parts[i].hi[d] - parts[j].lo[d]).abs() < TOLERANCE {
                    (i, j)
                } else if (parts[j].hi[d] - parts[i].lo[d]).abs() < TOLERANCE {
                    (j, i)
                } else {
                    continue;
                };
                let face = parts[lo_part].hi[d];
                let olo = parts[i].lo[od].max(parts[j].lo[od]);
                let ohi = parts[i].hi[od].min(parts[j].hi[od]);
                if ohi - olo < dw + 4.0 * wh {
                    continue;
                }
                let mut wall = parts[i];
                wall.lo[od] = olo;
                wall.hi[od] = ohi;
                wall.hi.z = parts[i].hi.z.min(parts[j].hi.z);
                set_wall_width(&mut wall, face, wh, d);

                // Opening must sit within one room on each side of the face.
                let mut opening = None;
                'search: for ra in int.rooms.iter().filter(|r| {
                    r.part_id as usize == lo_part && (r.cube.hi[d] - face).abs() < TOLERANCE
                }) {
                    for rb in int.rooms.iter().filter(|r| {
                        r.part_id as usize == hi_part && (r.cube.lo[d] - face).abs() < TOLERANCE
                    }) {
                        let lo = ra.cube.lo[od].max(rb.cube.lo[od]) + 0.5 * dw + 2.0 * wh;
                        let hi = ra.cube.hi[od].min(rb.cube.hi[od]) - 0.5 * dw - 2.0 * wh;
                        if hi < lo {
                            continue;
                        }
                        let c = 0.5 * (lo + hi);
                        let mut o = wall;
                        o.expand_in_dim(d, 0.1 * wh);
                        o.lo[od] = c - 0.5 * dw;
                        o.hi[od] = c + 0.5 * dw;
                        opening = Some(o);
                        break 'search;
                    }
                }
                if let Some(o) = opening {
                    st.pending_doors.push(PendingDoor { cube: o, dim: d as u8, part: lo_part as u8 });
                }
                st.links.push(PartLink {
                    wall,
                    dim: d as u8,
                    part_a: lo_part as u8,
                    part_b: hi_part as u8,
                    opening,
                    floors,
                });
            }
        }
    }
}

/// Stair or elevator footprint is clear of door swing zones, walls and other connectors.
pub fn is_valid_stairs_elevator_placement(
    c: &Cube,
    int: &Interior,
    pending_doors: &[PendingDoor],
    walls: &[Cube],
    spacing: f32,
) -> bool {
    if pending_doors.iter().any(|pd| {
        let mut zone = pd.cube;
        zone.expand_in_dim(pd.dim as usize, proportions::DOOR_CLEARANCE * spacing);
        zone.expand_in_dim(1 - pd.dim as usize, 0.1 * spacing);
        zone.intersects(c)
    }) {
        return false;
    }
    if walls.iter().any(|w| w.intersects(c)) {
        return false;
    }
    !int.is_blocked_by_stairs_or_elevator(c, 0.1 * spacing)
}

fn seg_cubes(st: &LayoutState) -> Vec<Cube> {
    st.wall_segs.iter().map(|w| w.cube).collect()
}

/// Footprint (run length, width) for a stairs shape.
fn stairs_footprint(shape: StairsShape, spacing: f32) -> (f32, f32) {
    let len = proportions::STAIRS_LEN * spacing;
    let w = proportions::STAIRS_WIDTH * spacing;
    match shape {
        StairsShape::Straight | StairsShape::Walled => (len, w),
        StairsShape::U => (0.6 * len, 2.0 * w),
    }
}

/// Find a valid stair cube of `shape` inside `region`, spanning z range [z1, z2].
#[allow(clippy::too_many_arguments)]
fn find_stairs_pos(
    int: &Interior,
    st: &mut LayoutState,
    walls: &[Cube],
    region: &Cube,
    shape: StairsShape,
    z1: f32,
    z2: f32,
    spacing: f32,
) -> Option<(Cube, usize)> {
    let (run, width) = stairs_footprint(shape, spacing);
    let wh = wall_half(spacing);
    // Walled stairs need room for their side walls.
    let side_pad = if shape == StairsShape::Walled { 2.0 * wh } else { 0.0 };
    let make = |dim: usize, x: f32, y: f32| -> Cube {
        let mut sz = Vec3::new(width, width, 0.0);
        sz[dim] = run;
        Cube::new(Vec3::new(x, y, z1), Vec3::new(x + sz.x, y + sz.y, z2))
    };
    let check = |c: &Cube, st: &LayoutState| -> bool {
        let mut tc = *c;
        if side_pad > 0.0 {
            let dim = usize::from(c.dy() > c.dx());
            tc.expand_in_dim(1 - dim, side_pad);
        }
        region.contains_cube_xy(&tc)
            && is_valid_stairs_elevator_placement(&tc, int, &st.pending_doors, walls, spacing)
    };
    let pad_x = |dim: usize| if dim == 1 { side_pad } else { 0.0 };
    let pad_y = |dim: usize| if dim == 0 { side_pad } else { 0.0 };
    let pref_dim = region.longer_xy_dim();

    for _ in 0..tries::STAIRS {
        let dim = if rand_chance(&mut st.rng, 0.75) { pref_dim } else { 1 - pref_dim };
        let mut sz = Vec3::splat(width + 2.0 * side_pad);
        sz[dim] = run;
        if sz.x >= region.dx() || sz.y >= region.dy() {
            continue;
        }
        let x = rand_uniform(&mut st.rng, region.lo.x, region.hi.x - sz.x) + pad_x(dim);
        let y = rand_uniform(&mut st.rng, region.lo.y, region.hi.y - sz.y) + pad_y(dim);
        let c = make(dim, x, y);
        if check(&c, &*st) {
            return Some((c, dim));
        }
    }
    // Deterministic scan so a slot that exists is always found.
    let step = 0.25 * spacing;
    for dim in [pref_dim, 1 - pref_dim] {
        let mut y = region.lo.y;
        while y < region.hi.y {
            let mut x = region.lo.x;
            while x < region.hi.x {
                let c = make(dim, x + pad_x(dim), y + pad_y(dim));
                if check(&c, &*st) {
                    return Some((c, dim));
                }
                x += step;
            }
            y += step;
        }
    }
    None
}

/// Candidate rooms for a connector: plain rooms (largest first), then offices, then hallways.
fn connector_room_order(int: &Interior, part: usize) -> Vec<usize> {
    let mut ixs: Vec<usize> = (0..int.rooms.len())
        .filter(|&i| int.rooms[i].part_id as usize == part && !int.rooms[i].has_elevator)
        .collect();
    let rank = |r: &Room| if r.is_hallway { 2 } else if r.is_office { 1 } else { 0 };
    ixs.sort_by(|&a, &b| {
        let (ra, rb) = (&int.rooms[a], &int.rooms[b]);
        rank(ra)
            .cmp(&rank(rb))
            .then(rb.cube.area_xy().total_cmp(&ra.cube.area_xy()))
            .then(a.cmp(&b))
    });
    ixs
}

fn room_region(room: &Room, spacing: f32) -> Cube {
    room.cube.expand_by_xy(-(wall_half(spacing) + 0.05 * spacing))
}

fn add_stairwell(
    int: &mut Interior,
    c: Cube,
    dim: usize,
    dir: bool,
    shape: StairsShape,
    first_floor_z: f32,
    num_floors: u32,
) {
    let spacing = int.floor_spacing;
    let slab = int.slab_thick;
    let run = c.get_sz_dim(dim);
    for f in 1..num_floors {
        let fz = first_floor_z + f as f32 * spacing;
        let mut landing = c;
        if dir {
            landing.lo[dim] = c.hi[dim] - 0.15 * run;
        } else {
            landing.hi[dim] = c.lo[dim] + 0.15 * run;
        }
        landing.lo.z = fz;
        landing.hi.z = fz + slab;
        int.landings.push(Landing {
            cube: landing,
            dim: dim as u8,
            dir,
            floor: int.get_floor_for_z(fz + 0.5 * slab).min(u8::MAX as usize) as u8,
            for_elevator: false,
            shape,
        });
    }
    if shape == StairsShape::Walled {
        let od = 1 - dim;
        let wh = wall_half(spacing);
        for side in [false, true] {
            let mut w = c;
            let e = c.d(od, side);
            set_wall_width(&mut w, if side { e + wh } else { e - wh }, wh, od);
            w.lo.z = c.lo.z + slab;
            int.walls[od].push(w);
        }
    }
    int.stairwells.push(Stairwell {
        cube: c,
        dim: dim as u8,
        dir,
        num_floors: num_floors.min(u8::MAX as u32) as u8,
        shape,
    });
}

/// One stairwell per multi-floor part, spanning all of its floors.
fn place_stairs_in_part(b: &Building, int: &mut Interior, st: &mut LayoutState, p: usize) {
    let n = st.part_floors[p];
    if n < 2 {
        return;
    }
    let spacing = b.floor_spacing;
    let part = b.parts[p];
    let z1 = part.lo.z;
    let z2 = part.lo.z + (n - 1) as f32 * spacing + int.slab_thick;
    let walls = seg_cubes(st);

    for ix in connector_room_order(int, p) {
        let region = room_region(&int.rooms[ix], spacing);
        for shape in [StairsShape::Straight, StairsShape::U] {
            if let Some((c, dim)) = find_stairs_pos(int, st, &walls, &region, shape, z1, z2, spacing) {
                let dir = rand_chance(&mut st.rng, 0.5);
                add_stairwell(int, c, dim, dir, shape, z1, n);
                int.rooms[ix].has_stairs = true;
                return;
            }
        }
    }
    log::debug!("no stairs slot in part {} of building ({}, {})", p, b.seed1, b.seed2);
}

/// Append `e`, or extend an existing shaft directly below with the same footprint.
pub fn add_or_extend_elevator(int: &mut Interior, e: Elevator) -> bool {
    for ex in &mut int.elevators {
        let same_xy = (ex.cube.lo.truncate() - e.cube.lo.truncate()).length() < TOLERANCE
            && (ex.cube.hi.truncate() - e.cube.hi.truncate()).length() < TOLERANCE;
        if same_xy && (ex.cube.hi.z - e.cube.lo.z).abs() < TOLERANCE {
            ex.cube.hi.z = e.cube.hi.z;
            return true;
        }
    }
    int.elevators.push(e);
    false
}

fn place_elevator_in_part(b: &Building, int: &mut Interior, st: &mut LayoutState, p: usize) {
    let spacing = b.floor_spacing;
    let part = b.parts[p];
    let size = proportions::ELEVATOR_SIZE * spacing;
    let walls = seg_cubes(st);
    let mut rooms: Vec<usize> = (0..int.rooms.len())
        .filter(|&i| int.rooms[i].part_id as usize == p && !int.rooms[i].has_stairs)
        .collect();
    // Hallways first, where the shaft is reachable from every office.
    rooms.sort_by_key(|&i| (!int.rooms[i].is_hallway, i));

    for ix in rooms {
        let region = room_region(&int.rooms[ix], spacing);
        if region.dx() <= size || region.dy() <= size {
            continue;
        }
        for _ in 0..tries::ELEVATOR {
            let x = rand_uniform(&mut st.rng, region.lo.x, region.hi.x - size);
            let y = rand_uniform(&mut st.rng, region.lo.y, region.hi.y - size);
            let c = Cube::new(Vec3::new(x, y, part.lo.z), Vec3::new(x + size, y + size, part.hi.z));
            if !is_valid_stairs_elevator_placement(&c, int, &st.pending_doors, &walls, spacing) {
                continue;
            }
            let room_c = int.rooms[ix].cube.center();
            let dim = rand_index(&mut st.rng, 2);
            let dir = room_c[dim] > c.center_dim(dim);
            add_or_extend_elevator(int, Elevator { cube: c, dim: dim as u8, dir, open: false });
            int.rooms[ix].has_elevator = true;
            for f in 1..st.part_floors[p] {
                let fz = part.lo.z + f as f32 * spacing;
                let mut landing = c;
                landing.lo.z = fz;
                landing.hi.z = fz + int.slab_thick;
                int.landings.push(Landing {
                    cube: landing,
                    dim: dim as u8,
                    dir,
                    floor: int.get_floor_for_z(fz + 0.5 * int.slab_thick).min(u8::MAX as usize) as u8,
                    for_elevator: true,
                    shape: StairsShape::Straight,
                });
            }
            return;
        }
    }
}

/// Stairs between each pair of vertically adjacent parts, shaped to the shared footprint.
pub fn connect_stacked_parts_with_stairs(b: &Building, int: &mut Interior, st: &mut LayoutState) {
    let spacing = b.floor_spacing;
    let walls = seg_cubes(st);
    let parts = b.real_parts();

    for lo in 0..parts.len() {
        for hi in 0..parts.len() {
            if lo == hi
                || st.part_floors[lo] == 0
                || st.part_floors[hi] == 0
                || (parts[hi].lo.z - parts[lo].hi.z).abs() > TOLERANCE
                || !parts[hi].intersects_xy(&parts[lo])
            {
                continue;
            }
            let z1 = parts[lo].lo.z + (st.part_floors[lo] - 1) as f32 * spacing;
            let z2 = parts[hi].lo.z + int.slab_thick;
            let lower: Vec<usize> = connector_room_order(int, lo);
            let upper: Vec<usize> = connector_room_order(int, hi);
            let mut done = false;

            'rooms: for &ru in &upper {
                for &rl in &lower {
                    // Lower room is stretched in z so only the xy overlap matters.
                    let lower_xy = room_region(&int.rooms[rl], spacing).expand_by_vec(Vec3::new(0.0, 0.0, 1.0e6));
                    let Some(ov) = room_region(&int.rooms[ru], spacing).intersection(&lower_xy) else {
                        continue;
                    };
                    let (run, width) = stairs_footprint(StairsShape::Straight, spacing);
                    let roomy = ov.min_len_xy() >= width + spacing && ov.get_sz_dim(ov.longer_xy_dim()) >= run + spacing;
                    let shapes: &[StairsShape] = if roomy {
                        &[StairsShape::Walled, StairsShape::Straight, StairsShape::U]
                    } else {
                        &[StairsShape::Straight, StairsShape::U]
                    };
                    for &shape in shapes {
                        if let Some((c, dim)) = find_stairs_pos(int, st, &walls, &ov, shape, z1, z2, spacing) {
                            let dir = rand_chance(&mut st.rng, 0.5);
                            add_stairwell(int, c, dim, dir, shape, z1, 2);
                            int.rooms[ru].has_stairs = true;
                            int.rooms[rl].has_stairs = true;
                            done = true;
                            break 'rooms;
                        }
                    }
                }
            }
            if !done {
                log::debug!("could not connect stacked parts {} and {}", lo, hi);
            }
        }
    }
}

/// Cut slab pieces whose base lies strictly inside (z_lo, z_hi) where they overlap `hole` in xy.
fn clip_slabs(slabs: &mut Vec<Cube>, hole: &Cube, z_lo: f32, z_hi: f32) {
    let mut out = Vec::with_capacity(slabs.len() + 4);
    for s in slabs.iter() {
        let inside_z = s.lo.z > z_lo + TOLERANCE && s.lo.z < z_hi - TOLERANCE;
        if inside_z && s.intersects_xy(hole) {
            let mut h = *hole;
            h.lo.z = s.lo.z - 1.0;
            h.hi.z = s.hi.z + 1.0;
            subtract_cube_from_cube(s, &h, &mut out);
        } else {
            out.push(*s);
        }
    }
    *slabs = out;
}

fn clip_slabs_for_connectors(int: &mut Interior) {
    let slab = int.slab_thick;
    let holes: Vec<(Cube, f32, f32)> = int
        .stairwells
        .iter()
        .map(|s| (s.cube, s.cube.lo.z, s.cube.hi.z))
        .chain(int.elevators.iter().map(|e| (e.cube, e.cube.lo.z, e.cube.hi.z - slab)))
        .collect();
    for (hole, z_lo, z_hi) in holes {
        clip_slabs(&mut int.floors, &hole, z_lo, z_hi);
        clip_slabs(&mut int.ceilings, &hole, z_lo, z_hi);
    }
    // Landings fill the top end of each stair hole.
    let landings: Vec<Cube> = int.landings.iter().filter(|l| !l.for_elevator).map(|l| l.cube).collect();
    int.floors.extend(landings);
}

/// Per-floor wall pieces for one wall footprint, with door openings removed.
#[allow(clippy::too_many_arguments)]
fn cut_wall_floors(
    seg: &Cube,
    part: &Cube,
    floors: u32,
    spacing: f32,
    slab: f32,
    openings: &[Cube],
    skip_floor0_openings: bool,
    out: &mut Vec<Cube>,
) {
    let door_h = proportions::DOOR_HEIGHT * spacing;
    for f in 0..floors {
        let fz = part.lo.z + f as f32 * spacing;
        let top = if f + 1 == floors { part.hi.z.min(seg.hi.z) } else { fz + spacing };
        let mut piece = *seg;
        piece.lo.z = fz + slab;
        piece.hi.z = top - slab;
        if !piece.is_strictly_normalized() {
            continue;
        }
        let mut pieces = vec![piece];
        if !(skip_floor0_openings && f == 0) {
            for o in openings {
                let mut hole = *o;
                hole.lo.z = fz + slab - TOLERANCE;
                hole.hi.z = (fz + slab + door_h).min(top - slab - 0.05 * spacing);
                let mut next = Vec::with_capacity(pieces.len() + 2);
                for pc in &pieces {
                    subtract_cube_from_cube(pc, &hole, &mut next);
                }
                pieces = next;
            }
        }
        out.extend(pieces.into_iter().filter(|c| c.is_strictly_normalized()));
    }
}

fn materialize_walls(b: &Building, int: &mut Interior, st: &LayoutState) {
    let spacing = b.floor_spacing;
    let slab = int.slab_thick;
    for seg in &st.wall_segs {
        let p = seg.part as usize;
        let openings: Vec<Cube> = st
            .pending_doors
            .iter()
            .filter(|pd| pd.part == seg.part && pd.dim == seg.dim && pd.cube.intersects(&seg.cube))
            .map(|pd| pd.cube)
            .collect();
        let mut out = Vec::new();
        cut_wall_floors(&seg.cube, &b.parts[p], st.part_floors[p], spacing, slab, &openings, false, &mut out);
        int.walls[seg.dim as usize].extend(out);
    }
}

// ── Step 4 ─────────────────────────────────────────────────────────────

/// Derive interior doors and part-link walls, tag exterior door rooms, and finalize.
pub fn finish_interior(b: &mut Building, mut st: LayoutState) {
    let spacing = b.floor_spacing;
    let door_h = proportions::DOOR_HEIGHT * spacing;
    let door_cubes: Vec<(Cube, usize)> = (0..b.doors.len())
        .filter_map(|i| b.door_cube(i).map(|c| (c, b.door_parts[i] as usize)))
        .collect();
    let ext_door_parts: Vec<bool> = (0..b.real_num_parts).map(|p| b.part_has_ext_door(p)).collect();
    let parts = b.parts.clone();
    let Some(int) = b.interior.as_deref_mut() else {
        return;
    };
    let slab = int.slab_thick;

    for (dc, p) in &door_cubes {
        let Some(part) = parts.get(*p) else { continue };
        let dim = usize::from(dc.dy() < dc.dx());
        let dir = dc.center_dim(dim) > part.center_dim(dim);
        for room in int.rooms.iter_mut().filter(|r| r.part_id as usize == *p) {
            if room.cube.expand_by_xy(0.1 * spacing).intersects(dc) {
                room.ext_door_sides |= 1 << (2 * dim + usize::from(dir));
            }
        }
    }

    let link_openings: Vec<Cube> = st.links.iter().filter_map(|l| l.opening).collect();
    for pd in &st.pending_doors {
        // Part-link openings are handled with their links below.
        if link_openings.contains(&pd.cube) {
            continue;
        }
        let part = parts[pd.part as usize];
        for f in 0..st.part_floors[pd.part as usize] {
            let fz = part.lo.z + f as f32 * spacing;
            let mut c = pd.cube;
            c.lo.z = fz + slab;
            c.hi.z = fz + slab + door_h;
            int.doors.push(Door {
                cube: c,
                dim: pd.dim,
                open_dir: rand_chance(&mut st.rng, 0.5),
                open: rand_chance(&mut st.rng, 0.7),
            });
        }
    }

    for link in &st.links {
        let (a, bp) = (link.part_a as usize, link.part_b as usize);
        // Ground floors that each have their own exterior door need no connecting door.
        let skip_ground = ext_door_parts.get(a).copied().unwrap_or(false)
            && ext_door_parts.get(bp).copied().unwrap_or(false);
        let openings: Vec<Cube> = link.opening.into_iter().collect();
        let mut out = Vec::new();
        cut_wall_floors(&link.wall, &parts[a], link.floors, spacing, slab, &openings, skip_ground, &mut out);
        int.walls[link.dim as usize].extend(out);

        if let Some(o) = link.opening {
            for f in 0..link.floors {
                if skip_ground && f == 0 {
                    continue;
                }
                let fz = parts[a].lo.z + f as f32 * spacing;
                let mut c = o;
                c.lo.z = fz + slab;
                c.hi.z = fz + slab + door_h;
                int.doors.push(Door {
                    cube: c,
                    dim: link.dim,
                    open_dir: rand_chance(&mut st.rng, 0.5),
                    open: true,
                });
            }
        }
    }
    int.finalize();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::BuildingParams;

    fn box_building(parts: &[Cube]) -> Building {
        let mut b = Building::new(0, 42, 7, Vec3::ZERO);
        b.floor_spacing = 3.0;
        b.parts.extend_from_slice(parts);
        b.real_num_parts = parts.len();
        b.calc_bcube_from_parts();
        b
    }

    fn params(thresh: f32) -> BuildingParams {
        let mut p = BuildingParams::default();
        p.wall_split_thresh = thresh;
        p.finalize();
        p
    }

    #[test]
    fn floor_count_exact_and_partial() {
        let mut part = Cube::from_bounds(0.0, 1.0, 0.0, 1.0, 0.0, 10.0);
        assert_eq!(calc_num_floors(&mut part, 3.0, 0.3, true), 3);
        assert!((part.hi.z - 9.0).abs() < 1e-5);

        let mut part = Cube::from_bounds(0.0, 1.0, 0.0, 1.0, 0.0, 10.0);
        assert_eq!(calc_num_floors(&mut part, 3.0, 0.3, false), 3);
        assert!((part.hi.z - 10.0).abs() < 1e-5);

        let mut short = Cube::from_bounds(0.0, 1.0, 0.0, 1.0, 0.0, 1.0);
        assert_eq!(calc_num_floors(&mut short, 3.0, 0.3, true), 0);
    }

    #[test]
    fn slabs_have_fixed_thickness() {
        let mut b = box_building(&[Cube::from_bounds(0.0, 12.0, 0.0, 12.0, 0.0, 9.0)]);
        let st = gen_interior(&mut b, &params(3.0)).unwrap();
        finish_interior(&mut b, st);
        let int = b.interior.as_ref().unwrap();
        let slab = 0.5 * FLOOR_THICK_VAL * 3.0;
        for s in int.floors.iter().chain(int.ceilings.iter()) {
            assert!((s.dz() - slab).abs() < 1e-4);
            assert!(s.is_strictly_normalized());
        }
    }

    #[test]
    fn single_part_gets_rooms_and_one_stairwell() {
        let mut b = box_building(&[Cube::from_bounds(0.0, 12.0, 0.0, 12.0, 0.0, 9.0)]);
        let st = gen_interior(&mut b, &params(3.0)).unwrap();
        assert!(!st.pending_doors().is_empty());
        finish_interior(&mut b, st);
        let int = b.interior.as_ref().unwrap();
        assert!(int.rooms.len() > 1);
        assert_eq!(int.stairwells.len(), 1);
        assert_eq!(int.stairwells[0].num_floors, 3);
        assert_eq!(int.num_floors, 3);
        for f in 0..3 {
            assert!(int.rooms_on_floor(f).count() >= 1);
        }
        // Doors exist on every floor for every opening.
        assert_eq!(int.doors.len() % 3, 0);
    }

    #[test]
    fn partial_top_floor_is_not_an_extra_floor() {
        let mut b = box_building(&[Cube::from_bounds(0.0, 12.0, 0.0, 12.0, 0.0, 13.5)]);
        let st = gen_interior(&mut b, &params(3.0)).unwrap();
        finish_interior(&mut b, st);
        let int = b.interior.as_ref().unwrap();
        assert_eq!(int.part_floors, vec![4]);
        assert_eq!(int.num_floors, 4);
        assert!(int.rooms_on_floor(3).count() >= 1);
        assert_eq!(int.rooms_on_floor(4).count(), 0);
        for r in &int.rooms {
            assert_eq!(int.room_floors(r), 4);
        }
    }

    #[test]
    fn hallway_for_long_office_part() {
        let mut b = box_building(&[Cube::from_bounds(0.0, 30.0, 0.0, 12.0, 0.0, 6.0)]);
        let st = gen_interior(&mut b, &params(4.0)).unwrap();
        finish_interior(&mut b, st);
        let int = b.interior.as_ref().unwrap();
        let halls = int.rooms.iter().filter(|r| r.is_hallway).count();
        assert_eq!(halls, 1);
        assert!(int.rooms.iter().filter(|r| r.is_office).count() >= 2);
    }

    #[test]
    fn stacked_parts_are_connected() {
        let mut b = box_building(&[
            Cube::from_bounds(0.0, 20.0, 0.0, 20.0, 0.0, 3.0),
            Cube::from_bounds(2.0, 18.0, 2.0, 18.0, 3.0, 6.0),
        ]);
        let st = gen_interior(&mut b, &params(4.0)).unwrap();
        finish_interior(&mut b, st);
        let int = b.interior.as_ref().unwrap();
        assert_eq!(int.stairwells.len(), 1);
        assert_eq!(int.stairwells[0].num_floors, 2);
        let s = int.stairwells[0].cube;
        assert!((s.lo.z - 0.0).abs() < 1e-5);
        assert!(s.hi.z > 3.0);
    }

    #[test]
    fn connectors_clear_of_door_zones() {
        for seed in 0..20u64 {
            let mut b = box_building(&[Cube::from_bounds(0.0, 16.0, 0.0, 14.0, 0.0, 12.0)]);
            b.seed1 = seed;
            let st = gen_interior(&mut b, &params(3.0)).unwrap();
            finish_interior(&mut b, st);
            let int = b.interior.as_ref().unwrap();
            for s in &int.stairwells {
                assert!(!int.is_cube_close_to_doorway(&s.cube, 0.5 * 3.0));
            }
            for e in &int.elevators {
                assert!(!int.is_cube_close_to_doorway(&e.cube, 0.5 * 3.0));
            }
        }
    }

    #[test]
    fn elevator_extension() {
        let mut int = Interior::new(0.0, 3.0, 0.15);
        let c = Cube::from_bounds(0.0, 2.0, 0.0, 2.0, 0.0, 6.0);
        assert!(!add_or_extend_elevator(&mut int, Elevator { cube: c, dim: 0, dir: true, open: false }));
        let up = c.translated(Vec3::new(0.0, 0.0, 6.0));
        assert!(add_or_extend_elevator(&mut int, Elevator { cube: up, dim: 0, dir: true, open: false }));
        assert_eq!(int.elevators.len(), 1);
        assert!((int.elevators[0].cube.hi.z - 12.0).abs() < 1e-5);
    }

    #[test]
    fn wall_cutting_leaves_opening() {
        let seg = Cube::from_bounds(4.9, 5.1, 0.0, 10.0, 0.0, 6.0);
        let part = Cube::from_bounds(0.0, 10.0, 0.0, 10.0, 0.0, 6.0);
        let opening = Cube::from_bounds(4.8, 5.2, 4.0, 5.5, 0.0, 6.0);
        let mut out = Vec::new();
        cut_wall_floors(&seg, &part, 2, 3.0, 0.15, &[opening], false, &mut out);
        let probe = Vec3::new(5.0, 4.75, 1.0);
        assert!(out.iter().all(|w| !w.contains_pt(probe)));
        assert!(out.iter().any(|w| w.contains_pt(Vec3::new(5.0, 2.0, 1.0))));
        // Header above the door remains.
        assert!(out.iter().any(|w| w.contains_pt(Vec3::new(5.0, 4.75, 2.7))));
    }
}
