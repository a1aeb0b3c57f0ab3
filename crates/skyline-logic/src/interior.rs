//! Interior structure of a building: slabs, walls, rooms, doors and vertical connectors.
//!
//! Every entity is a plain `Cube` plus a few tagged fields. Rooms span all floors of
//! their part, so a room id identifies the same footprint on every floor of that part.

use crate::bvh::CubeBvh;
use crate::constants::{MAX_DRAW_BLOCKS, MAX_LIT_FLOORS};
use crate::geom::Cube;
use crate::room_geom::{RoomGeom, RoomObject};

/// Whole floors that fit in a height of `dz`. A partial top floor counts with the floor
/// below it, so the result is at least 1.
pub fn floors_in_height(dz: f32, spacing: f32) -> usize {
    if spacing <= 0.0 {
        return 1;
    }
    (dz / spacing + 1.0e-4).floor().max(1.0) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StairsShape {
    #[default]
    Straight,
    U,
    Walled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub cube: Cube,
    pub part_id: u8,
    pub room_id: u8,
    pub num_lights: u8,
    pub is_hallway: bool,
    pub is_office: bool,
    pub has_stairs: bool,
    pub has_elevator: bool,
    /// Exterior sides (windows), bit `2*dim + dir`.
    pub ext_sides: u8,
    /// Exterior sides with doors, bit `2*dim + dir`.
    pub ext_door_sides: u8,
}

impl Room {
    pub fn new(cube: Cube, part_id: u8, room_id: u8) -> Self {
        Self {
            cube,
            part_id,
            room_id,
            num_lights: 0,
            is_hallway: false,
            is_office: false,
            has_stairs: false,
            has_elevator: false,
            ext_sides: 0,
            ext_door_sides: 0,
        }
    }

    pub fn has_windows(&self) -> bool {
        self.ext_sides != 0
    }
}

/// Interior door. `dim` is the axis the door faces (normal of the wall it sits in).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Door {
    pub cube: Cube,
    pub dim: u8,
    pub open_dir: bool,
    pub open: bool,
}

/// Floor-level platform of a stairwell or elevator shaft.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landing {
    pub cube: Cube,
    pub dim: u8,
    pub dir: bool,
    pub floor: u8,
    pub for_elevator: bool,
    pub shape: StairsShape,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Elevator {
    pub cube: Cube,
    pub dim: u8,
    /// Side of the shaft the doors open toward.
    pub dir: bool,
    pub open: bool,
}

/// Vertical stair volume; `dim` is the run direction and `dir` the side it climbs toward.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stairwell {
    pub cube: Cube,
    pub dim: u8,
    pub dir: bool,
    pub num_floors: u8,
    pub shape: StairsShape,
}

/// Contiguous range of wall indices (`walls[0]` then `walls[1]`) batched for drawing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DrawRange {
    pub start: usize,
    pub end: usize,
    pub bcube: Cube,
}

#[derive(Debug, Clone, Default)]
pub struct Interior {
    pub floors: Vec<Cube>,
    pub ceilings: Vec<Cube>,
    /// `walls[dim]` holds walls that are thin in `dim`.
    pub walls: [Vec<Cube>; 2],
    pub stairwells: Vec<Stairwell>,
    pub doors: Vec<Door>,
    pub landings: Vec<Landing>,
    pub rooms: Vec<Room>,
    pub elevators: Vec<Elevator>,
    pub room_geom: Option<Box<RoomGeom>>,
    pub bvh: Option<CubeBvh>,
    pub draw_ranges: Vec<DrawRange>,
    /// Bit `f` set when floor `f` has at least one lit light.
    pub lit_by_floor: u64,
    pub floor_z: f32,
    pub floor_spacing: f32,
    pub slab_thick: f32,
    pub num_floors: usize,
    /// Floor count of each real part, 0 for parts too short to hold a floor.
    pub part_floors: Vec<usize>,
    pub finalized: bool,
}

impl Interior {
    pub fn new(floor_z: f32, floor_spacing: f32, slab_thick: f32) -> Self {
        Self {
            floor_z,
            floor_spacing,
            slab_thick,
            ..Self::default()
        }
    }

    /// Floor index for a z value, counted from the building's ground floor.
    pub fn get_floor_for_z(&self, z: f32) -> usize {
        if self.floor_spacing <= 0.0 || z <= self.floor_z {
            return 0;
        }
        ((z - self.floor_z) / self.floor_spacing) as usize
    }

    pub fn floor_base_z(&self, floor: usize) -> f32 {
        self.floor_z + floor as f32 * self.floor_spacing
    }

    /// Whether `floor`'s lit bit can be stored.
    pub fn floor_in_lit_mask(floor: usize) -> bool {
        floor < MAX_LIT_FLOORS
    }

    pub fn is_floor_lit(&self, floor: usize) -> bool {
        Self::floor_in_lit_mask(floor) && self.lit_by_floor & (1u64 << floor) != 0
    }

    pub fn set_floor_lit(&mut self, floor: usize, lit: bool) {
        if !Self::floor_in_lit_mask(floor) {
            return;
        }
        if lit {
            self.lit_by_floor |= 1u64 << floor;
        } else {
            self.lit_by_floor &= !(1u64 << floor);
        }
    }

    /// Floor count of real part `p`, or what a part of height `dz` holds if `p` is unknown.
    pub fn floors_in_part(&self, p: usize, dz: f32) -> usize {
        match self.part_floors.get(p) {
            Some(&n) => n,
            None => floors_in_height(dz, self.floor_spacing),
        }
    }

    /// Number of floors the room spans.
    pub fn room_floors(&self, room: &Room) -> usize {
        self.floors_in_part(room.part_id as usize, room.cube.dz()).max(1)
    }

    pub fn room_first_floor(&self, room: &Room) -> usize {
        self.get_floor_for_z(room.cube.lo.z + 0.5 * self.slab_thick)
    }

    /// Floor of `z` inside `room`, counted from the room's base and clamped to the floors
    /// the room actually has.
    pub fn room_floor_for_z(&self, room: &Room, z: f32) -> usize {
        let first = self.room_first_floor(room);
        if self.floor_spacing <= 0.0 || z <= room.cube.lo.z {
            return first;
        }
        let f = ((z - room.cube.lo.z) / self.floor_spacing) as usize;
        first + f.min(self.room_floors(room) - 1)
    }

    /// Floor whose lit bit covers a room light.
    pub fn light_floor(&self, obj: &RoomObject) -> usize {
        match self.rooms.get(obj.room_id as usize) {
            Some(room) => self.room_floor_for_z(room, obj.cube.lo.z),
            None => self.get_floor_for_z(obj.cube.lo.z),
        }
    }

    /// Floor of a local point, using the room containing it when there is one.
    pub fn floor_for_point(&self, p: glam::Vec3) -> usize {
        match self.find_room_containing(p) {
            Some(ri) => self.room_floor_for_z(&self.rooms[ri], p.z),
            None => self.get_floor_for_z(p.z),
        }
    }

    /// Indices of rooms present on `floor`.
    pub fn rooms_on_floor(&self, floor: usize) -> impl Iterator<Item = usize> + '_ {
        self.rooms
            .iter()
            .enumerate()
            .filter(move |(_, r)| {
                let first = self.room_first_floor(r);
                first <= floor && floor < first + self.room_floors(r)
            })
            .map(|(i, _)| i)
    }

    pub fn find_room_containing(&self, p: glam::Vec3) -> Option<usize> {
        self.rooms.iter().position(|r| r.cube.contains_pt(p))
    }

    /// True if `c` lies in the swing region of any interior door.
    pub fn is_cube_close_to_doorway(&self, c: &Cube, dist: f32) -> bool {
        self.doors.iter().any(|d| {
            let mut swing = d.cube;
            swing.expand_in_dim(d.dim as usize, dist);
            swing.intersects(c)
        })
    }

    /// True if `c`, expanded by `dmin`, overlaps any stairwell or elevator.
    pub fn is_blocked_by_stairs_or_elevator(&self, c: &Cube, dmin: f32) -> bool {
        let tc = c.expand_by(dmin);
        self.stairwells.iter().any(|s| s.cube.intersects(&tc))
            || self.elevators.iter().any(|e| e.cube.intersects(&tc))
    }

    pub fn all_walls(&self) -> impl Iterator<Item = &Cube> {
        self.walls[0].iter().chain(self.walls[1].iter())
    }

    pub fn num_walls(&self) -> usize {
        self.walls[0].len() + self.walls[1].len()
    }

    /// Lock in derived lookup data once layout is complete.
    pub fn finalize(&mut self) {
        for walls in &mut self.walls {
            walls.sort_by(|a, b| a.lo.z.total_cmp(&b.lo.z).then(a.lo.x.total_cmp(&b.lo.x)));
            walls.shrink_to_fit();
        }
        self.floors.shrink_to_fit();
        self.ceilings.shrink_to_fit();
        self.doors.shrink_to_fit();
        self.rooms.shrink_to_fit();

        self.draw_ranges.clear();
        let total = self.num_walls();
        if total > 0 {
            let per_block = total.div_ceil(MAX_DRAW_BLOCKS);
            let all: Vec<Cube> = self.all_walls().copied().collect();
            let mut start = 0;
            while start < total {
                let end = (start + per_block).min(total);
                let mut bcube = all[start];
                for w in &all[start..end] {
                    bcube.union_with(w);
                }
                self.draw_ranges.push(DrawRange { start, end, bcube });
                start = end;
            }
        }
        self.finalized = true;
    }

    /// Wall by index into the combined `walls[0]` + `walls[1]` sequence.
    pub fn wall_by_index(&self, ix: usize) -> Option<&Cube> {
        let n0 = self.walls[0].len();
        if ix < n0 {
            self.walls[0].get(ix)
        } else {
            self.walls[1].get(ix - n0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn interior_with_door() -> Interior {
        let mut int = Interior::new(0.0, 3.0, 0.15);
        int.doors.push(Door {
            cube: Cube::from_bounds(4.95, 5.05, 1.0, 2.5, 0.15, 2.55),
            dim: 0,
            open_dir: true,
            open: true,
        });
        int
    }

    #[test]
    fn floor_lookup() {
        let int = Interior::new(10.0, 3.0, 0.15);
        assert_eq!(int.get_floor_for_z(9.0), 0);
        assert_eq!(int.get_floor_for_z(11.0), 0);
        assert_eq!(int.get_floor_for_z(13.5), 1);
        assert!((int.floor_base_z(2) - 16.0).abs() < 1e-6);
    }

    #[test]
    fn tall_top_floor_belongs_to_last_floor() {
        // 3 spacings plus 0.9 of a fourth: three floors, the top one 1.9 spacings tall.
        let mut int = Interior::new(0.0, 3.0, 0.15);
        int.part_floors.push(3);
        int.rooms.push(Room::new(Cube::from_bounds(0.0, 5.0, 0.0, 5.0, 0.0, 11.7), 0, 0));
        let room = int.rooms[0].clone();

        assert_eq!(int.room_floors(&room), 3);
        assert_eq!(int.room_floor_for_z(&room, 11.5), 2);
        assert_eq!(int.room_floor_for_z(&room, 7.0), 2);
        assert_eq!(int.floor_for_point(Vec3::new(2.0, 2.0, 10.0)), 2);
        assert_eq!(int.rooms_on_floor(2).count(), 1);
        assert_eq!(int.rooms_on_floor(3).count(), 0);

        let light = RoomObject::new(
            Cube::from_bounds(2.0, 2.5, 2.0, 2.5, 11.4, 11.5),
            crate::room_geom::RoomObjectKind::Light,
            0,
        );
        assert_eq!(int.light_floor(&light), 2);
    }

    #[test]
    fn floors_count_from_the_room_base() {
        // A part starting 0.4 spacings above the building's floor grid.
        let mut int = Interior::new(0.0, 3.0, 0.15);
        int.part_floors.push(2);
        int.rooms.push(Room::new(Cube::from_bounds(0.0, 5.0, 0.0, 5.0, 1.2, 7.2), 0, 0));
        let room = int.rooms[0].clone();
        // Ceiling light of the room's first floor, just under z = 4.2.
        assert_eq!(int.room_floor_for_z(&room, 4.0), 0);
        assert_eq!(int.room_floor_for_z(&room, 4.3), 1);
        assert_eq!(int.room_floor_for_z(&room, 0.5), 0);
    }

    #[test]
    fn floors_in_height_keeps_partial_top() {
        assert_eq!(floors_in_height(10.0, 3.0), 3);
        assert_eq!(floors_in_height(9.0, 3.0), 3);
        assert_eq!(floors_in_height(2.0, 3.0), 1);
    }

    #[test]
    fn doorway_swing_region() {
        let int = interior_with_door();
        let near = Cube::from_bounds(5.3, 5.8, 1.5, 2.0, 0.2, 1.0);
        let far = Cube::from_bounds(7.0, 7.5, 1.5, 2.0, 0.2, 1.0);
        assert!(int.is_cube_close_to_doorway(&near, 1.0));
        assert!(!int.is_cube_close_to_doorway(&far, 1.0));
    }

    #[test]
    fn lit_mask_capacity() {
        let mut int = Interior::new(0.0, 3.0, 0.15);
        int.set_floor_lit(3, true);
        assert!(int.is_floor_lit(3));
        int.set_floor_lit(70, true);
        assert_eq!(int.lit_by_floor, 1 << 3);
        int.set_floor_lit(3, false);
        assert_eq!(int.lit_by_floor, 0);
    }

    #[test]
    fn finalize_builds_draw_ranges() {
        let mut int = Interior::new(0.0, 3.0, 0.15);
        for i in 0..20 {
            let x = i as f32;
            int.walls[0].push(Cube::from_bounds(x, x + 0.1, 0.0, 4.0, 0.0, 3.0));
        }
        int.finalize();
        assert!(int.finalized);
        assert!(int.draw_ranges.len() <= MAX_DRAW_BLOCKS);
        assert_eq!(int.draw_ranges.last().map(|r| r.end), Some(20));
        assert!(int.find_room_containing(Vec3::ZERO).is_none());
    }
}
