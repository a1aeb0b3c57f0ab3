//! Placing many buildings: city/non-city placement, streaming tiles, statistics, and
//! set-level queries that fan out to individual buildings.

use glam::Vec3;
use rand::Rng;
use rustc_hash::FxHashMap;

use crate::building::Building;
use crate::collision::{LineHit, SphereQuery};
use crate::geom::Cube;
use crate::lighting::{CityLightsState, LightsManager};
use crate::materials::BuildingParams;
use crate::rng::{hash_pair, rand_index, rand_uniform, rng_for_seeds, GenRng};
use crate::shape::gen_geometry;

/// Side length of the xy hash grid used for broad-phase lookups.
const GRID_CELL: f32 = 64.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceMode {
    City,
    NonCity,
    Any,
}

/// Building counts for a set, used for logging and harness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildingStats {
    pub buildings: usize,
    pub houses: usize,
    pub with_interior: usize,
    pub parts: usize,
    pub floors: usize,
    pub rooms: usize,
    pub stairs: usize,
    pub elevators: usize,
    pub ext_doors: usize,
    pub int_doors: usize,
    pub room_objects: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BuildingSet {
    pub buildings: Vec<Building>,
    grid: FxHashMap<(i32, i32), Vec<usize>>,
}

fn grid_range(c: &Cube) -> ((i32, i32), (i32, i32)) {
    let cell = |v: f32| (v / GRID_CELL).floor() as i32;
    ((cell(c.lo.x), cell(c.lo.y)), (cell(c.hi.x), cell(c.hi.y)))
}

impl BuildingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    pub fn add(&mut self, b: Building) -> usize {
        let ix = self.buildings.len();
        let ((x1, y1), (x2, y2)) = grid_range(&b.bcube);
        for x in x1..=x2 {
            for y in y1..=y2 {
                self.grid.entry((x, y)).or_default().push(ix);
            }
        }
        self.buildings.push(b);
        ix
    }

    /// Indices of buildings whose grid cells touch `c` (xy), ascending.
    pub fn candidates(&self, c: &Cube) -> Vec<usize> {
        let ((x1, y1), (x2, y2)) = grid_range(c);
        let mut out = Vec::new();
        for x in x1..=x2 {
            for y in y1..=y2 {
                if let Some(ids) = self.grid.get(&(x, y)) {
                    out.extend_from_slice(ids);
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// True if `c` (xy) overlaps any placed building's bcube.
    pub fn overlaps_xy(&self, c: &Cube) -> bool {
        self.candidates(c)
            .into_iter()
            .any(|i| self.buildings[i].bcube.intersects_xy(c))
    }

    pub fn get_stats(&self) -> BuildingStats {
        let mut s = BuildingStats {
            buildings: self.buildings.len(),
            ..BuildingStats::default()
        };
        for b in &self.buildings {
            s.houses += usize::from(b.is_house());
            s.parts += b.parts.len();
            s.ext_doors += b.doors.len();
            let Some(int) = b.interior.as_deref() else {
                continue;
            };
            s.with_interior += 1;
            s.floors += int.num_floors;
            s.rooms += int.rooms.len();
            s.stairs += int.stairwells.len();
            s.elevators += int.elevators.len();
            s.int_doors += int.doors.len();
            s.room_objects += int.room_geom.as_deref().map_or(0, |rg| rg.objs.len());
        }
        s
    }

    pub fn log_stats(&self) {
        let s = self.get_stats();
        log::info!(
            "{} buildings ({} houses, {} with interiors): {} parts, {} floors, {} rooms, {} stairs, {} elevators, {} ext doors, {} int doors, {} room objects",
            s.buildings,
            s.houses,
            s.with_interior,
            s.parts,
            s.floors,
            s.rooms,
            s.stairs,
            s.elevators,
            s.ext_doors,
            s.int_doors,
            s.room_objects
        );
    }

    // ── Fan-out queries ────────────────────────────────────────────────

    /// Resolve a sphere against every nearby building in turn.
    pub fn check_sphere_coll(&self, q: &SphereQuery) -> (Vec3, Option<Vec3>) {
        let probe = Cube::from_point(q.pos - q.xlate).expand_by(q.radius);
        let mut pos = q.pos;
        let mut normal = None;
        for i in self.candidates(&probe) {
            let (p, n) = self.buildings[i].check_sphere_coll(&SphereQuery { pos, ..*q });
            if n.is_some() {
                pos = p;
                normal = n;
            }
        }
        (pos, normal)
    }

    /// Nearest segment hit over all buildings, with the building index.
    pub fn check_line_coll(
        &self,
        p1: Vec3,
        p2: Vec3,
        xlate: Vec3,
        occlusion_only: bool,
        hit_points: &mut Vec<Vec3>,
    ) -> Option<(usize, LineHit)> {
        let mut span = Cube::from_point(p1 - xlate);
        span.union_with_pt(p2 - xlate);
        let mut best: Option<(usize, LineHit)> = None;
        for i in self.candidates(&span) {
            if let Some(h) = self.buildings[i].check_line_coll(p1, p2, xlate, occlusion_only, hit_points) {
                if occlusion_only {
                    return Some((i, h));
                }
                if best.map_or(true, |(_, bh)| h.t < bh.t) {
                    best = Some((i, h));
                }
            }
        }
        best
    }

    /// Index of a building containing the point or cylinder.
    pub fn check_point_or_cylin_contained(&self, pos: Vec3, xy_radius: f32, xlate: Vec3) -> Option<usize> {
        let probe = Cube::from_point(pos - xlate).expand_by_xy(xy_radius);
        let mut scratch = Vec::new();
        self.candidates(&probe)
            .into_iter()
            .find(|&i| self.buildings[i].check_point_or_cylin_contained(pos, xy_radius, xlate, &mut scratch))
    }

    /// Select this frame's room lights across all buildings. Returns the number kept.
    pub fn setup_room_lights(
        &self,
        mgr: &impl LightsManager,
        camera: Vec3,
        xlate: Vec3,
        light_radius: f32,
        state: &mut CityLightsState,
    ) -> usize {
        if !state.begin_lights_setup(mgr, camera, light_radius) {
            return 0;
        }
        for i in self.candidates(&state.lights_bcube.translated(-xlate)) {
            self.buildings[i].add_room_lights(xlate, i, state);
        }
        state.finalize_lights();
        state.lights.len()
    }

    /// A random collision-free spot on some building's ground floor, for seeding agents.
    pub fn place_person(&self, rng: &mut GenRng, radius: f32) -> Option<(usize, Vec3)> {
        let with_int: Vec<usize> = (0..self.buildings.len())
            .filter(|&i| self.buildings[i].has_interior())
            .collect();
        if with_int.is_empty() {
            return None;
        }
        for _ in 0..100 {
            let bi = with_int[rand_index(rng, with_int.len())];
            let b = &self.buildings[bi];
            let Some(int) = b.interior.as_deref() else {
                continue;
            };
            let ground: Vec<usize> = (0..int.rooms.len())
                .filter(|&r| int.get_floor_for_z(int.rooms[r].cube.lo.z + int.slab_thick) == 0)
                .collect();
            if ground.is_empty() {
                continue;
            }
            let room = &int.rooms[ground[rand_index(rng, ground.len())]];
            let area = room.cube.expand_by_xy(-(radius + int.slab_thick));
            if area.dx() <= 0.0 || area.dy() <= 0.0 {
                continue;
            }
            let z = room.cube.lo.z + int.slab_thick + radius;
            let local = Vec3::new(
                rand_uniform(rng, area.lo.x, area.hi.x),
                rand_uniform(rng, area.lo.y, area.hi.y),
                z,
            );
            let body = Cube::from_point(local).expand_by(radius);
            if int.is_blocked_by_stairs_or_elevator(&body, 0.0) {
                continue;
            }
            let pos = b.local_to_world(local);
            let q = SphereQuery {
                xy_only: true,
                check_interior: true,
                ..SphereQuery::new(pos, radius)
            };
            if b.check_sphere_coll(&q).1.is_none() {
                return Some((bi, pos));
            }
        }
        None
    }
}

// ── Placement ──────────────────────────────────────────────────────────

/// Place up to `count` buildings with centers in `region`, retrying each up to `num_tries`.
/// With `contain`, every building's bcube must also lie inside `region`.
fn place_in_region(
    params: &BuildingParams,
    rng: &mut GenRng,
    mode: PlaceMode,
    count: u32,
    region: Option<Cube>,
    set: &mut BuildingSet,
) -> usize {
    let (city, non_city) = match mode {
        PlaceMode::City => (true, false),
        PlaceMode::NonCity => (false, true),
        PlaceMode::Any => (false, false),
    };
    let mut placed = 0;
    for _ in 0..count {
        let Some(mat_ix) = params.choose_rand_mat(rng, city, non_city) else {
            log::warn!("no material available for placement mode {:?}", mode);
            break;
        };
        let mat = params.get_material(mat_ix);
        for _ in 0..params.num_tries {
            let mut pos = match region {
                Some(r) => Vec3::new(
                    rand_uniform(rng, r.lo.x, r.hi.x),
                    rand_uniform(rng, r.lo.y, r.hi.y),
                    0.0,
                ),
                None if mat.place_radius > 0.0 => {
                    let c = 0.5 * (mat.pos_min + mat.pos_max);
                    let a = rand_uniform(rng, 0.0, std::f32::consts::TAU);
                    let r = mat.place_radius * rand_uniform(rng, 0.0, 1.0).sqrt();
                    Vec3::new(c.x + r * a.cos(), c.y + r * a.sin(), 0.0)
                }
                None => Vec3::new(
                    rand_uniform(rng, mat.pos_min.x, mat.pos_max.x),
                    rand_uniform(rng, mat.pos_min.y, mat.pos_max.y),
                    0.0,
                ),
            };
            pos.z = if params.flatten_mesh {
                0.0
            } else {
                rand_uniform(rng, mat.pos_min.z, mat.pos_max.z)
            };
            let (seed1, seed2): (u64, u64) = (rng.gen(), rng.gen());
            let b = gen_geometry(params, mat_ix, pos, seed1, seed2);
            if !b.is_valid() {
                continue;
            }
            if region.is_some_and(|r| !r.contains_cube_xy(&b.bcube)) {
                continue;
            }
            if set.overlaps_xy(&b.bcube.expand_by_xy(params.sec_extra_spacing)) {
                continue;
            }
            set.add(b);
            placed += 1;
            break;
        }
    }
    placed
}

/// Place `params.num_place` buildings from the material position ranges.
pub fn place_buildings(params: &BuildingParams, seed: u64, mode: PlaceMode) -> BuildingSet {
    let mut rng = rng_for_seeds(seed, 0);
    let mut set = BuildingSet::new();
    let placed = place_in_region(params, &mut rng, mode, params.num_place, None, &mut set);
    log::info!(
        "placed {} of {} buildings ({} tries each)",
        placed,
        params.num_place,
        params.num_tries
    );
    set.log_stats();
    set
}

/// Buildings for one streaming tile; depends only on the tile coordinates and `seed`.
pub fn gen_tile(params: &BuildingParams, tile_x: i32, tile_y: i32, tile_size: f32, seed: u64) -> BuildingSet {
    let key = hash_pair(tile_x as u32 as u64, tile_y as u32 as u64);
    let mut rng = rng_for_seeds(hash_pair(seed, key), 1);
    let region = Cube::from_bounds(
        tile_x as f32 * tile_size,
        (tile_x + 1) as f32 * tile_size,
        tile_y as f32 * tile_size,
        (tile_y + 1) as f32 * tile_size,
        0.0,
        1.0,
    );
    let mut set = BuildingSet::new();
    let placed = place_in_region(params, &mut rng, PlaceMode::Any, params.num_place, Some(region), &mut set);
    log::debug!("tile ({}, {}): {} buildings", tile_x, tile_y, placed);
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::rng_for_seeds_stream;

    fn small_params(n: u32) -> BuildingParams {
        let mut params = BuildingParams::test_params();
        params.num_place = n;
        params
    }

    #[test]
    fn placed_buildings_keep_their_spacing() {
        let params = small_params(20);
        let set = place_buildings(&params, 5, PlaceMode::Any);
        assert!(!set.is_empty());
        for (i, a) in set.buildings.iter().enumerate() {
            let grown = a.bcube.expand_by_xy(params.sec_extra_spacing);
            for b in &set.buildings[i + 1..] {
                assert!(!grown.intersects_xy(&b.bcube));
            }
        }
        let stats = set.get_stats();
        assert_eq!(stats.buildings, set.len());
        assert!(stats.parts >= stats.buildings);
    }

    #[test]
    fn placement_is_deterministic() {
        let params = small_params(6);
        let a = place_buildings(&params, 11, PlaceMode::Any);
        let b = place_buildings(&params, 11, PlaceMode::Any);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.buildings.iter().zip(&b.buildings) {
            assert_eq!((x.seed1, x.seed2, x.mat_ix), (y.seed1, y.seed2, y.mat_ix));
            assert_eq!(x.parts, y.parts);
        }
    }

    #[test]
    fn city_mode_uses_city_materials() {
        let params = small_params(6);
        let set = place_buildings(&params, 3, PlaceMode::City);
        assert!(set.buildings.iter().all(|b| !params.get_material(b.mat_ix).no_city));
        let set = place_buildings(&params, 3, PlaceMode::NonCity);
        assert!(set.buildings.iter().all(|b| params.get_material(b.mat_ix).no_city));
    }

    #[test]
    fn tiles_are_stable_and_contained() {
        let params = small_params(4);
        let a = gen_tile(&params, -2, 3, 200.0, 9);
        let b = gen_tile(&params, -2, 3, 200.0, 9);
        let region = Cube::from_bounds(-400.0, -200.0, 600.0, 800.0, 0.0, 1.0);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.buildings.iter().zip(&b.buildings) {
            assert_eq!(x.bcube, y.bcube);
            assert!(region.contains_cube_xy(&x.bcube));
        }
        let other = gen_tile(&params, -1, 3, 200.0, 9);
        let seeds = |s: &BuildingSet| s.buildings.iter().map(|b| b.seed1).collect::<Vec<_>>();
        assert_ne!(seeds(&a), seeds(&other));
    }

    #[test]
    fn set_queries_find_buildings() {
        let params = small_params(10);
        let set = place_buildings(&params, 21, PlaceMode::Any);
        let b = &set.buildings[0];
        let base = b.parts[0];
        let inside = b.local_to_world(Vec3::new(base.center().x, base.center().y, base.lo.z + 0.5));
        let i = set.check_point_or_cylin_contained(inside, 0.0, Vec3::ZERO);
        assert!(i.is_some_and(|i| set.buildings[i].bcube.contains_pt(inside)));
        let mut pts = Vec::new();
        let from = Vec3::new(inside.x, b.bcube.lo.y - 50.0, inside.z);
        let hit = set.check_line_coll(from, inside, Vec3::ZERO, false, &mut pts);
        assert!(hit.is_some());

        let far = SphereQuery::new(Vec3::new(1.0e5, 1.0e5, 1.0), 0.5);
        assert_eq!(set.check_sphere_coll(&far), (far.pos, None));
    }

    #[test]
    fn person_lands_on_ground_floor() {
        let params = small_params(10);
        let set = place_buildings(&params, 21, PlaceMode::City);
        let mut rng = rng_for_seeds_stream(1, 1, 9);
        if let Some((bi, pos)) = set.place_person(&mut rng, 0.2) {
            let b = &set.buildings[bi];
            assert!(b.bcube.contains_pt(pos));
            assert!(pos.z < b.ground_z() + b.floor_spacing);
        }
    }
}
