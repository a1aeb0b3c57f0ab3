//! Integration tests for the full building pipeline.
//!
//! Exercises: BuildingParams → gen_geometry (shape + interior) → room geometry
//! → collision / occlusion / lighting queries → placement and persistence.
//!
//! All tests are pure logic, no renderer.

use glam::Vec3;

use skyline_logic::building::Building;
use skyline_logic::collision::SphereQuery;
use skyline_logic::geom::Cube;
use skyline_logic::layout::calc_num_floors;
use skyline_logic::materials::BuildingParams;
use skyline_logic::occlusion::{check_pts_occluded, get_building_occluders, OcclusionState, ViewFrustum};
use skyline_logic::persistence::{load_buildings, save_buildings};
use skyline_logic::placement::{place_buildings, PlaceMode};
use skyline_logic::shape::gen_geometry;
use skyline_logic::validate::{
    check_door_clearance, check_exterior_doors, check_lit_mask, check_normalization, check_room_ids,
    count_errors, validate_building,
};

// ── Helpers ────────────────────────────────────────────────────────────

/// Generate one building with room contents.
fn generate(params: &BuildingParams, mat: usize, seed1: u64, seed2: u64) -> Building {
    let mut b = gen_geometry(params, mat, Vec3::ZERO, seed1, seed2);
    b.ensure_room_geom(params.get_material(mat), &[]);
    b
}

/// Every (material, seed) pair of a fixed sweep.
fn sweep(params: &BuildingParams) -> impl Iterator<Item = Building> + '_ {
    (0..params.materials.len())
        .flat_map(move |mat| (0..40u64).map(move |s| generate(params, mat, s, s.wrapping_mul(31) + 5)))
}

/// The default catalog with part heights left alone, so top floors may be partial.
fn partial_floor_params() -> BuildingParams {
    let mut params = BuildingParams::test_params();
    params.exact_mult_floor_height = false;
    params
}

/// Every (material, seed) pair of a longer sweep in the partial-top-floor mode.
fn partial_sweep(params: &BuildingParams) -> impl Iterator<Item = Building> + '_ {
    (0..params.materials.len()).flat_map(move |mat| (0..60u64).map(move |s| generate(params, mat, s, s + 1)))
}

/// A one-material catalog producing 4-sided houses three floors tall and too narrow to split.
fn three_floor_house_params() -> BuildingParams {
    let mut params = BuildingParams::default();
    params.wall_split_thresh = 3.0;
    params.exact_mult_floor_height = true;
    params.cur_mat.house_prob = 1.0;
    params.cur_mat.cube_prob = 1.0;
    params.cur_mat.round_prob = 0.0;
    params.add_cur_mat();
    params.finalize();
    let mat = &mut params.materials[0];
    let s = mat.get_floor_spacing();
    mat.size_min = Vec3::new(3.9 * s, 3.9 * s, 3.2 * s);
    mat.size_max = mat.size_min;
    params
}

/// Local point in the middle of the first floor of part 0.
fn part0_ground_center(b: &Building) -> Vec3 {
    let p = b.parts[0];
    Vec3::new(p.center().x, p.center().y, p.lo.z + 0.5 * b.floor_spacing.min(p.dz()))
}

// ── Determinism ────────────────────────────────────────────────────────

#[test]
fn deterministic_output() {
    let params = BuildingParams::test_params();
    for mat in 0..params.materials.len() {
        let a = generate(&params, mat, 123, 456);
        let b = generate(&params, mat, 123, 456);
        assert_eq!(a.parts, b.parts);
        assert_eq!(a.doors, b.doors);
        assert_eq!(a.bcube, b.bcube);
        let (ia, ib) = (a.interior.as_deref(), b.interior.as_deref());
        assert_eq!(ia.map(|i| &i.rooms), ib.map(|i| &i.rooms));
        assert_eq!(ia.map(|i| &i.doors), ib.map(|i| &i.doors));
        assert_eq!(a.room_objects().len(), b.room_objects().len());
    }
}

#[test]
fn different_seeds_produce_variation() {
    let params = BuildingParams::test_params();
    let bcubes: Vec<Cube> = (0..10u64).map(|s| generate(&params, 0, s, 1).bcube).collect();
    assert!(bcubes.windows(2).any(|w| w[0] != w[1]));
}

// ── Structural invariants ──────────────────────────────────────────────

#[test]
fn all_boxes_are_normalized() {
    let params = BuildingParams::test_params();
    for b in sweep(&params) {
        let errs = check_normalization(&b);
        assert!(errs.is_empty(), "seeds ({}, {}): {:?}", b.seed1, b.seed2, errs);
    }
}

#[test]
fn floor_count_exact_and_partial() {
    let mut part = Cube::from_bounds(0.0, 5.0, 0.0, 5.0, 0.0, 10.0);
    assert_eq!(calc_num_floors(&mut part, 3.0, 0.3, true), 3);
    assert!((part.hi.z - 9.0).abs() < 1e-5);

    let mut part = Cube::from_bounds(0.0, 5.0, 0.0, 5.0, 0.0, 10.0);
    assert_eq!(calc_num_floors(&mut part, 3.0, 0.3, false), 3);
    assert!((part.hi.z - 10.0).abs() < 1e-5);
}

#[test]
fn room_ids_unique_per_floor() {
    let params = BuildingParams::test_params();
    for b in sweep(&params) {
        if let Some(int) = b.interior.as_deref() {
            assert!(check_room_ids(int).is_empty());
        }
    }
}

#[test]
fn stairs_and_elevators_clear_doorways() {
    let params = BuildingParams::test_params();
    for b in sweep(&params) {
        if let Some(int) = b.interior.as_deref() {
            let errs = check_door_clearance(int);
            assert!(errs.is_empty(), "seeds ({}, {}): {:?}", b.seed1, b.seed2, errs);
        }
    }
}

#[test]
fn every_building_has_an_entrance() {
    let params = BuildingParams::test_params();
    for b in sweep(&params) {
        assert!(check_exterior_doors(&b).is_empty());
        assert_eq!(count_errors(&validate_building(&b)), 0);
    }
}

// ── Partial top floors ─────────────────────────────────────────────────

#[test]
fn partial_top_floor_boxes_are_normalized() {
    let params = partial_floor_params();
    for b in partial_sweep(&params) {
        let errs = check_normalization(&b);
        assert!(errs.is_empty(), "seeds ({}, {}): {:?}", b.seed1, b.seed2, errs);
        if let Some(int) = b.interior.as_deref() {
            assert!(check_room_ids(int).is_empty());
        }
    }
}

#[test]
fn partial_top_floor_lit_mask_matches_lights() {
    let params = partial_floor_params();
    for mut b in partial_sweep(&params) {
        let Some(int) = b.interior.as_deref() else {
            continue;
        };
        let errs = check_lit_mask(int);
        assert!(errs.is_empty(), "seeds ({}, {}): {:?}", b.seed1, b.seed2, errs);

        let lights: Vec<Vec3> = b
            .room_objects()
            .iter()
            .filter(|o| o.is_light())
            .map(|o| o.cube.center())
            .rev()
            .take(3)
            .collect();
        for p in lights {
            let world = b.local_to_world(p);
            assert!(b.toggle_room_light(world).is_some());
            let int = b.interior.as_deref().expect("lights imply an interior");
            assert!(check_lit_mask(int).is_empty(), "seeds ({}, {}) after toggle", b.seed1, b.seed2);
        }
    }
}

// ── End-to-end house ───────────────────────────────────────────────────

#[test]
fn three_floor_single_part_house() {
    let params = three_floor_house_params();
    let house = (0..64u64)
        .map(|s| generate(&params, 0, s, 99))
        .find(|b| b.parts.len() == 1)
        .expect("some seed yields a house without garage or chimney");

    assert!(house.is_house());
    assert!(house.geom.is_cube());
    let int = house.interior.as_deref().expect("house has an interior");
    assert_eq!(int.num_floors, 3);
    for f in 0..3 {
        assert!(int.rooms_on_floor(f).count() >= 1, "floor {} has no rooms", f);
    }
    assert_eq!(int.stairwells.len(), 1);
    assert_eq!(int.stairwells[0].num_floors, 3);
    assert!(check_exterior_doors(&house).is_empty());
    assert_eq!(count_errors(&validate_building(&house)), 0);
}

// ── Queries ────────────────────────────────────────────────────────────

#[test]
fn sphere_outside_everything_is_unchanged() {
    let params = BuildingParams::test_params();
    for b in sweep(&params).take(20) {
        let r = 0.3;
        let pos = Vec3::new(b.bcube.hi.x + 2.0 * r, b.bcube.center().y, b.bcube.center().z);
        let q = SphereQuery {
            check_interior: true,
            ..SphereQuery::new(pos, r)
        };
        assert_eq!(b.check_sphere_coll(&q), (pos, None));
    }
}

#[test]
fn enclosed_point_occluded_from_outside() {
    let params = BuildingParams::test_params();
    for b in sweep(&params).take(20) {
        let target = b.local_to_world(part0_ground_center(&b));
        let mut viewer_local = part0_ground_center(&b);
        viewer_local.x = b.parts[0].lo.x - (b.bcube.max_len() + 10.0);
        let viewer = b.local_to_world(viewer_local);

        let buildings = [b];
        let frustum = ViewFrustum::new(viewer, target - viewer, 0.5, 1.0e4);
        let mut st = OcclusionState::new();
        get_building_occluders(&buildings, &frustum, Vec3::ZERO, &mut st);
        assert_eq!(st.building_ids, vec![0]);
        assert!(check_pts_occluded(&buildings, &[target], &mut st));
    }
}

#[test]
fn lit_mask_tracks_toggles() {
    let params = BuildingParams::test_params();
    let mut toggled = 0;
    for mut b in sweep(&params).take(30) {
        let lights: Vec<Vec3> = b
            .room_objects()
            .iter()
            .filter(|o| o.is_light())
            .map(|o| o.cube.center())
            .collect();
        for p in lights.iter().take(4) {
            let world = b.local_to_world(*p);
            assert!(b.toggle_room_light(world).is_some());
            toggled += 1;
            let int = b.interior.as_deref().expect("lights imply an interior");
            assert!(check_lit_mask(int).is_empty());
        }
    }
    assert!(toggled > 0);
}

// ── Placement and persistence ──────────────────────────────────────────

#[test]
fn placed_set_survives_save_and_load() {
    let mut params = BuildingParams::test_params();
    params.num_place = 8;
    let set = place_buildings(&params, 77, PlaceMode::Any);
    assert!(!set.is_empty());

    let mut buf = Vec::new();
    save_buildings(&mut buf, &set, &params).unwrap();
    let loaded = load_buildings(buf.as_slice(), &params).unwrap();
    assert_eq!(loaded.get_stats(), set.get_stats());
    for (a, b) in set.buildings.iter().zip(&loaded.buildings) {
        assert_eq!(a.parts, b.parts);
        assert_eq!(a.pos, b.pos);
    }
}
