//! Skyline Headless Generation Harness
//!
//! Generates a city of buildings and checks structure, queries, lighting, drawing and
//! persistence. Runs entirely in-process, no rendering.
//!
//! Usage:
//!   cargo run -p skyline-simtest
//!   cargo run -p skyline-simtest -- --verbose
//!   cargo run -p skyline-simtest -- --config path/to/buildings.json
//!
//! Set `RUST_LOG=debug` for per-building generation logs.

use glam::Vec3;

use skyline_logic::building::Building;
use skyline_logic::collision::SphereQuery;
use skyline_logic::color::Color;
use skyline_logic::config::{load_params_from_file, load_params_from_str};
use skyline_logic::draw::{DrawBatch, DrawGroup};
use skyline_logic::lighting::{CityLightsState, LightmapAccumulator, LightsManager};
use skyline_logic::materials::{BuildingParams, TexDesc};
use skyline_logic::occlusion::{check_pts_occluded, get_building_occluders, OcclusionState, ViewFrustum};
use skyline_logic::persistence::{load_buildings, save_buildings};
use skyline_logic::placement::{gen_tile, place_buildings, BuildingSet, PlaceMode};
use skyline_logic::rng::rng_for_seeds;
use skyline_logic::shape::gen_geometry;
use skyline_logic::validate::{check_lit_mask, validate_building, Severity};

// ── Default config (shipped with the repo) ──────────────────────────────
const BUILDINGS_JSON: &str = include_str!("../../../data/buildings.json");

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose");
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1));
    println!("=== Skyline Generation Harness ===\n");

    let mut results = Vec::new();

    // 1. Config
    let params = match load_config(config_path, &mut results) {
        Some(p) => p,
        None => {
            report(&results, verbose);
            std::process::exit(1);
        }
    };

    // 2. Single-building generation sweep
    results.extend(validate_generation(&params, verbose));

    // 3. Placement, tiles and stats
    let set = place_buildings(&params, 2024, PlaceMode::Any);
    results.extend(validate_placement(&params, &set, verbose));

    // 4. Collision queries
    results.extend(validate_collision(&set, verbose));

    // 5. Occlusion
    results.extend(validate_occlusion(&set, verbose));

    // 6. Lighting
    results.extend(validate_lighting(&params, verbose));

    // 7. Draw producer
    results.extend(validate_drawing(&params, &set, verbose));

    // 8. Persistence
    results.extend(validate_persistence(&params, &set, verbose));

    if !report(&results, verbose) {
        std::process::exit(1);
    }
}

/// Print the summary. Returns true when everything passed.
fn report(results: &[TestResult], verbose: bool) -> bool {
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!("\n=== RESULT: {}/{} passed, {} failed ===", passed, total, failed);
    failed == 0
}

// ── 1. Config ───────────────────────────────────────────────────────────

fn load_config(path: Option<&String>, results: &mut Vec<TestResult>) -> Option<BuildingParams> {
    println!("--- Config ---");
    let loaded = match path {
        Some(p) => load_params_from_file(p),
        None => load_params_from_str(BUILDINGS_JSON),
    };
    let source = path.map_or("built-in buildings.json", |p| p.as_str());
    log::info!("harness config: {}", source);
    match loaded {
        Ok(params) => {
            results.push(TestResult {
                name: "config_load".into(),
                passed: !params.materials.is_empty(),
                detail: format!("{}: {} materials", source, params.materials.len()),
            });
            Some(params)
        }
        Err(e) => {
            results.push(TestResult {
                name: "config_load".into(),
                passed: false,
                detail: format!("{}: {}", source, e),
            });
            None
        }
    }
}

// ── 2. Generation ───────────────────────────────────────────────────────

fn generate(params: &BuildingParams, mat: usize, seed1: u64, seed2: u64) -> Building {
    let mut b = gen_geometry(params, mat, Vec3::ZERO, seed1, seed2);
    b.ensure_room_geom(params.get_material(mat), &[]);
    b
}

fn validate_generation(params: &BuildingParams, verbose: bool) -> Vec<TestResult> {
    println!("--- Generation ---");
    let mut results = Vec::new();
    let seeds = 50u64;

    let mut errors = 0;
    let mut warnings = 0;
    let mut first_error = String::new();
    for mat in 0..params.materials.len() {
        for s in 0..seeds {
            let b = generate(params, mat, s, s ^ 0x5eed);
            for e in validate_building(&b) {
                match e.severity {
                    Severity::Error => {
                        if first_error.is_empty() {
                            first_error = format!("mat {} seed {}: [{}] {}", mat, s, e.category, e.message);
                        }
                        errors += 1;
                    }
                    Severity::Warning => warnings += 1,
                }
            }
        }
    }
    let n = seeds as usize * params.materials.len();
    if verbose {
        println!("  {} buildings, {} errors, {} warnings", n, errors, warnings);
    }
    results.push(TestResult {
        name: "structure_valid".into(),
        passed: errors == 0,
        detail: if errors == 0 {
            format!("{} buildings, {} connectivity warnings", n, warnings)
        } else {
            format!("{} errors, first: {}", errors, first_error)
        },
    });

    let same = (0..params.materials.len()).all(|mat| {
        let a = generate(params, mat, 7, 8);
        let b = generate(params, mat, 7, 8);
        a.parts == b.parts
            && a.doors == b.doors
            && a.interior.as_deref().map(|i| &i.rooms) == b.interior.as_deref().map(|i| &i.rooms)
    });
    results.push(TestResult {
        name: "deterministic".into(),
        passed: same,
        detail: "same seeds give identical parts, doors and rooms".into(),
    });

    let with_int = (0..seeds)
        .filter(|&s| generate(params, 0, s, 1).has_interior())
        .count();
    results.push(TestResult {
        name: "interiors_generated".into(),
        passed: !params.gen_interiors || with_int > 0,
        detail: format!("{}/{} of material 0 have interiors", with_int, seeds),
    });

    results
}

// ── 3. Placement ────────────────────────────────────────────────────────

fn validate_placement(params: &BuildingParams, set: &BuildingSet, verbose: bool) -> Vec<TestResult> {
    println!("--- Placement ---");
    let mut results = Vec::new();
    let stats = set.get_stats();
    if verbose {
        println!("  {:?}", stats);
    }
    results.push(TestResult {
        name: "buildings_placed".into(),
        passed: !set.is_empty(),
        detail: format!("{} of {} placed", set.len(), params.num_place),
    });

    let mut clashes = 0;
    for (i, a) in set.buildings.iter().enumerate() {
        let grown = a.bcube.expand_by_xy(params.sec_extra_spacing);
        clashes += set.buildings[i + 1..]
            .iter()
            .filter(|b| grown.intersects_xy(&b.bcube))
            .count();
    }
    results.push(TestResult {
        name: "placement_spacing".into(),
        passed: clashes == 0,
        detail: format!("{} overlapping pairs", clashes),
    });

    let a = gen_tile(params, 3, -1, params.tile_size, 99);
    let b = gen_tile(params, 3, -1, params.tile_size, 99);
    let stable = a.len() == b.len() && a.buildings.iter().zip(&b.buildings).all(|(x, y)| x.bcube == y.bcube);
    results.push(TestResult {
        name: "tile_stable".into(),
        passed: stable,
        detail: format!("tile (3, -1) has {} buildings", a.len()),
    });

    let mut rng = rng_for_seeds(5, 0);
    let person = set.place_person(&mut rng, 0.25);
    results.push(TestResult {
        name: "person_placement".into(),
        passed: stats.with_interior == 0 || person.is_some(),
        detail: match person {
            Some((bi, p)) => format!("building {} at ({:.1}, {:.1}, {:.1})", bi, p.x, p.y, p.z),
            None => "no building with an interior".into(),
        },
    });

    results
}

// ── 4. Collision ────────────────────────────────────────────────────────

fn validate_collision(set: &BuildingSet, verbose: bool) -> Vec<TestResult> {
    println!("--- Collision ---");
    let mut results = Vec::new();
    let r = 0.3;

    let mut moved = 0;
    for b in &set.buildings {
        let pos = Vec3::new(b.bcube.lo.x - 2.0 * r, b.bcube.center().y, b.bcube.center().z);
        if set.check_point_or_cylin_contained(pos, r, Vec3::ZERO).is_some() {
            continue;
        }
        let q = SphereQuery {
            check_interior: true,
            ..SphereQuery::new(pos, r)
        };
        if set.check_sphere_coll(&q).0 != pos {
            moved += 1;
        }
    }
    results.push(TestResult {
        name: "sphere_idempotent".into(),
        passed: moved == 0,
        detail: format!("{} free spheres pushed", moved),
    });

    let mut pushed_out = 0;
    let mut tested = 0;
    for b in set.buildings.iter().filter(|b| b.geom.is_cube()) {
        let part = b.parts[0];
        let face = Vec3::new(part.lo.x + 0.5 * r, part.center().y, part.lo.z + 0.5 * b.floor_spacing);
        let pos = b.local_to_world(face);
        let (p, n) = b.check_sphere_coll(&SphereQuery::new(pos, r));
        tested += 1;
        if n.is_some() && p != pos {
            pushed_out += 1;
        }
    }
    if verbose {
        println!("  {}/{} wall-touching spheres resolved", pushed_out, tested);
    }
    results.push(TestResult {
        name: "sphere_pushout".into(),
        passed: pushed_out == tested,
        detail: format!("{}/{} penetrating spheres resolved", pushed_out, tested),
    });

    let mut hits = 0;
    let mut pts = Vec::new();
    for b in &set.buildings {
        let c = b.local_to_world(b.parts[0].center());
        let from = Vec3::new(c.x, b.bcube.lo.y - 20.0, c.z);
        if set.check_line_coll(from, c, Vec3::ZERO, false, &mut pts).is_some() {
            hits += 1;
        }
    }
    results.push(TestResult {
        name: "line_hits".into(),
        passed: hits == set.len(),
        detail: format!("{}/{} segments into part centers hit", hits, set.len()),
    });

    results
}

// ── 5. Occlusion ────────────────────────────────────────────────────────

fn validate_occlusion(set: &BuildingSet, verbose: bool) -> Vec<TestResult> {
    println!("--- Occlusion ---");
    let mut results = Vec::new();
    let mut occluded = 0;
    let mut tested = 0;
    let mut st = OcclusionState::new();

    for (i, b) in set.buildings.iter().enumerate().take(20) {
        let p0 = b.parts[0];
        let mut local = p0.center();
        local.z = p0.lo.z + 0.5 * b.floor_spacing.min(p0.dz());
        let target = b.local_to_world(local);
        local.x = p0.lo.x - (b.bcube.max_len() + 1.0);
        let viewer = b.local_to_world(local);
        if set.check_point_or_cylin_contained(viewer, 0.0, Vec3::ZERO).is_some() {
            continue;
        }
        st.set_excluded((0..set.len()).filter(|&j| j != i));
        let f = ViewFrustum::new(viewer, target - viewer, 0.6, 1.0e4);
        get_building_occluders(&set.buildings, &f, Vec3::ZERO, &mut st);
        tested += 1;
        if check_pts_occluded(&set.buildings, &[target], &mut st) {
            occluded += 1;
        }
    }
    if verbose {
        println!("  {}/{} enclosed points occluded", occluded, tested);
    }
    results.push(TestResult {
        name: "enclosed_points_occluded".into(),
        passed: occluded == tested,
        detail: format!("{}/{}", occluded, tested),
    });
    results
}

// ── 6. Lighting ─────────────────────────────────────────────────────────

struct AlwaysOn;

impl LightsManager for AlwaysOn {
    fn enable_lights(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct SampleCounter {
    samples: usize,
    total: f32,
}

impl LightmapAccumulator for SampleCounter {
    fn add_sample(&mut self, _pos: Vec3, amount: f32, _color: Color) {
        self.samples += 1;
        self.total += amount;
    }
}

fn validate_lighting(params: &BuildingParams, verbose: bool) -> Vec<TestResult> {
    println!("--- Lighting ---");
    let mut results = Vec::new();

    let Some(mut b) = (0..50u64)
        .map(|s| generate(params, 0, s, 3))
        .find(|b| b.room_objects().iter().any(|o| o.is_light()))
    else {
        results.push(TestResult {
            name: "lights_exist".into(),
            passed: !params.gen_interiors,
            detail: "no building with room lights".into(),
        });
        return results;
    };

    let mut acc = SampleCounter::default();
    let baked = b.bake_pending_lights(&mut acc);
    if verbose {
        println!("  baked {} lights, {} samples", baked, acc.samples);
    }
    results.push(TestResult {
        name: "initial_bake".into(),
        passed: baked == 0 || acc.samples > 0,
        detail: format!("{} lights, {} samples", baked, acc.samples),
    });

    let light_pos: Vec<Vec3> = b
        .room_objects()
        .iter()
        .filter(|o| o.is_light())
        .map(|o| o.cube.center())
        .collect();
    let mut consistent = true;
    for p in &light_pos {
        b.toggle_room_light(b.local_to_world(*p));
        if let Some(int) = b.interior.as_deref() {
            consistent &= check_lit_mask(int).is_empty();
        }
    }
    results.push(TestResult {
        name: "lit_mask_consistent".into(),
        passed: consistent,
        detail: format!("{} toggles", light_pos.len()),
    });

    // Everything toggled once, then again: the second pass cancels the queued bakes.
    for p in &light_pos {
        b.toggle_room_light(b.local_to_world(*p));
    }
    let mut acc = SampleCounter::default();
    results.push(TestResult {
        name: "double_toggle_cancels".into(),
        passed: b.bake_pending_lights(&mut acc) == 0,
        detail: "no pending bakes after toggling twice".into(),
    });

    let set = {
        let mut s = BuildingSet::new();
        s.add(b);
        s
    };
    let mut state = CityLightsState::new(params.max_lights.min(4));
    let camera = set.buildings[0].bcube.center();
    let n = set.setup_room_lights(&AlwaysOn, camera, Vec3::ZERO, 50.0, &mut state);
    results.push(TestResult {
        name: "light_budget".into(),
        passed: n <= 4 && state.lights.iter().all(|l| l.bcube.intersects(&state.lights_bcube)),
        detail: format!("{} lights selected (max 4)", n),
    });

    results
}

// ── 7. Drawing ──────────────────────────────────────────────────────────

#[derive(Default)]
struct PrimCounter {
    quads: usize,
    tris: usize,
    bad_normals: usize,
}

impl DrawBatch for PrimCounter {
    fn add_quad(&mut self, _group: DrawGroup, _tex: &TexDesc, _pts: &[Vec3; 4], normal: Vec3, _color: Color) {
        self.quads += 1;
        if !normal.is_normalized() {
            self.bad_normals += 1;
        }
    }

    fn add_triangle(&mut self, _group: DrawGroup, _tex: &TexDesc, _pts: &[Vec3; 3], normal: Vec3, _color: Color) {
        self.tris += 1;
        if !normal.is_normalized() {
            self.bad_normals += 1;
        }
    }
}

fn validate_drawing(params: &BuildingParams, set: &BuildingSet, verbose: bool) -> Vec<TestResult> {
    println!("--- Drawing ---");
    let mut results = Vec::new();
    let mut sink = PrimCounter::default();
    let mut empty = 0;
    for b in &set.buildings {
        let mat = params.get_material(b.mat_ix);
        let n = b.get_all_drawn_verts(mat, &mut sink, true, true);
        b.get_all_drawn_window_verts(mat, &mut sink, false, 0.01, None);
        if n == 0 {
            empty += 1;
        }
    }
    if verbose {
        println!("  {} quads, {} triangles", sink.quads, sink.tris);
    }
    results.push(TestResult {
        name: "every_building_drawn".into(),
        passed: empty == 0,
        detail: format!("{} buildings drew nothing", empty),
    });
    results.push(TestResult {
        name: "unit_normals".into(),
        passed: sink.bad_normals == 0,
        detail: format!("{} bad normals in {} primitives", sink.bad_normals, sink.quads + sink.tris),
    });
    results
}

// ── 8. Persistence ──────────────────────────────────────────────────────

fn validate_persistence(params: &BuildingParams, set: &BuildingSet, _verbose: bool) -> Vec<TestResult> {
    println!("--- Persistence ---");
    let mut buf = Vec::new();
    let result = save_buildings(&mut buf, set, params)
        .and_then(|_| load_buildings(buf.as_slice(), params));
    let (passed, detail) = match result {
        Ok(loaded) => {
            let same = loaded.len() == set.len()
                && loaded.buildings.iter().zip(&set.buildings).all(|(a, b)| a.parts == b.parts);
            (same, format!("{} bytes, {} buildings", buf.len(), loaded.len()))
        }
        Err(e) => (false, e.to_string()),
    };
    vec![TestResult {
        name: "save_load_roundtrip".into(),
        passed,
        detail,
    }]
}
