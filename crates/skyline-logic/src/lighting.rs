//! Room lights: selection for the camera, light toggles and volumetric baking.

use glam::Vec3;
use rand::Rng;

use crate::building::Building;
use crate::bvh::{ray_cast_interior, CubeBvh};
use crate::color::Color;
use crate::geom::Cube;
use crate::interior::Interior;
use crate::rng::{rng_for_seeds_stream, streams, GenRng};
use crate::room_geom::RoomGeom;

/// Implemented by the world context that owns the lights pass.
pub trait LightsManager {
    fn enable_lights(&self) -> bool;
}

/// Sink for volumetric light samples; owned outside the building system.
pub trait LightmapAccumulator {
    fn add_sample(&mut self, pos: Vec3, amount: f32, color: Color);
}

/// A room light selected for dynamic lighting this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSource {
    pub pos: Vec3,
    pub radius: f32,
    pub color: Color,
    /// World-space influence box.
    pub bcube: Cube,
    pub building: usize,
    pub obj_ix: usize,
    /// Lower is more important.
    pub priority: f32,
}

/// Per-frame light selection state shared across buildings.
#[derive(Debug, Clone)]
pub struct CityLightsState {
    pub lights_bcube: Cube,
    pub lights: Vec<LightSource>,
    pub max_lights: usize,
    pub camera: Vec3,
}

impl CityLightsState {
    pub fn new(max_lights: usize) -> Self {
        Self {
            lights_bcube: Cube::default(),
            lights: Vec::new(),
            max_lights,
            camera: Vec3::ZERO,
        }
    }

    /// Start a new frame. Returns false when the lights pass is disabled.
    pub fn begin_lights_setup(&mut self, mgr: &impl LightsManager, camera: Vec3, light_radius: f32) -> bool {
        self.lights.clear();
        self.camera = camera;
        if !mgr.enable_lights() {
            self.lights_bcube = Cube::from_point(camera);
            return false;
        }
        self.lights_bcube = Cube::from_point(camera).expand_by(light_radius);
        true
    }

    /// Keep the `max_lights` lowest-priority-value lights.
    pub fn clamp_to_max_lights(&mut self) {
        if self.lights.len() <= self.max_lights {
            return;
        }
        self.lights.sort_by(|a, b| a.priority.total_cmp(&b.priority));
        self.lights.truncate(self.max_lights);
    }

    /// Shrink `lights_bcube` to the union of the selected lights' boxes.
    pub fn tighten_light_bcube_bounds(&mut self) {
        let mut it = self.lights.iter();
        let Some(first) = it.next() else {
            return;
        };
        let mut bc = first.bcube;
        for l in it {
            bc.union_with(&l.bcube);
        }
        if let Some(c) = bc.intersection(&self.lights_bcube) {
            self.lights_bcube = c;
        }
    }

    pub fn finalize_lights(&mut self) {
        self.clamp_to_max_lights();
        self.tighten_light_bcube_bounds();
        log::debug!("{} room lights selected", self.lights.len());
    }
}

/// Flip one light, update its floor's lit bit and its bake queue entry. Returns the new state.
fn flip_light(int: &mut Interior, rg: &mut RoomGeom, ix: usize) -> bool {
    let lit = !rg.objs[ix].is_lit();
    rg.objs[ix].set_lit(lit);
    let floor = int.light_floor(&rg.objs[ix]);
    let any_lit = rg.light_ixs().any(|i| rg.objs[i].is_lit() && int.light_floor(&rg.objs[i]) == floor);
    // A second toggle before baking cancels the first.
    match rg.pending_bake.iter().position(|&i| i == ix) {
        Some(pos) => {
            rg.pending_bake.swap_remove(pos);
        }
        None => rg.pending_bake.push(ix),
    }
    int.set_floor_lit(floor, any_lit);
    lit
}

// ── Interior ray helpers ───────────────────────────────────────────────

fn wall_hit(int: &Interior, p1: Vec3, p2: Vec3) -> Option<f32> {
    int.all_walls()
        .filter_map(|w| w.line_intersection(p1, p2))
        .map(|(t0, _)| t0)
        .reduce(f32::min)
}

/// End point of p1→p2 cut at the first interior wall. Only wall boxes are tested.
pub fn clip_ray_to_walls(int: &Interior, p1: Vec3, p2: Vec3) -> Vec3 {
    match wall_hit(int, p1, p2) {
        Some(t) => p1 + (p2 - p1) * t,
        None => p2,
    }
}

fn slab_hit(int: &Interior, p1: Vec3, p2: Vec3) -> Option<f32> {
    int.floors
        .iter()
        .chain(int.ceilings.iter())
        .filter_map(|s| s.line_intersection(p1, p2))
        .map(|(t0, _)| t0)
        .reduce(f32::min)
}

/// Light influence box bounded by nearby walls and the floor below.
pub fn refine_light_bcube(int: &Interior, lpos: Vec3, radius: f32) -> Cube {
    const NUM_RAYS: usize = 8;
    let mut bc = Cube::from_point(lpos);
    for i in 0..NUM_RAYS {
        let a = i as f32 * std::f32::consts::TAU / NUM_RAYS as f32;
        let (s, c) = a.sin_cos();
        bc.union_with_pt(clip_ray_to_walls(int, lpos, lpos + Vec3::new(c, s, 0.0) * radius));
    }
    let down = lpos - Vec3::Z * radius;
    let t = slab_hit(int, lpos, down).unwrap_or(1.0);
    bc.lo.z = lpos.z - radius * t;
    // Rays that stop at once would leave a flat box.
    bc.expand_by(1.0e-3 * radius.max(1.0))
}

impl Building {
    /// Does an interior wall or slab block the segment between a light and the camera (local frame)?
    pub fn is_light_occluded(&self, lpos: Vec3, camera: Vec3) -> bool {
        let Some(int) = self.interior.as_deref() else {
            return false;
        };
        wall_hit(int, lpos, camera).is_some() || slab_hit(int, lpos, camera).is_some()
    }

    /// Add this building's lit room lights near the camera to `state`. Returns the number added.
    pub fn add_room_lights(&self, xlate: Vec3, building_id: usize, state: &mut CityLightsState) -> usize {
        let Some(int) = self.interior.as_deref() else {
            return 0;
        };
        let Some(rg) = int.room_geom.as_deref() else {
            return 0;
        };
        if !self.bcube.translated(xlate).intersects(&state.lights_bcube) {
            return 0;
        }
        let camera = self.world_to_local(state.camera - xlate);
        let mut added = 0;
        for ix in rg.light_ixs() {
            let obj = &rg.objs[ix];
            if !obj.is_lit() {
                continue;
            }
            let floor = int.light_floor(obj);
            if !int.is_floor_lit(floor) && Interior::floor_in_lit_mask(floor) {
                continue;
            }
            let local_bc = rg.light_bcube(ix).unwrap_or(obj.cube);
            let bcube = self.local_cube_to_world(&local_bc).translated(xlate);
            if !bcube.intersects(&state.lights_bcube) {
                continue;
            }
            let lpos = obj.cube.center();
            let mut lpos_below = lpos;
            lpos_below.z = obj.cube.lo.z - 0.01 * int.floor_spacing;
            let pos = self.local_to_world(lpos_below) + xlate;
            let mut priority = pos.distance_squared(state.camera);
            if self.is_light_occluded(lpos_below, camera) {
                priority *= 4.0;
            }
            state.lights.push(LightSource {
                pos,
                radius: 0.5 * bcube.size().x.max(bcube.size().y),
                color: obj.color.scaled(obj.light_amt),
                bcube,
                building: building_id,
                obj_ix: ix,
                priority,
            });
            added += 1;
        }
        added
    }

    /// Flip the light nearest to world point `closest_to`. Returns its new state.
    ///
    /// Lights on the point's floor are preferred. The floor's lit bit is recomputed from
    /// every light on that floor, and the light is queued for the next volumetric bake.
    pub fn toggle_room_light(&mut self, closest_to: Vec3) -> Option<bool> {
        let p = self.world_to_local(closest_to);
        let int = self.interior.as_deref_mut()?;
        let target_floor = int.floor_for_point(p);
        let mut rg = int.room_geom.take()?;

        let nearest = |same_floor: bool| {
            rg.light_ixs()
                .filter(|&i| !same_floor || int.light_floor(&rg.objs[i]) == target_floor)
                .min_by(|&a, &b| {
                    let da = rg.objs[a].cube.center().distance_squared(p);
                    let db = rg.objs[b].cube.center().distance_squared(p);
                    da.total_cmp(&db)
                })
        };
        let Some(ix) = nearest(true).or_else(|| nearest(false)) else {
            int.room_geom = Some(rg);
            return None;
        };

        let lit = flip_light(int, &mut rg, ix);
        int.room_geom = Some(rg);
        Some(lit)
    }

    /// Force light `obj_ix` on or off. Returns whether its state changed, or `None` if
    /// the index is not a light.
    pub fn set_room_light(&mut self, obj_ix: usize, lit: bool) -> Option<bool> {
        let int = self.interior.as_deref_mut()?;
        let mut rg = int.room_geom.take()?;
        let changed = match rg.objs.get(obj_ix) {
            Some(obj) if obj.is_light() => Some(obj.is_lit() != lit),
            _ => None,
        };
        if changed == Some(true) {
            flip_light(int, &mut rg, obj_ix);
        }
        int.room_geom = Some(rg);
        changed
    }

    /// Bake every light whose state changed since the last bake. Returns the number baked.
    pub fn bake_pending_lights(&mut self, acc: &mut impl LightmapAccumulator) -> usize {
        let pending = match self.interior.as_deref_mut().and_then(|i| i.room_geom.as_deref_mut()) {
            Some(rg) if !rg.pending_bake.is_empty() => std::mem::take(&mut rg.pending_bake),
            _ => return 0,
        };
        self.ensure_interior_bvh();
        let Some(int) = self.interior.as_deref() else {
            return 0;
        };
        let (Some(rg), Some(bvh)) = (int.room_geom.as_deref(), int.bvh.as_ref()) else {
            return 0;
        };
        let radius = 2.5 * int.floor_spacing;
        let mut world = WorldAccumulator { b: self, acc };
        for &ix in &pending {
            let obj = &rg.objs[ix];
            // Same seed per light, so turning it off subtracts exactly what was added.
            let mut rng = rng_for_seeds_stream(self.seed1, self.seed2, streams::LIGHTS | ((ix as u64 + 1) << 8));
            let weight = if obj.is_lit() { 1.0 } else { -1.0 };
            let mut lpos = obj.cube.center();
            lpos.z = obj.cube.lo.z - 0.01 * int.floor_spacing;
            bake_volumetric_light(lpos, obj.color, radius, weight, bvh, &mut rng, &mut world);
        }
        log::debug!("baked {} lights for building ({}, {})", pending.len(), self.seed1, self.seed2);
        pending.len()
    }
}

/// Moves local-frame samples into world space.
struct WorldAccumulator<'a, A> {
    b: &'a Building,
    acc: &'a mut A,
}

impl<A: LightmapAccumulator> LightmapAccumulator for WorldAccumulator<'_, A> {
    fn add_sample(&mut self, pos: Vec3, amount: f32, color: Color) {
        self.acc.add_sample(self.b.local_to_world(pos), amount, color);
    }
}

pub const BAKE_RAYS: usize = 64;
const BAKE_STEPS: usize = 16;

/// March rays from a ceiling light through the interior, depositing attenuated samples.
///
/// Rays go into the lower hemisphere and stop at the first surface, which gets one
/// half-strength bounce sample tinted by its color. Returns the number of samples added.
pub fn bake_volumetric_light(
    lpos: Vec3,
    color: Color,
    radius: f32,
    weight: f32,
    bvh: &CubeBvh,
    rng: &mut GenRng,
    acc: &mut impl LightmapAccumulator,
) -> usize {
    let step = radius / BAKE_STEPS as f32;
    let per_ray = weight / BAKE_RAYS as f32;
    let mut samples = 0;
    for _ in 0..BAKE_RAYS {
        let z: f32 = -rng.gen_range(0.0f32..1.0);
        let a: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
        let r = (1.0 - z * z).max(0.0).sqrt();
        let dir = Vec3::new(r * a.cos(), r * a.sin(), z);
        let hit = ray_cast_interior(lpos, dir, bvh).filter(|h| h.dist < radius);
        let end = hit.map_or(radius, |h| h.dist);
        let mut d = 0.5 * step;
        while d < end {
            let falloff = 1.0 - d / radius;
            acc.add_sample(lpos + dir * d, per_ray * falloff * falloff, color);
            samples += 1;
            d += step;
        }
        if let Some(h) = hit {
            let falloff = 1.0 - h.dist / radius;
            let bounce = Color::rgb(color.r * h.color.r, color.g * h.color.g, color.b * h.color.b);
            acc.add_sample(h.point + h.normal * 0.5 * step, 0.5 * per_ray * falloff * falloff, bounce);
            samples += 1;
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh::ColoredCube;
    use crate::room_geom::{RoomGeom, RoomObject, RoomObjectKind};

    struct On(bool);
    impl LightsManager for On {
        fn enable_lights(&self) -> bool {
            self.0
        }
    }

    #[derive(Default)]
    struct Sum {
        total: f32,
        n: usize,
        min_z: f32,
    }
    impl LightmapAccumulator for Sum {
        fn add_sample(&mut self, pos: Vec3, amount: f32, _color: Color) {
            self.total += amount;
            self.min_z = if self.n == 0 { pos.z } else { self.min_z.min(pos.z) };
            self.n += 1;
        }
    }

    fn light(x: f32, floor: usize, lit: bool) -> RoomObject {
        let z = floor as f32 * 3.0 + 2.85;
        let mut o = RoomObject::new(
            Cube::from_bounds(x - 0.2, x + 0.2, -0.2, 0.2, z - 0.05, z),
            RoomObjectKind::Light,
            floor as u8,
        );
        o.set_lit(lit);
        o
    }

    /// Two floors, a wall at x = 0 and three lights.
    fn lit_building() -> Building {
        let mut b = Building::new(0, 7, 9, Vec3::ZERO);
        b.floor_spacing = 3.0;
        b.parts.push(Cube::from_bounds(-5.0, 5.0, -5.0, 5.0, 0.0, 6.0));
        b.real_num_parts = 1;
        b.calc_bcube_from_parts();
        let mut int = Interior::new(0.0, 3.0, 0.15);
        int.num_floors = 2;
        for f in 0..2 {
            let z = f as f32 * 3.0;
            int.floors.push(Cube::from_bounds(-5.0, 5.0, -5.0, 5.0, z, z + 0.075));
            int.ceilings.push(Cube::from_bounds(-5.0, 5.0, -5.0, 5.0, z + 2.925, z + 3.0));
            int.walls[0].push(Cube::from_bounds(-0.05, 0.05, -5.0, 5.0, z + 0.075, z + 2.925));
        }
        let rg = RoomGeom {
            objs: vec![light(-2.0, 0, true), light(2.0, 0, false), light(-2.0, 1, false)],
            ..RoomGeom::default()
        };
        int.room_geom = Some(Box::new(rg));
        int.set_floor_lit(0, true);
        b.interior = Some(Box::new(int));
        b
    }

    #[test]
    fn toggle_keeps_floor_mask_consistent() {
        let mut b = lit_building();
        assert_eq!(b.toggle_room_light(Vec3::new(2.5, 0.0, 1.0)), Some(true));
        assert!(b.interior.as_ref().unwrap().is_floor_lit(0));
        assert_eq!(b.toggle_room_light(Vec3::new(-2.5, 0.0, 1.0)), Some(false));
        assert!(b.interior.as_ref().unwrap().is_floor_lit(0));
        assert_eq!(b.toggle_room_light(Vec3::new(2.5, 0.0, 1.0)), Some(false));
        assert!(!b.interior.as_ref().unwrap().is_floor_lit(0));
        // Upper floor light is chosen by floor, not raw distance.
        assert_eq!(b.toggle_room_light(Vec3::new(2.0, 0.0, 4.0)), Some(true));
        assert!(b.interior.as_ref().unwrap().is_floor_lit(1));
    }

    #[test]
    fn double_toggle_clears_pending_bake() {
        let mut b = lit_building();
        b.toggle_room_light(Vec3::new(2.0, 0.0, 1.0));
        b.toggle_room_light(Vec3::new(2.0, 0.0, 1.0));
        let mut acc = Sum::default();
        assert_eq!(b.bake_pending_lights(&mut acc), 0);
        assert_eq!(acc.n, 0);
    }

    #[test]
    fn bake_on_then_off_cancels() {
        let mut b = lit_building();
        let mut acc = Sum::default();
        b.toggle_room_light(Vec3::new(2.0, 0.0, 1.0));
        assert_eq!(b.bake_pending_lights(&mut acc), 1);
        assert!(acc.total > 0.0);
        assert!(b.interior.as_ref().unwrap().bvh.is_some());
        b.toggle_room_light(Vec3::new(2.0, 0.0, 1.0));
        assert_eq!(b.bake_pending_lights(&mut acc), 1);
        assert!(acc.total.abs() < 1e-4);
    }

    #[test]
    fn refined_bcube_stops_at_wall_and_floor() {
        let b = lit_building();
        let int = b.interior.as_deref().unwrap();
        let bc = refine_light_bcube(int, Vec3::new(-2.0, 0.0, 2.79), 7.5);
        assert!(bc.hi.x < 0.0);
        assert!(bc.lo.x < -4.9);
        assert!(bc.lo.z > 0.0 && bc.lo.z < 0.2);
        assert!(bc.is_strictly_normalized());
    }

    #[test]
    fn light_selection_priority_and_budget() {
        let mut b = lit_building();
        b.toggle_room_light(Vec3::new(2.0, 0.0, 1.0));
        let mut state = CityLightsState::new(1);
        assert!(!state.begin_lights_setup(&On(false), Vec3::new(-2.0, 0.0, 1.5), 20.0));
        assert!(state.begin_lights_setup(&On(true), Vec3::new(-2.0, 0.0, 1.5), 20.0));
        assert_eq!(b.add_room_lights(Vec3::ZERO, 3, &mut state), 2);
        state.finalize_lights();
        assert_eq!(state.lights.len(), 1);
        // The light on the camera's side of the wall wins.
        assert_eq!(state.lights[0].obj_ix, 0);
        assert_eq!(state.lights[0].building, 3);
    }

    #[test]
    fn bake_samples_stop_at_surfaces() {
        let bvh = CubeBvh::build(vec![ColoredCube {
            cube: Cube::from_bounds(-10.0, 10.0, -10.0, 10.0, -1.0, 0.0),
            color: Color::GRAY,
        }]);
        let mut rng = rng_for_seeds_stream(1, 2, streams::LIGHTS);
        let mut acc = Sum::default();
        let n = bake_volumetric_light(Vec3::new(0.0, 0.0, 1.0), Color::WHITE, 5.0, 1.0, &bvh, &mut rng, &mut acc);
        assert_eq!(n, acc.n);
        assert!(n >= BAKE_RAYS);
        assert!(acc.total > 0.0);
        assert!(acc.min_z > 0.0);
    }
}
