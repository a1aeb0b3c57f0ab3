//! Material catalog and per-run generation parameters.
//!
//! The catalog is filled once while loading configuration, then `finalize()` derives
//! window tiling, floor spacing and the weighted material index lists. After that it
//! is read-only for the whole generation run.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::color::{Color, ColorRange};
use crate::constants::{DEFAULT_NUM_TRIES, DEFAULT_WALL_SPLIT_THRESH};
use crate::rng::{rand_index, GenRng};

/// Opaque texture handle pair plus tiling. Resolution of ids happens outside this crate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TexDesc {
    pub tid: i32,
    pub nm_tid: i32,
    pub tscale_x: f32,
    pub tscale_y: f32,
    pub txoff: f32,
    pub tyoff: f32,
    pub emissive: bool,
}

impl Default for TexDesc {
    fn default() -> Self {
        Self {
            tid: -1,
            nm_tid: -1,
            tscale_x: 1.0,
            tscale_y: 1.0,
            txoff: 0.0,
            tyoff: 0.0,
            emissive: false,
        }
    }
}

/// Texture offsets and the emissive flag do not make two descriptors different batches.
impl PartialEq for TexDesc {
    fn eq(&self, o: &Self) -> bool {
        self.tid == o.tid
            && self.nm_tid == o.nm_tid
            && self.tscale_x == o.tscale_x
            && self.tscale_y == o.tscale_y
    }
}

impl TexDesc {
    pub fn new(tid: i32, tscale: f32) -> Self {
        Self {
            tid,
            tscale_x: tscale,
            tscale_y: tscale,
            ..Self::default()
        }
    }

    pub fn enabled(&self) -> bool {
        self.tid >= 0
    }

    pub fn scaled(&self, s: f32) -> Self {
        Self {
            tscale_x: self.tscale_x * s,
            tscale_y: self.tscale_y * s,
            ..*self
        }
    }
}

/// One building material: textures, colors and the shape probability ranges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingMaterial {
    pub name: String,
    /// Selection weight; the material index is repeated this many times in the lists.
    pub prob: u32,
    pub no_city: bool,

    pub side_tex: TexDesc,
    pub roof_tex: TexDesc,
    pub wall_tex: TexDesc,
    pub ceil_tex: TexDesc,
    pub floor_tex: TexDesc,
    pub side_color: ColorRange,
    pub roof_color: ColorRange,
    pub wall_color: ColorRange,
    pub ceil_color: ColorRange,
    pub floor_color: ColorRange,

    /// Placement is limited to this distance from the range center when positive.
    pub place_radius: f32,
    pub pos_min: Vec3,
    pub pos_max: Vec3,
    /// Full building size range (x, y, z).
    pub size_min: Vec3,
    pub size_max: Vec3,

    pub split_prob: f32,
    pub cube_prob: f32,
    pub round_prob: f32,
    /// Probability of the alternating-step footprint variant.
    pub asf_prob: f32,
    pub min_fsa: f32,
    pub max_fsa: f32,
    pub min_asf: f32,
    pub max_asf: f32,
    pub min_levels: u32,
    pub max_levels: u32,
    pub min_sides: u32,
    pub max_sides: u32,
    /// Maximum rotation angle in radians; zero keeps buildings axis aligned.
    pub max_rot_angle: f32,
    pub rotate_prob: f32,

    pub house_prob: f32,
    pub house_scale_min: f32,
    pub house_scale_max: f32,
    pub peaked_roof_prob: f32,
    pub detail_prob: f32,
    pub max_ac_units: u32,

    pub wind_xscale: f32,
    pub wind_yscale: f32,
    pub wind_xoff: f32,
    pub wind_yoff: f32,
    /// Floor spacing used when windows are disabled.
    pub default_floor_spacing: f32,

    #[serde(skip)]
    pub window_tx: f32,
    #[serde(skip)]
    pub window_ty: f32,
    #[serde(skip)]
    pub floor_spacing: f32,
}

impl Default for BuildingMaterial {
    fn default() -> Self {
        Self {
            name: "default".into(),
            prob: 1,
            no_city: false,
            side_tex: TexDesc::new(0, 1.0),
            roof_tex: TexDesc::new(1, 1.0),
            wall_tex: TexDesc::new(2, 1.0),
            ceil_tex: TexDesc::new(3, 1.0),
            floor_tex: TexDesc::new(4, 1.0),
            side_color: ColorRange::default(),
            roof_color: ColorRange {
                grayscale_rand: 0.0,
                cmin: Color::GRAY,
                cmax: Color::LT_GRAY,
            },
            wall_color: ColorRange::default(),
            ceil_color: ColorRange::default(),
            floor_color: ColorRange {
                grayscale_rand: 0.0,
                cmin: Color::LT_BROWN,
                cmax: Color::LT_BROWN,
            },
            place_radius: 0.0,
            pos_min: Vec3::new(-200.0, -200.0, 0.0),
            pos_max: Vec3::new(200.0, 200.0, 0.0),
            size_min: Vec3::new(12.0, 12.0, 9.0),
            size_max: Vec3::new(30.0, 30.0, 40.0),
            split_prob: 0.3,
            cube_prob: 0.7,
            round_prob: 0.1,
            asf_prob: 0.1,
            min_fsa: 0.0,
            max_fsa: 0.3,
            min_asf: 0.2,
            max_asf: 0.6,
            min_levels: 1,
            max_levels: 3,
            min_sides: 4,
            max_sides: 10,
            max_rot_angle: 0.0,
            rotate_prob: 0.0,
            house_prob: 0.0,
            house_scale_min: 0.4,
            house_scale_max: 0.6,
            peaked_roof_prob: 0.2,
            detail_prob: 0.5,
            max_ac_units: 4,
            wind_xscale: 1.0 / 3.0,
            wind_yscale: 1.0 / 6.0,
            wind_xoff: 0.0,
            wind_yoff: 0.0,
            default_floor_spacing: 3.0,
            window_tx: 0.0,
            window_ty: 0.0,
            floor_spacing: 3.0,
        }
    }
}

impl BuildingMaterial {
    pub fn get_floor_spacing(&self) -> f32 {
        self.floor_spacing
    }

    /// Horizontal window column pitch along a wall.
    pub fn window_col_spacing(&self) -> f32 {
        if self.window_tx > 0.0 {
            1.0 / (2.0 * self.window_tx)
        } else {
            0.5 * self.floor_spacing
        }
    }

    fn finalize(&mut self, params_tx: f32, params_ty: f32, windows: bool) {
        self.min_levels = self.min_levels.max(1);
        self.max_levels = self.max_levels.max(self.min_levels);
        self.min_sides = self.min_sides.max(3);
        self.max_sides = self.max_sides.max(self.min_sides);
        self.size_max = self.size_max.max(self.size_min);
        self.pos_max = self.pos_max.max(self.pos_min);
        self.house_scale_max = self.house_scale_max.max(self.house_scale_min);

        if windows && self.wind_xscale > 0.0 && self.wind_yscale > 0.0 {
            self.window_tx = self.wind_xscale * params_tx;
            self.window_ty = self.wind_yscale * params_ty;
            self.floor_spacing = 1.0 / (2.0 * self.window_ty);
        } else {
            self.window_tx = 0.0;
            self.window_ty = 0.0;
            self.floor_spacing = self.default_floor_spacing.max(0.1);
        }
    }
}

/// Global generation parameters plus the material catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingParams {
    pub flatten_mesh: bool,
    pub infinite_buildings: bool,
    pub dome_roof: bool,
    pub onion_roof: bool,
    pub gen_interiors: bool,
    /// Snap part heights to a whole number of floors.
    pub exact_mult_floor_height: bool,
    pub num_place: u32,
    pub num_tries: u32,
    pub wall_split_thresh: f32,
    /// Extra gap kept between neighboring buildings.
    pub sec_extra_spacing: f32,
    /// Global dynamic light budget.
    pub max_lights: usize,
    pub tile_size: f32,

    pub window_width: f32,
    pub window_height: f32,
    pub window_xspace: f32,
    pub window_yspace: f32,

    /// The in-progress material; appended by `finalize()` when no materials were declared.
    pub cur_mat: BuildingMaterial,
    pub materials: Vec<BuildingMaterial>,

    #[serde(skip)]
    pub mat_gen_ix: Vec<usize>,
    #[serde(skip)]
    pub mat_gen_ix_city: Vec<usize>,
    #[serde(skip)]
    pub mat_gen_ix_nocity: Vec<usize>,
    #[serde(skip)]
    finalized: bool,
}

impl Default for BuildingParams {
    fn default() -> Self {
        Self {
            flatten_mesh: false,
            infinite_buildings: false,
            dome_roof: false,
            onion_roof: false,
            gen_interiors: true,
            exact_mult_floor_height: true,
            num_place: 100,
            num_tries: DEFAULT_NUM_TRIES,
            wall_split_thresh: DEFAULT_WALL_SPLIT_THRESH,
            sec_extra_spacing: 2.0,
            max_lights: 64,
            tile_size: 200.0,
            window_width: 0.5,
            window_height: 0.5,
            window_xspace: 0.5,
            window_yspace: 0.5,
            cur_mat: BuildingMaterial::default(),
            materials: Vec::new(),
            mat_gen_ix: Vec::new(),
            mat_gen_ix_city: Vec::new(),
            mat_gen_ix_nocity: Vec::new(),
            finalized: false,
        }
    }
}

impl BuildingParams {
    /// Small finalized catalog with an office material and a house material.
    pub fn test_params() -> Self {
        let mut params = Self::default();
        params.cur_mat.name = "office".into();
        params.add_cur_mat();

        params.cur_mat = BuildingMaterial {
            name: "house".into(),
            no_city: true,
            house_prob: 1.0,
            size_min: Vec3::new(14.0, 14.0, 6.0),
            size_max: Vec3::new(22.0, 22.0, 6.0),
            max_levels: 1,
            peaked_roof_prob: 1.0,
            side_color: ColorRange {
                grayscale_rand: 0.2,
                cmin: Color::rgb(0.6, 0.5, 0.4),
                cmax: Color::rgb(0.9, 0.8, 0.7),
            },
            ..BuildingMaterial::default()
        };
        params.add_cur_mat();
        params.finalize();
        params
    }

    pub fn windows_enabled(&self) -> bool {
        self.window_width > 0.0
            && self.window_height > 0.0
            && self.window_xspace > 0.0
            && self.window_yspace > 0.0
    }

    /// Window repeats per texture unit horizontally.
    pub fn get_window_tx(&self) -> f32 {
        1.0 / (self.window_width + self.window_xspace)
    }

    pub fn get_window_ty(&self) -> f32 {
        1.0 / (self.window_height + self.window_yspace)
    }

    /// Fraction of a window tile that is glass, horizontally and vertically.
    pub fn window_fractions(&self) -> (f32, f32) {
        if !self.windows_enabled() {
            return (0.0, 0.0);
        }
        (
            self.window_width * self.get_window_tx(),
            self.window_height * self.get_window_ty(),
        )
    }

    pub fn add_cur_mat(&mut self) {
        self.materials.push(self.cur_mat.clone());
        self.finalized = false;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Derive per-material values and the weighted index lists. Guarantees at least one material.
    pub fn finalize(&mut self) {
        if self.materials.is_empty() {
            self.add_cur_mat();
        }
        self.num_tries = self.num_tries.max(1);
        let windows = self.windows_enabled();
        let (tx, ty) = if windows {
            (self.get_window_tx(), self.get_window_ty())
        } else {
            (0.0, 0.0)
        };
        self.mat_gen_ix.clear();
        self.mat_gen_ix_city.clear();
        self.mat_gen_ix_nocity.clear();

        for (ix, mat) in self.materials.iter_mut().enumerate() {
            mat.finalize(tx, ty, windows);
            for _ in 0..mat.prob {
                self.mat_gen_ix.push(ix);
                if mat.no_city {
                    self.mat_gen_ix_nocity.push(ix);
                } else {
                    self.mat_gen_ix_city.push(ix);
                }
            }
        }
        self.finalized = true;
        log::debug!(
            "building params finalized: {} materials, {} weighted entries",
            self.materials.len(),
            self.mat_gen_ix.len()
        );
    }

    pub fn get_material(&self, mat_ix: usize) -> &BuildingMaterial {
        self.materials.get(mat_ix).unwrap_or(&self.cur_mat)
    }

    pub fn get_mat_list(&self, city_only: bool, non_city_only: bool) -> &[usize] {
        if city_only {
            &self.mat_gen_ix_city
        } else if non_city_only {
            &self.mat_gen_ix_nocity
        } else {
            &self.mat_gen_ix
        }
    }

    /// Uniform pick from the filtered weighted list; `None` when the filter matches nothing.
    pub fn choose_rand_mat(
        &self,
        rng: &mut GenRng,
        city_only: bool,
        non_city_only: bool,
    ) -> Option<usize> {
        let list = self.get_mat_list(city_only, non_city_only);
        if list.is_empty() {
            return None;
        }
        Some(list[rand_index(rng, list.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::rng_for_seeds;

    #[test]
    fn finalize_never_leaves_catalog_empty() {
        let mut params = BuildingParams::default();
        assert!(params.materials.is_empty());
        params.finalize();
        assert_eq!(params.materials.len(), 1);
        assert_eq!(params.mat_gen_ix, vec![0]);
        assert!(params.is_finalized());
    }

    #[test]
    fn weighted_lists_respect_city_flag() {
        let mut params = BuildingParams::default();
        params.cur_mat.prob = 3;
        params.add_cur_mat();
        params.cur_mat.prob = 1;
        params.cur_mat.no_city = true;
        params.add_cur_mat();
        params.finalize();
        assert_eq!(params.mat_gen_ix, vec![0, 0, 0, 1]);
        assert_eq!(params.mat_gen_ix_city, vec![0, 0, 0]);
        assert_eq!(params.mat_gen_ix_nocity, vec![1]);
    }

    #[test]
    fn choose_rand_mat_empty_filter() {
        let mut params = BuildingParams::default();
        params.finalize();
        let mut rng = rng_for_seeds(1, 2);
        assert_eq!(params.choose_rand_mat(&mut rng, false, true), None);
        assert_eq!(params.choose_rand_mat(&mut rng, true, false), Some(0));
    }

    #[test]
    fn floor_spacing_from_windows() {
        let mut params = BuildingParams::default();
        params.finalize();
        let mat = params.get_material(0);
        // window tile 1.0, yscale 1/6 -> ty = 1/6 -> spacing 3.0
        assert!((mat.floor_spacing - 3.0).abs() < 1e-4);
        assert!((mat.window_col_spacing() - 1.5).abs() < 1e-4);
    }

    #[test]
    fn floor_spacing_without_windows() {
        let mut params = BuildingParams {
            window_width: 0.0,
            ..BuildingParams::default()
        };
        params.cur_mat.default_floor_spacing = 2.5;
        params.finalize();
        assert!(!params.windows_enabled());
        assert_eq!(params.window_fractions(), (0.0, 0.0));
        assert!((params.get_material(0).floor_spacing - 2.5).abs() < 1e-6);
    }

    #[test]
    fn tex_equality_ignores_offsets() {
        let a = TexDesc::new(5, 2.0);
        let b = TexDesc { txoff: 0.3, ..a };
        assert_eq!(a, b);
        assert_ne!(a, a.scaled(2.0));
        assert!(!TexDesc::default().enabled());
    }
}
