//! Loading building parameters from JSON and checking them.
//!
//! Missing fields fall back to `BuildingParams::default()`. Loading always finalizes
//! the catalog. `validate_params` reports every problem at once instead of stopping
//! at the first.

use std::path::Path;

use thiserror::Error;

use crate::materials::BuildingParams;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read building config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid building config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("building config rejected: {0:?}")]
    Invalid(Vec<ParamIssue>),
}

/// A semantic problem in a parameter set.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamIssue {
    /// Room subdivision threshold must exceed 1.0 or every region would split forever.
    WallSplitThreshTooSmall(f32),
    /// `num_tries` of zero means no building can ever be placed.
    ZeroTries,
    /// Material's size range has a non-positive extent.
    DegenerateSize(String),
    /// Probability outside [0, 1].
    ProbabilityOutOfRange(String, &'static str, f32),
    /// Level or side range is inverted.
    InvertedRange(String, &'static str),
    /// Window settings are partially specified (some positive, some not).
    PartialWindows,
    /// Material's floor spacing is larger than its tallest possible building.
    FloorSpacingTooLarge(String, f32),
}

pub fn load_params_from_str(json: &str) -> Result<BuildingParams, ConfigError> {
    let mut params: BuildingParams = serde_json::from_str(json)?;
    params.finalize();
    let issues = validate_params(&params);
    if !issues.is_empty() {
        return Err(ConfigError::Invalid(issues));
    }
    log::info!(
        "loaded building config: {} materials, num_place={}, num_tries={}",
        params.materials.len(),
        params.num_place,
        params.num_tries
    );
    Ok(params)
}

pub fn load_params_from_file(path: impl AsRef<Path>) -> Result<BuildingParams, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_params_from_str(&text)
}

pub fn validate_params(params: &BuildingParams) -> Vec<ParamIssue> {
    let mut issues = Vec::new();

    if params.wall_split_thresh <= 1.0 {
        issues.push(ParamIssue::WallSplitThreshTooSmall(params.wall_split_thresh));
    }
    if params.num_tries == 0 {
        issues.push(ParamIssue::ZeroTries);
    }
    let win = [
        params.window_width,
        params.window_height,
        params.window_xspace,
        params.window_yspace,
    ];
    let positive = win.iter().filter(|v| **v > 0.0).count();
    if positive != 0 && positive != win.len() {
        issues.push(ParamIssue::PartialWindows);
    }

    for mat in &params.materials {
        if !mat.size_min.cmpgt(glam::Vec3::ZERO).all() {
            issues.push(ParamIssue::DegenerateSize(mat.name.clone()));
        }
        let probs = [
            ("split_prob", mat.split_prob),
            ("cube_prob", mat.cube_prob),
            ("round_prob", mat.round_prob),
            ("asf_prob", mat.asf_prob),
            ("house_prob", mat.house_prob),
            ("peaked_roof_prob", mat.peaked_roof_prob),
            ("detail_prob", mat.detail_prob),
            ("rotate_prob", mat.rotate_prob),
        ];
        for (field, p) in probs {
            if !(0.0..=1.0).contains(&p) {
                issues.push(ParamIssue::ProbabilityOutOfRange(mat.name.clone(), field, p));
            }
        }
        if mat.max_levels < mat.min_levels {
            issues.push(ParamIssue::InvertedRange(mat.name.clone(), "levels"));
        }
        if mat.max_sides < mat.min_sides {
            issues.push(ParamIssue::InvertedRange(mat.name.clone(), "sides"));
        }
        if params.is_finalized() && mat.floor_spacing > mat.size_max.z {
            issues.push(ParamIssue::FloorSpacingTooLarge(
                mat.name.clone(),
                mat.floor_spacing,
            ));
        }
    }
    issues
}
