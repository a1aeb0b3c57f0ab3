//! Save/Load functionality for placed building sets
//!
//! Buildings are fully determined by their material, seeds and position, so a save
//! stores only those plus the lights the user switched away from their generated
//! state. Loading regenerates every building and re-applies the light changes.

use std::io::{Read, Write};
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::materials::BuildingParams;
use crate::placement::BuildingSet;
use crate::shape::gen_geometry;

/// Version number for save file format (increment when format changes)
const SAVE_VERSION: u32 = 2;

/// Everything needed to regenerate one building
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingRecord {
    pub mat_ix: usize,
    pub seed1: u64,
    pub seed2: u64,
    /// Placement position as passed to generation (center, base z)
    pub pos: [f32; 3],
    /// Light ordinals (position among the building's room lights) and their saved lit
    /// state, only for lights that differ from what generation produces
    pub light_overrides: Vec<(u32, bool)>,
}

/// Serializable snapshot of a building set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
    /// Save format version
    pub version: u32,
    pub records: Vec<BuildingRecord>,
}

/// Errors that can occur during save/load
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("Save version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("Save references material {0} which is not in the catalog")]
    UnknownMaterial(usize),
}

impl BuildingSet {
    /// Capture the regeneration records for every building.
    ///
    /// Light overrides are found by regenerating room contents on a fresh copy of each
    /// building and comparing lit states, so only buildings with room geometry pay for it.
    /// Light placement does not depend on pedestrians, so the n-th light of the fresh copy
    /// is the n-th light of the live building.
    pub fn to_save_data(&self, params: &BuildingParams) -> SaveData {
        let records = self
            .buildings
            .iter()
            .map(|b| {
                let mut light_overrides = Vec::new();
                let objs = b.room_objects();
                if !objs.is_empty() {
                    let mut fresh = gen_geometry(params, b.mat_ix, b.pos, b.seed1, b.seed2);
                    fresh.ensure_room_geom(params.get_material(b.mat_ix), &[]);
                    let mut base = fresh.room_objects().iter().filter(|o| o.is_light());
                    for (ordinal, obj) in objs.iter().filter(|o| o.is_light()).enumerate() {
                        if base.next().map_or(true, |o| o.is_lit() != obj.is_lit()) {
                            light_overrides.push((ordinal as u32, obj.is_lit()));
                        }
                    }
                }
                BuildingRecord {
                    mat_ix: b.mat_ix,
                    seed1: b.seed1,
                    seed2: b.seed2,
                    pos: b.pos.to_array(),
                    light_overrides,
                }
            })
            .collect();
        SaveData {
            version: SAVE_VERSION,
            records,
        }
    }

    /// Regenerate a set from saved records.
    pub fn restore(params: &BuildingParams, data: &SaveData) -> Result<Self, PersistError> {
        if data.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: data.version,
            });
        }
        let mut set = BuildingSet::new();
        for rec in &data.records {
            if rec.mat_ix >= params.materials.len() {
                return Err(PersistError::UnknownMaterial(rec.mat_ix));
            }
            let mut b = gen_geometry(params, rec.mat_ix, Vec3::from_array(rec.pos), rec.seed1, rec.seed2);
            if !rec.light_overrides.is_empty() {
                b.ensure_room_geom(params.get_material(rec.mat_ix), &[]);
                let light_ixs: Vec<usize> = b
                    .room_objects()
                    .iter()
                    .enumerate()
                    .filter(|(_, o)| o.is_light())
                    .map(|(i, _)| i)
                    .collect();
                for &(ordinal, lit) in &rec.light_overrides {
                    let applied = light_ixs
                        .get(ordinal as usize)
                        .and_then(|&ix| b.set_room_light(ix, lit));
                    if applied.is_none() {
                        log::warn!(
                            "building ({}, {}): saved light {} does not exist",
                            rec.seed1,
                            rec.seed2,
                            ordinal
                        );
                    }
                }
            }
            set.add(b);
        }
        log::info!("restored {} buildings", set.len());
        Ok(set)
    }
}

/// Save a building set to a writer
pub fn save_buildings<W: Write>(writer: W, set: &BuildingSet, params: &BuildingParams) -> Result<(), PersistError> {
    let data = set.to_save_data(params);
    bincode::serialize_into(writer, &data)?;
    Ok(())
}

/// Load a building set from a reader
pub fn load_buildings<R: Read>(reader: R, params: &BuildingParams) -> Result<BuildingSet, PersistError> {
    let data: SaveData = bincode::deserialize_from(reader)?;
    BuildingSet::restore(params, &data)
}

pub fn save_buildings_to_file(
    path: impl AsRef<Path>,
    set: &BuildingSet,
    params: &BuildingParams,
) -> Result<(), PersistError> {
    let file = std::fs::File::create(path)?;
    save_buildings(std::io::BufWriter::new(file), set, params)
}

pub fn load_buildings_from_file(path: impl AsRef<Path>, params: &BuildingParams) -> Result<BuildingSet, PersistError> {
    let file = std::fs::File::open(path)?;
    load_buildings(std::io::BufReader::new(file), params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Cube;
    use crate::placement::{place_buildings, PlaceMode};

    fn small_set(params: &BuildingParams) -> BuildingSet {
        let mut p = params.clone();
        p.num_place = 5;
        place_buildings(&p, 17, PlaceMode::Any)
    }

    #[test]
    fn test_save_load_roundtrip() {
        let params = BuildingParams::test_params();
        let set = small_set(&params);

        let mut buf = Vec::new();
        save_buildings(&mut buf, &set, &params).unwrap();
        let loaded = load_buildings(buf.as_slice(), &params).unwrap();

        assert_eq!(loaded.len(), set.len());
        for (a, b) in set.buildings.iter().zip(&loaded.buildings) {
            assert_eq!(a.bcube, b.bcube);
            assert_eq!(a.parts, b.parts);
            assert_eq!(a.doors.len(), b.doors.len());
        }
    }

    #[test]
    fn test_version_mismatch() {
        let params = BuildingParams::test_params();
        let data = SaveData {
            version: SAVE_VERSION + 1,
            records: Vec::new(),
        };
        let err = BuildingSet::restore(&params, &data).unwrap_err();
        assert!(matches!(err, PersistError::VersionMismatch { found, .. } if found == SAVE_VERSION + 1));
    }

    #[test]
    fn test_unknown_material_rejected() {
        let params = BuildingParams::test_params();
        let data = SaveData {
            version: SAVE_VERSION,
            records: vec![BuildingRecord {
                mat_ix: 99,
                seed1: 1,
                seed2: 2,
                pos: [0.0; 3],
                light_overrides: Vec::new(),
            }],
        };
        assert!(matches!(
            BuildingSet::restore(&params, &data),
            Err(PersistError::UnknownMaterial(99))
        ));
    }

    #[test]
    fn test_light_toggles_survive_reload() {
        let params = BuildingParams::test_params();
        let mut set = small_set(&params);
        let Some(bi) = set.buildings.iter().position(|b| b.has_interior()) else {
            return;
        };
        let b = &mut set.buildings[bi];
        b.ensure_room_geom(params.get_material(b.mat_ix), &[]);
        let Some(light) = b.room_objects().iter().position(|o| o.is_light()) else {
            return;
        };
        let was_lit = b.room_objects()[light].is_lit();
        assert_eq!(b.set_room_light(light, !was_lit), Some(true));

        let data = set.to_save_data(&params);
        assert_eq!(data.records[bi].light_overrides, vec![(0, !was_lit)]);
        let loaded = BuildingSet::restore(&params, &data).unwrap();
        let lb = &loaded.buildings[bi];
        assert_eq!(lb.room_objects()[light].is_lit(), !was_lit);
        let int = lb.interior.as_deref().unwrap();
        assert_eq!(int.lit_by_floor, set.buildings[bi].interior.as_deref().unwrap().lit_by_floor);
    }

    #[test]
    fn test_light_state_survives_reload_with_pedestrians() {
        let params = BuildingParams::test_params();
        let mut set = small_set(&params);
        let mut checked = 0;
        for b in set.buildings.iter_mut().filter(|b| b.has_interior()) {
            let peds: Vec<Cube> = b
                .interior
                .as_deref()
                .map(|int| {
                    int.rooms
                        .iter()
                        .map(|r| {
                            let c = r.cube.center();
                            Cube::from_center_half(Vec3::new(c.x, c.y, r.cube.lo.z + 1.0), Vec3::new(0.3, 0.3, 1.0))
                        })
                        .collect()
                })
                .unwrap_or_default();
            b.ensure_room_geom(params.get_material(b.mat_ix), &peds);
            let lights: Vec<usize> = b
                .room_objects()
                .iter()
                .enumerate()
                .filter(|(_, o)| o.is_light())
                .map(|(i, _)| i)
                .collect();
            if let Some(&ix) = lights.get(lights.len() / 2) {
                let lit = b.room_objects()[ix].is_lit();
                b.set_room_light(ix, !lit);
                checked += 1;
            }
        }
        if checked == 0 {
            return;
        }

        let loaded = BuildingSet::restore(&params, &set.to_save_data(&params)).unwrap();
        let light_states = |b: &crate::building::Building| -> Vec<(Cube, bool)> {
            b.room_objects().iter().filter(|o| o.is_light()).map(|o| (o.cube, o.is_lit())).collect()
        };
        for (a, b) in set.buildings.iter().zip(&loaded.buildings) {
            if a.room_objects().is_empty() {
                continue;
            }
            assert_eq!(light_states(a), light_states(b));
            let lit = |b: &crate::building::Building| b.interior.as_deref().map(|i| i.lit_by_floor);
            assert_eq!(lit(a), lit(b));
        }
    }
}
