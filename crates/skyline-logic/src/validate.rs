//! Structural validation for generated buildings.
//!
//! Pure functions that take a finished building and return validation errors. The
//! generator should never produce an `Error`; harnesses and tests run these to prove it.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::building::{Building, TQuadKind};
use crate::constants::{proportions, MAX_LIT_FLOORS, MAX_ROOMS_PER_FLOOR, TOLERANCE};
use crate::geom::Cube;
use crate::interior::Interior;

/// A structural validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub category: &'static str,
    pub severity: Severity,
    pub message: String,
}

/// Error severity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Severity {
    Error,
    Warning,
}

fn error(category: &'static str, message: String) -> ValidationError {
    ValidationError {
        category,
        severity: Severity::Error,
        message,
    }
}

fn warning(category: &'static str, message: String) -> ValidationError {
    ValidationError {
        category,
        severity: Severity::Warning,
        message,
    }
}

// ── A. Box normalization ────────────────────────────────────────────────

fn check_cubes<'a>(
    what: &str,
    cubes: impl Iterator<Item = &'a Cube>,
    errors: &mut Vec<ValidationError>,
) {
    for (i, c) in cubes.enumerate() {
        if !c.is_strictly_normalized() {
            errors.push(error(
                "normalization",
                format!("{} #{} is degenerate: {:?} .. {:?}", what, i, c.lo, c.hi),
            ));
        }
    }
}

/// Every part, door, room, stairwell, landing, elevator and room object has positive extent.
pub fn check_normalization(b: &Building) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if !b.bcube.is_strictly_normalized() {
        errors.push(error("normalization", format!("Building bcube is degenerate: {:?}", b.bcube)));
    }
    check_cubes("Part", b.parts.iter(), &mut errors);
    check_cubes("Roof object", b.details.iter().map(|d| &d.cube), &mut errors);
    let door_cubes: Vec<Cube> = (0..b.doors.len()).filter_map(|i| b.door_cube(i)).collect();
    check_cubes("Exterior door", door_cubes.iter(), &mut errors);
    let Some(int) = b.interior.as_deref() else {
        return errors;
    };
    check_cubes("Room", int.rooms.iter().map(|r| &r.cube), &mut errors);
    check_cubes("Interior door", int.doors.iter().map(|d| &d.cube), &mut errors);
    check_cubes("Stairwell", int.stairwells.iter().map(|s| &s.cube), &mut errors);
    check_cubes("Landing", int.landings.iter().map(|l| &l.cube), &mut errors);
    check_cubes("Elevator", int.elevators.iter().map(|e| &e.cube), &mut errors);
    check_cubes("Wall", int.all_walls(), &mut errors);
    if let Some(rg) = int.room_geom.as_deref() {
        check_cubes("Room object", rg.objs.iter().map(|o| &o.cube), &mut errors);
    }
    errors
}

// ── B. Parts and rooms (pairwise) ───────────────────────────────────────

fn overlap_volume(a: &Cube, b: &Cube) -> bool {
    a.intersection(b)
        .is_some_and(|c| c.dx() > TOLERANCE && c.dy() > TOLERANCE && c.dz() > TOLERANCE)
}

/// Primary parts may touch but not overlap.
pub fn check_part_overlaps(b: &Building) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let parts = b.real_parts();
    for i in 0..parts.len() {
        for j in (i + 1)..parts.len() {
            if overlap_volume(&parts[i], &parts[j]) {
                errors.push(error("part_overlap", format!("Parts #{} and #{} overlap", i, j)));
            }
        }
    }
    errors
}

/// No two rooms on the same floor share an id, and no floor exceeds the id range.
pub fn check_room_ids(int: &Interior) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = FxHashSet::default();
    for floor in 0..int.num_floors {
        seen.clear();
        let mut count = 0;
        for ri in int.rooms_on_floor(floor) {
            count += 1;
            if !seen.insert(int.rooms[ri].room_id) {
                errors.push(error(
                    "room_ids",
                    format!("Room id {} repeated on floor {}", int.rooms[ri].room_id, floor),
                ));
            }
        }
        if count > MAX_ROOMS_PER_FLOOR {
            errors.push(error("room_ids", format!("Floor {} has {} rooms", floor, count)));
        }
    }
    errors
}

/// Rooms never share volume.
pub fn check_room_overlaps(int: &Interior) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for i in 0..int.rooms.len() {
        for j in (i + 1)..int.rooms.len() {
            if overlap_volume(&int.rooms[i].cube, &int.rooms[j].cube) {
                errors.push(error("room_overlap", format!("Rooms #{} and #{} overlap", i, j)));
            }
        }
    }
    errors
}

// ── C. Doors, stairs and elevators ──────────────────────────────────────

/// Stairwells and elevators stay out of every interior door's swing region.
pub fn check_door_clearance(int: &Interior) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let dist = 0.5 * int.floor_spacing;
    for (i, s) in int.stairwells.iter().enumerate() {
        if int.is_cube_close_to_doorway(&s.cube, dist) {
            errors.push(error("door_clearance", format!("Stairwell #{} blocks a doorway", i)));
        }
    }
    for (i, e) in int.elevators.iter().enumerate() {
        if int.is_cube_close_to_doorway(&e.cube, dist) {
            errors.push(error("door_clearance", format!("Elevator #{} blocks a doorway", i)));
        }
    }
    errors
}

/// At least one non-garage exterior door starts on the ground floor.
pub fn check_exterior_doors(b: &Building) -> Vec<ValidationError> {
    if b.parts.is_empty() {
        return Vec::new();
    }
    let ground = b.ground_z();
    let has_entry = b.doors.iter().any(|d| {
        d.kind != TQuadKind::GarageDoor && d.bcube().lo.z < ground + b.floor_spacing
    });
    if has_entry {
        Vec::new()
    } else {
        vec![error(
            "exterior_doors",
            format!("Building ({}, {}) has no ground-floor entrance", b.seed1, b.seed2),
        )]
    }
}

// ── D. Lights ───────────────────────────────────────────────────────────

/// A floor's lit bit is set iff some light on that floor is on.
pub fn check_lit_mask(int: &Interior) -> Vec<ValidationError> {
    let Some(rg) = int.room_geom.as_deref() else {
        return Vec::new();
    };
    let mut errors = Vec::new();
    for floor in 0..int.num_floors.min(MAX_LIT_FLOORS) {
        let any_lit = rg
            .light_ixs()
            .any(|i| rg.objs[i].is_lit() && int.light_floor(&rg.objs[i]) == floor);
        if any_lit != int.is_floor_lit(floor) {
            errors.push(error(
                "lit_mask",
                format!("Floor {} lit bit is {} but lights say {}", floor, int.is_floor_lit(floor), any_lit),
            ));
        }
    }
    errors
}

// ── E. Connectivity (graph-level) ───────────────────────────────────────

/// BFS over each floor's rooms through interior doors, starting from rooms reachable from
/// outside or from another floor. Unreached rooms are reported as warnings.
pub fn check_room_reachability(b: &Building, int: &Interior) -> Vec<ValidationError> {
    let mut warnings = Vec::new();
    let reach = proportions::WALL_THICK * int.floor_spacing * 4.0;
    let ext_doors: Vec<Cube> = (0..b.doors.len())
        .filter_map(|i| b.door_cube(i))
        .map(|c| c.expand_by_xy(reach))
        .collect();

    for floor in 0..int.num_floors {
        let rooms: Vec<usize> = int.rooms_on_floor(floor).collect();
        if rooms.len() < 2 {
            continue;
        }
        let fz = int.floor_base_z(floor);
        let band = Cube::from_bounds(
            f32::MIN / 4.0,
            f32::MAX / 4.0,
            f32::MIN / 4.0,
            f32::MAX / 4.0,
            fz,
            fz + int.floor_spacing,
        );
        let doors: Vec<Cube> = int
            .doors
            .iter()
            .filter(|d| d.cube.intersects(&band))
            .map(|d| d.cube.expand_by_xy(reach))
            .collect();

        let mut visited = vec![false; rooms.len()];
        let mut queue = VecDeque::new();
        for (k, &ri) in rooms.iter().enumerate() {
            let r = &int.rooms[ri];
            let entry = if floor == 0 {
                ext_doors.iter().any(|d| d.intersects(&r.cube))
            } else {
                r.has_stairs || r.has_elevator
            };
            if entry {
                visited[k] = true;
                queue.push_back(k);
            }
        }
        // A floor with no entry point is reported once below; seed the BFS anyway.
        if queue.is_empty() {
            visited[0] = true;
            queue.push_back(0);
        }
        while let Some(k) = queue.pop_front() {
            let a = &int.rooms[rooms[k]].cube;
            for (m, &rj) in rooms.iter().enumerate() {
                if visited[m] {
                    continue;
                }
                let c = &int.rooms[rj].cube;
                if doors.iter().any(|d| d.intersects(a) && d.intersects(c)) {
                    visited[m] = true;
                    queue.push_back(m);
                }
            }
        }
        let unreached = visited.iter().filter(|v| !**v).count();
        if unreached > 0 {
            warnings.push(warning(
                "connectivity",
                format!("{} of {} rooms on floor {} unreachable", unreached, rooms.len(), floor),
            ));
        }
    }
    warnings
}

// ── Master validation ───────────────────────────────────────────────────

/// Run every check against one building.
pub fn validate_building(b: &Building) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    errors.extend(check_normalization(b));
    errors.extend(check_part_overlaps(b));
    errors.extend(check_exterior_doors(b));
    if let Some(int) = b.interior.as_deref() {
        errors.extend(check_room_ids(int));
        errors.extend(check_room_overlaps(int));
        errors.extend(check_door_clearance(int));
        errors.extend(check_lit_mask(int));
        errors.extend(check_room_reachability(b, int));
    }
    errors
}

pub fn count_errors(errors: &[ValidationError]) -> usize {
    errors.iter().filter(|e| e.severity == Severity::Error).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interior::{Door, Room, Stairwell};
    use crate::materials::BuildingParams;
    use crate::shape::gen_geometry;
    use glam::Vec3;

    fn shell() -> Building {
        let mut b = Building::new(0, 4, 2, Vec3::ZERO);
        b.floor_spacing = 3.0;
        b.parts.push(Cube::from_bounds(-5.0, 5.0, -5.0, 5.0, 0.0, 6.0));
        b.real_num_parts = 1;
        b.calc_bcube_from_parts();
        b
    }

    #[test]
    fn generated_buildings_have_no_errors() {
        let params = BuildingParams::test_params();
        for seed in 0..30u64 {
            for mat in 0..params.materials.len() {
                let mut b = gen_geometry(&params, mat, Vec3::ZERO, seed, seed * 7 + 1);
                b.ensure_room_geom(params.get_material(mat), &[]);
                let errs = validate_building(&b);
                let hard: Vec<_> = errs.iter().filter(|e| e.severity == Severity::Error).collect();
                assert!(hard.is_empty(), "seed {} mat {}: {:?}", seed, mat, hard);
            }
        }
    }

    #[test]
    fn missing_entrance_is_an_error() {
        let b = shell();
        let errs = check_exterior_doors(&b);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].category, "exterior_doors");
    }

    #[test]
    fn overlapping_parts_detected() {
        let mut b = shell();
        b.parts.push(Cube::from_bounds(4.0, 8.0, -1.0, 1.0, 0.0, 3.0));
        b.real_num_parts = 2;
        assert_eq!(check_part_overlaps(&b).len(), 1);
        b.parts[1] = Cube::from_bounds(5.0, 8.0, -1.0, 1.0, 0.0, 3.0);
        assert!(check_part_overlaps(&b).is_empty());
    }

    #[test]
    fn duplicate_room_ids_detected() {
        let mut int = Interior::new(0.0, 3.0, 0.3);
        int.num_floors = 2;
        int.rooms.push(Room::new(Cube::from_bounds(-5.0, 0.0, -5.0, 5.0, 0.0, 6.0), 0, 0));
        int.rooms.push(Room::new(Cube::from_bounds(0.0, 5.0, -5.0, 5.0, 0.0, 3.0), 0, 1));
        assert!(check_room_ids(&int).is_empty());
        int.rooms[1].room_id = 0;
        let errs = check_room_ids(&int);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("floor 0"));
        assert!(check_room_overlaps(&int).is_empty());
    }

    #[test]
    fn stairs_in_door_swing_detected() {
        let mut int = Interior::new(0.0, 3.0, 0.3);
        int.doors.push(Door {
            cube: Cube::from_bounds(-0.05, 0.05, -0.75, 0.75, 0.3, 2.7),
            dim: 0,
            open_dir: true,
            open: false,
        });
        int.stairwells.push(Stairwell {
            cube: Cube::from_bounds(0.5, 2.0, -1.0, 1.0, 0.3, 5.7),
            ..Default::default()
        });
        assert_eq!(check_door_clearance(&int).len(), 1);
        int.stairwells[0].cube = Cube::from_bounds(3.0, 4.5, -1.0, 1.0, 0.3, 5.7);
        assert!(check_door_clearance(&int).is_empty());
    }

    #[test]
    fn unreachable_room_is_a_warning() {
        let mut b = shell();
        let mut int = Interior::new(0.0, 3.0, 0.3);
        int.num_floors = 1;
        int.rooms.push(Room::new(Cube::from_bounds(-5.0, 0.0, -5.0, 5.0, 0.0, 3.0), 0, 0));
        int.rooms.push(Room::new(Cube::from_bounds(0.0, 5.0, -5.0, 5.0, 0.0, 3.0), 0, 1));
        b.interior = Some(Box::new(int));
        let int = b.interior.as_deref().unwrap();
        let w = check_room_reachability(&b, int);
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].severity, Severity::Warning);
    }
}
