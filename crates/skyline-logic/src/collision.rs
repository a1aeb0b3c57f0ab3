//! Sphere, segment and point queries against one building.
//!
//! All queries are read-only. Inputs are world positions; `xlate` is the offset of the
//! building's tile, so the stored geometry never has to be moved. Work happens in the
//! building's local (unrotated) frame.

use glam::Vec3;

use crate::building::Building;
use crate::constants::TOLERANCE;
use crate::geom::{closest_pt_on_segment_xy, point_in_polygon_xy, polygon_area_xy, Cube};
use crate::interior::Interior;

/// A moving sphere to resolve against a building.
#[derive(Debug, Clone, Copy)]
pub struct SphereQuery<'a> {
    pub pos: Vec3,
    /// Position on the previous step; used to stop tunneling through thin walls.
    pub p_last: Vec3,
    pub radius: f32,
    /// Resolve in xy only, for agents walking on a floor.
    pub xy_only: bool,
    /// Obstacles inside any of these boxes never collide (the caller's own bounds).
    pub exclude: &'a [Cube],
    /// Extra dynamic obstacles (other agents), local frame.
    pub others: &'a [Cube],
    pub xlate: Vec3,
    /// Collide with the interior instead of the exterior shell.
    pub check_interior: bool,
}

impl<'a> SphereQuery<'a> {
    pub fn new(pos: Vec3, radius: f32) -> Self {
        Self {
            pos,
            p_last: pos,
            radius,
            xy_only: false,
            exclude: &[],
            others: &[],
            xlate: Vec3::ZERO,
            check_interior: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineHitKind {
    Side,
    Roof,
    Detail,
    Interior,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineHit {
    /// Fraction along the query segment.
    pub t: f32,
    pub kind: LineHitKind,
}

// ── Primitive tests ────────────────────────────────────────────────────

/// Push `p` out of `c` by at least `radius`. Returns (penetration depth, outward normal).
fn push_out_of_cube(p: &mut Vec3, c: &Cube, radius: f32, xy_only: bool) -> Option<(f32, Vec3)> {
    if xy_only && (p.z < c.lo.z || p.z > c.hi.z) {
        return None;
    }
    let q = if xy_only {
        Vec3::new(p.x.clamp(c.lo.x, c.hi.x), p.y.clamp(c.lo.y, c.hi.y), p.z)
    } else {
        c.closest_pt(*p)
    };
    let d = *p - q;
    let dist = d.length();
    if dist > 0.0 {
        if dist >= radius - TOLERANCE {
            return None;
        }
        let n = d / dist;
        *p = q + n * radius;
        return Some((radius - dist, n));
    }
    // Center inside the box: leave through the nearest face.
    let dims: &[usize] = if xy_only { &[0, 1] } else { &[0, 1, 2] };
    let mut best = (f32::MAX, 0usize, false);
    for &dim in dims {
        for dir in [false, true] {
            let pen = if dir { c.hi[dim] - p[dim] } else { p[dim] - c.lo[dim] };
            if pen < best.0 {
                best = (pen, dim, dir);
            }
        }
    }
    let (pen, dim, dir) = best;
    let mut n = Vec3::ZERO;
    n[dim] = if dir { 1.0 } else { -1.0 };
    p[dim] = c.d(dim, dir) + n[dim] * radius;
    Some((pen + radius, n))
}

/// Push `p` out of a vertical prism with footprint `pts` spanning [z1, z2].
fn push_out_of_prism(p: &mut Vec3, pts: &[Vec3], z1: f32, z2: f32, radius: f32) -> Option<(f32, Vec3)> {
    if p.z < z1 || p.z > z2 || pts.len() < 3 {
        return None;
    }
    let inside = point_in_polygon_xy(*p, pts);
    let mut best: Option<(f32, Vec3)> = None;
    for i in 0..pts.len() {
        let q = closest_pt_on_segment_xy(*p, pts[i], pts[(i + 1) % pts.len()]);
        let d = Vec3::new(p.x - q.x, p.y - q.y, 0.0).length();
        if best.map_or(true, |(bd, _)| d < bd) {
            best = Some((d, q));
        }
    }
    let (dist, q) = best?;
    if !inside && dist >= radius - TOLERANCE {
        return None;
    }
    let to_q = Vec3::new(q.x - p.x, q.y - p.y, 0.0);
    let n = if dist < 1.0e-6 {
        // On the boundary: push away from the polygon center.
        let c = pts.iter().copied().sum::<Vec3>() / pts.len() as f32;
        Vec3::new(p.x - c.x, p.y - c.y, 0.0).normalize_or_zero()
    } else if inside {
        to_q / dist
    } else {
        -to_q / dist
    };
    p.x = q.x + n.x * radius;
    p.y = q.y + n.y * radius;
    let depth = if inside { dist + radius } else { radius - dist };
    Some((depth, n))
}

/// Parametric [t_enter, t_exit] of segment a-b inside a convex vertical prism.
fn line_prism_intersection(a: Vec3, b: Vec3, pts: &[Vec3], z1: f32, z2: f32) -> Option<(f32, f32)> {
    if pts.len() < 3 {
        return None;
    }
    let d = b - a;
    let (mut t0, mut t1) = (0.0f32, 1.0f32);
    if d.z.abs() < 1.0e-12 {
        if a.z < z1 || a.z > z2 {
            return None;
        }
    } else {
        let (ta, tb) = ((z1 - a.z) / d.z, (z2 - a.z) / d.z);
        t0 = t0.max(ta.min(tb));
        t1 = t1.min(ta.max(tb));
        if t0 > t1 {
            return None;
        }
    }
    let ccw = polygon_area_xy(pts) > 0.0;
    for i in 0..pts.len() {
        let (p0, p1) = (pts[i], pts[(i + 1) % pts.len()]);
        let e = p1 - p0;
        // Outward edge normal.
        let (nx, ny) = if ccw { (e.y, -e.x) } else { (-e.y, e.x) };
        let num = nx * (a.x - p0.x) + ny * (a.y - p0.y);
        let den = nx * d.x + ny * d.y;
        if den.abs() < 1.0e-12 {
            if num > 0.0 {
                return None;
            }
            continue;
        }
        let t = -num / den;
        if den < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((t0, t1))
}

/// Shell crossing of a solid span: the entry if the segment starts outside, else the exit.
fn shell_crossing(span: Option<(f32, f32)>) -> Option<f32> {
    let (t0, t1) = span?;
    if t0 > 0.0 {
        Some(t0)
    } else if t1 < 1.0 {
        Some(t1)
    } else {
        None
    }
}

fn is_excluded(c: &Cube, exclude: &[Cube]) -> bool {
    exclude.iter().any(|e| e.intersects(c))
}

// ── Queries ────────────────────────────────────────────────────────────

impl Building {
    /// Resolve a sphere against this building.
    ///
    /// Returns the corrected world position and the outward normal of the deepest
    /// contact. A sphere that touches nothing comes back bit-identical.
    pub fn check_sphere_coll(&self, q: &SphereQuery) -> (Vec3, Option<Vec3>) {
        let wp = q.pos - q.xlate;
        if !self.bcube.expand_by(q.radius).contains_pt(wp) {
            return (q.pos, None);
        }
        let mut p = self.world_to_local(wp);
        let mut deepest: Option<(f32, Vec3)> = None;
        let mut note = |hit: Option<(f32, Vec3)>| {
            if let Some((depth, n)) = hit {
                if deepest.map_or(true, |(d, _)| depth > d) {
                    deepest = Some((depth, n));
                }
            }
        };

        if q.check_interior {
            if let Some(int) = self.interior.as_deref() {
                let p_last = self.world_to_local(q.p_last - q.xlate);
                self.coll_interior(int, &mut p, p_last, q, &mut note);
            }
        } else {
            let mut scratch = Vec::new();
            for (i, part) in self.parts.iter().enumerate() {
                let hit = if self.geom.is_cube() || i >= self.real_num_parts {
                    push_out_of_cube(&mut p, part, q.radius, q.xy_only)
                } else {
                    self.calc_poly_pts(part, 0.0, &mut scratch);
                    let (z1, z2) = if q.xy_only {
                        (part.lo.z, part.hi.z)
                    } else {
                        (part.lo.z - q.radius, part.hi.z + q.radius)
                    };
                    push_out_of_prism(&mut p, &scratch, z1, z2, q.radius)
                };
                note(hit);
            }
            for d in &self.details {
                if !is_excluded(&d.cube, q.exclude) {
                    note(push_out_of_cube(&mut p, &d.cube, q.radius, q.xy_only));
                }
            }
        }
        for o in q.others.iter().filter(|o| !is_excluded(o, q.exclude)) {
            note(push_out_of_cube(&mut p, o, q.radius, q.xy_only));
        }

        match deepest {
            None => (q.pos, None),
            Some((_, n)) => (self.local_to_world(p) + q.xlate, Some(self.local_dir_to_world(n))),
        }
    }

    fn coll_interior(
        &self,
        int: &Interior,
        p: &mut Vec3,
        p_last: Vec3,
        q: &SphereQuery,
        note: &mut impl FnMut(Option<(f32, Vec3)>),
    ) {
        let r = q.radius;
        // A fast mover may have jumped clean through a wall since the last step.
        for (dim, walls) in int.walls.iter().enumerate() {
            for w in walls {
                if w.expand_by(r).contains_pt(p_last) || w.line_intersection(p_last, *p).is_none() {
                    continue;
                }
                let dir = p_last[dim] > w.center_dim(dim);
                let mut n = Vec3::ZERO;
                n[dim] = if dir { 1.0 } else { -1.0 };
                let old = p[dim];
                p[dim] = w.d(dim, dir) + n[dim] * r;
                note(Some(((old - p[dim]).abs(), n)));
            }
        }
        for w in int.all_walls() {
            note(push_out_of_cube(p, w, r, q.xy_only));
        }
        for e in &int.elevators {
            note(push_out_of_cube(p, &e.cube, r, q.xy_only));
        }
        if !q.xy_only {
            for s in int.floors.iter().chain(int.ceilings.iter()) {
                note(push_out_of_cube(p, s, r, false));
            }
        }
        if let Some(rg) = int.room_geom.as_deref() {
            for o in rg.objs.iter().filter(|o| !o.no_coll() && !o.is_light()) {
                if !is_excluded(&o.cube, q.exclude) {
                    note(push_out_of_cube(p, &o.cube, r, q.xy_only));
                }
            }
        }
        // Keep the sphere inside the exterior walls of the part it is in.
        let Some(pi) = self.get_part_containing_pt(*p) else {
            return;
        };
        let part = self.parts[pi];
        for dim in 0..2 {
            for dir in [false, true] {
                let gap = if dir { part.hi[dim] - p[dim] } else { p[dim] - part.lo[dim] };
                if gap >= r - TOLERANCE {
                    continue;
                }
                let step = if dir { 10.0 * TOLERANCE } else { -10.0 * TOLERANCE };
                let mut beyond = *p;
                beyond[dim] = part.d(dim, dir) + step;
                if self.get_part_containing_pt(beyond).is_some() {
                    continue;
                }
                let mut n = Vec3::ZERO;
                n[dim] = if dir { -1.0 } else { 1.0 };
                p[dim] = part.d(dim, dir) + n[dim] * r;
                note(Some((r - gap, n)));
            }
        }
    }

    /// Segment `p1`-`p2` (world) against the building.
    ///
    /// With `occlusion_only` the first hit found is returned and the interior is skipped.
    /// Otherwise every hit point is appended to `hit_points` and the nearest is returned.
    pub fn check_line_coll(
        &self,
        p1: Vec3,
        p2: Vec3,
        xlate: Vec3,
        occlusion_only: bool,
        hit_points: &mut Vec<Vec3>,
    ) -> Option<LineHit> {
        let (w1, w2) = (p1 - xlate, p2 - xlate);
        self.bcube.line_intersection(w1, w2)?;
        let (a, b) = (self.world_to_local(w1), self.world_to_local(w2));
        let mut best: Option<LineHit> = None;
        let mut record = |t: f32, kind: LineHitKind, best: &mut Option<LineHit>| {
            hit_points.push(p1 + (p2 - p1) * t);
            if best.map_or(true, |h| t < h.t) {
                *best = Some(LineHit { t, kind });
            }
        };

        let mut scratch = Vec::new();
        for (i, part) in self.parts.iter().enumerate() {
            let span = if self.geom.is_cube() || i >= self.real_num_parts {
                part.line_intersection(a, b)
            } else {
                self.calc_poly_pts(part, 0.0, &mut scratch);
                line_prism_intersection(a, b, &scratch, part.lo.z, part.hi.z)
            };
            if let Some(t) = shell_crossing(span) {
                record(t, LineHitKind::Side, &mut best);
                if occlusion_only {
                    return best;
                }
            }
        }
        for tq in &self.roof_tquads {
            if let Some(t) = tq.line_intersection(a, b) {
                record(t, LineHitKind::Roof, &mut best);
                if occlusion_only {
                    return best;
                }
            }
        }
        for d in &self.details {
            if let Some((t, _)) = d.cube.line_intersection(a, b) {
                record(t, LineHitKind::Detail, &mut best);
                if occlusion_only {
                    return best;
                }
            }
        }
        if !occlusion_only {
            if let Some(int) = self.interior.as_deref() {
                for c in int.all_walls().chain(int.floors.iter()).chain(int.ceilings.iter()) {
                    if let Some((t, _)) = c.line_intersection(a, b) {
                        record(t, LineHitKind::Interior, &mut best);
                    }
                }
            }
        }
        best
    }

    /// Is the world point (or a vertical cylinder of `xy_radius`) inside any part?
    pub fn check_point_or_cylin_contained(
        &self,
        pos: Vec3,
        xy_radius: f32,
        xlate: Vec3,
        scratch: &mut Vec<Vec3>,
    ) -> bool {
        let wp = pos - xlate;
        if !self.bcube.expand_by_xy(xy_radius).contains_pt(wp) {
            return false;
        }
        let p = self.world_to_local(wp);
        self.parts.iter().enumerate().any(|(i, part)| {
            if p.z < part.lo.z || p.z > part.hi.z {
                return false;
            }
            if i >= self.real_num_parts {
                return part.expand_by_xy(xy_radius).contains_pt_xy(p);
            }
            self.is_pt_in_part_xy(part, p, xy_radius, scratch)
        })
    }
}
