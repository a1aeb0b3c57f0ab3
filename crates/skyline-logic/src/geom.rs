//! Axis-aligned box value type and small geometric helpers.
//!
//! Every structural entity (part, room, door, stairwell, landing, elevator, room
//! object) is a `Cube` plus a few tagged fields. All boxes produced by the
//! generator must be strictly normalized: `lo < hi` on every axis.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned box. Dimension `dim` is 0 = x, 1 = y, 2 = z; `dir` false = low side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Cube {
    pub lo: Vec3,
    pub hi: Vec3,
}

impl Cube {
    pub fn new(lo: Vec3, hi: Vec3) -> Self {
        Self { lo, hi }
    }

    pub fn from_bounds(x1: f32, x2: f32, y1: f32, y2: f32, z1: f32, z2: f32) -> Self {
        Self {
            lo: Vec3::new(x1, y1, z1),
            hi: Vec3::new(x2, y2, z2),
        }
    }

    pub fn from_center_half(center: Vec3, half: Vec3) -> Self {
        Self {
            lo: center - half,
            hi: center + half,
        }
    }

    /// Degenerate box at a point, used as the seed for `union_with`.
    pub fn from_point(p: Vec3) -> Self {
        Self { lo: p, hi: p }
    }

    pub fn d(&self, dim: usize, dir: bool) -> f32 {
        if dir {
            self.hi[dim]
        } else {
            self.lo[dim]
        }
    }

    pub fn set_d(&mut self, dim: usize, dir: bool, v: f32) {
        if dir {
            self.hi[dim] = v;
        } else {
            self.lo[dim] = v;
        }
    }

    pub fn get_sz_dim(&self, dim: usize) -> f32 {
        self.hi[dim] - self.lo[dim]
    }

    pub fn dx(&self) -> f32 {
        self.get_sz_dim(0)
    }
    pub fn dy(&self) -> f32 {
        self.get_sz_dim(1)
    }
    pub fn dz(&self) -> f32 {
        self.get_sz_dim(2)
    }

    pub fn size(&self) -> Vec3 {
        self.hi - self.lo
    }

    pub fn center(&self) -> Vec3 {
        (self.lo + self.hi) * 0.5
    }

    pub fn center_dim(&self, dim: usize) -> f32 {
        0.5 * (self.lo[dim] + self.hi[dim])
    }

    pub fn max_len(&self) -> f32 {
        self.size().max_element()
    }

    pub fn min_len_xy(&self) -> f32 {
        self.dx().min(self.dy())
    }

    /// Index of the longer horizontal dimension (0 or 1).
    pub fn longer_xy_dim(&self) -> usize {
        usize::from(self.dy() > self.dx())
    }

    pub fn volume(&self) -> f32 {
        let s = self.size();
        s.x * s.y * s.z
    }

    pub fn area_xy(&self) -> f32 {
        self.dx() * self.dy()
    }

    pub fn is_normalized(&self) -> bool {
        self.lo.cmple(self.hi).all()
    }

    /// True when `lo < hi` strictly on every axis.
    pub fn is_strictly_normalized(&self) -> bool {
        self.lo.cmplt(self.hi).all()
    }

    /// Strict overlap; boxes that only share a face do not intersect.
    pub fn intersects(&self, o: &Cube) -> bool {
        self.lo.cmplt(o.hi).all() && o.lo.cmplt(self.hi).all()
    }

    pub fn intersects_xy(&self, o: &Cube) -> bool {
        self.lo.x < o.hi.x && o.lo.x < self.hi.x && self.lo.y < o.hi.y && o.lo.y < self.hi.y
    }

    /// Closed overlap; touching boxes intersect.
    pub fn intersects_closed(&self, o: &Cube) -> bool {
        self.lo.cmple(o.hi).all() && o.lo.cmple(self.hi).all()
    }

    pub fn intersects_xy_closed(&self, o: &Cube) -> bool {
        self.lo.x <= o.hi.x && o.lo.x <= self.hi.x && self.lo.y <= o.hi.y && o.lo.y <= self.hi.y
    }

    pub fn contains_pt(&self, p: Vec3) -> bool {
        self.lo.cmple(p).all() && p.cmple(self.hi).all()
    }

    pub fn contains_pt_xy(&self, p: Vec3) -> bool {
        p.x >= self.lo.x && p.x <= self.hi.x && p.y >= self.lo.y && p.y <= self.hi.y
    }

    pub fn contains_cube(&self, o: &Cube) -> bool {
        self.lo.cmple(o.lo).all() && o.hi.cmple(self.hi).all()
    }

    pub fn contains_cube_xy(&self, o: &Cube) -> bool {
        self.lo.x <= o.lo.x && o.hi.x <= self.hi.x && self.lo.y <= o.lo.y && o.hi.y <= self.hi.y
    }

    pub fn expand_by(&self, v: f32) -> Cube {
        self.expand_by_vec(Vec3::splat(v))
    }

    pub fn expand_by_xy(&self, v: f32) -> Cube {
        self.expand_by_vec(Vec3::new(v, v, 0.0))
    }

    pub fn expand_by_vec(&self, v: Vec3) -> Cube {
        Cube {
            lo: self.lo - v,
            hi: self.hi + v,
        }
    }

    pub fn expand_in_dim(&mut self, dim: usize, v: f32) {
        self.lo[dim] -= v;
        self.hi[dim] += v;
    }

    pub fn union_with(&mut self, o: &Cube) {
        self.lo = self.lo.min(o.lo);
        self.hi = self.hi.max(o.hi);
    }

    pub fn union_with_pt(&mut self, p: Vec3) {
        self.lo = self.lo.min(p);
        self.hi = self.hi.max(p);
    }

    pub fn translated(&self, v: Vec3) -> Cube {
        Cube {
            lo: self.lo + v,
            hi: self.hi + v,
        }
    }

    pub fn translate(&mut self, v: Vec3) {
        self.lo += v;
        self.hi += v;
    }

    /// Overlap region, or `None` when the boxes do not strictly intersect.
    pub fn intersection(&self, o: &Cube) -> Option<Cube> {
        if !self.intersects(o) {
            return None;
        }
        Some(Cube {
            lo: self.lo.max(o.lo),
            hi: self.hi.min(o.hi),
        })
    }

    pub fn closest_pt(&self, p: Vec3) -> Vec3 {
        p.clamp(self.lo, self.hi)
    }

    pub fn dist_sq(&self, p: Vec3) -> f32 {
        (self.closest_pt(p) - p).length_squared()
    }

    /// Split at `pos` along `dim` into (low, high) halves.
    pub fn split(&self, dim: usize, pos: f32) -> (Cube, Cube) {
        let mut a = *self;
        let mut b = *self;
        a.hi[dim] = pos;
        b.lo[dim] = pos;
        (a, b)
    }

    /// Corners in xy order (lo,lo) (hi,lo) (hi,hi) (lo,hi) at height `z`.
    pub fn corners_xy(&self, z: f32) -> [Vec3; 4] {
        [
            Vec3::new(self.lo.x, self.lo.y, z),
            Vec3::new(self.hi.x, self.lo.y, z),
            Vec3::new(self.hi.x, self.hi.y, z),
            Vec3::new(self.lo.x, self.hi.y, z),
        ]
    }

    /// Parametric [t_enter, t_exit] range of segment p1→p2 inside this box, clipped to [0,1].
    pub fn line_intersection(&self, p1: Vec3, p2: Vec3) -> Option<(f32, f32)> {
        let dir = p2 - p1;
        let mut t0 = 0.0f32;
        let mut t1 = 1.0f32;

        for dim in 0..3 {
            let d = dir[dim];
            if d.abs() < 1.0e-12 {
                if p1[dim] < self.lo[dim] || p1[dim] > self.hi[dim] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let ta = (self.lo[dim] - p1[dim]) * inv;
            let tb = (self.hi[dim] - p1[dim]) * inv;
            t0 = t0.max(ta.min(tb));
            t1 = t1.min(ta.max(tb));
            if t0 > t1 {
                return None;
            }
        }
        Some((t0, t1))
    }

    /// Entry fraction along p1→p2 and the face normal that was crossed.
    /// A segment starting inside the box reports t = 0 and a normal facing back along the ray.
    pub fn ray_hit(&self, p1: Vec3, p2: Vec3) -> Option<(f32, Vec3)> {
        let dir = p2 - p1;
        let mut t0 = 0.0f32;
        let mut t1 = 1.0f32;
        let mut normal = Vec3::ZERO;

        for dim in 0..3 {
            let d = dir[dim];
            if d.abs() < 1.0e-12 {
                if p1[dim] < self.lo[dim] || p1[dim] > self.hi[dim] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (near, far, sign) = if d > 0.0 {
                (self.lo[dim], self.hi[dim], -1.0)
            } else {
                (self.hi[dim], self.lo[dim], 1.0)
            };
            let ta = (near - p1[dim]) * inv;
            let tb = (far - p1[dim]) * inv;
            if ta > t0 {
                t0 = ta;
                normal = Vec3::ZERO;
                normal[dim] = sign;
            }
            t1 = t1.min(tb);
            if t0 > t1 {
                return None;
            }
        }
        if normal == Vec3::ZERO {
            normal = -dir.normalize_or_zero();
        }
        Some((t0, normal))
    }
}

/// Append the pieces of `c` not covered by `s` (at most six boxes) to `out`.
/// If the boxes do not overlap, `c` is appended unchanged.
pub fn subtract_cube_from_cube(c: &Cube, s: &Cube, out: &mut Vec<Cube>) {
    let Some(ov) = c.intersection(s) else {
        out.push(*c);
        return;
    };
    let mut rem = *c;

    for dim in [2usize, 0, 1] {
        if ov.lo[dim] > rem.lo[dim] {
            let mut piece = rem;
            piece.hi[dim] = ov.lo[dim];
            out.push(piece);
            rem.lo[dim] = ov.lo[dim];
        }
        if ov.hi[dim] < rem.hi[dim] {
            let mut piece = rem;
            piece.lo[dim] = ov.hi[dim];
            out.push(piece);
            rem.hi[dim] = ov.hi[dim];
        }
    }
}

/// Make `c` a thin slab of half-width `half_thick` centered at `pos` in `dim`.
pub fn set_wall_width(c: &mut Cube, pos: f32, half_thick: f32, dim: usize) {
    c.lo[dim] = pos - half_thick;
    c.hi[dim] = pos + half_thick;
}

/// Rotate `p` about the vertical axis through `center`.
pub fn do_xy_rotate(rot_cos: f32, rot_sin: f32, center: Vec3, p: &mut Vec3) {
    let x = p.x - center.x;
    let y = p.y - center.y;
    p.x = center.x + x * rot_cos - y * rot_sin;
    p.y = center.y + y * rot_cos + x * rot_sin;
}

pub fn do_xy_rotate_inv(rot_cos: f32, rot_sin: f32, center: Vec3, p: &mut Vec3) {
    do_xy_rotate(rot_cos, -rot_sin, center, p);
}

/// Even-odd point in polygon test in the xy plane.
pub fn point_in_polygon_xy(p: Vec3, pts: &[Vec3]) -> bool {
    let n = pts.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (pts[i], pts[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Distance from `p` to segment ab in the xy plane.
pub fn dist_xy_to_segment(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let ab = (b - a).truncate();
    let ap = (p - a).truncate();
    let len_sq = ab.length_squared();
    let t = if len_sq > 0.0 {
        (ap.dot(ab) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (ap - ab * t).length()
}

/// Closest point to `p` on segment ab in the xy plane (z taken from `p`).
pub fn closest_pt_on_segment_xy(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let ab = (b - a).truncate();
    let ap = (p - a).truncate();
    let len_sq = ab.length_squared();
    let t = if len_sq > 0.0 {
        (ap.dot(ab) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let c = a.truncate() + ab * t;
    Vec3::new(c.x, c.y, p.z)
}

/// Polygon signed area in xy; positive for counter-clockwise winding.
pub fn polygon_area_xy(pts: &[Vec3]) -> f32 {
    let n = pts.len();
    let mut area = 0.0;
    for i in 0..n {
        let (a, b) = (pts[i], pts[(i + 1) % n]);
        area += a.x * b.y - b.x * a.y;
    }
    0.5 * area
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Cube {
        Cube::from_bounds(0.0, 1.0, 0.0, 1.0, 0.0, 1.0)
    }

    #[test]
    fn normalization() {
        assert!(unit().is_strictly_normalized());
        let flat = Cube::from_bounds(0.0, 1.0, 0.0, 1.0, 0.5, 0.5);
        assert!(!flat.is_strictly_normalized());
        assert!(flat.is_normalized());
    }

    #[test]
    fn adjacency_is_not_intersection() {
        let a = unit();
        let b = a.translated(Vec3::new(1.0, 0.0, 0.0));
        assert!(!a.intersects(&b));
        assert!(a.intersects_closed(&b));
        let c = a.translated(Vec3::new(0.5, 0.5, 0.0));
        assert!(a.intersects(&c));
        assert!(a.intersection(&c).is_some_and(|ov| (ov.volume() - 0.25).abs() < 1e-6));
    }

    #[test]
    fn line_intersection_through_box() {
        let c = unit();
        let r = c.line_intersection(Vec3::new(-1.0, 0.5, 0.5), Vec3::new(2.0, 0.5, 0.5));
        let (t0, t1) = r.unwrap();
        assert!((t0 - 1.0 / 3.0).abs() < 1e-5);
        assert!((t1 - 2.0 / 3.0).abs() < 1e-5);
        assert!(c
            .line_intersection(Vec3::new(-1.0, 2.0, 0.5), Vec3::new(2.0, 2.0, 0.5))
            .is_none());
    }

    #[test]
    fn ray_hit_reports_face_normal() {
        let c = unit();
        let (t, n) = c
            .ray_hit(Vec3::new(0.5, 0.5, 3.0), Vec3::new(0.5, 0.5, -1.0))
            .unwrap();
        assert!((t - 0.5).abs() < 1e-5);
        assert_eq!(n, Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn subtract_preserves_volume() {
        let c = Cube::from_bounds(0.0, 4.0, 0.0, 4.0, 0.0, 1.0);
        let hole = Cube::from_bounds(1.0, 2.0, 1.0, 3.0, -1.0, 2.0);
        let mut out = Vec::new();
        subtract_cube_from_cube(&c, &hole, &mut out);
        let total: f32 = out.iter().map(|p| p.volume()).sum();
        assert!((total - (16.0 - 2.0)).abs() < 1e-4);
        for p in &out {
            assert!(p.is_strictly_normalized());
            assert!(!p.intersects(&hole));
        }
    }

    #[test]
    fn rotate_round_trip() {
        let (s, c) = 0.7f32.sin_cos();
        let center = Vec3::new(2.0, 3.0, 0.0);
        let mut p = Vec3::new(5.0, -1.0, 4.0);
        let orig = p;
        do_xy_rotate(c, s, center, &mut p);
        do_xy_rotate_inv(c, s, center, &mut p);
        assert!((p - orig).length() < 1e-4);
    }

    #[test]
    fn polygon_containment() {
        let square = unit().corners_xy(0.0);
        assert!(point_in_polygon_xy(Vec3::new(0.5, 0.5, 0.0), &square));
        assert!(!point_in_polygon_xy(Vec3::new(1.5, 0.5, 0.0), &square));
        assert!((polygon_area_xy(&square) - 1.0).abs() < 1e-6);
    }
}
