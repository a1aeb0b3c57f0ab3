//! Bounding-volume hierarchy over interior surfaces, for lighting and visibility rays.
//!
//! Built once per interior from walls, slabs, connectors and solid room objects, then
//! read-only. Any change to the interior or its room objects drops the tree, and the
//! next query rebuilds it from scratch.

use glam::Vec3;

use crate::building::Building;
use crate::color::Color;
use crate::geom::Cube;

const MAX_LEAF_ITEMS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColoredCube {
    pub cube: Cube,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BvhNodeKind {
    Internal { left: u32, right: u32 },
    Leaf { start: u32, count: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhNode {
    pub bounds: Cube,
    pub kind: BvhNodeKind,
}

#[derive(Debug, Clone, Default)]
pub struct CubeBvh {
    pub nodes: Vec<BvhNode>,
    pub items: Vec<ColoredCube>,
    pub root: Option<u32>,
}

/// Closest surface hit of an interior ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteriorHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub color: Color,
    /// Distance from the ray origin.
    pub dist: f32,
}

fn half_surface_area(c: &Cube) -> f32 {
    let s = c.size();
    s.x * s.y + s.y * s.z + s.z * s.x
}

impl CubeBvh {
    pub fn build(mut items: Vec<ColoredCube>) -> Self {
        items.retain(|i| i.cube.is_normalized());
        let mut bvh = CubeBvh {
            nodes: Vec::with_capacity(2 * items.len() / MAX_LEAF_ITEMS + 1),
            items: Vec::new(),
            root: None,
        };
        if items.is_empty() {
            return bvh;
        }
        let root = bvh.build_recursive(&mut items[..], 0);
        bvh.items = items;
        bvh.root = Some(root);
        bvh
    }

    fn build_recursive(&mut self, items: &mut [ColoredCube], offset: usize) -> u32 {
        let mut bounds = items[0].cube;
        for it in &items[1..] {
            bounds.union_with(&it.cube);
        }
        if items.len() <= MAX_LEAF_ITEMS {
            self.nodes.push(BvhNode {
                bounds,
                kind: BvhNodeKind::Leaf {
                    start: offset as u32,
                    count: items.len() as u32,
                },
            });
            return (self.nodes.len() - 1) as u32;
        }

        // SAH sweep over the three axes; fall back to the median of the best axis.
        let n = items.len();
        let mut best = (0usize, n / 2, f32::MAX);
        let mut suffix = vec![Cube::default(); n];
        for axis in 0..3 {
            items.sort_unstable_by(|a, b| a.cube.center_dim(axis).total_cmp(&b.cube.center_dim(axis)));
            suffix[n - 1] = items[n - 1].cube;
            for i in (0..n - 1).rev() {
                let mut u = suffix[i + 1];
                u.union_with(&items[i].cube);
                suffix[i] = u;
            }
            let mut left = items[0].cube;
            for split in 1..n {
                let cost = half_surface_area(&left) * split as f32
                    + half_surface_area(&suffix[split]) * (n - split) as f32;
                if cost < best.2 {
                    best = (axis, split, cost);
                }
                left.union_with(&items[split].cube);
            }
        }
        let (axis, split, _) = best;
        items.sort_unstable_by(|a, b| a.cube.center_dim(axis).total_cmp(&b.cube.center_dim(axis)));

        let slot = self.nodes.len();
        self.nodes.push(BvhNode {
            bounds,
            kind: BvhNodeKind::Leaf { start: 0, count: 0 },
        });
        let (lo, hi) = items.split_at_mut(split);
        let left = self.build_recursive(lo, offset);
        let right = self.build_recursive(hi, offset + split);
        self.nodes[slot].kind = BvhNodeKind::Internal { left, right };
        slot as u32
    }

    pub fn bounds(&self) -> Option<Cube> {
        self.root.map(|r| self.nodes[r as usize].bounds)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Nearest item hit by segment `p1`-`p2`, as (t, normal, item index).
    pub fn segment_hit(&self, p1: Vec3, p2: Vec3) -> Option<(f32, Vec3, usize)> {
        let root = self.root?;
        let (t_root, _) = self.nodes[root as usize].bounds.line_intersection(p1, p2)?;
        let mut best: Option<(f32, Vec3, usize)> = None;
        let mut frontier: Vec<(u32, f32)> = Vec::with_capacity(32);
        frontier.push((root, t_root));

        while let Some((ix, t_enter)) = frontier.pop() {
            if best.is_some_and(|(bt, _, _)| t_enter > bt) {
                continue;
            }
            let node = &self.nodes[ix as usize];
            match node.kind {
                BvhNodeKind::Internal { left, right } => {
                    let mut kids: Vec<(u32, f32)> = [left, right]
                        .into_iter()
                        .filter_map(|k| {
                            self.nodes[k as usize]
                                .bounds
                                .line_intersection(p1, p2)
                                .map(|(t0, _)| (k, t0))
                        })
                        .collect();
                    // Push the farther child first so the nearer one is visited next.
                    kids.sort_by(|a, b| b.1.total_cmp(&a.1));
                    frontier.extend(kids);
                }
                BvhNodeKind::Leaf { start, count } => {
                    for i in start as usize..(start + count) as usize {
                        if let Some((t, n)) = self.items[i].cube.ray_hit(p1, p2) {
                            if best.map_or(true, |(bt, _, _)| t < bt) {
                                best = Some((t, n, i));
                            }
                        }
                    }
                }
            }
        }
        best
    }
}

/// Trace a ray from `pos` along `dir` through `bvh`. Coordinates are in the interior's frame.
pub fn ray_cast_interior(pos: Vec3, dir: Vec3, bvh: &CubeBvh) -> Option<InteriorHit> {
    let len = dir.length();
    if len < 1.0e-6 {
        return None;
    }
    let bounds = bvh.bounds()?;
    let reach = 2.0 * (bounds.size().length() + (pos - bounds.center()).length());
    let p2 = pos + dir / len * reach;
    let (t, normal, ix) = bvh.segment_hit(pos, p2)?;
    let point = pos + (p2 - pos) * t;
    Some(InteriorHit {
        point,
        normal,
        color: bvh.items[ix].color,
        dist: t * reach,
    })
}

/// Surfaces that block light inside the building.
pub fn gather_interior_cubes(b: &Building) -> Vec<ColoredCube> {
    let Some(int) = b.interior.as_deref() else {
        return Vec::new();
    };
    let c = &b.colors;
    let mut out: Vec<ColoredCube> = Vec::with_capacity(int.num_walls() + int.floors.len() + int.ceilings.len());
    out.extend(int.all_walls().map(|w| ColoredCube { cube: *w, color: c.wall }));
    out.extend(int.floors.iter().map(|f| ColoredCube { cube: *f, color: c.floor }));
    out.extend(int.ceilings.iter().map(|f| ColoredCube { cube: *f, color: c.ceil }));
    out.extend(int.elevators.iter().map(|e| ColoredCube { cube: e.cube, color: Color::LT_GRAY }));
    if let Some(rg) = int.room_geom.as_deref() {
        out.extend(
            rg.objs
                .iter()
                .filter(|o| o.is_visible() && !o.no_coll() && !o.is_light())
                .map(|o| ColoredCube { cube: o.cube, color: o.color }),
        );
    }
    // Exterior walls seen from inside.
    let thick = 0.5 * int.slab_thick;
    for part in b.real_parts() {
        for dim in 0..2 {
            for dir in [false, true] {
                let mut w = *part;
                let e = part.d(dim, dir);
                w.lo[dim] = e - thick;
                w.hi[dim] = e + thick;
                out.push(ColoredCube { cube: w, color: c.wall });
            }
        }
    }
    out
}

impl Building {
    /// Build the interior BVH if missing. Returns true if it was built.
    pub fn ensure_interior_bvh(&mut self) -> bool {
        if self.interior.as_ref().map_or(true, |i| i.bvh.is_some()) {
            return false;
        }
        let bvh = CubeBvh::build(gather_interior_cubes(self));
        log::debug!("interior bvh: {} items, {} nodes", bvh.len(), bvh.nodes.len());
        if let Some(int) = self.interior.as_deref_mut() {
            int.bvh = Some(bvh);
        }
        true
    }

    pub fn invalidate_interior_bvh(&mut self) {
        if let Some(int) = self.interior.as_deref_mut() {
            int.bvh = None;
        }
    }

    /// World-space interior ray cast; uses the cached BVH, which must already exist.
    pub fn ray_cast_interior(&self, pos: Vec3, dir: Vec3, xlate: Vec3) -> Option<InteriorHit> {
        let bvh = self.interior.as_deref()?.bvh.as_ref()?;
        let lp = self.world_to_local(pos - xlate);
        let ld = self.world_dir_to_local(dir);
        let hit = ray_cast_interior(lp, ld, bvh)?;
        Some(InteriorHit {
            point: self.local_to_world(hit.point) + xlate,
            normal: self.local_dir_to_world(hit.normal),
            ..hit
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_items(n: usize) -> Vec<ColoredCube> {
        (0..n)
            .map(|i| {
                let x = (i % 10) as f32 * 2.0;
                let y = (i / 10) as f32 * 2.0;
                ColoredCube {
                    cube: Cube::from_bounds(x, x + 1.0, y, y + 1.0, 0.0, 1.0),
                    color: Color::rgb(i as f32 / n as f32, 0.0, 0.0),
                }
            })
            .collect()
    }

    #[test]
    fn empty_bvh_has_no_hits() {
        let bvh = CubeBvh::build(Vec::new());
        assert!(bvh.is_empty());
        assert!(ray_cast_interior(Vec3::ZERO, Vec3::X, &bvh).is_none());
    }

    #[test]
    fn leaves_cover_every_item() {
        let bvh = CubeBvh::build(grid_items(37));
        let mut covered = 0;
        for n in &bvh.nodes {
            if let BvhNodeKind::Leaf { count, .. } = n.kind {
                assert!(count as usize <= MAX_LEAF_ITEMS);
                covered += count;
            }
        }
        assert_eq!(covered, 37);
        let root = bvh.bounds().unwrap();
        assert!(bvh.items.iter().all(|i| root.contains_cube(&i.cube)));
    }

    #[test]
    fn matches_brute_force() {
        let items = grid_items(50);
        let bvh = CubeBvh::build(items.clone());
        let rays = [
            (Vec3::new(-1.0, 0.5, 0.5), Vec3::X),
            (Vec3::new(-1.0, 2.5, 0.5), Vec3::new(1.0, 0.3, 0.0)),
            (Vec3::new(9.5, -3.0, 0.5), Vec3::Y),
            (Vec3::new(5.5, 5.5, 5.0), -Vec3::Z),
            (Vec3::new(-1.0, -1.0, 3.0), Vec3::X),
        ];
        for (p, d) in rays {
            let hit = ray_cast_interior(p, d, &bvh);
            let reach = 1000.0;
            let brute = items
                .iter()
                .filter_map(|i| i.cube.ray_hit(p, p + d.normalize() * reach).map(|(t, _)| t * reach))
                .fold(None, |acc: Option<f32>, t| Some(acc.map_or(t, |a| a.min(t))));
            match (hit, brute) {
                (Some(h), Some(b)) => assert!((h.dist - b).abs() < 1e-3, "{} vs {}", h.dist, b),
                (None, None) => {}
                other => panic!("mismatch {:?}", other),
            }
        }
    }

    #[test]
    fn hit_reports_face_normal_and_color() {
        let items = vec![ColoredCube {
            cube: Cube::from_bounds(2.0, 3.0, -1.0, 1.0, -1.0, 1.0),
            color: Color::BROWN,
        }];
        let bvh = CubeBvh::build(items);
        let hit = ray_cast_interior(Vec3::ZERO, Vec3::X, &bvh).unwrap();
        assert!((hit.point.x - 2.0).abs() < 1e-4);
        assert!((hit.normal - Vec3::NEG_X).length() < 1e-5);
        assert_eq!(hit.color, Color::BROWN);
    }
}
