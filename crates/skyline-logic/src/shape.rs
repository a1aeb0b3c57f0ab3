//! Shape generator: footprint, parts, roof, roof details and exterior doors.
//!
//! `gen_geometry` builds a complete building from a material index and two seeds.
//! Everything random is drawn from RNG streams derived from those seeds, so the
//! same inputs always produce the same building.
//!
//! Pipeline:
//! 1. Size and footprint (rotation, side count, flat side, alternating steps)
//! 2. Parts: split footprint, stacked tiers, or house body + garage/shed + chimney
//! 3. Snap part heights to whole floors when configured
//! 4. Roof (flat, peaked, hipped, sloped), then dome/onion overrides
//! 5. Roof details on flat roofs
//! 6. Interior layout, exterior doors, interior doors

use glam::Vec3;

use crate::building::{Building, RoofObj, RoofObjKind, RoofType, TQuad, TQuadKind};
use crate::constants::{building_flags, proportions, tries, MAX_CYLIN_SIDES, MAX_PARTS, TOLERANCE};
use crate::geom::{point_in_polygon_xy, Cube};
use crate::layout;
use crate::materials::{BuildingMaterial, BuildingParams};
use crate::rng::{rand_chance, rand_index, rand_int, rand_uniform, rng_for_seeds, GenRng};

/// Generate a full building (exterior, interior when enabled, doors).
pub fn gen_geometry(
    params: &BuildingParams,
    mat_ix: usize,
    pos: Vec3,
    seed1: u64,
    seed2: u64,
) -> Building {
    let mat = params.get_material(mat_ix);
    let mut rng = rng_for_seeds(seed1, seed2);
    let mut b = Building::new(mat_ix, seed1, seed2, pos);
    b.floor_spacing = mat.get_floor_spacing();

    let size = Vec3::new(
        rand_uniform(&mut rng, mat.size_min.x, mat.size_max.x),
        rand_uniform(&mut rng, mat.size_min.y, mat.size_max.y),
        rand_uniform(&mut rng, mat.size_min.z, mat.size_max.z).max(b.floor_spacing),
    );
    let base = Cube::new(
        Vec3::new(pos.x - 0.5 * size.x, pos.y - 0.5 * size.y, pos.z),
        Vec3::new(pos.x + 0.5 * size.x, pos.y + 0.5 * size.y, pos.z + size.z),
    );

    if rand_chance(&mut rng, mat.house_prob) {
        b.flags |= building_flags::IS_HOUSE;
        gen_house(&mut b, params, mat, base, &mut rng);
    } else {
        gen_office(&mut b, params, mat, base, &mut rng);
    }
    b.colors.side = mat.side_color.gen_color(&mut rng);
    b.colors.roof = mat.roof_color.gen_color(&mut rng);
    b.colors.wall = mat.wall_color.gen_color(&mut rng);
    b.colors.ceil = mat.ceil_color.gen_color(&mut rng);
    b.colors.floor = mat.floor_color.gen_color(&mut rng);
    b.calc_bcube_from_parts();

    let pending = if params.gen_interiors {
        layout::gen_interior(&mut b, params)
    } else {
        None
    };
    gen_building_doors_if_needed(&mut b, params, &mut rng);
    if let Some(state) = pending {
        layout::finish_interior(&mut b, state);
    }
    b.calc_bcube_from_parts();

    log::debug!(
        "generated building mat={} seeds=({}, {}): {} parts, {} doors, roof {:?}",
        mat_ix,
        seed1,
        seed2,
        b.parts.len(),
        b.doors.len(),
        b.roof_type
    );
    b
}

// ── Office / generic buildings ─────────────────────────────────────────

fn gen_office(
    b: &mut Building,
    params: &BuildingParams,
    mat: &BuildingMaterial,
    base: Cube,
    rng: &mut GenRng,
) {
    if mat.max_rot_angle > 0.0 && rand_chance(rng, mat.rotate_prob) {
        let angle = rand_uniform(rng, -mat.max_rot_angle, mat.max_rot_angle);
        let (s, c) = angle.sin_cos();
        b.geom.rot_sin = s;
        b.geom.rot_cos = c;
    }
    b.rot_center = base.center();

    let num_sides = if rand_chance(rng, mat.round_prob) {
        MAX_CYLIN_SIDES
    } else if rand_chance(rng, mat.cube_prob) {
        4
    } else {
        rand_int(rng, mat.min_sides, mat.max_sides).min(MAX_CYLIN_SIDES)
    };
    b.geom.num_sides = num_sides;
    if num_sides != 4 {
        b.geom.half_offset = rand_chance(rng, 0.5);
        b.geom.start_angle = rand_uniform(rng, 0.0, std::f32::consts::TAU);
        if num_sides <= 8 && rand_chance(rng, 0.25) {
            b.geom.flat_side_amt = rand_uniform(rng, mat.min_fsa, mat.max_fsa);
        }
        if rand_chance(rng, mat.asf_prob) {
            b.geom.alt_step_factor = rand_uniform(rng, mat.min_asf, mat.max_asf);
        }
    }

    let spacing = b.floor_spacing;
    let stacked = if b.geom.is_cube()
        && base.min_len_xy() > 4.0 * spacing
        && rand_chance(rng, mat.split_prob)
    {
        split_in_xy(b, base, rng);
        false
    } else {
        let max_levels = ((base.dz() / spacing) as u32).max(1);
        let num_levels = rand_int(rng, mat.min_levels, mat.max_levels).min(max_levels);
        gen_tiers(b, base, num_levels, rng);
        true
    };
    adjust_part_zvals_for_floor_spacing(b, params.exact_mult_floor_height, stacked);
    b.real_num_parts = b.parts.len();

    let top = b.parts[b.parts.len() - 1];
    if b.geom.is_cube() && rand_chance(rng, mat.peaked_roof_prob) {
        let peak = rand_uniform(rng, 0.2, 0.4) * top.min_len_xy();
        if rand_chance(rng, 0.5) {
            gen_hipped_roof(b, &top, peak, None);
            b.roof_type = RoofType::Hipped;
        } else {
            gen_peaked_roof(b, &top, peak, None);
            b.roof_type = RoofType::Peak;
        }
    } else {
        b.roof_type = RoofType::Flat;
    }
    maybe_add_special_roof(b, params, rng);

    if b.roof_type == RoofType::Flat && rand_chance(rng, mat.detail_prob) {
        gen_details(b, mat, rng, &[]);
    }
}

/// Split a footprint into two or four adjacent, non-overlapping parts of varied height.
pub fn split_in_xy(b: &mut Building, base: Cube, rng: &mut GenRng) {
    let spacing = b.floor_spacing;
    let min_h = spacing.min(base.dz());
    let vary_height = |c: &mut Cube, rng: &mut GenRng| {
        c.hi.z = c.lo.z + (base.dz() * rand_uniform(rng, 0.5, 1.0)).max(min_h);
    };

    match rand_int(rng, 0, 2) {
        0 => {
            // Two halves along the longer dimension.
            let d = base.longer_xy_dim();
            let pos = base.lo[d] + base.get_sz_dim(d) * rand_uniform(rng, 0.4, 0.6);
            let (mut a, mut c) = base.split(d, pos);
            vary_height(&mut a, rng);
            vary_height(&mut c, rng);
            b.parts.extend([a, c]);
        }
        1 => {
            // L-shape: second half shortened along the other dimension.
            let d = rand_index(rng, 2);
            let od = 1 - d;
            let pos = base.lo[d] + base.get_sz_dim(d) * rand_uniform(rng, 0.4, 0.6);
            let (mut a, mut c) = base.split(d, pos);
            let len = c.get_sz_dim(od) * rand_uniform(rng, 0.5, 0.75);
            if rand_chance(rng, 0.5) {
                c.hi[od] = c.lo[od] + len;
            } else {
                c.lo[od] = c.hi[od] - len;
            }
            vary_height(&mut a, rng);
            vary_height(&mut c, rng);
            b.parts.extend([a, c]);
        }
        _ => {
            // Quadrants.
            let px = base.lo.x + base.dx() * rand_uniform(rng, 0.35, 0.65);
            let py = base.lo.y + base.dy() * rand_uniform(rng, 0.35, 0.65);
            let (lx, hx) = base.split(0, px);
            for half in [lx, hx] {
                let (mut a, mut c) = half.split(1, py);
                vary_height(&mut a, rng);
                vary_height(&mut c, rng);
                b.parts.extend([a, c]);
            }
        }
    }
}

/// Stacked tiers, each contained in the xy footprint of the tier below.
fn gen_tiers(b: &mut Building, base: Cube, num_levels: u32, rng: &mut GenRng) {
    let n = num_levels.max(1);
    let total = base.dz();
    let min_side = 2.0 * b.floor_spacing;
    let uniform_shrink = !b.geom.is_cube();
    let mut cur = base;

    for i in 0..n {
        let mut tier = cur;
        tier.lo.z = base.lo.z + total * i as f32 / n as f32;
        tier.hi.z = base.lo.z + total * (i + 1) as f32 / n as f32;
        if i > 0 {
            for d in 0..2 {
                let len = cur.get_sz_dim(d);
                let s_lo = rand_uniform(rng, 0.05, 0.2) * len;
                let s_hi = if uniform_shrink {
                    s_lo
                } else {
                    rand_uniform(rng, 0.05, 0.2) * len
                };
                tier.lo[d] += s_lo;
                tier.hi[d] -= s_hi;
            }
            if tier.min_len_xy() < min_side {
                break;
            }
        }
        b.parts.push(tier);
        cur = tier;
    }
}

/// Snap each part's height to a whole number of floors; stacked parts stay stacked.
pub fn adjust_part_zvals_for_floor_spacing(b: &mut Building, exact_mult: bool, stacked: bool) {
    if !exact_mult {
        return;
    }
    let spacing = b.floor_spacing;
    let mut prev_top: Option<f32> = None;

    for part in &mut b.parts {
        if stacked {
            if let Some(top) = prev_top {
                let shift = top - part.lo.z;
                part.lo.z += shift;
                part.hi.z += shift;
            }
        }
        let n = (part.dz() / spacing).round().max(1.0);
        part.hi.z = part.lo.z + n * spacing;
        prev_top = Some(part.hi.z);
    }
}

// ── Houses ─────────────────────────────────────────────────────────────

fn gen_house(
    b: &mut Building,
    params: &BuildingParams,
    mat: &BuildingMaterial,
    base: Cube,
    rng: &mut GenRng,
) {
    let spacing = b.floor_spacing;
    b.rot_center = base.center();
    let mut split_dim = None;

    if base.min_len_xy() > 4.0 * spacing && rand_chance(rng, 0.6) {
        let d = rand_index(rng, 2);
        let od = 1 - d;
        let pos = base.lo[d] + base.get_sz_dim(d) * rand_uniform(rng, 0.4, 0.6);
        let (a, mut c) = base.split(d, pos);
        let len = c.get_sz_dim(od) * rand_uniform(rng, 0.5, 0.75);
        if len >= 2.0 * spacing {
            if rand_chance(rng, 0.5) {
                c.hi[od] = c.lo[od] + len;
            } else {
                c.lo[od] = c.hi[od] - len;
            }
        }
        b.parts.extend([a, c]);
        split_dim = Some(d);
    } else {
        b.parts.push(base);
    }
    adjust_part_zvals_for_floor_spacing(b, params.exact_mult_floor_height, false);
    b.real_num_parts = b.parts.len();

    let hipped = rand_chance(rng, 0.3);
    b.roof_type = if hipped { RoofType::Hipped } else { RoofType::Peak };
    let peak = rand_uniform(rng, 0.25, 0.4) * b.parts[0].min_len_xy();
    let mut roof_h = 0.0f32;
    for i in 0..b.real_num_parts {
        let part = b.parts[i];
        let h = if hipped {
            gen_hipped_roof(b, &part, peak, None)
        } else {
            gen_peaked_roof(b, &part, peak, None)
        };
        if i == 0 {
            roof_h = h;
        }
    }

    if rand_chance(rng, 0.5) {
        add_garage_or_shed(b, mat, split_dim, rng);
    }
    if rand_chance(rng, 0.5) {
        add_chimney(b, roof_h, rng);
    }
}

fn add_garage_or_shed(
    b: &mut Building,
    mat: &BuildingMaterial,
    split_dim: Option<usize>,
    rng: &mut GenRng,
) {
    let spacing = b.floor_spacing;
    let attach = b.parts[0];
    // With an L-shape, part 0 is the low half along the split dim, so that face is exterior.
    let (gd, gdir) = match split_dim {
        Some(d) => (d, false),
        None => (rand_index(rng, 2), rand_chance(rng, 0.5)),
    };
    let god = 1 - gd;
    let is_garage = rand_chance(rng, 0.6);
    let mut scale = rand_uniform(rng, mat.house_scale_min, mat.house_scale_max);
    if !is_garage {
        scale *= 0.6;
    }
    let len = (attach.get_sz_dim(god) * scale)
        .max(1.5 * spacing)
        .min(attach.get_sz_dim(god));
    let depth = (attach.get_sz_dim(gd) * scale).max(1.2 * spacing);

    let mut g = attach;
    if gdir {
        g.lo[gd] = attach.hi[gd];
        g.hi[gd] = attach.hi[gd] + depth;
    } else {
        g.hi[gd] = attach.lo[gd];
        g.lo[gd] = attach.lo[gd] - depth;
    }
    if rand_chance(rng, 0.5) {
        g.hi[god] = attach.lo[god] + len;
    } else {
        g.lo[god] = attach.hi[god] - len;
    }
    g.hi.z = g.lo.z + spacing.min(attach.dz());

    if b.parts.iter().any(|p| p.intersects(&g)) || b.parts.len() >= MAX_PARTS {
        return;
    }
    b.flags |= if is_garage {
        building_flags::HAS_GARAGE
    } else {
        building_flags::HAS_SHED
    };
    b.parts.push(g);
    let h = 0.3 * g.get_sz_dim(gd).min(g.dz());
    gen_sloped_roof(b, &g, h, (gd, !gdir));
}

fn add_chimney(b: &mut Building, roof_h: f32, rng: &mut GenRng) {
    let spacing = b.floor_spacing;
    let part = b.parts[0];
    let w = 0.3 * spacing;
    let depth = 0.25 * spacing;
    let first = rand_index(rng, 4);

    for n in 0..4 {
        let side = (first + n) % 4;
        let (d, dir) = (side >> 1, side & 1 == 1);
        let od = 1 - d;
        if part.get_sz_dim(od) < 3.0 * w {
            continue;
        }
        let mut c = part;
        if dir {
            c.lo[d] = part.hi[d];
            c.hi[d] = part.hi[d] + depth;
        } else {
            c.hi[d] = part.lo[d];
            c.lo[d] = part.lo[d] - depth;
        }
        let center = rand_uniform(rng, part.lo[od] + w, part.hi[od] - w);
        c.lo[od] = center - 0.5 * w;
        c.hi[od] = center + 0.5 * w;
        c.hi.z = part.hi.z + roof_h + 0.3 * spacing;

        if b.parts.iter().any(|p| p.intersects(&c)) || b.parts.len() >= MAX_PARTS {
            continue;
        }
        b.flags |= building_flags::HAS_CHIMNEY;
        b.parts.push(c);
        let cap = c.expand_by_xy(0.1 * depth);
        b.roof_tquads
            .push(TQuad::quad(cap.corners_xy(c.hi.z), TQuadKind::ChimneyCap));
        return;
    }
}

/// True for the chimney part, which is always the last part when present.
pub fn is_chimney_part(b: &Building, part_ix: usize) -> bool {
    b.flags & building_flags::HAS_CHIMNEY != 0 && part_ix + 1 == b.parts.len()
}

// ── Roofs ──────────────────────────────────────────────────────────────

/// Point with `a` along `d`, `b` along the other horizontal dim, at height `z`.
fn pt_dim(d: usize, a: f32, b: f32, z: f32) -> Vec3 {
    if d == 0 {
        Vec3::new(a, b, z)
    } else {
        Vec3::new(b, a, z)
    }
}

/// Gabled roof with the ridge along the longer dimension. Returns the roof height used.
pub fn gen_peaked_roof(
    b: &mut Building,
    top: &Cube,
    peak_height: f32,
    skip_side: Option<(usize, bool)>,
) -> f32 {
    let d = top.longer_xy_dim();
    let od = 1 - d;
    let h = peak_height.min(0.5 * top.get_sz_dim(od)).max(TOLERANCE * 10.0);
    let z1 = top.hi.z;
    let z2 = z1 + h;
    let c = top.center_dim(od);

    for dir in [false, true] {
        let e = top.d(od, dir);
        b.roof_tquads.push(TQuad::quad(
            [
                pt_dim(d, top.lo[d], e, z1),
                pt_dim(d, top.hi[d], e, z1),
                pt_dim(d, top.hi[d], c, z2),
                pt_dim(d, top.lo[d], c, z2),
            ],
            TQuadKind::Roof,
        ));
    }
    for dir in [false, true] {
        if skip_side == Some((d, dir)) {
            continue;
        }
        let e = top.d(d, dir);
        b.roof_tquads.push(TQuad::tri(
            pt_dim(d, e, top.lo[od], z1),
            pt_dim(d, e, top.hi[od], z1),
            pt_dim(d, e, c, z2),
            TQuadKind::Wall,
        ));
    }
    b.add_roof_to_bcube(top, h);
    h
}

/// Hipped roof; a square footprint degenerates to a pyramid. Returns the roof height used.
pub fn gen_hipped_roof(
    b: &mut Building,
    top: &Cube,
    peak_height: f32,
    skip_side: Option<(usize, bool)>,
) -> f32 {
    let d = top.longer_xy_dim();
    let od = 1 - d;
    let half_w = 0.5 * top.get_sz_dim(od);
    let h = peak_height.min(half_w).max(TOLERANCE * 10.0);
    let z1 = top.hi.z;
    let z2 = z1 + h;
    let c = top.center_dim(od);
    // A skipped end keeps the ridge running out to that edge.
    let ridge_lo = if skip_side == Some((d, false)) {
        top.lo[d]
    } else {
        top.lo[d] + half_w
    };
    let ridge_hi = if skip_side == Some((d, true)) {
        top.hi[d]
    } else {
        (top.hi[d] - half_w).max(ridge_lo)
    };

    for dir in [false, true] {
        let e = top.d(od, dir);
        let (p0, p1) = (pt_dim(d, top.lo[d], e, z1), pt_dim(d, top.hi[d], e, z1));
        let (r0, r1) = (pt_dim(d, ridge_lo, c, z2), pt_dim(d, ridge_hi, c, z2));
        if ridge_hi - ridge_lo > TOLERANCE {
            b.roof_tquads
                .push(TQuad::quad([p0, p1, r1, r0], TQuadKind::Roof));
        } else {
            b.roof_tquads.push(TQuad::tri(p0, p1, r0, TQuadKind::Roof));
        }
    }
    for dir in [false, true] {
        if skip_side == Some((d, dir)) {
            continue;
        }
        let e = top.d(d, dir);
        let r = if dir { ridge_hi } else { ridge_lo };
        b.roof_tquads.push(TQuad::tri(
            pt_dim(d, e, top.lo[od], z1),
            pt_dim(d, e, top.hi[od], z1),
            pt_dim(d, r, c, z2),
            TQuadKind::Roof,
        ));
    }
    b.add_roof_to_bcube(top, h);
    h
}

/// Single-slope roof rising toward `high_side`. Returns the roof height used.
pub fn gen_sloped_roof(
    b: &mut Building,
    top: &Cube,
    height: f32,
    high_side: (usize, bool),
) -> f32 {
    let (d, dir) = high_side;
    let od = 1 - d;
    let h = height.max(TOLERANCE * 10.0);
    let z1 = top.hi.z;
    let (low_e, high_e) = (top.d(d, !dir), top.d(d, dir));

    b.roof_tquads.push(TQuad::quad(
        [
            pt_dim(d, low_e, top.lo[od], z1),
            pt_dim(d, low_e, top.hi[od], z1),
            pt_dim(d, high_e, top.hi[od], z1 + h),
            pt_dim(d, high_e, top.lo[od], z1 + h),
        ],
        TQuadKind::Roof,
    ));
    for e in [top.lo[od], top.hi[od]] {
        b.roof_tquads.push(TQuad::tri(
            pt_dim(d, low_e, e, z1),
            pt_dim(d, high_e, e, z1),
            pt_dim(d, high_e, e, z1 + h),
            TQuadKind::Wall,
        ));
    }
    b.add_roof_to_bcube(top, h);
    h
}

/// Replace a round building's flat roof with a dome or onion when enabled.
pub fn maybe_add_special_roof(b: &mut Building, params: &BuildingParams, rng: &mut GenRng) {
    if !(params.dome_roof || params.onion_roof) || !b.geom.use_cylinder_coll() {
        return;
    }
    if b.roof_type != RoofType::Flat || !rand_chance(rng, 0.5) {
        return;
    }
    let onion = match (params.dome_roof, params.onion_roof) {
        (true, true) => rand_chance(rng, 0.5),
        (_, onion) => onion,
    };
    let top = b.parts[b.real_num_parts - 1];
    let c = top.center();
    let (rx, ry) = (0.5 * top.dx(), 0.5 * top.dy());
    let h = if onion { 1.2 } else { 0.5 } * rx.min(ry);
    let rings = 6usize;
    let segs = b.geom.num_sides.max(8) as usize;

    let profile = |t: f32| -> (f32, f32) {
        if onion {
            let r = (1.0 + 0.5 * (t * std::f32::consts::PI).sin()) * (1.0 - t);
            (r, t)
        } else {
            let a = 0.5 * std::f32::consts::PI * t;
            (a.cos(), a.sin())
        }
    };
    let ring_pt = |ring: usize, seg: usize| -> Vec3 {
        let (r, zt) = profile(ring as f32 / rings as f32);
        let a = std::f32::consts::TAU * seg as f32 / segs as f32;
        Vec3::new(c.x + rx * r * a.cos(), c.y + ry * r * a.sin(), top.hi.z + h * zt)
    };

    b.roof_tquads.retain(|q| q.kind == TQuadKind::ChimneyCap);
    for ring in 0..rings {
        for seg in 0..segs {
            let (p0, p1) = (ring_pt(ring, seg), ring_pt(ring, (seg + 1) % segs));
            let (p2, p3) = (ring_pt(ring + 1, (seg + 1) % segs), ring_pt(ring + 1, seg));
            if ring + 1 == rings {
                b.roof_tquads.push(TQuad::tri(p0, p1, p2, TQuadKind::Roof));
            } else {
                b.roof_tquads
                    .push(TQuad::quad([p0, p1, p2, p3], TQuadKind::Roof));
            }
        }
    }
    b.details.clear();
    b.roof_type = if onion { RoofType::Onion } else { RoofType::Dome };
    b.add_roof_to_bcube(&top, h);
}

// ── Roof details ───────────────────────────────────────────────────────

/// Parts whose top is exposed (no other real part sits directly on it).
fn exposed_roof_parts(b: &Building) -> Vec<usize> {
    let parts = b.real_parts();
    (0..parts.len())
        .filter(|&i| {
            !parts.iter().enumerate().any(|(j, p)| {
                j != i && (p.lo.z - parts[i].hi.z).abs() < TOLERANCE && p.intersects_xy(&parts[i])
            })
        })
        .collect()
}

/// Perimeter walls, access block, antenna and AC units on flat roofs.
pub fn gen_details(b: &mut Building, mat: &BuildingMaterial, rng: &mut GenRng, avoid: &[Cube]) {
    let spacing = b.floor_spacing;
    for pix in exposed_roof_parts(b) {
        let part = b.parts[pix];
        let top_z = part.hi.z;
        let s = part.min_len_xy();
        let mut inner = if b.geom.is_cube() {
            part
        } else {
            // Box inscribed in the round footprint.
            let c = part.center();
            Cube::from_center_half(c, Vec3::new(0.35 * part.dx(), 0.35 * part.dy(), 0.5 * part.dz()))
        };

        if b.geom.is_cube() && rand_chance(rng, 0.5) {
            let wall_h = rand_uniform(rng, 0.04, 0.1) * spacing;
            let wt = 0.015 * s;
            for d in 0..2 {
                for dir in [false, true] {
                    let mut w = part;
                    let e = part.d(d, dir);
                    if dir {
                        w.lo[d] = e - wt;
                    } else {
                        w.hi[d] = e + wt;
                    }
                    w.lo.z = top_z;
                    w.hi.z = top_z + wall_h;
                    b.details.push(RoofObj { cube: w, kind: RoofObjKind::Wall });
                }
            }
            for corner in part.corners_xy(top_z) {
                let cap = Cube::from_center_half(
                    Vec3::new(corner.x, corner.y, top_z + 0.6 * wall_h),
                    Vec3::new(1.5 * wt, 1.5 * wt, 0.6 * wall_h),
                );
                b.details.push(RoofObj { cube: cap, kind: RoofObjKind::ECap });
            }
            inner = inner.expand_by_xy(-wt);
        }

        if rand_chance(rng, 0.6) {
            let sz = Vec3::new(
                (rand_uniform(rng, 0.15, 0.25) * inner.dx()).max(0.3 * spacing),
                (rand_uniform(rng, 0.15, 0.25) * inner.dy()).max(0.3 * spacing),
                0.5 * spacing,
            );
            if let Some(block) = place_roof_detail(b, &inner, top_z, sz, RoofObjKind::Block, avoid, rng) {
                b.roof_tquads.push(TQuad::quad(
                    block.corners_xy(block.hi.z),
                    TQuadKind::RoofAccess,
                ));
                // Thin cap slab on top of the access block.
                let mut cap = block.expand_by_xy(0.02 * spacing);
                cap.lo.z = block.hi.z;
                cap.hi.z = block.hi.z + 0.03 * spacing;
                b.details.push(RoofObj { cube: cap, kind: RoofObjKind::SCap });
            }
        }
        if rand_chance(rng, 0.3) {
            let w = (0.02 * s).max(0.02 * spacing);
            let sz = Vec3::new(w, w, rand_uniform(rng, 0.5, 1.5) * spacing);
            place_roof_detail(b, &inner, top_z, sz, RoofObjKind::Antenna, avoid, rng);
        }

        let by_area = (inner.area_xy() / (4.0 * spacing * spacing)) as u32;
        let num_ac = rand_int(rng, 0, mat.max_ac_units.min(by_area));
        for _ in 0..num_ac {
            let side = rand_uniform(rng, 0.2, 0.35) * spacing;
            let sz = Vec3::new(side, side * rand_uniform(rng, 0.8, 1.5), 0.25 * spacing);
            place_roof_detail(b, &inner, top_z, sz, RoofObjKind::AcUnit, avoid, rng);
        }
    }
}

/// Place one detail box of size `sz` on the roof region `inner`, re-rolling on overlap.
fn place_roof_detail(
    b: &mut Building,
    inner: &Cube,
    top_z: f32,
    sz: Vec3,
    kind: RoofObjKind,
    avoid: &[Cube],
    rng: &mut GenRng,
) -> Option<Cube> {
    if sz.x >= inner.dx() || sz.y >= inner.dy() {
        return None;
    }
    let gap = 0.05 * b.floor_spacing;
    let mut poly = Vec::new();
    if !b.geom.is_cube() {
        b.calc_poly_pts(&b.parts[b.real_num_parts - 1], 0.0, &mut poly);
    }

    for _ in 0..tries::ROOF_DETAIL {
        let x = rand_uniform(rng, inner.lo.x + 0.5 * sz.x, inner.hi.x - 0.5 * sz.x);
        let y = rand_uniform(rng, inner.lo.y + 0.5 * sz.y, inner.hi.y - 0.5 * sz.y);
        let c = Cube::new(
            Vec3::new(x - 0.5 * sz.x, y - 0.5 * sz.y, top_z),
            Vec3::new(x + 0.5 * sz.x, y + 0.5 * sz.y, top_z + sz.z),
        );
        let tc = c.expand_by_xy(gap);
        if b.details.iter().any(|d| d.cube.intersects(&tc)) || avoid.iter().any(|a| a.intersects(&tc)) {
            continue;
        }
        if !poly.is_empty() && !c.corners_xy(top_z).iter().all(|p| point_in_polygon_xy(*p, &poly)) {
            continue;
        }
        b.details.push(RoofObj { cube: c, kind });
        return Some(c);
    }
    None
}

// ── Exterior doors ─────────────────────────────────────────────────────

/// Candidate door box on side (dim, dir) of `part`, centered at `c` along the wall.
fn make_door_cube(b: &Building, part: &Cube, dim: usize, dir: bool, c: f32, w: f32, h: f32) -> Cube {
    let od = 1 - dim;
    let t = 0.5 * proportions::DOOR_THICK * b.floor_spacing;
    let wall = part.d(dim, dir);
    let mut door = *part;
    door.lo[od] = c - 0.5 * w;
    door.hi[od] = c + 0.5 * w;
    door.lo[dim] = wall - t;
    door.hi[dim] = wall + t;
    door.hi.z = part.lo.z + h;
    door
}

/// Door acceptance: exterior face, clear of other doors, walls, stairs and elevators.
fn is_valid_door_pos(b: &Building, part_ix: usize, door: &Cube, dim: usize, dir: bool) -> bool {
    let spacing = b.floor_spacing;
    let part = &b.parts[part_ix];
    let mut out_pt = door.center();
    out_pt[dim] = part.d(dim, dir) + if dir { 0.01 } else { -0.01 } * spacing;
    out_pt.z = door.lo.z + 0.1 * spacing;
    if b.parts
        .iter()
        .enumerate()
        .any(|(i, p)| i != part_ix && p.contains_pt(out_pt))
    {
        return false;
    }
    let spread = door.expand_by_xy(0.25 * spacing);
    if (0..b.doors.len()).any(|i| b.door_cube(i).is_some_and(|dc| dc.intersects(&spread))) {
        return false;
    }
    let Some(int) = b.interior.as_deref() else {
        return true;
    };
    let mut zone = *door;
    if dir {
        zone.lo[dim] -= proportions::DOOR_CLEARANCE * spacing;
    } else {
        zone.hi[dim] += proportions::DOOR_CLEARANCE * spacing;
    }
    zone.expand_in_dim(1 - dim, proportions::WALL_THICK * spacing);
    if int.all_walls().any(|w| w.intersects(&zone)) {
        return false;
    }
    !int.is_blocked_by_stairs_or_elevator(&zone, 0.0)
}

/// Place a door on side (dim, dir) of part `part_ix`.
///
/// Tries the centered position, then jittered positions. When windows are enabled the
/// door is snapped to a window column. With `can_fail == false` a deterministic scan and
/// finally the centered position are used so the door always exists.
#[allow(clippy::too_many_arguments)]
pub fn place_door(
    b: &mut Building,
    params: &BuildingParams,
    part_ix: usize,
    dim: usize,
    dir: bool,
    kind: TQuadKind,
    width_scale: f32,
    can_fail: bool,
    rng: &mut GenRng,
) -> bool {
    let Some(&part) = b.parts.get(part_ix) else {
        return false;
    };
    let spacing = b.floor_spacing;
    let od = 1 - dim;
    let wall_len = part.get_sz_dim(od);
    let margin = 0.1 * spacing;
    let mut w = proportions::DOOR_WIDTH * spacing * width_scale;
    if wall_len < w + 2.0 * margin {
        if can_fail {
            return false;
        }
        w = 0.8 * wall_len;
    }
    let h = proportions::DOOR_HEIGHT * spacing.min(part.dz());
    let lo = part.lo[od] + 0.5 * w + margin.min(0.1 * wall_len);
    let hi = (part.hi[od] - 0.5 * w - margin.min(0.1 * wall_len)).max(lo);
    let col = params.get_material(b.mat_ix).window_col_spacing();
    let snap = params.windows_enabled() && !b.is_house() && col > 0.0;
    let snap_to_col = |c: f32| part.lo[od] + (((c - part.lo[od]) / col).floor() + 0.5) * col;

    for attempt in 0..tries::DOOR {
        let mut c = if attempt == 0 {
            part.center_dim(od)
        } else {
            rand_uniform(rng, lo, hi)
        };
        if snap {
            c = snap_to_col(c);
        }
        if c < lo || c > hi {
            continue;
        }
        let door = make_door_cube(b, &part, dim, dir, c, w, h);
        if is_valid_door_pos(b, part_ix, &door, dim, dir) {
            add_door(b, part_ix, &door, dim, dir, kind);
            return true;
        }
    }
    if can_fail {
        return false;
    }
    let step = if snap { col } else { 0.25 * w };
    let mut c = if snap { snap_to_col(lo) } else { lo };
    while c <= hi {
        if c >= lo {
            let door = make_door_cube(b, &part, dim, dir, c, w, h);
            if is_valid_door_pos(b, part_ix, &door, dim, dir) {
                add_door(b, part_ix, &door, dim, dir, kind);
                return true;
            }
        }
        c += step.max(TOLERANCE);
    }
    let door = make_door_cube(b, &part, dim, dir, part.center_dim(od), w, h);
    add_door(b, part_ix, &door, dim, dir, kind);
    true
}

/// Record an exterior door quad on the outer face of the wall.
pub fn add_door(b: &mut Building, part_ix: usize, door: &Cube, dim: usize, dir: bool, kind: TQuadKind) {
    let od = 1 - dim;
    let plane = b.parts[part_ix].d(dim, dir) + if dir { 0.005 } else { -0.005 } * b.floor_spacing;
    let corner = |a: f32, z: f32| {
        let mut p = Vec3::ZERO;
        p[dim] = plane;
        p[od] = a;
        p.z = z;
        p
    };
    let pts = [
        corner(door.lo[od], door.lo.z),
        corner(door.hi[od], door.lo.z),
        corner(door.hi[od], door.hi.z),
        corner(door.lo[od], door.hi.z),
    ];
    b.doors.push(TQuad::quad(pts, kind));
    b.door_parts.push(part_ix.min(u8::MAX as usize) as u8);
    if part_ix < b.geom.door_sides.len() {
        b.geom.door_sides[part_ix] |= 1 << (2 * dim + usize::from(dir));
    }
}

/// Door on an edge of a non-rectangular footprint; always succeeds.
fn place_poly_door(b: &mut Building, rng: &mut GenRng) {
    let part = b.parts[0];
    let spacing = b.floor_spacing;
    let mut pts = Vec::new();
    b.calc_poly_pts(&part, 0.0, &mut pts);
    let n = pts.len();
    let w = proportions::DOOR_WIDTH * spacing;
    let h = proportions::DOOR_HEIGHT * spacing.min(part.dz());

    let edge_len = |i: usize| (pts[(i + 1) % n] - pts[i]).truncate().length();
    let wide: Vec<usize> = (0..n).filter(|&i| edge_len(i) >= 1.2 * w).collect();
    let e = if wide.is_empty() {
        (0..n).max_by(|&i, &j| edge_len(i).total_cmp(&edge_len(j))).unwrap_or(0)
    } else {
        wide[rand_index(rng, wide.len())]
    };
    let (a, bp) = (pts[e], pts[(e + 1) % n]);
    let len = edge_len(e);
    let dw = w.min(0.9 * len);
    let u = ((bp - a).truncate() / len.max(TOLERANCE)).extend(0.0);
    let mid = 0.5 * (a + bp);
    let mut normal = Vec3::new(u.y, -u.x, 0.0);
    if point_in_polygon_xy(mid + normal * 0.05 * spacing, &pts) {
        normal = -normal;
    }
    let base = mid + normal * 0.005 * spacing;
    let (p0, p1) = (base - u * 0.5 * dw, base + u * 0.5 * dw);
    let quad = TQuad::quad(
        [p0, p1, p1 + Vec3::Z * h, p0 + Vec3::Z * h],
        TQuadKind::BuildingDoor,
    );
    b.doors.push(quad);
    b.door_parts.push(0);
    let dim = usize::from(normal.y.abs() > normal.x.abs());
    let dir = normal[dim] > 0.0;
    b.geom.door_sides[0] |= 1 << (2 * dim + usize::from(dir));
}

/// Side of `part` that touches another part (flush), if any.
fn side_touching_other_part(b: &Building, part_ix: usize, dim: usize, dir: bool) -> bool {
    let part = &b.parts[part_ix];
    let mut p = part.center();
    p[dim] = part.d(dim, dir) + if dir { 0.01 } else { -0.01 };
    p.z = part.lo.z + 0.1 * b.floor_spacing.min(part.dz());
    b.parts.iter().enumerate().any(|(i, o)| i != part_ix && o.contains_pt(p))
}

/// Add exterior doors: every building ends up with at least one on the ground floor.
pub fn gen_building_doors_if_needed(b: &mut Building, params: &BuildingParams, rng: &mut GenRng) {
    if b.parts.is_empty() {
        return;
    }
    let ground = b.ground_z();

    if !b.geom.is_cube() {
        place_poly_door(b, rng);
        return;
    }
    if b.is_house() {
        let first = rand_index(rng, 4);
        'main: for p in 0..b.real_num_parts {
            for n in 0..4 {
                let side = (first + n) % 4;
                if place_door(b, params, p, side >> 1, side & 1 == 1, TQuadKind::HouseDoor, 1.0, true, rng) {
                    break 'main;
                }
            }
        }
        for p in b.real_num_parts..b.parts.len() {
            if is_chimney_part(b, p) {
                continue;
            }
            let is_garage = b.flags & building_flags::HAS_GARAGE != 0;
            let (kind, scale) = if is_garage {
                (TQuadKind::GarageDoor, 1.6)
            } else {
                (TQuadKind::HouseDoor, 0.8)
            };
            // Outward side: opposite the face touching the house.
            for side in 0..4 {
                let (d, dir) = (side >> 1, side & 1 == 1);
                if side_touching_other_part(b, p, d, !dir)
                    && place_door(b, params, p, d, dir, kind, scale, true, rng)
                {
                    break;
                }
            }
        }
    } else {
        for p in 0..b.real_num_parts {
            if (b.parts[p].lo.z - ground).abs() > TOLERANCE {
                continue;
            }
            if p > 0 && !rand_chance(rng, 0.5) {
                continue;
            }
            let first = rand_index(rng, 4);
            for n in 0..4 {
                let side = (first + n) % 4;
                if place_door(b, params, p, side >> 1, side & 1 == 1, TQuadKind::BuildingDoor, 1.0, true, rng) {
                    break;
                }
            }
        }
    }

    if b.doors.iter().any(|d| d.kind != TQuadKind::GarageDoor) {
        return;
    }
    log::warn!(
        "forcing exterior door on building seeds=({}, {})",
        b.seed1,
        b.seed2
    );
    let kind = if b.is_house() {
        TQuadKind::HouseDoor
    } else {
        TQuadKind::BuildingDoor
    };
    let side = (0..4)
        .find(|&s| !side_touching_other_part(b, 0, s >> 1, s & 1 == 1))
        .unwrap_or(0);
    place_door(b, params, 0, side >> 1, side & 1 == 1, kind, 1.0, false, rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::BuildingParams;

    fn office_params() -> BuildingParams {
        let mut params = BuildingParams::default();
        params.cur_mat.house_prob = 0.0;
        params.finalize();
        params
    }

    #[test]
    fn geometry_is_deterministic() {
        let params = BuildingParams::test_params();
        for mat in 0..2 {
            let a = gen_geometry(&params, mat, Vec3::ZERO, 17, 99);
            let b = gen_geometry(&params, mat, Vec3::ZERO, 17, 99);
            assert_eq!(a.parts, b.parts);
            assert_eq!(a.doors, b.doors);
            assert_eq!(a.roof_tquads, b.roof_tquads);
            assert_eq!(a.details, b.details);
        }
    }

    #[test]
    fn parts_are_normalized_and_disjoint() {
        let params = BuildingParams::test_params();
        for seed in 0..40u64 {
            let b = gen_geometry(&params, (seed % 2) as usize, Vec3::ZERO, seed, seed * 7 + 1);
            assert!(b.bcube.is_strictly_normalized());
            for (i, p) in b.parts.iter().enumerate() {
                assert!(p.is_strictly_normalized(), "seed {} part {}", seed, i);
                for q in &b.parts[i + 1..] {
                    assert!(!p.intersects(q), "seed {} overlapping parts", seed);
                }
            }
        }
    }

    #[test]
    fn every_building_gets_an_exterior_door() {
        let params = BuildingParams::test_params();
        for seed in 0..40u64 {
            let b = gen_geometry(&params, (seed % 2) as usize, Vec3::ZERO, seed + 100, seed);
            assert!(!b.doors.is_empty(), "seed {} has no door", seed);
            for i in 0..b.doors.len() {
                assert!(b.door_cube(i).is_some_and(|c| c.is_strictly_normalized()));
            }
        }
    }

    #[test]
    fn peaked_roof_height_clamped() {
        let mut b = Building::new(0, 0, 0, Vec3::ZERO);
        b.floor_spacing = 3.0;
        let top = Cube::from_bounds(0.0, 10.0, 0.0, 4.0, 0.0, 6.0);
        b.parts.push(top);
        b.real_num_parts = 1;
        b.calc_bcube_from_parts();
        let h = gen_peaked_roof(&mut b, &top, 5.0, None);
        assert!((h - 2.0).abs() < 1e-5);
        assert_eq!(b.roof_tquads.len(), 4);
        assert!((b.bcube.hi.z - 8.0).abs() < 1e-5);

        let h2 = gen_peaked_roof(&mut b, &top, 1.0, Some((0, true)));
        assert!((h2 - 1.0).abs() < 1e-5);
        assert_eq!(b.roof_tquads.len(), 7);
    }

    #[test]
    fn hipped_square_is_pyramid() {
        let mut b = Building::new(0, 0, 0, Vec3::ZERO);
        let top = Cube::from_bounds(0.0, 4.0, 0.0, 4.0, 0.0, 3.0);
        gen_hipped_roof(&mut b, &top, 1.0, None);
        assert_eq!(b.roof_tquads.len(), 4);
        assert!(b.roof_tquads.iter().all(|q| q.npts == 3));
    }

    #[test]
    fn floor_snapping_keeps_tiers_stacked() {
        let mut b = Building::new(0, 0, 0, Vec3::ZERO);
        b.floor_spacing = 3.0;
        b.parts.push(Cube::from_bounds(0.0, 10.0, 0.0, 10.0, 0.0, 7.0));
        b.parts.push(Cube::from_bounds(1.0, 9.0, 1.0, 9.0, 7.0, 11.0));
        adjust_part_zvals_for_floor_spacing(&mut b, true, true);
        assert!((b.parts[0].hi.z - 6.0).abs() < 1e-5);
        assert!((b.parts[1].lo.z - 6.0).abs() < 1e-5);
        assert!((b.parts[1].hi.z - 9.0).abs() < 1e-5);
    }

    #[test]
    fn roof_details_do_not_overlap() {
        let params = office_params();
        let mat = params.get_material(0).clone();
        let mut rng = rng_for_seeds(5, 6);
        let mut b = Building::new(0, 5, 6, Vec3::ZERO);
        b.floor_spacing = 3.0;
        b.parts.push(Cube::from_bounds(-15.0, 15.0, -15.0, 15.0, 0.0, 12.0));
        b.real_num_parts = 1;
        let avoid = [Cube::from_bounds(-2.0, 2.0, -2.0, 2.0, 12.0, 14.0)];
        gen_details(&mut b, &mat, &mut rng, &avoid);
        let placed: Vec<&RoofObj> = b
            .details
            .iter()
            .filter(|d| matches!(d.kind, RoofObjKind::AcUnit | RoofObjKind::Antenna | RoofObjKind::Block))
            .collect();
        for (i, d) in placed.iter().enumerate() {
            assert!(d.cube.is_strictly_normalized());
            assert!(!d.cube.intersects(&avoid[0]));
            for o in &placed[i + 1..] {
                assert!(!d.cube.intersects(&o.cube));
            }
        }
    }

    #[test]
    fn special_roof_only_on_round_buildings() {
        let mut params = BuildingParams::default();
        params.dome_roof = true;
        params.cur_mat.round_prob = 1.0;
        params.cur_mat.detail_prob = 0.0;
        params.finalize();
        let mut saw_dome = false;
        for seed in 0..20u64 {
            let b = gen_geometry(&params, 0, Vec3::ZERO, seed, 3);
            assert_eq!(b.geom.num_sides, MAX_CYLIN_SIDES);
            if b.roof_type == RoofType::Dome {
                saw_dome = true;
                assert!(b.bcube.hi.z > b.parts[b.real_num_parts - 1].hi.z);
            }
        }
        assert!(saw_dome);
    }
}
