//! Geometric queries shared by the voxeliser, the navmesh container and the
//! traverse-link generator.
//!
//! Everything here is a pure function over 3-float slices. 2D variants
//! project onto the xy-plane; z is up.

use crate::math::{rad_to_deg, EPS};
use crate::vector::*;

/// Computes the point on triangle `abc` closest to `p`, via barycentric
/// region tests. Handles all vertex, edge and interior cases.
pub fn closest_pt_point_triangle(closest: &mut [f32], p: &[f32], a: &[f32], b: &[f32], c: &[f32]) {
    let mut ab = [0.0f32; 3];
    let mut ac = [0.0f32; 3];
    let mut ap = [0.0f32; 3];
    vsub(&mut ab, b, a);
    vsub(&mut ac, c, a);
    vsub(&mut ap, p, a);

    // Vertex region outside A.
    let d1 = vdot(&ab, &ap);
    let d2 = vdot(&ac, &ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        vcopy(closest, a);
        return;
    }

    // Vertex region outside B.
    let mut bp = [0.0f32; 3];
    vsub(&mut bp, p, b);
    let d3 = vdot(&ab, &bp);
    let d4 = vdot(&ac, &bp);
    if d3 >= 0.0 && d4 <= d3 {
        vcopy(closest, b);
        return;
    }

    // Edge region AB.
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        vmad(closest, a, &ab, v);
        return;
    }

    // Vertex region outside C.
    let mut cp = [0.0f32; 3];
    vsub(&mut cp, p, c);
    let d5 = vdot(&ab, &cp);
    let d6 = vdot(&ac, &cp);
    if d6 >= 0.0 && d5 <= d6 {
        vcopy(closest, c);
        return;
    }

    // Edge region AC.
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        vmad(closest, a, &ac, w);
        return;
    }

    // Edge region BC.
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        closest[0] = b[0] + w * (c[0] - b[0]);
        closest[1] = b[1] + w * (c[1] - b[1]);
        closest[2] = b[2] + w * (c[2] - b[2]);
        return;
    }

    // Interior.
    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    closest[0] = a[0] + ab[0] * v + ac[0] * w;
    closest[1] = a[1] + ab[1] * v + ac[1] * w;
    closest[2] = a[2] + ab[2] * v + ac[2] * w;
}

/// Returns the interpolated z height of triangle `abc` at `p` if `p` lies
/// within the triangle's xy-projection.
pub fn closest_height_point_triangle(p: &[f32], a: &[f32], b: &[f32], c: &[f32]) -> Option<f32> {
    let mut v0 = [0.0f32; 3];
    let mut v1 = [0.0f32; 3];
    let mut v2 = [0.0f32; 3];
    vsub(&mut v0, c, a);
    vsub(&mut v1, b, a);
    vsub(&mut v2, p, a);

    // Scaled barycentric coordinates.
    let mut denom = v0[0] * v1[1] - v0[1] * v1[0];
    if denom.abs() < EPS {
        return None;
    }

    let mut u = v1[1] * v2[0] - v1[0] * v2[1];
    let mut v = v0[0] * v2[1] - v0[1] * v2[0];

    if denom < 0.0 {
        denom = -denom;
        u = -u;
        v = -v;
    }

    if u >= 0.0 && v >= 0.0 && (u + v) <= denom {
        Some(a[2] + (v0[2] * u + v1[2] * v) / denom)
    } else {
        None
    }
}

/// Intersects segment `p0..p1` with a convex polygon on the xy-plane.
/// Returns `(tmin, tmax, seg_min, seg_max)`, or `None` when disjoint.
pub fn intersect_segment_poly_2d(
    p0: &[f32],
    p1: &[f32],
    verts: &[f32],
) -> Option<(f32, f32, i32, i32)> {
    let nverts = verts.len() / 3;
    let mut tmin = 0.0f32;
    let mut tmax = 1.0f32;
    let mut seg_min = -1i32;
    let mut seg_max = -1i32;

    let mut dir = [0.0f32; 3];
    vsub(&mut dir, p1, p0);

    let mut j = nverts - 1;
    for i in 0..nverts {
        let mut edge = [0.0f32; 3];
        let mut diff = [0.0f32; 3];
        vsub(&mut edge, &verts[i * 3..i * 3 + 3], &verts[j * 3..j * 3 + 3]);
        vsub(&mut diff, p0, &verts[j * 3..j * 3 + 3]);
        let n = vperp2d(&edge, &diff);
        let d = vperp2d(&dir, &edge);
        if d.abs() < EPS {
            // Segment nearly parallel to this edge.
            if n < 0.0 {
                return None;
            }
            j = i;
            continue;
        }
        let t = n / d;
        if d < 0.0 {
            // Entering across this edge.
            if t > tmin {
                tmin = t;
                seg_min = j as i32;
                if tmin > tmax {
                    return None;
                }
            }
        } else {
            // Leaving across this edge.
            if t < tmax {
                tmax = t;
                seg_max = j as i32;
                if tmax < tmin {
                    return None;
                }
            }
        }
        j = i;
    }

    Some((tmin, tmax, seg_min, seg_max))
}

/// Slab test of segment `sp..sq` against an AABB. Returns `(tmin, tmax)`
/// clamped to `[0, 1]`, or `None` when disjoint.
pub fn intersect_segment_aabb(
    sp: &[f32],
    sq: &[f32],
    amin: &[f32],
    amax: &[f32],
) -> Option<(f32, f32)> {
    let mut d = [0.0f32; 3];
    vsub(&mut d, sq, sp);
    let mut tmin = 0.0f32;
    let mut tmax = 1.0f32;

    for i in 0..3 {
        if d[i].abs() < EPS {
            // Parallel to the slab; miss unless the origin lies within it.
            if sp[i] < amin[i] || sp[i] > amax[i] {
                return None;
            }
        } else {
            let ood = 1.0 / d[i];
            let mut t1 = (amin[i] - sp[i]) * ood;
            let mut t2 = (amax[i] - sp[i]) * ood;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            tmin = tmin.max(t1);
            tmax = tmax.min(t2);
            if tmin > tmax {
                return None;
            }
        }
    }

    Some((tmin, tmax))
}

/// Intersects segment `sp..sq` against an upright cylinder whose base sits at
/// `position` and extends `height` along +z. Returns `(tmin, tmax)`.
pub fn intersect_segment_cylinder(
    sp: &[f32],
    sq: &[f32],
    position: &[f32],
    radius: f32,
    height: f32,
) -> Option<(f32, f32)> {
    let mut tmin = 0.0f32;
    let mut tmax = 1.0f32;

    let top_z = position[2] + height;

    // Horizontal test against the infinite cylinder.
    let dx = sq[0] - sp[0];
    let dy = sq[1] - sp[1];
    let px = sp[0] - position[0];
    let py = sp[1] - position[1];

    let a = dx * dx + dy * dy;
    let b = 2.0 * (px * dx + py * dy);
    let c = px * px + py * py - radius * radius;

    let mut disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }

    disc = disc.sqrt();
    let mut t0 = (-b - disc) / (2.0 * a);
    let mut t1 = (-b + disc) / (2.0 * a);
    if t0 > t1 {
        std::mem::swap(&mut t0, &mut t1);
    }

    tmin = tmin.max(t0);
    tmax = tmax.min(t1);
    if tmin > tmax {
        return None;
    }

    // Vertical cap test.
    let dz = sq[2] - sp[2];
    if dz != 0.0 {
        let mut t_cap_min = (position[2] - sp[2]) / dz;
        let mut t_cap_max = (top_z - sp[2]) / dz;
        if t_cap_min > t_cap_max {
            std::mem::swap(&mut t_cap_min, &mut t_cap_max);
        }
        tmin = tmin.max(t_cap_min);
        tmax = tmax.min(t_cap_max);
        if tmin > tmax {
            return None;
        }
    }

    let z0 = sp[2] + tmin * dz;
    let z1 = sp[2] + tmax * dz;
    if (z0 < position[2] && z1 < position[2]) || (z0 > top_z && z1 > top_z) {
        return None;
    }

    Some((tmin, tmax))
}

/// Intersects segment `sp..sq` against a convex hull described by an
/// xy-polygon extruded from `hmin` to `hmax`. Returns `(tmin, tmax)`.
pub fn intersect_segment_convex_hull(
    sp: &[f32],
    sq: &[f32],
    verts: &[f32],
    hmin: f32,
    hmax: f32,
) -> Option<(f32, f32)> {
    let (tmin, tmax, _, _) = intersect_segment_poly_2d(sp, sq, verts)?;

    let mut tmin = tmin.max(0.0);
    let mut tmax = tmax.min(1.0);
    if tmin > tmax {
        return None;
    }

    let dz = sq[2] - sp[2];
    if dz != 0.0 {
        let mut t_cap_min = (hmin - sp[2]) / dz;
        let mut t_cap_max = (hmax - sp[2]) / dz;
        if t_cap_min > t_cap_max {
            std::mem::swap(&mut t_cap_min, &mut t_cap_max);
        }
        tmin = tmin.max(t_cap_min);
        tmax = tmax.min(t_cap_max);
        if tmin > tmax {
            return None;
        }
    }

    let z0 = sp[2] + tmin * dz;
    let z1 = sp[2] + tmax * dz;
    if (z0 < hmin && z1 < hmin) || (z0 > hmax && z1 > hmax) {
        return None;
    }

    Some((tmin, tmax))
}

/// Intersects two 2D segments; returns interpolation parameters `(s, t)`
/// along each, or `None` when parallel.
pub fn intersect_seg_seg_2d(ap: &[f32], aq: &[f32], bp: &[f32], bq: &[f32]) -> Option<(f32, f32)> {
    let mut u = [0.0f32; 3];
    let mut v = [0.0f32; 3];
    let mut w = [0.0f32; 3];
    vsub(&mut u, aq, ap);
    vsub(&mut v, bq, bp);
    vsub(&mut w, ap, bp);
    let d = vperp2d(&u, &v);
    if d.abs() < EPS {
        return None;
    }
    Some((vperp2d(&v, &w) / d, vperp2d(&u, &w) / d))
}

/// Squared distance from `pt` to segment `p..q` on the xy-plane, plus the
/// clamped parameter of the closest point.
pub fn dist_pt_seg_sqr_2d(pt: &[f32], p: &[f32], q: &[f32]) -> (f32, f32) {
    let pqx = q[0] - p[0];
    let pqy = q[1] - p[1];
    let mut dx = pt[0] - p[0];
    let mut dy = pt[1] - p[1];
    let d = pqx * pqx + pqy * pqy;
    let mut t = pqx * dx + pqy * dy;
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);
    dx = p[0] + t * pqx - pt[0];
    dy = p[1] + t * pqy - pt[1];
    (dx * dx + dy * dy, t)
}

/// Point-in-polygon on the xy-plane (crossing number). z is ignored.
pub fn point_in_polygon(pt: &[f32], verts: &[f32], nverts: usize) -> bool {
    let mut c = false;
    let mut j = nverts - 1;
    for i in 0..nverts {
        let vi = &verts[i * 3..i * 3 + 3];
        let vj = &verts[j * 3..j * 3 + 3];
        if ((vi[1] > pt[1]) != (vj[1] > pt[1]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[1] - vi[1]) / (vj[1] - vi[1]) + vi[0])
        {
            c = !c;
        }
        j = i;
    }
    c
}

/// Point-in-polygon that also reports the squared distance and parameter of
/// the closest point on every edge. Returns whether `pt` is inside.
pub fn dist_pt_poly_edges_sqr(
    pt: &[f32],
    verts: &[f32],
    nverts: usize,
    ed: &mut [f32],
    et: &mut [f32],
) -> bool {
    let mut c = false;
    let mut j = nverts - 1;
    for i in 0..nverts {
        let vi = &verts[i * 3..i * 3 + 3];
        let vj = &verts[j * 3..j * 3 + 3];
        if ((vi[1] > pt[1]) != (vj[1] > pt[1]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[1] - vi[1]) / (vj[1] - vi[1]) + vi[0])
        {
            c = !c;
        }
        let (d, t) = dist_pt_seg_sqr_2d(pt, vj, vi);
        ed[j] = d;
        et[j] = t;
        j = i;
    }
    c
}

/// Mean of the referenced vertices.
pub fn calc_poly_center(center: &mut [f32], idx: &[u16], verts: &[f32]) {
    center[0] = 0.0;
    center[1] = 0.0;
    center[2] = 0.0;
    for &i in idx {
        let v = &verts[i as usize * 3..i as usize * 3 + 3];
        center[0] += v[0];
        center[1] += v[1];
        center[2] += v[2];
    }
    let s = 1.0 / idx.len() as f32;
    center[0] *= s;
    center[1] *= s;
    center[2] *= s;
}

/// Picks a uniformly distributed point inside a convex polygon.
///
/// Fan-triangulates from the first vertex, selects a sub-triangle by the
/// cumulative area threshold `s * total_area`, then samples it
/// barycentrically with `v = sqrt(t)`. `areas` is scratch of `npts` floats.
pub fn random_point_in_convex_poly(
    pts: &[f32],
    npts: usize,
    areas: &mut [f32],
    s: f32,
    t: f32,
    out: &mut [f32],
) {
    let mut area_sum = 0.0f32;
    for i in 2..npts {
        areas[i] = tri_area2d(&pts[0..3], &pts[i * 3..i * 3 + 3], &pts[(i - 1) * 3..(i - 1) * 3 + 3]);
        area_sum += areas[i].max(0.001);
    }

    // Sub-triangle weighted by area.
    let thr = s * area_sum;
    let mut acc = 0.0f32;
    let mut u = 1.0f32;
    let mut tri = npts - 1;
    for i in 2..npts {
        let dacc = areas[i];
        if thr >= acc && thr < (acc + dacc) {
            u = (thr - acc) / dacc;
            tri = i;
            break;
        }
        acc += dacc;
    }

    let v = t.sqrt();
    let a = 1.0 - v;
    let b = (1.0 - u) * v;
    let c = u * v;
    let pa = &pts[0..3];
    let pb = &pts[tri * 3..tri * 3 + 3];
    let pc = &pts[(tri - 1) * 3..(tri - 1) * 3 + 3];

    out[0] = a * pa[0] + b * pb[0] + c * pc[0];
    out[1] = a * pa[1] + b * pb[1] + c * pc[1];
    out[2] = a * pa[2] + b * pb[2] + c * pc[2];
}

/// Elevation angle in degrees of the vector `v1 -> v2` above its xy
/// projection.
pub fn calc_slope_angle(v1: &[f32], v2: &[f32]) -> f32 {
    let dx = v2[0] - v1[0];
    let dy = v2[1] - v1[1];
    let dz = v2[2] - v1[2];
    let horizontal = (dx * dx + dy * dy).sqrt();
    rad_to_deg(dz.atan2(horizontal))
}

/// Steepest angle in degrees at which line of sight over a ledge of span
/// `ledge_span` still clears an object of `object_height`.
pub fn calc_max_los_angle(ledge_span: f32, object_height: f32) -> f32 {
    rad_to_deg(object_height.atan2(ledge_span))
}

/// How far to push a raycast origin out over a ledge, given the slope between
/// the endpoints and the steepest angle that still has line of sight.
pub fn calc_ledge_span_offset(ledge_span: f32, slope_angle: f32, max_angle: f32) -> f32 {
    let clamped = slope_angle.clamp(0.0, max_angle);
    ledge_span * (clamped / max_angle)
}

/// Left-hand normal of an edge direction on the xy-plane, normalized.
pub fn calc_edge_normal_2d(dir: &[f32], out: &mut [f32]) {
    out[0] = dir[1];
    out[1] = -dir[0];
    out[2] = 0.0;
    vnormalize2d(out);
}

/// Normal of the edge `v1 -> v2` on the xy-plane.
pub fn calc_edge_normal_pt_2d(v1: &[f32], v2: &[f32], out: &mut [f32]) {
    let mut dir = [0.0f32; 3];
    vsub(&mut dir, v2, v1);
    calc_edge_normal_2d(&dir, out);
}

/// Length of the overlap between two edges projected onto `target_edge_vec`.
pub fn calc_edge_overlap_2d(
    edge1_start: &[f32],
    edge1_end: &[f32],
    edge2_start: &[f32],
    edge2_end: &[f32],
    target_edge_vec: &[f32],
) -> f32 {
    let mut min1 = vproj2d(edge1_start, target_edge_vec);
    let mut max1 = vproj2d(edge1_end, target_edge_vec);
    if min1 > max1 {
        std::mem::swap(&mut min1, &mut max1);
    }

    let mut min2 = vproj2d(edge2_start, target_edge_vec);
    let mut max2 = vproj2d(edge2_end, target_edge_vec);
    if min2 > max2 {
        std::mem::swap(&mut min2, &mut max2);
    }

    (max1.min(max2) - min1.max(min2)).max(0.0)
}

/// Parametrises a sub-edge against its parent edge, returning `(tmin, tmax)`.
/// Fails when the winding is inverted (malformed detail boundary).
pub fn calc_sub_edge_area_2d(
    edge_start: &[f32],
    edge_end: &[f32],
    sub_edge_start: &[f32],
    sub_edge_end: &[f32],
) -> Option<(f32, f32)> {
    let edge_len = vdist2d(edge_start, edge_end);
    let tmin = vdist2d(edge_start, sub_edge_start) / edge_len;
    let tmax = vdist2d(edge_start, sub_edge_end) / edge_len;
    if tmin > tmax {
        return None;
    }
    Some((tmin, tmax))
}

const XP: u8 = 1 << 0;
const YP: u8 = 1 << 1;
const XM: u8 = 1 << 2;
const YM: u8 = 1 << 3;

/// Side code for portal matching: no side.
pub const SIDE_NONE: u8 = 0xff;

/// Classifies which of the 8 compass sides of an AABB the point lies outside
/// of, or [`SIDE_NONE`] when the point is not outside. The tile grid runs x
/// towards decreasing world x, so side 0 faces the negative-x half-space.
pub fn classify_point_outside_bounds(pt: &[f32], bmin: &[f32], bmax: &[f32]) -> u8 {
    let mut outcode = 0u8;
    if pt[0] >= bmax[0] {
        outcode |= XM;
    }
    if pt[1] >= bmax[1] {
        outcode |= YP;
    }
    if pt[0] < bmin[0] {
        outcode |= XP;
    }
    if pt[1] < bmin[1] {
        outcode |= YM;
    }

    match outcode {
        x if x == XP => 0,
        x if x == XP | YP => 1,
        x if x == YP => 2,
        x if x == XM | YP => 3,
        x if x == XM => 4,
        x if x == XM | YM => 5,
        x if x == YM => 6,
        x if x == XP | YM => 7,
        _ => SIDE_NONE,
    }
}

/// Side code for a point inside the AABB, derived by pushing it out of the
/// box along the direction from the box centre.
pub fn classify_point_inside_bounds(pt: &[f32], bmin: &[f32], bmax: &[f32]) -> u8 {
    let center = [(bmin[0] + bmax[0]) * 0.5, (bmin[1] + bmax[1]) * 0.5];
    let mut dir = [pt[0] - center[0], pt[1] - center[1]];
    let box_size = [bmax[0] - bmin[0], bmax[1] - bmin[1]];

    let len = (dir[0] * dir[0] + dir[1] * dir[1]).sqrt();
    if len > EPS {
        dir[0] /= len;
        dir[1] /= len;
    }

    let new_pt = [
        center[0] + dir[0] * box_size[0],
        center[1] + dir[1] * box_size[1],
        0.0,
    ];
    classify_point_outside_bounds(&new_pt, bmin, bmax)
}

/// Side code of a direction vector relative to an AABB.
pub fn classify_direction(dir: &[f32], bmin: &[f32], bmax: &[f32]) -> u8 {
    let len = (dir[0] * dir[0] + dir[1] * dir[1]).sqrt();
    let mut dir_norm = [0.0f32, 0.0];
    if len > EPS {
        dir_norm[0] = dir[0] / len;
        dir_norm[1] = dir[1] / len;
    }

    let center = [(bmin[0] + bmax[0]) * 0.5, (bmin[1] + bmax[1]) * 0.5];
    let box_size = [bmax[0] - bmin[0], bmax[1] - bmin[1]];

    let new_pt = [
        center[0] + dir_norm[0] * box_size[0],
        center[1] + dir_norm[1] * box_size[1],
        0.0,
    ];
    classify_point_outside_bounds(&new_pt, bmin, bmax)
}

/// Separating-axis overlap test of two convex polygons on the xy-plane.
pub fn overlap_poly_poly_2d(polya: &[f32], npolya: usize, polyb: &[f32], npolyb: usize) -> bool {
    const SAT_EPS: f32 = 1e-4;

    for (poly, n) in [(polya, npolya), (polyb, npolyb)] {
        let mut j = n - 1;
        for i in 0..n {
            let va = &poly[j * 3..j * 3 + 3];
            let vb = &poly[i * 3..i * 3 + 3];
            let axis = [vb[1] - va[1], -(vb[0] - va[0]), 0.0];

            let (amin, amax) = project_poly(&axis, polya, npolya);
            let (bmin, bmax) = project_poly(&axis, polyb, npolyb);
            if !crate::math::overlap_range(amin, amax, bmin, bmax, SAT_EPS) {
                return false;
            }
            j = i;
        }
    }
    true
}

fn project_poly(axis: &[f32], poly: &[f32], npoly: usize) -> (f32, f32) {
    let mut rmin = vdot2d(axis, &poly[0..3]);
    let mut rmax = rmin;
    for i in 1..npoly {
        let d = vdot2d(axis, &poly[i * 3..i * 3 + 3]);
        rmin = rmin.min(d);
        rmax = rmax.max(d);
    }
    (rmin, rmax)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_pt_triangle_regions() {
        let a = [0.0, 0.0, 0.0];
        let b = [2.0, 0.0, 0.0];
        let c = [0.0, 2.0, 0.0];
        let mut out = [0.0f32; 3];

        // Interior point projects onto the triangle plane.
        closest_pt_point_triangle(&mut out, &[0.5, 0.5, 1.0], &a, &b, &c);
        assert_eq!(out, [0.5, 0.5, 0.0]);

        // Outside vertex A.
        closest_pt_point_triangle(&mut out, &[-1.0, -1.0, 0.0], &a, &b, &c);
        assert_eq!(out, a);

        // Outside edge AB.
        closest_pt_point_triangle(&mut out, &[1.0, -1.0, 0.0], &a, &b, &c);
        assert_eq!(out, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_intersect_segment_aabb() {
        let hit = intersect_segment_aabb(
            &[-1.0, 0.5, 0.5],
            &[2.0, 0.5, 0.5],
            &[0.0, 0.0, 0.0],
            &[1.0, 1.0, 1.0],
        );
        let (tmin, tmax) = hit.unwrap();
        assert!((tmin - 1.0 / 3.0).abs() < 1e-5);
        assert!((tmax - 2.0 / 3.0).abs() < 1e-5);

        let miss = intersect_segment_aabb(
            &[-1.0, 2.0, 0.5],
            &[2.0, 2.0, 0.5],
            &[0.0, 0.0, 0.0],
            &[1.0, 1.0, 1.0],
        );
        assert!(miss.is_none());
    }

    #[test]
    fn test_intersect_segment_cylinder() {
        let hit = intersect_segment_cylinder(
            &[-2.0, 0.0, 1.0],
            &[2.0, 0.0, 1.0],
            &[0.0, 0.0, 0.0],
            1.0,
            2.0,
        );
        assert!(hit.is_some());

        // Above the cap.
        let miss = intersect_segment_cylinder(
            &[-2.0, 0.0, 3.0],
            &[2.0, 0.0, 3.0],
            &[0.0, 0.0, 0.0],
            1.0,
            2.0,
        );
        assert!(miss.is_none());
    }

    #[test]
    fn test_slope_angle() {
        // 45 degree rise.
        let angle = calc_slope_angle(&[0.0, 0.0, 0.0], &[1.0, 0.0, 1.0]);
        assert!((angle - 45.0).abs() < 1e-4);

        // Flat.
        let flat = calc_slope_angle(&[0.0, 0.0, 0.0], &[1.0, 1.0, 0.0]);
        assert_eq!(flat, 0.0);
    }

    #[test]
    fn test_max_los_angle_and_offset() {
        let max_angle = calc_max_los_angle(1.0, 1.0);
        assert!((max_angle - 45.0).abs() < 1e-4);

        // At the max angle the full ledge span is applied.
        let offset = calc_ledge_span_offset(10.0, 45.0, max_angle);
        assert!((offset - 10.0).abs() < 1e-4);

        // Half the angle, half the span.
        let half = calc_ledge_span_offset(10.0, 22.5, max_angle);
        assert!((half - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_classify_point_outside_bounds() {
        let bmin = [0.0, 0.0, 0.0];
        let bmax = [10.0, 10.0, 10.0];

        // The x axis of the side code is mirrored: below bmin.x is side 0.
        assert_eq!(classify_point_outside_bounds(&[-1.0, 5.0, 0.0], &bmin, &bmax), 0);
        assert_eq!(classify_point_outside_bounds(&[11.0, 5.0, 0.0], &bmin, &bmax), 4);
        assert_eq!(classify_point_outside_bounds(&[5.0, 11.0, 0.0], &bmin, &bmax), 2);
        assert_eq!(classify_point_outside_bounds(&[5.0, -1.0, 0.0], &bmin, &bmax), 6);
        assert_eq!(classify_point_outside_bounds(&[-1.0, 11.0, 0.0], &bmin, &bmax), 1);
        // Inside the box there is no side.
        assert_eq!(
            classify_point_outside_bounds(&[5.0, 5.0, 5.0], &bmin, &bmax),
            SIDE_NONE
        );
    }

    #[test]
    fn test_classify_point_inside_bounds() {
        let bmin = [0.0, 0.0, 0.0];
        let bmax = [10.0, 10.0, 10.0];

        // A point hugging the low-x edge classifies to the same side an
        // outside point beyond that edge would.
        let side = classify_point_inside_bounds(&[0.5, 5.0, 0.0], &bmin, &bmax);
        assert_eq!(side, 0);
        let side = classify_point_inside_bounds(&[5.0, 9.5, 0.0], &bmin, &bmax);
        assert_eq!(side, 2);
    }

    #[test]
    fn test_point_in_polygon() {
        let quad = [0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 4.0, 4.0, 0.0, 0.0, 4.0, 0.0];
        assert!(point_in_polygon(&[2.0, 2.0, 0.0], &quad, 4));
        assert!(!point_in_polygon(&[5.0, 2.0, 0.0], &quad, 4));
    }

    #[test]
    fn test_random_point_in_convex_poly() {
        let quad = [0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 4.0, 4.0, 0.0, 0.0, 4.0, 0.0];
        let mut areas = [0.0f32; 4];
        let mut out = [0.0f32; 3];
        for (s, t) in [(0.1, 0.2), (0.5, 0.5), (0.9, 0.9), (0.0, 0.0)] {
            random_point_in_convex_poly(&quad, 4, &mut areas, s, t, &mut out);
            assert!(point_in_polygon(&out, &quad, 4) || out[0].abs() < 1e-5 || out[1].abs() < 1e-5);
        }
    }

    #[test]
    fn test_overlap_poly_poly_2d() {
        let a = [0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 4.0, 4.0, 0.0, 0.0, 4.0, 0.0];
        let b = [2.0, 2.0, 0.0, 6.0, 2.0, 0.0, 6.0, 6.0, 0.0, 2.0, 6.0, 0.0];
        let c = [5.0, 5.0, 0.0, 9.0, 5.0, 0.0, 9.0, 9.0, 0.0, 5.0, 9.0, 0.0];
        assert!(overlap_poly_poly_2d(&a, 4, &b, 4));
        assert!(!overlap_poly_poly_2d(&a, 4, &c, 4));
    }
}
