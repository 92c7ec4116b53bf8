//! Per-polygon height detail.
//!
//! Each polygon is re-sampled against the compact heightfield: edges are
//! subdivided, interior points are sampled on a grid, and samples whose
//! height error exceeds the configured tolerance are folded into a Delaunay
//! triangulation of the polygon.

use crate::compact::CompactHeightfield;
use crate::polymesh::{PolyMesh, MESH_NULL_IDX};
use tilenav_common::{vdist_sqr, Result};

/// Per-polygon triangulated height detail.
///
/// `meshes` holds 4 u32 per polygon: vertex base, vertex count, triangle
/// base, triangle count. `tris` holds 4 bytes per triangle: three local
/// vertex indices plus an edge-flag byte (2 bits per edge, set when the edge
/// lies on the polygon hull).
#[derive(Debug, Default)]
pub struct PolyMeshDetail {
    pub meshes: Vec<u32>,
    pub verts: Vec<f32>,
    pub tris: Vec<u8>,
}

const UNSET_HEIGHT: u16 = 0xffff;
const MAX_VERTS: usize = 127;
const MAX_VERTS_PER_EDGE: usize = 32;

/// Height lookup over one polygon's footprint.
struct HeightPatch {
    data: Vec<u16>,
    xmin: i32,
    ymin: i32,
    width: i32,
    height: i32,
}

impl HeightPatch {
    fn get(&self, x: i32, y: i32) -> u16 {
        let cx = (x - self.xmin).clamp(0, self.width - 1);
        let cy = (y - self.ymin).clamp(0, self.height - 1);
        self.data[(cy * self.width + cx) as usize]
    }
}

impl PolyMeshDetail {
    /// Number of sub-meshes.
    pub fn nmeshes(&self) -> usize {
        self.meshes.len() / 4
    }

    /// Builds height detail for every polygon of `mesh`.
    pub fn build(
        mesh: &PolyMesh,
        chf: &CompactHeightfield,
        sample_dist: f32,
        sample_max_error: f32,
    ) -> Result<Self> {
        let mut dmesh = PolyMeshDetail::default();
        if mesh.nverts() == 0 || mesh.npolys() == 0 {
            return Ok(dmesh);
        }

        let nvp = mesh.nvp;
        let cs = mesh.cs;
        let ch = mesh.ch;
        let orig = mesh.bmin;
        let border_size = mesh.border_size;

        let mut poly_verts = [0.0f32; 6 * 3];
        let mut hp = HeightPatch {
            data: Vec::new(),
            xmin: 0,
            ymin: 0,
            width: 0,
            height: 0,
        };

        for i in 0..mesh.npolys() {
            let p = &mesh.polys[i * nvp * 2..i * nvp * 2 + nvp];

            // World-space polygon vertices.
            let mut npoly = 0usize;
            for &vi in p.iter().take(nvp) {
                if vi == MESH_NULL_IDX {
                    break;
                }
                let v = &mesh.verts[vi as usize * 3..vi as usize * 3 + 3];
                poly_verts[npoly * 3] = v[0] as f32 * cs;
                poly_verts[npoly * 3 + 1] = v[1] as f32 * cs;
                poly_verts[npoly * 3 + 2] = v[2] as f32 * ch;
                npoly += 1;
            }

            // Height patch covering the polygon footprint.
            let mut xmin = i32::MAX;
            let mut ymin = i32::MAX;
            let mut xmax = i32::MIN;
            let mut ymax = i32::MIN;
            for &vi in p.iter().take(npoly) {
                let v = &mesh.verts[vi as usize * 3..vi as usize * 3 + 3];
                xmin = xmin.min(v[0] as i32);
                ymin = ymin.min(v[1] as i32);
                xmax = xmax.max(v[0] as i32);
                ymax = ymax.max(v[1] as i32);
            }
            xmin -= 1;
            ymin -= 1;
            xmax += 1;
            ymax += 1;
            hp.xmin = xmin;
            hp.ymin = ymin;
            hp.width = xmax - xmin;
            hp.height = ymax - ymin;
            hp.data.clear();
            hp.data.resize((hp.width * hp.height) as usize, UNSET_HEIGHT);
            fill_height_patch(chf, border_size, mesh.regs[i], &mut hp);

            let (verts, tris) = build_poly_detail(
                &poly_verts[..npoly * 3],
                sample_dist,
                sample_max_error,
                chf,
                &hp,
            );

            // Offset into tile space and store.
            let vert_base = dmesh.verts.len() as u32 / 3;
            let tri_base = dmesh.tris.len() as u32 / 4;
            let nverts = verts.len() / 3;

            for v in verts.chunks_exact(3) {
                dmesh.verts.push(v[0] + orig[0]);
                dmesh.verts.push(v[1] + orig[1]);
                dmesh.verts.push(v[2] + orig[2]);
            }
            dmesh.tris.extend_from_slice(&tris);

            dmesh.meshes.push(vert_base);
            dmesh.meshes.push(nverts as u32);
            dmesh.meshes.push(tri_base);
            dmesh.meshes.push((tris.len() / 4) as u32);
        }

        Ok(dmesh)
    }
}

/// Populates the patch with floor heights of spans in `region`, falling back
/// to the nearest span when a cell holds none from the region.
fn fill_height_patch(chf: &CompactHeightfield, border_size: i32, region: u16, hp: &mut HeightPatch) {
    for hy in 0..hp.height {
        for hx in 0..hp.width {
            let x = hp.xmin + hx + border_size;
            let y = hp.ymin + hy + border_size;
            if x < 0 || y < 0 || x >= chf.width || y >= chf.height {
                continue;
            }
            let cell = chf.cell(x, y);

            // Prefer a span of the polygon's own region.
            let mut best = UNSET_HEIGHT;
            for s in cell.index as usize..(cell.index + cell.count) as usize {
                if chf.spans[s].reg == region {
                    best = chf.spans[s].z;
                    break;
                }
            }
            if best == UNSET_HEIGHT {
                // Any walkable span, closest to the region spans nearby.
                for s in cell.index as usize..(cell.index + cell.count) as usize {
                    if chf.areas[s] != crate::heightfield::NULL_AREA {
                        best = chf.spans[s].z;
                    }
                }
            }
            hp.data[(hy * hp.width + hx) as usize] = best;
        }
    }
}

/// Looks up the detail height at a world-space point via the patch, searching
/// outward when the exact cell is unset.
fn get_height(fx: f32, fy: f32, fz: f32, ics: f32, ch: f32, hp: &HeightPatch) -> f32 {
    let ix = ((fx * ics + 0.01) as i32).clamp(hp.xmin, hp.xmin + hp.width - 1);
    let iy = ((fy * ics + 0.01) as i32).clamp(hp.ymin, hp.ymin + hp.height - 1);
    let mut h = hp.get(ix, iy);

    if h == UNSET_HEIGHT {
        // Spiral outward until something is set.
        'search: for radius in 1..=8i32 {
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx.abs() != radius && dy.abs() != radius {
                        continue;
                    }
                    let nh = hp.get(ix + dx, iy + dy);
                    if nh != UNSET_HEIGHT {
                        h = nh;
                        break 'search;
                    }
                }
            }
        }
    }

    if h == UNSET_HEIGHT {
        return fz;
    }
    h as f32 * ch
}

/// Builds the detail vertices and triangles for a single polygon.
fn build_poly_detail(
    in_verts: &[f32],
    sample_dist: f32,
    sample_max_error: f32,
    chf: &CompactHeightfield,
    hp: &HeightPatch,
) -> (Vec<f32>, Vec<u8>) {
    let nin = in_verts.len() / 3;
    let cs = chf.cs;
    let ics = 1.0 / cs;
    let ch = chf.ch;

    let mut verts: Vec<f32> = in_verts.to_vec();
    let mut hull: Vec<usize> = Vec::with_capacity(MAX_VERTS);

    // Sample the polygon edges.
    if sample_dist > 0.0 {
        let mut edge = [0.0f32; (MAX_VERTS_PER_EDGE + 1) * 3];

        let mut j = nin - 1;
        for i in 0..nin {
            let vj = &in_verts[j * 3..j * 3 + 3];
            let vi = &in_verts[i * 3..i * 3 + 3];

            let dx = vi[0] - vj[0];
            let dy = vi[1] - vj[1];
            let d = (dx * dx + dy * dy).sqrt();
            let mut nn = (1 + (d / sample_dist).floor() as usize).min(MAX_VERTS_PER_EDGE - 1);
            if verts.len() / 3 + nn >= MAX_VERTS {
                nn = MAX_VERTS.saturating_sub(1 + verts.len() / 3);
            }
            if nn == 0 {
                hull.push(j);
                j = i;
                continue;
            }

            for k in 0..=nn {
                let u = k as f32 / nn as f32;
                let px = vj[0] + dx * u;
                let py = vj[1] + dy * u;
                let pz = vj[2] + (vi[2] - vj[2]) * u;
                edge[k * 3] = px;
                edge[k * 3 + 1] = py;
                edge[k * 3 + 2] = get_height(px, py, pz, ics, ch, hp);
            }

            // Simplify the sampled edge against the height tolerance.
            let mut idx = [0usize; MAX_VERTS_PER_EDGE];
            idx[0] = 0;
            idx[1] = nn;
            let mut nidx = 2usize;
            let mut k = 0usize;
            while k < nidx - 1 {
                let a = idx[k];
                let b = idx[k + 1];
                let va = &edge[a * 3..a * 3 + 3];
                let vb = &edge[b * 3..b * 3 + 3];
                // Most deviating sample along the segment.
                let mut maxd = 0.0f32;
                let mut maxi = usize::MAX;
                for m in a + 1..b {
                    let d = dist_pt_seg(&edge[m * 3..m * 3 + 3], va, vb);
                    if d > maxd {
                        maxd = d;
                        maxi = m;
                    }
                }
                if maxi != usize::MAX && maxd > sample_max_error * sample_max_error {
                    for m in (k + 1..nidx).rev() {
                        idx[m + 1] = idx[m];
                    }
                    idx[k + 1] = maxi;
                    nidx += 1;
                } else {
                    k += 1;
                }
            }

            hull.push(j);
            // Interior edge samples join the hull in edge order.
            for m in 1..nidx - 1 {
                hull.push(verts.len() / 3);
                let v = [edge[idx[m] * 3], edge[idx[m] * 3 + 1], edge[idx[m] * 3 + 2]];
                verts.extend_from_slice(&v);
            }

            j = i;
        }
    } else {
        for i in 0..nin {
            hull.push(i);
        }
    }

    if hull.is_empty() {
        for i in 0..nin {
            hull.push(i);
        }
    }

    // Initial triangulation over the hull.
    let mut tris: Vec<u8> = Vec::new();
    triangulate_hull(&verts, &hull, nin, &mut tris);
    if tris.is_empty() {
        return (verts, tris);
    }

    // Interior grid sampling.
    if sample_dist > 0.0 {
        let mut bmin = [in_verts[0], in_verts[1], in_verts[2]];
        let mut bmax = bmin;
        for v in in_verts.chunks_exact(3).skip(1) {
            tilenav_common::vmin(&mut bmin, v);
            tilenav_common::vmax(&mut bmax, v);
        }
        let x0 = (bmin[0] / sample_dist).floor() as i32;
        let x1 = (bmax[0] / sample_dist).ceil() as i32;
        let y0 = (bmin[1] / sample_dist).floor() as i32;
        let y1 = (bmax[1] / sample_dist).ceil() as i32;

        let mut samples: Vec<[f32; 3]> = Vec::new();
        for y in y0..y1 {
            for x in x0..x1 {
                let pt = [x as f32 * sample_dist, y as f32 * sample_dist, 0.0];
                // Keep samples solidly inside the polygon.
                if dist_to_poly(&pt, in_verts, nin) > -sample_dist / 2.0 {
                    continue;
                }
                let z = get_height(pt[0], pt[1], (bmin[2] + bmax[2]) * 0.5, ics, ch, hp);
                samples.push([pt[0], pt[1], z]);
            }
        }

        let mut used = vec![false; samples.len()];
        for _ in 0..samples.len() {
            if verts.len() / 3 >= MAX_VERTS {
                break;
            }
            // Add the sample with the largest height error.
            let mut best = usize::MAX;
            let mut best_d = 0.0f32;
            for (si, s) in samples.iter().enumerate() {
                if used[si] {
                    continue;
                }
                let d = dist_to_tri_mesh(s, &verts, &tris);
                if d > best_d {
                    best_d = d;
                    best = si;
                }
            }
            if best == usize::MAX || best_d <= sample_max_error {
                break;
            }
            used[best] = true;
            verts.extend_from_slice(&samples[best]);

            // Re-triangulate with the new vertex folded in.
            tris.clear();
            delaunay_hull(&verts, &hull, &mut tris);
        }
    }

    // Cap triangle count to what the sub-mesh header can carry.
    if tris.len() / 4 > 255 {
        tris.truncate(255 * 4);
    }

    (verts, tris)
}

/// Fan-triangulates the hull starting from the ear with the shortest
/// diagonal, then alternates advancing either end.
fn triangulate_hull(verts: &[f32], hull: &[usize], nin: usize, tris: &mut Vec<u8>) {
    let nhull = hull.len();
    if nhull < 3 {
        return;
    }

    let mut start = 0usize;
    let mut left = 1usize;
    let mut right = nhull - 1;

    // Start from the ear with the shortest perimeter addition, preferring
    // original polygon vertices.
    let mut dmin = f32::MAX;
    for i in 0..nhull {
        if hull[i] >= nin {
            continue;
        }
        let pi = hull[(i + nhull - 1) % nhull];
        let ni = hull[(i + 1) % nhull];
        let pv = &verts[pi * 3..pi * 3 + 3];
        let cv = &verts[hull[i] * 3..hull[i] * 3 + 3];
        let nv = &verts[ni * 3..ni * 3 + 3];
        let d = dist2d(pv, cv) + dist2d(cv, nv) + dist2d(nv, pv);
        if d < dmin {
            start = i;
            left = (i + 1) % nhull;
            right = (i + nhull - 1) % nhull;
            dmin = d;
        }
    }

    tris.push(hull[start] as u8);
    tris.push(hull[left] as u8);
    tris.push(hull[right] as u8);
    tris.push(0);

    // Advance the cheaper side until the ends meet.
    while (left + 1) % nhull != right {
        let nleft = (left + 1) % nhull;
        let nright = (right + nhull - 1) % nhull;

        let cvleft = &verts[hull[left] * 3..hull[left] * 3 + 3];
        let nvleft = &verts[hull[nleft] * 3..hull[nleft] * 3 + 3];
        let cvright = &verts[hull[right] * 3..hull[right] * 3 + 3];
        let nvright = &verts[hull[nright] * 3..hull[nright] * 3 + 3];

        let dleft = dist2d(cvleft, nvleft) + dist2d(nvleft, cvright);
        let dright = dist2d(cvright, nvright) + dist2d(cvleft, nvright);

        if dleft < dright {
            tris.push(hull[left] as u8);
            tris.push(hull[nleft] as u8);
            tris.push(hull[right] as u8);
            tris.push(0);
            left = nleft;
        } else {
            tris.push(hull[left] as u8);
            tris.push(hull[nright] as u8);
            tris.push(hull[right] as u8);
            tris.push(0);
            right = nright;
        }
    }

    set_tri_flags(verts, hull, tris);
}

/// Incremental Delaunay triangulation constrained to the hull boundary.
fn delaunay_hull(verts: &[f32], hull: &[usize], tris: &mut Vec<u8>) {
    let npts = verts.len() / 3;
    let nhull = hull.len();

    // Edge list: (a, b, left face, right face).
    const UNDEF: i32 = -2;
    const HULLF: i32 = -1;
    let mut edges: Vec<[i32; 4]> = Vec::with_capacity(npts * 10);

    let mut j = nhull - 1;
    for i in 0..nhull {
        edges.push([hull[j] as i32, hull[i] as i32, HULLF, UNDEF]);
        j = i;
    }

    let mut nfaces = 0i32;
    let mut e = 0usize;
    while e < edges.len() {
        if edges[e][3] == UNDEF {
            complete_facet(verts, npts, &mut edges, e, &mut nfaces);
        }
        if edges[e][2] == UNDEF {
            complete_facet(verts, npts, &mut edges, e, &mut nfaces);
        }
        e += 1;
    }

    // Collect faces into triangles.
    let mut face_tris = vec![[-1i32; 3]; nfaces as usize];
    for edge in &edges {
        if edge[3] >= 0 {
            let t = &mut face_tris[edge[3] as usize];
            if t[0] == -1 {
                t[0] = edge[0];
                t[1] = edge[1];
            } else if t[0] == edge[1] {
                t[2] = edge[0];
            } else if t[1] == edge[0] {
                t[2] = edge[1];
            }
        }
        if edge[2] >= 0 {
            let t = &mut face_tris[edge[2] as usize];
            if t[0] == -1 {
                t[0] = edge[1];
                t[1] = edge[0];
            } else if t[0] == edge[0] {
                t[2] = edge[1];
            } else if t[1] == edge[1] {
                t[2] = edge[0];
            }
        }
    }

    tris.clear();
    for t in face_tris {
        if t[0] >= 0 && t[1] >= 0 && t[2] >= 0 {
            tris.push(t[0] as u8);
            tris.push(t[1] as u8);
            tris.push(t[2] as u8);
            tris.push(0);
        }
    }

    set_tri_flags(verts, hull, tris);
}

/// Grows a Delaunay face from edge `e` by the point minimizing the
/// circumcircle.
fn complete_facet(verts: &[f32], npts: usize, edges: &mut Vec<[i32; 4]>, e: usize, nfaces: &mut i32) {
    const UNDEF: i32 = -2;
    const EPS: f32 = 1e-5;

    let edge = edges[e];
    // Cache the edge endpoints oriented so the open face is on the left.
    let (s, t) = if edge[3] == UNDEF {
        (edge[0], edge[1])
    } else if edge[2] == UNDEF {
        (edge[1], edge[0])
    } else {
        return;
    };

    let vs = &verts[s as usize * 3..s as usize * 3 + 3];
    let vt = &verts[t as usize * 3..t as usize * 3 + 3];

    // Best point to the left of the edge by circumcircle test.
    let mut pt = npts;
    let mut c = [0.0f32; 3];
    let mut r = -1.0f32;
    for u in 0..npts {
        if u as i32 == s || u as i32 == t {
            continue;
        }
        let vu = &verts[u * 3..u * 3 + 3];
        if cross2(vs, vt, vu) > EPS {
            if r < 0.0 {
                pt = u;
                circum_circle(vs, vt, vu, &mut c, &mut r);
                continue;
            }
            let d = dist2d(&c, vu);
            let tol = 0.001f32;
            if d > r * (1.0 + tol) {
                // Outside the current circumcircle.
                continue;
            }
            // Inside: accept unless it would cross existing edges.
            if overlap_edges(verts, edges, s, u as i32) || overlap_edges(verts, edges, t, u as i32) {
                continue;
            }
            pt = u;
            circum_circle(vs, vt, vu, &mut c, &mut r);
        }
    }

    if pt < npts {
        // Create or update the face.
        let face = *nfaces;
        *nfaces += 1;

        update_left_face(&mut edges[e], s, t, face);

        if let Some(ei) = find_edge(edges, pt as i32, s) {
            update_left_face(&mut edges[ei], pt as i32, s, face);
        } else {
            edges.push([pt as i32, s, face, UNDEF]);
        }
        if let Some(ei) = find_edge(edges, t, pt as i32) {
            update_left_face(&mut edges[ei], t, pt as i32, face);
        } else {
            edges.push([t, pt as i32, face, UNDEF]);
        }
    } else {
        update_left_face(&mut edges[e], s, t, -1);
    }
}

fn update_left_face(edge: &mut [i32; 4], s: i32, t: i32, f: i32) {
    if edge[0] == s && edge[1] == t && edge[2] == -2 {
        edge[2] = f;
    } else if edge[1] == s && edge[0] == t && edge[3] == -2 {
        edge[3] = f;
    }
}

fn find_edge(edges: &[[i32; 4]], s: i32, t: i32) -> Option<usize> {
    edges
        .iter()
        .position(|e| (e[0] == s && e[1] == t) || (e[0] == t && e[1] == s))
}

fn overlap_edges(verts: &[f32], edges: &[[i32; 4]], s1: i32, t1: i32) -> bool {
    for e in edges {
        let (s0, t0) = (e[0], e[1]);
        if s0 == s1 || s0 == t1 || t0 == s1 || t0 == t1 {
            continue;
        }
        if seg_seg_overlap_2d(
            &verts[s0 as usize * 3..],
            &verts[t0 as usize * 3..],
            &verts[s1 as usize * 3..],
            &verts[t1 as usize * 3..],
        ) {
            return true;
        }
    }
    false
}

fn seg_seg_overlap_2d(a: &[f32], b: &[f32], c: &[f32], d: &[f32]) -> bool {
    let a1 = cross2(a, b, d);
    let a2 = cross2(a, b, c);
    if a1 * a2 < 0.0 {
        let a3 = cross2(c, d, a);
        let a4 = a3 + a2 - a1;
        if a3 * a4 < 0.0 {
            return true;
        }
    }
    false
}

fn cross2(p1: &[f32], p2: &[f32], p3: &[f32]) -> f32 {
    let u1 = p2[0] - p1[0];
    let v1 = p2[1] - p1[1];
    let u2 = p3[0] - p1[0];
    let v2 = p3[1] - p1[1];
    u1 * v2 - v1 * u2
}

fn circum_circle(p1: &[f32], p2: &[f32], p3: &[f32], c: &mut [f32; 3], r: &mut f32) {
    const EPS: f32 = 1e-6;
    let cp = cross2(p1, p2, p3);
    if cp.abs() > EPS {
        let p1sq = p1[0] * p1[0] + p1[1] * p1[1];
        let p2sq = p2[0] * p2[0] + p2[1] * p2[1];
        let p3sq = p3[0] * p3[0] + p3[1] * p3[1];
        c[0] = (p1sq * (p2[1] - p3[1]) + p2sq * (p3[1] - p1[1]) + p3sq * (p1[1] - p2[1]))
            / (2.0 * cp);
        c[1] = (p1sq * (p3[0] - p2[0]) + p2sq * (p1[0] - p3[0]) + p3sq * (p2[0] - p1[0]))
            / (2.0 * cp);
        c[2] = 0.0;
        *r = dist2d(c, p1);
    } else {
        c[0] = p1[0];
        c[1] = p1[1];
        c[2] = 0.0;
        *r = 0.0;
    }
}

fn dist2d(a: &[f32], b: &[f32]) -> f32 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    (dx * dx + dy * dy).sqrt()
}

/// Squared vertical-aware distance from a point to a 3D segment.
fn dist_pt_seg(pt: &[f32], p: &[f32], q: &[f32]) -> f32 {
    let pqx = q[0] - p[0];
    let pqy = q[1] - p[1];
    let pqz = q[2] - p[2];
    let dx = pt[0] - p[0];
    let dy = pt[1] - p[1];
    let dz = pt[2] - p[2];
    let d = pqx * pqx + pqy * pqy + pqz * pqz;
    let mut t = pqx * dx + pqy * dy + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);
    let cx = p[0] + t * pqx - pt[0];
    let cy = p[1] + t * pqy - pt[1];
    let cz = p[2] + t * pqz - pt[2];
    cx * cx + cy * cy + cz * cz
}

/// Signed xy distance from a point to the polygon boundary; negative inside.
fn dist_to_poly(p: &[f32], verts: &[f32], nverts: usize) -> f32 {
    let mut dmin = f32::MAX;
    let mut c = false;
    let mut j = nverts - 1;
    for i in 0..nverts {
        let vi = &verts[i * 3..i * 3 + 3];
        let vj = &verts[j * 3..j * 3 + 3];
        if ((vi[1] > p[1]) != (vj[1] > p[1]))
            && (p[0] < (vj[0] - vi[0]) * (p[1] - vi[1]) / (vj[1] - vi[1]) + vi[0])
        {
            c = !c;
        }
        let (d, _) = tilenav_common::dist_pt_seg_sqr_2d(p, vj, vi);
        dmin = dmin.min(d);
        j = i;
    }
    let d = dmin.sqrt();
    if c {
        -d
    } else {
        d
    }
}

/// Vertical distance from a point to the triangulated detail surface.
fn dist_to_tri_mesh(p: &[f32; 3], verts: &[f32], tris: &[u8]) -> f32 {
    let mut dmin = f32::MAX;
    for t in tris.chunks_exact(4) {
        let va = &verts[t[0] as usize * 3..t[0] as usize * 3 + 3];
        let vb = &verts[t[1] as usize * 3..t[1] as usize * 3 + 3];
        let vc = &verts[t[2] as usize * 3..t[2] as usize * 3 + 3];
        if let Some(h) = tilenav_common::closest_height_point_triangle(p, va, vb, vc) {
            dmin = dmin.min((h - p[2]).abs());
        }
    }
    if dmin == f32::MAX {
        // Outside every triangle: closest 3D distance to the surface.
        for t in tris.chunks_exact(4) {
            let va = &verts[t[0] as usize * 3..t[0] as usize * 3 + 3];
            let vb = &verts[t[1] as usize * 3..t[1] as usize * 3 + 3];
            let vc = &verts[t[2] as usize * 3..t[2] as usize * 3 + 3];
            let mut closest = [0.0f32; 3];
            tilenav_common::closest_pt_point_triangle(&mut closest, p, va, vb, vc);
            dmin = dmin.min(vdist_sqr(p, &closest).sqrt());
        }
    }
    dmin
}

/// Marks triangle edges that lie on the polygon hull (2 bits per edge).
fn set_tri_flags(_verts: &[f32], hull: &[usize], tris: &mut [u8]) {
    let nhull = hull.len();
    for t in tris.chunks_exact_mut(4) {
        let mut flags = 0u8;
        for e in 0..3 {
            let a = t[e] as usize;
            let b = t[(e + 1) % 3] as usize;
            let mut on_hull = false;
            let mut j = nhull - 1;
            for i in 0..nhull {
                if hull[j] == a && hull[i] == b {
                    on_hull = true;
                    break;
                }
                j = i;
            }
            if on_hull {
                flags |= 1 << (e * 2);
            }
        }
        t[3] = flags;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::ContourSet;
    use crate::heightfield::{Heightfield, WALKABLE_AREA};
    use crate::region::build_regions;

    fn build_plate_detail(w: i32, h: i32, sample_dist: f32) -> (PolyMesh, PolyMeshDetail) {
        let mut hf = Heightfield::new(w, h, [0.0; 3], [w as f32, h as f32, 10.0], 1.0, 1.0);
        for y in 0..h {
            for x in 0..w {
                hf.add_span(x, y, 0, 1, WALKABLE_AREA, 1).unwrap();
            }
        }
        let mut chf = CompactHeightfield::build(2, 1, 0, &hf).unwrap();
        build_regions(&mut chf, 0, 4, 20).unwrap();
        let cset = ContourSet::build(&chf, 1.3, 12).unwrap();
        let mesh = PolyMesh::build(&cset, 6).unwrap();
        let dmesh = PolyMeshDetail::build(&mesh, &chf, sample_dist, 1.0).unwrap();
        (mesh, dmesh)
    }

    #[test]
    fn test_detail_covers_every_poly() {
        let (mesh, dmesh) = build_plate_detail(10, 10, 2.0);
        assert_eq!(dmesh.nmeshes(), mesh.npolys());

        for m in dmesh.meshes.chunks_exact(4) {
            let nverts = m[1] as usize;
            let ntris = m[3] as usize;
            assert!(nverts >= 3);
            assert!(ntris >= 1);
            // Triangle indices stay within the sub-mesh.
            let tri_base = m[2] as usize;
            for t in dmesh.tris[tri_base * 4..(tri_base + ntris) * 4].chunks_exact(4) {
                assert!((t[0] as usize) < nverts);
                assert!((t[1] as usize) < nverts);
                assert!((t[2] as usize) < nverts);
            }
        }
    }

    #[test]
    fn test_detail_heights_match_surface() {
        let (_, dmesh) = build_plate_detail(8, 8, 0.0);
        // The plate floor sits at z = 1 voxel.
        for v in dmesh.verts.chunks_exact(3) {
            assert!((v[2] - 1.0).abs() < 0.51, "vertex height {} off surface", v[2]);
        }
    }

    #[test]
    fn test_hull_edges_flagged() {
        let (_, dmesh) = build_plate_detail(8, 8, 0.0);
        let mut hull_edges = 0;
        for t in dmesh.tris.chunks_exact(4) {
            for e in 0..3 {
                if (t[3] >> (e * 2)) & 0x3 != 0 {
                    hull_edges += 1;
                }
            }
        }
        assert!(hull_edges >= 3);
    }
}
