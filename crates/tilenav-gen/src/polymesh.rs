//! Convex polygon mesh built from simplified contours.
//!
//! Contours are ear-clipped into triangles, the triangles merged back into
//! convex polygons under the vertex cap, shared vertices welded, and edge
//! adjacency resolved. Edges on the tile border are encoded as portals
//! carrying a side code.

use crate::contour::ContourSet;
use tilenav_common::{Error, Result};

/// Marks an unused polygon slot or a hard edge.
pub const MESH_NULL_IDX: u16 = 0xffff;

/// Portal flag on a polygon edge; low bits carry the side code.
const EXT_LINK: u16 = 0x8000;

/// Quantisation applied to polygon surface areas before storing them.
pub const POLY_SURF_AREA_QUANT: f32 = 0.01;

/// Convex polygon mesh in voxel coordinates.
#[derive(Debug, Default)]
pub struct PolyMesh {
    /// Vertices, 3 u16 each (x, y, z in voxels).
    pub verts: Vec<u16>,
    /// Polygons, `2 * nvp` u16 each: `nvp` vertex indices then `nvp`
    /// neighbour entries (`MESH_NULL_IDX` = hard edge, `EXT_LINK | side` =
    /// portal, otherwise an internal polygon index).
    pub polys: Vec<u16>,
    /// Source region per polygon.
    pub regs: Vec<u16>,
    /// Flags per polygon, filled by the build driver.
    pub flags: Vec<u16>,
    /// Area id per polygon.
    pub areas: Vec<u8>,
    /// Quantised surface area per polygon.
    pub surf_areas: Vec<u16>,
    /// Vertex cap per polygon.
    pub nvp: usize,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    pub cs: f32,
    pub ch: f32,
    pub border_size: i32,
}

impl PolyMesh {
    pub fn npolys(&self) -> usize {
        if self.nvp == 0 {
            0
        } else {
            self.polys.len() / (self.nvp * 2)
        }
    }

    pub fn nverts(&self) -> usize {
        self.verts.len() / 3
    }

    /// Builds the polygon mesh from a contour set.
    pub fn build(cset: &ContourSet, nvp: usize) -> Result<Self> {
        let mut max_vertices = 0;
        let mut max_tris = 0;
        let mut max_verts_per_cont = 0;
        for c in &cset.contours {
            let n = c.nverts();
            if n < 3 {
                continue;
            }
            max_vertices += n;
            max_tris += n - 2;
            max_verts_per_cont = max_verts_per_cont.max(n);
        }

        if max_vertices >= 0xfffe {
            return Err(Error::MeshGeneration(format!(
                "too many vertices: {max_vertices}"
            )));
        }

        let mut mesh = PolyMesh {
            verts: Vec::with_capacity(max_vertices * 3),
            polys: Vec::new(),
            regs: Vec::new(),
            flags: Vec::new(),
            areas: Vec::new(),
            surf_areas: Vec::new(),
            nvp,
            bmin: cset.bmin,
            bmax: cset.bmax,
            cs: cset.cs,
            ch: cset.ch,
            border_size: cset.border_size,
        };

        let mut first_vert = vec![-1i32; VERTEX_BUCKET_COUNT];
        let mut next_vert = vec![0i32; max_vertices];
        let mut indices = vec![0i32; max_verts_per_cont.max(1)];
        let mut tris = vec![0i32; max_tris.max(1) * 3];
        let mut polys: Vec<u16> = Vec::new();

        for cont in &cset.contours {
            let n = cont.nverts();
            if n < 3 {
                continue;
            }

            for (j, idx) in indices.iter_mut().enumerate().take(n) {
                *idx = j as i32;
            }

            let mut ntris = triangulate(&cont.verts, &mut indices[..n], &mut tris);
            if ntris < 0 {
                // Slightly degenerate contour; keep what could be salvaged.
                ntris = -ntris;
            }
            if ntris == 0 {
                continue;
            }
            let ntris = ntris as usize;

            // Add and weld the contour vertices.
            for j in 0..n {
                let v = &cont.verts[j * 4..j * 4 + 4];
                indices[j] = add_vertex(
                    v[0] as u16,
                    v[1] as u16,
                    v[2] as u16,
                    &mut mesh.verts,
                    &mut first_vert,
                    &mut next_vert,
                ) as i32;
            }

            // Seed polygons from the triangles.
            polys.clear();
            let mut npolys = 0usize;
            for j in 0..ntris {
                let t = &tris[j * 3..j * 3 + 3];
                if t[0] != t[1] && t[0] != t[2] && t[1] != t[2] {
                    polys.resize((npolys + 1) * nvp, MESH_NULL_IDX);
                    polys[npolys * nvp] = indices[t[0] as usize] as u16;
                    polys[npolys * nvp + 1] = indices[t[1] as usize] as u16;
                    polys[npolys * nvp + 2] = indices[t[2] as usize] as u16;
                    npolys += 1;
                }
            }
            if npolys == 0 {
                continue;
            }

            // Merge triangles into larger convex polygons.
            if nvp > 3 {
                loop {
                    let mut best_value = 0i32;
                    let mut best = (0usize, 0usize, 0usize, 0usize);
                    for j in 0..npolys - 1 {
                        for k in j + 1..npolys {
                            let (value, ea, eb) =
                                poly_merge_value(&polys, j, k, &mesh.verts, nvp);
                            if value > best_value {
                                best_value = value;
                                best = (j, k, ea, eb);
                            }
                        }
                    }
                    if best_value <= 0 {
                        break;
                    }
                    let (pj, pk, ea, eb) = best;
                    merge_polys(&mut polys, pj, pk, ea, eb, nvp);
                    // Move the last polygon into the freed slot.
                    let last = npolys - 1;
                    if pk != last {
                        let (src, dst) = (last * nvp, pk * nvp);
                        for m in 0..nvp {
                            polys[dst + m] = polys[src + m];
                        }
                    }
                    polys.truncate(last * nvp);
                    npolys = last;
                }
            }

            // Store the polygons.
            for j in 0..npolys {
                mesh.polys.extend_from_slice(&polys[j * nvp..(j + 1) * nvp]);
                mesh.polys.extend(std::iter::repeat(MESH_NULL_IDX).take(nvp));
                mesh.regs.push(cont.reg);
                mesh.flags.push(0);
                mesh.areas.push(cont.area);
                mesh.surf_areas.push(0);
            }
        }

        mesh.build_adjacency()?;
        mesh.mark_portal_edges();
        mesh.compute_surface_areas();

        Ok(mesh)
    }

    /// Resolves internal edge adjacency from shared vertex pairs.
    fn build_adjacency(&mut self) -> Result<()> {
        let npolys = self.npolys();
        let nverts = self.nverts();
        let nvp = self.nvp;

        #[derive(Clone, Copy)]
        struct Edge {
            vert: [u16; 2],
            poly_edge: [u16; 2],
            poly: [u16; 2],
        }

        let max_edge_count = npolys * nvp;
        let mut edges: Vec<Edge> = Vec::with_capacity(max_edge_count);
        let mut first_edge = vec![MESH_NULL_IDX; nverts];
        let mut next_edge = vec![MESH_NULL_IDX; max_edge_count];

        for i in 0..npolys {
            let t = &self.polys[i * nvp * 2..];
            for j in 0..nvp {
                if t[j] == MESH_NULL_IDX {
                    break;
                }
                let v0 = t[j];
                let v1 = if j + 1 >= nvp || t[j + 1] == MESH_NULL_IDX {
                    t[0]
                } else {
                    t[j + 1]
                };
                if v0 < v1 {
                    let edge_idx = edges.len();
                    edges.push(Edge {
                        vert: [v0, v1],
                        poly_edge: [j as u16, 0],
                        poly: [i as u16, i as u16],
                    });
                    next_edge[edge_idx] = first_edge[v0 as usize];
                    first_edge[v0 as usize] = edge_idx as u16;
                }
            }
        }

        for i in 0..npolys {
            let t = self.polys[i * nvp * 2..(i * nvp * 2) + nvp].to_vec();
            for j in 0..nvp {
                if t[j] == MESH_NULL_IDX {
                    break;
                }
                let v0 = t[j];
                let v1 = if j + 1 >= nvp || t[j + 1] == MESH_NULL_IDX {
                    t[0]
                } else {
                    t[j + 1]
                };
                if v0 > v1 {
                    let mut e = first_edge[v1 as usize];
                    while e != MESH_NULL_IDX {
                        let edge = &mut edges[e as usize];
                        if edge.vert[1] == v0 && edge.poly[0] == edge.poly[1] {
                            edge.poly[1] = i as u16;
                            edge.poly_edge[1] = j as u16;
                            break;
                        }
                        e = next_edge[e as usize];
                    }
                }
            }
        }

        // Write back the adjacency.
        for edge in &edges {
            if edge.poly[0] != edge.poly[1] {
                let p0 = edge.poly[0] as usize;
                let p1 = edge.poly[1] as usize;
                self.polys[p0 * nvp * 2 + nvp + edge.poly_edge[0] as usize] = edge.poly[1];
                self.polys[p1 * nvp * 2 + nvp + edge.poly_edge[1] as usize] = edge.poly[0];
            }
        }

        Ok(())
    }

    /// Encodes tile-border edges as `EXT_LINK | side`.
    fn mark_portal_edges(&mut self) {
        if self.border_size <= 0 {
            return;
        }
        let w = ((self.bmax[0] - self.bmin[0]) / self.cs + 0.5) as i32;
        let h = ((self.bmax[1] - self.bmin[1]) / self.cs + 0.5) as i32;
        let nvp = self.nvp;

        for i in 0..self.npolys() {
            for j in 0..nvp {
                let va_idx = self.polys[i * nvp * 2 + j];
                if va_idx == MESH_NULL_IDX {
                    break;
                }
                // Only hard edges can become portals.
                if self.polys[i * nvp * 2 + nvp + j] != MESH_NULL_IDX {
                    continue;
                }
                let nj = if j + 1 >= nvp || self.polys[i * nvp * 2 + j + 1] == MESH_NULL_IDX {
                    0
                } else {
                    j + 1
                };
                let vb_idx = self.polys[i * nvp * 2 + nj];

                let va = &self.verts[va_idx as usize * 3..va_idx as usize * 3 + 3];
                let vb = &self.verts[vb_idx as usize * 3..vb_idx as usize * 3 + 3];

                let nei = &mut self.polys[i * nvp * 2 + nvp + j];
                if va[0] == 0 && vb[0] == 0 {
                    *nei = EXT_LINK;
                } else if va[1] as i32 == h && vb[1] as i32 == h {
                    *nei = EXT_LINK | 2;
                } else if va[0] as i32 == w && vb[0] as i32 == w {
                    *nei = EXT_LINK | 4;
                } else if va[1] == 0 && vb[1] == 0 {
                    *nei = EXT_LINK | 6;
                }
            }
        }
    }

    /// Computes each polygon's surface area in world units, stored quantised.
    fn compute_surface_areas(&mut self) {
        let nvp = self.nvp;
        let cell_area = self.cs * self.cs;
        for i in 0..self.npolys() {
            let p = &self.polys[i * nvp * 2..i * nvp * 2 + nvp];
            let mut area2 = 0i64;
            for j in 2..nvp {
                if p[j] == MESH_NULL_IDX {
                    break;
                }
                let a = &self.verts[p[0] as usize * 3..p[0] as usize * 3 + 3];
                let b = &self.verts[p[j - 1] as usize * 3..p[j - 1] as usize * 3 + 3];
                let c = &self.verts[p[j] as usize * 3..p[j] as usize * 3 + 3];
                area2 += ((b[0] as i64 - a[0] as i64) * (c[1] as i64 - a[1] as i64))
                    - ((c[0] as i64 - a[0] as i64) * (b[1] as i64 - a[1] as i64));
            }
            let world_area = area2.unsigned_abs() as f32 * 0.5 * cell_area;
            self.surf_areas[i] =
                ((world_area * POLY_SURF_AREA_QUANT).round() as u32).min(0xffff) as u16;
        }
    }
}

const VERTEX_BUCKET_COUNT: usize = 1 << 12;

fn compute_vertex_hash(x: u16, y: u16) -> usize {
    // Two large primes scramble the grid coordinates.
    let h1 = 0x8da6b343u32;
    let h2 = 0xd8163841u32;
    let n = h1.wrapping_mul(x as u32).wrapping_add(h2.wrapping_mul(y as u32));
    (n as usize) & (VERTEX_BUCKET_COUNT - 1)
}

fn add_vertex(
    x: u16,
    y: u16,
    z: u16,
    verts: &mut Vec<u16>,
    first_vert: &mut [i32],
    next_vert: &mut [i32],
) -> u16 {
    let bucket = compute_vertex_hash(x, y);
    let mut i = first_vert[bucket];
    while i != -1 {
        let v = &verts[i as usize * 3..i as usize * 3 + 3];
        // Weld vertices landing on the same column within two height voxels.
        if v[0] == x && v[1] == y && (v[2] as i32 - z as i32).abs() <= 2 {
            return i as u16;
        }
        i = next_vert[i as usize];
    }

    let i = (verts.len() / 3) as i32;
    verts.extend_from_slice(&[x, y, z]);
    next_vert[i as usize] = first_vert[bucket];
    first_vert[bucket] = i;
    i as u16
}

#[inline]
fn prev(i: usize, n: usize) -> usize {
    if i >= 1 {
        i - 1
    } else {
        n - 1
    }
}

#[inline]
fn next(i: usize, n: usize) -> usize {
    if i + 1 < n {
        i + 1
    } else {
        0
    }
}

#[inline]
fn area2(a: &[i32], b: &[i32], c: &[i32]) -> i32 {
    (b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])
}

#[inline]
fn left(a: &[i32], b: &[i32], c: &[i32]) -> bool {
    area2(a, b, c) < 0
}

#[inline]
fn left_on(a: &[i32], b: &[i32], c: &[i32]) -> bool {
    area2(a, b, c) <= 0
}

#[inline]
fn collinear(a: &[i32], b: &[i32], c: &[i32]) -> bool {
    area2(a, b, c) == 0
}

/// Proper intersection of segments `ab` and `cd` (no shared endpoints).
fn intersect_prop(a: &[i32], b: &[i32], c: &[i32], d: &[i32]) -> bool {
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }
    (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
}

fn between(a: &[i32], b: &[i32], c: &[i32]) -> bool {
    if !collinear(a, b, c) {
        return false;
    }
    if a[0] != b[0] {
        (a[0] <= c[0] && c[0] <= b[0]) || (a[0] >= c[0] && c[0] >= b[0])
    } else {
        (a[1] <= c[1] && c[1] <= b[1]) || (a[1] >= c[1] && c[1] >= b[1])
    }
}

fn intersect(a: &[i32], b: &[i32], c: &[i32], d: &[i32]) -> bool {
    intersect_prop(a, b, c, d)
        || between(a, b, c)
        || between(a, b, d)
        || between(c, d, a)
        || between(c, d, b)
}

fn vequal(a: &[i32], b: &[i32]) -> bool {
    a[0] == b[0] && a[1] == b[1]
}

/// Is `i..j` a proper internal diagonal of the polygon, ignoring endpoints?
fn diagonalie(i: usize, j: usize, n: usize, verts: &[i32], indices: &[i32]) -> bool {
    let d0 = &verts[(indices[i] & 0x0fffffff) as usize * 4..];
    let d1 = &verts[(indices[j] & 0x0fffffff) as usize * 4..];

    for k in 0..n {
        let k1 = next(k, n);
        if k == i || k1 == i || k == j || k1 == j {
            continue;
        }
        let p0 = &verts[(indices[k] & 0x0fffffff) as usize * 4..];
        let p1 = &verts[(indices[k1] & 0x0fffffff) as usize * 4..];
        if vequal(d0, p0) || vequal(d1, p0) || vequal(d0, p1) || vequal(d1, p1) {
            continue;
        }
        if intersect(d0, d1, p0, p1) {
            return false;
        }
    }
    true
}

/// Is the diagonal `i..j` inside the cone at vertex `i`?
fn in_cone(i: usize, j: usize, n: usize, verts: &[i32], indices: &[i32]) -> bool {
    let pi = &verts[(indices[i] & 0x0fffffff) as usize * 4..];
    let pj = &verts[(indices[j] & 0x0fffffff) as usize * 4..];
    let pi1 = &verts[(indices[next(i, n)] & 0x0fffffff) as usize * 4..];
    let pin1 = &verts[(indices[prev(i, n)] & 0x0fffffff) as usize * 4..];

    if left_on(pin1, pi, pi1) {
        left(pi, pj, pin1) && left(pj, pi, pi1)
    } else {
        !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
    }
}

fn diagonal(i: usize, j: usize, n: usize, verts: &[i32], indices: &[i32]) -> bool {
    in_cone(i, j, n, verts, indices) && diagonalie(i, j, n, verts, indices)
}

/// Ear-clips the contour into triangles; returns the triangle count, negated
/// when the contour was degenerate and clipping had to force progress.
fn triangulate(verts: &[i32], indices: &mut [i32], tris: &mut [i32]) -> i32 {
    let mut n = indices.len();
    let mut ntris = 0i32;
    let mut dst = 0usize;

    // Mark removable ears up front.
    for i in 0..n {
        let i1 = next(i, n);
        let i2 = next(i1, n);
        if diagonal(i, i2, n, verts, indices) {
            indices[i1] |= 0x40000000;
        }
    }

    let mut degenerate = false;
    while n > 3 {
        let mut min_len = -1i32;
        let mut mini = -1i32;
        for i in 0..n {
            let i1 = next(i, n);
            if indices[i1] & 0x40000000 != 0 {
                let p0 = &verts[(indices[i] & 0x0fffffff) as usize * 4..];
                let p2 = &verts[(indices[next(i1, n)] & 0x0fffffff) as usize * 4..];
                let dx = p2[0] - p0[0];
                let dy = p2[1] - p0[1];
                let len = dx * dx + dy * dy;
                if min_len < 0 || len < min_len {
                    min_len = len;
                    mini = i as i32;
                }
            }
        }

        if mini == -1 {
            // No ears: the contour is slightly degenerate. Clip the
            // shortest potential ear to keep making progress.
            degenerate = true;
            for i in 0..n {
                let i1 = next(i, n);
                let i2 = next(i1, n);
                if diagonalie(i, i2, n, verts, indices) {
                    let p0 = &verts[(indices[i] & 0x0fffffff) as usize * 4..];
                    let p2 = &verts[(indices[i2] & 0x0fffffff) as usize * 4..];
                    let dx = p2[0] - p0[0];
                    let dy = p2[1] - p0[1];
                    let len = dx * dx + dy * dy;
                    if min_len < 0 || len < min_len {
                        min_len = len;
                        mini = i as i32;
                    }
                }
            }
            if mini == -1 {
                return -ntris;
            }
        }

        let i = mini as usize;
        let mut i1 = next(i, n);
        let i2 = next(i1, n);

        tris[dst] = indices[i] & 0x0fffffff;
        tris[dst + 1] = indices[i1] & 0x0fffffff;
        tris[dst + 2] = indices[i2] & 0x0fffffff;
        dst += 3;
        ntris += 1;

        // Remove i1 by shifting the tail down.
        n -= 1;
        for k in i1..n {
            indices[k] = indices[k + 1];
        }

        if i1 >= n {
            i1 = 0;
        }
        let i = prev(i1, n);
        // Refresh ear flags around the clipped vertex.
        if diagonal(prev(i, n), i1, n, verts, indices) {
            indices[i] |= 0x40000000;
        } else {
            indices[i] &= 0x0fffffff;
        }
        if diagonal(i, next(i1, n), n, verts, indices) {
            indices[i1] |= 0x40000000;
        } else {
            indices[i1] &= 0x0fffffff;
        }
    }

    tris[dst] = indices[0] & 0x0fffffff;
    tris[dst + 1] = indices[1] & 0x0fffffff;
    tris[dst + 2] = indices[2] & 0x0fffffff;
    ntris += 1;

    if degenerate {
        -ntris
    } else {
        ntris
    }
}

/// Scores merging polygons `pa` and `pb`: the squared length of the shared
/// edge, or `-1` when the merge is illegal. Returns `(value, ea, eb)`.
fn poly_merge_value(
    polys: &[u16],
    pa: usize,
    pb: usize,
    verts: &[u16],
    nvp: usize,
) -> (i32, usize, usize) {
    let a = &polys[pa * nvp..pa * nvp + nvp];
    let b = &polys[pb * nvp..pb * nvp + nvp];
    let na = count_poly_verts(a, nvp);
    let nb = count_poly_verts(b, nvp);

    // Would the merged polygon fit?
    if na + nb - 2 > nvp {
        return (-1, 0, 0);
    }

    // Find the shared edge.
    let mut ea = usize::MAX;
    let mut eb = usize::MAX;
    for i in 0..na {
        let mut va0 = a[i];
        let mut va1 = a[(i + 1) % na];
        if va0 > va1 {
            std::mem::swap(&mut va0, &mut va1);
        }
        for j in 0..nb {
            let mut vb0 = b[j];
            let mut vb1 = b[(j + 1) % nb];
            if vb0 > vb1 {
                std::mem::swap(&mut vb0, &mut vb1);
            }
            if va0 == vb0 && va1 == vb1 {
                ea = i;
                eb = j;
            }
        }
    }
    if ea == usize::MAX || eb == usize::MAX {
        return (-1, 0, 0);
    }

    // The merged polygon must stay convex around the joint.
    let va = a[(ea + na - 1) % na] as usize;
    let vb = a[ea] as usize;
    let vc = b[(eb + 2) % nb] as usize;
    if !uleft(
        &verts[va * 3..va * 3 + 3],
        &verts[vb * 3..vb * 3 + 3],
        &verts[vc * 3..vc * 3 + 3],
    ) {
        return (-1, 0, 0);
    }

    let va = b[(eb + nb - 1) % nb] as usize;
    let vb = b[eb] as usize;
    let vc = a[(ea + 2) % na] as usize;
    if !uleft(
        &verts[va * 3..va * 3 + 3],
        &verts[vb * 3..vb * 3 + 3],
        &verts[vc * 3..vc * 3 + 3],
    ) {
        return (-1, 0, 0);
    }

    let va = a[ea] as usize;
    let vb = a[(ea + 1) % na] as usize;
    let dx = verts[va * 3] as i32 - verts[vb * 3] as i32;
    let dy = verts[va * 3 + 1] as i32 - verts[vb * 3 + 1] as i32;
    (dx * dx + dy * dy, ea, eb)
}

fn uleft(a: &[u16], b: &[u16], c: &[u16]) -> bool {
    (b[0] as i32 - a[0] as i32) * (c[1] as i32 - a[1] as i32)
        - (c[0] as i32 - a[0] as i32) * (b[1] as i32 - a[1] as i32)
        < 0
}

fn count_poly_verts(p: &[u16], nvp: usize) -> usize {
    for i in 0..nvp {
        if p[i] == MESH_NULL_IDX {
            return i;
        }
    }
    nvp
}

/// Splices polygon `pb` into `pa` across the shared edge `(ea, eb)`.
fn merge_polys(polys: &mut [u16], pa: usize, pb: usize, ea: usize, eb: usize, nvp: usize) {
    let a = polys[pa * nvp..pa * nvp + nvp].to_vec();
    let b = polys[pb * nvp..pb * nvp + nvp].to_vec();
    let na = count_poly_verts(&a, nvp);
    let nb = count_poly_verts(&b, nvp);

    let mut merged = vec![MESH_NULL_IDX; nvp];
    let mut n = 0;
    for i in 0..na - 1 {
        merged[n] = a[(ea + 1 + i) % na];
        n += 1;
    }
    for i in 0..nb - 1 {
        merged[n] = b[(eb + 1 + i) % nb];
        n += 1;
    }

    polys[pa * nvp..pa * nvp + nvp].copy_from_slice(&merged);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compact::CompactHeightfield;
    use crate::contour::ContourSet;
    use crate::heightfield::{Heightfield, WALKABLE_AREA};
    use crate::region::build_regions;

    fn build_plate_mesh(w: i32, h: i32, border: i32) -> PolyMesh {
        let mut hf = Heightfield::new(w, h, [0.0; 3], [w as f32, h as f32, 10.0], 1.0, 1.0);
        for y in 0..h {
            for x in 0..w {
                hf.add_span(x, y, 0, 1, WALKABLE_AREA, 1).unwrap();
            }
        }
        let mut chf = CompactHeightfield::build(2, 1, border, &hf).unwrap();
        build_regions(&mut chf, border, 4, 20).unwrap();
        let cset = ContourSet::build(&chf, 1.3, 12).unwrap();
        PolyMesh::build(&cset, 6).unwrap()
    }

    #[test]
    fn test_plate_mesh_polys() {
        let mesh = build_plate_mesh(10, 10, 0);
        assert!(mesh.npolys() >= 1);
        assert!(mesh.nverts() >= 4);

        // Every polygon respects the vertex cap and has a valid area.
        for i in 0..mesh.npolys() {
            let p = &mesh.polys[i * mesh.nvp * 2..i * mesh.nvp * 2 + mesh.nvp];
            let nv = count_poly_verts(p, mesh.nvp);
            assert!((3..=6).contains(&nv));
            assert_eq!(mesh.areas[i], WALKABLE_AREA);
            assert!(mesh.surf_areas[i] > 0);
        }
    }

    #[test]
    fn test_adjacency_symmetry() {
        let mesh = build_plate_mesh(16, 16, 0);
        let nvp = mesh.nvp;
        for i in 0..mesh.npolys() {
            for j in 0..nvp {
                let nei = mesh.polys[i * nvp * 2 + nvp + j];
                if nei == MESH_NULL_IDX || nei & EXT_LINK != 0 {
                    continue;
                }
                // The neighbour must point back.
                let n = nei as usize;
                let back = (0..nvp).any(|k| mesh.polys[n * nvp * 2 + nvp + k] == i as u16);
                assert!(back, "poly {n} does not point back at {i}");
            }
        }
    }

    #[test]
    fn test_border_edges_become_portals() {
        let mesh = build_plate_mesh(20, 20, 4);
        let nvp = mesh.nvp;
        let mut portal_sides = std::collections::HashSet::new();
        for i in 0..mesh.npolys() {
            for j in 0..nvp {
                let nei = mesh.polys[i * nvp * 2 + nvp + j];
                if nei != MESH_NULL_IDX && nei & EXT_LINK != 0 {
                    portal_sides.insert(nei & 0xf);
                }
            }
        }
        // A full plate touches all four axis-aligned tile sides.
        for side in [0u16, 2, 4, 6] {
            assert!(portal_sides.contains(&side), "missing portal side {side}");
        }
    }
}
