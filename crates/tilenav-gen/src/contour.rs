//! Region border tracing and simplification.
//!
//! Each region's boundary is walked span by span into a raw contour, then
//! simplified against a maximum deviation and edge length while preserving
//! portal vertices (where the bordering region changes).

use crate::compact::{CompactHeightfield, DIR_OFFSET_X, DIR_OFFSET_Y};
use crate::region::BORDER_REG;
use tilenav_common::Result;

/// Mask extracting the neighbour region id from a contour vertex's data
/// component.
pub const CONTOUR_REG_MASK: i32 = 0xffff;
/// Vertex flag: lies on the tile border.
pub const BORDER_VERTEX: i32 = 0x10000;
/// Vertex flag: lies on an area-id transition.
pub const AREA_BORDER: i32 = 0x20000;

/// A traced region boundary. Vertices are `(x, y, z, data)` with grid
/// coordinates, corner height in voxels and the neighbour region id plus
/// flags in `data`.
#[derive(Debug, Clone, Default)]
pub struct Contour {
    /// Simplified vertices, 4 ints each.
    pub verts: Vec<i32>,
    /// Raw traced vertices, 4 ints each.
    pub rverts: Vec<i32>,
    /// Region id this contour encloses.
    pub reg: u16,
    /// Area id of the region.
    pub area: u8,
}

impl Contour {
    pub fn nverts(&self) -> usize {
        self.verts.len() / 4
    }
}

/// The contours of every region in a tile.
#[derive(Debug, Default)]
pub struct ContourSet {
    pub contours: Vec<Contour>,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    pub cs: f32,
    pub ch: f32,
    pub width: i32,
    pub height: i32,
    pub border_size: i32,
}

impl ContourSet {
    /// Traces and simplifies the contours of all regions in `chf`.
    pub fn build(chf: &CompactHeightfield, max_error: f32, max_edge_len: i32) -> Result<Self> {
        let w = chf.width;
        let h = chf.height;

        let mut cset = ContourSet {
            contours: Vec::with_capacity(chf.max_regions as usize),
            bmin: chf.bmin,
            bmax: chf.bmax,
            cs: chf.cs,
            ch: chf.ch,
            width: w - chf.border_size * 2,
            height: h - chf.border_size * 2,
            border_size: chf.border_size,
        };
        if chf.border_size > 0 {
            // Contour vertices are shifted into tile-local coordinates, so
            // the bounds lose the padding too.
            let pad = chf.border_size as f32 * chf.cs;
            cset.bmin[0] += pad;
            cset.bmin[1] += pad;
            cset.bmax[0] -= pad;
            cset.bmax[1] -= pad;
        }

        // Mark boundary edges: bit per direction where the neighbour belongs
        // to another region.
        let mut flags = vec![0u8; chf.span_count];
        for y in 0..h {
            for x in 0..w {
                let cell = chf.cell(x, y);
                for i in cell.index as usize..(cell.index + cell.count) as usize {
                    if chf.spans[i].reg == 0 || chf.spans[i].reg & BORDER_REG != 0 {
                        continue;
                    }
                    let mut res = 0u8;
                    for dir in 0..4 {
                        let mut r = 0u16;
                        if let Some(n) = chf.neighbor_index(x, y, i, dir) {
                            r = chf.spans[n].reg;
                        }
                        if r == chf.spans[i].reg {
                            res |= 1 << dir;
                        }
                    }
                    // Flip so set bits mean "boundary here".
                    flags[i] = res ^ 0xf;
                }
            }
        }

        let mut raw: Vec<i32> = Vec::with_capacity(256);
        let mut simplified: Vec<i32> = Vec::with_capacity(64);

        for y in 0..h {
            for x in 0..w {
                let cell = chf.cell(x, y);
                for i in cell.index as usize..(cell.index + cell.count) as usize {
                    if flags[i] == 0 || flags[i] == 0xf {
                        flags[i] = 0;
                        continue;
                    }
                    let reg = chf.spans[i].reg;
                    if reg == 0 || reg & BORDER_REG != 0 {
                        continue;
                    }
                    let area = chf.areas[i];

                    raw.clear();
                    simplified.clear();
                    walk_contour(chf, x, y, i, &mut flags, &mut raw);
                    simplify_contour(&raw, &mut simplified, max_error, max_edge_len);
                    remove_degenerate_segments(&mut simplified);

                    if simplified.len() / 4 >= 3 {
                        let mut contour = Contour {
                            verts: simplified.clone(),
                            rverts: raw.clone(),
                            reg,
                            area,
                        };
                        if chf.border_size > 0 {
                            // Shift back into tile-local coordinates.
                            for v in contour.verts.chunks_exact_mut(4) {
                                v[0] -= chf.border_size;
                                v[1] -= chf.border_size;
                            }
                            for v in contour.rverts.chunks_exact_mut(4) {
                                v[0] -= chf.border_size;
                                v[1] -= chf.border_size;
                            }
                        }
                        cset.contours.push(contour);
                    }
                }
            }
        }

        merge_region_holes(&mut cset);

        Ok(cset)
    }
}

/// Corner height at the start of `dir`, and whether the corner sits where a
/// tile-border region meets two different interior regions.
fn corner_height(
    chf: &CompactHeightfield,
    x: i32,
    y: i32,
    i: usize,
    dir: usize,
) -> (i32, bool) {
    let span = chf.spans[i];
    let mut height = span.z as i32;
    let dirp = (dir + 1) & 3;

    let mut regs = [0u32; 4];
    regs[0] = chf.spans[i].reg as u32 | ((chf.areas[i] as u32) << 16);

    if let Some(n) = chf.neighbor_index(x, y, i, dir) {
        height = height.max(chf.spans[n].z as i32);
        regs[1] = chf.spans[n].reg as u32 | ((chf.areas[n] as u32) << 16);
        if let Some(nn) = chf.neighbor_index(x + DIR_OFFSET_X[dir], y + DIR_OFFSET_Y[dir], n, dirp)
        {
            height = height.max(chf.spans[nn].z as i32);
            regs[2] = chf.spans[nn].reg as u32 | ((chf.areas[nn] as u32) << 16);
        }
    }
    if let Some(n) = chf.neighbor_index(x, y, i, dirp) {
        height = height.max(chf.spans[n].z as i32);
        regs[3] = chf.spans[n].reg as u32 | ((chf.areas[n] as u32) << 16);
        if let Some(nn) =
            chf.neighbor_index(x + DIR_OFFSET_X[dirp], y + DIR_OFFSET_Y[dirp], n, dir)
        {
            height = height.max(chf.spans[nn].z as i32);
            regs[2] = chf.spans[nn].reg as u32 | ((chf.areas[nn] as u32) << 16);
        }
    }

    // The vertex is special when two of the surrounding regions form a
    // border-to-interior or exterior transition.
    let mut is_border_vertex = false;
    for j in 0..4 {
        let a = regs[j];
        let b = regs[(j + 1) & 3];
        let two_same_exts =
            (a & b & BORDER_REG as u32) != 0 && (a & 0xffff) == (b & 0xffff);
        let any_zero = a == 0 || b == 0;
        if !two_same_exts && !any_zero {
            continue;
        }
        let c = regs[(j + 2) & 3];
        let d = regs[(j + 3) & 3];
        if (c & 0xffff) != 0
            && (d & 0xffff) != 0
            && c & BORDER_REG as u32 == 0
            && d & BORDER_REG as u32 == 0
            && (c & 0xffff) != (d & 0xffff)
        {
            is_border_vertex = true;
            break;
        }
    }

    (height, is_border_vertex)
}

/// Walks the boundary starting at span `i`, clearing boundary flags as it
/// goes and appending `(x, y, z, data)` raw vertices.
fn walk_contour(
    chf: &CompactHeightfield,
    mut x: i32,
    mut y: i32,
    mut i: usize,
    flags: &mut [u8],
    out: &mut Vec<i32>,
) {
    let start_i = i;
    let mut dir = 0usize;
    while flags[i] & (1 << dir) == 0 {
        dir += 1;
    }
    let start_dir = dir;
    let area = chf.areas[i];

    let mut iter = 0;
    loop {
        iter += 1;
        if iter > 40000 {
            break;
        }

        if flags[i] & (1 << dir) != 0 {
            // Emit the corner vertex of this boundary edge.
            let (height, is_border_vertex) = corner_height(chf, x, y, i, dir);
            let mut is_area_border = false;
            let (px, py) = match dir {
                0 => (x, y + 1),
                1 => (x + 1, y + 1),
                2 => (x + 1, y),
                _ => (x, y),
            };

            let mut r = 0i32;
            if let Some(n) = chf.neighbor_index(x, y, i, dir) {
                r = chf.spans[n].reg as i32;
                if chf.areas[n] != area {
                    is_area_border = true;
                }
            }
            if is_border_vertex {
                r |= BORDER_VERTEX;
            }
            if is_area_border {
                r |= AREA_BORDER;
            }
            out.extend_from_slice(&[px, py, height, r]);

            flags[i] &= !(1 << dir);
            dir = (dir + 1) & 3; // Rotate clockwise.
        } else {
            // Move into the neighbour and rotate counterclockwise.
            let ni = chf.neighbor_index(x, y, i, dir);
            match ni {
                Some(n) => {
                    x += DIR_OFFSET_X[dir];
                    y += DIR_OFFSET_Y[dir];
                    i = n;
                }
                None => {
                    // Should not happen: the flag said this side connects.
                    break;
                }
            }
            dir = (dir + 3) & 3;
        }

        if i == start_i && dir == start_dir {
            break;
        }
    }
}

/// Simplifies a raw contour: keeps portal vertices, subdivides where the
/// deviation exceeds `max_error` (world units), and splits edges longer than
/// `max_edge_len` voxels.
fn simplify_contour(points: &[i32], simplified: &mut Vec<i32>, max_error: f32, max_edge_len: i32) {
    let npts = points.len() / 4;

    // Does any vertex see a different neighbour region than its successor?
    let has_connections = points
        .chunks_exact(4)
        .any(|v| (v[3] & CONTOUR_REG_MASK) != 0);

    if has_connections {
        // Keep every vertex where the bordering region changes.
        for i in 0..npts {
            let ii = (i + 1) % npts;
            let different_regs =
                (points[i * 4 + 3] & CONTOUR_REG_MASK) != (points[ii * 4 + 3] & CONTOUR_REG_MASK);
            let area_borders =
                (points[i * 4 + 3] & AREA_BORDER) != (points[ii * 4 + 3] & AREA_BORDER);
            if different_regs || area_borders {
                simplified.extend_from_slice(&[
                    points[i * 4],
                    points[i * 4 + 1],
                    points[i * 4 + 2],
                    i as i32,
                ]);
            }
        }
    }

    if simplified.is_empty() {
        // Closed loop with one neighbour everywhere: seed with the
        // lower-left-most and upper-right-most vertices.
        let mut llx = points[0];
        let mut lly = points[1];
        let mut llz = points[2];
        let mut lli = 0i32;
        let mut urx = points[0];
        let mut ury = points[1];
        let mut urz = points[2];
        let mut uri = 0i32;
        for i in 0..npts {
            let x = points[i * 4];
            let y = points[i * 4 + 1];
            let z = points[i * 4 + 2];
            if x < llx || (x == llx && y < lly) {
                llx = x;
                lly = y;
                llz = z;
                lli = i as i32;
            }
            if x > urx || (x == urx && y > ury) {
                urx = x;
                ury = y;
                urz = z;
                uri = i as i32;
            }
        }
        simplified.extend_from_slice(&[llx, lly, llz, lli]);
        simplified.extend_from_slice(&[urx, ury, urz, uri]);
    }

    // Add points until every raw vertex lies within max_error of the
    // simplified outline.
    let mut i = 0usize;
    while i < simplified.len() / 4 {
        let ii = (i + 1) % (simplified.len() / 4);

        let ax = simplified[i * 4];
        let ay = simplified[i * 4 + 1];
        let ai = simplified[i * 4 + 3] as usize;

        let bx = simplified[ii * 4];
        let by = simplified[ii * 4 + 1];
        let bi = simplified[ii * 4 + 3] as usize;

        // Traverse the raw segment in lexicographic order for determinism.
        let (mut ci, cinc, endi) = if bx > ax || (bx == ax && by > ay) {
            ((ai + 1) % npts, 1usize, bi)
        } else {
            ((bi + npts - 1) % npts, npts - 1, ai)
        };

        let mut maxd = 0.0f32;
        let mut maxi: i32 = -1;

        // Only tessellate boundaries facing nothing (outer edges).
        if (points[ci * 4 + 3] & CONTOUR_REG_MASK) == 0 {
            while ci != endi {
                let d = dist_pt_seg_2d(
                    points[ci * 4] as f32,
                    points[ci * 4 + 1] as f32,
                    ax as f32,
                    ay as f32,
                    bx as f32,
                    by as f32,
                );
                if d > maxd {
                    maxd = d;
                    maxi = ci as i32;
                }
                ci = (ci + cinc) % npts;
            }
        }

        if maxi != -1 && maxd > max_error * max_error {
            let m = maxi as usize;
            let insert = [points[m * 4], points[m * 4 + 1], points[m * 4 + 2], maxi];
            let at = (i + 1) * 4;
            simplified.splice(at..at, insert);
        } else {
            i += 1;
        }
    }

    // Split long edges.
    if max_edge_len > 0 {
        let mut i = 0usize;
        while i < simplified.len() / 4 {
            let n = simplified.len() / 4;
            let ii = (i + 1) % n;

            let ax = simplified[i * 4];
            let ay = simplified[i * 4 + 1];
            let ai = simplified[i * 4 + 3] as usize;

            let bx = simplified[ii * 4];
            let by = simplified[ii * 4 + 1];
            let bi = simplified[ii * 4 + 3] as usize;

            let mut maxi: i32 = -1;
            let ci = (ai + 1) % npts;

            // Only edges facing nothing or another tile are tessellated.
            let tess = (points[ci * 4 + 3] & CONTOUR_REG_MASK) == 0;

            if tess {
                let dx = bx - ax;
                let dy = by - ay;
                if dx * dx + dy * dy > max_edge_len * max_edge_len {
                    // Pick the raw vertex at the middle of the run.
                    let count = if bi < ai { bi + npts - ai } else { bi - ai };
                    if count > 1 {
                        maxi = ((ai + count / 2) % npts) as i32;
                    }
                }
            }

            if maxi != -1 {
                let m = maxi as usize;
                let insert = [points[m * 4], points[m * 4 + 1], points[m * 4 + 2], maxi];
                let at = (i + 1) * 4;
                simplified.splice(at..at, insert);
            } else {
                i += 1;
            }
        }
    }

    // Carry neighbour region info and border flags over from the raw verts.
    let n = simplified.len() / 4;
    for i in 0..n {
        // The edge data comes from the raw point after this simplified one.
        let ai = (simplified[i * 4 + 3] as usize + 1) % npts;
        let bi = simplified[i * 4 + 3] as usize;
        simplified[i * 4 + 3] = (points[ai * 4 + 3] & (CONTOUR_REG_MASK | AREA_BORDER))
            | (points[bi * 4 + 3] & BORDER_VERTEX);
    }
}

fn dist_pt_seg_2d(x: f32, y: f32, px: f32, py: f32, qx: f32, qy: f32) -> f32 {
    let pqx = qx - px;
    let pqy = qy - py;
    let mut dx = x - px;
    let mut dy = y - py;
    let d = pqx * pqx + pqy * pqy;
    let mut t = pqx * dx + pqy * dy;
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);
    dx = px + t * pqx - x;
    dy = py + t * pqy - y;
    dx * dx + dy * dy
}

fn remove_degenerate_segments(simplified: &mut Vec<i32>) {
    let mut i = 0usize;
    while i < simplified.len() / 4 {
        let n = simplified.len() / 4;
        let ni = (i + 1) % n;
        if simplified[i * 4] == simplified[ni * 4] && simplified[i * 4 + 1] == simplified[ni * 4 + 1]
        {
            simplified.drain(i * 4..i * 4 + 4);
        } else {
            i += 1;
        }
    }
}

/// Signed doubled area of a contour on the grid plane. Holes wind opposite
/// to outlines and come out negative.
fn calc_area_of_polygon_2d(verts: &[i32]) -> i32 {
    let n = verts.len() / 4;
    let mut area = 0i32;
    let mut j = n - 1;
    for i in 0..n {
        let vi = &verts[i * 4..i * 4 + 4];
        let vj = &verts[j * 4..j * 4 + 4];
        area += vi[0] * vj[1] - vj[0] * vi[1];
        j = i;
    }
    (area + 1) / 2
}

/// Merges hole contours into the outline of their region through a diagonal
/// at the mutually closest vertices.
fn merge_region_holes(cset: &mut ContourSet) {
    // Group contour indices per region.
    let mut by_region: std::collections::HashMap<u16, Vec<usize>> = std::collections::HashMap::new();
    for (i, c) in cset.contours.iter().enumerate() {
        by_region.entry(c.reg).or_default().push(i);
    }

    for indices in by_region.values() {
        if indices.len() < 2 {
            continue;
        }
        // The outline is the contour with positive area; the rest are holes.
        let mut outline = None;
        let mut holes = Vec::new();
        for &i in indices {
            if calc_area_of_polygon_2d(&cset.contours[i].verts) > 0 {
                outline = Some(i);
            } else {
                holes.push(i);
            }
        }
        let Some(outline) = outline else { continue };

        for hole in holes {
            let hole_verts = std::mem::take(&mut cset.contours[hole].verts);
            if hole_verts.is_empty() {
                continue;
            }
            let merged = merge_hole(&cset.contours[outline].verts, &hole_verts);
            cset.contours[outline].verts = merged;
        }
    }

    cset.contours.retain(|c| !c.verts.is_empty());
}

fn merge_hole(outline: &[i32], hole: &[i32]) -> Vec<i32> {
    let no = outline.len() / 4;
    let nh = hole.len() / 4;

    // Mutually closest vertex pair.
    let mut best = (0usize, 0usize);
    let mut best_d = i64::MAX;
    for i in 0..no {
        for j in 0..nh {
            let dx = (outline[i * 4] - hole[j * 4]) as i64;
            let dy = (outline[i * 4 + 1] - hole[j * 4 + 1]) as i64;
            let d = dx * dx + dy * dy;
            if d < best_d {
                best_d = d;
                best = (i, j);
            }
        }
    }

    let (oi, hj) = best;
    let mut merged = Vec::with_capacity(outline.len() + hole.len() + 8);
    // Outline up to and including the bridge vertex.
    for i in 0..=oi {
        merged.extend_from_slice(&outline[i * 4..i * 4 + 4]);
    }
    // The whole hole starting at its bridge vertex, closed back on itself.
    for j in 0..=nh {
        let idx = (hj + j) % nh;
        merged.extend_from_slice(&hole[idx * 4..idx * 4 + 4]);
    }
    // Back onto the outline.
    for i in oi..no {
        merged.extend_from_slice(&outline[i * 4..i * 4 + 4]);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightfield::{Heightfield, WALKABLE_AREA};
    use crate::region::build_regions;

    fn plate_contours(w: i32, h: i32) -> ContourSet {
        let mut hf = Heightfield::new(w, h, [0.0; 3], [w as f32, h as f32, 10.0], 1.0, 1.0);
        for y in 0..h {
            for x in 0..w {
                hf.add_span(x, y, 0, 1, WALKABLE_AREA, 1).unwrap();
            }
        }
        let mut chf = CompactHeightfield::build(2, 1, 0, &hf).unwrap();
        build_regions(&mut chf, 0, 4, 20).unwrap();
        ContourSet::build(&chf, 1.3, 12).unwrap()
    }

    #[test]
    fn test_plate_produces_one_contour() {
        let cset = plate_contours(10, 10);
        assert_eq!(cset.contours.len(), 1);
        let c = &cset.contours[0];
        assert!(c.nverts() >= 4);
        assert_eq!(c.area, WALKABLE_AREA);

        // The simplified outline stays within the grid.
        for v in c.verts.chunks_exact(4) {
            assert!(v[0] >= 0 && v[0] <= 10);
            assert!(v[1] >= 0 && v[1] <= 10);
        }
    }

    #[test]
    fn test_outline_winding_positive() {
        let cset = plate_contours(8, 8);
        assert!(calc_area_of_polygon_2d(&cset.contours[0].verts) > 0);
    }

    #[test]
    fn test_donut_hole_merged() {
        // 12x12 plate with a 2x2 hole in the middle.
        let mut hf = Heightfield::new(12, 12, [0.0; 3], [12.0, 12.0, 10.0], 1.0, 1.0);
        for y in 0..12 {
            for x in 0..12 {
                if (5..7).contains(&x) && (5..7).contains(&y) {
                    continue;
                }
                hf.add_span(x, y, 0, 1, WALKABLE_AREA, 1).unwrap();
            }
        }
        let mut chf = CompactHeightfield::build(2, 1, 0, &hf).unwrap();
        build_regions(&mut chf, 0, 2, 400).unwrap();
        let cset = ContourSet::build(&chf, 1.3, 0).unwrap();

        // Each surviving contour is a closed outline (holes were folded in).
        for c in &cset.contours {
            assert!(calc_area_of_polygon_2d(&c.verts) > 0);
        }
    }
}
