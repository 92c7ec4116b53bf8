//! Compact heightfield: the walkable top surfaces of the voxel field,
//! flattened into one span array with 4-direction neighbour links.

use crate::heightfield::{Heightfield, NULL_AREA};
use tilenav_common::{point_in_polygon, Result};

/// Maximum layers (spans per column) addressable by a connection slot.
pub const MAX_LAYERS: u32 = 62;
/// Connection slot value meaning "no neighbour on this side".
pub const NOT_CONNECTED: u32 = 63;

/// Maximum headroom stored on a span (6-bit field).
const MAX_SPAN_HEIGHT: i32 = 0x3f;

/// x offset per direction (0 = -x, 1 = +y, 2 = +x, 3 = -y).
pub const DIR_OFFSET_X: [i32; 4] = [-1, 0, 1, 0];
/// y offset per direction.
pub const DIR_OFFSET_Y: [i32; 4] = [0, 1, 0, -1];

/// A cell: `(index, count)` into the span array.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactCell {
    pub index: u32,
    pub count: u32,
}

/// A walkable surface voxel.
#[derive(Debug, Clone, Copy)]
pub struct CompactSpan {
    /// Floor height in voxels.
    pub z: u16,
    /// Region id, 0 when unassigned.
    pub reg: u16,
    /// Packed connections, 6 bits per direction.
    con: u32,
    /// Headroom to the next span above, clamped to 6 bits.
    pub h: u8,
}

impl CompactSpan {
    /// Neighbour layer index on `dir`, or [`NOT_CONNECTED`].
    #[inline]
    pub fn con(&self, dir: usize) -> u32 {
        (self.con >> (dir * 6)) & 0x3f
    }

    /// Sets the neighbour layer index on `dir`.
    #[inline]
    pub fn set_con(&mut self, dir: usize, layer: u32) {
        let shift = dir * 6;
        self.con = (self.con & !(0x3f << shift)) | ((layer & 0x3f) << shift);
    }
}

/// Compact heightfield over the same grid as the source [`Heightfield`].
#[derive(Debug, Clone)]
pub struct CompactHeightfield {
    pub width: i32,
    pub height: i32,
    pub span_count: usize,
    /// Border padding carried from the tile config; spans within it are
    /// tagged into border regions during partitioning.
    pub border_size: i32,
    /// Agent height in voxels used when connecting spans.
    pub walkable_height: i32,
    /// Agent climb in voxels used when connecting spans.
    pub walkable_climb: i32,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    pub cs: f32,
    pub ch: f32,
    /// Highest region id assigned by partitioning.
    pub max_regions: u16,
    /// Highest distance-field value.
    pub max_distance: u16,
    pub cells: Vec<CompactCell>,
    pub spans: Vec<CompactSpan>,
    /// Area id per span.
    pub areas: Vec<u8>,
    /// Distance field per span; empty until built.
    pub dist: Vec<u16>,
}

impl CompactHeightfield {
    /// Flattens the walkable surfaces of `hf` and links neighbours.
    ///
    /// Two spans connect when their floors differ by at most
    /// `walkable_climb` and the shared gap leaves `walkable_height` of
    /// headroom.
    pub fn build(
        walkable_height: i32,
        walkable_climb: i32,
        border_size: i32,
        hf: &Heightfield,
    ) -> Result<Self> {
        let w = hf.width;
        let h = hf.height;

        let mut chf = Self {
            width: w,
            height: h,
            span_count: 0,
            border_size,
            walkable_height,
            walkable_climb,
            bmin: hf.bmin,
            bmax: hf.bmax,
            cs: hf.cs,
            ch: hf.ch,
            max_regions: 0,
            max_distance: 0,
            cells: vec![CompactCell::default(); (w * h) as usize],
            spans: Vec::new(),
            areas: Vec::new(),
            dist: Vec::new(),
        };

        // Emit one compact span per walkable surface.
        for y in 0..h {
            for x in 0..w {
                let cell_index = chf.spans.len() as u32;
                let mut count = 0u32;

                let spans: Vec<_> = hf.column(x, y).copied().collect();
                for (i, span) in spans.iter().enumerate() {
                    if span.area == NULL_AREA {
                        continue;
                    }
                    let bot = span.smax as i32;
                    let top = spans.get(i + 1).map(|s| s.smin as i32).unwrap_or(i32::MAX);
                    let headroom = (top - bot).clamp(0, MAX_SPAN_HEIGHT);
                    chf.spans.push(CompactSpan {
                        z: bot.clamp(0, 0xffff) as u16,
                        reg: 0,
                        con: pack_not_connected(),
                        h: headroom as u8,
                    });
                    chf.areas.push(span.area);
                    count += 1;
                }

                chf.cells[(y * w + x) as usize] = CompactCell {
                    index: cell_index,
                    count,
                };
            }
        }
        chf.span_count = chf.spans.len();

        // Link neighbours.
        for y in 0..h {
            for x in 0..w {
                let cell = chf.cells[(y * w + x) as usize];
                for i in cell.index..cell.index + cell.count {
                    for dir in 0..4 {
                        let nx = x + DIR_OFFSET_X[dir];
                        let ny = y + DIR_OFFSET_Y[dir];
                        if nx < 0 || ny < 0 || nx >= w || ny >= h {
                            continue;
                        }

                        let span = chf.spans[i as usize];
                        let ncell = chf.cells[(ny * w + nx) as usize];
                        for k in ncell.index..ncell.index + ncell.count {
                            let nspan = chf.spans[k as usize];
                            let bot = span.z.max(nspan.z) as i32;
                            let top = (span.z as i32 + span.h as i32)
                                .min(nspan.z as i32 + nspan.h as i32);

                            if top - bot >= walkable_height
                                && (nspan.z as i32 - span.z as i32).abs() <= walkable_climb
                            {
                                // Layers beyond the addressable range stay
                                // unconnected.
                                let layer = k - ncell.index;
                                if layer <= MAX_LAYERS {
                                    chf.spans[i as usize].set_con(dir, layer);
                                }
                                break;
                            }
                        }
                    }
                }
            }
        }

        Ok(chf)
    }

    #[inline]
    pub fn cell(&self, x: i32, y: i32) -> CompactCell {
        self.cells[(y * self.width + x) as usize]
    }

    /// Index of the neighbour span of `span_index` on `dir`, if connected.
    pub fn neighbor_index(&self, x: i32, y: i32, span_index: usize, dir: usize) -> Option<usize> {
        let layer = self.spans[span_index].con(dir);
        if layer == NOT_CONNECTED {
            return None;
        }
        let nx = x + DIR_OFFSET_X[dir];
        let ny = y + DIR_OFFSET_Y[dir];
        let ncell = self.cells[(ny * self.width + nx) as usize];
        Some((ncell.index + layer) as usize)
    }

    /// Morphological erosion by `radius` voxels: spans closer than that to an
    /// unwalkable boundary lose their area.
    pub fn erode_walkable_area(&mut self, radius: i32) -> Result<()> {
        let w = self.width;
        let h = self.height;
        let mut dist = vec![0xffu8; self.span_count];

        // Boundary seed: spans missing a connected, walkable neighbour.
        for y in 0..h {
            for x in 0..w {
                let cell = self.cell(x, y);
                for i in cell.index as usize..(cell.index + cell.count) as usize {
                    if self.areas[i] == NULL_AREA {
                        dist[i] = 0;
                        continue;
                    }
                    let mut connected = 0;
                    for dir in 0..4 {
                        if let Some(n) = self.neighbor_index(x, y, i, dir) {
                            if self.areas[n] != NULL_AREA {
                                connected += 1;
                            }
                        }
                    }
                    if connected != 4 {
                        dist[i] = 0;
                    }
                }
            }
        }

        // Two-pass chamfer distance over the connection graph.
        for y in 0..h {
            for x in 0..w {
                let cell = self.cell(x, y);
                for i in cell.index as usize..(cell.index + cell.count) as usize {
                    // (-1, 0)
                    if let Some(n) = self.neighbor_index(x, y, i, 0) {
                        dist[i] = dist[i].min(dist[n].saturating_add(2));
                        // (-1, -1)
                        if let Some(nn) = self.neighbor_index(x - 1, y, n, 3) {
                            dist[i] = dist[i].min(dist[nn].saturating_add(3));
                        }
                    }
                    // (0, -1)
                    if let Some(n) = self.neighbor_index(x, y, i, 3) {
                        dist[i] = dist[i].min(dist[n].saturating_add(2));
                        // (1, -1)
                        if let Some(nn) = self.neighbor_index(x, y - 1, n, 2) {
                            dist[i] = dist[i].min(dist[nn].saturating_add(3));
                        }
                    }
                }
            }
        }
        for y in (0..h).rev() {
            for x in (0..w).rev() {
                let cell = self.cell(x, y);
                for i in cell.index as usize..(cell.index + cell.count) as usize {
                    // (1, 0)
                    if let Some(n) = self.neighbor_index(x, y, i, 2) {
                        dist[i] = dist[i].min(dist[n].saturating_add(2));
                        // (1, 1)
                        if let Some(nn) = self.neighbor_index(x + 1, y, n, 1) {
                            dist[i] = dist[i].min(dist[nn].saturating_add(3));
                        }
                    }
                    // (0, 1)
                    if let Some(n) = self.neighbor_index(x, y, i, 1) {
                        dist[i] = dist[i].min(dist[n].saturating_add(2));
                        // (-1, 1)
                        if let Some(nn) = self.neighbor_index(x, y + 1, n, 0) {
                            dist[i] = dist[i].min(dist[nn].saturating_add(3));
                        }
                    }
                }
            }
        }

        let threshold = (radius * 2) as u8;
        for i in 0..self.span_count {
            if dist[i] < threshold {
                self.areas[i] = NULL_AREA;
            }
        }

        Ok(())
    }

    /// Rewrites the area id of spans inside the convex volume described by an
    /// xy-polygon extruded from `hmin` to `hmax` (world units).
    pub fn mark_convex_poly_area(&mut self, verts: &[f32], hmin: f32, hmax: f32, area: u8) {
        let nverts = verts.len() / 3;
        let mut bmin = [verts[0], verts[1], hmin];
        let mut bmax = [verts[0], verts[1], hmax];
        for i in 1..nverts {
            bmin[0] = bmin[0].min(verts[i * 3]);
            bmin[1] = bmin[1].min(verts[i * 3 + 1]);
            bmax[0] = bmax[0].max(verts[i * 3]);
            bmax[1] = bmax[1].max(verts[i * 3 + 1]);
        }

        let minx = (((bmin[0] - self.bmin[0]) / self.cs) as i32).clamp(0, self.width - 1);
        let miny = (((bmin[1] - self.bmin[1]) / self.cs) as i32).clamp(0, self.height - 1);
        let maxx = (((bmax[0] - self.bmin[0]) / self.cs) as i32).clamp(0, self.width - 1);
        let maxy = (((bmax[1] - self.bmin[1]) / self.cs) as i32).clamp(0, self.height - 1);

        for y in miny..=maxy {
            for x in minx..=maxx {
                let cell = self.cell(x, y);
                for i in cell.index as usize..(cell.index + cell.count) as usize {
                    if self.areas[i] == NULL_AREA {
                        continue;
                    }
                    let z = self.bmin[2] + self.spans[i].z as f32 * self.ch;
                    if z < hmin || z > hmax {
                        continue;
                    }
                    let p = [
                        self.bmin[0] + (x as f32 + 0.5) * self.cs,
                        self.bmin[1] + (y as f32 + 0.5) * self.cs,
                        0.0,
                    ];
                    if point_in_polygon(&p, verts, nverts) {
                        self.areas[i] = area;
                    }
                }
            }
        }
    }
}

#[inline]
fn pack_not_connected() -> u32 {
    let mut con = 0u32;
    for dir in 0..4 {
        con |= NOT_CONNECTED << (dir * 6);
    }
    con
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightfield::WALKABLE_AREA;

    fn flat_field(w: i32, h: i32) -> CompactHeightfield {
        let mut hf = Heightfield::new(w, h, [0.0; 3], [w as f32, h as f32, 10.0], 1.0, 1.0);
        for y in 0..h {
            for x in 0..w {
                hf.add_span(x, y, 0, 1, WALKABLE_AREA, 1).unwrap();
            }
        }
        CompactHeightfield::build(2, 1, 0, &hf).unwrap()
    }

    #[test]
    fn test_build_connections() {
        let chf = flat_field(3, 3);
        assert_eq!(chf.span_count, 9);

        // Centre span connects on all four sides.
        let centre = chf.cell(1, 1).index as usize;
        for dir in 0..4 {
            assert!(chf.neighbor_index(1, 1, centre, dir).is_some());
        }

        // Corner span connects on exactly two.
        let corner = chf.cell(0, 0).index as usize;
        let n: usize = (0..4)
            .filter(|&d| chf.neighbor_index(0, 0, corner, d).is_some())
            .count();
        assert_eq!(n, 2);
    }

    #[test]
    fn test_climb_limit_blocks_connection() {
        let mut hf = Heightfield::new(2, 1, [0.0; 3], [2.0, 1.0, 20.0], 1.0, 1.0);
        hf.add_span(0, 0, 0, 1, WALKABLE_AREA, 1).unwrap();
        // 5 voxels higher than the neighbour, climb limit is 1.
        hf.add_span(1, 0, 0, 6, WALKABLE_AREA, 1).unwrap();
        let chf = CompactHeightfield::build(2, 1, 0, &hf).unwrap();

        let left = chf.cell(0, 0).index as usize;
        assert!(chf.neighbor_index(0, 0, left, 2).is_none());
    }

    #[test]
    fn test_erode() {
        let mut chf = flat_field(9, 9);
        chf.erode_walkable_area(2).unwrap();

        // Rim eroded, centre survives.
        let rim = chf.cell(0, 4).index as usize;
        assert_eq!(chf.areas[rim], NULL_AREA);
        let centre = chf.cell(4, 4).index as usize;
        assert_eq!(chf.areas[centre], WALKABLE_AREA);
    }

    #[test]
    fn test_mark_convex_poly_area() {
        let mut chf = flat_field(8, 8);
        let square = [2.0, 2.0, 0.0, 6.0, 2.0, 0.0, 6.0, 6.0, 0.0, 2.0, 6.0, 0.0];
        chf.mark_convex_poly_area(&square, 0.0, 5.0, 7);

        let inside = chf.cell(4, 4).index as usize;
        assert_eq!(chf.areas[inside], 7);
        let outside = chf.cell(0, 0).index as usize;
        assert_eq!(chf.areas[outside], WALKABLE_AREA);
    }
}
