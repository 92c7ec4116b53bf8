//! Hierarchical 2D bounding-box index over input triangles.
//!
//! Tile builds only need the triangles overlapping one padded tile rectangle;
//! walking the whole soup per tile is wasteful on large levels. The chunky
//! mesh groups triangles into leaves of bounded size under a KD-like tree
//! built bottom-up by median split along the longer axis, and answers
//! rectangle queries either in one shot or in resumable bounded batches.

use tilenav_common::{Error, Result};

/// One tree node. Leaf nodes hold `count > 0` triangles starting at `index`
/// in [`ChunkyTriMesh::tris`]; interior nodes store the negated escape index.
#[derive(Debug, Clone)]
pub struct ChunkyTriMeshNode {
    /// xy bounds of everything below this node.
    pub bmin: [f32; 2],
    pub bmax: [f32; 2],
    /// First triangle for leaves; `-(escape index)` for interior nodes.
    pub index: i32,
    /// Triangle count, 0 for interior nodes.
    pub count: i32,
}

/// Spatial index over a triangle soup.
#[derive(Debug)]
pub struct ChunkyTriMesh {
    /// Tree nodes in traversal order.
    pub nodes: Vec<ChunkyTriMeshNode>,
    /// Triangle indices (3 per triangle) regrouped so each leaf's triangles
    /// are contiguous.
    pub tris: Vec<i32>,
    /// Largest leaf triangle count.
    pub max_tris_per_chunk: i32,
}

struct BoundsItem {
    bmin: [f32; 2],
    bmax: [f32; 2],
    tri: usize,
}

impl ChunkyTriMesh {
    /// Builds the index. `tris_per_chunk` bounds leaf size.
    pub fn new(verts: &[f32], tris: &[i32], tris_per_chunk: usize) -> Result<Self> {
        if tris.len() % 3 != 0 {
            return Err(Error::InvalidMesh(
                "triangle index count must be a multiple of 3".to_string(),
            ));
        }
        let ntris = tris.len() / 3;
        let nchunks = (ntris + tris_per_chunk - 1) / tris_per_chunk.max(1);

        let mut items: Vec<BoundsItem> = Vec::with_capacity(ntris);
        for i in 0..ntris {
            let mut bmin = [f32::MAX, f32::MAX];
            let mut bmax = [f32::MIN, f32::MIN];
            for j in 0..3 {
                let vi = tris[i * 3 + j] as usize;
                let v = &verts[vi * 3..vi * 3 + 3];
                bmin[0] = bmin[0].min(v[0]);
                bmin[1] = bmin[1].min(v[1]);
                bmax[0] = bmax[0].max(v[0]);
                bmax[1] = bmax[1].max(v[1]);
            }
            items.push(BoundsItem { bmin, bmax, tri: i });
        }

        let mut mesh = Self {
            nodes: Vec::with_capacity(nchunks * 4),
            tris: Vec::with_capacity(tris.len()),
            max_tris_per_chunk: 0,
        };
        mesh.subdivide(&mut items, 0, ntris, tris_per_chunk, tris);

        for node in &mesh.nodes {
            if node.count > 0 {
                mesh.max_tris_per_chunk = mesh.max_tris_per_chunk.max(node.count);
            }
        }

        Ok(mesh)
    }

    fn subdivide(
        &mut self,
        items: &mut [BoundsItem],
        imin: usize,
        imax: usize,
        tris_per_chunk: usize,
        in_tris: &[i32],
    ) {
        let inum = imax - imin;
        let icur = self.nodes.len();

        let (bmin, bmax) = calc_extends(&items[imin..imax]);

        if inum <= tris_per_chunk {
            // Leaf: copy the triangles contiguously.
            let index = (self.tris.len() / 3) as i32;
            for item in &items[imin..imax] {
                let t = item.tri * 3;
                self.tris.extend_from_slice(&in_tris[t..t + 3]);
            }
            self.nodes.push(ChunkyTriMeshNode {
                bmin,
                bmax,
                index,
                count: inum as i32,
            });
        } else {
            // Split along the longer axis at the median.
            let axis = if (bmax[1] - bmin[1]) > (bmax[0] - bmin[0]) { 1 } else { 0 };
            items[imin..imax].sort_by(|a, b| {
                a.bmin[axis]
                    .partial_cmp(&b.bmin[axis])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let isplit = imin + inum / 2;

            self.nodes.push(ChunkyTriMeshNode {
                bmin,
                bmax,
                index: 0,
                count: 0,
            });

            self.subdivide(items, imin, isplit, tris_per_chunk, in_tris);
            self.subdivide(items, isplit, imax, tris_per_chunk, in_tris);

            // Negative escape index marks this as interior.
            let iescape = self.nodes.len() as i32 - icur as i32;
            self.nodes[icur].index = -iescape;
        }
    }

    /// Collects up to `max_chunks` leaf indices overlapping the rectangle.
    pub fn chunks_overlapping_rect(&self, bmin: [f32; 2], bmax: [f32; 2], out: &mut Vec<usize>, max_chunks: usize) -> usize {
        out.clear();
        let mut i = 0usize;
        while i < self.nodes.len() {
            let node = &self.nodes[i];
            let overlap = check_overlap_rect(bmin, bmax, node.bmin, node.bmax);
            let is_leaf = node.count > 0;

            if is_leaf && overlap {
                if out.len() < max_chunks {
                    out.push(i);
                }
                if out.len() == max_chunks {
                    return out.len();
                }
            }

            if overlap || is_leaf {
                i += 1;
            } else {
                i += (-node.index) as usize;
            }
        }
        out.len()
    }

    /// Resumable variant of [`Self::chunks_overlapping_rect`].
    ///
    /// Fills `out` with at most its capacity of leaf indices, advancing
    /// `cursor` so the caller can drain the tree in bounded batches. Returns
    /// `true` once the traversal is complete.
    pub fn chunks_overlapping_rect_resumable(
        &self,
        bmin: [f32; 2],
        bmax: [f32; 2],
        out: &mut Vec<usize>,
        max_chunks: usize,
        cursor: &mut usize,
    ) -> bool {
        out.clear();
        let mut i = *cursor;
        while i < self.nodes.len() {
            if out.len() == max_chunks {
                *cursor = i;
                return false;
            }
            let node = &self.nodes[i];
            let overlap = check_overlap_rect(bmin, bmax, node.bmin, node.bmax);
            let is_leaf = node.count > 0;

            if is_leaf && overlap {
                out.push(i);
            }

            if overlap || is_leaf {
                i += 1;
            } else {
                i += (-node.index) as usize;
            }
        }
        *cursor = i;
        true
    }
}

fn calc_extends(items: &[BoundsItem]) -> ([f32; 2], [f32; 2]) {
    let mut bmin = items[0].bmin;
    let mut bmax = items[0].bmax;
    for item in &items[1..] {
        bmin[0] = bmin[0].min(item.bmin[0]);
        bmin[1] = bmin[1].min(item.bmin[1]);
        bmax[0] = bmax[0].max(item.bmax[0]);
        bmax[1] = bmax[1].max(item.bmax[1]);
    }
    (bmin, bmax)
}

fn check_overlap_rect(amin: [f32; 2], amax: [f32; 2], bmin: [f32; 2], bmax: [f32; 2]) -> bool {
    !(amin[0] > bmax[0] || amax[0] < bmin[0] || amin[1] > bmax[1] || amax[1] < bmin[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 10x10 grid of unit quads on z = 0, two triangles each.
    fn grid_mesh() -> (Vec<f32>, Vec<i32>) {
        let mut verts = Vec::new();
        let mut tris = Vec::new();
        for y in 0..=10 {
            for x in 0..=10 {
                verts.extend_from_slice(&[x as f32, y as f32, 0.0]);
            }
        }
        for y in 0..10i32 {
            for x in 0..10i32 {
                let a = y * 11 + x;
                let b = a + 1;
                let c = a + 11;
                let d = c + 1;
                tris.extend_from_slice(&[a, b, d, a, d, c]);
            }
        }
        (verts, tris)
    }

    #[test]
    fn test_build_and_query() {
        let (verts, tris) = grid_mesh();
        let cm = ChunkyTriMesh::new(&verts, &tris, 16).unwrap();
        assert!(cm.max_tris_per_chunk <= 16);
        // Regrouped triangle list has the same size as the input.
        assert_eq!(cm.tris.len(), tris.len());

        let mut chunks = Vec::new();
        let n = cm.chunks_overlapping_rect([2.5, 2.5], [3.5, 3.5], &mut chunks, 64);
        assert!(n > 0);

        // Every returned leaf overlaps the query rect.
        for &c in &chunks {
            let node = &cm.nodes[c];
            assert!(check_overlap_rect([2.5, 2.5], [3.5, 3.5], node.bmin, node.bmax));
        }
    }

    #[test]
    fn test_query_outside_returns_nothing() {
        let (verts, tris) = grid_mesh();
        let cm = ChunkyTriMesh::new(&verts, &tris, 16).unwrap();
        let mut chunks = Vec::new();
        let n = cm.chunks_overlapping_rect([100.0, 100.0], [110.0, 110.0], &mut chunks, 64);
        assert_eq!(n, 0);
    }

    #[test]
    fn test_resumable_matches_one_shot() {
        let (verts, tris) = grid_mesh();
        let cm = ChunkyTriMesh::new(&verts, &tris, 4).unwrap();

        let mut all = Vec::new();
        cm.chunks_overlapping_rect([0.0, 0.0], [10.0, 10.0], &mut all, 4096);

        // Drain in batches of 3 and compare against the one-shot result.
        let mut cursor = 0usize;
        let mut batched = Vec::new();
        let mut batch = Vec::new();
        loop {
            let done = cm.chunks_overlapping_rect_resumable(
                [0.0, 0.0],
                [10.0, 10.0],
                &mut batch,
                3,
                &mut cursor,
            );
            batched.extend_from_slice(&batch);
            if done {
                break;
            }
        }
        assert_eq!(all, batched);
    }
}
