//! Input geometry: the level triangle soup plus the user-declared off-mesh
//! connections and area-marking volumes, behind one trait the orchestrator
//! and the traverse-link qualifier both consume.

use tilenav_common::{Error, Result, EPS};
use tilenav_gen::ChunkyTriMesh;
use tilenav_mesh::{GeometryRaycast, OffMeshConnectionParams};

/// A convex area-marking volume: an xy-polygon extruded from `hmin` to
/// `hmax` rewriting the area id of covered surface.
#[derive(Debug, Clone)]
pub struct ConvexVolumeDef {
    /// Polygon vertices, 3 floats each.
    pub verts: Vec<f32>,
    pub hmin: f32,
    pub hmax: f32,
    pub area: u8,
}

/// Everything the build consumes from its environment.
pub trait InputGeometry: GeometryRaycast {
    /// Flat vertex buffer, 3 floats per vertex.
    fn verts(&self) -> &[f32];
    /// Triangle index buffer, 3 per triangle.
    fn tris(&self) -> &[i32];
    /// Spatial index over the triangles.
    fn chunky_mesh(&self) -> &ChunkyTriMesh;
    /// Bounds of the input mesh.
    fn mesh_bounds(&self) -> ([f32; 3], [f32; 3]);
    /// User-declared point-to-point connections.
    fn off_mesh_connections(&self) -> &[OffMeshConnectionParams];
    /// User-declared area-marking volumes.
    fn convex_volumes(&self) -> &[ConvexVolumeDef];
}

/// Triangle-soup implementation of [`InputGeometry`].
pub struct TriMeshGeometry {
    verts: Vec<f32>,
    tris: Vec<i32>,
    chunky: ChunkyTriMesh,
    bmin: [f32; 3],
    bmax: [f32; 3],
    off_mesh_cons: Vec<OffMeshConnectionParams>,
    volumes: Vec<ConvexVolumeDef>,
}

impl TriMeshGeometry {
    /// Builds the geometry provider and its spatial index.
    pub fn new(verts: Vec<f32>, tris: Vec<i32>) -> Result<Self> {
        if verts.len() % 3 != 0 {
            return Err(Error::InvalidMesh(
                "vertex buffer length must be a multiple of 3".to_string(),
            ));
        }
        if tris.len() % 3 != 0 {
            return Err(Error::InvalidMesh(
                "index buffer length must be a multiple of 3".to_string(),
            ));
        }
        let (bmin, bmax) = tilenav_gen::calc_bounds(&verts);
        let chunky = ChunkyTriMesh::new(&verts, &tris, 256)?;
        Ok(Self {
            verts,
            tris,
            chunky,
            bmin,
            bmax,
            off_mesh_cons: Vec::new(),
            volumes: Vec::new(),
        })
    }

    pub fn add_off_mesh_connection(&mut self, con: OffMeshConnectionParams) {
        self.off_mesh_cons.push(con);
    }

    pub fn add_convex_volume(&mut self, volume: ConvexVolumeDef) {
        self.volumes.push(volume);
    }
}

impl GeometryRaycast for TriMeshGeometry {
    fn raycast_mesh(&self, from: &[f32], to: &[f32]) -> bool {
        // Cull by segment bounds first; the chunky index prunes the rest.
        let rect_min = [from[0].min(to[0]), from[1].min(to[1])];
        let rect_max = [from[0].max(to[0]), from[1].max(to[1])];

        let mut chunks = Vec::new();
        self.chunky
            .chunks_overlapping_rect(rect_min, rect_max, &mut chunks, 512);

        for &ci in &chunks {
            let node = &self.chunky.nodes[ci];
            let tris = &self.chunky.tris
                [node.index as usize * 3..(node.index + node.count) as usize * 3];
            for t in tris.chunks_exact(3) {
                let a = &self.verts[t[0] as usize * 3..t[0] as usize * 3 + 3];
                let b = &self.verts[t[1] as usize * 3..t[1] as usize * 3 + 3];
                let c = &self.verts[t[2] as usize * 3..t[2] as usize * 3 + 3];
                if intersect_segment_triangle(from, to, a, b, c) {
                    return true;
                }
            }
        }
        false
    }
}

impl InputGeometry for TriMeshGeometry {
    fn verts(&self) -> &[f32] {
        &self.verts
    }

    fn tris(&self) -> &[i32] {
        &self.tris
    }

    fn chunky_mesh(&self) -> &ChunkyTriMesh {
        &self.chunky
    }

    fn mesh_bounds(&self) -> ([f32; 3], [f32; 3]) {
        (self.bmin, self.bmax)
    }

    fn off_mesh_connections(&self) -> &[OffMeshConnectionParams] {
        &self.off_mesh_cons
    }

    fn convex_volumes(&self) -> &[ConvexVolumeDef] {
        &self.volumes
    }
}

/// Segment-triangle intersection, front faces only. Traverse-link
/// qualification casts each ray in both directions, so single-sided level
/// geometry still blocks from its solid side.
fn intersect_segment_triangle(sp: &[f32], sq: &[f32], a: &[f32], b: &[f32], c: &[f32]) -> bool {
    let ab = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let ac = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let qp = [sp[0] - sq[0], sp[1] - sq[1], sp[2] - sq[2]];

    // Unnormalized triangle normal.
    let n = cross(&ab, &ac);

    // Parallel, or approaching from behind.
    let d = dot(&qp, &n);
    if d <= EPS {
        return false;
    }

    // Plane intersection within the segment range.
    let ap = [sp[0] - a[0], sp[1] - a[1], sp[2] - a[2]];
    let t = dot(&ap, &n);
    if t < 0.0 || t > d {
        return false;
    }

    // Barycentric test via scalar triple products.
    let e = cross(&qp, &ap);
    let v = dot(&ac, &e);
    if v < 0.0 || v > d {
        return false;
    }
    let w = -dot(&ab, &e);
    if w < 0.0 || v + w > d {
        return false;
    }

    true
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
fn cross(a: &[f32; 3], b: &[f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor_geometry() -> TriMeshGeometry {
        // A 10x10 quad at z = 0.
        let verts = vec![
            0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 10.0, 10.0, 0.0, 0.0, 10.0, 0.0,
        ];
        let tris = vec![0, 1, 2, 0, 2, 3];
        TriMeshGeometry::new(verts, tris).unwrap()
    }

    #[test]
    fn test_raycast_hits_floor_from_above() {
        let geom = floor_geometry();
        // Downward ray through the floor hits the front face; the upward
        // ray approaches from behind and passes.
        assert!(geom.raycast_mesh(&[5.0, 5.0, 5.0], &[5.0, 5.0, -5.0]));
        assert!(!geom.raycast_mesh(&[5.0, 5.0, -5.0], &[5.0, 5.0, 5.0]));
    }

    #[test]
    fn test_raycast_misses_beside_floor() {
        let geom = floor_geometry();
        assert!(!geom.raycast_mesh(&[15.0, 5.0, 5.0], &[15.0, 5.0, -5.0]));
        // Parallel ray above the plane.
        assert!(!geom.raycast_mesh(&[0.0, 5.0, 1.0], &[10.0, 5.0, 1.0]));
    }

    #[test]
    fn test_bounds() {
        let geom = floor_geometry();
        let (bmin, bmax) = geom.mesh_bounds();
        assert_eq!(bmin, [0.0, 0.0, 0.0]);
        assert_eq!(bmax, [10.0, 10.0, 0.0]);
    }
}
