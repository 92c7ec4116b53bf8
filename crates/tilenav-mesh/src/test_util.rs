//! Shared fixtures: hand-built polygon meshes of axis-aligned quads, packed
//! into tile blobs the same way the build pipeline would.

use crate::builder::{create_nav_mesh_data, NavMeshCreateParams, OffMeshConnectionParams};
use crate::navmesh::{NavMesh, NavMeshParams};
use crate::PolyFlags;
use tilenav_gen::{PolyMesh, PolyMeshDetail, MESH_NULL_IDX};

/// One flat axis-aligned quad: `[x0, y0, x1, y1]` at height `z`.
#[derive(Debug, Clone, Copy)]
pub struct Quad {
    pub rect: [f32; 4],
    pub z: f32,
}

impl Quad {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32, z: f32) -> Self {
        Self {
            rect: [x0, y0, x1, y1],
            z,
        }
    }
}

pub const TEST_CS: f32 = 0.5;
pub const TEST_CH: f32 = 0.5;

/// Builds a polygon mesh containing one polygon per quad, every edge hard.
pub fn quad_poly_mesh(quads: &[Quad], bmin: [f32; 3], bmax: [f32; 3]) -> (PolyMesh, PolyMeshDetail) {
    let nvp = 6;
    let mut mesh = PolyMesh {
        nvp,
        bmin,
        bmax,
        cs: TEST_CS,
        ch: TEST_CH,
        border_size: 0,
        ..Default::default()
    };
    let mut detail = PolyMeshDetail::default();

    for quad in quads {
        let [x0, y0, x1, y1] = quad.rect;
        let z = quad.z;
        let base = mesh.nverts() as u16;

        // Counter-clockwise corners, quantised to voxel units.
        let corners = [[x0, y0], [x1, y0], [x1, y1], [x0, y1]];
        for c in corners {
            mesh.verts.push(((c[0] - bmin[0]) / TEST_CS).round() as u16);
            mesh.verts.push(((c[1] - bmin[1]) / TEST_CS).round() as u16);
            mesh.verts.push(((z - bmin[2]) / TEST_CH).round() as u16);
        }

        let mut poly = vec![MESH_NULL_IDX; nvp * 2];
        for k in 0..4 {
            poly[k] = base + k as u16;
        }
        mesh.polys.extend_from_slice(&poly);
        mesh.regs.push(1);
        mesh.flags.push(PolyFlags::WALK.bits());
        mesh.areas.push(crate::PolyArea::Ground as u8);
        let area = (x1 - x0) * (y1 - y0);
        mesh.surf_areas
            .push(((area * crate::POLY_SURF_AREA_QUANT).round() as u32).min(0xffff) as u16);

        // Flat detail: the four corners and two triangles.
        let vert_base = detail.verts.len() as u32 / 3;
        let tri_base = detail.tris.len() as u32 / 4;
        for c in corners {
            detail.verts.extend_from_slice(&[c[0], c[1], z]);
        }
        detail.tris.extend_from_slice(&[0, 1, 2, 0, 0, 2, 3, 0]);
        detail.meshes.extend_from_slice(&[vert_base, 4, tri_base, 2]);
    }

    (mesh, detail)
}

/// Agent metrics matching the scenario fixtures: radius 1, height 4,
/// climb 1.
pub fn tile_blob(
    quads: &[Quad],
    bmin: [f32; 3],
    bmax: [f32; 3],
    tile_x: i32,
    tile_y: i32,
) -> Vec<u8> {
    tile_blob_with(quads, bmin, bmax, tile_x, tile_y, &[], |_| {})
}

/// Variant taking off-mesh connections and a mesh post-processing hook
/// (e.g. to mark portal edges).
pub fn tile_blob_with(
    quads: &[Quad],
    bmin: [f32; 3],
    bmax: [f32; 3],
    tile_x: i32,
    tile_y: i32,
    off_mesh_cons: &[OffMeshConnectionParams],
    tweak: impl FnOnce(&mut PolyMesh),
) -> Vec<u8> {
    let (mut mesh, detail) = quad_poly_mesh(quads, bmin, bmax);
    tweak(&mut mesh);

    let params = NavMeshCreateParams {
        mesh: &mesh,
        detail: &detail,
        off_mesh_cons,
        tile_x,
        tile_y,
        tile_layer: 0,
        user_id: 0,
        bmin,
        bmax,
        walkable_height: 4.0,
        walkable_radius: 1.0,
        walkable_climb: 1.0,
        cs: TEST_CS,
        ch: TEST_CH,
        cell_resolution: 4,
        build_bv_tree: true,
    };
    create_nav_mesh_data(&params).expect("tile data")
}

/// A single-tile navmesh whose origin follows the descending-x tile grid.
pub fn single_tile_mesh(bmin: [f32; 3], bmax: [f32; 3]) -> NavMesh {
    let params = NavMeshParams {
        orig: [bmax[0], bmin[1], bmin[2]],
        tile_width: bmax[0] - bmin[0],
        tile_height: bmax[1] - bmin[1],
        max_tiles: 8,
        max_polys: 64,
        ..Default::default()
    };
    NavMesh::new(&params).expect("navmesh")
}

/// Level geometry stub with no obstructions.
pub struct OpenGeometry;

impl crate::traverse::GeometryRaycast for OpenGeometry {
    fn raycast_mesh(&self, _from: &[f32], _to: &[f32]) -> bool {
        false
    }
}

/// Level geometry stub where every ray hits.
pub struct SolidGeometry;

impl crate::traverse::GeometryRaycast for SolidGeometry {
    fn raycast_mesh(&self, _from: &[f32], _to: &[f32]) -> bool {
        true
    }
}

/// Counts links carrying a traverse type across the whole mesh.
pub fn count_traverse_links(nav: &NavMesh) -> usize {
    let mut count = 0;
    for i in 0..nav.max_tiles() {
        let tile = nav.tile(i);
        if tile.header.is_none() {
            continue;
        }
        for poly in &tile.polys {
            let mut l = poly.first_link;
            while l != crate::NULL_LINK {
                let link = &tile.links[l as usize];
                if link.has_traverse_type() {
                    count += 1;
                }
                l = link.next;
            }
        }
    }
    count
}
