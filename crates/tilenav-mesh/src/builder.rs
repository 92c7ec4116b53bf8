//! Tile data creation: packs a generated polygon mesh, its height detail,
//! off-mesh connections, a bounding volume tree and occupancy cells into one
//! serialised tile blob ready for [`crate::NavMesh::add_tile`].

use crate::tile::{
    calc_off_mesh_ref_pos, calc_off_mesh_ref_yaw, BVNode, MeshHeader, MeshTile, OffMeshConnection,
    Poly, PolyDetail, PolyType, TileCell, MAX_VERTS_PER_POLY,
};
use crate::tile_data::serialize_tile;
use crate::{
    PolyFlags, Status, EXT_LINK, NAVMESH_MAGIC, NAVMESH_VERSION, OFFMESH_CON_REFPOS_OFFSET,
};
use tilenav_common::{classify_point_outside_bounds, closest_height_point_triangle, point_in_polygon};
use tilenav_gen::{PolyMesh, PolyMeshDetail, MESH_NULL_IDX};

/// Maximum polygons per BV-tree leaf.
const BV_LEAF_SIZE: usize = 5;

/// One user-declared off-mesh connection fed into tile creation.
#[derive(Debug, Clone)]
pub struct OffMeshConnectionParams {
    /// Endpoints `[ax, ay, az, bx, by, bz]`; A must be inside the tile.
    pub pos: [f32; 6],
    pub rad: f32,
    pub flags: PolyFlags,
    pub area: u8,
    /// Bidirectional when [`crate::OFFMESH_CON_BIDIR`] is set.
    pub dir: u8,
    /// Jump primitive this connection performs.
    pub traverse_type: u8,
    /// Inverted vertex lookup order.
    pub inverted_order: bool,
    pub user_id: u16,
}

/// Source data for one tile.
pub struct NavMeshCreateParams<'a> {
    pub mesh: &'a PolyMesh,
    pub detail: &'a PolyMeshDetail,
    pub off_mesh_cons: &'a [OffMeshConnectionParams],
    pub tile_x: i32,
    pub tile_y: i32,
    pub tile_layer: i32,
    pub user_id: u32,
    /// Tile bounds, world units.
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    /// Agent metrics, world units.
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub cs: f32,
    pub ch: f32,
    /// Diamond cell grid resolution per polygon.
    pub cell_resolution: i32,
    pub build_bv_tree: bool,
}

/// Builds the serialised tile blob. Returns the blob, or a failure status
/// leaving no partial state.
pub fn create_nav_mesh_data(params: &NavMeshCreateParams<'_>) -> Result<Vec<u8>, Status> {
    let mesh = params.mesh;
    let nvp = mesh.nvp;
    let npolys = mesh.npolys();
    let nverts = mesh.nverts();

    if npolys == 0 || nverts == 0 {
        return Err(Status::failure_detail(Status::INVALID_PARAM));
    }
    if nverts >= 0xfffe {
        return Err(Status::failure_detail(Status::INVALID_PARAM));
    }

    // Keep only connections whose start point lies inside this tile.
    let mut stored_cons: Vec<(usize, u8)> = Vec::new();
    for (i, con) in params.off_mesh_cons.iter().enumerate() {
        let start = &con.pos[0..3];
        let end = &con.pos[3..6];
        if start[0] < params.bmin[0]
            || start[0] > params.bmax[0]
            || start[1] < params.bmin[1]
            || start[1] > params.bmax[1]
        {
            continue;
        }
        let side = classify_point_outside_bounds(end, &params.bmin, &params.bmax);
        stored_cons.push((i, side));
    }

    let off_mesh_count = stored_cons.len();
    let tot_poly_count = npolys + off_mesh_count;
    let tot_vert_count = nverts + off_mesh_count * 2;

    // Link budget: one slot per edge, two extra per portal edge, four per
    // off-mesh connection.
    let mut edge_count = 0usize;
    let mut portal_count = 0usize;
    for i in 0..npolys {
        let p = &mesh.polys[i * nvp * 2..i * nvp * 2 + nvp * 2];
        for j in 0..nvp {
            if p[j] == MESH_NULL_IDX {
                break;
            }
            edge_count += 1;
            if p[nvp + j] & EXT_LINK != 0 && p[nvp + j] & 0xf != 0xf {
                portal_count += 1;
            }
        }
    }
    let max_link_count = edge_count + portal_count * 2 + off_mesh_count * 4;

    let mut tile = MeshTile::default();

    // Vertices: mesh vertices dequantised, then two per connection.
    tile.verts.reserve(tot_vert_count * 3);
    for i in 0..nverts {
        let v = &mesh.verts[i * 3..i * 3 + 3];
        tile.verts.push(params.bmin[0] + v[0] as f32 * params.cs);
        tile.verts.push(params.bmin[1] + v[1] as f32 * params.cs);
        tile.verts.push(params.bmin[2] + v[2] as f32 * params.ch);
    }
    for &(ci, _) in &stored_cons {
        let con = &params.off_mesh_cons[ci];
        tile.verts.extend_from_slice(&con.pos);
    }

    // Ground polygons.
    for i in 0..npolys {
        let src = &mesh.polys[i * nvp * 2..i * nvp * 2 + nvp * 2];
        let mut poly = Poly {
            flags: PolyFlags::from_bits_truncate(mesh.flags[i]),
            surface_area: mesh.surf_areas[i],
            ..Default::default()
        };
        poly.set_area(mesh.areas[i]);
        poly.set_type(PolyType::Ground);

        let mut vc = 0u8;
        for j in 0..nvp.min(MAX_VERTS_PER_POLY) {
            if src[j] == MESH_NULL_IDX {
                break;
            }
            poly.verts[j] = src[j];
            // Hard edges carry the null index, which also has the portal bit
            // set; its side nibble of 0xf distinguishes it.
            poly.neis[j] = if src[nvp + j] & EXT_LINK != 0 {
                let dir = src[nvp + j] & 0xf;
                if dir == 0xf {
                    0
                } else {
                    EXT_LINK | dir
                }
            } else {
                src[nvp + j] + 1
            };
            vc += 1;
        }
        poly.vert_count = vc;

        // Polygon centre in world units.
        let mut center = [0.0f32; 3];
        for j in 0..vc as usize {
            let v = &tile.verts[poly.verts[j] as usize * 3..poly.verts[j] as usize * 3 + 3];
            center[0] += v[0];
            center[1] += v[1];
            center[2] += v[2];
        }
        let s = 1.0 / vc as f32;
        poly.center = [center[0] * s, center[1] * s, center[2] * s];

        tile.polys.push(poly);
    }

    // Off-mesh connection polygons.
    for (n, &(ci, _)) in stored_cons.iter().enumerate() {
        let con = &params.off_mesh_cons[ci];
        let mut poly = Poly {
            flags: con.flags,
            ..Default::default()
        };
        poly.set_area(con.area);
        poly.set_type(PolyType::OffMeshConnection);
        poly.verts[0] = (nverts + n * 2) as u16;
        poly.verts[1] = (nverts + n * 2 + 1) as u16;
        poly.vert_count = 2;
        poly.center = [
            (con.pos[0] + con.pos[3]) * 0.5,
            (con.pos[1] + con.pos[4]) * 0.5,
            (con.pos[2] + con.pos[5]) * 0.5,
        ];
        tile.polys.push(poly);
    }

    // Height detail: ground polygons carry their sub-mesh, connection
    // polygons an empty one.
    for i in 0..npolys {
        let dm = &params.detail.meshes[i * 4..i * 4 + 4];
        let vb = dm[0] as usize;
        let nv_full = dm[1] as usize;
        let tb = dm[2] as usize;
        let nt = dm[3] as usize;
        let poly_nv = tile.polys[i].vert_count as usize;
        let extra = nv_full.saturating_sub(poly_nv);

        tile.detail_meshes.push(PolyDetail {
            vert_base: (tile.detail_verts.len() / 3) as u32,
            tri_base: (tile.detail_tris.len() / 4) as u32,
            vert_count: extra as u8,
            tri_count: nt as u8,
        });

        // Only the vertices beyond the polygon's own are stored.
        let start = (vb + poly_nv.min(nv_full)) * 3;
        let src = &params.detail.verts[start..(vb + nv_full) * 3];
        tile.detail_verts.extend_from_slice(src);
        let tris = &params.detail.tris[tb * 4..(tb + nt) * 4];
        tile.detail_tris.extend_from_slice(tris);
    }
    for _ in 0..off_mesh_count {
        tile.detail_meshes.push(PolyDetail::default());
    }

    // Bounding volume tree over the ground polygons.
    if params.build_bv_tree {
        build_bv_tree(mesh, &mut tile.bv_tree);
    }

    // Off-mesh connection records.
    for (n, &(ci, side)) in stored_cons.iter().enumerate() {
        let con = &params.off_mesh_cons[ci];
        let spos = [con.pos[0], con.pos[1], con.pos[2]];
        let epos = [con.pos[3], con.pos[4], con.pos[5]];
        let ref_yaw = calc_off_mesh_ref_yaw(&spos, &epos);
        let mut record = OffMeshConnection {
            pos: con.pos,
            rad: con.rad,
            poly: (npolys + n) as u16,
            side,
            traverse_type: 0,
            user_id: con.user_id,
            hint_index: 0xffff,
            ref_pos: calc_off_mesh_ref_pos(&spos, ref_yaw, OFFMESH_CON_REFPOS_OFFSET),
            ref_yaw,
            flags: con.dir,
        };
        record.set_traverse_type(con.traverse_type, con.inverted_order);
        tile.off_mesh_cons.push(record);
    }

    // Per-polygon occupancy cells on a diamond grid.
    build_cells(params, &tile.verts, &tile.polys[..npolys], &tile.detail_meshes, &tile.detail_verts, &tile.detail_tris, &mut tile.cells);

    tile.poly_map = vec![0i32; tot_poly_count];
    tile.links = vec![Default::default(); max_link_count];
    tile.rebuild_link_free_list();

    tile.header = Some(MeshHeader {
        magic: NAVMESH_MAGIC,
        version: NAVMESH_VERSION,
        x: params.tile_x,
        y: params.tile_y,
        layer: params.tile_layer,
        user_id: params.user_id,
        poly_count: tot_poly_count as i32,
        poly_map_count: tot_poly_count as i32,
        vert_count: tot_vert_count as i32,
        max_link_count: max_link_count as i32,
        detail_mesh_count: tile.detail_meshes.len() as i32,
        detail_vert_count: (tile.detail_verts.len() / 3) as i32,
        detail_tri_count: (tile.detail_tris.len() / 4) as i32,
        bv_node_count: tile.bv_tree.len() as i32,
        off_mesh_con_count: off_mesh_count as i32,
        off_mesh_base: npolys as i32,
        max_cell_count: tile.cells.len() as i32,
        walkable_height: params.walkable_height,
        walkable_radius: params.walkable_radius,
        walkable_climb: params.walkable_climb,
        bmin: params.bmin,
        bmax: params.bmax,
        bv_quant_factor: 1.0 / params.cs,
    });

    serialize_tile(&tile)
}

struct BVItem {
    bmin: [u16; 3],
    bmax: [u16; 3],
    poly: i32,
}

/// Builds the BV tree by recursive longest-axis median split with small
/// leaves, bounds quantised to voxel units.
fn build_bv_tree(mesh: &PolyMesh, nodes: &mut Vec<BVNode>) {
    let nvp = mesh.nvp;
    let quant_z = mesh.ch / mesh.cs;

    let mut items: Vec<BVItem> = Vec::with_capacity(mesh.npolys());
    for i in 0..mesh.npolys() {
        let p = &mesh.polys[i * nvp * 2..i * nvp * 2 + nvp];
        let mut bmin = [u16::MAX; 3];
        let mut bmax = [0u16; 3];
        for &vi in p.iter().take(nvp) {
            if vi == MESH_NULL_IDX {
                break;
            }
            let v = &mesh.verts[vi as usize * 3..vi as usize * 3 + 3];
            bmin[0] = bmin[0].min(v[0]);
            bmin[1] = bmin[1].min(v[1]);
            bmax[0] = bmax[0].max(v[0]);
            bmax[1] = bmax[1].max(v[1]);
            // Heights quantise onto the horizontal grid scale.
            let z0 = (v[2] as f32 * quant_z) as u16;
            bmin[2] = bmin[2].min(z0);
            bmax[2] = bmax[2].max(z0.saturating_add(1));
        }
        items.push(BVItem {
            bmin,
            bmax,
            poly: i as i32,
        });
    }

    subdivide_bv(&mut items, 0, mesh.npolys(), nodes);
}

fn subdivide_bv(items: &mut [BVItem], imin: usize, imax: usize, nodes: &mut Vec<BVNode>) {
    let inum = imax - imin;

    let mut bmin = items[imin].bmin;
    let mut bmax = items[imin].bmax;
    for item in &items[imin + 1..imax] {
        for k in 0..3 {
            bmin[k] = bmin[k].min(item.bmin[k]);
            bmax[k] = bmax[k].max(item.bmax[k]);
        }
    }

    if inum <= BV_LEAF_SIZE {
        // Emit the items directly as leaf nodes.
        for item in &items[imin..imax] {
            nodes.push(BVNode {
                bmin: item.bmin,
                bmax: item.bmax,
                i: item.poly,
            });
        }
        return;
    }

    let icur = nodes.len();
    nodes.push(BVNode {
        bmin,
        bmax,
        i: 0,
    });

    // Split along the longest axis at the median.
    let dx = bmax[0] - bmin[0];
    let dy = bmax[1] - bmin[1];
    let dz = bmax[2] - bmin[2];
    let axis = if dx >= dy && dx >= dz {
        0
    } else if dy >= dz {
        1
    } else {
        2
    };
    items[imin..imax].sort_by_key(|item| item.bmin[axis]);
    let isplit = imin + inum / 2;

    subdivide_bv(items, imin, isplit, nodes);
    subdivide_bv(items, isplit, imax, nodes);

    let iescape = (nodes.len() - icur) as i32;
    nodes[icur].i = -iescape;
}

/// Places occupancy cells on a 45-degree diamond grid over each polygon,
/// projected onto its detail surface.
fn build_cells(
    params: &NavMeshCreateParams<'_>,
    verts: &[f32],
    polys: &[Poly],
    detail_meshes: &[PolyDetail],
    detail_verts: &[f32],
    detail_tris: &[u8],
    cells: &mut Vec<TileCell>,
) {
    if params.cell_resolution < 1 {
        return;
    }
    let spacing = (params.bmax[0] - params.bmin[0]) / (params.cell_resolution as f32 * 2.0);
    if spacing <= 0.0 {
        return;
    }

    for (pi, poly) in polys.iter().enumerate() {
        let nv = poly.vert_count as usize;
        let mut pverts = [0.0f32; MAX_VERTS_PER_POLY * 3];
        let mut pmin = [f32::MAX; 2];
        let mut pmax = [f32::MIN; 2];
        for j in 0..nv {
            let v = &verts[poly.verts[j] as usize * 3..poly.verts[j] as usize * 3 + 3];
            pverts[j * 3..j * 3 + 3].copy_from_slice(v);
            pmin[0] = pmin[0].min(v[0]);
            pmin[1] = pmin[1].min(v[1]);
            pmax[0] = pmax[0].max(v[0]);
            pmax[1] = pmax[1].max(v[1]);
        }

        let x0 = (pmin[0] / spacing).floor() as i32;
        let x1 = (pmax[0] / spacing).ceil() as i32;
        let y0 = (pmin[1] / spacing).floor() as i32;
        let y1 = (pmax[1] / spacing).ceil() as i32;

        for gy in y0..=y1 {
            for gx in x0..=x1 {
                // Diamond pattern: alternating rows offset by half a step.
                let offset = if gy & 1 == 0 { 0.0 } else { spacing * 0.5 };
                let pt = [
                    gx as f32 * spacing + offset,
                    gy as f32 * spacing,
                    0.0f32,
                ];
                if !point_in_polygon(&pt, &pverts[..nv * 3], nv) {
                    continue;
                }
                let z = detail_surface_height(
                    &pt,
                    poly,
                    &detail_meshes[pi],
                    verts,
                    detail_verts,
                    detail_tris,
                )
                .unwrap_or(poly.center[2]);
                cells.push(TileCell::new([pt[0], pt[1], z], pi as u32));
            }
        }
    }
}

fn detail_surface_height(
    pos: &[f32],
    poly: &Poly,
    detail: &PolyDetail,
    verts: &[f32],
    detail_verts: &[f32],
    detail_tris: &[u8],
) -> Option<f32> {
    for t in 0..detail.tri_count as usize {
        let tri = &detail_tris[(detail.tri_base as usize + t) * 4..(detail.tri_base as usize + t) * 4 + 3];
        let mut v = [[0.0f32; 3]; 3];
        for (k, vert) in v.iter_mut().enumerate() {
            let idx = tri[k] as usize;
            if idx < poly.vert_count as usize {
                let src = poly.verts[idx] as usize;
                vert.copy_from_slice(&verts[src * 3..src * 3 + 3]);
            } else {
                let src = detail.vert_base as usize + (idx - poly.vert_count as usize);
                vert.copy_from_slice(&detail_verts[src * 3..src * 3 + 3]);
            }
        }
        if let Some(h) = closest_height_point_triangle(pos, &v[0], &v[1], &v[2]) {
            return Some(h);
        }
    }
    None
}
