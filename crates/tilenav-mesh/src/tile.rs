//! Tile-resident data structures: polygons, links, detail meshes, bounding
//! volumes, off-mesh connections and occupancy cells.

use crate::{PolyFlags, PolyRef, NULL_LINK, NULL_TRAVERSE_TYPE};

/// Vertex cap per polygon; fixed by the tile layout.
pub const MAX_VERTS_PER_POLY: usize = 6;

/// Serialized size of one BV-tree node in bytes.
pub const BV_NODE_SIZE: usize = 16;

/// Tile flag: the navmesh owns the tile blob and drops it on removal.
pub const TILE_FREE_DATA: i32 = 0x01;

/// Polygon type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PolyType {
    /// Standard convex surface polygon.
    Ground,
    /// Degenerate two-vertex off-mesh connection polygon.
    OffMeshConnection,
}

/// A polygon within a tile.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Poly {
    /// Head of this polygon's link chain, [`NULL_LINK`] when empty.
    pub first_link: u32,
    /// Vertex indices into the tile vertex array.
    pub verts: [u16; MAX_VERTS_PER_POLY],
    /// Per-edge neighbour data: 0 = hard edge, `EXT_LINK | side` = portal,
    /// otherwise 1-based internal neighbour polygon index.
    pub neis: [u16; MAX_VERTS_PER_POLY],
    /// Capability flags.
    pub flags: PolyFlags,
    /// Number of vertices used.
    pub vert_count: u8,
    /// Packed area id (low 6 bits) and polygon type (high 2 bits).
    pub area_and_type: u8,
    /// Disjoint poly group this polygon belongs to.
    pub group_id: u16,
    /// Quantised surface area.
    pub surface_area: u16,
    /// Reserved for layout stability; always zero.
    pub reserved: [u16; 2],
    /// Polygon centre, world units.
    pub center: [f32; 3],
}

impl Default for Poly {
    fn default() -> Self {
        Self {
            first_link: NULL_LINK,
            verts: [0; MAX_VERTS_PER_POLY],
            neis: [0; MAX_VERTS_PER_POLY],
            flags: PolyFlags::empty(),
            vert_count: 0,
            area_and_type: 0,
            group_id: 0,
            surface_area: 0,
            reserved: [0; 2],
            center: [0.0; 3],
        }
    }
}

impl Poly {
    pub fn set_area(&mut self, area: u8) {
        self.area_and_type = (self.area_and_type & 0xc0) | (area & 0x3f);
    }

    pub fn area(&self) -> u8 {
        self.area_and_type & 0x3f
    }

    pub fn set_type(&mut self, t: PolyType) {
        let bits = match t {
            PolyType::Ground => 0u8,
            PolyType::OffMeshConnection => 1,
        };
        self.area_and_type = (self.area_and_type & 0x3f) | (bits << 6);
    }

    pub fn poly_type(&self) -> PolyType {
        if self.area_and_type >> 6 == 1 {
            PolyType::OffMeshConnection
        } else {
            PolyType::Ground
        }
    }
}

/// A directed edge of the runtime polygon graph.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Link {
    /// Target polygon.
    pub target: PolyRef,
    /// Next link in the owning polygon's chain, [`NULL_LINK`] at the end.
    pub next: u32,
    /// Index of the owning polygon edge.
    pub edge: u8,
    /// Boundary side code, 0xff for internal links.
    pub side: u8,
    /// Quantised sub-edge range for boundary links.
    pub bmin: u8,
    pub bmax: u8,
    /// Traverse action, [`NULL_TRAVERSE_TYPE`] for plain adjacency.
    pub traverse_type: u8,
    /// Quantised traverse distance.
    pub traverse_dist: u8,
    /// Index of the paired link on the target tile,
    /// [`crate::NULL_TRAVERSE_REVERSE_LINK`] when absent.
    pub reverse_link: u16,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            target: 0,
            next: NULL_LINK,
            edge: 0,
            side: 0,
            bmin: 0,
            bmax: 0,
            traverse_type: NULL_TRAVERSE_TYPE,
            traverse_dist: 0,
            reverse_link: crate::NULL_TRAVERSE_REVERSE_LINK,
        }
    }
}

impl Link {
    pub fn has_traverse_type(&self) -> bool {
        self.traverse_type != NULL_TRAVERSE_TYPE
    }

    pub fn traverse_type(&self) -> u8 {
        self.traverse_type & (crate::MAX_TRAVERSE_TYPES as u8 - 1)
    }
}

/// Location of one polygon's height detail within the tile.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PolyDetail {
    pub vert_base: u32,
    pub tri_base: u32,
    pub vert_count: u8,
    pub tri_count: u8,
}

/// Bounding volume node; `i >= 0` is a leaf polygon index, negative values
/// are escape offsets.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct BVNode {
    pub bmin: [u16; 3],
    pub bmax: [u16; 3],
    pub i: i32,
}

/// A user-declared point-to-point connection.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct OffMeshConnection {
    /// Endpoints `[ax, ay, az, bx, by, bz]`.
    pub pos: [f32; 6],
    /// Endpoint radius.
    pub rad: f32,
    /// Index of the connection polygon within the tile.
    pub poly: u16,
    /// Side code of the far endpoint, 0xff when it lands in the same tile.
    pub side: u8,
    /// Traverse type in the low 5 bits; bit 6 flips the vertex lookup order.
    pub traverse_type: u8,
    /// User-assigned id.
    pub user_id: u16,
    /// Hint index, 0xffff when unused.
    pub hint_index: u16,
    /// Reference position trailing the start position.
    pub ref_pos: [f32; 3],
    /// Yaw towards the end position, radians.
    pub ref_yaw: f32,
    /// Direction flags ([`crate::OFFMESH_CON_BIDIR`]).
    pub flags: u8,
}

impl OffMeshConnection {
    pub fn traverse_type(&self) -> u8 {
        self.traverse_type & (crate::MAX_TRAVERSE_TYPES as u8 - 1)
    }

    pub fn vert_lookup_order(&self) -> bool {
        self.traverse_type & crate::OFFMESH_CON_TRAVERSE_ON_VERT != 0
    }

    pub fn set_traverse_type(&mut self, traverse_type: u8, inverted_order: bool) {
        self.traverse_type = traverse_type & (crate::MAX_TRAVERSE_TYPES as u8 - 1);
        if inverted_order {
            self.traverse_type |= crate::OFFMESH_CON_TRAVERSE_ON_VERT;
        }
    }

    pub fn is_bidirectional(&self) -> bool {
        self.flags & crate::OFFMESH_CON_BIDIR != 0
    }
}

/// Calculates the reference yaw of an off-mesh connection on the xy-plane.
pub fn calc_off_mesh_ref_yaw(spos: &[f32], epos: &[f32]) -> f32 {
    (epos[1] - spos[1]).atan2(epos[0] - spos[0])
}

/// Calculates the reference position trailing `spos` by `offset` against the
/// connection yaw.
pub fn calc_off_mesh_ref_pos(spos: &[f32], yaw_rad: f32, offset: f32) -> [f32; 3] {
    [
        spos[0] - yaw_rad.cos() * offset,
        spos[1] - yaw_rad.sin() * offset,
        spos[2],
    ]
}

/// An occupancy cell placed on a polygon surface.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TileCell {
    /// Cell position on the detail surface, world units.
    pub pos: [f32; 3],
    /// Polygon this cell sits on.
    pub poly_index: u32,
    /// Occupancy per slot; 0xff = empty.
    pub occupy_state: [u8; 4],
}

impl TileCell {
    pub fn new(pos: [f32; 3], poly_index: u32) -> Self {
        Self {
            pos,
            poly_index,
            occupy_state: [0xff; 4],
        }
    }
}

/// Tile metadata serialized at the head of every tile blob.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshHeader {
    pub magic: i32,
    pub version: i32,
    /// Grid location.
    pub x: i32,
    pub y: i32,
    pub layer: i32,
    pub user_id: u32,
    pub poly_count: i32,
    pub poly_map_count: i32,
    pub vert_count: i32,
    pub max_link_count: i32,
    pub detail_mesh_count: i32,
    pub detail_vert_count: i32,
    pub detail_tri_count: i32,
    pub bv_node_count: i32,
    pub off_mesh_con_count: i32,
    /// Index of the first off-mesh connection polygon.
    pub off_mesh_base: i32,
    pub max_cell_count: i32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    /// Quantisation factor of the BV tree (`1 / cs`).
    pub bv_quant_factor: f32,
}

/// A fully materialised navmesh tile.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshTile {
    /// Incremented on every removal so stale references fault.
    pub salt: u32,
    /// Head of the link free list.
    pub links_free_list: u32,
    pub header: Option<MeshHeader>,
    pub polys: Vec<Poly>,
    /// Reserved per-poly words carried through serialisation.
    pub poly_map: Vec<i32>,
    /// Vertices, 3 floats each.
    pub verts: Vec<f32>,
    pub links: Vec<Link>,
    pub detail_meshes: Vec<PolyDetail>,
    pub detail_verts: Vec<f32>,
    /// Detail triangles, 4 bytes each (3 indices + edge flags).
    pub detail_tris: Vec<u8>,
    pub bv_tree: Vec<BVNode>,
    pub off_mesh_cons: Vec<OffMeshConnection>,
    pub cells: Vec<TileCell>,
    /// The serialized blob this tile was added from, kept while the tile is
    /// live so removal can hand it back.
    #[cfg_attr(feature = "serialization", serde(skip))]
    pub data: Option<Vec<u8>>,
    /// Tile flags ([`TILE_FREE_DATA`]).
    pub flags: i32,
    /// Next tile in the free list or position bucket chain.
    pub next: Option<u32>,
}

impl MeshTile {
    /// Takes a link slot off the free list.
    pub fn alloc_link(&mut self) -> Option<u32> {
        if self.links_free_list == NULL_LINK {
            return None;
        }
        let link = self.links_free_list;
        self.links_free_list = self.links[link as usize].next;
        Some(link)
    }

    /// Returns a link slot to the free list.
    pub fn free_link(&mut self, link: u32) {
        self.links[link as usize] = Link {
            next: self.links_free_list,
            ..Default::default()
        };
        self.links_free_list = link;
    }

    /// Whether at least `count` link slots are free.
    pub fn link_count_available(&self, count: u32) -> bool {
        let mut n = 0;
        let mut cur = self.links_free_list;
        while cur != NULL_LINK && n < count {
            n += 1;
            cur = self.links[cur as usize].next;
        }
        n >= count
    }

    /// Number of free link slots.
    pub fn free_link_count(&self) -> u32 {
        let mut n = 0;
        let mut cur = self.links_free_list;
        while cur != NULL_LINK {
            n += 1;
            cur = self.links[cur as usize].next;
        }
        n
    }

    /// Bounds of the actual polygon vertices, tighter than the padded header
    /// bounds.
    pub fn tight_bounds(&self) -> ([f32; 3], [f32; 3]) {
        let mut bmin = [f32::MAX; 3];
        let mut bmax = [f32::MIN; 3];
        for v in self.verts.chunks_exact(3) {
            tilenav_common::vmin(&mut bmin, v);
            tilenav_common::vmax(&mut bmax, v);
        }
        if self.verts.is_empty() {
            if let Some(header) = &self.header {
                return (header.bmin, header.bmax);
            }
        }
        (bmin, bmax)
    }

    /// Rebuilds the link free list by scanning polygon link chains; every
    /// slot not reachable from a chain becomes free.
    pub fn rebuild_link_free_list(&mut self) {
        let mut live = vec![false; self.links.len()];
        for poly in &self.polys {
            let mut l = poly.first_link;
            while l != NULL_LINK {
                live[l as usize] = true;
                l = self.links[l as usize].next;
            }
        }
        self.links_free_list = NULL_LINK;
        for i in (0..self.links.len()).rev() {
            if !live[i] {
                self.links[i].next = self.links_free_list;
                self.links[i].target = 0;
                self.links_free_list = i as u32;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile_with_links(n: usize) -> MeshTile {
        let mut tile = MeshTile {
            links: vec![Link::default(); n],
            ..Default::default()
        };
        tile.links_free_list = NULL_LINK;
        for i in (0..n).rev() {
            tile.links[i].next = tile.links_free_list;
            tile.links_free_list = i as u32;
        }
        tile
    }

    #[test]
    fn test_poly_area_and_type_packing() {
        let mut poly = Poly::default();
        poly.set_area(5);
        poly.set_type(PolyType::OffMeshConnection);
        assert_eq!(poly.area(), 5);
        assert_eq!(poly.poly_type(), PolyType::OffMeshConnection);
        poly.set_area(63);
        assert_eq!(poly.poly_type(), PolyType::OffMeshConnection);
        assert_eq!(poly.area(), 63);
    }

    #[test]
    fn test_link_alloc_free_roundtrip() {
        let mut tile = tile_with_links(4);
        assert!(tile.link_count_available(4));
        assert!(!tile.link_count_available(5));

        let a = tile.alloc_link().unwrap();
        let b = tile.alloc_link().unwrap();
        assert_ne!(a, b);
        assert_eq!(tile.free_link_count(), 2);

        tile.free_link(a);
        assert_eq!(tile.free_link_count(), 3);
        // Freed slot comes back first.
        assert_eq!(tile.alloc_link().unwrap(), a);
    }

    #[test]
    fn test_rebuild_link_free_list() {
        let mut tile = tile_with_links(4);
        let a = tile.alloc_link().unwrap();
        let _b = tile.alloc_link().unwrap();

        // One poly keeps link `a` live; the other allocated slot leaks.
        let mut poly = Poly::default();
        poly.first_link = a;
        tile.links[a as usize].next = NULL_LINK;
        tile.polys.push(poly);

        tile.rebuild_link_free_list();
        assert_eq!(tile.free_link_count(), 3);
    }

    #[test]
    fn test_off_mesh_ref_yaw() {
        let yaw = calc_off_mesh_ref_yaw(&[0.0, 0.0, 0.0], &[10.0, 0.0, 0.0]);
        assert!(yaw.abs() < 1e-6);
        let pos = calc_off_mesh_ref_pos(&[0.0, 0.0, 0.0], yaw, crate::OFFMESH_CON_REFPOS_OFFSET);
        assert!((pos[0] + 35.0).abs() < 1e-4);
        assert!(pos[1].abs() < 1e-4);
    }
}
