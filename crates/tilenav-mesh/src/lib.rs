//! Tiled navigation mesh runtime.
//!
//! A [`NavMesh`] owns a grid of self-contained tiles produced by the build
//! pipeline, links their polygons into a graph (edge adjacency, cross-tile
//! portals, off-mesh connections and traverse links), labels disjoint
//! polygon groups and precomputes per-agent reachability tables.

mod builder;
mod navmesh;
mod set_io;
mod status;
mod table;
mod tile;
mod tile_data;
mod traverse;

#[cfg(test)]
mod navmesh_tests;
#[cfg(test)]
mod set_io_tests;
#[cfg(test)]
mod test_util;
#[cfg(test)]
mod traverse_link_tests;

pub use builder::{create_nav_mesh_data, NavMeshCreateParams, OffMeshConnectionParams};
pub use navmesh::{opposite_side, NavMesh, NavMeshParams};
pub use set_io::{
    load_nav_mesh, nav_mesh_file_name, nav_mesh_version_for_set, save_nav_mesh, NAVMESH_SET_MAGIC,
    NAVMESH_SET_VERSION, SUPPORTED_SET_VERSIONS,
};
pub use status::Status;
pub use table::{
    anim_type_supports_traverse_link, calc_traverse_table_cell_index, calc_traverse_table_size,
    create_disjoint_poly_groups, create_traverse_table_data, update_disjoint_poly_groups,
    DisjointSet, TraverseTableCreateParams,
};
pub use tile::{
    calc_off_mesh_ref_pos, calc_off_mesh_ref_yaw, BVNode, Link, MeshHeader, MeshTile,
    OffMeshConnection, Poly, PolyDetail, PolyType, TileCell, BV_NODE_SIZE, MAX_VERTS_PER_POLY,
    TILE_FREE_DATA,
};
pub use traverse::{
    best_traverse_type, calc_link_distance, first_anim_type_for_nav_mesh_kind,
    hull_for_nav_mesh_kind, quant_link_distance, table_count_for_nav_mesh_kind,
    table_index_for_anim_type, traverse_link_in_los, GeometryRaycast, HullSpec, NavMeshKind,
    TraverseAnimType, TraverseConnectParams, TraverseLinkIndex, TraverseType, ANIM_TYPE_COUNT,
    NAV_MESH_KIND_COUNT, TRAVERSE_ANIM_TYPE_FLAGS, TRAVERSE_TYPES,
};

/// Magic identifying a serialised tile ('D' 'N' 'A' 'V' packed big to low).
pub const NAVMESH_MAGIC: i32 =
    ((b'D' as i32) << 24) | ((b'N' as i32) << 16) | ((b'A' as i32) << 8) | (b'V' as i32);

/// Tile data format version for the targeted set version.
pub const NAVMESH_VERSION: i32 = 8;

/// Flag on a polygon edge neighbour field marking a portal to another tile;
/// the low bits carry the side code.
pub const EXT_LINK: u16 = 0x8000;

/// Terminates per-polygon link chains.
pub const NULL_LINK: u32 = 0xffffffff;

/// Maximum user-defined area ids.
pub const MAX_AREAS: usize = 32;

/// Tile whose every polygon is unlinked.
pub const FULL_UNLINKED_TILE_USER_ID: u32 = 1;
/// Tile containing both linked and unlinked polygons.
pub const SEMI_UNLINKED_TILE_USER_ID: u32 = 2;

/// Poly group id: not assigned yet.
pub const NULL_POLY_GROUP: u16 = 0;
/// Poly group holding every polygon with no outbound link.
pub const UNLINKED_POLY_GROUP: u16 = 1;
/// First poly group id describing a real component.
pub const FIRST_USABLE_POLY_GROUP: u16 = 2;
/// Minimum group count for static pathing to be meaningful.
pub const MIN_POLY_GROUP_COUNT: i32 = 3;

/// Maximum traverse tables a navmesh carries.
pub const MAX_TRAVERSE_TABLES: usize = 5;
/// Link carries no traverse action.
pub const NULL_TRAVERSE_TYPE: u8 = 0xff;
/// Number of traverse type slots.
pub const MAX_TRAVERSE_TYPES: usize = 32;
/// Link has no paired reverse link.
pub const NULL_TRAVERSE_REVERSE_LINK: u16 = 0xffff;
/// Longest traverse link, world units; longer candidates quantise to 0.
pub const TRAVERSE_DIST_MAX: f32 = 2550.0;
/// Quantisation factor for stored traverse distances.
pub const TRAVERSE_DIST_QUANT_FACTOR: f32 = 0.1;

/// Off-mesh connection flag: traversable in both directions.
pub const OFFMESH_CON_BIDIR: u8 = 1;
/// Offset from an off-mesh start position to its reference position.
pub const OFFMESH_CON_REFPOS_OFFSET: f32 = 35.0;
/// Off-mesh traverse context bit: look up the connection from its vertex.
pub const OFFMESH_CON_TRAVERSE_ON_VERT: u8 = 1 << 6;

/// Quantisation applied to polygon surface areas (see the generation crate).
pub const POLY_SURF_AREA_QUANT: f32 = tilenav_gen::POLY_SURF_AREA_QUANT;

/// Quantised surface area at or below which a polygon is tagged too small.
pub const SMALL_POLYGON_THRESHOLD: u16 = 120;

bitflags::bitflags! {
    /// Polygon capability flags. The bit values are part of the on-disk
    /// format.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
    pub struct PolyFlags: u16 {
        /// Generic walkable surface.
        const WALK = 1 << 0;
        /// Surface area below [`SMALL_POLYGON_THRESHOLD`].
        const TOO_SMALL = 1 << 1;
        /// Connected to a polygon on a neighbouring tile.
        const HAS_NEIGHBOUR = 1 << 2;
        /// Off-mesh connection polygon.
        const JUMP = 1 << 3;
        /// Off-mesh connection whose endpoints link to polygons.
        const JUMP_LINKED = 1 << 4;
        /// Small climbable obstacle.
        const OBSTACLE = 1 << 6;
        /// Toggled off at runtime.
        const DISABLED = 1 << 8;
        /// Harmful surface.
        const HAZARD = 1 << 9;
        /// Large door.
        const DOOR = 1 << 10;
        /// Breachable door.
        const DOOR_BREACHABLE = 1 << 13;
        /// Everything.
        const ALL = 0xffff;
    }
}

/// Polygon area ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PolyArea {
    Jump = 0,
    Ground = 1,
    JumpReverse = 2,
    Trigger = 3,
    WallJumpLeft = 4,
    WallJumpRight = 5,
    WallJumpLeftReverse = 6,
    WallJumpRightReverse = 7,
}

/// Reference bit layout. The 32-bit default derives salt/tile/poly widths at
/// init; the 64-bit variant uses a fixed split for very large worlds.
#[cfg(not(feature = "polyref64"))]
pub type PolyRef = u32;
#[cfg(feature = "polyref64")]
pub type PolyRef = u64;

/// A handle to a tile; shares the [`PolyRef`] encoding with a zero poly
/// index.
pub type TileRef = PolyRef;

#[cfg(feature = "polyref64")]
pub const SALT_BITS_64: u32 = 16;
#[cfg(feature = "polyref64")]
pub const TILE_BITS_64: u32 = 28;
#[cfg(feature = "polyref64")]
pub const POLY_BITS_64: u32 = 20;
