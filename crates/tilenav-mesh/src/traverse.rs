//! Traverse links: jump and climb connections between polygons separated by
//! gaps or elevation.
//!
//! Generation runs in two passes over all tiles: cross-tile candidates
//! first, then same-tile candidates with the remaining link budget. Every
//! candidate pair of hard edges is classified against the traverse-type
//! catalogue, de-duplicated through the pair index, and qualified by
//! line-of-sight raycasts against the level geometry before a bidirectional
//! link pair is installed.

use std::collections::HashMap;

use crate::navmesh::NavMesh;
use crate::tile::Link;
use crate::{
    PolyRef, TileRef, NULL_TRAVERSE_TYPE, TRAVERSE_DIST_MAX, TRAVERSE_DIST_QUANT_FACTOR,
    UNLINKED_POLY_GROUP,
};
use tilenav_common::{
    calc_edge_normal_2d, calc_ledge_span_offset, calc_max_los_angle, calc_slope_angle,
    classify_point_inside_bounds, classify_point_outside_bounds, vdist, vdot, vdot2d, vsad, vsub,
};

/// Agent behavioural classes; each indexes a traverse-capability mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum TraverseAnimType {
    Human = 0,
    Spectre = 1,
    Stalker = 2,
    FragDrone = 3,
    Pilot = 4,
    Prowler = 5,
    SuperSpectre = 6,
    Titan = 7,
    Goliath = 8,
}

/// Number of anim types.
pub const ANIM_TYPE_COUNT: usize = 9;

/// Per-anim-type traverse capability masks, bit per traverse type. Kept as
/// data so captured game values can replace them wholesale.
pub const TRAVERSE_ANIM_TYPE_FLAGS: [u32; ANIM_TYPE_COUNT] = [
    0x0000_013f, // human
    0x0000_013f, // spectre
    0x0033_df7f, // stalker
    0x0033_ffff, // frag drone
    0x0000_013f, // pilot
    0x0003_3f87, // prowler
    0x0003_3f82, // super spectre
    0x0000_0600, // titan
    0x0000_0600, // goliath
];

/// One navmesh is built per agent size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(usize)]
pub enum NavMeshKind {
    Small = 0,
    MedShort = 1,
    Medium = 2,
    Large = 3,
    ExtraLarge = 4,
}

/// Number of navmesh kinds.
pub const NAV_MESH_KIND_COUNT: usize = 5;

impl NavMeshKind {
    pub const ALL: [NavMeshKind; NAV_MESH_KIND_COUNT] = [
        NavMeshKind::Small,
        NavMeshKind::MedShort,
        NavMeshKind::Medium,
        NavMeshKind::Large,
        NavMeshKind::ExtraLarge,
    ];

    /// File name suffix for this kind.
    pub fn name(self) -> &'static str {
        match self {
            NavMeshKind::Small => "small",
            NavMeshKind::MedShort => "med_short",
            NavMeshKind::Medium => "medium",
            NavMeshKind::Large => "large",
            NavMeshKind::ExtraLarge => "extra_large",
        }
    }
}

/// Agent hull constants driving per-kind build settings.
#[derive(Debug, Clone, Copy)]
pub struct HullSpec {
    pub radius: f32,
    pub height: f32,
    /// Must stay below the hull height or low overhangs break stepping.
    pub climb_height: f32,
    /// Tile side, voxels.
    pub tile_size: i32,
    /// Per-poly diamond cell resolution.
    pub cell_resolution: i32,
}

const HULLS: [HullSpec; NAV_MESH_KIND_COUNT] = [
    // small (human)
    HullSpec { radius: 16.0, height: 72.0, climb_height: 36.0, tile_size: 32, cell_resolution: 8 },
    // med short (prowler)
    HullSpec { radius: 30.0, height: 84.0, climb_height: 42.0, tile_size: 32, cell_resolution: 4 },
    // medium (super spectre)
    HullSpec { radius: 45.0, height: 130.0, climb_height: 65.0, tile_size: 32, cell_resolution: 4 },
    // large (titan)
    HullSpec { radius: 60.0, height: 235.0, climb_height: 117.0, tile_size: 64, cell_resolution: 2 },
    // extra large (goliath)
    HullSpec { radius: 80.0, height: 260.0, climb_height: 130.0, tile_size: 64, cell_resolution: 2 },
];

/// Hull constants for a navmesh kind.
pub fn hull_for_nav_mesh_kind(kind: NavMeshKind) -> &'static HullSpec {
    &HULLS[kind as usize]
}

/// How many traverse tables a navmesh of this kind carries. Only the small
/// navmesh serves multiple anim types.
pub fn table_count_for_nav_mesh_kind(kind: NavMeshKind) -> i32 {
    match kind {
        NavMeshKind::Small => 5,
        _ => 1,
    }
}

/// The anim type bound to a navmesh kind (first of possibly several).
pub fn first_anim_type_for_nav_mesh_kind(kind: NavMeshKind) -> TraverseAnimType {
    match kind {
        NavMeshKind::Small => TraverseAnimType::Human,
        NavMeshKind::MedShort => TraverseAnimType::Prowler,
        NavMeshKind::Medium => TraverseAnimType::SuperSpectre,
        NavMeshKind::Large => TraverseAnimType::Titan,
        NavMeshKind::ExtraLarge => TraverseAnimType::Goliath,
    }
}

/// Traverse table slot an anim type reads on the small navmesh.
pub fn table_index_for_anim_type(anim_type: TraverseAnimType) -> i32 {
    match anim_type {
        TraverseAnimType::Human => 0,
        TraverseAnimType::Spectre => 1,
        TraverseAnimType::Stalker => 2,
        TraverseAnimType::FragDrone => 3,
        TraverseAnimType::Pilot => 4,
        _ => 0,
    }
}

/// Constraints of one traverse-type catalogue slot.
#[derive(Debug, Clone, Copy)]
pub struct TraverseType {
    pub min_elevation: f32,
    pub max_elevation: f32,
    /// Quantised distance bounds.
    pub min_dist: u8,
    pub max_dist: u8,
    pub force_same_group: bool,
    pub force_different_group: bool,
}

const UNUSED: TraverseType = TraverseType {
    min_elevation: 0.0,
    max_elevation: 0.0,
    min_dist: 0,
    max_dist: 0,
    force_same_group: false,
    force_different_group: false,
};

const fn tt(min_elev: f32, max_elev: f32, min_dist: u8, max_dist: u8) -> TraverseType {
    TraverseType {
        min_elevation: min_elev,
        max_elevation: max_elev,
        min_dist,
        max_dist,
        force_same_group: false,
        force_different_group: false,
    }
}

/// The traverse-type catalogue. Slot constants are frozen interface; several
/// slots are reserved and never match.
pub const TRAVERSE_TYPES: [TraverseType; crate::MAX_TRAVERSE_TYPES] = [
    UNUSED,
    tt(0.0, 32.0, 2, 12),   // 1: cross gap, small
    tt(32.0, 40.0, 5, 16),  // 2: climb object, small
    tt(0.0, 16.0, 11, 22),  // 3: cross gap, medium
    UNUSED,
    UNUSED,
    UNUSED,
    TraverseType {
        // 7: cross gap, large; only bridges separate poly groups.
        min_elevation: 0.0,
        max_elevation: 40.0,
        min_dist: 80,
        max_dist: 107,
        force_same_group: false,
        force_different_group: true,
    },
    tt(40.0, 128.0, 7, 21),    // 8: climb wall, medium
    tt(128.0, 256.0, 16, 45),  // 9: climb wall, tall
    tt(256.0, 640.0, 33, 225), // 10: climb building
    tt(0.0, 40.0, 41, 79),     // 11: jump, short
    tt(128.0, 256.0, 41, 100), // 12: jump, medium
    tt(256.0, 512.0, 81, 179), // 13: jump, large
    UNUSED,
    UNUSED,
    tt(0.0, 64.0, 22, 41),     // 16
    tt(512.0, 1024.0, 21, 58), // 17
    UNUSED,
    UNUSED,
    tt(256.0, 640.0, 16, 40),   // 20: climb target, small
    tt(640.0, 1024.0, 33, 199), // 21: climb target, large
    UNUSED,
    UNUSED,
    UNUSED,
    UNUSED,
    UNUSED,
    UNUSED,
    UNUSED,
    UNUSED,
    UNUSED,
    UNUSED,
];

/// Distance between two traverse link endpoints.
pub fn calc_link_distance(spos: &[f32], epos: &[f32]) -> f32 {
    vdist(spos, epos)
}

/// Quantises a link distance; 0 means "too far to store".
pub fn quant_link_distance(distance: f32) -> u8 {
    if distance > TRAVERSE_DIST_MAX {
        return 0;
    }
    (distance * TRAVERSE_DIST_QUANT_FACTOR).round() as u8
}

/// Picks the best traverse type for a candidate, walking the catalogue from
/// the highest slot down.
pub fn best_traverse_type(elevation: f32, quant_dist: u8, same_poly_group: bool) -> u8 {
    for i in (0..crate::MAX_TRAVERSE_TYPES).rev() {
        let t = &TRAVERSE_TYPES[i];
        // Reserved slots never match.
        if t.min_elevation == 0.0 && t.max_elevation == 0.0 && t.min_dist == 0 && t.max_dist == 0 {
            continue;
        }
        if elevation < t.min_elevation || elevation > t.max_elevation {
            continue;
        }
        if quant_dist < t.min_dist || quant_dist > t.max_dist {
            continue;
        }
        if (t.force_same_group && !same_poly_group)
            || (t.force_different_group && same_poly_group)
        {
            continue;
        }
        return i as u8;
    }
    NULL_TRAVERSE_TYPE
}

/// Static level geometry the link qualifier raycasts against.
pub trait GeometryRaycast {
    /// True when the segment hits the input geometry.
    fn raycast_mesh(&self, from: &[f32], to: &[f32]) -> bool;
}

/// Index of installed traverse links keyed by unordered polygon pair; the
/// value is a bitset over traverse types.
#[derive(Debug, Default)]
pub struct TraverseLinkIndex {
    map: HashMap<(PolyRef, PolyRef), u32>,
}

impl TraverseLinkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: PolyRef, b: PolyRef) -> (PolyRef, PolyRef) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Installed traverse-type bits for a pair.
    pub fn get(&self, a: PolyRef, b: PolyRef) -> Option<u32> {
        self.map.get(&Self::key(a, b)).copied()
    }

    /// Records one traverse type on a pair. Returns whether it was new.
    pub fn add(&mut self, a: PolyRef, b: PolyRef, traverse_type: u8) -> bool {
        let bit = 1u32 << traverse_type;
        let cell = self.map.entry(Self::key(a, b)).or_insert(0);
        if *cell & bit != 0 {
            return false;
        }
        *cell |= bit;
        true
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drops every pair with an endpoint on the given tile; used when a tile
    /// is removed so a rebuild can relink its polygons.
    pub fn prune_tile(&mut self, nav: &NavMesh, tile_index: u32) {
        self.map.retain(|&(a, b), _| {
            nav.decode_poly_id_tile(a) != tile_index && nav.decode_poly_id_tile(b) != tile_index
        });
    }
}

/// Configuration for one traverse-link pass over a tile.
pub struct TraverseConnectParams<'a> {
    /// Level geometry for line-of-sight qualification.
    pub geom: &'a dyn GeometryRaycast,
    /// Pass selector: cross-tile links when true, same-tile otherwise.
    pub link_to_neighbor: bool,
    /// The navmesh kind being linked; non-small kinds gate candidates by
    /// their single anim type's capability mask.
    pub kind: NavMeshKind,
    /// Vertical voxel size of the build, used for the LOS ledge offset.
    pub cell_height: f32,
    /// Pair de-duplication index shared across the whole generation run.
    pub pairs: &'a mut TraverseLinkIndex,
}

/// Whether the displacement from the low to the high edge midpoint faces
/// both edges; overhangs fail this.
fn poly_edge_face_against(v1: &[f32], v2: &[f32], n1: &[f32], n2: &[f32]) -> bool {
    let delta = [v2[0] - v1[0], v2[1] - v1[1], 0.0];
    vdot2d(&delta, n1) >= 0.0 && vdot2d(&delta, n2) < 0.0
}

fn offset_intersects_geom(geom: &dyn GeometryRaycast, base: &[f32], offset: &[f32]) -> bool {
    // A ray from the ledge to the offset position catching geometry means
    // the offset clipped into an object; a link through it would send agents
    // inside the mesh.
    geom.raycast_mesh(base, offset) || geom.raycast_mesh(offset, base)
}

/// Line-of-sight qualification between a low and a high edge midpoint.
pub fn traverse_link_in_los(
    geom: &dyn GeometryRaycast,
    low_pos: &[f32],
    high_pos: &[f32],
    low_dir: &[f32],
    high_dir: &[f32],
    offset_amount: f32,
) -> bool {
    let mut low_normal = [0.0f32; 3];
    calc_edge_normal_2d(low_dir, &mut low_normal);
    let mut high_normal = [0.0f32; 3];
    calc_edge_normal_2d(high_dir, &mut high_normal);

    // The high edge must face back over the low one; otherwise it is an
    // overhang and the agent would clip through the lip on the way up.
    if !poly_edge_face_against(low_pos, high_pos, &low_normal, &high_normal) {
        return false;
    }

    let mut target = [high_pos[0], high_pos[1], high_pos[2]];
    if offset_amount > 0.0 {
        // Push the high point out over the ledge so the ray clears the gap
        // between the navmesh edge and the physical edge.
        let offset = [
            high_pos[0] + high_normal[0] * offset_amount,
            high_pos[1] + high_normal[1] * offset_amount,
            high_pos[2],
        ];
        if offset_intersects_geom(geom, high_pos, &offset) {
            return false;
        }
        target = offset;
    }

    // Clear both ways; single-sided geometry only blocks one direction.
    if geom.raycast_mesh(&target, low_pos) || geom.raycast_mesh(low_pos, &target) {
        return false;
    }

    true
}

struct EdgeInfo {
    spos: [f32; 3],
    epos: [f32; 3],
    mid: [f32; 3],
}

impl NavMesh {
    fn edge_info(&self, tile_index: u32, poly_index: usize, edge: usize) -> EdgeInfo {
        let tile = self.tile(tile_index);
        let poly = &tile.polys[poly_index];
        let nv = poly.vert_count as usize;
        let a = poly.verts[edge] as usize;
        let b = poly.verts[(edge + 1) % nv] as usize;
        let spos = [
            tile.verts[a * 3],
            tile.verts[a * 3 + 1],
            tile.verts[a * 3 + 2],
        ];
        let epos = [
            tile.verts[b * 3],
            tile.verts[b * 3 + 1],
            tile.verts[b * 3 + 2],
        ];
        let mut mid = [0.0f32; 3];
        vsad(&mut mid, &spos, &epos, 0.5);
        EdgeInfo { spos, epos, mid }
    }

    /// Generates traverse links for one base tile.
    ///
    /// Pass 1 (`link_to_neighbor`) connects hard edges to tiles touching the
    /// edge's side; pass 2 connects hard edges within the base tile. Link
    /// budget exhaustion stops the pass early, leaving installed link pairs
    /// intact.
    pub fn connect_traverse_links(
        &mut self,
        tile_ref: TileRef,
        params: &mut TraverseConnectParams<'_>,
    ) -> Result<(), crate::Status> {
        let (salt, base_index, _) = self.decode_poly_id(tile_ref);
        if base_index >= self.max_tiles() || self.tile(base_index).salt != salt {
            return Err(crate::Status::failure_detail(crate::Status::INVALID_PARAM));
        }
        let Some(base_header) = self.tile(base_index).header.clone() else {
            return Err(crate::Status::failure_detail(crate::Status::INVALID_PARAM));
        };

        // Same-tile links consume two slots from one budget.
        let needed = if params.link_to_neighbor { 1 } else { 2 };
        if !self.tile(base_index).link_count_available(needed) {
            return Ok(());
        }

        let base_ref_base = self.poly_ref_base(base_index);
        let base_poly_count = self.tile(base_index).polys.len();
        let mut first_base_link_used = false;

        for i in 0..base_poly_count {
            if self.tile(base_index).polys[i].group_id == UNLINKED_POLY_GROUP {
                continue;
            }
            // Connection polygons have no traversable edges.
            if self.tile(base_index).polys[i].poly_type()
                == crate::tile::PolyType::OffMeshConnection
            {
                continue;
            }
            let base_vert_count = self.tile(base_index).polys[i].vert_count as usize;

            for j in 0..base_vert_count {
                // Hard edges only.
                if self.tile(base_index).polys[i].neis[j] != 0 {
                    continue;
                }

                let base_edge = self.edge_info(base_index, i, j);
                let base_side = classify_point_inside_bounds(
                    &base_edge.mid,
                    &base_header.bmin,
                    &base_header.bmax,
                );

                let land_tiles: Vec<u32> = if params.link_to_neighbor {
                    self.neighbour_tile_indices(base_header.x, base_header.y, base_side)
                } else {
                    vec![base_index]
                };

                for land_index in land_tiles {
                    let same_tile = base_index == land_index;
                    // Cross-tile pass leaves same-tile pairs to pass 2.
                    if params.link_to_neighbor && same_tile {
                        continue;
                    }
                    if !self.tile(land_index).link_count_available(1) {
                        continue;
                    }
                    let Some(land_header) = self.tile(land_index).header.clone() else {
                        continue;
                    };
                    let land_ref_base = self.poly_ref_base(land_index);
                    let land_poly_count = self.tile(land_index).polys.len();
                    let mut first_land_link_used = false;

                    for m in 0..land_poly_count {
                        if self.tile(land_index).polys[m].group_id == UNLINKED_POLY_GROUP {
                            continue;
                        }
                        if self.tile(land_index).polys[m].poly_type()
                            == crate::tile::PolyType::OffMeshConnection
                        {
                            continue;
                        }
                        if same_tile && i == m {
                            continue;
                        }
                        let land_vert_count = self.tile(land_index).polys[m].vert_count as usize;

                        for n in 0..land_vert_count {
                            if self.tile(land_index).polys[m].neis[n] != 0 {
                                continue;
                            }

                            // Keep within the remaining link budget; one
                            // pair costs a slot on each endpoint tile.
                            if params.link_to_neighbor {
                                if first_land_link_used
                                    && !self.tile(land_index).link_count_available(1)
                                {
                                    continue;
                                }
                                if first_base_link_used
                                    && !self.tile(base_index).link_count_available(1)
                                {
                                    return Ok(());
                                }
                            } else if first_base_link_used
                                && !self.tile(base_index).link_count_available(2)
                            {
                                return Ok(());
                            }

                            let land_edge = self.edge_info(land_index, m, n);

                            let dist = calc_link_distance(&base_edge.mid, &land_edge.mid);
                            let quant_dist = quant_link_distance(dist);
                            if quant_dist == 0 {
                                continue;
                            }

                            let mut base_dir = [0.0f32; 3];
                            let mut land_dir = [0.0f32; 3];
                            vsub(&mut base_dir, &base_edge.epos, &base_edge.spos);
                            vsub(&mut land_dir, &land_edge.epos, &land_edge.spos);

                            // Edges winding the same way face the same way;
                            // linking them would tunnel through whatever
                            // separates the polygons.
                            if vdot(&base_dir, &land_dir) > 0.0 {
                                continue;
                            }

                            let elevation = (base_edge.mid[2] - land_edge.mid[2]).abs();
                            let same_group = self.tile(base_index).polys[i].group_id
                                == self.tile(land_index).polys[m].group_id;

                            let traverse_type =
                                best_traverse_type(elevation, quant_dist, same_group);
                            if traverse_type == NULL_TRAVERSE_TYPE {
                                continue;
                            }

                            // Larger navmeshes carry a single anim type; its
                            // mask limits which primitives get installed.
                            if params.kind > NavMeshKind::Small {
                                let anim = first_anim_type_for_nav_mesh_kind(params.kind);
                                let mask = TRAVERSE_ANIM_TYPE_FLAGS[anim as usize];
                                if mask & (1u32 << traverse_type) == 0 {
                                    continue;
                                }
                            }

                            let base_poly_ref = base_ref_base | i as PolyRef;
                            let land_poly_ref = land_ref_base | m as PolyRef;

                            // One traverse type per polygon pair.
                            if let Some(bits) = params.pairs.get(base_poly_ref, land_poly_ref) {
                                if bits & (1u32 << traverse_type) != 0 {
                                    continue;
                                }
                            }

                            let base_higher = base_edge.mid[2] > land_edge.mid[2];
                            let (low_mid, high_mid, low_dir, high_dir) = if base_higher {
                                (&land_edge.mid, &base_edge.mid, &land_dir, &base_dir)
                            } else {
                                (&base_edge.mid, &land_edge.mid, &base_dir, &land_dir)
                            };

                            let walkable_radius = if base_higher {
                                base_header.walkable_radius
                            } else {
                                land_header.walkable_radius
                            };

                            let slope_angle =
                                calc_slope_angle(&base_edge.mid, &land_edge.mid).abs();
                            let max_angle = calc_max_los_angle(walkable_radius, params.cell_height);
                            let offset_amount =
                                calc_ledge_span_offset(walkable_radius, slope_angle, max_angle);

                            if !traverse_link_in_los(
                                params.geom,
                                low_mid,
                                high_mid,
                                low_dir,
                                high_dir,
                                offset_amount,
                            ) {
                                continue;
                            }

                            let land_side = if params.link_to_neighbor {
                                classify_point_outside_bounds(
                                    &land_edge.mid,
                                    &land_header.bmin,
                                    &land_header.bmax,
                                )
                            } else {
                                classify_point_inside_bounds(
                                    &land_edge.mid,
                                    &land_header.bmin,
                                    &land_header.bmax,
                                )
                            };

                            // Install the pair; never leave one half behind.
                            let Some(forward_idx) = self.tile_mut(base_index).alloc_link() else {
                                return Ok(());
                            };
                            let Some(reverse_idx) = self.tile_mut(land_index).alloc_link() else {
                                self.tile_mut(base_index).free_link(forward_idx);
                                return Ok(());
                            };

                            first_base_link_used = true;
                            first_land_link_used = true;

                            {
                                let tile = self.tile_mut(base_index);
                                tile.links[forward_idx as usize] = Link {
                                    target: land_poly_ref,
                                    edge: j as u8,
                                    side: land_side,
                                    bmin: 0,
                                    bmax: 255,
                                    next: tile.polys[i].first_link,
                                    traverse_type,
                                    traverse_dist: quant_dist,
                                    reverse_link: reverse_idx as u16,
                                };
                                tile.polys[i].first_link = forward_idx;
                            }
                            {
                                let tile = self.tile_mut(land_index);
                                tile.links[reverse_idx as usize] = Link {
                                    target: base_poly_ref,
                                    edge: n as u8,
                                    side: base_side,
                                    bmin: 0,
                                    bmax: 255,
                                    next: tile.polys[m].first_link,
                                    traverse_type,
                                    traverse_dist: quant_dist,
                                    reverse_link: forward_idx as u16,
                                };
                                tile.polys[m].first_link = reverse_idx;
                            }

                            params.pairs.add(base_poly_ref, land_poly_ref, traverse_type);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Runs both traverse passes over every tile: cross-tile links first so
    /// same-tile links only consume what remains of each tile's budget.
    pub fn create_traverse_links(
        &mut self,
        geom: &dyn GeometryRaycast,
        kind: NavMeshKind,
        cell_height: f32,
        pairs: &mut TraverseLinkIndex,
    ) -> Result<(), crate::Status> {
        pairs.clear();

        for pass in [true, false] {
            for i in 0..self.max_tiles() {
                if self.tile(i).header.is_none() {
                    continue;
                }
                let tile_ref = self.tile_ref(i);
                let mut params = TraverseConnectParams {
                    geom,
                    link_to_neighbor: pass,
                    kind,
                    cell_height,
                    pairs,
                };
                self.connect_traverse_links(tile_ref, &mut params)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quant_link_distance_bounds() {
        assert_eq!(quant_link_distance(0.0), 0);
        assert_eq!(quant_link_distance(20.0), 2);
        // The cap quantises to the largest value, beyond it to zero.
        assert_eq!(quant_link_distance(TRAVERSE_DIST_MAX), 255);
        assert_eq!(quant_link_distance(TRAVERSE_DIST_MAX + 1.0), 0);
    }

    #[test]
    fn test_best_traverse_type_catalogue() {
        // 2 wu gap rounds to 0 and matches nothing.
        assert_eq!(best_traverse_type(0.0, quant_link_distance(2.0), true), NULL_TRAVERSE_TYPE);
        // 20 wu flat gap: small gap crossing.
        assert_eq!(best_traverse_type(0.0, quant_link_distance(20.0), true), 1);
        // 40 wu climb at short range: small object climb.
        assert_eq!(best_traverse_type(40.0, 6, true), 2);
        // The same elevation a little further out reads as a wall climb.
        assert_eq!(best_traverse_type(40.0, 8, true), 8);
        // Large gap crossing only links different groups.
        assert_eq!(best_traverse_type(10.0, 90, false), 7);
        assert_eq!(best_traverse_type(10.0, 90, true), NULL_TRAVERSE_TYPE);
        // Tall walls pick the highest matching slot.
        assert_eq!(best_traverse_type(600.0, 40, true), 20);
    }

    #[test]
    fn test_face_against() {
        // Low edge at y=0 facing +y, high edge at y=10 facing -y.
        let low = [0.0, 0.0, 0.0];
        let high = [0.0, 10.0, 5.0];
        let ln = [0.0, 1.0, 0.0];
        let hn = [0.0, -1.0, 0.0];
        assert!(poly_edge_face_against(&low, &high, &ln, &hn));
        // Both facing the same way: overhang.
        assert!(!poly_edge_face_against(&low, &high, &ln, &[0.0, 1.0, 0.0]));
    }

    #[test]
    fn test_pair_index() {
        let mut idx = TraverseLinkIndex::new();
        assert!(idx.add(7, 3, 1));
        // Order-insensitive, duplicate type rejected.
        assert!(!idx.add(3, 7, 1));
        assert!(idx.add(3, 7, 2));
        assert_eq!(idx.get(7, 3), Some((1 << 1) | (1 << 2)));
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn test_anim_masks_expose_catalogue_bits() {
        // Small agents can cross small gaps but not climb buildings.
        let human = TRAVERSE_ANIM_TYPE_FLAGS[TraverseAnimType::Human as usize];
        assert_ne!(human & (1 << 1), 0);
        assert_eq!(human & (1 << 10), 0);
        // Titans only climb walls.
        let titan = TRAVERSE_ANIM_TYPE_FLAGS[TraverseAnimType::Titan as usize];
        assert_eq!(titan, (1 << 9) | (1 << 10));
    }
}
