//! Disjoint polygon groups and static traverse tables.
//!
//! Groups label the connected components of the fully linked polygon graph;
//! the tables precompute, per agent anim type, which groups reach which
//! through the traverse links that anim type can perform.

use crate::navmesh::NavMesh;
use crate::tile::Link;
use crate::traverse::{
    first_anim_type_for_nav_mesh_kind, NavMeshKind, TRAVERSE_ANIM_TYPE_FLAGS,
};
use crate::{
    Status, FIRST_USABLE_POLY_GROUP, FULL_UNLINKED_TILE_USER_ID, NULL_LINK,
    NULL_TRAVERSE_REVERSE_LINK, SEMI_UNLINKED_TILE_USER_ID, UNLINKED_POLY_GROUP,
};

/// Union-find with ranks and path compression.
#[derive(Debug, Default, Clone)]
pub struct DisjointSet {
    rank: Vec<i32>,
    parent: Vec<i32>,
}

impl DisjointSet {
    pub fn new(size: usize) -> Self {
        Self {
            rank: vec![0; size],
            parent: (0..size as i32).collect(),
        }
    }

    pub fn insert_new(&mut self) -> i32 {
        self.rank.push(0);
        let id = self.parent.len() as i32;
        self.parent.push(id);
        id
    }

    pub fn find(&mut self, id: i32) -> i32 {
        let mut root = id;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut cur = id;
        while self.parent[cur as usize] != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        root
    }

    pub fn set_union(&mut self, x: i32, y: i32) {
        let sx = self.find(x);
        let sy = self.find(y);
        if sx == sy {
            return;
        }
        match self.rank[sx as usize].cmp(&self.rank[sy as usize]) {
            std::cmp::Ordering::Less => self.parent[sx as usize] = sy,
            std::cmp::Ordering::Greater => self.parent[sy as usize] = sx,
            std::cmp::Ordering::Equal => {
                self.parent[sy as usize] = sx;
                self.rank[sx as usize] += 1;
            }
        }
    }

    pub fn set_count(&self) -> usize {
        self.parent.len()
    }
}

/// Parameters for group and table construction.
pub struct TraverseTableCreateParams {
    /// Number of tables the navmesh carries.
    pub table_count: i32,
    /// The navmesh kind; selects anim types for each table.
    pub kind: NavMeshKind,
    /// Whether an anim type (by table index) can use a link. Links without a
    /// reverse half (plain adjacency, off-mesh) are traversable by everyone.
    pub can_traverse: fn(kind: NavMeshKind, link: &Link, table_index: i32) -> bool,
    /// Collapse every linked component into one group instead of failing
    /// when the component count exceeds the 16-bit label space.
    pub collapse_groups: bool,
}

impl Default for TraverseTableCreateParams {
    fn default() -> Self {
        Self {
            table_count: 1,
            kind: NavMeshKind::Small,
            can_traverse: anim_type_supports_traverse_link,
            collapse_groups: false,
        }
    }
}

/// Default capability check: plain links always pass; traverse links pass
/// when the anim type bound to `table_index` has the type bit set.
pub fn anim_type_supports_traverse_link(kind: NavMeshKind, link: &Link, table_index: i32) -> bool {
    if link.reverse_link == NULL_TRAVERSE_REVERSE_LINK {
        return true;
    }
    if table_index < 0 {
        // Any anim type at all.
        let all: u32 = TRAVERSE_ANIM_TYPE_FLAGS.iter().fold(0, |acc, m| acc | m);
        return all & (1u32 << link.traverse_type()) != 0;
    }
    let anim = if kind == NavMeshKind::Small {
        table_index as usize
    } else {
        first_anim_type_for_nav_mesh_kind(kind) as usize
    };
    TRAVERSE_ANIM_TYPE_FLAGS[anim] & (1u32 << link.traverse_type()) != 0
}

/// Row stride of a traverse table in 32-bit words.
fn table_stride(num_poly_groups: i32) -> i32 {
    (num_poly_groups + 31) / 32
}

/// Word index of the reachability bit for `(group1, group2)`; the bit within
/// the word is `group2 & 31`.
pub fn calc_traverse_table_cell_index(num_poly_groups: i32, group1: u16, group2: u16) -> i32 {
    group1 as i32 * table_stride(num_poly_groups) + group2 as i32 / 32
}

/// Byte size of one traverse table for `num_poly_groups` groups.
pub fn calc_traverse_table_size(num_poly_groups: i32) -> i32 {
    4 * num_poly_groups * table_stride(num_poly_groups)
}

/// Linear index bookkeeping over all polygons of all tiles.
struct PolyIndexer {
    /// First linear index per tile.
    offsets: Vec<usize>,
    total: usize,
}

impl PolyIndexer {
    fn new(nav: &NavMesh) -> Self {
        let mut offsets = Vec::with_capacity(nav.max_tiles() as usize);
        let mut total = 0usize;
        for i in 0..nav.max_tiles() {
            offsets.push(total);
            total += nav.tile(i).polys.len();
        }
        Self { offsets, total }
    }

    fn index(&self, tile: u32, poly: u32) -> i32 {
        (self.offsets[tile as usize] + poly as usize) as i32
    }
}

/// Runs union-find over the linked polygon graph, joining endpoints of every
/// link the filter admits.
fn union_linked_polys(
    nav: &NavMesh,
    indexer: &PolyIndexer,
    params: &TraverseTableCreateParams,
    table_index: i32,
) -> DisjointSet {
    let mut set = DisjointSet::new(indexer.total);

    for it in 0..nav.max_tiles() {
        let tile = nav.tile(it);
        if tile.header.is_none() {
            continue;
        }
        for (ip, poly) in tile.polys.iter().enumerate() {
            let from = indexer.index(it, ip as u32);
            let mut l = poly.first_link;
            while l != NULL_LINK {
                let link = &tile.links[l as usize];
                if (params.can_traverse)(params.kind, link, table_index) {
                    if let Ok((tt, tp)) = nav.get_tile_and_poly_by_ref(link.target) {
                        set.set_union(from, indexer.index(tt, tp));
                    }
                }
                l = link.next;
            }
        }
    }

    set
}

/// Assigns compacted group ids from the disjoint-set components. When
/// `mark_unlinked` is set, polygons without a single outbound link land in
/// [`UNLINKED_POLY_GROUP`] and tiles get their unlinked user-id tags;
/// otherwise every polygon receives a real component id so the traverse-link
/// generator can reason about groups before linking completes.
fn assign_poly_groups(
    nav: &mut NavMesh,
    params: &TraverseTableCreateParams,
    set: &mut DisjointSet,
    indexer: &PolyIndexer,
    mark_unlinked: bool,
) -> Result<(), Status> {
    let mut root_to_group: std::collections::HashMap<i32, u16> = std::collections::HashMap::new();
    let mut next_group = FIRST_USABLE_POLY_GROUP;
    let mut overflowed = false;

    for it in 0..nav.max_tiles() {
        if nav.tile(it).header.is_none() {
            continue;
        }
        let poly_count = nav.tile(it).polys.len();
        let mut linked = 0usize;

        for ip in 0..poly_count {
            let has_links = nav.tile(it).polys[ip].first_link != NULL_LINK;
            if has_links {
                linked += 1;
            }
            let group = if mark_unlinked && !has_links {
                UNLINKED_POLY_GROUP
            } else {
                let root = set.find(indexer.index(it, ip as u32));
                match root_to_group.get(&root) {
                    Some(&g) => g,
                    None => {
                        if next_group == u16::MAX {
                            overflowed = true;
                            FIRST_USABLE_POLY_GROUP
                        } else {
                            let g = next_group;
                            root_to_group.insert(root, g);
                            next_group += 1;
                            g
                        }
                    }
                }
            };
            nav.tile_mut(it).polys[ip].group_id = group;
        }

        if mark_unlinked {
            // Tag tiles by how much of them links anywhere.
            let user_id = if linked == 0 && poly_count > 0 {
                FULL_UNLINKED_TILE_USER_ID
            } else if linked < poly_count {
                SEMI_UNLINKED_TILE_USER_ID
            } else {
                0
            };
            if let Some(header) = nav.tile_mut(it).header.as_mut() {
                header.user_id = user_id;
            }
        }
    }

    if overflowed {
        if !params.collapse_groups {
            return Err(Status::failure_detail(Status::OUT_OF_MEMORY));
        }
        // Collapse every linked component into the first usable group.
        for it in 0..nav.max_tiles() {
            let poly_count = nav.tile(it).polys.len();
            for ip in 0..poly_count {
                let tile = nav.tile_mut(it);
                if tile.polys[ip].group_id >= FIRST_USABLE_POLY_GROUP {
                    tile.polys[ip].group_id = FIRST_USABLE_POLY_GROUP;
                }
            }
        }
        next_group = FIRST_USABLE_POLY_GROUP + 1;
    }

    nav.set_poly_group_count(next_group as i32);
    Ok(())
}

/// Builds the disjoint set over all polygons (every link traversable by any
/// anim type unions its endpoints) and assigns provisional group ids.
///
/// Runs before traverse-link generation: every polygon gets a real component
/// id so group-sensitive catalogue slots classify correctly.
pub fn create_disjoint_poly_groups(
    nav: &mut NavMesh,
    params: &TraverseTableCreateParams,
) -> Result<DisjointSet, Status> {
    let indexer = PolyIndexer::new(nav);
    let mut set = union_linked_polys(nav, &indexer, params, -1);
    assign_poly_groups(nav, params, &mut set, &indexer, false)?;
    Ok(set)
}

/// Recomputes the disjoint set over the fully linked graph and writes the
/// final group labels: unlinked polygons drop into the trash group and tiles
/// get their unlinked user-id tags.
pub fn update_disjoint_poly_groups(
    nav: &mut NavMesh,
    params: &TraverseTableCreateParams,
) -> Result<DisjointSet, Status> {
    let indexer = PolyIndexer::new(nav);
    let mut set = union_linked_polys(nav, &indexer, params, -1);
    assign_poly_groups(nav, params, &mut set, &indexer, true)?;
    Ok(set)
}

/// Builds one traverse table per anim type and attaches them to the navmesh.
pub fn create_traverse_table_data(
    nav: &mut NavMesh,
    params: &TraverseTableCreateParams,
) -> Result<(), Status> {
    let group_count = nav.poly_group_count();
    if group_count < 0 {
        return Err(Status::failure_detail(Status::INVALID_PARAM));
    }
    let stride = table_stride(group_count) as usize;
    let words = group_count as usize * stride;

    let indexer = PolyIndexer::new(nav);
    let mut tables: Vec<Vec<u32>> = Vec::with_capacity(params.table_count as usize);

    for table_index in 0..params.table_count {
        let mut set = union_linked_polys(nav, &indexer, params, table_index);

        // Root of each group under this anim type's link filter.
        let mut group_root: std::collections::HashMap<u16, i32> = std::collections::HashMap::new();
        for it in 0..nav.max_tiles() {
            if nav.tile(it).header.is_none() {
                continue;
            }
            for (ip, poly) in nav.tile(it).polys.iter().enumerate() {
                if poly.group_id >= FIRST_USABLE_POLY_GROUP {
                    let root = set.find(indexer.index(it, ip as u32));
                    group_root.entry(poly.group_id).or_insert(root);
                }
            }
        }

        let mut table = vec![0u32; words];
        let groups: Vec<u16> = group_root.keys().copied().collect();
        for &g1 in &groups {
            for &g2 in &groups {
                if group_root[&g1] == group_root[&g2] {
                    let cell = calc_traverse_table_cell_index(group_count, g1, g2) as usize;
                    table[cell] |= 1u32 << (g2 & 31);
                }
            }
        }
        tables.push(table);
    }

    nav.set_traverse_tables(tables);
    nav.set_traverse_table_size(calc_traverse_table_size(group_count));
    nav.set_traverse_table_count(params.table_count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disjoint_set_union_find() {
        let mut set = DisjointSet::new(5);
        set.set_union(0, 1);
        set.set_union(3, 4);
        assert_eq!(set.find(0), set.find(1));
        assert_ne!(set.find(1), set.find(3));
        set.set_union(1, 3);
        assert_eq!(set.find(0), set.find(4));
        assert_ne!(set.find(2), set.find(0));
    }

    #[test]
    fn test_disjoint_set_insert() {
        let mut set = DisjointSet::new(2);
        let id = set.insert_new();
        assert_eq!(id, 2);
        assert_eq!(set.set_count(), 3);
        assert_eq!(set.find(id), id);
    }

    #[test]
    fn test_table_size_and_cell_index() {
        // 40 groups: rows of two words.
        assert_eq!(calc_traverse_table_size(40), 4 * 40 * 2);
        assert_eq!(calc_traverse_table_cell_index(40, 0, 0), 0);
        assert_eq!(calc_traverse_table_cell_index(40, 0, 35), 1);
        assert_eq!(calc_traverse_table_cell_index(40, 2, 3), 4);
        // 32 groups fit one word per row.
        assert_eq!(calc_traverse_table_size(32), 4 * 32);
    }

    #[test]
    fn test_default_can_traverse() {
        let plain = Link::default();
        assert!(anim_type_supports_traverse_link(NavMeshKind::Small, &plain, 0));

        let mut jump = Link::default();
        jump.reverse_link = 5;
        jump.traverse_type = 10; // building climb
        // Humans cannot climb buildings, frag drones can.
        assert!(!anim_type_supports_traverse_link(NavMeshKind::Small, &jump, 0));
        assert!(anim_type_supports_traverse_link(NavMeshKind::Small, &jump, 3));
        // Large navmeshes consult their single anim type.
        jump.traverse_type = 9;
        assert!(anim_type_supports_traverse_link(NavMeshKind::Large, &jump, 0));
    }
}
