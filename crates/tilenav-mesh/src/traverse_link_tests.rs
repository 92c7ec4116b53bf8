//! End-to-end traverse-link scenarios: gap crossings, climbs, overhang
//! rejection and reachability through the disjoint groups and tables.

use crate::table::{
    create_disjoint_poly_groups, create_traverse_table_data, update_disjoint_poly_groups,
    TraverseTableCreateParams,
};
use crate::test_util::*;
use crate::traverse::{NavMeshKind, TraverseLinkIndex};
use crate::{
    NavMesh, FIRST_USABLE_POLY_GROUP, NULL_LINK, NULL_TRAVERSE_REVERSE_LINK, TILE_FREE_DATA,
    UNLINKED_POLY_GROUP,
};

/// Builds a one-tile navmesh holding the given quads and runs group
/// creation, both traverse passes, the final group update and the tables.
fn build_linked_mesh(
    quads: &[Quad],
    bmin: [f32; 3],
    bmax: [f32; 3],
    kind: NavMeshKind,
) -> (NavMesh, TraverseLinkIndex) {
    let mut nav = single_tile_mesh(bmin, bmax);
    let blob = tile_blob(quads, bmin, bmax, 0, 0);
    let tile_ref = nav.add_tile(blob, TILE_FREE_DATA, 0).expect("add tile");
    nav.connect_tile(tile_ref).expect("connect tile");

    let params = TraverseTableCreateParams {
        table_count: crate::table_count_for_nav_mesh_kind(kind),
        kind,
        ..Default::default()
    };
    create_disjoint_poly_groups(&mut nav, &params).expect("groups");

    let mut pairs = TraverseLinkIndex::new();
    nav.create_traverse_links(&OpenGeometry, kind, TEST_CH, &mut pairs)
        .expect("traverse links");

    update_disjoint_poly_groups(&mut nav, &params).expect("update groups");
    create_traverse_table_data(&mut nav, &params).expect("tables");

    (nav, pairs)
}

fn quad_pair(gap: f32) -> (Vec<Quad>, [f32; 3], [f32; 3]) {
    let quads = vec![
        Quad::new(0.0, 0.0, 10.0, 10.0, 0.0),
        Quad::new(10.0 + gap, 0.0, 20.0 + gap, 10.0, 0.0),
    ];
    let bmin = [0.0, 0.0, 0.0];
    let bmax = [20.0 + gap, 10.0, 50.0];
    (quads, bmin, bmax)
}

#[test]
fn test_small_gap_quantises_to_zero_and_rejects() {
    // A 2 wu gap rounds below the quantisation step; no link forms.
    let (quads, bmin, bmax) = quad_pair(2.0);
    let (nav, pairs) = build_linked_mesh(&quads, bmin, bmax, NavMeshKind::Small);
    assert_eq!(count_traverse_links(&nav), 0);
    assert!(pairs.is_empty());
}

#[test]
fn test_gap_crossing_links_both_ways() {
    // A 20 wu gap quantises to 2: a small gap crossing.
    let (quads, bmin, bmax) = quad_pair(20.0);
    let (nav, pairs) = build_linked_mesh(&quads, bmin, bmax, NavMeshKind::Small);

    assert_eq!(count_traverse_links(&nav), 2);
    assert_eq!(pairs.len(), 1);

    let tile = nav.tile(0);
    let mut seen = 0;
    for poly in &tile.polys {
        let mut l = poly.first_link;
        while l != NULL_LINK {
            let link = &tile.links[l as usize];
            if link.has_traverse_type() {
                seen += 1;
                assert_eq!(link.traverse_type(), 1);
                assert_eq!(link.traverse_dist, 2);
                assert_ne!(link.reverse_link, NULL_TRAVERSE_REVERSE_LINK);

                // The reverse half points straight back.
                let reverse = &tile.links[link.reverse_link as usize];
                assert_eq!(reverse.traverse_type(), link.traverse_type());
                assert_eq!(reverse.traverse_dist, link.traverse_dist);
                assert_eq!(
                    tile.links[reverse.reverse_link as usize].target,
                    link.target
                );
            }
            l = link.next;
        }
    }
    assert_eq!(seen, 2);
}

#[test]
fn test_step_up_classifies_as_object_climb() {
    // 40 wu climb, 21 wu of horizontal travel: quantised distance 5, the
    // small object climb slot.
    let quads = vec![
        Quad::new(0.0, 0.0, 10.0, 10.0, 0.0),
        Quad::new(31.0, 0.0, 41.0, 10.0, 40.0),
    ];
    let bmin = [0.0, 0.0, 0.0];
    let bmax = [41.0, 10.0, 50.0];
    let (nav, _) = build_linked_mesh(&quads, bmin, bmax, NavMeshKind::Small);

    assert_eq!(count_traverse_links(&nav), 2);
    let tile = nav.tile(0);
    for poly in &tile.polys {
        let mut l = poly.first_link;
        while l != NULL_LINK {
            let link = &tile.links[l as usize];
            if link.has_traverse_type() {
                assert_eq!(link.traverse_type(), 2);
            }
            l = link.next;
        }
    }
}

#[test]
fn test_overhang_rejected_by_face_against() {
    // The upper plate overhangs the lower one: the facing edges' normals
    // point into the same half-plane, so no candidate pair survives the
    // face-against test.
    let quads = vec![
        Quad::new(0.0, 0.0, 10.0, 10.0, 0.0),
        Quad::new(5.0, 0.0, 15.0, 10.0, 40.0),
    ];
    let bmin = [0.0, 0.0, 0.0];
    let bmax = [15.0, 10.0, 50.0];
    let (nav, _) = build_linked_mesh(&quads, bmin, bmax, NavMeshKind::Small);
    assert_eq!(count_traverse_links(&nav), 0);
}

#[test]
fn test_blocked_los_rejects_link() {
    let (quads, bmin, bmax) = quad_pair(20.0);
    let mut nav = single_tile_mesh(bmin, bmax);
    let blob = tile_blob(&quads, bmin, bmax, 0, 0);
    let tile_ref = nav.add_tile(blob, TILE_FREE_DATA, 0).unwrap();
    nav.connect_tile(tile_ref).unwrap();

    let params = TraverseTableCreateParams::default();
    create_disjoint_poly_groups(&mut nav, &params).unwrap();

    let mut pairs = TraverseLinkIndex::new();
    nav.create_traverse_links(&SolidGeometry, NavMeshKind::Small, TEST_CH, &mut pairs)
        .unwrap();
    assert_eq!(count_traverse_links(&nav), 0);
}

/// Two islands of two internally adjacent polygons each, separated by a
/// 20 wu gap.
fn island_mesh(kind: NavMeshKind) -> NavMesh {
    let quads = vec![
        Quad::new(0.0, 0.0, 5.0, 10.0, 0.0),
        Quad::new(5.0, 0.0, 10.0, 10.0, 0.0),
        Quad::new(30.0, 0.0, 35.0, 10.0, 0.0),
        Quad::new(35.0, 0.0, 40.0, 10.0, 0.0),
    ];
    let bmin = [0.0, 0.0, 0.0];
    let bmax = [40.0, 10.0, 50.0];

    let mut nav = single_tile_mesh(bmin, bmax);
    let blob = tile_blob_with(&quads, bmin, bmax, 0, 0, &[], |mesh| {
        // Wire the shared edges inside each island: east edge is index 1,
        // west edge index 3.
        let nvp = mesh.nvp;
        mesh.polys[nvp + 1] = 1;
        mesh.polys[nvp * 2 + nvp + 3] = 0;
        mesh.polys[nvp * 2 * 2 + nvp + 1] = 3;
        mesh.polys[nvp * 2 * 3 + nvp + 3] = 2;
    });
    let tile_ref = nav.add_tile(blob, TILE_FREE_DATA, 0).unwrap();
    nav.connect_tile(tile_ref).unwrap();

    let params = TraverseTableCreateParams {
        table_count: crate::table_count_for_nav_mesh_kind(kind),
        kind,
        ..Default::default()
    };
    create_disjoint_poly_groups(&mut nav, &params).unwrap();
    let mut pairs = TraverseLinkIndex::new();
    nav.create_traverse_links(&OpenGeometry, kind, TEST_CH, &mut pairs)
        .unwrap();
    update_disjoint_poly_groups(&mut nav, &params).unwrap();
    create_traverse_table_data(&mut nav, &params).unwrap();
    nav
}

#[test]
fn test_islands_reachability_by_anim_mask() {
    // Titans cannot cross small gaps: the islands stay separate groups and
    // static pathing keeps them apart.
    let nav = island_mesh(NavMeshKind::Large);
    assert_eq!(count_traverse_links(&nav), 0);

    let a = nav.poly_ref_base(0);
    let b = nav.poly_ref_base(0) | 2;
    let tile = nav.tile(0);
    assert!(tile.polys[0].group_id >= FIRST_USABLE_POLY_GROUP);
    assert_ne!(tile.polys[0].group_id, tile.polys[2].group_id);
    assert!(!nav.is_goal_poly_reachable(a, b, false, 0));

    // Humans can: the gap link unions the islands into one group, and the
    // disjoint check alone answers.
    let nav = island_mesh(NavMeshKind::Small);
    assert_eq!(count_traverse_links(&nav), 2);
    let a = nav.poly_ref_base(0);
    let b = nav.poly_ref_base(0) | 2;
    let tile = nav.tile(0);
    assert_eq!(tile.polys[0].group_id, tile.polys[2].group_id);
    assert!(tile.polys[0].group_id >= FIRST_USABLE_POLY_GROUP);
    assert!(nav.is_goal_poly_reachable(a, b, true, -1));
}

#[test]
fn test_traverse_tables_symmetric() {
    let (quads, bmin, bmax) = quad_pair(20.0);
    let (nav, _) = build_linked_mesh(&quads, bmin, bmax, NavMeshKind::Small);

    let count = nav.poly_group_count();
    assert!(count >= 2);
    for table in nav.traverse_tables() {
        for g1 in 0..count as u16 {
            for g2 in 0..count as u16 {
                let c12 = crate::calc_traverse_table_cell_index(count, g1, g2) as usize;
                let c21 = crate::calc_traverse_table_cell_index(count, g2, g1) as usize;
                let b12 = table.get(c12).map(|w| w & (1 << (g2 & 31)) != 0).unwrap_or(false);
                let b21 = table.get(c21).map(|w| w & (1 << (g1 & 31)) != 0).unwrap_or(false);
                assert_eq!(b12, b21, "asymmetric at ({g1}, {g2})");
            }
        }
    }
}

#[test]
fn test_isolated_poly_marked_unlinked() {
    // A lone island far past every catalogue range keeps no links and lands
    // in the trash group.
    let quads = vec![
        Quad::new(0.0, 0.0, 10.0, 10.0, 0.0),
        Quad::new(5000.0, 0.0, 5010.0, 10.0, 0.0),
    ];
    let bmin = [0.0, 0.0, 0.0];
    let bmax = [5010.0, 10.0, 50.0];
    let (nav, _) = build_linked_mesh(&quads, bmin, bmax, NavMeshKind::Small);

    assert_eq!(count_traverse_links(&nav), 0);
    let tile = nav.tile(0);
    assert_eq!(tile.polys[0].group_id, UNLINKED_POLY_GROUP);
    assert_eq!(tile.polys[1].group_id, UNLINKED_POLY_GROUP);
    assert_eq!(
        tile.header.as_ref().unwrap().user_id,
        crate::FULL_UNLINKED_TILE_USER_ID
    );
}

#[test]
fn test_tile_remove_add_restores_links() {
    let (quads, bmin, bmax) = quad_pair(20.0);
    let mut nav = single_tile_mesh(bmin, bmax);
    let blob = tile_blob(&quads, bmin, bmax, 0, 0);
    // Keep ownership outside the mesh so removal hands the blob back.
    let tile_ref = nav.add_tile(blob, 0, 0).unwrap();
    nav.connect_tile(tile_ref).unwrap();

    let params = TraverseTableCreateParams::default();
    create_disjoint_poly_groups(&mut nav, &params).unwrap();
    let mut pairs = TraverseLinkIndex::new();
    nav.create_traverse_links(&OpenGeometry, NavMeshKind::Small, TEST_CH, &mut pairs)
        .unwrap();
    assert_eq!(count_traverse_links(&nav), 2);

    let data = nav.remove_tile(tile_ref).unwrap().expect("tile data");
    assert_eq!(count_traverse_links(&nav), 0);
    pairs.prune_tile(&nav, 0);
    assert!(pairs.is_empty());

    // Adding the serialised state back restores the links; the old
    // reference no longer validates because the salt moved on.
    let new_ref = nav.add_tile(data, 0, 0).unwrap();
    assert_ne!(new_ref, tile_ref);
    assert!(!nav.is_valid_poly_ref(tile_ref));
    assert_eq!(count_traverse_links(&nav), 2);
}
