//! Container-level tests: reference encoding, tile management, portal
//! linking across tiles and tile-local queries.

use crate::navmesh::{NavMesh, NavMeshParams};
use crate::test_util::*;
use crate::{PolyFlags, Status, EXT_LINK, NULL_LINK, TILE_FREE_DATA};

fn two_tile_mesh() -> (NavMesh, crate::TileRef, crate::TileRef) {
    // Tile grid runs x against world x: tile 0 spans world x 10..20, tile 1
    // spans 0..10.
    let params = NavMeshParams {
        orig: [20.0, 0.0, 0.0],
        tile_width: 10.0,
        tile_height: 10.0,
        max_tiles: 4,
        max_polys: 16,
        ..Default::default()
    };
    let mut nav = NavMesh::new(&params).unwrap();

    let quad0 = [Quad::new(10.0, 0.0, 20.0, 10.0, 0.0)];
    let blob0 = tile_blob_with(
        &quad0,
        [10.0, 0.0, 0.0],
        [20.0, 10.0, 10.0],
        0,
        0,
        &[],
        |mesh| {
            // West edge of the quad sits on the tile boundary towards tile 1.
            let nvp = mesh.nvp;
            mesh.polys[nvp + 3] = EXT_LINK;
        },
    );

    let quad1 = [Quad::new(0.0, 0.0, 10.0, 10.0, 0.0)];
    let blob1 = tile_blob_with(
        &quad1,
        [0.0, 0.0, 0.0],
        [10.0, 10.0, 10.0],
        1,
        0,
        &[],
        |mesh| {
            let nvp = mesh.nvp;
            mesh.polys[nvp + 1] = EXT_LINK | 4;
        },
    );

    let ref0 = nav.add_tile(blob0, TILE_FREE_DATA, 0).unwrap();
    let ref1 = nav.add_tile(blob1, TILE_FREE_DATA, 0).unwrap();
    nav.connect_tile(ref0).unwrap();
    nav.connect_tile(ref1).unwrap();
    (nav, ref0, ref1)
}

#[test]
fn test_poly_ref_roundtrip() {
    let params = NavMeshParams {
        orig: [0.0; 3],
        tile_width: 10.0,
        tile_height: 10.0,
        max_tiles: 128,
        max_polys: 1000,
        ..Default::default()
    };
    let nav = NavMesh::new(&params).unwrap();

    let r = nav.encode_poly_id(5, 77, 123);
    let (salt, it, ip) = nav.decode_poly_id(r);
    assert_eq!((salt, it, ip), (5, 77, 123));
}

#[test]
fn test_new_rejects_oversized_bit_layout() {
    let params = NavMeshParams {
        orig: [0.0; 3],
        tile_width: 10.0,
        tile_height: 10.0,
        max_tiles: 1 << 20,
        max_polys: 1 << 14,
        ..Default::default()
    };
    let err = NavMesh::new(&params).unwrap_err();
    assert!(err.has_detail(Status::INVALID_PARAM));
}

#[test]
fn test_new_rejects_degenerate_params() {
    let params = NavMeshParams {
        orig: [0.0; 3],
        tile_width: 0.0,
        tile_height: 10.0,
        max_tiles: 4,
        max_polys: 16,
        ..Default::default()
    };
    assert!(NavMesh::new(&params).is_err());
}

#[test]
fn test_add_tile_occupied_slot() {
    let bmin = [0.0, 0.0, 0.0];
    let bmax = [10.0, 10.0, 10.0];
    let quads = [Quad::new(0.0, 0.0, 10.0, 10.0, 0.0)];

    let mut nav = single_tile_mesh(bmin, bmax);
    let blob = tile_blob(&quads, bmin, bmax, 0, 0);
    let blob2 = blob.clone();
    nav.add_tile(blob, TILE_FREE_DATA, 0).unwrap();

    let err = nav.add_tile(blob2, TILE_FREE_DATA, 0).unwrap_err();
    assert!(err.has_detail(Status::ALREADY_OCCUPIED));
}

#[test]
fn test_internal_links_built_on_add() {
    // Two quads sharing an edge link to each other inside the tile.
    let bmin = [0.0, 0.0, 0.0];
    let bmax = [20.0, 10.0, 10.0];
    let quads = [
        Quad::new(0.0, 0.0, 10.0, 10.0, 0.0),
        Quad::new(10.0, 0.0, 20.0, 10.0, 0.0),
    ];
    let mut nav = single_tile_mesh(bmin, bmax);
    let blob = tile_blob_with(&quads, bmin, bmax, 0, 0, &[], |mesh| {
        let nvp = mesh.nvp;
        mesh.polys[nvp + 1] = 1;
        mesh.polys[nvp * 2 + nvp + 3] = 0;
    });
    nav.add_tile(blob, TILE_FREE_DATA, 0).unwrap();

    let base = nav.poly_ref_base(0);
    let tile = nav.tile(0);
    let l0 = tile.polys[0].first_link;
    assert_ne!(l0, NULL_LINK);
    assert_eq!(tile.links[l0 as usize].target, base | 1);
    let l1 = tile.polys[1].first_link;
    assert_eq!(tile.links[l1 as usize].target, base);
}

#[test]
fn test_cross_tile_portal_links() {
    let (nav, ref0, ref1) = two_tile_mesh();
    let (_, it0, _) = nav.decode_poly_id(ref0);
    let (_, it1, _) = nav.decode_poly_id(ref1);

    // Each tile's polygon links across the portal to the other's.
    for (it, other) in [(it0, it1), (it1, it0)] {
        let tile = nav.tile(it);
        let mut found = false;
        let mut l = tile.polys[0].first_link;
        while l != NULL_LINK {
            let link = &tile.links[l as usize];
            if nav.decode_poly_id_tile(link.target) == other {
                found = true;
                // Boundary links carry the full sub-edge range here.
                assert!(link.side == 0 || link.side == 4);
                assert!(link.bmax > link.bmin);
            }
            l = link.next;
        }
        assert!(found, "tile {it} has no portal link to {other}");
    }
}

#[test]
fn test_remove_tile_drops_remote_links() {
    let (mut nav, ref0, ref1) = two_tile_mesh();
    let (_, it1, _) = nav.decode_poly_id(ref1);

    nav.remove_tile(ref0).unwrap();

    // Tile 1 no longer links anywhere.
    let tile = nav.tile(it1);
    assert_eq!(tile.polys[0].first_link, NULL_LINK);

    // The removed reference faults.
    assert!(nav.tile_by_ref(ref0).is_none());
    assert!(nav.remove_tile(ref0).is_err());
}

#[test]
fn test_add_tile_with_last_ref_restores_slot() {
    let bmin = [0.0, 0.0, 0.0];
    let bmax = [10.0, 10.0, 10.0];
    let quads = [Quad::new(0.0, 0.0, 10.0, 10.0, 0.0)];

    let mut nav = single_tile_mesh(bmin, bmax);
    let blob = tile_blob(&quads, bmin, bmax, 0, 0);
    let r = nav.add_tile(blob, 0, 0).unwrap();
    let data = nav.remove_tile(r).unwrap().unwrap();

    // Reloading with the old reference reclaims slot and salt, so the old
    // reference stays valid.
    let r2 = nav.add_tile(data, 0, r).unwrap();
    assert_eq!(r, r2);
    assert!(nav.is_valid_poly_ref(r));
}

#[test]
fn test_poly_flags_and_area_accessors() {
    let bmin = [0.0, 0.0, 0.0];
    let bmax = [10.0, 10.0, 10.0];
    let quads = [Quad::new(0.0, 0.0, 10.0, 10.0, 0.0)];
    let mut nav = single_tile_mesh(bmin, bmax);
    let blob = tile_blob(&quads, bmin, bmax, 0, 0);
    nav.add_tile(blob, TILE_FREE_DATA, 0).unwrap();

    let r = nav.poly_ref_base(0);
    assert_eq!(nav.poly_flags(r).unwrap(), PolyFlags::WALK);

    nav.set_poly_flags(r, PolyFlags::WALK | PolyFlags::DISABLED)
        .unwrap();
    assert!(nav.poly_flags(r).unwrap().contains(PolyFlags::DISABLED));

    nav.set_poly_area(r, 5).unwrap();
    assert_eq!(nav.poly_area(r).unwrap(), 5);

    // A stale reference is rejected.
    let bogus = nav.encode_poly_id(0x3f, 0, 0);
    assert!(nav.poly_flags(bogus).is_err());
}

#[test]
fn test_find_nearest_poly_in_tile() {
    let bmin = [0.0, 0.0, 0.0];
    let bmax = [10.0, 10.0, 10.0];
    let quads = [Quad::new(0.0, 0.0, 10.0, 10.0, 1.0)];
    let mut nav = single_tile_mesh(bmin, bmax);
    let blob = tile_blob(&quads, bmin, bmax, 0, 0);
    nav.add_tile(blob, TILE_FREE_DATA, 0).unwrap();

    let (poly, nearest) = nav
        .find_nearest_poly_in_tile(0, &[5.0, 5.0, 1.5], &[2.0, 2.0, 4.0])
        .expect("nearest poly");
    assert_eq!(poly, 0);
    assert!((nearest[0] - 5.0).abs() < 1e-4);
    assert!((nearest[1] - 5.0).abs() < 1e-4);
    // Snaps onto the surface height.
    assert!((nearest[2] - 1.0).abs() < 0.26);
}

#[test]
fn test_calc_tile_loc_descending_x() {
    let (nav, _, _) = two_tile_mesh();
    // World x 15 lies in tile 0, world x 5 in tile 1.
    assert_eq!(nav.calc_tile_loc(&[15.0, 5.0, 0.0]), (0, 0));
    assert_eq!(nav.calc_tile_loc(&[5.0, 5.0, 0.0]), (1, 0));
}

#[test]
fn test_tile_blob_identical_for_identical_input() {
    let bmin = [0.0, 0.0, 0.0];
    let bmax = [10.0, 10.0, 10.0];
    let quads = [Quad::new(0.0, 0.0, 10.0, 10.0, 0.0)];
    let a = tile_blob(&quads, bmin, bmax, 0, 0);
    let b = tile_blob(&quads, bmin, bmax, 0, 0);
    assert_eq!(a, b);
}

#[test]
fn test_query_polygons_via_bv_tree() {
    let bmin = [0.0, 0.0, 0.0];
    let bmax = [20.0, 10.0, 10.0];
    let quads = [
        Quad::new(0.0, 0.0, 10.0, 10.0, 0.0),
        Quad::new(10.0, 0.0, 20.0, 10.0, 0.0),
    ];
    let mut nav = single_tile_mesh(bmin, bmax);
    let blob = tile_blob(&quads, bmin, bmax, 0, 0);
    nav.add_tile(blob, TILE_FREE_DATA, 0).unwrap();

    let hits = nav.query_polygons_in_tile(0, &[2.0, 2.0, -1.0], &[4.0, 4.0, 2.0]);
    assert_eq!(hits, vec![0]);
    let hits = nav.query_polygons_in_tile(0, &[0.0, 0.0, -1.0], &[20.0, 10.0, 2.0]);
    assert_eq!(hits.len(), 2);
}

#[test]
fn test_hard_edges_keep_null_neighbour() {
    // The fixture's quads have only hard edges; the packed tile keeps them
    // as zero (no connection) rather than inventing adjacency.
    let bmin = [0.0, 0.0, 0.0];
    let bmax = [10.0, 10.0, 10.0];
    let quads = [Quad::new(0.0, 0.0, 10.0, 10.0, 0.0)];
    let mut nav = single_tile_mesh(bmin, bmax);
    let blob = tile_blob(&quads, bmin, bmax, 0, 0);
    nav.add_tile(blob, TILE_FREE_DATA, 0).unwrap();

    let poly = &nav.tile(0).polys[0];
    assert_eq!(poly.vert_count, 4);
    for j in 0..poly.vert_count as usize {
        assert_eq!(poly.neis[j], 0);
    }
}
