//! Set file round-trips and corruption handling.

use std::io::Cursor;

use crate::set_io::{load_nav_mesh, nav_mesh_file_name, nav_mesh_version_for_set, save_nav_mesh};
use crate::table::{
    create_disjoint_poly_groups, create_traverse_table_data, update_disjoint_poly_groups,
    TraverseTableCreateParams,
};
use crate::test_util::*;
use crate::traverse::{NavMeshKind, TraverseLinkIndex};
use crate::{NavMesh, Status, TILE_FREE_DATA};

fn linked_two_quad_mesh() -> NavMesh {
    let quads = vec![
        Quad::new(0.0, 0.0, 10.0, 10.0, 0.0),
        Quad::new(30.0, 0.0, 40.0, 10.0, 0.0),
    ];
    let bmin = [0.0, 0.0, 0.0];
    let bmax = [40.0, 10.0, 50.0];

    let mut nav = single_tile_mesh(bmin, bmax);
    let blob = tile_blob(&quads, bmin, bmax, 0, 0);
    let tile_ref = nav.add_tile(blob, TILE_FREE_DATA, 0).unwrap();
    nav.connect_tile(tile_ref).unwrap();

    let params = TraverseTableCreateParams {
        table_count: crate::table_count_for_nav_mesh_kind(NavMeshKind::Small),
        kind: NavMeshKind::Small,
        ..Default::default()
    };
    create_disjoint_poly_groups(&mut nav, &params).unwrap();
    let mut pairs = TraverseLinkIndex::new();
    nav.create_traverse_links(&OpenGeometry, NavMeshKind::Small, TEST_CH, &mut pairs)
        .unwrap();
    update_disjoint_poly_groups(&mut nav, &params).unwrap();
    create_traverse_table_data(&mut nav, &params).unwrap();
    nav
}

#[test]
fn test_save_load_roundtrip() {
    let nav = linked_two_quad_mesh();

    let mut buf = Vec::new();
    save_nav_mesh(&nav, &mut buf).unwrap();

    let loaded = load_nav_mesh(&mut Cursor::new(&buf)).unwrap();

    assert_eq!(loaded.params(), nav.params());
    assert_eq!(loaded.tile_count(), nav.tile_count());
    assert_eq!(loaded.traverse_tables(), nav.traverse_tables());

    // Groups and traverse links survive the trip.
    assert_eq!(count_traverse_links(&loaded), count_traverse_links(&nav));
    for ip in 0..nav.tile(0).polys.len() {
        assert_eq!(
            loaded.tile(0).polys[ip].group_id,
            nav.tile(0).polys[ip].group_id
        );
    }

    // Saving the loaded mesh reproduces the file byte for byte.
    let mut buf2 = Vec::new();
    save_nav_mesh(&loaded, &mut buf2).unwrap();
    assert_eq!(buf, buf2);
}

#[test]
fn test_reachability_survives_roundtrip() {
    let nav = linked_two_quad_mesh();
    let mut buf = Vec::new();
    save_nav_mesh(&nav, &mut buf).unwrap();
    let loaded = load_nav_mesh(&mut Cursor::new(&buf)).unwrap();

    let a = loaded.poly_ref_base(0);
    let b = loaded.poly_ref_base(0) | 1;
    assert!(loaded.is_goal_poly_reachable(a, b, true, -1));
}

#[test]
fn test_load_rejects_bad_magic() {
    let nav = linked_two_quad_mesh();
    let mut buf = Vec::new();
    save_nav_mesh(&nav, &mut buf).unwrap();
    buf[0] ^= 0xff;

    let err = load_nav_mesh(&mut Cursor::new(&buf)).unwrap_err();
    assert!(err.has_detail(Status::WRONG_MAGIC));
}

#[test]
fn test_load_rejects_unknown_version() {
    let nav = linked_two_quad_mesh();
    let mut buf = Vec::new();
    save_nav_mesh(&nav, &mut buf).unwrap();
    buf[4] = 42;

    let err = load_nav_mesh(&mut Cursor::new(&buf)).unwrap_err();
    assert!(err.has_detail(Status::WRONG_VERSION));
}

#[test]
fn test_load_rejects_truncated_file() {
    let nav = linked_two_quad_mesh();
    let mut buf = Vec::new();
    save_nav_mesh(&nav, &mut buf).unwrap();
    buf.truncate(buf.len() / 2);

    assert!(load_nav_mesh(&mut Cursor::new(&buf)).is_err());
}

#[test]
fn test_version_dispatch_table() {
    for v in crate::SUPPORTED_SET_VERSIONS {
        assert_eq!(nav_mesh_version_for_set(v), v);
    }
    assert_eq!(nav_mesh_version_for_set(6), 8);
}

#[test]
fn test_file_name_per_hull() {
    assert_eq!(
        nav_mesh_file_name("mp_rr_box", NavMeshKind::Small),
        "mp_rr_box_small.nm"
    );
    assert_eq!(
        nav_mesh_file_name("mp_rr_box", NavMeshKind::MedShort),
        "mp_rr_box_med_short.nm"
    );
    assert_eq!(
        nav_mesh_file_name("mp_rr_box", NavMeshKind::ExtraLarge),
        "mp_rr_box_extra_large.nm"
    );
}
