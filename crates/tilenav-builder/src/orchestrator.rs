//! Whole-mesh build orchestration: the tile grid loop, link generation,
//! static pathing data and in-place single-tile rebuilds.

use crate::geometry::InputGeometry;
use crate::tile_builder::TileMeshBuilder;
use tilenav_common::{Error, Result};
use tilenav_gen::{calc_grid_size, BuildContext, NavGenConfig};
use tilenav_mesh::{
    create_disjoint_poly_groups, create_traverse_table_data, table_count_for_nav_mesh_kind,
    update_disjoint_poly_groups, GeometryRaycast, NavMesh, NavMeshKind, NavMeshParams, TileRef,
    TraverseConnectParams, TraverseLinkIndex, TraverseTableCreateParams, TILE_FREE_DATA,
};

/// Narrows the geometry trait to the raycast surface the link qualifier
/// consumes.
struct RaycastAdapter<'a>(&'a dyn InputGeometry);

impl GeometryRaycast for RaycastAdapter<'_> {
    fn raycast_mesh(&self, from: &[f32], to: &[f32]) -> bool {
        self.0.raycast_mesh(from, to)
    }
}

/// Builds and owns one navmesh end to end.
pub struct NavMeshBuilder {
    tile_builder: TileMeshBuilder,
    nav: NavMesh,
    pairs: TraverseLinkIndex,
    tiles_wide: i32,
    tiles_high: i32,
}

impl NavMeshBuilder {
    /// Sizes the navmesh over the configured build extents.
    pub fn new(mut config: NavGenConfig, kind: NavMeshKind) -> Result<Self> {
        config.validate()?;

        let bmin = config.nav_bounds[0];
        let bmax = config.nav_bounds[1];
        let tile_builder = TileMeshBuilder::new(config, kind);
        let config = tile_builder.config();

        let (gw, gh) = calc_grid_size(&bmin, &bmax, config.cell_size);
        let ts = config.tile_size;
        let tiles_wide = (gw + ts - 1) / ts;
        let tiles_high = (gh + ts - 1) / ts;

        // Reference layout: enough tile bits for the grid, the rest split
        // between polygons and salt.
        let tile_bits =
            tilenav_common::ilog2(tilenav_common::next_pow2((tiles_wide * tiles_high) as u32))
                .min(14);
        let poly_bits = 22 - tile_bits;

        let params = NavMeshParams {
            orig: [bmax[0], bmin[1], bmin[2]],
            tile_width: ts as f32 * config.cell_size,
            tile_height: ts as f32 * config.cell_size,
            max_tiles: 1 << tile_bits,
            max_polys: 1 << poly_bits,
            ..Default::default()
        };
        let nav = NavMesh::new(&params).map_err(Error::from)?;

        Ok(Self {
            tile_builder,
            nav,
            pairs: TraverseLinkIndex::new(),
            tiles_wide,
            tiles_high,
        })
    }

    pub fn nav_mesh(&self) -> &NavMesh {
        &self.nav
    }

    pub fn nav_mesh_mut(&mut self) -> &mut NavMesh {
        &mut self.nav
    }

    pub fn tile_builder(&mut self) -> &mut TileMeshBuilder {
        &mut self.tile_builder
    }

    pub fn grid_size(&self) -> (i32, i32) {
        (self.tiles_wide, self.tiles_high)
    }

    fn table_params(&self) -> TraverseTableCreateParams {
        TraverseTableCreateParams {
            table_count: table_count_for_nav_mesh_kind(self.tile_builder.kind()),
            kind: self.tile_builder.kind(),
            ..Default::default()
        }
    }

    /// Builds every tile in the grid, then links and static pathing data.
    pub fn build_all(&mut self, geom: &dyn InputGeometry, ctx: &mut BuildContext) -> Result<()> {
        self.build_all_with_abort(geom, ctx, || false)
    }

    /// [`Self::build_all`] with a cooperative abort check between tiles.
    /// Already-added tiles stay valid on abort; tables are only written when
    /// generation completes.
    pub fn build_all_with_abort(
        &mut self,
        geom: &dyn InputGeometry,
        ctx: &mut BuildContext,
        mut abort: impl FnMut() -> bool,
    ) -> Result<()> {
        for ty in 0..self.tiles_high {
            for tx in 0..self.tiles_wide {
                if abort() {
                    ctx.warning("build.abort", format!("aborted before tile ({tx}, {ty})"));
                    return Ok(());
                }
                let Some(data) = self.tile_builder.build_tile_data(geom, ctx, tx, ty)? else {
                    continue;
                };

                // Replace whatever was there.
                if let Some(old) = self.nav.tile_index_at(tx, ty, 0) {
                    let old_ref = self.nav.tile_ref(old);
                    self.nav.remove_tile(old_ref).map_err(Error::from)?;
                }
                let tile_ref = self
                    .nav
                    .add_tile(data, TILE_FREE_DATA, 0)
                    .map_err(Error::from)?;
                self.nav.connect_tile(tile_ref).map_err(Error::from)?;
            }
        }

        self.build_static_pathing_data(geom, ctx)?;
        Ok(())
    }

    /// Group labelling, traverse-link generation and table construction over
    /// the current tile set.
    pub fn build_static_pathing_data(
        &mut self,
        geom: &dyn InputGeometry,
        ctx: &mut BuildContext,
    ) -> Result<()> {
        let params = self.table_params();

        ctx.start_timer(tilenav_gen::TimerKind::TraverseLinks);
        create_disjoint_poly_groups(&mut self.nav, &params).map_err(Error::from)?;
        let raycast = RaycastAdapter(geom);
        self.nav
            .create_traverse_links(
                &raycast,
                self.tile_builder.kind(),
                self.tile_builder.config().cell_height,
                &mut self.pairs,
            )
            .map_err(Error::from)?;
        ctx.stop_timer(tilenav_gen::TimerKind::TraverseLinks);

        ctx.start_timer(tilenav_gen::TimerKind::TraverseTables);
        update_disjoint_poly_groups(&mut self.nav, &params).map_err(Error::from)?;
        create_traverse_table_data(&mut self.nav, &params).map_err(Error::from)?;
        ctx.stop_timer(tilenav_gen::TimerKind::TraverseTables);
        Ok(())
    }

    /// Rebuilds the tile containing `pos` in place, reconnecting portals,
    /// off-mesh links and traverse links around it.
    pub fn build_tile_at(
        &mut self,
        geom: &dyn InputGeometry,
        ctx: &mut BuildContext,
        pos: &[f32],
    ) -> Result<()> {
        let (tx, ty) = self.tile_builder.tile_pos(pos);
        ctx.reset_log();

        // Remove the old tile and forget its traverse pairs so the rebuild
        // can relink them.
        if let Some(old) = self.nav.tile_index_at(tx, ty, 0) {
            let old_ref = self.nav.tile_ref(old);
            self.nav.remove_tile(old_ref).map_err(Error::from)?;
            self.pairs.prune_tile(&self.nav, old);
        }

        let Some(data) = self.tile_builder.build_tile_data(geom, ctx, tx, ty)? else {
            // Leave the slot empty; static data still needs a refresh.
            return self.rebuild_static_data_only(geom, ctx);
        };

        let tile_ref = self
            .nav
            .add_tile(data, TILE_FREE_DATA, 0)
            .map_err(Error::from)?;
        self.nav.connect_tile(tile_ref).map_err(Error::from)?;

        // Reconnect inbound off-mesh connections landing on this tile.
        let inbound: Vec<TileRef> = (0..self.nav.max_tiles())
            .filter(|&i| self.nav.tile(i).header.is_some())
            .filter(|&i| {
                self.nav.tile(i).off_mesh_cons.iter().any(|con| {
                    let end = [con.pos[3], con.pos[4], con.pos[5]];
                    self.nav.calc_tile_loc(&end) == (tx, ty)
                })
            })
            .map(|i| self.nav.tile_ref(i))
            .filter(|&r| r != tile_ref)
            .collect();
        for r in inbound {
            self.nav.connect_tile(r).map_err(Error::from)?;
        }

        // Reconnect traverse links for this tile: cross-tile first, then
        // what remains of the budget stays for same-tile pairs.
        let params_common = self.table_params();
        create_disjoint_poly_groups(&mut self.nav, &params_common).map_err(Error::from)?;
        let raycast = RaycastAdapter(geom);
        for pass in [true, false] {
            let mut link_params = TraverseConnectParams {
                geom: &raycast,
                link_to_neighbor: pass,
                kind: self.tile_builder.kind(),
                cell_height: self.tile_builder.config().cell_height,
                pairs: &mut self.pairs,
            };
            self.nav
                .connect_traverse_links(tile_ref, &mut link_params)
                .map_err(Error::from)?;
        }

        update_disjoint_poly_groups(&mut self.nav, &params_common).map_err(Error::from)?;
        create_traverse_table_data(&mut self.nav, &params_common).map_err(Error::from)?;
        Ok(())
    }

    /// Removes the tile containing `pos` and refreshes static pathing data.
    pub fn remove_tile_at(
        &mut self,
        geom: &dyn InputGeometry,
        ctx: &mut BuildContext,
        pos: &[f32],
    ) -> Result<()> {
        let (tx, ty) = self.tile_builder.tile_pos(pos);
        if let Some(old) = self.nav.tile_index_at(tx, ty, 0) {
            let old_ref = self.nav.tile_ref(old);
            self.nav.remove_tile(old_ref).map_err(Error::from)?;
            self.pairs.prune_tile(&self.nav, old);
            self.rebuild_static_data_only(geom, ctx)?;
        }
        Ok(())
    }

    fn rebuild_static_data_only(
        &mut self,
        _geom: &dyn InputGeometry,
        _ctx: &mut BuildContext,
    ) -> Result<()> {
        let params = self.table_params();
        update_disjoint_poly_groups(&mut self.nav, &params).map_err(Error::from)?;
        create_traverse_table_data(&mut self.nav, &params).map_err(Error::from)?;
        Ok(())
    }

    /// Consumes the builder, handing over the finished navmesh.
    pub fn into_nav_mesh(self) -> NavMesh {
        self.nav
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::TriMeshGeometry;
    use tilenav_mesh::{FIRST_USABLE_POLY_GROUP, NULL_LINK};

    fn floor_geometry(side: f32) -> TriMeshGeometry {
        let verts = vec![
            0.0, 0.0, 0.0, side, 0.0, 0.0, side, side, 0.0, 0.0, side, 0.0,
        ];
        let tris = vec![0, 1, 2, 0, 2, 3];
        TriMeshGeometry::new(verts, tris).unwrap()
    }

    fn floor_config(side: f32) -> NavGenConfig {
        NavGenConfig {
            cell_size: 4.0,
            cell_height: 2.0,
            nav_bounds: [[0.0, 0.0, -2.0], [side, side, 16.0]],
            ..Default::default()
        }
    }

    #[test]
    fn test_build_all_single_floor() {
        let side = 512.0;
        let geom = floor_geometry(side);
        let mut builder = NavMeshBuilder::new(floor_config(side), NavMeshKind::Small).unwrap();
        let mut ctx = BuildContext::new();

        builder.build_all(&geom, &mut ctx).unwrap();

        let nav = builder.nav_mesh();
        assert!(nav.tile_count() > 0);

        // Every ground polygon landed in a real group.
        for i in 0..nav.max_tiles() {
            let tile = nav.tile(i);
            if tile.header.is_none() {
                continue;
            }
            for poly in &tile.polys {
                if poly.first_link != NULL_LINK {
                    assert!(poly.group_id >= FIRST_USABLE_POLY_GROUP);
                }
            }
        }
        assert!(nav.poly_group_count() >= 2);
        assert_eq!(
            nav.traverse_tables().len(),
            table_count_for_nav_mesh_kind(NavMeshKind::Small) as usize
        );
    }

    #[test]
    fn test_abort_between_tiles() {
        let side = 512.0;
        let geom = floor_geometry(side);
        let mut builder = NavMeshBuilder::new(floor_config(side), NavMeshKind::Small).unwrap();
        let mut ctx = BuildContext::new();

        let mut calls = 0;
        builder
            .build_all_with_abort(&geom, &mut ctx, || {
                calls += 1;
                calls > 2
            })
            .unwrap();

        // At most two tiles made it in before the abort.
        assert!(builder.nav_mesh().tile_count() <= 2);
    }

    #[test]
    fn test_single_tile_rebuild_keeps_mesh_valid() {
        let side = 512.0;
        let geom = floor_geometry(side);
        let mut builder = NavMeshBuilder::new(floor_config(side), NavMeshKind::Small).unwrap();
        let mut ctx = BuildContext::new();
        builder.build_all(&geom, &mut ctx).unwrap();

        let before = builder.nav_mesh().tile_count();
        builder
            .build_tile_at(&geom, &mut ctx, &[side * 0.5, side * 0.5, 0.0])
            .unwrap();
        assert_eq!(builder.nav_mesh().tile_count(), before);

        builder
            .remove_tile_at(&geom, &mut ctx, &[side * 0.5, side * 0.5, 0.0])
            .unwrap();
        assert_eq!(builder.nav_mesh().tile_count(), before - 1);
    }
}
