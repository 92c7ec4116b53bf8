//! Per-tile build: voxelise, filter, partition, polygonise, detail, pack.

use crate::geometry::InputGeometry;
use tilenav_common::Result;
use tilenav_gen::{
    build_layer_regions, build_regions, build_regions_monotone, mark_walkable_triangles,
    rasterize_triangles, BuildContext, CompactHeightfield, ContourSet, Heightfield, LogLevel,
    NavGenConfig, PartitionKind, PolyMesh, PolyMeshDetail, TileConfig, TimerKind, MESH_NULL_IDX,
    NULL_AREA, WALKABLE_AREA,
};
use tilenav_mesh::{
    create_nav_mesh_data, hull_for_nav_mesh_kind, NavMeshCreateParams, NavMeshKind, PolyArea,
    PolyFlags, EXT_LINK, SMALL_POLYGON_THRESHOLD,
};

/// Intermediate build products, retained on request for inspection.
#[derive(Debug, Default)]
pub struct TileIntermediates {
    pub heightfield: Option<Heightfield>,
    pub compact: Option<CompactHeightfield>,
    pub contours: Option<ContourSet>,
    pub poly_mesh: Option<PolyMesh>,
    pub detail_mesh: Option<PolyMeshDetail>,
}

/// Builds single tiles from input geometry.
pub struct TileMeshBuilder {
    config: NavGenConfig,
    kind: NavMeshKind,
    /// Retain intermediate stage outputs of the last build.
    pub keep_intermediates: bool,
    /// Last build's retained intermediates.
    pub intermediates: TileIntermediates,
}

impl TileMeshBuilder {
    /// Creates a builder; agent metrics come from the hull of `kind`, the
    /// rest from `config`.
    pub fn new(mut config: NavGenConfig, kind: NavMeshKind) -> Self {
        let hull = hull_for_nav_mesh_kind(kind);
        config.agent_radius = hull.radius;
        config.agent_height = hull.height;
        config.agent_max_climb = hull.climb_height;
        config.tile_size = hull.tile_size;
        config.poly_cell_res = hull.cell_resolution;
        Self {
            config,
            kind,
            keep_intermediates: false,
            intermediates: TileIntermediates::default(),
        }
    }

    pub fn config(&self) -> &NavGenConfig {
        &self.config
    }

    pub fn kind(&self) -> NavMeshKind {
        self.kind
    }

    /// World-space extents of tile `(tx, ty)`. Tile x counts down from the
    /// maximum x bound.
    pub fn tile_extents(&self, tx: i32, ty: i32) -> ([f32; 3], [f32; 3]) {
        let ts = self.config.tile_size as f32 * self.config.cell_size;
        let bmin = self.config.nav_bounds[0];
        let bmax = self.config.nav_bounds[1];
        (
            [bmax[0] - (tx + 1) as f32 * ts, bmin[1] + ty as f32 * ts, bmin[2]],
            [bmax[0] - tx as f32 * ts, bmin[1] + (ty + 1) as f32 * ts, bmax[2]],
        )
    }

    /// Tile grid location of a world position.
    pub fn tile_pos(&self, pos: &[f32]) -> (i32, i32) {
        let ts = self.config.tile_size as f32 * self.config.cell_size;
        let bmin = self.config.nav_bounds[0];
        let bmax = self.config.nav_bounds[1];
        (
            ((bmax[0] - pos[0]) / ts) as i32,
            ((pos[1] - bmin[1]) / ts) as i32,
        )
    }

    /// Runs the full pipeline for one tile. Returns the serialised tile
    /// blob, or `None` when the tile covers no walkable geometry.
    pub fn build_tile_data(
        &mut self,
        geom: &dyn InputGeometry,
        ctx: &mut BuildContext,
        tx: i32,
        ty: i32,
    ) -> Result<Option<Vec<u8>>> {
        self.intermediates = TileIntermediates::default();

        let (tile_bmin, tile_bmax) = self.tile_extents(tx, ty);
        let tc = TileConfig::derive(&self.config, &tile_bmin, &tile_bmax);

        ctx.start_timer(TimerKind::Total);
        ctx.progress(
            "tile.build",
            format!("building tile ({tx}, {ty}): {} x {} cells", tc.width, tc.height),
        );

        // Voxelise the triangles overlapping the padded tile.
        ctx.start_timer(TimerKind::Rasterization);
        let mut hf = Heightfield::new(tc.width, tc.height, tc.bmin, tc.bmax, tc.cs, tc.ch);

        let chunky = geom.chunky_mesh();
        let mut areas = vec![NULL_AREA; chunky.max_tris_per_chunk as usize];
        let rect_min = [tc.bmin[0], tc.bmin[1]];
        let rect_max = [tc.bmax[0], tc.bmax[1]];

        // Drain the spatial index in bounded batches.
        let mut chunk_ids: Vec<usize> = Vec::with_capacity(512);
        let mut cursor = 0usize;
        let mut tri_count = 0usize;
        loop {
            let done = chunky.chunks_overlapping_rect_resumable(
                rect_min,
                rect_max,
                &mut chunk_ids,
                512,
                &mut cursor,
            );
            for &ci in &chunk_ids {
                let node = &chunky.nodes[ci];
                let tris =
                    &chunky.tris[node.index as usize * 3..(node.index + node.count) as usize * 3];
                tri_count += node.count as usize;

                let n = node.count as usize;
                areas[..n].fill(NULL_AREA);
                mark_walkable_triangles(tc.walkable_slope_angle, geom.verts(), tris, &mut areas[..n]);
                rasterize_triangles(geom.verts(), tris, &areas[..n], &mut hf, tc.walkable_climb)?;
            }
            if done {
                break;
            }
        }
        ctx.stop_timer(TimerKind::Rasterization);

        if tri_count == 0 {
            ctx.stop_timer(TimerKind::Total);
            return Ok(None);
        }

        // Walkability filters.
        ctx.start_timer(TimerKind::Filtering);
        if self.config.filter_low_hanging_obstacles {
            hf.filter_low_hanging_walkable_obstacles(tc.walkable_climb);
        }
        if self.config.filter_ledge_spans {
            hf.filter_ledge_spans(tc.walkable_height, tc.walkable_climb);
        }
        if self.config.filter_walkable_low_height_spans {
            hf.filter_walkable_low_height_spans(tc.walkable_height);
        }
        ctx.stop_timer(TimerKind::Filtering);

        // Compact field and erosion.
        ctx.start_timer(TimerKind::CompactHeightfield);
        let mut chf =
            CompactHeightfield::build(tc.walkable_height, tc.walkable_climb, tc.border_size, &hf)?;
        ctx.stop_timer(TimerKind::CompactHeightfield);

        if self.keep_intermediates {
            self.intermediates.heightfield = Some(hf);
        }

        ctx.start_timer(TimerKind::Erosion);
        chf.erode_walkable_area(tc.walkable_radius)?;
        ctx.stop_timer(TimerKind::Erosion);

        // Area-marking volumes.
        for volume in geom.convex_volumes() {
            chf.mark_convex_poly_area(&volume.verts, volume.hmin, volume.hmax, volume.area);
        }

        // Region partitioning.
        ctx.start_timer(TimerKind::Regions);
        match self.config.partition {
            PartitionKind::Watershed => {
                build_regions(&mut chf, tc.border_size, tc.min_region_area, tc.merge_region_area)?;
            }
            PartitionKind::Monotone => {
                build_regions_monotone(
                    &mut chf,
                    tc.border_size,
                    tc.min_region_area,
                    tc.merge_region_area,
                )?;
            }
            PartitionKind::Layers => {
                build_layer_regions(&mut chf, tc.border_size, tc.min_region_area)?;
            }
        }
        ctx.stop_timer(TimerKind::Regions);

        // Contours and polygons.
        ctx.start_timer(TimerKind::Contours);
        let cset = ContourSet::build(&chf, tc.max_simplification_error, tc.max_edge_len)?;
        ctx.stop_timer(TimerKind::Contours);
        if cset.contours.is_empty() {
            ctx.stop_timer(TimerKind::Total);
            return Ok(None);
        }

        ctx.start_timer(TimerKind::PolyMesh);
        let mut pmesh = PolyMesh::build(&cset, tc.max_verts_per_poly as usize)?;
        ctx.stop_timer(TimerKind::PolyMesh);
        if pmesh.npolys() == 0 {
            ctx.stop_timer(TimerKind::Total);
            return Ok(None);
        }

        ctx.start_timer(TimerKind::DetailMesh);
        let dmesh = PolyMeshDetail::build(
            &pmesh,
            &chf,
            tc.detail_sample_dist,
            tc.detail_sample_max_error,
        )?;
        ctx.stop_timer(TimerKind::DetailMesh);

        // Area ids into capability flags.
        apply_poly_flags(&mut pmesh);

        ctx.start_timer(TimerKind::TileData);
        let params = NavMeshCreateParams {
            mesh: &pmesh,
            detail: &dmesh,
            off_mesh_cons: geom.off_mesh_connections(),
            tile_x: tx,
            tile_y: ty,
            tile_layer: 0,
            user_id: 0,
            bmin: pmesh.bmin,
            bmax: pmesh.bmax,
            walkable_height: self.config.agent_height,
            walkable_radius: self.config.agent_radius,
            walkable_climb: self.config.agent_max_climb,
            cs: tc.cs,
            ch: tc.ch,
            cell_resolution: self.config.poly_cell_res,
            build_bv_tree: true,
        };
        let data = create_nav_mesh_data(&params).map_err(|status| {
            ctx.log(LogLevel::Error, "tile.pack", status.to_string());
            tilenav_common::Error::from(status)
        })?;
        ctx.stop_timer(TimerKind::TileData);

        ctx.progress(
            "tile.done",
            format!("tile ({tx}, {ty}): {} polys, {} verts", pmesh.npolys(), pmesh.nverts()),
        );

        if self.keep_intermediates {
            self.intermediates.compact = Some(chf);
            self.intermediates.contours = Some(cset);
            self.intermediates.poly_mesh = Some(pmesh);
            self.intermediates.detail_mesh = Some(dmesh);
        }

        ctx.stop_timer(TimerKind::Total);
        Ok(Some(data))
    }
}

/// Maps generation area ids onto runtime areas and capability flags.
fn apply_poly_flags(pmesh: &mut PolyMesh) {
    let nvp = pmesh.nvp;
    for i in 0..pmesh.npolys() {
        if pmesh.areas[i] == WALKABLE_AREA {
            pmesh.areas[i] = PolyArea::Ground as u8;
        }

        let mut flags = PolyFlags::empty();
        if pmesh.areas[i] == PolyArea::Ground as u8
            || pmesh.areas[i] == PolyArea::Trigger as u8
        {
            flags |= PolyFlags::WALK;
        }

        if pmesh.surf_areas[i] <= SMALL_POLYGON_THRESHOLD {
            flags |= PolyFlags::TOO_SMALL;
        }

        // Portal edges mean a neighbour tile continues this surface.
        for j in 0..nvp {
            let p = &pmesh.polys[i * nvp * 2..i * nvp * 2 + nvp * 2];
            if p[j] == MESH_NULL_IDX {
                break;
            }
            if p[nvp + j] & EXT_LINK != 0 && p[nvp + j] & 0xf != 0xf {
                flags |= PolyFlags::HAS_NEIGHBOUR;
                break;
            }
        }

        pmesh.flags[i] = flags.bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::TriMeshGeometry;

    /// A flat 256x256 wu floor.
    fn floor_geometry() -> TriMeshGeometry {
        let verts = vec![
            0.0, 0.0, 0.0, 256.0, 0.0, 0.0, 256.0, 256.0, 0.0, 0.0, 256.0, 0.0,
        ];
        let tris = vec![0, 1, 2, 0, 2, 3];
        TriMeshGeometry::new(verts, tris).unwrap()
    }

    fn test_config() -> NavGenConfig {
        NavGenConfig {
            cell_size: 4.0,
            cell_height: 2.0,
            nav_bounds: [[0.0, 0.0, -2.0], [256.0, 256.0, 16.0]],
            ..Default::default()
        }
    }

    #[test]
    fn test_build_floor_tile() {
        let geom = floor_geometry();
        let mut builder = TileMeshBuilder::new(test_config(), NavMeshKind::Small);
        let mut ctx = BuildContext::new();

        let data = builder
            .build_tile_data(&geom, &mut ctx, 0, 0)
            .unwrap()
            .expect("tile data");
        assert!(!data.is_empty());
        assert!(ctx.accumulated_time(TimerKind::Total) >= std::time::Duration::ZERO);
    }

    #[test]
    fn test_empty_tile_yields_none() {
        let geom = floor_geometry();
        let mut config = test_config();
        // Extents way past the floor.
        config.nav_bounds = [[-4096.0, -4096.0, -2.0], [-2048.0, -2048.0, 16.0]];
        let mut builder = TileMeshBuilder::new(config, NavMeshKind::Small);
        let mut ctx = BuildContext::new();

        let data = builder.build_tile_data(&geom, &mut ctx, 0, 0).unwrap();
        assert!(data.is_none());
    }

    #[test]
    fn test_keep_intermediates() {
        let geom = floor_geometry();
        let mut builder = TileMeshBuilder::new(test_config(), NavMeshKind::Small);
        builder.keep_intermediates = true;
        let mut ctx = BuildContext::new();

        builder.build_tile_data(&geom, &mut ctx, 0, 0).unwrap();
        assert!(builder.intermediates.heightfield.is_some());
        assert!(builder.intermediates.poly_mesh.is_some());
        assert!(builder.intermediates.detail_mesh.is_some());
    }

    #[test]
    fn test_tile_extents_descend_x() {
        let builder = TileMeshBuilder::new(test_config(), NavMeshKind::Small);
        let ts = builder.config().tile_size as f32 * builder.config().cell_size;

        let (bmin0, bmax0) = builder.tile_extents(0, 0);
        assert_eq!(bmax0[0], 256.0);
        assert_eq!(bmin0[0], 256.0 - ts);

        let (bmin1, _) = builder.tile_extents(1, 0);
        assert_eq!(bmin1[0], 256.0 - 2.0 * ts);

        // tile_pos inverts the mapping.
        assert_eq!(builder.tile_pos(&[256.0 - ts * 0.5, 1.0, 0.0]), (0, 0));
        assert_eq!(builder.tile_pos(&[256.0 - ts * 1.5, 1.0, 0.0]), (1, 0));
    }
}
