//! Build configuration for navigation mesh generation.

use tilenav_common::{Error, Result};

/// Region partitioning strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PartitionKind {
    /// Distance-field flood fill. Best tessellation, slowest; the default for
    /// precomputed meshes with large open areas.
    Watershed,
    /// Left-to-right sweep. Fastest, guarantees no holes or overlaps, but
    /// emits long thin regions.
    Monotone,
    /// Layered sweep-and-merge. Non-overlapping regions, good for tiles with
    /// many small obstacles.
    Layers,
}

/// User-facing build options, in world units unless noted.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct NavGenConfig {
    /// Horizontal voxel size.
    pub cell_size: f32,
    /// Vertical voxel size.
    pub cell_height: f32,

    /// Agent standing height.
    pub agent_height: f32,
    /// Agent radius.
    pub agent_radius: f32,
    /// Maximum ledge height the agent steps over.
    pub agent_max_climb: f32,
    /// Maximum walkable slope, degrees.
    pub agent_max_slope: f32,

    /// Tile side length in voxels.
    pub tile_size: i32,

    /// Minimum isolated region area, voxels squared.
    pub min_region_area: i32,
    /// Regions below this area merge into larger neighbours, voxels squared.
    pub merge_region_area: i32,

    /// Maximum simplified contour edge length, voxels.
    pub edge_max_len: i32,
    /// Maximum simplification deviation, world units.
    pub edge_max_error: f32,

    /// Vertex cap per polygon, 3..=6.
    pub verts_per_poly: i32,
    /// Per-polygon diamond cell grid resolution.
    pub poly_cell_res: i32,

    /// Detail mesh sample spacing, multiples of `cell_size`.
    pub detail_sample_dist: f32,
    /// Detail mesh maximum height error, multiples of `cell_height`.
    pub detail_sample_max_error: f32,

    /// Region partitioning strategy.
    pub partition: PartitionKind,

    /// Promote low obstacles the agent can step over.
    pub filter_low_hanging_obstacles: bool,
    /// Knock out spans next to sheer drops.
    pub filter_ledge_spans: bool,
    /// Knock out spans with insufficient headroom.
    pub filter_walkable_low_height_spans: bool,

    /// Build extents, clamped to the input mesh bounds.
    pub nav_bounds: [[f32; 3]; 2],
}

impl Default for NavGenConfig {
    fn default() -> Self {
        Self {
            cell_size: 16.0,
            cell_height: 5.85,
            agent_height: 72.0,
            agent_radius: 16.0,
            agent_max_climb: 36.0,
            agent_max_slope: 45.573,
            tile_size: 32,
            min_region_area: 8 * 8,
            merge_region_area: 20 * 20,
            edge_max_len: 12,
            edge_max_error: 1.3,
            verts_per_poly: 6,
            poly_cell_res: 8,
            detail_sample_dist: 6.0,
            detail_sample_max_error: 1.0,
            partition: PartitionKind::Watershed,
            filter_low_hanging_obstacles: true,
            filter_ledge_spans: true,
            filter_walkable_low_height_spans: true,
            nav_bounds: [[0.0; 3]; 2],
        }
    }
}

impl NavGenConfig {
    /// Validates the option set.
    pub fn validate(&self) -> Result<()> {
        if self.cell_size <= 0.0 || self.cell_height <= 0.0 {
            return Err(Error::InvalidMesh("cell size and height must be positive".to_string()));
        }
        if !(0.0..=90.0).contains(&self.agent_max_slope) {
            return Err(Error::InvalidMesh(format!(
                "walkable slope angle out of range: {}",
                self.agent_max_slope
            )));
        }
        if !(3..=6).contains(&self.verts_per_poly) {
            return Err(Error::InvalidMesh(format!(
                "verts per poly out of range: {}",
                self.verts_per_poly
            )));
        }
        if self.tile_size <= 0 {
            return Err(Error::InvalidMesh("tile size must be positive".to_string()));
        }
        if self.poly_cell_res < 1 {
            return Err(Error::InvalidMesh("poly cell resolution must be at least 1".to_string()));
        }
        if self.nav_bounds[0][0] > self.nav_bounds[1][0]
            || self.nav_bounds[0][1] > self.nav_bounds[1][1]
            || self.nav_bounds[0][2] > self.nav_bounds[1][2]
        {
            return Err(Error::InvalidMesh("nav bounds are inverted".to_string()));
        }
        Ok(())
    }

    /// Clamps the build extents to the input mesh bounds.
    pub fn clamp_nav_bounds(&mut self, mesh_bmin: &[f32; 3], mesh_bmax: &[f32; 3]) {
        for i in 0..3 {
            self.nav_bounds[0][i] = self.nav_bounds[0][i].max(mesh_bmin[i]);
            self.nav_bounds[1][i] = self.nav_bounds[1][i].min(mesh_bmax[i]);
        }
    }
}

/// Voxel-space configuration derived for one tile build.
#[derive(Debug, Clone)]
pub struct TileConfig {
    /// Grid width including border, voxels.
    pub width: i32,
    /// Grid height including border, voxels.
    pub height: i32,
    /// Padding around the tile proper, voxels.
    pub border_size: i32,
    /// Horizontal voxel size, world units.
    pub cs: f32,
    /// Vertical voxel size, world units.
    pub ch: f32,
    /// Agent height, voxels (ceil).
    pub walkable_height: i32,
    /// Agent climb, voxels (floor).
    pub walkable_climb: i32,
    /// Agent radius, voxels (ceil).
    pub walkable_radius: i32,
    /// Walkable slope threshold, degrees.
    pub walkable_slope_angle: f32,
    /// Maximum contour edge length, voxels.
    pub max_edge_len: i32,
    /// Maximum contour deviation, world units.
    pub max_simplification_error: f32,
    /// Minimum region area, voxels squared.
    pub min_region_area: i32,
    /// Merge threshold region area, voxels squared.
    pub merge_region_area: i32,
    /// Vertex cap per polygon.
    pub max_verts_per_poly: i32,
    /// Detail sampling distance, world units.
    pub detail_sample_dist: f32,
    /// Detail height error cap, world units.
    pub detail_sample_max_error: f32,
    /// Expanded tile bounds (tile extents padded by the border).
    pub bmin: [f32; 3],
    /// Expanded tile bounds.
    pub bmax: [f32; 3],
}

impl TileConfig {
    /// Derives the voxel-space configuration for a tile spanning
    /// `tile_bmin..tile_bmax`.
    pub fn derive(config: &NavGenConfig, tile_bmin: &[f32; 3], tile_bmax: &[f32; 3]) -> Self {
        let cs = config.cell_size;
        let ch = config.cell_height;
        let walkable_radius = (config.agent_radius / cs).ceil() as i32;
        // Enough padding that erosion and edge polygons stay off the border.
        let border_size = walkable_radius + 3;
        let width = config.tile_size + border_size * 2;
        let height = config.tile_size + border_size * 2;

        let mut bmin = *tile_bmin;
        let mut bmax = *tile_bmax;
        bmin[0] -= border_size as f32 * cs;
        bmin[1] -= border_size as f32 * cs;
        bmax[0] += border_size as f32 * cs;
        bmax[1] += border_size as f32 * cs;

        Self {
            width,
            height,
            border_size,
            cs,
            ch,
            walkable_height: (config.agent_height / ch).ceil() as i32,
            walkable_climb: (config.agent_max_climb / ch).floor() as i32,
            walkable_radius,
            walkable_slope_angle: config.agent_max_slope,
            max_edge_len: (config.edge_max_len as f32 / cs) as i32,
            max_simplification_error: config.edge_max_error,
            min_region_area: config.min_region_area,
            merge_region_area: config.merge_region_area,
            max_verts_per_poly: config.verts_per_poly,
            detail_sample_dist: if config.detail_sample_dist < 0.9 {
                0.0
            } else {
                cs * config.detail_sample_dist
            },
            detail_sample_max_error: ch * config.detail_sample_max_error,
            bmin,
            bmax,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_bad_cells() {
        let mut config = NavGenConfig::default();
        config.cell_size = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_verts_per_poly() {
        let mut config = NavGenConfig::default();
        config.verts_per_poly = 7;
        assert!(config.validate().is_err());
        config.verts_per_poly = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tile_config_padding() {
        let config = NavGenConfig {
            cell_size: 1.0,
            agent_radius: 2.0,
            tile_size: 16,
            ..Default::default()
        };
        let tc = TileConfig::derive(&config, &[0.0, 0.0, 0.0], &[16.0, 16.0, 8.0]);
        assert_eq!(tc.border_size, 5);
        assert_eq!(tc.width, 26);
        assert_eq!(tc.bmin[0], -5.0);
        assert_eq!(tc.bmax[1], 21.0);
        // z extents are untouched by the border.
        assert_eq!(tc.bmin[2], 0.0);
        assert_eq!(tc.bmax[2], 8.0);
    }
}
