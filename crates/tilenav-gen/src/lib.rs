//! Navigation mesh generation: triangle soup in, convex polygon mesh out.
//!
//! The pipeline voxelises level geometry into a heightfield, compacts the
//! walkable surfaces, partitions them into regions, traces and simplifies the
//! region contours, triangulates them into convex polygons, and finally adds
//! per-polygon height detail. Each stage is usable on its own; the driver in
//! the builder crate wires them together per tile.

mod chunky;
mod compact;
mod config;
mod context;
mod contour;
mod detail;
mod heightfield;
mod polymesh;
mod rasterize;
mod region;

pub use chunky::{ChunkyTriMesh, ChunkyTriMeshNode};
pub use compact::{
    CompactCell, CompactHeightfield, CompactSpan, DIR_OFFSET_X, DIR_OFFSET_Y, MAX_LAYERS,
    NOT_CONNECTED,
};
pub use config::{NavGenConfig, PartitionKind, TileConfig};
pub use context::{BuildContext, LogEvent, LogLevel, TimerKind};
pub use contour::{Contour, ContourSet, AREA_BORDER, BORDER_VERTEX, CONTOUR_REG_MASK};
pub use detail::PolyMeshDetail;
pub use heightfield::{Heightfield, Span, NULL_AREA, WALKABLE_AREA};
pub use polymesh::{PolyMesh, MESH_NULL_IDX, POLY_SURF_AREA_QUANT};
pub use rasterize::{mark_walkable_triangles, rasterize_triangles};
pub use region::{
    build_distance_field, build_layer_regions, build_regions, build_regions_monotone, BORDER_REG,
};

/// Computes the axis-aligned bounds of a flat vertex buffer.
pub fn calc_bounds(verts: &[f32]) -> ([f32; 3], [f32; 3]) {
    let mut bmin = [f32::MAX; 3];
    let mut bmax = [f32::MIN; 3];
    for v in verts.chunks_exact(3) {
        tilenav_common::vmin(&mut bmin, v);
        tilenav_common::vmax(&mut bmax, v);
    }
    (bmin, bmax)
}

/// Computes the voxel grid size covering `bmin..bmax` at `cell_size`.
pub fn calc_grid_size(bmin: &[f32], bmax: &[f32], cell_size: f32) -> (i32, i32) {
    let w = ((bmax[0] - bmin[0]) / cell_size + 0.5) as i32;
    let h = ((bmax[1] - bmin[1]) / cell_size + 0.5) as i32;
    (w, h)
}
