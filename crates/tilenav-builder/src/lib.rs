//! Build orchestration: drives the generation pipeline per tile, assembles
//! whole navmeshes, rebuilds single tiles in place and hot swaps the
//! per-hull navmesh set of a level.

mod geometry;
mod hotswap;
mod orchestrator;
mod tile_builder;

pub use geometry::{ConvexVolumeDef, InputGeometry, TriMeshGeometry};
pub use hotswap::{HotSwapHooks, NavMeshSet, SwapReport};
pub use orchestrator::NavMeshBuilder;
pub use tile_builder::{TileIntermediates, TileMeshBuilder};
