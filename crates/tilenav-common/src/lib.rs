//! Common math, geometry and error types shared by the tilenav crates.
//!
//! The navigation pipeline works on flat `[f32]` vertex buffers (3 floats per
//! vertex) with the convention that x and y span the horizontal plane and z
//! points up. Geometry helpers therefore project onto the xy-plane wherever a
//! 2D test is called for.

mod geometry;
mod math;
mod vector;

pub use geometry::*;
pub use math::*;
pub use vector::*;

/// World-space position.
pub type Vec3 = glam::Vec3;

/// Error type shared across the tilenav crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input mesh: {0}")]
    InvalidMesh(String),

    #[error("mesh generation failed: {0}")]
    MeshGeneration(String),

    #[error("navmesh operation failed: {0}")]
    NavMesh(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tilenav operations.
pub type Result<T> = std::result::Result<T, Error>;
