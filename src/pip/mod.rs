//! Point-in-Polygon (PIP) locode lookup.
//!
//! Validates region boundaries, indexes their bounding boxes in an R-tree
//! and resolves points with an exact containment test.

mod boundary;
mod index;
mod service;

pub use boundary::{Boundary, Containment};
pub use index::{
    normalize_point, BuildOptions, BuildStats, DuplicatePolicy, IndexedRegion,
    InvalidGeometryPolicy, SpatialIndex,
};
pub use service::{LocodeResolver, RefreshReport};
