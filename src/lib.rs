//! Locode - reverse geocoding from WGS84 coordinates to UN/LOCODEs.
//!
//! This library provides the spatial index, region stores and resolver used by the query binary.

pub mod error;
pub mod models;
pub mod pip;
pub mod scylla;
pub mod sources;

pub use error::{BuildError, GeometryIssue, QueryError, RefreshError, StoreError};
pub use models::{BoundaryText, BoundingBox, Region};
pub use pip::{LocodeResolver, SpatialIndex};
