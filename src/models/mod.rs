//! Core data models for the locode resolver.

pub mod bbox;
pub mod region;

pub use bbox::BoundingBox;
pub use region::{BoundaryText, Region};
