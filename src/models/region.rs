//! Raw region records as delivered by a region store.

use serde::{Deserialize, Serialize};

use super::BoundingBox;

/// Boundary geometry in an interchange text format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "text", rename_all = "lowercase")]
pub enum BoundaryText {
    /// Well-known text, e.g. `MULTIPOLYGON(((...)))`
    Wkt(String),
    /// A GeoJSON geometry, feature or feature collection
    GeoJson(String),
}

impl BoundaryText {
    pub fn format_name(&self) -> &'static str {
        match self {
            BoundaryText::Wkt(_) => "wkt",
            BoundaryText::GeoJson(_) => "geojson",
        }
    }
}

/// A region as stored upstream: locode, optional bounding box, boundary text.
///
/// Geometry is parsed and validated when the region is indexed, never at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    /// UN/LOCODE, e.g. "US NYC"
    pub identifier: String,

    /// Prefilter box. Derived from the boundary when the store has none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,

    pub boundary: BoundaryText,
}

impl Region {
    pub fn new(
        identifier: impl Into<String>,
        bounding_box: BoundingBox,
        boundary: BoundaryText,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            bounding_box: Some(bounding_box),
            boundary,
        }
    }

    /// Region whose bounding box is computed from its boundary at build time.
    pub fn without_bbox(identifier: impl Into<String>, boundary: BoundaryText) -> Self {
        Self {
            identifier: identifier.into(),
            bounding_box: None,
            boundary,
        }
    }
}
