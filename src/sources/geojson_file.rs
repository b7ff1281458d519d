//! GeoJSON FeatureCollection region files.

use std::path::{Path, PathBuf};

use geojson::{Feature, GeoJson};
use tracing::{info, warn};

use super::RegionSource;
use crate::error::StoreError;
use crate::models::{BoundaryText, BoundingBox, Region};

/// Reads regions from a FeatureCollection.
///
/// Each feature carries the locode in a string property (default `locode`).
/// A feature-level `bbox` member, if present, becomes the prefilter box.
#[derive(Debug, Clone)]
pub struct GeoJsonFileSource {
    path: PathBuf,
    identifier_property: String,
}

impl GeoJsonFileSource {
    pub fn new(path: impl Into<PathBuf>, identifier_property: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            identifier_property: identifier_property.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse regions out of GeoJSON text.
    pub fn parse(&self, text: &str) -> Result<Vec<Region>, StoreError> {
        let geojson: GeoJson = text
            .parse()
            .map_err(|e| StoreError::GeoJson(self.path.clone(), Box::new(e)))?;

        let features = match geojson {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(f) => vec![f],
            GeoJson::Geometry(_) => {
                return Err(StoreError::MissingIdentifier {
                    path: self.path.clone(),
                    index: 0,
                    property: self.identifier_property.clone(),
                })
            }
        };

        features
            .into_iter()
            .enumerate()
            .map(|(index, feature)| self.region_from_feature(index, feature))
            .collect()
    }

    fn region_from_feature(&self, index: usize, feature: Feature) -> Result<Region, StoreError> {
        let identifier = feature
            .property(&self.identifier_property)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| StoreError::MissingIdentifier {
                path: self.path.clone(),
                index,
                property: self.identifier_property.clone(),
            })?;

        let bounding_box = match feature.bbox.as_deref() {
            Some(member) => {
                let bbox = bbox_from_member(member);
                if bbox.is_none() {
                    warn!(
                        "Feature {} ({}) in {} has a bbox with {} values, expected 4 or 6; deriving from geometry",
                        index,
                        identifier,
                        self.path.display(),
                        member.len()
                    );
                }
                bbox
            }
            None => None,
        };

        let geometry = feature.geometry.ok_or_else(|| StoreError::MissingGeometry {
            path: self.path.clone(),
            index,
        })?;
        let boundary = BoundaryText::GeoJson(GeoJson::Geometry(geometry).to_string());

        Ok(Region {
            identifier,
            bounding_box,
            boundary,
        })
    }
}

/// RFC 7946 bbox: `[west, south, east, north]`, or with elevation
/// `[west, south, min_z, east, north, max_z]`.
fn bbox_from_member(bbox: &[f64]) -> Option<BoundingBox> {
    match *bbox {
        [west, south, east, north] => Some(BoundingBox::new(north, south, east, west)),
        [west, south, _, east, north, _] => Some(BoundingBox::new(north, south, east, west)),
        _ => None,
    }
}

impl RegionSource for GeoJsonFileSource {
    async fn fetch_all_regions(&self) -> Result<Vec<Region>, StoreError> {
        info!("Loading regions from {}", self.path.display());
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| StoreError::FileRead(self.path.clone(), e))?;
        let regions = self.parse(&text)?;
        info!("Loaded {} regions", regions.len());
        Ok(regions)
    }
}
