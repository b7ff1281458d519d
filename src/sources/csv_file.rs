//! CSV region exports with a WKT geometry column.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use super::RegionSource;
use crate::error::StoreError;
use crate::models::{BoundaryText, BoundingBox, Region};

/// One row of `locode,bbox_north,bbox_south,bbox_east,bbox_west,geometry`.
///
/// Empty bbox cells mean the box is derived from the geometry.
#[derive(Debug, Deserialize)]
struct RegionRow {
    locode: String,
    bbox_north: Option<f64>,
    bbox_south: Option<f64>,
    bbox_east: Option<f64>,
    bbox_west: Option<f64>,
    geometry: String,
}

/// Reads regions from a CSV export of the regions table.
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse(&self, text: &str) -> Result<Vec<Region>, StoreError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut regions = Vec::new();
        for (row_idx, row) in reader.deserialize::<RegionRow>().enumerate() {
            let row = row.map_err(|e| StoreError::Csv(self.path.clone(), e))?;

            let bounding_box = match (row.bbox_north, row.bbox_south, row.bbox_east, row.bbox_west) {
                (Some(north), Some(south), Some(east), Some(west)) => {
                    Some(BoundingBox::new(north, south, east, west))
                }
                (None, None, None, None) => None,
                _ => {
                    return Err(StoreError::PartialBoundingBox {
                        path: self.path.clone(),
                        // 1-based, after the header line
                        row: row_idx + 2,
                    })
                }
            };

            regions.push(Region {
                identifier: row.locode,
                bounding_box,
                boundary: BoundaryText::Wkt(row.geometry),
            });
        }

        Ok(regions)
    }
}

impl RegionSource for CsvFileSource {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pip::SpatialIndex;
    use std::io::Write;

    const EXPORT: &str = "locode,bbox_north,bbox_south,bbox_east,bbox_west,geometry
US NYC,40.92,40.49,-73.70,-74.26,\"POLYGON((-74.25 40.50, -73.85 40.50, -73.70 40.60, -73.70 40.80, -73.85 40.92, -74.00 40.92, -74.05 40.75, -74.25 40.60, -74.25 40.50))\"
XX SQR,,,,,\"POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))\"
";

    #[test]
    fn test_parse_rows() {
        let regions = CsvFileSource::new("regions.csv").parse(EXPORT).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].identifier, "US NYC");
        assert_eq!(
            regions[0].bounding_box,
            Some(BoundingBox::new(40.92, 40.49, -73.70, -74.26))
        );
        assert!(regions[1].bounding_box.is_none());
        assert_eq!(regions[1].boundary.format_name(), "wkt");
    }

    #[test]
    fn test_partial_bbox_rejected() {
        let text = "locode,bbox_north,bbox_south,bbox_east,bbox_west,geometry
XX PRT,1.0,,1.0,0.0,\"POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))\"
";
        let err = CsvFileSource::new("regions.csv").parse(text).unwrap_err();
        assert!(matches!(err, StoreError::PartialBoundingBox { row: 2, .. }));
    }

    #[test]
    fn test_malformed_number() {
        let text = "locode,bbox_north,bbox_south,bbox_east,bbox_west,geometry
XX NAN,north,0,1,0,\"POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))\"
";
        let err = CsvFileSource::new("regions.csv").parse(text).unwrap_err();
        assert!(matches!(err, StoreError::Csv(..)));
    }

    #[tokio::test]
    async fn test_fetch_and_build_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EXPORT.as_bytes()).unwrap();

        let regions = CsvFileSource::new(file.path())
            .fetch_all_regions()
            .await
            .unwrap();
        let index = SpatialIndex::build(regions).unwrap();
        assert_eq!(index.query(40.7128, -74.0060).unwrap(), vec!["US NYC"]);
        assert_eq!(index.query_first(0.25, 0.75).unwrap(), Some("XX SQR"));
    }
}
