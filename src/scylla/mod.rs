use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::response::query_result::QueryResult;
use std::sync::Arc;
use tracing::info;

use crate::error::StoreError;
use crate::models::{BoundaryText, BoundingBox, Region};
use crate::sources::RegionSource;

/// `(locode, bbox_north, bbox_south, bbox_east, bbox_west, geometry)`
type RegionRow = (
    String,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    String,
);

/// Regions table in ScyllaDB, geometry stored as WKT.
#[derive(Clone)]
pub struct ScyllaRegionSource {
    session: Arc<Session>,
    table: String,
}

impl ScyllaRegionSource {
    pub async fn new(uri: &str, keyspace: &str, table: &str) -> Result<Self, StoreError> {
        let table = qualified_table(keyspace, table)?;

        info!("Connecting to ScyllaDB at {}...", uri);
        let session: Session = SessionBuilder::new()
            .known_node(uri)
            .build()
            .await
            .map_err(|e| StoreError::Scylla(format!("failed to connect: {}", e)))?;

        Ok(Self {
            session: Arc::new(session),
            table,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn select_all(&self) -> Result<Vec<RegionRow>, StoreError> {
        let query = format!(
            "SELECT locode, bbox_north, bbox_south, bbox_east, bbox_west, geometry FROM {}",
            self.table
        );

        // TODO: page with query_iter once region tables outgrow a single response
        let result: QueryResult = self
            .session
            .query_unpaged(query, ())
            .await
            .map_err(|e| StoreError::Scylla(e.to_string()))?;

        let rows_result = result
            .into_rows_result()
            .map_err(|e| StoreError::Scylla(e.to_string()))?;

        let mut rows = Vec::new();
        for row in rows_result
            .rows::<RegionRow>()
            .map_err(|e| StoreError::Scylla(e.to_string()))?
        {
            rows.push(row.map_err(|e| StoreError::Scylla(e.to_string()))?);
        }
        Ok(rows)
    }
}

impl RegionSource for ScyllaRegionSource {
    async fn fetch_all_regions(&self) -> Result<Vec<Region>, StoreError> {
        let rows = self.select_all().await?;
        info!("Fetched {} regions from {}", rows.len(), self.table);
        rows.into_iter()
            .map(|row| region_from_row(&self.table, row))
            .collect()
    }
}

/// All four bbox columns null means the box is derived from the geometry.
fn region_from_row(table: &str, row: RegionRow) -> Result<Region, StoreError> {
    let (locode, north, south, east, west, geometry) = row;
    let bounding_box = match (north, south, east, west) {
        (Some(north), Some(south), Some(east), Some(west)) => {
            Some(BoundingBox::new(north, south, east, west))
        }
        (None, None, None, None) => None,
        _ => {
            return Err(StoreError::IncompleteBoundingBox {
                table: table.to_string(),
                locode,
            })
        }
    };
    Ok(Region {
        identifier: locode,
        bounding_box,
        boundary: BoundaryText::Wkt(geometry),
    })
}

/// Keyspace and table names are interpolated into CQL, so only plain identifiers pass.
fn qualified_table(keyspace: &str, table: &str) -> Result<String, StoreError> {
    let is_identifier = |name: &str| {
        !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !name.starts_with(|c: char| c.is_ascii_digit())
    };
    if is_identifier(keyspace) && is_identifier(table) {
        Ok(format!("{}.{}", keyspace, table))
    } else {
        Err(StoreError::InvalidTable(format!("{}.{}", keyspace, table)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_table() {
        assert_eq!(qualified_table("locode", "regions").unwrap(), "locode.regions");
        assert!(qualified_table("locode", "regions; DROP TABLE x").is_err());
        assert!(qualified_table("", "regions").is_err());
        assert!(qualified_table("1ks", "regions").is_err());
    }

    #[test]
    fn test_region_from_row() {
        let region = region_from_row(
            "locode.regions",
            (
                "US NYC".to_string(),
                Some(40.92),
                Some(40.49),
                Some(-73.70),
                Some(-74.26),
                "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))".to_string(),
            ),
        )
        .unwrap();
        assert_eq!(region.identifier, "US NYC");
        assert_eq!(
            region.bounding_box,
            Some(BoundingBox::new(40.92, 40.49, -73.70, -74.26))
        );

        let region = region_from_row(
            "locode.regions",
            (
                "XX DRV".to_string(),
                None,
                None,
                None,
                None,
                "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))".to_string(),
            ),
        )
        .unwrap();
        assert!(region.bounding_box.is_none());
    }

    #[test]
    fn test_partial_bbox_row_rejected() {
        let err = region_from_row(
            "locode.regions",
            (
                "XX SQR".to_string(),
                None,
                Some(0.0),
                None,
                None,
                "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))".to_string(),
            ),
        )
        .unwrap_err();
        match err {
            StoreError::IncompleteBoundingBox { table, locode } => {
                assert_eq!(table, "locode.regions");
                assert_eq!(locode, "XX SQR");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
