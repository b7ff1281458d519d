//! Region stores the spatial index is built from.

use std::future::Future;

use crate::error::StoreError;
use crate::models::Region;
use crate::scylla::ScyllaRegionSource;

mod csv_file;
mod geojson_file;

pub use csv_file::CsvFileSource;
pub use geojson_file::GeoJsonFileSource;

/// Read access to a backing store of regions.
///
/// Called only while building or refreshing an index, never per query.
pub trait RegionSource: Send + Sync {
    fn fetch_all_regions(&self) -> impl Future<Output = Result<Vec<Region>, StoreError>> + Send;
}

/// The store selected by configuration.
pub enum RegionStore {
    GeoJson(GeoJsonFileSource),
    Csv(CsvFileSource),
    Scylla(ScyllaRegionSource),
}

impl RegionStore {
    pub fn describe(&self) -> String {
        match self {
            RegionStore::GeoJson(s) => format!("geojson:{}", s.path().display()),
            RegionStore::Csv(s) => format!("csv:{}", s.path().display()),
            RegionStore::Scylla(s) => format!("scylla:{}", s.table()),
        }
    }
}

impl RegionSource for RegionStore {
    async fn fetch_all_regions(&self) -> Result<Vec<Region>, StoreError> {
        match self {
            RegionStore::GeoJson(s) => s.fetch_all_regions().await,
            RegionStore::Csv(s) => s.fetch_all_regions().await,
            RegionStore::Scylla(s) => s.fetch_all_regions().await,
        }
    }
}
