//! Locode resolver holding the active spatial index.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{BuildOptions, BuildStats, SpatialIndex};
use crate::error::{QueryError, RefreshError};
use crate::sources::RegionSource;

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    /// Regions returned by the store
    pub fetched: usize,
    pub stats: BuildStats,
}

/// Resolves coordinates to locodes against a swappable index.
///
/// Readers take an `Arc` snapshot of the current index, so a refresh never
/// exposes a half-built index and in-flight lookups keep their snapshot.
pub struct LocodeResolver {
    active: RwLock<Arc<SpatialIndex>>,
    refresh_lock: Mutex<()>,
    options: BuildOptions,
}

impl LocodeResolver {
    pub fn new(index: SpatialIndex, options: BuildOptions) -> Self {
        Self {
            active: RwLock::new(Arc::new(index)),
            refresh_lock: Mutex::new(()),
            options,
        }
    }

    /// Resolver with no regions until the first refresh.
    pub fn empty(options: BuildOptions) -> Self {
        Self::new(SpatialIndex::empty(), options)
    }

    /// Snapshot of the active index.
    pub fn current(&self) -> Arc<SpatialIndex> {
        Arc::clone(&self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in a prebuilt index, returning the previous one.
    pub fn replace(&self, index: SpatialIndex) -> Arc<SpatialIndex> {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *active, Arc::new(index))
    }

    pub fn query(&self, lat: f64, lon: f64) -> Result<Vec<String>, QueryError> {
        let index = self.current();
        let codes = index.query(lat, lon)?;
        Ok(codes.into_iter().map(str::to_string).collect())
    }

    pub fn query_first(&self, lat: f64, lon: f64) -> Result<Option<String>, QueryError> {
        let index = self.current();
        let code = index.query_first(lat, lon)?;
        Ok(code.map(str::to_string))
    }

    /// Rebuild from `source` and swap the result in.
    ///
    /// Only one refresh runs at a time; a concurrent call fails with
    /// `RefreshError::InProgress`. On any failure, or if the future is
    /// dropped before completion, the previous index stays active.
    pub async fn refresh<S: RegionSource>(
        &self,
        source: &S,
    ) -> Result<RefreshReport, RefreshError> {
        let _guard = self
            .refresh_lock
            .try_lock()
            .map_err(|_| RefreshError::InProgress)?;

        match self.rebuild(source).await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!("Refresh failed, keeping previous index: {}", e);
                Err(e)
            }
        }
    }

    async fn rebuild<S: RegionSource>(&self, source: &S) -> Result<RefreshReport, RefreshError> {
        info!("Refreshing spatial index...");
        let regions = source.fetch_all_regions().await?;
        let fetched = regions.len();

        let options = self.options;
        let index = tokio::task::spawn_blocking(move || SpatialIndex::build_with(regions, options))
            .await??;

        let stats = index.stats().clone();
        let previous = self.replace(index);
        info!(
            "Swapped spatial index: {} regions (previously {})",
            stats.indexed,
            previous.len()
        );

        Ok(RefreshReport { fetched, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BuildError, StoreError};
    use crate::models::{BoundaryText, BoundingBox, Region};
    use std::time::Duration;

    fn square(id: &str, west: f64, south: f64, east: f64, north: f64) -> Region {
        Region::new(
            id,
            BoundingBox::new(north, south, east, west),
            BoundaryText::Wkt(format!(
                "POLYGON(({w} {s}, {e} {s}, {e} {n}, {w} {n}, {w} {s}))",
                w = west,
                s = south,
                e = east,
                n = north
            )),
        )
    }

    struct StaticSource(Vec<Region>);

    impl RegionSource for StaticSource {
        async fn fetch_all_regions(&self) -> Result<Vec<Region>, StoreError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    impl RegionSource for FailingSource {
        async fn fetch_all_regions(&self) -> Result<Vec<Region>, StoreError> {
            Err(StoreError::InvalidTable("missing.regions".into()))
        }
    }

    struct SlowSource(Vec<Region>);

    impl RegionSource for SlowSource {
        async fn fetch_all_regions(&self) -> Result<Vec<Region>, StoreError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_refresh_swaps_index() {
        let resolver = LocodeResolver::empty(BuildOptions::default());
        assert_eq!(resolver.query_first(0.5, 0.5).unwrap(), None);

        let source = StaticSource(vec![square("XX AAA", 0.0, 0.0, 1.0, 1.0)]);
        let report = resolver.refresh(&source).await.unwrap();
        assert_eq!(report.fetched, 1);
        assert_eq!(report.stats.indexed, 1);
        assert_eq!(
            resolver.query_first(0.5, 0.5).unwrap(),
            Some("XX AAA".to_string())
        );
    }

    #[tokio::test]
    async fn test_snapshot_survives_refresh() {
        let first = SpatialIndex::build(vec![square("XX OLD", 0.0, 0.0, 1.0, 1.0)]).unwrap();
        let resolver = LocodeResolver::new(first, BuildOptions::default());
        let snapshot = resolver.current();

        let source = StaticSource(vec![square("XX NEW", 0.0, 0.0, 1.0, 1.0)]);
        resolver.refresh(&source).await.unwrap();

        assert_eq!(snapshot.query(0.5, 0.5).unwrap(), vec!["XX OLD"]);
        assert_eq!(resolver.query(0.5, 0.5).unwrap(), vec!["XX NEW".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_refresh_keeps_previous_index() {
        let first = SpatialIndex::build(vec![square("XX OLD", 0.0, 0.0, 1.0, 1.0)]).unwrap();
        let resolver = LocodeResolver::new(first, BuildOptions::default());

        let source = StaticSource(vec![
            square("XX DUP", 0.0, 0.0, 1.0, 1.0),
            square("XX DUP", 2.0, 2.0, 3.0, 3.0),
        ]);
        let err = resolver.refresh(&source).await.unwrap_err();
        assert!(matches!(
            err,
            RefreshError::Build(BuildError::DuplicateIdentifier(_))
        ));
        assert_eq!(resolver.query(0.5, 0.5).unwrap(), vec!["XX OLD".to_string()]);
    }

    #[tokio::test]
    async fn test_store_failure_keeps_previous_index() {
        let first = SpatialIndex::build(vec![square("XX OLD", 0.0, 0.0, 1.0, 1.0)]).unwrap();
        let resolver = LocodeResolver::new(first, BuildOptions::default());

        let err = resolver.refresh(&FailingSource).await.unwrap_err();
        assert!(matches!(err, RefreshError::Store(_)));
        assert_eq!(resolver.current().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_rejected() {
        let resolver = Arc::new(LocodeResolver::empty(BuildOptions::default()));
        let source = Arc::new(SlowSource(vec![square("XX AAA", 0.0, 0.0, 1.0, 1.0)]));

        let first = {
            let resolver = Arc::clone(&resolver);
            let source = Arc::clone(&source);
            tokio::spawn(async move { resolver.refresh(source.as_ref()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = resolver.refresh(source.as_ref()).await;
        assert!(matches!(second, Err(RefreshError::InProgress)));

        assert!(first.await.unwrap().is_ok());
        assert_eq!(resolver.current().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_refresh_keeps_previous_index() {
        let first = SpatialIndex::build(vec![square("XX OLD", 0.0, 0.0, 1.0, 1.0)]).unwrap();
        let resolver = LocodeResolver::new(first, BuildOptions::default());
        let source = SlowSource(vec![square("XX NEW", 0.0, 0.0, 1.0, 1.0)]);

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), resolver.refresh(&source)).await;
        assert!(cancelled.is_err());
        assert_eq!(resolver.query(0.5, 0.5).unwrap(), vec!["XX OLD".to_string()]);

        // The refresh lock is released with the dropped future
        assert!(resolver.refresh(&source).await.is_ok());
    }

    #[test]
    fn test_concurrent_readers() {
        let index = SpatialIndex::build(vec![
            square("XX AAA", 0.0, 0.0, 10.0, 10.0),
            square("XX BBB", 2.0, 2.0, 4.0, 4.0),
        ])
        .unwrap();
        let resolver = Arc::new(LocodeResolver::new(index, BuildOptions::default()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(
                            resolver.query(3.0, 3.0).unwrap(),
                            vec!["XX BBB".to_string(), "XX AAA".to_string()]
                        );
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
