//! Spatial index for fast locode lookups.

use std::time::Instant;

use chrono::{DateTime, Utc};
use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::Boundary;
use crate::error::{BuildError, GeometryIssue, QueryError};
use crate::models::{BoundingBox, Region};

/// What to do with a region whose boundary or bounding box is invalid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidGeometryPolicy {
    /// Fail the whole build
    #[default]
    Abort,
    /// Log and leave the region out
    Skip,
}

/// What to do when two regions share an identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    #[default]
    Abort,
    /// Keep the first occurrence in input order
    KeepFirst,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    #[serde(default)]
    pub on_invalid_geometry: InvalidGeometryPolicy,
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildStats {
    /// Regions handed to the build
    pub input: usize,
    pub indexed: usize,
    pub skipped_invalid: usize,
    pub skipped_duplicate: usize,
    pub vertices: usize,
    pub built_at: DateTime<Utc>,
    pub elapsed_ms: u128,
}

/// A validated region ready for lookups.
#[derive(Debug, Clone)]
pub struct IndexedRegion {
    identifier: String,
    bounding_box: BoundingBox,
    boundary: Boundary,
    area: f64,
}

impl IndexedRegion {
    fn prepare(region: Region) -> Result<Self, BuildError> {
        let Region {
            identifier,
            bounding_box,
            boundary,
        } = region;

        let invalid = |issue: GeometryIssue| BuildError::InvalidGeometry {
            identifier: identifier.clone(),
            issue,
        };

        let boundary = Boundary::parse(&boundary).map_err(invalid)?;
        let bounding_box = match bounding_box {
            Some(bbox) => {
                bbox.validate()
                    .map_err(|reason| invalid(GeometryIssue::BoundingBox(reason)))?;
                if !boundary.part_boxes().iter().all(|part| bbox.covers(part)) {
                    warn!(
                        "Bounding box of region {} does not cover its boundary; points outside the box will not match",
                        identifier
                    );
                }
                bbox
            }
            None => boundary.bounding_box(),
        };

        Ok(Self {
            area: bounding_box.area(),
            identifier,
            bounding_box,
            boundary,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Bounding-box area in square degrees, the ordering key for results
    pub fn area(&self) -> f64 {
        self.area
    }
}

/// R-tree entry pointing back at a region slot.
struct RegionEnvelope {
    slot: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Check a query point and wrap its longitude into `[-180, 180]`.
pub fn normalize_point(lat: f64, lon: f64) -> Result<(f64, f64), QueryError> {
    let invalid = |reason| QueryError::InvalidCoordinate { lat, lon, reason };

    if !lat.is_finite() || !lon.is_finite() {
        return Err(invalid("coordinates must be finite numbers"));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(invalid("latitude must be within [-90, 90]"));
    }
    if (-180.0..=180.0).contains(&lon) {
        Ok((lat, lon))
    } else {
        Ok((lat, (lon + 180.0).rem_euclid(360.0) - 180.0))
    }
}

/// Longitudes naming the same meridian. 180 and -180 are one line.
fn meridian_aliases(lon: f64) -> Vec<f64> {
    if lon.abs() == 180.0 {
        vec![180.0, -180.0]
    } else {
        vec![lon]
    }
}

/// Immutable spatial index over region bounding boxes and boundaries.
///
/// Lookups run an R-tree envelope query against the bounding boxes, then an
/// exact point-in-polygon test on each candidate.
pub struct SpatialIndex {
    regions: Vec<IndexedRegion>,
    tree: RTree<RegionEnvelope>,
    by_identifier: HashMap<String, usize>,
    stats: BuildStats,
}

impl SpatialIndex {
    /// Build with default options: any invalid geometry or duplicate aborts.
    pub fn build(regions: Vec<Region>) -> Result<Self, BuildError> {
        Self::build_with(regions, BuildOptions::default())
    }

    pub fn build_with(regions: Vec<Region>, options: BuildOptions) -> Result<Self, BuildError> {
        let started = Instant::now();
        let input = regions.len();
        info!("Building spatial index for {} regions...", input);

        // Duplicates are resolved in input order before any geometry work
        let mut seen: HashSet<String> = HashSet::with_capacity(input);
        let mut unique = Vec::with_capacity(input);
        let mut skipped_duplicate = 0;
        for region in regions {
            if !seen.insert(region.identifier.clone()) {
                match options.on_duplicate {
                    DuplicatePolicy::Abort => {
                        return Err(BuildError::DuplicateIdentifier(region.identifier));
                    }
                    DuplicatePolicy::KeepFirst => {
                        warn!("Skipping duplicate region {}", region.identifier);
                        skipped_duplicate += 1;
                        continue;
                    }
                }
            }
            unique.push(region);
        }

        let prepared: Vec<Result<IndexedRegion, BuildError>> = unique
            .into_par_iter()
            .map(IndexedRegion::prepare)
            .collect();

        let mut indexed = Vec::with_capacity(prepared.len());
        let mut skipped_invalid = 0;
        for result in prepared {
            match result {
                Ok(region) => indexed.push(region),
                Err(e) => match options.on_invalid_geometry {
                    InvalidGeometryPolicy::Abort => return Err(e),
                    InvalidGeometryPolicy::Skip => {
                        warn!("Skipping region: {}", e);
                        skipped_invalid += 1;
                    }
                },
            }
        }

        let mut index = Self::from_regions(indexed, input);
        index.stats.skipped_invalid = skipped_invalid;
        index.stats.skipped_duplicate = skipped_duplicate;
        index.stats.elapsed_ms = started.elapsed().as_millis();

        info!(
            "Spatial index built with {} regions ({} vertices, {} invalid skipped, {} duplicates skipped) in {} ms",
            index.len(),
            index.stats.vertices,
            skipped_invalid,
            skipped_duplicate,
            index.stats.elapsed_ms
        );

        Ok(index)
    }

    /// An index with no regions; every query returns no match.
    pub fn empty() -> Self {
        Self::from_regions(Vec::new(), 0)
    }

    fn from_regions(regions: Vec<IndexedRegion>, input: usize) -> Self {
        let envelopes: Vec<RegionEnvelope> = regions
            .iter()
            .enumerate()
            .flat_map(|(slot, region)| {
                region
                    .bounding_box
                    .envelopes()
                    .into_iter()
                    .map(move |envelope| RegionEnvelope { slot, envelope })
            })
            .collect();

        let by_identifier = regions
            .iter()
            .enumerate()
            .map(|(slot, region)| (region.identifier.clone(), slot))
            .collect();

        let stats = BuildStats {
            input,
            indexed: regions.len(),
            skipped_invalid: 0,
            skipped_duplicate: 0,
            vertices: regions.iter().map(|r| r.boundary.vertex_count()).sum(),
            built_at: Utc::now(),
            elapsed_ms: 0,
        };

        Self {
            tree: RTree::bulk_load(envelopes),
            regions,
            by_identifier,
            stats,
        }
    }

    /// All regions containing the point, most specific (smallest box) first.
    pub fn lookup(&self, lat: f64, lon: f64) -> Result<Vec<&IndexedRegion>, QueryError> {
        let (lat, lon) = normalize_point(lat, lon)?;
        let longitudes = meridian_aliases(lon);

        // Antimeridian boxes have two envelopes that can both touch ±180
        let mut slots: Vec<usize> = Vec::new();
        for &lon in &longitudes {
            let query_envelope = AABB::from_point([lon, lat]);
            slots.extend(
                self.tree
                    .locate_in_envelope_intersecting(&query_envelope)
                    .map(|e| e.slot),
            );
        }
        slots.sort_unstable();
        slots.dedup();

        let candidates = slots.len();
        let mut matches: Vec<&IndexedRegion> = slots
            .into_iter()
            .map(|slot| &self.regions[slot])
            .filter(|region| {
                longitudes.iter().any(|&lon| {
                    region.bounding_box.contains(lat, lon) && region.boundary.contains(lon, lat)
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            a.area
                .total_cmp(&b.area)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });

        debug!(
            "Lookup at ({}, {}): {} candidates, {} matches",
            lat,
            lon,
            candidates,
            matches.len()
        );

        Ok(matches)
    }

    /// Identifiers of all regions containing the point, most specific first.
    ///
    /// No match yields an empty vector.
    pub fn query(&self, lat: f64, lon: f64) -> Result<Vec<&str>, QueryError> {
        Ok(self
            .lookup(lat, lon)?
            .into_iter()
            .map(|region| region.identifier())
            .collect())
    }

    /// Most specific identifier containing the point, if any.
    pub fn query_first(&self, lat: f64, lon: f64) -> Result<Option<&str>, QueryError> {
        Ok(self.query(lat, lon)?.into_iter().next())
    }

    pub fn get(&self, identifier: &str) -> Option<&IndexedRegion> {
        self.by_identifier
            .get(identifier)
            .map(|slot| &self.regions[*slot])
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> impl Iterator<Item = &IndexedRegion> {
        self.regions.iter()
    }
}
