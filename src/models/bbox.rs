//! Axis-aligned WGS84 bounding boxes used as the cheap prefilter.

use geo::Rect;
use rstar::AABB;
use serde::{Deserialize, Serialize};

/// Bounding box in WGS84 degrees.
///
/// A box whose `west` edge is greater than its `east` edge crosses the
/// ±180° meridian and covers `[west, 180] ∪ [-180, east]` in longitude.
/// Containment is inclusive on every edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Box covering a `geo` rectangle in (lon, lat) axis order.
    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self {
            north: rect.max().y,
            south: rect.min().y,
            east: rect.max().x,
            west: rect.min().x,
        }
    }

    /// Check the WGS84 invariants, returning a description of the first violation.
    pub fn validate(&self) -> Result<(), String> {
        let edges = [
            ("north", self.north),
            ("south", self.south),
            ("east", self.east),
            ("west", self.west),
        ];
        for (name, value) in edges {
            if !value.is_finite() {
                return Err(format!("{} edge is not a finite number", name));
            }
        }
        for (name, value) in [("north", self.north), ("south", self.south)] {
            if !(-90.0..=90.0).contains(&value) {
                return Err(format!("{} edge {} is outside [-90, 90]", name, value));
            }
        }
        for (name, value) in [("east", self.east), ("west", self.west)] {
            if !(-180.0..=180.0).contains(&value) {
                return Err(format!("{} edge {} is outside [-180, 180]", name, value));
            }
        }
        if self.north < self.south {
            return Err(format!(
                "north edge {} is below south edge {}",
                self.north, self.south
            ));
        }
        Ok(())
    }

    /// Whether the box wraps across the antimeridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// Longitude span in degrees, accounting for antimeridian wrap.
    pub fn lon_span(&self) -> f64 {
        if self.crosses_antimeridian() {
            360.0 - self.west + self.east
        } else {
            self.east - self.west
        }
    }

    /// Area in square degrees. Only used to rank nested regions.
    pub fn area(&self) -> f64 {
        self.lon_span() * (self.north - self.south)
    }

    /// `lat BETWEEN south AND north AND lon BETWEEN west AND east`, with wrap.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        if lat < self.south || lat > self.north {
            return false;
        }
        if self.crosses_antimeridian() {
            lon >= self.west || lon <= self.east
        } else {
            lon >= self.west && lon <= self.east
        }
    }

    /// Whether this box covers every point of `other`.
    pub fn covers(&self, other: &BoundingBox) -> bool {
        if other.north > self.north || other.south < self.south {
            return false;
        }
        match (self.crosses_antimeridian(), other.crosses_antimeridian()) {
            (false, false) | (true, true) => {
                other.west >= self.west && other.east <= self.east
            }
            // A plain box fits inside a wrapping one if it sits wholly on one side.
            (true, false) => other.west >= self.west || other.east <= self.east,
            (false, true) => self.west <= -180.0 && self.east >= 180.0,
        }
    }

    /// R-tree envelopes in `[lon, lat]` order. Antimeridian boxes yield two.
    pub fn envelopes(&self) -> Vec<AABB<[f64; 2]>> {
        if self.crosses_antimeridian() {
            vec![
                AABB::from_corners([self.west, self.south], [180.0, self.north]),
                AABB::from_corners([-180.0, self.south], [self.east, self.north]),
            ]
        } else {
            vec![AABB::from_corners(
                [self.west, self.south],
                [self.east, self.north],
            )]
        }
    }
}
