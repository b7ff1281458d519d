//! Region boundaries: parsing, validation and the exact containment test.

use geo::algorithm::coordinate_position::{CoordPos, CoordinatePosition};
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{
    Area, BoundingRect, Contains, Coord, Geometry, Line, LineString, MultiPolygon, Polygon, Rect,
};
use geojson::GeoJson;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use wkt::{ToWkt, TryFromWkt};

use crate::error::GeometryIssue;
use crate::models::{BoundaryText, BoundingBox};

/// Result of locating a point relative to a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    Inside,
    OnBoundary,
    /// Outside every exterior ring, or inside a hole
    Outside,
}

/// A validated region boundary in (lon, lat) axis order.
#[derive(Debug, Clone)]
pub struct Boundary {
    geometry: MultiPolygon<f64>,
    rect: Rect<f64>,
}

impl Boundary {
    /// Parse and validate interchange text.
    pub fn parse(text: &BoundaryText) -> Result<Self, GeometryIssue> {
        let geometry = match text {
            BoundaryText::Wkt(wkt) => parse_wkt(wkt)?,
            BoundaryText::GeoJson(json) => parse_geojson(json)?,
        };
        Self::from_geometry(geometry)
    }

    /// Validate an already-built geometry.
    ///
    /// Rejects empty geometries, rings with fewer than four positions,
    /// positions outside WGS84 range, holes outside their exterior ring,
    /// zero-area polygons and self-intersecting rings.
    pub fn from_geometry(geometry: MultiPolygon<f64>) -> Result<Self, GeometryIssue> {
        validate(&geometry)?;
        let rect = geometry.bounding_rect().ok_or(GeometryIssue::Empty)?;
        Ok(Self { geometry, rect })
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// Tight bounding box of the boundary.
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_rect(self.rect)
    }

    /// Bounding box of each polygon. Parts of a region split at the
    /// antimeridian get their own boxes.
    pub fn part_boxes(&self) -> Vec<BoundingBox> {
        self.geometry
            .iter()
            .filter_map(|polygon| polygon.bounding_rect())
            .map(BoundingBox::from_rect)
            .collect()
    }

    /// Locate a point. Points inside a hole are `Outside`.
    pub fn position(&self, lon: f64, lat: f64) -> Containment {
        let coord = Coord { x: lon, y: lat };
        match self.geometry.coordinate_position(&coord) {
            CoordPos::Inside => Containment::Inside,
            CoordPos::OnBoundary => Containment::OnBoundary,
            CoordPos::Outside => Containment::Outside,
        }
    }

    /// Edge points count as contained.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.position(lon, lat) != Containment::Outside
    }

    pub fn vertex_count(&self) -> usize {
        self.geometry
            .iter()
            .flat_map(rings)
            .map(|ring| ring.0.len())
            .sum()
    }

    pub fn to_wkt(&self) -> String {
        self.geometry.wkt_string()
    }

    pub fn to_geojson(&self) -> String {
        let geometry = geojson::Geometry::new(geojson::Value::from(&self.geometry));
        GeoJson::Geometry(geometry).to_string()
    }
}

fn parse_wkt(text: &str) -> Result<MultiPolygon<f64>, GeometryIssue> {
    let geometry = Geometry::<f64>::try_from_wkt_str(text).map_err(|e| GeometryIssue::Parse {
        format: "wkt",
        message: e.to_string(),
    })?;
    Ok(MultiPolygon::new(collect_polygons(geometry)?))
}

fn parse_geojson(text: &str) -> Result<MultiPolygon<f64>, GeometryIssue> {
    let parse_error = |message: String| GeometryIssue::Parse {
        format: "geojson",
        message,
    };

    let geojson: GeoJson = text.parse().map_err(|e: geojson::Error| parse_error(e.to_string()))?;

    let geometries: Vec<geojson::Geometry> = match geojson {
        GeoJson::Geometry(g) => vec![g],
        GeoJson::Feature(f) => f.geometry.into_iter().collect(),
        GeoJson::FeatureCollection(fc) => fc
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .collect(),
    };

    let mut polygons = Vec::new();
    for g in geometries {
        let geometry = Geometry::<f64>::try_from(g).map_err(|e| parse_error(e.to_string()))?;
        polygons.extend(collect_polygons(geometry)?);
    }
    Ok(MultiPolygon::new(polygons))
}

/// Flatten polygonal geometry. Anything non-areal is rejected.
fn collect_polygons(geometry: Geometry<f64>) -> Result<Vec<Polygon<f64>>, GeometryIssue> {
    match geometry {
        Geometry::Polygon(p) => Ok(vec![p]),
        Geometry::MultiPolygon(mp) => Ok(mp.0),
        Geometry::Rect(r) => Ok(vec![r.to_polygon()]),
        Geometry::Triangle(t) => Ok(vec![t.to_polygon()]),
        Geometry::GeometryCollection(gc) => {
            let mut polygons = Vec::new();
            for g in gc.0 {
                polygons.extend(collect_polygons(g)?);
            }
            Ok(polygons)
        }
        Geometry::Point(_) => Err(GeometryIssue::Unsupported("Point".into())),
        Geometry::Line(_) => Err(GeometryIssue::Unsupported("Line".into())),
        Geometry::LineString(_) => Err(GeometryIssue::Unsupported("LineString".into())),
        Geometry::MultiPoint(_) => Err(GeometryIssue::Unsupported("MultiPoint".into())),
        Geometry::MultiLineString(_) => {
            Err(GeometryIssue::Unsupported("MultiLineString".into()))
        }
    }
}

fn rings(polygon: &Polygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
    std::iter::once(polygon.exterior()).chain(polygon.interiors())
}

fn is_wgs84(coord: &Coord<f64>) -> bool {
    coord.x.is_finite()
        && coord.y.is_finite()
        && (-180.0..=180.0).contains(&coord.x)
        && (-90.0..=90.0).contains(&coord.y)
}

fn validate(geometry: &MultiPolygon<f64>) -> Result<(), GeometryIssue> {
    if geometry.0.is_empty() {
        return Err(GeometryIssue::Empty);
    }

    for (polygon_idx, polygon) in geometry.iter().enumerate() {
        for (ring_idx, ring) in rings(polygon).enumerate() {
            // Polygon::new closes rings, so a valid triangle has 4 positions here
            if ring.0.len() < 4 {
                return Err(GeometryIssue::TooFewPositions {
                    polygon: polygon_idx,
                    ring: ring_idx,
                    count: ring.0.len(),
                });
            }
            if let Some(bad) = ring.0.iter().find(|c| !is_wgs84(c)) {
                return Err(GeometryIssue::CoordinateOutOfRange {
                    lon: bad.x,
                    lat: bad.y,
                });
            }
        }

        let shell = Polygon::new(polygon.exterior().clone(), Vec::new());
        for (hole_idx, hole) in polygon.interiors().iter().enumerate() {
            if !shell.contains(&Polygon::new(hole.clone(), Vec::new())) {
                return Err(GeometryIssue::HoleOutsideShell {
                    polygon: polygon_idx,
                    ring: hole_idx + 1,
                });
            }
        }

        if polygon.unsigned_area() <= 0.0 {
            return Err(GeometryIssue::ZeroArea);
        }

        for (ring_idx, ring) in rings(polygon).enumerate() {
            if let Some(at) = find_self_intersection(ring) {
                return Err(GeometryIssue::SelfIntersecting {
                    polygon: polygon_idx,
                    ring: ring_idx,
                    lon: at.x,
                    lat: at.y,
                });
            }
        }
    }

    Ok(())
}

type SegmentEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

fn segment_aabb(line: &Line<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([line.start.x, line.start.y], [line.end.x, line.end.y])
}

/// First crossing or overlap between ring segments, if any.
///
/// Segments are indexed in an R-tree so only pairs with overlapping
/// envelopes are tested. Neighbouring segments may share their common
/// vertex but must not overlap.
fn find_self_intersection(ring: &LineString<f64>) -> Option<Coord<f64>> {
    // Repeated consecutive positions produce zero-length segments; ignore them.
    let segments: Vec<Line<f64>> = ring.lines().filter(|l| l.start != l.end).collect();
    let n = segments.len();
    if n < 3 {
        return None;
    }

    let entries: Vec<SegmentEnvelope> = segments
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            let aabb = segment_aabb(line);
            GeomWithData::new(Rectangle::from_aabb(aabb), idx)
        })
        .collect();
    let tree = RTree::bulk_load(entries);

    for (i, segment) in segments.iter().enumerate() {
        for candidate in tree.locate_in_envelope_intersecting(&segment_aabb(segment)) {
            let j = candidate.data;
            if j <= i {
                continue;
            }
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(*segment, segments[j]) {
                None => {}
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    if !adjacent {
                        return Some(intersection);
                    }
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    return Some(intersection.start);
                }
            }
        }
    }

    None
}
