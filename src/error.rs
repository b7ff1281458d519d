use std::path::PathBuf;
use thiserror::Error;

/// Why a region's boundary (or bounding box) was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryIssue {
    #[error("failed to parse {format} boundary: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("unsupported geometry type '{0}', expected Polygon or MultiPolygon")]
    Unsupported(String),

    #[error("boundary has no polygons")]
    Empty,

    #[error("ring {ring} of polygon {polygon} has {count} positions, at least 4 required")]
    TooFewPositions {
        polygon: usize,
        ring: usize,
        count: usize,
    },

    #[error("coordinate ({lon}, {lat}) is not a valid WGS84 position")]
    CoordinateOutOfRange { lon: f64, lat: f64 },

    #[error("hole {ring} of polygon {polygon} is not inside its exterior ring")]
    HoleOutsideShell { polygon: usize, ring: usize },

    #[error("boundary encloses zero area")]
    ZeroArea,

    #[error("ring {ring} of polygon {polygon} intersects itself near ({lon}, {lat})")]
    SelfIntersecting {
        polygon: usize,
        ring: usize,
        lon: f64,
        lat: f64,
    },

    #[error("invalid bounding box: {0}")]
    BoundingBox(String),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid geometry for region '{identifier}': {issue}")]
    InvalidGeometry {
        identifier: String,
        #[source]
        issue: GeometryIssue,
    },

    #[error("duplicate region identifier '{0}'")]
    DuplicateIdentifier(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("invalid coordinate ({lat}, {lon}): {reason}")]
    InvalidCoordinate {
        lat: f64,
        lon: f64,
        reason: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read region file '{0}'")]
    FileRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse CSV region file '{0}'")]
    Csv(PathBuf, #[source] csv::Error),

    #[error("Failed to parse GeoJSON region file '{0}'")]
    GeoJson(PathBuf, #[source] Box<geojson::Error>),

    #[error("Feature {index} in '{path}' has no '{property}' property")]
    MissingIdentifier {
        path: PathBuf,
        index: usize,
        property: String,
    },

    #[error("Feature {index} in '{path}' has no geometry")]
    MissingGeometry { path: PathBuf, index: usize },

    #[error("Row {row} in '{path}' has an incomplete bounding box")]
    PartialBoundingBox { path: PathBuf, row: usize },

    #[error("Region '{locode}' in '{table}' has an incomplete bounding box")]
    IncompleteBoundingBox { table: String, locode: String },

    #[error("Invalid table reference '{0}'")]
    InvalidTable(String),

    #[error("ScyllaDB error: {0}")]
    Scylla(String),
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("a refresh is already in progress")]
    InProgress,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("index build task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
