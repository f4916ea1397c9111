use chrono::{Datelike, NaiveDate};
use geo::{coord, MultiPolygon, Polygon, Rect};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Scale factor between physical NDVI and the archive's integer samples.
pub const NDVI_SCALE: f64 = 10_000.0;

/// Raw-unit tolerance when comparing a sample against the nodata sentinel.
pub const NODATA_EPSILON: f64 = 1.0;

/// Offset between days-from-CE (chrono) and the julian day number.
const JULIAN_DAY_OFFSET: i64 = 1_721_425;

/// 2D grid of scaled integer NDVI samples (row x column)
pub type NdviGrid = Array2<i32>;

/// Sensor identity of a raster file, resolved once from the configured
/// filename identifiers when the file is first seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorKind {
    Primary,
    Secondary,
}

impl SensorKind {
    pub fn all() -> [SensorKind; 2] {
        [SensorKind::Primary, SensorKind::Secondary]
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorKind::Primary => write!(f, "primary"),
            SensorKind::Secondary => write!(f, "secondary"),
        }
    }
}

/// Configured filename identifiers for the two supported sensors.
///
/// Exactly one identifier must occur in a raster filename; anything else is
/// a configuration error (a third sensor is deliberately unsupported).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub primary_tag: String,
    pub secondary_tag: String,
}

impl SensorConfig {
    pub fn new<S: Into<String>>(primary_tag: S, secondary_tag: S) -> Self {
        Self {
            primary_tag: primary_tag.into(),
            secondary_tag: secondary_tag.into(),
        }
    }

    /// Resolve the sensor of a raster file from its filename.
    pub fn resolve(&self, filename: &str) -> NdviResult<SensorKind> {
        let primary = filename.contains(&self.primary_tag);
        let secondary = filename.contains(&self.secondary_tag);
        match (primary, secondary) {
            (true, false) => Ok(SensorKind::Primary),
            (false, true) => Ok(SensorKind::Secondary),
            _ => Err(NdviError::Configuration(format!(
                "filename '{}' must match exactly one sensor identifier ('{}' or '{}')",
                filename, self.primary_tag, self.secondary_tag
            ))),
        }
    }

    /// Configured identifier for a resolved sensor kind.
    pub fn tag(&self, kind: SensorKind) -> &str {
        match kind {
            SensorKind::Primary => &self.primary_tag,
            SensorKind::Secondary => &self.secondary_tag,
        }
    }
}

/// Axis-aligned extent in the project coordinate system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_x, y: self.min_y },
            coord! { x: self.max_x, y: self.max_y },
        )
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        self.to_rect().to_polygon()
    }

    pub fn from_rect(rect: &Rect<f64>) -> Self {
        Self {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        }
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Overlapping extent of two boxes, or None when they are disjoint.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }
        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }
}

/// Convert a calendar date to its julian day number.
pub fn julian_day(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce()) + JULIAN_DAY_OFFSET
}

/// Convert a julian day number back to a calendar date.
pub fn date_from_julian_day(jd: i64) -> NdviResult<NaiveDate> {
    let days = i32::try_from(jd - JULIAN_DAY_OFFSET)
        .map_err(|_| NdviError::Domain(format!("julian day {} out of range", jd)))?;
    NaiveDate::from_num_days_from_ce_opt(days)
        .ok_or_else(|| NdviError::Domain(format!("julian day {} out of range", jd)))
}

/// Parse WKT into a multipolygon; polygon input is promoted, every other
/// geometry type is rejected.
pub fn multipolygon_from_wkt(text: &str) -> NdviResult<MultiPolygon<f64>> {
    use wkt::TryFromWkt;
    let geometry = geo::Geometry::<f64>::try_from_wkt_str(text)
        .map_err(|e| NdviError::Geometry(format!("WKT parse failed: {}", e)))?;
    match geometry {
        geo::Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        geo::Geometry::MultiPolygon(multi) => Ok(multi),
        other => Err(NdviError::Geometry(format!(
            "expected polygon or multipolygon, got {}",
            geometry_kind(&other)
        ))),
    }
}

fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "point",
        geo::Geometry::Line(_) => "line",
        geo::Geometry::LineString(_) => "linestring",
        geo::Geometry::Polygon(_) => "polygon",
        geo::Geometry::MultiPoint(_) => "multipoint",
        geo::Geometry::MultiLineString(_) => "multilinestring",
        geo::Geometry::MultiPolygon(_) => "multipolygon",
        geo::Geometry::GeometryCollection(_) => "geometrycollection",
        geo::Geometry::Rect(_) => "rect",
        geo::Geometry::Triangle(_) => "triangle",
    }
}

/// Convert a scaled integer sample to physical NDVI using the file's
/// linear radiometric conversion.
pub fn scaled_to_ndvi(raw: i32, gain: f64, offset: f64) -> f64 {
    f64::from(raw) / NDVI_SCALE * gain + offset
}

/// Re-quantize a physical NDVI value to the scaled integer domain.
pub fn quantize_ndvi(ndvi: f64) -> i32 {
    (ndvi * NDVI_SCALE).round() as i32
}

/// User-defined region of interest: an administrative parcel carrying a
/// crop label. Immutable once loaded for a run.
#[derive(Debug, Clone)]
pub struct RegionOfInterest {
    /// Unique code; the configured increment is already applied.
    pub code: i64,
    pub crop_code: i32,
    /// Parcel geometry in the project coordinate system.
    pub geometry: MultiPolygon<f64>,
    /// Area from the catalog's area function, computed once at ingestion.
    pub area: f64,
}

/// A node of the hierarchical tiling scheme as persisted in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileRecord {
    pub id: i64,
    /// Opaque tuplekey of the tile in the addressing scheme.
    pub key: String,
    /// Tiling level of detail; defines the tile's spatial extent.
    pub lod: u8,
    pub extent: BoundingBox,
}

/// Metadata of one NDVI raster file in the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterFileMeta {
    pub filename: String,
    pub sensor: SensorKind,
    pub date: NaiveDate,
    /// Linear radiometric conversion applied to scaled samples.
    pub gain: f64,
    pub offset: f64,
    /// Ground sample distance in project units.
    pub gsd: f64,
    pub bounds: BoundingBox,
    /// Tiling level of the tile the file belongs to.
    pub tiling_lod: u8,
    /// Resolution level; independent of the tiling level.
    pub resolution_lod: u8,
}

impl RasterFileMeta {
    /// North-west corner of the raster.
    pub fn origin(&self) -> (f64, f64) {
        (self.bounds.min_x, self.bounds.max_y)
    }

    pub fn rows(&self) -> usize {
        (self.bounds.height() / self.gsd).round() as usize
    }

    pub fn cols(&self) -> usize {
        (self.bounds.width() / self.gsd).round() as usize
    }
}

/// One row of the catalog's candidate query: a raster file whose tile
/// intersects a ROI inside the requested date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRow {
    pub filename: String,
    pub tile_key: String,
    pub tile_id: i64,
    pub raster_id: i64,
    pub date: NaiveDate,
    pub gain: f64,
    pub offset: f64,
    pub gsd: f64,
    pub bounds: BoundingBox,
    pub tiling_lod: u8,
    pub resolution_lod: u8,
}

/// A raster file decoded into its integer sample grid.
#[derive(Debug, Clone)]
pub struct DecodedRaster {
    /// Scaled integer samples, row-major from the north-west corner.
    pub samples: NdviGrid,
    /// Nodata sentinel in the scaled sample domain.
    pub nodata: f64,
}

impl DecodedRaster {
    pub fn rows(&self) -> usize {
        self.samples.nrows()
    }

    pub fn cols(&self) -> usize {
        self.samples.ncols()
    }

    /// True when a sample lies within the nodata tolerance.
    pub fn is_nodata(&self, value: i32) -> bool {
        (f64::from(value) - self.nodata).abs() < NODATA_EPSILON
    }
}

/// Finalized per-bucket statistics in physical NDVI units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

/// Error types for NDVI statistics processing
#[derive(Debug, thiserror::Error)]
pub enum NdviError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Invalid value: {0}")]
    Domain(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<NdviError>,
    },
}

impl NdviError {
    /// Render the full causal chain as one diagnostic string.
    pub fn chain_string(&self) -> String {
        let mut message = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            message.push_str(": ");
            message.push_str(&err.to_string());
            cause = err.source();
        }
        message
    }
}

/// Result type for NDVI statistics operations
pub type NdviResult<T> = Result<T, NdviError>;

/// Attach the failing operation and its identifiers to an error.
pub trait ErrorContext<T> {
    fn context<F>(self, describe: F) -> NdviResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ErrorContext<T> for NdviResult<T> {
    fn context<F>(self, describe: F) -> NdviResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| NdviError::Context {
            context: describe(),
            source: Box::new(err),
        })
    }
}
