//! Verdine: A Fast, Modular NDVI Time-Series Statistics Engine
//!
//! This library computes per-parcel NDVI time-series statistics from a tiled
//! satellite-imagery archive for agricultural classification. Regions of
//! interest carry an administrative code and a crop label; the engine scans
//! a catalog of pre-processed NDVI raster tiles over a date range, samples
//! every raster cell inside each region (at sub-pixel precision along
//! boundaries) and emits per-sensor daily mean/standard-deviation tables.

pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, DecodedRaster, NdviError, NdviGrid, NdviResult, RasterFileMeta,
    RegionOfInterest, SampleStats, SensorConfig, SensorKind, TileRecord,
};

pub use crate::io::{MemoryCatalog, ProjectConfig, RasterSource, SpatialCatalog};

pub use crate::core::{AggregationEngine, AggregationOutcome, PixelSampler, QuadkeyScheme};

use crate::io::reports::{RoiInfo, SummaryTable, TraceLog};
use chrono::NaiveDate;
use std::fs::File;
use std::io::{BufWriter, Write};
use types::ErrorContext;

/// Run the full classification report over every ROI in the catalog.
///
/// Writes the execution trace and one fixed-width summary table per sensor
/// to the configured output paths. Any failure aborts the whole run; output
/// files are closed on every exit path before the error is surfaced, and
/// [`NdviError::chain_string`] renders the accumulated diagnostic.
pub fn run_classification<C: SpatialCatalog>(
    config: &ProjectConfig,
    catalog: &C,
    source: Box<dyn RasterSource>,
    first: NaiveDate,
    last: NaiveDate,
) -> NdviResult<()> {
    std::fs::create_dir_all(&config.report_dir)?;
    if let Some(parent) = config.trace_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let trace_file = File::create(&config.trace_path)
        .map_err(NdviError::Io)
        .context(|| format!("creating trace log {}", config.trace_path.display()))?;
    let mut trace = TraceLog::new(BufWriter::new(trace_file));

    let roi_codes = catalog.roi_codes()?;
    let mut engine = AggregationEngine::new(catalog, &config.sensors, source);
    let outcome = engine.run(&roi_codes, first, last, &mut trace)?;
    trace.flush()?;

    let rois = roi_codes
        .iter()
        .map(|&code| {
            let roi = catalog.roi(code)?;
            Ok(RoiInfo {
                code,
                crop_code: roi.crop_code,
                area: roi.area,
            })
        })
        .collect::<NdviResult<Vec<RoiInfo>>>()?;

    for sensor in SensorKind::all() {
        let tag = config.sensors.tag(sensor);
        let path = config.summary_path(tag);
        let file = File::create(&path)
            .map_err(NdviError::Io)
            .context(|| format!("creating summary report {}", path.display()))?;
        let mut out = BufWriter::new(file);
        SummaryTable {
            sensor,
            sensor_tag: tag,
            first,
            last,
            roi_code_increment: config.roi_code_increment,
        }
        .render(&mut out, &rois, &outcome)?;
        out.flush()?;
        log::info!("Wrote summary report: {}", path.display());
    }
    Ok(())
}
