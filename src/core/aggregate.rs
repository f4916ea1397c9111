use crate::core::classify::{GeometryClassifier, TileRelation};
use crate::core::resolver::CandidateResolver;
use crate::core::sampler::PixelSampler;
use crate::io::catalog::SpatialCatalog;
use crate::io::raster::{RasterCache, RasterSource};
use crate::io::reports::TraceLog;
use crate::types::{
    quantize_ndvi, scaled_to_ndvi, BoundingBox, DecodedRaster, ErrorContext, NdviError,
    NdviResult, RasterFileMeta, SampleStats, SensorConfig, SensorKind, NDVI_SCALE,
};
use chrono::NaiveDate;
use geo::{BoundingRect, MultiPolygon};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;

/// Key of one aggregation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub roi_code: i64,
    pub sensor: SensorKind,
    pub date: NaiveDate,
}

/// Finalize a bucket's scaled samples into physical-unit statistics.
///
/// Mean is always count-normalized. The standard deviation uses the n-1
/// denominator and is defined as 0 for a single-sample bucket; both
/// finalization triggers go through this one routine.
pub fn finalize_samples(samples: &[i32]) -> SampleStats {
    debug_assert!(!samples.is_empty(), "bucket finalized without samples");
    let count = samples.len();
    let sum: i64 = samples.iter().map(|&s| i64::from(s)).sum();
    let mean_scaled = sum as f64 / count as f64;
    let std_scaled = if count > 1 {
        let squared: f64 = samples
            .iter()
            .map(|&s| {
                let deviation = mean_scaled - f64::from(s);
                deviation * deviation
            })
            .sum();
        (squared / (count - 1) as f64).sqrt()
    } else {
        0.0
    };
    SampleStats {
        count,
        mean: mean_scaled / NDVI_SCALE,
        std_dev: std_scaled / NDVI_SCALE,
    }
}

/// Working state of one aggregation run: open sample buckets, finalized
/// statistics and per-ROI completion tracking.
///
/// Owned by the engine and passed explicitly through the tile iteration.
#[derive(Debug, Default)]
pub struct AggregationState {
    open: BTreeMap<BucketKey, Vec<i32>>,
    finalized: BTreeMap<BucketKey, SampleStats>,
    /// Tiles each ROI is known to reference, fixed at resolution time.
    known: HashMap<i64, BTreeSet<String>>,
    processed: HashMap<i64, BTreeSet<String>>,
    retired: BTreeSet<i64>,
}

impl AggregationState {
    pub fn new(known: HashMap<i64, BTreeSet<String>>) -> Self {
        Self {
            known,
            ..Self::default()
        }
    }

    /// Append a scaled sample to the bucket for (ROI, sensor, date).
    pub fn push(&mut self, key: BucketKey, sample: i32) {
        debug_assert!(
            !self.retired.contains(&key.roi_code),
            "sample pushed into retired ROI {}",
            key.roi_code
        );
        self.open.entry(key).or_default().push(sample);
    }

    /// Record that a tile finished scanning for a ROI; true once every
    /// known tile of that ROI has been processed.
    pub fn mark_processed(&mut self, roi_code: i64, tile_key: &str) -> bool {
        let done = self.processed.entry(roi_code).or_default();
        done.insert(tile_key.to_string());
        match self.known.get(&roi_code) {
            Some(known) => done.len() >= known.len(),
            None => false,
        }
    }

    /// Finalize every outstanding bucket of a ROI, drop its raw sample
    /// lists, and retire the ROI. A retired ROI is never written again.
    pub fn finalize_roi(&mut self, roi_code: i64) {
        let keys: Vec<BucketKey> = self
            .open
            .keys()
            .filter(|key| key.roi_code == roi_code)
            .copied()
            .collect();
        for key in keys {
            if let Some(samples) = self.open.remove(&key) {
                let stats = finalize_samples(&samples);
                log::debug!(
                    "Finalized ROI {} {} {}: n={} mean={:.4} sd={:.4}",
                    key.roi_code,
                    key.sensor,
                    key.date,
                    stats.count,
                    stats.mean,
                    stats.std_dev
                );
                self.finalized.insert(key, stats);
            }
        }
        self.retired.insert(roi_code);
    }

    pub fn is_retired(&self, roi_code: i64) -> bool {
        self.retired.contains(&roi_code)
    }

    pub fn open_buckets(&self) -> usize {
        self.open.len()
    }

    /// Consume the state into its finalized statistics.
    pub fn into_outcome(self) -> AggregationOutcome {
        AggregationOutcome {
            finalized: self.finalized,
        }
    }
}

/// Finalized statistics of a whole run, ordered by (ROI, sensor, date).
#[derive(Debug, Default)]
pub struct AggregationOutcome {
    finalized: BTreeMap<BucketKey, SampleStats>,
}

impl AggregationOutcome {
    pub fn stats(&self, roi_code: i64, sensor: SensorKind, date: NaiveDate) -> Option<&SampleStats> {
        self.finalized.get(&BucketKey {
            roi_code,
            sensor,
            date,
        })
    }

    /// ROI codes holding at least one finalized value for a sensor,
    /// ascending.
    pub fn sensor_rois(&self, sensor: SensorKind) -> Vec<i64> {
        let codes: BTreeSet<i64> = self
            .finalized
            .keys()
            .filter(|key| key.sensor == sensor)
            .map(|key| key.roi_code)
            .collect();
        codes.into_iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BucketKey, &SampleStats)> {
        self.finalized.iter()
    }

    pub fn len(&self) -> usize {
        self.finalized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.finalized.is_empty()
    }
}

/// Resolved scan mode of one (tile, ROI) group.
enum Scan {
    /// The ROI fully contains the tile; all non-nodata cells qualify.
    Full,
    /// Partial overlap; candidate cells are limited to the ROI envelope
    /// and decided by the sampler.
    Partial {
        overlap: MultiPolygon<f64>,
        roi_envelope: BoundingBox,
    },
}

/// Drives the full pipeline: candidate resolution, per-(tile, ROI)
/// classification, cell sampling, bucket accumulation and finalization.
pub struct AggregationEngine<'a, C: SpatialCatalog> {
    catalog: &'a C,
    sensors: &'a SensorConfig,
    cache: RasterCache,
}

impl<'a, C: SpatialCatalog> AggregationEngine<'a, C> {
    pub fn new(catalog: &'a C, sensors: &'a SensorConfig, source: Box<dyn RasterSource>) -> Self {
        Self {
            catalog,
            sensors,
            cache: RasterCache::new(source),
        }
    }

    /// Run the aggregation over a ROI set and a closed date interval,
    /// writing the execution trace as it proceeds.
    pub fn run<W: Write>(
        &mut self,
        roi_codes: &[i64],
        first: NaiveDate,
        last: NaiveDate,
        trace: &mut TraceLog<W>,
    ) -> NdviResult<AggregationOutcome> {
        let resolver = CandidateResolver::new(self.catalog, self.sensors);
        let candidates = resolver.resolve(roi_codes, first, last)?;
        let classifier = GeometryClassifier::new(self.catalog);
        let mut state = AggregationState::new(candidates.roi_tiles().clone());

        log::info!(
            "Aggregating {} ROIs, {} to {}",
            roi_codes.len(),
            first,
            last
        );

        let mut current_tile: Option<String> = None;
        for group in candidates.tile_roi_groups() {
            if current_tile.as_deref() != Some(group.tile_key) {
                trace.tile(group.tile_key)?;
                current_tile = Some(group.tile_key.to_string());
            }
            let known_tiles = candidates
                .roi_tiles()
                .get(&group.roi_code)
                .map(BTreeSet::len)
                .unwrap_or(0);
            trace.roi(group.roi_code, known_tiles)?;

            // the overlap geometry, if any, lives exactly as long as this
            // group's scan
            let scan = match classifier.classify(group.roi_code, group.tile_id)? {
                TileRelation::Contains => Scan::Full,
                TileRelation::Overlap(overlap) => {
                    let roi = self.catalog.roi(group.roi_code)?;
                    let rect = roi.geometry.bounding_rect().ok_or_else(|| {
                        NdviError::Geometry(format!("ROI {} has an empty geometry", group.roi_code))
                    })?;
                    Scan::Partial {
                        overlap,
                        roi_envelope: BoundingBox::from_rect(&rect),
                    }
                }
            };

            for (date, filenames) in &group.dates {
                trace.date(*date)?;
                for filename in filenames.iter() {
                    trace.file(filename)?;
                    let meta = candidates.file(filename).ok_or_else(|| {
                        NdviError::Domain(format!("no metadata for file '{}'", filename))
                    })?;
                    let raster = self.cache.fetch(meta)?;
                    let key = BucketKey {
                        roi_code: group.roi_code,
                        sensor: meta.sensor,
                        date: *date,
                    };
                    match &scan {
                        Scan::Full => {
                            scan_contained(&raster, meta, key, &mut state);
                        }
                        Scan::Partial {
                            overlap,
                            roi_envelope,
                        } => scan_overlap(&raster, meta, overlap, roi_envelope, key, &mut state)
                            .context(|| {
                                format!(
                                    "sampling file '{}' for ROI {} on tile {}",
                                    filename, group.roi_code, group.tile_key
                                )
                            })?,
                    }
                }
            }

            if state.mark_processed(group.roi_code, group.tile_key) {
                state.finalize_roi(group.roi_code);
            }
        }

        let outcome = state.into_outcome();
        log::info!("Aggregation finished with {} finalized buckets", outcome.len());
        Ok(outcome)
    }
}

/// Full-containment scan: every non-nodata cell of the raster belongs to
/// the ROI.
fn scan_contained(
    raster: &DecodedRaster,
    meta: &RasterFileMeta,
    key: BucketKey,
    state: &mut AggregationState,
) {
    for row in 0..raster.rows() {
        for col in 0..raster.cols() {
            let raw = raster.samples[[row, col]];
            if raster.is_nodata(raw) {
                continue;
            }
            state.push(key, quantize_ndvi(scaled_to_ndvi(raw, meta.gain, meta.offset)));
        }
    }
}

/// Partial-overlap scan restricted to the ROI envelope intersected with
/// the raster extent; each candidate cell is decided by the sampler.
fn scan_overlap(
    raster: &DecodedRaster,
    meta: &RasterFileMeta,
    overlap: &MultiPolygon<f64>,
    roi_envelope: &BoundingBox,
    key: BucketKey,
    state: &mut AggregationState,
) -> NdviResult<()> {
    let window = match roi_envelope.intersection(&meta.bounds) {
        Some(window) => window,
        None => return Ok(()),
    };
    let sampler = PixelSampler::new(meta.origin(), meta.gsd)?;
    let (origin_x, origin_y) = meta.origin();

    let cols = raster.cols() as i64;
    let rows = raster.rows() as i64;
    let col_start = (((window.min_x - origin_x) / meta.gsd).floor() as i64).max(0);
    let col_end = (((window.max_x - origin_x) / meta.gsd).ceil() as i64).min(cols);
    let row_start = (((origin_y - window.max_y) / meta.gsd).floor() as i64).max(0);
    let row_end = (((origin_y - window.min_y) / meta.gsd).ceil() as i64).min(rows);

    for row in row_start..row_end {
        for col in col_start..col_end {
            let raw = raster.samples[[row as usize, col as usize]];
            if raster.is_nodata(raw) {
                continue;
            }
            if sampler.covers(overlap, col as usize, row as usize) {
                state.push(key, quantize_ndvi(scaled_to_ndvi(raw, meta.gain, meta.offset)));
            }
        }
    }
    Ok(())
}
