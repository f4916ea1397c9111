use crate::io::catalog::SpatialCatalog;
use crate::types::{ErrorContext, NdviError, NdviResult, RasterFileMeta, SensorConfig};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Ordered work key: tile tuplekey, ROI code, acquisition date.
///
/// Ascending iteration over this key is the pipeline's processing order.
pub type WorkKey = (String, i64, NaiveDate);

/// The resolved work list of a run.
///
/// A tile/date pair may carry several files (edge-of-swath duplicates), so
/// the work value is a filename list. Per-filename metadata is recorded the
/// first time a file is seen; later occurrences never overwrite it.
#[derive(Debug, Default)]
pub struct CandidateSet {
    work: BTreeMap<WorkKey, Vec<String>>,
    files: HashMap<String, RasterFileMeta>,
    tile_ids: HashMap<String, i64>,
    roi_tiles: HashMap<i64, BTreeSet<String>>,
    max_tiling_lod: u8,
}

/// All dated work of one (tile, ROI) pair, dates ascending.
#[derive(Debug)]
pub struct TileRoiWork<'a> {
    pub tile_key: &'a str,
    pub tile_id: i64,
    pub roi_code: i64,
    pub dates: Vec<(NaiveDate, &'a [String])>,
}

impl CandidateSet {
    pub fn is_empty(&self) -> bool {
        self.work.is_empty()
    }

    pub fn file(&self, filename: &str) -> Option<&RasterFileMeta> {
        self.files.get(filename)
    }

    /// Highest tiling level of detail across all returned files.
    pub fn max_tiling_lod(&self) -> u8 {
        self.max_tiling_lod
    }

    /// Tiles known to reference each ROI; drives run completion tracking.
    pub fn roi_tiles(&self) -> &HashMap<i64, BTreeSet<String>> {
        &self.roi_tiles
    }

    /// Work list folded into contiguous (tile, ROI) groups, in ascending
    /// (tile key, ROI code) order with dates ascending inside each group.
    pub fn tile_roi_groups(&self) -> Vec<TileRoiWork<'_>> {
        let mut groups: Vec<TileRoiWork<'_>> = Vec::new();
        for ((tile_key, roi_code, date), filenames) in &self.work {
            match groups.last_mut() {
                Some(group)
                    if group.tile_key == tile_key.as_str() && group.roi_code == *roi_code =>
                {
                    group.dates.push((*date, filenames.as_slice()));
                }
                _ => groups.push(TileRoiWork {
                    tile_key: tile_key.as_str(),
                    tile_id: self.tile_ids[tile_key.as_str()],
                    roi_code: *roi_code,
                    dates: vec![(*date, filenames.as_slice())],
                }),
            }
        }
        groups
    }
}

/// Resolves the per-ROI candidate work list for a date range.
pub struct CandidateResolver<'a, C: SpatialCatalog> {
    catalog: &'a C,
    sensors: &'a SensorConfig,
}

impl<'a, C: SpatialCatalog> CandidateResolver<'a, C> {
    pub fn new(catalog: &'a C, sensors: &'a SensorConfig) -> Self {
        Self { catalog, sensors }
    }

    /// Resolve candidates for every ROI code over the closed date interval.
    ///
    /// A ROI with zero candidate rows is a hard catalog error, not an
    /// empty-but-valid result.
    pub fn resolve(
        &self,
        roi_codes: &[i64],
        first: NaiveDate,
        last: NaiveDate,
    ) -> NdviResult<CandidateSet> {
        if first > last {
            return Err(NdviError::Domain(format!(
                "date interval start {} is after end {}",
                first, last
            )));
        }
        log::info!(
            "Resolving candidates for {} ROIs between {} and {}",
            roi_codes.len(),
            first,
            last
        );

        let mut set = CandidateSet::default();
        for &roi_code in roi_codes {
            let rows = self
                .catalog
                .candidates(roi_code, first, last)
                .context(|| format!("candidate query for ROI {}", roi_code))?;
            if rows.is_empty() {
                return Err(NdviError::Catalog(format!(
                    "ROI {} has no candidate rasters between {} and {}",
                    roi_code, first, last
                )));
            }

            for row in rows {
                if !set.files.contains_key(&row.filename) {
                    let sensor = self.sensors.resolve(&row.filename)?;
                    set.files.insert(
                        row.filename.clone(),
                        RasterFileMeta {
                            filename: row.filename.clone(),
                            sensor,
                            date: row.date,
                            gain: row.gain,
                            offset: row.offset,
                            gsd: row.gsd,
                            bounds: row.bounds,
                            tiling_lod: row.tiling_lod,
                            resolution_lod: row.resolution_lod,
                        },
                    );
                }
                set.max_tiling_lod = set.max_tiling_lod.max(row.tiling_lod);
                set.tile_ids.insert(row.tile_key.clone(), row.tile_id);
                set.roi_tiles
                    .entry(roi_code)
                    .or_default()
                    .insert(row.tile_key.clone());
                set.work
                    .entry((row.tile_key, roi_code, row.date))
                    .or_default()
                    .push(row.filename);
            }
        }

        log::debug!(
            "Resolved {} work entries over {} files (max tiling LOD {})",
            set.work.len(),
            set.files.len(),
            set.max_tiling_lod
        );
        Ok(set)
    }
}
