use crate::core::tiling::{QuadkeyScheme, TileAddressing};
use crate::types::{
    date_from_julian_day, julian_day, multipolygon_from_wkt, CandidateRow, NdviError, NdviResult,
    RasterFileMeta, RegionOfInterest, SensorConfig, TileRecord,
};
use chrono::NaiveDate;
use geo::{Area, BooleanOps, Contains, Intersects, MultiPolygon};
use std::collections::{BTreeMap, HashMap};
use wkt::ToWkt;

/// Spatial catalog store over persisted ROI geometries, tile geometries and
/// raster-file metadata.
///
/// The aggregation pipeline consumes this interface only; the in-memory
/// implementation below backs tests and embedding callers.
pub trait SpatialCatalog {
    /// All ROI codes known to the crop table, ascending.
    fn roi_codes(&self) -> NdviResult<Vec<i64>>;

    fn roi(&self, code: i64) -> NdviResult<&RegionOfInterest>;

    fn tile(&self, id: i64) -> NdviResult<&TileRecord>;

    /// Containment predicate: does the ROI geometry contain the full tile?
    fn contains(&self, roi_code: i64, tile_id: i64) -> NdviResult<bool>;

    /// Intersection geometry between ROI and tile as well-known text.
    fn intersection_wkt(&self, roi_code: i64, tile_id: i64) -> NdviResult<String>;

    /// Raster files whose tile intersects the ROI inside a closed date
    /// range, joined with their radiometric-conversion records.
    fn candidates(
        &self,
        roi_code: i64,
        first: NaiveDate,
        last: NaiveDate,
    ) -> NdviResult<Vec<CandidateRow>>;
}

struct StoredRasterFile {
    raster_id: i64,
    tile_id: i64,
    /// Acquisition date persisted as a julian day number.
    julian_date: i64,
    meta: RasterFileMeta,
}

/// In-memory spatial catalog computing its predicates with `geo`.
pub struct MemoryCatalog {
    scheme: QuadkeyScheme,
    roi_code_increment: i64,
    rois: BTreeMap<i64, RegionOfInterest>,
    tiles: BTreeMap<i64, TileRecord>,
    tile_ids: HashMap<String, i64>,
    files: Vec<StoredRasterFile>,
    next_tile_id: i64,
    next_raster_id: i64,
}

impl MemoryCatalog {
    pub fn new(scheme: QuadkeyScheme, roi_code_increment: i64) -> Self {
        Self {
            scheme,
            roi_code_increment,
            rois: BTreeMap::new(),
            tiles: BTreeMap::new(),
            tile_ids: HashMap::new(),
            files: Vec::new(),
            next_tile_id: 1,
            next_raster_id: 1,
        }
    }

    pub fn scheme(&self) -> &QuadkeyScheme {
        &self.scheme
    }

    /// Ingest a ROI from well-known text. The configured code increment is
    /// applied here, once; the stored code is returned.
    pub fn insert_roi_wkt(&mut self, code: i64, crop_code: i32, wkt: &str) -> NdviResult<i64> {
        let geometry = multipolygon_from_wkt(wkt)?;
        let stored_code = code + self.roi_code_increment;
        if self.rois.contains_key(&stored_code) {
            return Err(NdviError::Catalog(format!(
                "duplicate ROI code {}",
                stored_code
            )));
        }
        let area = geometry.unsigned_area();
        log::debug!(
            "Ingesting ROI {} (crop {}, area {:.1})",
            stored_code,
            crop_code,
            area
        );
        self.rois.insert(
            stored_code,
            RegionOfInterest {
                code: stored_code,
                crop_code,
                geometry,
                area,
            },
        );
        Ok(stored_code)
    }

    /// Register a raster file of the tiled archive under its tuplekey.
    ///
    /// The tile record is created on first reference, with its extent taken
    /// from the addressing scheme. The sensor kind is resolved from the
    /// filename here, when the file is first seen.
    #[allow(clippy::too_many_arguments)]
    pub fn register_raster(
        &mut self,
        sensors: &SensorConfig,
        filename: &str,
        tile_key: &str,
        date: NaiveDate,
        gain: f64,
        offset: f64,
        gsd: f64,
        resolution_lod: u8,
    ) -> NdviResult<i64> {
        if self.files.iter().any(|f| f.meta.filename == filename) {
            return Err(NdviError::Catalog(format!(
                "duplicate raster filename '{}'",
                filename
            )));
        }
        if gsd <= 0.0 {
            return Err(NdviError::Domain(format!(
                "raster '{}' has non-positive gsd {}",
                filename, gsd
            )));
        }
        let sensor = sensors.resolve(filename)?;
        let extent = self.scheme.tile_extent(tile_key)?;
        let tiling_lod = tile_key.len() as u8;

        let tile_id = match self.tile_ids.get(tile_key) {
            Some(&id) => id,
            None => {
                let id = self.next_tile_id;
                self.next_tile_id += 1;
                self.tile_ids.insert(tile_key.to_string(), id);
                self.tiles.insert(
                    id,
                    TileRecord {
                        id,
                        key: tile_key.to_string(),
                        lod: tiling_lod,
                        extent,
                    },
                );
                id
            }
        };

        let raster_id = self.next_raster_id;
        self.next_raster_id += 1;
        self.files.push(StoredRasterFile {
            raster_id,
            tile_id,
            julian_date: julian_day(date),
            meta: RasterFileMeta {
                filename: filename.to_string(),
                sensor,
                date,
                gain,
                offset,
                gsd,
                bounds: extent,
                tiling_lod,
                resolution_lod,
            },
        });
        Ok(raster_id)
    }

    fn roi_record(&self, code: i64) -> NdviResult<&RegionOfInterest> {
        self.rois
            .get(&code)
            .ok_or_else(|| NdviError::Catalog(format!("unknown ROI code {}", code)))
    }

    fn tile_record(&self, id: i64) -> NdviResult<&TileRecord> {
        self.tiles
            .get(&id)
            .ok_or_else(|| NdviError::Catalog(format!("unknown tile id {}", id)))
    }

    fn tile_multipolygon(tile: &TileRecord) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![tile.extent.to_polygon()])
    }
}

impl SpatialCatalog for MemoryCatalog {
    fn roi_codes(&self) -> NdviResult<Vec<i64>> {
        Ok(self.rois.keys().copied().collect())
    }

    fn roi(&self, code: i64) -> NdviResult<&RegionOfInterest> {
        self.roi_record(code)
    }

    fn tile(&self, id: i64) -> NdviResult<&TileRecord> {
        self.tile_record(id)
    }

    fn contains(&self, roi_code: i64, tile_id: i64) -> NdviResult<bool> {
        let roi = self.roi_record(roi_code)?;
        let tile = self.tile_record(tile_id)?;
        Ok(roi.geometry.contains(&tile.extent.to_polygon()))
    }

    fn intersection_wkt(&self, roi_code: i64, tile_id: i64) -> NdviResult<String> {
        let roi = self.roi_record(roi_code)?;
        let tile = self.tile_record(tile_id)?;
        let overlap = roi.geometry.intersection(&Self::tile_multipolygon(tile));
        Ok(overlap.wkt_string())
    }

    fn candidates(
        &self,
        roi_code: i64,
        first: NaiveDate,
        last: NaiveDate,
    ) -> NdviResult<Vec<CandidateRow>> {
        let roi = self.roi_record(roi_code)?;
        let first_jd = julian_day(first);
        let last_jd = julian_day(last);

        let mut rows = Vec::new();
        for file in &self.files {
            if file.julian_date < first_jd || file.julian_date > last_jd {
                continue;
            }
            let tile = self.tile_record(file.tile_id)?;
            if !roi.geometry.intersects(&tile.extent.to_polygon()) {
                continue;
            }
            rows.push(CandidateRow {
                filename: file.meta.filename.clone(),
                tile_key: tile.key.clone(),
                tile_id: tile.id,
                raster_id: file.raster_id,
                date: date_from_julian_day(file.julian_date)?,
                gain: file.meta.gain,
                offset: file.meta.offset,
                gsd: file.meta.gsd,
                bounds: file.meta.bounds,
                tiling_lod: file.meta.tiling_lod,
                resolution_lod: file.meta.resolution_lod,
            });
        }
        rows.sort_by(|a, b| {
            (&a.tile_key, a.date, &a.filename).cmp(&(&b.tile_key, b.date, &b.filename))
        });
        Ok(rows)
    }
}
