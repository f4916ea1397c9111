use crate::types::{DecodedRaster, ErrorContext, NdviError, NdviResult, RasterFileMeta};
use ndarray::Array2;
use std::collections::HashMap;
use std::rc::Rc;

/// Fallback sentinel when a file declares no nodata value (int16 fill).
#[cfg(feature = "gdal")]
const DEFAULT_NODATA: f64 = -32_768.0;

/// Decoder turning a named raster file into its integer sample grid.
pub trait RasterSource {
    fn decode(&self, meta: &RasterFileMeta) -> NdviResult<DecodedRaster>;
}

/// GDAL-backed raster source reading files from an archive directory.
#[cfg(feature = "gdal")]
pub struct GdalRasterSource {
    data_dir: std::path::PathBuf,
}

#[cfg(feature = "gdal")]
impl GdalRasterSource {
    pub fn new<P: Into<std::path::PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

#[cfg(feature = "gdal")]
impl RasterSource for GdalRasterSource {
    fn decode(&self, meta: &RasterFileMeta) -> NdviResult<DecodedRaster> {
        let path = self.data_dir.join(&meta.filename);
        log::debug!("Decoding raster: {}", path.display());

        let dataset = gdal::Dataset::open(&path)?;
        let (width, height) = dataset.raster_size();
        if (height, width) != (meta.rows(), meta.cols()) {
            return Err(NdviError::Domain(format!(
                "raster '{}' is {}x{} but its metadata implies {}x{}",
                meta.filename,
                height,
                width,
                meta.rows(),
                meta.cols()
            )));
        }

        let band = dataset.rasterband(1)?;
        let nodata = band.no_data_value().unwrap_or(DEFAULT_NODATA);
        let buffer = band.read_as::<f64>((0, 0), (width, height), (width, height), None)?;

        let samples = Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| {
                NdviError::Domain(format!("raster '{}' reshape failed: {}", meta.filename, e))
            })?
            .mapv(|v| v.round() as i32);

        Ok(DecodedRaster { samples, nodata })
    }
}

/// In-memory raster source for tests and embedding callers.
#[derive(Debug, Default)]
pub struct MemoryRasterSource {
    rasters: HashMap<String, DecodedRaster>,
}

impl MemoryRasterSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, filename: &str, raster: DecodedRaster) {
        self.rasters.insert(filename.to_string(), raster);
    }

    /// Convenience constructor from a row-major sample vector.
    pub fn insert_grid(
        &mut self,
        filename: &str,
        rows: usize,
        cols: usize,
        values: Vec<i32>,
        nodata: f64,
    ) -> NdviResult<()> {
        let samples = Array2::from_shape_vec((rows, cols), values).map_err(|e| {
            NdviError::Domain(format!("grid for '{}' has wrong length: {}", filename, e))
        })?;
        self.insert(filename, DecodedRaster { samples, nodata });
        Ok(())
    }
}

impl RasterSource for MemoryRasterSource {
    fn decode(&self, meta: &RasterFileMeta) -> NdviResult<DecodedRaster> {
        self.rasters
            .get(&meta.filename)
            .cloned()
            .ok_or_else(|| {
                NdviError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("raster '{}' not present in memory source", meta.filename),
                ))
            })
    }
}

/// Process-lifetime memoization of decoded rasters, keyed by filename.
///
/// Populated lazily, never evicted within a run.
pub struct RasterCache {
    source: Box<dyn RasterSource>,
    decoded: HashMap<String, Rc<DecodedRaster>>,
}

impl RasterCache {
    pub fn new(source: Box<dyn RasterSource>) -> Self {
        Self {
            source,
            decoded: HashMap::new(),
        }
    }

    /// Decoded grid for a file; decodes at most once per run.
    pub fn fetch(&mut self, meta: &RasterFileMeta) -> NdviResult<Rc<DecodedRaster>> {
        if let Some(raster) = self.decoded.get(&meta.filename) {
            return Ok(Rc::clone(raster));
        }
        log::debug!("Raster cache miss: {}", meta.filename);
        let raster = Rc::new(
            self.source
                .decode(meta)
                .context(|| format!("decoding raster file '{}'", meta.filename))?,
        );
        self.decoded.insert(meta.filename.clone(), Rc::clone(&raster));
        Ok(raster)
    }

    pub fn len(&self) -> usize {
        self.decoded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, SensorKind};
    use chrono::NaiveDate;
    use std::cell::Cell;

    fn meta(filename: &str) -> RasterFileMeta {
        RasterFileMeta {
            filename: filename.to_string(),
            sensor: SensorKind::Primary,
            date: NaiveDate::from_ymd_opt(2017, 6, 15).unwrap(),
            gain: 1.0,
            offset: 0.0,
            gsd: 1.0,
            bounds: BoundingBox::new(0.0, 0.0, 2.0, 2.0),
            tiling_lod: 1,
            resolution_lod: 1,
        }
    }

    struct CountingSource {
        inner: MemoryRasterSource,
        decodes: Rc<Cell<usize>>,
    }

    impl RasterSource for CountingSource {
        fn decode(&self, meta: &RasterFileMeta) -> NdviResult<DecodedRaster> {
            self.decodes.set(self.decodes.get() + 1);
            self.inner.decode(meta)
        }
    }

    #[test]
    fn test_cache_decodes_once_per_filename() {
        let mut inner = MemoryRasterSource::new();
        inner
            .insert_grid("a.tif", 2, 2, vec![1, 2, 3, 4], -32768.0)
            .unwrap();
        let decodes = Rc::new(Cell::new(0));
        let source = CountingSource {
            inner,
            decodes: Rc::clone(&decodes),
        };
        let mut cache = RasterCache::new(Box::new(source));

        let first = cache.fetch(&meta("a.tif")).unwrap();
        let second = cache.fetch(&meta("a.tif")).unwrap();
        assert_eq!(first.samples, second.samples);
        assert_eq!(cache.len(), 1);
        // one decode despite two fetches
        assert_eq!(decodes.get(), 1);
    }

    #[test]
    fn test_missing_raster_is_io_error() {
        let mut cache = RasterCache::new(Box::new(MemoryRasterSource::new()));
        let result = cache.fetch(&meta("absent.tif"));
        let err = result.unwrap_err();
        assert!(err.chain_string().contains("absent.tif"));
    }

    #[test]
    fn test_nodata_tolerance() {
        let raster = DecodedRaster {
            samples: Array2::from_shape_vec((1, 3), vec![-32768, -32767, 0]).unwrap(),
            nodata: -32768.0,
        };
        assert!(raster.is_nodata(-32768));
        // one full raw unit away is no longer nodata
        assert!(!raster.is_nodata(-32767));
        assert!(!raster.is_nodata(0));
    }
}
