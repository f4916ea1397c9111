use crate::io::catalog::SpatialCatalog;
use crate::types::{multipolygon_from_wkt, ErrorContext, NdviResult};
use geo::MultiPolygon;

/// Geometric relationship between a ROI and a tile.
///
/// The overlap geometry is owned by the caller and dropped at the end of
/// the scope that classified it, on every exit path.
#[derive(Debug, Clone)]
pub enum TileRelation {
    /// The ROI fully contains the tile; every cell belongs to the ROI and
    /// no per-cell geometric test is needed (nodata is still excluded).
    Contains,
    /// Partial overlap; cells must be tested against this geometry.
    Overlap(MultiPolygon<f64>),
}

/// Classifies (ROI, tile) pairs through the spatial catalog's predicates.
pub struct GeometryClassifier<'a, C: SpatialCatalog> {
    catalog: &'a C,
}

impl<'a, C: SpatialCatalog> GeometryClassifier<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    pub fn classify(&self, roi_code: i64, tile_id: i64) -> NdviResult<TileRelation> {
        if self
            .catalog
            .contains(roi_code, tile_id)
            .context(|| format!("containment test of ROI {} over tile {}", roi_code, tile_id))?
        {
            log::debug!("ROI {} fully contains tile {}", roi_code, tile_id);
            return Ok(TileRelation::Contains);
        }

        let wkt = self
            .catalog
            .intersection_wkt(roi_code, tile_id)
            .context(|| format!("intersection of ROI {} with tile {}", roi_code, tile_id))?;
        let overlap = multipolygon_from_wkt(&wkt)
            .context(|| format!("overlap geometry of ROI {} and tile {}", roi_code, tile_id))?;
        Ok(TileRelation::Overlap(overlap))
    }
}
