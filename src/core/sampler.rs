use crate::types::{NdviError, NdviResult};
use geo::{coord, Contains, EuclideanDistance, Intersects, MultiPolygon, Point, Rect};

/// Per-cell inclusion test along a ROI/tile overlap boundary.
///
/// Built once per raster file from its north-west origin and ground sample
/// distance, then queried per candidate cell.
#[derive(Debug, Clone)]
pub struct PixelSampler {
    origin_x: f64,
    origin_y: f64,
    gsd: f64,
    /// Half-diagonal of a cell; centers farther than this from the overlap
    /// boundary cannot belong to a cell touching it.
    reject_distance: f64,
}

impl PixelSampler {
    pub fn new(origin: (f64, f64), gsd: f64) -> NdviResult<Self> {
        if !gsd.is_finite() || gsd <= 0.0 {
            return Err(NdviError::Geometry(format!(
                "cannot sample raster with gsd {}",
                gsd
            )));
        }
        if !origin.0.is_finite() || !origin.1.is_finite() {
            return Err(NdviError::Geometry(format!(
                "cannot sample raster with origin ({}, {})",
                origin.0, origin.1
            )));
        }
        Ok(Self {
            origin_x: origin.0,
            origin_y: origin.1,
            gsd,
            reject_distance: 0.5 * gsd * std::f64::consts::SQRT_2,
        })
    }

    /// Center of the cell at (col, row), rows counted south from the origin.
    pub fn cell_center(&self, col: usize, row: usize) -> Point<f64> {
        Point::new(
            self.origin_x + col as f64 * self.gsd + 0.5 * self.gsd,
            self.origin_y - row as f64 * self.gsd - 0.5 * self.gsd,
        )
    }

    /// Full square footprint of the cell at (col, row).
    fn cell_polygon(&self, col: usize, row: usize) -> geo::Polygon<f64> {
        let min_x = self.origin_x + col as f64 * self.gsd;
        let max_y = self.origin_y - row as f64 * self.gsd;
        Rect::new(
            coord! { x: min_x, y: max_y - self.gsd },
            coord! { x: min_x + self.gsd, y: max_y },
        )
        .to_polygon()
    }

    /// Does the cell at (col, row) belong to the overlap geometry?
    ///
    /// A cell whose center lies inside the geometry is included outright.
    /// Otherwise the center-to-geometry distance is a cheap reject: only
    /// when it is within the cell half-diagonal is the square cell built
    /// and the polygon-polygon intersection consulted.
    pub fn covers(&self, overlap: &MultiPolygon<f64>, col: usize, row: usize) -> bool {
        let center = self.cell_center(col, row);
        if overlap.contains(&center) {
            return true;
        }
        let distance = center.euclidean_distance(overlap);
        if distance > self.reject_distance {
            return false;
        }
        overlap.intersects(&self.cell_polygon(col, row))
    }
}
