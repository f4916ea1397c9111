//! I/O modules: catalog access, raster decoding, project configuration
//! and report generation

pub mod catalog;
pub mod project;
pub mod raster;
pub mod reports;

// Re-export main types
pub use catalog::{MemoryCatalog, SpatialCatalog};
pub use project::{ProjectConfig, ProjectDescriptor};
pub use raster::{MemoryRasterSource, RasterCache, RasterSource};
pub use reports::{RoiInfo, SummaryTable, TraceLog};

#[cfg(feature = "gdal")]
pub use raster::GdalRasterSource;
