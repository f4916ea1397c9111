//! Core NDVI aggregation modules

pub mod aggregate;
pub mod classify;
pub mod resolver;
pub mod sampler;
pub mod tiling;

// Re-export main types
pub use aggregate::{
    finalize_samples, AggregationEngine, AggregationOutcome, AggregationState, BucketKey,
};
pub use classify::{GeometryClassifier, TileRelation};
pub use resolver::{CandidateResolver, CandidateSet, TileRoiWork, WorkKey};
pub use sampler::PixelSampler;
pub use tiling::{QuadkeyScheme, TileAddressing};
