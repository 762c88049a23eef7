//! Process-wide caches: a generic single-flight loader and the model/explainer
//! cache built on top of it.

pub mod model_cache;
pub mod single_flight;

pub use model_cache::{
    Explainer, FeatureRow, ForecastingModelHandle, ModelExplainerCache, Predictor, SharedModelExplainerCache,
    Snapshot, SnapshotPolicy,
};
pub use single_flight::SingleFlightCache;
