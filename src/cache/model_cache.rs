//! The model/explainer cache: lazily loads forecasting kernels keyed by task
//! id, resolves the as-of snapshot for a timestamp under a no-look-ahead-bias
//! guarantee, and bulk-manages the snapshot kernels a history walk needs.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::errors::RuntimeError;

use super::single_flight::SingleFlightCache;

/// A feature vector keyed by feature name, the shape every `Predictor`/
/// `Explainer` implementation consumes.
pub type FeatureRow = HashMap<String, f64>;

/// A trained model kernel. Implementations are expected to be CPU-bound and
/// are always invoked from a `spawn_blocking` context by the forecasting
/// coordinator, never directly on the async runtime.
pub trait Predictor: Send + Sync {
    fn predict(&self, features: &FeatureRow) -> Vec<f64>;
}

/// A SHAP-style (or equivalent) explainer paired with a `Predictor`.
pub trait Explainer: Send + Sync {
    fn explain(&self, features: &FeatureRow) -> Vec<crate::model::report::ShapExplanation>;
}

/// Which snapshot to use when several are valid as of a timestamp: the
/// earliest one still valid, or the most recently available one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPolicy {
    First,
    Last,
}

/// One trained-model vintage, usable once `available_from_ts` has passed.
#[derive(Clone)]
pub struct Snapshot {
    pub snapshot_id: String,
    pub available_from_ts: i64,
}

/// A resolved forecasting task: the kernel used for "as of now" scoring plus
/// the ordered history of snapshots a backtest-style walk can replay through.
pub struct ForecastingModelHandle {
    pub task_id: String,
    pub framework: String,
    pub variation: String,
    pub main_kernel: Arc<dyn Predictor>,
    /// Sorted ascending by `available_from_ts`.
    pub snapshots: Vec<Snapshot>,
    pub feature_list: Vec<String>,
}

impl ForecastingModelHandle {
    #[must_use]
    pub fn new(
        task_id: String,
        framework: String,
        variation: String,
        main_kernel: Arc<dyn Predictor>,
        mut snapshots: Vec<Snapshot>,
        feature_list: Vec<String>,
    ) -> Self {
        snapshots.sort_by_key(|s| s.available_from_ts);
        Self {
            task_id,
            framework,
            variation,
            main_kernel,
            snapshots,
            feature_list,
        }
    }

    /// The snapshot valid as of `as_of_ts` under `policy`. `NoSnapshot` if
    /// every snapshot postdates `as_of_ts` -- a caller can never be handed a
    /// model trained on data from its own future.
    pub fn snapshot_for(&self, as_of_ts: i64, policy: SnapshotPolicy) -> Result<&Snapshot, RuntimeError> {
        let eligible = self.snapshots.iter().filter(|s| s.available_from_ts <= as_of_ts);
        match policy {
            SnapshotPolicy::First => eligible.min_by_key(|s| s.available_from_ts),
            SnapshotPolicy::Last => eligible.max_by_key(|s| s.available_from_ts),
        }
        .ok_or(RuntimeError::NoSnapshot)
    }
}

/// Process-wide cache of resolved model handles, their explainers, and the
/// per-snapshot kernels a bulk history walk has paged in.
#[derive(Default)]
pub struct ModelExplainerCache {
    models: SingleFlightCache<String, Arc<ForecastingModelHandle>>,
    explainers: SingleFlightCache<String, Arc<dyn Explainer>>,
    snapshot_kernels: DashMap<(String, String), Arc<dyn Predictor>>,
}

impl ModelExplainerCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_load_model<F, Fut>(
        &self,
        task_id: &str,
        loader: F,
    ) -> Result<Arc<ForecastingModelHandle>, RuntimeError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Arc<ForecastingModelHandle>, anyhow::Error>>
            + Send
            + 'static,
    {
        self.models
            .get_or_load(task_id.to_string(), loader)
            .await
            .map_err(|e| RuntimeError::Internal(anyhow::anyhow!(e)))
    }

    pub async fn get_or_load_explainer<F, Fut>(
        &self,
        task_id: &str,
        loader: F,
    ) -> Result<Arc<dyn Explainer>, RuntimeError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Arc<dyn Explainer>, anyhow::Error>> + Send + 'static,
    {
        self.explainers
            .get_or_load(task_id.to_string(), loader)
            .await
            .map_err(|e| RuntimeError::Internal(anyhow::anyhow!(e)))
    }

    #[must_use]
    pub fn snapshot_for<'a>(
        &self,
        handle: &'a ForecastingModelHandle,
        as_of_ts: i64,
        policy: SnapshotPolicy,
    ) -> Result<&'a Snapshot, RuntimeError> {
        handle.snapshot_for(as_of_ts, policy)
    }

    /// Populate `snapshot_kernels` for every snapshot in `handle` that isn't
    /// already resolved, using `loader(snapshot_id)` for each miss. Kernels
    /// already present are left untouched.
    pub async fn bulk_load_snapshots<F, Fut>(
        &self,
        handle: &ForecastingModelHandle,
        loader: F,
    ) -> Result<(), RuntimeError>
    where
        F: Fn(&str) -> Fut,
        Fut: std::future::Future<Output = Result<Arc<dyn Predictor>, anyhow::Error>>,
    {
        for snapshot in &handle.snapshots {
            let key = (handle.task_id.clone(), snapshot.snapshot_id.clone());
            if self.snapshot_kernels.contains_key(&key) {
                continue;
            }
            let kernel = loader(&snapshot.snapshot_id)
                .await
                .map_err(RuntimeError::Internal)?;
            self.snapshot_kernels.insert(key, kernel);
        }
        Ok(())
    }

    /// Drop every snapshot kernel belonging to `handle`, freeing the memory a
    /// bulk history walk pinned.
    pub fn unload_snapshots(&self, handle: &ForecastingModelHandle) {
        self.snapshot_kernels
            .retain(|(task_id, _), _| task_id != &handle.task_id);
    }

    #[must_use]
    pub fn snapshot_kernel(&self, task_id: &str, snapshot_id: &str) -> Option<Arc<dyn Predictor>> {
        self.snapshot_kernels
            .get(&(task_id.to_string(), snapshot_id.to_string()))
            .map(|entry| entry.value().clone())
    }
}

pub type SharedModelExplainerCache = Arc<ModelExplainerCache>;
