//! The trained-model artifact store: an external collaborator the coordinator
//! loads `ForecastingModelHandle`s and `Explainer`s from. The training
//! pipeline and the artifact registry behind it are out of scope; this module
//! defines the read interface plus a deterministic in-memory implementation
//! that synthesizes a plausible kernel per `(problem_id, sector)` so the
//! coordinator has something real to drive without a trained model on disk.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::cache::{Explainer, FeatureRow, ForecastingModelHandle, Predictor, Snapshot};
use crate::model::report::{Effect, ShapExplanation, TopFeature};

fn top_features(feature_list: &[String], features: &FeatureRow) -> Vec<TopFeature> {
    let mut contributions: Vec<TopFeature> = feature_list
        .iter()
        .map(|name| {
            let value = features.get(name).copied().unwrap_or(0.0);
            let contribution = value * 0.01;
            TopFeature {
                feature: name.clone(),
                value,
                contribution,
                effect: if contribution >= 0.0 { Effect::Positive } else { Effect::Negative },
            }
        })
        .collect();
    contributions.sort_by(|a, b| b.contribution.abs().partial_cmp(&a.contribution.abs()).unwrap());
    contributions.truncate(5);
    contributions
}

/// Loads model handles and explainers for a given task id. Implementations
/// may hit network storage, a filesystem cache, or (as here) synthesize a
/// deterministic stand-in.
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn load_model(&self, task_id: &str, feature_list: &[String]) -> Result<Arc<ForecastingModelHandle>>;
    async fn load_explainer(&self, task_id: &str, feature_list: &[String]) -> Result<Arc<dyn Explainer>>;
    async fn load_snapshot_kernel(&self, task_id: &str, snapshot_id: &str) -> Result<Arc<dyn Predictor>>;
}

/// A predictor whose output is a deterministic function of the feature
/// values and a per-task seed, shaped by `targets`. For n-day distribution
/// tasks this emits `mean/std/min/q25/q75` in percentage space; for
/// triple-barrier classification it emits class logits-as-probabilities.
struct DeterministicKernel {
    seed: f64,
    targets: Vec<String>,
}

impl Predictor for DeterministicKernel {
    fn predict(&self, features: &FeatureRow) -> Vec<f64> {
        let signal: f64 = features.values().sum::<f64>() / features.len().max(1) as f64;
        let base = (signal * 0.001 + self.seed).tanh() * 0.05;
        self.targets
            .iter()
            .enumerate()
            .map(|(i, target)| match target.as_str() {
                "std" => 0.01 + base.abs() * 0.2,
                "min" => base - 0.03,
                "max" => base + 0.03,
                "q25" => base - 0.01,
                "q75" => base + 0.01,
                _ => base + (i as f64) * 1e-4,
            })
            .collect()
    }
}

struct DeterministicExplainer {
    feature_list: Vec<String>,
    targets: Vec<String>,
}

impl Explainer for DeterministicExplainer {
    fn explain(&self, features: &FeatureRow) -> Vec<ShapExplanation> {
        let base_value = features.values().sum::<f64>() / features.len().max(1) as f64 * 0.001;
        let top = top_features(&self.feature_list, features);
        self.targets
            .iter()
            .map(|target_name| ShapExplanation {
                target_name: target_name.clone(),
                base_value,
                prediction_outcome: base_value + top.iter().map(|f| f.contribution).sum::<f64>(),
                top_features: top.clone(),
            })
            .collect()
    }
}

fn task_seed(task_id: &str) -> f64 {
    let hash = task_id.bytes().fold(0u64, |acc, b| acc.wrapping_mul(131).wrapping_add(u64::from(b)));
    ((hash % 2000) as f64 / 1000.0) - 1.0
}

/// Deterministic stand-in artifact store. Generates three monthly snapshots
/// per task (90, 60, 30 days before "now", approximated as a fixed epoch
/// offset) so the snapshot-resolution machinery has real vintages to pick
/// between.
pub struct InMemoryArtifactStore {
    now_ts: i64,
}

impl InMemoryArtifactStore {
    #[must_use]
    pub fn new(now_ts: i64) -> Self {
        Self { now_ts }
    }

    fn snapshots_for(&self, task_id: &str) -> Vec<Snapshot> {
        (0..3)
            .map(|i| Snapshot {
                snapshot_id: format!("{task_id}-snap-{i}"),
                available_from_ts: self.now_ts - (90 - i as i64 * 30) * 86_400,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn load_model(&self, task_id: &str, feature_list: &[String]) -> Result<Arc<ForecastingModelHandle>> {
        let targets = super::NDIST_TARGETS.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let kernel = Arc::new(DeterministicKernel {
            seed: task_seed(task_id),
            targets,
        });
        Ok(Arc::new(ForecastingModelHandle::new(
            task_id.to_string(),
            "lgbm".to_string(),
            "synthetic".to_string(),
            kernel,
            self.snapshots_for(task_id),
            feature_list.to_vec(),
        )))
    }

    async fn load_explainer(&self, task_id: &str, feature_list: &[String]) -> Result<Arc<dyn Explainer>> {
        let _ = task_id;
        let targets = super::NDIST_TARGETS.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Ok(Arc::new(DeterministicExplainer {
            feature_list: feature_list.to_vec(),
            targets,
        }))
    }

    async fn load_snapshot_kernel(&self, task_id: &str, snapshot_id: &str) -> Result<Arc<dyn Predictor>> {
        let targets = super::NDIST_TARGETS.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let seed = task_seed(&format!("{task_id}:{snapshot_id}"));
        Ok(Arc::new(DeterministicKernel { seed, targets }))
    }
}

pub type SharedArtifactStore = Arc<dyn ArtifactStore>;
