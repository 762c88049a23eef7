//! The Forecasting Coordinator: resolves a ticker's feature row against every
//! registered task template, predicts + explains each one, and post-processes
//! the raw output into the units a caller can act on.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{Explainer, FeatureRow, ForecastingModelHandle, Predictor, SharedModelExplainerCache, SnapshotPolicy};
use crate::errors::RuntimeError;
use crate::model::report::{ForecastUnits, SingleTaskForecastReport, TaskMetadata};

use super::artifact_store::SharedArtifactStore;
use super::post_processing::{DenormalizationProcessor, NDayDistributionProcessor, PostProcessor, RoundingProcessor};
use super::NDIST_TARGETS;

/// One forecasting problem the coordinator knows how to run: a stable
/// `problem_id` (combined with sector to form the cache/artifact `task_id`),
/// the metadata shape attached to its report, and whether its raw output
/// needs n-day-distribution clamping before de-normalization.
#[derive(Debug, Clone)]
pub struct TaskTemplate {
    pub problem_id: String,
    pub metadata: TaskMetadata,
    pub is_distribution: bool,
}

impl TaskTemplate {
    #[must_use]
    pub fn task_id(&self, sector: &str) -> String {
        format!("{}-{}", self.problem_id, sector)
    }
}

/// The default catalog: a triple-barrier classifier plus 5-day and 20-day
/// distribution regressors, each trained per-sector.
#[must_use]
pub fn default_task_templates() -> Vec<TaskTemplate> {
    vec![
        TaskTemplate {
            problem_id: "triple-barrier-5d".to_string(),
            metadata: TaskMetadata::TripleBarrier {
                horizon: 5,
                tp_pct: 0.05,
                sl_pct: 0.03,
            },
            is_distribution: false,
        },
        TaskTemplate {
            problem_id: "ndist-5d".to_string(),
            metadata: TaskMetadata::NDayDistribution { horizon: 5 },
            is_distribution: true,
        },
        TaskTemplate {
            problem_id: "ndist-20d".to_string(),
            metadata: TaskMetadata::NDayDistribution { horizon: 20 },
            is_distribution: true,
        },
    ]
}

pub struct ForecastingCoordinator {
    cache: SharedModelExplainerCache,
    artifacts: SharedArtifactStore,
    templates: Vec<TaskTemplate>,
    feature_list: Vec<String>,
    rounding_decimals: i32,
}

impl ForecastingCoordinator {
    #[must_use]
    pub fn new(
        cache: SharedModelExplainerCache,
        artifacts: SharedArtifactStore,
        templates: Vec<TaskTemplate>,
        feature_list: Vec<String>,
    ) -> Self {
        Self {
            cache,
            artifacts,
            templates,
            feature_list,
            rounding_decimals: 4,
        }
    }

    fn pipeline_for(&self, template: &TaskTemplate, base_price: f64) -> Vec<Box<dyn PostProcessor>> {
        let mut pipeline: Vec<Box<dyn PostProcessor>> = Vec::new();
        if template.is_distribution {
            pipeline.push(Box::new(NDayDistributionProcessor));
            pipeline.push(Box::new(DenormalizationProcessor {
                base_price,
                scale_only_targets: vec!["std".to_string()],
            }));
        }
        pipeline.push(Box::new(RoundingProcessor { decimals: self.rounding_decimals }));
        pipeline
    }

    fn targets_for(&self, template: &TaskTemplate) -> Vec<String> {
        if template.is_distribution {
            NDIST_TARGETS.iter().map(|s| s.to_string()).collect()
        } else {
            vec!["probability".to_string()]
        }
    }

    /// Runs `predict` and `explain` concurrently against the same feature row
    /// on blocking threads, then applies this template's post-processing
    /// pipeline to the raw prediction.
    async fn score(
        &self,
        template: &TaskTemplate,
        task_id: String,
        kernel: Arc<dyn Predictor>,
        explainer: Arc<dyn Explainer>,
        features: &FeatureRow,
        base_price: f64,
    ) -> Result<SingleTaskForecastReport, RuntimeError> {
        let features_for_predict = features.clone();
        let features_for_explain = features.clone();
        let (raw, evidence) = tokio::join!(
            tokio::task::spawn_blocking(move || kernel.predict(&features_for_predict)),
            tokio::task::spawn_blocking(move || explainer.explain(&features_for_explain)),
        );
        let raw = raw.map_err(|e| RuntimeError::Internal(anyhow::anyhow!(e)))?;
        let evidence = evidence.map_err(|e| RuntimeError::Internal(anyhow::anyhow!(e)))?;

        let targets = self.targets_for(template);
        let mut row: HashMap<String, f64> = targets.iter().cloned().zip(raw.iter().copied()).collect();
        let pipeline = self.pipeline_for(template, base_price);
        super::post_processing::run_pipeline(&mut row, &pipeline);

        let prediction: Vec<f64> = targets.iter().map(|t| row.get(t).copied().unwrap_or(0.0)).collect();
        let units = if template.is_distribution {
            ForecastUnits::Percent
        } else {
            ForecastUnits::Category
        };

        Ok(SingleTaskForecastReport {
            task_id,
            task_metadata: template.metadata.clone(),
            prediction,
            units,
            evidence,
        })
    }

    async fn model_handle(&self, task_id: &str) -> Result<Arc<ForecastingModelHandle>, RuntimeError> {
        let task_id_owned = task_id.to_string();
        let artifacts = self.artifacts.clone();
        let feature_list = self.feature_list.clone();
        self.cache
            .get_or_load_model(task_id, move || async move {
                artifacts.load_model(&task_id_owned, &feature_list).await
            })
            .await
    }

    async fn run_one(
        &self,
        template: &TaskTemplate,
        sector: &str,
        features: &FeatureRow,
        base_price: f64,
        as_of_ts: i64,
    ) -> Result<SingleTaskForecastReport, RuntimeError> {
        let task_id = template.task_id(sector);
        let feature_list = self.feature_list.clone();
        let handle = self.model_handle(&task_id).await?;
        let snapshot = handle.snapshot_for(as_of_ts, SnapshotPolicy::Last)?;
        let kernel = self
            .cache
            .snapshot_kernel(&task_id, &snapshot.snapshot_id)
            .unwrap_or_else(|| handle.main_kernel.clone());

        let explainer = {
            let task_id = task_id.clone();
            let artifacts = self.artifacts.clone();
            let feature_list = feature_list.clone();
            self.cache
                .get_or_load_explainer(&task_id, move || async move {
                    artifacts.load_explainer(&task_id, &feature_list).await
                })
                .await?
        };

        self.score(template, task_id, kernel, explainer, features, base_price).await
    }

    /// Run every task template for `ticker`/`sector`, scored as of `as_of_ts`
    /// against `base_price`. Fails with `MissingReport("Forecasting")` on the
    /// first task that errors -- the coordinator runs all-or-nothing.
    pub async fn generate_report(
        &self,
        sector: &str,
        features: &FeatureRow,
        base_price: f64,
        as_of_ts: i64,
    ) -> Result<Vec<SingleTaskForecastReport>, RuntimeError> {
        let mut futures = Vec::with_capacity(self.templates.len());
        for template in &self.templates {
            futures.push(self.run_one(template, sector, features, base_price, as_of_ts));
        }
        let results = futures::future::join_all(futures).await;
        results
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| RuntimeError::MissingReport("Forecasting".to_string()))
    }

    /// Run every template over every `(timestamp, features, base_price)` row
    /// in `rows`. For each template, rows are grouped by the `snapshot_id`
    /// `snapshot_for(..., last)` resolves for their timestamp, so the
    /// explainer bound to that snapshot's kernel is constructed once per
    /// group and reused across every row in it, rather than once per row.
    /// Groups are processed in the order their first row appears; rows
    /// within a group run in input-index order.
    pub async fn generate_history(
        &self,
        sector: &str,
        rows: &[(i64, FeatureRow, f64)],
    ) -> Result<Vec<Vec<SingleTaskForecastReport>>, RuntimeError> {
        let mut per_row: Vec<Vec<SingleTaskForecastReport>> = rows.iter().map(|_| Vec::with_capacity(self.templates.len())).collect();

        for template in &self.templates {
            let task_id = template.task_id(sector);
            let handle = self.model_handle(&task_id).await?;

            let artifacts_for_bulk = self.artifacts.clone();
            let task_id_for_bulk = task_id.clone();
            self.cache
                .bulk_load_snapshots(&handle, move |snapshot_id| {
                    let artifacts = artifacts_for_bulk.clone();
                    let task_id = task_id_for_bulk.clone();
                    let snapshot_id = snapshot_id.to_string();
                    async move { artifacts.load_snapshot_kernel(&task_id, &snapshot_id).await }
                })
                .await?;

            let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
            let mut group_index: HashMap<String, usize> = HashMap::new();
            for (idx, (ts, _, _)) in rows.iter().enumerate() {
                let snapshot_id = handle.snapshot_for(*ts, SnapshotPolicy::Last)?.snapshot_id.clone();
                let pos = *group_index.entry(snapshot_id.clone()).or_insert_with(|| {
                    groups.push((snapshot_id, Vec::new()));
                    groups.len() - 1
                });
                groups[pos].1.push(idx);
            }

            for (snapshot_id, indices) in &groups {
                let kernel = self
                    .cache
                    .snapshot_kernel(&task_id, snapshot_id)
                    .unwrap_or_else(|| handle.main_kernel.clone());

                let explainer = {
                    let explainer_key = format!("{task_id}::{snapshot_id}");
                    let artifacts = self.artifacts.clone();
                    let feature_list = self.feature_list.clone();
                    let task_id_for_loader = task_id.clone();
                    self.cache
                        .get_or_load_explainer(&explainer_key, move || async move {
                            artifacts.load_explainer(&task_id_for_loader, &feature_list).await
                        })
                        .await?
                };

                for &idx in indices {
                    let (_, features, base_price) = &rows[idx];
                    let report = self
                        .score(template, task_id.clone(), kernel.clone(), explainer.clone(), features, *base_price)
                        .await?;
                    per_row[idx].push(report);
                }
            }

            self.cache.unload_snapshots(&handle);
        }

        Ok(per_row)
    }

    /// Warm the model cache for a set of sectors, one task at a time within a
    /// sector (so a single sector's artifact fetches don't race each other)
    /// but sectors run concurrently.
    pub async fn preload_for_sectors(&self, sectors: &[String]) -> Result<(), RuntimeError> {
        let mut failed = Vec::new();
        let jobs = sectors.iter().map(|sector| async move {
            for template in &self.templates {
                let task_id = template.task_id(sector);
                let artifacts = self.artifacts.clone();
                let feature_list = self.feature_list.clone();
                let loaded = self
                    .cache
                    .get_or_load_model(&task_id, move || async move {
                        artifacts.load_model(&task_id, &feature_list).await
                    })
                    .await;
                if loaded.is_err() {
                    return Err(sector.clone());
                }
                tokio::task::yield_now().await;
            }
            Ok(())
        });
        for result in futures::future::join_all(jobs).await {
            if let Err(sector) = result {
                failed.push(sector);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(RuntimeError::PreloadFailed {
                module: "Forecasting".to_string(),
                elements: failed,
            })
        }
    }
}

pub type SharedForecastingCoordinator = Arc<ForecastingCoordinator>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ModelExplainerCache;
    use crate::forecasting::artifact_store::InMemoryArtifactStore;

    fn features() -> FeatureRow {
        let mut f = HashMap::new();
        f.insert("rsi_14".to_string(), 60.0);
        f.insert("sma_50".to_string(), 101.5);
        f
    }

    fn coordinator() -> ForecastingCoordinator {
        ForecastingCoordinator::new(
            Arc::new(ModelExplainerCache::new()),
            Arc::new(InMemoryArtifactStore::new(10_000_000)),
            default_task_templates(),
            vec!["rsi_14".to_string(), "sma_50".to_string()],
        )
    }

    #[tokio::test]
    async fn generate_report_runs_every_template_and_clamps_distribution_output() {
        let coordinator = coordinator();
        let report = coordinator
            .generate_report("TECH", &features(), 100.0, 10_000_000)
            .await
            .unwrap();
        assert_eq!(report.len(), 3);
        for task in report.iter().filter(|t| matches!(t.task_metadata, TaskMetadata::NDayDistribution { .. })) {
            let min = task.prediction[2];
            let q25 = task.prediction[3];
            let q75 = task.prediction[4];
            assert!(min <= q25);
            assert!(q25 <= q75);
        }
    }

    #[tokio::test]
    async fn preload_for_sectors_warms_every_template() {
        let coordinator = coordinator();
        coordinator
            .preload_for_sectors(&["TECH".to_string(), "ENERGY".to_string()])
            .await
            .unwrap();
    }

    struct ConstPredictor;
    impl Predictor for ConstPredictor {
        fn predict(&self, _features: &FeatureRow) -> Vec<f64> {
            vec![0.01, 0.02, 0.0, -0.01, 0.01]
        }
    }

    struct StubExplainer;
    impl Explainer for StubExplainer {
        fn explain(&self, _features: &FeatureRow) -> Vec<crate::model::report::ShapExplanation> {
            NDIST_TARGETS
                .iter()
                .map(|t| crate::model::report::ShapExplanation {
                    target_name: (*t).to_string(),
                    base_value: 0.0,
                    prediction_outcome: 0.0,
                    top_features: Vec::new(),
                })
                .collect()
        }
    }

    /// Three snapshots available at `{1000, 2000, 3000}`; `load_explainer`
    /// counts its own invocations so the test can assert grouping collapsed
    /// four rows into three explainer constructions.
    struct ScenarioDArtifactStore {
        explain_calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl crate::forecasting::artifact_store::ArtifactStore for ScenarioDArtifactStore {
        async fn load_model(&self, task_id: &str, feature_list: &[String]) -> anyhow::Result<Arc<ForecastingModelHandle>> {
            let snapshots = vec![
                crate::cache::Snapshot { snapshot_id: "s1".into(), available_from_ts: 1000 },
                crate::cache::Snapshot { snapshot_id: "s2".into(), available_from_ts: 2000 },
                crate::cache::Snapshot { snapshot_id: "s3".into(), available_from_ts: 3000 },
            ];
            Ok(Arc::new(ForecastingModelHandle::new(
                task_id.to_string(),
                "lgbm".to_string(),
                "synthetic".to_string(),
                Arc::new(ConstPredictor),
                snapshots,
                feature_list.to_vec(),
            )))
        }

        async fn load_explainer(&self, _task_id: &str, _feature_list: &[String]) -> anyhow::Result<Arc<dyn Explainer>> {
            self.explain_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Arc::new(StubExplainer))
        }

        async fn load_snapshot_kernel(&self, _task_id: &str, _snapshot_id: &str) -> anyhow::Result<Arc<dyn Predictor>> {
            Ok(Arc::new(ConstPredictor))
        }
    }

    #[tokio::test]
    async fn generate_history_groups_rows_by_snapshot_and_builds_explainer_once_per_group() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let explain_calls = Arc::new(AtomicUsize::new(0));
        let artifacts: SharedArtifactStore = Arc::new(ScenarioDArtifactStore {
            explain_calls: explain_calls.clone(),
        });
        let coordinator = ForecastingCoordinator::new(
            Arc::new(ModelExplainerCache::new()),
            artifacts,
            vec![TaskTemplate {
                problem_id: "ndist-5d".to_string(),
                metadata: TaskMetadata::NDayDistribution { horizon: 5 },
                is_distribution: true,
            }],
            vec!["rsi_14".to_string()],
        );

        let rows: Vec<(i64, FeatureRow, f64)> = [1500_i64, 2500, 2600, 4000]
            .into_iter()
            .map(|ts| (ts, features(), 100.0))
            .collect();

        let reports = coordinator.generate_history("TECH", &rows).await.unwrap();
        assert_eq!(reports.len(), 4);
        assert!(reports.iter().all(|r| r.len() == 1));
        assert_eq!(explain_calls.load(Ordering::SeqCst), 3);
    }
}
