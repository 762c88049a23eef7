//! Per-ticker backtest context state machine and the bounded-concurrency
//! driver that advances many contexts at once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock, Semaphore};
use tokio::time::Instant;

use crate::data::OhlcvStore;
use crate::errors::RuntimeError;
use crate::model::report::AnalysisReport;

use super::client::{BacktestClient, CheckResponse, GenerateResponse, JobStatus};
use super::point_selector::{select_points, SelectorConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Idle,
    Preparing,
    Polling,
    Ready,
    Failed,
}

/// One ticker's backtest preparation: state plus the reports loaded once
/// ready. `data_ready` is signalled exactly once, on the READY or FAILED
/// transition, so waiters never hang past either terminal state.
pub struct BacktestContext {
    pub ticker: String,
    state: RwLock<ContextState>,
    reports: RwLock<Vec<AnalysisReport>>,
    data_ready_tx: watch::Sender<bool>,
    data_ready_rx: watch::Receiver<bool>,
}

impl BacktestContext {
    #[must_use]
    pub fn new(ticker: String) -> Self {
        let (data_ready_tx, data_ready_rx) = watch::channel(false);
        Self {
            ticker,
            state: RwLock::new(ContextState::Idle),
            reports: RwLock::new(Vec::new()),
            data_ready_tx,
            data_ready_rx,
        }
    }

    pub async fn state(&self) -> ContextState {
        *self.state.read().await
    }

    /// Resolves immediately if `data_ready` was already signalled -- a
    /// `watch` channel always holds its latest value, so a caller that
    /// arrives after READY/FAILED never hangs waiting for an edge it missed.
    pub async fn wait_ready(&self) {
        let mut rx = self.data_ready_rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }

    async fn set_state(&self, state: ContextState) {
        *self.state.write().await = state;
    }

    async fn finish(&self, state: ContextState, reports: Vec<AnalysisReport>) {
        *self.reports.write().await = reports;
        self.set_state(state).await;
        let _ = self.data_ready_tx.send(true);
    }

    pub async fn reports(&self) -> Vec<AnalysisReport> {
        self.reports.read().await.clone()
    }
}

/// Loads the historical reports a completed backtest job produced. The job
/// service's own persistence schema is out of scope; this is the read
/// interface the context manager consumes plus a deterministic stub.
#[async_trait::async_trait]
pub trait BacktestReportStore: Send + Sync {
    async fn load(&self, ticker: &str, job_id: &str) -> anyhow::Result<Vec<AnalysisReport>>;
}

pub struct StubBacktestReportStore;

#[async_trait::async_trait]
impl BacktestReportStore for StubBacktestReportStore {
    async fn load(&self, ticker: &str, _job_id: &str) -> anyhow::Result<Vec<AnalysisReport>> {
        Ok(vec![AnalysisReport::new(ticker.to_string())])
    }
}

pub struct BacktestContextManager {
    ohlcv: Arc<dyn OhlcvStore>,
    client: Arc<BacktestClient>,
    report_store: Arc<dyn BacktestReportStore>,
    semaphore: Arc<Semaphore>,
    selector_config: SelectorConfig,
    polling_interval: Duration,
    polling_deadline: Duration,
}

impl BacktestContextManager {
    #[must_use]
    pub fn new(
        ohlcv: Arc<dyn OhlcvStore>,
        client: Arc<BacktestClient>,
        report_store: Arc<dyn BacktestReportStore>,
        concurrency_limit: usize,
        selector_config: SelectorConfig,
        polling_interval: Duration,
        polling_deadline: Duration,
    ) -> Self {
        Self {
            ohlcv,
            client,
            report_store,
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
            selector_config,
            polling_interval,
            polling_deadline,
        }
    }

    /// Proxies a single ad-hoc `generate` call to the external job service
    /// for caller-supplied dates, bypassing the point selector -- the served
    /// `POST /v1/backtest/generate` surface, distinct from `prepare_all`'s
    /// own point-selected bulk pipeline.
    pub async fn generate(&self, ticker: &str, timestamps: &[i64]) -> Result<GenerateResponse, RuntimeError> {
        self.client.generate(ticker, timestamps).await
    }

    pub async fn check(&self, job_id: &str) -> Result<CheckResponse, RuntimeError> {
        self.client.check(job_id).await
    }

    /// Drives `prepare` for every ticker under the bounded semaphore,
    /// returning one context per ticker once every worker has reached a
    /// terminal state.
    pub async fn prepare_all(&self, tickers: &[String]) -> Vec<Arc<BacktestContext>> {
        let mut handles = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            let context = Arc::new(BacktestContext::new(ticker.clone()));
            let context_for_worker = context.clone();
            let ohlcv = self.ohlcv.clone();
            let client = self.client.clone();
            let report_store = self.report_store.clone();
            let semaphore = self.semaphore.clone();
            let selector_config = self.selector_config;
            let polling_interval = self.polling_interval;
            let polling_deadline = self.polling_deadline;
            let ticker = ticker.clone();
            handles.push((
                context,
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                    run_one(
                        &context_for_worker,
                        &ticker,
                        ohlcv.as_ref(),
                        &client,
                        report_store.as_ref(),
                        &selector_config,
                        polling_interval,
                        polling_deadline,
                    )
                    .await;
                }),
            ));
        }
        let mut contexts = Vec::with_capacity(handles.len());
        for (context, handle) in handles {
            let _ = handle.await;
            contexts.push(context);
        }
        contexts
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_one(
    context: &BacktestContext,
    ticker: &str,
    ohlcv: &dyn OhlcvStore,
    client: &BacktestClient,
    report_store: &dyn BacktestReportStore,
    selector_config: &SelectorConfig,
    polling_interval: Duration,
    polling_deadline: Duration,
) {
    context.set_state(ContextState::Preparing).await;

    let series = match ohlcv.daily(ticker) {
        Ok(series) => series,
        Err(_) => {
            context.finish(ContextState::Failed, Vec::new()).await;
            return;
        }
    };

    let points = select_points(&series, selector_config);
    if points.is_empty() {
        context.finish(ContextState::Ready, Vec::new()).await;
        return;
    }

    context.set_state(ContextState::Polling).await;

    let submitted = client.generate(ticker, &points).await;
    let job_id = match submitted {
        Ok(response) => response.job_id,
        Err(err) => {
            tracing::warn!(ticker, error = %err, "backtest generate failed");
            context.finish(ContextState::Failed, Vec::new()).await;
            return;
        }
    };

    let deadline = Instant::now() + polling_deadline;
    loop {
        if Instant::now() >= deadline {
            tracing::warn!(ticker, "backtest polling exceeded deadline");
            context.finish(ContextState::Failed, Vec::new()).await;
            return;
        }
        match client.check(&job_id).await {
            Ok(response) => match response.status {
                JobStatus::Completed => {
                    let reports = report_store.load(ticker, &response.job_id).await.unwrap_or_default();
                    context.finish(ContextState::Ready, reports).await;
                    return;
                }
                JobStatus::Failed => {
                    context.finish(ContextState::Failed, Vec::new()).await;
                    return;
                }
                JobStatus::Idle | JobStatus::Running => {
                    tokio::time::sleep(polling_interval).await;
                }
            },
            Err(err) => {
                tracing::warn!(ticker, error = %err, "backtest check failed");
                context.finish(ContextState::Failed, Vec::new()).await;
                return;
            }
        }
    }
}

pub type SharedBacktestContextManager = Arc<BacktestContextManager>;
