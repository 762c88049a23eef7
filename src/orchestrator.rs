//! The Request Orchestrator: the single entry point `full_analysis` and
//! `full_advisor` go through, fanning independent modules out and unifying
//! their partial failures, gated on a one-shot warm-up event.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;

use crate::aggregation::{build_advisor_report, evaluate_rules, RecommendationTable};
use crate::backtest::SharedBacktestContextManager;
use crate::cache::FeatureRow;
use crate::data::{NewsStore, OhlcvStore, TickerMetadataStore};
use crate::errors::RuntimeError;
use crate::forecasting::ForecastingCoordinator;
use crate::model::profile::SharedProfileStore;
use crate::model::report::{AnalysisReport, NewsReport, TechnicalReport};
use crate::news::NewsCoordinator;
use crate::rules::{Purpose, SharedRuleStore};
use crate::technical::{Bar, TechAnalyzer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Daily,
    Intraday,
    All,
}

fn bars_to_features(bars: &[Bar]) -> FeatureRow {
    let mut row = HashMap::new();
    if let Some(last) = bars.last() {
        row.insert("close".to_string(), last.close);
        row.insert("volume".to_string(), last.volume);
    }
    if bars.len() >= 14 {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        if let Some(rsi) = rust_ti::standard_indicators::bulk::rsi(&closes).last() {
            row.insert("rsi_14".to_string(), *rsi);
        }
    }
    row
}

/// Everything `full_analysis`/`full_advisor` needs, wired once at process
/// start. The warm-up gate lives here as a `OnceCell<()>`: set exactly once
/// by a successful `preload_all`, checked by every serving entry point.
pub struct Orchestrator {
    ohlcv: Arc<dyn OhlcvStore>,
    metadata: Arc<dyn TickerMetadataStore>,
    news_store: Arc<dyn NewsStore>,
    forecasting: Arc<ForecastingCoordinator>,
    news: Arc<NewsCoordinator>,
    rules: SharedRuleStore,
    profiles: SharedProfileStore,
    backtest: SharedBacktestContextManager,
    recommendation_table: RecommendationTable,
    warm_up: OnceCell<()>,
}

impl Orchestrator {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ohlcv: Arc<dyn OhlcvStore>,
        metadata: Arc<dyn TickerMetadataStore>,
        news_store: Arc<dyn NewsStore>,
        forecasting: Arc<ForecastingCoordinator>,
        news: Arc<NewsCoordinator>,
        rules: SharedRuleStore,
        profiles: SharedProfileStore,
        backtest: SharedBacktestContextManager,
        recommendation_table: RecommendationTable,
    ) -> Self {
        Self {
            ohlcv,
            metadata,
            news_store,
            forecasting,
            news,
            rules,
            profiles,
            backtest,
            recommendation_table,
            warm_up: OnceCell::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.warm_up.initialized()
    }

    fn ensure_ready(&self) -> Result<(), RuntimeError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(RuntimeError::ServiceNotReady)
        }
    }

    /// Fans out technical analysis, forecasting, and news analysis for
    /// `ticker`, sharing one OHLCV fetch across every subtask. "Collect all,
    /// raise if any": the first module to fail determines the error, and no
    /// partial report is ever returned.
    pub async fn full_analysis(&self, ticker: &str, scope: Scope) -> Result<AnalysisReport, RuntimeError> {
        self.ensure_ready()?;
        let ticker = ticker.to_uppercase();
        if !self.metadata.exists(&ticker) {
            return Err(RuntimeError::NoData);
        }
        let sector = self.metadata.sector(&ticker).unwrap_or_else(|| "UNKNOWN".to_string());

        let daily = self
            .ohlcv
            .daily(&ticker)
            .map_err(|_| RuntimeError::MissingReport("Technical analysis".to_string()))?;
        let intraday = if scope == Scope::Daily {
            None
        } else {
            Some(
                self.ohlcv
                    .intraday(&ticker)
                    .map_err(|_| RuntimeError::MissingReport("Technical analysis".to_string()))?,
            )
        };

        let daily_bars = Arc::new(daily.bars.clone());
        let intraday_bars = Arc::new(intraday.map(|s| s.bars).unwrap_or_default());

        let technical_task = {
            let daily_bars = daily_bars.clone();
            let intraday_bars = intraday_bars.clone();
            let want_intraday = scope != Scope::Daily && !intraday_bars.is_empty();
            tokio::task::spawn_blocking(move || {
                let analyzer = TechAnalyzer::new();
                let daily_report = analyzer.analyze(&daily_bars);
                let intraday_report = want_intraday.then(|| analyzer.analyze(&intraday_bars));
                TechnicalReport {
                    daily: Some(daily_report),
                    intraday: intraday_report,
                }
            })
        };

        let features = bars_to_features(&daily_bars);
        let base_price = daily_bars.last().map(|b| b.close).unwrap_or(1.0);
        let now_ts = daily_bars.last().map(|b| b.timestamp).unwrap_or(0);
        let forecasting = self.forecasting.clone();
        let sector_for_forecast = sector.clone();
        let forecasting_task = async move { forecasting.generate_report(&sector_for_forecast, &features, base_price, now_ts).await };

        let news = self.news.clone();
        let ticker_for_news = ticker.clone();
        let articles = self
            .news_articles(&ticker)
            .map_err(|_| RuntimeError::MissingReport("News analysis".to_string()))?;
        let news_task = async move { Ok::<NewsReport, RuntimeError>(news.analyze_batch(&ticker_for_news, &articles).await) };

        let (technical_result, forecasting_result, news_result) = tokio::join!(technical_task, forecasting_task, news_task);

        let technical = technical_result.map_err(|_| RuntimeError::MissingReport("Technical analysis".to_string()))?;
        let forecasting = forecasting_result.map_err(|_| RuntimeError::MissingReport("Forecasting".to_string()))?;
        let news = news_result?;

        let mut report = AnalysisReport::new(ticker);
        report.technical = Some(technical);
        report.forecasting = Some(forecasting);
        report.news = Some(news);
        Ok(report)
    }

    fn news_articles(&self, ticker: &str) -> Result<Vec<String>, RuntimeError> {
        self.news_store
            .recent_articles(ticker)
            .map_err(|_| RuntimeError::MissingReport("News analysis".to_string()))
    }

    /// Runs `full_analysis` at medium horizon over the full scope, then
    /// evaluates and aggregates all three rule purposes against it.
    /// `weight_overrides` merges over the user's stored meta-synthesis
    /// weights (the `weights?` field a caller may pass on the advisor
    /// request), falling back to the profile's own weights for any purpose
    /// it doesn't mention.
    pub async fn full_advisor(
        &self,
        ticker: &str,
        user_id: &str,
        weight_overrides: Option<&HashMap<Purpose, f64>>,
    ) -> Result<crate::model::AdvisorReport, RuntimeError> {
        let report = self.full_analysis(ticker, Scope::All).await?;
        let profile = self.profiles.get_profile(user_id);
        let report_json = report.to_sanitized_json();

        let mut weights = profile.meta_weights.clone();
        if let Some(overrides) = weight_overrides {
            weights.extend(overrides.iter().map(|(k, v)| (*k, *v)));
        }

        let all_rules = self.rules.all();
        let decision_rules = all_rules.clone();
        let risk_rules = all_rules.clone();
        let opportunity_rules = all_rules.clone();

        let (decision_scored, risk_scored, opportunity_scored) = {
            let report_json = &report_json;
            let profile = &profile;
            tokio::join!(
                async { evaluate_rules(&decision_rules, Purpose::DecisionSignal, profile, report_json) },
                async { evaluate_rules(&risk_rules, Purpose::RiskLevel, profile, report_json) },
                async { evaluate_rules(&opportunity_rules, Purpose::OpportunityRating, profile, report_json) },
            )
        };

        Ok(build_advisor_report(
            ticker,
            user_id,
            &decision_scored,
            &risk_scored,
            &opportunity_scored,
            &weights,
            &self.recommendation_table,
        ))
    }

    /// Pre-warms the forecasting and news caches for every known sector.
    /// Sets the warm-up event only if every subtask succeeds; repeated
    /// calls are safe and retry whatever previously failed, since the
    /// underlying single-flight cache clears failed entries.
    pub async fn preload_all(&self) -> Result<(), RuntimeError> {
        let sectors = self.metadata.all_sectors();
        let forecasting_result = self.forecasting.preload_for_sectors(&sectors).await;
        let news_result = self.news.preload_caches().await;

        match (forecasting_result, news_result) {
            (Ok(()), Ok(())) => {
                let _ = self.warm_up.set(());
                Ok(())
            }
            (Err(e), _) => Err(e),
            (_, Err(e)) => Err(e),
        }
    }

    #[must_use]
    pub fn backtest_manager(&self) -> SharedBacktestContextManager {
        self.backtest.clone()
    }

    pub fn explain_rule(&self, rule_id: &str) -> Option<Value> {
        self.rules.get(rule_id).map(|rule| rule.to_dict())
    }

    #[must_use]
    pub fn list_rules(&self, purpose: Option<Purpose>) -> Vec<Arc<crate::rules::Rule>> {
        match purpose {
            Some(p) => self.rules.by_purpose(p),
            None => self.rules.all(),
        }
    }
}

pub type SharedOrchestrator = Arc<Orchestrator>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{BacktestClient, BacktestContextManager, SelectorConfig, StubBacktestReportStore};
    use crate::data::{InMemoryNewsStore, InMemoryOhlcvStore, InMemoryTickerMetadataStore};
    use crate::forecasting::{default_task_templates, InMemoryArtifactStore};
    use crate::model::profile::InMemoryProfileStore;
    use crate::rules::InMemoryRuleStore;
    use crate::cache::ModelExplainerCache;

    fn make_orchestrator() -> Orchestrator {
        let ohlcv: Arc<dyn OhlcvStore> = Arc::new(InMemoryOhlcvStore::new());
        let metadata: Arc<dyn TickerMetadataStore> = Arc::new(InMemoryTickerMetadataStore::default_universe());
        let model_cache = Arc::new(ModelExplainerCache::new());
        let artifacts = Arc::new(InMemoryArtifactStore::new(10_000_000));
        let forecasting = Arc::new(ForecastingCoordinator::new(
            model_cache,
            artifacts,
            default_task_templates(),
            vec!["rsi_14".to_string(), "close".to_string()],
        ));
        let news = Arc::new(NewsCoordinator::with_default_analyzers());
        let rules: SharedRuleStore = Arc::new(InMemoryRuleStore::new());
        let profiles: SharedProfileStore = Arc::new(InMemoryProfileStore::new());
        let backtest = Arc::new(BacktestContextManager::new(
            ohlcv.clone(),
            Arc::new(BacktestClient::new("http://localhost:8088".to_string())),
            Arc::new(StubBacktestReportStore),
            2,
            SelectorConfig::default(),
            std::time::Duration::from_secs(45),
            std::time::Duration::from_secs(60),
        ));
        let news_store: Arc<dyn NewsStore> = Arc::new(InMemoryNewsStore::new());
        Orchestrator::new(ohlcv, metadata, news_store, forecasting, news, rules, profiles, backtest, RecommendationTable::default_table())
    }

    #[tokio::test]
    async fn full_analysis_fails_with_service_not_ready_before_warm_up() {
        let orchestrator = make_orchestrator();
        let err = orchestrator.full_analysis("AAPL", Scope::Daily).await.unwrap_err();
        assert!(matches!(err, RuntimeError::ServiceNotReady));
    }

    #[tokio::test]
    async fn full_analysis_fails_with_no_data_for_unknown_ticker() {
        let orchestrator = make_orchestrator();
        orchestrator.preload_all().await.unwrap();
        let err = orchestrator.full_analysis("NOPE", Scope::Daily).await.unwrap_err();
        assert!(matches!(err, RuntimeError::NoData));
    }

    #[tokio::test]
    async fn full_analysis_succeeds_after_warm_up_for_known_ticker() {
        let orchestrator = make_orchestrator();
        orchestrator.preload_all().await.unwrap();
        let report = orchestrator.full_analysis("AAPL", Scope::All).await.unwrap();
        assert_eq!(report.ticker, "AAPL");
        assert!(report.technical.is_some());
        assert!(report.forecasting.is_some());
        assert!(report.news.is_some());
    }

    #[tokio::test]
    async fn full_advisor_produces_three_recommendations() {
        let orchestrator = make_orchestrator();
        orchestrator.preload_all().await.unwrap();
        let advisor = orchestrator.full_advisor("AAPL", "user-1", None).await.unwrap();
        assert_eq!(advisor.ticker, "AAPL");
        assert_eq!(advisor.decision.purpose, "DECISION_SIGNAL");
    }

    #[tokio::test]
    async fn preload_all_is_idempotent() {
        let orchestrator = make_orchestrator();
        orchestrator.preload_all().await.unwrap();
        orchestrator.preload_all().await.unwrap();
        assert!(orchestrator.is_ready());
    }
}
