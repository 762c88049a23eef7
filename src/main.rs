// float_cmp: only in tests where assert_eq! on f64 is intentional.
#![cfg_attr(test, allow(clippy::float_cmp))]

use std::sync::Arc;

use anyhow::Result;
use rmcp::ServiceExt;
use tracing_subscriber::{self, EnvFilter};

use itapia_runtime_mcp::backtest::{BacktestClient, BacktestContextManager, StubBacktestReportStore};
use itapia_runtime_mcp::cache::ModelExplainerCache;
use itapia_runtime_mcp::config::RuntimeConfig;
use itapia_runtime_mcp::data::{InMemoryNewsStore, InMemoryOhlcvStore, InMemoryTickerMetadataStore};
use itapia_runtime_mcp::forecasting::{default_task_templates, ForecastingCoordinator, InMemoryArtifactStore};
use itapia_runtime_mcp::http;
use itapia_runtime_mcp::model::profile::InMemoryProfileStore;
use itapia_runtime_mcp::news::NewsCoordinator;
use itapia_runtime_mcp::orchestrator::Orchestrator;
use itapia_runtime_mcp::rules::InMemoryRuleStore;
use itapia_runtime_mcp::server::AdvisorServer;
use itapia_runtime_mcp::{aggregation::RecommendationTable, backtest::point_selector::SelectorConfig};

const FEATURE_LIST: &[&str] = &["close", "volume", "rsi_14"];

fn build_orchestrator(config: &RuntimeConfig) -> Arc<Orchestrator> {
    use itapia_runtime_mcp::data::{NewsStore, OhlcvStore, TickerMetadataStore};
    use itapia_runtime_mcp::forecasting::ArtifactStore;
    use itapia_runtime_mcp::model::profile::ProfileStore;
    use itapia_runtime_mcp::rules::RuleStore;

    let ohlcv: Arc<dyn OhlcvStore> = Arc::new(InMemoryOhlcvStore::new());
    let metadata: Arc<dyn TickerMetadataStore> = Arc::new(InMemoryTickerMetadataStore::default_universe());
    let news_store: Arc<dyn NewsStore> = Arc::new(InMemoryNewsStore::new());

    let artifacts: Arc<dyn ArtifactStore> =
        Arc::new(InMemoryArtifactStore::new(chrono::Utc::now().timestamp()));
    let feature_list: Vec<String> = FEATURE_LIST.iter().map(|s| s.to_string()).collect();
    let forecasting = Arc::new(ForecastingCoordinator::new(
        Arc::new(ModelExplainerCache::new()),
        artifacts,
        default_task_templates(),
        feature_list,
    ));

    let news = Arc::new(NewsCoordinator::with_default_analyzers());
    let rules: Arc<dyn RuleStore> = Arc::new(InMemoryRuleStore::new());
    let profiles: Arc<dyn ProfileStore> = Arc::new(InMemoryProfileStore::new());

    let backtest_client = Arc::new(BacktestClient::new(config.backtest_service_base_url.clone()));
    let selector_config = SelectorConfig {
        start: config.selector_start_date,
        end: config.selector_end_date,
        day_of_month: config.monthly_day,
        max_special_points: config.max_special_points,
        ..SelectorConfig::default()
    };
    let backtest = Arc::new(BacktestContextManager::new(
        ohlcv.clone(),
        backtest_client,
        Arc::new(StubBacktestReportStore),
        config.parallel_concurrency_limit,
        selector_config,
        config.polling_interval,
        config.polling_deadline,
    ));

    let recommendation_table = RecommendationTable::load_from_path(
        std::env::var("RECOMMENDATION_TABLE_PATH").ok().as_deref(),
    );

    Arc::new(Orchestrator::new(
        ohlcv,
        metadata,
        news_store,
        forecasting,
        news,
        rules,
        profiles,
        backtest,
        recommendation_table,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = RuntimeConfig::from_env()?;
    let orchestrator = build_orchestrator(&config);

    {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            match orchestrator.preload_all().await {
                Ok(()) => tracing::info!("warm-up complete, service ready"),
                Err(err) => tracing::error!(error = %err, "warm-up failed, retrying in background"),
            }
        });
    }

    if let Ok(port) = std::env::var("PORT") {
        // HTTP mode — used by cloud platforms. Serves both the MCP
        // streamable-HTTP surface under /mcp and the plain /v1 HTTP surface.
        use rmcp::transport::streamable_http_server::{
            session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
        };

        let mcp_orchestrator = orchestrator.clone();
        let service = StreamableHttpService::new(
            move || Ok(AdvisorServer::new(mcp_orchestrator.clone())),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig::default(),
        );

        let app = http::router(orchestrator).nest_service("/mcp", service);

        let addr = format!("0.0.0.0:{port}");
        tracing::info!(%addr, "starting itapia-runtime-mcp HTTP server");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
    } else {
        // stdio mode — used for local development with an MCP-aware client.
        tracing::info!("starting itapia-runtime-mcp MCP server (stdio)");

        let server = AdvisorServer::new(orchestrator);
        let service = server.serve(rmcp::transport::stdio()).await?;
        service.waiting().await?;
    }

    Ok(())
}
