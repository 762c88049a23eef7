//! MCP server integration tests.
//!
//! Verifies tool registration, parameter validation (garde), error paths,
//! and response serialization over an in-process duplex transport, against
//! an `AdvisorServer` backed entirely by in-memory stores.

use std::sync::Arc;

use rmcp::model::CallToolRequestParams;
use rmcp::ServiceExt;
use serde_json::json;

use itapia_runtime_mcp::aggregation::RecommendationTable;
use itapia_runtime_mcp::backtest::{BacktestClient, BacktestContextManager, SelectorConfig, StubBacktestReportStore};
use itapia_runtime_mcp::cache::ModelExplainerCache;
use itapia_runtime_mcp::data::{InMemoryNewsStore, InMemoryOhlcvStore, InMemoryTickerMetadataStore, NewsStore, OhlcvStore, TickerMetadataStore};
use itapia_runtime_mcp::forecasting::{default_task_templates, ArtifactStore, ForecastingCoordinator, InMemoryArtifactStore};
use itapia_runtime_mcp::model::profile::{InMemoryProfileStore, ProfileStore};
use itapia_runtime_mcp::news::NewsCoordinator;
use itapia_runtime_mcp::orchestrator::Orchestrator;
use itapia_runtime_mcp::rules::{InMemoryRuleStore, RuleStore};
use itapia_runtime_mcp::server::AdvisorServer;

async fn make_test_server() -> AdvisorServer {
    let ohlcv: Arc<dyn OhlcvStore> = Arc::new(InMemoryOhlcvStore::new());
    let metadata: Arc<dyn TickerMetadataStore> = Arc::new(InMemoryTickerMetadataStore::default_universe());
    let news_store: Arc<dyn NewsStore> = Arc::new(InMemoryNewsStore::new());

    let feature_list = vec!["close".to_string(), "volume".to_string(), "rsi_14".to_string()];
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new(1_700_000_000));
    let forecasting = Arc::new(ForecastingCoordinator::new(
        Arc::new(ModelExplainerCache::new()),
        artifacts,
        default_task_templates(),
        feature_list,
    ));
    let news = Arc::new(NewsCoordinator::with_default_analyzers());
    let rules: Arc<dyn RuleStore> = Arc::new(InMemoryRuleStore::new());
    let profiles: Arc<dyn ProfileStore> = Arc::new(InMemoryProfileStore::new());
    let backtest = Arc::new(BacktestContextManager::new(
        ohlcv.clone(),
        Arc::new(BacktestClient::new("http://localhost:1".to_string())),
        Arc::new(StubBacktestReportStore),
        2,
        SelectorConfig::default(),
        std::time::Duration::from_millis(10),
        std::time::Duration::from_millis(50),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        ohlcv,
        metadata,
        news_store,
        forecasting,
        news,
        rules,
        profiles,
        backtest,
        RecommendationTable::default_table(),
    ));
    orchestrator.preload_all().await.expect("warm-up succeeds against in-memory stores");

    AdvisorServer::new(orchestrator)
}

fn tool_text(result: &rmcp::model::CallToolResult) -> String {
    result
        .content
        .first()
        .and_then(|c| c.raw.as_text())
        .map(|t| t.text.clone())
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tool_router_lists_every_advisory_tool() {
    let server = make_test_server().await;

    let (server_tx, server_rx) = tokio::io::duplex(4096);
    let (client_tx, client_rx) = tokio::io::duplex(4096);

    let _server_handle = tokio::spawn(async move { server.serve((client_rx, server_tx)).await.unwrap() });
    let client: rmcp::service::RunningService<rmcp::service::RoleClient, _> =
        ().serve((server_rx, client_tx)).await.unwrap();

    let tools = client.list_all_tools().await.unwrap();
    let tool_names: Vec<String> = tools.iter().map(|t| t.name.to_string()).collect();

    for expected in [
        "full_analysis",
        "technical_analysis",
        "forecasting_analysis",
        "news_analysis",
        "explain_analysis",
        "full_advisor",
        "explain_advisor",
        "list_rules",
        "explain_rule",
        "list_rule_nodes",
        "backtest_generate",
        "backtest_check",
    ] {
        assert!(tool_names.contains(&expected.to_string()), "missing tool: {expected}");
    }

    client.cancel().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_analysis_returns_a_complete_report_for_a_known_ticker() {
    let server = make_test_server().await;

    let (server_tx, server_rx) = tokio::io::duplex(4096);
    let (client_tx, client_rx) = tokio::io::duplex(4096);

    let _server_handle = tokio::spawn(async move { server.serve((client_rx, server_tx)).await.unwrap() });
    let client: rmcp::service::RunningService<rmcp::service::RoleClient, _> =
        ().serve((server_rx, client_tx)).await.unwrap();

    let result = client
        .peer()
        .call_tool(CallToolRequestParams {
            meta: None,
            name: "full_analysis".into(),
            arguments: Some(serde_json::from_value(json!({"ticker": "AAPL"})).unwrap()),
            task: None,
        })
        .await
        .unwrap();

    assert!(!result.is_error.unwrap_or(false));
    let resp: serde_json::Value = serde_json::from_str(&tool_text(&result)).unwrap();
    assert_eq!(resp["ticker"], "AAPL");
    assert!(resp["technical"].is_object());
    assert!(resp["forecasting"].is_array());
    assert!(resp["news"].is_object());

    client.cancel().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_analysis_rejects_malformed_ticker_via_garde() {
    let server = make_test_server().await;

    let (server_tx, server_rx) = tokio::io::duplex(4096);
    let (client_tx, client_rx) = tokio::io::duplex(4096);

    let _server_handle = tokio::spawn(async move { server.serve((client_rx, server_tx)).await.unwrap() });
    let client: rmcp::service::RunningService<rmcp::service::RoleClient, _> =
        ().serve((server_rx, client_tx)).await.unwrap();

    let result = client
        .peer()
        .call_tool(CallToolRequestParams {
            meta: None,
            name: "full_analysis".into(),
            arguments: Some(serde_json::from_value(json!({"ticker": ""})).unwrap()),
            task: None,
        })
        .await
        .unwrap();

    assert!(result.is_error.unwrap_or(false));
    assert!(tool_text(&result).contains("Validation error"));

    client.cancel().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_analysis_reports_no_data_for_an_unknown_ticker() {
    let server = make_test_server().await;

    let (server_tx, server_rx) = tokio::io::duplex(4096);
    let (client_tx, client_rx) = tokio::io::duplex(4096);

    let _server_handle = tokio::spawn(async move { server.serve((client_rx, server_tx)).await.unwrap() });
    let client: rmcp::service::RunningService<rmcp::service::RoleClient, _> =
        ().serve((server_rx, client_tx)).await.unwrap();

    let result = client
        .peer()
        .call_tool(CallToolRequestParams {
            meta: None,
            name: "full_analysis".into(),
            arguments: Some(serde_json::from_value(json!({"ticker": "ZZZZ"})).unwrap()),
            task: None,
        })
        .await
        .unwrap();

    assert!(result.is_error.unwrap_or(false));
    assert!(tool_text(&result).contains("no data"));

    client.cancel().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_advisor_ranks_a_recommendation_for_a_new_user() {
    let server = make_test_server().await;

    let (server_tx, server_rx) = tokio::io::duplex(4096);
    let (client_tx, client_rx) = tokio::io::duplex(4096);

    let _server_handle = tokio::spawn(async move { server.serve((client_rx, server_tx)).await.unwrap() });
    let client: rmcp::service::RunningService<rmcp::service::RoleClient, _> =
        ().serve((server_rx, client_tx)).await.unwrap();

    let result = client
        .peer()
        .call_tool(CallToolRequestParams {
            meta: None,
            name: "full_advisor".into(),
            arguments: Some(serde_json::from_value(json!({"ticker": "AAPL", "user_id": "new-user"})).unwrap()),
            task: None,
        })
        .await
        .unwrap();

    assert!(!result.is_error.unwrap_or(false));
    let resp: serde_json::Value = serde_json::from_str(&tool_text(&result)).unwrap();
    assert_eq!(resp["ticker"], "AAPL");
    assert_eq!(resp["user_id"], "new-user");
    for purpose in ["decision", "risk", "opportunity"] {
        assert!(resp[purpose]["final_score"].is_number());
    }

    client.cancel().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_rules_and_explain_rule_round_trip() {
    let server = make_test_server().await;

    let (server_tx, server_rx) = tokio::io::duplex(4096);
    let (client_tx, client_rx) = tokio::io::duplex(4096);

    let _server_handle = tokio::spawn(async move { server.serve((client_rx, server_tx)).await.unwrap() });
    let client: rmcp::service::RunningService<rmcp::service::RoleClient, _> =
        ().serve((server_rx, client_tx)).await.unwrap();

    let result = client
        .peer()
        .call_tool(CallToolRequestParams {
            meta: None,
            name: "list_rules".into(),
            arguments: Some(serde_json::from_value(json!({})).unwrap()),
            task: None,
        })
        .await
        .unwrap();
    let rules: serde_json::Value = serde_json::from_str(&tool_text(&result)).unwrap();
    let rules = rules.as_array().unwrap();
    assert!(!rules.is_empty());
    let rule_id = rules[0]["rule_id"].as_str().unwrap().to_string();

    let result = client
        .peer()
        .call_tool(CallToolRequestParams {
            meta: None,
            name: "explain_rule".into(),
            arguments: Some(serde_json::from_value(json!({"rule_id": rule_id})).unwrap()),
            task: None,
        })
        .await
        .unwrap();
    assert!(!result.is_error.unwrap_or(false));

    client.cancel().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backtest_generate_surfaces_upstream_failure_as_a_tool_error() {
    let server = make_test_server().await;

    let (server_tx, server_rx) = tokio::io::duplex(4096);
    let (client_tx, client_rx) = tokio::io::duplex(4096);

    let _server_handle = tokio::spawn(async move { server.serve((client_rx, server_tx)).await.unwrap() });
    let client: rmcp::service::RunningService<rmcp::service::RoleClient, _> =
        ().serve((server_rx, client_tx)).await.unwrap();

    let result = client
        .peer()
        .call_tool(CallToolRequestParams {
            meta: None,
            name: "backtest_generate".into(),
            arguments: Some(serde_json::from_value(json!({"ticker": "AAPL", "backtest_dates_ts": [1_700_000_000_i64]})).unwrap()),
            task: None,
        })
        .await
        .unwrap();

    assert!(result.is_error.unwrap_or(false));
    assert!(tool_text(&result).contains("backtest upstream"));

    client.cancel().await.unwrap();
}
