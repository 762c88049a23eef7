//! Integration tests for the plain `/v1/...` HTTP surface, exercised
//! in-process with `tower::ServiceExt::oneshot` against a real `Orchestrator`
//! wired entirely from in-memory stores.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use itapia_runtime_mcp::aggregation::RecommendationTable;
use itapia_runtime_mcp::backtest::{BacktestClient, BacktestContextManager, SelectorConfig, StubBacktestReportStore};
use itapia_runtime_mcp::cache::ModelExplainerCache;
use itapia_runtime_mcp::data::{InMemoryNewsStore, InMemoryOhlcvStore, InMemoryTickerMetadataStore};
use itapia_runtime_mcp::forecasting::{default_task_templates, ForecastingCoordinator, InMemoryArtifactStore};
use itapia_runtime_mcp::http;
use itapia_runtime_mcp::model::profile::InMemoryProfileStore;
use itapia_runtime_mcp::news::NewsCoordinator;
use itapia_runtime_mcp::orchestrator::Orchestrator;
use itapia_runtime_mcp::rules::InMemoryRuleStore;

async fn test_app() -> axum::Router {
    use itapia_runtime_mcp::data::{NewsStore, OhlcvStore, TickerMetadataStore};
    use itapia_runtime_mcp::forecasting::ArtifactStore;
    use itapia_runtime_mcp::model::profile::ProfileStore;
    use itapia_runtime_mcp::rules::RuleStore;

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

    http::router(orchestrator)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn analysis_full_returns_report_for_known_ticker() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/analysis/AAPL/full")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ticker"], "AAPL");
    assert!(body["technical"].is_object());
    assert!(body["forecasting"].is_array());
    assert!(body["news"].is_object());
}

#[tokio::test]
async fn analysis_full_rejects_unknown_ticker_with_no_data() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/analysis/ZZZZ/full")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "NO_DATA");
}

#[tokio::test]
async fn analysis_full_rejects_malformed_ticker_with_validation_error() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/analysis/not-a-valid-ticker-way-too-long/full")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn analysis_explain_returns_plain_text_summary() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/analysis/AAPL/explain?kind=technical")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("Technical analysis for AAPL"));
}

#[tokio::test]
async fn advisor_full_returns_ranked_recommendation() {
    let app = test_app().await;
    let body = serde_json::to_vec(&json!({ "user_id": "tester" })).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/advisor/AAPL/full")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ticker"], "AAPL");
    assert_eq!(body["user_id"], "tester");
    assert!(body["decision"].is_object());
}

#[tokio::test]
async fn rules_list_and_explain_round_trip() {
    let app = test_app().await;
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/v1/rules").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rules = body_json(response).await;
    let rules = rules.as_array().unwrap();
    assert!(!rules.is_empty());
    let rule_id = rules[0]["rule_id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/rules/{rule_id}/explain"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rules_explain_unknown_id_returns_not_found() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/rules/does-not-exist/explain")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "RULE_NOT_FOUND");
}

#[tokio::test]
async fn rules_nodes_lists_catalog() {
    let app = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/v1/rules/nodes").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let nodes = body_json(response).await;
    assert!(!nodes.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn backtest_check_unknown_job_surfaces_upstream_error() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/backtest/check/no-such-job")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
