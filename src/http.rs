//! Plain HTTP surface: `/v1/...` routes over the same orchestrator core
//! the MCP tool surface serves. Every handler is a thin adapter -- no
//! business logic lives here, only extraction, validation, and the
//! `RuntimeError` -> HTTP response mapping already implemented in
//! `crate::errors`.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use garde::Validate;
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::backtest::{CheckResponse, GenerateResponse};
use crate::errors::RuntimeError;
use crate::model::AdvisorReport;
use crate::orchestrator::SharedOrchestrator;
use crate::rules::registry::{catalog, NodeInfo};
use crate::rules::types::SemanticType;
use crate::server::{
    default_profile, default_scope, explain_advisor, explain_forecasting, explain_news,
    explain_technical, rule_summary, ExplainKindParam, NodeKindParam, ProfileParam, PurposeParam,
    RuleSummary, ScopeParam,
};

#[must_use]
pub fn router(orchestrator: SharedOrchestrator) -> Router {
    Router::new()
        .route("/v1/analysis/{ticker}/full", get(analysis_full))
        .route("/v1/analysis/{ticker}/technical", get(analysis_technical))
        .route("/v1/analysis/{ticker}/forecasting", get(analysis_forecasting))
        .route("/v1/analysis/{ticker}/news", get(analysis_news))
        .route("/v1/analysis/{ticker}/explain", get(analysis_explain))
        .route("/v1/advisor/{ticker}/full", post(advisor_full))
        .route("/v1/advisor/{ticker}/explain", post(advisor_explain))
        .route("/v1/rules", get(rules_list))
        .route("/v1/rules/{rule_id}/explain", get(rules_explain))
        .route("/v1/rules/nodes", get(rules_nodes))
        .route("/v1/backtest/generate", post(backtest_generate))
        .route("/v1/backtest/check/{job_id}", get(backtest_check))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(orchestrator)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize, Validate)]
struct TickerPath {
    #[garde(length(min = 1, max = 10), pattern(r"^[A-Za-z0-9._-]+$"))]
    ticker: String,
}

#[derive(Debug, Deserialize, Validate)]
struct AnalysisQuery {
    #[serde(default = "default_profile")]
    #[garde(skip)]
    #[allow(dead_code)]
    profile: ProfileParam,
    #[serde(default = "default_scope")]
    #[garde(skip)]
    scope: ScopeParam,
}

#[derive(Debug, Deserialize, Validate)]
struct ExplainQuery {
    #[garde(skip)]
    kind: ExplainKindParam,
}

#[derive(Debug, Deserialize, Validate)]
struct AdvisorBody {
    #[garde(length(min = 1))]
    user_id: String,
    #[garde(skip)]
    weights: Option<HashMap<PurposeParam, f64>>,
}

#[derive(Debug, Deserialize, Validate)]
struct AdvisorExplainBody {
    #[garde(length(min = 1))]
    user_id: String,
}

#[derive(Debug, Deserialize, Validate)]
struct RulesQuery {
    #[garde(skip)]
    purpose: Option<PurposeParam>,
}

#[derive(Debug, Deserialize, Validate)]
struct RuleIdPath {
    #[garde(length(min = 1))]
    rule_id: String,
}

#[derive(Debug, Deserialize, Validate)]
struct RuleNodesQuery {
    #[garde(skip)]
    node_type: Option<NodeKindParam>,
    #[garde(skip)]
    purpose: Option<PurposeParam>,
}

#[derive(Debug, Deserialize, Validate)]
struct JobIdPath {
    #[garde(length(min = 1))]
    job_id: String,
}

async fn analysis_full(
    State(orchestrator): State<SharedOrchestrator>,
    Path(ticker): Path<String>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Response, RuntimeError> {
    TickerPath { ticker: ticker.clone() }.validate()?;
    query.validate()?;
    let report = orchestrator.full_analysis(&ticker, query.scope.to_scope()).await?;
    Ok(Json(report).into_response())
}

async fn analysis_technical(
    State(orchestrator): State<SharedOrchestrator>,
    Path(ticker): Path<String>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Response, RuntimeError> {
    TickerPath { ticker: ticker.clone() }.validate()?;
    query.validate()?;
    let report = orchestrator.full_analysis(&ticker, query.scope.to_scope()).await?;
    report
        .technical
        .map(|t| Json(t).into_response())
        .ok_or_else(|| RuntimeError::MissingReport("Technical analysis".to_string()))
}

async fn analysis_forecasting(
    State(orchestrator): State<SharedOrchestrator>,
    Path(ticker): Path<String>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Response, RuntimeError> {
    TickerPath { ticker: ticker.clone() }.validate()?;
    query.validate()?;
    let report = orchestrator.full_analysis(&ticker, query.scope.to_scope()).await?;
    report
        .forecasting
        .map(|f| Json(f).into_response())
        .ok_or_else(|| RuntimeError::MissingReport("Forecasting analysis".to_string()))
}

async fn analysis_news(
    State(orchestrator): State<SharedOrchestrator>,
    Path(ticker): Path<String>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Response, RuntimeError> {
    TickerPath { ticker: ticker.clone() }.validate()?;
    query.validate()?;
    let report = orchestrator.full_analysis(&ticker, query.scope.to_scope()).await?;
    report
        .news
        .map(|n| Json(n).into_response())
        .ok_or_else(|| RuntimeError::MissingReport("News analysis".to_string()))
}

async fn analysis_explain(
    State(orchestrator): State<SharedOrchestrator>,
    Path(ticker): Path<String>,
    Query(query): Query<ExplainQuery>,
) -> Result<String, RuntimeError> {
    TickerPath { ticker: ticker.clone() }.validate()?;
    query.validate()?;
    let report = orchestrator.full_analysis(&ticker, crate::orchestrator::Scope::All).await?;
    Ok(match query.kind {
        ExplainKindParam::Technical => explain_technical(&report),
        ExplainKindParam::News => explain_news(&report),
        ExplainKindParam::Forecasting => explain_forecasting(&report),
        ExplainKindParam::All => format!(
            "{}{}{}",
            explain_technical(&report),
            explain_forecasting(&report),
            explain_news(&report)
        ),
    })
}

async fn advisor_full(
    State(orchestrator): State<SharedOrchestrator>,
    Path(ticker): Path<String>,
    Json(body): Json<AdvisorBody>,
) -> Result<Json<AdvisorReport>, RuntimeError> {
    TickerPath { ticker: ticker.clone() }.validate()?;
    body.validate()?;
    let overrides = body.weights.map(|w| {
        w.into_iter()
            .map(|(purpose, weight)| (purpose.to_purpose(), weight))
            .collect::<HashMap<_, _>>()
    });
    let report = orchestrator
        .full_advisor(&ticker, &body.user_id, overrides.as_ref())
        .await?;
    Ok(Json(report))
}

async fn advisor_explain(
    State(orchestrator): State<SharedOrchestrator>,
    Path(ticker): Path<String>,
    Json(body): Json<AdvisorExplainBody>,
) -> Result<String, RuntimeError> {
    TickerPath { ticker: ticker.clone() }.validate()?;
    body.validate()?;
    let advisor = orchestrator.full_advisor(&ticker, &body.user_id, None).await?;
    Ok(explain_advisor(&advisor))
}

async fn rules_list(
    State(orchestrator): State<SharedOrchestrator>,
    Query(query): Query<RulesQuery>,
) -> Result<Json<Vec<RuleSummary>>, RuntimeError> {
    query.validate()?;
    let rules = orchestrator.list_rules(query.purpose.map(PurposeParam::to_purpose));
    Ok(Json(rules.iter().map(|r| rule_summary(r)).collect()))
}

async fn rules_explain(
    State(orchestrator): State<SharedOrchestrator>,
    Path(rule_id): Path<String>,
) -> Result<Json<serde_json::Value>, RuntimeError> {
    RuleIdPath { rule_id: rule_id.clone() }.validate()?;
    orchestrator
        .explain_rule(&rule_id)
        .map(Json)
        .ok_or_else(|| RuntimeError::RuleNotFound(rule_id))
}

async fn rules_nodes(Query(query): Query<RuleNodesQuery>) -> Result<Json<Vec<NodeInfo>>, RuntimeError> {
    query.validate()?;
    let mut nodes = catalog();
    if let Some(node_type) = query.node_type {
        nodes.retain(|n| n.kind == node_type.to_kind());
    }
    if let Some(purpose) = query.purpose {
        let target = purpose.to_purpose().as_semantic_type();
        nodes.retain(|n| SemanticType::compatible(n.return_type, target));
    }
    Ok(Json(nodes))
}

async fn backtest_generate(
    State(orchestrator): State<SharedOrchestrator>,
    Json(body): Json<crate::server::BacktestGenerateParams>,
) -> Result<(StatusCode, Json<GenerateResponse>), RuntimeError> {
    body.validate()?;
    let response = orchestrator
        .backtest_manager()
        .generate(&body.ticker, &body.backtest_dates_ts)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn backtest_check(
    State(orchestrator): State<SharedOrchestrator>,
    Path(job_id): Path<String>,
) -> Result<Json<CheckResponse>, RuntimeError> {
    JobIdPath { job_id: job_id.clone() }.validate()?;
    let response = orchestrator.backtest_manager().check(&job_id).await?;
    Ok(Json(response))
}
