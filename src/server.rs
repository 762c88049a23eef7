//! MCP server surface: one tool per operation in the orchestration/advisory
//! runtime's served API, backed by the Request Orchestrator, the Rule
//! Runtime's registry and stores, and the Backtest Context Manager.

use std::collections::HashMap;

use garde::Validate;
use rmcp::{
    handler::server::{
        router::tool::ToolRouter,
        wrapper::{Json, Parameters},
    },
    model::{Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ServerHandler,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backtest::{CheckResponse, GenerateResponse};
use crate::model::report::{AnalysisReport, NewsReport, SingleTaskForecastReport, TechnicalReport};
use crate::model::AdvisorReport;
use crate::orchestrator::{Scope, SharedOrchestrator};
use crate::rules::registry::{catalog, NodeInfo, NodeKind};
use crate::rules::types::{Purpose, SemanticType};

#[derive(Clone)]
pub struct AdvisorServer {
    orchestrator: SharedOrchestrator,
    tool_router: ToolRouter<Self>,
}

impl AdvisorServer {
    #[must_use]
    pub fn new(orchestrator: SharedOrchestrator) -> Self {
        Self {
            orchestrator,
            tool_router: Self::tool_router(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProfileParam {
    Short,
    Medium,
    Long,
}

pub(crate) fn default_profile() -> ProfileParam {
    ProfileParam::Medium
}

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScopeParam {
    Daily,
    Intraday,
    All,
}

impl ScopeParam {
    pub(crate) fn to_scope(self) -> Scope {
        match self {
            Self::Daily => Scope::Daily,
            Self::Intraday => Scope::Intraday,
            Self::All => Scope::All,
        }
    }
}

pub(crate) fn default_scope() -> ScopeParam {
    ScopeParam::All
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurposeParam {
    DecisionSignal,
    RiskLevel,
    OpportunityRating,
}

impl PurposeParam {
    pub(crate) fn to_purpose(self) -> Purpose {
        match self {
            Self::DecisionSignal => Purpose::DecisionSignal,
            Self::RiskLevel => Purpose::RiskLevel,
            Self::OpportunityRating => Purpose::OpportunityRating,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExplainKindParam {
    Technical,
    News,
    Forecasting,
    All,
}

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeKindParam {
    Constant,
    Variable,
    Operator,
}

impl NodeKindParam {
    pub(crate) fn to_kind(self) -> NodeKind {
        match self {
            Self::Constant => NodeKind::Constant,
            Self::Variable => NodeKind::Variable,
            Self::Operator => NodeKind::Operator,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct FullAnalysisParams {
    /// Ticker symbol (e.g. "AAPL")
    #[garde(length(min = 1, max = 10), pattern(r"^[A-Za-z0-9._-]+$"))]
    pub ticker: String,
    /// Analysis horizon. Accepted for API parity with the served
    /// specification; this core's module fan-out does not yet vary its
    /// indicator/forecast selection by horizon (see DESIGN.md).
    #[serde(default = "default_profile")]
    #[garde(skip)]
    pub profile: ProfileParam,
    /// Which OHLCV granularities to analyze.
    #[serde(default = "default_scope")]
    #[garde(skip)]
    pub scope: ScopeParam,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ExplainAnalysisParams {
    #[garde(length(min = 1, max = 10), pattern(r"^[A-Za-z0-9._-]+$"))]
    pub ticker: String,
    #[serde(default = "default_profile")]
    #[garde(skip)]
    pub profile: ProfileParam,
    #[serde(default = "default_scope")]
    #[garde(skip)]
    pub scope: ScopeParam,
    #[garde(skip)]
    pub kind: ExplainKindParam,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct FullAdvisorParams {
    #[garde(length(min = 1, max = 10), pattern(r"^[A-Za-z0-9._-]+$"))]
    pub ticker: String,
    #[garde(length(min = 1))]
    pub user_id: String,
    /// Per-purpose meta-synthesis weight overrides; unmentioned purposes
    /// keep the user's stored profile weight (default 1.0).
    #[garde(skip)]
    pub weights: Option<HashMap<PurposeParam, f64>>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ExplainAdvisorParams {
    #[garde(length(min = 1, max = 10), pattern(r"^[A-Za-z0-9._-]+$"))]
    pub ticker: String,
    #[garde(length(min = 1))]
    pub user_id: String,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ListRulesParams {
    #[garde(skip)]
    pub purpose: Option<PurposeParam>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ExplainRuleParams {
    #[garde(length(min = 1))]
    pub rule_id: String,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ListRuleNodesParams {
    #[garde(skip)]
    pub node_type: Option<NodeKindParam>,
    #[garde(skip)]
    pub purpose: Option<PurposeParam>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct BacktestGenerateParams {
    #[garde(length(min = 1, max = 10), pattern(r"^[A-Za-z0-9._-]+$"))]
    pub ticker: String,
    #[garde(length(min = 1))]
    pub backtest_dates_ts: Vec<i64>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct BacktestCheckParams {
    #[garde(length(min = 1))]
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RuleSummary {
    pub rule_id: String,
    pub name: String,
    pub description: String,
    pub purpose: &'static str,
    pub status: &'static str,
}

pub(crate) fn rule_summary(rule: &crate::rules::Rule) -> RuleSummary {
    RuleSummary {
        rule_id: rule.rule_id.clone(),
        name: rule.name.clone(),
        description: rule.description.clone(),
        purpose: rule.purpose.as_semantic_type().as_str(),
        status: match rule.status {
            crate::rules::RuleStatus::Ready => "READY",
            crate::rules::RuleStatus::Evolving => "EVOLVING",
            crate::rules::RuleStatus::Deprecated => "DEPRECATED",
        },
    }
}

pub(crate) fn explain_technical(report: &AnalysisReport) -> String {
    let Some(technical) = &report.technical else {
        return format!("{}: no technical report available.", report.ticker);
    };
    let mut out = format!("Technical analysis for {}:\n", report.ticker);
    if let Some(daily) = &technical.daily {
        out.push_str(&format!(
            "  daily trend: short={:?}/{:?}, mid={:?}/{:?}, long={:?}/{:?}\n",
            daily.trend.short.direction,
            daily.trend.short.strength,
            daily.trend.mid.direction,
            daily.trend.mid.strength,
            daily.trend.long.direction,
            daily.trend.long.strength,
        ));
        out.push_str(&format!(
            "  supports: {}, resistances: {}, patterns: {}\n",
            daily.sr_levels.supports.len(),
            daily.sr_levels.resistances.len(),
            daily.patterns.len(),
        ));
    }
    if technical.intraday.is_some() {
        out.push_str("  intraday sub-report present\n");
    }
    out
}

pub(crate) fn explain_forecasting(report: &AnalysisReport) -> String {
    let Some(forecasting) = &report.forecasting else {
        return format!("{}: no forecasting report available.", report.ticker);
    };
    let mut out = format!("Forecasting for {}:\n", report.ticker);
    for task in forecasting {
        out.push_str(&format!(
            "  task {}: prediction={:?} units={:?}\n",
            task.task_id, task.prediction, task.units
        ));
    }
    out
}

pub(crate) fn explain_news(report: &AnalysisReport) -> String {
    let Some(news) = &report.news else {
        return format!("{}: no news report available.", report.ticker);
    };
    format!(
        "News for {}: {} articles, overall sentiment {:.3}\n",
        report.ticker, news.summary.article_count, news.summary.overall_sentiment_score
    )
}

pub(crate) fn explain_advisor(advisor: &AdvisorReport) -> String {
    let section = |rec: &crate::model::FinalRecommendation| {
        format!(
            "  {}: score={:.3} label={} rules_triggered={}\n",
            rec.purpose,
            rec.final_score,
            rec.label,
            rec.triggered_rules.len()
        )
    };
    format!(
        "Advisor report for {} (user {}):\n{}{}{}",
        advisor.ticker,
        advisor.user_id,
        section(&advisor.decision),
        section(&advisor.risk),
        section(&advisor.opportunity)
    )
}

#[tool_router]
impl AdvisorServer {
    /// Full multi-module analysis for a ticker: technical indicators, ML
    /// forecasting with SHAP attribution, and news NLP, fanned out
    /// concurrently and assembled into one report. Fails with
    /// `SERVICE_NOT_READY` before the warm-up event fires, `NO_DATA` for an
    /// unknown ticker, and `MISSING_REPORT` (named per module) if any branch
    /// fails -- never a partial report.
    #[tool(name = "full_analysis", annotations(read_only_hint = true, open_world_hint = true))]
    async fn full_analysis(
        &self,
        Parameters(params): rmcp::handler::server::tool::Parameters<FullAnalysisParams>,
    ) -> Result<Json<AnalysisReport>, String> {
        params.validate().map_err(|e| format!("Validation error: {e}"))?;
        self.orchestrator
            .full_analysis(&params.ticker, params.scope.to_scope())
            .await
            .map(Json)
            .map_err(|e| e.to_string())
    }

    /// Just the technical-analysis section of `full_analysis`.
    #[tool(name = "technical_analysis", annotations(read_only_hint = true, open_world_hint = true))]
    async fn technical_analysis(
        &self,
        Parameters(params): rmcp::handler::server::tool::Parameters<FullAnalysisParams>,
    ) -> Result<Json<TechnicalReport>, String> {
        params.validate().map_err(|e| format!("Validation error: {e}"))?;
        let report = self
            .orchestrator
            .full_analysis(&params.ticker, params.scope.to_scope())
            .await
            .map_err(|e| e.to_string())?;
        report
            .technical
            .map(Json)
            .ok_or_else(|| "Technical module failed.".to_string())
    }

    /// Just the forecasting section of `full_analysis`.
    #[tool(name = "forecasting_analysis", annotations(read_only_hint = true, open_world_hint = true))]
    async fn forecasting_analysis(
        &self,
        Parameters(params): rmcp::handler::server::tool::Parameters<FullAnalysisParams>,
    ) -> Result<Json<Vec<SingleTaskForecastReport>>, String> {
        params.validate().map_err(|e| format!("Validation error: {e}"))?;
        let report = self
            .orchestrator
            .full_analysis(&params.ticker, params.scope.to_scope())
            .await
            .map_err(|e| e.to_string())?;
        report
            .forecasting
            .map(Json)
            .ok_or_else(|| "Forecasting module failed.".to_string())
    }

    /// Just the news NLP section of `full_analysis`.
    #[tool(name = "news_analysis", annotations(read_only_hint = true, open_world_hint = true))]
    async fn news_analysis(
        &self,
        Parameters(params): rmcp::handler::server::tool::Parameters<FullAnalysisParams>,
    ) -> Result<Json<NewsReport>, String> {
        params.validate().map_err(|e| format!("Validation error: {e}"))?;
        let report = self
            .orchestrator
            .full_analysis(&params.ticker, params.scope.to_scope())
            .await
            .map_err(|e| e.to_string())?;
        report
            .news
            .map(Json)
            .ok_or_else(|| "News module failed.".to_string())
    }

    /// Human-readable explanation of one or all sections of a ticker's
    /// analysis report.
    #[tool(name = "explain_analysis", annotations(read_only_hint = true, open_world_hint = true))]
    async fn explain_analysis(
        &self,
        Parameters(params): rmcp::handler::server::tool::Parameters<ExplainAnalysisParams>,
    ) -> Result<String, String> {
        params.validate().map_err(|e| format!("Validation error: {e}"))?;
        let report = self
            .orchestrator
            .full_analysis(&params.ticker, params.scope.to_scope())
            .await
            .map_err(|e| e.to_string())?;
        Ok(match params.kind {
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

    /// Runs `full_analysis` at medium/all scope for a ticker, then evaluates
    /// and aggregates every rule purpose for `user_id`'s profile into a
    /// ranked advisory recommendation.
    #[tool(name = "full_advisor", annotations(read_only_hint = true, open_world_hint = true))]
    async fn full_advisor(
        &self,
        Parameters(params): rmcp::handler::server::tool::Parameters<FullAdvisorParams>,
    ) -> Result<Json<AdvisorReport>, String> {
        params.validate().map_err(|e| format!("Validation error: {e}"))?;
        let overrides = params.weights.map(|w| {
            w.into_iter()
                .map(|(purpose, weight)| (purpose.to_purpose(), weight))
                .collect::<HashMap<_, _>>()
        });
        self.orchestrator
            .full_advisor(&params.ticker, &params.user_id, overrides.as_ref())
            .await
            .map(Json)
            .map_err(|e| e.to_string())
    }

    /// Human-readable explanation of an advisor recommendation: the final
    /// scores, labels, and the rules that fired for each purpose.
    #[tool(name = "explain_advisor", annotations(read_only_hint = true, open_world_hint = true))]
    async fn explain_advisor(
        &self,
        Parameters(params): rmcp::handler::server::tool::Parameters<ExplainAdvisorParams>,
    ) -> Result<String, String> {
        params.validate().map_err(|e| format!("Validation error: {e}"))?;
        let advisor = self
            .orchestrator
            .full_advisor(&params.ticker, &params.user_id, None)
            .await
            .map_err(|e| e.to_string())?;
        Ok(explain_advisor(&advisor))
    }

    /// Browse registered rules, optionally filtered by purpose.
    #[tool(name = "list_rules", annotations(read_only_hint = true))]
    async fn list_rules(
        &self,
        Parameters(params): rmcp::handler::server::tool::Parameters<ListRulesParams>,
    ) -> Result<Json<Vec<RuleSummary>>, String> {
        params.validate().map_err(|e| format!("Validation error: {e}"))?;
        let rules = self.orchestrator.list_rules(params.purpose.map(PurposeParam::to_purpose));
        Ok(Json(rules.iter().map(|r| rule_summary(r)).collect()))
    }

    /// Explain one rule's tree as its canonical serialized form.
    #[tool(name = "explain_rule", annotations(read_only_hint = true))]
    async fn explain_rule(
        &self,
        Parameters(params): rmcp::handler::server::tool::Parameters<ExplainRuleParams>,
    ) -> Result<Json<Value>, String> {
        params.validate().map_err(|e| format!("Validation error: {e}"))?;
        self.orchestrator
            .explain_rule(&params.rule_id)
            .map(Json)
            .ok_or_else(|| format!("no such rule: {}", params.rule_id))
    }

    /// Browse the registered node catalog (constants, variables, operators),
    /// optionally filtered by node kind and/or purpose-compatible return
    /// type.
    #[tool(name = "list_rule_nodes", annotations(read_only_hint = true))]
    async fn list_rule_nodes(
        &self,
        Parameters(params): rmcp::handler::server::tool::Parameters<ListRuleNodesParams>,
    ) -> Result<Json<Vec<NodeInfo>>, String> {
        params.validate().map_err(|e| format!("Validation error: {e}"))?;
        let mut nodes = catalog();
        if let Some(node_type) = params.node_type {
            nodes.retain(|n| n.kind == node_type.to_kind());
        }
        if let Some(purpose) = params.purpose {
            let target = purpose.to_purpose().as_semantic_type();
            nodes.retain(|n| SemanticType::compatible(n.return_type, target));
        }
        Ok(Json(nodes))
    }

    /// Submit an ad-hoc backtest-report generation job to the external job
    /// service for caller-supplied evaluation dates. Returns the job id and
    /// its initial status; a `409`-equivalent conflict (a job already
    /// running for this ticker) surfaces as `BACKTEST_UPSTREAM`.
    #[tool(
        name = "backtest_generate",
        annotations(destructive_hint = false, idempotent_hint = false, open_world_hint = true)
    )]
    async fn backtest_generate(
        &self,
        Parameters(params): rmcp::handler::server::tool::Parameters<BacktestGenerateParams>,
    ) -> Result<Json<GenerateResponse>, String> {
        params.validate().map_err(|e| format!("Validation error: {e}"))?;
        self.orchestrator
            .backtest_manager()
            .generate(&params.ticker, &params.backtest_dates_ts)
            .await
            .map(Json)
            .map_err(|e| e.to_string())
    }

    /// Poll the external job service for a previously submitted backtest
    /// generation job's status.
    #[tool(name = "backtest_check", annotations(read_only_hint = true, open_world_hint = true))]
    async fn backtest_check(
        &self,
        Parameters(params): rmcp::handler::server::tool::Parameters<BacktestCheckParams>,
    ) -> Result<Json<CheckResponse>, String> {
        params.validate().map_err(|e| format!("Validation error: {e}"))?;
        self.orchestrator
            .backtest_manager()
            .check(&params.job_id)
            .await
            .map(Json)
            .map_err(|e| e.to_string())
    }
}

#[tool_handler]
impl ServerHandler for AdvisorServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "itapia-runtime-mcp".into(),
                title: Some("Stock Analysis Orchestration & Advisory Runtime".into()),
                version: "0.1.0".into(),
                description: Some(
                    "Fans out technical, forecasting, and news analysis for a ticker, then \
                     evaluates a population of rule trees against the result to produce a \
                     ranked buy/sell/hold advisory."
                        .into(),
                ),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Stock-analysis orchestration and advisory runtime. \
                \n\nRecommended workflow:\
                \n1. full_analysis({ ticker, profile?, scope? }) — technical indicators, \
                ML forecasting with SHAP attribution, and news NLP for a ticker. Returns \
                503 SERVICE_NOT_READY until the server's warm-up pass completes, and \
                404 NO_DATA for an unrecognized ticker.\
                \n   Use technical_analysis/forecasting_analysis/news_analysis for just one \
                section, or explain_analysis for a human-readable summary.\
                \n2. full_advisor({ ticker, user_id, weights? }) — evaluates every READY rule \
                of each purpose (DECISION_SIGNAL, RISK_LEVEL, OPPORTUNITY_RATING) against the \
                ticker's analysis, aggregates, and maps to a labeled recommendation. \
                Use explain_advisor for a human-readable summary.\
                \n3. list_rules({ purpose? }), explain_rule({ rule_id }), and \
                list_rule_nodes({ node_type?, purpose? }) — browse the rule population and the \
                registered node catalog those rules are built from.\
                \n4. backtest_generate({ ticker, backtest_dates_ts }) and \
                backtest_check({ job_id }) — drive the external historical-report job service \
                directly for ad-hoc evaluation dates."
                    .into(),
            ),
        }
    }
}
