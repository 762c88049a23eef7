//! Closed error taxonomy for the orchestration/advisory runtime.
//!
//! Every public operation in `orchestrator`, `rules`, `cache`, and `backtest`
//! returns `Result<_, RuntimeError>`. Internal plumbing (artifact I/O, HTTP
//! clients, data loading) uses `anyhow` and is translated to a `RuntimeError`
//! variant at the module boundary that knows which kind applies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("no data for ticker")]
    NoData,

    #[error("Service is not ready")]
    ServiceNotReady,

    #[error("{0} module failed.")]
    MissingReport(String),

    #[error("invalid variable path: {0}")]
    BadVarPath(String),

    #[error("no snapshot available for the requested timestamp")]
    NoSnapshot,

    #[error("no such rule: {0}")]
    RuleNotFound(String),

    #[error("backtest upstream error: {0}")]
    BacktestUpstream(String),

    #[error("preload failed for {module}: {elements:?}")]
    PreloadFailed {
        module: String,
        elements: Vec<String>,
    },

    #[error(transparent)]
    Validation(#[from] garde::Report),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RuntimeError {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoData => "NO_DATA",
            Self::ServiceNotReady => "SERVICE_NOT_READY",
            Self::MissingReport(_) => "MISSING_REPORT",
            Self::BadVarPath(_) => "BAD_VAR_PATH",
            Self::NoSnapshot => "NO_SNAPSHOT",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::BacktestUpstream(_) => "BACKTEST_UPSTREAM",
            Self::PreloadFailed { .. } => "PRELOAD_FAILED",
            Self::Validation(_) => "VALIDATION",
            Self::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NoData => StatusCode::NOT_FOUND,
            Self::ServiceNotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::MissingReport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadVarPath(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoSnapshot => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RuleNotFound(_) => StatusCode::NOT_FOUND,
            Self::BacktestUpstream(_) => StatusCode::BAD_GATEWAY,
            Self::PreloadFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

impl IntoResponse for RuntimeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.kind(),
            detail: self.to_string(),
        };
        tracing::warn!(kind = body.error, detail = %body.detail, "request failed");
        (status, axum::Json(body)).into_response()
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
