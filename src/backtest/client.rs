//! HTTP client for the external backtest job service: submit a generate
//! request, poll for completion. All transport/protocol errors surface as
//! `BACKTEST_UPSTREAM`.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::RuntimeError;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    ticker: &'a str,
    timestamps: &'a [i64],
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GenerateResponse {
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CheckResponse {
    pub job_id: String,
    pub status: JobStatus,
}

pub struct BacktestClient {
    http: Client,
    base_url: String,
}

impl BacktestClient {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        let http = Client::builder()
            .connect_timeout(CALL_TIMEOUT)
            .timeout(CALL_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");
        Self { http, base_url }
    }

    /// Submits a generate job for `ticker` at `timestamps`. A `409` upstream
    /// status (a job already running for this ticker) is surfaced as
    /// `BacktestUpstream` with the conflict noted in the message.
    pub async fn generate(&self, ticker: &str, timestamps: &[i64]) -> Result<GenerateResponse, RuntimeError> {
        let url = format!("{}/backtest/generate", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&GenerateRequest { ticker, timestamps })
            .send()
            .await
            .map_err(|e| RuntimeError::BacktestUpstream(e.to_string()))?;

        if response.status() == StatusCode::CONFLICT {
            return Err(RuntimeError::BacktestUpstream(format!("job already running for {ticker}")));
        }
        if !response.status().is_success() {
            return Err(RuntimeError::BacktestUpstream(format!("generate returned {}", response.status())));
        }
        response
            .json()
            .await
            .map_err(|e| RuntimeError::BacktestUpstream(e.to_string()))
    }

    pub async fn check(&self, job_id: &str) -> Result<CheckResponse, RuntimeError> {
        let url = format!("{}/backtest/check/{job_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RuntimeError::BacktestUpstream(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RuntimeError::BacktestUpstream(format!("check returned {}", response.status())));
        }
        response
            .json()
            .await
            .map_err(|e| RuntimeError::BacktestUpstream(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_round_trips_through_upper_case_json() {
        let parsed: JobStatus = serde_json::from_str("\"COMPLETED\"").unwrap();
        assert_eq!(parsed, JobStatus::Completed);
    }
}
