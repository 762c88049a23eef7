//! Environment-driven configuration, following `CachedStore::from_env`'s
//! pattern of typed env lookups with documented defaults.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::rules::types::SemanticType;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Max backtest contexts simultaneously in PREPARING/POLLING. Default 3.
    pub parallel_concurrency_limit: usize,
    /// Interval between `check(job_id)` polls. Default 45s.
    pub polling_interval: Duration,
    /// Hard wall-clock cap on a single ticker's poll loop. Default 30 min.
    pub polling_deadline: Duration,
    /// Point selector window start (inclusive).
    pub selector_start_date: NaiveDate,
    /// Point selector window end (inclusive).
    pub selector_end_date: NaiveDate,
    /// Calendar day-of-month used to pick the monthly anchor point.
    pub monthly_day: u32,
    /// Max number of "significant" (non-monthly) points per ticker.
    pub max_special_points: usize,
    /// Backtest job-service base URL.
    pub backtest_service_base_url: String,
    /// Per-rule-evaluation concurrency across tickers. Default 4.
    pub rule_eval_concurrency: usize,
    /// Default meta-synthesis weights, overridable per user profile.
    pub default_meta_weights: HashMap<SemanticType, f64>,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self> {
        let parallel_concurrency_limit = env_usize("PARALLEL_CONCURRENCY_LIMIT", 3)?;
        let polling_interval_secs = env_u64("POLLING_INTERVAL_SECONDS", 45)?;
        let polling_deadline_secs = env_u64("POLLING_DEADLINE_SECONDS", 30 * 60)?;
        let selector_start_date = env_date("SELECTOR_START_DATE", "2018-01-01")?;
        let selector_end_date = env_date("SELECTOR_END_DATE", "2024-12-31")?;
        let monthly_day = env_usize("MONTHLY_DAY", 1)? as u32;
        let max_special_points = env_usize("MAX_SPECIAL_POINTS", 10)?;
        let backtest_service_base_url = std::env::var("BACKTEST_SERVICE_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8088".to_string());
        let rule_eval_concurrency = env_usize("RULE_EVAL_CONCURRENCY", 4)?;

        let mut default_meta_weights = HashMap::new();
        default_meta_weights.insert(SemanticType::DecisionSignal, 1.0);
        default_meta_weights.insert(SemanticType::RiskLevel, 1.0);
        default_meta_weights.insert(SemanticType::OpportunityRating, 1.0);

        Ok(Self {
            parallel_concurrency_limit,
            polling_interval: Duration::from_secs(polling_interval_secs),
            polling_deadline: Duration::from_secs(polling_deadline_secs),
            selector_start_date,
            selector_end_date,
            monthly_day,
            max_special_points,
            backtest_service_base_url,
            rule_eval_concurrency,
            default_meta_weights,
        })
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize> {
    match std::env::var(key) {
        Ok(val) => val
            .parse()
            .with_context(|| format!("{key} must be a non-negative integer, got {val:?}")),
        Err(_) => Ok(default),
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(val) => val
            .parse()
            .with_context(|| format!("{key} must be a non-negative integer, got {val:?}")),
        Err(_) => Ok(default),
    }
}

fn env_date(key: &str, default: &str) -> Result<NaiveDate> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .with_context(|| format!("{key} must be YYYY-MM-DD, got {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_usize_falls_back_to_default_when_unset() {
        std::env::remove_var("TEST_USIZE_KNOB_XYZ");
        assert_eq!(env_usize("TEST_USIZE_KNOB_XYZ", 7).unwrap(), 7);
    }

    #[test]
    fn env_date_rejects_malformed_value() {
        std::env::set_var("TEST_DATE_KNOB_XYZ", "not-a-date");
        assert!(env_date("TEST_DATE_KNOB_XYZ", "2020-01-01").is_err());
        std::env::remove_var("TEST_DATE_KNOB_XYZ");
    }
}
