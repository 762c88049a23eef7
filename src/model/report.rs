//! The canonical structured output of the three analysis modules for a given
//! ticker and as-of time, plus the pre-serialization non-finite-float sweep.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Uptrend,
    Downtrend,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Weak,
    Moderate,
    Strong,
    Undefined,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TrendView {
    pub direction: Direction,
    pub strength: Strength,
    pub evidence: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Trend {
    pub short: TrendView,
    pub mid: TrendView,
    pub long: TrendView,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SrLevel {
    pub level: f64,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SrLevels {
    /// Descending order.
    pub supports: Vec<SrLevel>,
    /// Ascending order.
    pub resistances: Vec<SrLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum PatternType {
    Candlestick,
    Chart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum PatternSentiment {
    Bullish,
    Bearish,
    Neutral,
    Varies,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PatternReport {
    pub name: String,
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub sentiment: PatternSentiment,
    pub score: f64,
    pub evidence: serde_json::Map<String, Value>,
    pub evidence_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TechnicalSubReport {
    pub key_indicators: serde_json::Map<String, Value>,
    pub trend: Trend,
    pub sr_levels: SrLevels,
    pub patterns: Vec<PatternReport>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TechnicalReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<TechnicalSubReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intraday: Option<TechnicalSubReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskMetadata {
    TripleBarrier {
        horizon: u32,
        tp_pct: f64,
        sl_pct: f64,
    },
    NDayDistribution {
        horizon: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ForecastUnits {
    Percent,
    Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TopFeature {
    pub feature: String,
    pub value: f64,
    pub contribution: f64,
    pub effect: Effect,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ShapExplanation {
    pub target_name: String,
    pub base_value: f64,
    pub prediction_outcome: f64,
    pub top_features: Vec<TopFeature>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SingleTaskForecastReport {
    pub task_id: String,
    pub task_metadata: TaskMetadata,
    pub prediction: Vec<f64>,
    pub units: ForecastUnits,
    pub evidence: Vec<ShapExplanation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NewsSentiment {
    pub label: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NamedEntity {
    pub group: String,
    pub word: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NewsNer {
    pub entities: Vec<NamedEntity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Moderate,
    High,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NewsImpact {
    pub level: ImpactLevel,
    pub matched_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KeywordEvidence {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NewsArticleReport {
    pub sentiment: NewsSentiment,
    pub ner: NewsNer,
    pub impact: NewsImpact,
    pub keyword_evidence: KeywordEvidence,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NewsSummary {
    pub overall_sentiment_score: f64,
    pub article_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NewsReport {
    pub articles: Vec<NewsArticleReport>,
    pub summary: NewsSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisReport {
    pub ticker: String,
    pub generated_at: DateTime<Utc>,
    pub generated_ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical: Option<TechnicalReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecasting: Option<Vec<SingleTaskForecastReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub news: Option<NewsReport>,
}

impl AnalysisReport {
    #[must_use]
    pub fn new(ticker: String) -> Self {
        let now = Utc::now();
        Self {
            ticker,
            generated_at: now,
            generated_ts: now.timestamp(),
            technical: None,
            forecasting: None,
            news: None,
        }
    }

    /// Serialize, then recursively replace every non-finite float
    /// (`NaN`/`+inf`/`-inf`) with `null` so the wire format never carries a
    /// value `serde_json` can't round-trip through standard JSON.
    #[must_use]
    pub fn to_sanitized_json(&self) -> Value {
        let value = serde_json::to_value(self).expect("AnalysisReport always serializes");
        sanitize_non_finite(value)
    }
}

#[must_use]
pub fn sanitize_non_finite(value: Value) -> Value {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.is_finite() {
                    Value::Number(n)
                } else {
                    Value::Null
                }
            } else {
                Value::Number(n)
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_non_finite).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_non_finite(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // `serde_json::Value::from(f64)` already maps non-finite floats to `Null`
    // at construction time (`Number::from_f64` rejects them), so a
    // `Value::Number` in practice can never hold NaN or +/-Infinity. The
    // `Value::Number` branch below is defense in depth for that invariant
    // rather than a reachable path through this crate's own JSON — exercised
    // here via the same `From<f64>` conversion the rest of the crate uses.
    #[test]
    fn sanitize_replaces_nan_and_infinities_with_null() {
        assert_eq!(sanitize_non_finite(Value::from(f64::NAN)), Value::Null);
        assert_eq!(sanitize_non_finite(Value::from(f64::INFINITY)), Value::Null);
        assert_eq!(sanitize_non_finite(Value::from(f64::NEG_INFINITY)), Value::Null);
    }

    #[test]
    fn sanitize_preserves_finite_values_unchanged() {
        let value = json!({"ticker": "ABC", "price": 123.45, "list": [1, 2, 3]});
        let sanitized = sanitize_non_finite(value.clone());
        assert_eq!(sanitized, value);
    }
}
