//! `AdvisorReport`: the per-(ticker, user) output of `full_advisor`, carrying
//! one `FinalRecommendation` per semantic purpose.

use schemars::JsonSchema;
use serde::Serialize;

use crate::rules::types::Purpose;

/// One rule's contribution to a purpose's aggregate, surfaced so a caller can
/// see which rules drove the final number.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TriggeredRule {
    pub rule_id: String,
    pub name: String,
    pub raw_score: f64,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct FinalRecommendation {
    pub purpose: &'static str,
    pub final_score: f64,
    pub label: String,
    pub recommendation: String,
    pub triggered_rules: Vec<TriggeredRule>,
}

impl FinalRecommendation {
    #[must_use]
    pub fn new(
        purpose: Purpose,
        final_score: f64,
        label: String,
        recommendation: String,
        triggered_rules: Vec<TriggeredRule>,
    ) -> Self {
        Self {
            purpose: purpose.as_semantic_type().as_str(),
            final_score,
            label,
            recommendation,
            triggered_rules,
        }
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AdvisorReport {
    pub ticker: String,
    pub user_id: String,
    pub decision: FinalRecommendation,
    pub risk: FinalRecommendation,
    pub opportunity: FinalRecommendation,
}
