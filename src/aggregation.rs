//! Aggregation & Mapping: turns the raw scores a purpose's rule set produces
//! into one final number via a per-purpose law, combines the three purposes'
//! aggregates via a weighted meta-synthesis, and maps the result to a
//! human-readable label/recommendation via a pluggable threshold table.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::model::advisor::{AdvisorReport, FinalRecommendation, TriggeredRule};
use crate::model::profile::Profile;
use crate::rules::{Purpose, Rule};

/// One rule's raw score, kept alongside its identity for `TriggeredRule`
/// reporting.
pub struct ScoredRule<'a> {
    pub rule: &'a Rule,
    pub raw_score: f64,
}

/// `DECISION_SIGNAL` aggregates by mean (`[-1, 1]`, `0.0` if empty);
/// `RISK_LEVEL` by max and `OPPORTUNITY_RATING` by min (both `[0, 1]`).
#[must_use]
pub fn aggregate(purpose: Purpose, scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    match purpose {
        Purpose::DecisionSignal => scores.iter().sum::<f64>() / scores.len() as f64,
        Purpose::RiskLevel => scores.iter().copied().fold(f64::MIN, f64::max),
        Purpose::OpportunityRating => scores.iter().copied().fold(f64::MAX, f64::min),
    }
}

/// Weighted combination of the three purposes' aggregates into the three
/// published final scores. Risk and opportunity pass through unchanged;
/// decision folds in all three weighted, then clamps to `[-1, 1]`.
#[must_use]
pub fn synthesize(agg_decision: f64, agg_risk: f64, agg_opportunity: f64, weights: &HashMap<Purpose, f64>) -> (f64, f64, f64) {
    let w = |p: Purpose| weights.get(&p).copied().unwrap_or(1.0);
    let final_decision = (agg_decision * w(Purpose::DecisionSignal) - agg_risk * w(Purpose::RiskLevel)
        + agg_opportunity * w(Purpose::OpportunityRating))
    .clamp(-1.0, 1.0);
    (final_decision, agg_risk, agg_opportunity)
}

/// A single label/recommendation threshold, inclusive lower bound, applied
/// in descending order of `min_value`.
#[derive(Debug, Clone, Deserialize)]
pub struct Threshold {
    pub min_value: f64,
    pub label: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationTable {
    pub decision: Vec<Threshold>,
    pub risk: Vec<Threshold>,
    pub opportunity: Vec<Threshold>,
}

impl RecommendationTable {
    #[must_use]
    pub fn default_table() -> Self {
        Self {
            decision: vec![
                Threshold { min_value: 0.6, label: "STRONG_BUY".into(), recommendation: "Consider a strong buy position.".into() },
                Threshold { min_value: 0.2, label: "BUY".into(), recommendation: "Consider buying.".into() },
                Threshold { min_value: -0.2, label: "HOLD".into(), recommendation: "Hold current position.".into() },
                Threshold { min_value: -0.6, label: "SELL".into(), recommendation: "Consider selling.".into() },
                Threshold { min_value: f64::MIN, label: "STRONG_SELL".into(), recommendation: "Consider a strong sell position.".into() },
            ],
            risk: vec![
                Threshold { min_value: 0.66, label: "HIGH".into(), recommendation: "Size positions conservatively.".into() },
                Threshold { min_value: 0.33, label: "MODERATE".into(), recommendation: "Monitor position sizing.".into() },
                Threshold { min_value: f64::MIN, label: "LOW".into(), recommendation: "Risk appears contained.".into() },
            ],
            opportunity: vec![
                Threshold { min_value: 0.66, label: "HIGH".into(), recommendation: "Favorable setup.".into() },
                Threshold { min_value: 0.33, label: "MODERATE".into(), recommendation: "Mixed setup.".into() },
                Threshold { min_value: f64::MIN, label: "LOW".into(), recommendation: "Unfavorable setup.".into() },
            ],
        }
    }

    /// Loads a table from a TOML file, falling back to `default_table()` when
    /// the path is absent or unreadable -- a missing override is not an
    /// error, it's the normal "no config supplied" case.
    #[must_use]
    pub fn load_from_path(path: Option<&str>) -> Self {
        let Some(path) = path else { return Self::default_table() };
        match std::fs::read_to_string(path).ok().and_then(|raw| toml::from_str(&raw).ok()) {
            Some(table) => table,
            None => {
                tracing::warn!(path, "recommendation table unreadable, using in-code default");
                Self::default_table()
            }
        }
    }

    fn map(thresholds: &[Threshold], value: f64) -> (String, String) {
        thresholds
            .iter()
            .filter(|t| value >= t.min_value)
            .max_by(|a, b| a.min_value.partial_cmp(&b.min_value).unwrap())
            .map(|t| (t.label.clone(), t.recommendation.clone()))
            .unwrap_or_else(|| ("HOLD".to_string(), "No mapping matched; defaulting to hold.".to_string()))
    }

    #[must_use]
    pub fn map_decision(&self, value: f64) -> (String, String) {
        Self::map(&self.decision, value)
    }

    #[must_use]
    pub fn map_risk(&self, value: f64) -> (String, String) {
        Self::map(&self.risk, value)
    }

    #[must_use]
    pub fn map_opportunity(&self, value: f64) -> (String, String) {
        Self::map(&self.opportunity, value)
    }
}

/// Evaluates every `profile`-selected rule of `purpose` against `report`.
#[must_use]
pub fn evaluate_rules<'a>(rules: &'a [std::sync::Arc<Rule>], purpose: Purpose, profile: &Profile, report: &Value) -> Vec<ScoredRule<'a>> {
    rules
        .iter()
        .map(std::sync::Arc::as_ref)
        .filter(|rule| rule.purpose == purpose && profile.selects(rule, purpose))
        .map(|rule| ScoredRule {
            rule,
            raw_score: rule.execute(report),
        })
        .collect()
}

fn triggered(scored: &[ScoredRule<'_>]) -> Vec<TriggeredRule> {
    scored
        .iter()
        .map(|s| TriggeredRule {
            rule_id: s.rule.rule_id.clone(),
            name: s.rule.name.clone(),
            raw_score: s.raw_score,
        })
        .collect()
}

/// Full pipeline: aggregate each purpose's scored rules, meta-synthesize,
/// map to labels, and assemble an `AdvisorReport`.
#[must_use]
pub fn build_advisor_report(
    ticker: &str,
    user_id: &str,
    decision_scored: &[ScoredRule<'_>],
    risk_scored: &[ScoredRule<'_>],
    opportunity_scored: &[ScoredRule<'_>],
    weights: &HashMap<Purpose, f64>,
    table: &RecommendationTable,
) -> AdvisorReport {
    let agg_decision = aggregate(Purpose::DecisionSignal, &decision_scored.iter().map(|s| s.raw_score).collect::<Vec<_>>());
    let agg_risk = aggregate(Purpose::RiskLevel, &risk_scored.iter().map(|s| s.raw_score).collect::<Vec<_>>());
    let agg_opportunity = aggregate(Purpose::OpportunityRating, &opportunity_scored.iter().map(|s| s.raw_score).collect::<Vec<_>>());

    let (final_decision, final_risk, final_opportunity) = synthesize(agg_decision, agg_risk, agg_opportunity, weights);

    let (decision_label, decision_rec) = table.map_decision(final_decision);
    let (risk_label, risk_rec) = table.map_risk(final_risk);
    let (opportunity_label, opportunity_rec) = table.map_opportunity(final_opportunity);

    AdvisorReport {
        ticker: ticker.to_string(),
        user_id: user_id.to_string(),
        decision: FinalRecommendation::new(Purpose::DecisionSignal, final_decision, decision_label, decision_rec, triggered(decision_scored)),
        risk: FinalRecommendation::new(Purpose::RiskLevel, final_risk, risk_label, risk_rec, triggered(risk_scored)),
        opportunity: FinalRecommendation::new(Purpose::OpportunityRating, final_opportunity, opportunity_label, opportunity_rec, triggered(opportunity_scored)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_signal_aggregates_by_mean_within_bounds() {
        let scores = vec![-0.5, 0.0, 1.0];
        let agg = aggregate(Purpose::DecisionSignal, &scores);
        assert!((agg - (0.5 / 3.0)).abs() < 1e-9);
        assert!(agg >= -0.5 && agg <= 1.0);
    }

    #[test]
    fn risk_level_aggregates_by_max() {
        let scores = vec![0.1, 0.9, 0.4];
        assert_eq!(aggregate(Purpose::RiskLevel, &scores), 0.9);
    }

    #[test]
    fn opportunity_rating_aggregates_by_min() {
        let scores = vec![0.1, 0.9, 0.4];
        assert_eq!(aggregate(Purpose::OpportunityRating, &scores), 0.1);
    }

    #[test]
    fn empty_scores_coerce_to_zero() {
        assert_eq!(aggregate(Purpose::DecisionSignal, &[]), 0.0);
        assert_eq!(aggregate(Purpose::RiskLevel, &[]), 0.0);
    }

    #[test]
    fn synthesize_clamps_final_decision_to_unit_range() {
        let mut weights = HashMap::new();
        weights.insert(Purpose::DecisionSignal, 5.0);
        let (decision, _, _) = synthesize(1.0, 0.0, 0.0, &weights);
        assert_eq!(decision, 1.0);
    }

    #[test]
    fn default_table_maps_extremes_to_strong_labels() {
        let table = RecommendationTable::default_table();
        assert_eq!(table.map_decision(0.9).0, "STRONG_BUY");
        assert_eq!(table.map_decision(-0.9).0, "STRONG_SELL");
        assert_eq!(table.map_decision(0.0).0, "HOLD");
    }

    #[test]
    fn load_from_path_falls_back_to_default_when_path_is_none() {
        let table = RecommendationTable::load_from_path(None);
        assert_eq!(table.map_risk(0.9).0, "HIGH");
    }
}
