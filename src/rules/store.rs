//! A populated collection of `Rule` instances, grouped by purpose. The
//! registry (`registry.rs`) only knows node *kinds*; this is where actual
//! rule trees live, the thing `GET /v1/rules` and the advisor enumerate.

use std::sync::Arc;

use dashmap::DashMap;

use super::registry::create_node;
use super::rule::{Rule, RuleStatus};
use super::types::Purpose;

pub trait RuleStore: Send + Sync {
    fn by_purpose(&self, purpose: Purpose) -> Vec<Arc<Rule>>;
    fn get(&self, rule_id: &str) -> Option<Arc<Rule>>;
    fn all(&self) -> Vec<Arc<Rule>>;
}

/// In-memory rule population, seeded once at construction with a small set
/// of hand-authored trees per purpose built from the registered node
/// catalog. A rule-evolution subsystem that mutates this set at runtime is
/// out of scope; this store's population is static after `new`.
pub struct InMemoryRuleStore {
    rules: DashMap<String, Arc<Rule>>,
}

impl InMemoryRuleStore {
    #[must_use]
    pub fn new() -> Self {
        let rules = DashMap::new();
        for rule in seed_rules() {
            rules.insert(rule.rule_id.clone(), Arc::new(rule));
        }
        Self { rules }
    }
}

impl Default for InMemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleStore for InMemoryRuleStore {
    fn by_purpose(&self, purpose: Purpose) -> Vec<Arc<Rule>> {
        self.rules
            .iter()
            .filter(|entry| entry.value().purpose == purpose)
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn get(&self, rule_id: &str) -> Option<Arc<Rule>> {
        self.rules.get(rule_id).map(|entry| entry.value().clone())
    }

    fn all(&self) -> Vec<Arc<Rule>> {
        self.rules.iter().map(|entry| entry.value().clone()).collect()
    }
}

pub type SharedRuleStore = Arc<dyn RuleStore>;

fn momentum_branch() -> Box<dyn super::nodes::TreeNode> {
    let rsi = create_node("VAR_RSI_14", None, vec![]).expect("VAR_RSI_14 is registered");
    let trend = create_node("VAR_TREND_DIRECTION_SHORT", None, vec![]).expect("VAR_TREND_DIRECTION_SHORT is registered");
    let combined = create_node("ADD2", None, vec![rsi, trend]).expect("ADD2 accepts two numeric children");
    create_node("CLAMP_UNIT", None, vec![combined]).expect("CLAMP_UNIT accepts one numeric child")
}

fn forecast_branch() -> Box<dyn super::nodes::TreeNode> {
    let up_prob = create_node("VAR_FORECAST_UP_PROB", None, vec![]).expect("VAR_FORECAST_UP_PROB is registered");
    let centered = create_node(
        "SUB2",
        None,
        vec![up_prob, create_node("CONST_0_5", None, vec![]).unwrap()],
    )
    .expect("SUB2 accepts two numeric children");
    create_node("CLAMP_UNIT", None, vec![centered]).expect("CLAMP_UNIT accepts one numeric child")
}

fn sentiment_branch() -> Box<dyn super::nodes::TreeNode> {
    create_node("VAR_NEWS_SENTIMENT", None, vec![]).expect("VAR_NEWS_SENTIMENT is registered")
}

/// `IF_POS(cond, then, else)` has return type `ANY`, which is compatible
/// with every purpose's semantic type -- a convenient way to build rule
/// roots without a dedicated per-purpose constant node.
fn gate(cond: Box<dyn super::nodes::TreeNode>, then: Box<dyn super::nodes::TreeNode>, otherwise: Box<dyn super::nodes::TreeNode>) -> Box<dyn super::nodes::TreeNode> {
    create_node("IF_POS", None, vec![cond, then, otherwise]).expect("IF_POS accepts (numeric, any, any)")
}

fn seed_rules() -> Vec<Rule> {
    let mut rules = Vec::new();

    rules.push(
        Rule::new(
            "Momentum confirms trend".to_string(),
            "Buys into momentum that agrees with the short-term trend direction".to_string(),
            RuleStatus::Ready,
            Purpose::DecisionSignal,
            gate(momentum_branch(), forecast_branch(), sentiment_branch()),
        )
        .expect("well-typed seed rule"),
    );

    rules.push(
        Rule::new(
            "Forecast-led signal".to_string(),
            "Weights the upper-barrier forecast probability as the primary decision driver".to_string(),
            RuleStatus::Ready,
            Purpose::DecisionSignal,
            forecast_branch(),
        )
        .expect("well-typed seed rule"),
    );

    rules.push(
        Rule::new(
            "Volatility risk floor".to_string(),
            "Flags elevated risk when momentum swings far from neutral".to_string(),
            RuleStatus::Ready,
            Purpose::RiskLevel,
            {
                let rsi = create_node("VAR_RSI_14", None, vec![]).unwrap();
                let abs_like = create_node("MUL2", None, vec![rsi, create_node("CONST_1", None, vec![]).unwrap()]).unwrap();
                create_node("CLAMP_UNIT", None, vec![abs_like]).unwrap()
            },
        )
        .expect("well-typed seed rule"),
    );

    rules.push(
        Rule::new(
            "Sentiment-weighted opportunity".to_string(),
            "Rates opportunity higher when news sentiment and forecast both favor upside".to_string(),
            RuleStatus::Ready,
            Purpose::OpportunityRating,
            gate(sentiment_branch(), forecast_branch(), momentum_branch()),
        )
        .expect("well-typed seed rule"),
    );

    rules.push(
        Rule::new(
            "Deprecated legacy signal".to_string(),
            "Retained for historical lookups; always scores neutral".to_string(),
            RuleStatus::Deprecated,
            Purpose::DecisionSignal,
            momentum_branch(),
        )
        .expect("well-typed seed rule"),
    );

    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_seeds_rules_for_every_purpose() {
        let store = InMemoryRuleStore::new();
        assert!(!store.by_purpose(Purpose::DecisionSignal).is_empty());
        assert!(!store.by_purpose(Purpose::RiskLevel).is_empty());
        assert!(!store.by_purpose(Purpose::OpportunityRating).is_empty());
    }

    #[test]
    fn get_resolves_a_known_rule_id() {
        let store = InMemoryRuleStore::new();
        let any_rule = store.all().first().unwrap().clone();
        let fetched = store.get(&any_rule.rule_id).unwrap();
        assert_eq!(fetched.rule_id, any_rule.rule_id);
    }

    #[test]
    fn deprecated_seed_rule_executes_to_zero() {
        let store = InMemoryRuleStore::new();
        let deprecated = store
            .all()
            .into_iter()
            .find(|r| r.name == "Deprecated legacy signal")
            .unwrap();
        assert_eq!(deprecated.execute(&serde_json::Value::Null), 0.0);
    }
}
