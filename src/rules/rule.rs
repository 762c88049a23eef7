//! A named, status-bearing expression tree that evaluates to a float in a
//! well-defined range per purpose.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};
use uuid::Uuid;

use super::nodes::TreeNode;
use super::parser::{parse_tree, serialize_tree, SerializedNode};
use super::types::{Purpose, SemanticType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleStatus {
    Ready,
    Evolving,
    Deprecated,
}

pub struct Rule {
    pub rule_id: String,
    pub name: String,
    pub description: String,
    pub status: RuleStatus,
    pub purpose: Purpose,
    pub root: Box<dyn TreeNode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("rule_id", &self.rule_id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("purpose", &self.purpose)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RuleDto {
    rule_id: String,
    name: String,
    description: String,
    purpose: String,
    rule_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    root: SerializedNode,
}

impl Rule {
    /// Build a rule from a root node, cross-checking that `purpose` matches
    /// the root's declared return type (a mismatch is a construction error,
    /// never a silent coercion).
    pub fn new(
        name: String,
        description: String,
        status: RuleStatus,
        purpose: Purpose,
        root: Box<dyn TreeNode>,
    ) -> Result<Self> {
        Self::check_purpose(purpose, root.return_type())?;
        let now = Utc::now();
        Ok(Self {
            rule_id: Uuid::new_v4().to_string(),
            name,
            description,
            status,
            purpose,
            root,
            created_at: now,
            updated_at: now,
        })
    }

    fn check_purpose(purpose: Purpose, root_return_type: SemanticType) -> Result<()> {
        let expected = purpose.as_semantic_type();
        if !SemanticType::compatible(root_return_type, expected) {
            bail!(
                "rule purpose {} does not match root node return type {}",
                expected.as_str(),
                root_return_type.as_str()
            );
        }
        Ok(())
    }

    /// Returns `0.0` (neutral) for deprecated rules without evaluating the
    /// tree; otherwise the root's evaluation is the rule's raw score.
    #[must_use]
    pub fn execute(&self, report: &Value) -> f64 {
        if self.status == RuleStatus::Deprecated {
            return 0.0;
        }
        self.root.evaluate(report)
    }

    /// SHA-1 over the canonical serialization, used for deterministic
    /// auto-naming of evolved rules.
    #[must_use]
    pub fn hash(&self) -> String {
        let canonical = serde_json::to_string(&serialize_tree(self.root.as_ref()))
            .expect("serialized rule tree is always valid JSON");
        let mut hasher = Sha1::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    #[must_use]
    pub fn to_dict(&self) -> Value {
        let dto = RuleDto {
            rule_id: self.rule_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            purpose: self.purpose.as_semantic_type().as_str().to_string(),
            rule_status: status_str(self.status).to_string(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            root: serialize_tree(self.root.as_ref()),
        };
        serde_json::to_value(dto).expect("RuleDto always serializes")
    }

    pub fn from_dict(data: &Value) -> Result<Self> {
        let dto: RuleDto = serde_json::from_value(data.clone())?;
        let root = parse_tree(&dto.root)?;

        let purpose_type = SemanticType::parse(&dto.purpose)
            .ok_or_else(|| anyhow!("invalid purpose: {}", dto.purpose))?;
        let purpose = purpose_from_semantic_type(purpose_type)
            .ok_or_else(|| anyhow!("purpose {} is not a valid rule purpose", dto.purpose))?;
        Self::check_purpose(purpose, root.return_type())?;

        let status = parse_status(&dto.rule_status)
            .ok_or_else(|| anyhow!("invalid rule status: {}", dto.rule_status))?;

        Ok(Self {
            rule_id: dto.rule_id,
            name: dto.name,
            description: dto.description,
            status,
            purpose,
            root,
            created_at: dto.created_at,
            updated_at: dto.updated_at,
        })
    }
}

fn status_str(status: RuleStatus) -> &'static str {
    match status {
        RuleStatus::Ready => "READY",
        RuleStatus::Evolving => "EVOLVING",
        RuleStatus::Deprecated => "DEPRECATED",
    }
}

fn parse_status(s: &str) -> Option<RuleStatus> {
    match s {
        "READY" => Some(RuleStatus::Ready),
        "EVOLVING" => Some(RuleStatus::Evolving),
        "DEPRECATED" => Some(RuleStatus::Deprecated),
        _ => None,
    }
}

fn purpose_from_semantic_type(t: SemanticType) -> Option<Purpose> {
    match t {
        SemanticType::DecisionSignal => Some(Purpose::DecisionSignal),
        SemanticType::RiskLevel => Some(Purpose::RiskLevel),
        SemanticType::OpportunityRating => Some(Purpose::OpportunityRating),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::registry::create_node;

    fn decision_tree() -> Box<dyn TreeNode> {
        let cond = create_node("CONST_0_5", None, vec![]).unwrap();
        let then_b = create_node("CONST_0_5", None, vec![]).unwrap();
        let else_b = create_node("CONST_NEG_1", None, vec![]).unwrap();
        create_node("IF_POS", None, vec![cond, then_b, else_b]).unwrap()
    }

    #[test]
    fn deprecated_rule_executes_to_zero() {
        let rule = Rule::new(
            "test".into(),
            "".into(),
            RuleStatus::Deprecated,
            Purpose::DecisionSignal,
            decision_tree(),
        )
        .unwrap();
        assert_eq!(rule.execute(&Value::Null), 0.0);
    }

    #[test]
    fn ready_rule_executes_root() {
        let rule = Rule::new(
            "test".into(),
            "".into(),
            RuleStatus::Ready,
            Purpose::DecisionSignal,
            decision_tree(),
        )
        .unwrap();
        assert_eq!(rule.execute(&Value::Null), 0.5);
    }

    #[test]
    fn hash_is_stable_across_calls_and_matches_serialization() {
        let rule = Rule::new(
            "test".into(),
            "".into(),
            RuleStatus::Ready,
            Purpose::DecisionSignal,
            decision_tree(),
        )
        .unwrap();
        let h1 = rule.hash();
        let h2 = rule.hash();
        assert_eq!(h1, h2);

        let canonical = serde_json::to_string(&serialize_tree(rule.root.as_ref())).unwrap();
        let mut hasher = Sha1::new();
        hasher.update(canonical.as_bytes());
        assert_eq!(h1, hex::encode(hasher.finalize()));
    }

    #[test]
    fn round_trip_through_dict_preserves_behavior() {
        let rule = Rule::new(
            "test".into(),
            "desc".into(),
            RuleStatus::Ready,
            Purpose::DecisionSignal,
            decision_tree(),
        )
        .unwrap();
        let dict = rule.to_dict();
        let rebuilt = Rule::from_dict(&dict).unwrap();
        assert_eq!(rebuilt.execute(&Value::Null), rule.execute(&Value::Null));
        assert_eq!(rebuilt.rule_id, rule.rule_id);
    }

    #[test]
    fn purpose_mismatch_with_root_return_type_is_rejected() {
        // root has return type ANY (from IF_POS) which is compatible with any
        // purpose; use a concrete, incompatible type instead.
        let boolean_leaf = create_node("CONST_0_5", None, vec![]).unwrap();
        let err = Rule::check_purpose(Purpose::RiskLevel, boolean_leaf.return_type());
        // CONST_0_5 has return type NUMERICAL, which is not compatible with
        // RISK_LEVEL (a disjoint concrete type).
        assert!(err.is_err());
    }
}
