//! Per-user profile: the external collaborator the orchestrator consults to
//! pick an analysis horizon, a rule-selection predicate, and meta-synthesis
//! weights. §9 models this as a trait with an in-memory default backing
//! local/dev use and tests — no real user-management system is in scope.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::rules::rule::Rule;
use crate::rules::types::Purpose;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileHorizon {
    Short,
    Medium,
    Long,
}

impl ProfileHorizon {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }
}

/// A user's advisory preferences: the default analysis horizon and the
/// meta-synthesis weights `full_advisor` applies to the three purposes.
/// Defaults are `1.0` per §4.5 when a profile doesn't override a weight.
#[derive(Debug, Clone)]
pub struct Profile {
    pub user_id: String,
    pub horizon: ProfileHorizon,
    pub meta_weights: HashMap<Purpose, f64>,
    /// Rule ids this user has opted out of; an empty set selects every
    /// registered rule for the purpose being evaluated.
    pub excluded_rule_ids: Vec<String>,
}

impl Profile {
    #[must_use]
    pub fn default_for(user_id: &str) -> Self {
        let mut meta_weights = HashMap::new();
        meta_weights.insert(Purpose::DecisionSignal, 1.0);
        meta_weights.insert(Purpose::RiskLevel, 1.0);
        meta_weights.insert(Purpose::OpportunityRating, 1.0);
        Self {
            user_id: user_id.to_string(),
            horizon: ProfileHorizon::Medium,
            meta_weights,
            excluded_rule_ids: Vec::new(),
        }
    }

    #[must_use]
    pub fn meta_weight(&self, purpose: Purpose) -> f64 {
        self.meta_weights.get(&purpose).copied().unwrap_or(1.0)
    }

    /// The predicate `get_rule_selector` hands to the orchestrator: a rule is
    /// selected for this profile iff it matches `purpose` and isn't
    /// explicitly excluded.
    #[must_use]
    pub fn selects(&self, rule: &Rule, purpose: Purpose) -> bool {
        rule.purpose == purpose && !self.excluded_rule_ids.contains(&rule.rule_id)
    }
}

/// External collaborator interface: `get_profile`, implicit rule selector via
/// `Profile::selects`, and `get_meta_weights` via `Profile::meta_weight`.
pub trait ProfileStore: Send + Sync {
    fn get_profile(&self, user_id: &str) -> Profile;
}

/// In-memory default: known users get whatever was registered via
/// `upsert`; unknown users fall back to `Profile::default_for`. Backs
/// local/dev use and the test suite.
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: DashMap<String, Profile>,
}

impl InMemoryProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, profile: Profile) {
        self.profiles.insert(profile.user_id.clone(), profile);
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn get_profile(&self, user_id: &str) -> Profile {
        self.profiles
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| Profile::default_for(user_id))
    }
}

pub type SharedProfileStore = Arc<dyn ProfileStore>;
