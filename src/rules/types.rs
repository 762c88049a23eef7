//! Closed semantic type set governing well-typedness of rule trees.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum SemanticType {
    Numerical,
    Boolean,
    Price,
    Percentage,
    FinancialRatio,
    Momentum,
    Trend,
    Volatility,
    Volume,
    Sentiment,
    ForecastProb,
    DecisionSignal,
    RiskLevel,
    OpportunityRating,
    Any,
    AnyNumeric,
}

const ALL_CONCRETE: &[SemanticType] = &[
    SemanticType::Numerical,
    SemanticType::Boolean,
    SemanticType::Price,
    SemanticType::Percentage,
    SemanticType::FinancialRatio,
    SemanticType::Momentum,
    SemanticType::Trend,
    SemanticType::Volatility,
    SemanticType::Volume,
    SemanticType::Sentiment,
    SemanticType::ForecastProb,
    SemanticType::DecisionSignal,
    SemanticType::RiskLevel,
    SemanticType::OpportunityRating,
];

const NUMERIC_CONCRETE: &[SemanticType] = &[
    SemanticType::Numerical,
    SemanticType::Percentage,
    SemanticType::FinancialRatio,
    SemanticType::Momentum,
    SemanticType::Trend,
    SemanticType::Volatility,
    SemanticType::Volume,
    SemanticType::Sentiment,
    SemanticType::ForecastProb,
    SemanticType::Price,
];

impl SemanticType {
    /// The set of concrete subtypes an abstract type stands in for. Empty for
    /// concrete types.
    #[must_use]
    pub fn concretes(self) -> &'static [SemanticType] {
        match self {
            Self::Any => ALL_CONCRETE,
            Self::AnyNumeric => NUMERIC_CONCRETE,
            _ => &[],
        }
    }

    /// Covariant substitution compatibility: a child whose declared return
    /// type is `child` may fill an argument slot declared as `arg` iff they're
    /// equal, or one's concretes contains the other.
    #[must_use]
    pub fn compatible(child: Self, arg: Self) -> bool {
        child == arg || child.concretes().contains(&arg) || arg.concretes().contains(&child)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Numerical => "NUMERICAL",
            Self::Boolean => "BOOLEAN",
            Self::Price => "PRICE",
            Self::Percentage => "PERCENTAGE",
            Self::FinancialRatio => "FINANCIAL_RATIO",
            Self::Momentum => "MOMENTUM",
            Self::Trend => "TREND",
            Self::Volatility => "VOLATILITY",
            Self::Volume => "VOLUME",
            Self::Sentiment => "SENTIMENT",
            Self::ForecastProb => "FORECAST_PROB",
            Self::DecisionSignal => "DECISION_SIGNAL",
            Self::RiskLevel => "RISK_LEVEL",
            Self::OpportunityRating => "OPPORTUNITY_RATING",
            Self::Any => "ANY",
            Self::AnyNumeric => "ANY_NUMERIC",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "NUMERICAL" => Self::Numerical,
            "BOOLEAN" => Self::Boolean,
            "PRICE" => Self::Price,
            "PERCENTAGE" => Self::Percentage,
            "FINANCIAL_RATIO" => Self::FinancialRatio,
            "MOMENTUM" => Self::Momentum,
            "TREND" => Self::Trend,
            "VOLATILITY" => Self::Volatility,
            "VOLUME" => Self::Volume,
            "SENTIMENT" => Self::Sentiment,
            "FORECAST_PROB" => Self::ForecastProb,
            "DECISION_SIGNAL" => Self::DecisionSignal,
            "RISK_LEVEL" => Self::RiskLevel,
            "OPPORTUNITY_RATING" => Self::OpportunityRating,
            "ANY" => Self::Any,
            "ANY_NUMERIC" => Self::AnyNumeric,
            _ => return None,
        })
    }
}

/// One of the three purposes a `Rule` may serve; determines the aggregation
/// operator and output range in `aggregation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Purpose {
    DecisionSignal,
    RiskLevel,
    OpportunityRating,
}

impl Purpose {
    #[must_use]
    pub fn as_semantic_type(self) -> SemanticType {
        match self {
            Self::DecisionSignal => SemanticType::DecisionSignal,
            Self::RiskLevel => SemanticType::RiskLevel,
            Self::OpportunityRating => SemanticType::OpportunityRating,
        }
    }
}
