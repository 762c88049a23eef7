//! The four independent leaf analyzers the News NLP Coordinator fans an
//! article out to. Each is a pure function of the article text; a real
//! deployment would swap these for model-backed implementations behind the
//! same traits without touching the coordinator.

use crate::model::report::{ImpactLevel, KeywordEvidence, NamedEntity, NewsImpact, NewsNer, NewsSentiment};

const POSITIVE_WORDS: &[&str] = &[
    "beats", "rally", "surge", "upgrade", "strong", "growth", "record", "outperform", "bullish",
];
const NEGATIVE_WORDS: &[&str] = &[
    "downgrade", "miss", "plunge", "weak", "decline", "lawsuit", "recall", "bearish", "cuts",
];
const HIGH_IMPACT_WORDS: &[&str] = &["lawsuit", "recall", "bankruptcy", "investigation", "fraud"];
const MODERATE_IMPACT_WORDS: &[&str] = &["downgrade", "upgrade", "guidance", "earnings", "merger"];

fn tokenize_lower(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

pub trait SentimentAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> NewsSentiment;
}

pub trait NerAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> NewsNer;
}

pub trait ImpactAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> NewsImpact;
}

pub trait KeywordAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> KeywordEvidence;
}

/// Lexicon-based sentiment: a signed count of matched positive/negative words
/// normalized into `[-1, 1]`, labeled by sign.
#[derive(Default)]
pub struct LexiconSentimentAnalyzer;

impl SentimentAnalyzer for LexiconSentimentAnalyzer {
    fn analyze(&self, text: &str) -> NewsSentiment {
        let tokens = tokenize_lower(text);
        let positive = tokens.iter().filter(|t| POSITIVE_WORDS.contains(&t.as_str())).count() as f64;
        let negative = tokens.iter().filter(|t| NEGATIVE_WORDS.contains(&t.as_str())).count() as f64;
        let total = (positive + negative).max(1.0);
        let score = (positive - negative) / total;
        let label = if score > 0.15 {
            "positive"
        } else if score < -0.15 {
            "negative"
        } else {
            "neutral"
        };
        NewsSentiment {
            label: label.to_string(),
            score,
        }
    }
}

/// Capitalized-run entity extraction: a simple stand-in for a trained NER
/// model -- every consecutive run of capitalized tokens (excluding sentence
/// starts) is tagged `ORG`.
#[derive(Default)]
pub struct CapitalizedRunNerAnalyzer;

impl NerAnalyzer for CapitalizedRunNerAnalyzer {
    fn analyze(&self, text: &str) -> NewsNer {
        let mut entities = Vec::new();
        let mut run: Vec<&str> = Vec::new();
        for (i, word) in text.split_whitespace().enumerate() {
            let clean: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
            let is_cap = clean.chars().next().is_some_and(char::is_uppercase) && clean.len() > 1;
            if is_cap && i > 0 {
                run.push(word);
            } else {
                if !run.is_empty() {
                    entities.push(NamedEntity {
                        group: "ORG".to_string(),
                        word: run.join(" "),
                    });
                    run.clear();
                }
            }
        }
        if !run.is_empty() {
            entities.push(NamedEntity {
                group: "ORG".to_string(),
                word: run.join(" "),
            });
        }
        NewsNer { entities }
    }
}

/// Keyword-weighted impact level: any high-impact keyword wins outright;
/// otherwise any moderate-impact keyword; otherwise `low` if there's any
/// sentiment signal at all, else `unknown`.
#[derive(Default)]
pub struct KeywordImpactAnalyzer;

impl ImpactAnalyzer for KeywordImpactAnalyzer {
    fn analyze(&self, text: &str) -> NewsImpact {
        let tokens = tokenize_lower(text);
        let high: Vec<String> = tokens.iter().filter(|t| HIGH_IMPACT_WORDS.contains(&t.as_str())).cloned().collect();
        if !high.is_empty() {
            return NewsImpact {
                level: ImpactLevel::High,
                matched_keywords: high,
            };
        }
        let moderate: Vec<String> = tokens.iter().filter(|t| MODERATE_IMPACT_WORDS.contains(&t.as_str())).cloned().collect();
        if !moderate.is_empty() {
            return NewsImpact {
                level: ImpactLevel::Moderate,
                matched_keywords: moderate,
            };
        }
        let any_sentiment: Vec<String> = tokens
            .iter()
            .filter(|t| POSITIVE_WORDS.contains(&t.as_str()) || NEGATIVE_WORDS.contains(&t.as_str()))
            .cloned()
            .collect();
        if !any_sentiment.is_empty() {
            return NewsImpact {
                level: ImpactLevel::Low,
                matched_keywords: any_sentiment,
            };
        }
        NewsImpact {
            level: ImpactLevel::Unknown,
            matched_keywords: Vec::new(),
        }
    }
}

/// Splits the matched sentiment lexicon into positive/negative evidence
/// lists, independent of the aggregate sentiment score.
#[derive(Default)]
pub struct LexiconKeywordAnalyzer;

impl KeywordAnalyzer for LexiconKeywordAnalyzer {
    fn analyze(&self, text: &str) -> KeywordEvidence {
        let tokens = tokenize_lower(text);
        KeywordEvidence {
            positive: tokens.iter().filter(|t| POSITIVE_WORDS.contains(&t.as_str())).cloned().collect(),
            negative: tokens.iter().filter(|t| NEGATIVE_WORDS.contains(&t.as_str())).cloned().collect(),
        }
    }
}
