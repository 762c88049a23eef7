//! Rule Runtime: polymorphic typed expression trees evaluated against an
//! `AnalysisReport`, with a process-wide node registry, canonical
//! serialization, and a strong semantic type system.

pub mod nodes;
pub mod parser;
pub mod path;
pub mod registry;
pub mod rule;
pub mod store;
pub mod types;

pub use rule::{Rule, RuleStatus};
pub use store::{InMemoryRuleStore, RuleStore, SharedRuleStore};
pub use types::{Purpose, SemanticType};
