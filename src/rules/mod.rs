//! Rule-driven reply selection.
//!
//! - `rule`: `RuleRecord` (stored form) and `ResponseRule` (compiled form + match predicate)
//! - `template`: `{message}` / `{sender}` response rendering
//! - `store`: whole-set rule persistence (`RuleStore`, `JsonRuleStore`)
//! - `engine`: ordered `RuleSet` and the shared `RuleEngine`

pub mod engine;
pub mod rule;
pub mod store;
pub mod template;

pub use engine::{RuleEngine, RuleMatch, RuleSet};
pub use rule::{PatternType, ResponseRule, RuleRecord};
pub use store::{JsonRuleStore, RuleStore};
