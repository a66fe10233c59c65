//! Response rule definitions and the per-rule match predicate.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::template;
use crate::error::RuleError;

/// How a non-regex pattern is compared against message text.
///
/// Unrecognised values from the rule store are kept verbatim so they
/// survive a save, but they never match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PatternType {
    /// Case-insensitive substring.
    #[default]
    Contains,
    /// Case-insensitive whole-string equality.
    Exact,
    /// Anything else found in the store.
    Other(String),
}

impl From<String> for PatternType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "contains" => Self::Contains,
            "exact" => Self::Exact,
            _ => Self::Other(value),
        }
    }
}

impl From<PatternType> for String {
    fn from(value: PatternType) -> Self {
        match value {
            PatternType::Contains => "contains".to_string(),
            PatternType::Exact => "exact".to_string(),
            PatternType::Other(s) => s,
        }
    }
}

/// Stored form of a rule, as read from and written to the rule store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub pattern_type: PatternType,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub sender_filter: Option<String>,
    #[serde(default)]
    pub chat_filter: Option<String>,
}

fn default_name() -> String {
    "Unnamed Rule".to_string()
}

fn default_true() -> bool {
    true
}

impl RuleRecord {
    /// Create an enabled, unfiltered rule.
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        response: impl Into<String>,
        pattern_type: PatternType,
    ) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            response: response.into(),
            pattern_type,
            is_regex: false,
            enabled: true,
            sender_filter: None,
            chat_filter: None,
        }
    }

    /// Create an enabled regex rule.
    pub fn regex(
        name: impl Into<String>,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            is_regex: true,
            ..Self::new(name, pattern, response, PatternType::Contains)
        }
    }

    pub fn with_sender_filter(mut self, sender: impl Into<String>) -> Self {
        self.sender_filter = Some(sender.into());
        self
    }

    pub fn with_chat_filter(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_filter = Some(chat_id.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// A constructed rule: the stored record plus its compiled matcher.
///
/// Immutable once built. A regex rule compiles its pattern here, once,
/// case-insensitively.
#[derive(Debug, Clone)]
pub struct ResponseRule {
    record: RuleRecord,
    regex: Option<Regex>,
}

impl ResponseRule {
    /// Build a rule from its stored form.
    pub fn new(record: RuleRecord) -> Result<Self, RuleError> {
        let regex = if record.is_regex {
            let compiled = RegexBuilder::new(&record.pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| RuleError::InvalidRegex {
                    rule: record.name.clone(),
                    source,
                })?;
            Some(compiled)
        } else {
            None
        };

        Ok(Self { record, regex })
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn record(&self) -> &RuleRecord {
        &self.record
    }

    /// Whether this rule applies to a message.
    ///
    /// A filter only rejects when both the filter and the corresponding
    /// message field are present and they differ.
    pub fn matches(&self, text: &str, sender: Option<&str>, chat_id: Option<&str>) -> bool {
        if !self.record.enabled {
            return false;
        }

        if filter_rejects(self.record.sender_filter.as_deref(), sender) {
            return false;
        }

        if filter_rejects(self.record.chat_filter.as_deref(), chat_id) {
            return false;
        }

        if let Some(ref regex) = self.regex {
            return regex.is_match(text);
        }

        match self.record.pattern_type {
            PatternType::Exact => text.to_lowercase() == self.record.pattern.to_lowercase(),
            PatternType::Contains => text
                .to_lowercase()
                .contains(&self.record.pattern.to_lowercase()),
            PatternType::Other(_) => false,
        }
    }

    /// Render this rule's response template for a message.
    pub fn render(&self, text: &str, sender: Option<&str>) -> Result<String, RuleError> {
        template::render(&self.record.response, text, sender).map_err(|e| RuleError::Template {
            rule: self.record.name.clone(),
            reason: e.to_string(),
        })
    }
}

fn filter_rejects(filter: Option<&str>, value: Option<&str>) -> bool {
    match (filter, value) {
        (Some(f), Some(v)) if !f.is_empty() && !v.is_empty() => f != v,
        _ => false,
    }
}
