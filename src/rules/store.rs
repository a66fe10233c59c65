//! Rule persistence.
//!
//! The store is read and written as a whole: no partial updates.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::rule::RuleRecord;
use crate::error::StoreError;

/// Durable home of the rule list.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Read every stored rule. `Ok(None)` means nothing has been stored yet.
    async fn load(&self) -> Result<Option<Vec<RuleRecord>>, StoreError>;

    /// Replace the stored rules with `rules`, in order.
    async fn save(&self, rules: &[RuleRecord]) -> Result<(), StoreError>;
}

/// Rules kept as a pretty-printed JSON array in a single file.
pub struct JsonRuleStore {
    path: PathBuf,
}

impl JsonRuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RuleStore for JsonRuleStore {
    async fn load(&self) -> Result<Option<Vec<RuleRecord>>, StoreError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let rules: Vec<RuleRecord> = serde_json::from_str(&raw)?;
        debug!(path = %self.path.display(), count = rules.len(), "Read rule file");
        Ok(Some(rules))
    }

    async fn save(&self, rules: &[RuleRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(rules)?;

        // The target is only ever replaced by a complete file.
        let tmp = self.temp_path();
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), count = rules.len(), "Wrote rule file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::rule::PatternType;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRuleStore::new(dir.path().join("rules.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRuleStore::new(dir.path().join("nested/rules.json"));
        let rules = vec![
            RuleRecord::new("first", "a", "A", PatternType::Contains),
            RuleRecord::regex("second", "b+", "B").with_chat_filter("chat-9"),
        ];

        store.save(&rules).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, rules);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonRuleStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
    }

    #[tokio::test]
    async fn reads_file_with_null_filters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"[
  {
    "name": "Hello Response",
    "pattern": "hello",
    "response": "Hello! This is an automated response.",
    "pattern_type": "contains",
    "is_regex": false,
    "enabled": true,
    "sender_filter": null,
    "chat_filter": null
  }
]"#,
        )
        .unwrap();

        let loaded = JsonRuleStore::new(&path).load().await.unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Hello Response");
    }
}
