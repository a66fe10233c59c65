//! Rule engine: ordered rule set, evaluation, and persistence.
//!
//! Evaluation walks the rules in stored order and the first match wins.
//! The engine knows nothing about time, polling, or where messages come
//! from.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::rule::{PatternType, ResponseRule, RuleRecord};
use super::store::RuleStore;
use crate::error::{Error, RuleError, StoreError};

/// The response chosen for a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleMatch {
    /// Name of the rule that fired.
    pub rule_name: String,
    /// Rendered response text.
    pub response: String,
}

/// An ordered, immutable set of constructed rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ResponseRule>,
}

impl RuleSet {
    /// Build a set from stored records. Any invalid rule fails the whole set.
    pub fn from_records(records: Vec<RuleRecord>) -> Result<Self, RuleError> {
        let rules = records
            .into_iter()
            .map(ResponseRule::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// The rules installed when no rule store exists yet.
    pub fn default_records() -> Vec<RuleRecord> {
        vec![
            RuleRecord::new(
                "Hello Response",
                "hello",
                "Hello! This is an automated response.",
                PatternType::Contains,
            ),
            RuleRecord::new(
                "Help Response",
                "help",
                "This is an automatic response. For assistance, please contact the admin.",
                PatternType::Contains,
            ),
        ]
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Stored form of every rule, in order.
    pub fn records(&self) -> Vec<RuleRecord> {
        self.rules.iter().map(|r| r.record().clone()).collect()
    }

    /// Find the first matching rule and render its response.
    ///
    /// Returns `Ok(None)` when no rule matches. A template error in the
    /// first matching rule is returned as-is; later rules are not tried.
    pub fn evaluate(
        &self,
        text: &str,
        sender: Option<&str>,
        chat_id: Option<&str>,
    ) -> Result<Option<RuleMatch>, RuleError> {
        let Some(rule) = self.rules.iter().find(|r| r.matches(text, sender, chat_id)) else {
            return Ok(None);
        };

        let response = rule.render(text, sender)?;
        Ok(Some(RuleMatch {
            rule_name: rule.name().to_string(),
            response,
        }))
    }
}

/// Shared rule engine: the current rule set plus the store it persists to.
///
/// Replacement of the set is serialised with evaluation by the lock.
pub struct RuleEngine {
    store: Arc<dyn RuleStore>,
    rules: RwLock<RuleSet>,
}

impl RuleEngine {
    /// Load rules from `store`, never failing.
    ///
    /// A missing store is seeded with the default rules. A read or parse
    /// failure leaves the engine with an empty rule set so it replies to
    /// nothing; the failure is logged.
    pub async fn load(store: Arc<dyn RuleStore>) -> Self {
        let rules = match read_rule_set(store.as_ref()).await {
            Ok(rules) => rules,
            Err(e) => {
                error!(error = %e, "Failed to load rules, continuing with none");
                RuleSet::default()
            }
        };

        Self {
            store,
            rules: RwLock::new(rules),
        }
    }

    /// Create an engine around an already-built rule set (nothing is read).
    pub fn with_rules(store: Arc<dyn RuleStore>, rules: RuleSet) -> Self {
        Self {
            store,
            rules: RwLock::new(rules),
        }
    }

    /// Re-read the store and replace the rule set as a whole.
    ///
    /// Follows `load` semantics: on failure the engine is left with an
    /// empty rule set and the error is returned.
    pub async fn reload(&self) -> Result<usize, Error> {
        let mut guard = self.rules.write().await;
        match read_rule_set(self.store.as_ref()).await {
            Ok(rules) => {
                let count = rules.len();
                *guard = rules;
                info!(count, "Rules reloaded");
                Ok(count)
            }
            Err(e) => {
                *guard = RuleSet::default();
                error!(error = %e, "Rule reload failed, rule set cleared");
                Err(e)
            }
        }
    }

    /// Persist the current rule set.
    pub async fn save(&self) -> Result<(), StoreError> {
        let records = self.rules.read().await.records();
        persist(self.store.as_ref(), &records).await
    }

    /// Evaluate a message against the current rules.
    pub async fn evaluate(
        &self,
        text: &str,
        sender: Option<&str>,
        chat_id: Option<&str>,
    ) -> Result<Option<RuleMatch>, RuleError> {
        self.rules.read().await.evaluate(text, sender, chat_id)
    }

    /// Stored form of every rule, in priority order.
    pub async fn rules(&self) -> Vec<RuleRecord> {
        self.rules.read().await.records()
    }

    pub async fn len(&self) -> usize {
        self.rules.read().await.len()
    }

    /// Append a rule at the lowest priority. Returns its index.
    ///
    /// An invalid rule leaves the set untouched. A save failure is
    /// returned, but the in-memory change stays in effect.
    pub async fn add_rule(&self, record: RuleRecord) -> Result<usize, Error> {
        let rule = ResponseRule::new(record)?;
        let mut guard = self.rules.write().await;
        guard.rules.push(rule);
        let index = guard.rules.len() - 1;
        info!(index, rule = %guard.rules[index].name(), "Rule added");
        persist(self.store.as_ref(), &guard.records()).await?;
        Ok(index)
    }

    /// Replace the rule at `index`, keeping its position.
    pub async fn update_rule(&self, index: usize, record: RuleRecord) -> Result<(), Error> {
        let rule = ResponseRule::new(record)?;
        let mut guard = self.rules.write().await;
        let len = guard.rules.len();
        let slot = guard
            .rules
            .get_mut(index)
            .ok_or(RuleError::IndexOutOfRange { index, len })?;
        *slot = rule;
        info!(index, rule = %guard.rules[index].name(), "Rule updated");
        persist(self.store.as_ref(), &guard.records()).await?;
        Ok(())
    }

    /// Remove the rule at `index`, returning its stored form.
    pub async fn remove_rule(&self, index: usize) -> Result<RuleRecord, Error> {
        let mut guard = self.rules.write().await;
        let len = guard.rules.len();
        if index >= len {
            return Err(RuleError::IndexOutOfRange { index, len }.into());
        }
        let removed = guard.rules.remove(index).record().clone();
        info!(index, rule = %removed.name, "Rule removed");
        persist(self.store.as_ref(), &guard.records()).await?;
        Ok(removed)
    }

    /// Enable or disable the rule at `index`.
    pub async fn set_enabled(&self, index: usize, enabled: bool) -> Result<(), Error> {
        let mut guard = self.rules.write().await;
        let len = guard.rules.len();
        let slot = guard
            .rules
            .get_mut(index)
            .ok_or(RuleError::IndexOutOfRange { index, len })?;
        let record = slot.record().clone().with_enabled(enabled);
        *slot = ResponseRule::new(record)?;
        info!(index, enabled, rule = %guard.rules[index].name(), "Rule toggled");
        persist(self.store.as_ref(), &guard.records()).await?;
        Ok(())
    }
}

async fn read_rule_set(store: &dyn RuleStore) -> Result<RuleSet, Error> {
    match store.load().await? {
        Some(records) => {
            let rules = RuleSet::from_records(records)?;
            info!(count = rules.len(), "Loaded rules");
            Ok(rules)
        }
        None => {
            let records = RuleSet::default_records();
            let rules = RuleSet::from_records(records.clone())?;
            info!(count = rules.len(), "No rule store found, installing default rules");
            if let Err(e) = persist(store, &records).await {
                warn!(error = %e, "Default rules active but not persisted");
            }
            Ok(rules)
        }
    }
}

async fn persist(store: &dyn RuleStore, records: &[RuleRecord]) -> Result<(), StoreError> {
    match store.save(records).await {
        Ok(()) => {
            debug!(count = records.len(), "Rules saved");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Failed to save rules");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// In-memory store recording every save.
    #[derive(Default)]
    struct MemoryStore {
        stored: Mutex<Option<Vec<RuleRecord>>>,
        saves: Mutex<usize>,
        fail_load: bool,
        fail_save: bool,
    }

    impl MemoryStore {
        fn with(records: Vec<RuleRecord>) -> Self {
            Self {
                stored: Mutex::new(Some(records)),
                ..Default::default()
            }
        }

        fn stored(&self) -> Option<Vec<RuleRecord>> {
            self.stored.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RuleStore for MemoryStore {
        async fn load(&self) -> Result<Option<Vec<RuleRecord>>, StoreError> {
            if self.fail_load {
                return Err(std::io::Error::other("disk gone").into());
            }
            Ok(self.stored())
        }

        async fn save(&self, rules: &[RuleRecord]) -> Result<(), StoreError> {
            if self.fail_save {
                return Err(std::io::Error::other("read-only").into());
            }
            *self.stored.lock().unwrap() = Some(rules.to_vec());
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn contains(name: &str, pattern: &str, response: &str) -> RuleRecord {
        RuleRecord::new(name, pattern, response, PatternType::Contains)
    }

    #[tokio::test]
    async fn missing_store_installs_and_persists_defaults() {
        let store = Arc::new(MemoryStore::default());
        let engine = RuleEngine::load(store.clone()).await;

        assert_eq!(engine.len().await, 2);
        let stored = store.stored().unwrap();
        assert_eq!(stored[0].name, "Hello Response");
        assert_eq!(stored[1].name, "Help Response");

        let hit = engine.evaluate("Hello there", None, None).await.unwrap().unwrap();
        assert_eq!(hit.response, "Hello! This is an automated response.");
    }

    #[tokio::test]
    async fn load_failure_yields_empty_rules() {
        let store = Arc::new(MemoryStore {
            fail_load: true,
            ..Default::default()
        });
        let engine = RuleEngine::load(store).await;
        assert_eq!(engine.len().await, 0);
        assert!(engine.evaluate("hello", None, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_regex_in_store_yields_empty_rules() {
        let store = Arc::new(MemoryStore::with(vec![
            contains("ok", "hello", "hi"),
            RuleRecord::regex("broken", "(", "never"),
        ]));
        let engine = RuleEngine::load(store).await;
        assert_eq!(engine.len().await, 0);
    }

    #[tokio::test]
    async fn first_matching_rule_wins() {
        let store = Arc::new(MemoryStore::with(vec![
            contains("first", "hello", "one"),
            contains("second", "hello there", "two"),
        ]));
        let engine = RuleEngine::load(store).await;

        let hit = engine.evaluate("hello there", None, None).await.unwrap().unwrap();
        assert_eq!(hit.rule_name, "first");
        assert_eq!(hit.response, "one");
    }

    #[tokio::test]
    async fn disabled_rule_is_skipped_for_next_match() {
        let store = Arc::new(MemoryStore::with(vec![
            contains("first", "hello", "one").with_enabled(false),
            contains("second", "hello", "two"),
        ]));
        let engine = RuleEngine::load(store).await;

        let hit = engine.evaluate("hello", None, None).await.unwrap().unwrap();
        assert_eq!(hit.rule_name, "second");
    }

    #[tokio::test]
    async fn template_error_is_surfaced() {
        let store = Arc::new(MemoryStore::with(vec![contains("bad", "hi", "Hi {name}")]));
        let engine = RuleEngine::load(store).await;

        let err = engine.evaluate("hi", Some("a"), None).await.unwrap_err();
        assert!(matches!(err, RuleError::Template { .. }));
    }

    #[tokio::test]
    async fn renders_message_and_sender() {
        let store = Arc::new(MemoryStore::with(vec![contains(
            "echo",
            "ping",
            "{sender}: you said '{message}'",
        )]));
        let engine = RuleEngine::load(store).await;

        let hit = engine
            .evaluate("PING please", Some("Alice"), Some("chat"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.response, "Alice: you said 'PING please'");

        let anon = engine.evaluate("ping", None, None).await.unwrap().unwrap();
        assert_eq!(anon.response, "Unknown: you said 'ping'");
    }

    #[tokio::test]
    async fn add_update_remove_persist_whole_set() {
        let store = Arc::new(MemoryStore::with(vec![contains("a", "a", "A")]));
        let engine = RuleEngine::load(store.clone()).await;

        let idx = engine.add_rule(contains("b", "b", "B")).await.unwrap();
        assert_eq!(idx, 1);
        assert_eq!(store.stored().unwrap().len(), 2);

        engine.update_rule(0, contains("a2", "a", "A2")).await.unwrap();
        assert_eq!(store.stored().unwrap()[0].name, "a2");

        let removed = engine.remove_rule(1).await.unwrap();
        assert_eq!(removed.name, "b");
        assert_eq!(store.stored().unwrap().len(), 1);
        assert_eq!(*store.saves.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn invalid_rule_leaves_set_unchanged() {
        let store = Arc::new(MemoryStore::with(vec![contains("a", "a", "A")]));
        let engine = RuleEngine::load(store.clone()).await;

        let err = engine.add_rule(RuleRecord::regex("bad", "[", "x")).await;
        assert!(matches!(err, Err(Error::Rule(RuleError::InvalidRegex { .. }))));
        assert_eq!(engine.len().await, 1);
        assert_eq!(*store.saves.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn out_of_range_index_is_rejected() {
        let store = Arc::new(MemoryStore::with(vec![]));
        let engine = RuleEngine::load(store).await;

        assert!(matches!(
            engine.remove_rule(3).await,
            Err(Error::Rule(RuleError::IndexOutOfRange { index: 3, len: 0 }))
        ));
        assert!(engine.set_enabled(0, false).await.is_err());
    }

    #[tokio::test]
    async fn save_failure_keeps_in_memory_change() {
        let store = Arc::new(MemoryStore {
            stored: Mutex::new(Some(vec![])),
            fail_save: true,
            ..Default::default()
        });
        let engine = RuleEngine::load(store).await;

        let result = engine.add_rule(contains("a", "hello", "hi")).await;
        assert!(matches!(result, Err(Error::Store(_))));
        assert_eq!(engine.len().await, 1);
        assert!(engine.evaluate("hello", None, None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn set_enabled_toggles_matching() {
        let store = Arc::new(MemoryStore::with(vec![contains("a", "hello", "hi")]));
        let engine = RuleEngine::load(store).await;

        engine.set_enabled(0, false).await.unwrap();
        assert!(engine.evaluate("hello", None, None).await.unwrap().is_none());
        engine.set_enabled(0, true).await.unwrap();
        assert!(engine.evaluate("hello", None, None).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn toggle_never_reverts_concurrent_update() {
        for round in 0..50 {
            let store = Arc::new(MemoryStore::with(vec![contains("a", "hello", "old")]));
            let engine = Arc::new(RuleEngine::load(store).await);

            let toggler = tokio::spawn({
                let engine = Arc::clone(&engine);
                async move { engine.set_enabled(0, false).await }
            });
            let updater = tokio::spawn({
                let engine = Arc::clone(&engine);
                async move { engine.update_rule(0, contains("a", "hello", "new")).await }
            });
            toggler.await.unwrap().unwrap();
            updater.await.unwrap().unwrap();

            let rules = engine.rules().await;
            assert_eq!(rules[0].response, "new", "round {round}");
        }
    }

    #[tokio::test]
    async fn reload_picks_up_external_changes() {
        let store = Arc::new(MemoryStore::with(vec![contains("a", "hello", "old")]));
        let engine = RuleEngine::load(store.clone()).await;

        *store.stored.lock().unwrap() = Some(vec![contains("a", "hello", "new")]);
        assert_eq!(engine.reload().await.unwrap(), 1);

        let hit = engine.evaluate("hello", None, None).await.unwrap().unwrap();
        assert_eq!(hit.response, "new");
    }
}
