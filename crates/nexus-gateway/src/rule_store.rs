//! In-memory [`RateLimitRuleStore`] implementation.

use async_trait::async_trait;
use chrono::Utc;
use nexus_kernel::gateway::{GatewayError, RateLimitRule, RateLimitRuleStore, RuleStoreError};
use parking_lot::RwLock;

/// [`RateLimitRuleStore`] holding rules in insertion order.
///
/// Several rules may exist for one `(client_id, route)` pair; the active,
/// non-expired one with the highest priority wins, earliest insertion first
/// on ties.
#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<Vec<RateLimitRule>>,
}

impl InMemoryRuleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store, rejecting the first invalid rule.
    pub fn from_rules(rules: impl IntoIterator<Item = RateLimitRule>) -> Result<Self, GatewayError> {
        let store = Self::new();
        for rule in rules {
            store.insert(rule)?;
        }
        Ok(store)
    }

    /// Append a rule after validating it.
    pub fn insert(&self, rule: RateLimitRule) -> Result<(), GatewayError> {
        rule.validate()?;
        self.rules.write().push(rule);
        Ok(())
    }

    /// Remove every rule for `(client_id, route)`; returns how many were dropped.
    pub fn remove(&self, client_id: &str, route: &str) -> usize {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| !(r.client_id == client_id && r.route == route));
        before - rules.len()
    }

    /// Snapshot of all stored rules.
    pub fn list(&self) -> Vec<RateLimitRule> {
        self.rules.read().clone()
    }
}

#[async_trait]
impl RateLimitRuleStore for InMemoryRuleStore {
    async fn find_active(
        &self,
        client_id: &str,
        route: &str,
    ) -> Result<Option<RateLimitRule>, RuleStoreError> {
        let now = Utc::now();
        let rules = self.rules.read();
        let mut best: Option<&RateLimitRule> = None;
        for rule in rules
            .iter()
            .filter(|r| r.client_id == client_id && r.route == route && r.is_active_at(now))
        {
            if best.is_none_or(|b| rule.priority > b.priority) {
                best = Some(rule);
            }
        }
        Ok(best.cloned())
    }
}
