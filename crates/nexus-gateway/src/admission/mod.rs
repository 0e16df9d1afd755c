//! Token-bucket admission control per `(client_id, route)`.
//!
//! Three concurrent caches share the `"clientId:route"` key:
//!
//! | Cache | Holds | Populated |
//! |-------|-------|-----------|
//! | buckets | live [`Bucket`] | first request for the key |
//! | capacities | bucket size of an explicit rule | only when a rule exists |
//! | rules | read-through copy of the store lookup | first successful lookup |
//!
//! Entries have no TTL. [`AdmissionController::invalidate`] drops a key from
//! all three when its rule changes out of band, and a cached rule found past
//! its expiration date drops its key the same way.

mod bucket;

pub use bucket::{Bucket, BucketFactory, TokenBucket, TokenBucketFactory};

use chrono::Utc;
use dashmap::DashMap;
use nexus_kernel::gateway::{
    AdmissionConfig, RateLimitRule, RateLimitRuleStore, RetryPolicy, rule_key,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// No client id on the request.
    MissingClientId,
    /// Bucket empty after every permitted attempt.
    RateLimited,
}

/// Result of [`AdmissionController::try_admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A token was consumed; `remaining` whole tokens are left.
    Allowed { remaining: u64 },
    Denied(Denial),
    /// The caller went away during a retry wait.
    Abandoned,
}

/// Monitoring view of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketStatus {
    pub available_tokens: u64,
    /// Bucket size from an explicit rule, `-1` when the default quota applies.
    pub capacity: i64,
}

/// Admission controller shared by every in-flight request.
pub struct AdmissionController {
    rules: Arc<dyn RateLimitRuleStore>,
    factory: Arc<dyn BucketFactory>,
    defaults: AdmissionConfig,
    buckets: DashMap<String, Arc<dyn Bucket>>,
    capacities: DashMap<String, u64>,
    rule_cache: DashMap<String, Option<RateLimitRule>>,
}

impl AdmissionController {
    pub fn new(rules: Arc<dyn RateLimitRuleStore>, defaults: AdmissionConfig) -> Self {
        Self::with_factory(rules, defaults, Arc::new(TokenBucketFactory))
    }

    pub fn with_factory(
        rules: Arc<dyn RateLimitRuleStore>,
        defaults: AdmissionConfig,
        factory: Arc<dyn BucketFactory>,
    ) -> Self {
        Self {
            rules,
            factory,
            defaults,
            buckets: DashMap::new(),
            capacities: DashMap::new(),
            rule_cache: DashMap::new(),
        }
    }

    /// Admit or refuse one request.
    ///
    /// A missing client id is refused before any cache or store access.
    /// When the first consumption fails, the rule's [`RetryPolicy`] allows
    /// further attempts separated by a timer wait; cancelling `cancel`
    /// during a wait abandons the request without consuming more tokens.
    pub async fn try_admit(
        &self,
        client_id: Option<&str>,
        route: &str,
        cancel: &CancellationToken,
    ) -> Admission {
        let Some(client_id) = client_id.map(str::trim).filter(|id| !id.is_empty()) else {
            debug!(route = %route, "request without client id");
            return Admission::Denied(Denial::MissingClientId);
        };

        let key = rule_key(client_id, route);
        let rule = self.resolve_rule(client_id, route, &key).await;
        let bucket = self.resolve_bucket(&key, rule.as_ref());

        if bucket.try_consume() {
            return Admission::Allowed {
                remaining: bucket.available_tokens(),
            };
        }

        let policy = rule
            .as_ref()
            .map(RateLimitRule::retry_policy)
            .unwrap_or_else(RetryPolicy::none);
        for attempt in 1..=policy.max_retries {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(key = %key, attempt, "caller gone during retry wait");
                    return Admission::Abandoned;
                }
                _ = tokio::time::sleep(policy.retry_delay) => {}
            }
            if bucket.try_consume() {
                debug!(key = %key, attempt, "admitted on retry");
                return Admission::Allowed {
                    remaining: bucket.available_tokens(),
                };
            }
        }

        warn!(key = %key, retries = policy.max_retries, "rate limit exceeded");
        Admission::Denied(Denial::RateLimited)
    }

    /// Cached rule for `key`, falling back to the store.
    ///
    /// A store failure counts as "no rule" and is not cached, so the next
    /// request asks again. A cached rule that has expired or been deactivated
    /// drops the whole key (bucket and capacity included) before the store is
    /// consulted again.
    async fn resolve_rule(&self, client_id: &str, route: &str, key: &str) -> Option<RateLimitRule> {
        let cached = self.rule_cache.get(key).map(|entry| entry.value().clone());
        match cached {
            Some(Some(rule)) if !rule.is_active_at(Utc::now()) => {
                debug!(key = %key, "cached rate-limit rule no longer active");
                self.invalidate(client_id, route);
            }
            Some(cached) => return cached,
            None => {}
        }
        match self.rules.find_active(client_id, route).await {
            Ok(rule) => {
                if rule.is_none() {
                    debug!(key = %key, "no rate-limit rule, using default quota");
                }
                self.rule_cache.insert(key.to_string(), rule.clone());
                rule
            }
            Err(err) => {
                warn!(key = %key, error = %err, "rule lookup failed, using default quota");
                None
            }
        }
    }

    fn resolve_bucket(&self, key: &str, rule: Option<&RateLimitRule>) -> Arc<dyn Bucket> {
        if let Some(rule) = rule {
            self.capacities.insert(key.to_string(), rule.bucket_capacity());
        }
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| match rule {
                Some(rule) => self.factory.create(
                    rule.bucket_capacity(),
                    rule.effective_refill_amount(),
                    rule.refill_window(),
                ),
                None => self.factory.create(
                    self.defaults.default_capacity,
                    self.defaults.default_capacity,
                    self.defaults.default_refill_window(),
                ),
            })
            .value()
            .clone()
    }

    /// Forget the bucket, capacity and cached rule of one key.
    pub fn invalidate(&self, client_id: &str, route: &str) {
        let key = rule_key(client_id, route);
        self.buckets.remove(&key);
        self.capacities.remove(&key);
        self.rule_cache.remove(&key);
        debug!(key = %key, "admission cache invalidated");
    }

    /// Forget every key.
    pub fn invalidate_all(&self) {
        self.buckets.clear();
        self.capacities.clear();
        self.rule_cache.clear();
    }

    /// Status of every bucket, keyed by `"clientId:route"`.
    pub fn limits(&self) -> BTreeMap<String, BucketStatus> {
        self.buckets
            .iter()
            .map(|entry| {
                let capacity = self
                    .capacities
                    .get(entry.key())
                    .and_then(|c| i64::try_from(*c).ok())
                    .unwrap_or(-1);
                (
                    entry.key().clone(),
                    BucketStatus {
                        available_tokens: entry.value().available_tokens(),
                        capacity,
                    },
                )
            })
            .collect()
    }

    pub fn bucket(&self, client_id: &str, route: &str) -> Option<Arc<dyn Bucket>> {
        self.buckets
            .get(&rule_key(client_id, route))
            .map(|b| b.value().clone())
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
