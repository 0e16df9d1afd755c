//! Rate-limit rules and the rule-store collaborator contract.
//!
//! Rules are owned by an external configuration store; the gateway only reads
//! them through [`RateLimitRuleStore::find_active`] and keeps cached copies
//! keyed by [`rule_key`].

use super::error::GatewayError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Custom attribute holding the number of extra consumption attempts.
pub const ATTR_MAX_RETRIES: &str = "maxRetries";
/// Custom attribute holding the wait between attempts, in milliseconds.
pub const ATTR_RETRY_DELAY_MS: &str = "retryDelayMs";
/// Legacy spelling of [`ATTR_RETRY_DELAY_MS`].
pub const ATTR_RETRY_DELAY_LEGACY: &str = "retryDelay";

/// Cache key shared by buckets, rules and monitoring: `"clientId:route"`.
pub fn rule_key(client_id: &str, route: &str) -> String {
    format!("{client_id}:{route}")
}

/// Failure reported by a [`RateLimitRuleStore`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RuleStoreError {
    /// The store could not be reached.
    #[error("rule store unavailable: {0}")]
    Unavailable(String),

    /// The query failed or returned an unreadable record.
    #[error("rule query failed: {0}")]
    Query(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Rule record
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle status of a rule.  Only `Active` rules are ever applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleStatus {
    #[default]
    Active,
    Inactive,
}

/// Unit of [`RateLimitRule::time_window`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeUnit {
    Seconds,
    #[default]
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn seconds(self) -> u64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3_600,
            TimeUnit::Days => 86_400,
        }
    }
}

fn default_time_window() -> u64 {
    1
}

/// A throttling rule for one `(client_id, route)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitRule {
    pub client_id: String,
    pub route: String,
    /// Tokens granted per refill window.
    #[serde(alias = "capacity")]
    pub max_tokens_per_window: u64,
    /// Length of the refill window, in `time_unit`s.
    #[serde(default = "default_time_window")]
    pub time_window: u64,
    #[serde(default)]
    pub time_unit: TimeUnit,
    /// Tokens added per window; `0` means "same as `max_tokens_per_window`".
    #[serde(default)]
    pub refill_amount: u64,
    /// Extra tokens the bucket may hold on top of the per-window allowance.
    #[serde(default)]
    pub burst_capacity: u64,
    #[serde(default)]
    pub priority: i32,
    /// Rule stops applying at this instant.
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: RuleStatus,
    /// Free-form attributes; `maxRetries` and `retryDelayMs` drive admission retries.
    #[serde(default)]
    pub custom_attributes: HashMap<String, String>,
}

impl RateLimitRule {
    /// Active rule granting `max_tokens_per_window` tokens per minute.
    pub fn new(
        client_id: impl Into<String>,
        route: impl Into<String>,
        max_tokens_per_window: u64,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            route: route.into(),
            max_tokens_per_window,
            time_window: 1,
            time_unit: TimeUnit::Minutes,
            refill_amount: 0,
            burst_capacity: 0,
            priority: 0,
            expiration_date: None,
            status: RuleStatus::Active,
            custom_attributes: HashMap::new(),
        }
    }

    /// Builder: set the refill window.
    pub fn with_window(mut self, time_window: u64, time_unit: TimeUnit) -> Self {
        self.time_window = time_window;
        self.time_unit = time_unit;
        self
    }

    /// Builder: set the burst allowance.
    pub fn with_burst(mut self, burst_capacity: u64) -> Self {
        self.burst_capacity = burst_capacity;
        self
    }

    /// Builder: set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: set the status.
    pub fn with_status(mut self, status: RuleStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder: set the expiration instant.
    pub fn with_expiration(mut self, at: DateTime<Utc>) -> Self {
        self.expiration_date = Some(at);
        self
    }

    /// Builder: attach a custom attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_attributes.insert(key.into(), value.into());
        self
    }

    /// `"clientId:route"` cache key of this rule.
    pub fn key(&self) -> String {
        rule_key(&self.client_id, &self.route)
    }

    /// Refill window as a [`Duration`].
    pub fn refill_window(&self) -> Duration {
        Duration::from_secs(self.time_window.saturating_mul(self.time_unit.seconds()))
    }

    /// Tokens added per refill window.
    pub fn effective_refill_amount(&self) -> u64 {
        if self.refill_amount == 0 {
            self.max_tokens_per_window
        } else {
            self.refill_amount
        }
    }

    /// Bucket size: per-window allowance plus burst.
    pub fn bucket_capacity(&self) -> u64 {
        self.max_tokens_per_window.saturating_add(self.burst_capacity)
    }

    /// `true` if the rule is `ACTIVE` and not expired at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == RuleStatus::Active && self.expiration_date.is_none_or(|exp| exp > now)
    }

    /// Retry policy parsed from the custom attributes.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_attributes(&self.custom_attributes)
    }

    /// Structural checks applied before a rule is accepted into a store.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let invalid = |reason: &str| Err(GatewayError::InvalidRule(self.key(), reason.to_string()));
        if self.client_id.trim().is_empty() {
            return invalid("client id cannot be empty");
        }
        if self.route.trim().is_empty() {
            return invalid("route cannot be empty");
        }
        if self.time_window == 0 {
            return invalid("time window must be greater than 0");
        }
        if self.bucket_capacity() == 0 {
            return invalid("capacity must be greater than 0");
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry policy
// ─────────────────────────────────────────────────────────────────────────────

/// Bounded retry applied when the first token consumption fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Extra consumption attempts after the first one.
    pub max_retries: u32,
    /// Wait between attempts.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    /// No retries: a failed consumption is final.
    pub fn none() -> Self {
        Self::default()
    }

    /// Parse `maxRetries` / `retryDelayMs` (or legacy `retryDelay`).
    ///
    /// Absent `maxRetries` means no retries; an absent delay means retry
    /// immediately.  Any unparseable value disables retries entirely.
    pub fn from_attributes(attrs: &HashMap<String, String>) -> Self {
        let Some(raw_retries) = attrs.get(ATTR_MAX_RETRIES) else {
            return Self::none();
        };
        let Ok(max_retries) = raw_retries.trim().parse::<u32>() else {
            debug!(value = %raw_retries, "unparseable maxRetries, retries disabled");
            return Self::none();
        };

        let raw_delay = attrs
            .get(ATTR_RETRY_DELAY_MS)
            .or_else(|| attrs.get(ATTR_RETRY_DELAY_LEGACY));
        let delay_ms = match raw_delay {
            None => 0,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) => ms,
                Err(_) => {
                    debug!(value = %raw, "unparseable retry delay, retries disabled");
                    return Self::none();
                }
            },
        };

        Self {
            max_retries,
            retry_delay: Duration::from_millis(delay_ms),
        }
    }

    /// Worst-case extra latency this policy can add.
    pub fn max_added_latency(&self) -> Duration {
        self.retry_delay.saturating_mul(self.max_retries)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store contract
// ─────────────────────────────────────────────────────────────────────────────

/// Kernel contract for the rate-limit configuration store.
#[async_trait]
pub trait RateLimitRuleStore: Send + Sync {
    /// First `ACTIVE`, non-expired rule for `(client_id, route)`, if any.
    async fn find_active(
        &self,
        client_id: &str,
        route: &str,
    ) -> Result<Option<RateLimitRule>, RuleStoreError>;
}
