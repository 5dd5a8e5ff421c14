//! Tracker configuration
//!
//! All knobs are optional. Setters record which knobs were explicitly
//! configured; the resulting bitmask rides along on every emitted hit as
//! usage instrumentation.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::hit::{HitFilter, usage};

/// Default session timeout: 30 minutes
pub const DEFAULT_SESSION_TIMEOUT_MS: i64 = 30 * 60 * 1000;

/// Configuration accepted at tracker construction
#[derive(Clone)]
pub struct TrackerConfig {
    account: String,
    visible_threshold_ms: u64,
    session_timeout_ms: i64,
    visible_metric_index: Option<u32>,
    field_overrides: BTreeMap<String, String>,
    hit_filter: Option<Arc<dyn HitFilter>>,
    usage: u8,
}

impl TrackerConfig {
    /// Default configuration for the given account namespace
    #[must_use]
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            visible_threshold_ms: 0,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            visible_metric_index: None,
            field_overrides: BTreeMap::new(),
            hit_filter: None,
            usage: 0,
        }
    }

    /// Minimum measured duration, in milliseconds, before a measurement is
    /// reported (compared with `>=`)
    #[must_use]
    pub fn visible_threshold(mut self, millis: u64) -> Self {
        self.visible_threshold_ms = millis;
        self.usage |= usage::VISIBLE_THRESHOLD;
        self
    }

    /// Inactivity window, in milliseconds, after which the session expires
    #[must_use]
    pub fn session_timeout(mut self, millis: i64) -> Self {
        self.session_timeout_ms = millis;
        self.usage |= usage::SESSION_TIMEOUT;
        self
    }

    /// Custom metric slot to carry the visible seconds
    #[must_use]
    pub fn visible_metric_index(mut self, index: u32) -> Self {
        self.visible_metric_index = Some(index);
        self.usage |= usage::CUSTOM_METRIC;
        self
    }

    /// Field overrides applied after defaults on every hit
    #[must_use]
    pub fn field_overrides(mut self, fields: BTreeMap<String, String>) -> Self {
        self.field_overrides = fields;
        self.usage |= usage::FIELD_OVERRIDES;
        self
    }

    /// Transform hook run last over every composed hit
    #[must_use]
    pub fn hit_filter(mut self, filter: Arc<dyn HitFilter>) -> Self {
        self.hit_filter = Some(filter);
        self.usage |= usage::HIT_FILTER;
        self
    }

    /// Account namespace for the shared store keys
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Configured visible threshold in milliseconds
    #[must_use]
    pub const fn visible_threshold_ms(&self) -> u64 {
        self.visible_threshold_ms
    }

    /// Configured session timeout in milliseconds
    #[must_use]
    pub const fn session_timeout_ms(&self) -> i64 {
        self.session_timeout_ms
    }

    /// Configured custom metric slot, if any
    #[must_use]
    pub const fn metric_index(&self) -> Option<u32> {
        self.visible_metric_index
    }

    /// Configured field overrides
    #[must_use]
    pub const fn overrides(&self) -> &BTreeMap<String, String> {
        &self.field_overrides
    }

    /// Configured transform hook, if any
    #[must_use]
    pub fn filter(&self) -> Option<Arc<dyn HitFilter>> {
        self.hit_filter.clone()
    }

    /// Bitmask of the knobs that were explicitly set
    #[must_use]
    pub const fn usage_mask(&self) -> u8 {
        self.usage
    }
}

impl std::fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("account", &self.account)
            .field("visible_threshold_ms", &self.visible_threshold_ms)
            .field("session_timeout_ms", &self.session_timeout_ms)
            .field("visible_metric_index", &self.visible_metric_index)
            .field("field_overrides", &self.field_overrides)
            .field("has_filter", &self.hit_filter.is_some())
            .field("usage", &self.usage)
            .finish()
    }
}
