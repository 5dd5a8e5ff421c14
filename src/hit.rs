//! Telemetry hit composition
//!
//! Builds the outgoing [`TrackingHit`] values from raw measurements:
//! defaults, then configuration-level field overrides, then the optional
//! custom metric, then the user's transform hook, and finally the fixed
//! usage-instrumentation fields that nothing may override.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::page::PageIdentity;

/// Library identity carried on every hit
pub const LIBRARY: &str = env!("CARGO_PKG_NAME");

/// Library version carried on every hit
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default event category
pub const CATEGORY: &str = "Page Visibility";

/// Default event action
pub const ACTION: &str = "track";

/// Bit flags recording which optional configuration knobs were set
pub mod usage {
    /// `visible_threshold` was overridden
    pub const VISIBLE_THRESHOLD: u8 = 1 << 0;
    /// A custom metric slot was configured
    pub const CUSTOM_METRIC: u8 = 1 << 1;
    /// The session timeout was overridden
    pub const SESSION_TIMEOUT: u8 = 1 << 2;
    /// Field overrides were supplied
    pub const FIELD_OVERRIDES: u8 = 1 << 3;
    /// A transform hook was supplied
    pub const HIT_FILTER: u8 = 1 << 4;
}

/// Kind of outgoing hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    /// Measured visible-time event
    Event,
    /// Synthetic pageview marking a session boundary
    Pageview,
}

/// Custom metric slot carrying the visible seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomMetric {
    /// Metric slot index
    pub index: u32,
    /// Visible seconds
    pub value: u64,
}

/// One outgoing telemetry hit
///
/// Constructed once per emission and handed straight to the sender; never
/// retained by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingHit {
    /// Event or synthetic pageview
    pub kind: HitKind,
    /// Event category
    pub category: String,
    /// Event action
    pub action: String,
    /// Measured visible time in whole seconds (events only)
    pub value: Option<u64>,
    /// Whether the hit is excluded from bounce/engagement calculations
    pub non_interaction: bool,
    /// Optional custom metric carrying the same seconds value
    pub metric: Option<CustomMetric>,
    /// Page the measurement is attributed to
    pub page: PageIdentity,
    /// Open field map for overrides the hit schema does not type
    pub fields: BTreeMap<String, String>,
    /// Library identity (never overridable)
    pub library: String,
    /// Library version (never overridable)
    pub version: String,
    /// Configuration-knob bitmask (never overridable)
    pub usage: u8,
}

/// Verdict returned by a [`HitFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// Send the (possibly mutated) hit
    Keep,
    /// Suppress the hit
    Discard,
}

/// User-supplied transform hook
///
/// Runs last, with full access to the composed fields. Returning an error
/// drops the one affected hit; it is never retried and never crashes the
/// tracker.
pub trait HitFilter: Send + Sync {
    /// Inspect and optionally mutate the hit
    ///
    /// # Errors
    ///
    /// Any error drops the hit.
    fn apply(&self, hit: &mut TrackingHit) -> anyhow::Result<FilterVerdict>;
}

impl<F> HitFilter for F
where
    F: Fn(&mut TrackingHit) -> anyhow::Result<FilterVerdict> + Send + Sync,
{
    fn apply(&self, hit: &mut TrackingHit) -> anyhow::Result<FilterVerdict> {
        self(hit)
    }
}

/// Builds outgoing hits from raw measurements
pub struct HitComposer {
    overrides: BTreeMap<String, String>,
    metric_index: Option<u32>,
    filter: Option<Arc<dyn HitFilter>>,
    usage: u8,
}

impl HitComposer {
    /// Create a composer from the configuration-level pieces
    #[must_use]
    pub fn new(
        overrides: BTreeMap<String, String>,
        metric_index: Option<u32>,
        filter: Option<Arc<dyn HitFilter>>,
        usage: u8,
    ) -> Self {
        Self {
            overrides,
            metric_index,
            filter,
            usage,
        }
    }

    /// Compose a visible-time event for `elapsed_ms` on `page`
    ///
    /// Seconds are floor-divided from milliseconds. Returns `None` when the
    /// transform hook suppressed or failed the hit.
    #[must_use]
    pub fn visible_time(&self, elapsed_ms: u64, page: &PageIdentity) -> Option<TrackingHit> {
        let seconds = elapsed_ms / 1000;
        let hit = TrackingHit {
            kind: HitKind::Event,
            category: CATEGORY.to_string(),
            action: ACTION.to_string(),
            value: Some(seconds),
            non_interaction: true,
            metric: self
                .metric_index
                .map(|index| CustomMetric { index, value: seconds }),
            page: page.clone(),
            fields: BTreeMap::new(),
            library: String::new(),
            version: String::new(),
            usage: 0,
        };
        self.finish(hit)
    }

    /// Compose a synthetic session-boundary pageview for `page`
    #[must_use]
    pub fn pageview(&self, page: &PageIdentity) -> Option<TrackingHit> {
        let hit = TrackingHit {
            kind: HitKind::Pageview,
            category: String::new(),
            action: String::new(),
            value: None,
            non_interaction: false,
            metric: None,
            page: page.clone(),
            fields: BTreeMap::new(),
            library: String::new(),
            version: String::new(),
            usage: 0,
        };
        self.finish(hit)
    }

    /// Apply overrides, the transform hook, and the fixed usage fields
    fn finish(&self, mut hit: TrackingHit) -> Option<TrackingHit> {
        for (name, value) in &self.overrides {
            apply_override(&mut hit, name, value);
        }

        if let Some(filter) = &self.filter {
            match filter.apply(&mut hit) {
                Ok(FilterVerdict::Keep) => {}
                Ok(FilterVerdict::Discard) => {
                    tracing::debug!(kind = ?hit.kind, "hit discarded by filter");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(kind = ?hit.kind, error = %e, "hit filter failed, dropping hit");
                    return None;
                }
            }
        }

        // Usage instrumentation is appended unconditionally, after the hook
        hit.library = LIBRARY.to_string();
        hit.version = VERSION.to_string();
        hit.usage = self.usage;
        Some(hit)
    }
}

impl std::fmt::Debug for HitComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HitComposer")
            .field("overrides", &self.overrides)
            .field("metric_index", &self.metric_index)
            .field("has_filter", &self.filter.is_some())
            .field("usage", &self.usage)
            .finish()
    }
}

/// Overrides replace defaults exactly; recognized names map onto the typed
/// fields, anything else lands in the open field map.
fn apply_override(hit: &mut TrackingHit, name: &str, value: &str) {
    match name {
        "eventCategory" => hit.category = value.to_string(),
        "eventAction" => hit.action = value.to_string(),
        "eventValue" => {
            if let Ok(v) = value.parse() {
                hit.value = Some(v);
            }
        }
        "nonInteraction" => hit.non_interaction = !matches!(value, "false" | "0"),
        _ => {
            hit.fields.insert(name.to_string(), value.to_string());
        }
    }
}
