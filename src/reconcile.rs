//! Session boundary reconciliation
//!
//! Decides whether a synthetic pageview must precede a pending hit because
//! the session expired since the last activity. A single per-context flag
//! implements the first-load exemption: a context's very first hit never
//! gets an injected pageview, because the page load that created the
//! context already produced one.

use crate::session::SessionMonitor;

/// Per-context injection decision state
#[derive(Debug, Default)]
pub struct BoundaryReconciler {
    has_sent_first_hit: bool,
}

impl BoundaryReconciler {
    /// Create a reconciler for a freshly-initialized context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide injection for a pending non-pageview hit
    ///
    /// Returns true when a synthetic pageview must be emitted immediately
    /// before the pending hit. Every call counts as sending a hit, so the
    /// exemption only ever applies once.
    pub fn should_inject(&mut self, session: &dyn SessionMonitor) -> bool {
        let expired = session.is_expired();
        let inject = expired && self.has_sent_first_hit;
        if expired && !self.has_sent_first_hit {
            tracing::debug!("session expired on first hit, injection exempt");
        }
        self.has_sent_first_hit = true;
        inject
    }

    /// Record that the context emitted a hit outside the pending-hit path
    ///
    /// Used for the session-start pageview sent on claiming with an expired
    /// session; subsequent expiries are no longer first-hit exempt.
    pub fn mark_sent(&mut self) {
        self.has_sent_first_hit = true;
    }
}
