//! Session expiry collaboration
//!
//! The tracker never owns session bookkeeping; it consults a
//! [`SessionMonitor`] at the moment a hit would be sent and refreshes it
//! whenever one is. [`StoreSession`] shares last-activity time across
//! contexts through the same store the ownership record lives in.

use std::sync::Arc;

use crate::clock::Clock;
use crate::page::ContextId;
use crate::store::SharedStore;

/// Externally-tracked session expiry state
pub trait SessionMonitor: Send + Sync {
    /// Whether the session boundary has lapsed due to inactivity
    fn is_expired(&self) -> bool;

    /// Record that activity occurred now, refreshing the timeout
    fn record_activity(&self);
}

/// Store-backed [`SessionMonitor`]
///
/// Keeps the last-activity timestamp under the account's session key so
/// every context of the account consults the same expiry state. A session
/// that never recorded activity is not expired; store failures and
/// malformed values degrade to "not expired" rather than surfacing.
pub struct StoreSession {
    store: Arc<dyn SharedStore>,
    key: String,
    origin: ContextId,
    timeout_ms: i64,
    clock: Arc<dyn Clock>,
}

impl StoreSession {
    /// Create a monitor for `origin` over the given session key
    #[must_use]
    pub fn new(
        store: Arc<dyn SharedStore>,
        key: String,
        origin: ContextId,
        timeout_ms: i64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            key,
            origin,
            timeout_ms,
            clock,
        }
    }

    fn last_activity(&self) -> Option<i64> {
        match self.store.read(self.origin, &self.key) {
            Ok(Some(raw)) => raw.parse().ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(error = %e, "session read failed, treating as active");
                None
            }
        }
    }
}

impl SessionMonitor for StoreSession {
    fn is_expired(&self) -> bool {
        self.last_activity()
            .is_some_and(|last| self.clock.now_millis() - last > self.timeout_ms)
    }

    fn record_activity(&self) {
        let now = self.clock.now_millis();
        if let Err(e) = self.store.write(self.origin, &self.key, &now.to_string()) {
            tracing::debug!(error = %e, "session refresh failed");
        }
    }
}

impl std::fmt::Debug for StoreSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSession")
            .field("key", &self.key)
            .field("origin", &self.origin)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{Delivery, MemoryStore};

    fn session_over(store: &Arc<MemoryStore>, clock: &Arc<ManualClock>) -> StoreSession {
        StoreSession::new(
            Arc::clone(store) as Arc<dyn SharedStore>,
            "acct/session".to_string(),
            ContextId::new(),
            1000,
            Arc::clone(clock) as Arc<dyn Clock>,
        )
    }

    #[test]
    fn never_started_session_is_not_expired() {
        let store = Arc::new(MemoryStore::new(Delivery::Immediate));
        let clock = Arc::new(ManualClock::from_system());
        let session = session_over(&store, &clock);
        assert!(!session.is_expired());
    }

    #[test]
    fn expires_only_past_the_timeout() {
        let store = Arc::new(MemoryStore::new(Delivery::Immediate));
        let clock = Arc::new(ManualClock::from_system());
        let session = session_over(&store, &clock);
        session.record_activity();
        clock.advance_millis(1000);
        assert!(!session.is_expired());
        clock.advance_millis(1);
        assert!(session.is_expired());
    }

    #[test]
    fn activity_refreshes_the_timeout() {
        let store = Arc::new(MemoryStore::new(Delivery::Immediate));
        let clock = Arc::new(ManualClock::from_system());
        let session = session_over(&store, &clock);
        session.record_activity();
        clock.advance_millis(900);
        session.record_activity();
        clock.advance_millis(900);
        assert!(!session.is_expired());
    }

    #[test]
    fn expiry_state_is_shared_across_contexts() {
        let store = Arc::new(MemoryStore::new(Delivery::Immediate));
        let clock = Arc::new(ManualClock::from_system());
        let a = session_over(&store, &clock);
        let b = session_over(&store, &clock);
        a.record_activity();
        clock.advance_millis(500);
        assert!(!b.is_expired());
        clock.advance_millis(1000);
        assert!(b.is_expired());
    }

    #[test]
    fn malformed_stored_value_reads_as_active() {
        let store = Arc::new(MemoryStore::new(Delivery::Immediate));
        let clock = Arc::new(ManualClock::from_system());
        let session = session_over(&store, &clock);
        store
            .write(ContextId::new(), "acct/session", "not-a-number")
            .unwrap();
        assert!(!session.is_expired());
    }
}
