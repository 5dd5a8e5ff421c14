//! Per-context visibility coordination state machine
//!
//! One [`VisibilityTracker`] runs inside each context (tab or window). It
//! consumes the context's native visibility and navigation signals plus
//! shared-store change notifications, decides when this context owns the
//! account's visible engagement, measures owned periods, and emits the
//! resulting hits.
//!
//! Ownership is coordinated optimistically: the store offers no locking, so
//! a claim may race another context's claim. Every release re-reads the
//! record and only clears it when it still names this context; a stale
//! release after a lost race touches nothing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::error::StoreError;
use crate::hit::HitComposer;
use crate::page::{ContextId, PageIdentity};
use crate::reconcile::BoundaryReconciler;
use crate::sender::HitSender;
use crate::session::{SessionMonitor, StoreSession};
use crate::store::{
    ChangeListener, OwnershipRecord, SharedStore, StoreChange, SubscriptionId, ownership_key,
    session_key,
};

/// Coordination state of one context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Not yet initialized
    Unbound,
    /// Context exists but does not own visibility
    Hidden,
    /// Context currently claims global visibility
    Owner,
}

/// External collaborators a tracker is wired to
#[derive(Clone)]
pub struct Collaborators {
    /// Shared cross-context store
    pub store: Arc<dyn SharedStore>,
    /// Analytics transport
    pub sender: Arc<dyn HitSender>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Session expiry collaborator; `None` uses a store-backed session
    /// under the account's session key
    pub session: Option<Arc<dyn SessionMonitor>>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("custom_session", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

/// The period this context currently believes it owns
#[derive(Debug, Clone)]
struct ActivePeriod {
    start_ms: i64,
    page: PageIdentity,
}

struct TrackerInner {
    id: ContextId,
    state: TrackerState,
    visible: bool,
    page: PageIdentity,
    active: Option<ActivePeriod>,
    key: String,
    threshold_ms: u64,
    degraded: bool,
    finished: bool,
    composer: HitComposer,
    reconciler: BoundaryReconciler,
    store: Arc<dyn SharedStore>,
    session: Arc<dyn SessionMonitor>,
    sender: Arc<dyn HitSender>,
    clock: Arc<dyn Clock>,
    subscription: Option<SubscriptionId>,
}

/// Per-context visibility coordinator
///
/// Dropping the tracker performs the same best-effort teardown a context
/// unload would; both are no-ops after an explicit [`teardown`] or
/// [`remove`].
///
/// [`teardown`]: VisibilityTracker::teardown
/// [`remove`]: VisibilityTracker::remove
pub struct VisibilityTracker {
    inner: Arc<Mutex<TrackerInner>>,
}

impl VisibilityTracker {
    /// Create and initialize a tracker for a context displaying `page`
    /// with the given native visibility
    ///
    /// Reads the shared record and claims ownership iff the context is
    /// visible and the record is vacant.
    #[must_use]
    pub fn new(
        config: TrackerConfig,
        collaborators: Collaborators,
        page: PageIdentity,
        visible: bool,
    ) -> Self {
        Self::build(ContextId::new(), config, collaborators, page, visible)
    }

    /// Re-initialize a tracker under the identity a previous incarnation
    /// of this context persisted before reloading
    ///
    /// A reloading page whose unload handler never ran leaves the shared
    /// record naming its old identity. Resuming under that identity
    /// reclaims the record directly instead of waiting out a release that
    /// will never arrive.
    #[must_use]
    pub fn resume(
        id: ContextId,
        config: TrackerConfig,
        collaborators: Collaborators,
        page: PageIdentity,
        visible: bool,
    ) -> Self {
        Self::build(id, config, collaborators, page, visible)
    }

    fn build(
        id: ContextId,
        config: TrackerConfig,
        collaborators: Collaborators,
        page: PageIdentity,
        visible: bool,
    ) -> Self {
        let session = collaborators.session.clone().unwrap_or_else(|| {
            Arc::new(StoreSession::new(
                Arc::clone(&collaborators.store),
                session_key(config.account()),
                id,
                config.session_timeout_ms(),
                Arc::clone(&collaborators.clock),
            ))
        });

        let composer = HitComposer::new(
            config.overrides().clone(),
            config.metric_index(),
            config.filter(),
            config.usage_mask(),
        );
        let key = ownership_key(config.account());

        let inner = Arc::new(Mutex::new(TrackerInner {
            id,
            state: TrackerState::Unbound,
            visible,
            page,
            active: None,
            key: key.clone(),
            threshold_ms: config.visible_threshold_ms(),
            degraded: false,
            finished: false,
            composer,
            reconciler: BoundaryReconciler::new(),
            store: Arc::clone(&collaborators.store),
            session,
            sender: Arc::clone(&collaborators.sender),
            clock: Arc::clone(&collaborators.clock),
            subscription: None,
        }));

        // Subscribe before init so no foreign claim slips by unobserved.
        // The listener holds a weak reference; a dropped tracker goes quiet.
        let weak: Weak<Mutex<TrackerInner>> = Arc::downgrade(&inner);
        let listener: ChangeListener = Arc::new(move |change: &StoreChange| {
            if let Some(inner) = weak.upgrade() {
                lock_inner(&inner).on_store_change(change);
            }
        });
        let subscription = collaborators.store.subscribe(id, &key, listener);

        {
            let mut guard = lock_inner(&inner);
            match subscription {
                Ok(sub) => guard.subscription = Some(sub),
                Err(e) => guard.degrade(&e),
            }
            guard.init();
        }

        Self { inner }
    }

    /// This context's ephemeral identity
    #[must_use]
    pub fn context_id(&self) -> ContextId {
        self.lock().id
    }

    /// Current coordination state
    #[must_use]
    pub fn state(&self) -> TrackerState {
        self.lock().state
    }

    /// Whether the tracker fell back to single-context mode after a store
    /// failure
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.lock().degraded
    }

    /// Native visibility changed for this context
    pub fn handle_visibility(&self, visible: bool) {
        self.lock().on_visibility(visible);
    }

    /// The context navigated to a new page identity without unloading
    pub fn handle_page_change(&self, page: PageIdentity) {
        self.lock().on_page_change(page);
    }

    /// Best-effort unload: release and emit if owning, then unsubscribe
    ///
    /// Terminal; later signals are ignored.
    pub fn teardown(&self) {
        self.lock().teardown();
    }

    /// Unsubscribe all local listeners without emitting anything
    ///
    /// Idempotent and terminal; already-emitted hits are unaffected.
    pub fn remove(&self) {
        self.lock().finish();
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        lock_inner(&self.inner)
    }
}

impl Drop for VisibilityTracker {
    fn drop(&mut self) {
        self.lock().teardown();
    }
}

impl std::fmt::Debug for VisibilityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("VisibilityTracker")
            .field("id", &inner.id)
            .field("state", &inner.state)
            .field("page", &inner.page.path)
            .field("degraded", &inner.degraded)
            .field("finished", &inner.finished)
            .finish()
    }
}

fn lock_inner(inner: &Arc<Mutex<TrackerInner>>) -> MutexGuard<'_, TrackerInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TrackerInner {
    fn init(&mut self) {
        let owner = self.read_record().and_then(|r| r.owner);
        if self.visible && owner.is_none_or(|o| o == self.id) {
            self.claim();
            self.maybe_start_session();
        } else {
            self.state = TrackerState::Hidden;
        }
        tracing::debug!(
            context = %self.id,
            state = ?self.state,
            page = %self.page.path,
            "tracker initialized"
        );
    }

    fn on_visibility(&mut self, visible: bool) {
        if self.finished {
            return;
        }
        self.visible = visible;
        match (self.state, visible) {
            (TrackerState::Hidden, true) => {
                // Re-read so a concurrent claimant is not clobbered
                let owner = self.read_record().and_then(|r| r.owner);
                if owner.is_none_or(|o| o == self.id) {
                    self.claim();
                    self.maybe_start_session();
                }
            }
            (TrackerState::Owner, false) => self.release(),
            _ => {}
        }
    }

    fn on_page_change(&mut self, page: PageIdentity) {
        if self.finished {
            return;
        }
        if self.state == TrackerState::Owner {
            // Atomic hide-then-show: close the interval on the old
            // identity, then re-claim fresh on the new one
            self.release();
            self.page = page;
            self.claim();
        } else {
            self.page = page;
        }
    }

    fn on_store_change(&mut self, change: &StoreChange) {
        if self.finished || change.key != self.key {
            return;
        }
        let new_owner = change
            .value
            .as_deref()
            .and_then(OwnershipRecord::decode)
            .and_then(|r| r.owner);
        if self.state == TrackerState::Owner && new_owner != Some(self.id) {
            tracing::debug!(
                context = %self.id,
                new_owner = ?new_owner,
                "ownership superseded by external claim"
            );
            self.release();
        }
        // A vacancy seen while hidden is never auto-claimed; only a local
        // native-visibility signal claims, so hidden contexts cannot race
        // each other to fill it.
    }

    fn teardown(&mut self) {
        if self.finished {
            return;
        }
        if self.state == TrackerState::Owner {
            self.release();
        }
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(sub) = self.subscription.take() {
            self.store.unsubscribe(sub);
        }
        self.finished = true;
    }

    /// Claim global visibility for this context: record the active period
    /// locally and publish it
    fn claim(&mut self) {
        let now = self.clock.now_millis();
        self.active = Some(ActivePeriod {
            start_ms: now,
            page: self.page.clone(),
        });
        self.state = TrackerState::Owner;
        let record = OwnershipRecord::claim(self.id, now, self.page.clone());
        self.store_write(&record.encode());
        tracing::debug!(context = %self.id, page = %self.page.path, "claimed ownership");
    }

    /// Close the owned period: emit the measurement if it clears the
    /// threshold, then clear the shared record iff it still names us
    fn release(&mut self) {
        let Some(period) = self.active.take() else {
            self.state = TrackerState::Hidden;
            return;
        };
        let elapsed_ms =
            u64::try_from(self.clock.now_millis() - period.start_ms).unwrap_or(0);
        if elapsed_ms >= self.threshold_ms {
            self.emit_visible_time(elapsed_ms, &period.page);
        } else {
            tracing::debug!(
                context = %self.id,
                elapsed_ms,
                threshold_ms = self.threshold_ms,
                "visible period under threshold, not reported"
            );
        }
        // Optimistic re-check: a stale release after a lost claim race
        // must leave the record alone
        if self.read_record().is_some_and(|r| r.owner == Some(self.id)) {
            self.store_clear();
        }
        self.state = TrackerState::Hidden;
        tracing::debug!(context = %self.id, elapsed_ms, "released ownership");
    }

    /// Route one measured period through the reconciler, the composer, and
    /// out to the sender
    fn emit_visible_time(&mut self, elapsed_ms: u64, page: &PageIdentity) {
        if self.reconciler.should_inject(self.session.as_ref()) {
            if let Some(pageview) = self.composer.pageview(&self.page) {
                tracing::debug!(context = %self.id, page = %self.page.path, "injecting session-boundary pageview");
                self.sender.emit(pageview);
                self.session.record_activity();
            }
        }
        if let Some(hit) = self.composer.visible_time(elapsed_ms, page) {
            self.sender.emit(hit);
            self.session.record_activity();
        }
    }

    /// Entering ownership with an expired session starts a new one with a
    /// synthetic pageview
    fn maybe_start_session(&mut self) {
        if !self.session.is_expired() {
            return;
        }
        if let Some(pageview) = self.composer.pageview(&self.page) {
            tracing::debug!(context = %self.id, page = %self.page.path, "session expired, starting new one with a pageview");
            self.sender.emit(pageview);
            self.session.record_activity();
            self.reconciler.mark_sent();
        }
    }

    fn read_record(&mut self) -> Option<OwnershipRecord> {
        if self.degraded {
            return None;
        }
        match self.store.read(self.id, &self.key) {
            Ok(raw) => raw.as_deref().and_then(OwnershipRecord::decode),
            Err(e) => {
                self.degrade(&e);
                None
            }
        }
    }

    fn store_write(&mut self, value: &str) {
        if self.degraded {
            return;
        }
        if let Err(e) = self.store.write(self.id, &self.key, value) {
            self.degrade(&e);
        }
    }

    fn store_clear(&mut self) {
        if self.degraded {
            return;
        }
        if let Err(e) = self.store.clear(self.id, &self.key) {
            self.degrade(&e);
        }
    }

    /// Permanent fallback to single-context mode: visibility signals keep
    /// working locally, cross-context deduplication is off, and the error
    /// never reaches the host
    fn degrade(&mut self, e: &StoreError) {
        if !self.degraded {
            tracing::warn!(
                context = %self.id,
                error = %e,
                "shared store unavailable, falling back to single-context mode"
            );
        }
        self.degraded = true;
    }
}
