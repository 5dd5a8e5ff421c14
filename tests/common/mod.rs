//! Shared test utilities: simulated contexts over one shared store

use std::sync::{Arc, Mutex, Once};

use pagevis::{
    Clock, Collaborators, ContextId, HitSender, ManualClock, MemoryStore, PageIdentity,
    SharedStore, StoreError, SubscriptionId, TrackerConfig, TrackingHit, VisibilityTracker,
    session_key,
};

static TRACING: Once = Once::new();

/// Route tracker logs through `RUST_LOG` when a test run wants them
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Sender that captures every emitted hit
#[derive(Default)]
pub struct RecordingSender {
    hits: Mutex<Vec<TrackingHit>>,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn hits(&self) -> Vec<TrackingHit> {
        self.hits.lock().unwrap().clone()
    }
}

impl HitSender for RecordingSender {
    fn emit(&self, hit: TrackingHit) {
        self.hits.lock().unwrap().push(hit);
    }
}

/// Store whose every operation fails, for single-context fallback tests
pub struct FailingStore;

impl SharedStore for FailingStore {
    fn read(&self, _: ContextId, _: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("backend down".into()))
    }

    fn write(&self, _: ContextId, _: &str, _: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("backend down".into()))
    }

    fn clear(&self, _: ContextId, _: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("backend down".into()))
    }

    fn subscribe(
        &self,
        _: ContextId,
        _: &str,
        _: pagevis::ChangeListener,
    ) -> Result<SubscriptionId, StoreError> {
        Err(StoreError::Unavailable("backend down".into()))
    }

    fn unsubscribe(&self, _: SubscriptionId) {}
}

/// One simulated tab: a tracker plus its captured output
pub struct SimContext {
    pub tracker: VisibilityTracker,
    pub sender: Arc<RecordingSender>,
}

impl SimContext {
    pub fn show(&self) {
        self.tracker.handle_visibility(true);
    }

    pub fn hide(&self) {
        self.tracker.handle_visibility(false);
    }

    pub fn navigate(&self, path: &str) {
        self.tracker.handle_page_change(page(path));
    }

    pub fn hits(&self) -> Vec<TrackingHit> {
        self.sender.hits()
    }
}

pub fn page(path: &str) -> PageIdentity {
    PageIdentity::new(format!("https://example.com{path}"), path)
}

/// Open a simulated tab on `path` with the given native visibility
pub fn open_context(
    config: &TrackerConfig,
    store: &Arc<MemoryStore>,
    clock: &Arc<ManualClock>,
    path: &str,
    visible: bool,
) -> SimContext {
    let sender = RecordingSender::new();
    let collaborators = Collaborators {
        store: Arc::clone(store) as Arc<dyn SharedStore>,
        sender: Arc::clone(&sender) as Arc<dyn HitSender>,
        clock: Arc::clone(clock) as Arc<dyn Clock>,
        session: None,
    };
    let tracker = VisibilityTracker::new(config.clone(), collaborators, page(path), visible);
    SimContext { tracker, sender }
}

/// Record session activity "now", as the page-load pageview would have
pub fn start_session(store: &Arc<MemoryStore>, clock: &Arc<ManualClock>, account: &str) {
    store
        .write(
            ContextId::new(),
            &session_key(account),
            &clock.now_millis().to_string(),
        )
        .expect("session write failed");
}
