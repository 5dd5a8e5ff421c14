//! Shared key-value store abstraction
//!
//! All cross-context coordination flows through one persisted key-value
//! store visible to every context of the same account. The store offers no
//! locking and no compare-and-swap: writes are last-write-wins, and other
//! contexts learn about them only through change notifications that arrive
//! with no timing guarantee.

mod memory;
mod record;

pub use memory::{Delivery, MemoryStore};
pub use record::{OwnershipRecord, ownership_key, session_key};

use std::sync::Arc;

use crate::error::StoreError;
use crate::page::ContextId;

/// A change notification delivered to subscribed contexts
///
/// Delivered to every subscriber of the key *except* the context that
/// performed the write.
#[derive(Debug, Clone)]
pub struct StoreChange {
    /// Key that changed
    pub key: String,
    /// New value, or `None` if the key was cleared
    pub value: Option<String>,
    /// Context that performed the write
    pub origin: ContextId,
}

/// Handle for cancelling a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Callback invoked with each change to a subscribed key
pub type ChangeListener = Arc<dyn Fn(&StoreChange) + Send + Sync>;

/// Persistent cross-context key-value storage with change notification
///
/// Reads are synchronous against the calling context's local view; writes
/// take effect locally at once and are mirrored to other contexts
/// asynchronously. Implementations must never notify the writing context of
/// its own write.
pub trait SharedStore: Send + Sync {
    /// Read the value under `key` as seen by `origin`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend is unavailable.
    fn read(&self, origin: ContextId, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` under `key` on behalf of `origin`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend is unavailable.
    fn write(&self, origin: ContextId, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove the value under `key` on behalf of `origin`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend is unavailable.
    fn clear(&self, origin: ContextId, key: &str) -> Result<(), StoreError>;

    /// Subscribe `origin` to changes of `key` made by other contexts
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot register the listener.
    fn subscribe(
        &self,
        origin: ContextId,
        key: &str,
        listener: ChangeListener,
    ) -> Result<SubscriptionId, StoreError>;

    /// Cancel a subscription; unknown ids are ignored
    fn unsubscribe(&self, id: SubscriptionId);
}
