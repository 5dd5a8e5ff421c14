//! In-memory shared store with mirrored per-context views
//!
//! Each context reads its own cached view of the data. A write lands in the
//! writer's view and the canonical map immediately; every other context's
//! view is updated only when the corresponding notification is delivered.
//! In [`Delivery::Immediate`] mode delivery happens inside the write call,
//! which is how a single well-behaved host page behaves. In
//! [`Delivery::Manual`] mode notifications accumulate until
//! [`MemoryStore::flush`] (or a reordered flush) drains them, letting tests
//! reproduce the delivery delays and reorderings real contexts experience.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::StoreError;
use crate::page::ContextId;
use crate::store::{ChangeListener, SharedStore, StoreChange, SubscriptionId};

/// Notification delivery mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Deliver each notification synchronously inside the mutating call
    #[default]
    Immediate,
    /// Queue notifications until an explicit flush
    Manual,
}

struct Subscription {
    id: SubscriptionId,
    origin: ContextId,
    key: String,
    listener: ChangeListener,
}

struct PendingDelivery {
    target: ContextId,
    change: StoreChange,
}

#[derive(Default)]
struct State {
    /// Latest written value per key (last-write-wins)
    canonical: HashMap<String, String>,
    /// Per-context cached views, lazily snapshotted from canonical
    views: HashMap<ContextId, HashMap<String, Option<String>>>,
    subscriptions: Vec<Subscription>,
    pending: VecDeque<PendingDelivery>,
    next_subscription: u64,
}

/// In-memory [`SharedStore`] implementation
pub struct MemoryStore {
    delivery: Delivery,
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create a store with the given delivery mode
    #[must_use]
    pub fn new(delivery: Delivery) -> Self {
        Self {
            delivery,
            state: Mutex::new(State::default()),
        }
    }

    /// Number of notifications waiting for delivery
    ///
    /// Always zero in [`Delivery::Immediate`] mode.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Deliver all queued notifications in the order they were produced
    pub fn flush(&self) {
        while self.deliver_next() {}
    }

    /// Deliver all queued notifications in a random order
    ///
    /// Models cross-context delivery with no ordering guarantee.
    pub fn flush_reordered<R: Rng>(&self, rng: &mut R) {
        {
            let mut state = self.lock();
            let mut queued: Vec<PendingDelivery> = state.pending.drain(..).collect();
            queued.shuffle(rng);
            state.pending.extend(queued);
        }
        self.flush();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver the oldest queued notification; returns false when empty
    fn deliver_next(&self) -> bool {
        let (change, listeners) = {
            let mut state = self.lock();
            let Some(delivery) = state.pending.pop_front() else {
                return false;
            };
            // Mirror the write into the target's view before notifying
            Self::view_for(&mut state, delivery.target)
                .insert(delivery.change.key.clone(), delivery.change.value.clone());
            let listeners: Vec<ChangeListener> = state
                .subscriptions
                .iter()
                .filter(|s| s.origin == delivery.target && s.key == delivery.change.key)
                .map(|s| std::sync::Arc::clone(&s.listener))
                .collect();
            (delivery.change, listeners)
        };
        // Listeners run without the store lock so they may read and write
        for listener in listeners {
            listener(&change);
        }
        true
    }

    /// Record a mutation by `origin` and queue mirrors for all other
    /// contexts the store has seen.
    fn mutate(&self, origin: ContextId, key: &str, value: Option<String>) {
        {
            let mut state = self.lock();
            match &value {
                Some(v) => {
                    state.canonical.insert(key.to_string(), v.clone());
                }
                None => {
                    state.canonical.remove(key);
                }
            }
            Self::view_for(&mut state, origin)
                .insert(key.to_string(), value.clone());

            let mut targets: Vec<ContextId> = state
                .views
                .keys()
                .copied()
                .chain(state.subscriptions.iter().map(|s| s.origin))
                .filter(|t| *t != origin)
                .collect();
            targets.sort_unstable();
            targets.dedup();
            for target in targets {
                state.pending.push_back(PendingDelivery {
                    target,
                    change: StoreChange {
                        key: key.to_string(),
                        value: value.clone(),
                        origin,
                    },
                });
            }
        }
        if self.delivery == Delivery::Immediate {
            self.flush();
        }
    }

    fn view_for(
        state: &mut State,
        origin: ContextId,
    ) -> &mut HashMap<String, Option<String>> {
        if !state.views.contains_key(&origin) {
            let snapshot: HashMap<String, Option<String>> = state
                .canonical
                .iter()
                .map(|(k, v)| (k.clone(), Some(v.clone())))
                .collect();
            state.views.insert(origin, snapshot);
        }
        state
            .views
            .get_mut(&origin)
            .unwrap_or_else(|| unreachable!("view inserted above"))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Delivery::Immediate)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryStore")
            .field("delivery", &self.delivery)
            .field("keys", &state.canonical.len())
            .field("subscriptions", &state.subscriptions.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl SharedStore for MemoryStore {
    fn read(&self, origin: ContextId, key: &str) -> Result<Option<String>, StoreError> {
        let mut state = self.lock();
        Ok(Self::view_for(&mut state, origin).get(key).cloned().flatten())
    }

    fn write(&self, origin: ContextId, key: &str, value: &str) -> Result<(), StoreError> {
        self.mutate(origin, key, Some(value.to_string()));
        Ok(())
    }

    fn clear(&self, origin: ContextId, key: &str) -> Result<(), StoreError> {
        self.mutate(origin, key, None);
        Ok(())
    }

    fn subscribe(
        &self,
        origin: ContextId,
        key: &str,
        listener: ChangeListener,
    ) -> Result<SubscriptionId, StoreError> {
        let mut state = self.lock();
        // Subscribing is the context's first touch of the store; snapshot
        // its view now so later reads see the state as of subscription.
        let _ = Self::view_for(&mut state, origin);
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        state.subscriptions.push(Subscription {
            id,
            origin,
            key: key.to_string(),
            listener,
        });
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = self.lock();
        let Some(position) = state.subscriptions.iter().position(|s| s.id == id) else {
            return;
        };
        let origin = state.subscriptions.remove(position).origin;
        // Once a context's last subscription is gone, its cached view and
        // any undelivered mirrors go with it; a later read by the same id
        // starts over from a fresh canonical snapshot.
        if !state.subscriptions.iter().any(|s| s.origin == origin) {
            state.views.remove(&origin);
            state.pending.retain(|p| p.target != origin);
        }
    }
}
