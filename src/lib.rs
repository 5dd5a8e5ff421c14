//! pagevis - Cross-context page visibility coordination for analytics
//!
//! Many independently-executing browser contexts (tabs, windows) share one
//! logical analytics session but no memory and no messaging channel beyond
//! a persisted key-value store with change notifications. This library
//! guarantees that visible engagement time is attributed to exactly one
//! context at a time, that no duplicate or missing hits occur across
//! arbitrary open/close/navigate sequences, and that session boundaries
//! discovered after the fact still produce correct, ordered output.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                Native browser signals                 │
//! │   visibility change │ navigation │ unload             │
//! └──────────────────────┬───────────────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────────────┐
//! │          VisibilityTracker (per context)              │
//! │   claim / release  │  BoundaryReconciler  │ Composer  │
//! └───────┬──────────────────────────────────┬───────────┘
//!         │                                  │
//! ┌───────▼────────────────┐   ┌─────────────▼───────────┐
//! │  SharedStore            │   │  HitSender (transport)  │
//! │  one record per account │   └─────────────────────────┘
//! │  change notifications   │
//! └────────────────────────┘
//! ```
//!
//! Every tracker of an account subscribes to the account's ownership
//! record. Claims and releases are last-write-wins; races are tolerated by
//! re-reading before every mutation and never clearing a record that names
//! another context.

pub mod clock;
pub mod config;
pub mod error;
pub mod hit;
pub mod page;
pub mod reconcile;
pub mod sender;
pub mod session;
pub mod store;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DEFAULT_SESSION_TIMEOUT_MS, TrackerConfig};
pub use error::StoreError;
pub use hit::{CustomMetric, FilterVerdict, HitComposer, HitFilter, HitKind, TrackingHit};
pub use page::{ContextId, PageIdentity};
pub use reconcile::BoundaryReconciler;
pub use sender::{HitSender, LogSender};
pub use session::{SessionMonitor, StoreSession};
pub use store::{
    ChangeListener, Delivery, MemoryStore, OwnershipRecord, SharedStore, StoreChange,
    SubscriptionId, ownership_key, session_key,
};
pub use tracker::{Collaborators, TrackerState, VisibilityTracker};
