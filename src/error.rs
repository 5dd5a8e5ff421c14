//! Error types for pagevis
//!
//! The only errors that cross an API boundary are the ones a
//! [`SharedStore`](crate::store::SharedStore) implementation surfaces;
//! every other failure inside the tracker degrades functionality instead
//! of propagating, so a host page never sees it.

use thiserror::Error;

/// Errors surfaced by a [`SharedStore`](crate::store::SharedStore)
/// implementation
///
/// The tracker treats any of these as "store unavailable" and falls back to
/// single-context mode.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store backend is unavailable or refused the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Subscription id is unknown or the key cannot be watched
    #[error("subscription error: {0}")]
    Subscription(String),
}
