//! Shared ownership record codec

use serde::{Deserialize, Serialize};

use crate::page::{ContextId, PageIdentity};

/// Store key for the ownership record of an account
#[must_use]
pub fn ownership_key(account: &str) -> String {
    format!("{account}/page-visibility")
}

/// Store key for the shared session record of an account
#[must_use]
pub fn session_key(account: &str) -> String {
    format!("{account}/session")
}

/// The single visibility-ownership record shared by all contexts of an
/// account
///
/// Mutated by whichever context claims or releases ownership; read by every
/// context on init and on change notification. Last-write-wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    /// Context currently attributed with visible engagement, if any
    pub owner: Option<ContextId>,
    /// Epoch milliseconds at which the owner's visible period started
    pub start_time: i64,
    /// Page identity the owner was displaying when it claimed
    pub page: PageIdentity,
}

impl OwnershipRecord {
    /// Build the record a context writes when claiming ownership
    #[must_use]
    pub fn claim(owner: ContextId, start_time: i64, page: PageIdentity) -> Self {
        Self {
            owner: Some(owner),
            start_time,
            page,
        }
    }

    /// Decode a stored record
    ///
    /// A malformed record is indistinguishable from a vacancy: whatever is
    /// in the store that cannot be parsed is treated as "no owner".
    #[must_use]
    pub fn decode(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(error = %e, "malformed ownership record, treating as vacant");
                None
            }
        }
    }

    /// Encode the record for storage
    #[must_use]
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
