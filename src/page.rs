//! Context and page identity types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ephemeral identity of one running context (tab or window)
///
/// Generated fresh on construction; never persisted beyond the shared
/// ownership record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generate a new random context id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Last-known identity of the page a context is displaying
///
/// Mutable over the lifetime of a context: single-page navigations swap it
/// without tearing the context down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageIdentity {
    /// Full page URL
    pub url: String,
    /// Path component reported with pageviews
    pub path: String,
}

impl PageIdentity {
    /// Build a page identity from a URL and path
    #[must_use]
    pub fn new(url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
        }
    }
}
