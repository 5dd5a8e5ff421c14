//! Hit sender seam
//!
//! The analytics transport is an external collaborator; the tracker hands
//! each produced hit to a [`HitSender`] and never looks back.

use crate::hit::TrackingHit;

/// Receives every hit the tracker produces
pub trait HitSender: Send + Sync {
    /// Deliver one hit to the transport
    fn emit(&self, hit: TrackingHit);
}

/// Sender that logs hits instead of transporting them
///
/// Useful as a default while wiring a host up, and in examples.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSender;

impl HitSender for LogSender {
    fn emit(&self, hit: TrackingHit) {
        tracing::info!(
            kind = ?hit.kind,
            category = %hit.category,
            action = %hit.action,
            value = ?hit.value,
            page = %hit.page.path,
            non_interaction = hit.non_interaction,
            "hit emitted"
        );
    }
}
