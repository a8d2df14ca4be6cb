//! Hooks for reacting to scheduler events (now-playing messages, metrics).

use crate::error::SchedulerError;
use crate::ids::{SessionId, UserId};
use crate::track::Track;

/// Every hook defaults to a no-op. Hooks run while the session is locked,
/// so they must not call back into the same session.
pub trait SchedulerObserver: Send + Sync {
    fn on_track_start(&self, _session: SessionId, _track: &Track, _requester: UserId) {}

    fn on_track_end(&self, _session: SessionId, _track: &Track) {}

    fn on_track_error(&self, _session: SessionId, _track: &Track, _error: &SchedulerError) {}

    fn on_resolution_failed(&self, _session: SessionId, _error: &SchedulerError) {}

    fn on_idle(&self, _session: SessionId) {}
}

/// Logs scheduler events.
pub struct TracingObserver;

impl SchedulerObserver for TracingObserver {
    fn on_track_start(&self, session: SessionId, track: &Track, requester: UserId) {
        tracing::info!(
            %session,
            %requester,
            "[DJ] Playing: {} {}",
            track.title(),
            track.source_url()
        );
    }

    fn on_track_end(&self, session: SessionId, track: &Track) {
        crate::dlog!(%session, "[DJ] Track finished: {}", track.title());
    }

    fn on_track_error(&self, session: SessionId, track: &Track, error: &SchedulerError) {
        tracing::error!(%session, "[DJ] Track '{}' failed: {error}", track.title());
    }

    fn on_resolution_failed(&self, session: SessionId, error: &SchedulerError) {
        tracing::warn!(%session, "[DJ] Repeat reload skipped: {error}");
    }

    fn on_idle(&self, session: SessionId) {
        tracing::info!(%session, "[DJ] Queue empty, going idle");
    }
}
