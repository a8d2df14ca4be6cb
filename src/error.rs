//! Errors surfaced by the session scheduler.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The command needs an attached output sink.
    #[error("Not connected to a voice channel")]
    NotConnected,

    /// `request_play` was called while something is loaded.
    #[error("Already playing; enqueue the track instead")]
    AlreadyPlaying,

    #[error("Not playing anything")]
    NothingPlaying,

    /// The resolver failed or returned no tracks.
    #[error("Failed to resolve {url}: {reason}")]
    ResolutionFailed { url: String, reason: String },

    /// The sink refused a track or reported an error mid-track.
    #[error("Playback error: {0}")]
    Playback(String),

    /// A notification for a track that is no longer current.
    #[error("Stale playback notification")]
    StaleNotification,

    /// The session was torn down while the command was waiting.
    #[error("Session closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
