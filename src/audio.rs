//! Output sink interface for the audio attached to a voice session.
//!
//! The sink belongs to the voice connection. The scheduler only loads
//! tracks into it and reacts to its finished callback, which may fire on
//! any thread (usually the sink's own output thread).

use crate::track::Track;

/// Fired at most once per `play`. `Some(error)` when playback failed
/// mid-track, `None` on a normal end.
pub type FinishedCallback = Box<dyn FnOnce(Option<String>) + Send + 'static>;

pub trait OutputSink: Send + Sync {
    /// Start outputting `track`. The sink reads the track but does not own it.
    fn play(&self, track: &Track, on_finished: FinishedCallback) -> Result<(), String>;

    /// Stop output. A pending finished callback may be dropped unfired.
    fn stop(&self);

    /// True while audio is actively being output (not paused, not idle).
    fn is_playing(&self) -> bool;

    fn pause(&self);

    fn resume(&self);

    /// Set the output multiplier (1.0 = unchanged).
    fn set_volume(&self, volume: f32);

    fn volume(&self) -> f32;
}
