//! Per-session playback state.

use std::sync::Arc;

use serde::Serialize;

use crate::audio::OutputSink;
use crate::ids::UserId;
use crate::queue::{Queue, QueueEntry, QueuedSummary};
use crate::votes::SkipVotes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Playing,
    /// The next track is being loaded (possibly waiting on the resolver).
    Transitioning,
}

impl Phase {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Phase::Idle => 0,
            Phase::Playing => 1,
            Phase::Transitioning => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Phase::Playing,
            2 => Phase::Transitioning,
            _ => Phase::Idle,
        }
    }
}

/// Everything one session owns. Only ever touched through the session's
/// lock in `TrackScheduler`.
pub struct SessionState {
    pub queue: Queue,
    pub current: Option<QueueEntry>,
    pub sink: Option<Arc<dyn OutputSink>>,
    pub volume: f32,
    pub repeat: bool,
    pub skip_votes: SkipVotes,
    /// Bumped every time `current` changes; tags finished callbacks.
    pub play_serial: u64,
    pub closed: bool,
}

impl SessionState {
    pub fn new(volume: f32) -> Self {
        Self {
            queue: Queue::new(),
            current: None,
            sink: None,
            volume: clamp_volume(volume),
            repeat: false,
            skip_votes: SkipVotes::new(),
            play_serial: 0,
            closed: false,
        }
    }

    /// Swap the current slot. Skip votes always reset with it.
    pub fn replace_current(&mut self, next: Option<QueueEntry>) -> Option<QueueEntry> {
        self.skip_votes.clear();
        self.play_serial += 1;
        std::mem::replace(&mut self.current, next)
    }

    pub fn snapshot(&self, phase: Phase, skip_quorum: usize) -> SessionSnapshot {
        SessionSnapshot {
            phase,
            now_playing: self.current.as_ref().map(QueuedSummary::from),
            queue: self.queue.summaries(),
            volume: self.volume,
            repeat: self.repeat,
            connected: self.sink.is_some(),
            skip_votes: self.skip_votes.count(),
            skip_quorum,
        }
    }
}

pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// What the presentation layer renders for `queue` / `np`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub now_playing: Option<QueuedSummary>,
    pub queue: Vec<QueuedSummary>,
    pub volume: f32,
    pub repeat: bool,
    pub connected: bool,
    pub skip_votes: usize,
    pub skip_quorum: usize,
}

impl SessionSnapshot {
    pub fn requester(&self) -> Option<UserId> {
        self.now_playing.as_ref().map(|np| np.requester)
    }
}
