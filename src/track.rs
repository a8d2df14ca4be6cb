//! Playable tracks.
//!
//! A `Track` is owned by exactly one container at a time (the queue or the
//! session's current slot). It is deliberately not `Clone`: releasing the
//! transport resources behind it must happen once.

use std::fmt;
use std::sync::Arc;

/// Decoded interleaved PCM ready for an output sink.
#[derive(Debug, Clone)]
pub struct PcmAudio {
    pub samples: Arc<Vec<i16>>,
    pub sample_rate: u32,
    pub channels: u16,
}

type ReleaseHook = Box<dyn FnOnce() + Send + 'static>;

pub struct Track {
    title: String,
    source_url: String,
    duration_secs: Option<u64>,
    audio: Option<PcmAudio>,
    release: Option<ReleaseHook>,
}

impl Track {
    pub fn new(title: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source_url: source_url.into(),
            duration_secs: None,
            audio: None,
            release: None,
        }
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_audio(mut self, audio: PcmAudio) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Register a hook that frees whatever transport resources back this
    /// track. Runs at most once, on `cleanup` or drop.
    pub fn with_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn duration_secs(&self) -> Option<u64> {
        self.duration_secs
    }

    pub fn audio(&self) -> Option<&PcmAudio> {
        self.audio.as_ref()
    }

    /// Human-readable duration, `M:SS` or `H:MM:SS`.
    pub fn duration_label(&self) -> Option<String> {
        self.duration_secs.map(|secs| {
            let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
            if h > 0 {
                format!("{h}:{m:02}:{s:02}")
            } else {
                format!("{m}:{s:02}")
            }
        })
    }

    /// Release the track's resources. Consumes the track, so it cannot be
    /// released twice.
    pub fn cleanup(mut self) {
        crate::dlog!("[Track] Cleanup: {}", self.title);
        self.release_resources();
    }

    fn release_resources(&mut self) {
        self.audio = None;
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Track {
    fn drop(&mut self) {
        self.release_resources();
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("title", &self.title)
            .field("source_url", &self.source_url)
            .field("duration_secs", &self.duration_secs)
            .field("has_audio", &self.audio.is_some())
            .finish()
    }
}
