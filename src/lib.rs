//! Per-session music playback for a voice chat bot.
//!
//! Each voice session (guild) gets a `TrackScheduler` from the
//! `SessionRegistry`. Commands and the output sink's finished callbacks
//! both funnel through that scheduler, one at a time.

pub mod audio;
pub mod error;
pub mod ids;
pub mod observer;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod rodio_sink;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod track;
pub mod votes;

#[cfg(test)]
mod test_support;

pub use audio::{FinishedCallback, OutputSink};
pub use error::SchedulerError;
pub use ids::{SessionId, UserId};
pub use observer::{SchedulerObserver, TracingObserver};
pub use registry::SessionRegistry;
pub use resolver::{TrackResolver, YtdlResolver};
pub use scheduler::{AdvanceOutcome, EnqueueOutcome, PlayTicket, SkipOutcome, TrackScheduler};
pub use session::{Phase, SessionSnapshot};
pub use settings::Settings;
pub use track::{PcmAudio, Track};

/// Debug-level log line, tagged by subsystem in the message (`[DJ] ...`).
#[macro_export]
macro_rules! dlog {
    ($($arg:tt)*) => {
        ::tracing::debug!($($arg)*)
    };
}

/// Install the fmt subscriber. `RUST_LOG` wins over `default_filter`.
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
