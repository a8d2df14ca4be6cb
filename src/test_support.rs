//! Fakes for the scheduler's collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::audio::{FinishedCallback, OutputSink};
use crate::error::SchedulerError;
use crate::ids::{SessionId, UserId};
use crate::observer::SchedulerObserver;
use crate::resolver::TrackResolver;
use crate::scheduler::SchedulerDeps;
use crate::track::Track;

/// Records every release so tests can check exactly-once cleanup.
#[derive(Clone, Default)]
pub struct ReleaseLog {
    released: Arc<Mutex<Vec<String>>>,
}

impl ReleaseLog {
    pub fn track(&self, title: &str) -> Track {
        let log = self.released.clone();
        let name = title.to_string();
        Track::new(title, format!("https://youtube.com/watch?v={title}")).with_release(move || {
            log.lock().unwrap().push(name);
        })
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }

    pub fn count(&self, title: &str) -> usize {
        self.released().iter().filter(|t| t.as_str() == title).count()
    }
}

/// Output sink that keeps finished callbacks so tests decide when a track
/// ends, and from which thread.
#[derive(Default)]
pub struct RecordingSink {
    pub played: Mutex<Vec<String>>,
    callbacks: Mutex<Vec<FinishedCallback>>,
    playing: AtomicBool,
    paused: AtomicBool,
    pub stops: Mutex<usize>,
    volume: Mutex<f32>,
    fail_titles: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, title: &str) {
        self.fail_titles.lock().unwrap().push(title.to_string());
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    pub fn stop_count(&self) -> usize {
        *self.stops.lock().unwrap()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Take the finished callback of the most recent `play`.
    pub fn take_callback(&self) -> Option<FinishedCallback> {
        self.callbacks.lock().unwrap().pop()
    }

    /// Simulate the output thread reaching the end of the track.
    pub fn finish_on_thread(&self, error: Option<String>) {
        let callback = self.take_callback().expect("no pending callback");
        self.playing.store(false, Ordering::SeqCst);
        std::thread::spawn(move || callback(error)).join().unwrap();
    }
}

impl OutputSink for RecordingSink {
    fn play(&self, track: &Track, on_finished: FinishedCallback) -> Result<(), String> {
        if self.fail_titles.lock().unwrap().iter().any(|t| t == track.title()) {
            return Err(format!("cannot open {}", track.title()));
        }
        self.played.lock().unwrap().push(track.title().to_string());
        let mut callbacks = self.callbacks.lock().unwrap();
        callbacks.clear();
        callbacks.push(on_finished);
        self.playing.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        *self.stops.lock().unwrap() += 1;
        self.playing.store(false, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst) && !self.paused.load(Ordering::SeqCst)
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock().unwrap() = volume;
    }

    fn volume(&self) -> f32 {
        *self.volume.lock().unwrap()
    }
}

/// Resolver answering from a fixed table. Unknown URLs fail. When gated,
/// `resolve` waits for `open_gate` before answering.
#[derive(Default)]
pub struct ScriptedResolver {
    answers: Mutex<HashMap<String, Vec<String>>>,
    releases: ReleaseLog,
    gated: AtomicBool,
    gate: Notify,
    pub calls: Mutex<Vec<String>>,
    pub entered: Notify,
}

impl ScriptedResolver {
    pub fn new(releases: ReleaseLog) -> Arc<Self> {
        Arc::new(Self {
            releases,
            ..Default::default()
        })
    }

    pub fn answer(&self, url: &str, titles: &[&str]) {
        self.answers
            .lock()
            .unwrap()
            .insert(url.to_string(), titles.iter().map(|t| t.to_string()).collect());
    }

    pub fn hold(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn open_gate(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.notify_waiters();
    }
}

#[async_trait::async_trait]
impl TrackResolver for ScriptedResolver {
    async fn resolve(&self, url: &str) -> Result<Vec<Track>, String> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.gated.load(Ordering::SeqCst) {
            let opened = self.gate.notified();
            self.entered.notify_one();
            opened.await;
        }
        let titles = self
            .answers
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| format!("no such video: {url}"))?;
        Ok(titles.iter().map(|t| self.releases.track(t)).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start(String, UserId),
    End(String),
    Error(String, SchedulerError),
    ResolutionFailed(SchedulerError),
    Idle,
}

#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl SchedulerObserver for RecordingObserver {
    fn on_track_start(&self, _session: SessionId, track: &Track, requester: UserId) {
        self.events.lock().unwrap().push(Event::Start(track.title().to_string(), requester));
    }

    fn on_track_end(&self, _session: SessionId, track: &Track) {
        self.events.lock().unwrap().push(Event::End(track.title().to_string()));
    }

    fn on_track_error(&self, _session: SessionId, track: &Track, error: &SchedulerError) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Error(track.title().to_string(), error.clone()));
    }

    fn on_resolution_failed(&self, _session: SessionId, error: &SchedulerError) {
        self.events.lock().unwrap().push(Event::ResolutionFailed(error.clone()));
    }

    fn on_idle(&self, _session: SessionId) {
        self.events.lock().unwrap().push(Event::Idle);
    }
}

pub fn deps(resolver: Arc<ScriptedResolver>, observer: Arc<RecordingObserver>) -> SchedulerDeps {
    SchedulerDeps {
        resolver,
        observer,
        runtime: tokio::runtime::Handle::current(),
        default_volume: 0.5,
        skip_quorum: 3,
    }
}

/// Poll `check` until it holds, failing the test after a second.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
