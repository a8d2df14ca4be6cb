//! Per-session track scheduler.
//!
//! Every mutation of a session goes through one `tokio::sync::Mutex`, so
//! user commands and finished callbacks coming from the output thread are
//! applied one at a time, in arrival order. The lock is held across the
//! repeat reload, which makes new commands wait while the session is
//! `Transitioning`. Finished callbacks carry a `PlayTicket`; a ticket that
//! no longer matches the loaded track is stale and ignored.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex, MutexGuard};

use crate::audio::{FinishedCallback, OutputSink};
use crate::error::{Result, SchedulerError};
use crate::ids::{SessionId, UserId};
use crate::observer::SchedulerObserver;
use crate::queue::QueueEntry;
use crate::resolver::TrackResolver;
use crate::session::{clamp_volume, Phase, SessionSnapshot, SessionState};
use crate::track::Track;
use crate::votes::{evaluate_skip, SkipDecision};

/// Identifies one `play` call on one scheduler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayTicket {
    pub generation: u64,
    pub serial: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Playing { title: String },
    /// Nothing left to play.
    Idle,
    /// The session was torn down while the repeat reload was outstanding.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipOutcome {
    Skipped(AdvanceOutcome),
    Voted { votes: usize, needed: usize },
    AlreadyVoted { votes: usize, needed: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Started { title: String },
    Queued { title: String, position: usize },
}

/// Collaborators shared by every scheduler a registry creates.
#[derive(Clone)]
pub struct SchedulerDeps {
    pub resolver: Arc<dyn TrackResolver>,
    pub observer: Arc<dyn SchedulerObserver>,
    pub runtime: Handle,
    pub default_volume: f32,
    pub skip_quorum: usize,
}

pub struct TrackScheduler {
    id: SessionId,
    generation: u64,
    state: Mutex<SessionState>,
    phase: AtomicU8,
    shutdown: watch::Sender<bool>,
    deps: SchedulerDeps,
}

impl TrackScheduler {
    pub fn new(id: SessionId, generation: u64, deps: SchedulerDeps) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            id,
            generation,
            state: Mutex::new(SessionState::new(deps.default_volume)),
            phase: AtomicU8::new(Phase::Idle.to_u8()),
            shutdown,
            deps,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Lock-free view of the playback phase.
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.store(phase.to_u8(), Ordering::SeqCst);
    }

    async fn lock_open(&self) -> Result<MutexGuard<'_, SessionState>> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(SchedulerError::SessionClosed);
        }
        Ok(state)
    }

    /// Attach the voice connection's output sink. Replacing a sink stops
    /// whatever the old one was playing and releases the current track.
    pub async fn attach_sink(&self, sink: Arc<dyn OutputSink>) -> Result<()> {
        let mut state = self.lock_open().await?;
        if let Some(old) = state.sink.take() {
            self.release_current(&mut state, old.as_ref());
        }
        sink.set_volume(state.volume);
        state.sink = Some(sink);
        crate::dlog!(session = %self.id, "[DJ] Sink attached");
        Ok(())
    }

    /// Drop the sink, stopping and releasing the current track. The queue
    /// is kept for the next connection.
    pub async fn detach_sink(&self) -> Result<()> {
        let mut state = self.lock_open().await?;
        if let Some(sink) = state.sink.take() {
            self.release_current(&mut state, sink.as_ref());
        }
        Ok(())
    }

    fn release_current(&self, state: &mut SessionState, sink: &dyn OutputSink) {
        sink.stop();
        if let Some(entry) = state.replace_current(None) {
            self.deps.observer.on_track_end(self.id, &entry.track);
            entry.track.cleanup();
        }
        self.set_phase(Phase::Idle);
    }

    /// Load `track` into an idle sink.
    pub async fn request_play(self: &Arc<Self>, track: Track, requester: UserId) -> Result<()> {
        let mut state = self.lock_open().await?;
        let sink = state.sink.clone().ok_or(SchedulerError::NotConnected)?;
        if state.current.is_some() || sink.is_playing() {
            tracing::warn!(
                session = %self.id,
                "[DJ] request_play while not idle: {}",
                track.title()
            );
            return Err(SchedulerError::AlreadyPlaying);
        }
        self.load(&mut state, sink.as_ref(), QueueEntry::new(track, requester))
    }

    /// Play now when idle, otherwise append to the queue. Entries still
    /// queued from an earlier connection play first.
    pub async fn enqueue_or_play(
        self: &Arc<Self>,
        track: Track,
        requester: UserId,
    ) -> Result<EnqueueOutcome> {
        let mut state = self.lock_open().await?;
        let title = track.title().to_string();
        let entry = QueueEntry::new(track, requester);
        let busy =
            state.current.is_some() || state.sink.as_ref().is_some_and(|s| s.is_playing());
        if busy {
            let position = state.queue.enqueue(entry);
            crate::dlog!(session = %self.id, "[DJ] Enqueued {title} at {position}");
            return Ok(EnqueueOutcome::Queued { title, position });
        }
        let sink = state.sink.clone().ok_or(SchedulerError::NotConnected)?;
        if state.queue.is_empty() {
            self.load(&mut state, sink.as_ref(), entry)?;
            return Ok(EnqueueOutcome::Started { title });
        }

        // Idle with a kept queue: the new entry goes behind it.
        state.queue.enqueue(entry);
        self.play_next(&mut state, sink.as_ref())?;
        match state.queue.len() {
            0 if state.current.is_some() => Ok(EnqueueOutcome::Started { title }),
            0 => Err(SchedulerError::Playback(format!("could not start {title}"))),
            position => Ok(EnqueueOutcome::Queued { title, position }),
        }
    }

    /// Resolve `url` and hand every resulting track to `enqueue_or_play`.
    /// The lookup runs outside the session lock.
    ///
    /// Tracks are handed over one at a time. If one fails, the tracks before
    /// it stay started or queued, the failing track and the rest are
    /// released, and only the error is returned.
    pub async fn play_url(
        self: &Arc<Self>,
        url: &str,
        requester: UserId,
    ) -> Result<Vec<EnqueueOutcome>> {
        let tracks = self
            .deps
            .resolver
            .resolve(url)
            .await
            .map_err(|reason| SchedulerError::ResolutionFailed {
                url: url.to_string(),
                reason,
            })?;
        if tracks.is_empty() {
            return Err(SchedulerError::ResolutionFailed {
                url: url.to_string(),
                reason: "no tracks returned".to_string(),
            });
        }
        let mut outcomes = Vec::with_capacity(tracks.len());
        for track in tracks {
            outcomes.push(self.enqueue_or_play(track, requester).await?);
        }
        Ok(outcomes)
    }

    /// Tear down the current track and promote the next queued one.
    pub async fn advance(self: &Arc<Self>) -> Result<AdvanceOutcome> {
        let mut state = self.lock_open().await?;
        self.advance_locked(&mut state).await
    }

    /// Finished notification from the sink.
    pub async fn on_track_finished(
        self: &Arc<Self>,
        ticket: PlayTicket,
        error: Option<String>,
    ) -> Result<AdvanceOutcome> {
        if let Some(error) = error {
            return self.on_track_error(ticket, error).await;
        }
        let mut state = self.state.lock().await;
        self.check_ticket(&state, ticket)?;
        self.advance_locked(&mut state).await
    }

    /// The sink failed mid-track. The error goes to the observer and the
    /// queue keeps moving.
    pub async fn on_track_error(
        self: &Arc<Self>,
        ticket: PlayTicket,
        error: String,
    ) -> Result<AdvanceOutcome> {
        let mut state = self.state.lock().await;
        self.check_ticket(&state, ticket)?;
        let error = SchedulerError::Playback(error);
        if let Some(current) = state.current.as_ref() {
            self.deps.observer.on_track_error(self.id, &current.track, &error);
        }
        self.advance_locked(&mut state).await
    }

    fn check_ticket(&self, state: &SessionState, ticket: PlayTicket) -> Result<()> {
        if state.closed
            || ticket.generation != self.generation
            || ticket.serial != state.play_serial
            || state.current.is_none()
        {
            crate::dlog!(session = %self.id, "[DJ] Discarding stale notification {ticket:?}");
            return Err(SchedulerError::StaleNotification);
        }
        Ok(())
    }

    /// Ticket of the track currently loaded, if any.
    pub async fn current_ticket(&self) -> Option<PlayTicket> {
        let state = self.state.lock().await;
        state.current.as_ref().map(|_| PlayTicket {
            generation: self.generation,
            serial: state.play_serial,
        })
    }

    async fn advance_locked(self: &Arc<Self>, state: &mut SessionState) -> Result<AdvanceOutcome> {
        let sink = state.sink.clone().ok_or(SchedulerError::NotConnected)?;
        if sink.is_playing() || state.current.is_some() {
            sink.stop();
        }
        self.set_phase(Phase::Transitioning);

        let reload = match state.replace_current(None) {
            Some(finished) => {
                self.deps.observer.on_track_end(self.id, &finished.track);
                let reload = state
                    .repeat
                    .then(|| (finished.track.source_url().to_string(), finished.requester));
                finished.track.cleanup();
                reload
            }
            None => None,
        };

        if let Some((url, requester)) = reload {
            let Some(resolved) = self.resolve_interruptible(&url).await else {
                tracing::info!(session = %self.id, "[DJ] Repeat reload interrupted by shutdown");
                return Ok(AdvanceOutcome::Cancelled);
            };
            match resolved {
                Ok(tracks) if !tracks.is_empty() => {
                    // Only the first resolved track is reused; the rest drop here.
                    if let Some(track) = tracks.into_iter().next() {
                        state.queue.push_front(QueueEntry::new(track, requester));
                    }
                }
                Ok(_) => self.resolution_failed(&url, "no tracks returned".to_string()),
                Err(reason) => self.resolution_failed(&url, reason),
            }
        }

        self.play_next(state, sink.as_ref())
    }

    fn resolution_failed(&self, url: &str, reason: String) {
        let error = SchedulerError::ResolutionFailed {
            url: url.to_string(),
            reason,
        };
        self.deps.observer.on_resolution_failed(self.id, &error);
    }

    /// `None` when the session is shut down before the resolver answers.
    async fn resolve_interruptible(
        &self,
        url: &str,
    ) -> Option<std::result::Result<Vec<Track>, String>> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return None;
        }
        tokio::select! {
            resolved = self.deps.resolver.resolve(url) => Some(resolved),
            _ = shutdown.changed() => None,
        }
    }

    fn play_next(
        self: &Arc<Self>,
        state: &mut SessionState,
        sink: &dyn OutputSink,
    ) -> Result<AdvanceOutcome> {
        while let Some(entry) = state.queue.pop_front() {
            let title = entry.track.title().to_string();
            match self.load(state, sink, entry) {
                Ok(()) => return Ok(AdvanceOutcome::Playing { title }),
                Err(err) => {
                    tracing::warn!(session = %self.id, "[DJ] Skipping '{title}': {err}");
                }
            }
        }
        self.set_phase(Phase::Idle);
        self.deps.observer.on_idle(self.id);
        Ok(AdvanceOutcome::Idle)
    }

    /// Hand `entry` to the sink and make it current. On failure the track
    /// is released and the session stays without a current track.
    fn load(
        self: &Arc<Self>,
        state: &mut SessionState,
        sink: &dyn OutputSink,
        entry: QueueEntry,
    ) -> Result<()> {
        let ticket = PlayTicket {
            generation: self.generation,
            serial: state.play_serial + 1,
        };
        sink.set_volume(state.volume);
        if let Err(reason) = sink.play(&entry.track, self.finished_callback(ticket)) {
            let error = SchedulerError::Playback(reason);
            self.deps.observer.on_track_error(self.id, &entry.track, &error);
            entry.track.cleanup();
            return Err(error);
        }
        self.deps.observer.on_track_start(self.id, &entry.track, entry.requester);
        let previous = state.replace_current(Some(entry));
        debug_assert!(previous.is_none());
        debug_assert_eq!(state.play_serial, ticket.serial);
        self.set_phase(Phase::Playing);
        Ok(())
    }

    /// Callback handed to the sink. It may run on the output thread, so it
    /// only schedules the notification onto the runtime.
    fn finished_callback(self: &Arc<Self>, ticket: PlayTicket) -> FinishedCallback {
        let scheduler = Arc::downgrade(self);
        let runtime = self.deps.runtime.clone();
        Box::new(move |error| {
            runtime.spawn(async move {
                let Some(scheduler) = scheduler.upgrade() else {
                    return;
                };
                match scheduler.on_track_finished(ticket, error).await {
                    Ok(outcome) => {
                        crate::dlog!(session = %scheduler.id, "[DJ] Advanced: {outcome:?}")
                    }
                    Err(SchedulerError::StaleNotification) => {}
                    Err(err) => {
                        tracing::warn!(
                            session = %scheduler.id,
                            "[DJ] Advance after finish failed: {err}"
                        )
                    }
                }
            });
        })
    }

    pub async fn skip(self: &Arc<Self>, user: UserId) -> Result<SkipOutcome> {
        let mut state = self.lock_open().await?;
        if state.sink.is_none() {
            return Err(SchedulerError::NotConnected);
        }
        let requester = state
            .current
            .as_ref()
            .map(|c| c.requester)
            .ok_or(SchedulerError::NothingPlaying)?;
        let quorum = self.deps.skip_quorum;
        match evaluate_skip(requester, user, &mut state.skip_votes, quorum) {
            SkipDecision::Advance => {
                Ok(SkipOutcome::Skipped(self.advance_locked(&mut state).await?))
            }
            SkipDecision::Counted { votes, needed } => Ok(SkipOutcome::Voted { votes, needed }),
            SkipDecision::AlreadyVoted { votes, needed } => {
                Ok(SkipOutcome::AlreadyVoted { votes, needed })
            }
        }
    }

    pub async fn pause(&self) -> Result<()> {
        let state = self.lock_open().await?;
        let sink = state.sink.as_ref().ok_or(SchedulerError::NotConnected)?;
        if state.current.is_none() || !sink.is_playing() {
            return Err(SchedulerError::NothingPlaying);
        }
        sink.pause();
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        let state = self.lock_open().await?;
        let sink = state.sink.as_ref().ok_or(SchedulerError::NotConnected)?;
        if state.current.is_none() {
            return Err(SchedulerError::NothingPlaying);
        }
        sink.resume();
        Ok(())
    }

    /// Clamp to [0, 1], store, and apply to the sink if one is attached.
    /// Returns the stored value.
    pub async fn set_volume(&self, volume: f32) -> Result<f32> {
        let mut state = self.lock_open().await?;
        state.volume = clamp_volume(volume);
        if let Some(sink) = state.sink.as_ref() {
            sink.set_volume(state.volume);
        }
        Ok(state.volume)
    }

    /// Flip repeat. Returns the new value.
    pub async fn toggle_repeat(&self) -> Result<bool> {
        let mut state = self.lock_open().await?;
        state.repeat = !state.repeat;
        Ok(state.repeat)
    }

    pub async fn shuffle(&self) -> Result<()> {
        let mut state = self.lock_open().await?;
        state.queue.shuffle();
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let state = self.lock_open().await?;
        Ok(state.snapshot(self.phase(), self.deps.skip_quorum))
    }

    /// Interrupt any outstanding reload, stop output and release every
    /// track. Later notifications for this instance are stale.
    pub(crate) async fn close(&self) {
        self.shutdown.send_replace(true);
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        if let Some(sink) = state.sink.take() {
            sink.stop();
        }
        if let Some(entry) = state.replace_current(None) {
            self.deps.observer.on_track_end(self.id, &entry.track);
            entry.track.cleanup();
        }
        for entry in state.queue.drain() {
            entry.track.cleanup();
        }
        self.set_phase(Phase::Idle);
        tracing::info!(session = %self.id, "[DJ] Session closed");
    }
}
