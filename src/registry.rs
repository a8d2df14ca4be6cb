//! Process-wide map from session id to its scheduler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;

use crate::ids::SessionId;
use crate::observer::SchedulerObserver;
use crate::resolver::TrackResolver;
use crate::scheduler::{SchedulerDeps, TrackScheduler};
use crate::settings::Settings;

pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<TrackScheduler>>>,
    next_generation: AtomicU64,
    deps: SchedulerDeps,
}

impl SessionRegistry {
    /// Must be called from within a tokio runtime; finished callbacks are
    /// dispatched onto it.
    pub fn new(
        settings: &Settings,
        resolver: Arc<dyn TrackResolver>,
        observer: Arc<dyn SchedulerObserver>,
    ) -> Self {
        Self::with_runtime(settings, resolver, observer, Handle::current())
    }

    pub fn with_runtime(
        settings: &Settings,
        resolver: Arc<dyn TrackResolver>,
        observer: Arc<dyn SchedulerObserver>,
        runtime: Handle,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            deps: SchedulerDeps {
                resolver,
                observer,
                runtime,
                default_volume: settings.default_volume,
                skip_quorum: settings.skip_quorum.max(1),
            },
        }
    }

    /// Existing scheduler for `id`, or a fresh one.
    pub fn get_or_create(&self, id: SessionId) -> Arc<TrackScheduler> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(id)
            .or_insert_with(|| {
                let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
                crate::dlog!(session = %id, generation, "[Registry] Creating session");
                Arc::new(TrackScheduler::new(id, generation, self.deps.clone()))
            })
            .clone()
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<TrackScheduler>> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(&id).cloned()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<SessionId> = sessions.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Remove the session and tear it down. Returns false if it did not
    /// exist. The id is free for a new session as soon as this is called.
    pub async fn destroy(&self, id: SessionId) -> bool {
        let removed = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions.remove(&id)
        };
        match removed {
            Some(scheduler) => {
                scheduler.close().await;
                true
            }
            None => false,
        }
    }

    /// Tear down every session, e.g. on process shutdown.
    pub async fn destroy_all(&self) {
        let drained: Vec<Arc<TrackScheduler>> = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions.drain().map(|(_, s)| s).collect()
        };
        futures_util::future::join_all(drained.iter().map(|s| s.close())).await;
    }
}
