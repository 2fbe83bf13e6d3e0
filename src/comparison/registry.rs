use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;

use super::session::{ComparisonSession, SessionDeps};
use crate::identifiers::ProductId;

struct Entry {
    session: ComparisonSession,
    last_seen: Mutex<Instant>,
}

impl Entry {
    fn new(session: ComparisonSession) -> Self {
        Self {
            session,
            last_seen: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        if let Ok(mut at) = self.last_seen.lock() {
            *at = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .map(|at| at.elapsed())
            .unwrap_or_default()
    }
}

/// Live comparison sessions of this process, by id. Sessions nobody has
/// looked up for a while are disposed by [`SessionRegistry::evict_idle`];
/// their selection stays in storage and is resumed on the next open.
#[derive(Clone)]
pub struct SessionRegistry {
    deps: SessionDeps,
    sessions: Arc<RwLock<HashMap<Uuid, Entry>>>,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            deps,
            sessions: Arc::default(),
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<ComparisonSession> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(&id)?;
        entry.touch();
        Some(entry.session.clone())
    }

    /// Returns the live session for `id` if there is one and no seed was
    /// given. Otherwise starts a new session (disposing a live one), which
    /// seeds from `initial` or resumes from storage.
    pub async fn open(&self, id: Uuid, initial: &[ProductId]) -> ComparisonSession {
        if initial.is_empty() {
            if let Some(live) = self.get(id).await {
                return live;
            }
        }
        // the old session's pending writes must land before the new one's
        let previous = self.sessions.write().await.remove(&id);
        if let Some(previous) = previous {
            previous.session.dispose().await;
        }
        let session = ComparisonSession::init(&self.deps, id, initial).await;
        self.sessions
            .write()
            .await
            .insert(id, Entry::new(session.clone()));
        session
    }

    pub async fn close(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id);
        match removed {
            Some(entry) => {
                entry.session.dispose().await;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Disposes sessions not looked up within `max_idle` and returns how
    /// many were removed.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let idle: Vec<(Uuid, Entry)> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, e)| e.idle_for() >= max_idle)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|e| (id, e)))
                .collect()
        };
        let evicted = idle.len();
        for (id, entry) in idle {
            debug!(session = %id, "evicting idle session");
            entry.session.dispose().await;
        }
        evicted
    }

    /// Runs [`Self::evict_idle`] every `every` until the handle is aborted.
    pub fn spawn_sweeper(&self, every: Duration, max_idle: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let evicted = registry.evict_idle(max_idle).await;
                if evicted > 0 {
                    let live = registry.len().await;
                    info!(evicted, live, "evicted idle sessions");
                }
            }
        })
    }

    /// Disposes every session; used on shutdown so pending writes land.
    pub async fn close_all(&self) {
        let drained: Vec<Entry> = self.sessions.write().await.drain().map(|(_, e)| e).collect();
        for entry in drained {
            entry.session.dispose().await;
        }
    }
}
