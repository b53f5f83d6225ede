use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{error::Result, state::GraphState};

/// Where a session stands between two calls into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created or mid-run; the current task has not executed yet
    Running,
    /// Stopped after `current_task_id`, waiting for external input
    Suspended,
    /// Reached a terminal task
    Completed,
}

/// Session information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session<S> {
    pub id: String,
    pub graph_id: String,
    pub current_task_id: String,
    pub status: SessionStatus,
    /// Task executions over the lifetime of the run, across suspensions
    pub steps_taken: usize,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: S,
}

impl<S: GraphState> Session<S> {
    /// Fresh session with a random v4 id, positioned at `task_name`
    pub fn new(task_name: &str, state: S) -> Self {
        Self::new_from_task(Uuid::new_v4().to_string(), task_name, state)
    }

    pub fn new_from_task(sid: String, task_name: &str, state: S) -> Self {
        let now = Utc::now();
        Self {
            id: sid,
            graph_id: "default".to_string(),
            current_task_id: task_name.to_string(),
            status: SessionStatus::Running,
            steps_taken: 0,
            status_message: None,
            created_at: now,
            updated_at: now,
            state,
        }
    }

    pub fn with_graph_id(mut self, graph_id: impl Into<String>) -> Self {
        self.graph_id = graph_id.into();
        self
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_suspended(&self) -> bool {
        self.status == SessionStatus::Suspended
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

/// Trait for storing and retrieving sessions
#[async_trait]
pub trait SessionStorage<S: GraphState>: Send + Sync {
    async fn save(&self, session: Session<S>) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Session<S>>>;
    async fn delete(&self, id: &str) -> Result<()>;

    /// Drop sessions idle for longer than the storage's time-to-live.
    /// Returns how many were removed.
    async fn evict_expired(&self) -> Result<usize> {
        Ok(0)
    }
}

/// In-memory implementation of SessionStorage
pub struct InMemorySessionStorage<S> {
    sessions: Arc<DashMap<String, Session<S>>>,
    ttl: Option<Duration>,
}

impl<S: GraphState> InMemorySessionStorage<S> {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl: None,
        }
    }

    /// Sessions not updated within `ttl` become invisible and are evicted.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl: Some(ttl),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove `id` only if the stored entry is still expired at `now`; a
    /// save that lands after the caller's read refreshes `updated_at` and
    /// survives.
    fn remove_if_expired(&self, id: &str, now: DateTime<Utc>) -> bool {
        self.sessions
            .remove_if(id, |_, current| self.is_expired(current, now))
            .is_some()
    }

    fn is_expired(&self, session: &Session<S>, now: DateTime<Utc>) -> bool {
        self.ttl
            .map(|ttl| now - session.updated_at > ttl)
            .unwrap_or(false)
    }
}

impl<S: GraphState> Default for InMemorySessionStorage<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: GraphState> SessionStorage<S> for InMemorySessionStorage<S> {
    async fn save(&self, session: Session<S>) -> Result<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session<S>>> {
        // clone out before touching the map again; holding the shard guard
        // across the removal would deadlock
        let now = Utc::now();
        let session = self.sessions.get(id).map(|entry| entry.clone());
        match session {
            Some(session) if self.is_expired(&session, now) => {
                self.remove_if_expired(id, now);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn evict_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !self.is_expired(session, now));
        Ok(before.saturating_sub(self.sessions.len()))
    }
}

/// Periodically evict expired sessions from `storage`.
pub fn spawn_eviction<S: GraphState>(
    storage: Arc<dyn SessionStorage<S>>,
    every: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match storage.evict_expired().await {
                Ok(0) => {}
                Ok(evicted) => info!(evicted, "Evicted expired sessions"),
                Err(e) => warn!(error = %e, "Session eviction failed"),
            }
        }
    })
}
