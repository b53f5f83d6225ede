//! FlowRunner – convenience wrapper around the _load → execute → save_ pattern.
//!
//! Interactive services run a session until it suspends at an interrupt,
//! persist it, and pick it up again when the caller supplies input:
//!
//! ```rust,ignore
//! let runner = FlowRunner::new(graph, storage, 100);
//! let (session, result) = runner.start(session).await?;
//! // ... later, in another request
//! let (session, result) = runner.resume(&session.id, answer_update).await?;
//! ```
//!
//! Use [`Graph::execute_session`] directly when the session never leaves the
//! process (batch runs) and persistence is not wanted.

use std::sync::Arc;

use tracing::{error, info};

use crate::{
    error::{GraphError, Result},
    graph::{ExecutionResult, Graph},
    state::GraphState,
    storage::{Session, SessionStorage},
};

/// High-level helper that pairs a graph with a session storage and a step budget.
pub struct FlowRunner<S: GraphState> {
    graph: Arc<Graph<S>>,
    storage: Arc<dyn SessionStorage<S>>,
    max_steps: usize,
}

impl<S: GraphState> Clone for FlowRunner<S> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            storage: self.storage.clone(),
            max_steps: self.max_steps,
        }
    }
}

impl<S: GraphState> FlowRunner<S> {
    pub fn new(graph: Arc<Graph<S>>, storage: Arc<dyn SessionStorage<S>>, max_steps: usize) -> Self {
        Self {
            graph,
            storage,
            max_steps,
        }
    }

    pub fn graph(&self) -> &Graph<S> {
        &self.graph
    }

    pub fn storage(&self) -> &Arc<dyn SessionStorage<S>> {
        &self.storage
    }

    /// Execute a fresh session until it suspends or completes, then persist it.
    pub async fn start(&self, mut session: Session<S>) -> Result<(Session<S>, ExecutionResult)> {
        info!(session_id = %session.id, graph_id = %self.graph.id, "Starting session");
        let result = self.graph.execute_session(&mut session, self.max_steps).await;
        self.finish(session, result).await
    }

    /// Load a suspended session, merge `update`, continue, and persist.
    pub async fn resume(&self, session_id: &str, update: S::Update) -> Result<(Session<S>, ExecutionResult)> {
        let mut session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| GraphError::SessionNotFound(session_id.to_string()))?;

        info!(session_id = %session.id, task_id = %session.current_task_id, "Resuming session");
        let result = self
            .graph
            .resume_session(&mut session, update, self.max_steps)
            .await;
        self.finish(session, result).await
    }

    /// Persist the session whether or not the run succeeded, so a failed run
    /// can still be inspected; the run's own error wins over a storage error.
    async fn finish(
        &self,
        session: Session<S>,
        result: Result<ExecutionResult>,
    ) -> Result<(Session<S>, ExecutionResult)> {
        let saved = self.storage.save(session.clone()).await;
        match (result, saved) {
            (Ok(result), Ok(())) => Ok((session, result)),
            (Err(e), saved) => {
                if let Err(storage_error) = saved {
                    error!(session_id = %session.id, error = %storage_error, "Failed to persist session after error");
                }
                Err(e)
            }
            (Ok(_), Err(storage_error)) => Err(storage_error),
        }
    }
}
