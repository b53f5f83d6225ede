use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::Result, state::GraphState};

/// Result of a task execution
#[derive(Debug, Clone)]
pub struct TaskResult<U> {
    /// Partial update merged into the state by the engine
    pub update: U,
    /// Response to send to the user
    pub response: Option<String>,
    /// Next action to take
    pub next_action: NextAction,
    /// Human readable progress note kept on the session
    pub status_message: Option<String>,
    /// Filled in by the engine with the id of the task that produced this result
    pub task_id: String,
}

impl<U> TaskResult<U> {
    pub fn new(update: U, next_action: NextAction) -> Self {
        Self {
            update,
            response: None,
            next_action,
            status_message: None,
            task_id: String::new(),
        }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn with_status(mut self, status_message: impl Into<String>) -> Self {
        self.status_message = Some(status_message.into());
        self
    }
}

impl<U: Default> TaskResult<U> {
    /// A result that changes nothing and moves on.
    pub fn unchanged() -> Self {
        Self::new(U::default(), NextAction::ContinueAndExecute)
    }
}

/// Defines what should happen after a task completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextAction {
    /// Follow the outgoing edge (or router) and execute the next task immediately
    ContinueAndExecute,
    /// Suspend the run after this task; the router is evaluated on resume
    WaitForInput,
    /// End the graph execution
    End,
}

/// Core trait that all tasks must implement
#[async_trait]
pub trait Task<S: GraphState>: Send + Sync {
    /// Unique identifier for this task
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Execute the task against a read-only view of the state
    async fn run(&self, state: &S) -> Result<TaskResult<S::Update>>;
}
