use thiserror::Error;

/// Errors raised by the workflow engine.
///
/// Recoverable conditions (a port failing, a model returning unparseable text)
/// never reach this type: tasks absorb them into their partial update. What is
/// left here is either a defect in the graph wiring or a run that must stop.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Task execution failed: {0}")]
    TaskExecutionFailed(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {0} is not waiting for input")]
    NotSuspended(String),

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Router after '{from}' returned '{label}' which has no registered branch")]
    UnroutableBranch { from: String, label: String },

    #[error("Invariant violation in task '{task_id}': {reason}")]
    InvariantViolation { task_id: String, reason: String },

    #[error("Step limit of {max_steps} exceeded before reaching a terminal task (next task: '{task_id}')")]
    StepLimitExceeded { max_steps: usize, task_id: String },

    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;
