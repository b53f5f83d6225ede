pub mod error;
pub mod graph;
pub mod runner;
pub mod state;
pub mod storage;
#[cfg(feature = "postgres")]
pub mod storage_postgres;
pub mod task;

// Re-export commonly used types
pub use error::{GraphError, Result};
pub use graph::{ExecutionResult, ExecutionStatus, Graph, GraphBuilder};
pub use runner::FlowRunner;
pub use state::{Branch, GraphState};
pub use storage::{InMemorySessionStorage, Session, SessionStatus, SessionStorage, spawn_eviction};
#[cfg(feature = "postgres")]
pub use storage_postgres::PostgresSessionStorage;
pub use task::{NextAction, Task, TaskResult};
