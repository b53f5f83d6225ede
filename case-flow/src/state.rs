use serde::{Serialize, de::DeserializeOwned};

/// State threaded through every task of a graph run.
///
/// Tasks only ever see a shared borrow of the state and hand back an
/// [`Update`](GraphState::Update); the engine is the single writer and merges
/// each update through [`apply`](GraphState::apply) before anything else runs.
pub trait GraphState: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Partial update produced by a task. `Default` must be the empty update.
    type Update: Default + Send + 'static;

    /// Merge a partial update into the state.
    ///
    /// Returning `Err` means the update would break the shape of the state;
    /// the engine reports it as [`GraphError::InvariantViolation`](crate::GraphError)
    /// and aborts the run.
    fn apply(&mut self, update: Self::Update) -> Result<(), String>;
}

/// A closed set of edge labels returned by a router.
///
/// Routers return an enum rather than a free-form string so that every branch
/// is matched exhaustively where the router is written.
pub trait Branch: Copy + Send + Sync + 'static {
    fn label(&self) -> &'static str;
}
