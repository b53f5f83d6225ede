use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    error::{GraphError, Result},
    state::{Branch, GraphState},
    storage::{Session, SessionStatus},
    task::{NextAction, Task, TaskResult},
};

/// Type alias for router functions; the returned label selects a branch
pub type RouterFn<S> = Arc<dyn Fn(&S) -> &'static str + Send + Sync>;

/// What follows a task once it has run
enum Transition<S> {
    /// Plain edge to a single next task
    Direct(String),
    /// Router evaluated against the state after the task's update is merged
    Conditional {
        router: RouterFn<S>,
        branches: HashMap<&'static str, String>,
    },
}

/// A graph of tasks that can be executed
pub struct Graph<S: GraphState> {
    pub id: String,
    tasks: HashMap<String, Arc<dyn Task<S>>>,
    transitions: HashMap<String, Transition<S>>,
    start_task_id: String,
    interrupts: HashSet<String>,
}

impl<S: GraphState> Graph<S> {
    /// Run the session from its current task until it completes, suspends,
    /// or fails. Every executed task counts against `max_steps`.
    pub async fn execute_session(
        &self,
        session: &mut Session<S>,
        max_steps: usize,
    ) -> Result<ExecutionResult> {
        match session.status {
            SessionStatus::Completed => Ok(ExecutionResult::completed(None)),
            SessionStatus::Suspended => Ok(ExecutionResult::waiting(None)),
            SessionStatus::Running => self.drive(session, max_steps).await,
        }
    }

    /// Continue a suspended session.
    ///
    /// `update` carries the external input and is merged before the router
    /// of the task the session stopped after is evaluated.
    pub async fn resume_session(
        &self,
        session: &mut Session<S>,
        update: S::Update,
        max_steps: usize,
    ) -> Result<ExecutionResult> {
        if !session.is_suspended() {
            return Err(GraphError::NotSuspended(session.id.clone()));
        }

        session
            .state
            .apply(update)
            .map_err(|reason| GraphError::InvariantViolation {
                task_id: session.current_task_id.clone(),
                reason,
            })?;
        session.status = SessionStatus::Running;
        session.touch();

        match self.find_next_task(&session.current_task_id, &session.state)? {
            Some(next_task_id) => {
                session.current_task_id = next_task_id;
                self.drive(session, max_steps).await
            }
            None => {
                session.status = SessionStatus::Completed;
                Ok(ExecutionResult::completed(None))
            }
        }
    }

    async fn drive(&self, session: &mut Session<S>, max_steps: usize) -> Result<ExecutionResult> {
        let mut response = None;

        loop {
            let task_id = session.current_task_id.clone();
            if session.steps_taken >= max_steps {
                warn!(
                    session_id = %session.id,
                    task_id = %task_id,
                    max_steps,
                    "Step limit reached before a terminal task"
                );
                return Err(GraphError::StepLimitExceeded { max_steps, task_id });
            }

            let result = self.execute_single_task(&task_id, &session.state).await?;
            session.steps_taken += 1;

            session
                .state
                .apply(result.update)
                .map_err(|reason| GraphError::InvariantViolation {
                    task_id: task_id.clone(),
                    reason,
                })?;
            session.touch();

            if result.status_message.is_some() {
                session.status_message = result.status_message;
            }
            if result.response.is_some() {
                response = result.response;
            }

            match result.next_action {
                NextAction::End => {
                    info!(session_id = %session.id, task_id = %task_id, "Workflow completed");
                    session.status = SessionStatus::Completed;
                    return Ok(ExecutionResult::completed(response));
                }
                NextAction::WaitForInput => {
                    session.status = SessionStatus::Suspended;
                    return Ok(ExecutionResult::waiting(response));
                }
                NextAction::ContinueAndExecute if self.interrupts.contains(&task_id) => {
                    debug!(session_id = %session.id, task_id = %task_id, "Suspending at interrupt");
                    session.status = SessionStatus::Suspended;
                    return Ok(ExecutionResult::waiting(response));
                }
                NextAction::ContinueAndExecute => {
                    match self.find_next_task(&task_id, &session.state)? {
                        Some(next_task_id) => session.current_task_id = next_task_id,
                        None => {
                            info!(session_id = %session.id, task_id = %task_id, "Workflow completed");
                            session.status = SessionStatus::Completed;
                            return Ok(ExecutionResult::completed(response));
                        }
                    }
                }
            }
        }
    }

    /// Execute a single task without following its edges
    async fn execute_single_task(&self, task_id: &str, state: &S) -> Result<TaskResult<S::Update>> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| GraphError::TaskNotFound(task_id.to_string()))?;

        debug!(task_id = %task_id, "Executing task");
        let mut result = task.run(state).await?;

        // Set the task_id in the result to track which task generated it
        result.task_id = task_id.to_string();

        Ok(result)
    }

    /// Find the next task from the plain edge or router leaving `current_task_id`.
    /// `None` means the task is terminal.
    pub fn find_next_task(&self, current_task_id: &str, state: &S) -> Result<Option<String>> {
        match self.transitions.get(current_task_id) {
            None => Ok(None),
            Some(Transition::Direct(to)) => Ok(Some(to.clone())),
            Some(Transition::Conditional { router, branches }) => {
                let label = router(state);
                debug!(from = %current_task_id, branch = label, "Router selected branch");
                branches
                    .get(label)
                    .cloned()
                    .map(Some)
                    .ok_or_else(|| GraphError::UnroutableBranch {
                        from: current_task_id.to_string(),
                        label: label.to_string(),
                    })
            }
        }
    }

    /// Get the start task ID
    pub fn start_task_id(&self) -> &str {
        &self.start_task_id
    }

    /// Get a task by ID
    pub fn get_task(&self, task_id: &str) -> Option<Arc<dyn Task<S>>> {
        self.tasks.get(task_id).cloned()
    }

    pub fn is_interrupt(&self, task_id: &str) -> bool {
        self.interrupts.contains(task_id)
    }
}

#[derive(Debug, Clone, Copy)]
enum Choice {
    Yes,
    No,
}

impl Branch for Choice {
    fn label(&self) -> &'static str {
        match self {
            Choice::Yes => "yes",
            Choice::No => "no",
        }
    }
}

/// Builder for creating graphs
pub struct GraphBuilder<S: GraphState> {
    id: String,
    tasks: HashMap<String, Arc<dyn Task<S>>>,
    transitions: HashMap<String, Transition<S>>,
    start_task_id: Option<String>,
    interrupts: HashSet<String>,
    problems: Vec<String>,
}

impl<S: GraphState> GraphBuilder<S> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: HashMap::new(),
            transitions: HashMap::new(),
            start_task_id: None,
            interrupts: HashSet::new(),
            problems: Vec::new(),
        }
    }

    /// Add a task; the first task added is the start task unless overridden
    pub fn add_task(mut self, task: Arc<dyn Task<S>>) -> Self {
        let task_id = task.id().to_string();
        if self.start_task_id.is_none() {
            self.start_task_id = Some(task_id.clone());
        }
        if self.tasks.insert(task_id.clone(), task).is_some() {
            self.problems.push(format!("task '{task_id}' registered twice"));
        }
        self
    }

    pub fn set_start_task(mut self, task_id: impl Into<String>) -> Self {
        self.start_task_id = Some(task_id.into());
        self
    }

    /// Add a plain edge between tasks
    pub fn add_edge(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.add_transition(from.into(), Transition::Direct(to.into()))
    }

    /// Route out of `from` with `router`; each branch maps a router result to a task
    pub fn add_conditional_edges<B, F, I, T>(self, from: impl Into<String>, router: F, branches: I) -> Self
    where
        B: Branch,
        F: Fn(&S) -> B + Send + Sync + 'static,
        I: IntoIterator<Item = (B, T)>,
        T: Into<String>,
    {
        let branches = branches
            .into_iter()
            .map(|(branch, to)| (branch.label(), to.into()))
            .collect();
        let router: RouterFn<S> = Arc::new(move |state: &S| router(state).label());
        self.add_transition(from.into(), Transition::Conditional { router, branches })
    }

    /// Two-way route out of `from`: `yes` when `predicate` holds, `no` otherwise
    pub fn add_conditional_edge<F>(
        self,
        from: impl Into<String>,
        predicate: F,
        yes: impl Into<String>,
        no: impl Into<String>,
    ) -> Self
    where
        F: Fn(&S) -> bool + Send + Sync + 'static,
    {
        self.add_conditional_edges(
            from,
            move |state: &S| if predicate(state) { Choice::Yes } else { Choice::No },
            [(Choice::Yes, yes.into()), (Choice::No, no.into())],
        )
    }

    /// Suspend the run after `task_id` executes; the run continues through
    /// [`Graph::resume_session`].
    pub fn interrupt_after(mut self, task_id: impl Into<String>) -> Self {
        self.interrupts.insert(task_id.into());
        self
    }

    fn add_transition(mut self, from: String, transition: Transition<S>) -> Self {
        if self.transitions.insert(from.clone(), transition).is_some() {
            self.problems
                .push(format!("task '{from}' has more than one outgoing transition"));
        }
        self
    }

    /// Validate the wiring and produce the graph
    pub fn build(self) -> Result<Graph<S>> {
        let mut problems = self.problems;
        let known = |id: &str| self.tasks.contains_key(id);

        let start_task_id = match self.start_task_id {
            Some(id) if known(&id) => id,
            Some(id) => {
                problems.push(format!("start task '{id}' is not registered"));
                id
            }
            None => {
                problems.push("graph has no tasks".to_string());
                String::new()
            }
        };

        for (from, transition) in &self.transitions {
            if !known(from) {
                problems.push(format!("edge leaves unknown task '{from}'"));
            }
            match transition {
                Transition::Direct(to) if !known(to) => {
                    problems.push(format!("edge '{from}' -> '{to}' targets unknown task"));
                }
                Transition::Direct(_) => {}
                Transition::Conditional { branches, .. } => {
                    if branches.is_empty() {
                        problems.push(format!("router after '{from}' has no branches"));
                    }
                    for (label, to) in branches {
                        if !known(to) {
                            problems.push(format!(
                                "branch '{label}' after '{from}' targets unknown task '{to}'"
                            ));
                        }
                    }
                }
            }
        }

        for task_id in &self.interrupts {
            if !known(task_id) {
                problems.push(format!("interrupt set on unknown task '{task_id}'"));
            }
        }

        if !problems.is_empty() {
            problems.sort();
            return Err(GraphError::InvalidGraph(problems.join("; ")));
        }

        Ok(Graph {
            id: self.id,
            tasks: self.tasks,
            transitions: self.transitions,
            start_task_id,
            interrupts: self.interrupts,
        })
    }
}

/// Status of graph execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub response: Option<String>,
    pub status: ExecutionStatus,
}

impl ExecutionResult {
    fn completed(response: Option<String>) -> Self {
        Self {
            response,
            status: ExecutionStatus::Completed,
        }
    }

    fn waiting(response: Option<String>) -> Self {
        Self {
            response,
            status: ExecutionStatus::WaitingForInput,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Waiting for user input to continue
    WaitingForInput,
    /// Workflow completed successfully
    Completed,
}
