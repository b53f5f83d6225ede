//! Start/continue conversation boundary over the interactive workflow.

use case_flow::{FlowRunner, GraphError, GraphState, Session, SessionStatus};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::models::{
    CaseRecord, CaseUpdate, ContinueResponse, PatientIntake, SessionSnapshot, StartResponse,
};
use crate::workflow::create_case_session;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid conversation_id")]
    UnknownConversation(String),

    #[error(transparent)]
    Workflow(#[from] GraphError),
}

/// Runs consultations one patient answer at a time. Calls for the same
/// conversation are serialized; different conversations run in parallel.
#[derive(Clone)]
pub struct ConsultationManager {
    runner: FlowRunner<CaseRecord>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ConsultationManager {
    pub fn new(runner: FlowRunner<CaseRecord>) -> Self {
        Self {
            runner,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn runner(&self) -> &FlowRunner<CaseRecord> {
        &self.runner
    }

    /// Open a case and run it up to the first question, or to the end when
    /// no questions are needed.
    pub async fn start(&self, intake: PatientIntake) -> Result<StartResponse, SessionError> {
        let session = create_case_session(intake);
        info!(session_id = %session.id, "Starting consultation");

        let (session, _) = self.runner.start(session).await?;
        let session = self.settle(session).await?;

        let state = &session.state;
        let total_questions = state.question_queue.len() + usize::from(state.pending_question.is_some());
        info!(
            session_id = %session.id,
            total_questions,
            completed = session.is_completed(),
            "Consultation started"
        );

        Ok(StartResponse {
            conversation_id: session.id.clone(),
            pending_question: state.pending_question.clone(),
            total_questions,
        })
    }

    /// Record the patient's answer and move to the next question
    pub async fn continue_consultation(
        &self,
        conversation_id: &str,
        answer: &str,
    ) -> Result<ContinueResponse, SessionError> {
        let lock = self
            .locks
            .entry(conversation_id.to_string())
            .or_default()
            .clone();
        let guard = lock.lock().await;
        let outcome = self.continue_locked(conversation_id, answer).await;
        drop(guard);

        // the table only holds conversations with a call in flight
        self.locks
            .remove_if(conversation_id, |_, entry| Arc::strong_count(entry) <= 2);
        outcome
    }

    /// Conversations currently holding a lock entry
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    /// Drop lock entries nobody is holding or waiting on. Returns how many
    /// were removed.
    pub fn prune_idle_locks(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, entry| Arc::strong_count(entry) > 1);
        before.saturating_sub(self.locks.len())
    }

    async fn continue_locked(
        &self,
        conversation_id: &str,
        answer: &str,
    ) -> Result<ContinueResponse, SessionError> {
        let Some(mut session) = self.runner.storage().get(conversation_id).await? else {
            warn!(session_id = %conversation_id, "Unknown conversation");
            return Err(SessionError::UnknownConversation(conversation_id.to_string()));
        };

        if session.is_completed() {
            // nothing left to resume; keep the answer with the case
            session
                .state
                .apply(CaseUpdate::answer(answer))
                .map_err(|reason| GraphError::InvariantViolation {
                    task_id: session.current_task_id.clone(),
                    reason,
                })?;
            session.touch();
            self.runner.storage().save(session.clone()).await?;
            return Ok(Self::done(&session));
        }

        let (session, _) = self
            .runner
            .resume(conversation_id, CaseUpdate::answer(answer))
            .await?;
        let session = self.settle(session).await?;

        info!(
            session_id = %session.id,
            answers = session.state.answers.len(),
            status = ?session.status,
            "Answer recorded"
        );

        match (&session.status, &session.state.pending_question) {
            (SessionStatus::Suspended, Some(question)) => Ok(ContinueResponse::Question {
                conversation_id: session.id.clone(),
                pending_question: question.clone(),
                remaining: session.state.question_queue.len() + 1,
            }),
            _ => Ok(Self::done(&session)),
        }
    }

    pub async fn status(&self, conversation_id: &str) -> Result<SessionSnapshot, SessionError> {
        let session = self
            .runner
            .storage()
            .get(conversation_id)
            .await?
            .ok_or_else(|| SessionError::UnknownConversation(conversation_id.to_string()))?;
        Ok(snapshot(&session))
    }

    /// A suspension without a pending question has nothing to ask; carry on
    async fn settle(&self, mut session: Session<CaseRecord>) -> Result<Session<CaseRecord>, SessionError> {
        while session.is_suspended() && session.state.pending_question.is_none() {
            let (resumed, _) = self.runner.resume(&session.id, CaseUpdate::default()).await?;
            session = resumed;
        }
        Ok(session)
    }

    fn done(session: &Session<CaseRecord>) -> ContinueResponse {
        ContinueResponse::Done {
            conversation_id: session.id.clone(),
            done: true,
            answers: session.state.answers.clone(),
            final_analysis: session.state.final_analysis.clone(),
            report_path: session.state.report_path.clone(),
        }
    }
}

fn snapshot(session: &Session<CaseRecord>) -> SessionSnapshot {
    let state = &session.state;
    let status = match session.status {
        SessionStatus::Running => "running",
        SessionStatus::Suspended => "waiting_for_input",
        SessionStatus::Completed => "completed",
    };

    SessionSnapshot {
        conversation_id: session.id.clone(),
        status: status.to_string(),
        current_task: session.current_task_id.clone(),
        status_message: session.status_message.clone(),
        steps_taken: session.steps_taken,
        pending_question: state.pending_question.clone(),
        queued_questions: state.question_queue.len(),
        diagnosis_path: state.diagnosis_path,
        final_analysis: state.final_analysis.clone(),
        analysis_history_len: state.analysis_history.len(),
        report_path: state.report_path.clone(),
        report_error: state.report_error.clone(),
        answers: state.answers.clone(),
    }
}
