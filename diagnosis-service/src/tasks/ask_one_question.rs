use async_trait::async_trait;
use case_flow::{NextAction, Result, Task, TaskResult};
use tracing::info;

use super::ids;
use crate::models::{CaseRecord, CaseUpdate, Message, PendingQuestion, QueueUpdate};

/// Emits the question at the front of the queue. Interactive graphs suspend
/// after this task until the patient answers.
pub struct AskOneQuestionTask;

#[async_trait]
impl Task<CaseRecord> for AskOneQuestionTask {
    fn id(&self) -> &str {
        ids::ASK_ONE_QUESTION
    }

    async fn run(&self, case: &CaseRecord) -> Result<TaskResult<CaseUpdate>> {
        let Some(question) = case.question_queue.front().cloned() else {
            return Ok(TaskResult::unchanged());
        };

        info!(
            task_id = %self.id(),
            remaining = case.question_queue.len() - 1,
            question = %question,
            "Asking question"
        );

        let update = CaseUpdate {
            question_queue: Some(QueueUpdate::PopFront(question.clone())),
            append_messages: vec![Message::ai(question.clone())],
            pending_question: Some(PendingQuestion::Set(question.clone())),
            ..Default::default()
        };
        Ok(TaskResult::new(update, NextAction::ContinueAndExecute).with_response(question))
    }
}
