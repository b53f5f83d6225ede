use async_trait::async_trait;
use case_flow::{NextAction, Result, Task, TaskResult};
use tracing::info;

use super::ids;
use crate::models::{CaseRecord, CaseUpdate, QueueUpdate};

/// Loads a fresh round of questions into the queue
pub struct InitializeChatTask;

#[async_trait]
impl Task<CaseRecord> for InitializeChatTask {
    fn id(&self) -> &str {
        ids::INITIALIZE_CHAT
    }

    async fn run(&self, case: &CaseRecord) -> Result<TaskResult<CaseUpdate>> {
        let questions = case.missing_information().to_vec();

        let status = match (&case.final_analysis, case.diagnosis_path) {
            (Some(_), Some(specialist)) => {
                info!(task_id = %self.id(), %specialist, questions = questions.len(), "Specialist requested more information");
                format!("{} requires more information", specialist.title())
            }
            _ => {
                info!(task_id = %self.id(), questions = questions.len(), "Starting interview");
                "Interview started".to_string()
            }
        };

        let update = CaseUpdate {
            question_queue: Some(QueueUpdate::Replace(questions)),
            ..Default::default()
        };
        Ok(TaskResult::new(update, NextAction::ContinueAndExecute).with_status(status))
    }
}
