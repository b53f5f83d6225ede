use async_trait::async_trait;
use case_flow::{NextAction, Result, Task, TaskResult};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::{ids, to_json};
use crate::models::{CaseRecord, CaseUpdate, Message, StructuredInput};
use crate::ports::{ReasoningPort, ReasoningTask, parse_response};

/// Normalizes the raw intake into `structured_input`
pub struct PreprocessTask {
    reasoning: Arc<dyn ReasoningPort>,
}

impl PreprocessTask {
    pub fn new(reasoning: Arc<dyn ReasoningPort>) -> Self {
        Self { reasoning }
    }
}

#[async_trait]
impl Task<CaseRecord> for PreprocessTask {
    fn id(&self) -> &str {
        ids::PREPROCESS
    }

    async fn run(&self, case: &CaseRecord) -> Result<TaskResult<CaseUpdate>> {
        let patient_data = to_json(&case.raw_input)?;
        info!(task_id = %self.id(), patient = %case.raw_input.name, "Preprocessing intake");

        let mut messages = vec![Message::human(format!(
            "Patient provided input:\n{}",
            serde_json::to_string_pretty(&patient_data).unwrap_or_default()
        ))];

        let structured_input = match self
            .reasoning
            .invoke(ReasoningTask::Intake, json!({ "patient_data": patient_data }))
            .await
        {
            Ok(raw) => {
                messages.push(Message::ai(raw.clone()));
                parse_response::<StructuredInput>(&raw).unwrap_or_else(|failure| {
                    warn!(task_id = %self.id(), error = %failure, "Intake output was not valid JSON");
                    StructuredInput::parse_failure(&failure.raw_output, &failure.error)
                })
            }
            Err(e) => {
                warn!(task_id = %self.id(), error = %e, "Intake structuring unavailable");
                StructuredInput::unavailable(&e.to_string())
            }
        };

        info!(
            task_id = %self.id(),
            questions = structured_input.missing_information.len(),
            "Intake structured"
        );

        let update = CaseUpdate {
            structured_input: Some(structured_input),
            append_messages: messages,
            ..Default::default()
        };
        Ok(TaskResult::new(update, NextAction::ContinueAndExecute).with_status("Intake structured"))
    }
}
