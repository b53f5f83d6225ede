use async_trait::async_trait;
use case_flow::{NextAction, Result, Task, TaskResult};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::{ids, to_json};
use crate::models::{CaseRecord, CaseUpdate};
use crate::ports::{ReasoningPort, ReasoningTask, parse_response};

/// Upper bound on the interview questions after refinement
pub const MAX_REFINED_QUESTIONS: usize = 7;

#[derive(Deserialize)]
struct RefinedQuestions {
    refined_questions: Option<Vec<String>>,
}

/// Folds lab findings into the question list. Fails open: any problem keeps
/// the intake questions as they are.
pub struct RefineQuestionsTask {
    reasoning: Arc<dyn ReasoningPort>,
}

impl RefineQuestionsTask {
    pub fn new(reasoning: Arc<dyn ReasoningPort>) -> Self {
        Self { reasoning }
    }
}

#[async_trait]
impl Task<CaseRecord> for RefineQuestionsTask {
    fn id(&self) -> &str {
        ids::REFINE_QUESTIONS
    }

    async fn run(&self, case: &CaseRecord) -> Result<TaskResult<CaseUpdate>> {
        let initial_questions = case.missing_information();
        let lab_results = match case.lab_results() {
            Some(labs) if !labs.is_empty() && !initial_questions.is_empty() => labs,
            _ => {
                info!(task_id = %self.id(), "No labs or questions to refine, skipping");
                return Ok(TaskResult::unchanged());
            }
        };

        let arguments = json!({
            "initial_questions": initial_questions,
            "lab_summary": to_json(lab_results)?,
        });

        let refined = match self.reasoning.invoke(ReasoningTask::RefineQuestions, arguments).await {
            Ok(raw) => match parse_response::<RefinedQuestions>(&raw) {
                Ok(parsed) => parsed.refined_questions,
                Err(failure) => {
                    warn!(task_id = %self.id(), error = %failure, "Refined questions unparseable, keeping originals");
                    None
                }
            },
            Err(e) => {
                warn!(task_id = %self.id(), error = %e, "Question refinement unavailable, keeping originals");
                None
            }
        };

        let Some(mut questions) = refined else {
            return Ok(TaskResult::unchanged());
        };
        questions.truncate(MAX_REFINED_QUESTIONS);
        info!(
            task_id = %self.id(),
            before = initial_questions.len(),
            after = questions.len(),
            "Questions refined"
        );

        let mut structured_input = case.structured_input.clone().unwrap_or_default();
        structured_input.missing_information = questions;

        let update = CaseUpdate {
            structured_input: Some(structured_input),
            ..Default::default()
        };
        Ok(TaskResult::new(update, NextAction::ContinueAndExecute))
    }
}
