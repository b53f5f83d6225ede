use async_trait::async_trait;
use case_flow::{NextAction, Result, Task, TaskResult};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use super::to_json;
use crate::models::{AnalysisRecord, CaseRecord, CaseUpdate, MessageRole, Specialist, null_as_empty};
use crate::ports::{ReasoningPort, ReasoningTask, parse_response};

/// What a specialist may answer. Any other shape, including an unknown
/// `status`, is a parse failure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpecialistResult {
    Complete {
        #[serde(default)]
        analysis: Value,
    },
    Incomplete {
        #[serde(default)]
        reasoning: String,
        #[serde(default, deserialize_with = "null_as_empty")]
        missing_information: Vec<String>,
    },
}

impl From<SpecialistResult> for AnalysisRecord {
    fn from(result: SpecialistResult) -> Self {
        match result {
            SpecialistResult::Complete { analysis } => AnalysisRecord::Complete { analysis },
            SpecialistResult::Incomplete {
                reasoning,
                missing_information,
            } => AnalysisRecord::Incomplete {
                reasoning,
                missing_information,
            },
        }
    }
}

/// One specialist's review of the case so far
pub struct SpecialistAnalysisTask {
    specialist: Specialist,
    reasoning: Arc<dyn ReasoningPort>,
}

impl SpecialistAnalysisTask {
    pub fn new(specialist: Specialist, reasoning: Arc<dyn ReasoningPort>) -> Self {
        Self {
            specialist,
            reasoning,
        }
    }

    fn transcript(case: &CaseRecord) -> String {
        case.messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    MessageRole::System => "system",
                    MessageRole::Ai => "ai",
                    MessageRole::Human => "human",
                };
                format!("{role}: {}", message.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Task<CaseRecord> for SpecialistAnalysisTask {
    fn id(&self) -> &str {
        self.specialist.node_id()
    }

    async fn run(&self, case: &CaseRecord) -> Result<TaskResult<CaseUpdate>> {
        info!(task_id = %self.id(), messages = case.messages.len(), "Running specialist analysis");

        let structured_data = match &case.structured_input {
            Some(input) => to_json(input)?,
            None => json!({}),
        };
        let arguments = json!({
            "structured_data": structured_data,
            "conversation_history": Self::transcript(case),
        });

        let outcome = match self
            .reasoning
            .invoke(ReasoningTask::SpecialistAnalysis(self.specialist), arguments)
            .await
        {
            Ok(raw) => parse_response::<SpecialistResult>(&raw).map_err(|failure| AnalysisRecord::Error {
                error: format!("Failed to parse analysis: {}", failure.error),
                raw_output: failure.raw_output,
            }),
            Err(e) => Err(AnalysisRecord::Error {
                error: e.to_string(),
                raw_output: String::new(),
            }),
        };

        let mut update = CaseUpdate::default();
        let record = match outcome {
            Ok(SpecialistResult::Incomplete {
                reasoning,
                missing_information,
            }) => {
                info!(task_id = %self.id(), questions = missing_information.len(), "Specialist requires more information");
                let mut structured_input = case.structured_input.clone().unwrap_or_default();
                structured_input.missing_information = missing_information.clone();
                update.structured_input = Some(structured_input);
                AnalysisRecord::Incomplete {
                    reasoning,
                    missing_information,
                }
            }
            Ok(complete) => {
                info!(task_id = %self.id(), "Analysis complete");
                complete.into()
            }
            Err(error_record) => {
                warn!(task_id = %self.id(), "Specialist analysis failed, ending with error record");
                error_record
            }
        };

        update.final_analysis = Some(record.clone());
        update.append_history = vec![record];
        Ok(TaskResult::new(update, NextAction::ContinueAndExecute)
            .with_status(format!("{} analysis recorded", self.specialist.title())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, StructuredInput};
    use crate::tasks::stubs::ScriptedReasoner;
    use case_flow::GraphState;

    fn case() -> CaseRecord {
        let mut record = CaseRecord::default();
        record.structured_input = Some(StructuredInput {
            missing_information: vec!["Any allergies?".to_string()],
            ..Default::default()
        });
        record.messages = vec![Message::ai("Any allergies?"), Message::human("None")];
        record.analysis_history = vec![AnalysisRecord::triage_placeholder()];
        record
    }

    async fn analyse(reply: &str, record: &mut CaseRecord) -> Arc<ScriptedReasoner> {
        let task_kind = ReasoningTask::SpecialistAnalysis(Specialist::Cardiology);
        let reasoning = Arc::new(ScriptedReasoner::default().reply(task_kind, reply));
        let task = SpecialistAnalysisTask::new(Specialist::Cardiology, reasoning.clone());
        let result = task.run(record).await.unwrap();
        record.apply(result.update).unwrap();
        reasoning
    }

    #[tokio::test]
    async fn test_complete_analysis_is_appended() {
        let mut record = case();
        let reasoning = analyse(
            r#"{"status": "complete", "analysis": {"probable_diagnosis": {"condition": "Stable angina"}}}"#,
            &mut record,
        )
        .await;

        assert_eq!(record.analysis_history.len(), 2);
        assert!(matches!(record.final_analysis, Some(AnalysisRecord::Complete { .. })));
        assert_eq!(record.missing_information(), ["Any allergies?"]);

        let calls = reasoning.calls.lock().unwrap();
        assert_eq!(calls[0].1["conversation_history"], "ai: Any allergies?\nhuman: None");
    }

    #[tokio::test]
    async fn test_incomplete_analysis_replaces_questions() {
        let mut record = case();
        analyse(
            "```json\n{\"status\": \"incomplete\", \"reasoning\": \"need ECG history\", \"missing_information\": [\"Prior ECG?\"]}\n```",
            &mut record,
        )
        .await;

        assert_eq!(record.missing_information(), ["Prior ECG?"]);
        assert_eq!(record.final_analysis, record.analysis_history.last().cloned());
    }

    #[tokio::test]
    async fn test_incomplete_with_null_questions_is_parsed() {
        let mut record = case();
        analyse(
            r#"{"status": "incomplete", "reasoning": "unclear", "missing_information": null}"#,
            &mut record,
        )
        .await;

        assert!(matches!(
            record.final_analysis,
            Some(AnalysisRecord::Incomplete { ref missing_information, .. }) if missing_information.is_empty()
        ));
        assert!(record.missing_information().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_status_becomes_error_record() {
        let mut record = case();
        analyse(r#"{"status": "maybe"}"#, &mut record).await;

        match record.final_analysis {
            Some(AnalysisRecord::Error { ref raw_output, .. }) => assert_eq!(raw_output, r#"{"status": "maybe"}"#),
            ref other => panic!("expected error record, got {other:?}"),
        }
        assert_eq!(record.analysis_history.len(), 2);
        assert_eq!(record.missing_information(), ["Any allergies?"]);
    }

    #[tokio::test]
    async fn test_port_failure_becomes_error_record() {
        let mut record = case();
        let task_kind = ReasoningTask::SpecialistAnalysis(Specialist::Dermatology);
        let reasoning = ScriptedReasoner::default().fail(task_kind, "rate limited");
        let task = SpecialistAnalysisTask::new(Specialist::Dermatology, Arc::new(reasoning));

        let result = task.run(&record).await.unwrap();
        record.apply(result.update).unwrap();
        assert!(matches!(record.final_analysis, Some(AnalysisRecord::Error { ref error, .. }) if error.contains("rate limited")));
    }
}
