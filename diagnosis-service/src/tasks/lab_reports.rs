use async_trait::async_trait;
use case_flow::{NextAction, Result, Task, TaskResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::ids;
use crate::models::{CaseRecord, CaseUpdate};
use crate::ports::DocumentSummarizer;

/// Summarizes every attached lab document into `structured_input.lab_results`
pub struct ProcessLabReportsTask {
    summarizer: Arc<dyn DocumentSummarizer>,
}

impl ProcessLabReportsTask {
    pub fn new(summarizer: Arc<dyn DocumentSummarizer>) -> Self {
        Self { summarizer }
    }
}

#[async_trait]
impl Task<CaseRecord> for ProcessLabReportsTask {
    fn id(&self) -> &str {
        ids::PROCESS_LAB_REPORTS
    }

    async fn run(&self, case: &CaseRecord) -> Result<TaskResult<CaseUpdate>> {
        let files = &case.raw_input.files;
        info!(task_id = %self.id(), documents = files.len(), "Processing lab reports");

        let mut lab_results = BTreeMap::new();
        for (label, reference) in files {
            let result = self.summarizer.summarize(label, reference).await;
            lab_results.insert(label.clone(), result);
        }

        let failed = lab_results.values().filter(|r| r.is_error()).count();
        info!(task_id = %self.id(), summarized = lab_results.len() - failed, failed, "Lab reports processed");

        let mut structured_input = case.structured_input.clone().unwrap_or_default();
        structured_input.lab_results = Some(lab_results);

        let update = CaseUpdate {
            structured_input: Some(structured_input),
            ..Default::default()
        };
        Ok(TaskResult::new(update, NextAction::ContinueAndExecute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LabResult, PatientIntake, StructuredInput};
    use crate::tasks::stubs::FixedSummarizer;
    use case_flow::GraphState;
    use serde_json::json;

    #[tokio::test]
    async fn test_partial_success_keeps_other_fields() {
        let mut record = CaseRecord::new(PatientIntake {
            files: BTreeMap::from([
                ("cbc".to_string(), "cbc.pdf".to_string()),
                ("lipids".to_string(), "missing.pdf".to_string()),
            ]),
            ..Default::default()
        });
        record.structured_input = Some(
            serde_json::from_value::<StructuredInput>(json!({
                "severity": "Mild",
                "missing_information": ["Any allergies?"]
            }))
            .unwrap(),
        );

        let task = ProcessLabReportsTask::new(Arc::new(FixedSummarizer));
        let result = task.run(&record).await.unwrap();
        record.apply(result.update).unwrap();

        let structured = record.structured_input.as_ref().unwrap();
        assert_eq!(structured.missing_information, vec!["Any allergies?"]);
        assert_eq!(structured.extra["severity"], "Mild");
        let labs = record.lab_results().unwrap();
        assert!(!labs["cbc"].is_error());
        assert_eq!(labs["lipids"], LabResult::error("Lab report file not found."));
    }

    #[tokio::test]
    async fn test_no_documents_yields_empty_results() {
        let record = CaseRecord::default();
        let task = ProcessLabReportsTask::new(Arc::new(FixedSummarizer));
        let result = task.run(&record).await.unwrap();

        let labs = result.update.structured_input.unwrap().lab_results.unwrap();
        assert!(labs.is_empty());
    }
}
