use async_trait::async_trait;
use case_flow::{NextAction, Result, Task, TaskResult};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::{ids, to_json};
use crate::models::{CaseRecord, CaseUpdate};
use crate::ports::{ReasoningPort, ReasoningTask, ReportRenderer};

/// Terminal step: synthesizes the clinician report and renders it
pub struct GenerateReportTask {
    reasoning: Arc<dyn ReasoningPort>,
    renderer: Arc<dyn ReportRenderer>,
}

impl GenerateReportTask {
    pub fn new(reasoning: Arc<dyn ReasoningPort>, renderer: Arc<dyn ReportRenderer>) -> Self {
        Self { reasoning, renderer }
    }
}

#[async_trait]
impl Task<CaseRecord> for GenerateReportTask {
    fn id(&self) -> &str {
        ids::GENERATE_REPORT
    }

    async fn run(&self, case: &CaseRecord) -> Result<TaskResult<CaseUpdate>> {
        info!(task_id = %self.id(), "Generating clinician report");

        let final_json_data = json!({
            "raw_input": to_json(&case.raw_input)?,
            "final_analysis": to_json(&case.final_analysis)?,
            "lab_results": to_json(&case.lab_results())?,
        });

        let mut update = CaseUpdate::default();
        match self
            .reasoning
            .invoke(ReasoningTask::MedicalReport, json!({ "final_json_data": final_json_data }))
            .await
        {
            Ok(markdown) => {
                let markdown = markdown.trim().to_string();
                match self.renderer.render(&markdown).await {
                    Ok(path) if case.report_path.is_none() => {
                        info!(task_id = %self.id(), path = %path, "Report stored");
                        update.report_path = Some(path);
                    }
                    Ok(path) => warn!(task_id = %self.id(), path = %path, "Report already stored, keeping the first"),
                    Err(e) => {
                        warn!(task_id = %self.id(), error = %e, "Report rendering failed");
                        update.report_error = Some(e.to_string());
                    }
                }
                update.report_markdown = Some(markdown);
            }
            Err(e) => {
                warn!(task_id = %self.id(), error = %e, "Report synthesis failed");
                update.report_error = Some(e.to_string());
            }
        }

        let status = if update.report_error.is_some() {
            "Report unavailable"
        } else {
            "Report generated"
        };
        Ok(TaskResult::new(update, NextAction::End).with_status(status))
    }
}
