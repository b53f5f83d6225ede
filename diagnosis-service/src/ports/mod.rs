//! Narrow interfaces to the collaborators the workflow steps call out to.
//!
//! Steps depend only on the traits here; production adapters live in the
//! submodules and tests substitute scripted implementations.

pub mod lab_summary;
pub mod reasoning;
pub mod report_pdf;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{LabResult, Specialist};

pub use lab_summary::OcrLabSummarizer;
pub use reasoning::{OpenRouterReasoner, ParseFailure, normalize_response, parse_response};
pub use report_pdf::PdfReportRenderer;

/// Failure of an external collaborator. Steps absorb these into the record.
#[derive(Error, Debug)]
pub enum PortError {
    #[error("reasoning service error: {0}")]
    Reasoning(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("document error: {0}")]
    Document(String),

    #[error("rendering error: {0}")]
    Rendering(String),
}

/// Named tasks the reasoning service knows how to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningTask {
    Intake,
    LabSummary,
    RefineQuestions,
    Triage,
    SpecialistAnalysis(Specialist),
    MedicalReport,
}

impl ReasoningTask {
    pub fn name(&self) -> String {
        match self {
            ReasoningTask::Intake => "intake".to_string(),
            ReasoningTask::LabSummary => "lab_summary".to_string(),
            ReasoningTask::RefineQuestions => "refine_questions".to_string(),
            ReasoningTask::Triage => "triage".to_string(),
            ReasoningTask::SpecialistAnalysis(specialist) => specialist.node_id().to_string(),
            ReasoningTask::MedicalReport => "medical_report".to_string(),
        }
    }
}

/// Reasoning service: returns raw text that is expected, not guaranteed, to be JSON
#[async_trait]
pub trait ReasoningPort: Send + Sync {
    async fn invoke(&self, task: ReasoningTask, arguments: Value) -> Result<String, PortError>;
}

/// Turns a lab document reference into a summary. Never fails: problems come
/// back as [`LabResult::Error`].
#[async_trait]
pub trait DocumentSummarizer: Send + Sync {
    async fn summarize(&self, label: &str, reference: &str) -> LabResult;
}

/// Renders the synthesized Markdown report and returns where it was stored
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(&self, markdown: &str) -> Result<String, PortError>;
}
