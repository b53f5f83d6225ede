// Diagnostic workflow steps
pub mod ask_one_question;
pub mod generate_report;
pub mod initialize_chat;
pub mod lab_reports;
pub mod preprocess;
pub mod refine_questions;
pub mod specialist_analysis;
pub mod triage;

pub use ask_one_question::AskOneQuestionTask;
pub use generate_report::GenerateReportTask;
pub use initialize_chat::InitializeChatTask;
pub use lab_reports::ProcessLabReportsTask;
pub use preprocess::PreprocessTask;
pub use refine_questions::{MAX_REFINED_QUESTIONS, RefineQuestionsTask};
pub use specialist_analysis::{SpecialistAnalysisTask, SpecialistResult};
pub use triage::TriageTask;

use case_flow::{GraphError, Result};
use serde::Serialize;
use serde_json::Value;

/// Node names of the diagnostic graph
pub mod ids {
    pub const PREPROCESS: &str = "preprocess";
    pub const PROCESS_LAB_REPORTS: &str = "process_lab_reports";
    pub const REFINE_QUESTIONS: &str = "refine_questions";
    pub const INITIALIZE_CHAT: &str = "initialize_chat";
    pub const ASK_ONE_QUESTION: &str = "ask_one_question";
    pub const TRIAGE_ROUTER: &str = "triage_router";
    pub const GENERATE_REPORT: &str = "generate_report";
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| GraphError::TaskExecutionFailed(e.to_string()))
}
