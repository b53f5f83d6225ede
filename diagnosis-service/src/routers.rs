//! Routers of the diagnostic graph. Pure functions of the case record.

use case_flow::Branch;

use crate::models::{AnalysisRecord, CaseRecord, Specialist};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatDecision {
    StartChat,
    NoChatNeeded,
}

impl Branch for ChatDecision {
    fn label(&self) -> &'static str {
        match self {
            ChatDecision::StartChat => "start_chat",
            ChatDecision::NoChatNeeded => "no_chat_needed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatProgress {
    ContinueChat,
    EndChat,
}

impl Branch for ChatProgress {
    fn label(&self) -> &'static str {
        match self {
            ChatProgress::ContinueChat => "continue_chat",
            ChatProgress::EndChat => "end_chat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisDecision {
    AskMoreQuestions,
    EndProcess,
}

impl Branch for AnalysisDecision {
    fn label(&self) -> &'static str {
        match self {
            AnalysisDecision::AskMoreQuestions => "ask_more_questions",
            AnalysisDecision::EndProcess => "end_process",
        }
    }
}

impl Branch for Specialist {
    fn label(&self) -> &'static str {
        self.as_str()
    }
}

/// After question refinement: interview only when there is something to ask
pub fn decide_if_chat_needed(case: &CaseRecord) -> ChatDecision {
    if case.missing_information().is_empty() {
        ChatDecision::NoChatNeeded
    } else {
        ChatDecision::StartChat
    }
}

/// After each question: keep asking while the queue has entries
pub fn decide_to_continue_chat(case: &CaseRecord) -> ChatProgress {
    if case.question_queue.is_empty() {
        ChatProgress::EndChat
    } else {
        ChatProgress::ContinueChat
    }
}

pub fn route_to_specialist(case: &CaseRecord) -> Specialist {
    case.diagnosis_path.unwrap_or(Specialist::GeneralMedicine)
}

/// Loop back for more questions only on an explicit incomplete result that
/// names at least one question; everything else ends the process.
pub fn decide_after_analysis(case: &CaseRecord) -> AnalysisDecision {
    match &case.final_analysis {
        Some(AnalysisRecord::Incomplete {
            missing_information,
            ..
        }) if !missing_information.is_empty() => AnalysisDecision::AskMoreQuestions,
        Some(AnalysisRecord::Incomplete { .. })
        | Some(AnalysisRecord::Complete { .. })
        | Some(AnalysisRecord::Error { .. })
        | Some(AnalysisRecord::Pending { .. })
        | None => AnalysisDecision::EndProcess,
    }
}
