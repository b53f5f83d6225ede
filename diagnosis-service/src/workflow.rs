use case_flow::{FlowRunner, Graph, GraphBuilder, Result, Session, SessionStorage};
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::models::{CaseRecord, PatientIntake, Specialist};
use crate::ports::{
    DocumentSummarizer, OcrLabSummarizer, OpenRouterReasoner, PdfReportRenderer, ReasoningPort,
    ReportRenderer,
};
use crate::routers::{
    AnalysisDecision, ChatDecision, ChatProgress, decide_after_analysis, decide_if_chat_needed,
    decide_to_continue_chat, route_to_specialist,
};
use crate::tasks::*;

pub const GRAPH_ID: &str = "diagnostic_workflow";

/// External collaborators the workflow steps call out to
#[derive(Clone)]
pub struct Ports {
    pub reasoning: Arc<dyn ReasoningPort>,
    pub documents: Arc<dyn DocumentSummarizer>,
    pub renderer: Arc<dyn ReportRenderer>,
}

impl Ports {
    /// Production adapters: OpenRouter reasoning, OCR lab summaries, PDF reports
    pub fn from_config(config: &ServiceConfig) -> Self {
        let reasoning: Arc<dyn ReasoningPort> = Arc::new(OpenRouterReasoner::new(
            &config.openrouter_api_key,
            config.models.clone(),
        ));
        Self {
            documents: Arc::new(OcrLabSummarizer::new(
                config.openrouter_api_key.clone(),
                config.ocr_model.clone(),
                reasoning.clone(),
            )),
            renderer: Arc::new(PdfReportRenderer::new(config.report_dir.clone())),
            reasoning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowMode {
    /// Suspend after every emitted question until the patient answers
    Interactive,
    /// Run straight through; questions are emitted but never answered
    Batch,
}

pub fn build_diagnostic_workflow(ports: &Ports, mode: WorkflowMode) -> Result<Graph<CaseRecord>> {
    let mut builder = GraphBuilder::<CaseRecord>::new(GRAPH_ID)
        .add_task(Arc::new(PreprocessTask::new(ports.reasoning.clone())))
        .add_task(Arc::new(ProcessLabReportsTask::new(ports.documents.clone())))
        .add_task(Arc::new(RefineQuestionsTask::new(ports.reasoning.clone())))
        .add_task(Arc::new(InitializeChatTask))
        .add_task(Arc::new(AskOneQuestionTask))
        .add_task(Arc::new(TriageTask::new(ports.reasoning.clone())))
        .add_task(Arc::new(GenerateReportTask::new(
            ports.reasoning.clone(),
            ports.renderer.clone(),
        )))
        .set_start_task(ids::PREPROCESS)
        .add_edge(ids::PREPROCESS, ids::PROCESS_LAB_REPORTS)
        .add_edge(ids::PROCESS_LAB_REPORTS, ids::REFINE_QUESTIONS)
        .add_conditional_edges(
            ids::REFINE_QUESTIONS,
            decide_if_chat_needed,
            [
                (ChatDecision::StartChat, ids::INITIALIZE_CHAT),
                (ChatDecision::NoChatNeeded, ids::TRIAGE_ROUTER),
            ],
        )
        .add_edge(ids::INITIALIZE_CHAT, ids::ASK_ONE_QUESTION)
        .add_conditional_edges(
            ids::ASK_ONE_QUESTION,
            decide_to_continue_chat,
            [
                (ChatProgress::ContinueChat, ids::ASK_ONE_QUESTION),
                (ChatProgress::EndChat, ids::TRIAGE_ROUTER),
            ],
        )
        .add_conditional_edges(
            ids::TRIAGE_ROUTER,
            route_to_specialist,
            Specialist::ALL.map(|specialist| (specialist, specialist.node_id())),
        );

    for specialist in Specialist::ALL {
        builder = builder
            .add_task(Arc::new(SpecialistAnalysisTask::new(
                specialist,
                ports.reasoning.clone(),
            )))
            .add_conditional_edges(
                specialist.node_id(),
                decide_after_analysis,
                [
                    (AnalysisDecision::AskMoreQuestions, ids::INITIALIZE_CHAT),
                    (AnalysisDecision::EndProcess, ids::GENERATE_REPORT),
                ],
            );
    }

    if mode == WorkflowMode::Interactive {
        builder = builder.interrupt_after(ids::ASK_ONE_QUESTION);
    }

    builder.build()
}

/// A new case positioned at the entry task
pub fn create_case_session(intake: PatientIntake) -> Session<CaseRecord> {
    Session::new(ids::PREPROCESS, CaseRecord::new(intake)).with_graph_id(GRAPH_ID)
}

pub fn create_flow_runner(
    ports: &Ports,
    storage: Arc<dyn SessionStorage<CaseRecord>>,
    max_steps: usize,
) -> Result<FlowRunner<CaseRecord>> {
    let graph = Arc::new(build_diagnostic_workflow(ports, WorkflowMode::Interactive)?);
    Ok(FlowRunner::new(graph, storage, max_steps))
}
