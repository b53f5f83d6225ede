mod common;

use case_flow::{GraphError, Session};
use common::*;
use diagnosis_service::ports::ReasoningTask;
use diagnosis_service::{
    AnalysisRecord, CaseRecord, ContinueResponse, LabResult, MessageRole, SessionError, Specialist,
    WorkflowMode, build_diagnostic_workflow, create_case_session,
};
use std::sync::Arc;

const CARDIOLOGY: ReasoningTask = ReasoningTask::SpecialistAnalysis(Specialist::Cardiology);

async fn run_batch(
    ports: &diagnosis_service::Ports,
    session: &mut Session<CaseRecord>,
    max_steps: usize,
) -> Result<(), GraphError> {
    let graph = build_diagnostic_workflow(ports, WorkflowMode::Batch)?;
    graph.execute_session(session, max_steps).await.map(|_| ())
}

#[tokio::test]
async fn test_interactive_consultation_collects_answers_in_order() {
    let reports = tempfile::tempdir().unwrap();
    let reasoning = Arc::new(
        ScriptedReasoner::default()
            .reply(ReasoningTask::Intake, intake_reply(&["Any history of heart disease?", "Current medication?"]))
            .reply(
                ReasoningTask::RefineQuestions,
                r#"{"refined_questions": ["Any history of heart disease?", "Current medication?", "Does the pain radiate?"]}"#,
            )
            .reply(ReasoningTask::Triage, triage_reply(Specialist::Cardiology))
            .reply(CARDIOLOGY, complete_reply())
            .reply(
                ReasoningTask::MedicalReport,
                "# Diagnostic Summary Report\n## Probable Diagnosis\n- Unstable angina",
            ),
    );
    let ports = ports(reasoning.clone(), reports.path());
    let (manager, storage) = manager(&ports, 100);

    let started = manager
        .start(intake("chest pain and palpitations", &[("cbc", "cbc.pdf")]))
        .await
        .unwrap();
    assert_eq!(started.total_questions, 3);
    assert_eq!(started.pending_question.as_deref(), Some("Any history of heart disease?"));

    // the queue was seeded from the refined list, front already asked
    let stored = storage.get(&started.conversation_id).await.unwrap().unwrap();
    assert_eq!(stored.state.missing_information().len(), 3);
    assert_eq!(stored.state.question_queue, &stored.state.missing_information()[1..]);

    let id = started.conversation_id.clone();
    match manager.continue_consultation(&id, "No").await.unwrap() {
        ContinueResponse::Question {
            pending_question,
            remaining,
            ..
        } => {
            assert_eq!(pending_question, "Current medication?");
            assert_eq!(remaining, 2);
        }
        other => panic!("expected a question, got {other:?}"),
    }

    manager.continue_consultation(&id, "Aspirin").await.unwrap();
    let done = manager.continue_consultation(&id, "Yes, to the left arm").await.unwrap();
    match done {
        ContinueResponse::Done {
            done,
            answers,
            final_analysis,
            report_path,
            ..
        } => {
            assert!(done);
            assert_eq!(answers, vec!["No", "Aspirin", "Yes, to the left arm"]);
            assert!(matches!(final_analysis, Some(AnalysisRecord::Complete { .. })));
            let path = report_path.unwrap();
            assert!(std::fs::read(path).unwrap().starts_with(b"%PDF"));
        }
        other => panic!("expected done, got {other:?}"),
    }

    // answering after the queue is exhausted keeps returning every answer
    match manager.continue_consultation(&id, "Thank you").await.unwrap() {
        ContinueResponse::Done { answers, .. } => {
            assert_eq!(answers, vec!["No", "Aspirin", "Yes, to the left arm", "Thank you"]);
        }
        other => panic!("expected done, got {other:?}"),
    }

    let snapshot = manager.status(&id).await.unwrap();
    assert_eq!(snapshot.status, "completed");
    assert_eq!(snapshot.diagnosis_path, Some(Specialist::Cardiology));
    assert_eq!(snapshot.analysis_history_len, 2);

    let stored = storage.get(&id).await.unwrap().unwrap();
    let roles: Vec<MessageRole> = stored.state.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles[2..8],
        [
            MessageRole::Ai,
            MessageRole::Human,
            MessageRole::Ai,
            MessageRole::Human,
            MessageRole::Ai,
            MessageRole::Human
        ]
    );
}

#[tokio::test]
async fn test_chest_pain_is_routed_to_cardiology() {
    let reports = tempfile::tempdir().unwrap();
    let reasoning = Arc::new(
        ScriptedReasoner::default()
            .reply(ReasoningTask::Intake, intake_reply(&[]))
            .reply(ReasoningTask::Triage, r#"{"department":"cardiology"}"#)
            .reply(CARDIOLOGY, complete_reply())
            .reply(ReasoningTask::MedicalReport, "# Report"),
    );
    let ports = ports(reasoning.clone(), reports.path());

    let mut session = create_case_session(intake("chest pain and palpitations", &[]));
    run_batch(&ports, &mut session, 30).await.unwrap();

    assert!(session.is_completed());
    assert_eq!(session.state.diagnosis_path, Some(Specialist::Cardiology));
    assert_eq!(reasoning.count(CARDIOLOGY), 1);
    assert_eq!(
        reasoning.count(ReasoningTask::SpecialistAnalysis(Specialist::GeneralMedicine)),
        0
    );
    assert_eq!(reasoning.count(ReasoningTask::RefineQuestions), 0);
}

#[tokio::test]
async fn test_missing_lab_document_still_reaches_report() {
    let reports = tempfile::tempdir().unwrap();
    let missing = reports.path().join("blood_test_report.pdf");
    let reasoning = Arc::new(
        ScriptedReasoner::default()
            .reply(ReasoningTask::Intake, intake_reply(&["Any allergies?"]))
            .reply(ReasoningTask::Triage, triage_reply(Specialist::GeneralMedicine))
            .reply(
                ReasoningTask::SpecialistAnalysis(Specialist::GeneralMedicine),
                complete_reply(),
            )
            .reply(ReasoningTask::MedicalReport, "# Report\nNo labs available."),
    );
    let ports = ports_with_real_adapters(reasoning.clone(), reports.path());

    let mut session = create_case_session(intake(
        "fatigue",
        &[("lab_report", missing.to_str().unwrap())],
    ));
    run_batch(&ports, &mut session, 30).await.unwrap();

    let labs = session.state.lab_results().unwrap();
    assert_eq!(labs["lab_report"], LabResult::error("Lab report file not found."));
    assert_eq!(reasoning.count(ReasoningTask::LabSummary), 0);
    // refinement had nothing scripted and kept the intake question
    assert_eq!(session.state.missing_information(), ["Any allergies?"]);

    assert!(session.is_completed());
    assert_eq!(session.current_task_id, "generate_report");
    assert!(session.state.report_path.is_some());
    assert_eq!(session.state.report_error, None);
}

#[tokio::test]
async fn test_specialist_that_never_finishes_hits_step_limit() {
    let reports = tempfile::tempdir().unwrap();
    let reasoning = Arc::new(
        ScriptedReasoner::default()
            .reply(ReasoningTask::Intake, intake_reply(&["Any history of heart disease?"]))
            .reply(ReasoningTask::Triage, triage_reply(Specialist::Cardiology))
            .reply(CARDIOLOGY, incomplete_reply(&["Prior ECG?", "Family history?"])),
    );
    let ports = ports(reasoning.clone(), reports.path());

    let mut session = create_case_session(intake("chest pain", &[]));
    let err = run_batch(&ports, &mut session, 30).await.unwrap_err();

    assert!(matches!(err, GraphError::StepLimitExceeded { max_steps: 30, .. }));
    assert_eq!(session.steps_taken, 30);
    assert!(!session.is_completed());
    assert_eq!(reasoning.count(ReasoningTask::MedicalReport), 0);

    let specialist_runs = reasoning.count(CARDIOLOGY);
    assert!(specialist_runs > 1);
    assert_eq!(session.state.analysis_history.len(), 1 + specialist_runs);
}

#[tokio::test]
async fn test_history_grows_by_one_per_specialist_pass() {
    let reports = tempfile::tempdir().unwrap();
    let reasoning = Arc::new(
        ScriptedReasoner::default()
            .reply(ReasoningTask::Intake, intake_reply(&[]))
            .reply(ReasoningTask::Triage, triage_reply(Specialist::Cardiology))
            .reply(CARDIOLOGY, incomplete_reply(&["Prior ECG?"]))
            .reply(CARDIOLOGY, complete_reply())
            .reply(ReasoningTask::MedicalReport, "# Report"),
    );
    let ports = ports(reasoning.clone(), reports.path());
    let (manager, storage) = manager(&ports, 100);

    let started = manager.start(intake("palpitations", &[])).await.unwrap();
    assert_eq!(started.pending_question.as_deref(), Some("Prior ECG?"));
    assert_eq!(started.total_questions, 1);

    let done = manager
        .continue_consultation(&started.conversation_id, "Normal last year")
        .await
        .unwrap();
    assert!(matches!(done, ContinueResponse::Done { ref answers, .. } if answers == &["Normal last year"]));

    let stored = storage.get(&started.conversation_id).await.unwrap().unwrap();
    let history = &stored.state.analysis_history;
    assert_eq!(history.len(), 1 + reasoning.count(CARDIOLOGY));
    assert!(history[0].is_pending());
    assert!(matches!(history[1], AnalysisRecord::Incomplete { .. }));
    assert!(matches!(history[2], AnalysisRecord::Complete { .. }));
    assert_eq!(reasoning.count(ReasoningTask::Triage), 2);
}

#[tokio::test]
async fn test_fenced_and_bare_intake_produce_same_record() {
    let reports = tempfile::tempdir().unwrap();
    let mut structured = Vec::new();

    for reply in [
        intake_reply(&[]),
        format!("```json\n{}\n```", intake_reply(&[])),
    ] {
        let reasoning = Arc::new(
            ScriptedReasoner::default()
                .reply(ReasoningTask::Intake, reply)
                .reply(ReasoningTask::Triage, triage_reply(Specialist::Dermatology))
                .reply(
                    ReasoningTask::SpecialistAnalysis(Specialist::Dermatology),
                    complete_reply(),
                )
                .reply(ReasoningTask::MedicalReport, "# Report"),
        );
        let mut session = create_case_session(intake("itchy rash", &[]));
        run_batch(&ports(reasoning, reports.path()), &mut session, 30)
            .await
            .unwrap();
        structured.push(session.state.structured_input);
    }

    assert_eq!(structured[0], structured[1]);
    assert!(!structured[0].as_ref().unwrap().has_parsing_error());
}

#[tokio::test]
async fn test_unknown_conversation_is_reported() {
    let reports = tempfile::tempdir().unwrap();
    let ports = ports(Arc::new(ScriptedReasoner::default()), reports.path());
    let (manager, _) = manager(&ports, 100);

    let err = manager
        .continue_consultation("does-not-exist", "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::UnknownConversation(ref id) if id == "does-not-exist"));
    assert_eq!(err.to_string(), "Invalid conversation_id");
}

#[tokio::test]
async fn test_lock_table_drains_after_each_call() {
    let reports = tempfile::tempdir().unwrap();
    let reasoning = Arc::new(
        ScriptedReasoner::default()
            .reply(ReasoningTask::Intake, intake_reply(&["Any allergies?", "Current medication?"]))
            .reply(ReasoningTask::Triage, triage_reply(Specialist::Dermatology))
            .reply(
                ReasoningTask::SpecialistAnalysis(Specialist::Dermatology),
                complete_reply(),
            )
            .reply(ReasoningTask::MedicalReport, "# Report"),
    );
    let ports = ports(reasoning, reports.path());
    let (manager, storage) = manager(&ports, 100);

    for _ in 0..20 {
        let started = manager.start(intake("itchy rash", &[])).await.unwrap();
        let id = started.conversation_id;

        let next = manager.continue_consultation(&id, "None").await.unwrap();
        assert!(matches!(next, ContinueResponse::Question { .. }));
        assert_eq!(manager.active_locks(), 0);

        let done = manager.continue_consultation(&id, "Cetirizine").await.unwrap();
        assert!(matches!(done, ContinueResponse::Done { .. }));
        storage.delete(&id).await.unwrap();

        assert!(manager.continue_consultation(&id, "late").await.is_err());
    }

    assert_eq!(manager.active_locks(), 0);
    assert_eq!(manager.prune_idle_locks(), 0);
}

#[tokio::test]
async fn test_concurrent_answers_to_one_conversation_are_serialized() {
    let reports = tempfile::tempdir().unwrap();
    let reasoning = Arc::new(
        ScriptedReasoner::default()
            .reply(ReasoningTask::Intake, intake_reply(&["Any allergies?"]))
            .reply(ReasoningTask::Triage, triage_reply(Specialist::GeneralMedicine))
            .reply(
                ReasoningTask::SpecialistAnalysis(Specialist::GeneralMedicine),
                complete_reply(),
            )
            .reply(ReasoningTask::MedicalReport, "# Report"),
    );
    let ports = ports(reasoning, reports.path());
    let (manager, _) = manager(&ports, 100);
    let id = manager.start(intake("fever", &[])).await.unwrap().conversation_id;

    let (first, second) = tokio::join!(
        manager.continue_consultation(&id, "first"),
        manager.continue_consultation(&id, "second"),
    );
    assert!(first.is_ok() && second.is_ok());
    assert_eq!(manager.active_locks(), 0);

    let snapshot = manager.status(&id).await.unwrap();
    assert_eq!(snapshot.answers, vec!["first", "second"]);
    assert_eq!(snapshot.status, "completed");
}
