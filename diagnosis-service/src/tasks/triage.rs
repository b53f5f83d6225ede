use async_trait::async_trait;
use case_flow::{NextAction, Result, Task, TaskResult};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::ids;
use crate::models::{AnalysisRecord, CaseRecord, CaseUpdate, Specialist};
use crate::ports::{ReasoningPort, ReasoningTask, parse_response};

#[derive(Deserialize)]
struct TriageDecision {
    department: Option<String>,
}

/// Picks the specialist for the primary complaint. Runs again after every
/// interview round, so the department can change mid-case.
pub struct TriageTask {
    reasoning: Arc<dyn ReasoningPort>,
}

impl TriageTask {
    pub fn new(reasoning: Arc<dyn ReasoningPort>) -> Self {
        Self { reasoning }
    }

    async fn classify(&self, complaint: &str) -> Specialist {
        let raw = match self
            .reasoning
            .invoke(ReasoningTask::Triage, json!({ "primary_complaint": complaint }))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(task_id = %self.id(), error = %e, "Triage unavailable, defaulting to general medicine");
                return Specialist::GeneralMedicine;
            }
        };

        match parse_response::<TriageDecision>(&raw) {
            Ok(TriageDecision {
                department: Some(department),
            }) => Specialist::from_department(&department).unwrap_or_else(|| {
                warn!(task_id = %self.id(), department = %department, "Unknown department, defaulting to general medicine");
                Specialist::GeneralMedicine
            }),
            Ok(TriageDecision { department: None }) => Specialist::GeneralMedicine,
            Err(failure) => {
                warn!(task_id = %self.id(), error = %failure, "Triage output unparseable, defaulting to general medicine");
                Specialist::GeneralMedicine
            }
        }
    }
}

#[async_trait]
impl Task<CaseRecord> for TriageTask {
    fn id(&self) -> &str {
        ids::TRIAGE_ROUTER
    }

    async fn run(&self, case: &CaseRecord) -> Result<TaskResult<CaseUpdate>> {
        // the placeholder marks the start of the analysis history; later
        // passes through triage leave it alone
        let append_history = if case.analysis_history.iter().any(AnalysisRecord::is_pending) {
            Vec::new()
        } else {
            vec![AnalysisRecord::triage_placeholder()]
        };

        let specialist = self.classify(&case.raw_input.symptoms).await;
        if let Some(previous) = case.diagnosis_path.filter(|previous| *previous != specialist) {
            info!(task_id = %self.id(), from = %previous, to = %specialist, "Case re-routed");
        }
        info!(task_id = %self.id(), %specialist, "Routing case");

        let update = CaseUpdate {
            diagnosis_path: Some(specialist),
            append_history,
            ..Default::default()
        };
        Ok(TaskResult::new(update, NextAction::ContinueAndExecute)
            .with_status(format!("Routed to {}", specialist.title())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatientIntake;
    use crate::tasks::stubs::ScriptedReasoner;
    use case_flow::GraphState;

    fn case(symptoms: &str) -> CaseRecord {
        CaseRecord::new(PatientIntake {
            symptoms: symptoms.to_string(),
            ..Default::default()
        })
    }

    async fn triage(reasoning: ScriptedReasoner, record: &mut CaseRecord) {
        let result = TriageTask::new(Arc::new(reasoning)).run(record).await.unwrap();
        record.apply(result.update).unwrap();
    }

    #[tokio::test]
    async fn test_chest_pain_routes_to_cardiology() {
        let reasoning = ScriptedReasoner::default().reply(ReasoningTask::Triage, r#"{"department":"cardiology"}"#);
        let mut record = case("chest pain and palpitations");
        triage(reasoning, &mut record).await;

        assert_eq!(record.diagnosis_path, Some(Specialist::Cardiology));
        assert_eq!(record.analysis_history, vec![AnalysisRecord::triage_placeholder()]);
    }

    #[tokio::test]
    async fn test_bad_output_defaults_to_general_medicine() {
        for reply in ["cardiology, probably", r#"{"department":"neurology"}"#, "{}"] {
            let mut record = case("headache");
            triage(ScriptedReasoner::default().reply(ReasoningTask::Triage, reply), &mut record).await;
            assert_eq!(record.diagnosis_path, Some(Specialist::GeneralMedicine), "reply: {reply}");
        }

        let mut record = case("headache");
        triage(ScriptedReasoner::default().fail(ReasoningTask::Triage, "503"), &mut record).await;
        assert_eq!(record.diagnosis_path, Some(Specialist::GeneralMedicine));
    }

    #[tokio::test]
    async fn test_placeholder_written_once_across_passes() {
        let mut record = case("rash");
        triage(
            ScriptedReasoner::default().reply(ReasoningTask::Triage, r#"{"department":"dermatology"}"#),
            &mut record,
        )
        .await;
        triage(
            ScriptedReasoner::default().reply(ReasoningTask::Triage, r#"{"department":"general_medicine"}"#),
            &mut record,
        )
        .await;

        assert_eq!(record.analysis_history.len(), 1);
        assert_eq!(record.diagnosis_path, Some(Specialist::GeneralMedicine));
    }
}
