use serde_json::Value;

use crate::models::Specialist;
use crate::ports::ReasoningTask;

const INTAKE_PROMPT: &str = r#"You are a clinical intake assistant. Turn the patient's submission into a structured record.

- Normalize the reported symptoms into standard medical terms.
- Interpret the vital signs against standard thresholds.
- Infer a severity of "Mild", "Moderate" or "Severe".
- List the questions a doctor would still need answered (allergies, current medication, history, ...).

Respond with ONLY this JSON object and nothing else:
{
  "symptoms": ["normalized", "symptoms"],
  "severity": "Mild",
  "vital_flags": {"fever": false, "hypertension": false, "tachycardia": false, "hypoxia": false},
  "missing_information": ["Questions for the patient"]
}
"#;

const LAB_SUMMARY_PROMPT: &str = r#"You summarize blood test reports.

Find every parameter outside its reference range and the concerns they raise.
Respond with ONLY this JSON object:
{
  "abnormal_findings": [
    {"parameter": "WBC", "value": "15.2", "standard_range": "4.5-11.0", "interpretation": "High"}
  ],
  "concerns": ["Potential concerns"]
}
"#;

const REFINE_QUESTIONS_PROMPT: &str = r#"You prepare the question list for a patient interview.

Merge the intake questions with new questions prompted by abnormal lab findings.
Drop duplicates and low value questions. The final list must hold at most 7 questions;
combine related ones if needed.
Respond with ONLY this JSON object:
{"refined_questions": ["..."]}
"#;

const TRIAGE_PROMPT: &str = r#"You route patients to a department based on their primary complaint.

Departments: "cardiology", "dermatology", "general_medicine".
- Heart, blood pressure or chest pain: "cardiology".
- Skin, rashes, moles or itching: "dermatology".
- Anything else, or when unsure: "general_medicine".
Respond with ONLY this JSON object:
{"department": "selected_department"}
"#;

const SPECIALIST_PROMPT: &str = r#"You are an expert diagnostician acting as a {title}.

Review the structured patient data, lab results and the whole conversation, then decide
whether you have enough information for a confident analysis.

If you do, respond with:
{
  "status": "complete",
  "analysis": {
    "probable_diagnosis": {
      "condition": "...",
      "confidence_score": 85,
      "reasoning": "...",
      "evidence": ["data points supporting the diagnosis"],
      "urgency": "Low | Medium | High | Critical"
    },
    "differential_diagnosis": [{"condition": "...", "reasoning": "..."}],
    "recommended_tests": ["..."],
    "suggested_medications": ["..."],
    "medication_disclaimer": "A qualified human doctor must make the final prescribing decision."
  }
}

If critical information is missing, respond with:
{
  "status": "incomplete",
  "reasoning": "what is missing and why it matters",
  "missing_information": ["new, specific questions for the patient"]
}

Respond with ONLY one of these JSON objects.
"#;

const MEDICAL_REPORT_PROMPT: &str = r#"You write clinician-facing diagnostic summaries in Markdown.

Use this structure and fill it from the JSON you are given:

# Diagnostic Summary Report
## Patient Overview
## Red-Flag Alert  (write "No critical red flags detected." when there are none)
## Risk Stratification
## Probable Diagnosis  (condition, confidence, supporting evidence)
## Differential Diagnoses
## Key Laboratory Findings
## Recommended Plan
### Suggested Diagnostic Tests
### Suggested Medications / Treatments  (include the prescribing disclaimer)

Output only the Markdown.
"#;

/// System preamble for a reasoning task
pub fn preamble(task: ReasoningTask) -> String {
    match task {
        ReasoningTask::Intake => INTAKE_PROMPT.to_string(),
        ReasoningTask::LabSummary => LAB_SUMMARY_PROMPT.to_string(),
        ReasoningTask::RefineQuestions => REFINE_QUESTIONS_PROMPT.to_string(),
        ReasoningTask::Triage => TRIAGE_PROMPT.to_string(),
        ReasoningTask::SpecialistAnalysis(specialist) => specialist_preamble(specialist),
        ReasoningTask::MedicalReport => MEDICAL_REPORT_PROMPT.to_string(),
    }
}

fn specialist_preamble(specialist: Specialist) -> String {
    SPECIALIST_PROMPT.replace("{title}", specialist.title())
}

/// User message for a reasoning task, built from the step's arguments
pub fn request(task: ReasoningTask, arguments: &Value) -> String {
    match task {
        ReasoningTask::Intake => {
            let vitals = &arguments["patient_data"]["vitals"];
            format!(
                "Patient information:\n{}\n\nVitals:\n- Temperature: {}\n- Blood pressure: {}\n- Pulse: {}\n- SpO2: {}",
                pretty(&arguments["patient_data"]),
                text(&vitals["temperature"]),
                text(&vitals["bp"]),
                text(&vitals["pulse"]),
                text(&vitals["spo2"]),
            )
        }
        ReasoningTask::LabSummary => format!(
            "Please summarize this blood test report:\n\n{}",
            text(&arguments["report_text"])
        ),
        ReasoningTask::RefineQuestions => format!(
            "Initial questions:\n{}\n\nLab report summary:\n{}",
            pretty(&arguments["initial_questions"]),
            pretty(&arguments["lab_summary"]),
        ),
        ReasoningTask::Triage => format!(
            "Please triage the following patient complaint: \"{}\"",
            text(&arguments["primary_complaint"])
        ),
        ReasoningTask::SpecialistAnalysis(_) => format!(
            "Please assess and analyze the following patient record.\n\nStructured patient data:\n{}\n\nConversation history:\n{}",
            pretty(&arguments["structured_data"]),
            text(&arguments["conversation_history"]),
        ),
        ReasoningTask::MedicalReport => format!(
            "Please generate a diagnostic summary report from the following data:\n\n{}",
            pretty(&arguments["final_json_data"])
        ),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_specialist_preamble_names_the_role() {
        let preamble = preamble(ReasoningTask::SpecialistAnalysis(Specialist::Cardiology));
        assert!(preamble.contains("acting as a Cardiologist"));
        assert!(!preamble.contains("{title}"));
    }

    #[test]
    fn test_intake_request_lists_vitals_even_when_missing() {
        let request = request(
            ReasoningTask::Intake,
            &json!({"patient_data": {"Name": "A", "vitals": {"bp": "120/80"}}}),
        );
        assert!(request.contains("- Blood pressure: 120/80"));
        assert!(request.contains("- Pulse: \n"));
    }
}
