use case_flow::GraphState;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, VecDeque};

/// Reads an explicit `null` list the same as a missing one
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Vital signs as entered at intake; free text, not normalized
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vitals {
    pub temperature: Option<String>,
    pub bp: Option<String>,
    pub pulse: Option<String>,
    pub spo2: Option<String>,
}

/// The patient's original request. Written once when the case is opened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientIntake {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    pub age: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_group: Option<String>,
    /// Primary complaint in the patient's words
    pub symptoms: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default)]
    pub vitals: Vitals,
    /// Attached lab documents, label -> document reference
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, String>,
}

/// Outcome of summarizing one lab document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabResult {
    Summary { summary: Value },
    Error { error: String },
}

impl LabResult {
    pub fn error(message: impl Into<String>) -> Self {
        LabResult::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LabResult::Error { .. })
    }
}

/// Normalized intake plus everything later steps derive from it.
///
/// Only the fields the workflow reads are typed; whatever else the intake
/// model produced (symptoms, severity, vital flags, or the raw output and
/// parse error when it produced nothing usable) rides along in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredInput {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub missing_information: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_results: Option<BTreeMap<String, LabResult>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StructuredInput {
    pub fn parse_failure(raw_output: &str, parsing_error: &str) -> Self {
        let mut extra = Map::new();
        extra.insert("raw_output".to_string(), Value::String(raw_output.to_string()));
        extra.insert(
            "parsing_error".to_string(),
            Value::String(parsing_error.to_string()),
        );
        Self {
            extra,
            ..Default::default()
        }
    }

    /// Intake could not be normalized because the reasoning service failed
    pub fn unavailable(error: &str) -> Self {
        let mut extra = Map::new();
        extra.insert("error".to_string(), Value::String(error.to_string()));
        Self {
            extra,
            ..Default::default()
        }
    }

    pub fn has_parsing_error(&self) -> bool {
        self.extra.contains_key("parsing_error")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Ai,
    Human,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Ai,
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Human,
            content: content.into(),
        }
    }
}

/// Department a case is routed to by triage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialist {
    GeneralMedicine,
    Cardiology,
    Dermatology,
}

impl Specialist {
    pub const ALL: [Specialist; 3] = [
        Specialist::GeneralMedicine,
        Specialist::Cardiology,
        Specialist::Dermatology,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Specialist::GeneralMedicine => "general_medicine",
            Specialist::Cardiology => "cardiology",
            Specialist::Dermatology => "dermatology",
        }
    }

    /// Name of the analysis node for this specialist
    pub fn node_id(&self) -> &'static str {
        match self {
            Specialist::GeneralMedicine => "general_medicine_analysis",
            Specialist::Cardiology => "cardiology_analysis",
            Specialist::Dermatology => "dermatology_analysis",
        }
    }

    /// Role the reasoning service is asked to play
    pub fn title(&self) -> &'static str {
        match self {
            Specialist::GeneralMedicine => "General Practitioner",
            Specialist::Cardiology => "Cardiologist",
            Specialist::Dermatology => "Dermatologist",
        }
    }

    pub fn from_department(department: &str) -> Option<Self> {
        let department = department.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|specialist| specialist.as_str() == department)
    }
}

impl std::fmt::Display for Specialist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the analysis history, tagged by `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisRecord {
    /// Placeholder written by triage before any specialist has run
    Pending {
        condition: String,
        confidence: u8,
        reasoning: String,
        evidence: Vec<String>,
        urgency: String,
    },
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
    /// Specialist output that could not be understood
    Error { error: String, raw_output: String },
}

impl AnalysisRecord {
    pub fn triage_placeholder() -> Self {
        AnalysisRecord::Pending {
            condition: "Waiting for AI Specialist Analysis...".to_string(),
            confidence: 0,
            reasoning: "The system is routing the case to the appropriate specialist.".to_string(),
            evidence: Vec::new(),
            urgency: "low".to_string(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, AnalysisRecord::Pending { .. })
    }
}

/// The mutable record threaded through every step of one diagnostic run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub raw_input: PatientIntake,
    #[serde(default)]
    pub structured_input: Option<StructuredInput>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub question_queue: VecDeque<String>,
    #[serde(default)]
    pub diagnosis_path: Option<Specialist>,
    #[serde(default)]
    pub final_analysis: Option<AnalysisRecord>,
    #[serde(default)]
    pub analysis_history: Vec<AnalysisRecord>,
    #[serde(default)]
    pub pending_question: Option<String>,
    #[serde(default)]
    pub report_path: Option<String>,
    #[serde(default)]
    pub report_markdown: Option<String>,
    #[serde(default)]
    pub report_error: Option<String>,
    /// Raw patient answers in submission order
    #[serde(default)]
    pub answers: Vec<String>,
}

impl CaseRecord {
    pub fn new(raw_input: PatientIntake) -> Self {
        Self {
            raw_input,
            ..Default::default()
        }
    }

    pub fn missing_information(&self) -> &[String] {
        self.structured_input
            .as_ref()
            .map(|input| input.missing_information.as_slice())
            .unwrap_or_default()
    }

    pub fn lab_results(&self) -> Option<&BTreeMap<String, LabResult>> {
        self.structured_input
            .as_ref()
            .and_then(|input| input.lab_results.as_ref())
    }
}

/// Change to the question queue
#[derive(Debug, Clone, PartialEq)]
pub enum QueueUpdate {
    /// Load a fresh round of questions, discarding whatever was queued
    Replace(Vec<String>),
    /// Consume the question at the front of the queue
    PopFront(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PendingQuestion {
    Set(String),
    Clear,
}

/// Partial update returned by a step. Unset fields leave the record alone.
#[derive(Debug, Default)]
pub struct CaseUpdate {
    pub structured_input: Option<StructuredInput>,
    pub append_messages: Vec<Message>,
    pub question_queue: Option<QueueUpdate>,
    pub diagnosis_path: Option<Specialist>,
    pub final_analysis: Option<AnalysisRecord>,
    pub append_history: Vec<AnalysisRecord>,
    pub pending_question: Option<PendingQuestion>,
    pub report_path: Option<String>,
    pub report_markdown: Option<String>,
    pub report_error: Option<String>,
    pub append_answers: Vec<String>,
}

impl CaseUpdate {
    /// Update carrying a patient's answer to the pending question
    pub fn answer(answer: impl Into<String>) -> Self {
        let answer = answer.into();
        Self {
            append_messages: vec![Message::human(answer.clone())],
            pending_question: Some(PendingQuestion::Clear),
            append_answers: vec![answer],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.structured_input.is_none()
            && self.append_messages.is_empty()
            && self.question_queue.is_none()
            && self.diagnosis_path.is_none()
            && self.final_analysis.is_none()
            && self.append_history.is_empty()
            && self.pending_question.is_none()
            && self.report_path.is_none()
            && self.report_markdown.is_none()
            && self.report_error.is_none()
            && self.append_answers.is_empty()
    }

    fn validate(&self, record: &CaseRecord) -> Result<(), String> {
        if let Some(replacement) = &self.structured_input {
            if record.lab_results().is_some() && replacement.lab_results.is_none() {
                return Err("structured_input replacement discards lab_results".to_string());
            }
        }

        if let Some(QueueUpdate::PopFront(question)) = &self.question_queue {
            match record.question_queue.front() {
                Some(front) if front == question => {}
                Some(front) => {
                    return Err(format!(
                        "question_queue pop of '{question}' but front is '{front}'"
                    ));
                }
                None => return Err(format!("question_queue pop of '{question}' from empty queue")),
            }
        }

        if self.report_path.is_some() && record.report_path.is_some() {
            return Err("report_path is already set".to_string());
        }

        Ok(())
    }
}

impl GraphState for CaseRecord {
    type Update = CaseUpdate;

    fn apply(&mut self, update: CaseUpdate) -> Result<(), String> {
        update.validate(self)?;

        if let Some(structured_input) = update.structured_input {
            self.structured_input = Some(structured_input);
        }
        self.messages.extend(update.append_messages);
        match update.question_queue {
            Some(QueueUpdate::Replace(questions)) => self.question_queue = questions.into(),
            Some(QueueUpdate::PopFront(_)) => {
                self.question_queue.pop_front();
            }
            None => {}
        }
        if let Some(specialist) = update.diagnosis_path {
            self.diagnosis_path = Some(specialist);
        }
        if let Some(analysis) = update.final_analysis {
            self.final_analysis = Some(analysis);
        }
        self.analysis_history.extend(update.append_history);
        match update.pending_question {
            Some(PendingQuestion::Set(question)) => self.pending_question = Some(question),
            Some(PendingQuestion::Clear) => self.pending_question = None,
            None => {}
        }
        if let Some(path) = update.report_path {
            self.report_path = Some(path);
        }
        if let Some(markdown) = update.report_markdown {
            self.report_markdown = Some(markdown);
        }
        if let Some(error) = update.report_error {
            self.report_error = Some(error);
        }
        self.answers.extend(update.append_answers);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartConsultationRequest {
    pub patient_data: PatientIntake,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationQuery {
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    pub conversation_id: String,
    pub pending_question: Option<String>,
    pub total_questions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContinueResponse {
    Question {
        conversation_id: String,
        pending_question: String,
        remaining: usize,
    },
    Done {
        conversation_id: String,
        done: bool,
        answers: Vec<String>,
        final_analysis: Option<AnalysisRecord>,
        report_path: Option<String>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub conversation_id: String,
    pub status: String,
    pub current_task: String,
    pub status_message: Option<String>,
    pub steps_taken: usize,
    pub pending_question: Option<String>,
    pub queued_questions: usize,
    pub diagnosis_path: Option<Specialist>,
    pub final_analysis: Option<AnalysisRecord>,
    pub analysis_history_len: usize,
    pub report_path: Option<String>,
    pub report_error: Option<String>,
    pub answers: Vec<String>,
}
