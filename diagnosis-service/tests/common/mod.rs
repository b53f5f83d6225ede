#![allow(dead_code)]

use async_trait::async_trait;
use case_flow::{FlowRunner, InMemorySessionStorage, SessionStorage};
use diagnosis_service::ports::{
    DocumentSummarizer, OcrLabSummarizer, PdfReportRenderer, PortError, ReasoningPort, ReasoningTask,
};
use diagnosis_service::{CaseRecord, ConsultationManager, LabResult, PatientIntake, Ports, Specialist, create_flow_runner};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Reasoning stub: replies per task name, in order; the last reply repeats
#[derive(Default)]
pub struct ScriptedReasoner {
    replies: Mutex<HashMap<String, VecDeque<String>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedReasoner {
    pub fn reply(self, task: ReasoningTask, text: impl Into<String>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(task.name())
            .or_default()
            .push_back(text.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, task: ReasoningTask) -> usize {
        let name = task.name();
        self.calls().iter().filter(|c| **c == name).count()
    }
}

#[async_trait]
impl ReasoningPort for ScriptedReasoner {
    async fn invoke(&self, task: ReasoningTask, _arguments: Value) -> Result<String, PortError> {
        self.calls.lock().unwrap().push(task.name());
        let mut replies = self.replies.lock().unwrap();
        let queue = replies
            .get_mut(&task.name())
            .ok_or_else(|| PortError::Reasoning(format!("nothing scripted for {}", task.name())))?;
        let reply = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        reply.ok_or_else(|| PortError::Reasoning("empty script".to_string()))
    }
}

/// Summarizer that never touches the filesystem
pub struct CannedSummarizer;

#[async_trait]
impl DocumentSummarizer for CannedSummarizer {
    async fn summarize(&self, label: &str, _reference: &str) -> LabResult {
        LabResult::Summary {
            summary: json!({ "abnormal_findings": [{"parameter": "Troponin", "interpretation": "High"}], "label": label }),
        }
    }
}

pub fn intake(symptoms: &str, files: &[(&str, &str)]) -> PatientIntake {
    serde_json::from_value(json!({
        "Name": "Ravi",
        "age": 54,
        "weight": 80,
        "gender": "male",
        "symptoms": symptoms,
        "duration": "2 days",
        "vitals": {"temperature": "98.6 F", "bp": "150/95", "pulse": "110", "spo2": "97%"},
        "files": files.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<BTreeMap<_, _>>(),
    }))
    .unwrap()
}

pub fn intake_reply(questions: &[&str]) -> String {
    json!({
        "symptoms": ["chest pain", "palpitations"],
        "severity": "Moderate",
        "missing_information": questions,
    })
    .to_string()
}

pub fn triage_reply(specialist: Specialist) -> String {
    json!({ "department": specialist.as_str() }).to_string()
}

pub fn complete_reply() -> String {
    json!({
        "status": "complete",
        "analysis": {"probable_diagnosis": {"condition": "Unstable angina", "confidence_score": 80}}
    })
    .to_string()
}

pub fn incomplete_reply(questions: &[&str]) -> String {
    json!({
        "status": "incomplete",
        "reasoning": "Cardiac history needed",
        "missing_information": questions,
    })
    .to_string()
}

/// Ports with the production OCR summarizer and PDF renderer around a stub reasoner
pub fn ports_with_real_adapters(reasoning: Arc<ScriptedReasoner>, report_dir: &Path) -> Ports {
    Ports {
        documents: Arc::new(OcrLabSummarizer::new("unused", "unused", reasoning.clone())),
        renderer: Arc::new(PdfReportRenderer::new(report_dir)),
        reasoning,
    }
}

pub fn ports(reasoning: Arc<ScriptedReasoner>, report_dir: &Path) -> Ports {
    Ports {
        documents: Arc::new(CannedSummarizer),
        renderer: Arc::new(PdfReportRenderer::new(report_dir)),
        reasoning,
    }
}

pub fn manager(ports: &Ports, max_steps: usize) -> (ConsultationManager, Arc<dyn SessionStorage<CaseRecord>>) {
    let storage: Arc<dyn SessionStorage<CaseRecord>> = Arc::new(InMemorySessionStorage::new());
    let runner: FlowRunner<CaseRecord> = create_flow_runner(ports, storage.clone(), max_steps).unwrap();
    (ConsultationManager::new(runner), storage)
}
