use async_trait::async_trait;
use rig::{agent::Agent, client::CompletionClient, completion::Prompt, providers::openrouter};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use super::{PortError, ReasoningPort, ReasoningTask};
use crate::prompts;

/// Reasoning output that did not match the expected schema
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error}")]
pub struct ParseFailure {
    pub error: String,
    pub raw_output: String,
}

/// Strip surrounding whitespace and a Markdown code fence (```` ```json ```` or
/// bare ```` ``` ````) from a model response.
pub fn normalize_response(raw: &str) -> &str {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let unfenced = unfenced.strip_suffix("```").unwrap_or(unfenced);
    unfenced.trim()
}

/// Normalize a model response and deserialize it into `T`
pub fn parse_response<T: DeserializeOwned>(raw: &str) -> Result<T, ParseFailure> {
    serde_json::from_str(normalize_response(raw)).map_err(|e| ParseFailure {
        error: e.to_string(),
        raw_output: raw.to_string(),
    })
}

/// Model choice per reasoning task
#[derive(Debug, Clone)]
pub struct ReasoningModels {
    /// Intake, lab summaries, question refinement and report synthesis
    pub intake: String,
    /// Department routing; run at temperature 0
    pub triage: String,
    pub specialist: String,
}

impl Default for ReasoningModels {
    fn default() -> Self {
        Self {
            intake: "openai/gpt-4.1-mini".to_string(),
            triage: "openai/gpt-4o-mini".to_string(),
            specialist: "openai/gpt-4.1".to_string(),
        }
    }
}

/// Reasoning port backed by OpenRouter chat completions through rig
pub struct OpenRouterReasoner {
    client: openrouter::Client,
    models: ReasoningModels,
}

impl OpenRouterReasoner {
    pub fn new(api_key: &str, models: ReasoningModels) -> Self {
        Self {
            client: openrouter::Client::new(api_key),
            models,
        }
    }

    fn agent(&self, task: ReasoningTask) -> Agent<openrouter::CompletionModel> {
        let (model, temperature) = match task {
            ReasoningTask::Triage => (&self.models.triage, 0.0),
            ReasoningTask::LabSummary => (&self.models.intake, 0.1),
            ReasoningTask::SpecialistAnalysis(_) => (&self.models.specialist, 0.2),
            _ => (&self.models.intake, 0.2),
        };
        self.client
            .agent(model)
            .preamble(&prompts::preamble(task))
            .temperature(temperature)
            .build()
    }
}

#[async_trait]
impl ReasoningPort for OpenRouterReasoner {
    async fn invoke(&self, task: ReasoningTask, arguments: Value) -> Result<String, PortError> {
        let prompt = prompts::request(task, &arguments);
        let agent = self.agent(task);

        info!(task = %task.name(), prompt_length = prompt.len(), "Invoking reasoning service");
        let response = agent.prompt(&prompt).await.map_err(|e| {
            error!(task = %task.name(), error = %e, "Reasoning call failed");
            PortError::Reasoning(e.to_string())
        })?;

        info!(task = %task.name(), response_length = response.len(), "Reasoning service responded");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Department {
        department: String,
    }

    #[test]
    fn test_fenced_and_bare_responses_parse_identically() {
        let bare = r#"{"department": "cardiology"}"#;
        let fenced = "```json\n{\"department\": \"cardiology\"}\n```";
        let plain_fence = "  ```\n{\"department\": \"cardiology\"}\n```  ";

        let expected: Department = parse_response(bare).unwrap();
        assert_eq!(parse_response::<Department>(fenced).unwrap(), expected);
        assert_eq!(parse_response::<Department>(plain_fence).unwrap(), expected);
    }

    #[test]
    fn test_parse_failure_keeps_raw_output() {
        let failure = parse_response::<Department>("I think cardiology").unwrap_err();
        assert_eq!(failure.raw_output, "I think cardiology");
        assert!(!failure.error.is_empty());
    }

    #[test]
    fn test_normalize_leaves_unfenced_text_alone() {
        assert_eq!(normalize_response("  {\"a\": 1}\n"), "{\"a\": 1}");
    }
}
