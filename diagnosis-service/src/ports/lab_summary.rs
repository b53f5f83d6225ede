use anyhow::anyhow;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat};
use pdf2image::{PDF, Pages};
use reqwest::Client;
use serde_json::{Value, json};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::{DocumentSummarizer, ReasoningPort, ReasoningTask, parse_response};
use crate::models::LabResult;

const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const FILE_NOT_FOUND: &str = "Lab report file not found.";

/// Summarizes lab documents: PDF pages are rendered to images and read back
/// with a vision model, plain text files are read as-is, and the text is then
/// summarized through the reasoning port.
pub struct OcrLabSummarizer {
    http: Client,
    api_key: String,
    ocr_model: String,
    reasoning: Arc<dyn ReasoningPort>,
}

impl OcrLabSummarizer {
    pub fn new(api_key: impl Into<String>, ocr_model: impl Into<String>, reasoning: Arc<dyn ReasoningPort>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            ocr_model: ocr_model.into(),
            reasoning,
        }
    }

    async fn extract_text(&self, reference: &str) -> anyhow::Result<String> {
        let is_pdf = Path::new(reference)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return Ok(tokio::fs::read_to_string(reference).await?);
        }

        let images = convert_pdf_to_images(reference).await?;
        if images.is_empty() {
            return Err(anyhow!("No pages rendered from {}", reference));
        }
        self.extract_text_with_vision(&images).await
    }

    /// All pages go to the vision model in one request
    async fn extract_text_with_vision(&self, images: &[DynamicImage]) -> anyhow::Result<String> {
        let mut content = vec![json!({
            "type": "text",
            "text": format!(
                "You are a medical document OCR system. These are {} pages of a lab report. \
                Extract ALL text exactly, keeping table rows, values, units and reference ranges together. \
                Start each page with '=== Page N ==='. Return only the extracted text.",
                images.len()
            )
        })];
        for image in images {
            content.push(json!({
                "type": "image_url",
                "image_url": {"url": format!("data:image/png;base64,{}", image_to_base64(image)?)}
            }));
        }

        let payload = json!({
            "model": self.ocr_model,
            "messages": [{"role": "user", "content": content}],
            "max_tokens": 4000
        });

        let response = self
            .http
            .post(OPENROUTER_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("OCR request failed: {}", response.status()));
        }

        let body: Value = response.json().await?;
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid response format from OCR model"))
    }

    async fn summarize_text(&self, text: &str) -> anyhow::Result<Value> {
        let raw = self
            .reasoning
            .invoke(ReasoningTask::LabSummary, json!({ "report_text": text }))
            .await?;

        // keep prose summaries rather than discarding them
        Ok(parse_response::<Value>(&raw).unwrap_or_else(|_| Value::String(raw.trim().to_string())))
    }
}

#[async_trait]
impl DocumentSummarizer for OcrLabSummarizer {
    async fn summarize(&self, label: &str, reference: &str) -> LabResult {
        match tokio::fs::try_exists(reference).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(label, reference, "Lab report not found");
                return LabResult::error(FILE_NOT_FOUND);
            }
            Err(e) => return LabResult::error(e.to_string()),
        }

        let text = match self.extract_text(reference).await {
            Ok(text) if text.trim().is_empty() => {
                return LabResult::error("No text could be extracted from the lab report.");
            }
            Ok(text) => text,
            Err(e) => {
                warn!(label, error = %e, "Lab report extraction failed");
                return LabResult::error(e.to_string());
            }
        };
        info!(label, characters = text.len(), "Extracted lab report text");

        match self.summarize_text(&text).await {
            Ok(summary) => LabResult::Summary { summary },
            Err(e) => {
                warn!(label, error = %e, "Lab report summary failed");
                LabResult::error(e.to_string())
            }
        }
    }
}

async fn convert_pdf_to_images(pdf_path: &str) -> anyhow::Result<Vec<DynamicImage>> {
    let pdf_path = pdf_path.to_string();
    tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<DynamicImage>> {
        let pdf = PDF::from_file(&pdf_path).map_err(|e| anyhow!("Failed to load PDF: {}", e))?;
        let pages = pdf
            .render(Pages::All, None)
            .map_err(|e| anyhow!("Failed to render PDF pages: {}", e))?;
        info!(pages = pages.len(), "Rendered lab report pages");
        Ok(pages)
    })
    .await?
}

fn image_to_base64(image: &DynamicImage) -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| anyhow!("Failed to encode image: {}", e))?;
    Ok(STANDARD.encode(&buffer))
}
