//! OCR through an OpenRouter vision model: page images go out as base64 data
//! URLs in a single chat completion request.

use anyhow::anyhow;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use medicos_core::{OcrEngine, PageImage};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::info;

const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const OCR_MAX_TOKENS: u32 = 4000;

pub struct OpenRouterVisionOcr {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenRouterVisionOcr {
    pub fn new(client: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for OpenRouterVisionOcr {
    async fn recognize(&self, pages: &[PageImage]) -> anyhow::Result<String> {
        info!(pages = pages.len(), model = %self.model, "Running vision OCR");

        let payload = build_ocr_payload(&self.model, pages);
        let response = self
            .client
            .post(OPENROUTER_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("OCR request failed: {}", response.status()));
        }

        let body: Value = response.json().await?;
        parse_completion_text(&body)
    }
}

fn ocr_instruction(page_count: usize) -> String {
    format!(
        "You are an OCR system for medical documents. I'm providing {page_count} page image(s). \
         Extract ALL visible text exactly as written, preserving structure and medical terminology. \
         When there is more than one page, start each page with '=== Page N ==='. \
         Return ONLY the extracted text without any commentary."
    )
}

fn build_ocr_payload(model: &str, pages: &[PageImage]) -> Value {
    let mut content = vec![json!({
        "type": "text",
        "text": ocr_instruction(pages.len()),
    })];

    content.extend(pages.iter().map(|page| {
        json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:{};base64,{}", page.mime_type(), STANDARD.encode(&page.png))
            }
        })
    }));

    json!({
        "model": model,
        "messages": [
            {
                "role": "user",
                "content": content
            }
        ],
        "max_tokens": OCR_MAX_TOKENS
    })
}

fn parse_completion_text(body: &Value) -> anyhow::Result<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid response format from OCR model"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_instruction_and_every_page() {
        let pages = vec![
            PageImage { png: vec![1, 2, 3] },
            PageImage { png: vec![4, 5] },
        ];
        let payload = build_ocr_payload("openai/gpt-4.1-mini", &pages);

        assert_eq!(payload["model"], "openai/gpt-4.1-mini");
        let content = payload["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[0]["type"], "text");
        assert!(content[0]["text"].as_str().unwrap().contains("2 page image(s)"));
        assert_eq!(
            content[1]["image_url"]["url"],
            format!("data:image/png;base64,{}", STANDARD.encode([1u8, 2, 3]))
        );
    }

    #[test]
    fn parses_first_choice() {
        let body = json!({"choices": [{"message": {"content": "WBC 6.1"}}]});
        assert_eq!(parse_completion_text(&body).unwrap(), "WBC 6.1");

        let malformed = json!({"error": {"message": "bad key"}});
        assert!(parse_completion_text(&malformed).is_err());
    }
}
