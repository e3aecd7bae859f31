use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{sentiment_from_answer, truncate_input, Enricher, SENTIMENT_PROMPT, SUMMARY_PROMPT};
use crate::error::{AppError, Result};
use crate::models::Sentiment;

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const CLAUDE_MODEL: &str = "claude-3-5-haiku-20241022";

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    system: &'a str,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

impl MessageResponse {
    fn into_text(self) -> String {
        self.content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Anthropic Messages API backend.
pub struct ClaudeClient {
    client: Client,
    api_key: String,
}

impl ClaudeClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { client, api_key }
    }

    async fn complete(&self, system: &str, text: &str, max_tokens: u32) -> Result<String> {
        let request = MessageRequest {
            model: CLAUDE_MODEL,
            max_tokens,
            messages: vec![Message {
                role: "user",
                content: truncate_input(text),
            }],
            system,
        };

        let response = self
            .client
            .post(CLAUDE_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Enrichment(format!("Claude request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Enrichment(format!(
                "Claude API error {}: {}",
                status, error_text
            )));
        }

        let message_response: MessageResponse = response
            .json()
            .await
            .map_err(|e| AppError::Enrichment(format!("Malformed Claude response: {}", e)))?;

        Ok(message_response.into_text())
    }

    pub fn model_version(&self) -> &'static str {
        CLAUDE_MODEL
    }
}

#[async_trait]
impl Enricher for ClaudeClient {
    async fn generate_summary(&self, text: &str) -> Result<String> {
        let summary = self.complete(SUMMARY_PROMPT, text, 1024).await?;
        if summary.trim().is_empty() {
            return Err(AppError::Enrichment("Claude returned an empty summary".into()));
        }
        Ok(summary)
    }

    async fn analyze_sentiment(&self, text: &str) -> Sentiment {
        match self.complete(SENTIMENT_PROMPT, text, 8).await {
            Ok(answer) => sentiment_from_answer(self.model_version(), &answer),
            Err(e) => {
                tracing::warn!(model = self.model_version(), "Sentiment analysis failed: {}", e);
                Sentiment::Neutral
            }
        }
    }
}
