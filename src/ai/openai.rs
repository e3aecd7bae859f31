use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{sentiment_from_answer, truncate_input, Enricher, SENTIMENT_PROMPT, SUMMARY_PROMPT};
use crate::error::{AppError, Result};
use crate::models::Sentiment;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "gpt-3.5-turbo";

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";
const OPENROUTER_MODEL: &str = "meta-llama/llama-3-8b-instruct";
const OPENROUTER_TITLE: &str = "newsbrief";
const DEFAULT_APP_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, Default, Serialize)]
struct Sampling {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(flatten)]
    sampling: &'a Sampling,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.message.content)
    }
}

/// Backend for any OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsClient {
    client: Client,
    base_url: String,
    model: &'static str,
    sampling: Sampling,
    provider: &'static str,
}

impl ChatCompletionsClient {
    pub fn openai(api_key: String, timeout: Duration) -> Self {
        Self::build(
            "OpenAI",
            OPENAI_API_URL,
            OPENAI_MODEL,
            &api_key,
            Vec::new(),
            Sampling::default(),
            timeout,
        )
    }

    pub fn openrouter(api_key: String, app_url: Option<String>, timeout: Duration) -> Self {
        let referer = app_url.unwrap_or_else(|| DEFAULT_APP_URL.to_string());
        let sampling = Sampling {
            temperature: Some(0.7),
            max_tokens: Some(500),
            top_p: Some(0.9),
            frequency_penalty: Some(0.1),
            presence_penalty: Some(0.1),
        };
        Self::build(
            "OpenRouter",
            OPENROUTER_API_URL,
            OPENROUTER_MODEL,
            &api_key,
            vec![("http-referer", referer), ("x-title", OPENROUTER_TITLE.to_string())],
            sampling,
            timeout,
        )
    }

    fn build(
        provider: &'static str,
        base_url: &str,
        model: &'static str,
        api_key: &str,
        extra_headers: Vec<(&'static str, String)>,
        sampling: Sampling,
        timeout: Duration,
    ) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(auth) = HeaderValue::from_str(&format!("Bearer {}", api_key)) {
            headers.insert(reqwest::header::AUTHORIZATION, auth);
        }
        for (name, value) in extra_headers {
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            sampling,
            provider,
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn complete(&self, system: &str, text: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: truncate_input(text),
                },
            ],
            sampling: &self.sampling,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Enrichment(format!("{} request failed: {}", self.provider, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Enrichment(format!(
                "{} API error {}: {}",
                self.provider, status, error_text
            )));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            AppError::Enrichment(format!("Malformed {} response: {}", self.provider, e))
        })?;

        Ok(chat.into_text().unwrap_or_default())
    }
}

#[async_trait]
impl Enricher for ChatCompletionsClient {
    async fn generate_summary(&self, text: &str) -> Result<String> {
        let summary = self.complete(SUMMARY_PROMPT, text).await?;
        if summary.trim().is_empty() {
            return Err(AppError::Enrichment(format!(
                "{} returned an empty summary",
                self.provider
            )));
        }
        Ok(summary)
    }

    async fn analyze_sentiment(&self, text: &str) -> Sentiment {
        match self.complete(SENTIMENT_PROMPT, text).await {
            Ok(answer) => sentiment_from_answer(self.model, &answer),
            Err(e) => {
                tracing::warn!(model = self.model, "Sentiment analysis failed: {}", e);
                Sentiment::Neutral
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_request_omits_unset_sampling() {
        let sampling = Sampling::default();
        let request = ChatRequest {
            model: OPENAI_MODEL,
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            sampling: &sampling,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], OPENAI_MODEL);
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn openrouter_request_flattens_sampling() {
        let client = ChatCompletionsClient::openrouter("key".into(), None, Duration::from_secs(1));
        let request = ChatRequest {
            model: client.model,
            messages: Vec::new(),
            sampling: &client.sampling,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], OPENROUTER_MODEL);
        assert_eq!(json["max_tokens"], 500);
        assert!(json["temperature"].as_f64().is_some());
    }

    #[test]
    fn first_choice_content_is_the_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Negative"}},{"message":{"content":"ignored"}}]}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.into_text().as_deref(), Some("Negative"));

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(empty.into_text(), None);
    }

    #[tokio::test]
    async fn transport_failure_fails_summary_but_not_sentiment() {
        // Port 1 on loopback refuses connections immediately.
        let client = ChatCompletionsClient::openai("key".into(), Duration::from_secs(5))
            .with_base_url("http://127.0.0.1:1/v1");

        let summary = client.generate_summary("text").await;
        assert!(matches!(summary, Err(AppError::Enrichment(_))));
        assert_eq!(client.analyze_sentiment("text").await, Sentiment::Neutral);
    }
}
