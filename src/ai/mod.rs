mod claude;
mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{AiBackend, Config};
use crate::error::{AppError, Result};
use crate::models::Sentiment;

pub use claude::ClaudeClient;
pub use openai::ChatCompletionsClient;

pub(crate) const SUMMARY_PROMPT: &str = "You are an expert in summarizing texts. Create a concise summary of the following text. Focus on the main points and key information.";
pub(crate) const SENTIMENT_PROMPT: &str = "Analyze the sentiment of the following text and return exactly one word: positive, neutral, or negative. Be precise and concise.";

const MAX_INPUT_CHARS: usize = 10_000;

#[async_trait]
pub trait Enricher: Send + Sync {
    /// Fails with `AppError::Enrichment` when the provider cannot produce one.
    async fn generate_summary(&self, text: &str) -> Result<String>;

    /// Never fails: unusable answers and provider errors resolve to `Neutral`.
    async fn analyze_sentiment(&self, text: &str) -> Sentiment;
}

#[derive(Debug, Clone)]
pub struct Enrichment {
    pub summary: String,
    pub sentiment: Sentiment,
}

/// Runs summary and sentiment concurrently and combines them.
pub async fn enrich(enricher: &dyn Enricher, text: &str) -> Result<Enrichment> {
    let (summary, sentiment) = futures::join!(
        enricher.generate_summary(text),
        enricher.analyze_sentiment(text)
    );

    Ok(Enrichment {
        summary: summary?,
        sentiment,
    })
}

pub fn build_enricher(config: &Config) -> Result<Arc<dyn Enricher>> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let missing = |var: &str| {
        AppError::Config(format!(
            "no API key configured for the {} backend (set {})",
            config.ai_backend, var
        ))
    };

    let enricher: Arc<dyn Enricher> = match config.ai_backend {
        AiBackend::OpenAi => {
            let key = config
                .openai_api_key
                .clone()
                .ok_or_else(|| missing("OPENAI_API_KEY"))?;
            Arc::new(ChatCompletionsClient::openai(key, timeout))
        }
        AiBackend::OpenRouter => {
            let key = config
                .openrouter_api_key
                .clone()
                .ok_or_else(|| missing("OPENROUTER_API_KEY"))?;
            Arc::new(ChatCompletionsClient::openrouter(
                key,
                config.app_url.clone(),
                timeout,
            ))
        }
        AiBackend::Claude => {
            let key = config
                .claude_api_key
                .clone()
                .ok_or_else(|| missing("ANTHROPIC_API_KEY"))?;
            Arc::new(ClaudeClient::new(key, timeout))
        }
    };

    Ok(enricher)
}

/// Maps a raw sentiment answer, falling back to `Neutral` with a warning.
pub(crate) fn sentiment_from_answer(model: &str, answer: &str) -> Sentiment {
    match Sentiment::parse_label(answer) {
        Some(sentiment) => sentiment,
        None => {
            tracing::warn!(model, answer, "Unusable sentiment answer, using neutral");
            Sentiment::Neutral
        }
    }
}

/// Truncates on a char boundary so multi-byte text never panics.
pub(crate) fn truncate_input(text: &str) -> &str {
    match text.char_indices().nth(MAX_INPUT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubEnricher;

    #[tokio::test]
    async fn summary_failure_fails_the_enrichment() {
        let enricher = StubEnricher::new().failing_summaries();
        let result = enrich(&enricher, "anything").await;
        assert!(matches!(result, Err(AppError::Enrichment(_))));
    }

    #[tokio::test]
    async fn unusable_sentiment_degrades_to_neutral() {
        let enricher = StubEnricher::new().with_sentiment_answer("somewhat upbeat");
        let enrichment = enrich(&enricher, "text").await.unwrap();
        assert_eq!(enrichment.summary, "summary of: text");
        assert_eq!(enrichment.sentiment, Sentiment::Neutral);
    }

    #[tokio::test]
    async fn summary_and_sentiment_run_concurrently() {
        // Both calls wait on a two-party barrier, so a sequential
        // implementation would never complete.
        let enricher = StubEnricher::new().with_rendezvous();
        let enrichment =
            tokio::time::timeout(Duration::from_secs(5), enrich(&enricher, "barrier")).await;
        assert!(enrichment.is_ok(), "enrichment calls were not concurrent");
    }

    #[test]
    fn provider_answers_map_to_labels() {
        assert_eq!(sentiment_from_answer("m", "Negative\n"), Sentiment::Negative);
        assert_eq!(sentiment_from_answer("m", "mixed"), Sentiment::Neutral);
        assert_eq!(sentiment_from_answer("m", "positive."), Sentiment::Neutral);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(MAX_INPUT_CHARS + 5);
        let truncated = truncate_input(&text);
        assert_eq!(truncated.chars().count(), MAX_INPUT_CHARS);
        assert_eq!(truncate_input("short"), "short");
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let config = Config {
            ai_backend: AiBackend::OpenRouter,
            openrouter_api_key: None,
            ..Config::default()
        };
        assert!(matches!(build_enricher(&config), Err(AppError::Config(_))));
    }
}
