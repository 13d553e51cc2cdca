//! Feature extraction: page text → the four document fields via a language model.
//!
//! The pipeline only depends on the [`FeatureExtractor`] trait. The shipped
//! implementation, [`LlmFeatureExtractor`], sends the page text with
//! [`FEATURE_EXTRACTION_PROMPT`] and parses the line-based answer with
//! [`parse_feature_response`].
//!
//! ## Throttling
//!
//! Consecutive calls are spaced by at least `llm_min_interval_ms` so batch
//! runs stay under free-tier request limits. The provider itself is resolved
//! on first use: a run that finds every feature record fresh never needs an
//! API key.

use crate::config::ScanConfig;
use crate::error::ExtractionError;
use crate::pipeline::features::{FeatureFields, FieldName, FieldValue};
use crate::prompts::{feature_extraction_input, FEATURE_EXTRACTION_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Default model when the provider is Gemini (or auto-detected from a Google key).
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-lite";

/// Default model for every other provider.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Turns page text into field values.
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    /// Extract the recognised fields from `text`. Fields the extractor could
    /// not determine are simply absent.
    async fn extract(&self, text: &str) -> Result<FeatureFields, ExtractionError>;
}

/// [`FeatureExtractor`] backed by an `edgequake-llm` provider.
pub struct LlmFeatureExtractor {
    config: ScanConfig,
    provider: OnceCell<Arc<dyn LLMProvider>>,
    last_call: Mutex<Option<Instant>>,
}

impl LlmFeatureExtractor {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            config: config.clone(),
            provider: OnceCell::new(),
            last_call: Mutex::new(None),
        }
    }

    async fn provider(&self) -> Result<Arc<dyn LLMProvider>, ExtractionError> {
        self.provider
            .get_or_try_init(|| async { resolve_provider(&self.config) })
            .await
            .map(Arc::clone)
    }

    /// Sleep until the minimum interval since the previous call has passed,
    /// then stamp the new call time.
    async fn throttle(&self) {
        let min_interval = Duration::from_millis(self.config.llm_min_interval_ms);
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < min_interval {
                let wait = min_interval - elapsed;
                info!("LLM call throttle: sleeping {}ms", wait.as_millis());
                sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl FeatureExtractor for LlmFeatureExtractor {
    async fn extract(&self, text: &str) -> Result<FeatureFields, ExtractionError> {
        if text.trim().is_empty() {
            debug!("Empty page text, skipping LLM call");
            return Ok(FeatureFields::new());
        }

        let provider = self.provider().await?;
        let messages = vec![
            ChatMessage::system(FEATURE_EXTRACTION_PROMPT),
            ChatMessage::user(&feature_extraction_input(text)),
        ];
        let options = build_options(&self.config);

        self.throttle().await;
        let response = provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ExtractionError::Provider(e.to_string()))?;

        debug!(
            "Feature extraction: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        parse_feature_response(&response.content)
    }
}

/// Build `CompletionOptions` from the run config.
fn build_options(config: &ScanConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

static RE_FEATURE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(Document Date|Document Type|Sender|Invoice Number):\s*([^(]*?)\s*\(([0-9]*\.?[0-9]+)\)")
        .unwrap()
});

/// Parse a `key: value (quality)` answer.
///
/// Lines that do not match are ignored. Spaces and parentheses inside values
/// become `-`, qualities are clamped to `[0, 1]`, and a key repeated later in
/// the answer wins. An answer without a single recognisable field is
/// [`ExtractionError::MalformedResponse`]; a partial answer is returned as-is
/// and the missing fields score 0 downstream.
pub fn parse_feature_response(response: &str) -> Result<FeatureFields, ExtractionError> {
    let mut fields = FeatureFields::new();

    for line in response.lines() {
        let Some(caps) = RE_FEATURE_LINE.captures(line) else {
            if !line.trim().is_empty() {
                debug!("Skipping response line: {line}");
            }
            continue;
        };
        let Ok(name) = caps[1].parse::<FieldName>() else {
            continue;
        };
        let value = caps[2].trim().replace([' ', '(', ')'], "-");
        let quality = caps[3].parse::<f64>().unwrap_or(0.0);
        fields.insert(name, FieldValue::new(value, quality));
    }

    if fields.is_empty() {
        let preview: String = response.chars().take(200).collect();
        return Err(ExtractionError::MalformedResponse(preview));
    }
    if fields.len() != FieldName::ALL.len() {
        warn!(
            "Model answered {} of {} fields",
            fields.len(),
            FieldName::ALL.len()
        );
    }
    Ok(fields)
}

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ExtractionError> {
    ProviderFactory::create_llm_provider(provider_name, model)
        .map_err(|e| ExtractionError::Provider(format!("{provider_name}: {e}")))
}

fn default_model_for(provider_name: &str) -> &'static str {
    if provider_name == "gemini" {
        DEFAULT_GEMINI_MODEL
    } else {
        DEFAULT_MODEL
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or the
///    provider's default model.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **Google key** (`GEMINI_API_KEY` / `GOOGLE_API_KEY`) → Gemini.
/// 5. **OpenAI key** → OpenAI.
/// 6. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(config: &ScanConfig) -> Result<Arc<dyn LLMProvider>, ExtractionError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(default_model_for(name));
        return create_provider(name, model);
    }

    if let (Some(prov), Some(model)) = (
        env_non_empty("EDGEQUAKE_LLM_PROVIDER"),
        env_non_empty("EDGEQUAKE_MODEL"),
    ) {
        return create_provider(&prov, &model);
    }

    if env_non_empty("GEMINI_API_KEY").is_some() || env_non_empty("GOOGLE_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        return create_provider("gemini", model);
    }

    if env_non_empty("OPENAI_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider("openai", model);
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
        ExtractionError::Provider(format!(
            "No LLM provider could be auto-detected from environment. \
             Set GEMINI_API_KEY, OPENAI_API_KEY or configure a provider. Error: {e}"
        ))
    })?;
    Ok(llm_provider)
}
