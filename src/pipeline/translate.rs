//! Batch translation: pack region texts into token-bounded requests, send
//! each with retry/backoff, and re-align the replies with the inputs.
//!
//! ## Layers
//!
//! ```text
//! BatchTranslator::translate(texts)
//!   ├─ plan_batches      token budget, order-preserving
//!   └─ per batch (sequentially)
//!        ├─ RetryPolicy::run
//!        │    └─ TranslationBackend::complete(newline-joined batch)
//!        └─ clean_reply + align_lines   exactly one line per input
//! ```
//!
//! Batches of one job are sent one after another, never concurrently, so a
//! job's request rate stays predictable under provider rate limits.
//! [`BatchTranslator`] itself holds only read-only state and can be shared
//! across jobs.

use crate::config::PipelineConfig;
use crate::error::{TranslationError, UpstreamError, UpstreamErrorKind};
use crate::pipeline::batch::plan_batches;
use crate::pipeline::reply::{align_lines, clean_reply, single_line};
use crate::pipeline::retry::{RetryFailure, RetryPolicy};
use crate::prompts::translation_prompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// One upstream translation request: newline-joined source text in,
/// newline-joined translations out.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn complete(&self, request: &str) -> Result<String, UpstreamError>;
}

/// [`TranslationBackend`] over an `edgequake-llm` chat provider.
///
/// The provider is built on the first request and reused afterwards. A
/// missing credential therefore surfaces at the first translation attempt as
/// a [`UpstreamErrorKind::Config`] error, which is never retried.
pub struct LlmBackend {
    config: PipelineConfig,
    system_prompt: String,
    provider: OnceCell<Arc<dyn LLMProvider>>,
}

impl LlmBackend {
    pub fn new(config: &PipelineConfig) -> Self {
        let system_prompt = config.system_prompt.clone().unwrap_or_else(|| {
            translation_prompt(&config.source_language, &config.target_language)
        });
        Self {
            config: config.clone(),
            system_prompt,
            provider: OnceCell::new(),
        }
    }

    async fn provider(&self) -> Result<&Arc<dyn LLMProvider>, UpstreamError> {
        self.provider
            .get_or_try_init(|| async { resolve_provider(&self.config) })
            .await
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_completion_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TranslationBackend for LlmBackend {
    async fn complete(&self, request: &str) -> Result<String, UpstreamError> {
        let provider = self.provider().await?;
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(request),
        ];

        let start = Instant::now();
        let response = provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(UpstreamError::from)?;

        debug!(
            "Translation call: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Resolve the chat provider, from most-specific to least-specific:
///
/// 1. a pre-built provider in the config,
/// 2. a named provider (`config.provider_name`) with the configured model,
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` from the environment,
/// 4. OpenAI, when `OPENAI_API_KEY` is set.
///
/// Anything else is a configuration error.
fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, UpstreamError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => create_provider("openai", model),
        _ => Err(UpstreamError::new(
            UpstreamErrorKind::Config,
            "OPENAI_API_KEY environment variable not set.\n\
Set OPENAI_API_KEY, or EDGEQUAKE_LLM_PROVIDER + EDGEQUAKE_MODEL.",
        )),
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, UpstreamError> {
    info!("Using translation provider '{}' with model '{}'", name, model);
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        UpstreamError::new(
            UpstreamErrorKind::Config,
            format!("provider '{name}' could not be created: {e}"),
        )
    })
}

/// Translates ordered texts, preserving count and order.
#[derive(Clone)]
pub struct BatchTranslator {
    backend: Arc<dyn TranslationBackend>,
    policy: RetryPolicy,
    token_budget: usize,
}

impl BatchTranslator {
    pub fn new(backend: Arc<dyn TranslationBackend>, policy: RetryPolicy, token_budget: usize) -> Self {
        Self {
            backend,
            policy,
            token_budget: token_budget.max(1),
        }
    }

    /// A translator over [`LlmBackend`] configured from `config`.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            Arc::new(LlmBackend::new(config)),
            config.retry.into(),
            config.max_tokens_per_request,
        )
    }

    /// Translate `texts`; the result has the same length and order.
    ///
    /// An empty input returns immediately without an upstream call.
    pub async fn translate(&self, texts: &[String]) -> Result<Vec<String>, TranslationError> {
        let mut results = Vec::with_capacity(texts.len());
        let batches = plan_batches(texts, self.token_budget);

        for (n, range) in batches.iter().enumerate() {
            let sources = &texts[range.clone()];
            let request = sources
                .iter()
                .map(|t| single_line(t))
                .collect::<Vec<_>>()
                .join("\n");
            let label = format!("batch {}/{}", n + 1, batches.len());

            let reply = self
                .policy
                .run(&label, |_| self.backend.complete(&request))
                .await
                .map_err(into_translation_error)?;

            results.extend(align_lines(&clean_reply(&reply), sources));
        }

        debug!(
            "Translated {} texts in {} batches",
            results.len(),
            batches.len()
        );
        Ok(results)
    }
}

fn into_translation_error(failure: RetryFailure<UpstreamError>) -> TranslationError {
    match failure {
        RetryFailure::Exhausted { error, attempts } => TranslationError::RetriesExhausted {
            attempts,
            source: error,
        },
        RetryFailure::Fatal { error, .. } if error.kind == UpstreamErrorKind::Config => {
            TranslationError::NotConfigured {
                provider: "llm".to_string(),
                hint: error.message,
            }
        }
        RetryFailure::Fatal { error, .. } => TranslationError::Upstream { source: error },
    }
}
