//! Configuration for the translation pipeline and its job runner.
//!
//! Every knob lives in [`PipelineConfig`], built either through
//! [`PipelineConfig::builder()`] or layered from the environment with
//! [`PipelineConfig::from_env()`]. One config is read at worker startup and
//! shared (cloned) by every component the worker constructs.

use crate::error::ConfigError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default inline-result threshold: results of 1 MiB or more are served
/// through the download path instead of the status payload.
pub const DEFAULT_INLINE_RESULT_LIMIT: usize = 1024 * 1024;

/// Retry parameters for upstream translation calls.
///
/// Delays grow exponentially from `min_delay` and are capped at `max_delay`;
/// each wait is drawn uniformly between `min_delay` and the current cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Total attempts including the first one. Default: 3.
    pub max_attempts: u32,
    /// Shortest wait between attempts. Default: 1 s.
    pub min_delay: Duration,
    /// Longest wait between attempts. Default: 30 s.
    pub max_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Model files for OCR on pages without a text layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrModels {
    /// Text detection ONNX model.
    pub detection: PathBuf,
    /// Text recognition ONNX model.
    pub recognition: PathBuf,
    /// Character dictionary matching the recognition model.
    pub dictionary: PathBuf,
}

impl OcrModels {
    /// All three paths, or `None` when any is missing or blank.
    pub fn from_parts(
        detection: Option<String>,
        recognition: Option<String>,
        dictionary: Option<String>,
    ) -> Option<Self> {
        let parts = [detection, recognition, dictionary]
            .map(|p| p.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));
        match parts {
            [Some(detection), Some(recognition), Some(dictionary)] => Some(Self {
                detection: detection.into(),
                recognition: recognition.into(),
                dictionary: dictionary.into(),
            }),
            [None, None, None] => None,
            _ => {
                warn!(
                    "OCR needs OCR_DETECTION_MODEL, OCR_RECOGNITION_MODEL and OCR_CHAR_DICT; \
                     scanned pages will have no regions"
                );
                None
            }
        }
    }
}

/// Configuration for one pipeline worker.
///
/// # Example
/// ```rust
/// use edgequake_pdf_translate::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .dpi(150)
///     .concurrency(4)
///     .target_language("German")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Rasterisation DPI. Range: 72–400. Default: 200.
    pub dpi: u32,

    /// Cap on either rendered dimension, in pixels. Default: 4000.
    ///
    /// Keeps a poster-sized page from allocating hundreds of megabytes.
    pub max_rendered_pixels: u32,

    /// Page-level parallelism for text detection, and the number of jobs the
    /// runner executes at once. Default: host CPU count.
    pub concurrency: usize,

    /// Estimated-token budget per upstream request. Default: 3000.
    pub max_tokens_per_request: usize,

    /// Retry/backoff for transient upstream failures.
    pub retry: RetrySettings,

    /// LLM model identifier. `None` uses `gpt-4.1-nano`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.3.
    pub temperature: f32,

    /// Maximum completion tokens per request. Default: 1024.
    pub max_completion_tokens: usize,

    /// Language of the input document. Default: "English".
    pub source_language: String,

    /// Language to translate into. Default: "Spanish".
    pub target_language: String,

    /// Custom system prompt. `None` builds one from the language pair.
    pub system_prompt: Option<String>,

    /// OCR models for scanned pages. `None` uses the text layer only.
    pub ocr_models: Option<OcrModels>,

    /// Explicit font override. Must exist to be used.
    pub font_path: Option<PathBuf>,

    /// Font size translations start at, in pixels. Default: 14.
    pub base_font_size: f32,

    /// Floor for auto-shrunk text, in pixels. Default: 8.
    pub min_font_size: f32,

    /// Gaussian sigma for obscuring the original text. Default: 3.5.
    pub blur_sigma: f32,

    /// Results strictly smaller than this are returned inline by status
    /// queries; larger ones get a download reference. Default: 1 MiB.
    pub inline_result_limit: usize,

    /// Broker / result-backend target for an external job store. Opaque here.
    pub broker_url: Option<String>,

    /// Download timeout for URL inputs, in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            max_rendered_pixels: 4000,
            concurrency: num_cpus::get().max(1),
            max_tokens_per_request: 3000,
            retry: RetrySettings::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.3,
            max_completion_tokens: 1024,
            source_language: "English".to_string(),
            target_language: "Spanish".to_string(),
            system_prompt: None,
            ocr_models: None,
            font_path: None,
            base_font_size: 14.0,
            min_font_size: 8.0,
            blur_sigma: 3.5,
            inline_result_limit: DEFAULT_INLINE_RESULT_LIMIT,
            broker_url: None,
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("max_tokens_per_request", &self.max_tokens_per_request)
            .field("retry", &self.retry)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("source_language", &self.source_language)
            .field("target_language", &self.target_language)
            .field("ocr_models", &self.ocr_models)
            .field("font_path", &self.font_path)
            .field("base_font_size", &self.base_font_size)
            .field("min_font_size", &self.min_font_size)
            .field("inline_result_limit", &self.inline_result_limit)
            .field("broker_url", &self.broker_url)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder starting from the defaults.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults overlaid with `FONT_PATH`, `WORKER_CONCURRENCY`,
    /// `BROKER_URL` / `REDIS_URL` and the `OCR_*` model paths.
    ///
    /// Provider credentials are not read here; they are resolved lazily on
    /// the first translation attempt.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.font_path = std::env::var("FONT_PATH")
            .ok()
            .and_then(|raw| resolve_font_override(&raw));

        if let Ok(raw) = std::env::var("WORKER_CONCURRENCY") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.concurrency = n,
                _ => warn!(
                    "Ignoring WORKER_CONCURRENCY={:?}; using {} workers",
                    raw, config.concurrency
                ),
            }
        }

        config.broker_url = std::env::var("BROKER_URL")
            .or_else(|_| std::env::var("REDIS_URL"))
            .ok()
            .filter(|s| !s.is_empty());

        config.ocr_models = OcrModels::from_parts(
            std::env::var("OCR_DETECTION_MODEL").ok(),
            std::env::var("OCR_RECOGNITION_MODEL").ok(),
            std::env::var("OCR_CHAR_DICT").ok(),
        );

        debug!("Loaded config from environment: {:?}", config);
        config
    }
}

/// Resolve a `FONT_PATH` value: relative paths are taken from the current
/// directory and a path that does not exist is dropped.
pub fn resolve_font_override(raw: &str) -> Option<PathBuf> {
    if raw.trim().is_empty() {
        return None;
    }
    let path = Path::new(raw.trim());
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    if path.exists() {
        Some(path)
    } else {
        warn!("FONT_PATH '{}' does not exist; falling back", path.display());
        None
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_tokens_per_request(mut self, n: usize) -> Self {
        self.config.max_tokens_per_request = n;
        self
    }

    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_completion_tokens(mut self, n: usize) -> Self {
        self.config.max_completion_tokens = n;
        self
    }

    pub fn source_language(mut self, lang: impl Into<String>) -> Self {
        self.config.source_language = lang.into();
        self
    }

    pub fn target_language(mut self, lang: impl Into<String>) -> Self {
        self.config.target_language = lang.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn ocr_models(mut self, models: OcrModels) -> Self {
        self.config.ocr_models = Some(models);
        self
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_path = Some(path.into());
        self
    }

    pub fn base_font_size(mut self, px: f32) -> Self {
        self.config.base_font_size = px;
        self
    }

    pub fn min_font_size(mut self, px: f32) -> Self {
        self.config.min_font_size = px;
        self
    }

    pub fn blur_sigma(mut self, sigma: f32) -> Self {
        self.config.blur_sigma = sigma;
        self
    }

    pub fn inline_result_limit(mut self, bytes: usize) -> Self {
        self.config.inline_result_limit = bytes;
        self
    }

    pub fn broker_url(mut self, url: impl Into<String>) -> Self {
        self.config.broker_url = Some(url.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let c = &self.config;
        if c.retry.max_attempts == 0 {
            return Err(ConfigError("max_attempts must be ≥ 1".into()));
        }
        if c.retry.min_delay > c.retry.max_delay {
            return Err(ConfigError(format!(
                "retry min_delay ({:?}) exceeds max_delay ({:?})",
                c.retry.min_delay, c.retry.max_delay
            )));
        }
        if c.max_tokens_per_request == 0 {
            return Err(ConfigError("max_tokens_per_request must be ≥ 1".into()));
        }
        if !(c.min_font_size > 0.0 && c.min_font_size <= c.base_font_size) {
            return Err(ConfigError(format!(
                "font sizes must satisfy 0 < min ({}) ≤ base ({})",
                c.min_font_size, c.base_font_size
            )));
        }
        if c.blur_sigma <= 0.0 {
            return Err(ConfigError("blur_sigma must be > 0".into()));
        }
        Ok(self.config)
    }
}
