//! Error types for the edgequake-pdf-translate library.
//!
//! Each pipeline stage owns one error type:
//!
//! * [`ExtractionError`] — the input could not be turned into pages and
//!   text regions (not a PDF, corrupt, zero pages, detector failure).
//! * [`TranslationError`] — the upstream model could not translate a batch,
//!   either after exhausting retries or because it is misconfigured.
//! * [`RenderError`] — the overlay could not be drawn or the output document
//!   could not be assembled.
//!
//! [`PipelineError`] wraps the three transparently: its `Display` is the
//! stage error's own message, and [`PipelineError::stage`] tells the job
//! runner which stage failed. Nothing between a stage and the caller
//! rewrites the error.

use edgequake_llm::LlmError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn the input bytes into pages with text regions.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The input bytes do not start with the `%PDF` magic.
    #[error("Input is not a PDF document (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    /// PDFium could not parse the document.
    #[error("PDF is corrupt or unreadable: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { detail: String },

    /// The document parsed but contains no pages.
    #[error("Document has no pages to translate")]
    EmptyDocument,

    /// PDFium failed on one page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// The text detector failed on one page.
    #[error("Text detection failed for page {page}: {detail}")]
    DetectionFailed { page: usize, detail: String },

    /// The input file could not be read.
    #[error("Failed to read input '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input URL could not be downloaded.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Could not bind to a PDFium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// The OCR models could not be loaded.
    #[error(
        "Failed to load OCR models: {0}\n\
Check OCR_DETECTION_MODEL, OCR_RECOGNITION_MODEL and OCR_CHAR_DICT."
    )]
    OcrUnavailable(String),

    /// Worker thread panicked or was cancelled.
    #[error("Extraction task failed: {0}")]
    Internal(String),
}

/// Classification of a failed upstream (LLM) call.
///
/// Only [`UpstreamErrorKind::RateLimited`] and
/// [`UpstreamErrorKind::Transient`] are worth retrying; everything else
/// fails the batch on first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// HTTP 429 or a provider-specific quota message.
    RateLimited,
    /// 5xx, timeouts, dropped connections.
    Transient,
    /// 401/403 or an invalid key.
    Auth,
    /// No provider or credential could be configured.
    Config,
    /// The provider rejected the request (4xx other than 429).
    Rejected,
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpstreamErrorKind::RateLimited => "rate limited",
            UpstreamErrorKind::Transient => "transient",
            UpstreamErrorKind::Auth => "authentication",
            UpstreamErrorKind::Config => "configuration",
            UpstreamErrorKind::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A single failed upstream call.
#[derive(Debug, Clone, Error)]
#[error("{kind} error from upstream: {message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::RateLimited, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Transient, message)
    }

    /// Should the retry policy try this call again?
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            UpstreamErrorKind::RateLimited | UpstreamErrorKind::Transient
        )
    }

    /// Retry class of a typed provider error.
    ///
    /// Only `ApiError` carries a free-form HTTP status; it is read from the
    /// message as a standalone three-digit code. An `ApiError` without one
    /// counts as transient, like the provider crate's own retry strategy.
    pub fn kind_of(error: &LlmError) -> UpstreamErrorKind {
        match error {
            LlmError::RateLimited(_) => UpstreamErrorKind::RateLimited,
            LlmError::NetworkError(_)
            | LlmError::Timeout
            | LlmError::ProviderError(_)
            | LlmError::SerializationError(_)
            | LlmError::Unknown(_) => UpstreamErrorKind::Transient,
            LlmError::AuthError(_) => UpstreamErrorKind::Auth,
            LlmError::ConfigError(_) => UpstreamErrorKind::Config,
            LlmError::InvalidRequest(_)
            | LlmError::ModelNotFound(_)
            | LlmError::TokenLimitExceeded { .. }
            | LlmError::NotSupported(_) => UpstreamErrorKind::Rejected,
            LlmError::ApiError(message) => match http_status(message) {
                Some(429) => UpstreamErrorKind::RateLimited,
                Some(401) | Some(403) => UpstreamErrorKind::Auth,
                Some(408) => UpstreamErrorKind::Transient,
                Some(400..=499) => UpstreamErrorKind::Rejected,
                _ => UpstreamErrorKind::Transient,
            },
        }
    }
}

impl From<LlmError> for UpstreamError {
    fn from(error: LlmError) -> Self {
        Self::new(Self::kind_of(&error), error.to_string())
    }
}

static HTTP_STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([1-5][0-9]{2})\b").expect("static regex is valid")
});

/// First standalone HTTP status code in `message`.
fn http_status(message: &str) -> Option<u16> {
    HTTP_STATUS
        .captures(message)
        .and_then(|c| c[1].parse().ok())
}

/// Failure to translate the region texts.
#[derive(Debug, Error)]
pub enum TranslationError {
    /// No provider could be built (missing API key etc.).
    #[error("Translation provider '{provider}' is not configured.\n{hint}")]
    NotConfigured { provider: String, hint: String },

    /// The upstream call failed with a non-retryable error.
    #[error("Translation request failed: {source}")]
    Upstream {
        #[source]
        source: UpstreamError,
    },

    /// Every attempt failed with a transient error.
    #[error("Translation failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: UpstreamError,
    },
}

/// Failure to draw the overlay or assemble the output document.
#[derive(Debug, Error)]
pub enum RenderError {
    /// `render_document` was called with no pages.
    #[error("No pages to render")]
    NoPages,

    /// Regions and translations must line up one to one.
    #[error("Page {page}: {regions} regions but {translations} translations")]
    TranslationCountMismatch {
        page: usize,
        regions: usize,
        translations: usize,
    },

    /// Building the output PDF failed.
    #[error("Failed to assemble output document: {0}")]
    AssemblyFailed(String),

    /// Worker thread panicked or was cancelled.
    #[error("Render task failed: {0}")]
    Internal(String),
}

/// Stage labels used for failure attribution and progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Ocr,
    Translation,
    Rendering,
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Start => "start",
            Stage::Ocr => "ocr",
            Stage::Translation => "translation",
            Stage::Rendering => "rendering",
            Stage::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Any stage failure, passed through unchanged.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl PipelineError {
    /// The stage that raised this error.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Extraction(_) => Stage::Ocr,
            PipelineError::Translation(_) => Stage::Translation,
            PipelineError::Render(_) => Stage::Rendering,
        }
    }
}

/// Invalid configuration, reported by the config builder.
#[derive(Debug, Error)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Errors from the job runner's query surface.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Unknown job '{0}'")]
    NotFound(String),

    /// The job exists but has not succeeded (yet, or ever).
    #[error("Job '{id}' has no result (state: {state})")]
    NotReady { id: String, state: String },

    /// The persistence substrate failed.
    #[error("Job store error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(error: LlmError) -> UpstreamErrorKind {
        UpstreamError::from(error).kind
    }

    #[test]
    fn rate_limit_is_retried() {
        let e = UpstreamError::from(LlmError::RateLimited("slow down".into()));
        assert_eq!(e.kind, UpstreamErrorKind::RateLimited);
        assert!(e.is_transient());
        assert!(e.message.contains("slow down"));
    }

    #[test]
    fn network_and_provider_errors_are_transient() {
        assert_eq!(
            kind(LlmError::NetworkError("timed out after 4290ms".into())),
            UpstreamErrorKind::Transient
        );
        assert_eq!(kind(LlmError::Timeout), UpstreamErrorKind::Transient);
        assert_eq!(
            kind(LlmError::ProviderError("overloaded".into())),
            UpstreamErrorKind::Transient
        );
        assert_eq!(kind(LlmError::Unknown("?".into())), UpstreamErrorKind::Transient);
    }

    #[test]
    fn auth_error_is_fatal() {
        let e = UpstreamError::from(LlmError::AuthError("Incorrect API key".into()));
        assert_eq!(e.kind, UpstreamErrorKind::Auth);
        assert!(!e.is_transient());
    }

    #[test]
    fn config_error_is_fatal() {
        let e = UpstreamError::from(LlmError::ConfigError("OPENAI_API_KEY is empty".into()));
        assert_eq!(e.kind, UpstreamErrorKind::Config);
        assert!(!e.is_transient());
    }

    #[test]
    fn rejected_requests_are_fatal() {
        for error in [
            LlmError::InvalidRequest("bad field".into()),
            LlmError::ModelNotFound("gpt-0".into()),
            LlmError::TokenLimitExceeded { max: 10, got: 20 },
            LlmError::NotSupported("vision".into()),
        ] {
            let e = UpstreamError::from(error);
            assert_eq!(e.kind, UpstreamErrorKind::Rejected, "{}", e.message);
            assert!(!e.is_transient());
        }
    }

    #[test]
    fn api_error_status_is_read_as_a_whole_number() {
        assert_eq!(
            kind(LlmError::ApiError(
                "HTTP 503 Service Unavailable (request id req_4013ab)".into()
            )),
            UpstreamErrorKind::Transient
        );
        assert_eq!(
            kind(LlmError::ApiError("status 429: quota".into())),
            UpstreamErrorKind::RateLimited
        );
        assert_eq!(
            kind(LlmError::ApiError("401 Unauthorized".into())),
            UpstreamErrorKind::Auth
        );
        assert_eq!(
            kind(LlmError::ApiError("HTTP 404 Not Found".into())),
            UpstreamErrorKind::Rejected
        );
        assert_eq!(
            kind(LlmError::ApiError("connection reset by peer".into())),
            UpstreamErrorKind::Transient
        );
    }

    #[test]
    fn pipeline_error_is_transparent() {
        let inner = ExtractionError::EmptyDocument;
        let msg = inner.to_string();
        let e = PipelineError::from(inner);
        assert_eq!(e.to_string(), msg);
        assert_eq!(e.stage(), Stage::Ocr);
    }

    #[test]
    fn retries_exhausted_display() {
        let e = TranslationError::RetriesExhausted {
            attempts: 3,
            source: UpstreamError::rate_limited("slow down"),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempts"), "got: {msg}");
        assert!(msg.contains("slow down"), "got: {msg}");
    }

    #[test]
    fn mismatch_display() {
        let e = RenderError::TranslationCountMismatch {
            page: 2,
            regions: 4,
            translations: 3,
        };
        assert!(e.to_string().contains("Page 2"));
    }
}
