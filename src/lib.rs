//! # edgequake-pdf-translate
//!
//! Translate a PDF in place: find its text regions, blur the original text
//! and draw an LLM translation in the same spot, page by page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Extract    rasterise pages via pdfium, read text regions (spawn_blocking)
//!  ├─ 2. Translate  batch region texts under a token budget, retry 429/5xx
//!  ├─ 3. Render     blur each region, draw the translation, shrink to fit
//!  └─ 4. Assemble   pack the rendered pages into the output PDF
//! ```
//!
//! [`Pipeline`] runs the four steps once and reports progress through a
//! [`ProgressSink`]. [`JobRunner`] wraps runs as background jobs with a
//! `QUEUED → PROGRESS → SUCCEEDED | FAILED` state machine that callers poll.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf_translate::{
//!     InMemoryJobStore, JobRunner, Pipeline, PipelineConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from EDGEQUAKE_LLM_PROVIDER / OPENAI_API_KEY
//!     let config = PipelineConfig::from_env();
//!     let pipeline = Arc::new(Pipeline::from_config(&config)?);
//!     let runner = JobRunner::new(
//!         Arc::new(InMemoryJobStore::new()),
//!         pipeline,
//!         config.concurrency,
//!         config.inline_result_limit,
//!     );
//!
//!     let id = runner.submit(std::fs::read("document.pdf")?).await?;
//!     let status = runner.wait(&id).await?;
//!     println!("{}", serde_json::to_string_pretty(&status)?);
//!     std::fs::write("document.translated.pdf", runner.download(&id).await?)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdftrans` binary (clap + anyhow + tracing-subscriber) |
//! | `bundled-font` | on | Embeds DejaVu Sans Bold as the fallback drawing font |
//! | `ocr`   | off     | Reads scanned pages with `oar-ocr` when `OCR_*` model paths are set |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OcrModels, PipelineConfig, PipelineConfigBuilder, RetrySettings};
pub use document::{BoundingBox, Detection, Page, TextRegion};
pub use error::{
    ExtractionError, JobError, PipelineError, RenderError, Stage, TranslationError, UpstreamError,
    UpstreamErrorKind,
};
pub use jobs::{InMemoryJobStore, JobId, JobRecord, JobRunner, JobState, JobStatus, JobStore, Phase, ResultPayload};
pub use orchestrator::Pipeline;
pub use pipeline::input::load_input;
pub use progress::{NoopProgressSink, ProgressSink, ProgressUpdate};
