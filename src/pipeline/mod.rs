//! Pipeline stages for in-place PDF translation.
//!
//! Each submodule implements one step. The blocking steps (PDFium, image
//! work) sit behind small traits so the orchestrator can run them with fakes
//! in tests.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ rasterize ──▶ extract ──▶ translate ──▶ overlay ──▶ assemble
//! (bytes)   (pdfium)     (regions)   (LLM)         (blur+text)  (pdfium)
//! ```
//!
//! 1. [`input`]     read a local path or download a URL, check the magic
//! 2. [`rasterize`] render pages and read their text layer; blocking
//! 3. [`extract`]   turn detections into numbered regions per page, with
//!    OCR for scanned pages when the `ocr` feature is on (`ocr`)
//! 4. [`translate`] batch region texts under a token budget and call the
//!    model, retrying transient failures ([`batch`], [`retry`], [`reply`])
//! 5. [`overlay`]   blur each region and draw its translation ([`fonts`])
//! 6. [`assemble`]  pack the rendered images into the output PDF

pub mod assemble;
pub mod batch;
pub mod extract;
pub mod fonts;
pub mod input;
#[cfg(feature = "ocr")]
pub mod ocr;
pub mod overlay;
pub mod rasterize;
pub mod reply;
pub mod retry;
pub mod translate;
