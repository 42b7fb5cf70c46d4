//! PDF rasterisation through PDFium.
//!
//! ## Why one engine per worker?
//!
//! Binding PDFium loads a shared library and initialises global state inside
//! it. [`PdfEngine::bind`] does that once, at worker startup; the engine is
//! then shared read-only (behind an `Arc`) by the rasterizer and the output
//! assembler for every job the worker runs, from any blocking thread. That
//! needs pdfium-render's `sync` feature: it makes `Pdfium` `Send + Sync`
//! and serialises every call into the library behind one lock.
//!
//! ## Text layer
//!
//! Digital PDFs already know where their text is. While a page is open for
//! rendering, [`PdfiumRasterizer`] also reads its text segments and converts
//! them from PDF points (origin bottom-left) into pixel-space
//! [`Detection`]s, which [`crate::pipeline::extract::TextLayerDetector`]
//! hands on as regions.

use crate::document::Detection;
use crate::error::ExtractionError;
use image::RgbImage;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

/// A process-wide PDFium binding.
pub struct PdfEngine {
    pdfium: Pdfium,
}

impl PdfEngine {
    /// Bind to `PDFIUM_LIB_PATH` when set, otherwise to the system library.
    pub fn bind() -> Result<Self, ExtractionError> {
        let bindings = match std::env::var("PDFIUM_LIB_PATH") {
            Ok(path) if !path.is_empty() => {
                debug!("Binding pdfium from PDFIUM_LIB_PATH={}", path);
                Pdfium::bind_to_library(&path)
            }
            _ => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ExtractionError::PdfiumBindingFailed(format!("{:?}", e)))?;

        info!("PDFium bound");
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    pub fn pdfium(&self) -> &Pdfium {
        &self.pdfium
    }
}

/// One rasterised page before text detection.
#[derive(Debug, Clone)]
pub struct RasterPage {
    /// 0-based page index.
    pub index: usize,
    pub image: RgbImage,
    /// Text the document itself declares on this page, in page pixels.
    /// Empty for scanned pages.
    pub text_layer: Vec<Detection>,
}

/// Turns document bytes into page images. Blocking.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, document: &[u8]) -> Result<Vec<RasterPage>, ExtractionError>;
}

/// Reject input that does not start with `%PDF`.
pub fn check_pdf_magic(document: &[u8]) -> Result<(), ExtractionError> {
    if document.len() < 4 || &document[..4] != b"%PDF" {
        return Err(ExtractionError::NotAPdf {
            magic: document.iter().take(4).copied().collect(),
        });
    }
    Ok(())
}

/// [`PageRasterizer`] over a shared [`PdfEngine`].
pub struct PdfiumRasterizer {
    engine: std::sync::Arc<PdfEngine>,
    dpi: u32,
    max_pixels: u32,
}

impl PdfiumRasterizer {
    pub fn new(engine: std::sync::Arc<PdfEngine>, dpi: u32, max_pixels: u32) -> Self {
        Self {
            engine,
            dpi,
            max_pixels,
        }
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(&self, document: &[u8]) -> Result<Vec<RasterPage>, ExtractionError> {
        check_pdf_magic(document)?;

        let doc = self
            .engine
            .pdfium()
            .load_pdf_from_byte_slice(document, None)
            .map_err(|e| ExtractionError::CorruptPdf {
                detail: format!("{:?}", e),
            })?;

        let pages = doc.pages();
        info!("PDF loaded: {} pages", pages.len());

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut results = Vec::with_capacity(pages.len() as usize);

        for (idx, page) in pages.iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                ExtractionError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image().to_rgb8();
            let text_layer = read_text_layer(&page, idx, image.width(), image.height());
            debug!(
                "Rendered page {} → {}x{} px, {} text segments",
                idx + 1,
                image.width(),
                image.height(),
                text_layer.len()
            );

            results.push(RasterPage {
                index: idx,
                image,
                text_layer,
            });
        }

        Ok(results)
    }
}

/// Text segments of `page`, scaled into a `width_px × height_px` image.
fn read_text_layer(page: &PdfPage<'_>, idx: usize, width_px: u32, height_px: u32) -> Vec<Detection> {
    let page_w = page.width().value;
    let page_h = page.height().value;
    if page_w <= 0.0 || page_h <= 0.0 {
        return Vec::new();
    }
    let sx = width_px as f32 / page_w;
    let sy = height_px as f32 / page_h;

    let text = match page.text() {
        Ok(text) => text,
        Err(e) => {
            warn!("Page {}: no text layer ({:?})", idx + 1, e);
            return Vec::new();
        }
    };

    text.segments()
        .iter()
        .filter_map(|segment| {
            let content = segment.text();
            if content.trim().is_empty() {
                return None;
            }
            let bounds = segment.bounds();
            let x0 = bounds.left().value * sx;
            let x1 = bounds.right().value * sx;
            let y0 = (page_h - bounds.top().value) * sy;
            let y1 = (page_h - bounds.bottom().value) * sy;
            Some(Detection::from_rect(x0, y0, x1, y1, content))
        })
        .collect()
}
