//! Output assembly: rendered page images → one PDF.
//!
//! Each image becomes a full-bleed page. Page size in points is the pixel
//! size scaled back by the rasterisation DPI, so the output matches the
//! input's physical page size.

use crate::error::RenderError;
use crate::pipeline::rasterize::PdfEngine;
use image::{DynamicImage, RgbImage};
use pdfium_render::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// Packs page images into an output document. Blocking.
pub trait DocumentAssembler: Send + Sync {
    fn assemble(&self, pages: Vec<RgbImage>) -> Result<Vec<u8>, RenderError>;
}

/// Page size in PDF points for an image rasterised at `dpi`.
pub fn page_size_points(width_px: u32, height_px: u32, dpi: u32) -> (f32, f32) {
    let scale = 72.0 / dpi.max(1) as f32;
    (width_px as f32 * scale, height_px as f32 * scale)
}

/// [`DocumentAssembler`] that writes through PDFium.
pub struct PdfiumAssembler {
    engine: Arc<PdfEngine>,
    dpi: u32,
}

impl PdfiumAssembler {
    pub fn new(engine: Arc<PdfEngine>, dpi: u32) -> Self {
        Self { engine, dpi }
    }
}

impl DocumentAssembler for PdfiumAssembler {
    fn assemble(&self, pages: Vec<RgbImage>) -> Result<Vec<u8>, RenderError> {
        if pages.is_empty() {
            return Err(RenderError::NoPages);
        }
        let failed = |e: PdfiumError| RenderError::AssemblyFailed(format!("{:?}", e));

        let mut document = self.engine.pdfium().create_new_pdf().map_err(failed)?;
        let total = pages.len();

        for (idx, image) in pages.into_iter().enumerate() {
            let (w, h) = page_size_points(image.width(), image.height(), self.dpi);
            let (w, h) = (PdfPoints::new(w), PdfPoints::new(h));

            let mut page = document
                .pages_mut()
                .create_page_at_end(PdfPagePaperSize::from_points(w, h))
                .map_err(failed)?;
            page.objects_mut()
                .create_image_object(
                    PdfPoints::ZERO,
                    PdfPoints::ZERO,
                    &DynamicImage::ImageRgb8(image),
                    Some(w),
                    Some(h),
                )
                .map_err(failed)?;
            debug!("Assembled page {}/{}", idx + 1, total);
        }

        let bytes = document.save_to_bytes().map_err(failed)?;
        info!("Assembled {} pages ({} bytes)", total, bytes.len());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_round_trips_dpi() {
        // US Letter at 200 DPI.
        let (w, h) = page_size_points(1700, 2200, 200);
        assert!((w - 612.0).abs() < 0.01);
        assert!((h - 792.0).abs() < 0.01);
    }

    #[test]
    fn zero_dpi_does_not_divide_by_zero() {
        let (w, _) = page_size_points(100, 100, 0);
        assert!(w.is_finite());
    }
}
