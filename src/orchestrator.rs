//! One translation run: extract → translate → render, with progress.
//!
//! Progress schedule:
//!
//! | Point                     | Stage         | Percent            |
//! |---------------------------|---------------|--------------------|
//! | before extraction         | `ocr`         | 10                 |
//! | after extraction          | `ocr`         | 20                 |
//! | after each page translated| `translation` | 20 → 80 by regions |
//! | before rendering          | `rendering`   | 85                 |
//! | output assembled          | `complete`    | 100                |
//!
//! Translation progress is the cumulative number of regions translated over
//! the document's total, so a page with many regions moves the bar further
//! than a page with few. A stage failure stops the run immediately; the last
//! reported update is left as it was.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, RenderError, Stage};
use crate::pipeline::assemble::{DocumentAssembler, PdfiumAssembler};
use crate::pipeline::extract::{BoxExtractor, TextDetector, TextLayerDetector};
use crate::pipeline::rasterize::{PdfEngine, PdfiumRasterizer};
use crate::pipeline::overlay::PageRenderer;
use crate::pipeline::translate::BatchTranslator;
use crate::progress::{interpolate, ProgressSink, ProgressTracker};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Extractor, translator and renderer wired together.
pub struct Pipeline {
    extractor: BoxExtractor,
    translator: BatchTranslator,
    renderer: Arc<PageRenderer>,
    assembler: Arc<dyn DocumentAssembler>,
}

impl Pipeline {
    pub fn new(
        extractor: BoxExtractor,
        translator: BatchTranslator,
        renderer: PageRenderer,
        assembler: Arc<dyn DocumentAssembler>,
    ) -> Self {
        Self {
            extractor,
            translator,
            renderer: Arc::new(renderer),
            assembler,
        }
    }

    /// Production wiring over an already-bound PDFium engine.
    pub fn with_engine(config: &PipelineConfig, engine: Arc<PdfEngine>) -> Self {
        let rasterizer = PdfiumRasterizer::new(
            Arc::clone(&engine),
            config.dpi,
            config.max_rendered_pixels,
        );
        let extractor = BoxExtractor::new(
            Arc::new(rasterizer),
            text_detector(config),
            config.concurrency,
        );
        Self::new(
            extractor,
            BatchTranslator::from_config(config),
            PageRenderer::from_config(config),
            Arc::new(PdfiumAssembler::new(engine, config.dpi)),
        )
    }

    /// Bind PDFium and build the production pipeline.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let engine = Arc::new(PdfEngine::bind()?);
        Ok(Self::with_engine(config, engine))
    }

    /// Translate `document` and return the output PDF bytes.
    ///
    /// Errors are the failing stage's own, unchanged.
    pub async fn run(
        &self,
        document: &[u8],
        progress: &dyn ProgressSink,
    ) -> Result<Vec<u8>, PipelineError> {
        let started = Instant::now();
        let tracker = ProgressTracker::new(progress);

        // ── Extraction ──────────────────────────────────────────────────────
        tracker.report(Stage::Ocr, 10.0, "Extracting text regions");
        let pages = self.extractor.extract(Arc::from(document)).await?;
        let total_regions: usize = pages.iter().map(|p| p.regions.len()).sum();
        tracker.report(
            Stage::Ocr,
            20.0,
            format!("Found {} regions on {} pages", total_regions, pages.len()),
        );

        // ── Translation ─────────────────────────────────────────────────────
        let mut translations = Vec::with_capacity(pages.len());
        let mut translated = 0;
        for page in &pages {
            let texts = page.region_texts();
            translations.push(self.translator.translate(&texts).await?);
            translated += texts.len();
            tracker.report(
                Stage::Translation,
                interpolate(20.0, 80.0, translated, total_regions),
                format!("Translated page {}/{}", page.index + 1, pages.len()),
            );
        }

        // ── Rendering ───────────────────────────────────────────────────────
        tracker.report(Stage::Rendering, 85.0, "Rendering translated pages");
        let page_count = pages.len();
        let renderer = Arc::clone(&self.renderer);
        let assembler = Arc::clone(&self.assembler);
        let output = tokio::task::spawn_blocking(move || {
            let images = renderer.render_document(&pages, &translations)?;
            assembler.assemble(images)
        })
        .await
        .map_err(|e| RenderError::Internal(e.to_string()))??;

        tracker.report(Stage::Complete, 100.0, "Done");
        info!(
            "Translated {} pages ({} regions) in {}ms",
            page_count,
            total_regions,
            started.elapsed().as_millis()
        );
        Ok(output)
    }
}

/// Text layer, with OCR behind it when models are configured and loadable.
fn text_detector(config: &PipelineConfig) -> Arc<dyn TextDetector> {
    let Some(models) = &config.ocr_models else {
        return Arc::new(TextLayerDetector);
    };
    #[cfg(feature = "ocr")]
    {
        use crate::pipeline::extract::FallbackDetector;
        use crate::pipeline::ocr::OarOcrDetector;

        match OarOcrDetector::load(models) {
            Ok(ocr) => Arc::new(FallbackDetector::new(
                Arc::new(TextLayerDetector),
                Arc::new(ocr),
            )),
            Err(e) => {
                warn!("{}; scanned pages will have no regions", e);
                Arc::new(TextLayerDetector)
            }
        }
    }
    #[cfg(not(feature = "ocr"))]
    {
        warn!(
            "OCR models set ({}) but built without the `ocr` feature; using the text layer only",
            models.detection.display()
        );
        Arc::new(TextLayerDetector)
    }
}
