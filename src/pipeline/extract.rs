//! Box extraction: document bytes → pages with text regions.
//!
//! Rasterisation runs on one blocking thread, because PDFium serialises calls
//! anyway. Detection is per page and runs `concurrency` pages at a time on
//! the blocking pool; results are collected in page order regardless of which
//! page finishes first.

use crate::document::{BoundingBox, Detection, Page, TextRegion};
use crate::error::ExtractionError;
use crate::pipeline::rasterize::{PageRasterizer, RasterPage};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info};

/// Finds text on one rasterised page. Blocking.
pub trait TextDetector: Send + Sync {
    fn detect(&self, page: &RasterPage) -> Result<Vec<Detection>, ExtractionError>;
}

/// Uses the text the PDF itself declares.
///
/// Scanned pages have no text layer and come back with no regions.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLayerDetector;

impl TextDetector for TextLayerDetector {
    fn detect(&self, page: &RasterPage) -> Result<Vec<Detection>, ExtractionError> {
        Ok(page.text_layer.clone())
    }
}

/// Tries `primary` and falls back to `fallback` when it finds no text.
///
/// The orchestrator wires the text layer first and OCR second.
pub struct FallbackDetector {
    primary: Arc<dyn TextDetector>,
    fallback: Arc<dyn TextDetector>,
}

impl FallbackDetector {
    pub fn new(primary: Arc<dyn TextDetector>, fallback: Arc<dyn TextDetector>) -> Self {
        Self { primary, fallback }
    }
}

impl TextDetector for FallbackDetector {
    fn detect(&self, page: &RasterPage) -> Result<Vec<Detection>, ExtractionError> {
        let found = self.primary.detect(page)?;
        if found.iter().any(|d| !d.text.trim().is_empty()) {
            return Ok(found);
        }
        debug!("Page {}: no text layer, running OCR", page.index + 1);
        self.fallback.detect(page)
    }
}

/// Rasterizer plus detector, run over a whole document.
pub struct BoxExtractor {
    rasterizer: Arc<dyn PageRasterizer>,
    detector: Arc<dyn TextDetector>,
    concurrency: usize,
}

impl BoxExtractor {
    pub fn new(
        rasterizer: Arc<dyn PageRasterizer>,
        detector: Arc<dyn TextDetector>,
        concurrency: usize,
    ) -> Self {
        Self {
            rasterizer,
            detector,
            concurrency: concurrency.max(1),
        }
    }

    /// Extract every page of `document`, in document order.
    ///
    /// Fails with [`ExtractionError::EmptyDocument`] when the document has
    /// no pages. A page with no text is fine and yields no regions.
    pub async fn extract(&self, document: Arc<[u8]>) -> Result<Vec<Page>, ExtractionError> {
        let rasterizer = Arc::clone(&self.rasterizer);
        let raster = tokio::task::spawn_blocking(move || rasterizer.rasterize(&document))
            .await
            .map_err(|e| ExtractionError::Internal(format!("rasterisation task: {}", e)))??;

        if raster.is_empty() {
            return Err(ExtractionError::EmptyDocument);
        }
        let total = raster.len();

        let pages: Vec<Page> = stream::iter(raster.into_iter().map(|raster_page| {
            let detector = Arc::clone(&self.detector);
            async move {
                let page_num = raster_page.index + 1;
                tokio::task::spawn_blocking(move || {
                    let detections = detector.detect(&raster_page)?;
                    Ok::<_, ExtractionError>(into_page(raster_page, detections))
                })
                .await
                .map_err(|e| {
                    ExtractionError::Internal(format!("detection task for page {}: {}", page_num, e))
                })?
            }
        }))
        .buffered(self.concurrency)
        .try_collect()
        .await?;

        let regions: usize = pages.iter().map(|p| p.regions.len()).sum();
        info!("Extracted {} regions from {} pages", regions, total);
        Ok(pages)
    }
}

/// Turn detections into numbered regions, dropping zero-area boxes and
/// blank text.
fn into_page(raster: RasterPage, detections: Vec<Detection>) -> Page {
    let found = detections.len();
    let regions: Vec<TextRegion> = detections
        .into_iter()
        .filter_map(|d| {
            let bbox = BoundingBox::from_polygon(&d.polygon)?;
            (!bbox.is_empty() && !d.text.trim().is_empty()).then_some((bbox, d))
        })
        .enumerate()
        .map(|(index, (bbox, d))| TextRegion {
            index,
            bbox,
            text: d.text,
            confidence: d.confidence,
        })
        .collect();

    if regions.len() < found {
        debug!(
            "Page {}: dropped {} empty detections",
            raster.index + 1,
            found - regions.len()
        );
    }

    Page {
        index: raster.index,
        image: raster.image,
        regions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::time::Duration;

    struct FixedPages(Vec<RasterPage>);

    impl PageRasterizer for FixedPages {
        fn rasterize(&self, _document: &[u8]) -> Result<Vec<RasterPage>, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    /// Later pages finish first.
    struct SlowEarlyPages;

    impl TextDetector for SlowEarlyPages {
        fn detect(&self, page: &RasterPage) -> Result<Vec<Detection>, ExtractionError> {
            std::thread::sleep(Duration::from_millis(30 * (3 - page.index as u64)));
            Ok(vec![Detection::from_rect(
                0.0,
                0.0,
                10.0,
                10.0,
                format!("page {}", page.index),
            )])
        }
    }

    struct Broken;

    impl TextDetector for Broken {
        fn detect(&self, page: &RasterPage) -> Result<Vec<Detection>, ExtractionError> {
            Err(ExtractionError::DetectionFailed {
                page: page.index + 1,
                detail: "model crashed".into(),
            })
        }
    }

    /// Reads a fixed line on every page and counts its calls.
    #[derive(Default)]
    struct FakeOcr {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl TextDetector for FakeOcr {
        fn detect(&self, _page: &RasterPage) -> Result<Vec<Detection>, ExtractionError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![Detection {
                polygon: vec![(4.0, 6.0), (30.0, 5.0), (31.0, 14.0), (3.0, 15.0)],
                text: "Scanned line".into(),
                confidence: Some(0.87),
            }])
        }
    }

    fn raster(index: usize, text_layer: Vec<Detection>) -> RasterPage {
        RasterPage {
            index,
            image: RgbImage::new(40, 40),
            text_layer,
        }
    }

    fn doc() -> Arc<[u8]> {
        Arc::from(&b"%PDF-1.4"[..])
    }

    #[tokio::test]
    async fn zero_pages_is_an_error() {
        let extractor = BoxExtractor::new(Arc::new(FixedPages(vec![])), Arc::new(TextLayerDetector), 2);
        assert!(matches!(
            extractor.extract(doc()).await,
            Err(ExtractionError::EmptyDocument)
        ));
    }

    #[tokio::test]
    async fn pages_keep_document_order() {
        let pages = (0..3).map(|i| raster(i, vec![])).collect();
        let extractor = BoxExtractor::new(Arc::new(FixedPages(pages)), Arc::new(SlowEarlyPages), 3);
        let out = extractor.extract(doc()).await.unwrap();
        let texts: Vec<&str> = out.iter().map(|p| p.regions[0].text.as_str()).collect();
        assert_eq!(texts, vec!["page 0", "page 1", "page 2"]);
    }

    #[tokio::test]
    async fn filters_empty_boxes_and_blank_text() {
        let layer = vec![
            Detection::from_rect(0.0, 0.0, 0.0, 10.0, "zero width"),
            Detection::from_rect(0.0, 0.0, 10.0, 10.0, "   "),
            Detection::from_rect(2.0, 3.0, 20.0, 9.0, "Hello"),
            Detection::from_rect(5.0, 5.0, 30.0, 30.0, "World"),
        ];
        let extractor = BoxExtractor::new(
            Arc::new(FixedPages(vec![raster(0, layer)])),
            Arc::new(TextLayerDetector),
            1,
        );
        let page = extractor.extract(doc()).await.unwrap().remove(0);
        assert_eq!(page.regions.len(), 2);
        assert_eq!(page.regions[0].index, 0);
        assert_eq!(page.regions[0].bbox, BoundingBox::new(2, 3, 20, 9));
        assert_eq!(page.regions[1].index, 1);
        assert_eq!(page.regions[1].text, "World");
    }

    #[tokio::test]
    async fn page_without_text_has_no_regions() {
        let extractor = BoxExtractor::new(
            Arc::new(FixedPages(vec![raster(0, vec![])])),
            Arc::new(TextLayerDetector),
            1,
        );
        let pages = extractor.extract(doc()).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].regions.is_empty());
    }

    #[tokio::test]
    async fn detector_failure_propagates() {
        let extractor = BoxExtractor::new(
            Arc::new(FixedPages(vec![raster(0, vec![]), raster(1, vec![])])),
            Arc::new(Broken),
            2,
        );
        match extractor.extract(doc()).await {
            Err(ExtractionError::DetectionFailed { page, .. }) => assert_eq!(page, 1),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn scanned_page_falls_back_to_ocr() {
        let ocr = Arc::new(FakeOcr::default());
        let detector = FallbackDetector::new(Arc::new(TextLayerDetector), ocr.clone());
        let pages = vec![
            raster(0, vec![Detection::from_rect(0.0, 0.0, 20.0, 10.0, "Born digital")]),
            raster(1, vec![]),
            raster(2, vec![Detection::from_rect(0.0, 0.0, 20.0, 10.0, "  ")]),
        ];
        let extractor = BoxExtractor::new(Arc::new(FixedPages(pages)), Arc::new(detector), 2);
        let out = extractor.extract(doc()).await.unwrap();

        assert_eq!(ocr.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(out[0].regions[0].text, "Born digital");
        assert_eq!(out[0].regions[0].confidence, None);
        for page in &out[1..] {
            assert_eq!(page.regions.len(), 1);
            let region = &page.regions[0];
            assert_eq!(region.text, "Scanned line");
            assert_eq!(region.bbox, BoundingBox::new(3, 5, 31, 15));
            assert_eq!(region.confidence, Some(0.87));
        }
    }

    #[tokio::test]
    async fn ocr_failure_on_scanned_page_propagates() {
        let detector = FallbackDetector::new(Arc::new(TextLayerDetector), Arc::new(Broken));
        let extractor = BoxExtractor::new(
            Arc::new(FixedPages(vec![raster(0, vec![])])),
            Arc::new(detector),
            1,
        );
        assert!(matches!(
            extractor.extract(doc()).await,
            Err(ExtractionError::DetectionFailed { page: 1, .. })
        ));
    }
}
