//! OCR for pages that carry no text layer, backed by `oar-ocr`.
//!
//! Detection and recognition run as ONNX models on the page raster. Each
//! recognised line keeps its detection polygon and recognition score; the
//! extractor reduces the polygon to an axis-aligned box.

use crate::config::OcrModels;
use crate::document::Detection;
use crate::error::ExtractionError;
use crate::pipeline::extract::TextDetector;
use crate::pipeline::rasterize::RasterPage;
use oar_ocr::oarocr::{OAROCRBuilder, OAROCR};
use tracing::{debug, info};

/// Runs the oar-ocr detection + recognition pipeline on one page at a time.
pub struct OarOcrDetector {
    ocr: OAROCR,
}

impl OarOcrDetector {
    /// Load the models. Fails when a file is missing or not a usable model.
    pub fn load(models: &OcrModels) -> Result<Self, ExtractionError> {
        let ocr = OAROCRBuilder::new(
            models.detection.clone(),
            models.recognition.clone(),
            models.dictionary.clone(),
        )
        .build()
        .map_err(|e| ExtractionError::OcrUnavailable(e.to_string()))?;
        info!("Loaded OCR models from {}", models.detection.display());
        Ok(Self { ocr })
    }
}

impl TextDetector for OarOcrDetector {
    fn detect(&self, page: &RasterPage) -> Result<Vec<Detection>, ExtractionError> {
        let failed = |detail: String| ExtractionError::DetectionFailed {
            page: page.index + 1,
            detail,
        };
        let results = self
            .ocr
            .predict(vec![page.image.clone()])
            .map_err(|e| failed(e.to_string()))?;

        let detections: Vec<Detection> = results
            .into_iter()
            .flat_map(|result| result.text_regions)
            .filter_map(|region| {
                let text = region.text?;
                Some(Detection {
                    polygon: region
                        .bounding_box
                        .points
                        .iter()
                        .map(|p| (p.x, p.y))
                        .collect(),
                    text: text.to_string(),
                    confidence: region.confidence,
                })
            })
            .collect();

        debug!("Page {}: OCR found {} lines", page.index + 1, detections.len());
        Ok(detections)
    }
}
