//! Overlay rendering: obscure each region's original text and draw its
//! translation on top.
//!
//! Each region is blurred from a padded window of the *original* page, so a
//! region's result never depends on regions blurred before it, and pixels
//! outside every region are copied through untouched. Text is drawn after all
//! blurring, in black, anchored at the region's top-left corner, in region
//! order. A translation wider than its region is shrunk proportionally but
//! never below the minimum size; text may still overflow at that size.

use crate::config::PipelineConfig;
use crate::document::{BoundingBox, Page};
use crate::error::RenderError;
use crate::pipeline::fonts::{measure_text_width, resolve_font};
use ab_glyph::{FontVec, PxScale};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use tracing::{debug, warn};

const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Font size that fits `text_width` (measured at `base`) into `region_width`.
///
/// Text that already fits keeps `base`. Otherwise the size is scaled by
/// `region_width / text_width`, rounded down to a whole pixel and floored at
/// `min`. The result never exceeds `base`.
pub fn fit_font_size(text_width: f32, region_width: i32, base: f32, min: f32) -> f32 {
    let region_width = region_width.max(0) as f32;
    if text_width <= region_width || text_width <= 0.0 {
        return base;
    }
    (base * region_width / text_width).floor().max(min).min(base)
}

/// Blur every box of `image`, leaving all other pixels unchanged.
pub fn blur_regions(image: &RgbImage, boxes: &[BoundingBox], sigma: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let pad = (sigma * 3.0).ceil().max(1.0) as i32;
    let mut out = image.clone();

    for bbox in boxes {
        let Some(b) = bbox.clamp_to(width, height) else {
            continue;
        };
        let wx0 = (b.x0 - pad).max(0) as u32;
        let wy0 = (b.y0 - pad).max(0) as u32;
        let wx1 = ((b.x1 + pad) as u32).min(width);
        let wy1 = ((b.y1 + pad) as u32).min(height);

        let window = imageops::crop_imm(image, wx0, wy0, wx1 - wx0, wy1 - wy0).to_image();
        let blurred = imageops::blur(&window, sigma);

        for y in b.y0 as u32..b.y1 as u32 {
            for x in b.x0 as u32..b.x1 as u32 {
                out.put_pixel(x, y, *blurred.get_pixel(x - wx0, y - wy0));
            }
        }
    }
    out
}

/// Draws translations over one page image.
pub struct PageRenderer {
    font: Option<FontVec>,
    base_font_size: f32,
    min_font_size: f32,
    blur_sigma: f32,
}

impl PageRenderer {
    pub fn new(font: Option<FontVec>, base_font_size: f32, min_font_size: f32, blur_sigma: f32) -> Self {
        Self {
            font,
            base_font_size,
            min_font_size,
            blur_sigma,
        }
    }

    /// Resolve the font once and keep it for every page.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            resolve_font(config.font_path.as_deref()),
            config.base_font_size,
            config.min_font_size,
            config.blur_sigma,
        )
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Blur the page's regions and draw `translations[i]` into region `i`.
    pub fn render(&self, page: &Page, translations: &[String]) -> Result<RgbImage, RenderError> {
        if page.regions.len() != translations.len() {
            return Err(RenderError::TranslationCountMismatch {
                page: page.index + 1,
                regions: page.regions.len(),
                translations: translations.len(),
            });
        }
        if page.regions.is_empty() {
            return Ok(page.image.clone());
        }

        let boxes: Vec<BoundingBox> = page.regions.iter().map(|r| r.bbox).collect();
        let mut out = blur_regions(&page.image, &boxes, self.blur_sigma);

        let Some(font) = &self.font else {
            warn!("Page {}: no font available, regions blurred only", page.index + 1);
            return Ok(out);
        };

        let (width, height) = out.dimensions();
        for (region, text) in page.regions.iter().zip(translations) {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let Some(b) = region.bbox.clamp_to(width, height) else {
                continue;
            };
            let text_width = measure_text_width(text, font, self.base_font_size);
            let size = fit_font_size(text_width, b.width(), self.base_font_size, self.min_font_size);
            if size < self.base_font_size {
                debug!(
                    "Page {} region {}: shrinking text to {}px",
                    page.index + 1,
                    region.index,
                    size
                );
            }
            draw_text_mut(&mut out, TEXT_COLOR, b.x0, b.y0, PxScale::from(size), font, text);
        }
        Ok(out)
    }

    /// Render every page. `translations[i]` belongs to `pages[i]`.
    pub fn render_document(
        &self,
        pages: &[Page],
        translations: &[Vec<String>],
    ) -> Result<Vec<RgbImage>, RenderError> {
        if pages.is_empty() {
            return Err(RenderError::NoPages);
        }
        pages
            .iter()
            .enumerate()
            .map(|(i, page)| {
                let page_translations = translations.get(i).map(Vec::as_slice).unwrap_or(&[]);
                self.render(page, page_translations)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextRegion;

    fn checkerboard(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    fn region(index: usize, bbox: BoundingBox) -> TextRegion {
        TextRegion {
            index,
            bbox,
            text: "Hello".into(),
            confidence: None,
        }
    }

    fn renderer() -> PageRenderer {
        PageRenderer::new(None, 14.0, 8.0, 3.5)
    }

    #[test]
    fn fit_keeps_base_when_text_fits() {
        assert_eq!(fit_font_size(80.0, 100, 14.0, 8.0), 14.0);
        assert_eq!(fit_font_size(100.0, 100, 14.0, 8.0), 14.0);
    }

    #[test]
    fn fit_scales_down_proportionally() {
        // 14 * 100 / 140 = 10
        assert_eq!(fit_font_size(140.0, 100, 14.0, 8.0), 10.0);
        // 14 * 100 / 130 = 10.77 → 10
        assert_eq!(fit_font_size(130.0, 100, 14.0, 8.0), 10.0);
    }

    #[test]
    fn fit_never_goes_below_minimum() {
        assert_eq!(fit_font_size(1000.0, 50, 14.0, 8.0), 8.0);
        assert_eq!(fit_font_size(10.0, 0, 14.0, 8.0), 8.0);
    }

    #[test]
    fn blur_leaves_outside_pixels_untouched() {
        let img = checkerboard(60, 40);
        let boxes = [BoundingBox::new(10, 10, 30, 20), BoundingBox::new(25, 15, 50, 35)];
        let out = blur_regions(&img, &boxes, 3.5);

        let mut changed_inside = false;
        for (x, y, px) in out.enumerate_pixels() {
            let inside = boxes.iter().any(|b| b.contains(x as i32, y as i32));
            if inside {
                changed_inside |= px != img.get_pixel(x, y);
            } else {
                assert_eq!(px, img.get_pixel(x, y), "pixel ({x},{y}) changed");
            }
        }
        assert!(changed_inside);
    }

    #[test]
    fn blur_ignores_off_page_boxes() {
        let img = checkerboard(20, 20);
        let out = blur_regions(&img, &[BoundingBox::new(30, 30, 40, 40)], 3.5);
        assert_eq!(out, img);
    }

    #[test]
    fn render_rejects_count_mismatch() {
        let page = Page {
            index: 1,
            image: checkerboard(40, 40),
            regions: vec![region(0, BoundingBox::new(0, 0, 10, 10))],
        };
        match renderer().render(&page, &[]) {
            Err(RenderError::TranslationCountMismatch {
                page,
                regions,
                translations,
            }) => {
                assert_eq!((page, regions, translations), (2, 1, 0));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn page_without_regions_is_unchanged() {
        let page = Page {
            index: 0,
            image: checkerboard(16, 16),
            regions: vec![],
        };
        assert_eq!(renderer().render(&page, &[]).unwrap(), page.image);
    }

    #[cfg_attr(not(feature = "bundled-font"), allow(dead_code))]
    fn white_page(w: u32, h: u32, bbox: BoundingBox) -> Page {
        Page {
            index: 0,
            image: RgbImage::from_pixel(w, h, Rgb([255, 255, 255])),
            regions: vec![region(0, bbox)],
        }
    }

    /// Leftmost and rightmost columns holding a dark pixel.
    #[cfg_attr(not(feature = "bundled-font"), allow(dead_code))]
    fn ink_columns(img: &RgbImage) -> Option<(u32, u32)> {
        let xs: Vec<u32> = img
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] < 128)
            .map(|(x, _, _)| x)
            .collect();
        Some((*xs.iter().min()?, *xs.iter().max()?))
    }

    #[cfg(feature = "bundled-font")]
    #[test]
    fn translation_is_drawn_in_black_inside_the_region() {
        let font = crate::pipeline::fonts::bundled_font().unwrap();
        let renderer = PageRenderer::new(Some(font), 14.0, 8.0, 3.5);
        let bbox = BoundingBox::new(10, 10, 190, 40);
        let out = renderer
            .render(&white_page(200, 60, bbox), &["Hola mundo".to_string()])
            .unwrap();

        let ink: Vec<(u32, u32)> = out
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] < 128)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!ink.is_empty(), "no text pixels drawn");
        assert!(ink.iter().all(|&(x, y)| bbox.contains(x as i32, y as i32)));
    }

    #[cfg(feature = "bundled-font")]
    #[test]
    fn over_wide_translation_is_drawn_smaller() {
        let font = crate::pipeline::fonts::bundled_font().unwrap();
        let text = "A rather long translated heading".to_string();
        let base_width = measure_text_width(&text, &font, 14.0);
        assert!(base_width > 100.0 && base_width < 380.0, "width {base_width}");

        let renderer = PageRenderer::new(Some(font), 14.0, 4.0, 3.5);
        let wide = renderer
            .render(&white_page(400, 60, BoundingBox::new(10, 10, 390, 40)), &[text.clone()])
            .unwrap();
        let narrow = renderer
            .render(&white_page(400, 60, BoundingBox::new(10, 10, 110, 40)), &[text])
            .unwrap();

        let (wide_left, wide_right) = ink_columns(&wide).unwrap();
        let (narrow_left, narrow_right) = ink_columns(&narrow).unwrap();
        assert!(narrow_right - narrow_left < wide_right - wide_left);
        assert!(narrow_right < 112, "shrunk text overflows to x={narrow_right}");
        assert!(wide_left >= 10 && narrow_left >= 10);
    }

    #[test]
    fn render_document_requires_pages() {
        assert!(matches!(
            renderer().render_document(&[], &[]),
            Err(RenderError::NoPages)
        ));
    }

    #[test]
    fn render_document_keeps_page_order_and_size() {
        let pages: Vec<Page> = (0..3)
            .map(|i| Page {
                index: i,
                image: checkerboard(20 + i as u32, 30),
                regions: vec![region(0, BoundingBox::new(2, 2, 10, 10))],
            })
            .collect();
        let translations = vec![vec!["Hola".to_string()]; 3];
        let out = renderer().render_document(&pages, &translations).unwrap();
        let widths: Vec<u32> = out.iter().map(|img| img.width()).collect();
        assert_eq!(widths, vec![20, 21, 22]);
    }
}
