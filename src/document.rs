//! Pages, text regions and box geometry shared by every stage.

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in page pixel coordinates.
///
/// `x1`/`y1` are exclusive, so the width is `x1 - x0`. A well-formed box has
/// `x0 < x1` and `y0 < y1`; degenerate boxes are representable so that
/// detector output can be inspected before it is filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl BoundingBox {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// The bounding rectangle of a (possibly rotated or polygonal) detection.
    ///
    /// Each edge is the min/max of the corner coordinates, rounded to the
    /// nearest pixel. Returns `None` for an empty polygon.
    pub fn from_polygon(points: &[(f32, f32)]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.0, first.1, first.0, first.1);
        for &(x, y) in rest {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Some(Self {
            x0: min_x.round() as i32,
            y0: min_y.round() as i32,
            x1: max_x.round() as i32,
            y1: max_y.round() as i32,
        })
    }

    pub fn width(&self) -> i32 {
        (self.x1 - self.x0).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y1 - self.y0).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// Intersect with a `width × height` image, returning `None` when nothing
    /// of the box is on the page.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let w = width.min(i32::MAX as u32) as i32;
        let h = height.min(i32::MAX as u32) as i32;
        let clamped = Self {
            x0: self.x0.clamp(0, w),
            y0: self.y0.clamp(0, h),
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
        };
        (!clamped.is_empty()).then_some(clamped)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// Raw output of a text detector, before it becomes a [`TextRegion`].
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Corner points in page pixels, in any winding order.
    pub polygon: Vec<(f32, f32)>,
    pub text: String,
    pub confidence: Option<f32>,
}

impl Detection {
    /// A detection from an axis-aligned rectangle.
    pub fn from_rect(x0: f32, y0: f32, x1: f32, y1: f32, text: impl Into<String>) -> Self {
        Self {
            polygon: vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)],
            text: text.into(),
            confidence: None,
        }
    }
}

/// A detected text area plus its recognised source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    /// Position within the page's region list. Translations are matched back
    /// to regions by this index.
    pub index: usize,
    pub bbox: BoundingBox,
    pub text: String,
    pub confidence: Option<f32>,
}

impl TextRegion {
    /// Non-empty box with non-blank text.
    pub fn is_renderable(&self) -> bool {
        !self.bbox.is_empty() && !self.text.trim().is_empty()
    }
}

/// One rasterised page with its text regions.
#[derive(Debug, Clone)]
pub struct Page {
    /// 0-based position in the source document.
    pub index: usize,
    pub image: RgbImage,
    pub regions: Vec<TextRegion>,
}

impl Page {
    /// Region texts in region order, ready for translation.
    pub fn region_texts(&self) -> Vec<String> {
        self.regions.iter().map(|r| r.text.clone()).collect()
    }
}
