//! Font lookup for the overlay renderer.
//!
//! Resolution order: an explicit override (from `FONT_PATH` or the builder),
//! the DejaVu Sans Bold face compiled into the binary (`bundled-font`
//! feature, on by default), then common system locations. If nothing
//! parses, the renderer still blurs regions but draws no text.

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[cfg(feature = "bundled-font")]
static BUNDLED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans-Bold.ttf");

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/System/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Font files to try on disk, in order: the override, then system fonts.
///
/// The bundled face sits between the two and is not a file.
pub fn font_candidates(override_path: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = override_path {
        candidates.push(path.to_path_buf());
    }
    candidates.extend(SYSTEM_FONTS.iter().map(PathBuf::from));
    candidates
}

/// The face compiled into the binary, if the `bundled-font` feature is on.
pub fn bundled_font() -> Option<FontVec> {
    #[cfg(feature = "bundled-font")]
    {
        FontVec::try_from_vec(BUNDLED_FONT.to_vec()).ok()
    }
    #[cfg(not(feature = "bundled-font"))]
    {
        None
    }
}

fn load_font_file(path: &Path) -> Option<FontVec> {
    let data = std::fs::read(path).ok()?;
    match FontVec::try_from_vec(data) {
        Ok(font) => {
            info!("Loaded font: {}", path.display());
            Some(font)
        }
        Err(_) => {
            debug!("Not a usable font file: {}", path.display());
            None
        }
    }
}

/// Load the first font that exists and parses.
pub fn resolve_font(override_path: Option<&Path>) -> Option<FontVec> {
    if let Some(path) = override_path {
        if let Some(font) = load_font_file(path) {
            return Some(font);
        }
        warn!("Font override '{}' is not usable; falling back", path.display());
    }

    if let Some(font) = bundled_font() {
        debug!("Using bundled DejaVu Sans Bold");
        return Some(font);
    }

    if let Some(font) = SYSTEM_FONTS.iter().find_map(|p| load_font_file(Path::new(p))) {
        return Some(font);
    }

    warn!("No usable font found; translations will not be drawn");
    None
}

/// Advance width of `text` at `size` pixels.
pub fn measure_text_width(text: &str, font: &FontVec, size: f32) -> f32 {
    let scaled = font.as_scaled(PxScale::from(size));
    text.chars()
        .map(|ch| scaled.h_advance(scaled.glyph_id(ch)))
        .sum()
}
