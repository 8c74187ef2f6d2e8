//! Runtime system font discovery for text stamps.

use ab_glyph::FontVec;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Well-known sans-serif locations, checked in order.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Load a usable system font, caching the result for the process
/// lifetime. Returns `None` when no candidate can be read; callers
/// skip text stamping in that case.
pub fn system_font() -> Option<Arc<FontVec>> {
    static FONT: OnceLock<Option<Arc<FontVec>>> = OnceLock::new();
    FONT.get_or_init(|| {
        for candidate in FONT_CANDIDATES {
            match std::fs::read(candidate) {
                Ok(bytes) => match FontVec::try_from_vec(bytes) {
                    Ok(font) => {
                        debug!("using system font {candidate}");
                        return Some(Arc::new(font));
                    }
                    Err(e) => debug!("font {candidate} unusable: {e}"),
                },
                Err(_) => continue,
            }
        }
        warn!("no system font found; mosaics will carry no text stamps");
        None
    })
    .clone()
}
