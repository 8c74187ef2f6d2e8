//! Mosaic grid planning.
//!
//! Given a video's duration and aspect ratio, a target canvas width and a
//! density token, pick a thumbnail count and the row/column grid that
//! fills the target canvas aspect as tightly as possible.

use serde::{Deserialize, Serialize};

use crate::config::CanvasAspect;
use crate::density::Density;

/// Hard cap on thumbnails per mosaic, applied after density scaling.
pub const MAX_THUMBNAIL_COUNT: u32 = 800;
/// Floor on thumbnails per mosaic; also the forced count for very short
/// sources (under five seconds).
pub const MIN_THUMBNAIL_COUNT: u32 = 4;

/// Duration under which the planner stops sampling and takes four frames.
const SHORT_SOURCE_SECONDS: f64 = 5.0;

/// Immutable grid description produced by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MosaicLayout {
    pub rows: u32,
    pub cols: u32,
    /// Thumbnail size in pixels, rounded as the last planning step.
    pub thumb_width: u32,
    pub thumb_height: u32,
    /// Number of cells actually filled; at most `rows * cols`.
    pub thumb_count: u32,
    /// Cell coordinates as `(col, row)`, row-major from (0, 0).
    pub positions: Vec<(u32, u32)>,
}

impl MosaicLayout {
    /// Canvas size derived from the rounded thumbnail grid.
    pub fn canvas_size(&self) -> (u32, u32) {
        (self.cols * self.thumb_width, self.rows * self.thumb_height)
    }
}

/// Number of thumbnails for a source of the given duration.
///
/// `width / 200` seeds the count, a logarithmic duration term grows it,
/// and the density factor divides the sum. The 800 cap is applied after
/// density scaling.
pub fn thumbnail_count(duration_seconds: f64, width: u32, density: Density) -> u32 {
    if duration_seconds < SHORT_SOURCE_SECONDS {
        return MIN_THUMBNAIL_COUNT;
    }
    let base = width as f64 / 200.0;
    let raw = base + 10.0 * duration_seconds.ln();
    let scaled = (raw / density.factor()).round() as i64;
    (scaled.max(MIN_THUMBNAIL_COUNT as i64) as u32).min(MAX_THUMBNAIL_COUNT)
}

/// Plan the mosaic grid for one source.
///
/// The search walks candidate row counts, scoring each by how much of
/// the target canvas height it leaves unfilled plus how far the grid
/// overshoots the thumbnail count. Rows are walked ascending and the
/// first best score wins, so ties prefer fewer rows. The walk stops at
/// the first candidate that overflows the canvas vertically.
pub fn plan_layout(
    duration_seconds: f64,
    source_width: u32,
    source_height: u32,
    width: u32,
    density: Density,
    aspect: CanvasAspect,
) -> MosaicLayout {
    let count = thumbnail_count(duration_seconds, width, density);
    let canvas_height = width as f64 / aspect.ratio();
    let source_aspect = if source_height > 0 {
        source_width.max(1) as f64 / source_height as f64
    } else {
        16.0 / 9.0
    };

    let mut best: Option<(f64, u32, u32, f64, f64)> = None;

    for rows in 1..=count {
        let cols = count.div_ceil(rows);
        let thumb_w = width as f64 / cols as f64;
        let thumb_h = thumb_w / source_aspect;
        let grid_height = rows as f64 * thumb_h;

        if grid_height > canvas_height {
            // Keep a fallback when even a single row is too tall; it is
            // clamped to the canvas below.
            if best.is_none() {
                let fit_h = canvas_height / rows as f64;
                best = Some((f64::INFINITY, rows, cols, fit_h * source_aspect, fit_h));
            }
            break;
        }

        let fill_ratio = grid_height / canvas_height;
        let count_delta = ((rows * cols - count) as f64).abs() / count as f64;
        let score = (1.0 - fill_ratio) + count_delta;

        if best.map_or(true, |(s, ..)| score < s) {
            best = Some((score, rows, cols, thumb_w, thumb_h));
        }
    }

    let (_, rows, cols, thumb_w, thumb_h) =
        best.unwrap_or((f64::INFINITY, 1, count.max(1), 1.0, 1.0));

    // Integer rounding is the last step; the canvas is derived from the
    // rounded sizes so the grid width is exact to the pixel.
    let thumb_width = (thumb_w.round() as u32).max(1);
    let mut thumb_height = (thumb_h.round() as u32).max(1);

    // Rounding must not push the grid past the canvas height.
    let max_row_height = (canvas_height / rows as f64).floor() as u32;
    if max_row_height >= 1 {
        thumb_height = thumb_height.min(max_row_height);
    }

    let positions = (0..count).map(|i| (i % cols, i / cols)).collect();

    MosaicLayout {
        rows,
        cols,
        thumb_width,
        thumb_height,
        thumb_count: count,
        positions,
    }
}
