//! Mosaic composition and encoding.
//!
//! Draws extracted thumbnails onto a canvas, stamps timestamps and a
//! metadata footer, and publishes the encoded image atomically.

use ab_glyph::{FontVec, PxScale};
use image::{imageops, ImageEncoder, Pixel, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use mosaic_models::{Density, DurationBucket, MosaicLayout, OutputFormat, ProcessingConfig};

use crate::backend::VideoBackend;
use crate::error::{MediaError, MediaResult};
use crate::font::system_font;
use crate::frames::TimedThumbnail;
use crate::fs_utils::{move_file, write_atomic};
use crate::probe::VideoMetadata;

/// Canvas background.
const BACKGROUND: Rgba<u8> = Rgba([26, 26, 26, 255]);
/// Timestamp strip: black at 60% opacity.
const STAMP_STRIP: Rgba<u8> = Rgba([0, 0, 0, 153]);
/// Metadata footer: translucent blue.
const FOOTER_STRIP: Rgba<u8> = Rgba([38, 64, 115, 200]);
/// Text color.
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
/// Shadow under thumbnails, when enabled.
const SHADOW: Rgba<u8> = Rgba([0, 0, 0, 120]);
/// Shadow offset in pixels.
const SHADOW_OFFSET: i64 = 4;
/// Divisor taking a strip height down to a font size.
const GOLDEN_RATIO: f32 = 1.618;
/// Right margin for timestamp text.
const STAMP_MARGIN: i32 = 5;
/// Versioned-name probe ceiling.
const MAX_VERSION: u32 = 1000;

/// Drawing options derived from the job configuration.
#[derive(Debug, Clone)]
pub struct StyleOptions {
    pub add_timestamps: bool,
    pub add_border: bool,
    pub add_shadow: bool,
    pub border_color: [u8; 4],
    pub border_width: u32,
    /// Footer shows the full source path instead of the file name.
    pub full_path: bool,
}

impl From<&ProcessingConfig> for StyleOptions {
    fn from(config: &ProcessingConfig) -> Self {
        Self {
            add_timestamps: config.add_timestamps,
            add_border: config.add_border,
            add_shadow: config.add_shadow,
            border_color: config.border_color,
            border_width: config.border_width,
            full_path: config.add_full_path,
        }
    }
}

/// Render the mosaic canvas.
///
/// Thumbnails are drawn row-major; a thumbnail at grid row `r` lands at
/// pixel row `canvas_height - (r + 1) * thumb_height`, so the first row
/// sits at the bottom of the canvas.
pub fn render_mosaic(
    thumbnails: &[TimedThumbnail],
    layout: &MosaicLayout,
    metadata: &VideoMetadata,
    style: &StyleOptions,
) -> RgbaImage {
    let (canvas_w, canvas_h) = layout.canvas_size();
    let mut canvas = RgbaImage::from_pixel(canvas_w, canvas_h, BACKGROUND);
    let font = system_font();

    let (tw, th) = (layout.thumb_width, layout.thumb_height);

    for thumb in thumbnails {
        let Some(&(col, row)) = layout.positions.get(thumb.index) else {
            continue;
        };
        let x = (col * tw) as i64;
        let y = canvas_h as i64 - ((row + 1) * th) as i64;

        if style.add_shadow {
            fill_rect_blend(
                &mut canvas,
                x + SHADOW_OFFSET,
                y + SHADOW_OFFSET,
                tw,
                th,
                SHADOW,
            );
        }

        if thumb.image.dimensions() == (tw, th) {
            imageops::overlay(&mut canvas, &thumb.image, x, y);
        } else {
            let resized = imageops::resize(&thumb.image, tw, th, imageops::FilterType::Triangle);
            imageops::overlay(&mut canvas, &resized, x, y);
        }

        if style.add_border && style.border_width > 0 {
            draw_inset_border(&mut canvas, x, y, tw, th, style);
        }

        if style.add_timestamps {
            draw_timestamp(&mut canvas, x, y, tw, th, thumb.timestamp_seconds, &font);
        }
    }

    draw_footer(&mut canvas, metadata, style, &font);

    canvas
}

/// Stroke the inside edge of a tile.
fn draw_inset_border(
    canvas: &mut RgbaImage,
    x: i64,
    y: i64,
    tw: u32,
    th: u32,
    style: &StyleOptions,
) {
    let color = Rgba(style.border_color);
    let b = style.border_width.min(tw / 2).min(th / 2);
    fill_rect_blend(canvas, x, y, tw, b, color);
    fill_rect_blend(canvas, x, y + (th - b) as i64, tw, b, color);
    fill_rect_blend(canvas, x, y, b, th, color);
    fill_rect_blend(canvas, x + (tw - b) as i64, y, b, th, color);
}

/// Semi-transparent strip along the bottom sixth of a tile, with the
/// formatted time right-aligned inside it.
fn draw_timestamp(
    canvas: &mut RgbaImage,
    x: i64,
    y: i64,
    tw: u32,
    th: u32,
    seconds: f64,
    font: &Option<Arc<FontVec>>,
) {
    let strip_h = th / 6;
    if strip_h == 0 {
        return;
    }
    let strip_y = y + (th - strip_h) as i64;
    fill_rect_blend(canvas, x, strip_y, tw, strip_h, STAMP_STRIP);

    let Some(font) = font else { return };
    let scale = PxScale::from(strip_h as f32 / GOLDEN_RATIO);
    let text = format_timestamp(seconds);
    let (text_w, text_h) = text_size(scale, font.as_ref(), &text);

    let tx = x as i32 + tw as i32 - STAMP_MARGIN - text_w as i32;
    let ty = strip_y as i32 + (strip_h as i32 - text_h as i32) / 2;
    if tx > x as i32 {
        draw_text_mut(canvas, TEXT_COLOR, tx, ty, scale, font.as_ref(), &text);
    }
}

/// Translucent blue strip across the bottom 10% of the canvas carrying
/// four metadata lines.
fn draw_footer(
    canvas: &mut RgbaImage,
    metadata: &VideoMetadata,
    style: &StyleOptions,
    font: &Option<Arc<FontVec>>,
) {
    let (canvas_w, canvas_h) = canvas.dimensions();
    let strip_h = canvas_h / 10;
    if strip_h == 0 {
        return;
    }
    let strip_y = (canvas_h - strip_h) as i64;
    fill_rect_blend(canvas, 0, strip_y, canvas_w, strip_h, FOOTER_STRIP);

    let Some(font) = font else { return };
    let line_h = strip_h / 4;
    if line_h == 0 {
        return;
    }
    let scale = PxScale::from(line_h as f32 / GOLDEN_RATIO);

    let source = if style.full_path {
        metadata.file_path.display().to_string()
    } else {
        metadata
            .file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    };
    let lines = [
        source,
        metadata.codec.clone(),
        format!("{}x{}", metadata.width, metadata.height),
        format_timestamp(metadata.duration_seconds),
    ];

    for (i, line) in lines.iter().enumerate() {
        let (_, text_h) = text_size(scale, font.as_ref(), line);
        let ty = strip_y as i32 + i as i32 * line_h as i32 + (line_h as i32 - text_h as i32) / 2;
        draw_text_mut(canvas, TEXT_COLOR, 10, ty, scale, font.as_ref(), line);
    }
}

/// Alpha-blend a filled rectangle onto the canvas, clipped to bounds.
fn fill_rect_blend(canvas: &mut RgbaImage, x: i64, y: i64, w: u32, h: u32, color: Rgba<u8>) {
    let (cw, ch) = canvas.dimensions();
    let x0 = x.max(0) as u32;
    let y0 = y.max(0) as u32;
    let x1 = ((x + w as i64).max(0) as u64).min(cw as u64) as u32;
    let y1 = ((y + h as i64).max(0) as u64).min(ch as u64) as u32;
    for py in y0..y1 {
        for px in x0..x1 {
            canvas.get_pixel_mut(px, py).blend(&color);
        }
    }
}

/// Format seconds as `HH:MM:SS`.
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Output file name: `<bucket>-<stem>-<density>.<ext>`.
pub fn mosaic_file_name(
    bucket: DurationBucket,
    stem: &str,
    density: Density,
    format: OutputFormat,
) -> String {
    format!("{bucket}-{stem}-{density}.{}", format.extension())
}

/// Predicted output path before any versioning.
pub fn predicted_output_path(
    output_dir: &Path,
    metadata: &VideoMetadata,
    density: Density,
    format: OutputFormat,
    separate_folders: bool,
) -> PathBuf {
    let bucket = metadata.bucket();
    let name = mosaic_file_name(bucket, &metadata.stem(), density, format);
    if separate_folders {
        output_dir.join(bucket.as_str()).join(name)
    } else {
        output_dir.join(name)
    }
}

/// Resolve name collisions by appending `_v2`, `_v3`, … before the
/// extension. With `overwrite` the path is returned unchanged.
pub fn resolve_versioned(path: &Path, overwrite: bool) -> MediaResult<PathBuf> {
    if overwrite || !path.exists() {
        return Ok(path.to_path_buf());
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    for version in 2..=MAX_VERSION {
        let candidate = parent.join(format!("{stem}_v{version}.{ext}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(MediaError::UnableToSaveMosaic(format!(
        "no free versioned name for {}",
        path.display()
    )))
}

/// Encode the canvas with the raster library (JPEG and PNG).
pub fn encode_canvas(
    canvas: &RgbaImage,
    format: OutputFormat,
    quality: f32,
) -> MediaResult<Vec<u8>> {
    let mut bytes = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            let rgb = image::DynamicImage::ImageRgba8(canvas.clone()).to_rgb8();
            let q = (quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8;
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, q);
            encoder.encode_image(&rgb)?;
        }
        OutputFormat::Png => {
            let encoder = image::codecs::png::PngEncoder::new(&mut bytes);
            encoder.write_image(
                canvas.as_raw(),
                canvas.width(),
                canvas.height(),
                image::ExtendedColorType::Rgba8,
            )?;
        }
        OutputFormat::Heic => {
            return Err(MediaError::UnsupportedOutputFormat(
                "heic must be encoded through the video backend".to_string(),
            ));
        }
    }
    Ok(bytes)
}

/// Encode and publish the canvas atomically; returns the bytes written
/// (the input to the catalog's content hash).
pub async fn write_mosaic(
    canvas: &RgbaImage,
    dest: &Path,
    format: OutputFormat,
    quality: f32,
    backend: &dyn VideoBackend,
) -> MediaResult<Vec<u8>> {
    match format {
        OutputFormat::Jpeg | OutputFormat::Png => {
            let bytes = encode_canvas(canvas, format, quality)?;
            write_atomic(dest, &bytes).await?;
            Ok(bytes)
        }
        OutputFormat::Heic => {
            let png = encode_canvas(canvas, OutputFormat::Png, quality)?;
            let parent = dest.parent().unwrap_or_else(|| Path::new("."));
            tokio::fs::create_dir_all(parent).await?;
            let tmp = parent.join(format!(".tmp-{}.heic", Uuid::new_v4().simple()));
            backend.encode_still(&png, &tmp, quality).await?;
            let bytes = tokio::fs::read(&tmp).await?;
            move_file(&tmp, dest).await?;
            Ok(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_models::{plan_layout, CanvasAspect};
    use std::path::PathBuf;

    fn meta() -> VideoMetadata {
        VideoMetadata {
            file_path: PathBuf::from("/videos/sample.mp4"),
            duration_seconds: 120.0,
            width: 1920,
            height: 1080,
            fps: 30.0,
            codec: "h264".to_string(),
            has_audio: true,
            creation_time: None,
        }
    }

    fn plain_style() -> StyleOptions {
        StyleOptions {
            add_timestamps: false,
            add_border: false,
            add_shadow: false,
            border_color: [255, 255, 255, 255],
            border_width: 0,
            full_path: false,
        }
    }

    fn solid_thumb(index: usize, size: (u32, u32), color: [u8; 4]) -> TimedThumbnail {
        TimedThumbnail {
            index,
            image: RgbaImage::from_pixel(size.0, size.1, Rgba(color)),
            timestamp_seconds: index as f64 * 10.0,
        }
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00:00");
        assert_eq!(format_timestamp(61.5), "00:01:01");
        assert_eq!(format_timestamp(3661.0), "01:01:01");
        assert_eq!(format_timestamp(-5.0), "00:00:00");
    }

    #[test]
    fn test_canvas_matches_layout() {
        let layout = plan_layout(120.0, 1920, 1080, 1280, Density::M, CanvasAspect::Widescreen);
        let canvas = render_mosaic(&[], &layout, &meta(), &plain_style());
        assert_eq!(canvas.dimensions(), layout.canvas_size());
        // Background fills uncovered cells.
        assert_eq!(*canvas.get_pixel(0, 0), BACKGROUND);
    }

    #[test]
    fn test_first_row_lands_at_canvas_bottom() {
        let layout = MosaicLayout {
            rows: 2,
            cols: 2,
            thumb_width: 8,
            thumb_height: 8,
            thumb_count: 4,
            positions: vec![(0, 0), (1, 0), (0, 1), (1, 1)],
        };
        let thumbs = vec![
            solid_thumb(0, (8, 8), [255, 0, 0, 255]),
            solid_thumb(1, (8, 8), [0, 255, 0, 255]),
            solid_thumb(2, (8, 8), [0, 0, 255, 255]),
            solid_thumb(3, (8, 8), [255, 255, 0, 255]),
        ];
        let mut style = plain_style();
        style.add_timestamps = false;
        let mut tall_meta = meta();
        tall_meta.duration_seconds = 1.0;
        let canvas = render_mosaic(&thumbs, &layout, &tall_meta, &style);

        // Row 0 occupies the bottom half, row 1 the top half. The
        // footer strip covers the bottom 10% (1 px here), so sample
        // above it.
        assert_eq!(canvas.get_pixel(2, 12)[0], 255); // red, row 0 left
        assert_eq!(canvas.get_pixel(2, 2)[2], 255); // blue, row 1 left
    }

    #[test]
    fn test_mismatched_thumb_is_resized() {
        let layout = MosaicLayout {
            rows: 1,
            cols: 1,
            thumb_width: 16,
            thumb_height: 9,
            thumb_count: 1,
            positions: vec![(0, 0)],
        };
        let thumbs = vec![solid_thumb(0, (32, 18), [10, 200, 10, 255])];
        let canvas = render_mosaic(&thumbs, &layout, &meta(), &plain_style());
        assert_eq!(canvas.get_pixel(8, 4)[1], 200);
    }

    #[test]
    fn test_encode_round_trip_preserves_dimensions() {
        let layout = MosaicLayout {
            rows: 2,
            cols: 3,
            thumb_width: 10,
            thumb_height: 10,
            thumb_count: 6,
            positions: (0..6).map(|i| (i % 3, i / 3)).collect(),
        };
        let canvas = render_mosaic(&[], &layout, &meta(), &plain_style());

        for format in [OutputFormat::Png, OutputFormat::Jpeg] {
            let bytes = encode_canvas(&canvas, format, 0.8).unwrap();
            assert!(!bytes.is_empty());
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!(
                (decoded.width(), decoded.height()),
                layout.canvas_size(),
                "{format:?} round trip changed dimensions"
            );
        }
    }

    #[test]
    fn test_heic_requires_backend() {
        let canvas = RgbaImage::from_pixel(4, 4, BACKGROUND);
        assert!(matches!(
            encode_canvas(&canvas, OutputFormat::Heic, 0.8),
            Err(MediaError::UnsupportedOutputFormat(_))
        ));
    }

    #[test]
    fn test_mosaic_file_name() {
        assert_eq!(
            mosaic_file_name(DurationBucket::S, "trip", Density::M, OutputFormat::Heic),
            "S-trip-M.heic"
        );
    }

    #[test]
    fn test_versioning_probes_free_names() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("S-trip-M.png");

        // Free name passes through.
        assert_eq!(resolve_versioned(&target, false).unwrap(), target);

        std::fs::write(&target, b"x").unwrap();
        let v2 = resolve_versioned(&target, false).unwrap();
        assert_eq!(v2.file_name().unwrap(), "S-trip-M_v2.png");

        std::fs::write(&v2, b"x").unwrap();
        let v3 = resolve_versioned(&target, false).unwrap();
        assert_eq!(v3.file_name().unwrap(), "S-trip-M_v3.png");

        // Overwrite short-circuits.
        assert_eq!(resolve_versioned(&target, true).unwrap(), target);
    }

    #[test]
    fn test_predicted_path_with_bucket_folders() {
        let path = predicted_output_path(
            Path::new("/out"),
            &meta(),
            Density::M,
            OutputFormat::Jpeg,
            true,
        );
        assert_eq!(path, Path::new("/out/S/S-sample-M.jpg"));
    }
}
