//! FFmpeg CLI wrapper for the mosaic pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with cancellation
//! - Asset probing into [`probe::VideoMetadata`]
//! - The abstract [`backend::VideoBackend`] and its CLI implementation
//! - Batched, tolerant thumbnail extraction
//! - Mosaic composition, stamping and atomic publishing
//! - Preview composition planning

pub mod backend;
pub mod cancel;
pub mod command;
pub mod compose;
pub mod error;
pub mod font;
pub mod frames;
pub mod fs_utils;
pub mod preview;
pub mod probe;

pub use backend::{DecodedFrame, ExportProgress, FfmpegBackend, SeekTolerance, VideoBackend};
pub use cancel::{cancel_pair, CancelSource, CancelToken};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegProgress, FfmpegRunner};
pub use compose::{
    encode_canvas, format_timestamp, mosaic_file_name, predicted_output_path, render_mosaic,
    resolve_versioned, write_mosaic, StyleOptions,
};
pub use error::{MediaError, MediaResult};
pub use frames::{extract_thumbnails, layout_request, target_times, ExtractionRequest, TimedThumbnail};
pub use preview::{plan_preview, preview_file_name, PreviewBand, PreviewPlan, PreviewSegment, PREVIEW_MARKER};
pub use probe::{probe_video, VideoMetadata};
