//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while probing, decoding, compositing or
/// exporting video assets.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("input not found: {0}")]
    InputNotFound(PathBuf),

    #[error("not a video file: {0}")]
    NotAVideoFile(PathBuf),

    #[error("no video track in {0}")]
    NoVideoTrack(PathBuf),

    #[error("no video or audio track in {0}")]
    NoVideoOrAudioTrack(PathBuf),

    #[error("frame extraction failed entirely: {successful} succeeded, {failed} failed")]
    PartialExtractionFailure { successful: usize, failed: usize },

    #[error("export failed: {0}")]
    ExportFailure(String),

    #[error("composition failed: {0}")]
    CompositionFailure(String),

    #[error("unable to save mosaic: {0}")]
    UnableToSaveMosaic(String),

    #[error("unsupported output format: {0}")]
    UnsupportedOutputFormat(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("image encoding error: {0}")]
    ImageEncode(#[from] image::ImageError),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an export failure error.
    pub fn export_failure(message: impl Into<String>) -> Self {
        Self::ExportFailure(message.into())
    }

    /// Create a composition failure error.
    pub fn composition_failure(message: impl Into<String>) -> Self {
        Self::CompositionFailure(message.into())
    }

    /// Whether the error is the cooperative-cancellation sentinel.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled)
    }
}
