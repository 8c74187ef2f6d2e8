//! Job configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::density::Density;

/// Default mosaic canvas width in pixels.
pub const DEFAULT_WIDTH: u32 = 5120;
/// Default target preview length in seconds.
pub const DEFAULT_PREVIEW_DURATION: f64 = 60.0;
/// Default encoder quality for lossy formats.
pub const DEFAULT_COMPRESSION_QUALITY: f32 = 0.8;
/// Default export preset handed to the video backend.
pub const DEFAULT_EXPORT_PRESET: &str = "medium";
/// Default summary video frame size.
pub const DEFAULT_SUMMARY_SIZE: (u32, u32) = (1920, 1080);

/// Invalid configuration, rejected before a job starts.
#[derive(Debug, Clone, Error)]
#[error("invalid configuration: {reason}")]
pub struct ConfigError {
    pub reason: String,
}

impl ConfigError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Canvas aspect ratio for the mosaic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CanvasAspect {
    /// 16:9
    #[default]
    Widescreen,
    /// 1:1
    Square,
    /// 9:16
    Vertical,
}

impl CanvasAspect {
    /// Width divided by height.
    pub fn ratio(&self) -> f64 {
        match self {
            CanvasAspect::Widescreen => 16.0 / 9.0,
            CanvasAspect::Square => 1.0,
            CanvasAspect::Vertical => 9.0 / 16.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CanvasAspect::Widescreen => "16:9",
            CanvasAspect::Square => "1:1",
            CanvasAspect::Vertical => "9:16",
        }
    }
}

impl fmt::Display for CanvasAspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CanvasAspect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "16:9" => Ok(CanvasAspect::Widescreen),
            "1:1" => Ok(CanvasAspect::Square),
            "9:16" => Ok(CanvasAspect::Vertical),
            other => Err(format!("unknown aspect ratio: {other}")),
        }
    }
}

/// Output image format for mosaics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Heic,
    Jpeg,
    Png,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Heic => "heic",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    /// Whether the format takes a quality parameter.
    pub fn is_lossy(&self) -> bool {
        !matches!(self, OutputFormat::Png)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// What the pipeline produces for each work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Composite mosaic image per source.
    #[default]
    Mosaic,
    /// Fast-cut preview clip per source.
    Preview,
}

/// Knobs for the extraction and encoding machinery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Maximum work items processed concurrently.
    pub max_concurrency: usize,
    /// Frames decoded per extraction batch.
    pub batch_size: usize,
    /// Encoder quality for lossy formats, 0.0..=1.0.
    pub compression_quality: f32,
    /// Demand frame-exact seeks instead of the ±2 s tolerance.
    pub accurate_timestamps: bool,
    /// Opaque preset string forwarded to the export backend.
    pub video_export_preset: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            batch_size: 8,
            compression_quality: DEFAULT_COMPRESSION_QUALITY,
            accurate_timestamps: false,
            video_export_preset: DEFAULT_EXPORT_PRESET.to_string(),
        }
    }
}

/// User-provided configuration, captured at job start and immutable for
/// the duration of the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Target mosaic canvas width in pixels.
    pub width: u32,
    /// Thumbnail density token.
    pub density: Density,
    /// Canvas aspect ratio.
    pub aspect_ratio: CanvasAspect,
    /// Output image format.
    pub format: OutputFormat,
    /// Skip sources shorter than this many seconds.
    pub min_duration: f64,
    /// Target preview length in seconds.
    pub preview_duration: f64,
    /// Density token for preview extraction.
    pub preview_density: Density,
    /// What to produce per work item.
    pub kind: JobKind,
    /// Replace existing outputs instead of versioning or skipping.
    pub overwrite: bool,
    /// Collect outputs under the walk root instead of next to each source.
    pub save_at_root: bool,
    /// Nest outputs in per-bucket folders.
    pub separate_folders: bool,
    /// Stamp the full source path in the footer instead of the file name.
    pub add_full_path: bool,
    /// Stamp each thumbnail with its timestamp.
    pub add_timestamps: bool,
    /// Stroke each thumbnail.
    pub add_border: bool,
    /// Drop-shadow each thumbnail.
    pub add_shadow: bool,
    /// Border stroke color, RGBA.
    pub border_color: [u8; 4],
    /// Border stroke width in pixels.
    pub border_width: u32,
    /// Concatenate produced previews into a single summary video.
    pub summary: bool,
    /// Summary video frame size.
    pub summary_size: (u32, u32),
    /// Extraction and encoding knobs.
    pub generator: GeneratorConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            density: Density::default(),
            aspect_ratio: CanvasAspect::default(),
            format: OutputFormat::default(),
            min_duration: 0.0,
            preview_duration: DEFAULT_PREVIEW_DURATION,
            preview_density: Density::default(),
            kind: JobKind::default(),
            overwrite: false,
            save_at_root: false,
            separate_folders: false,
            add_full_path: false,
            add_timestamps: true,
            add_border: false,
            add_shadow: false,
            border_color: [255, 255, 255, 255],
            border_width: 2,
            summary: false,
            summary_size: DEFAULT_SUMMARY_SIZE,
            generator: GeneratorConfig::default(),
        }
    }
}

impl ProcessingConfig {
    /// Validate before a job starts. All failures here surface to the
    /// caller; nothing is dispatched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 {
            return Err(ConfigError::new("width must be positive"));
        }
        if self.min_duration < 0.0 || !self.min_duration.is_finite() {
            return Err(ConfigError::new("min_duration must be finite and >= 0"));
        }
        if self.preview_duration <= 0.0 || !self.preview_duration.is_finite() {
            return Err(ConfigError::new("preview_duration must be positive"));
        }
        if self.generator.max_concurrency == 0 {
            return Err(ConfigError::new("max_concurrency must be >= 1"));
        }
        if self.generator.batch_size == 0 {
            return Err(ConfigError::new("batch_size must be >= 1"));
        }
        let q = self.generator.compression_quality;
        if !(0.0..=1.0).contains(&q) {
            return Err(ConfigError::new("compression_quality must be in [0, 1]"));
        }
        if self.summary_size.0 == 0 || self.summary_size.1 == 0 {
            return Err(ConfigError::new("summary_size must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ProcessingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_width() {
        let config = ProcessingConfig {
            width: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_quality() {
        let mut config = ProcessingConfig::default();
        config.generator.compression_quality = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut config = ProcessingConfig::default();
        config.generator.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_aspect_ratio_values() {
        assert!((CanvasAspect::Widescreen.ratio() - 16.0 / 9.0).abs() < 1e-9);
        assert!((CanvasAspect::Square.ratio() - 1.0).abs() < 1e-9);
        assert!((CanvasAspect::Vertical.ratio() - 9.0 / 16.0).abs() < 1e-9);
        assert_eq!("9:16".parse::<CanvasAspect>().unwrap(), CanvasAspect::Vertical);
    }
}
