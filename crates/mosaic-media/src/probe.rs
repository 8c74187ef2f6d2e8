//! FFprobe asset metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use mosaic_models::DurationBucket;

use crate::error::{MediaError, MediaResult};

/// Immutable description of a video asset, created by probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Absolute location of the source file
    pub file_path: PathBuf,
    /// Duration in seconds
    pub duration_seconds: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Native frame rate (fps)
    pub fps: f64,
    /// Video codec name
    pub codec: String,
    /// Whether the asset carries an audio track
    pub has_audio: bool,
    /// Recording wall-clock time, when the container knows it
    pub creation_time: Option<DateTime<Utc>>,
}

impl VideoMetadata {
    /// Duration band tag used for output grouping.
    pub fn bucket(&self) -> DurationBucket {
        DurationBucket::from_duration(self.duration_seconds)
    }

    /// Width over height; falls back to 16:9 for degenerate streams.
    pub fn aspect(&self) -> f64 {
        if self.height > 0 {
            self.width.max(1) as f64 / self.height as f64
        } else {
            16.0 / 9.0
        }
    }

    /// File stem used in output names.
    pub fn stem(&self) -> String {
        self.file_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string())
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    tags: Option<FfprobeTags>,
}

#[derive(Debug, Deserialize)]
struct FfprobeTags {
    creation_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a video file for metadata.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoMetadata> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::InputNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    let video_stream = match probe.streams.iter().find(|s| s.codec_type == "video") {
        Some(stream) => stream,
        None if has_audio => return Err(MediaError::NoVideoTrack(path.to_path_buf())),
        None => return Err(MediaError::NoVideoOrAudioTrack(path.to_path_buf())),
    };

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let fps = video_stream
        .avg_frame_rate
        .as_ref()
        .or(video_stream.r_frame_rate.as_ref())
        .and_then(|r| parse_frame_rate(r))
        .unwrap_or(30.0);

    let creation_time = probe
        .format
        .tags
        .as_ref()
        .and_then(|t| t.creation_time.as_ref())
        .and_then(|s| parse_creation_time(s));

    Ok(VideoMetadata {
        file_path: path.to_path_buf(),
        duration_seconds: duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        has_audio,
        creation_time,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
    }
    s.parse().ok()
}

/// Parse a container creation_time tag (RFC 3339, with or without
/// fractional seconds).
fn parse_creation_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("30/0").is_none());
    }

    #[test]
    fn test_parse_creation_time() {
        let parsed = parse_creation_time("2024-03-01T12:30:00.000000Z").unwrap();
        assert_eq!(parsed.timestamp(), 1_709_296_200);
        assert!(parse_creation_time("not a date").is_none());
    }

    #[test]
    fn test_bucket_derivation() {
        let meta = VideoMetadata {
            file_path: PathBuf::from("/videos/clip.mp4"),
            duration_seconds: 120.0,
            width: 1920,
            height: 1080,
            fps: 30.0,
            codec: "h264".to_string(),
            has_audio: true,
            creation_time: None,
        };
        assert_eq!(meta.bucket(), DurationBucket::S);
        assert!((meta.aspect() - 16.0 / 9.0).abs() < 0.01);
        assert_eq!(meta.stem(), "clip");
    }

    #[test]
    fn test_missing_file_is_input_not_found() {
        let err = tokio_test_block(probe_video("/definitely/not/here.mp4"));
        assert!(matches!(err, Err(MediaError::InputNotFound(_))));
    }

    fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }
}
