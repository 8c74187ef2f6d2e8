//! Preview composition planning.
//!
//! A preview is a short fast-cut clip: N time-spread windows of the
//! source, concatenated and played back at double speed with audio
//! retained.

use serde::{Deserialize, Serialize};

use mosaic_models::Density;

use crate::error::{MediaError, MediaResult};
use crate::probe::VideoMetadata;

/// Marker token carried in preview file names; discovery skips files
/// containing it.
pub const PREVIEW_MARKER: &str = "amprv";

/// Playback speed-up applied to every inserted segment.
pub const PREVIEW_SPEED: f64 = 2.0;

/// Upper bound on the exported frame rate.
const MAX_FRAME_RATE: f64 = 120.0;

/// Duration band for preview sampling. Boundaries are strict
/// less-than: a source of exactly 300 s falls into the medium band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewBand {
    Short,
    Medium,
    Long,
}

impl PreviewBand {
    pub fn from_duration(seconds: f64) -> Self {
        if seconds < 300.0 {
            PreviewBand::Short
        } else if seconds < 1200.0 {
            PreviewBand::Medium
        } else {
            PreviewBand::Long
        }
    }

    /// Base extraction rate in windows per source minute.
    pub fn extracts_per_minute(&self) -> f64 {
        match self {
            PreviewBand::Short => 8.0,
            PreviewBand::Medium => 3.0,
            PreviewBand::Long => 0.5,
        }
    }

    /// Band ceiling on the produced preview length in seconds.
    pub fn target_duration(&self) -> f64 {
        match self {
            PreviewBand::Short => 30.0,
            PreviewBand::Medium => 60.0,
            PreviewBand::Long => 90.0,
        }
    }
}

/// One source window inserted into the composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewSegment {
    /// Source in-point in seconds.
    pub start: f64,
    /// Source window length in seconds (pre-speed-up).
    pub duration: f64,
}

/// Complete recipe handed to the export backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewPlan {
    pub segments: Vec<PreviewSegment>,
    /// Playback speed multiplier (2.0 = half the source duration).
    pub speed: f64,
    /// Output frame rate, matched to the speed-up.
    pub frame_rate: f64,
    /// Whether to carry the audio lane through the concat.
    pub with_audio: bool,
    /// Encoder preset forwarded verbatim.
    pub preset: String,
}

impl PreviewPlan {
    /// Expected output duration after the speed-up.
    pub fn output_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum::<f64>() / self.speed
    }
}

/// File name for a preview: `<stem>-amprv-<density>.mp4`.
pub fn preview_file_name(stem: &str, density: Density) -> String {
    format!("{stem}-{PREVIEW_MARKER}-{density}.mp4")
}

/// Plan the preview composition for one source.
///
/// The band rate is divided by the density factor; the extract window
/// is sized so the sped-up output lands on the target duration, and
/// windows are spread evenly from the start of the source to the last
/// position that still fits a full window.
pub fn plan_preview(
    metadata: &VideoMetadata,
    preview_duration: f64,
    density: Density,
    preset: &str,
) -> MediaResult<PreviewPlan> {
    let duration = metadata.duration_seconds;
    if duration <= 0.0 {
        return Err(MediaError::NoVideoOrAudioTrack(metadata.file_path.clone()));
    }

    let band = PreviewBand::from_duration(duration);
    let target = preview_duration.min(band.target_duration());
    let rate = band.extracts_per_minute() / density.factor();
    let extract_count = ((duration / 60.0 * rate).ceil() as usize).max(1);

    // Each window is consumed at PREVIEW_SPEED, so the source side is
    // scaled up to keep the produced clip at the target length.
    let output_share = (target / extract_count as f64).min(duration / extract_count as f64);
    let segment_duration = (output_share * PREVIEW_SPEED).min(duration / extract_count as f64);

    let segments = if extract_count == 1 {
        vec![PreviewSegment {
            start: 0.0,
            duration: segment_duration.min(duration),
        }]
    } else {
        let span = duration - segment_duration;
        (0..extract_count)
            .map(|i| PreviewSegment {
                start: i as f64 * span / (extract_count - 1) as f64,
                duration: segment_duration,
            })
            .collect()
    };

    let frame_rate = (metadata.fps * PREVIEW_SPEED).min(MAX_FRAME_RATE);

    Ok(PreviewPlan {
        segments,
        speed: PREVIEW_SPEED,
        frame_rate,
        with_audio: metadata.has_audio,
        preset: preset.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn meta(duration: f64) -> VideoMetadata {
        VideoMetadata {
            file_path: PathBuf::from("/videos/source.mp4"),
            duration_seconds: duration,
            width: 1920,
            height: 1080,
            fps: 30.0,
            codec: "h264".to_string(),
            has_audio: true,
            creation_time: None,
        }
    }

    #[test]
    fn test_band_boundaries_are_strict() {
        assert_eq!(PreviewBand::from_duration(299.9), PreviewBand::Short);
        assert_eq!(PreviewBand::from_duration(300.0), PreviewBand::Medium);
        assert_eq!(PreviewBand::from_duration(1199.9), PreviewBand::Medium);
        assert_eq!(PreviewBand::from_duration(1200.0), PreviewBand::Long);
    }

    #[test]
    fn test_medium_band_extract_count() {
        // 600 s at medium rate 3.0 over density M (1.5): 10 min * 2/min.
        let plan = plan_preview(&meta(600.0), 60.0, Density::M, "medium").unwrap();
        assert_eq!(plan.segments.len(), 20);
        // Output lands on the 60 s target once the speed-up is applied.
        assert!((plan.output_duration() - 60.0).abs() < 1.0);
        assert!(plan.with_audio);
    }

    #[test]
    fn test_segments_are_spread_and_in_bounds() {
        let plan = plan_preview(&meta(600.0), 60.0, Density::M, "medium").unwrap();
        let first = plan.segments.first().unwrap();
        let last = plan.segments.last().unwrap();
        assert!(first.start.abs() < f64::EPSILON);
        assert!(last.start + last.duration <= 600.0 + 0.001);
        for pair in plan.segments.windows(2) {
            assert!(pair[1].start > pair[0].start);
        }
    }

    #[test]
    fn test_band_target_overrides_longer_request() {
        // Short band caps at 30 s even when the caller asks for 60.
        let plan = plan_preview(&meta(120.0), 60.0, Density::S, "medium").unwrap();
        assert!(plan.output_duration() <= 30.0 + 0.5);
    }

    #[test]
    fn test_frame_rate_doubles_and_caps() {
        let plan = plan_preview(&meta(600.0), 60.0, Density::M, "fast").unwrap();
        assert!((plan.frame_rate - 60.0).abs() < 0.01);

        let mut hfr = meta(600.0);
        hfr.fps = 90.0;
        let plan = plan_preview(&hfr, 60.0, Density::M, "fast").unwrap();
        assert!((plan.frame_rate - 120.0).abs() < 0.01);
    }

    #[test]
    fn test_preview_file_name() {
        assert_eq!(
            preview_file_name("holiday", Density::M),
            "holiday-amprv-M.mp4"
        );
    }

    #[test]
    fn test_zero_duration_is_rejected() {
        assert!(matches!(
            plan_preview(&meta(0.0), 60.0, Density::M, "fast"),
            Err(MediaError::NoVideoOrAudioTrack(_))
        ));
    }
}
