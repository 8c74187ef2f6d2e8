//! Abstract video backend and its FFmpeg CLI implementation.
//!
//! The pipeline consumes assets only through [`VideoBackend`]; the
//! production implementation shells out to ffmpeg/ffprobe, and tests
//! substitute a deterministic mock.

use async_trait::async_trait;
use futures::future::join_all;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::preview::PreviewPlan;
use crate::probe::{probe_video, VideoMetadata};

/// Seek tolerance for frame decoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekTolerance {
    /// Frame-exact seeks.
    Exact,
    /// Accept the nearest decodable frame within this many seconds.
    Within(f64),
}

impl SeekTolerance {
    /// The ±2 s default used when accuracy is not requested.
    pub fn loose() -> Self {
        SeekTolerance::Within(2.0)
    }
}

/// One decoded frame with its actual (post-seek) timestamp.
pub struct DecodedFrame {
    pub requested_time: f64,
    pub actual_time: f64,
    pub image: RgbaImage,
}

/// Progress callback for exports, receiving a fraction in 0.0..=1.0.
pub type ExportProgress = Box<dyn Fn(f64) + Send + Sync + 'static>;

/// Abstract access to video assets.
#[async_trait]
pub trait VideoBackend: Send + Sync {
    /// Load duration, natural size, codec and creation time.
    async fn probe(&self, path: &Path) -> MediaResult<VideoMetadata>;

    /// Decode one frame per target time, concurrently. The result vec
    /// is in request order; individual entries may fail.
    async fn decode_frames(
        &self,
        path: &Path,
        times: &[f64],
        tolerance: SeekTolerance,
        target_size: Option<(u32, u32)>,
        cancel: &CancelToken,
    ) -> Vec<MediaResult<DecodedFrame>>;

    /// Export a preview composition to `output` (.mp4).
    async fn export_preview(
        &self,
        source: &Path,
        plan: &PreviewPlan,
        output: &Path,
        cancel: &CancelToken,
        on_progress: ExportProgress,
    ) -> MediaResult<()>;

    /// Concatenate finished clips into one video at the given size.
    async fn concat_files(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        size: (u32, u32),
        preset: &str,
        cancel: &CancelToken,
    ) -> MediaResult<()>;

    /// Encode an already-rendered still (PNG bytes) into a format the
    /// raster library cannot write itself (HEIC).
    async fn encode_still(&self, png: &[u8], output: &Path, quality: f32) -> MediaResult<()>;
}

/// Production backend shelling out to the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }

    /// Decode a single frame via a PNG pipe.
    ///
    /// `-copyts` keeps source timestamps flowing into the filter graph
    /// so `showinfo` reports the decoded frame's real position.
    async fn decode_one(
        &self,
        path: &Path,
        time: f64,
        tolerance: SeekTolerance,
        target_size: Option<(u32, u32)>,
        cancel: &CancelToken,
    ) -> MediaResult<DecodedFrame> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let mut args: Vec<String> = vec!["-v".into(), "info".into(), "-nostats".into()];
        if !matches!(tolerance, SeekTolerance::Exact) {
            args.push("-noaccurate_seek".into());
        }
        args.extend(["-ss".into(), format!("{time:.3}")]);
        args.extend(["-i".into(), path.to_string_lossy().into_owned()]);
        args.push("-copyts".into());

        let mut vf = "showinfo".to_string();
        if let Some((w, h)) = target_size {
            vf.push_str(&format!(",scale={w}:{h}:flags=bilinear"));
        }
        args.extend([
            "-map".into(),
            "0:v:0".into(),
            "-frames:v".into(),
            "1".into(),
            "-vf".into(),
            vf,
            "-f".into(),
            "image2pipe".into(),
            "-c:v".into(),
            "png".into(),
            "pipe:1".into(),
        ]);

        debug!("Decoding frame at {:.3}s from {}", time, path.display());

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::select! {
            out = child.wait_with_output() => out?,
            _ = cancel.cancelled() => return Err(MediaError::Cancelled),
        };

        if !output.status.success() || output.stdout.is_empty() {
            return Err(MediaError::ffmpeg_failed(
                format!("frame decode at {time:.3}s failed"),
                Some(String::from_utf8_lossy(&output.stderr).into_owned()),
                output.status.code(),
            ));
        }

        let image = image::load_from_memory_with_format(&output.stdout, image::ImageFormat::Png)?
            .to_rgba8();

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut actual_time = parse_pts_time(&stderr).unwrap_or(time);
        if let SeekTolerance::Within(tol) = tolerance {
            if (actual_time - time).abs() > tol {
                debug!(
                    "decoded frame drifted {:.3}s from request, reporting requested time",
                    (actual_time - time).abs()
                );
                actual_time = time;
            }
        }

        Ok(DecodedFrame {
            requested_time: time,
            actual_time,
            image,
        })
    }

    /// Build the trim/speed/concat filter graph for a preview plan.
    fn preview_filter(plan: &PreviewPlan) -> String {
        let mut filter = String::new();
        for (i, seg) in plan.segments.iter().enumerate() {
            filter.push_str(&format!(
                "[0:v]trim=start={:.3}:duration={:.3},setpts=(PTS-STARTPTS)/{}[v{}];",
                seg.start, seg.duration, plan.speed, i
            ));
            if plan.with_audio {
                filter.push_str(&format!(
                    "[0:a]atrim=start={:.3}:duration={:.3},asetpts=PTS-STARTPTS,atempo={}[a{}];",
                    seg.start, seg.duration, plan.speed, i
                ));
            }
        }
        for i in 0..plan.segments.len() {
            filter.push_str(&format!("[v{i}]"));
            if plan.with_audio {
                filter.push_str(&format!("[a{i}]"));
            }
        }
        filter.push_str(&format!(
            "concat=n={}:v=1:a={}[outv]",
            plan.segments.len(),
            if plan.with_audio { 1 } else { 0 }
        ));
        if plan.with_audio {
            filter.push_str("[outa]");
        }
        filter
    }
}

#[async_trait]
impl VideoBackend for FfmpegBackend {
    async fn probe(&self, path: &Path) -> MediaResult<VideoMetadata> {
        probe_video(path).await
    }

    async fn decode_frames(
        &self,
        path: &Path,
        times: &[f64],
        tolerance: SeekTolerance,
        target_size: Option<(u32, u32)>,
        cancel: &CancelToken,
    ) -> Vec<MediaResult<DecodedFrame>> {
        let futures: Vec<_> = times
            .iter()
            .map(|&t| self.decode_one(path, t, tolerance, target_size, cancel))
            .collect();
        join_all(futures).await
    }

    async fn export_preview(
        &self,
        source: &Path,
        plan: &PreviewPlan,
        output: &Path,
        cancel: &CancelToken,
        on_progress: ExportProgress,
    ) -> MediaResult<()> {
        if plan.segments.is_empty() {
            return Err(MediaError::composition_failure("empty preview plan"));
        }

        let mut cmd = FfmpegCommand::new(source, output)
            .with_progress()
            .filter_complex(Self::preview_filter(plan))
            .output_args(["-map", "[outv]"]);
        if plan.with_audio {
            cmd = cmd.output_args(["-map", "[outa]"]).audio_codec("aac");
        }
        let cmd = cmd
            .output_args(["-r".to_string(), format!("{:.2}", plan.frame_rate)])
            .video_codec("libx264")
            .preset(&plan.preset)
            .output_args(["-pix_fmt", "yuv420p", "-movflags", "+faststart"]);

        let total_ms = (plan.output_duration() * 1000.0) as i64;
        let result = FfmpegRunner::new()
            .with_cancel(cancel.clone())
            .run_with_progress(&cmd, move |p| on_progress(p.fraction(total_ms)))
            .await;

        match result {
            Err(MediaError::FfmpegFailed {
                message,
                stderr,
                exit_code,
            }) => Err(MediaError::ExportFailure(format!(
                "{message} (exit {exit_code:?}): {}",
                stderr.unwrap_or_default()
            ))),
            other => other,
        }
    }

    async fn concat_files(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        size: (u32, u32),
        preset: &str,
        cancel: &CancelToken,
    ) -> MediaResult<()> {
        if inputs.is_empty() {
            return Err(MediaError::composition_failure("nothing to concatenate"));
        }

        let dir = tempfile::tempdir()?;
        let list_path = dir.path().join("concat.txt");
        let mut list = String::new();
        for input in inputs {
            let escaped = input.to_string_lossy().replace('\'', r"'\''");
            list.push_str(&format!("file '{escaped}'\n"));
        }
        tokio::fs::write(&list_path, list).await?;

        let (w, h) = size;
        let scale = format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"
        );

        let cmd = FfmpegCommand::new(&list_path, output)
            .input_arg("-f")
            .input_arg("concat")
            .input_arg("-safe")
            .input_arg("0")
            .video_filter(scale)
            .video_codec("libx264")
            .preset(preset)
            .audio_codec("aac")
            .output_args(["-pix_fmt", "yuv420p"]);

        FfmpegRunner::new().with_cancel(cancel.clone()).run(&cmd).await
    }

    async fn encode_still(&self, png: &[u8], output: &Path, quality: f32) -> MediaResult<()> {
        let dir = tempfile::tempdir()?;
        let src = dir.path().join("still.png");
        tokio::fs::write(&src, png).await?;

        // Map 0..1 quality onto the x265 CRF range, better is lower.
        let crf = (51.0 * (1.0 - f64::from(quality.clamp(0.0, 1.0)))).round() as u32;

        let cmd = FfmpegCommand::new(&src, output)
            .video_codec("libx265")
            .output_args(["-crf".to_string(), crf.to_string()])
            .output_args(["-pix_fmt", "yuv420p", "-frames:v", "1"]);

        FfmpegRunner::new().run(&cmd).await.map_err(|e| {
            warn!("HEIC encode failed: {e}");
            MediaError::UnsupportedOutputFormat(format!(
                "heic (ffmpeg could not encode: {e})"
            ))
        })
    }
}

/// Pull the last `pts_time:` value out of ffmpeg showinfo output.
fn parse_pts_time(stderr: &str) -> Option<f64> {
    let mut last = None;
    for line in stderr.lines() {
        if let Some(idx) = line.find("pts_time:") {
            let rest = &line[idx + "pts_time:".len()..];
            let token: String = rest
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            if let Ok(v) = token.parse::<f64>() {
                last = Some(v);
            }
        }
    }
    last
}
