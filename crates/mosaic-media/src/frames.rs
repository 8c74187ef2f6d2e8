//! Batched, tolerant thumbnail extraction.

use image::RgbaImage;
use tracing::{debug, warn};

use crate::backend::{SeekTolerance, VideoBackend};
use crate::cancel::CancelToken;
use crate::error::{MediaError, MediaResult};
use crate::probe::VideoMetadata;

/// One extracted frame, placed in the layout by `index`.
pub struct TimedThumbnail {
    /// 0-based position in the layout.
    pub index: usize,
    pub image: RgbaImage,
    /// The actual decoded time, not the requested one.
    pub timestamp_seconds: f64,
}

/// Extraction parameters for one work item.
pub struct ExtractionRequest {
    /// Number of frames requested.
    pub count: usize,
    /// Decode at this pixel size; `None` keeps source resolution
    /// (preview-style extraction).
    pub target_size: Option<(u32, u32)>,
    /// Demand frame-exact seeks.
    pub accurate: bool,
    /// Frames decoded per concurrent batch.
    pub batch_size: usize,
}

/// Evenly spaced target times on `[0, duration)` with step
/// `duration / count`.
pub fn target_times(duration_seconds: f64, count: usize) -> Vec<f64> {
    let step = duration_seconds / count.max(1) as f64;
    (0..count).map(|i| i as f64 * step).collect()
}

/// Extract frames for a work item.
///
/// Target times are chunked into batches of `batch_size`; each batch is
/// decoded concurrently by the backend, and the cancellation token is
/// honoured between batches. Per-frame failures are logged and dropped;
/// the call fails only when every decode failed.
pub async fn extract_thumbnails(
    backend: &dyn VideoBackend,
    metadata: &VideoMetadata,
    request: &ExtractionRequest,
    cancel: &CancelToken,
    mut on_progress: impl FnMut(usize, usize),
) -> MediaResult<Vec<TimedThumbnail>> {
    let times = target_times(metadata.duration_seconds, request.count);
    let tolerance = if request.accurate {
        SeekTolerance::Exact
    } else {
        SeekTolerance::loose()
    };

    let total = times.len();
    let mut thumbnails = Vec::with_capacity(total);
    let mut failed = 0usize;
    let mut done = 0usize;

    for (batch_index, batch) in times.chunks(request.batch_size.max(1)).enumerate() {
        if cancel.is_cancelled() {
            debug!("extraction cancelled after {} frames", done);
            return Err(MediaError::Cancelled);
        }

        let base = batch_index * request.batch_size.max(1);
        let results = backend
            .decode_frames(
                &metadata.file_path,
                batch,
                tolerance,
                request.target_size,
                cancel,
            )
            .await;

        for (offset, result) in results.into_iter().enumerate() {
            done += 1;
            match result {
                Ok(frame) => thumbnails.push(TimedThumbnail {
                    index: base + offset,
                    image: frame.image,
                    timestamp_seconds: frame.actual_time,
                }),
                Err(MediaError::Cancelled) => return Err(MediaError::Cancelled),
                Err(e) => {
                    failed += 1;
                    warn!(
                        file = %metadata.file_path.display(),
                        frame = base + offset,
                        "frame decode failed: {e}"
                    );
                }
            }
        }

        on_progress(done, total);
    }

    if thumbnails.is_empty() && total > 0 {
        return Err(MediaError::PartialExtractionFailure {
            successful: 0,
            failed,
        });
    }

    thumbnails.sort_by_key(|t| t.index);
    Ok(thumbnails)
}

/// Convenience: extraction sized for a planned layout.
pub fn layout_request(
    count: u32,
    thumb_size: (u32, u32),
    accurate: bool,
    batch_size: usize,
) -> ExtractionRequest {
    ExtractionRequest {
        count: count as usize,
        target_size: Some(thumb_size),
        accurate,
        batch_size,
    }
}
