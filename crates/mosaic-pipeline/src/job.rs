//! The job orchestrator.
//!
//! Owns the worker pool, streams discovered inputs through the
//! per-item stage sequence, routes progress into the tracker, writes
//! produced artifacts into the catalog and honours cancellation at
//! every stage boundary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mosaic_catalog::{content_hash, Catalog, CatalogEntry};
use mosaic_media::{
    cancel_pair, extract_thumbnails, fs_utils::move_file, layout_request, plan_preview,
    predicted_output_path, preview_file_name, render_mosaic, resolve_versioned, write_mosaic,
    CancelSource, CancelToken, StyleOptions, VideoBackend, VideoMetadata, PREVIEW_MARKER,
};
use mosaic_models::{plan_layout, FileProgress, FileStage, JobKind, ProcessingConfig};

use crate::discovery::{discover, WorkItem};
use crate::error::{PipelineError, PipelineResult};
use crate::progress::{ProgressCallback, ProgressTracker};

/// Final accounting for one job.
#[derive(Debug, Clone, Default)]
pub struct JobSummary {
    pub total: u64,
    pub completed: u64,
    pub skipped: u64,
    pub errored: u64,
    pub cancelled_items: u64,
    /// Whether the job-wide token was raised.
    pub was_cancelled: bool,
    /// Paths of artifacts produced by this run.
    pub outputs: Vec<PathBuf>,
}

/// Cancellation surface handed to the caller.
#[derive(Clone)]
pub struct JobHandle {
    job: CancelSource,
    items: Arc<Mutex<HashMap<String, CancelSource>>>,
}

impl JobHandle {
    /// Cancel the whole job: no new items start, in-flight items abort
    /// at their next stage boundary.
    pub fn cancel(&self) {
        self.job.cancel();
        for source in self.items.lock().expect("item registry poisoned").values() {
            source.cancel();
        }
    }

    /// Cancel one in-flight item by file name. Returns whether the
    /// item was active.
    pub fn cancel_file(&self, filename: &str) -> bool {
        match self
            .items
            .lock()
            .expect("item registry poisoned")
            .get(filename)
        {
            Some(source) => {
                source.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.job.is_cancelled()
    }
}

enum ItemOutcome {
    Completed(PathBuf),
    Skipped,
    Errored,
    Cancelled,
}

/// One configured job over a backend and catalog.
pub struct Pipeline {
    config: Arc<ProcessingConfig>,
    backend: Arc<dyn VideoBackend>,
    catalog: Catalog,
    handle: JobHandle,
    job_token: CancelToken,
}

impl Pipeline {
    /// Validate the configuration and set up the job scaffolding.
    pub fn new(
        config: ProcessingConfig,
        backend: Arc<dyn VideoBackend>,
        catalog: Catalog,
    ) -> PipelineResult<Self> {
        config.validate()?;
        let (job, job_token) = cancel_pair();
        Ok(Self {
            config: Arc::new(config),
            backend,
            catalog,
            handle: JobHandle {
                job,
                items: Arc::new(Mutex::new(HashMap::new())),
            },
            job_token,
        })
    }

    /// The cancellation handle for this job.
    pub fn handle(&self) -> JobHandle {
        self.handle.clone()
    }

    /// Run the job over `input`, reporting through `on_progress`.
    ///
    /// The callback is invoked from a single dispatcher task for the
    /// whole job, never concurrently with itself.
    pub async fn run_job(
        &self,
        input: &Path,
        on_progress: ProgressCallback,
    ) -> PipelineResult<JobSummary> {
        let (tracker, dispatcher) = ProgressTracker::new(on_progress);
        let result = self.run_inner(input, &tracker).await;
        tracker.finish();
        drop(tracker);
        let _ = dispatcher.await;
        result
    }

    async fn run_inner(
        &self,
        input: &Path,
        tracker: &ProgressTracker,
    ) -> PipelineResult<JobSummary> {
        let discovery_tracker = tracker.clone();
        let discovered = discover(
            input,
            self.config.width,
            self.config.save_at_root,
            &self.job_token,
            move |n| discovery_tracker.discovery(n),
        )
        .await?;

        let with_summary = self.config.summary
            && self.config.kind == JobKind::Preview
            && !discovered.single_file
            && !discovered.items.is_empty();
        let total = discovered.items.len() as u64 + u64::from(with_summary);
        tracker.set_total(total);
        info!(
            items = discovered.items.len(),
            summary = with_summary,
            "starting job over {}",
            input.display()
        );

        let semaphore = Arc::new(Semaphore::new(self.config.generator.max_concurrency));
        let mut handles = Vec::new();
        let mut summary = JobSummary {
            total,
            ..Default::default()
        };

        for item in discovered.items {
            if self.job_token.is_cancelled() {
                tracker.file(FileProgress::new(item.filename()).cancelled());
                summary.cancelled_items += 1;
                continue;
            }

            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
                _ = self.job_token.cancelled() => {
                    tracker.file(FileProgress::new(item.filename()).cancelled());
                    summary.cancelled_items += 1;
                    continue;
                }
            };

            let filename = item.filename();
            let (item_source, item_token) = cancel_pair();
            if self.job_token.is_cancelled() {
                item_source.cancel();
            }
            self.handle
                .items
                .lock()
                .expect("item registry poisoned")
                .insert(filename.clone(), item_source);

            let backend = Arc::clone(&self.backend);
            let catalog = self.catalog.clone();
            let config = Arc::clone(&self.config);
            let item_tracker = tracker.clone();
            let registry = Arc::clone(&self.handle.items);

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = process_item(
                    backend,
                    catalog,
                    config,
                    item_tracker,
                    item,
                    item_token,
                )
                .await;
                registry
                    .lock()
                    .expect("item registry poisoned")
                    .remove(&filename);
                outcome
            }));
        }

        let mut item_outputs = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(ItemOutcome::Completed(path)) => {
                    summary.completed += 1;
                    item_outputs.push(path.clone());
                    summary.outputs.push(path);
                }
                Ok(ItemOutcome::Skipped) => summary.skipped += 1,
                Ok(ItemOutcome::Errored) => summary.errored += 1,
                Ok(ItemOutcome::Cancelled) => summary.cancelled_items += 1,
                Err(e) => {
                    error!("worker task panicked: {e}");
                    summary.errored += 1;
                }
            }
        }

        if with_summary {
            if !self.job_token.is_cancelled() && !item_outputs.is_empty() {
                match self.export_summary(&item_outputs, tracker).await {
                    Ok(path) => {
                        summary.completed += 1;
                        summary.outputs.push(path);
                    }
                    Err(e) if e.is_cancelled() => {
                        tracker.file(FileProgress::new(SUMMARY_KEY).cancelled());
                        summary.cancelled_items += 1;
                    }
                    Err(e) => {
                        warn!("summary export failed: {e}");
                        tracker.file(FileProgress::new(SUMMARY_KEY).errored(e.to_string()));
                        summary.errored += 1;
                    }
                }
            } else if self.job_token.is_cancelled() {
                tracker.file(FileProgress::new(SUMMARY_KEY).cancelled());
                summary.cancelled_items += 1;
            } else {
                // Nothing to concatenate.
                tracker.file(FileProgress::new(SUMMARY_KEY).skipped());
                summary.skipped += 1;
            }
        }

        summary.was_cancelled = self.job_token.is_cancelled();
        Ok(summary)
    }

    /// Concatenate produced previews into a single summary video.
    async fn export_summary(
        &self,
        previews: &[PathBuf],
        tracker: &ProgressTracker,
    ) -> PipelineResult<PathBuf> {
        let name = format!(
            "{}-{}.mp4",
            chrono::Local::now().format("%Y%m%d%H%M"),
            PREVIEW_MARKER
        );
        // Previews live in <parent_of_output>/amprv; the summary sits
        // beside that folder.
        let parent = previews[0]
            .parent()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let target = parent.join(&name);

        tracker.file(
            FileProgress::new(SUMMARY_KEY)
                .at_stage(FileStage::Composing, 0.5)
                .with_message(format!("concatenating {} previews", previews.len())),
        );

        let tmp = std::env::temp_dir().join(format!("summary-{}.mp4", Uuid::new_v4().simple()));
        let result = self
            .backend
            .concat_files(
                previews,
                &tmp,
                self.config.summary_size,
                &self.config.generator.video_export_preset,
                &self.job_token,
            )
            .await;
        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        move_file(&tmp, &target).await?;

        tracker.file(FileProgress::new(SUMMARY_KEY).completed(target.clone()));
        Ok(target)
    }
}

/// Progress key for the aggregate-summary pseudo-item.
const SUMMARY_KEY: &str = "summary";

/// Single-item convenience: run one source through a fresh pipeline.
pub async fn generate_variant(
    movie_path: &Path,
    config: ProcessingConfig,
    backend: Arc<dyn VideoBackend>,
    catalog: Catalog,
) -> PipelineResult<JobSummary> {
    let pipeline = Pipeline::new(config, backend, catalog)?;
    pipeline.run_job(movie_path, Box::new(|_| {})).await
}

/// Drive one work item through its stage sequence, translating the
/// result into tracker events and an outcome for the aggregate.
async fn process_item(
    backend: Arc<dyn VideoBackend>,
    catalog: Catalog,
    config: Arc<ProcessingConfig>,
    tracker: ProgressTracker,
    item: WorkItem,
    cancel: CancelToken,
) -> ItemOutcome {
    let filename = item.filename();
    let result = process_item_inner(&backend, &catalog, &config, &tracker, &item, &cancel).await;

    match result {
        Ok(Some(path)) => {
            tracker.file(FileProgress::new(filename.as_str()).completed(path.clone()));
            ItemOutcome::Completed(path)
        }
        Ok(None) => {
            tracker.file(FileProgress::new(filename.as_str()).skipped());
            ItemOutcome::Skipped
        }
        Err(e) if e.is_cancelled() => {
            debug!(file = %filename, "item cancelled");
            tracker.file(FileProgress::new(filename.as_str()).cancelled());
            ItemOutcome::Cancelled
        }
        Err(e) => {
            warn!(file = %filename, "item failed: {e}");
            tracker.file(FileProgress::new(filename.as_str()).errored(e.to_string()));
            ItemOutcome::Errored
        }
    }
}

/// `Ok(Some(path))` on success, `Ok(None)` for a skip.
async fn process_item_inner(
    backend: &Arc<dyn VideoBackend>,
    catalog: &Catalog,
    config: &ProcessingConfig,
    tracker: &ProgressTracker,
    item: &WorkItem,
    cancel: &CancelToken,
) -> PipelineResult<Option<PathBuf>> {
    let filename = item.filename();
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    tracker.file(
        FileProgress::new(filename.as_str())
            .at_stage(FileStage::Discovered, 0.02)
            .with_message("probing"),
    );
    let metadata = backend.probe(&item.source).await?;

    if metadata.duration_seconds < config.min_duration {
        debug!(
            file = %filename,
            duration = metadata.duration_seconds,
            "below minimum duration, skipping"
        );
        return Ok(None);
    }
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    match config.kind {
        JobKind::Mosaic => {
            process_mosaic_item(backend, catalog, config, tracker, item, &metadata, cancel).await
        }
        JobKind::Preview => {
            process_preview_item(backend, catalog, config, tracker, item, &metadata, cancel).await
        }
    }
}

async fn process_mosaic_item(
    backend: &Arc<dyn VideoBackend>,
    catalog: &Catalog,
    config: &ProcessingConfig,
    tracker: &ProgressTracker,
    item: &WorkItem,
    metadata: &VideoMetadata,
    cancel: &CancelToken,
) -> PipelineResult<Option<PathBuf>> {
    let filename = item.filename();

    let predicted = predicted_output_path(
        &item.output_dir,
        metadata,
        config.density,
        config.format,
        config.separate_folders,
    );
    if predicted.exists() && !config.overwrite {
        debug!(file = %filename, "target exists, skipping");
        return Ok(None);
    }

    tracker.file(
        FileProgress::new(filename.as_str())
            .at_stage(FileStage::Planned, 0.1)
            .with_message("planning layout"),
    );
    let layout = plan_layout(
        metadata.duration_seconds,
        metadata.width,
        metadata.height,
        config.width,
        config.density,
        config.aspect_ratio,
    );
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let request = layout_request(
        layout.thumb_count,
        (layout.thumb_width, layout.thumb_height),
        config.generator.accurate_timestamps,
        config.generator.batch_size,
    );
    let extract_tracker = tracker.clone();
    let extract_name = filename.clone();
    let thumbnails = extract_thumbnails(
        backend.as_ref(),
        metadata,
        &request,
        cancel,
        move |done, total| {
            let fraction = 0.1 + 0.6 * done as f64 / total.max(1) as f64;
            extract_tracker.file(
                FileProgress::new(extract_name.as_str())
                    .at_stage(FileStage::Extracting, fraction)
                    .with_message(format!("extracting frame {done}/{total}")),
            );
        },
    )
    .await?;
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    tracker.file(
        FileProgress::new(filename.as_str())
            .at_stage(FileStage::Composing, 0.75)
            .with_message("compositing"),
    );
    let style = StyleOptions::from(config);
    let canvas = {
        let layout = layout.clone();
        let metadata = metadata.clone();
        tokio::task::spawn_blocking(move || {
            render_mosaic(&thumbnails, &layout, &metadata, &style)
        })
        .await
        .map_err(|e| {
            PipelineError::Media(mosaic_media::MediaError::CompositionFailure(e.to_string()))
        })?
    };
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    tracker.file(
        FileProgress::new(filename.as_str())
            .at_stage(FileStage::Writing, 0.9)
            .with_message(format!("encoding {}", config.format)),
    );
    let target = resolve_versioned(&predicted, config.overwrite)?;
    let bytes = write_mosaic(
        &canvas,
        &target,
        config.format,
        config.generator.compression_quality,
        backend.as_ref(),
    )
    .await?;

    let entry = catalog_entry(config, metadata, &target, &bytes);
    catalog.insert(entry).await?;

    Ok(Some(target))
}

async fn process_preview_item(
    backend: &Arc<dyn VideoBackend>,
    catalog: &Catalog,
    config: &ProcessingConfig,
    tracker: &ProgressTracker,
    item: &WorkItem,
    metadata: &VideoMetadata,
    cancel: &CancelToken,
) -> PipelineResult<Option<PathBuf>> {
    let filename = item.filename();

    let amprv_dir = item
        .output_dir
        .parent()
        .map(|p| p.join(PREVIEW_MARKER))
        .unwrap_or_else(|| item.output_dir.join(PREVIEW_MARKER));
    let target = amprv_dir.join(preview_file_name(&metadata.stem(), config.preview_density));

    tracker.file(
        FileProgress::new(filename.as_str())
            .at_stage(FileStage::Planned, 0.1)
            .with_message("planning preview"),
    );
    let plan = plan_preview(
        metadata,
        config.preview_duration,
        config.preview_density,
        &config.generator.video_export_preset,
    )?;
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    // Export into the OS temporary area, publish with a rename.
    let tmp = std::env::temp_dir().join(format!(
        "{PREVIEW_MARKER}-{}.mp4",
        Uuid::new_v4().simple()
    ));
    let export_tracker = tracker.clone();
    let export_name = filename.clone();
    let export = backend
        .export_preview(
            &item.source,
            &plan,
            &tmp,
            cancel,
            Box::new(move |fraction| {
                export_tracker.file(
                    FileProgress::new(export_name.as_str())
                        .at_stage(FileStage::Composing, 0.1 + 0.8 * fraction)
                        .with_message("exporting preview"),
                );
            }),
        )
        .await;
    if let Err(e) = export {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if cancel.is_cancelled() {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(PipelineError::Cancelled);
    }

    tracker.file(
        FileProgress::new(filename.as_str())
            .at_stage(FileStage::Writing, 0.95)
            .with_message("publishing preview"),
    );
    let bytes = tokio::fs::read(&tmp).await?;
    move_file(&tmp, &target).await?;

    let entry = catalog_entry(config, metadata, &target, &bytes);
    catalog.insert(entry).await?;

    Ok(Some(target))
}

/// Build the catalog row for a produced artifact.
fn catalog_entry(
    config: &ProcessingConfig,
    metadata: &VideoMetadata,
    artifact: &Path,
    bytes: &[u8],
) -> CatalogEntry {
    let density = match config.kind {
        JobKind::Mosaic => config.density,
        JobKind::Preview => config.preview_density,
    };
    let creation_date = metadata
        .creation_time
        .unwrap_or_else(chrono::Utc::now)
        .to_rfc3339();

    CatalogEntry {
        mosaic_id: 0,
        movie_file_path: metadata.file_path.display().to_string(),
        mosaic_file_path: artifact.display().to_string(),
        size: config.width.to_string(),
        density: density.to_string(),
        folder_hierarchy: metadata
            .file_path
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        content_hash: content_hash(bytes),
        duration: metadata.duration_seconds,
        resolution_width: f64::from(metadata.width),
        resolution_height: f64::from(metadata.height),
        codec: metadata.codec.clone(),
        video_type: metadata.bucket().to_string(),
        creation_date,
    }
}
