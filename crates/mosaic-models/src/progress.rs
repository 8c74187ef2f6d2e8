//! Progress event schemas.
//!
//! The pipeline publishes these on an outbound channel; UIs and tests
//! subscribe through a single registered callback.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Stage of the per-item state machine. Ordering is the execution
/// order; progress events for one file never move backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStage {
    Queued,
    Discovered,
    Planned,
    Extracting,
    Composing,
    Writing,
    Done,
    Skipped,
    Error,
    Cancelled,
}

impl FileStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStage::Queued => "queued",
            FileStage::Discovered => "discovered",
            FileStage::Planned => "planned",
            FileStage::Extracting => "extracting",
            FileStage::Composing => "composing",
            FileStage::Writing => "writing",
            FileStage::Done => "done",
            FileStage::Skipped => "skipped",
            FileStage::Error => "error",
            FileStage::Cancelled => "cancelled",
        }
    }

    /// Whether the item has left the active set.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileStage::Done | FileStage::Skipped | FileStage::Error | FileStage::Cancelled
        )
    }
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-item progress record, keyed by file name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileProgress {
    pub filename: String,
    /// Fraction complete, 0.0..=1.0.
    pub progress: f64,
    pub stage: FileStage,
    /// Human-readable detail, e.g. "extracting frame 42/120".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub is_complete: bool,
    pub is_cancelled: bool,
    pub is_error: bool,
    pub is_skipped: bool,
    /// Set on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Set on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl FileProgress {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            progress: 0.0,
            stage: FileStage::Queued,
            message: None,
            is_complete: false,
            is_cancelled: false,
            is_error: false,
            is_skipped: false,
            output_path: None,
            error_message: None,
        }
    }

    pub fn at_stage(mut self, stage: FileStage, progress: f64) -> Self {
        self.stage = stage;
        self.progress = progress.clamp(0.0, 1.0);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn completed(mut self, output_path: PathBuf) -> Self {
        self.stage = FileStage::Done;
        self.progress = 1.0;
        self.is_complete = true;
        self.output_path = Some(output_path);
        self
    }

    pub fn skipped(mut self) -> Self {
        self.stage = FileStage::Skipped;
        self.progress = 1.0;
        self.is_skipped = true;
        self
    }

    pub fn cancelled(mut self) -> Self {
        self.stage = FileStage::Cancelled;
        self.is_cancelled = true;
        self
    }

    pub fn errored(mut self, message: impl Into<String>) -> Self {
        self.stage = FileStage::Error;
        self.is_error = true;
        self.error_message = Some(message.into());
        self
    }
}

/// Aggregate counters for a running job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalProgress {
    pub completed: u64,
    pub total: u64,
    pub skipped: u64,
    pub errored: u64,
    /// Seconds since the job started.
    pub elapsed_seconds: f64,
    /// Items completed per second.
    pub fps: f64,
    /// Estimated seconds remaining; 0 when unknowable.
    pub eta_seconds: f64,
}

impl GlobalProgress {
    /// Fraction of items in a terminal state, 0.0..=1.0. An empty job
    /// is complete immediately.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.completed + self.skipped + self.errored) as f64 / self.total as f64
    }

    /// Recompute the derived rate and ETA from the counters.
    pub fn update_derived(&mut self) {
        self.fps = if self.elapsed_seconds > 0.0 {
            self.completed as f64 / self.elapsed_seconds
        } else {
            0.0
        };
        let progress = self.fraction();
        let eta = if progress > 0.0 {
            self.elapsed_seconds / progress - self.elapsed_seconds
        } else {
            0.0
        };
        self.eta_seconds = if eta.is_finite() { eta.max(0.0) } else { 0.0 };
    }
}

/// Event published by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Discovery is still enumerating inputs.
    Discovery { count_so_far: u64 },
    /// One file's record changed.
    File(FileProgress),
    /// Aggregate counters changed.
    Global(GlobalProgress),
    /// The job finished (complete, cancelled, or drained after errors).
    Done(GlobalProgress),
}
