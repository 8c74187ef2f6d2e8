//! Job progress tracking and rate-limited event dispatch.
//!
//! Producers (the pipeline's worker tasks) push events into a channel;
//! a single dispatcher task owns the caller's callback and is the only
//! context that ever invokes it, so the callback does not need to be
//! thread-safe beyond `Send`. Non-terminal per-file updates are
//! coalesced to roughly 30 Hz; terminal and aggregate events flush
//! immediately.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mosaic_models::{FileProgress, GlobalProgress, ProgressEvent};

/// Callback registered by the job owner.
pub type ProgressCallback = Box<dyn FnMut(ProgressEvent) + Send + 'static>;

/// Coalescing window for non-terminal per-file updates.
const EMIT_INTERVAL: Duration = Duration::from_millis(33);

struct TrackerState {
    global: GlobalProgress,
    started: Instant,
}

/// Shared progress tracker for one job.
#[derive(Clone)]
pub struct ProgressTracker {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    state: Arc<Mutex<TrackerState>>,
}

impl ProgressTracker {
    /// Create a tracker and spawn its dispatcher. The returned handle
    /// resolves once the channel is drained after the tracker (and its
    /// clones) are dropped.
    pub fn new(callback: ProgressCallback) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(dispatch(rx, callback));
        let tracker = Self {
            tx,
            state: Arc::new(Mutex::new(TrackerState {
                global: GlobalProgress::default(),
                started: Instant::now(),
            })),
        };
        (tracker, handle)
    }

    /// Set the number of work items (including the summary pseudo-item
    /// when one is planned).
    pub fn set_total(&self, total: u64) {
        let snapshot = {
            let mut state = self.state.lock().expect("tracker mutex poisoned");
            state.global.total = total;
            state.global.elapsed_seconds = state.started.elapsed().as_secs_f64();
            state.global.update_derived();
            state.global.clone()
        };
        let _ = self.tx.send(ProgressEvent::Global(snapshot));
    }

    /// Report discovery progress.
    pub fn discovery(&self, count_so_far: u64) {
        let _ = self.tx.send(ProgressEvent::Discovery { count_so_far });
    }

    /// Publish a per-file record. Terminal records also update the
    /// aggregate counters and emit a fresh global snapshot.
    pub fn file(&self, progress: FileProgress) {
        let terminal = progress.stage.is_terminal();
        let flags = (progress.is_complete, progress.is_skipped, progress.is_error);
        let _ = self.tx.send(ProgressEvent::File(progress));

        if terminal {
            let snapshot = {
                let mut state = self.state.lock().expect("tracker mutex poisoned");
                match flags {
                    (true, _, _) => state.global.completed += 1,
                    (_, true, _) => state.global.skipped += 1,
                    (_, _, true) => state.global.errored += 1,
                    // Cancelled items leave the counters untouched.
                    _ => {}
                }
                state.global.elapsed_seconds = state.started.elapsed().as_secs_f64();
                state.global.update_derived();
                state.global.clone()
            };
            let _ = self.tx.send(ProgressEvent::Global(snapshot));
        }
    }

    /// Current aggregate counters.
    pub fn snapshot(&self) -> GlobalProgress {
        let mut state = self.state.lock().expect("tracker mutex poisoned");
        state.global.elapsed_seconds = state.started.elapsed().as_secs_f64();
        state.global.update_derived();
        state.global.clone()
    }

    /// Emit the terminal Done event.
    pub fn finish(&self) {
        let _ = self.tx.send(ProgressEvent::Done(self.snapshot()));
    }
}

/// Dispatcher: drains the channel, coalescing non-terminal per-file
/// events onto a ~30 Hz tick.
async fn dispatch(mut rx: mpsc::UnboundedReceiver<ProgressEvent>, mut callback: ProgressCallback) {
    let mut pending: HashMap<String, FileProgress> = HashMap::new();
    let mut tick = tokio::time::interval(EMIT_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    None => break,
                    Some(ProgressEvent::File(fp)) if !fp.stage.is_terminal() => {
                        pending.insert(fp.filename.clone(), fp);
                    }
                    Some(ProgressEvent::File(fp)) => {
                        // Terminal: drop any stale coalesced update and
                        // deliver in order.
                        pending.remove(&fp.filename);
                        callback(ProgressEvent::File(fp));
                    }
                    Some(other) => callback(other),
                }
            }
            _ = tick.tick() => {
                for (_, fp) in pending.drain() {
                    callback(ProgressEvent::File(fp));
                }
            }
        }
    }

    for (_, fp) in pending.drain() {
        callback(ProgressEvent::File(fp));
    }
}
