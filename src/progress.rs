//! Progress tracking for long-running pipeline stages

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime};
use tokio::sync::broadcast;

/// Snapshot of pipeline progress.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Media files discovered so far
    pub files_discovered: u64,
    /// Files fingerprinted (from cache or fresh)
    pub files_processed: u64,
    /// File currently being processed
    pub current_file: Option<PathBuf>,
    /// Duplicate files identified
    pub duplicates_found: u64,
    /// Files moved or copied into the destination
    pub files_transferred: u64,
    /// Per-file errors recorded
    pub errors: u64,
}

impl ProgressUpdate {
    /// Fraction of discovered files already processed, as a percentage.
    pub fn percentage(&self) -> f64 {
        if self.files_discovered == 0 {
            0.0
        } else {
            (self.files_processed as f64 / self.files_discovered as f64) * 100.0
        }
    }
}

/// Event emitted when progress changes.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// The updated progress information
    pub progress: ProgressUpdate,
    /// When the event was emitted
    pub timestamp: SystemTime,
}

/// Shared progress tracker with broadcast notification.
///
/// Writers bump counters from any task; subscribers receive rate-limited
/// events. Lagging subscribers lose intermediate events, never the final
/// state.
#[derive(Clone)]
pub struct ProgressTracker {
    current: Arc<Mutex<ProgressUpdate>>,
    sender: broadcast::Sender<ProgressEvent>,
    last_emit: Arc<Mutex<Instant>>,
    emit_interval: std::time::Duration,
}

impl ProgressTracker {
    /// Create a tracker emitting at most ten events per second.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            current: Arc::new(Mutex::new(ProgressUpdate::default())),
            sender,
            last_emit: Arc::new(Mutex::new(Instant::now())),
            emit_interval: std::time::Duration::from_millis(100),
        }
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Current progress snapshot.
    pub fn snapshot(&self) -> ProgressUpdate {
        self.current.lock().expect("progress lock poisoned").clone()
    }

    /// Record the number of discovered files.
    pub fn set_discovered(&self, count: u64) {
        self.update(|p| p.files_discovered = count);
    }

    /// Record one processed file.
    pub fn file_processed(&self, path: &PathBuf) {
        self.update(|p| {
            p.files_processed += 1;
            p.current_file = Some(path.clone());
        });
    }

    /// Record identified duplicates.
    pub fn duplicates_found(&self, count: u64) {
        self.update(|p| p.duplicates_found = count);
    }

    /// Record one transferred file.
    pub fn file_transferred(&self) {
        self.update(|p| p.files_transferred += 1);
    }

    /// Record one per-file error.
    pub fn error_recorded(&self) {
        self.update(|p| p.errors += 1);
    }

    fn update(&self, mutate: impl FnOnce(&mut ProgressUpdate)) {
        let snapshot = {
            let mut progress = self.current.lock().expect("progress lock poisoned");
            mutate(&mut progress);
            progress.clone()
        };
        self.emit_if_due(snapshot);
    }

    fn emit_if_due(&self, progress: ProgressUpdate) {
        let mut last = self.last_emit.lock().expect("progress lock poisoned");
        if last.elapsed() < self.emit_interval {
            return;
        }
        *last = Instant::now();
        let _ = self.sender.send(ProgressEvent {
            progress,
            timestamp: SystemTime::now(),
        });
    }

    /// Emit the final state unconditionally.
    pub fn finish(&self) {
        let _ = self.sender.send(ProgressEvent {
            progress: self.snapshot(),
            timestamp: SystemTime::now(),
        });
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let tracker = ProgressTracker::new();
        tracker.set_discovered(10);
        tracker.file_processed(&PathBuf::from("a.jpg"));
        tracker.file_processed(&PathBuf::from("b.jpg"));
        tracker.error_recorded();

        let progress = tracker.snapshot();
        assert_eq!(progress.files_discovered, 10);
        assert_eq!(progress.files_processed, 2);
        assert_eq!(progress.errors, 1);
        assert_eq!(progress.current_file, Some(PathBuf::from("b.jpg")));
        assert!((progress.percentage() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn percentage_handles_zero_discovered() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.snapshot().percentage(), 0.0);
    }

    #[tokio::test]
    async fn finish_reaches_subscribers() {
        let tracker = ProgressTracker::new();
        let mut events = tracker.subscribe();
        tracker.set_discovered(3);
        tracker.finish();

        let event = events.recv().await.unwrap();
        assert_eq!(event.progress.files_discovered, 3);
    }
}
