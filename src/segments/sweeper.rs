//! Retention sweeper
//!
//! Periodically deletes segment-store files older than the retention window.
//! Pure filesystem-age policy: it never looks at room state, so output from
//! finished or crashed sessions is reclaimed the same way as any other.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use walkdir::WalkDir;

/// Shortest accepted interval between passes
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files examined
    pub scanned: usize,
    /// Files deleted
    pub deleted: usize,
    /// Entries that could not be read or deleted
    pub failed: usize,
    /// Empty session directories removed
    pub dirs_removed: usize,
}

/// Background retention task
#[derive(Debug, Clone)]
pub struct Sweeper {
    base: PathBuf,
    retention: Duration,
    interval: Duration,
}

impl Sweeper {
    /// `interval` is clamped to at least one second
    pub fn new(base: impl Into<PathBuf>, retention: Duration, interval: Duration) -> Self {
        Self {
            base: base.into(),
            retention,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Run one pass over the base directory
    pub async fn sweep_once(&self) -> SweepReport {
        let base = self.base.clone();
        let retention = self.retention;

        match tokio::task::spawn_blocking(move || sweep_dir(&base, retention)).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "Sweep task failed");
                SweepReport::default()
            }
        }
    }

    /// Spawn the periodic sweep
    ///
    /// The first pass runs immediately. Returns a handle that can be used to
    /// abort the task.
    pub fn spawn(self) -> JoinHandle<()> {
        tracing::info!(
            base = %self.base.display(),
            retention_secs = self.retention.as_secs(),
            interval_secs = self.interval.as_secs(),
            "Segment sweeper started"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = self.sweep_once().await;
                if report.deleted > 0 || report.failed > 0 {
                    tracing::info!(
                        scanned = report.scanned,
                        deleted = report.deleted,
                        failed = report.failed,
                        dirs_removed = report.dirs_removed,
                        "Sweep finished"
                    );
                }
            }
        })
    }
}

fn age(metadata: &std::fs::Metadata, now: SystemTime) -> Option<Duration> {
    let born = metadata.created().or_else(|_| metadata.modified()).ok()?;
    // Timestamps in the future count as brand new
    Some(now.duration_since(born).unwrap_or_default())
}

fn sweep_dir(base: &Path, retention: Duration) -> SweepReport {
    let mut report = SweepReport::default();
    if !base.is_dir() {
        return report;
    }

    let now = SystemTime::now();

    // Contents first, so a directory is visited after its files are swept
    for entry in WalkDir::new(base).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read sweep entry");
                report.failed += 1;
                continue;
            }
        };

        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to stat sweep entry");
                report.failed += 1;
                continue;
            }
        };

        let expired = age(&metadata, now).is_some_and(|age| age > retention);

        if entry.file_type().is_dir() {
            // Fails harmlessly while the directory still has files
            if expired && std::fs::remove_dir(path).is_ok() {
                tracing::debug!(path = %path.display(), "Removed empty directory");
                report.dirs_removed += 1;
            }
            continue;
        }

        report.scanned += 1;
        if !expired {
            continue;
        }

        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Deleted expired file");
                report.deleted += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete expired file");
                report.failed += 1;
            }
        }
    }

    report
}
