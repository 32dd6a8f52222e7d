//! Final transfer stage: placing survivors into the destination tree

use crate::models::{DeduplicationResult, ErrorCategory, FileInfo, GatherError};
use crate::progress::ProgressTracker;
use crate::Result;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Whether survivors are moved or copied into the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Move,
    Copy,
}

/// Builds destination-relative paths from a placeholder template.
///
/// Supported placeholders: `{year}` `{month}` `{day}` `{name}` `{ext}`
/// `{camera}` `{type}` `{geo}` `{rand}`. Dates come from the capture
/// metadata, falling back to the file's modification time.
#[derive(Debug, Clone)]
pub struct PathFormatter {
    template: String,
}

impl PathFormatter {
    /// The template used when none is configured.
    pub const DEFAULT_TEMPLATE: &'static str = "{year}/{month}/{name}.{ext}";

    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into() }
    }

    /// Render the destination-relative path for a file.
    pub fn format(&self, file: &FileInfo) -> PathBuf {
        let date: DateTime<Utc> = file
            .metadata
            .image_date
            .unwrap_or_else(|| DateTime::<Utc>::from(file.stats.modified));

        let name = file
            .path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("file");
        let ext = file
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_else(|| "bin".to_string());
        let camera = file
            .metadata
            .camera_model
            .as_deref()
            .map(sanitize_component)
            .unwrap_or_else(|| "unknown-camera".to_string());
        let media_type = if file.is_video() { "video" } else { "image" };
        let geo = if file.metadata.has_gps() { "geotagged" } else { "ungeotagged" };
        let rand = short_suffix();

        let rendered = self
            .template
            .replace("{year}", &format!("{:04}", date.year()))
            .replace("{month}", &format!("{:02}", date.month()))
            .replace("{day}", &format!("{:02}", date.day()))
            .replace("{name}", name)
            .replace("{ext}", &ext)
            .replace("{camera}", &camera)
            .replace("{type}", media_type)
            .replace("{geo}", geo)
            .replace("{rand}", &rand);

        PathBuf::from(rendered)
    }
}

impl Default for PathFormatter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TEMPLATE)
    }
}

fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

fn short_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..6].to_string()
}

/// Transfer configuration.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Root of the organized output tree
    pub destination: PathBuf,
    /// Where superseded duplicates go; dropped in place when unset
    pub duplicates_dir: Option<PathBuf>,
    /// Where unreadable files go; left in place when unset
    pub errors_dir: Option<PathBuf>,
    /// Move or copy
    pub mode: TransferMode,
    /// Log placements without touching the filesystem
    pub dry_run: bool,
    /// Placement template for survivors
    pub formatter: PathFormatter,
}

/// Counters reported after the transfer stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferSummary {
    /// Representatives and unique files placed in the destination
    pub transferred: u64,
    /// Duplicates routed to the duplicate sink
    pub duplicates_moved: u64,
    /// Error files routed to the error sink
    pub errors_moved: u64,
    /// Per-file transfer failures
    pub failures: Vec<GatherError>,
}

/// Executes a deduplication result against the filesystem.
pub struct TransferStage {
    options: TransferOptions,
}

impl TransferStage {
    pub fn new(options: TransferOptions) -> Self {
        Self { options }
    }

    /// Place survivors, duplicates, and error files into their sinks.
    pub async fn execute(
        &self,
        result: &DeduplicationResult,
        files: &HashMap<PathBuf, Arc<FileInfo>>,
        error_files: &[GatherError],
        progress: &ProgressTracker,
    ) -> Result<TransferSummary> {
        let mut summary = TransferSummary::default();

        let survivors = result
            .unique_files
            .iter()
            .chain(result.duplicate_sets.iter().flat_map(|set| set.representatives.iter()));
        for path in survivors {
            let Some(file) = files.get(path) else {
                continue;
            };
            let target = self.options.destination.join(self.options.formatter.format(file));
            match self.place(path, &target).await {
                Ok(()) => {
                    summary.transferred += 1;
                    progress.file_transferred();
                }
                Err(err) => summary.failures.push(transfer_failure(path, err)),
            }
        }

        if let Some(duplicates_dir) = &self.options.duplicates_dir {
            for set in &result.duplicate_sets {
                for path in &set.duplicates {
                    let target = sink_target(duplicates_dir, path);
                    match self.place(path, &target).await {
                        Ok(()) => summary.duplicates_moved += 1,
                        Err(err) => summary.failures.push(transfer_failure(path, err)),
                    }
                }
            }
        }

        if let Some(errors_dir) = &self.options.errors_dir {
            for error in error_files {
                let Some(path) = &error.path else { continue };
                if !path.exists() {
                    continue;
                }
                let target = sink_target(errors_dir, path);
                match self.place(path, &target).await {
                    Ok(()) => summary.errors_moved += 1,
                    Err(err) => summary.failures.push(transfer_failure(path, err)),
                }
            }
        }

        Ok(summary)
    }

    /// Move or copy one file, creating parents and dodging collisions.
    async fn place(&self, source: &Path, target: &Path) -> Result<()> {
        let target = unique_target(target).await;

        if self.options.dry_run {
            info!(source = %source.display(), target = %target.display(), "dry run, not transferring");
            return Ok(());
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match self.options.mode {
            TransferMode::Copy => {
                tokio::fs::copy(source, &target).await?;
            }
            TransferMode::Move => {
                // Rename fails across filesystems; fall back to copy+remove
                if tokio::fs::rename(source, &target).await.is_err() {
                    tokio::fs::copy(source, &target).await?;
                    tokio::fs::remove_file(source).await?;
                }
            }
        }
        Ok(())
    }
}

fn transfer_failure(path: &Path, err: crate::Error) -> GatherError {
    warn!(path = %path.display(), error = %err, "transfer failed");
    GatherError {
        message: format!("transfer failed: {err}"),
        path: Some(path.to_path_buf()),
        category: ErrorCategory::Transfer,
    }
}

fn sink_target(sink: &Path, source: &Path) -> PathBuf {
    match source.file_name() {
        Some(name) => sink.join(name),
        None => sink.join("unnamed"),
    }
}

/// Append a short suffix to the stem until the target does not exist.
async fn unique_target(target: &Path) -> PathBuf {
    if !matches!(tokio::fs::try_exists(target).await, Ok(true)) {
        return target.to_path_buf();
    }

    let stem = target
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("file");
    let ext = target.extension().and_then(|ext| ext.to_str());

    loop {
        let name = match ext {
            Some(ext) => format!("{stem}-{}.{ext}", short_suffix()),
            None => format!("{stem}-{}", short_suffix()),
        };
        let candidate = target.with_file_name(name);
        if !matches!(tokio::fs::try_exists(&candidate).await, Ok(true)) {
            return candidate;
        }
    }
}
