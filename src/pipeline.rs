//! End-to-end pipeline: discover, gather, deduplicate, transfer

use crate::config::SimilarityConfig;
use crate::discovery::{DiscoveryOptions, MediaDiscovery};
use crate::engine::DedupEngine;
use crate::gather::{Gatherer, HashConfig, MediaDecoder, StandardDecoder};
use crate::models::{ErrorCategory, FileInfo, GatherError};
use crate::progress::ProgressTracker;
use crate::similarity::SimilarityKernel;
use crate::store::CacheStore;
use crate::transfer::{TransferOptions, TransferStage};
use crate::{Error, Result};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Everything a run needs to know.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Source directories to organize
    pub sources: Vec<PathBuf>,
    /// Discovery filters
    pub discovery: DiscoveryOptions,
    /// Similarity tunables
    pub similarity: SimilarityConfig,
    /// Content hashing settings
    pub hash: HashConfig,
    /// Directory holding the embedded cache database
    pub cache_dir: PathBuf,
    /// Worker pool size
    pub concurrency: usize,
    /// Clustering batch size
    pub batch_size: usize,
    /// Transfer stage configuration
    pub transfer: TransferOptions,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Media files discovered
    pub discovered: usize,
    /// Files successfully fingerprinted
    pub processed: usize,
    /// Files with no near-duplicate
    pub unique_files: usize,
    /// Duplicate groups found
    pub duplicate_sets: usize,
    /// Files superseded inside those groups
    pub duplicate_files: usize,
    /// Files placed into the destination
    pub transferred: u64,
    /// Per-file errors accumulated across all stages
    pub errors: Vec<GatherError>,
    /// Wall-clock run time in seconds
    pub elapsed_seconds: f64,
}

/// Coordinates the full organize-and-deduplicate run.
pub struct Pipeline {
    options: PipelineOptions,
    store: CacheStore,
    gatherer: Arc<Gatherer>,
    progress: ProgressTracker,
}

impl Pipeline {
    /// Create a pipeline with the standard media decoder.
    pub fn new(options: PipelineOptions) -> Result<Self> {
        Self::with_decoder(options, Arc::new(StandardDecoder::new()))
    }

    /// Create a pipeline with a custom media decoder.
    pub fn with_decoder(options: PipelineOptions, decoder: Arc<dyn MediaDecoder>) -> Result<Self> {
        let store = CacheStore::open(&options.cache_dir)?;
        let gatherer = Arc::new(Gatherer::new(
            &store,
            options.similarity.clone(),
            options.hash.clone(),
            decoder,
        )?);
        Ok(Self {
            options,
            store,
            gatherer,
            progress: ProgressTracker::new(),
        })
    }

    /// Progress handle for subscribers.
    pub fn progress(&self) -> ProgressTracker {
        self.progress.clone()
    }

    /// Flush cache writes; used on interrupt before tearing down.
    pub async fn flush_cache(&self) -> Result<()> {
        self.store.flush().await
    }

    /// Run discovery, gathering, deduplication, and transfer.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let mut errors: Vec<GatherError> = Vec::new();

        // Stage 1: discovery
        let mut discovery = MediaDiscovery::new(self.options.discovery.clone());
        let paths = discovery.discover(&self.options.sources);
        errors.extend(discovery.errors().iter().cloned());
        for _ in discovery.errors() {
            self.progress.error_recorded();
        }
        self.progress.set_discovered(paths.len() as u64);
        info!(files = paths.len(), "discovery complete");

        // Stage 2: gather fingerprints through the cache
        let gathered: Vec<(PathBuf, Result<FileInfo>)> = stream::iter(paths.iter().cloned())
            .map(|path| {
                let gatherer = self.gatherer.clone();
                async move {
                    let outcome = gatherer.process(&path).await;
                    (path, outcome)
                }
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        let mut files: Vec<Arc<FileInfo>> = Vec::new();
        for (path, outcome) in gathered {
            match outcome {
                Ok(info) => {
                    self.progress.file_processed(&path);
                    files.push(Arc::new(info));
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "file excluded from deduplication");
                    self.progress.error_recorded();
                    errors.push(GatherError {
                        message: err.to_string(),
                        path: Some(path),
                        category: categorize(&err),
                    });
                }
            }
        }
        info!(processed = files.len(), failed = errors.len(), "gather complete");

        // Stage 3: deduplicate
        let kernel = Arc::new(SimilarityKernel::new(self.options.similarity.clone()));
        let engine = DedupEngine::new(kernel, self.options.batch_size, self.options.concurrency);
        let files_by_path: HashMap<PathBuf, Arc<FileInfo>> = files
            .iter()
            .map(|file| (file.path.clone(), file.clone()))
            .collect();
        let processed = files.len();
        let result = engine.deduplicate(files).await?;
        self.progress.duplicates_found(result.duplicate_count() as u64);
        info!(
            unique = result.unique_files.len(),
            sets = result.duplicate_sets.len(),
            duplicates = result.duplicate_count(),
            "deduplication complete"
        );

        // Stage 4: transfer
        let stage = TransferStage::new(self.options.transfer.clone());
        let transfer = stage
            .execute(&result, &files_by_path, &errors, &self.progress)
            .await?;
        errors.extend(transfer.failures.iter().cloned());

        self.store.flush().await?;
        self.progress.finish();

        Ok(RunSummary {
            discovered: paths.len(),
            processed,
            unique_files: result.unique_files.len(),
            duplicate_sets: result.duplicate_sets.len(),
            duplicate_files: result.duplicate_count(),
            transferred: transfer.transferred,
            errors,
            elapsed_seconds: started.elapsed().as_secs_f64(),
        })
    }
}

fn categorize(err: &Error) -> ErrorCategory {
    match err {
        Error::UnreadableInput { .. } | Error::Image(_) | Error::InvalidFrame(_) => {
            ErrorCategory::Decode
        }
        Error::Store(_) | Error::Serialize(_) => ErrorCategory::Cache,
        _ => ErrorCategory::FileSystem,
    }
}
