//! Deduplication engine: clustering plus representative selection

use crate::dbscan::{DbscanEngine, MediaEntry};
use crate::models::{DeduplicationResult, DuplicateSet, FileInfo};
use crate::selector;
use crate::similarity::SimilarityKernel;
use crate::Result;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Turns a set of gathered files into unique files and duplicate sets.
///
/// The engine builds a fingerprint snapshot, clusters it, and runs the
/// selection policy per cluster. Selection can recurse back into the
/// engine for a video's capture candidates; the recursion always operates
/// on a strict subset of the cluster, so it is bounded.
pub struct DedupEngine {
    kernel: Arc<SimilarityKernel>,
    batch_size: usize,
    concurrency: usize,
}

impl DedupEngine {
    /// Create an engine over the given kernel.
    pub fn new(kernel: Arc<SimilarityKernel>, batch_size: usize, concurrency: usize) -> Self {
        Self { kernel, batch_size, concurrency }
    }

    /// Partition `files` into unique files and duplicate sets.
    pub async fn deduplicate(&self, files: Vec<Arc<FileInfo>>) -> Result<DeduplicationResult> {
        let mut result = DeduplicationResult::default();
        if files.is_empty() {
            return Ok(result);
        }

        let by_path: HashMap<PathBuf, Arc<FileInfo>> = files
            .iter()
            .map(|file| (file.path.clone(), file.clone()))
            .collect();

        // The metric closes over this immutable snapshot, captured once at
        // tree-build time; no shared mutable state is involved.
        let entries: Vec<Arc<MediaEntry>> = files
            .iter()
            .map(|file| {
                Arc::new(MediaEntry {
                    path: file.path.clone(),
                    media: file.media.clone(),
                })
            })
            .collect();

        let clustering = DbscanEngine::new(self.kernel.clone(), self.batch_size, self.concurrency);
        let clusters = clustering.cluster(entries).await?;
        info!(files = files.len(), clusters = clusters.len(), "clustering complete");

        for cluster in clusters {
            if cluster.len() == 1 {
                result.unique_files.extend(cluster);
                continue;
            }

            let members: Vec<Arc<FileInfo>> = cluster
                .iter()
                .filter_map(|path| by_path.get(path).cloned())
                .collect();

            match self.select(members).await {
                Ok(set) => result.duplicate_sets.push(set),
                Err(err) => {
                    // One cluster's selection failure must not affect the
                    // others; its members are kept as unique files
                    warn!(error = %err, "representative selection failed, keeping cluster members");
                    result.unique_files.extend(cluster);
                }
            }
        }

        Ok(result)
    }

    /// Pick the representatives of one duplicate cluster.
    ///
    /// The top-scoring member is the best file. A winning still stands
    /// alone; a winning video additionally keeps its deduplicated capture
    /// candidates as co-representatives.
    fn select(&self, members: Vec<Arc<FileInfo>>) -> BoxFuture<'_, Result<DuplicateSet>> {
        Box::pin(async move {
            let refs: Vec<&FileInfo> = members.iter().map(|member| member.as_ref()).collect();
            let ranked = selector::rank(&refs);
            let best = *ranked.first().expect("clusters are non-empty");
            let best_path = best.path.clone();

            let mut representatives = vec![best_path.clone()];
            if best.is_video() {
                let captures: Vec<Arc<FileInfo>> = members
                    .iter()
                    .filter(|member| {
                        member.path != best_path && selector::is_potential_capture(best, member)
                    })
                    .cloned()
                    .collect();

                if !captures.is_empty() {
                    let nested = self.deduplicate(captures).await?;
                    representatives.extend(nested.unique_files);
                    for set in nested.duplicate_sets {
                        representatives.extend(set.representatives);
                    }
                }
            }

            let chosen: HashSet<&PathBuf> = representatives.iter().collect();
            let duplicates: Vec<PathBuf> = members
                .iter()
                .map(|member| member.path.clone())
                .filter(|path| !chosen.contains(path))
                .collect();

            Ok(DuplicateSet::new(best_path, representatives, duplicates))
        })
    }
}
