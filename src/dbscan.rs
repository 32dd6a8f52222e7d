//! Batched density-based clustering over the vantage-point index

use crate::models::{Cluster, MediaInfo};
use crate::similarity::SimilarityKernel;
use crate::vptree::{Metric, SearchOptions, VpTree};
use crate::Result;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// A core point needs itself plus at least one validated neighbor.
const MIN_PTS: usize = 2;

/// One point in the clustering space: a path and its fingerprint snapshot.
#[derive(Debug)]
pub struct MediaEntry {
    /// File path identifying the point
    pub path: PathBuf,
    /// Fingerprint captured at snapshot time
    pub media: Arc<MediaInfo>,
}

/// Density-based clustering engine (`minPts = 2`, `eps = 1 − minThreshold`).
///
/// Files are partitioned into batches that scan independently over one
/// shared immutable tree; clusters from different batches may overlap on
/// shared points and are unioned afterwards. This recovers connectivity
/// but not strict sequential-DBSCAN border assignment, an intentional
/// approximation.
pub struct DbscanEngine {
    kernel: Arc<SimilarityKernel>,
    batch_size: usize,
    concurrency: usize,
}

impl DbscanEngine {
    /// Create an engine over the given kernel.
    pub fn new(kernel: Arc<SimilarityKernel>, batch_size: usize, concurrency: usize) -> Self {
        Self {
            kernel,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Cluster the entries into duplicate groups and singletons.
    pub async fn cluster(&self, entries: Vec<Arc<MediaEntry>>) -> Result<Vec<Cluster>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let kernel = self.kernel.clone();
        let metric: Metric<MediaEntry> = Arc::new(move |a: Arc<MediaEntry>, b: Arc<MediaEntry>| {
            let kernel = kernel.clone();
            Box::pin(async move { kernel.distance(&a.media, &b.media) })
                as BoxFuture<'static, Result<f64>>
        });

        let tree = Arc::new(VpTree::build(entries.clone(), metric).await?);
        let eps = self.kernel.config().epsilon();
        debug!(points = entries.len(), eps, "built neighbor index");

        let batches: Vec<Vec<Arc<MediaEntry>>> = entries
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        let scans = stream::iter(batches.into_iter().enumerate().map(|(index, batch)| {
            let tree = tree.clone();
            let kernel = self.kernel.clone();
            async move { (index, scan_batch(tree, kernel, eps, batch).await) }
        }))
        .buffer_unordered(self.concurrency)
        .collect::<Vec<_>>()
        .await;

        // A failing batch loses only its own seeds; the merge still runs
        let mut clusters = Vec::new();
        for (index, scan) in scans {
            match scan {
                Ok(batch_clusters) => clusters.extend(batch_clusters),
                Err(err) => warn!(batch = index, error = %err, "clustering batch failed, skipping"),
            }
        }

        Ok(merge_overlapping(clusters))
    }
}

/// Scan one batch of seed points with standard DBSCAN expansion.
///
/// Expansion only continues through core points; border points join a
/// cluster without growing it. The visited set is batch-local, which is
/// what lets clusters overlap across batches.
async fn scan_batch(
    tree: Arc<VpTree<MediaEntry>>,
    kernel: Arc<SimilarityKernel>,
    eps: f64,
    seeds: Vec<Arc<MediaEntry>>,
) -> Result<Vec<Cluster>> {
    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut clusters = Vec::new();

    for seed in seeds {
        if visited.contains(&seed.path) {
            continue;
        }

        let neighborhood = valid_neighbors(&tree, &kernel, eps, &seed).await?;
        if neighborhood.len() < MIN_PTS {
            visited.insert(seed.path.clone());
            clusters.push(vec![seed.path.clone()]);
            continue;
        }

        let mut cluster = Vec::new();
        let mut stack = vec![seed];
        while let Some(point) = stack.pop() {
            if !visited.insert(point.path.clone()) {
                continue;
            }
            cluster.push(point.path.clone());

            let expansion = valid_neighbors(&tree, &kernel, eps, &point).await?;
            if expansion.len() >= MIN_PTS {
                for neighbor in expansion {
                    if !visited.contains(&neighbor.path) {
                        stack.push(neighbor);
                    }
                }
            }
        }
        clusters.push(cluster);
    }

    Ok(clusters)
}

/// Tree neighbors within `eps`, tightened by the pair-specific threshold.
///
/// The radius casts the widest net any media pairing can need; each
/// candidate then has to clear the adaptive threshold for its own pairing
/// before it counts toward density.
async fn valid_neighbors(
    tree: &VpTree<MediaEntry>,
    kernel: &SimilarityKernel,
    eps: f64,
    point: &Arc<MediaEntry>,
) -> Result<Vec<Arc<MediaEntry>>> {
    let candidates = tree
        .search(point, SearchOptions { max_distance: eps, sort: false })
        .await?;

    Ok(candidates
        .into_iter()
        .filter(|(candidate, distance)| {
            1.0 - distance >= kernel.adaptive_threshold(&point.media, &candidate.media)
        })
        .map(|(candidate, _)| candidate)
        .collect())
}

/// Union clusters that share any member.
///
/// Walks the combined cluster list keeping an element-to-cluster index;
/// an incoming cluster that touches existing ones is unioned with all of
/// them. Deterministic up to set equality: cluster identity may differ
/// between runs but the partition does not.
pub fn merge_overlapping(clusters: Vec<Cluster>) -> Vec<Cluster> {
    let mut slots: Vec<Option<Cluster>> = Vec::new();
    let mut element_to_cluster: HashMap<PathBuf, usize> = HashMap::new();

    for cluster in clusters {
        let mut touched: Vec<usize> = cluster
            .iter()
            .filter_map(|path| element_to_cluster.get(path).copied())
            .collect();
        touched.sort_unstable();
        touched.dedup();

        if touched.is_empty() {
            let slot = slots.len();
            for path in &cluster {
                element_to_cluster.insert(path.clone(), slot);
            }
            slots.push(Some(cluster));
            continue;
        }

        let target = touched[0];
        let mut merged = slots[target].take().expect("indexed slot is occupied");
        let mut members: HashSet<PathBuf> = merged.iter().cloned().collect();
        for &slot in &touched[1..] {
            for path in slots[slot].take().expect("indexed slot is occupied") {
                if members.insert(path.clone()) {
                    merged.push(path);
                }
            }
        }
        for path in cluster {
            if members.insert(path.clone()) {
                merged.push(path);
            }
        }
        for path in &merged {
            element_to_cluster.insert(path.clone(), target);
        }
        slots[target] = Some(merged);
    }

    slots.into_iter().flatten().collect()
}
