//! Media Deduplicating Organizer
//!
//! Organizes a heterogeneous collection of photos and videos into a
//! user-specified directory hierarchy, grouping near-duplicates (including
//! image/video cross-matches) and keeping the best representative of each
//! group. This library provides perceptual fingerprinting, the similarity
//! kernel, metric-space indexing, density clustering, representative
//! selection, durable caching, and the surrounding pipeline stages.

use serde::{Deserialize, Serialize};

pub mod bithash;
pub mod cache;
pub mod config;
pub mod dbscan;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod framehash;
pub mod gather;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod selector;
pub mod similarity;
pub mod store;
pub mod transfer;
pub mod vptree;

pub use config::SimilarityConfig;
pub use engine::DedupEngine;
pub use error::{Error, Result};
pub use models::*;
pub use pipeline::{Pipeline, PipelineOptions, RunSummary};

/// Default worker pool size: leave one core for the rest of the system.
pub fn default_concurrency() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

/// Digest algorithm used for content fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Md5,
    Sha256,
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Md5 => write!(f, "md5"),
            HashAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}
