//! Data models for the media deduplication pipeline

use crate::bithash::BitHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

/// A single perceptually-hashed frame.
///
/// Still images carry exactly one frame at timestamp 0; video frames are
/// strictly ordered by timestamp and share one hash width per media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    /// Perceptual hash of the frame
    pub hash: BitHash,
    /// Offset from the start of the media, in seconds
    pub timestamp: f64,
}

/// Perceptual fingerprint of one media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Playback length in seconds; 0 for still images
    pub duration: f64,
    /// Hashed frames, ordered by timestamp
    pub frames: Vec<FrameInfo>,
}

impl MediaInfo {
    /// Create a single-frame fingerprint for a still image.
    pub fn image(hash: BitHash) -> Self {
        Self {
            duration: 0.0,
            frames: vec![FrameInfo { hash, timestamp: 0.0 }],
        }
    }

    /// Whether this media is a video (has a running time).
    pub fn is_video(&self) -> bool {
        self.duration > 0.0
    }
}

/// Byte-level identity of a file: size, timestamps, and a short content
/// fingerprint used as the durable cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStats {
    /// File size in bytes
    pub size: u64,
    /// Last modification timestamp
    pub modified: SystemTime,
    /// Creation timestamp, falling back to the modification time
    pub created: SystemTime,
    /// Hex digest of the file bytes (head+tail sample for large files)
    pub content_hash: String,
}

/// Optional capture metadata read from the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Capture date from embedded metadata
    pub image_date: Option<DateTime<Utc>>,
    /// GPS latitude in decimal degrees
    pub gps_latitude: Option<f64>,
    /// GPS longitude in decimal degrees
    pub gps_longitude: Option<f64>,
    /// Camera make and model
    pub camera_model: Option<String>,
    /// Pixel width
    pub width: Option<u32>,
    /// Pixel height
    pub height: Option<u32>,
}

impl MediaMetadata {
    /// Whether both GPS coordinates are present.
    pub fn has_gps(&self) -> bool {
        self.gps_latitude.is_some() && self.gps_longitude.is_some()
    }

    /// Pixel count, or 0 when dimensions are unknown.
    pub fn pixel_count(&self) -> u64 {
        match (self.width, self.height) {
            (Some(w), Some(h)) => u64::from(w) * u64::from(h),
            _ => 0,
        }
    }
}

/// Everything the pipeline knows about one gathered file.
///
/// Created once during the gather stage and never mutated afterwards. The
/// fingerprint is shared rather than cloned because the clustering stage
/// holds a read-only snapshot of every fingerprint at once.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Absolute file path
    pub path: PathBuf,
    /// Byte-level stats and content fingerprint
    pub stats: FileStats,
    /// Optional capture metadata
    pub metadata: MediaMetadata,
    /// Perceptual fingerprint
    pub media: Arc<MediaInfo>,
}

impl FileInfo {
    /// Whether the underlying media is a video.
    pub fn is_video(&self) -> bool {
        self.media.is_video()
    }

    /// File name without directories.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

/// A group of paths judged to hold the same content.
///
/// Singletons represent unique files; clusters of two or more are
/// duplicate groups.
pub type Cluster = Vec<PathBuf>;

/// A duplicate group with its surviving representatives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateSet {
    /// Unique identifier for the set
    pub id: String,
    /// The highest-scoring member; always one of `representatives`
    pub best_file: PathBuf,
    /// Files that survive transfer to the destination
    pub representatives: Vec<PathBuf>,
    /// Files superseded by the representatives
    pub duplicates: Vec<PathBuf>,
}

impl DuplicateSet {
    /// Create a new set. The best file must be among the representatives.
    pub fn new(best_file: PathBuf, representatives: Vec<PathBuf>, duplicates: Vec<PathBuf>) -> Self {
        debug_assert!(representatives.contains(&best_file));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            best_file,
            representatives,
            duplicates,
        }
    }

    /// Total number of files in the set.
    pub fn len(&self) -> usize {
        self.representatives.len() + self.duplicates.len()
    }

    /// True when the set holds no files at all.
    pub fn is_empty(&self) -> bool {
        self.representatives.is_empty() && self.duplicates.is_empty()
    }
}

/// Output of the deduplication engine, consumed by the transfer stage.
///
/// `unique_files` plus the members of every duplicate set partition the
/// input file set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeduplicationResult {
    /// Files with no near-duplicate
    pub unique_files: Vec<PathBuf>,
    /// Groups of near-duplicates with their chosen representatives
    pub duplicate_sets: Vec<DuplicateSet>,
}

impl DeduplicationResult {
    /// Total number of files across unique entries and duplicate sets.
    pub fn total_files(&self) -> usize {
        self.unique_files.len() + self.duplicate_sets.iter().map(DuplicateSet::len).sum::<usize>()
    }

    /// Number of files that will not survive transfer.
    pub fn duplicate_count(&self) -> usize {
        self.duplicate_sets.iter().map(|set| set.duplicates.len()).sum()
    }
}

/// Error recorded for a single file during the gather stage.
///
/// Per-file errors never abort the pipeline; they accumulate on the run's
/// error list and the file is excluded from deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatherError {
    /// Error message
    pub message: String,
    /// File the error applies to, when known
    pub path: Option<PathBuf>,
    /// Error category
    pub category: ErrorCategory,
}

/// Categories of per-file errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    FileSystem,
    Decode,
    Metadata,
    Cache,
    Transfer,
}
