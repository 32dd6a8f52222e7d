//! Gather stage: file stats, capture metadata, and perceptual fingerprints

use crate::cache::CachedJob;
use crate::config::SimilarityConfig;
use crate::framehash::{grayscale_square, hash_frame, select_frames};
use crate::models::{FileInfo, FileStats, FrameInfo, MediaInfo, MediaMetadata};
use crate::store::CacheStore;
use crate::{discovery, Error, HashAlgorithm, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, BufReader};

/// Settings for content hashing, stored next to cached file stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashConfig {
    /// Digest algorithm for the content fingerprint
    pub algorithm: HashAlgorithm,
    /// Files above this size hash a head+tail sample instead of all bytes
    pub max_chunk_size: u64,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Md5,
            max_chunk_size: 2 * 1024 * 1024,
        }
    }
}

/// Schema marker for cached metadata entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataConfig {
    pub version: u32,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self { version: 1 }
    }
}

/// A decoded frame handed to the hasher: R×R grayscale samples.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Offset from the start of the media, in seconds
    pub timestamp: f64,
    /// `hash_resolution²` grayscale samples
    pub pixels: Vec<u8>,
}

/// Decoder output for one media file.
#[derive(Debug, Clone)]
pub struct DecodedMedia {
    /// Playback length in seconds; 0 for still images
    pub duration: f64,
    /// Decoded frames in timestamp order
    pub frames: Vec<DecodedFrame>,
}

/// Supplies decoded grayscale frames for a media file.
///
/// Implementations must be deterministic per `(path, config)`. They run on
/// the blocking pool, so plain synchronous decoding is expected.
pub trait MediaDecoder: Send + Sync {
    fn decode(&self, path: &Path, config: &SimilarityConfig) -> Result<DecodedMedia>;
}

/// Default decoder: stills through the `image` crate, videos delegated to
/// an optional pluggable decoder.
///
/// Without a wired video decoder, video files surface as unreadable inputs
/// and are excluded from deduplication rather than failing the run.
pub struct StandardDecoder {
    video: Option<Arc<dyn MediaDecoder>>,
}

impl StandardDecoder {
    pub fn new() -> Self {
        Self { video: None }
    }

    pub fn with_video_decoder(video: Arc<dyn MediaDecoder>) -> Self {
        Self { video: Some(video) }
    }
}

impl Default for StandardDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaDecoder for StandardDecoder {
    fn decode(&self, path: &Path, config: &SimilarityConfig) -> Result<DecodedMedia> {
        if discovery::is_video_path(path) {
            return match &self.video {
                Some(video) => video.decode(path, config),
                None => Err(Error::unreadable(path, "no video decoder configured")),
            };
        }

        let image = image::open(path).map_err(|err| Error::unreadable(path, err))?;
        let pixels = grayscale_square(&image, config.hash_resolution);
        Ok(DecodedMedia {
            duration: 0.0,
            frames: vec![DecodedFrame { timestamp: 0.0, pixels }],
        })
    }
}

/// Produces one immutable [`FileInfo`] per path, memoized end to end.
///
/// Stats are keyed by path, size, and mtime, so touched files recompute
/// their content hash. Metadata and fingerprints are keyed by the content
/// hash and validated against the current configuration.
pub struct Gatherer {
    stats_job: CachedJob<HashConfig, FileStats>,
    metadata_job: CachedJob<MetadataConfig, MediaMetadata>,
    frames_job: CachedJob<SimilarityConfig, MediaInfo>,
    decoder: Arc<dyn MediaDecoder>,
    hash_config: HashConfig,
    similarity: SimilarityConfig,
}

impl Gatherer {
    /// Create a gatherer over the given cache store.
    pub fn new(
        store: &CacheStore,
        similarity: SimilarityConfig,
        hash_config: HashConfig,
        decoder: Arc<dyn MediaDecoder>,
    ) -> Result<Self> {
        Ok(Self {
            stats_job: CachedJob::new(store, "file_stats", hash_config.clone())?,
            metadata_job: CachedJob::new(store, "metadata", MetadataConfig::default())?,
            frames_job: CachedJob::new(store, "frames", similarity.clone())?,
            decoder,
            hash_config,
            similarity,
        })
    }

    /// Gather (or recall) everything known about one file.
    pub async fn process(&self, path: &Path) -> Result<FileInfo> {
        let fs_meta = tokio::fs::metadata(path)
            .await
            .map_err(|err| Error::unreadable(path, err))?;
        let size = fs_meta.len();
        let modified = fs_meta.modified().unwrap_or(UNIX_EPOCH);
        let created = fs_meta.created().unwrap_or(modified);

        let stats_key = format!("{}|{}|{}", path.display(), size, unix_seconds(modified));
        let stats = self
            .stats_job
            .get_or_compute(&stats_key, || async move {
                let content_hash =
                    content_hash(path, self.hash_config.algorithm, self.hash_config.max_chunk_size)
                        .await?;
                Ok(FileStats { size, modified, created, content_hash })
            })
            .await?;

        let content_key = stats.content_hash.clone();
        let (metadata, media) = tokio::try_join!(
            self.metadata_job.get_or_compute(&content_key, || {
                let path = path.to_path_buf();
                async move {
                    tokio::task::spawn_blocking(move || read_metadata(&path)).await?
                }
            }),
            self.frames_job.get_or_compute(&content_key, || {
                let path = path.to_path_buf();
                let decoder = self.decoder.clone();
                let config = self.similarity.clone();
                async move {
                    tokio::task::spawn_blocking(move || fingerprint(&path, &config, decoder.as_ref()))
                        .await?
                }
            }),
        )?;

        Ok(FileInfo {
            path: path.to_path_buf(),
            stats,
            metadata,
            media: Arc::new(media),
        })
    }
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Decode a file and hash its frames into a fingerprint.
fn fingerprint(path: &Path, config: &SimilarityConfig, decoder: &dyn MediaDecoder) -> Result<MediaInfo> {
    let decoded = decoder.decode(path, config)?;

    let mut frames = Vec::with_capacity(decoded.frames.len());
    for frame in decoded.frames {
        frames.push(FrameInfo {
            hash: hash_frame(&frame.pixels, config.hash_resolution)?,
            timestamp: frame.timestamp,
        });
    }
    frames.sort_by(|a, b| a.timestamp.partial_cmp(&b.timestamp).unwrap_or(std::cmp::Ordering::Equal));

    if decoded.duration > 0.0 {
        frames = select_frames(frames, config);
    }
    Ok(MediaInfo { duration: decoded.duration, frames })
}

/// Streaming digest over either supported algorithm.
enum ContentDigest {
    Md5(md5::Context),
    Sha256(Sha256),
}

impl ContentDigest {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Self::Md5(md5::Context::new()),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Md5(context) => context.consume(bytes),
            Self::Sha256(hasher) => hasher.update(bytes),
        }
    }

    fn finish(self) -> String {
        match self {
            Self::Md5(context) => format!("{:x}", context.compute()),
            Self::Sha256(hasher) => format!("{:x}", hasher.finalize()),
        }
    }
}

/// Short content fingerprint of a file.
///
/// Files up to `max_chunk_size` bytes hash in full; larger files hash the
/// leading and trailing `max_chunk_size / 2` bytes plus the length, which
/// keeps the key stable and cheap for multi-gigabyte videos.
pub async fn content_hash(
    path: &Path,
    algorithm: HashAlgorithm,
    max_chunk_size: u64,
) -> Result<String> {
    let file = File::open(path).await.map_err(|err| Error::unreadable(path, err))?;
    let size = file.metadata().await?.len();
    let mut reader = BufReader::new(file);
    let mut digest = ContentDigest::new(algorithm);
    let mut buffer = [0u8; 8192];

    if size <= max_chunk_size {
        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            digest.update(&buffer[..read]);
        }
    } else {
        let half = max_chunk_size / 2;
        digest.update(&size.to_le_bytes());

        let mut remaining = half;
        while remaining > 0 {
            let want = (buffer.len() as u64).min(remaining) as usize;
            let read = reader.read(&mut buffer[..want]).await?;
            if read == 0 {
                break;
            }
            digest.update(&buffer[..read]);
            remaining -= read as u64;
        }

        reader.seek(SeekFrom::End(-(half as i64))).await?;
        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            digest.update(&buffer[..read]);
        }
    }

    Ok(digest.finish())
}

/// Read capture metadata from a file: EXIF fields when present, with the
/// image header as a fallback for pixel dimensions.
pub fn read_metadata(path: &Path) -> Result<MediaMetadata> {
    let mut metadata = MediaMetadata::default();

    if let Ok(file) = std::fs::File::open(path) {
        let mut reader = std::io::BufReader::new(file);
        if let Ok(exif) = exif::Reader::new().read_from_container(&mut reader) {
            metadata.image_date = exif_date(&exif);
            metadata.gps_latitude =
                gps_coordinate(&exif, exif::Tag::GPSLatitude, exif::Tag::GPSLatitudeRef, "S");
            metadata.gps_longitude =
                gps_coordinate(&exif, exif::Tag::GPSLongitude, exif::Tag::GPSLongitudeRef, "W");
            metadata.camera_model = camera_model(&exif);
            metadata.width = exif_uint(&exif, exif::Tag::PixelXDimension);
            metadata.height = exif_uint(&exif, exif::Tag::PixelYDimension);
        }
    }

    if (metadata.width.is_none() || metadata.height.is_none())
        && !discovery::is_video_path(path)
    {
        if let Ok((width, height)) = image::image_dimensions(path) {
            metadata.width = Some(width);
            metadata.height = Some(height);
        }
    }

    Ok(metadata)
}

fn ascii_field(exif: &exif::Exif, tag: exif::Tag) -> Option<String> {
    let field = exif.get_field(tag, exif::In::PRIMARY)?;
    match &field.value {
        exif::Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn exif_uint(exif: &exif::Exif, tag: exif::Tag) -> Option<u32> {
    exif.get_field(tag, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
}

fn exif_date(exif: &exif::Exif) -> Option<chrono::DateTime<chrono::Utc>> {
    let raw = ascii_field(exif, exif::Tag::DateTimeOriginal)
        .or_else(|| ascii_field(exif, exif::Tag::DateTime))?;
    chrono::NaiveDateTime::parse_from_str(&raw, "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn gps_coordinate(
    exif: &exif::Exif,
    tag: exif::Tag,
    ref_tag: exif::Tag,
    negative_ref: &str,
) -> Option<f64> {
    let field = exif.get_field(tag, exif::In::PRIMARY)?;
    let exif::Value::Rational(parts) = &field.value else {
        return None;
    };
    let degrees = parts.first()?.to_f64()
        + parts.get(1).map_or(0.0, |m| m.to_f64() / 60.0)
        + parts.get(2).map_or(0.0, |s| s.to_f64() / 3600.0);

    let sign = match ascii_field(exif, ref_tag) {
        Some(reference) if reference.eq_ignore_ascii_case(negative_ref) => -1.0,
        _ => 1.0,
    };
    Some(sign * degrees)
}

fn camera_model(exif: &exif::Exif) -> Option<String> {
    let make = ascii_field(exif, exif::Tag::Make);
    let model = ascii_field(exif, exif::Tag::Model);
    match (make, model) {
        (Some(make), Some(model)) => Some(format!("{make} {model}")),
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}
