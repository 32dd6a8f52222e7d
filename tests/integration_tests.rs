//! End-to-end pipeline tests over real files and synthetic decoders

use mediasort::config::SimilarityConfig;
use mediasort::discovery::DiscoveryOptions;
use mediasort::gather::{DecodedFrame, DecodedMedia, HashConfig, MediaDecoder, StandardDecoder};
use mediasort::transfer::{PathFormatter, TransferMode, TransferOptions};
use mediasort::{Pipeline, PipelineOptions, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

struct Dirs {
    source: TempDir,
    dest: TempDir,
    duplicates: TempDir,
    cache: TempDir,
}

impl Dirs {
    fn new() -> Self {
        Self {
            source: TempDir::new().unwrap(),
            dest: TempDir::new().unwrap(),
            duplicates: TempDir::new().unwrap(),
            cache: TempDir::new().unwrap(),
        }
    }

    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            sources: vec![self.source.path().to_path_buf()],
            discovery: DiscoveryOptions::default(),
            similarity: SimilarityConfig::default(),
            hash: HashConfig::default(),
            cache_dir: self.cache.path().to_path_buf(),
            concurrency: 2,
            batch_size: 2048,
            transfer: TransferOptions {
                destination: self.dest.path().to_path_buf(),
                duplicates_dir: Some(self.duplicates.path().to_path_buf()),
                errors_dir: None,
                mode: TransferMode::Copy,
                dry_run: false,
                formatter: PathFormatter::new("{name}.{ext}"),
            },
        }
    }
}

fn count_files(root: &Path) -> usize {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .count()
}

/// A half-dark, half-bright frame: its mean-threshold hash is the bright
/// half, which makes similarity outcomes easy to reason about.
fn save_split_image(path: &Path, invert: bool) {
    let image = image::GrayImage::from_fn(64, 64, |x, _| {
        let bright = (x >= 32) != invert;
        image::Luma([if bright { 255 } else { 0 }])
    });
    image.save(path).unwrap();
}

/// Same split layout with a mild corner tint; the perceptual hash cannot
/// tell them apart even though the bytes differ.
fn save_split_image_variant(path: &Path) {
    let image = image::GrayImage::from_fn(64, 64, |x, y| {
        let mut value = if x >= 32 { 255u8 } else { 0u8 };
        if x < 8 && y < 8 {
            value = 12;
        }
        image::Luma([value])
    });
    image.save(path).unwrap();
}

#[tokio::test]
async fn exact_copies_collapse_to_one_survivor() {
    let dirs = Dirs::new();
    save_split_image(&dirs.source.path().join("a.png"), false);
    std::fs::copy(
        dirs.source.path().join("a.png"),
        dirs.source.path().join("a_copy.png"),
    )
    .unwrap();

    let pipeline = Pipeline::new(dirs.options()).unwrap();
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.duplicate_sets, 1);
    assert_eq!(summary.duplicate_files, 1);
    assert_eq!(summary.transferred, 1);
    assert_eq!(count_files(dirs.dest.path()), 1);
    assert_eq!(count_files(dirs.duplicates.path()), 1);
}

#[tokio::test]
async fn re_encoded_variants_cluster_with_the_original() {
    let dirs = Dirs::new();
    save_split_image(&dirs.source.path().join("a.png"), false);
    save_split_image_variant(&dirs.source.path().join("a2.png"));

    let pipeline = Pipeline::new(dirs.options()).unwrap();
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.duplicate_sets, 1);
    assert_eq!(summary.unique_files, 0);
    assert_eq!(count_files(dirs.dest.path()), 1);
}

#[tokio::test]
async fn distinct_photos_both_survive() {
    let dirs = Dirs::new();
    save_split_image(&dirs.source.path().join("left.png"), false);
    save_split_image(&dirs.source.path().join("right.png"), true);

    let pipeline = Pipeline::new(dirs.options()).unwrap();
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.duplicate_sets, 0);
    assert_eq!(summary.unique_files, 2);
    assert_eq!(summary.transferred, 2);
    assert_eq!(count_files(dirs.duplicates.path()), 0);
}

/// Decodes stills as a fixed pattern and `.mp4` files as a clip whose first
/// frame shows the same pattern, imitating a live-photo pair.
struct LivePhotoDecoder {
    fallback: StandardDecoder,
}

impl LivePhotoDecoder {
    fn pattern(resolution: u32) -> Vec<u8> {
        let side = resolution as usize;
        (0..side * side)
            .map(|i| if i % side < side / 2 { 0 } else { 255 })
            .collect()
    }
}

impl MediaDecoder for LivePhotoDecoder {
    fn decode(&self, path: &Path, config: &SimilarityConfig) -> Result<DecodedMedia> {
        if path.extension().and_then(|e| e.to_str()) == Some("mp4") {
            let pattern = Self::pattern(config.hash_resolution);
            let side = config.hash_resolution as usize;
            let unrelated: Vec<u8> = (0..side * side).map(|i| (i * 7 % 256) as u8).collect();
            return Ok(DecodedMedia {
                duration: 3.0,
                frames: vec![
                    DecodedFrame { timestamp: 0.0, pixels: pattern },
                    DecodedFrame { timestamp: 1.5, pixels: unrelated.clone() },
                    DecodedFrame { timestamp: 3.0, pixels: unrelated },
                ],
            });
        }
        self.fallback.decode(path, config)
    }
}

#[tokio::test]
async fn live_photo_video_wins_and_keeps_the_still() {
    let dirs = Dirs::new();
    // The real still decodes to the same split pattern the fake clip opens with
    save_split_image(&dirs.source.path().join("photo.png"), false);
    std::fs::write(dirs.source.path().join("photo.mp4"), b"stand-in clip").unwrap();

    let decoder = Arc::new(LivePhotoDecoder { fallback: StandardDecoder::new() });
    let pipeline = Pipeline::with_decoder(dirs.options(), decoder).unwrap();
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.duplicate_sets, 1);
    assert_eq!(summary.duplicate_files, 0);
    // Both the clip and its capture still survive as representatives
    assert_eq!(summary.transferred, 2);
    assert_eq!(count_files(dirs.duplicates.path()), 0);
}

/// Counts decode calls so cache hits are observable.
struct CountingDecoder {
    calls: AtomicUsize,
    inner: StandardDecoder,
}

impl MediaDecoder for CountingDecoder {
    fn decode(&self, path: &Path, config: &SimilarityConfig) -> Result<DecodedMedia> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.decode(path, config)
    }
}

#[tokio::test]
async fn second_run_is_served_from_the_cache() {
    let dirs = Dirs::new();
    save_split_image(&dirs.source.path().join("a.png"), false);
    save_split_image(&dirs.source.path().join("b.png"), true);

    let decoder = Arc::new(CountingDecoder {
        calls: AtomicUsize::new(0),
        inner: StandardDecoder::new(),
    });

    {
        let first = Pipeline::with_decoder(dirs.options(), decoder.clone()).unwrap();
        first.run().await.unwrap();
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 2);
    }

    // New pipeline, same cache directory: nothing decodes again
    let second = Pipeline::with_decoder(dirs.options(), decoder.clone()).unwrap();
    second.run().await.unwrap();
    assert_eq!(decoder.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn config_change_invalidates_the_cache_between_runs() {
    let dirs = Dirs::new();
    save_split_image(&dirs.source.path().join("a.png"), false);

    let decoder = Arc::new(CountingDecoder {
        calls: AtomicUsize::new(0),
        inner: StandardDecoder::new(),
    });

    Pipeline::with_decoder(dirs.options(), decoder.clone())
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);

    let mut options = dirs.options();
    options.similarity.hash_resolution = 16;
    Pipeline::with_decoder(options, decoder.clone())
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(decoder.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn broken_files_are_reported_and_the_rest_proceed() {
    let dirs = Dirs::new();
    save_split_image(&dirs.source.path().join("good.png"), false);
    std::fs::write(dirs.source.path().join("broken.png"), b"not an image").unwrap();

    let pipeline = Pipeline::new(dirs.options()).unwrap();
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.transferred, 1);
}

#[tokio::test]
async fn results_partition_the_processed_files() {
    let dirs = Dirs::new();
    save_split_image(&dirs.source.path().join("a.png"), false);
    std::fs::copy(
        dirs.source.path().join("a.png"),
        dirs.source.path().join("b.png"),
    )
    .unwrap();
    save_split_image(&dirs.source.path().join("c.png"), true);

    let pipeline = Pipeline::new(dirs.options()).unwrap();
    let summary = pipeline.run().await.unwrap();

    // Every processed file is either unique, a representative, or a duplicate
    let accounted = summary.unique_files
        + summary.duplicate_files
        + summary
            .duplicate_sets; // one representative per set in this scenario
    assert_eq!(summary.processed, 3);
    assert_eq!(accounted, 3);
}

#[tokio::test]
async fn transferred_files_follow_the_template() {
    let dirs = Dirs::new();
    save_split_image(&dirs.source.path().join("holiday.png"), false);

    let mut options = dirs.options();
    options.transfer.formatter = PathFormatter::new("{type}/{year}/{name}.{ext}");
    let pipeline = Pipeline::new(options).unwrap();
    pipeline.run().await.unwrap();

    let placed: Vec<PathBuf> = walkdir::WalkDir::new(dirs.dest.path())
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    assert_eq!(placed.len(), 1);
    let relative = placed[0].strip_prefix(dirs.dest.path()).unwrap();
    let components: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    assert_eq!(components[0], "image");
    assert_eq!(components[2], "holiday.png");
}
