//! CLI entry point for the media deduplicating organizer

use clap::{Parser, ValueEnum};
use mediasort::discovery::DiscoveryOptions;
use mediasort::gather::HashConfig;
use mediasort::transfer::{PathFormatter, TransferMode, TransferOptions};
use mediasort::{
    default_concurrency, HashAlgorithm, Pipeline, PipelineOptions, RunSummary, SimilarityConfig,
};
use std::path::PathBuf;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "mediasort")]
#[command(version)]
#[command(about = "Organizes photos and videos into a directory hierarchy, keeping the best copy of each duplicate group")]
struct Cli {
    /// One or more source directories followed by the destination directory
    #[arg(value_name = "PATH", num_args = 2.., required = true)]
    paths: Vec<PathBuf>,

    /// Directory receiving superseded duplicates (left in place when unset)
    #[arg(long, value_name = "DIR")]
    duplicates: Option<PathBuf>,

    /// Directory receiving unreadable files (left in place when unset)
    #[arg(long, value_name = "DIR")]
    errors: Option<PathBuf>,

    /// Cache directory (defaults to `.mediasort-cache` in the destination)
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Destination path template; placeholders: {year} {month} {day} {name}
    /// {ext} {camera} {type} {geo} {rand}
    #[arg(long, default_value = PathFormatter::DEFAULT_TEMPLATE)]
    format: String,

    /// Copy survivors instead of moving them
    #[arg(long)]
    copy: bool,

    /// Log placements without touching any file
    #[arg(long)]
    dry_run: bool,

    /// Number of parallel workers (default: cores - 1)
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Clustering batch size
    #[arg(long, default_value_t = 2048)]
    batch_size: usize,

    /// Minimum similarity for two images to count as duplicates
    #[arg(long, default_value_t = 0.9)]
    image_threshold: f64,

    /// Minimum similarity for an image/video pair
    #[arg(long, default_value_t = 0.93)]
    image_video_threshold: f64,

    /// Minimum similarity for two videos
    #[arg(long, default_value_t = 0.93)]
    video_threshold: f64,

    /// Window slide increment in seconds for video comparison
    #[arg(long, default_value_t = 1.0)]
    step_size: f64,

    /// Warping band half-width for sequence alignment; 0 disables the band
    #[arg(long, default_value_t = 0)]
    window_size: usize,

    /// Perceptual hash resolution in pixels per side
    #[arg(long, default_value_t = 8)]
    hash_resolution: u32,

    /// Hamming distance between frames that marks a scene change
    #[arg(long, default_value_t = 12)]
    scene_change_threshold: u32,

    /// Frame sampling rate for videos
    #[arg(long, default_value_t = 2.0)]
    target_fps: f64,

    /// Minimum number of frames kept per video
    #[arg(long, default_value_t = 2)]
    min_frames: usize,

    /// Upper bound on scene frames kept per video
    #[arg(long, default_value_t = 32)]
    max_scene_frames: usize,

    /// Content hash algorithm
    #[arg(long, value_enum, default_value_t = HashAlgorithmArg::Md5)]
    hash: HashAlgorithmArg,

    /// Glob patterns to exclude (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Follow symbolic links
    #[arg(long)]
    follow_links: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum HashAlgorithmArg {
    /// MD5 (fast, 128-bit)
    Md5,
    /// SHA-256
    Sha256,
}

impl From<HashAlgorithmArg> for HashAlgorithm {
    fn from(arg: HashAlgorithmArg) -> Self {
        match arg {
            HashAlgorithmArg::Md5 => HashAlgorithm::Md5,
            HashAlgorithmArg::Sha256 => HashAlgorithm::Sha256,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> mediasort::Result<i32> {
    let mut paths = cli.paths.clone();
    let destination = paths.pop().expect("clap enforces at least two paths");
    let sources = paths;

    for source in &sources {
        if !source.is_dir() {
            eprintln!("error: source is not a directory: {}", source.display());
            return Ok(1);
        }
    }

    let thresholds = [cli.image_threshold, cli.image_video_threshold, cli.video_threshold];
    if thresholds.iter().any(|t| !(0.0..=1.0).contains(t)) {
        eprintln!("error: similarity thresholds must be within [0, 1]");
        return Ok(1);
    }

    let similarity = SimilarityConfig {
        image_similarity_threshold: cli.image_threshold,
        image_video_similarity_threshold: cli.image_video_threshold,
        video_similarity_threshold: cli.video_threshold,
        step_size: cli.step_size,
        window_size: cli.window_size,
        hash_resolution: cli.hash_resolution,
        scene_change_threshold: cli.scene_change_threshold,
        target_fps: cli.target_fps,
        min_frames: cli.min_frames,
        max_scene_frames: cli.max_scene_frames,
    };

    let cache_dir = cli
        .cache_dir
        .unwrap_or_else(|| destination.join(".mediasort-cache"));
    tokio::fs::create_dir_all(&cache_dir).await?;

    let options = PipelineOptions {
        sources,
        discovery: DiscoveryOptions {
            exclude_patterns: cli.exclude,
            follow_symlinks: cli.follow_links,
            ..DiscoveryOptions::default()
        },
        similarity,
        hash: HashConfig {
            algorithm: cli.hash.into(),
            ..HashConfig::default()
        },
        cache_dir,
        concurrency: cli.concurrency.unwrap_or_else(default_concurrency),
        batch_size: cli.batch_size,
        transfer: TransferOptions {
            destination,
            duplicates_dir: cli.duplicates,
            errors_dir: cli.errors,
            mode: if cli.copy { TransferMode::Copy } else { TransferMode::Move },
            dry_run: cli.dry_run,
            formatter: PathFormatter::new(cli.format),
        },
    };

    let pipeline = Pipeline::new(options)?;

    // Periodically surface progress while the run is going
    let mut events = pipeline.progress().subscribe();
    let reporter = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(
                processed = event.progress.files_processed,
                discovered = event.progress.files_discovered,
                errors = event.progress.errors,
                "progress {:.1}%",
                event.progress.percentage()
            );
        }
    });

    let summary = tokio::select! {
        outcome = pipeline.run() => {
            reporter.abort();
            outcome?
        }
        _ = tokio::signal::ctrl_c() => {
            reporter.abort();
            eprintln!("\ninterrupted, flushing cache...");
            if let Err(err) = pipeline.flush_cache().await {
                eprintln!("cache flush failed: {err}");
            }
            return Ok(130);
        }
    };

    print_summary(&summary);
    Ok(0)
}

fn print_summary(summary: &RunSummary) {
    println!("Discovered {} media files", summary.discovered);
    println!("Fingerprinted {} files", summary.processed);
    println!(
        "Found {} duplicate sets covering {} superseded files",
        summary.duplicate_sets, summary.duplicate_files
    );
    println!("Unique files: {}", summary.unique_files);
    println!("Transferred {} files", summary.transferred);
    if !summary.errors.is_empty() {
        println!("Errors: {}", summary.errors.len());
        for error in &summary.errors {
            match &error.path {
                Some(path) => println!("  {}: {}", path.display(), error.message),
                None => println!("  {}", error.message),
            }
        }
    }
    println!("Completed in {:.1}s", summary.elapsed_seconds);
}
