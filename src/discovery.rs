//! Media file discovery across the source directories

use crate::models::{ErrorCategory, GatherError};
use glob::Pattern;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Still image extensions handled by the pipeline.
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "heic", "heif",
];

/// Video extensions handled by the pipeline.
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "m4v", "3gp", "mts", "m2ts", "wmv",
];

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Whether the path carries a known video extension.
pub fn is_video_path(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether the path carries a known still-image extension.
pub fn is_image_path(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether the path is media the pipeline can process at all.
pub fn is_media_path(path: &Path) -> bool {
    is_image_path(path) || is_video_path(path)
}

/// Options for media discovery.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Glob patterns to exclude (e.g. `*.tmp`, `thumbnails/*`)
    pub exclude_patterns: Vec<String>,
    /// Skip files smaller than this many bytes
    pub min_file_size: Option<u64>,
    /// Skip files larger than this many bytes
    pub max_file_size: Option<u64>,
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Maximum traversal depth
    pub max_depth: Option<usize>,
}

/// Recursive walker that collects media paths and per-entry errors.
///
/// Errors never stop the walk; they are recorded so the run can report
/// which files were skipped and why.
pub struct MediaDiscovery {
    options: DiscoveryOptions,
    visited_inodes: HashSet<u64>,
    errors: Vec<GatherError>,
}

impl MediaDiscovery {
    /// Create a walker with the given options.
    pub fn new(options: DiscoveryOptions) -> Self {
        Self {
            options,
            visited_inodes: HashSet::new(),
            errors: Vec::new(),
        }
    }

    /// Walk the source directories and collect every matching media path.
    pub fn discover(&mut self, sources: &[PathBuf]) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for source in sources {
            self.walk(source, &mut files);
        }
        files
    }

    /// Errors recorded while walking.
    pub fn errors(&self) -> &[GatherError] {
        &self.errors
    }

    fn walk(&mut self, root: &Path, files: &mut Vec<PathBuf>) {
        let mut walker = WalkDir::new(root).follow_links(self.options.follow_symlinks);
        if let Some(max_depth) = self.options.max_depth {
            walker = walker.max_depth(max_depth);
        }

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if let Some(path) = self.accept(&entry) {
                        files.push(path);
                    }
                }
                Err(err) => {
                    self.errors.push(GatherError {
                        message: format!("error walking directory: {err}"),
                        path: err.path().map(Path::to_path_buf),
                        category: ErrorCategory::FileSystem,
                    });
                }
            }
        }
    }

    fn accept(&mut self, entry: &DirEntry) -> Option<PathBuf> {
        let path = entry.path();
        if !entry.file_type().is_file() {
            return None;
        }
        if !is_media_path(path) {
            return None;
        }
        if self.is_excluded(path) {
            return None;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                self.errors.push(GatherError {
                    message: format!("cannot stat {}: {err}", path.display()),
                    path: Some(path.to_path_buf()),
                    category: ErrorCategory::FileSystem,
                });
                return None;
            }
        };

        // Symlink loops surface as revisited inodes
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            if self.options.follow_symlinks && !self.visited_inodes.insert(metadata.ino()) {
                return None;
            }
        }

        if let Some(min) = self.options.min_file_size {
            if metadata.len() < min {
                return None;
            }
        }
        if let Some(max) = self.options.max_file_size {
            if metadata.len() > max {
                return None;
            }
        }

        Some(path.to_path_buf())
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        let name = path.file_name().map(|n| n.to_string_lossy());
        self.options.exclude_patterns.iter().any(|pattern| {
            Pattern::new(pattern).is_ok_and(|pattern| {
                pattern.matches(&text)
                    || name.as_deref().is_some_and(|name| pattern.matches(name))
            })
        })
    }
}
