//! Similarity kernel for images, videos, and image/video cross-matches

use crate::config::SimilarityConfig;
use crate::models::{FrameInfo, MediaInfo};
use crate::Result;
use tracing::warn;

/// Computes perceptual similarity between media fingerprints.
///
/// Also exposes the derived metric used by the neighbor index: duplicate
/// candidates are searched with the loosest threshold's radius and then
/// revalidated pair-by-pair with the adaptive threshold.
#[derive(Debug, Clone)]
pub struct SimilarityKernel {
    config: SimilarityConfig,
}

impl SimilarityKernel {
    /// Create a kernel for the given configuration.
    pub fn new(config: SimilarityConfig) -> Self {
        Self { config }
    }

    /// The configuration this kernel was built with.
    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// Similarity in `[0, 1]` between two media fingerprints.
    ///
    /// Dispatches on media kind: image/image compares the single frames,
    /// image/video scans the video for the best-matching frame, and
    /// video/video slides the shorter media across the longer one.
    pub fn similarity(&self, a: &MediaInfo, b: &MediaInfo) -> Result<f64> {
        match (a.is_video(), b.is_video()) {
            (false, false) => match (a.frames.first(), b.frames.first()) {
                (Some(fa), Some(fb)) => Self::image_similarity(fa, fb),
                _ => Ok(0.0),
            },
            (false, true) => self.image_video_similarity(a, b),
            (true, false) => self.image_video_similarity(b, a),
            (true, true) => self.video_similarity(a, b),
        }
    }

    /// The threshold this specific pair must meet to count as duplicates.
    pub fn adaptive_threshold(&self, a: &MediaInfo, b: &MediaInfo) -> f64 {
        self.config.adaptive_threshold(a.is_video(), b.is_video())
    }

    /// Metric distance `1 - similarity`, clamped to `[0, 1]`.
    ///
    /// Similarity-derived distances may mildly violate the triangle
    /// inequality; the index treats that as an accepted approximation.
    /// Out-of-range or non-finite values are clamped and logged.
    pub fn distance(&self, a: &MediaInfo, b: &MediaInfo) -> Result<f64> {
        let distance = 1.0 - self.similarity(a, b)?;
        if !distance.is_finite() || !(0.0..=1.0).contains(&distance) {
            warn!(distance, "metric produced an out-of-range distance, clamping");
            return Ok(if distance.is_finite() { distance.clamp(0.0, 1.0) } else { 1.0 });
        }
        Ok(distance)
    }

    /// Similarity of two single frames: `1 - hamming / bitlen`.
    fn image_similarity(a: &FrameInfo, b: &FrameInfo) -> Result<f64> {
        let distance = a.hash.distance(&b.hash)?;
        Ok(1.0 - f64::from(distance) / a.hash.bit_len() as f64)
    }

    /// Best frame match between a still image and a video.
    ///
    /// Scans the video's frames for the maximum single-frame similarity and
    /// stops early once the threshold is reached.
    fn image_video_similarity(&self, image: &MediaInfo, video: &MediaInfo) -> Result<f64> {
        let Some(image_frame) = image.frames.first() else {
            return Ok(0.0);
        };
        let mut best = 0.0f64;
        for frame in &video.frames {
            best = best.max(Self::image_similarity(image_frame, frame)?);
            if best >= self.config.image_video_similarity_threshold {
                break;
            }
        }
        Ok(best)
    }

    /// Windowed similarity between two videos.
    ///
    /// The shorter media is the query; a window of its duration slides
    /// across the longer media in `step_size` increments and each window's
    /// frames are aligned against the full query by dynamic time warping.
    /// Returns the maximum over all offsets, stopping early at the
    /// threshold.
    fn video_similarity(&self, a: &MediaInfo, b: &MediaInfo) -> Result<f64> {
        let (query, target) = if a.duration <= b.duration { (a, b) } else { (b, a) };
        if query.frames.is_empty() || target.frames.is_empty() {
            return Ok(0.0);
        }

        let window = query.duration;
        let span = (target.duration - window).max(0.0);
        let step = self.config.step_size.max(1e-3);

        let mut best = 0.0f64;
        let mut start = 0.0f64;
        loop {
            let lo = target.frames.partition_point(|f| f.timestamp < start - 1e-9);
            let hi = target.frames.partition_point(|f| f.timestamp <= start + window + 1e-9);
            if lo < hi {
                best = best.max(self.sequence_similarity(&query.frames, &target.frames[lo..hi])?);
                if best >= self.config.video_similarity_threshold {
                    return Ok(best);
                }
            }
            if start >= span {
                break;
            }
            start = (start + step).min(span);
        }
        Ok(best)
    }

    /// Alignment-free sequence similarity by dynamic time warping.
    ///
    /// Keeps a single rolling cost row; per-cell cost is one minus the
    /// frame similarity. A non-zero `window_size` restricts the warping
    /// path to a band around the diagonal.
    fn sequence_similarity(&self, s1: &[FrameInfo], s2: &[FrameInfo]) -> Result<f64> {
        let (m, n) = (s1.len(), s2.len());
        if m == 0 || n == 0 {
            return Ok(0.0);
        }

        let mut row = vec![f64::INFINITY; n + 1];
        row[0] = 0.0;

        for i in 1..=m {
            let mut prev = row[0];
            row[0] = f64::INFINITY;
            for j in 1..=n {
                let saved = row[j];
                let banded = self.config.window_size > 0
                    && (i as i64 - j as i64).unsigned_abs() as usize > self.config.window_size;
                if banded {
                    row[j] = f64::INFINITY;
                } else {
                    let cost = 1.0 - Self::image_similarity(&s1[i - 1], &s2[j - 1])?;
                    row[j] = cost + prev.min(row[j]).min(row[j - 1]);
                }
                prev = saved;
            }
        }

        Ok(1.0 - row[n] / m.max(n) as f64)
    }
}
