//! Similarity configuration and its canonical fingerprint

use serde::{Deserialize, Serialize};

/// Tunables for perceptual hashing and similarity comparison.
///
/// The canonical JSON encoding of this record (see [`fingerprint`]) is
/// stored next to every cache entry; a stored fingerprint that differs
/// from the current one marks the entry as stale.
///
/// [`fingerprint`]: SimilarityConfig::fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Minimum similarity for two still images to be considered duplicates
    pub image_similarity_threshold: f64,
    /// Minimum similarity for an image/video pair
    pub image_video_similarity_threshold: f64,
    /// Minimum similarity for two videos
    pub video_similarity_threshold: f64,
    /// Window slide increment in seconds for video comparison
    pub step_size: f64,
    /// Warping band half-width for sequence alignment; 0 disables the band
    pub window_size: usize,
    /// Perceptual hash resolution in pixels per side
    pub hash_resolution: u32,
    /// Hamming distance between consecutive frames that marks a scene change
    pub scene_change_threshold: u32,
    /// Frame sampling rate for videos
    pub target_fps: f64,
    /// Minimum number of frames kept per video
    pub min_frames: usize,
    /// Upper bound on scene frames kept per video
    pub max_scene_frames: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            image_similarity_threshold: 0.9,
            image_video_similarity_threshold: 0.93,
            video_similarity_threshold: 0.93,
            step_size: 1.0,
            window_size: 0,
            hash_resolution: 8,
            scene_change_threshold: 12,
            target_fps: 2.0,
            min_frames: 2,
            max_scene_frames: 32,
        }
    }
}

impl SimilarityConfig {
    /// Canonical serialization used for cache invalidation.
    ///
    /// serde_json emits struct fields in declaration order, which is stable
    /// across runs, so value-equal configs always produce byte-equal
    /// fingerprints.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).expect("similarity config serializes")
    }

    /// The loosest of the three pair thresholds.
    pub fn min_threshold(&self) -> f64 {
        self.image_similarity_threshold
            .min(self.image_video_similarity_threshold)
            .min(self.video_similarity_threshold)
    }

    /// Neighbor-search radius: the widest net any media pairing can need.
    /// Per-pair acceptance is tightened afterwards by the adaptive threshold.
    pub fn epsilon(&self) -> f64 {
        1.0 - self.min_threshold()
    }

    /// The threshold a specific pairing must meet: image/image, mixed, or
    /// video/video.
    pub fn adaptive_threshold(&self, a_is_video: bool, b_is_video: bool) -> f64 {
        match (a_is_video, b_is_video) {
            (false, false) => self.image_similarity_threshold,
            (true, true) => self.video_similarity_threshold,
            _ => self.image_video_similarity_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_equal_values() {
        let a = SimilarityConfig::default();
        let b = SimilarityConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_any_field() {
        let base = SimilarityConfig::default();
        let variants = [
            SimilarityConfig { image_similarity_threshold: 0.8, ..base.clone() },
            SimilarityConfig { image_video_similarity_threshold: 0.8, ..base.clone() },
            SimilarityConfig { video_similarity_threshold: 0.8, ..base.clone() },
            SimilarityConfig { step_size: 0.5, ..base.clone() },
            SimilarityConfig { window_size: 4, ..base.clone() },
            SimilarityConfig { hash_resolution: 16, ..base.clone() },
            SimilarityConfig { scene_change_threshold: 20, ..base.clone() },
            SimilarityConfig { target_fps: 1.0, ..base.clone() },
            SimilarityConfig { min_frames: 4, ..base.clone() },
            SimilarityConfig { max_scene_frames: 64, ..base.clone() },
        ];
        for variant in variants {
            assert_ne!(base.fingerprint(), variant.fingerprint());
        }
    }

    #[test]
    fn epsilon_derives_from_loosest_threshold() {
        let config = SimilarityConfig {
            image_similarity_threshold: 0.9,
            image_video_similarity_threshold: 0.95,
            video_similarity_threshold: 0.93,
            ..SimilarityConfig::default()
        };
        assert!((config.epsilon() - 0.1).abs() < 1e-12);
        assert_eq!(config.adaptive_threshold(false, false), 0.9);
        assert_eq!(config.adaptive_threshold(false, true), 0.95);
        assert_eq!(config.adaptive_threshold(true, false), 0.95);
        assert_eq!(config.adaptive_threshold(true, true), 0.93);
    }
}
