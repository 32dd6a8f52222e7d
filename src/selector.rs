//! Scoring policy for picking the surviving file of a duplicate group

use crate::models::FileInfo;

/// Score a file for representative selection.
///
/// Videos dominate stills, then capture metadata, then resolution, then
/// file size as the final nudge. Higher is better; ties are broken by
/// insertion order downstream.
pub fn score(file: &FileInfo) -> f64 {
    let mut score = 0.0;

    if file.media.duration > 0.0 {
        score += 10_000.0;
    }
    score += 100.0 * (file.media.duration + 1.0).ln();

    if file.metadata.image_date.is_some() {
        score += 2_000.0;
    }
    if file.metadata.has_gps() {
        score += 300.0;
    }
    if file.metadata.camera_model.is_some() {
        score += 200.0;
    }
    let pixels = file.metadata.pixel_count();
    if pixels > 0 {
        score += (pixels as f64).sqrt();
    }
    score += 5.0 * (file.stats.size.max(1) as f64).ln();

    score
}

/// Order cluster members by descending score, preserving insertion order
/// among equals.
pub fn rank<'a>(members: &[&'a FileInfo]) -> Vec<&'a FileInfo> {
    let mut ranked: Vec<&FileInfo> = members.to_vec();
    ranked.sort_by(|a, b| {
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

/// Whether a still could be the capture frame of the winning video.
///
/// A capture candidate is a still image at least as large as the best
/// file, and it must not lose metadata: when the best file has a capture
/// date, the candidate needs one too.
pub fn is_potential_capture(best: &FileInfo, candidate: &FileInfo) -> bool {
    if candidate.media.duration > 0.0 {
        return false;
    }
    if candidate.metadata.pixel_count() < best.metadata.pixel_count() {
        return false;
    }
    best.metadata.image_date.is_none() || candidate.metadata.image_date.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bithash::BitHash;
    use crate::models::{FileStats, MediaInfo, MediaMetadata};
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::SystemTime;

    fn file(name: &str, duration: f64, metadata: MediaMetadata, size: u64) -> FileInfo {
        let media = MediaInfo {
            duration,
            frames: MediaInfo::image(BitHash::from_bytes(vec![0; 8])).frames,
        };
        FileInfo {
            path: PathBuf::from(name),
            stats: FileStats {
                size,
                modified: SystemTime::UNIX_EPOCH,
                created: SystemTime::UNIX_EPOCH,
                content_hash: format!("hash-{name}"),
            },
            metadata,
            media: Arc::new(media),
        }
    }

    fn dated() -> MediaMetadata {
        MediaMetadata {
            image_date: Some(Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap()),
            ..MediaMetadata::default()
        }
    }

    #[test]
    fn videos_outrank_stills() {
        let video = file("clip.mov", 3.0, MediaMetadata::default(), 1_000);
        let still = file(
            "photo.jpg",
            0.0,
            MediaMetadata {
                width: Some(8000),
                height: Some(6000),
                ..dated()
            },
            50_000_000,
        );
        assert!(score(&video) > score(&still));
    }

    #[test]
    fn metadata_breaks_ties_between_stills() {
        let plain = file("plain.jpg", 0.0, MediaMetadata::default(), 1_000);
        let tagged = file(
            "tagged.jpg",
            0.0,
            MediaMetadata {
                gps_latitude: Some(51.5),
                gps_longitude: Some(-0.1),
                camera_model: Some("Apple iPhone 14".into()),
                ..dated()
            },
            1_000,
        );
        assert!(score(&tagged) > score(&plain));
    }

    #[test]
    fn one_gps_coordinate_earns_nothing() {
        let half = file(
            "half.jpg",
            0.0,
            MediaMetadata { gps_latitude: Some(51.5), ..MediaMetadata::default() },
            1_000,
        );
        let none = file("none.jpg", 0.0, MediaMetadata::default(), 1_000);
        assert_eq!(score(&half), score(&none));
    }

    #[test]
    fn larger_files_win_otherwise_equal_comparisons() {
        let small = file("small.jpg", 0.0, MediaMetadata::default(), 1_000);
        let large = file("large.jpg", 0.0, MediaMetadata::default(), 2_000_000);
        assert!(score(&large) > score(&small));
    }

    #[test]
    fn rank_is_stable_for_equal_scores() {
        let first = file("first.jpg", 0.0, MediaMetadata::default(), 1_000);
        let second = file("second.jpg", 0.0, MediaMetadata::default(), 1_000);
        let ranked = rank(&[&first, &second]);
        assert_eq!(ranked[0].path, PathBuf::from("first.jpg"));
        assert_eq!(ranked[1].path, PathBuf::from("second.jpg"));
    }

    #[test]
    fn capture_candidates_must_be_stills() {
        let best = file("best.mov", 3.0, MediaMetadata::default(), 10_000);
        let other_video = file("other.mov", 2.0, MediaMetadata::default(), 10_000);
        assert!(!is_potential_capture(&best, &other_video));
    }

    #[test]
    fn capture_candidates_need_enough_pixels() {
        let best = file(
            "best.mov",
            3.0,
            MediaMetadata { width: Some(1920), height: Some(1080), ..MediaMetadata::default() },
            10_000,
        );
        let small = file(
            "small.jpg",
            0.0,
            MediaMetadata { width: Some(640), height: Some(480), ..MediaMetadata::default() },
            10_000,
        );
        let large = file(
            "large.jpg",
            0.0,
            MediaMetadata { width: Some(4000), height: Some(3000), ..MediaMetadata::default() },
            10_000,
        );
        assert!(!is_potential_capture(&best, &small));
        assert!(is_potential_capture(&best, &large));
    }

    #[test]
    fn capture_candidates_cannot_drop_the_date() {
        let best = file("best.mov", 3.0, dated(), 10_000);
        let undated = file("undated.jpg", 0.0, MediaMetadata::default(), 10_000);
        let dated_still = file("dated.jpg", 0.0, dated(), 10_000);
        assert!(!is_potential_capture(&best, &undated));
        assert!(is_potential_capture(&best, &dated_still));
    }
}
