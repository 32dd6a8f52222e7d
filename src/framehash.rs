//! Perceptual hashing of decoded frames and video frame selection

use crate::bithash::BitHash;
use crate::config::SimilarityConfig;
use crate::models::FrameInfo;
use crate::{Error, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

/// Hash an R×R grayscale buffer by mean-brightness thresholding.
///
/// Bit `i` is set when sample `i` is at or above the mean brightness of
/// the buffer, producing an R²-bit hash. Pure function.
pub fn hash_frame(pixels: &[u8], resolution: u32) -> Result<BitHash> {
    let expected = (resolution as usize).pow(2);
    if pixels.len() != expected {
        return Err(Error::InvalidFrame(format!(
            "expected {expected} samples for resolution {resolution}, got {}",
            pixels.len()
        )));
    }

    let sum: u64 = pixels.iter().map(|&p| u64::from(p)).sum();
    let mean = sum as f64 / expected as f64;
    Ok(BitHash::from_fn(expected, |i| f64::from(pixels[i]) >= mean))
}

/// Center-crop an image square and downscale it to an R×R grayscale buffer.
///
/// Cropping to the central square keeps the hash stable across aspect-ratio
/// variants of the same capture.
pub fn grayscale_square(image: &DynamicImage, resolution: u32) -> Vec<u8> {
    let (width, height) = image.dimensions();
    let side = width.min(height);
    let x = (width - side) / 2;
    let y = (height - side) / 2;

    image
        .crop_imm(x, y, side, side)
        .resize_exact(resolution, resolution, FilterType::Lanczos3)
        .to_luma8()
        .into_raw()
}

/// Thin the hashed frames of a video to the configured sampling policy.
///
/// Frames are kept at `target_fps` intervals; between samples, frames whose
/// hash differs from the last kept frame by more than
/// `scene_change_threshold` bits are kept as scene changes, up to
/// `max_scene_frames` of them. When the result falls short of `min_frames`
/// the leading input frames are used instead.
pub fn select_frames(frames: Vec<FrameInfo>, config: &SimilarityConfig) -> Vec<FrameInfo> {
    if frames.is_empty() {
        return frames;
    }

    let interval = if config.target_fps > 0.0 {
        1.0 / config.target_fps
    } else {
        f64::INFINITY
    };

    let mut kept: Vec<FrameInfo> = Vec::new();
    let mut scene_frames = 0usize;
    let mut next_sample = 0.0f64;

    for frame in &frames {
        let last = kept.last();
        if last.is_none() || frame.timestamp + 1e-9 >= next_sample {
            next_sample = frame.timestamp + interval;
            kept.push(frame.clone());
            continue;
        }
        if scene_frames < config.max_scene_frames {
            let last = last.expect("non-empty kept list");
            // Width mismatches cannot occur within one media; skip defensively
            if let Ok(distance) = frame.hash.distance(&last.hash) {
                if distance > config.scene_change_threshold {
                    scene_frames += 1;
                    kept.push(frame.clone());
                }
            }
        }
    }

    if kept.len() < config.min_frames {
        let take = config.min_frames.min(frames.len());
        return frames.into_iter().take(take).collect();
    }
    kept
}
