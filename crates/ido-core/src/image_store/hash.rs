//! Content and multi-hash helpers shared by the ImageStore and the
//! ImageFilter/PerceptionSources (spec §3 ImageEntry, §4.2, §4.4).

use image::{DynamicImage, GenericImageView};

/// 64-bit content address: perceptual hash when the bytes decode as an
/// image, md5 otherwise (spec §3: "64-bit perceptual or md5 hex").
pub fn content_hash(bytes: &[u8]) -> String {
    match image::load_from_memory(bytes) {
        Ok(img) => format!("{:016x}", average_hash(&img)),
        Err(_) => format!("{:x}", md5::compute(bytes)),
    }
}

/// 8x8 average hash: bit set where the pixel is brighter than the mean.
pub fn average_hash(img: &DynamicImage) -> u64 {
    let small = img.resize_exact(8, 8, image::imageops::FilterType::Triangle).to_luma8();
    let pixels: Vec<u8> = small.pixels().map(|p| p.0[0]).collect();
    let mean = pixels.iter().map(|&v| v as u32).sum::<u32>() as f64 / pixels.len() as f64;
    pixels.iter().fold(0u64, |acc, &v| (acc << 1) | u64::from(v as f64 > mean))
}

/// 9x8 difference hash: bit set where a pixel is brighter than its
/// right-hand neighbor.
pub fn difference_hash(img: &DynamicImage) -> u64 {
    let small = img.resize_exact(9, 8, image::imageops::FilterType::Triangle).to_luma8();
    let mut hash = 0u64;
    for y in 0..8 {
        for x in 0..8 {
            let left = small.get_pixel(x, y).0[0];
            let right = small.get_pixel(x + 1, y).0[0];
            hash = (hash << 1) | u64::from(left > right);
        }
    }
    hash
}

/// Coarser-grained average hash computed over a heavier downscale, used
/// as the "perceptual" component of the multi-hash (spec §4.4). A full
/// DCT-based pHash needs no crate this pack reaches for, so this
/// approximates it by pre-blurring through an intermediate 32x32 stage
/// before the same 8x8 average-hash bit extraction.
pub fn perceptual_hash(img: &DynamicImage) -> u64 {
    let pre = img.resize_exact(32, 32, image::imageops::FilterType::Lanczos3);
    average_hash(&pre)
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// The three-algorithm hash vector ImageFilter dedup is keyed on
/// (spec §4.4): perceptual 50%, difference 30%, average 20%.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiHash {
    pub perceptual: u64,
    pub difference: u64,
    pub average: u64,
}

impl MultiHash {
    pub fn compute(img: &DynamicImage) -> Self {
        Self {
            perceptual: perceptual_hash(img),
            difference: difference_hash(img),
            average: average_hash(img),
        }
    }

    /// Weighted similarity in `[0, 1]` against another hash vector.
    pub fn similarity(&self, other: &MultiHash) -> f64 {
        let sim = |a: u64, b: u64| 1.0 - hamming_distance(a, b) as f64 / 64.0;
        0.5 * sim(self.perceptual, other.perceptual)
            + 0.3 * sim(self.difference, other.difference)
            + 0.2 * sim(self.average, other.average)
    }
}
