use std::{collections::HashSet, fmt};

use image::{DynamicImage, imageops::FilterType};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

pub struct DuplicateHasher {
    canonical_size: u32,
}

impl DuplicateHasher {
    pub fn new(canonical_size: u32) -> Self {
        Self { canonical_size }
    }

    pub fn fingerprint(&self, image: &DynamicImage) -> Fingerprint {
        let canonical = image
            .resize_exact(self.canonical_size, self.canonical_size, FilterType::Triangle)
            .to_rgb8();

        Fingerprint(Sha256::digest(canonical.as_raw()).into())
    }
}

impl Default for DuplicateHasher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[derive(Debug, Default)]
pub struct DuplicateTracker {
    seen: HashSet<Fingerprint>,
    duplicates: usize,
}

impl DuplicateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fingerprint, returning true if it was a repeat.
    pub fn observe(&mut self, fingerprint: Fingerprint) -> bool {
        let repeat = !self.seen.insert(fingerprint);
        if repeat {
            self.duplicates += 1;
        }
        repeat
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn distinct(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn noise(seed: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(120, 80, |x, y| {
            let v = (x.wrapping_mul(31) ^ y.wrapping_mul(17) ^ seed).wrapping_mul(2654435761) >> 24;
            Rgb([v as u8, (v >> 1) as u8, (v >> 2) as u8])
        }))
    }

    #[test]
    fn test_identical_images_share_digest() {
        let hasher = DuplicateHasher::default();
        assert_eq!(hasher.fingerprint(&noise(1)), hasher.fingerprint(&noise(1)));
    }

    #[test]
    fn test_different_images_differ() {
        let hasher = DuplicateHasher::default();
        assert_ne!(hasher.fingerprint(&noise(1)), hasher.fingerprint(&noise(2)));
    }

    #[test]
    fn test_display_is_hex() {
        let digest = DuplicateHasher::default().fingerprint(&noise(3)).to_string();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tracker_counts_repeats() {
        let hasher = DuplicateHasher::default();
        let mut tracker = DuplicateTracker::new();
        let images = [noise(1), noise(2), noise(1), noise(1), noise(4)];

        let repeats = images
            .iter()
            .map(|img| tracker.observe(hasher.fingerprint(img)))
            .collect::<Vec<_>>();

        assert_eq!(repeats, vec![false, false, true, true, false]);
        assert_eq!(tracker.duplicates(), 2);
        assert_eq!(tracker.duplicates(), images.len() - tracker.distinct());
    }
}
