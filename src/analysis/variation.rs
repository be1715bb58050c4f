use image::GrayImage;
use statrs::statistics::Statistics;

use crate::image_utils::calculate_histogram;

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSignature {
    bins: Vec<f64>,
}

impl HistogramSignature {
    pub fn from_gray(gray: &GrayImage) -> Self {
        let counts = calculate_histogram(gray);
        let norm = counts
            .iter()
            .map(|&c| (c as f64) * (c as f64))
            .sum::<f64>()
            .sqrt();

        let bins = if norm < 1e-10 {
            vec![0.0; counts.len()]
        } else {
            counts.iter().map(|&c| c as f64 / norm).collect()
        };

        Self { bins }
    }

    pub fn correlation(&self, other: &HistogramSignature) -> f64 {
        let sd_a = self.bins.iter().std_dev();
        let sd_b = other.bins.iter().std_dev();
        let denom = sd_a * sd_b;

        if !denom.is_finite() || denom < 1e-12 {
            return 0.0;
        }

        self.bins.iter().covariance(other.bins.iter()) / denom
    }
}

pub struct VariationComparator {
    threshold: f64,
}

impl VariationComparator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn too_similar(&self, a: &GrayImage, b: &GrayImage) -> bool {
        self.signatures_too_similar(&HistogramSignature::from_gray(a), &HistogramSignature::from_gray(b))
    }

    pub fn signatures_too_similar(&self, a: &HistogramSignature, b: &HistogramSignature) -> bool {
        a.correlation(b) >= self.threshold
    }

    // Pairs (i, j) with i < j, each evaluated once.
    pub fn count_similar_pairs(&self, signatures: &[HistogramSignature]) -> usize {
        signatures
            .iter()
            .enumerate()
            .map(|(i, a)| {
                signatures[i + 1..]
                    .iter()
                    .filter(|b| self.signatures_too_similar(a, b))
                    .count()
            })
            .sum()
    }
}

impl Default for VariationComparator {
    fn default() -> Self {
        Self::new(0.9)
    }
}
