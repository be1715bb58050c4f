use image::{DynamicImage, GrayImage};
use imageproc::filter::laplacian_filter;
use statrs::statistics::Statistics;

use crate::image_utils::to_gray;

pub struct BlurDetector {
    threshold: f64,
}

impl BlurDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn is_blurry(&self, image: &DynamicImage) -> bool {
        self.is_blurry_gray(&to_gray(image))
    }

    // Must run at the original resolution; the threshold is scale dependent.
    pub fn is_blurry_gray(&self, gray: &GrayImage) -> bool {
        laplacian_variance(gray) < self.threshold
    }
}

impl Default for BlurDetector {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// Population variance of the 3x3 Laplacian response.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let response = laplacian_filter(gray);
    response.pixels().map(|p| p[0] as f64).population_variance()
}
