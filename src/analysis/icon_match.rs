use std::sync::Arc;

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::{image_utils::fits_within, loader::ReferenceIcon};

type Integral = ImageBuffer<Luma<u64>, Vec<u64>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IconMatch {
    pub x: u32,
    pub y: u32,
    pub score: f64,
}

pub struct IconMatcher {
    icon: Arc<ReferenceIcon>,
    threshold: f64,
    deviations: Vec<f64>,
    icon_norm: f64,
}

impl IconMatcher {
    pub fn new(icon: Arc<ReferenceIcon>, threshold: f64) -> Self {
        let pixels = icon.image().pixels().map(|p| p[0] as f64).collect::<Vec<_>>();
        let mean = pixels.iter().sum::<f64>() / pixels.len().max(1) as f64;
        let deviations = pixels.iter().map(|v| v - mean).collect::<Vec<_>>();
        let icon_norm = deviations.iter().map(|d| d * d).sum::<f64>().sqrt();

        Self {
            icon,
            threshold,
            deviations,
            icon_norm,
        }
    }

    pub fn matches(&self, target: &GrayImage) -> bool {
        self.best_match(target).is_some_and(|found| self.accepts(&found))
    }

    pub fn accepts(&self, found: &IconMatch) -> bool {
        found.score >= self.threshold
    }

    pub fn best_match(&self, target: &GrayImage) -> Option<IconMatch> {
        let (icon_w, icon_h) = self.icon.dimensions();
        if !fits_within(target, icon_w, icon_h) {
            return None;
        }

        let sums: Integral = integral_image::<_, u64>(target);
        let squares: Integral = integral_squared_image::<_, u64>(target);
        let rows = target.height() - icon_h + 1;

        (0..rows)
            .into_par_iter()
            .map(|y| self.best_in_row(target, &sums, &squares, y))
            .reduce_with(|a, b| if b.score > a.score { b } else { a })
    }

    fn best_in_row(&self, target: &GrayImage, sums: &Integral, squares: &Integral, y: u32) -> IconMatch {
        let (icon_w, _) = self.icon.dimensions();
        let columns = target.width() - icon_w + 1;
        let mut best = IconMatch { x: 0, y, score: f64::NEG_INFINITY };

        for x in 0..columns {
            let score = self.score_at(target, sums, squares, x, y);
            if score > best.score {
                best = IconMatch { x, y, score };
            }
        }

        best
    }

    fn score_at(&self, target: &GrayImage, sums: &Integral, squares: &Integral, x: u32, y: u32) -> f64 {
        let (icon_w, icon_h) = self.icon.dimensions();
        let count = (icon_w * icon_h) as f64;

        let window_sum = window_total(sums, x, y, icon_w, icon_h) as f64;
        let window_sq = window_total(squares, x, y, icon_w, icon_h) as f64;
        let window_energy = (window_sq - window_sum * window_sum / count).max(0.0);

        let denom = window_energy.sqrt() * self.icon_norm;
        if denom < 1e-10 {
            return 0.0;
        }

        // The icon deviations sum to zero, so the window mean drops out.
        let mut cross = 0.0;
        for dy in 0..icon_h {
            let row = (dy * icon_w) as usize;
            for dx in 0..icon_w {
                let px = target.get_pixel(x + dx, y + dy)[0] as f64;
                cross += self.deviations[row + dx as usize] * px;
            }
        }

        cross / denom
    }
}

fn window_total(integral: &Integral, x: u32, y: u32, width: u32, height: u32) -> u64 {
    let at = |px: u32, py: u32| integral.get_pixel(px, py)[0];
    at(x + width, y + height) + at(x, y) - at(x, y + height) - at(x + width, y)
}
