use image::{DynamicImage, GrayImage, Luma, RgbImage};

pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let lum =
            (0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64).round() as u8;
        gray.put_pixel(x, y, Luma([lum]));
    }

    gray
}

/// Grayscale form of a decoded image. Single-channel inputs are passed through
/// untouched so that their intensities survive exactly.
pub fn to_gray(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => rgb_to_gray(&other.to_rgb8()),
    }
}

pub fn calculate_histogram(image: &GrayImage) -> [u32; 256] {
    let mut histogram = [0u32; 256];

    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    histogram
}

pub fn fits_within(image: &GrayImage, width: u32, height: u32) -> bool {
    image.width() >= width && image.height() >= height
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn test_rgb_to_gray_uses_luma_weights() {
        let rgb = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        let gray = rgb_to_gray(&rgb);
        assert_eq!(gray.get_pixel(0, 0)[0], 76);
    }

    #[test]
    fn test_to_gray_passes_luma_through() {
        let gray = GrayImage::from_fn(4, 4, |x, _| Luma([x as u8 * 10]));
        let converted = to_gray(&DynamicImage::ImageLuma8(gray.clone()));
        assert_eq!(converted, gray);
    }

    #[test]
    fn test_histogram_counts_every_pixel() {
        let gray = GrayImage::from_fn(8, 8, |x, _| Luma([if x < 4 { 0 } else { 200 }]));
        let histogram = calculate_histogram(&gray);
        assert_eq!(histogram[0], 32);
        assert_eq!(histogram[200], 32);
        assert_eq!(histogram.iter().sum::<u32>(), 64);
    }
}
