use crate::error::PhotoError;
use image::imageops::FilterType;
use image::DynamicImage;
use kmeans_colors::{get_kmeans, Sort};
use palette::Srgb;
use std::collections::HashSet;

/// Number of k-means clusters
const CLUSTERS: usize = 3;
/// Width the sampled region is reduced to before clustering
const SAMPLE_WIDTH: u32 = 80;
const MAX_ITERATIONS: usize = 20;
/// Centroid movement under which k-means stops early
const CONVERGENCE: f32 = 0.0025;
const SEED: u64 = 0;
/// Channel distance from pure black/white under which a pixel counts as background
const BACKGROUND_TOLERANCE: u8 = 5;

/// Most prominent color of the image as lowercase `rrggbb`.
///
/// Samples the central region, drops near-black and near-white background
/// pixels (unless nothing else is left) and runs k-means with k = 3.
pub fn dominant_color(image: &DynamicImage) -> Result<String, PhotoError> {
    let samples = sample_pixels(image);
    if samples.is_empty() {
        return Err(PhotoError::Analysis("image has no pixels".to_string()));
    }

    // k-means++ seeding needs at least k distinct points
    let distinct: HashSet<[u8; 3]> = samples.iter().copied().collect();
    let k = CLUSTERS.min(distinct.len());

    let buf: Vec<Srgb> = samples
        .iter()
        .map(|p| Srgb::<u8>::new(p[0], p[1], p[2]).into_format::<f32>())
        .collect();

    let result = get_kmeans(k, MAX_ITERATIONS, CONVERGENCE, false, &buf, SEED);
    let clusters = <Srgb as Sort>::sort_indexed_colors(&result.centroids, &result.indices);

    let best = clusters
        .iter()
        .max_by(|a, b| a.percentage.total_cmp(&b.percentage))
        .ok_or_else(|| PhotoError::Analysis("no color clusters found".to_string()))?;

    let [r, g, b] = [best.centroid.red, best.centroid.green, best.centroid.blue]
        .map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8);
    Ok(format!("{:02x}{:02x}{:02x}", r, g, b))
}

fn sample_pixels(image: &DynamicImage) -> Vec<[u8; 3]> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let center = if width >= 4 && height >= 4 {
        image.crop_imm(width / 4, height / 4, width / 2, height / 2)
    } else {
        image.clone()
    };

    let reduced = if center.width() > SAMPLE_WIDTH {
        let scaled_height = (center.height() as u64 * SAMPLE_WIDTH as u64 / center.width() as u64)
            .max(1) as u32;
        center.resize_exact(SAMPLE_WIDTH, scaled_height, FilterType::Triangle)
    } else {
        center
    };

    let all: Vec<[u8; 3]> = reduced.to_rgb8().pixels().map(|p| p.0).collect();

    let foreground: Vec<[u8; 3]> = all.iter().copied().filter(|p| !is_background(p)).collect();
    if foreground.is_empty() {
        all
    } else {
        foreground
    }
}

fn is_background(pixel: &[u8; 3]) -> bool {
    pixel.iter().all(|c| *c <= BACKGROUND_TOLERANCE)
        || pixel.iter().all(|c| *c >= u8::MAX - BACKGROUND_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb as Pixel, RgbImage};

    #[test]
    fn test_solid_color() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 60, Pixel([255, 0, 0])));

        assert_eq!(dominant_color(&image).unwrap(), "ff0000");
    }

    #[test]
    fn test_majority_color_wins() {
        // two of every three columns are blue; center crop stays under the sample width
        let image = RgbImage::from_fn(120, 40, |x, _| {
            if x % 3 == 0 {
                Pixel([200, 40, 40])
            } else {
                Pixel([20, 60, 220])
            }
        });

        let color = dominant_color(&DynamicImage::ImageRgb8(image)).unwrap();
        assert_eq!(color, "143cdc");
    }

    #[test]
    fn test_background_is_ignored_when_possible() {
        let image = RgbImage::from_fn(40, 40, |x, y| {
            if x == 20 && y == 20 {
                Pixel([0, 128, 0])
            } else {
                Pixel([255, 255, 255])
            }
        });

        let color = dominant_color(&DynamicImage::ImageRgb8(image)).unwrap();
        assert_eq!(color, "008000");
    }

    #[test]
    fn test_all_black_falls_back_to_unmasked() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(16, 16));

        assert_eq!(dominant_color(&image).unwrap(), "000000");
    }

    #[test]
    fn test_empty_image_fails() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(0, 0));

        assert!(matches!(dominant_color(&image), Err(PhotoError::Analysis(_))));
    }
}
