use image::RgbImage;
use libblur::{FastBlurChannels, ThreadingPolicy};

/// Stack blur with the given radius, delegated to `libblur`.
///
/// A zero radius or an empty image returns an unchanged copy.
pub fn stack_blur(image: &RgbImage, radius: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut blurred = image.clone();
    if radius == 0 || width == 0 || height == 0 {
        return blurred;
    }

    let stride = width * 3;
    let buf: &mut [u8] = &mut blurred;
    libblur::stack_blur(
        buf,
        stride,
        width,
        height,
        radius,
        FastBlurChannels::Channels3,
        // already on the blocking pool
        ThreadingPolicy::Single,
    );

    blurred
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_uniform_image_is_unchanged() {
        let image = RgbImage::from_pixel(40, 30, Rgb([90, 140, 210]));
        let blurred = stack_blur(&image, 30);

        assert_eq!(blurred.dimensions(), (40, 30));
        assert!(blurred.pixels().all(|p| *p == Rgb([90, 140, 210])));
    }

    #[test]
    fn test_single_bright_pixel_spreads() {
        let mut image = RgbImage::new(21, 21);
        image.put_pixel(10, 10, Rgb([255, 255, 255]));

        let blurred = stack_blur(&image, 3);

        let center = blurred.get_pixel(10, 10)[0];
        let neighbour = blurred.get_pixel(11, 10)[0];
        assert!(center < 255);
        assert!(neighbour > 0);
        assert!(center >= neighbour);
        assert_eq!(blurred.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_zero_radius_is_a_copy() {
        let mut image = RgbImage::new(8, 8);
        image.put_pixel(3, 3, Rgb([255, 0, 0]));

        assert_eq!(stack_blur(&image, 0), image);
    }
}
