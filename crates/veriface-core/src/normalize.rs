//! Canonical face crop: clamp, crop, resize to the process-wide square size.

use image::imageops::FilterType;
use image::RgbImage;

use crate::error::EngineError;
use crate::types::BoundingBox;

/// Default canonical side length; enrollment and verification must use
/// the same value or descriptors stop being comparable.
pub const DEFAULT_CANONICAL_FACE_SIZE: u32 = 150;

/// Crop the detected region (clamped to image bounds) and resize it to
/// `size` × `size`.
pub fn canonical_crop(
    image: &RgbImage,
    bbox: &BoundingBox,
    size: u32,
) -> Result<RgbImage, EngineError> {
    let clamped = bbox
        .clamp_to(image.width(), image.height())
        .ok_or(EngineError::InvalidFaceRegion)?;

    let crop = image::imageops::crop_imm(
        image,
        clamped.x,
        clamped.y,
        clamped.width,
        clamped.height,
    )
    .to_image();

    Ok(image::imageops::resize(
        &crop,
        size,
        size,
        FilterType::Triangle,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn crop_resizes_to_canonical_square() {
        let img = RgbImage::from_pixel(200, 160, Rgb([120, 110, 100]));
        let bbox = BoundingBox::new(30, 20, 90, 70);
        let face = canonical_crop(&img, &bbox, 150).unwrap();
        assert_eq!((face.width(), face.height()), (150, 150));
    }

    #[test]
    fn overhanging_box_is_clamped_not_rejected() {
        let img = RgbImage::from_pixel(100, 100, Rgb([50, 50, 50]));
        let bbox = BoundingBox::new(80, 80, 60, 60);
        assert!(canonical_crop(&img, &bbox, 150).is_ok());
    }

    #[test]
    fn fully_out_of_bounds_box_is_invalid() {
        let img = RgbImage::from_pixel(100, 100, Rgb([50, 50, 50]));
        let bbox = BoundingBox::new(150, 10, 40, 40);
        assert!(matches!(
            canonical_crop(&img, &bbox, 150),
            Err(EngineError::InvalidFaceRegion)
        ));
    }

    #[test]
    fn crop_content_comes_from_the_box_region() {
        // Left half dark, right half bright; a box over the right half
        // must produce a bright crop.
        let mut img = RgbImage::from_pixel(100, 100, Rgb([10, 10, 10]));
        for y in 0..100 {
            for x in 50..100 {
                img.put_pixel(x, y, Rgb([240, 240, 240]));
            }
        }
        let face = canonical_crop(&img, &BoundingBox::new(55, 10, 40, 40), 64).unwrap();
        let mean: f64 = face.pixels().map(|p| p.0[0] as f64).sum::<f64>() / (64.0 * 64.0);
        assert!(mean > 200.0, "crop mean {mean}");
    }
}
