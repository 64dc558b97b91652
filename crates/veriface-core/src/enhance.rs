//! Lighting normalization: adaptive local contrast equalization on the
//! luminance channel plus a linear boost for dark captures.
//!
//! Deterministic and infallible. Chroma is preserved by scaling each
//! pixel's RGB by the luminance gain rather than converting color
//! spaces back and forth.

use image::RgbImage;

const CLAHE_GRID: u32 = 8;
const CLAHE_CLIP_LIMIT: f32 = 3.0;
/// Mean luminance below which the capture counts as dark.
const DARK_LUMA_THRESHOLD: f32 = 100.0;
const DARK_BOOST_GAIN: f32 = 1.3;
const DARK_BOOST_OFFSET: f32 = 30.0;

/// Enhance an image for detection. Output dimensions equal input dimensions.
pub fn enhance(image: &RgbImage) -> RgbImage {
    let (width, height) = (image.width(), image.height());
    let luma = luma_plane(image);
    let mean_luma = luma.iter().map(|&v| v as f64).sum::<f64>() / luma.len() as f64;

    let equalized = clahe(&luma, width, height);

    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let idx = (y * width + x) as usize;
        // +1 keeps the gain finite on black pixels.
        let gain = (equalized[idx] as f32 + 1.0) / (luma[idx] as f32 + 1.0);
        let mut channels = [0u8; 3];
        for (c, out_c) in pixel.0.iter().zip(channels.iter_mut()) {
            let mut v = *c as f32 * gain;
            if mean_luma < DARK_LUMA_THRESHOLD as f64 {
                v = v * DARK_BOOST_GAIN + DARK_BOOST_OFFSET;
            }
            *out_c = v.round().clamp(0.0, 255.0) as u8;
        }
        out.put_pixel(x, y, image::Rgb(channels));
    }
    out
}

/// Rec. 601 luminance plane.
pub(crate) fn luma_plane(image: &RgbImage) -> Vec<u8> {
    image
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
                .round()
                .clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Contrast-limited adaptive histogram equalization.
///
/// Per-tile clipped histograms produce per-tile tone curves; each pixel
/// blends the four nearest tile curves bilinearly, which avoids visible
/// tile seams.
fn clahe(luma: &[u8], width: u32, height: u32) -> Vec<u8> {
    let tiles = CLAHE_GRID.min(width).min(height).max(1);
    let tile_w = width.div_ceil(tiles);
    let tile_h = height.div_ceil(tiles);
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts: Vec<[u8; 256]> = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(tile_lut(luma, width, x0, y0, x1, y1));
        }
    }

    let mut out = vec![0u8; luma.len()];
    for y in 0..height {
        // Position relative to tile centers, clamped at the borders.
        let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let ty0 = (fy.floor().max(0.0) as u32).min(tiles_y - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let wy = (fy - fy.floor()).clamp(0.0, 1.0);
        let wy = if ty0 == ty1 { 0.0 } else { wy };

        for x in 0..width {
            let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
            let tx0 = (fx.floor().max(0.0) as u32).min(tiles_x - 1);
            let tx1 = (tx0 + 1).min(tiles_x - 1);
            let wx = (fx - fx.floor()).clamp(0.0, 1.0);
            let wx = if tx0 == tx1 { 0.0 } else { wx };

            let v = luma[(y * width + x) as usize] as usize;
            let tl = luts[(ty0 * tiles_x + tx0) as usize][v] as f32;
            let tr = luts[(ty0 * tiles_x + tx1) as usize][v] as f32;
            let bl = luts[(ty1 * tiles_x + tx0) as usize][v] as f32;
            let br = luts[(ty1 * tiles_x + tx1) as usize][v] as f32;

            let top = tl * (1.0 - wx) + tr * wx;
            let bottom = bl * (1.0 - wx) + br * wx;
            out[(y * width + x) as usize] = (top * (1.0 - wy) + bottom * wy)
                .round()
                .clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Clipped-histogram tone curve for one tile.
fn tile_lut(luma: &[u8], width: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[luma[(y * width + x) as usize] as usize] += 1;
        }
    }
    let npix = ((x1 - x0) * (y1 - y0)).max(1);

    // Clip and redistribute the excess uniformly.
    let clip = ((CLAHE_CLIP_LIMIT * npix as f32 / 256.0).max(1.0)) as u32;
    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }
    let bonus = excess / 256;
    let mut remainder = excess % 256;
    for count in hist.iter_mut() {
        *count += bonus;
        if remainder > 0 {
            *count += 1;
            remainder -= 1;
        }
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u64;
    for (v, count) in hist.iter().enumerate() {
        cdf += *count as u64;
        lut[v] = ((cdf * 255) / npix as u64).min(255) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn mean_luma(image: &RgbImage) -> f64 {
        let plane = luma_plane(image);
        plane.iter().map(|&v| v as f64).sum::<f64>() / plane.len() as f64
    }

    #[test]
    fn preserves_dimensions() {
        let img = RgbImage::from_pixel(37, 23, Rgb([90, 120, 80]));
        let out = enhance(&img);
        assert_eq!((out.width(), out.height()), (37, 23));
    }

    #[test]
    fn is_deterministic() {
        let mut img = RgbImage::new(64, 64);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Rgb([(x * 3) as u8, (y * 3) as u8, ((x + y) * 2) as u8]);
        }
        assert_eq!(enhance(&img).into_raw(), enhance(&img).into_raw());
    }

    #[test]
    fn dark_image_gets_brighter() {
        let img = RgbImage::from_pixel(64, 64, Rgb([20, 20, 20]));
        let out = enhance(&img);
        assert!(
            mean_luma(&out) > mean_luma(&img) + 20.0,
            "dark capture should receive the linear boost"
        );
    }

    #[test]
    fn bright_image_is_not_boosted_into_saturation() {
        let img = RgbImage::from_pixel(64, 64, Rgb([180, 180, 180]));
        let out = enhance(&img);
        // CLAHE remaps tones but the +30 boost must not apply.
        assert!(mean_luma(&out) < 250.0);
    }

    #[test]
    fn handles_tiny_images() {
        let img = RgbImage::from_pixel(3, 2, Rgb([10, 200, 45]));
        let out = enhance(&img);
        assert_eq!((out.width(), out.height()), (3, 2));
    }
}
