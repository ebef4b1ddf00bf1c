//! Alpha blending math for watermark removal.
//!
//! The logo is composited with forward alpha blending:
//! `watermarked = alpha * 255 + (1 - alpha) * original`
//!
//! This module provides the reverse operation to recover original pixels.

use image::RgbaImage;

use crate::alpha_map::AlphaMap;

/// Alpha threshold: ignore pixels with negligible watermark effect (noise).
pub const ALPHA_THRESHOLD: f32 = 0.002;

/// Maximum alpha: clamp to avoid division by near-zero in reverse blending.
pub const MAX_ALPHA: f32 = 0.99;

/// Logo colour value (opaque white).
pub const LOGO_VALUE: f32 = 255.0;

/// Recover one channel value from its watermarked value.
///
/// `alpha` must already be clamped to `MAX_ALPHA`.
#[must_use]
pub fn unblend_channel(watermarked: u8, alpha: f32) -> u8 {
    let original = (f32::from(watermarked) - alpha * LOGO_VALUE) / (1.0 - alpha);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        original.clamp(0.0, 255.0).round() as u8
    }
}

/// Visit every in-bounds target pixel under the alpha map whose alpha is at
/// least [`ALPHA_THRESHOLD`], passing the clamped alpha.
fn for_each_inked_pixel(
    image: &mut RgbaImage,
    alpha_map: &AlphaMap,
    origin_x: i64,
    origin_y: i64,
    mut f: impl FnMut(&mut image::Rgba<u8>, f32),
) {
    let img_w = i64::from(image.width());
    let img_h = i64::from(image.height());
    let size = alpha_map.size();

    for row in 0..size {
        let y = origin_y + i64::from(row);
        if y < 0 || y >= img_h {
            continue;
        }
        for col in 0..size {
            let x = origin_x + i64::from(col);
            if x < 0 || x >= img_w {
                continue;
            }

            let alpha = alpha_map.get(row, col);
            // Skip pixels with negligible watermark effect
            if alpha < ALPHA_THRESHOLD {
                continue;
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let px = image.get_pixel_mut(x as u32, y as u32);
            f(px, alpha.min(MAX_ALPHA));
        }
    }
}

/// Remove the watermark in-place using reverse alpha blending.
///
/// Applies `original = (watermarked - alpha * 255) / (1 - alpha)` to R, G and
/// B of every pixel under the map whose origin is `(origin_x, origin_y)`.
/// Target pixels outside the image are skipped, pixels with alpha below
/// [`ALPHA_THRESHOLD`] are left unchanged, and the transparency channel is
/// never touched.
pub fn unblend_region(image: &mut RgbaImage, alpha_map: &AlphaMap, origin_x: i64, origin_y: i64) {
    for_each_inked_pixel(image, alpha_map, origin_x, origin_y, |px, alpha| {
        for ch in 0..3 {
            px[ch] = unblend_channel(px[ch], alpha);
        }
    });
}

/// Composite the logo in-place with the forward model.
///
/// Uses the same bounds, threshold and clamping policy as [`unblend_region`],
/// so it produces inputs that region can invert.
pub fn blend_region(image: &mut RgbaImage, alpha_map: &AlphaMap, origin_x: i64, origin_y: i64) {
    for_each_inked_pixel(image, alpha_map, origin_x, origin_y, |px, alpha| {
        for ch in 0..3 {
            let blended = alpha * LOGO_VALUE + (1.0 - alpha) * f32::from(px[ch]);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                px[ch] = blended.clamp(0.0, 255.0).round() as u8;
            }
        }
    });
}
