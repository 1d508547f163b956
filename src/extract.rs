// Strips the background out of a signature scan.
// Visual expectation: paper-white pixels and anything outside the alpha band
// disappear; the ink stays exactly as it was.

use std::sync::Arc;

use image::{Rgba, RgbaImage};
use tracing::{debug, warn};

use crate::error::Result;
use crate::loader::ImageAsset;
use crate::types::Thresholds;

/// Any channel at or above this is "paper". Fixed, not user-tunable.
pub const NEAR_WHITE: u8 = 240;

#[inline]
pub fn is_near_white(px: &Rgba<u8>) -> bool {
    px[0] >= NEAR_WHITE && px[1] >= NEAR_WHITE && px[2] >= NEAR_WHITE
}

/// Apply the masking rule to one pixel in place. Only alpha is ever touched.
#[inline]
pub fn mask_pixel(px: &mut Rgba<u8>, thresholds: Thresholds) {
    if is_near_white(px) || !thresholds.accepts(px[3]) {
        px[3] = 0;
    }
}

/// Build a new buffer with the masking rule applied to every pixel.
/// Fails with `PixelAccessDenied` when the asset may not be read.
pub fn extract(asset: &ImageAsset, thresholds: Thresholds) -> Result<RgbaImage> {
    let mut out = asset.read_pixels()?.clone();
    out.pixels_mut().for_each(|px| mask_pixel(px, thresholds));
    Ok(out)
}

/// Whole-layer opacity used when extraction is impossible.
pub fn fallback_opacity(thresholds: Thresholds) -> f32 {
    1.0 - f32::from(thresholds.min) / 255.0
}

/// What the signature layer ends up drawing.
#[derive(Debug, Clone)]
pub struct SignatureLayer {
    pub image: Arc<RgbaImage>,
    pub opacity: f32,
    /// False when the unprocessed asset is shown with the opacity fallback.
    pub processed: bool,
}

/// Extract the foreground, or degrade to the raw asset with a global opacity.
/// Never fails: a refused read is logged and recovered here.
pub fn prepare_signature(asset: &ImageAsset, thresholds: Thresholds) -> SignatureLayer {
    match extract(asset, thresholds) {
        Ok(image) => {
            debug!(min = thresholds.min, max = thresholds.max, "signature foreground extracted");
            SignatureLayer { image: Arc::new(image), opacity: 1.0, processed: true }
        }
        Err(err) => {
            let opacity = fallback_opacity(thresholds);
            warn!(%err, opacity, "extraction failed, falling back to global opacity");
            SignatureLayer { image: asset.raster(), opacity, processed: false }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::PixelAccess;

    fn two_pixel_asset() -> ImageAsset {
        let mut img = RgbaImage::new(200, 100);
        img.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 200]));
        ImageAsset::from_rgba(img)
    }

    #[test]
    fn near_white_removed_ink_kept() {
        let out = extract(&two_pixel_asset(), Thresholds::new(10, 250)).unwrap();
        assert_eq!(out.dimensions(), (200, 100));
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(*out.get_pixel(1, 0), Rgba([0, 0, 0, 200]));
    }

    #[test]
    fn zero_band_hides_everything() {
        let mut img = RgbaImage::new(3, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([120, 10, 10, 1]));
        img.put_pixel(2, 0, Rgba([0, 0, 0, 0]));
        let out = extract(&ImageAsset::from_rgba(img), Thresholds::new(0, 0)).unwrap();
        assert!(out.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn only_alpha_changes() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([250, 241, 245, 90]));
        img.put_pixel(1, 0, Rgba([240, 240, 239, 90]));
        let out = extract(&ImageAsset::from_rgba(img), Thresholds::default()).unwrap();
        assert_eq!(*out.get_pixel(0, 0), Rgba([250, 241, 245, 0]));
        assert_eq!(*out.get_pixel(1, 0), Rgba([240, 240, 239, 90]));
    }

    #[test]
    fn masking_is_idempotent() {
        let t = Thresholds::new(10, 250);
        let once = extract(&two_pixel_asset(), t).unwrap();
        let twice = extract(&ImageAsset::from_rgba(once.clone()), t).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn denied_read_falls_back_to_opacity() {
        let asset = two_pixel_asset().with_access(PixelAccess::Denied);
        let layer = prepare_signature(&asset, Thresholds::new(51, 255));
        assert!(!layer.processed);
        assert!((layer.opacity - 0.8).abs() < 1e-6);
        // Raw pixels are shown untouched.
        assert_eq!(layer.image.get_pixel(0, 0)[3], 255);
    }
}
