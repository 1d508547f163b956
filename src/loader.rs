// Turns uploaded bytes into pixels and works out where the background sits.
// Visual expectation: the background always fits fully inside the canvas,
// centered, with letterbox bars on the loose axis.

use std::sync::Arc;

use image::{ImageFormat, RgbaImage};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Rect, Viewport};

/// Whether extraction is allowed to read an asset's pixels.
/// Drawing a `Denied` asset is still fine; only per-pixel reads are refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelAccess {
    #[default]
    Readable,
    Denied,
}

/// A decoded image plus its intrinsic size. Immutable once built;
/// a re-upload replaces it wholesale.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pixels: Arc<RgbaImage>,
    access: PixelAccess,
}

impl ImageAsset {
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self { pixels: Arc::new(pixels), access: PixelAccess::Readable }
    }

    pub fn with_access(mut self, access: PixelAccess) -> Self {
        self.access = access;
        self
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn access(&self) -> PixelAccess {
        self.access
    }

    /// Pixels for per-pixel processing; refused for `Denied` assets.
    pub fn read_pixels(&self) -> Result<&RgbaImage> {
        match self.access {
            PixelAccess::Readable => Ok(&self.pixels),
            PixelAccess::Denied => Err(Error::PixelAccessDenied),
        }
    }

    /// Shared handle for drawing, regardless of access.
    pub fn raster(&self) -> Arc<RgbaImage> {
        Arc::clone(&self.pixels)
    }
}

/// Map an upload MIME type onto a decoder. Unknown types fall back to sniffing.
fn format_for_mime(mime: &str) -> Option<ImageFormat> {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        _ => None,
    }
}

/// Decode PNG or JPEG bytes, sniffing the format from the content.
pub fn decode(bytes: &[u8]) -> Result<ImageAsset> {
    decode_as(bytes, None)
}

/// Decode bytes, using the MIME type (when recognised) to pick the decoder.
pub fn decode_as(bytes: &[u8], mime: Option<&str>) -> Result<ImageAsset> {
    let format = match mime.and_then(format_for_mime) {
        Some(format) => format,
        None => image::guess_format(bytes).map_err(Error::Decode)?,
    };
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
        return Err(Error::UnsupportedFormat(format!("{format:?}")));
    }

    let decoded = image::load_from_memory_with_format(bytes, format).map_err(Error::Decode)?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(Error::EmptyImage);
    }
    debug!(width = decoded.width(), height = decoded.height(), ?format, "decoded image");
    Ok(ImageAsset::from_rgba(decoded.to_rgba8()))
}

/// Result of a contain fit: where the image lands and the uniform scale used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fit {
    pub rect: Rect,
    pub scale: f64,
}

/// "Contain" fit of an intrinsic size into the viewport, centered.
/// Always computed from intrinsic dimensions so repeated re-fits never compound.
pub fn fit_contain(width: u32, height: u32, viewport: Viewport) -> Fit {
    let (w, h) = (f64::from(width.max(1)), f64::from(height.max(1)));
    let scale = (viewport.width / w).min(viewport.height / h);
    let (fw, fh) = (w * scale, h * scale);
    Fit {
        rect: Rect::new((viewport.width - fw) / 2.0, (viewport.height - fh) / 2.0, fw, fh),
        scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba};
    use std::io::Cursor;

    fn encode(img: RgbaImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        let dynamic = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8()),
            _ => DynamicImage::ImageRgba8(img),
        };
        dynamic.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    #[test]
    fn scenario_800x600_into_400x300() {
        let fit = fit_contain(800, 600, Viewport::new(400.0, 300.0));
        assert_eq!(fit.rect, Rect::new(0.0, 0.0, 400.0, 300.0));
        assert_eq!(fit.scale, 0.5);
    }

    #[test]
    fn contain_fit_letterboxes_and_centers() {
        let vp = Viewport::new(500.0, 300.0);
        for &(w, h) in &[(800u32, 600u32), (100, 1000), (1000, 10), (37, 53), (500, 300)] {
            let fit = fit_contain(w, h, vp);
            let r = fit.rect;
            let bounds = Rect::new(0.0, 0.0, vp.width, vp.height);
            assert!(bounds.contains_rect(&r, 1e-9), "{w}x{h} overflowed: {r:?}");
            assert!((r.width / r.height - w as f64 / h as f64).abs() < 1e-9);
            assert!((r.x - (vp.width - r.right())).abs() < 1e-9);
            assert!((r.y - (vp.height - r.bottom())).abs() < 1e-9);
            // One axis touches the viewport edge.
            assert!((r.width - vp.width).abs() < 1e-9 || (r.height - vp.height).abs() < 1e-9);
        }
    }

    #[test]
    fn refit_does_not_compound() {
        let a = fit_contain(800, 600, Viewport::new(400.0, 300.0));
        let _ = fit_contain(800, 600, Viewport::new(1200.0, 200.0));
        let b = fit_contain(800, 600, Viewport::new(400.0, 300.0));
        assert_eq!(a, b);
    }

    #[test]
    fn decodes_png_and_jpeg() {
        let img = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]));
        let png = decode(&encode(img.clone(), ImageFormat::Png)).unwrap();
        assert_eq!((png.width(), png.height()), (4, 3));
        let jpg = decode_as(&encode(img, ImageFormat::Jpeg), Some("image/jpeg")).unwrap();
        assert_eq!((jpg.width(), jpg.height()), (4, 3));
    }

    #[test]
    fn unknown_mime_sniffs_content() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let asset = decode_as(&encode(img, ImageFormat::Png), Some("application/octet-stream")).unwrap();
        assert_eq!(asset.width(), 2);
    }

    #[test]
    fn rejects_garbage_and_other_formats() {
        assert!(matches!(decode(b"definitely not an image"), Err(Error::Decode(_))));
        let img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let bmp = encode(img, ImageFormat::Bmp);
        assert!(matches!(decode(&bmp), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn denied_assets_refuse_pixel_reads() {
        let asset = ImageAsset::from_rgba(RgbaImage::new(1, 1)).with_access(PixelAccess::Denied);
        assert!(matches!(asset.read_pixels(), Err(Error::PixelAccessDenied)));
        assert_eq!(asset.raster().width(), 1);
    }
}
