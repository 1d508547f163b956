//! Retained two-layer scene (background, signature) plus the handle overlay.
//!
//! Mutations only mark the scene dirty; [`Scene::redraw`] rasterizes once per
//! batch. [`Scene::export_png`] flattens the layers without the overlay.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tracing::info;

use crate::error::{Error, Result};
use crate::gamma::GammaLut;
use crate::transform::Handle;
use crate::types::{Rect, Viewport};

/// Name the exported composite is offered under.
pub const EXPORT_FILE_NAME: &str = "signed-image.png";

const HANDLE_STROKE: Rgba<u8> = Rgba([0, 161, 255, 255]);
const HANDLE_FILL: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Nodes wider or taller than this many canvases are never resampled whole.
const MAX_CACHE_FACTOR: u32 = 2;

/// An image drawn into a rect, resampled lazily and cached per target size.
pub struct ImageNode {
    source: Arc<RgbaImage>,
    rect: Rect,
    opacity: f32,
    cache: Option<RgbaImage>,
}

impl ImageNode {
    pub fn new(source: Arc<RgbaImage>, rect: Rect) -> Self {
        Self { source, rect, opacity: 1.0, cache: None }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn set_rect(&mut self, rect: Rect) {
        self.rect = rect;
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn set_source(&mut self, source: Arc<RgbaImage>) {
        self.source = source;
        self.cache = None;
    }

    fn target_size(&self) -> (u32, u32) {
        (
            self.rect.width.round().max(1.0) as u32,
            self.rect.height.round().max(1.0) as u32,
        )
    }

    fn resampled(&mut self) -> &RgbaImage {
        let (w, h) = self.target_size();
        if self.cache.as_ref().is_some_and(|c| c.dimensions() != (w, h)) {
            self.cache = None;
        }
        self.cache.get_or_insert_with(|| {
            if self.source.dimensions() == (w, h) {
                (*self.source).clone()
            } else {
                imageops::resize(&*self.source, w, h, FilterType::Triangle)
            }
        })
    }
}

/// Handle overlay bound to the signature's displayed rect.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overlay {
    pub target: Option<Rect>,
    pub visible: bool,
}

/// Bytes ready to hand over as a download.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub file_name: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    pub fn write_into(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

pub struct Scene {
    viewport: Viewport,
    background: Option<ImageNode>,
    signature: Option<ImageNode>,
    overlay: Overlay,
    lut: GammaLut,
    canvas: RgbaImage,
    dirty: bool,
}

impl Scene {
    pub fn new(viewport: Viewport) -> Self {
        let (w, h) = viewport.pixel_size();
        Self {
            viewport,
            background: None,
            signature: None,
            overlay: Overlay { target: None, visible: true },
            lut: GammaLut::new(),
            canvas: RgbaImage::new(w, h),
            dirty: true,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.dirty = true;
    }

    pub fn set_background(&mut self, node: Option<ImageNode>) {
        self.background = node;
        self.dirty = true;
    }

    pub fn background_mut(&mut self) -> Option<&mut ImageNode> {
        self.dirty = true;
        self.background.as_mut()
    }

    pub fn set_signature(&mut self, node: Option<ImageNode>) {
        self.signature = node;
        self.dirty = true;
    }

    pub fn signature(&self) -> Option<&ImageNode> {
        self.signature.as_ref()
    }

    pub fn signature_mut(&mut self) -> Option<&mut ImageNode> {
        self.dirty = true;
        self.signature.as_mut()
    }

    pub fn bind_overlay(&mut self, target: Option<Rect>) {
        self.overlay.target = target;
        self.dirty = true;
    }

    pub fn handles_visible(&self) -> bool {
        self.overlay.visible
    }

    pub fn set_handles_visible(&mut self, visible: bool) {
        self.overlay.visible = visible;
        self.dirty = true;
    }

    /// Last rasterized frame (layers plus overlay when visible).
    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Re-rasterize if anything changed since the last call.
    pub fn redraw(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.rasterize();
        self.dirty = false;
        true
    }

    fn rasterize(&mut self) {
        let (w, h) = self.viewport.pixel_size();
        if self.canvas.dimensions() != (w, h) {
            self.canvas = RgbaImage::new(w, h);
        } else {
            self.canvas.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));
        }
        for node in [self.background.as_mut(), self.signature.as_mut()].into_iter().flatten() {
            draw_node(&mut self.canvas, node, &self.lut);
        }
        if self.overlay.visible {
            if let Some(target) = self.overlay.target {
                draw_overlay(&mut self.canvas, &target);
            }
        }
    }

    /// Flatten the viewport at 1:1 with the overlay hidden, then put the
    /// overlay visibility back the way it was.
    pub fn flatten(&mut self) -> RgbaImage {
        let was_visible = self.overlay.visible;
        self.overlay.visible = false;
        self.rasterize();
        let flat = self.canvas.clone();
        if was_visible {
            self.overlay.visible = true;
        }
        self.dirty = true;
        flat
    }

    pub fn export_png(&mut self) -> Result<ExportArtifact> {
        let flat = self.flatten();
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(flat)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(Error::Encode)?;
        info!(bytes = bytes.len(), file = EXPORT_FILE_NAME, "composite exported");
        Ok(ExportArtifact { file_name: EXPORT_FILE_NAME, bytes })
    }
}

fn draw_node(canvas: &mut RgbaImage, node: &mut ImageNode, lut: &GammaLut) {
    let (tw, th) = node.target_size();
    if tw > canvas.width().saturating_mul(MAX_CACHE_FACTOR)
        || th > canvas.height().saturating_mul(MAX_CACHE_FACTOR)
    {
        node.cache = None;
        sample_visible(canvas, node, lut);
        return;
    }
    let opacity = node.opacity;
    let (ox, oy) = (node.rect.x.round() as i64, node.rect.y.round() as i64);
    let src = node.resampled();
    let (cw, ch) = (i64::from(canvas.width()), i64::from(canvas.height()));
    for (sx, sy, px) in src.enumerate_pixels() {
        let (dx, dy) = (ox + i64::from(sx), oy + i64::from(sy));
        if dx < 0 || dy < 0 || dx >= cw || dy >= ch {
            continue;
        }
        let dst = canvas.get_pixel_mut(dx as u32, dy as u32);
        *dst = lut.blend_over(*dst, *px, opacity);
    }
}

/// Nearest-neighbour draw of only the part of `node` that lands on the canvas.
fn sample_visible(canvas: &mut RgbaImage, node: &ImageNode, lut: &GammaLut) {
    let (sw, sh) = node.source.dimensions();
    if sw == 0 || sh == 0 || node.rect.width <= 0.0 || node.rect.height <= 0.0 {
        return;
    }
    let rect = node.rect;
    let (cw, ch) = (f64::from(canvas.width()), f64::from(canvas.height()));
    let span = |lo: f64, hi: f64, max: f64| (lo.round().clamp(0.0, max) as u32, hi.round().clamp(0.0, max) as u32);
    let (x0, x1) = span(rect.x, rect.right(), cw);
    let (y0, y1) = span(rect.y, rect.bottom(), ch);
    let source_index = |d: u32, origin: f64, extent: f64, len: u32| {
        let t = (f64::from(d) + 0.5 - origin) / extent;
        ((t * f64::from(len)).floor().max(0.0) as u32).min(len - 1)
    };
    for dy in y0..y1 {
        let sy = source_index(dy, rect.y, rect.height, sh);
        for dx in x0..x1 {
            let sx = source_index(dx, rect.x, rect.width, sw);
            let dst = canvas.get_pixel_mut(dx, dy);
            *dst = lut.blend_over(*dst, *node.source.get_pixel(sx, sy), node.opacity);
        }
    }
}

fn fill_rect(canvas: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
    let (cw, ch) = (i64::from(canvas.width()), i64::from(canvas.height()));
    for y in y0.max(0)..y1.min(ch) {
        for x in x0.max(0)..x1.min(cw) {
            canvas.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn stroke_rect(canvas: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
    fill_rect(canvas, x0, y0, x1, y0 + 1, color);
    fill_rect(canvas, x0, y1 - 1, x1, y1, color);
    fill_rect(canvas, x0, y0, x0 + 1, y1, color);
    fill_rect(canvas, x1 - 1, y0, x1, y1, color);
}

fn draw_overlay(canvas: &mut RgbaImage, target: &Rect) {
    let r = |v: f64| v.round() as i64;
    stroke_rect(canvas, r(target.x), r(target.y), r(target.right()), r(target.bottom()), HANDLE_STROKE);
    for handle in Handle::ALL {
        let sq = handle.square(target);
        let (x0, y0, x1, y1) = (r(sq.x), r(sq.y), r(sq.right()), r(sq.bottom()));
        fill_rect(canvas, x0, y0, x1, y1, HANDLE_FILL);
        stroke_rect(canvas, x0, y0, x1, y1, HANDLE_STROKE);
    }
}
