//! Wires loader, extractor, controller, store and scene into explicit event
//! handlers. The boundary (window loop, CLI, tests) calls these in order;
//! nothing here blocks or spawns.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::extract::{self, SignatureLayer};
use crate::join::{Arrival, AssetSlot, LoadTicket, LoadTracker};
use crate::loader::{self, Fit, ImageAsset};
use crate::persist::{KeyValueStore, TransformStore};
use crate::scene::{ExportArtifact, ImageNode, Scene};
use crate::transform::{SignatureTransform, TransformController};
use crate::types::{Rect, Thresholds, Viewport};

/// What became of a completed load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Superseded by a newer upload; dropped.
    Stale,
    /// Decode failed; the slot shows nothing.
    Failed,
    /// Stored; the other asset is still pending.
    Waiting,
    /// Both assets present and the signature has been placed.
    Placed,
}

pub struct Composer {
    thresholds: Thresholds,
    loads: LoadTracker,
    background: Option<ImageAsset>,
    signature: Option<ImageAsset>,
    background_fit: Option<Fit>,
    signature_layer: Option<SignatureLayer>,
    controller: TransformController,
    scene: Scene,
    reset_on_place: bool,
}

impl Composer {
    pub fn new(viewport: Viewport, thresholds: Thresholds, store: Box<dyn KeyValueStore>) -> Self {
        Self {
            thresholds,
            loads: LoadTracker::new(),
            background: None,
            signature: None,
            background_fit: None,
            signature_layer: None,
            controller: TransformController::new(TransformStore::new(store)),
            scene: Scene::new(viewport),
            reset_on_place: false,
        }
    }

    /// One-shot: reset the signature right after its next placement.
    pub fn request_reset_on_place(&mut self) {
        self.reset_on_place = true;
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn viewport(&self) -> Viewport {
        self.scene.viewport()
    }

    pub fn transform(&self) -> Option<SignatureTransform> {
        self.controller.transform()
    }

    pub fn initial_snapshot(&self) -> Option<SignatureTransform> {
        self.controller.initial_snapshot()
    }

    pub fn background_rect(&self) -> Option<Rect> {
        self.background_fit.map(|f| f.rect)
    }

    pub fn signature_layer(&self) -> Option<&SignatureLayer> {
        self.signature_layer.as_ref()
    }

    /// Composite view is active only once both assets are placed.
    pub fn is_active(&self) -> bool {
        self.loads.ready() && self.controller.transform().is_some()
    }

    pub fn handles_visible(&self) -> bool {
        self.scene.handles_visible()
    }

    pub fn set_handles_visible(&mut self, visible: bool) {
        self.scene.set_handles_visible(visible);
    }

    /// A new upload for `slot` starts; any in-flight one becomes stale.
    pub fn begin_load(&mut self, slot: AssetSlot) -> LoadTicket {
        self.loads.begin(slot)
    }

    /// Deliver a decode result for `ticket`.
    pub fn finish_load(&mut self, ticket: LoadTicket, result: Result<ImageAsset>) -> LoadOutcome {
        if !self.loads.is_current(ticket) {
            debug!(?ticket, "ignoring stale load");
            return LoadOutcome::Stale;
        }
        let asset = match result {
            Ok(asset) => asset,
            Err(err) => {
                warn!(slot = ?ticket.slot, %err, "asset could not be decoded");
                self.loads.fail(ticket);
                self.clear_slot(ticket.slot);
                return LoadOutcome::Failed;
            }
        };

        match ticket.slot {
            AssetSlot::Background => self.install_background(asset),
            AssetSlot::Signature => self.signature = Some(asset),
        }
        match self.loads.arrive(ticket) {
            Arrival::Stale => LoadOutcome::Stale,
            Arrival::Accepted { ready: false } => LoadOutcome::Waiting,
            Arrival::Accepted { ready: true } => {
                self.place_signature();
                LoadOutcome::Placed
            }
        }
    }

    /// Synchronous upload: begin, decode, finish.
    pub fn load_bytes(&mut self, slot: AssetSlot, bytes: &[u8], mime: Option<&str>) -> LoadOutcome {
        let ticket = self.begin_load(slot);
        self.finish_load(ticket, loader::decode_as(bytes, mime))
    }

    fn clear_slot(&mut self, slot: AssetSlot) {
        match slot {
            AssetSlot::Background => {
                self.background = None;
                self.background_fit = None;
                self.scene.set_background(None);
            }
            AssetSlot::Signature => {
                self.signature = None;
                self.signature_layer = None;
                self.scene.set_signature(None);
                self.scene.bind_overlay(None);
            }
        }
    }

    fn install_background(&mut self, asset: ImageAsset) {
        let fit = loader::fit_contain(asset.width(), asset.height(), self.scene.viewport());
        info!(width = asset.width(), height = asset.height(), scale = fit.scale, "background fitted");
        self.scene.set_background(Some(ImageNode::new(asset.raster(), fit.rect)));
        self.controller.set_bounds(fit.rect);
        self.background_fit = Some(fit);
        self.background = Some(asset);
    }

    fn place_signature(&mut self) {
        let (Some(signature), Some(fit)) = (self.signature.as_ref(), self.background_fit) else {
            return;
        };
        let layer = extract::prepare_signature(signature, self.thresholds);
        self.controller.init(fit.rect, (signature.width(), signature.height()));
        if std::mem::take(&mut self.reset_on_place) {
            self.controller.reset();
        }

        let mut node = ImageNode::new(Arc::clone(&layer.image), Rect::default());
        node.set_opacity(layer.opacity);
        self.scene.set_signature(Some(node));
        self.signature_layer = Some(layer);
        self.sync_signature();
    }

    /// Push the controller's transform into the signature node and overlay.
    fn sync_signature(&mut self) {
        let rect = self.controller.transform().map(|t| t.displayed_rect());
        if let (Some(rect), Some(node)) = (rect, self.scene.signature_mut()) {
            node.set_rect(rect);
        }
        self.scene.bind_overlay(rect);
    }

    /// New thresholds: re-extract from the intrinsic asset, keep the transform.
    pub fn set_thresholds(&mut self, thresholds: Thresholds) {
        if thresholds == self.thresholds {
            return;
        }
        self.thresholds = thresholds;
        let Some(signature) = self.signature.as_ref() else {
            return;
        };
        if self.controller.transform().is_none() {
            return;
        }
        let layer = extract::prepare_signature(signature, thresholds);
        if let Some(node) = self.scene.signature_mut() {
            node.set_source(Arc::clone(&layer.image));
            node.set_opacity(layer.opacity);
        }
        self.signature_layer = Some(layer);
    }

    /// Surface resized: re-fit the background from its intrinsic size.
    pub fn resize_viewport(&mut self, viewport: Viewport) {
        self.scene.set_viewport(viewport);
        if let Some(bg) = self.background.as_ref() {
            let fit = loader::fit_contain(bg.width(), bg.height(), viewport);
            if let Some(node) = self.scene.background_mut() {
                node.set_rect(fit.rect);
            }
            self.controller.set_bounds(fit.rect);
            self.background_fit = Some(fit);
        }
        debug!(width = viewport.width, height = viewport.height, "viewport resized");
    }

    pub fn pointer_down(&mut self, x: f64, y: f64) -> bool {
        if !self.is_active() {
            return false;
        }
        let handles = self.scene.handles_visible();
        self.controller.begin_gesture(x, y, handles)
    }

    pub fn pointer_move(&mut self, x: f64, y: f64) -> bool {
        if self.controller.pointer_move(x, y).is_some() {
            self.sync_signature();
            return true;
        }
        false
    }

    pub fn pointer_up(&mut self) -> bool {
        if self.controller.end_gesture().is_some() {
            self.sync_signature();
            return true;
        }
        false
    }

    /// Explicit reset action.
    pub fn reset(&mut self) -> Option<SignatureTransform> {
        let t = self.controller.reset()?;
        info!("signature reset to initial placement");
        self.sync_signature();
        Some(t)
    }

    /// Rasterize pending changes. True if the canvas changed.
    pub fn redraw(&mut self) -> bool {
        self.scene.redraw()
    }

    pub fn canvas(&self) -> &image::RgbaImage {
        self.scene.canvas()
    }

    /// Flatten without handles into `signed-image.png`.
    pub fn export(&mut self) -> Result<ExportArtifact> {
        if !self.is_active() {
            return Err(Error::NotReady);
        }
        self.scene.export_png()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;
    use image::{Rgba, RgbaImage};

    fn asset(w: u32, h: u32, c: [u8; 4]) -> ImageAsset {
        ImageAsset::from_rgba(RgbaImage::from_pixel(w, h, Rgba(c)))
    }

    fn composer() -> Composer {
        Composer::new(Viewport::new(400.0, 300.0), Thresholds::default(), Box::new(MemoryStore::default()))
    }

    #[test]
    fn placement_waits_for_both_assets() {
        let mut c = composer();
        let sig = c.begin_load(AssetSlot::Signature);
        let bg = c.begin_load(AssetSlot::Background);
        assert_eq!(c.finish_load(sig, Ok(asset(200, 100, [0, 0, 0, 255]))), LoadOutcome::Waiting);
        assert!(c.transform().is_none());
        assert_eq!(c.finish_load(bg, Ok(asset(800, 600, [255, 255, 255, 255]))), LoadOutcome::Placed);
        assert!(c.is_active());
        assert_eq!(c.background_rect(), Some(Rect::new(0.0, 0.0, 400.0, 300.0)));
    }

    #[test]
    fn stale_decode_is_discarded() {
        let mut c = composer();
        let bg = c.begin_load(AssetSlot::Background);
        let first = c.begin_load(AssetSlot::Signature);
        let second = c.begin_load(AssetSlot::Signature);
        c.finish_load(bg, Ok(asset(800, 600, [255, 255, 255, 255])));
        assert_eq!(c.finish_load(second, Ok(asset(100, 50, [0, 0, 0, 255]))), LoadOutcome::Placed);
        assert_eq!(c.finish_load(first, Ok(asset(999, 999, [0, 0, 0, 255]))), LoadOutcome::Stale);
        assert_eq!(c.transform().unwrap().width, 100.0);
    }

    #[test]
    fn failed_decode_leaves_view_inactive() {
        let mut c = composer();
        assert_eq!(c.load_bytes(AssetSlot::Background, b"nope", None), LoadOutcome::Failed);
        let sig = c.begin_load(AssetSlot::Signature);
        assert_eq!(c.finish_load(sig, Ok(asset(10, 10, [0, 0, 0, 255]))), LoadOutcome::Waiting);
        assert!(!c.is_active());
        assert!(matches!(c.export(), Err(Error::NotReady)));
    }

    #[test]
    fn reset_flag_applies_once_at_placement() {
        let mut c = composer();
        c.request_reset_on_place();
        let bg = c.begin_load(AssetSlot::Background);
        let sig = c.begin_load(AssetSlot::Signature);
        c.finish_load(bg, Ok(asset(800, 600, [255, 255, 255, 255])));
        c.finish_load(sig, Ok(asset(200, 100, [0, 0, 0, 255])));
        let t = c.transform().unwrap();
        assert_eq!((t.scale_x, t.scale_y), (1.0, 1.0));
        assert_eq!(Some(t), c.initial_snapshot());
        assert!(!c.reset_on_place);
    }

    #[test]
    fn threshold_change_keeps_transform() {
        let mut c = composer();
        let bg = c.begin_load(AssetSlot::Background);
        let sig = c.begin_load(AssetSlot::Signature);
        c.finish_load(bg, Ok(asset(800, 600, [255, 255, 255, 255])));
        c.finish_load(sig, Ok(asset(200, 100, [0, 0, 0, 200])));
        c.pointer_down(200.0, 150.0);
        c.pointer_move(150.0, 120.0);
        c.pointer_up();
        let before = c.transform();
        c.set_thresholds(Thresholds::new(0, 0));
        assert_eq!(c.transform(), before);
        let layer = c.signature_layer().unwrap();
        assert!(layer.image.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn oversized_persisted_record_still_redraws() {
        let mut mem = MemoryStore::default();
        let record = r#"{"x": 0, "y": 0, "width": 200000, "height": 200000, "scaleX": 1, "scaleY": 1}"#;
        mem.set(crate::persist::TRANSFORM_KEY, record.into()).unwrap();
        let mut c = Composer::new(Viewport::new(400.0, 300.0), Thresholds::default(), Box::new(mem));
        let bg = c.begin_load(AssetSlot::Background);
        let sig = c.begin_load(AssetSlot::Signature);
        c.finish_load(bg, Ok(asset(800, 600, [128, 128, 128, 255])));
        assert_eq!(c.finish_load(sig, Ok(asset(20, 10, [0, 0, 0, 255]))), LoadOutcome::Placed);

        let t = c.transform().unwrap();
        let bg_rect = c.background_rect().unwrap();
        assert!(t.displayed_width() <= bg_rect.width && t.displayed_height() <= bg_rect.height);
        assert!(c.redraw());
        assert_eq!(c.canvas().dimensions(), (400, 300));
    }

    #[test]
    fn unreadable_signature_uses_opacity_fallback() {
        let mut c = Composer::new(Viewport::new(400.0, 300.0), Thresholds::new(51, 255), Box::new(MemoryStore::default()));
        let bg = c.begin_load(AssetSlot::Background);
        let sig = c.begin_load(AssetSlot::Signature);
        c.finish_load(bg, Ok(asset(800, 600, [255, 255, 255, 255])));
        let denied = asset(200, 100, [0, 0, 0, 255]).with_access(crate::loader::PixelAccess::Denied);
        assert_eq!(c.finish_load(sig, Ok(denied)), LoadOutcome::Placed);
        assert!(!c.signature_layer().unwrap().processed);
        let node = c.scene.signature().unwrap();
        assert!((node.opacity() - 0.8).abs() < 1e-6);
        assert_eq!(Some(node.rect()), c.transform().map(|t| t.displayed_rect()));
    }

    #[test]
    fn viewport_resize_refits_background_only() {
        let mut c = composer();
        let bg = c.begin_load(AssetSlot::Background);
        let sig = c.begin_load(AssetSlot::Signature);
        c.finish_load(bg, Ok(asset(800, 600, [255, 255, 255, 255])));
        c.finish_load(sig, Ok(asset(200, 100, [0, 0, 0, 255])));
        let t = c.transform();
        c.resize_viewport(Viewport::new(800.0, 300.0));
        assert_eq!(c.background_rect(), Some(Rect::new(200.0, 0.0, 400.0, 300.0)));
        assert_eq!(c.transform(), t);
    }
}
