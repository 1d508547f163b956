//! Signature placement: drag, resize, reset and the bounds they obey.
//!
//! The controller is a small state machine over [`SignatureTransform`].
//! Pointer gestures go through `begin_*` / `pointer_move` / `end_gesture`,
//! and the lower-level `drag_to` / `resize_live` / `end_resize` transitions
//! can be driven directly. Every drag-end and resize-end writes the store.
//!
//! Invariants held after each transition:
//! - the signature's displayed rect stays inside the background rect
//!   (unless a restored record put it elsewhere and nobody has touched it yet),
//! - displayed size never drops below [`MIN_WIDTH`] × [`MIN_HEIGHT`],
//! - after a resize ends, `scale_x == scale_y == 1`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::persist::TransformStore;
use crate::types::Rect;

/// Smallest displayed signature size, in pixels.
pub const MIN_WIDTH: f64 = 20.0;
pub const MIN_HEIGHT: f64 = 10.0;

/// Default signature width as a fraction of the background's displayed width.
pub const DEFAULT_WIDTH_FRACTION: f64 = 0.2;

/// Side of a square resize handle, in pixels.
pub const HANDLE_SIZE: f64 = 10.0;

/// Float noise tolerated when checking a restored size against the background.
const RESTORE_SLACK: f64 = 1e-6;

/// Placement of the signature. Displayed size is `width * scale_x` by
/// `height * scale_y`. Serialized as `{x, y, width, height, scaleX, scaleY}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureTransform {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl SignatureTransform {
    pub fn displayed_width(&self) -> f64 {
        self.width * self.scale_x
    }

    pub fn displayed_height(&self) -> f64 {
        self.height * self.scale_y
    }

    pub fn displayed_rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.displayed_width(), self.displayed_height())
    }

    /// Same displayed rect, scale folded into width/height.
    pub fn normalized(&self) -> Self {
        Self {
            width: self.displayed_width(),
            height: self.displayed_height(),
            scale_x: 1.0,
            scale_y: 1.0,
            ..*self
        }
    }
}

/// One of the eight resize anchors around the signature. No rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Handle {
    pub const ALL: [Handle; 8] = [
        Handle::TopLeft,
        Handle::TopCenter,
        Handle::TopRight,
        Handle::MiddleLeft,
        Handle::MiddleRight,
        Handle::BottomLeft,
        Handle::BottomCenter,
        Handle::BottomRight,
    ];

    pub fn moves_left(self) -> bool {
        matches!(self, Self::TopLeft | Self::MiddleLeft | Self::BottomLeft)
    }

    pub fn moves_right(self) -> bool {
        matches!(self, Self::TopRight | Self::MiddleRight | Self::BottomRight)
    }

    pub fn moves_top(self) -> bool {
        matches!(self, Self::TopLeft | Self::TopCenter | Self::TopRight)
    }

    pub fn moves_bottom(self) -> bool {
        matches!(self, Self::BottomLeft | Self::BottomCenter | Self::BottomRight)
    }

    /// Center of the handle on `rect`.
    pub fn anchor(self, rect: &Rect) -> (f64, f64) {
        let x = if self.moves_left() {
            rect.x
        } else if self.moves_right() {
            rect.right()
        } else {
            rect.x + rect.width / 2.0
        };
        let y = if self.moves_top() {
            rect.y
        } else if self.moves_bottom() {
            rect.bottom()
        } else {
            rect.y + rect.height / 2.0
        };
        (x, y)
    }

    /// Square the handle occupies on screen.
    pub fn square(self, rect: &Rect) -> Rect {
        let (cx, cy) = self.anchor(rect);
        let half = HANDLE_SIZE / 2.0;
        Rect::new(cx - half, cy - half, HANDLE_SIZE, HANDLE_SIZE)
    }

    /// Move the edges this handle controls by the pointer delta.
    pub fn apply_delta(self, start: &Rect, dx: f64, dy: f64) -> Rect {
        let mut r = *start;
        if self.moves_left() {
            r.x += dx;
            r.width -= dx;
        } else if self.moves_right() {
            r.width += dx;
        }
        if self.moves_top() {
            r.y += dy;
            r.height -= dy;
        } else if self.moves_bottom() {
            r.height += dy;
        }
        r
    }
}

/// Keep a proposed resize box inside `bounds`.
pub fn bound_box(proposed: Rect, bounds: &Rect) -> Rect {
    let x = bounds.x.max(proposed.x.min(bounds.right() - proposed.width));
    let y = bounds.y.max(proposed.y.min(bounds.bottom() - proposed.height));
    Rect::new(
        x,
        y,
        proposed.width.min(bounds.right() - x),
        proposed.height.min(bounds.bottom() - y),
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    Idle,
    Dragging { grab_dx: f64, grab_dy: f64, moved: bool },
    Resizing { handle: Handle, start: Rect, origin_x: f64, origin_y: f64 },
}

/// Owns the signature transform and every rule about how it may change.
pub struct TransformController {
    store: TransformStore,
    bounds: Rect,
    current: Option<SignatureTransform>,
    initial: Option<SignatureTransform>,
    gesture: Gesture,
}

impl TransformController {
    pub fn new(store: TransformStore) -> Self {
        Self {
            store,
            bounds: Rect::default(),
            current: None,
            initial: None,
            gesture: Gesture::Idle,
        }
    }

    pub fn transform(&self) -> Option<SignatureTransform> {
        self.current
    }

    pub fn initial_snapshot(&self) -> Option<SignatureTransform> {
        self.initial
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Background rect moved (viewport refit). The signature is left alone.
    pub fn set_bounds(&mut self, bounds: Rect) {
        self.bounds = bounds;
    }

    pub fn is_busy(&self) -> bool {
        self.gesture != Gesture::Idle
    }

    /// Centered at 20% of the background width, aspect preserved.
    pub fn default_transform(bounds: &Rect, intrinsic: (u32, u32)) -> SignatureTransform {
        let (w, h) = (f64::from(intrinsic.0.max(1)), f64::from(intrinsic.1.max(1)));
        let scale = bounds.width * DEFAULT_WIDTH_FRACTION / w;
        let (sig_w, sig_h) = (w * scale, h * scale);
        SignatureTransform {
            x: bounds.x + (bounds.width - sig_w) / 2.0,
            y: bounds.y + (bounds.height - sig_h) / 2.0,
            width: w,
            height: h,
            scale_x: scale,
            scale_y: scale,
        }
    }

    /// Place a freshly extracted signature. A persisted record is adopted
    /// as-is, missing fields taken from the computed default. The initial
    /// snapshot is captured here, normalized to unit scale.
    pub fn init(&mut self, bounds: Rect, intrinsic: (u32, u32)) -> SignatureTransform {
        self.bounds = bounds;
        self.gesture = Gesture::Idle;
        let defaults = Self::default_transform(&bounds, intrinsic);
        let placed = match self.store.load_record() {
            Some(record) => {
                info!(?record, "restoring persisted signature transform");
                Self::bound_restored(record.resolve(&defaults), &defaults, &bounds)
            }
            None => {
                info!("placing signature at default position");
                defaults
            }
        };
        self.current = Some(placed);
        self.initial = Some(placed.normalized());
        placed
    }

    /// A restored axis displayed larger than the background is corrupt:
    /// that axis falls back to the default size and scale.
    fn bound_restored(
        mut restored: SignatureTransform,
        defaults: &SignatureTransform,
        bounds: &Rect,
    ) -> SignatureTransform {
        if restored.displayed_width() > bounds.width + RESTORE_SLACK {
            warn!(width = restored.displayed_width(), "restored width exceeds background");
            restored.width = defaults.width;
            restored.scale_x = defaults.scale_x;
        }
        if restored.displayed_height() > bounds.height + RESTORE_SLACK {
            warn!(height = restored.displayed_height(), "restored height exceeds background");
            restored.height = defaults.height;
            restored.scale_y = defaults.scale_y;
        }
        restored
    }

    /// Back to the initial snapshot, unit scale. Not persisted.
    pub fn reset(&mut self) -> Option<SignatureTransform> {
        let initial = self.initial?;
        self.gesture = Gesture::Idle;
        self.current = Some(initial);
        debug!(?initial, "signature reset");
        Some(initial)
    }

    /// Move to a candidate position, clamped so the displayed rect stays inside.
    pub fn drag_to(&mut self, x: f64, y: f64) -> Option<SignatureTransform> {
        let bounds = self.bounds;
        let t = self.current.as_mut()?;
        let max_x = bounds.right() - t.displayed_width();
        let max_y = bounds.bottom() - t.displayed_height();
        t.x = bounds.x.max(x.min(max_x));
        t.y = bounds.y.max(y.min(max_y));
        Some(*t)
    }

    pub fn end_drag(&mut self) {
        self.gesture = Gesture::Idle;
        self.persist();
    }

    /// Live resize toward `proposed` (a displayed-space box). The box is kept
    /// inside the background, then turned into scale factors with the
    /// minimum-size clamp applied to the scales, never to width/height.
    pub fn resize_live(&mut self, handle: Handle, proposed: Rect) -> Option<SignatureTransform> {
        let boxed = bound_box(proposed, &self.bounds);
        let t = self.current.as_mut()?;
        let min_sx = MIN_WIDTH / if t.width > 0.0 { t.width } else { 1.0 };
        let min_sy = MIN_HEIGHT / if t.height > 0.0 { t.height } else { 1.0 };
        t.scale_x = (boxed.width / t.width).max(min_sx);
        t.scale_y = (boxed.height / t.height).max(min_sy);

        // Left/top handles keep the opposite edge where the box put it.
        t.x = if handle.moves_left() { boxed.right() - t.displayed_width() } else { boxed.x };
        t.y = if handle.moves_top() { boxed.bottom() - t.displayed_height() } else { boxed.y };
        Some(*t)
    }

    /// Fold scale into width/height, pull the rect back inside, persist.
    pub fn end_resize(&mut self) -> Option<SignatureTransform> {
        self.gesture = Gesture::Idle;
        let bounds = self.bounds;
        let t = self.current.as_mut()?;
        let new_w = t.displayed_width().max(MIN_WIDTH);
        let new_h = t.displayed_height().max(MIN_HEIGHT);
        let (mut nx, mut ny) = (t.x, t.y);
        if nx < bounds.x {
            nx = bounds.x;
        }
        if ny < bounds.y {
            ny = bounds.y;
        }
        if nx + new_w > bounds.right() {
            nx = bounds.right() - new_w;
        }
        if ny + new_h > bounds.bottom() {
            ny = bounds.bottom() - new_h;
        }
        *t = SignatureTransform { x: nx, y: ny, width: new_w, height: new_h, scale_x: 1.0, scale_y: 1.0 };
        let done = *t;
        self.persist();
        Some(done)
    }

    /// Which handle (if any) sits under the pointer.
    pub fn handle_at(&self, px: f64, py: f64) -> Option<Handle> {
        let rect = self.current?.displayed_rect();
        Handle::ALL.into_iter().find(|h| h.square(&rect).contains_point(px, py))
    }

    /// Start a gesture at the pointer: a handle press resizes (when handles
    /// are live), a press on the signature drags. Returns whether one started.
    pub fn begin_gesture(&mut self, px: f64, py: f64, handles_live: bool) -> bool {
        let Some(t) = self.current else {
            return false;
        };
        if handles_live {
            if let Some(handle) = self.handle_at(px, py) {
                self.gesture = Gesture::Resizing {
                    handle,
                    start: t.displayed_rect(),
                    origin_x: px,
                    origin_y: py,
                };
                return true;
            }
        }
        if t.displayed_rect().contains_point(px, py) {
            self.gesture = Gesture::Dragging { grab_dx: px - t.x, grab_dy: py - t.y, moved: false };
            return true;
        }
        false
    }

    /// Feed a pointer position to the active gesture.
    pub fn pointer_move(&mut self, px: f64, py: f64) -> Option<SignatureTransform> {
        match self.gesture {
            Gesture::Idle => None,
            Gesture::Dragging { grab_dx, grab_dy, moved } => {
                let (x, y) = (px - grab_dx, py - grab_dy);
                let still = self
                    .current
                    .is_some_and(|t| (t.x - x).abs() < 1e-9 && (t.y - y).abs() < 1e-9);
                self.gesture = Gesture::Dragging { grab_dx, grab_dy, moved: moved || !still };
                self.drag_to(x, y)
            }
            Gesture::Resizing { handle, start, origin_x, origin_y } => {
                let proposed = handle.apply_delta(&start, px - origin_x, py - origin_y);
                self.resize_live(handle, proposed)
            }
        }
    }

    /// Pointer released: finish whatever was in progress.
    pub fn end_gesture(&mut self) -> Option<SignatureTransform> {
        match self.gesture {
            Gesture::Idle => None,
            Gesture::Dragging { moved, .. } => {
                self.gesture = Gesture::Idle;
                if moved {
                    self.end_drag();
                }
                self.current
            }
            Gesture::Resizing { .. } => self.end_resize(),
        }
    }

    fn persist(&mut self) {
        if let Some(t) = self.current {
            if let Err(err) = self.store.save(&t) {
                warn!(%err, "could not persist signature transform");
            }
        }
    }
}
