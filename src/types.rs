// Core value types shared by the loader, controller and renderer.

/// What the window shows: one `u32` per pixel, packed as 0x00RRGGBB for minifb.
#[derive(Clone)]
pub struct FrameBuffer {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u32>,
}

impl FrameBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, pixels: vec![0u32; width * height] }
    }

    pub fn fill(&mut self, color: u32) {
        self.pixels.fill(color);
    }
}

/// Size of the rendering surface in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Pixel dimensions of a raster covering the viewport (at least 1×1).
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }
}

/// Axis-aligned on-screen rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn contains_point(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.right() && py >= self.y && py <= self.bottom()
    }

    /// True when `inner` lies inside `self`, allowing `eps` of float slack.
    pub fn contains_rect(&self, inner: &Rect, eps: f64) -> bool {
        inner.x >= self.x - eps
            && inner.y >= self.y - eps
            && inner.right() <= self.right() + eps
            && inner.bottom() <= self.bottom() + eps
    }
}

/// Alpha acceptance band. `min <= max` is the caller's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub min: u8,
    pub max: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { min: 0, max: 255 }
    }
}

impl Thresholds {
    pub fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    /// Whether an alpha value falls inside `[min, max]`.
    #[inline]
    pub fn accepts(&self, alpha: u8) -> bool {
        alpha >= self.min && alpha <= self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_containment_uses_all_edges() {
        let outer = Rect::new(10.0, 10.0, 100.0, 50.0);
        assert!(outer.contains_rect(&Rect::new(10.0, 10.0, 100.0, 50.0), 0.0));
        assert!(!outer.contains_rect(&Rect::new(9.0, 10.0, 20.0, 20.0), 0.0));
        assert!(!outer.contains_rect(&Rect::new(100.0, 10.0, 20.0, 20.0), 0.0));
        assert!(!outer.contains_rect(&Rect::new(20.0, 50.0, 20.0, 20.0), 0.0));
    }

    #[test]
    fn thresholds_band_is_inclusive() {
        let t = Thresholds::new(10, 250);
        assert!(t.accepts(10));
        assert!(t.accepts(250));
        assert!(!t.accepts(9));
        assert!(!t.accepts(251));
        assert!(!Thresholds::new(0, 0).accepts(1));
    }

    #[test]
    fn viewport_pixel_size_never_zero() {
        assert_eq!(Viewport::new(0.0, 0.4).pixel_size(), (1, 1));
        assert_eq!(Viewport::new(400.0, 300.0).pixel_size(), (400, 300));
    }
}
