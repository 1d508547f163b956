// Gamma-correct "source over" compositing for the layer rasterizer.
// Visual: the signature's soft ink edges sit on the paper without dark fringes.

use image::Rgba;

pub struct GammaLut {
    // sRGB(0..255) -> linear (0..1)
    srgb_to_linear: [f32; 256],
    // linear(0..1) -> sRGB(0..255), index = (linear * 4095).round()
    linear_to_srgb: [u8; 4096],
}

impl Default for GammaLut {
    fn default() -> Self {
        Self::new()
    }
}

impl GammaLut {
    /// Build both tables once; the scene owns a single instance.
    pub fn new() -> Self {
        let srgb_to_linear = std::array::from_fn(|v| {
            let c = v as f32 / 255.0;
            if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) }
        });
        let linear_to_srgb = std::array::from_fn(|i| {
            let l = i as f32 / 4095.0;
            let s = if l <= 0.003_130_8 { 12.92 * l } else { 1.055 * l.powf(1.0 / 2.4) - 0.055 };
            (s * 255.0).round().clamp(0.0, 255.0) as u8
        });
        Self { srgb_to_linear, linear_to_srgb }
    }

    #[inline]
    pub fn srgb_u8_to_linear(&self, v: u8) -> f32 {
        self.srgb_to_linear[v as usize]
    }

    #[inline]
    pub fn linear_to_srgb_u8(&self, l: f32) -> u8 {
        let idx = (l.clamp(0.0, 1.0) * 4095.0).round() as usize;
        self.linear_to_srgb[idx]
    }

    /// Straight-alpha source-over of `src` (scaled by `opacity`) onto `dst`.
    pub fn blend_over(&self, dst: Rgba<u8>, src: Rgba<u8>, opacity: f32) -> Rgba<u8> {
        let sa = f32::from(src[3]) / 255.0 * opacity.clamp(0.0, 1.0);
        if sa <= 0.0 {
            return dst;
        }
        if sa >= 1.0 {
            return Rgba([src[0], src[1], src[2], 255]);
        }

        let da = f32::from(dst[3]) / 255.0;
        let out_a = sa + da * (1.0 - sa);
        let dst_weight = da * (1.0 - sa);
        let mut out = [0u8; 4];
        for c in 0..3 {
            let s = self.srgb_u8_to_linear(src[c]);
            let d = self.srgb_u8_to_linear(dst[c]);
            out[c] = self.linear_to_srgb_u8((s * sa + d * dst_weight) / out_a);
        }
        out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
        Rgba(out)
    }

    /// Flatten an RGBA pixel onto an opaque 0x00RRGGBB backdrop for the window.
    pub fn over_backdrop(&self, px: Rgba<u8>, backdrop: u32) -> u32 {
        let back = Rgba([
            ((backdrop >> 16) & 0xFF) as u8,
            ((backdrop >> 8) & 0xFF) as u8,
            (backdrop & 0xFF) as u8,
            255,
        ]);
        let o = self.blend_over(back, px, 1.0);
        (u32::from(o[0]) << 16) | (u32::from(o[1]) << 8) | u32::from(o[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_round_trip_endpoints() {
        let lut = GammaLut::new();
        for v in [0u8, 1, 128, 254, 255] {
            assert_eq!(lut.linear_to_srgb_u8(lut.srgb_u8_to_linear(v)), v);
        }
    }

    #[test]
    fn transparent_source_keeps_destination() {
        let lut = GammaLut::new();
        let dst = Rgba([1, 2, 3, 4]);
        assert_eq!(lut.blend_over(dst, Rgba([200, 200, 200, 0]), 1.0), dst);
        assert_eq!(lut.blend_over(dst, Rgba([200, 200, 200, 255]), 0.0), dst);
    }

    #[test]
    fn opaque_source_replaces_destination() {
        let lut = GammaLut::new();
        let out = lut.blend_over(Rgba([9, 9, 9, 255]), Rgba([10, 20, 30, 255]), 1.0);
        assert_eq!(out, Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn onto_empty_canvas_keeps_source_color() {
        let lut = GammaLut::new();
        let out = lut.blend_over(Rgba([0, 0, 0, 0]), Rgba([100, 50, 25, 128]), 1.0);
        assert_eq!(&out.0[..3], &[100, 50, 25]);
        assert_eq!(out[3], 128);
    }

    #[test]
    fn backdrop_shows_through_transparency() {
        let lut = GammaLut::new();
        assert_eq!(lut.over_backdrop(Rgba([255, 0, 0, 0]), 0x0022_2222), 0x0022_2222);
        assert_eq!(lut.over_backdrop(Rgba([255, 0, 0, 255]), 0x0022_2222), 0x00FF_0000);
    }
}
