//! Premultiplied RGBA8 byte-level primitives: gaussian blur, source-over
//! compositing (whole-buffer and rect-bounded), and the full-frame darken
//! and vignette passes.

use crate::error::{LyrvidError, LyrvidResult};

pub type PremulRgba8 = [u8; 4];

pub fn blur_rgba8_premul(
    src: &[u8],
    width: u32,
    height: u32,
    radius: u32,
    sigma: f32,
) -> LyrvidResult<Vec<u8>> {
    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| LyrvidError::render("blur buffer size overflow"))?;
    if src.len() != expected_len {
        return Err(LyrvidError::render(
            "blur_rgba8_premul expects src matching width*height*4",
        ));
    }
    if radius == 0 {
        return Ok(src.to_vec());
    }

    let kernel = gaussian_kernel_q16(radius, sigma)?;
    let mut tmp = vec![0u8; expected_len];
    let mut out = vec![0u8; expected_len];

    horizontal_pass(src, &mut tmp, width, height, &kernel);
    vertical_pass(&tmp, &mut out, width, height, &kernel);
    Ok(out)
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> LyrvidResult<Vec<u32>> {
    if radius == 0 {
        return Ok(vec![1 << 16]);
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(LyrvidError::validation("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let mut weights_f = Vec::<f64>::with_capacity((2 * r + 1) as usize);
    let mut sum = 0.0f64;
    let sigma = sigma as f64;
    let denom = 2.0 * sigma * sigma;
    for i in -r..=r {
        let x = i as f64;
        let w = (-x * x / denom).exp();
        weights_f.push(w);
        sum += w;
    }
    if sum <= 0.0 {
        return Err(LyrvidError::render("gaussian kernel sum is zero"));
    }

    let mut weights = Vec::<u32>::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = ((wf / sum) * 65536.0).round() as i64;
        let q = q.clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    let target: i64 = 65536;
    let delta = target - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        let mid_val = i64::from(weights[mid]);
        let new_mid = (mid_val + delta).clamp(0, 65536);
        weights[mid] = new_mid as u32;
    }

    Ok(weights)
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    for y in 0..height as i32 {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let dx = ki as i32 - radius;
                let sx = (x + dx).clamp(0, w - 1);
                let idx = ((y * w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += (kw as u64) * (src[idx + c] as u64);
                }
            }
            let out_idx = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst[out_idx + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn vertical_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    let h = height as i32;
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let dy = ki as i32 - radius;
                let sy = (y + dy).clamp(0, h - 1);
                let idx = ((sy * w + x) as usize) * 4;
                for c in 0..4 {
                    acc[c] += (kw as u64) * (src[idx + c] as u64);
                }
            }
            let out_idx = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst[out_idx + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn q16_to_u8(acc: u64) -> u8 {
    let v = (acc + 32768) >> 16;
    (v.min(255)) as u8
}

pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = u8::saturating_add(sa, mul_div255(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = u8::saturating_add(sc, dc);
    }
    out
}

pub fn over_in_place(dst: &mut [u8], src: &[u8], opacity: f32) -> LyrvidResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(LyrvidError::render(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], opacity);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Pixel rect `[x0, x1) x [y0, y1)`; callers clamp before building one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    /// Build from float bounds, clamped to the surface.
    pub fn from_bounds(x0: f64, y0: f64, x1: f64, y1: f64, width: u32, height: u32) -> Self {
        let cx = |v: f64, hi: u32| (v.max(0.0).round() as u32).min(hi);
        Self {
            x0: cx(x0, width),
            y0: cx(y0, height),
            x1: cx(x1, width),
            y1: cx(y1, height),
        }
    }

    pub fn is_empty(self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }
}

/// Source-over restricted to a pixel rect. Both buffers share dimensions;
/// the karaoke reveal uses this to uncover the accent layer left to right.
pub fn over_rect_in_place(
    dst: &mut [u8],
    src: &[u8],
    width: u32,
    height: u32,
    rect: PixelRect,
    opacity: f32,
) -> LyrvidResult<()> {
    let expected = (width as usize) * (height as usize) * 4;
    if dst.len() != expected || src.len() != expected {
        return Err(LyrvidError::render(
            "over_rect_in_place expects buffers matching width*height*4",
        ));
    }
    if rect.is_empty() || rect.x1 > width || rect.y1 > height {
        return Ok(());
    }

    for y in rect.y0..rect.y1 {
        let row = (y as usize) * (width as usize) * 4;
        let lo = row + (rect.x0 as usize) * 4;
        let hi = row + (rect.x1 as usize) * 4;
        for (d, s) in dst[lo..hi]
            .chunks_exact_mut(4)
            .zip(src[lo..hi].chunks_exact(4))
        {
            let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], opacity);
            d.copy_from_slice(&out);
        }
    }
    Ok(())
}

/// Composite uniform black over the whole buffer; `strength` in `[0, 1]`.
pub fn darken_in_place(buf: &mut [u8], strength: f64) {
    let keep = ((1.0 - strength.clamp(0.0, 1.0)) * 255.0).round() as u16;
    for px in buf.chunks_exact_mut(4) {
        for c in px.iter_mut().take(3) {
            *c = mul_div255(u16::from(*c), keep);
        }
    }
}

/// Radial vignette: untouched inside `inner_frac * width` from the frame
/// center, darkening linearly to `max_strength` at radius `width`.
pub fn vignette_in_place(buf: &mut [u8], width: u32, height: u32, max_strength: f64) {
    let expected = (width as usize) * (height as usize) * 4;
    if buf.len() != expected || width == 0 {
        return;
    }

    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let r0 = width as f64 * 0.4;
    let r1 = width as f64;
    let span = r1 - r0;

    for y in 0..height {
        let dy = y as f64 + 0.5 - cy;
        for x in 0..width {
            let dx = x as f64 + 0.5 - cx;
            let d = (dx * dx + dy * dy).sqrt();
            if d <= r0 {
                continue;
            }
            let t = ((d - r0) / span).clamp(0.0, 1.0);
            let keep = ((1.0 - t * max_strength) * 255.0).round() as u16;
            let idx = ((y as usize) * (width as usize) + x as usize) * 4;
            for c in 0..3 {
                buf[idx + c] = mul_div255(u16::from(buf[idx + c]), keep);
            }
        }
    }
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_radius_0_is_identity() {
        let src = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let out = blur_rgba8_premul(&src, 1, 2, 0, 1.0).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn blur_constant_image_is_identity() {
        let (w, h) = (4u32, 3u32);
        let px = [10u8, 20u8, 30u8, 40u8];
        let src = px.repeat((w * h) as usize);
        let out = blur_rgba8_premul(&src, w, h, 3, 2.0).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn blur_spreads_energy_from_single_pixel() {
        let (w, h) = (5u32, 5u32);
        let mut src = vec![0u8; (w * h * 4) as usize];
        let center = ((2 * w + 2) * 4) as usize;
        src[center..center + 4].copy_from_slice(&[255, 255, 255, 255]);

        let out = blur_rgba8_premul(&src, w, h, 2, 1.2).unwrap();

        let nonzero = out.chunks_exact(4).filter(|px| px[3] != 0).count();
        assert!(nonzero > 1);

        let sum_a: u32 = out.chunks_exact(4).map(|px| u32::from(px[3])).sum();
        assert!((sum_a as i32 - 255).abs() <= 4);
    }

    #[test]
    fn over_opacity_0_is_noop() {
        let dst = [1, 2, 3, 4];
        let src = [200, 200, 200, 200];
        assert_eq!(over(dst, src, 0.0), dst);
    }

    #[test]
    fn over_src_opaque_replaces_dst() {
        let dst = [0, 0, 0, 255];
        let src = [255, 0, 0, 255];
        assert_eq!(over(dst, src, 1.0), src);
    }

    #[test]
    fn over_rect_touches_only_the_rect() {
        let (w, h) = (4u32, 4u32);
        let mut dst = vec![0u8; (w * h * 4) as usize];
        let src = vec![255u8; (w * h * 4) as usize];

        let rect = PixelRect {
            x0: 1,
            y0: 1,
            x1: 3,
            y1: 2,
        };
        over_rect_in_place(&mut dst, &src, w, h, rect, 1.0).unwrap();

        for y in 0..h {
            for x in 0..w {
                let idx = ((y * w + x) * 4) as usize;
                let inside = (1..3).contains(&x) && y == 1;
                assert_eq!(dst[idx + 3] == 255, inside, "pixel ({x},{y})");
            }
        }
    }

    #[test]
    fn empty_rect_is_noop() {
        let mut dst = vec![0u8; 16];
        let src = vec![255u8; 16];
        let rect = PixelRect {
            x0: 2,
            y0: 0,
            x1: 2,
            y1: 2,
        };
        over_rect_in_place(&mut dst, &src, 2, 2, rect, 1.0).unwrap();
        assert!(dst.iter().all(|&b| b == 0));
    }

    #[test]
    fn rect_from_bounds_clamps() {
        let r = PixelRect::from_bounds(-5.0, 2.0, 100.0, 3.0, 10, 4);
        assert_eq!(
            r,
            PixelRect {
                x0: 0,
                y0: 2,
                x1: 10,
                y1: 3
            }
        );
    }

    #[test]
    fn darken_halves_channels() {
        let mut buf = vec![200u8, 100, 50, 255];
        darken_in_place(&mut buf, 0.5);
        assert_eq!(buf[3], 255);
        assert!((buf[0] as i32 - 100).abs() <= 1);
        assert!((buf[1] as i32 - 50).abs() <= 1);
    }

    #[test]
    fn vignette_darkens_corners_not_center() {
        let (w, h) = (16u32, 16u32);
        let mut buf = vec![255u8; (w * h * 4) as usize];
        vignette_in_place(&mut buf, w, h, 0.8);

        let center = ((8 * w + 8) * 4) as usize;
        assert_eq!(buf[center], 255);

        let corner = 0usize;
        assert!(buf[corner] < 255);
        assert_eq!(buf[corner + 3], 255);
    }
}
