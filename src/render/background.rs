//! Background image placement: cover-fit, audio-reactive zoom, film
//! grain.

use kurbo::Affine;

use crate::config::BgConfig;
use crate::rng::XorShift64;

/// Transform mapping image pixel space onto the frame so the image
/// covers it fully, centered, preserving aspect ratio.
pub fn cover_transform(img_w: f64, img_h: f64, frame_w: f64, frame_h: f64) -> Affine {
    let ir = img_w / img_h;
    let cr = frame_w / frame_h;

    let (dw, dh) = if ir > cr {
        (frame_h * ir, frame_h)
    } else {
        (frame_w, frame_w / ir)
    };
    let dx = (frame_w - dw) / 2.0;
    let dy = (frame_h - dh) / 2.0;

    Affine::translate((dx, dy)) * Affine::scale(dw / img_w)
}

/// Background zoom for the current frame. The reactive term swells the
/// image with the audio level.
pub fn background_scale(cfg: &BgConfig, level: u8) -> f64 {
    let mut scale = cfg.scale;
    if cfg.reactive {
        scale += f64::from(level) / 255.0 * (cfg.intensity / 100.0) * 0.2;
    }
    scale
}

/// Zoom about the frame center composed with the cover placement.
pub fn background_transform(
    cfg: &BgConfig,
    level: u8,
    img_w: f64,
    img_h: f64,
    frame_w: f64,
    frame_h: f64,
) -> Affine {
    let s = background_scale(cfg, level);
    let cx = frame_w / 2.0;
    let cy = frame_h / 2.0;
    Affine::translate((cx, cy))
        * Affine::scale(s)
        * Affine::translate((-cx, -cy))
        * cover_transform(img_w, img_h, frame_w, frame_h)
}

/// Scatter small white speckles at low opacity.
pub fn draw_grain(ctx: &mut vello_cpu::RenderContext, w: f64, h: f64, rng: &mut XorShift64) {
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));
    ctx.push_opacity_layer(0.05);
    for _ in 0..150 {
        let x = rng.next_f64() * w;
        let y = rng.next_f64() * h;
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(x, y, x + 2.0, y + 2.0));
    }
    ctx.pop_layer();
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;

    #[test]
    fn cover_fills_wide_image_on_tall_frame() {
        // 2:1 image on a 1:2 frame: height matches, width overflows.
        let t = cover_transform(200.0, 100.0, 100.0, 200.0);
        let top_left = t * Point::new(0.0, 0.0);
        let bottom_right = t * Point::new(200.0, 100.0);
        assert!((top_left.y - 0.0).abs() < 1e-9);
        assert!((bottom_right.y - 200.0).abs() < 1e-9);
        // Overflow splits evenly left/right.
        assert!((top_left.x + bottom_right.x - 100.0).abs() < 1e-9);
        assert!(top_left.x < 0.0);
    }

    #[test]
    fn cover_matching_ratio_is_plain_scale() {
        let t = cover_transform(400.0, 225.0, 1920.0, 1080.0);
        let br = t * Point::new(400.0, 225.0);
        assert!((br.x - 1920.0).abs() < 1e-6);
        assert!((br.y - 1080.0).abs() < 1e-6);
    }

    #[test]
    fn reactive_scale_rises_with_level() {
        let cfg = BgConfig {
            reactive: true,
            intensity: 50.0,
            ..BgConfig::default()
        };
        assert_eq!(background_scale(&cfg, 0), 1.0);
        let loud = background_scale(&cfg, 255);
        assert!((loud - 1.1).abs() < 1e-9);
    }

    #[test]
    fn non_reactive_ignores_level() {
        let cfg = BgConfig {
            scale: 1.5,
            reactive: false,
            ..BgConfig::default()
        };
        assert_eq!(background_scale(&cfg, 255), 1.5);
    }

    #[test]
    fn zoom_is_anchored_at_frame_center() {
        let cfg = BgConfig {
            scale: 2.0,
            ..BgConfig::default()
        };
        let t = background_transform(&cfg, 0, 1920.0, 1080.0, 1920.0, 1080.0);
        let c = t * Point::new(960.0, 540.0);
        assert!((c.x - 960.0).abs() < 1e-6);
        assert!((c.y - 540.0).abs() < 1e-6);
    }
}
