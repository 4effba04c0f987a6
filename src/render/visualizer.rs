//! Audio spectrum visualizer: bars, waveform ribbon, or a pulsing ring.

use kurbo::{BezPath, Circle, Point, Rect, Shape};

use crate::config::{VizConfig, VizStyle};
use crate::render::{bezpath_to_cpu, color_from_rgba8};

/// Bar rectangles along the bottom edge. Bar width leaves most bins
/// off-screen on purpose; only the low end of the spectrum shows.
pub fn bar_rects(spectrum: &[u8], w: f64, h: f64) -> Vec<Rect> {
    if spectrum.is_empty() {
        return Vec::new();
    }
    let bar_w = w / spectrum.len() as f64 * 2.5;
    let mut rects = Vec::new();
    for (i, &v) in spectrum.iter().enumerate() {
        let x = i as f64 * (bar_w + 1.0);
        if x > w {
            break;
        }
        let bar_h = f64::from(v) / 255.0 * h * 0.3;
        if bar_h > 0.0 {
            rects.push(Rect::new(x, h - bar_h, x + bar_w, h));
        }
    }
    rects
}

/// Waveform centerline near the bottom of the frame.
pub fn wave_points(spectrum: &[u8], w: f64, h: f64) -> Vec<Point> {
    if spectrum.is_empty() {
        return Vec::new();
    }
    let slice = w / spectrum.len() as f64;
    spectrum
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let y = (h - 200.0) + f64::from(v) / 128.0 * 100.0;
            Point::new(i as f64 * slice, y)
        })
        .collect()
}

/// Closed ribbon approximating a stroked polyline of the given
/// half-thickness.
fn ribbon(points: &[Point], half: f64) -> BezPath {
    let mut path = BezPath::new();
    if points.len() < 2 {
        return path;
    }
    path.move_to((points[0].x, points[0].y - half));
    for p in &points[1..] {
        path.line_to((p.x, p.y - half));
    }
    for p in points.iter().rev() {
        path.line_to((p.x, p.y + half));
    }
    path.close_path();
    path
}

/// Ring whose radius swells with the average level.
fn ring(cx: f64, cy: f64, level: u8, width: f64) -> BezPath {
    let r = 100.0 + f64::from(level) * 0.5;
    let mut path = Circle::new((cx, cy), r + width / 2.0).to_path(0.1);
    let inner = Circle::new((cx, cy), r - width / 2.0).to_path(0.1);
    path.extend(inner.reverse_subpaths());
    path
}

pub fn draw_visualizer(
    ctx: &mut vello_cpu::RenderContext,
    cfg: &VizConfig,
    spectrum: &[u8],
    level: u8,
    w: f64,
    h: f64,
) {
    if cfg.style == VizStyle::None {
        return;
    }
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(color_from_rgba8(cfg.color));
    match cfg.style {
        VizStyle::Bars => {
            for r in bar_rects(spectrum, w, h) {
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(r.x0, r.y0, r.x1, r.y1));
            }
        }
        VizStyle::Wave => {
            let path = ribbon(&wave_points(spectrum, w, h), 2.0);
            ctx.fill_path(&bezpath_to_cpu(&path));
        }
        VizStyle::Circle => {
            let path = ring(w / 2.0, h / 2.0, level, 5.0);
            ctx.fill_path(&bezpath_to_cpu(&path));
        }
        VizStyle::None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bars_scale_with_bin_value() {
        let mut spectrum = vec![0u8; 64];
        spectrum[0] = 255;
        spectrum[1] = 128;
        let rects = bar_rects(&spectrum, 300.0, 1000.0);
        // Zero bins draw nothing.
        assert_eq!(rects.len(), 2);
        assert!((rects[0].height() - 300.0).abs() < 1e-9);
        assert!((rects[1].height() - 128.0 / 255.0 * 300.0).abs() < 1e-9);
        // Anchored to the bottom edge.
        assert_eq!(rects[0].y1, 1000.0);
    }

    #[test]
    fn bars_stop_at_the_right_edge() {
        let spectrum = vec![200u8; 64];
        let rects = bar_rects(&spectrum, 100.0, 100.0);
        assert!(rects.len() < 64);
        assert!(rects.iter().all(|r| r.x0 <= 100.0));
    }

    #[test]
    fn wave_sits_near_the_bottom() {
        let pts = wave_points(&[0, 128, 255], 300.0, 1080.0);
        assert_eq!(pts.len(), 3);
        assert!((pts[0].y - 880.0).abs() < 1e-9);
        assert!((pts[1].y - 980.0).abs() < 1e-9);
    }

    #[test]
    fn ribbon_needs_two_points() {
        assert_eq!(ribbon(&[Point::new(0.0, 0.0)], 2.0).elements().len(), 0);
        let path = ribbon(&[Point::new(0.0, 0.0), Point::new(10.0, 0.0)], 2.0);
        assert!(!path.elements().is_empty());
    }

    #[test]
    fn ring_has_two_subpaths() {
        let path = ring(50.0, 50.0, 100, 5.0);
        let moves = path
            .elements()
            .iter()
            .filter(|el| matches!(el, kurbo::PathEl::MoveTo(_)))
            .count();
        assert_eq!(moves, 2);
    }

    #[test]
    fn empty_spectrum_is_quiet() {
        assert!(bar_rects(&[], 100.0, 100.0).is_empty());
        assert!(wave_points(&[], 100.0, 100.0).is_empty());
    }
}
