//! The lyric block: wrapping, style presets, entry animations, karaoke
//! reveal and translation, all rasterized into one off-screen surface
//! that the frame pass composites with the effect transform.

use std::collections::HashMap;

use kurbo::Affine;

use crate::assets::{FontSet, TextBrushRgba8, TextLayoutEngine};
use crate::config::{EntryAnimation, RenderConfig, Rgba8, TextStylePreset};
use crate::effects::{EffectRegistry, FxContext, PaintState};
use crate::error::{LyrvidError, LyrvidResult};
use crate::model::{EffectKind, EntryKind, FontSlot, LyricEntry};
use crate::raster::{self, PixelRect};
use crate::render::layout::{
    block_metrics, reveal_fraction, wrap_syllables, wrap_words, MeasureKey, ParleyMeasure,
    TextMeasure,
};
use crate::render::{color_from_rgba8, pixmap_from_premul_bytes};
use crate::rng::XorShift64;

/// Entry animations finish half a second after the line starts.
const ENTRY_ANIM_SECS: f64 = 0.5;
/// The typewriter animation types the full line out over two seconds.
const TYPEWRITER_SECS: f64 = 2.0;

pub(crate) type FontDataCache = HashMap<FontSlot, vello_cpu::peniko::FontData>;

pub(crate) fn font_data_for(
    fonts: &FontSet,
    slot: FontSlot,
    cache: &mut FontDataCache,
) -> LyrvidResult<vello_cpu::peniko::FontData> {
    if let Some(f) = cache.get(&slot) {
        return Ok(f.clone());
    }
    let bytes = fonts
        .get(slot)
        .ok_or_else(|| LyrvidError::render("no font loaded for text drawing"))?;
    let font = vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes.to_vec()), 0);
    cache.insert(slot, font.clone());
    Ok(font)
}

/// One positioned glyph run: a shaped layout plus its top-left corner in
/// surface coordinates.
struct RunSpec {
    layout: parley::Layout<TextBrushRgba8>,
    x: f64,
    top: f64,
}

fn make_spec(
    engine: &mut TextLayoutEngine,
    font_bytes: &[u8],
    text: &str,
    size_px: f64,
    x: f64,
    baseline: f64,
) -> LyrvidResult<RunSpec> {
    let layout = engine.layout_plain(text, font_bytes, size_px as f32, TextBrushRgba8::default(), None)?;
    // Positioned glyphs carry the in-layout baseline offset, so shifting
    // the layout top by it puts the text on the requested baseline.
    let to_baseline = layout
        .lines()
        .next()
        .map(|l| f64::from(l.metrics().baseline))
        .unwrap_or(size_px * 0.8);
    Ok(RunSpec {
        layout,
        x,
        top: baseline - to_baseline,
    })
}

fn draw_specs(
    ctx: &mut vello_cpu::RenderContext,
    font: &vello_cpu::peniko::FontData,
    specs: &[RunSpec],
    color: Rgba8,
    dx: f64,
    dy: f64,
) {
    for spec in specs {
        ctx.set_transform(vello_cpu::kurbo::Affine::translate((
            spec.x + dx,
            spec.top + dy,
        )));
        ctx.set_paint(color_from_rgba8(color));
        for line in spec.layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let glyphs = run.positioned_glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(font)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
    }
}

/// Rasterize one draw pass into a premultiplied RGBA8 byte buffer.
fn rasterize_pass(
    width: u16,
    height: u16,
    f: impl FnOnce(&mut vello_cpu::RenderContext),
) -> Vec<u8> {
    let mut ctx = vello_cpu::RenderContext::new(width, height);
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    f(&mut ctx);
    ctx.flush();
    let mut pixmap = vello_cpu::Pixmap::new(width, height);
    ctx.render_to_pixmap(&mut pixmap);
    pixmap.data_as_u8_slice().to_vec()
}

/// The finished lyric block, ready to composite over the frame.
pub(crate) struct BlockRender {
    pub pixmap: vello_cpu::Pixmap,
    pub width: u16,
    pub height: u16,
    /// Maps surface pixel coordinates into the frame, effect transform
    /// included.
    pub transform: Affine,
    pub opacity: f32,
}

struct SylMeta {
    /// Wrapped sub-line index the syllable landed on.
    line: usize,
    x: f64,
    width: f64,
    baseline: f64,
    begin: f64,
    end: f64,
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn render_lyric_block(
    engine: &mut TextLayoutEngine,
    fonts: &FontSet,
    measure_cache: &mut HashMap<MeasureKey, f64>,
    font_cache: &mut FontDataCache,
    effects: &EffectRegistry,
    entry: &LyricEntry,
    time: f64,
    level: u8,
    cfg: &RenderConfig,
    frame_w: u32,
    frame_h: u32,
    rng: &mut XorShift64,
) -> LyrvidResult<Option<BlockRender>> {
    if !fonts.has_any() {
        return Ok(None);
    }

    let text_cfg = &cfg.text;
    let trans_size_pct = entry.style.trans_size_pct.unwrap_or(text_cfg.trans_size_pct);
    let trans_font = entry.style.trans_font.unwrap_or(text_cfg.trans_font);
    let trans_color = entry.style.trans_color.unwrap_or(text_cfg.trans_color);
    let main_slot = text_cfg.style.font_slot();

    let line_age = (time - entry.start_time).max(0.0);
    let karaoke = entry.kind != EntryKind::Plain && !entry.syllables.is_empty();

    let display_text = if text_cfg.animation == EntryAnimation::Typewriter && !karaoke {
        let total = entry.text.chars().count();
        let shown = ((line_age / TYPEWRITER_SECS) * total as f64).floor() as usize;
        entry.text.chars().take(shown.min(total)).collect()
    } else {
        entry.text.clone()
    };

    let translation = entry.translation.trim();
    let has_translation = !translation.is_empty();
    if !karaoke && display_text.is_empty() && !has_translation {
        return Ok(None);
    }

    let font_size_main = text_cfg.size * 2.0;
    let font_size_trans = font_size_main * trans_size_pct;
    let max_width = f64::from(frame_w) * 0.7;

    // Wrap and measure everything up front; the layouts come later.
    let mut syl_lines = Vec::new();
    let mut plain_lines = Vec::new();
    let mut plain_widths = Vec::new();
    let mut trans_lines = Vec::new();
    let mut trans_widths = Vec::new();
    {
        let mut measure = ParleyMeasure::new(engine, fonts, measure_cache);
        if karaoke {
            syl_lines = wrap_syllables(
                &entry.syllables,
                main_slot,
                font_size_main as f32,
                max_width,
                &mut measure,
            )?;
        } else {
            plain_lines = wrap_words(
                &display_text,
                main_slot,
                font_size_main as f32,
                max_width,
                &mut measure,
            )?;
            for line in &plain_lines {
                plain_widths.push(measure.measure(line, main_slot, font_size_main as f32)?);
            }
        }
        if has_translation {
            trans_lines = wrap_words(
                translation,
                trans_font,
                font_size_trans as f32,
                max_width,
                &mut measure,
            )?;
            for line in &trans_lines {
                trans_widths.push(measure.measure(line, trans_font, font_size_trans as f32)?);
            }
        }
    }

    let main_count = if karaoke {
        syl_lines.len()
    } else {
        plain_lines.len()
    };
    let m = block_metrics(
        text_cfg,
        trans_size_pct,
        f64::from(frame_h),
        main_count,
        trans_lines.len(),
    );
    let lh = m.line_height_main;

    // Entry animation.
    let mut alpha = 1.0f64;
    let mut y_anim = 0.0f64;
    let mut scale = 1.0f64;
    if line_age < ENTRY_ANIM_SECS {
        let p = line_age / ENTRY_ANIM_SECS;
        let ease = p * (2.0 - p);
        match text_cfg.animation {
            EntryAnimation::Fade => alpha = ease,
            EntryAnimation::SlideUp => {
                alpha = ease;
                y_anim = 80.0 * (1.0 - ease);
            }
            EntryAnimation::ZoomIn => {
                alpha = ease;
                scale = 0.8 + 0.2 * ease;
            }
            EntryAnimation::None | EntryAnimation::Typewriter => {}
        }
    }

    let mut paint = PaintState::default();
    {
        let mut fx = FxContext {
            width: f64::from(frame_w),
            height: f64::from(frame_h),
            time,
            level,
            line_age,
            rng,
        };
        effects.apply(entry.effect, &mut fx, &mut paint);
    }

    // Surface geometry. Karaoke lines center on the block origin, so the
    // top padding absorbs the upward half plus glow overshoot.
    let centering = if karaoke {
        (main_count as f64 - 1.0) * lh / 2.0
    } else {
        0.0
    };
    let pad_top = centering + font_size_main + 80.0;
    let pad_bottom = font_size_main * 1.5 + font_size_trans + 80.0;
    let surface_h = (pad_top + m.total_h + pad_bottom).ceil();

    let ws: u16 = (frame_w)
        .try_into()
        .map_err(|_| LyrvidError::render("lyric surface width exceeds u16"))?;
    let hs: u16 = (surface_h as u32)
        .try_into()
        .map_err(|_| LyrvidError::render("lyric surface height exceeds u16"))?;
    let origin_y = pad_top;
    let center_x = f64::from(ws) / 2.0;

    // Flash strobes the whole block itself; the preset branch steps aside.
    let preset_active = entry.effect != EffectKind::Flash;
    let glow = if paint.override_preset || !preset_active {
        paint
            .glow_radius
            .map(|r| (r, paint.glow_color.unwrap_or([255, 255, 255, 255])))
    } else if text_cfg.style == TextStylePreset::Neon {
        Some((
            paint.glow_radius.unwrap_or(40.0),
            paint.glow_color.unwrap_or(text_cfg.shadow),
        ))
    } else {
        paint
            .glow_radius
            .map(|r| (r, paint.glow_color.unwrap_or(text_cfg.shadow)))
    };

    let fill = paint.fill.unwrap_or(text_cfg.color);
    let (base_color, accent_color) = if paint.override_preset {
        let c = paint.fill.unwrap_or([255, 255, 255, 255]);
        (c, c)
    } else {
        (text_cfg.color, text_cfg.accent)
    };

    // Shape the glyph runs.
    let main_bytes = fonts
        .get(main_slot)
        .cloned()
        .ok_or_else(|| LyrvidError::render("no font loaded for lyric text"))?;
    let main_font = font_data_for(fonts, main_slot, font_cache)?;

    let mut specs = Vec::new();
    let mut syl_meta = Vec::new();
    let mut line_spec_ranges = Vec::new();
    if karaoke {
        for (li, line) in syl_lines.iter().enumerate() {
            let line_w: f64 = line.iter().map(|(_, w)| w).sum();
            let baseline = origin_y + li as f64 * lh - centering;
            let mut x = center_x - line_w / 2.0;
            let first_spec = specs.len();
            for (s, w) in line {
                specs.push(make_spec(
                    engine,
                    &main_bytes,
                    &s.text,
                    font_size_main,
                    x,
                    baseline,
                )?);
                let begin = s.begin.max(entry.start_time);
                let end = s.end.min(entry.end_or_default()).max(begin);
                syl_meta.push(SylMeta {
                    line: li,
                    x,
                    width: *w,
                    baseline,
                    begin,
                    end,
                });
                x += w;
            }
            line_spec_ranges.push(first_spec..specs.len());
        }
    } else {
        for (li, line) in plain_lines.iter().enumerate() {
            let baseline = origin_y + li as f64 * lh;
            specs.push(make_spec(
                engine,
                &main_bytes,
                line,
                font_size_main,
                center_x - plain_widths[li] / 2.0,
                baseline,
            )?);
        }
    }

    let mut trans_specs = Vec::new();
    let trans_font_data = if has_translation {
        let bytes = fonts
            .get(trans_font)
            .cloned()
            .ok_or_else(|| LyrvidError::render("no font loaded for translation"))?;
        let trans_origin = origin_y + main_count as f64 * lh + m.gap;
        for (li, line) in trans_lines.iter().enumerate() {
            let baseline = trans_origin + li as f64 * m.line_height_trans;
            trans_specs.push(make_spec(
                engine,
                &bytes,
                line,
                font_size_trans,
                center_x - trans_widths[li] / 2.0,
                baseline,
            )?);
        }
        Some(font_data_for(fonts, trans_font, font_cache)?)
    } else {
        None
    };

    // Accumulate passes into the block surface.
    let byte_len = usize::from(ws) * usize::from(hs) * 4;
    let mut block = vec![0u8; byte_len];

    if let Some((radius, color)) = glow {
        let src = rasterize_pass(ws, hs, |ctx| {
            draw_specs(ctx, &main_font, &specs, color, 0.0, 0.0);
        });
        let r = ((radius / 2.0).round() as u32).max(1);
        let sigma = (r as f32 / 2.0).max(0.5);
        let blurred = raster::blur_rgba8_premul(&src, u32::from(ws), u32::from(hs), r, sigma)?;
        raster::over_in_place(&mut block, &blurred, 1.0)?;
    }

    if preset_active && !paint.override_preset && text_cfg.style == TextStylePreset::Bold {
        let stroke = paint.stroke.unwrap_or([0, 0, 0, 255]);
        let src = rasterize_pass(ws, hs, |ctx| {
            for (dx, dy) in [
                (-3.0, 0.0),
                (3.0, 0.0),
                (0.0, -3.0),
                (0.0, 3.0),
                (-2.0, -2.0),
                (2.0, -2.0),
                (-2.0, 2.0),
                (2.0, 2.0),
            ] {
                draw_specs(ctx, &main_font, &specs, stroke, dx, dy);
            }
        });
        raster::over_in_place(&mut block, &src, 1.0)?;
    }

    if karaoke {
        let base = rasterize_pass(ws, hs, |ctx| {
            ctx.push_opacity_layer(0.2);
            draw_specs(ctx, &main_font, &specs, base_color, 0.0, 0.0);
            ctx.pop_layer();
        });
        raster::over_in_place(&mut block, &base, 1.0)?;

        // The reveal rect is taller than the wrapped line pitch, so the
        // accent source holds only the syllable's own sub-line; the rect
        // cannot uncover unsung syllables on an adjacent sub-line.
        let mut accent_lines: Vec<Option<Vec<u8>>> = vec![None; syl_lines.len()];
        for meta in &syl_meta {
            let p = reveal_fraction(time, meta.begin, meta.end);
            if p <= 0.0 {
                continue;
            }
            let accent = accent_lines[meta.line].get_or_insert_with(|| {
                rasterize_pass(ws, hs, |ctx| {
                    draw_specs(
                        ctx,
                        &main_font,
                        &specs[line_spec_ranges[meta.line].clone()],
                        accent_color,
                        0.0,
                        0.0,
                    );
                })
            });
            let rect = PixelRect::from_bounds(
                meta.x,
                meta.baseline - font_size_main,
                meta.x + meta.width * p,
                meta.baseline + font_size_main * 1.5,
                u32::from(ws),
                u32::from(hs),
            );
            raster::over_rect_in_place(&mut block, accent, u32::from(ws), u32::from(hs), rect, 1.0)?;
        }
    } else if !display_text.is_empty() {
        let src = rasterize_pass(ws, hs, |ctx| {
            draw_specs(ctx, &main_font, &specs, fill, 0.0, 0.0);
        });
        raster::over_in_place(&mut block, &src, 1.0)?;
    }

    if let Some(trans_font_data) = &trans_font_data {
        // Soft shadow behind the translation, then the fill.
        let shadow_src = rasterize_pass(ws, hs, |ctx| {
            draw_specs(ctx, trans_font_data, &trans_specs, text_cfg.trans_shadow, 0.0, 0.0);
        });
        let blurred =
            raster::blur_rgba8_premul(&shadow_src, u32::from(ws), u32::from(hs), 8, 4.0)?;
        raster::over_in_place(&mut block, &blurred, 1.0)?;

        let fill_src = rasterize_pass(ws, hs, |ctx| {
            draw_specs(ctx, trans_font_data, &trans_specs, trans_color, 0.0, 0.0);
        });
        raster::over_in_place(&mut block, &fill_src, 1.0)?;
    }

    let transform = Affine::translate((f64::from(frame_w) / 2.0, m.start_y + y_anim))
        * paint.transform
        * Affine::scale(scale)
        * Affine::translate((-center_x, -origin_y));
    let opacity = (alpha * paint.alpha).clamp(0.0, 1.0) as f32;

    let pixmap = pixmap_from_premul_bytes(&block, u32::from(ws), u32::from(hs))?;
    Ok(Some(BlockRender {
        pixmap,
        width: ws,
        height: hs,
        transform,
        opacity,
    }))
}

/// Draw a single centered line of text straight onto a frame context.
/// The metadata footer uses this.
#[allow(clippy::too_many_arguments)]
pub(crate) fn draw_text_line(
    ctx: &mut vello_cpu::RenderContext,
    engine: &mut TextLayoutEngine,
    fonts: &FontSet,
    font_cache: &mut FontDataCache,
    slot: FontSlot,
    text: &str,
    size_px: f64,
    color: Rgba8,
    center_x: f64,
    baseline_y: f64,
    alpha: f32,
) -> LyrvidResult<()> {
    if text.is_empty() {
        return Ok(());
    }
    let bytes = fonts
        .get(slot)
        .cloned()
        .ok_or_else(|| LyrvidError::render("no font loaded for text drawing"))?;
    let font = font_data_for(fonts, slot, font_cache)?;
    let layout =
        engine.layout_plain(text, &bytes, size_px as f32, TextBrushRgba8::default(), None)?;

    let mut width = 0.0f64;
    let mut to_baseline = size_px * 0.8;
    if let Some(line) = layout.lines().next() {
        to_baseline = f64::from(line.metrics().baseline);
    }
    for line in layout.lines() {
        width = width.max(f64::from(line.metrics().advance));
    }

    let spec = RunSpec {
        layout,
        x: center_x - width / 2.0,
        top: baseline_y - to_baseline,
    };
    if alpha < 1.0 {
        ctx.push_opacity_layer(alpha);
    }
    draw_specs(ctx, &font, std::slice::from_ref(&spec), color, 0.0, 0.0);
    if alpha < 1.0 {
        ctx.pop_layer();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;

    fn entry_at(start: f64) -> LyricEntry {
        let mut e = LyricEntry::plain("hello world");
        e.start_time = start;
        e
    }

    #[test]
    fn no_fonts_means_no_block() {
        let mut engine = TextLayoutEngine::new();
        let fonts = FontSet::default();
        let mut measure_cache = HashMap::new();
        let mut font_cache = FontDataCache::new();
        let effects = EffectRegistry::builtin();
        let cfg = RenderConfig::default();
        let mut rng = XorShift64::for_frame(1, 0.0);

        let out = render_lyric_block(
            &mut engine,
            &fonts,
            &mut measure_cache,
            &mut font_cache,
            &effects,
            &entry_at(0.0),
            0.1,
            0,
            &cfg,
            640,
            360,
            &mut rng,
        )
        .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn empty_text_line_draws_nothing() {
        let mut ctx = vello_cpu::RenderContext::new(16, 16);
        let mut engine = TextLayoutEngine::new();
        let fonts = FontSet::default();
        let mut font_cache = FontDataCache::new();
        draw_text_line(
            &mut ctx,
            &mut engine,
            &fonts,
            &mut font_cache,
            FontSlot::Main,
            "",
            20.0,
            [255, 255, 255, 255],
            8.0,
            8.0,
            1.0,
        )
        .unwrap();
    }

    #[test]
    fn missing_font_is_an_error_for_direct_text() {
        let mut ctx = vello_cpu::RenderContext::new(16, 16);
        let mut engine = TextLayoutEngine::new();
        let fonts = FontSet::default();
        let mut font_cache = FontDataCache::new();
        let err = draw_text_line(
            &mut ctx,
            &mut engine,
            &fonts,
            &mut font_cache,
            FontSlot::Main,
            "hi",
            20.0,
            [255, 255, 255, 255],
            8.0,
            8.0,
            1.0,
        );
        assert!(err.is_err());
    }
}
