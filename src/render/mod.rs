//! Deterministic CPU frame renderer.
//!
//! A frame is built in passes over one persistent pixmap: background,
//! darken, grain, vignette, visualizer, particles, the lyric block,
//! then the metadata, logo and watermark overlays. Vector passes go
//! through `vello_cpu`; the blur, darken, vignette and karaoke-reveal
//! passes work on the raw premultiplied bytes.

pub mod background;
pub mod layout;
pub mod particles;
pub mod text;
pub mod visualizer;

use std::collections::HashMap;
use std::sync::Arc;

use kurbo::Affine;

use crate::assets::{FontSet, PreparedImage, TextLayoutEngine};
use crate::config::{RenderConfig, VizStyle};
use crate::effects::EffectRegistry;
use crate::error::{LyrvidError, LyrvidResult};
use crate::model::FontSlot;
use crate::raster;
use crate::rng::XorShift64;
use crate::store::LyricStore;

use self::layout::MeasureKey;
use self::particles::ParticleSystem;
use self::text::FontDataCache;

/// How many low spectrum bins feed the average level.
const LEVEL_BINS: usize = 20;

pub(crate) fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

pub(crate) fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::LineTo(p) => out.line_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::QuadTo(p1, p2) => out.quad_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
            ),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
                vello_cpu::kurbo::Point::new(p3.x, p3.y),
            ),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

pub(crate) fn color_from_rgba8(c: [u8; 4]) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(c[0], c[1], c[2], c[3])
}

pub(crate) fn pixmap_from_premul_bytes(
    bytes: &[u8],
    width: u32,
    height: u32,
) -> LyrvidResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| LyrvidError::render("pixmap width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| LyrvidError::render("pixmap height exceeds u16"))?;
    if bytes.len()
        != (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4)
    {
        return Err(LyrvidError::render("pixmap byte len mismatch"));
    }
    // Pixmap stores PremulRgba8; our bytes are already premultiplied.
    let mut pixels = Vec::<vello_cpu::peniko::color::PremulRgba8>::with_capacity(
        (width as usize) * (height as usize),
    );
    for px in bytes.chunks_exact(4) {
        pixels.push(vello_cpu::peniko::color::PremulRgba8::from_u8_array([
            px[0], px[1], px[2], px[3],
        ]));
    }
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels, w, h, true,
    ))
}

fn image_paint(img: &PreparedImage) -> LyrvidResult<vello_cpu::Image> {
    let pixmap = pixmap_from_premul_bytes(&img.rgba8_premul, img.width, img.height)?;
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

/// One rendered frame, premultiplied RGBA8.
#[derive(Clone, Debug)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

/// Per-frame inputs: the clock plus the audio spectrum snapshot.
#[derive(Clone, Copy, Debug)]
pub struct FrameInput<'a> {
    pub time: f64,
    /// Frequency bins, 0..=255 each. Empty means silence.
    pub spectrum: &'a [u8],
    /// Average of the first [`LEVEL_BINS`] bins.
    pub level: u8,
}

impl<'a> FrameInput<'a> {
    pub fn new(time: f64, spectrum: &'a [u8]) -> Self {
        let n = spectrum.len().min(LEVEL_BINS);
        let level = if n == 0 {
            0
        } else {
            (spectrum[..n].iter().map(|&v| u32::from(v)).sum::<u32>() / n as u32) as u8
        };
        Self {
            time,
            spectrum,
            level,
        }
    }
}

/// Decoded images the scene composites, all optional.
#[derive(Clone, Copy, Debug, Default)]
pub struct SceneAssets<'a> {
    pub background: Option<&'a PreparedImage>,
    pub watermark: Option<&'a PreparedImage>,
    pub logo: Option<&'a PreparedImage>,
}

/// Stateful frame renderer. Particle simulation and caches persist
/// across frames; everything else is recomputed per frame from the
/// store, config and inputs.
pub struct FrameRenderer {
    width: u32,
    height: u32,
    w16: u16,
    h16: u16,
    fonts: FontSet,
    engine: TextLayoutEngine,
    effects: EffectRegistry,
    particles: ParticleSystem,
    measure_cache: HashMap<MeasureKey, f64>,
    font_cache: FontDataCache,
}

impl FrameRenderer {
    pub fn new(width: u32, height: u32, seed: u64) -> LyrvidResult<Self> {
        if width == 0 || height == 0 {
            return Err(LyrvidError::validation("frame size must be non-zero"));
        }
        let w16: u16 = width
            .try_into()
            .map_err(|_| LyrvidError::validation("frame width exceeds u16"))?;
        let h16: u16 = height
            .try_into()
            .map_err(|_| LyrvidError::validation("frame height exceeds u16"))?;
        Ok(Self {
            width,
            height,
            w16,
            h16,
            fonts: FontSet::default(),
            engine: TextLayoutEngine::new(),
            effects: EffectRegistry::builtin(),
            particles: ParticleSystem::new(seed),
            measure_cache: HashMap::new(),
            font_cache: FontDataCache::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Load a font into a slot; shaping and width caches reset.
    pub fn set_font(&mut self, slot: FontSlot, bytes: Vec<u8>) {
        self.fonts.set(slot, bytes);
        self.measure_cache.clear();
        self.font_cache.clear();
    }

    pub fn effects_mut(&mut self) -> &mut EffectRegistry {
        &mut self.effects
    }

    fn pass(
        &self,
        pixmap: &mut vello_cpu::Pixmap,
        f: impl FnOnce(&mut vello_cpu::RenderContext) -> LyrvidResult<()>,
    ) -> LyrvidResult<()> {
        let mut ctx = vello_cpu::RenderContext::new(self.w16, self.h16);
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        f(&mut ctx)?;
        ctx.flush();
        ctx.render_to_pixmap(pixmap);
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(time = input.time))]
    pub fn render_frame(
        &mut self,
        store: &LyricStore,
        cfg: &RenderConfig,
        assets: &SceneAssets<'_>,
        input: &FrameInput<'_>,
    ) -> LyrvidResult<FrameRGBA> {
        let wf = f64::from(self.width);
        let hf = f64::from(self.height);
        let mut rng = XorShift64::for_frame(cfg.seed, input.time);
        let mut pixmap = vello_cpu::Pixmap::new(self.w16, self.h16);

        // Background over black.
        self.pass(&mut pixmap, |ctx| {
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(0, 0, 0, 255));
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, wf, hf));
            if let Some(bg) = assets.background {
                let t = background::background_transform(
                    &cfg.bg,
                    input.level,
                    f64::from(bg.width),
                    f64::from(bg.height),
                    wf,
                    hf,
                );
                ctx.set_transform(affine_to_cpu(t));
                ctx.set_paint(image_paint(bg)?);
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                    0.0,
                    0.0,
                    f64::from(bg.width),
                    f64::from(bg.height),
                ));
            }
            Ok(())
        })?;

        if cfg.bg.blur > 0 && assets.background.is_some() {
            let sigma = (cfg.bg.blur as f32 / 2.0).max(0.5);
            let blurred = raster::blur_rgba8_premul(
                pixmap.data_as_u8_slice(),
                self.width,
                self.height,
                cfg.bg.blur,
                sigma,
            )?;
            pixmap.data_as_u8_slice_mut().copy_from_slice(&blurred);
        }

        raster::darken_in_place(pixmap.data_as_u8_slice_mut(), cfg.bg.darken / 100.0);

        if cfg.fx.grain {
            self.pass(&mut pixmap, |ctx| {
                background::draw_grain(ctx, wf, hf, &mut rng);
                Ok(())
            })?;
        }

        if cfg.fx.vignette {
            raster::vignette_in_place(pixmap.data_as_u8_slice_mut(), self.width, self.height, 0.8);
        }

        if cfg.viz.style != VizStyle::None {
            self.pass(&mut pixmap, |ctx| {
                visualizer::draw_visualizer(ctx, &cfg.viz, input.spectrum, input.level, wf, hf);
                Ok(())
            })?;
        }

        if cfg.fx.particles {
            let mut ctx = vello_cpu::RenderContext::new(self.w16, self.h16);
            ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
            self.particles
                .update_and_draw(&mut ctx, wf, hf, input.time, &cfg.text);
            ctx.flush();
            ctx.render_to_pixmap(&mut pixmap);
        }

        // Active lyric line.
        if let Some(idx) = store.active_index(input.time) {
            if let Some(entry) = store.entries().get(idx).cloned() {
                let block = text::render_lyric_block(
                    &mut self.engine,
                    &self.fonts,
                    &mut self.measure_cache,
                    &mut self.font_cache,
                    &self.effects,
                    &entry,
                    input.time,
                    input.level,
                    cfg,
                    self.width,
                    self.height,
                    &mut rng,
                )?;
                if let Some(block) = block {
                    self.pass(&mut pixmap, |ctx| {
                        let paint = vello_cpu::Image {
                            image: vello_cpu::ImageSource::Pixmap(Arc::new(block.pixmap)),
                            sampler: vello_cpu::peniko::ImageSampler::default(),
                        };
                        ctx.set_transform(affine_to_cpu(block.transform));
                        ctx.set_paint(paint);
                        if block.opacity < 1.0 {
                            ctx.push_opacity_layer(block.opacity);
                        }
                        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                            0.0,
                            0.0,
                            f64::from(block.width),
                            f64::from(block.height),
                        ));
                        if block.opacity < 1.0 {
                            ctx.pop_layer();
                        }
                        Ok(())
                    })?;
                }
            }
        }

        // Overlays: metadata footer, band logo, watermark.
        let meta = cfg.meta.clone();
        let draw_meta = (!meta.song.is_empty() || !meta.artist.is_empty()) && self.fonts.has_any();
        if draw_meta || assets.logo.is_some() || assets.watermark.is_some() {
            let mut ctx = vello_cpu::RenderContext::new(self.w16, self.h16);
            ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

            if draw_meta {
                if !meta.song.is_empty() {
                    text::draw_text_line(
                        &mut ctx,
                        &mut self.engine,
                        &self.fonts,
                        &mut self.font_cache,
                        FontSlot::Main,
                        &meta.song,
                        40.0,
                        [255, 255, 255, 204],
                        wf / 2.0,
                        hf - 150.0,
                        1.0,
                    )?;
                }
                if !meta.artist.is_empty() {
                    text::draw_text_line(
                        &mut ctx,
                        &mut self.engine,
                        &self.fonts,
                        &mut self.font_cache,
                        FontSlot::Main,
                        &meta.artist,
                        30.0,
                        [255, 255, 255, 153],
                        wf / 2.0,
                        hf - 105.0,
                        1.0,
                    )?;
                }
            }

            if let Some(logo) = assets.logo {
                let tw = wf * cfg.logo.scale;
                let th = tw / (f64::from(logo.width) / f64::from(logo.height));
                let x = wf * cfg.logo.x / 100.0 - tw / 2.0;
                let y = hf * cfg.logo.y / 100.0 - th / 2.0;
                draw_image(&mut ctx, logo, x, y, tw, th, cfg.logo.opacity as f32)?;
            }

            if let Some(wm) = assets.watermark {
                let tw = wf * 0.25;
                let th = tw / (f64::from(wm.width) / f64::from(wm.height));
                draw_image(
                    &mut ctx,
                    wm,
                    (wf - tw) / 2.0,
                    hf * 0.75,
                    tw,
                    th,
                    cfg.watermark.opacity as f32,
                )?;
            }

            ctx.flush();
            ctx.render_to_pixmap(&mut pixmap);
        }

        Ok(FrameRGBA {
            width: self.width,
            height: self.height,
            data: pixmap.data_as_u8_slice().to_vec(),
            premultiplied: true,
        })
    }
}

fn draw_image(
    ctx: &mut vello_cpu::RenderContext,
    img: &PreparedImage,
    x: f64,
    y: f64,
    target_w: f64,
    target_h: f64,
    opacity: f32,
) -> LyrvidResult<()> {
    let paint = image_paint(img)?;
    let t = Affine::translate((x, y))
        * Affine::scale_non_uniform(
            target_w / f64::from(img.width),
            target_h / f64::from(img.height),
        );
    ctx.set_transform(affine_to_cpu(t));
    ctx.set_paint(paint);
    if opacity < 1.0 {
        ctx.push_opacity_layer(opacity);
    }
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        0.0,
        0.0,
        f64::from(img.width),
        f64::from(img.height),
    ));
    if opacity < 1.0 {
        ctx.pop_layer();
    }
    Ok(())
}
