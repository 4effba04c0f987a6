//! Text measurement and the lyric block's line layout.

use std::collections::HashMap;

use crate::assets::{FontSet, TextBrushRgba8, TextLayoutEngine};
use crate::config::TextConfig;
use crate::error::{LyrvidError, LyrvidResult};
use crate::model::{FontSlot, Syllable};

/// Measures text width in pixels. The renderer uses a Parley-backed
/// implementation; tests use fixed-advance stubs.
pub trait TextMeasure {
    fn measure(&mut self, text: &str, slot: FontSlot, size_px: f32) -> LyrvidResult<f64>;
}

pub type MeasureKey = (FontSlot, u32, String);

/// Parley-backed measurement with a width cache.
///
/// The cache matters: a karaoke line re-measures every syllable every
/// frame.
pub struct ParleyMeasure<'a> {
    engine: &'a mut TextLayoutEngine,
    fonts: &'a FontSet,
    cache: &'a mut HashMap<MeasureKey, f64>,
}

impl<'a> ParleyMeasure<'a> {
    pub fn new(
        engine: &'a mut TextLayoutEngine,
        fonts: &'a FontSet,
        cache: &'a mut HashMap<MeasureKey, f64>,
    ) -> Self {
        Self {
            engine,
            fonts,
            cache,
        }
    }
}

impl TextMeasure for ParleyMeasure<'_> {
    fn measure(&mut self, text: &str, slot: FontSlot, size_px: f32) -> LyrvidResult<f64> {
        let key = (slot, size_px.to_bits(), text.to_string());
        if let Some(&w) = self.cache.get(&key) {
            return Ok(w);
        }

        let bytes = self
            .fonts
            .get(slot)
            .ok_or_else(|| LyrvidError::render("no font loaded for text measurement"))?
            .clone();
        let layout =
            self.engine
                .layout_plain(text, &bytes, size_px, TextBrushRgba8::default(), None)?;

        let mut w = 0.0f64;
        for line in layout.lines() {
            w = w.max(f64::from(line.metrics().advance));
        }
        self.cache.insert(key, w);
        Ok(w)
    }
}

/// Greedy word wrap: words join a line while the joined text still
/// measures under `max_width`.
///
/// Always yields at least one line, even for empty text. Wrapping an
/// already-wrapped line again yields the same lines.
pub fn wrap_words(
    text: &str,
    slot: FontSlot,
    size_px: f32,
    max_width: f64,
    measure: &mut impl TextMeasure,
) -> LyrvidResult<Vec<String>> {
    let mut words = text.split(' ');
    let mut curr = words.next().unwrap_or("").to_string();
    let mut lines = Vec::new();

    for word in words {
        let candidate = format!("{curr} {word}");
        if measure.measure(&candidate, slot, size_px)? < max_width {
            curr = candidate;
        } else {
            lines.push(curr);
            curr = word.to_string();
        }
    }
    lines.push(curr);
    Ok(lines)
}

/// Greedy syllable wrap for karaoke lines; syllables keep their own
/// widths so the accent reveal can track each one.
pub fn wrap_syllables<'s>(
    syllables: &'s [Syllable],
    slot: FontSlot,
    size_px: f32,
    max_width: f64,
    measure: &mut impl TextMeasure,
) -> LyrvidResult<Vec<Vec<(&'s Syllable, f64)>>> {
    let mut lines: Vec<Vec<(&Syllable, f64)>> = vec![Vec::new()];
    let mut running = 0.0f64;

    for s in syllables {
        let w = measure.measure(&s.text, slot, size_px)?;
        if running + w > max_width && running > 0.0 {
            lines.push(Vec::new());
            running = 0.0;
        }
        if let Some(last) = lines.last_mut() {
            last.push((s, w));
        }
        running += w;
    }
    Ok(lines)
}

/// Vertical geometry of the lyric block.
#[derive(Clone, Copy, Debug)]
pub struct BlockMetrics {
    pub font_size_main: f64,
    pub line_height_main: f64,
    pub font_size_trans: f64,
    pub line_height_trans: f64,
    pub gap: f64,
    pub total_h: f64,
    /// First main baseline, relative to the frame top.
    pub start_y: f64,
}

pub fn block_metrics(
    cfg: &TextConfig,
    trans_size_pct: f64,
    frame_h: f64,
    main_lines: usize,
    trans_lines: usize,
) -> BlockMetrics {
    let font_size_main = cfg.size * 2.0;
    let line_height_main = font_size_main * 1.25;
    let font_size_trans = font_size_main * trans_size_pct;
    let line_height_trans = font_size_trans * 1.4;
    let gap = 40.0;

    let trans_h = if trans_lines > 0 {
        gap + trans_lines as f64 * line_height_trans
    } else {
        0.0
    };
    let total_h = main_lines as f64 * line_height_main + trans_h;
    let start_y = frame_h / 2.0 - total_h / 2.0 + line_height_main * 0.7;

    BlockMetrics {
        font_size_main,
        line_height_main,
        font_size_trans,
        line_height_trans,
        gap,
        total_h,
        start_y,
    }
}

/// Fraction of a syllable to highlight at `t`; zero-length spans count as
/// fully sung once reached.
pub fn reveal_fraction(t: f64, begin: f64, end: f64) -> f64 {
    if t < begin {
        return 0.0;
    }
    if end <= begin {
        return 1.0;
    }
    ((t - begin) / (end - begin)).min(1.0)
}
