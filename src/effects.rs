//! Per-line visual effects.
//!
//! Effects never draw; they mutate a [`PaintState`] that the text pass
//! interprets. Wall-clock-driven behaviors from live preview (strobe,
//! hue cycling, bobbing) are keyed to frame time so exports repeat
//! exactly.

use std::collections::BTreeMap;

use kurbo::Affine;

use crate::config::Rgba8;
use crate::model::EffectKind;
use crate::rng::XorShift64;

/// Inputs an effect may react to.
pub struct FxContext<'a> {
    pub width: f64,
    pub height: f64,
    /// Frame time in seconds.
    pub time: f64,
    /// Average audio level, 0..=255.
    pub level: u8,
    /// Seconds since the active line started.
    pub line_age: f64,
    /// Per-frame deterministic jitter stream.
    pub rng: &'a mut XorShift64,
}

impl FxContext<'_> {
    fn level_unit(&self) -> f64 {
        f64::from(self.level) / 255.0
    }
}

/// Paint parameters for the lyric block, mutated by the active effect.
#[derive(Clone, Debug)]
pub struct PaintState {
    /// Extra transform applied on top of the block placement.
    pub transform: Affine,
    pub alpha: f64,
    /// Replaces the preset fill when set.
    pub fill: Option<Rgba8>,
    /// Replaces the bold preset's outline color when set.
    pub stroke: Option<Rgba8>,
    /// Replaces the glow color when set.
    pub glow_color: Option<Rgba8>,
    /// Replaces the preset glow radius when set.
    pub glow_radius: Option<f64>,
    /// Suppresses the preset's own fill/glow branch (strobe "off" phase
    /// keeps it, "on" phase repaints everything white).
    pub override_preset: bool,
}

impl Default for PaintState {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            alpha: 1.0,
            fill: None,
            stroke: None,
            glow_color: None,
            glow_radius: None,
            override_preset: false,
        }
    }
}

pub trait LineEffect: Send + Sync {
    fn apply(&self, ctx: &mut FxContext<'_>, paint: &mut PaintState);
}

/// Effect lookup table; `builtin` installs the stock seven.
pub struct EffectRegistry {
    effects: BTreeMap<EffectKind, Box<dyn LineEffect>>,
}

impl EffectRegistry {
    pub fn empty() -> Self {
        Self {
            effects: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        reg.register(EffectKind::Pulse, Box::new(Pulse));
        reg.register(EffectKind::Glitch, Box::new(Glitch));
        reg.register(EffectKind::Flash, Box::new(Flash));
        reg.register(EffectKind::NeonFlicker, Box::new(NeonFlicker));
        reg.register(EffectKind::Rainbow, Box::new(Rainbow));
        reg.register(EffectKind::Shake, Box::new(Shake));
        reg.register(EffectKind::Floating, Box::new(Floating));
        reg
    }

    pub fn register(&mut self, kind: EffectKind, effect: Box<dyn LineEffect>) {
        self.effects.insert(kind, effect);
    }

    /// Apply the effect registered for `kind`, if any.
    pub fn apply(&self, kind: EffectKind, ctx: &mut FxContext<'_>, paint: &mut PaintState) {
        if let Some(fx) = self.effects.get(&kind) {
            fx.apply(ctx, paint);
        }
    }
}

struct Pulse;

impl LineEffect for Pulse {
    fn apply(&self, ctx: &mut FxContext<'_>, paint: &mut PaintState) {
        let s = 1.0 + ctx.level_unit() * 0.3;
        paint.transform *= Affine::scale(s);
    }
}

struct Glitch;

impl LineEffect for Glitch {
    fn apply(&self, ctx: &mut FxContext<'_>, paint: &mut PaintState) {
        let dx = (ctx.rng.next_f64() - 0.5) * 20.0;
        let dy = (ctx.rng.next_f64() - 0.5) * 5.0;
        paint.transform *= Affine::translate((dx, dy));
        if ctx.rng.next_f64() > 0.9 {
            paint.fill = Some(if ctx.rng.next_f64() > 0.5 {
                [255, 0, 255, 255]
            } else {
                [0, 255, 255, 255]
            });
        }
    }
}

struct Flash;

impl LineEffect for Flash {
    fn apply(&self, ctx: &mut FxContext<'_>, paint: &mut PaintState) {
        // 40ms strobe phase, as in the live preview.
        let phase = (ctx.time * 1000.0 / 40.0).floor() as i64;
        if phase % 2 == 0 {
            paint.fill = Some([255, 255, 255, 255]);
            paint.stroke = Some([255, 255, 255, 255]);
            paint.glow_color = Some([255, 255, 255, 255]);
            paint.glow_radius = Some(50.0);
            paint.override_preset = true;
        }
    }
}

struct NeonFlicker;

impl LineEffect for NeonFlicker {
    fn apply(&self, ctx: &mut FxContext<'_>, paint: &mut PaintState) {
        let flicker = if ctx.rng.next_f64() > 0.92 { 0.2 } else { 1.0 };
        paint.alpha *= flicker;
        paint.glow_radius = Some((20.0 + ctx.rng.next_f64() * 20.0) * flicker);
    }
}

struct Rainbow;

impl LineEffect for Rainbow {
    fn apply(&self, ctx: &mut FxContext<'_>, paint: &mut PaintState) {
        let hue = (ctx.time * 1000.0 / 15.0) % 360.0;
        paint.fill = Some(hsl_to_rgba8(hue, 1.0, 0.75));
        paint.glow_color = Some(hsl_to_rgba8(hue, 1.0, 0.5));
        paint.glow_radius = Some(25.0);
        paint.stroke = Some(hsl_to_rgba8((hue + 180.0) % 360.0, 1.0, 0.5));
    }
}

struct Shake;

impl LineEffect for Shake {
    fn apply(&self, ctx: &mut FxContext<'_>, paint: &mut PaintState) {
        let level = ctx.level_unit();
        let intensity = 5.0 + level * 25.0;
        let rot = (ctx.rng.next_f64() - 0.5) * 0.1 * level;
        let dx = (ctx.rng.next_f64() - 0.5) * intensity;
        let dy = (ctx.rng.next_f64() - 0.5) * intensity;
        paint.transform *= Affine::translate((dx, dy)) * Affine::rotate(rot);
    }
}

struct Floating;

impl LineEffect for Floating {
    fn apply(&self, ctx: &mut FxContext<'_>, paint: &mut PaintState) {
        let t = ctx.time * 1000.0 / 800.0;
        let y = t.sin() * 15.0;
        let rot = t.cos() * 0.05;
        paint.transform *= Affine::translate((0.0, y)) * Affine::rotate(rot);
    }
}

/// HSL to RGBA8; `h` in degrees, `s`/`l` in `[0, 1]`, alpha opaque.
pub fn hsl_to_rgba8(h: f64, s: f64, l: f64) -> Rgba8 {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = (h.rem_euclid(360.0)) / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to8 = |v: f64| ((v + m).clamp(0.0, 1.0) * 255.0).round() as u8;
    [to8(r1), to8(g1), to8(b1), 255]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with<'a>(rng: &'a mut XorShift64, time: f64, level: u8) -> FxContext<'a> {
        FxContext {
            width: 1920.0,
            height: 1080.0,
            time,
            level,
            line_age: 0.5,
            rng,
        }
    }

    #[test]
    fn pulse_scales_with_level() {
        let reg = EffectRegistry::builtin();
        let mut rng = XorShift64::new(1);

        let mut quiet = PaintState::default();
        reg.apply(EffectKind::Pulse, &mut ctx_with(&mut rng, 0.0, 0), &mut quiet);
        assert_eq!(quiet.transform, Affine::IDENTITY);

        let mut loud = PaintState::default();
        reg.apply(
            EffectKind::Pulse,
            &mut ctx_with(&mut rng, 0.0, 255),
            &mut loud,
        );
        let coeffs = loud.transform.as_coeffs();
        assert!((coeffs[0] - 1.3).abs() < 1e-9);
    }

    #[test]
    fn flash_strobes_on_frame_time() {
        let reg = EffectRegistry::builtin();
        let mut rng = XorShift64::new(1);

        // Phase 0 of the 40ms strobe: painted white.
        let mut on = PaintState::default();
        reg.apply(EffectKind::Flash, &mut ctx_with(&mut rng, 0.0, 0), &mut on);
        assert!(on.override_preset);
        assert_eq!(on.fill, Some([255, 255, 255, 255]));

        // Phase 1: untouched.
        let mut off = PaintState::default();
        reg.apply(
            EffectKind::Flash,
            &mut ctx_with(&mut rng, 0.040, 0),
            &mut off,
        );
        assert!(!off.override_preset);
        assert_eq!(off.fill, None);
    }

    #[test]
    fn jitter_effects_are_frame_deterministic() {
        let reg = EffectRegistry::builtin();
        for kind in [EffectKind::Glitch, EffectKind::Shake, EffectKind::NeonFlicker] {
            let mut rng_a = XorShift64::for_frame(9, 1.25);
            let mut rng_b = XorShift64::for_frame(9, 1.25);
            let mut a = PaintState::default();
            let mut b = PaintState::default();
            reg.apply(kind, &mut ctx_with(&mut rng_a, 1.25, 100), &mut a);
            reg.apply(kind, &mut ctx_with(&mut rng_b, 1.25, 100), &mut b);
            assert_eq!(a.transform, b.transform);
            assert_eq!(a.alpha, b.alpha);
            assert_eq!(a.fill, b.fill);
        }
    }

    #[test]
    fn rainbow_cycles_hue_over_time() {
        let reg = EffectRegistry::builtin();
        let mut rng = XorShift64::new(1);
        let mut a = PaintState::default();
        let mut b = PaintState::default();
        reg.apply(EffectKind::Rainbow, &mut ctx_with(&mut rng, 0.0, 0), &mut a);
        reg.apply(EffectKind::Rainbow, &mut ctx_with(&mut rng, 1.0, 0), &mut b);
        assert_ne!(a.fill, b.fill);
        assert!(a.stroke.is_some());
    }

    #[test]
    fn unregistered_kind_is_a_noop() {
        let reg = EffectRegistry::empty();
        let mut rng = XorShift64::new(1);
        let mut p = PaintState::default();
        reg.apply(EffectKind::Glitch, &mut ctx_with(&mut rng, 0.0, 128), &mut p);
        assert_eq!(p.transform, Affine::IDENTITY);
        assert_eq!(p.alpha, 1.0);
    }

    #[test]
    fn hsl_primary_corners() {
        assert_eq!(hsl_to_rgba8(0.0, 1.0, 0.5), [255, 0, 0, 255]);
        assert_eq!(hsl_to_rgba8(120.0, 1.0, 0.5), [0, 255, 0, 255]);
        assert_eq!(hsl_to_rgba8(240.0, 1.0, 0.5), [0, 0, 255, 255]);
        assert_eq!(hsl_to_rgba8(0.0, 0.0, 1.0), [255, 255, 255, 255]);
    }
}
