//! Render configuration tree, serialized with the project and in session
//! snapshots.

use crate::error::{LyrvidError, LyrvidResult};
use crate::model::FontSlot;

pub type Rgba8 = [u8; 4];

pub const WHITE: Rgba8 = [255, 255, 255, 255];
pub const BLACK: Rgba8 = [0, 0, 0, 255];

/// Text style preset. Also selects the font slot: `Serif` draws with the
/// serif slot, `Arcade` with mono, everything else with main.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextStylePreset {
    #[default]
    Neon,
    Bold,
    Flat,
    Serif,
    Arcade,
}

impl TextStylePreset {
    pub fn font_slot(self) -> FontSlot {
        match self {
            Self::Serif => FontSlot::Serif,
            Self::Arcade => FontSlot::Mono,
            _ => FontSlot::Main,
        }
    }
}

/// Animation applied while a line enters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryAnimation {
    None,
    Fade,
    #[default]
    SlideUp,
    ZoomIn,
    Typewriter,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VizStyle {
    #[default]
    None,
    Bars,
    Wave,
    Circle,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleTheme {
    None,
    #[default]
    Standard,
    Fire,
    Snow,
    Stars,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BgConfig {
    /// Gaussian blur radius in pixels.
    pub blur: u32,
    /// Darkening overlay strength, percent.
    pub darken: f64,
    /// Base scale factor for the cover-fitted background.
    pub scale: f64,
    /// Offset in seconds applied to a background video's clock.
    pub delay: f64,
    /// Scale the background with the audio level.
    pub reactive: bool,
    /// Reactive scale strength, percent.
    pub intensity: f64,
}

impl Default for BgConfig {
    fn default() -> Self {
        Self {
            blur: 0,
            darken: 50.0,
            scale: 1.0,
            delay: 0.0,
            reactive: false,
            intensity: 50.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub style: TextStylePreset,
    pub animation: EntryAnimation,
    pub color: Rgba8,
    /// Karaoke highlight color.
    pub accent: Rgba8,
    /// Glow color for the neon preset.
    pub shadow: Rgba8,
    /// Base size; the main font renders at twice this.
    pub size: f64,
    pub trans_color: Rgba8,
    pub trans_shadow: Rgba8,
    pub trans_font: FontSlot,
    /// Translation size as a fraction of the main font size.
    pub trans_size_pct: f64,
    pub particle_theme: ParticleTheme,
    pub particle_color: Rgba8,
    pub particle_size: f64,
    pub particle_speed: f64,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            style: TextStylePreset::Neon,
            animation: EntryAnimation::SlideUp,
            color: WHITE,
            accent: [0, 243, 255, 255],
            shadow: [188, 19, 254, 255],
            size: 50.0,
            trans_color: [244, 114, 182, 255],
            trans_shadow: BLACK,
            trans_font: FontSlot::Translation,
            trans_size_pct: 0.6,
            particle_theme: ParticleTheme::Standard,
            particle_color: [255, 228, 0, 255],
            particle_size: 1.0,
            particle_speed: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VizConfig {
    pub style: VizStyle,
    pub color: Rgba8,
}

impl Default for VizConfig {
    fn default() -> Self {
        Self {
            style: VizStyle::None,
            color: WHITE,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MetaConfig {
    pub artist: String,
    pub song: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    pub opacity: f64,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self { opacity: 0.8 }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LogoConfig {
    /// Center position as percent of frame width/height.
    pub x: f64,
    pub y: f64,
    /// Fraction of frame width.
    pub scale: f64,
    pub opacity: f64,
}

impl Default for LogoConfig {
    fn default() -> Self {
        Self {
            x: 50.0,
            y: 75.0,
            scale: 0.5,
            opacity: 1.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FxConfig {
    pub particles: bool,
    pub vignette: bool,
    pub grain: bool,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub fps: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { fps: 30 }
    }
}

/// Everything the renderer needs besides the lyric store and scene assets.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub bg: BgConfig,
    pub text: TextConfig,
    pub viz: VizConfig,
    pub meta: MetaConfig,
    pub watermark: WatermarkConfig,
    pub logo: LogoConfig,
    pub fx: FxConfig,
    pub export: ExportConfig,
    /// Determinism seed for particles and jitter effects.
    pub seed: u64,
}

impl RenderConfig {
    pub fn validate(&self) -> LyrvidResult<()> {
        fn pct(name: &str, v: f64) -> LyrvidResult<()> {
            if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                return Err(LyrvidError::validation(format!(
                    "{name} must be within 0..=100"
                )));
            }
            Ok(())
        }
        fn unit(name: &str, v: f64) -> LyrvidResult<()> {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(LyrvidError::validation(format!(
                    "{name} must be within 0..=1"
                )));
            }
            Ok(())
        }

        pct("bg.darken", self.bg.darken)?;
        pct("bg.intensity", self.bg.intensity)?;
        if !self.bg.scale.is_finite() || self.bg.scale <= 0.0 {
            return Err(LyrvidError::validation("bg.scale must be > 0"));
        }
        if !self.bg.delay.is_finite() || self.bg.delay < 0.0 {
            return Err(LyrvidError::validation("bg.delay must be >= 0"));
        }
        if !self.text.size.is_finite() || self.text.size <= 0.0 {
            return Err(LyrvidError::validation("text.size must be > 0"));
        }
        if !self.text.trans_size_pct.is_finite() || self.text.trans_size_pct <= 0.0 {
            return Err(LyrvidError::validation("text.trans_size_pct must be > 0"));
        }
        if !self.text.particle_size.is_finite() || self.text.particle_size <= 0.0 {
            return Err(LyrvidError::validation("text.particle_size must be > 0"));
        }
        if !self.text.particle_speed.is_finite() || self.text.particle_speed <= 0.0 {
            return Err(LyrvidError::validation("text.particle_speed must be > 0"));
        }
        unit("watermark.opacity", self.watermark.opacity)?;
        unit("logo.opacity", self.logo.opacity)?;
        pct("logo.x", self.logo.x)?;
        pct("logo.y", self.logo.y)?;
        if !self.logo.scale.is_finite() || self.logo.scale <= 0.0 {
            return Err(LyrvidError::validation("logo.scale must be > 0"));
        }
        if self.export.fps == 0 {
            return Err(LyrvidError::validation("export.fps must be non-zero"));
        }
        Ok(())
    }
}
