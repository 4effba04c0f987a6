//! Project file: one JSON document naming the lyric source, media
//! assets, fonts and render configuration for a headless run.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::assets::{PreparedImage, decode_image};
use crate::config::RenderConfig;
use crate::error::{LyrvidError, LyrvidResult};
use crate::export::SpectrumFrames;
use crate::model::FontSlot;
use crate::parse::{ParseOutcome, parse_plain};
use crate::store::LyricStore;
use crate::ttml::parse_apple_json;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LyricFormat {
    /// Plain text or LRC-style `[mm:ss.xx]` lines.
    #[default]
    Plain,
    /// Apple Music API JSON carrying TTML.
    AppleJson,
}

/// Font file per slot; missing slots fall back to main at render time.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FontPaths {
    pub main: Option<PathBuf>,
    pub serif: Option<PathBuf>,
    pub mono: Option<PathBuf>,
    pub translation: Option<PathBuf>,
}

impl FontPaths {
    fn slots(&self) -> [(FontSlot, Option<&PathBuf>); 4] {
        [
            (FontSlot::Main, self.main.as_ref()),
            (FontSlot::Serif, self.serif.as_ref()),
            (FontSlot::Mono, self.mono.as_ref()),
            (FontSlot::Translation, self.translation.as_ref()),
        ]
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Project {
    pub width: u32,
    pub height: u32,
    /// Lyric source file, relative to the project file.
    pub lyrics: PathBuf,
    pub format: LyricFormat,
    /// Optional translation file, one line per lyric line.
    pub translations: Option<PathBuf>,
    /// Song audio muxed into exports.
    pub audio: Option<PathBuf>,
    /// Export length in seconds; defaults to the last lyric line's end.
    pub duration: Option<f64>,
    pub background: Option<PathBuf>,
    pub watermark: Option<PathBuf>,
    pub logo: Option<PathBuf>,
    pub fonts: FontPaths,
    /// Pre-captured spectrum sidecar (JSON [`SpectrumFrames`]).
    pub spectrum: Option<PathBuf>,
    pub config: RenderConfig,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            lyrics: PathBuf::new(),
            format: LyricFormat::Plain,
            translations: None,
            audio: None,
            duration: None,
            background: None,
            watermark: None,
            logo: None,
            fonts: FontPaths::default(),
            spectrum: None,
            config: RenderConfig::default(),
        }
    }
}

impl Project {
    pub fn load(path: &Path) -> LyrvidResult<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("open project '{}'", path.display()))?;
        let project: Project = serde_json::from_str(&raw)
            .with_context(|| format!("parse project JSON '{}'", path.display()))?;
        project.validate()?;
        Ok(project)
    }

    pub fn validate(&self) -> LyrvidResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(LyrvidError::validation("project width/height must be non-zero"));
        }
        if self.lyrics.as_os_str().is_empty() {
            return Err(LyrvidError::validation("project must name a lyrics file"));
        }
        if let Some(d) = self.duration {
            if !d.is_finite() || d <= 0.0 {
                return Err(LyrvidError::validation("project duration must be > 0"));
            }
        }
        self.config.validate()
    }

    /// Export end time: the explicit duration, or where the last synced
    /// line ends.
    pub fn export_end(&self, store: &LyricStore) -> LyrvidResult<f64> {
        if let Some(d) = self.duration {
            return Ok(d);
        }
        let end = store
            .entries()
            .iter()
            .filter(|e| e.is_synced())
            .map(|e| e.end_or_default())
            .fold(0.0f64, f64::max);
        if end <= 0.0 {
            return Err(LyrvidError::validation(
                "project has no duration and no synced lyrics to infer one from",
            ));
        }
        Ok(end)
    }
}

fn resolve(root: &Path, rel: &Path) -> PathBuf {
    if rel.is_absolute() {
        rel.to_path_buf()
    } else {
        root.join(rel)
    }
}

fn read_lines(path: &Path) -> LyrvidResult<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read '{}'", path.display()))?;
    Ok(raw.lines().map(|l| l.to_string()).collect())
}

/// Parse the project's lyric source, translations applied.
pub fn load_lyrics(project: &Project, root: &Path) -> LyrvidResult<ParseOutcome> {
    let lyrics_path = resolve(root, &project.lyrics);
    let raw = std::fs::read_to_string(&lyrics_path)
        .with_context(|| format!("read lyrics '{}'", lyrics_path.display()))?;

    let translations = match &project.translations {
        Some(p) => read_lines(&resolve(root, p))?,
        None => Vec::new(),
    };

    match project.format {
        LyricFormat::Plain => Ok(parse_plain(&raw, &translations)),
        LyricFormat::AppleJson => parse_apple_json(&raw, &translations),
    }
}

/// Decoded media assets and font bytes named by a project.
#[derive(Default)]
pub struct ProjectAssets {
    pub background: Option<PreparedImage>,
    pub watermark: Option<PreparedImage>,
    pub logo: Option<PreparedImage>,
    pub fonts: Vec<(FontSlot, Vec<u8>)>,
    pub spectrum: Option<SpectrumFrames>,
}

pub fn load_assets(project: &Project, root: &Path) -> LyrvidResult<ProjectAssets> {
    let mut out = ProjectAssets::default();

    let mut image = |rel: &Option<PathBuf>| -> LyrvidResult<Option<PreparedImage>> {
        let Some(rel) = rel else {
            return Ok(None);
        };
        let path = resolve(root, rel);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("read image '{}'", path.display()))?;
        Ok(Some(decode_image(&bytes)?))
    };
    out.background = image(&project.background)?;
    out.watermark = image(&project.watermark)?;
    out.logo = image(&project.logo)?;

    for (slot, rel) in project.fonts.slots() {
        let Some(rel) = rel else { continue };
        let path = resolve(root, rel);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("read font '{}'", path.display()))?;
        out.fonts.push((slot, bytes));
    }

    if let Some(rel) = &project.spectrum {
        let path = resolve(root, rel);
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read spectrum sidecar '{}'", path.display()))?;
        let frames: SpectrumFrames = serde_json::from_str(&raw)
            .with_context(|| format!("parse spectrum sidecar '{}'", path.display()))?;
        out.spectrum = Some(frames);
    }

    Ok(out)
}
