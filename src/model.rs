//! Lyric data model shared by the parser, store, sync engine and renderer.

/// Sentinel start time for lines that have not been synced yet.
pub const UNSET_TIME: f64 = -1.0;

/// Default visible duration for a line whose end time is unknown.
pub const DEFAULT_LINE_SECS: f64 = 3.0;

/// One karaoke syllable with its own timing span.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Syllable {
    pub text: String,
    pub begin: f64,
    pub end: f64,
}

/// How a line is rendered and highlighted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Plain,
    Karaoke,
    Instrumental,
}

/// Per-line visual effect, applied while the line is active.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    #[default]
    None,
    Pulse,
    Glitch,
    Flash,
    NeonFlicker,
    Rainbow,
    Shake,
    Floating,
}

impl EffectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pulse => "pulse",
            Self::Glitch => "glitch",
            Self::Flash => "flash",
            Self::NeonFlicker => "neon_flicker",
            Self::Rainbow => "rainbow",
            Self::Shake => "shake",
            Self::Floating => "floating",
        }
    }
}

impl std::str::FromStr for EffectKind {
    type Err = crate::LyrvidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "pulse" => Ok(Self::Pulse),
            "glitch" => Ok(Self::Glitch),
            "flash" => Ok(Self::Flash),
            "neon_flicker" => Ok(Self::NeonFlicker),
            "rainbow" => Ok(Self::Rainbow),
            "shake" => Ok(Self::Shake),
            "floating" => Ok(Self::Floating),
            other => Err(crate::LyrvidError::validation(format!(
                "unknown effect '{other}'"
            ))),
        }
    }
}

/// Named font slot resolved against the loaded [`crate::assets::FontSet`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontSlot {
    #[default]
    Main,
    Serif,
    Mono,
    Translation,
}

/// Optional per-line overrides for the translation text.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LineStyle {
    /// Translation size as a fraction of the main font size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trans_size_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trans_font: Option<FontSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trans_color: Option<[u8; 4]>,
}

impl LineStyle {
    pub fn is_empty(&self) -> bool {
        self.trans_size_pct.is_none() && self.trans_font.is_none() && self.trans_color.is_none()
    }
}

/// One lyric line with timing, translation and presentation state.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LyricEntry {
    pub text: String,
    #[serde(default)]
    pub translation: String,
    /// Seconds from song start, or [`UNSET_TIME`] when not synced yet.
    pub start_time: f64,
    /// Explicit end, or `None` meaning `start_time + 3s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub syllables: Vec<Syllable>,
    #[serde(default, skip_serializing_if = "is_default_effect")]
    pub effect: EffectKind,
    #[serde(default, skip_serializing_if = "LineStyle::is_empty")]
    pub style: LineStyle,
}

fn is_default_effect(e: &EffectKind) -> bool {
    *e == EffectKind::None
}

impl LyricEntry {
    /// A plain, unsynced line with no translation.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            translation: String::new(),
            start_time: UNSET_TIME,
            end_time: None,
            kind: EntryKind::Plain,
            syllables: Vec::new(),
            effect: EffectKind::None,
            style: LineStyle::default(),
        }
    }

    pub fn is_synced(&self) -> bool {
        self.start_time != UNSET_TIME
    }

    /// End time, falling back to `start + 3s` when none was recorded.
    pub fn end_or_default(&self) -> f64 {
        self.end_time.unwrap_or(self.start_time + DEFAULT_LINE_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_or_default_falls_back_three_seconds_after_start() {
        let mut e = LyricEntry::plain("hi");
        e.start_time = 10.0;
        assert_eq!(e.end_or_default(), 13.0);
        e.end_time = Some(11.5);
        assert_eq!(e.end_or_default(), 11.5);
    }

    #[test]
    fn unsynced_lines_report_not_synced() {
        let e = LyricEntry::plain("hi");
        assert!(!e.is_synced());
        assert_eq!(e.start_time, UNSET_TIME);
    }

    #[test]
    fn effect_kind_round_trips_through_str() {
        for fx in [
            EffectKind::None,
            EffectKind::Pulse,
            EffectKind::Glitch,
            EffectKind::Flash,
            EffectKind::NeonFlicker,
            EffectKind::Rainbow,
            EffectKind::Shake,
            EffectKind::Floating,
        ] {
            assert_eq!(fx.as_str().parse::<EffectKind>().unwrap(), fx);
        }
        assert!("sparkle".parse::<EffectKind>().is_err());
    }

    #[test]
    fn entry_json_omits_defaults() {
        let e = LyricEntry::plain("hello");
        let json = serde_json::to_string(&e).unwrap();
        assert!(!json.contains("effect"));
        assert!(!json.contains("syllables"));
        assert!(!json.contains("end_time"));
    }
}
