//! Plain-text and LRC lyric parsing.
//!
//! Input is one lyric line per text line. A leading `[MM:SS.ss]` tag syncs
//! the line; without one the line starts unsynced. Symmetric marker pairs
//! (`***text***` and friends) select a per-line effect and are stripped
//! from the display text.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::{EffectKind, EntryKind, LyricEntry, UNSET_TIME};

/// Recoverable parser complaint tied to a single token.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParseWarning {
    pub token: String,
    pub message: String,
    /// 1-based source line, when known.
    pub line: Option<usize>,
}

impl ParseWarning {
    pub fn new(token: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            message: message.into(),
            line: None,
        }
    }

    fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(n) => write!(f, "line {n}: {} in '{}'", self.message, self.token),
            None => write!(f, "{} in '{}'", self.message, self.token),
        }
    }
}

/// Parsed entries plus any recoverable complaints.
#[derive(Clone, Debug, Default)]
pub struct ParseOutcome {
    pub entries: Vec<LyricEntry>,
    pub warnings: Vec<ParseWarning>,
}

const EFFECT_MARKERS: &[(&str, EffectKind)] = &[
    ("***", EffectKind::Pulse),
    ("%%%", EffectKind::Glitch),
    ("###", EffectKind::Flash),
];

fn timestamp_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Only digit/colon/dot tags are timestamps; `[verse]` stays lyric text.
    RE.get_or_init(|| Regex::new(r"^\[([0-9:.]+)\](.*)$").unwrap_or_else(|_| unreachable!()))
}

/// Parse a clock token: `SS.ss`, `MM:SS.ss` or `HH:MM:SS`.
///
/// An empty token reads as zero. Malformed tokens are reported instead of
/// silently degrading; callers decide what value stands in.
pub fn parse_clock(token: &str) -> Result<f64, ParseWarning> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(0.0);
    }

    let bad = |msg: &str| ParseWarning::new(token, msg);

    if token.contains(':') {
        let parts: Vec<&str> = token.split(':').collect();
        let nums: Result<Vec<f64>, ParseWarning> = parts
            .iter()
            .map(|p| {
                p.parse::<f64>()
                    .map_err(|_| bad("malformed clock component"))
            })
            .collect();
        let nums = nums?;
        return match nums.as_slice() {
            [m, s] => Ok(m * 60.0 + s),
            [h, m, s] => Ok(h * 3600.0 + m * 60.0 + s),
            _ => Err(bad("clock must have 2 or 3 components")),
        };
    }

    token
        .parse::<f64>()
        .map_err(|_| bad("malformed seconds value"))
}

/// Parse plain or LRC lyrics, zipping translations by position.
///
/// Blank lines are skipped. Translation lines past the end of `translations`
/// leave the entry's translation empty.
pub fn parse_plain(raw: &str, translations: &[String]) -> ParseOutcome {
    let mut out = ParseOutcome::default();

    for (lineno, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (start_time, mut text) = match timestamp_tag_re().captures(line) {
            Some(caps) => {
                let token = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                match parse_clock(token) {
                    Ok(t) => (t, rest.trim().to_string()),
                    Err(w) => {
                        out.warnings.push(w.at_line(lineno + 1));
                        (UNSET_TIME, rest.trim().to_string())
                    }
                }
            }
            None => (UNSET_TIME, line.to_string()),
        };

        let mut effect = EffectKind::None;
        for &(marker, fx) in EFFECT_MARKERS {
            if text.len() >= marker.len() * 2 && text.starts_with(marker) && text.ends_with(marker)
            {
                effect = fx;
                text = text[marker.len()..text.len() - marker.len()]
                    .trim()
                    .to_string();
                break;
            }
        }

        let mut entry = LyricEntry::plain(text);
        entry.start_time = start_time;
        entry.effect = effect;
        entry.kind = EntryKind::Plain;
        out.entries.push(entry);
    }

    zip_translations(&mut out.entries, translations);
    out
}

/// Attach translations to entries by position.
pub(crate) fn zip_translations(entries: &mut [LyricEntry], translations: &[String]) {
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.translation = translations.get(i).cloned().unwrap_or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_lines_start_unsynced() {
        let out = parse_plain("hello world\nsecond line\n", &[]);
        assert_eq!(out.entries.len(), 2);
        assert!(out.warnings.is_empty());
        assert_eq!(out.entries[0].text, "hello world");
        assert_eq!(out.entries[0].start_time, UNSET_TIME);
        assert_eq!(out.entries[0].kind, EntryKind::Plain);
    }

    #[test]
    fn lrc_tags_set_start_times() {
        let out = parse_plain("[00:12.5]first\n[01:02.25]second", &[]);
        assert_eq!(out.entries[0].start_time, 12.5);
        assert_eq!(out.entries[1].start_time, 62.25);
        assert_eq!(out.entries[0].text, "first");
    }

    #[test]
    fn blank_lines_are_skipped() {
        let out = parse_plain("a\n\n   \nb", &[]);
        assert_eq!(out.entries.len(), 2);
        assert_eq!(out.entries[1].text, "b");
    }

    #[test]
    fn effect_markers_are_stripped_and_recorded() {
        let out = parse_plain("***big chorus***\n%%%broken%%%\n###strobe###\nplain", &[]);
        assert_eq!(out.entries[0].effect, EffectKind::Pulse);
        assert_eq!(out.entries[0].text, "big chorus");
        assert_eq!(out.entries[1].effect, EffectKind::Glitch);
        assert_eq!(out.entries[1].text, "broken");
        assert_eq!(out.entries[2].effect, EffectKind::Flash);
        assert_eq!(out.entries[2].text, "strobe");
        assert_eq!(out.entries[3].effect, EffectKind::None);
    }

    #[test]
    fn marker_survives_alongside_timestamp() {
        let out = parse_plain("[00:05.0]***loud***", &[]);
        assert_eq!(out.entries[0].start_time, 5.0);
        assert_eq!(out.entries[0].effect, EffectKind::Pulse);
        assert_eq!(out.entries[0].text, "loud");
    }

    #[test]
    fn bracketed_section_labels_stay_text() {
        let out = parse_plain("[verse]\n[chorus] la la", &[]);
        assert_eq!(out.entries[0].text, "[verse]");
        assert_eq!(out.entries[0].start_time, UNSET_TIME);
        assert_eq!(out.entries[1].text, "[chorus] la la");
    }

    #[test]
    fn malformed_tag_warns_and_leaves_line_unsynced() {
        let out = parse_plain("[0:1:2:3]oops", &[]);
        assert_eq!(out.entries.len(), 1);
        assert_eq!(out.entries[0].start_time, UNSET_TIME);
        assert_eq!(out.entries[0].text, "oops");
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].line, Some(1));
    }

    #[test]
    fn translations_zip_by_position() {
        let tr = vec!["uno".to_string(), "dos".to_string()];
        let out = parse_plain("one\ntwo\nthree", &tr);
        assert_eq!(out.entries[0].translation, "uno");
        assert_eq!(out.entries[1].translation, "dos");
        assert_eq!(out.entries[2].translation, "");
    }

    #[test]
    fn clock_token_forms() {
        assert_eq!(parse_clock("").unwrap(), 0.0);
        assert_eq!(parse_clock("42.5").unwrap(), 42.5);
        assert_eq!(parse_clock("01:30").unwrap(), 90.0);
        assert_eq!(parse_clock("1:02:03").unwrap(), 3723.0);
        assert!(parse_clock("1:xx").is_err());
        assert!(parse_clock("abc").is_err());
    }
}
