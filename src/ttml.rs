//! Apple Music JSON lyrics: a JSON envelope wrapping a TTML document.
//!
//! The envelope is `data[0].attributes.ttmlLocalizations`; the TTML inside
//! carries one `<p begin end>` element per line and `<span begin end>`
//! children for karaoke syllables. Free text directly after a span (usually
//! the inter-word space) belongs to that span's syllable.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{LyrvidError, LyrvidResult};
use crate::model::{EntryKind, LyricEntry, Syllable};
use crate::parse::{ParseOutcome, parse_clock, zip_translations};

#[derive(Debug, serde::Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Vec<DataItem>,
}

#[derive(Debug, serde::Deserialize)]
struct DataItem {
    attributes: Attributes,
}

#[derive(Debug, serde::Deserialize)]
struct Attributes {
    #[serde(rename = "ttmlLocalizations")]
    ttml_localizations: Option<String>,
}

/// Parse an Apple Music lyrics JSON payload into karaoke entries.
///
/// A missing envelope or malformed TTML markup is fatal; nothing is
/// returned in that case.
pub fn parse_apple_json(raw: &str, translations: &[String]) -> LyrvidResult<ParseOutcome> {
    let envelope: Envelope = serde_json::from_str(raw)
        .map_err(|e| LyrvidError::parse(format!("invalid Apple Music JSON: {e}")))?;

    let ttml = envelope
        .data
        .into_iter()
        .next()
        .and_then(|item| item.attributes.ttml_localizations)
        .ok_or_else(|| LyrvidError::parse("invalid Apple Music JSON format"))?;

    let mut outcome = parse_ttml(&ttml)?;
    zip_translations(&mut outcome.entries, translations);
    Ok(outcome)
}

struct LineBuilder {
    begin: f64,
    end: f64,
    text: String,
    syllables: Vec<Syllable>,
}

/// Walk the TTML event stream, collecting `<p>` lines and `<span>` syllables.
fn parse_ttml(ttml: &str) -> LyrvidResult<ParseOutcome> {
    let mut reader = Reader::from_str(ttml);
    let mut outcome = ParseOutcome::default();

    let mut line: Option<LineBuilder> = None;
    let mut span: Option<Syllable> = None;
    // True between a closed span and the next element, so trailing free text
    // lands on the previous syllable.
    let mut after_span = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"p" => {
                    let (begin, end) = timing_attrs(&e)?;
                    line = Some(LineBuilder {
                        begin,
                        end,
                        text: String::new(),
                        syllables: Vec::new(),
                    });
                    after_span = false;
                }
                b"span" => {
                    let (begin, end) = timing_attrs(&e)?;
                    span = Some(Syllable {
                        text: String::new(),
                        begin,
                        end,
                    });
                    after_span = false;
                }
                _ => after_span = false,
            },
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"span"
                    && let Some(l) = line.as_mut()
                {
                    let (begin, end) = timing_attrs(&e)?;
                    l.syllables.push(Syllable {
                        text: String::new(),
                        begin,
                        end,
                    });
                    after_span = true;
                }
            }
            Ok(Event::Text(t)) => {
                let raw = String::from_utf8_lossy(&t).into_owned();
                let text = quick_xml::escape::unescape(&raw)
                    .map_err(|e| LyrvidError::parse(format!("invalid markup content: {e}")))?
                    .into_owned();

                if let Some(s) = span.as_mut() {
                    s.text.push_str(&text);
                } else if after_span
                    && let Some(l) = line.as_mut()
                    && let Some(last) = l.syllables.last_mut()
                {
                    last.text.push_str(&text);
                }
                if let Some(l) = line.as_mut() {
                    l.text.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"span" => {
                    if let (Some(s), Some(l)) = (span.take(), line.as_mut()) {
                        l.syllables.push(s);
                    }
                    after_span = true;
                }
                b"p" => {
                    if let Some(l) = line.take() {
                        outcome.entries.push(finish_line(l));
                    }
                    after_span = false;
                }
                _ => after_span = false,
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(LyrvidError::parse(format!("invalid markup content: {e}")));
            }
        }
    }

    Ok(outcome)
}

fn finish_line(l: LineBuilder) -> LyricEntry {
    let collapsed = l.text.split_whitespace().collect::<Vec<_>>().join(" ");
    LyricEntry {
        text: collapsed,
        translation: String::new(),
        start_time: l.begin,
        // Zero means the source had no usable end attribute.
        end_time: (l.end != 0.0).then_some(l.end),
        kind: EntryKind::Karaoke,
        syllables: l.syllables,
        effect: Default::default(),
        style: Default::default(),
    }
}

/// Read `begin`/`end` attributes; missing or empty attributes read as zero.
fn timing_attrs(e: &quick_xml::events::BytesStart<'_>) -> LyrvidResult<(f64, f64)> {
    let mut begin = 0.0;
    let mut end = 0.0;
    for attr in e.attributes() {
        let attr = attr.map_err(|e| LyrvidError::parse(format!("invalid markup content: {e}")))?;
        let key = attr.key.as_ref();
        if key != b"begin" && key != b"end" {
            continue;
        }
        let raw = String::from_utf8_lossy(&attr.value).into_owned();
        let value = quick_xml::escape::unescape(&raw)
            .map_err(|e| LyrvidError::parse(format!("invalid markup content: {e}")))?;
        let secs = parse_clock(&value).unwrap_or(0.0);
        if key == b"begin" {
            begin = secs;
        } else {
            end = secs;
        }
    }
    Ok((begin, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(ttml: &str) -> String {
        serde_json::json!({
            "data": [{ "attributes": { "ttmlLocalizations": ttml } }]
        })
        .to_string()
    }

    const SIMPLE_TTML: &str = concat!(
        r#"<tt><body><div>"#,
        r#"<p begin="10.0" end="12.5">"#,
        r#"<span begin="10.0" end="10.5">Hel</span>"#,
        r#"<span begin="10.5" end="11.0">lo</span> "#,
        r#"<span begin="11.2" end="12.5">world</span>"#,
        r#"</p>"#,
        r#"<p begin="1:00" end="1:03">Second line</p>"#,
        r#"</div></body></tt>"#,
    );

    #[test]
    fn parses_lines_and_syllables() {
        let out = parse_apple_json(&envelope(SIMPLE_TTML), &[]).unwrap();
        assert_eq!(out.entries.len(), 2);

        let first = &out.entries[0];
        assert_eq!(first.kind, EntryKind::Karaoke);
        assert_eq!(first.start_time, 10.0);
        assert_eq!(first.end_time, Some(12.5));
        assert_eq!(first.text, "Hello world");
        assert_eq!(first.syllables.len(), 3);
        assert_eq!(first.syllables[0].text, "Hel");
        assert_eq!(first.syllables[0].begin, 10.0);
        // The inter-word space after the closed span sticks to it.
        assert_eq!(first.syllables[1].text, "lo ");

        let second = &out.entries[1];
        assert_eq!(second.start_time, 60.0);
        assert_eq!(second.end_time, Some(63.0));
        assert_eq!(second.syllables.len(), 0);
    }

    #[test]
    fn line_text_collapses_whitespace() {
        let ttml = r#"<tt><p begin="0" end="2">  spaced
            out  </p></tt>"#;
        let out = parse_apple_json(&envelope(ttml), &[]).unwrap();
        assert_eq!(out.entries[0].text, "spaced out");
    }

    #[test]
    fn missing_envelope_is_fatal() {
        let err = parse_apple_json(r#"{"data":[]}"#, &[]).unwrap_err();
        assert!(err.to_string().contains("Apple Music"));

        let err = parse_apple_json(r#"{"data":[{"attributes":{}}]}"#, &[]).unwrap_err();
        assert!(err.to_string().contains("Apple Music"));
    }

    #[test]
    fn broken_markup_is_fatal() {
        let err = parse_apple_json(&envelope("<tt><p begin='0'></tt>"), &[]).unwrap_err();
        assert!(err.to_string().contains("invalid markup content"));
    }

    #[test]
    fn zero_end_attribute_falls_back_to_default_span() {
        let ttml = r#"<tt><p begin="5.0">no end</p></tt>"#;
        let out = parse_apple_json(&envelope(ttml), &[]).unwrap();
        assert_eq!(out.entries[0].end_time, None);
        assert_eq!(out.entries[0].end_or_default(), 8.0);
    }

    #[test]
    fn translations_zip_by_position() {
        let tr = vec!["hola mundo".to_string()];
        let out = parse_apple_json(&envelope(SIMPLE_TTML), &tr).unwrap();
        assert_eq!(out.entries[0].translation, "hola mundo");
        assert_eq!(out.entries[1].translation, "");
    }
}
