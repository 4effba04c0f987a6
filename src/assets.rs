//! Prepared scene assets: decoded images and the font set + text layout
//! machinery.

use std::sync::Arc;

use anyhow::Context;

use crate::error::{LyrvidError, LyrvidResult};
use crate::model::FontSlot;

/// Prepared raster image in premultiplied RGBA8 form.
#[derive(Clone, Debug)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    pub rgba8_premul: Arc<Vec<u8>>,
}

pub fn decode_image(bytes: &[u8]) -> LyrvidResult<PreparedImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(PreparedImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

/// Raw font bytes per slot. Missing slots fall back to main.
#[derive(Clone, Debug, Default)]
pub struct FontSet {
    main: Option<Arc<Vec<u8>>>,
    serif: Option<Arc<Vec<u8>>>,
    mono: Option<Arc<Vec<u8>>>,
    translation: Option<Arc<Vec<u8>>>,
}

impl FontSet {
    pub fn set(&mut self, slot: FontSlot, bytes: Vec<u8>) {
        let bytes = Some(Arc::new(bytes));
        match slot {
            FontSlot::Main => self.main = bytes,
            FontSlot::Serif => self.serif = bytes,
            FontSlot::Mono => self.mono = bytes,
            FontSlot::Translation => self.translation = bytes,
        }
    }

    /// Bytes for a slot, falling back to the main font.
    pub fn get(&self, slot: FontSlot) -> Option<&Arc<Vec<u8>>> {
        let direct = match slot {
            FontSlot::Main => &self.main,
            FontSlot::Serif => &self.serif,
            FontSlot::Mono => &self.mono,
            FontSlot::Translation => &self.translation,
        };
        direct.as_ref().or(self.main.as_ref())
    }

    pub fn has_any(&self) -> bool {
        self.main.is_some()
    }
}

/// RGBA8 brush color carried through Parley layouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrushRgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl From<[u8; 4]> for TextBrushRgba8 {
    fn from(c: [u8; 4]) -> Self {
        Self {
            r: c[0],
            g: c[1],
            b: c[2],
            a: c[3],
        }
    }
}

/// Stateful helper for building Parley text layouts from raw font bytes.
pub struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
}

impl Default for TextLayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextLayoutEngine {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
        }
    }

    /// Shape and lay out a single run of text with the given font bytes.
    pub fn layout_plain(
        &mut self,
        text: &str,
        font_bytes: &[u8],
        size_px: f32,
        brush: TextBrushRgba8,
        max_width_px: Option<f32>,
    ) -> LyrvidResult<parley::Layout<TextBrushRgba8>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(LyrvidError::validation(
                "text size_px must be finite and > 0",
            ));
        }

        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.to_vec()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            LyrvidError::validation("no font families registered from font bytes")
        })?;

        let family_name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| LyrvidError::validation("registered font family has no name"))?
            .to_string();

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        if let Some(w) = max_width_px {
            layout.break_all_lines(Some(w));
            layout.align(
                Some(w),
                parley::Alignment::Start,
                parley::AlignmentOptions::default(),
            );
        } else {
            layout.break_all_lines(None);
        }

        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn decode_image_png_dimensions_and_premul() {
        let src_rgba = vec![100u8, 50u8, 200u8, 128u8];
        let img = image::RgbaImage::from_raw(1, 1, src_rgba).unwrap();

        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let prepared = decode_image(&buf).unwrap();
        assert_eq!(prepared.width, 1);
        assert_eq!(prepared.height, 1);
        assert_eq!(
            prepared.rgba8_premul.as_slice(),
            &[
                ((100u16 * 128 + 127) / 255) as u8,
                ((50u16 * 128 + 127) / 255) as u8,
                ((200u16 * 128 + 127) / 255) as u8,
                128u8
            ]
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_image(b"not an image").is_err());
    }

    #[test]
    fn font_set_falls_back_to_main() {
        let mut fonts = FontSet::default();
        assert!(fonts.get(FontSlot::Serif).is_none());
        fonts.set(FontSlot::Main, vec![1, 2, 3]);
        assert_eq!(fonts.get(FontSlot::Serif).unwrap().as_slice(), &[1, 2, 3]);
        fonts.set(FontSlot::Serif, vec![4]);
        assert_eq!(fonts.get(FontSlot::Serif).unwrap().as_slice(), &[4]);
    }

    #[test]
    fn layout_rejects_bad_size() {
        let mut engine = TextLayoutEngine::new();
        assert!(
            engine
                .layout_plain("x", &[0, 1, 2], 0.0, TextBrushRgba8::default(), None)
                .is_err()
        );
    }
}
