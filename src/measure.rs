use std::path::Path;

use anyhow::{Context, Result};

use crate::schema::TextStyle;

/// Measures shaped text for the autofit search. The compositor only ever
/// needs two numbers per (text, style, size) triple: the width of the widest
/// line and the total block height.
pub trait TextMeasurer {
    /// Width in CSS pixels of the widest line of `text` at `font_size`,
    /// including letter and word spacing from `style`.
    fn line_width(&self, text: &str, style: &TextStyle, font_size: f32) -> f32;

    /// Total height of the text block at `font_size`.
    fn block_height(&self, text: &str, style: &TextStyle, font_size: f32) -> f32 {
        let lines = text.lines().count().max(1) as f32;
        lines * font_size * style.line_height
    }
}

/// Spacing added on top of glyph advances, in CSS pixels.
fn spacing_for(line: &str, style: &TextStyle, font_size: f32) -> f32 {
    let chars = line.chars().count() as f32;
    let spaces = line.chars().filter(|c| *c == ' ').count() as f32;
    chars * style.letter_spacing_em * font_size + spaces * style.word_spacing_em * font_size
}

/// Measurer backed by a real font loaded with fontdue. Used when a font file
/// is available; glyph advances come from the font's metrics.
pub struct FontMeasurer {
    font: fontdue::Font,
}

impl FontMeasurer {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|err| anyhow::anyhow!("failed to parse font: {err}"))?;
        Ok(Self { font })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font file '{}'", path.display()))?;
        Self::from_bytes(&bytes)
    }
}

impl TextMeasurer for FontMeasurer {
    fn line_width(&self, text: &str, style: &TextStyle, font_size: f32) -> f32 {
        let mut widest = 0.0f32;
        for line in text.lines() {
            let advance: f32 = line
                .chars()
                .map(|c| self.font.metrics(c, font_size).advance_width)
                .sum();
            widest = widest.max(advance + spacing_for(line, style, font_size));
        }
        widest
    }
}

/// Heuristic measurer used when no font file is configured. Assumes an
/// average advance of 0.6em per glyph, which tracks common UI faces closely
/// enough for box fitting.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxMeasurer;

impl TextMeasurer for ApproxMeasurer {
    fn line_width(&self, text: &str, style: &TextStyle, font_size: f32) -> f32 {
        let mut widest = 0.0f32;
        for line in text.lines() {
            let glyphs = line.chars().count() as f32;
            widest = widest.max(glyphs * font_size * 0.6 + spacing_for(line, style, font_size));
        }
        widest
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FixedAdvance;
    use super::*;

    #[test]
    fn width_scales_linearly_with_font_size() {
        let style = TextStyle::default();
        let m = ApproxMeasurer;
        let w16 = m.line_width("WATERMARK", &style, 16.0);
        let w32 = m.line_width("WATERMARK", &style, 32.0);
        assert!((w32 - 2.0 * w16).abs() < 1e-3);
    }

    #[test]
    fn widest_line_wins() {
        let style = TextStyle::default();
        let m = FixedAdvance(0.5);
        let w = m.line_width("ab\nabcdef\nabc", &style, 10.0);
        assert_eq!(w, 6.0 * 10.0 * 0.5);
    }

    #[test]
    fn block_height_counts_lines() {
        let style = TextStyle::default();
        let m = ApproxMeasurer;
        let h = m.block_height("one\ntwo\nthree", &style, 20.0);
        assert!((h - 3.0 * 20.0 * style.line_height).abs() < 1e-3);
    }

    #[test]
    fn letter_spacing_widens_lines() {
        let mut style = TextStyle::default();
        let m = FixedAdvance(0.5);
        let plain = m.line_width("abcd", &style, 10.0);
        style.letter_spacing_em = 0.1;
        let spaced = m.line_width("abcd", &style, 10.0);
        assert!((spaced - plain - 4.0).abs() < 1e-3);
    }
}
