use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{de::Error as DeError, Deserialize, Deserializer};

/// Stable identity for a layer, assigned from a monotonic counter at creation
/// and never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u32);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Text,
    Image,
}

/// CSS `mix-blend-mode` set exposed by the style panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    pub fn css_name(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Multiply => "multiply",
            Self::Screen => "screen",
            Self::Overlay => "overlay",
            Self::Darken => "darken",
            Self::Lighten => "lighten",
            Self::ColorDodge => "color-dodge",
            Self::ColorBurn => "color-burn",
            Self::HardLight => "hard-light",
            Self::SoftLight => "soft-light",
            Self::Difference => "difference",
            Self::Exclusion => "exclusion",
            Self::Hue => "hue",
            Self::Saturation => "saturation",
            Self::Color => "color",
            Self::Luminosity => "luminosity",
        }
    }
}

/// An opaque RGB color. Export always emits the normalized `#rrggbb` form
/// regardless of how the value was authored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
    pub const WHITE: Color = Color {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = anyhow::Error;

    /// Accepts `#rgb`, `#rrggbb`, `#rrggbbaa` (alpha dropped) and
    /// `rgb(...)` / `rgba(...)` notations.
    fn from_str(raw: &str) -> Result<Self> {
        let s = raw.trim();
        if let Some(hex) = s.strip_prefix('#') {
            if !hex.is_ascii() {
                bail!("invalid hex color '{s}'");
            }
            return match hex.len() {
                3 => {
                    let mut chans = [0_u8; 3];
                    for (slot, ch) in chans.iter_mut().zip(hex.chars()) {
                        let nibble = ch
                            .to_digit(16)
                            .ok_or_else(|| anyhow::anyhow!("invalid hex color '{s}'"))?
                            as u8;
                        *slot = nibble * 16 + nibble;
                    }
                    Ok(Color {
                        r: chans[0],
                        g: chans[1],
                        b: chans[2],
                    })
                }
                6 | 8 => {
                    let parse = |range: std::ops::Range<usize>| {
                        u8::from_str_radix(&hex[range], 16)
                            .map_err(|_| anyhow::anyhow!("invalid hex color '{s}'"))
                    };
                    Ok(Color {
                        r: parse(0..2)?,
                        g: parse(2..4)?,
                        b: parse(4..6)?,
                    })
                }
                _ => bail!("invalid hex color '{s}'"),
            };
        }

        let lowered = s.to_ascii_lowercase();
        if let Some(body) = lowered
            .strip_prefix("rgba(")
            .or_else(|| lowered.strip_prefix("rgb("))
        {
            let body = body.trim_end_matches(')');
            let mut chans = [0_u8; 3];
            let mut parts = body.split(',');
            for slot in chans.iter_mut() {
                let part = parts
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("invalid rgb color '{s}'"))?;
                let value: f32 = part
                    .trim()
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid rgb color '{s}'"))?;
                *slot = value.clamp(0.0, 255.0).round() as u8;
            }
            return Ok(Color {
                r: chans[0],
                g: chans[1],
                b: chans[2],
            });
        }

        bail!("unrecognized color '{s}'")
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stroke {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_stroke_width")]
    pub width_px: f32,
    #[serde(default = "default_stroke_color")]
    pub color: Color,
}

impl Default for Stroke {
    fn default() -> Self {
        Self {
            enabled: false,
            width_px: default_stroke_width(),
            color: default_stroke_color(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Border {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub width_px: f32,
    #[serde(default = "default_stroke_color")]
    pub color: Color,
}

impl Default for Border {
    fn default() -> Self {
        Self {
            enabled: false,
            width_px: 0.0,
            color: default_stroke_color(),
        }
    }
}

pub const MIN_FONT_SIZE: f32 = 6.0;
pub const MAX_FONT_SIZE: f32 = 512.0;

pub const DEFAULT_FONT_FAMILY: &str =
    "system-ui, -apple-system, Segoe UI, Roboto, Helvetica, Arial, sans-serif";
pub const TEXT_PLACEHOLDER: &str = "Type text…";

/// Full style state of a text layer. `font_size` holds the current resolved
/// size; it is driven by autofit while `lock_to_box` is on and by the
/// explicit control otherwise.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextStyle {
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default = "default_font_weight")]
    pub font_weight: u16,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub letter_spacing_em: f32,
    #[serde(default)]
    pub word_spacing_em: f32,
    #[serde(default = "default_line_height")]
    pub line_height: f32,
    #[serde(default = "default_lock_to_box")]
    pub lock_to_box: bool,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_fill")]
    pub fill: Color,
    #[serde(default = "default_opacity_pct")]
    pub opacity_pct: f32,
    #[serde(default)]
    pub blend: BlendMode,
    #[serde(default)]
    pub stroke: Stroke,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: default_font_family(),
            font_weight: default_font_weight(),
            italic: false,
            letter_spacing_em: 0.0,
            word_spacing_em: 0.0,
            line_height: default_line_height(),
            lock_to_box: default_lock_to_box(),
            font_size: default_font_size(),
            fill: default_fill(),
            opacity_pct: default_opacity_pct(),
            blend: BlendMode::Normal,
            stroke: Stroke::default(),
        }
    }
}

impl TextStyle {
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("letter_spacing_em", self.letter_spacing_em),
            ("word_spacing_em", self.word_spacing_em),
            ("line_height", self.line_height),
            ("font_size", self.font_size),
            ("opacity_pct", self.opacity_pct),
            ("stroke.width_px", self.stroke.width_px),
        ] {
            if !value.is_finite() {
                bail!("{label} must be finite");
            }
        }
        if self.font_family.trim().is_empty() {
            bail!("font_family cannot be empty");
        }
        if self.font_size < MIN_FONT_SIZE || self.font_size > MAX_FONT_SIZE {
            bail!(
                "font_size {} outside supported range {}..{}",
                self.font_size,
                MIN_FONT_SIZE,
                MAX_FONT_SIZE
            );
        }
        if self.line_height <= 0.0 {
            bail!("line_height must be > 0");
        }
        if self.opacity_pct < 0.0 || self.opacity_pct > 100.0 {
            bail!("opacity_pct must be within 0..100");
        }
        if self.stroke.width_px < 0.0 {
            bail!("stroke.width_px cannot be negative");
        }
        Ok(())
    }
}

/// Brightness/contrast/saturate/grayscale/blur values composed into a CSS
/// filter expression for the bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageFilters {
    #[serde(default = "default_filter_pct")]
    pub brightness_pct: f32,
    #[serde(default = "default_filter_pct")]
    pub contrast_pct: f32,
    #[serde(default = "default_filter_pct")]
    pub saturate_pct: f32,
    #[serde(default)]
    pub grayscale_pct: f32,
    #[serde(default)]
    pub blur_px: f32,
}

impl Default for ImageFilters {
    fn default() -> Self {
        Self {
            brightness_pct: 100.0,
            contrast_pct: 100.0,
            saturate_pct: 100.0,
            grayscale_pct: 0.0,
            blur_px: 0.0,
        }
    }
}

impl ImageFilters {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Composed filter expression, or `none` when every value is at its
    /// default.
    pub fn css_value(&self) -> String {
        if self.is_identity() {
            return "none".to_owned();
        }
        format!(
            "brightness({}%) contrast({}%) saturate({}%) grayscale({}%) blur({}px)",
            self.brightness_pct,
            self.contrast_pct,
            self.saturate_pct,
            self.grayscale_pct,
            self.blur_px
        )
    }

    /// Parse a composed filter expression back into values. Functions absent
    /// from the string keep their defaults, matching the panel read-back
    /// behavior.
    pub fn parse_css(expression: &str) -> Self {
        let trimmed = expression.trim();
        if trimmed.is_empty() || trimmed == "none" {
            return Self::default();
        }

        let mut filters = Self::default();
        let pattern =
            regex::Regex::new(r"(?i)(brightness|contrast|saturate|grayscale|blur)\(([^)]+)\)")
                .expect("filter regex should compile");
        for capture in pattern.captures_iter(trimmed) {
            let raw = capture[2].trim().trim_end_matches("px");
            let raw = raw.trim_end_matches('%');
            let Ok(value) = raw.trim().parse::<f32>() else {
                continue;
            };
            match capture[1].to_ascii_lowercase().as_str() {
                "brightness" => filters.brightness_pct = value,
                "contrast" => filters.contrast_pct = value,
                "saturate" => filters.saturate_pct = value,
                "grayscale" => filters.grayscale_pct = value,
                "blur" => filters.blur_px = value,
                _ => {}
            }
        }
        filters
    }

    /// Saturation as exported to the backend: grayscale forces it to zero.
    pub fn export_saturation(&self) -> f32 {
        if self.grayscale_pct > 0.0 {
            0.0
        } else {
            self.saturate_pct
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("brightness_pct", self.brightness_pct),
            ("contrast_pct", self.contrast_pct),
            ("saturate_pct", self.saturate_pct),
            ("grayscale_pct", self.grayscale_pct),
            ("blur_px", self.blur_px),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{label} must be finite and non-negative");
            }
        }
        if self.grayscale_pct > 100.0 {
            bail!("grayscale_pct must be within 0..100");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageStyle {
    #[serde(default)]
    pub opacity_pct: OpacityPct,
    #[serde(default)]
    pub blend: BlendMode,
    #[serde(default)]
    pub filters: ImageFilters,
    #[serde(default)]
    pub corner_radius_pct: f32,
    #[serde(default)]
    pub border: Border,
}

/// Newtype so the 100 default survives `#[serde(default)]` on the struct.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct OpacityPct(pub f32);

impl Default for OpacityPct {
    fn default() -> Self {
        OpacityPct(100.0)
    }
}

impl ImageStyle {
    pub fn validate(&self) -> Result<()> {
        self.filters.validate()?;
        if !self.opacity_pct.0.is_finite() || self.opacity_pct.0 < 0.0 || self.opacity_pct.0 > 100.0
        {
            bail!("opacity_pct must be within 0..100");
        }
        if self.corner_radius_pct < 0.0 || self.corner_radius_pct > 100.0 {
            bail!("corner_radius_pct must be within 0..100");
        }
        if self.border.width_px < 0.0 {
            bail!("border.width_px cannot be negative");
        }
        Ok(())
    }
}

fn default_font_family() -> String {
    DEFAULT_FONT_FAMILY.to_owned()
}

fn default_font_weight() -> u16 {
    400
}

fn default_line_height() -> f32 {
    1.1
}

fn default_lock_to_box() -> bool {
    true
}

fn default_font_size() -> f32 {
    32.0
}

fn default_fill() -> Color {
    Color::BLACK
}

fn default_opacity_pct() -> f32 {
    100.0
}

fn default_filter_pct() -> f32 {
    100.0
}

fn default_stroke_width() -> f32 {
    2.0
}

fn default_stroke_color() -> Color {
    Color::WHITE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_parses_short_and_long_hex() {
        let short: Color = "#f0a".parse().expect("short hex should parse");
        assert_eq!(short.to_hex(), "#ff00aa");

        let long: Color = "#4FE1B8".parse().expect("long hex should parse");
        assert_eq!(long.to_hex(), "#4fe1b8");
    }

    #[test]
    fn color_parses_rgb_notation() {
        let color: Color = "rgba(255, 128, 0, 0.5)".parse().expect("rgba should parse");
        assert_eq!(color.to_hex(), "#ff8000");
    }

    #[test]
    fn color_rejects_garbage() {
        assert!("not-a-color".parse::<Color>().is_err());
        assert!("#12345".parse::<Color>().is_err());
    }

    #[test]
    fn color_rejects_non_ascii_hex_without_panicking() {
        // Multi-byte characters must not trip the byte-range slicing.
        assert!("#aéaé".parse::<Color>().is_err());
        assert!("#ééé".parse::<Color>().is_err());
    }

    #[test]
    fn filters_identity_composes_to_none() {
        assert_eq!(ImageFilters::default().css_value(), "none");
    }

    #[test]
    fn filters_round_trip_through_css() {
        let filters = ImageFilters {
            brightness_pct: 120.0,
            contrast_pct: 90.0,
            saturate_pct: 45.0,
            grayscale_pct: 0.0,
            blur_px: 3.0,
        };
        let parsed = ImageFilters::parse_css(&filters.css_value());
        assert_eq!(parsed, filters);
    }

    #[test]
    fn filters_parse_tolerates_missing_functions() {
        let parsed = ImageFilters::parse_css("brightness(80%) blur(2px)");
        assert_eq!(parsed.brightness_pct, 80.0);
        assert_eq!(parsed.blur_px, 2.0);
        assert_eq!(parsed.contrast_pct, 100.0);
        assert_eq!(parsed.saturate_pct, 100.0);
    }

    #[test]
    fn grayscale_forces_export_saturation_to_zero() {
        let mut filters = ImageFilters::default();
        filters.saturate_pct = 140.0;
        assert_eq!(filters.export_saturation(), 140.0);
        filters.grayscale_pct = 30.0;
        assert_eq!(filters.export_saturation(), 0.0);
    }

    #[test]
    fn text_style_validation_bounds_font_size() {
        let mut style = TextStyle::default();
        style.font_size = 4.0;
        assert!(style.validate().is_err());
        style.font_size = 32.0;
        assert!(style.validate().is_ok());
    }
}
