use crate::schema::{Color, ImageStyle, TextStyle};

/// What the target renderer can do natively. Resolution picks fallbacks for
/// anything unsupported instead of silently dropping the styling.
#[derive(Debug, Clone, Copy)]
pub struct RendererCaps {
    /// Whether the renderer strokes text outlines directly. Without it the
    /// stroke is emulated with a ring of offset shadow copies.
    pub native_text_stroke: bool,
}

impl Default for RendererCaps {
    fn default() -> Self {
        Self {
            native_text_stroke: true,
        }
    }
}

/// How a text outline gets drawn after capability resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum StrokeRendering {
    None,
    Native {
        width_px: f32,
        color: Color,
    },
    /// Eight copies of the text offset in a ring around the original,
    /// emulating an outline on renderers without native stroking.
    ShadowRing {
        offsets: [(f32, f32); 8],
        color: Color,
    },
}

impl StrokeRendering {
    fn ring(width_px: f32, color: Color) -> Self {
        let w = width_px;
        Self::ShadowRing {
            offsets: [
                (-w, -w),
                (0.0, -w),
                (w, -w),
                (-w, 0.0),
                (w, 0.0),
                (-w, w),
                (0.0, w),
                (w, w),
            ],
            color,
        }
    }
}

/// A text style with every renderer-facing value computed: opacity as a
/// fraction, the stroke strategy chosen for the given capabilities, and the
/// shorthand strings the panel displays.
#[derive(Debug, Clone)]
pub struct ResolvedTextStyle {
    pub font_family: String,
    pub font_weight: u16,
    pub italic: bool,
    pub font_size: f32,
    pub line_height: f32,
    pub letter_spacing_px: f32,
    pub word_spacing_px: f32,
    pub fill: Color,
    pub opacity: f32,
    pub blend: &'static str,
    pub stroke: StrokeRendering,
}

pub fn resolve_text_style(style: &TextStyle, caps: RendererCaps) -> ResolvedTextStyle {
    let stroke = if !style.stroke.enabled {
        StrokeRendering::None
    } else if caps.native_text_stroke {
        StrokeRendering::Native {
            width_px: style.stroke.width_px,
            color: style.stroke.color,
        }
    } else {
        StrokeRendering::ring(style.stroke.width_px, style.stroke.color)
    };

    ResolvedTextStyle {
        font_family: style.font_family.clone(),
        font_weight: style.font_weight,
        italic: style.italic,
        font_size: style.font_size,
        line_height: style.line_height,
        letter_spacing_px: style.letter_spacing_em * style.font_size,
        word_spacing_px: style.word_spacing_em * style.font_size,
        fill: style.fill,
        opacity: (style.opacity_pct / 100.0).clamp(0.0, 1.0),
        blend: style.blend.css_name(),
        stroke,
    }
}

/// An image style with renderer-facing values computed. The border renders
/// as an inset shadow so it never changes the layer's layout box.
#[derive(Debug, Clone)]
pub struct ResolvedImageStyle {
    pub opacity: f32,
    pub blend: &'static str,
    pub filter: String,
    pub corner_radius_pct: f32,
    pub border_shadow: Option<String>,
}

pub fn resolve_image_style(style: &ImageStyle) -> ResolvedImageStyle {
    let border_shadow = if style.border.enabled && style.border.width_px > 0.0 {
        Some(format!(
            "0 0 0 {}px {}",
            style.border.width_px,
            style.border.color.to_hex()
        ))
    } else {
        None
    };

    ResolvedImageStyle {
        opacity: (style.opacity_pct.0 / 100.0).clamp(0.0, 1.0),
        blend: style.blend.css_name(),
        filter: style.filters.css_value(),
        corner_radius_pct: style.corner_radius_pct,
        border_shadow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{BlendMode, Stroke};

    #[test]
    fn disabled_stroke_resolves_to_none() {
        let style = TextStyle::default();
        let resolved = resolve_text_style(&style, RendererCaps::default());
        assert_eq!(resolved.stroke, StrokeRendering::None);
    }

    #[test]
    fn stroke_uses_native_path_when_available() {
        let mut style = TextStyle::default();
        style.stroke = Stroke {
            enabled: true,
            width_px: 3.0,
            color: Color::WHITE,
        };
        let resolved = resolve_text_style(&style, RendererCaps::default());
        assert_eq!(
            resolved.stroke,
            StrokeRendering::Native {
                width_px: 3.0,
                color: Color::WHITE,
            }
        );
    }

    #[test]
    fn stroke_falls_back_to_shadow_ring() {
        let mut style = TextStyle::default();
        style.stroke.enabled = true;
        style.stroke.width_px = 2.0;
        let caps = RendererCaps {
            native_text_stroke: false,
        };
        let resolved = resolve_text_style(&style, caps);
        match resolved.stroke {
            StrokeRendering::ShadowRing { offsets, .. } => {
                assert_eq!(offsets.len(), 8);
                assert!(offsets.contains(&(-2.0, -2.0)));
                assert!(offsets.contains(&(2.0, 0.0)));
            }
            other => panic!("expected shadow ring, got {other:?}"),
        }
    }

    #[test]
    fn opacity_and_spacing_resolve_to_renderer_units() {
        let mut style = TextStyle::default();
        style.opacity_pct = 45.0;
        style.letter_spacing_em = 0.1;
        style.font_size = 20.0;
        style.blend = BlendMode::Multiply;
        let resolved = resolve_text_style(&style, RendererCaps::default());
        assert!((resolved.opacity - 0.45).abs() < 1e-6);
        assert!((resolved.letter_spacing_px - 2.0).abs() < 1e-6);
        assert_eq!(resolved.blend, "multiply");
    }

    #[test]
    fn border_renders_as_inset_shadow() {
        let mut style = ImageStyle::default();
        style.border.enabled = true;
        style.border.width_px = 4.0;
        style.border.color = Color::BLACK;
        let resolved = resolve_image_style(&style);
        assert_eq!(resolved.border_shadow.as_deref(), Some("0 0 0 4px #000000"));
    }

    #[test]
    fn identity_filters_resolve_to_none() {
        let style = ImageStyle::default();
        let resolved = resolve_image_style(&style);
        assert_eq!(resolved.filter, "none");
        assert_eq!(resolved.border_shadow, None);
    }
}
