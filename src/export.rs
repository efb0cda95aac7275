use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::compositor::{Layer, LayerBody};
use crate::geometry::{to_natural_pixels, Rect};
use crate::intake::UploadedImage;
use crate::schema::TEXT_PLACEHOLDER;

/// JPEG/WebP quality sent with every request.
pub const EXPORT_QUALITY: u8 = 92;

/// Suffix appended to the upload's stem for the output filename.
const OUTPUT_SUFFIX: &str = "-watermarked";

/// Base z-order for the bottom layer; stacking order adds one per layer.
const Z_BASE: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
        }
    }
}

/// The request body POSTed to the backend's watermark endpoint. All
/// coordinates are in the base image's natural pixel space.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkRequest {
    pub base_image: String,
    pub nat_w: u32,
    pub nat_h: u32,
    pub layers: Vec<LayerPayload>,
    pub out_type: String,
    pub quality: u8,
    pub filename: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum LayerPayload {
    Text {
        text: String,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        font_family: String,
        font_size: i32,
        color: String,
        align: &'static str,
        weight: String,
        rotation: i32,
        opacity: f32,
        z: i32,
    },
    Image {
        data_url: String,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        opacity: f32,
        blend: String,
        rotation: i32,
        filters: FilterPayload,
        z: i32,
    },
}

#[derive(Debug, Serialize)]
pub struct FilterPayload {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub blur: f32,
}

/// Build the export request for one base image.
///
/// Every layer box is mapped from the canvas to natural pixels; text sizes
/// scale with the horizontal ratio and round to whole pixels. Fails when the
/// image's natural dimensions were never probed or there is nothing to burn
/// in.
pub fn build_request(
    upload: &UploadedImage,
    canvas: Rect,
    layers: &[Layer],
    format: OutputFormat,
) -> Result<WatermarkRequest> {
    let (nat_w, nat_h) = upload.natural.with_context(|| {
        format!(
            "natural dimensions of '{}' are unknown; cannot map layers to pixels",
            upload.filename
        )
    })?;
    if !upload.data_url.starts_with("data:") {
        bail!(
            "base image '{}' is not held as a data URL; refusing to fetch it",
            upload.filename
        );
    }
    if layers.is_empty() {
        bail!("nothing to export: add at least one layer");
    }

    let disp_w = canvas.w.max(1.0);
    let scale_x = nat_w as f32 / disp_w;

    let mut payloads = Vec::with_capacity(layers.len());
    for (index, layer) in layers.iter().enumerate() {
        let rect = layer.geometry.screen_rect();
        let mapped = to_natural_pixels(rect, canvas, nat_w, nat_h);
        let z = Z_BASE + index as i32;

        let payload = match &layer.body {
            LayerBody::Text { text, style } => {
                if text.trim().is_empty() || text == TEXT_PLACEHOLDER {
                    continue;
                }
                LayerPayload::Text {
                    text: text.clone(),
                    x: mapped.x,
                    y: mapped.y,
                    width: mapped.width,
                    height: mapped.height,
                    font_family: style.font_family.clone(),
                    font_size: (style.font_size * scale_x).round() as i32,
                    color: style.fill.to_hex(),
                    align: "center",
                    weight: style.font_weight.to_string(),
                    rotation: 0,
                    opacity: (style.opacity_pct / 100.0).clamp(0.0, 1.0),
                    z,
                }
            }
            LayerBody::Image { data_url, style, .. } => LayerPayload::Image {
                data_url: data_url.clone(),
                x: mapped.x,
                y: mapped.y,
                width: mapped.width,
                height: mapped.height,
                opacity: (style.opacity_pct.0 / 100.0).clamp(0.0, 1.0),
                blend: style.blend.css_name().to_string(),
                rotation: 0,
                filters: FilterPayload {
                    brightness: style.filters.brightness_pct,
                    contrast: style.filters.contrast_pct,
                    saturation: style.filters.export_saturation(),
                    blur: style.filters.blur_px,
                },
                z,
            },
        };
        payloads.push(payload);
    }

    if payloads.is_empty() {
        bail!("nothing to export: every text layer is empty");
    }

    Ok(WatermarkRequest {
        base_image: upload.data_url.clone(),
        nat_w,
        nat_h,
        layers: payloads,
        out_type: format.wire_name().to_string(),
        quality: EXPORT_QUALITY,
        filename: format!("{}{}", upload.stem(), OUTPUT_SUFFIX),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{Command, Compositor};
    use crate::geometry::Rect;
    use crate::measure::testing::FixedAdvance;
    use crate::schema::ImageStyle;
    use crate::style::RendererCaps;

    fn canvas() -> Rect {
        Rect::new(0.0, 0.0, 600.0, 400.0)
    }

    fn upload() -> UploadedImage {
        UploadedImage {
            filename: "beach.png".to_string(),
            data_url: "data:image/png;base64,AA==".to_string(),
            natural: Some((3000, 2000)),
        }
    }

    fn compositor_with_text(text: &str) -> Compositor {
        let mut c = Compositor::new(
            canvas(),
            RendererCaps::default(),
            Box::new(FixedAdvance(0.5)),
        );
        c.apply(Command::AddText { text: Some(text.into()) }).unwrap();
        c
    }

    #[test]
    fn request_carries_output_settings() {
        let c = compositor_with_text("MARK");
        let req = build_request(&upload(), canvas(), c.layers(), OutputFormat::Jpeg).unwrap();
        assert_eq!(req.out_type, "jpeg");
        assert_eq!(req.quality, 92);
        assert_eq!(req.filename, "beach-watermarked");
        assert_eq!((req.nat_w, req.nat_h), (3000, 2000));
    }

    #[test]
    fn text_layer_maps_to_natural_pixels() {
        let c = compositor_with_text("MARK");
        let req = build_request(&upload(), canvas(), c.layers(), OutputFormat::Png).unwrap();
        let value = serde_json::to_value(&req.layers[0]).unwrap();
        assert_eq!(value["type"], "text");
        // 200x40 box centered in 600x400 maps 5x horizontally.
        assert_eq!(value["x"], 1000);
        assert_eq!(value["y"], 900);
        assert_eq!(value["width"], 1000);
        assert_eq!(value["height"], 200);
        assert_eq!(value["align"], "center");
        assert_eq!(value["weight"], "400");
        assert_eq!(value["rotation"], 0);
        assert_eq!(value["color"], "#000000");
        // Font size scales with the horizontal ratio and rounds.
        let size = value["fontSize"].as_i64().unwrap();
        assert!(size > 0);
        assert_eq!(value["fontSize"], size);
    }

    #[test]
    fn image_layer_zeroes_saturation_under_grayscale() {
        let mut c = compositor_with_text("MARK");
        c.apply(Command::AddImage {
            filename: "logo.png".into(),
            data_url: "data:image/png;base64,BB==".into(),
        })
        .unwrap();
        let mut style = ImageStyle::default();
        style.filters.grayscale_pct = 50.0;
        style.filters.saturate_pct = 140.0;
        c.apply(Command::SetImageStyle(style)).unwrap();

        let req = build_request(&upload(), canvas(), c.layers(), OutputFormat::Png).unwrap();
        let value = serde_json::to_value(&req.layers[1]).unwrap();
        assert_eq!(value["type"], "image");
        assert_eq!(value["dataUrl"], "data:image/png;base64,BB==");
        assert_eq!(value["filters"]["saturation"], 0.0);
        assert_eq!(value["filters"]["brightness"], 100.0);
    }

    #[test]
    fn z_order_follows_stack_position() {
        let mut c = compositor_with_text("bottom");
        c.apply(Command::AddText { text: Some("top".into()) }).unwrap();
        let req = build_request(&upload(), canvas(), c.layers(), OutputFormat::Png).unwrap();
        let v0 = serde_json::to_value(&req.layers[0]).unwrap();
        let v1 = serde_json::to_value(&req.layers[1]).unwrap();
        assert_eq!(v0["z"], 100);
        assert_eq!(v1["z"], 101);
    }

    #[test]
    fn placeholder_text_is_skipped() {
        let mut c = Compositor::with_default_measurer(canvas());
        c.apply(Command::AddText { text: None }).unwrap();
        let err = build_request(&upload(), canvas(), c.layers(), OutputFormat::Png).unwrap_err();
        assert!(err.to_string().contains("every text layer is empty"));
    }

    #[test]
    fn export_requires_probed_dimensions() {
        let c = compositor_with_text("MARK");
        let mut up = upload();
        up.natural = None;
        let err = build_request(&up, canvas(), c.layers(), OutputFormat::Png).unwrap_err();
        assert!(err.to_string().contains("natural dimensions"));
    }

    #[test]
    fn jpeg_extension_differs_from_wire_name() {
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::Jpeg.wire_name(), "jpeg");
        assert_eq!(OutputFormat::Png.extension(), "png");
    }
}
