use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::export::OutputFormat;
use crate::geometry::Rect;
use crate::intake;
use crate::schema::{ImageFilters, ImageStyle, TextStyle};

/// A batch watermark job: the base images, the layer stack to burn into
/// them, and the output settings. Loaded from YAML.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionDoc {
    #[serde(default = "default_canvas")]
    pub canvas: CanvasDoc,
    #[serde(default)]
    pub apply_to_all: bool,
    pub images: Vec<PathBuf>,
    #[serde(default)]
    pub font: Option<PathBuf>,
    #[serde(default = "default_output")]
    pub output: OutputDoc,
    pub layers: Vec<LayerDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CanvasDoc {
    pub width: f32,
    pub height: f32,
}

impl CanvasDoc {
    pub fn rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

fn default_canvas() -> CanvasDoc {
    CanvasDoc {
        width: 600.0,
        height: 400.0,
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputDoc {
    pub format: OutputFormat,
}

fn default_output() -> OutputDoc {
    OutputDoc {
        format: OutputFormat::Png,
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum LayerDoc {
    Text {
        text: String,
        #[serde(default, rename = "box")]
        placement: Option<Rect>,
        #[serde(default)]
        style: TextStyle,
    },
    Image {
        source: PathBuf,
        #[serde(default, rename = "box")]
        placement: Option<Rect>,
        #[serde(default)]
        style: ImageStyle,
        /// CSS-style shorthand, e.g. "grayscale(100%) blur(2px)". Overrides
        /// the structured filters in `style`.
        #[serde(default)]
        filter: Option<String>,
    },
}

pub fn load_and_validate_session(path: &Path) -> Result<SessionDoc> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read session document {}", path.display()))?;
    let mut doc: SessionDoc = serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )
    })?;

    validate_session(&mut doc, path)?;
    Ok(doc)
}

fn validate_session(doc: &mut SessionDoc, doc_path: &Path) -> Result<()> {
    if doc.canvas.width <= 0.0 || doc.canvas.height <= 0.0 {
        bail!(
            "canvas must have positive dimensions, got {}x{}",
            doc.canvas.width,
            doc.canvas.height
        );
    }
    if doc.images.is_empty() {
        bail!("session must list at least one base image");
    }
    if doc.layers.is_empty() {
        bail!("session must define at least one layer");
    }

    let doc_dir = doc_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    for image in &mut doc.images {
        *image = resolve_existing_file(&doc_dir, image, "base image")?;
        if !intake::is_allowed_extension(image) {
            bail!(
                "base image '{}' has an unsupported extension; allowed types are {}",
                image.display(),
                intake::ALLOWED_EXTENSIONS.join(", ")
            );
        }
    }

    if let Some(font) = &mut doc.font {
        *font = resolve_existing_file(&doc_dir, font, "font")?;
    }

    let canvas = doc.canvas.rect();
    for (index, layer) in doc.layers.iter_mut().enumerate() {
        match layer {
            LayerDoc::Text { text, placement, style } => {
                if text.trim().is_empty() {
                    bail!("text layer {} has no content", index + 1);
                }
                style
                    .validate()
                    .with_context(|| format!("failed validating text layer {}", index + 1))?;
                validate_placement(placement.as_ref(), canvas, index)?;
            }
            LayerDoc::Image { source, placement, style, filter } => {
                *source = resolve_existing_file(&doc_dir, source, "overlay image")?;
                if let Some(expression) = filter.take() {
                    style.filters = ImageFilters::parse_css(&expression);
                }
                style
                    .validate()
                    .with_context(|| format!("failed validating image layer {}", index + 1))?;
                validate_placement(placement.as_ref(), canvas, index)?;
            }
        }
    }

    Ok(())
}

fn validate_placement(placement: Option<&Rect>, canvas: Rect, index: usize) -> Result<()> {
    let Some(rect) = placement else {
        return Ok(());
    };
    if rect.w <= 0.0 || rect.h <= 0.0 {
        bail!("layer {} box must have positive dimensions", index + 1);
    }
    if rect.x < 0.0 || rect.y < 0.0 || rect.right() > canvas.w || rect.bottom() > canvas.h {
        bail!(
            "layer {} box ({}, {}, {}x{}) falls outside the {}x{} canvas",
            index + 1,
            rect.x,
            rect.y,
            rect.w,
            rect.h,
            canvas.w,
            canvas.h
        );
    }
    Ok(())
}

fn resolve_existing_file(doc_dir: &Path, path: &Path, field_name: &str) -> Result<PathBuf> {
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        doc_dir.join(path)
    };

    if !resolved.exists() {
        bail!("{} does not exist: {}", field_name, resolved.display());
    }
    if !resolved.is_file() {
        bail!("{} is not a file: {}", field_name, resolved.display());
    }
    Ok(resolved)
}
