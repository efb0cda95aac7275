mod autofit;
mod client;
mod compositor;
mod document;
mod export;
mod geometry;
mod intake;
mod measure;
mod schema;
mod session;
mod style;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::client::{resolve_base_url, BackendClient};
use crate::compositor::Command as LayerCommand;
use crate::document::{load_and_validate_session, LayerDoc, SessionDoc};
use crate::export::build_request;
use crate::measure::{ApproxMeasurer, FontMeasurer, TextMeasurer};
use crate::compositor::LayerBody;
use crate::schema::LayerKind;
use crate::session::Session;
use crate::style::{resolve_image_style, resolve_text_style, RendererCaps, StrokeRendering};

#[derive(Debug, Parser)]
#[command(name = "stamp")]
#[command(about = "Stamp: headless, local-first watermark compositor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate a session document and print a summary.
    Check {
        session: PathBuf,
    },
    /// Print the assembled layer stack with resolved styles.
    Inspect {
        session: PathBuf,
    },
    /// Print the export request for one base image as JSON.
    Payload {
        session: PathBuf,
        /// Base image to build the payload for; defaults to the first.
        #[arg(long)]
        image: Option<String>,
    },
    /// Render every base image through the backend converter.
    Export {
        session: PathBuf,
        /// Directory the converted images are written into.
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        /// Backend base URL override.
        #[arg(long)]
        backend: Option<String>,
        /// Use the local development backend instead of the hosted one.
        #[arg(long)]
        local: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { session } => run_check(&session),
        Commands::Inspect { session } => run_inspect(&session),
        Commands::Payload { session, image } => run_payload(&session, image.as_deref()),
        Commands::Export {
            session,
            output,
            backend,
            local,
        } => run_export(&session, &output, backend.as_deref(), local),
    }
}

fn run_check(session_path: &Path) -> Result<()> {
    let doc = load_and_validate_session(session_path)?;

    println!(
        "OK: {} ({}x{} canvas, {} images, {} layers, {})",
        session_path.display(),
        doc.canvas.width,
        doc.canvas.height,
        doc.images.len(),
        doc.layers.len(),
        doc.output.format.wire_name()
    );
    Ok(())
}

fn run_inspect(session_path: &Path) -> Result<()> {
    let doc = load_and_validate_session(session_path)?;
    let session = assemble_session(&doc)?;

    let scope = if session.apply_all() {
        "shared across all images"
    } else {
        "scoped per image"
    };
    println!(
        "{}: {} images, layers {}",
        session_path.display(),
        session.uploads().len(),
        scope
    );

    let active = session.active_image().map(|u| u.filename.clone());
    for upload in session.uploads() {
        let dims = match upload.natural {
            Some((w, h)) => format!("{w}x{h}"),
            None => "unprobed".to_string(),
        };
        let marker = if active.as_deref() == Some(upload.filename.as_str()) {
            " [active]"
        } else {
            ""
        };
        println!("image {} ({dims}){marker}", upload.filename);
    }

    let selected = session.compositor.selected_id();
    for (index, layer) in session.compositor.layers().iter().enumerate() {
        let ordinal = index + 1;
        let rect = layer.geometry.screen_rect();
        let marker = if selected == Some(layer.id) { "*" } else { " " };
        let kind = match layer.kind() {
            LayerKind::Text => "text",
            LayerKind::Image => "image",
        };
        println!(
            "{marker}{ordinal}. [{kind}] {} at ({:.0},{:.0}) {:.0}x{:.0}",
            layer.label(ordinal),
            rect.x,
            rect.y,
            rect.w,
            rect.h
        );
        match &layer.body {
            LayerBody::Text { style, .. } => {
                let resolved = resolve_text_style(style, session.compositor.caps);
                let stroke = match resolved.stroke {
                    StrokeRendering::None => "none".to_string(),
                    StrokeRendering::Native { width_px, color } => {
                        format!("{width_px}px {}", color.to_hex())
                    }
                    StrokeRendering::ShadowRing { offsets, color } => {
                        format!("{} shadow copies {}", offsets.len(), color.to_hex())
                    }
                };
                println!(
                    "     {:.1}px {}, fill {}, opacity {:.2}, blend {}, stroke {}",
                    resolved.font_size,
                    resolved.font_family,
                    resolved.fill.to_hex(),
                    resolved.opacity,
                    resolved.blend,
                    stroke
                );
            }
            LayerBody::Image { data_url, style, .. } => {
                let resolved = resolve_image_style(style);
                let (mime, bytes) = intake::decode_data_url(data_url)?;
                let border = match &resolved.border_shadow {
                    Some(shadow) => format!(", border {shadow}"),
                    None => String::new(),
                };
                println!(
                    "     {mime}, {} bytes, opacity {:.2}, blend {}, filter {}{}",
                    bytes.len(),
                    resolved.opacity,
                    resolved.blend,
                    resolved.filter,
                    border
                );
            }
        }
    }
    Ok(())
}

fn run_payload(session_path: &Path, image: Option<&str>) -> Result<()> {
    let doc = load_and_validate_session(session_path)?;
    let format = doc.output.format;
    let mut session = assemble_session(&doc)?;

    if let Some(name) = image {
        session.set_active_image(name)?;
    }
    let upload = session
        .active_image()
        .context("session has no loadable base image")?;
    let request = build_request(
        upload,
        session.compositor.canvas(),
        session.compositor.layers(),
        format,
    )?;
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}

fn run_export(
    session_path: &Path,
    output_dir: &Path,
    backend: Option<&str>,
    local: bool,
) -> Result<()> {
    let doc = load_and_validate_session(session_path)?;
    let format = doc.output.format;
    let mut session = assemble_session(&doc)?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

    let base_url = resolve_base_url(backend, local)?;
    let client = BackendClient::new(base_url)?;
    eprintln!("exporting via {}", client.base_url());

    let names: Vec<String> = session
        .uploads()
        .iter()
        .map(|u| u.filename.clone())
        .collect();
    let total = names.len();
    let mut exported = 0;

    for (index, name) in names.iter().enumerate() {
        session.set_active_image(name)?;
        if session.compositor.layers().is_empty() {
            eprintln!("skipping '{name}': no layers apply to it");
            continue;
        }

        session.begin_export()?;
        let result = (|| -> Result<PathBuf> {
            let upload = session
                .active_image()
                .with_context(|| format!("upload '{name}' disappeared"))?;
            let request = build_request(
                upload,
                session.compositor.canvas(),
                session.compositor.layers(),
                format,
            )?;
            let fallback = format!("{}.{}", request.filename, format.extension());

            eprintln!("rendering {}/{}: {name}", index + 1, total);
            let file = client.export(&request)?;
            let out_path = output_dir.join(file.filename.as_deref().unwrap_or(&fallback));
            std::fs::write(&out_path, &file.bytes)
                .with_context(|| format!("failed to write {}", out_path.display()))?;
            Ok(out_path)
        })();
        session.finish_export();

        let out_path = result.with_context(|| format!("failed to export '{name}'"))?;
        println!("Wrote {}", out_path.display());
        exported += 1;
    }

    if exported == 0 {
        bail!("no images were exported");
    }
    Ok(())
}

/// Build an editing session from a validated document: load the base images,
/// then replay the document's layers onto the compositor.
fn assemble_session(doc: &SessionDoc) -> Result<Session> {
    let measurer: Box<dyn TextMeasurer> = match &doc.font {
        Some(path) => Box::new(FontMeasurer::from_file(path)?),
        None => Box::new(ApproxMeasurer),
    };
    let mut session = Session::new(doc.canvas.rect(), RendererCaps::default(), measurer);
    session.set_apply_all(doc.apply_to_all);

    let paths: Vec<&Path> = doc.images.iter().map(PathBuf::as_path).collect();
    session.accept_files(&paths)?;

    for layer in &doc.layers {
        match layer {
            LayerDoc::Text { text, placement, style } => {
                session
                    .compositor
                    .apply(LayerCommand::AddText { text: Some(text.clone()) })?;
                session
                    .compositor
                    .apply(LayerCommand::SetTextStyle(style.clone()))?;
                if let Some(rect) = placement {
                    session.compositor.apply(LayerCommand::Place(*rect))?;
                }
            }
            LayerDoc::Image { source, placement, style, .. } => {
                let overlay = intake::accept_file(source)?;
                session.compositor.apply(LayerCommand::AddImage {
                    filename: overlay.filename,
                    data_url: overlay.data_url,
                })?;
                session
                    .compositor
                    .apply(LayerCommand::SetImageStyle(style.clone()))?;
                if let Some(rect) = placement {
                    session.compositor.apply(LayerCommand::Place(*rect))?;
                }
            }
        }
    }

    Ok(session)
}
