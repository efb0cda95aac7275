use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Result};

use crate::compositor::{Compositor, Layer};
use crate::geometry::Rect;
use crate::intake::{self, UploadedImage};
use crate::measure::TextMeasurer;
use crate::style::RendererCaps;

/// One editing session: the uploaded base images, the compositor holding the
/// layer stack for the active image, and the parked stacks for every other
/// image when layers are scoped per image.
pub struct Session {
    uploads: Vec<UploadedImage>,
    active: Option<String>,
    apply_all: bool,
    parked_layers: HashMap<String, Vec<Layer>>,
    pub compositor: Compositor,
    export_in_flight: bool,
}

impl Session {
    pub fn new(canvas: Rect, caps: RendererCaps, measurer: Box<dyn TextMeasurer>) -> Self {
        Self {
            uploads: Vec::new(),
            active: None,
            apply_all: false,
            parked_layers: HashMap::new(),
            compositor: Compositor::new(canvas, caps, measurer),
            export_in_flight: false,
        }
    }

    pub fn uploads(&self) -> &[UploadedImage] {
        &self.uploads
    }

    pub fn active_image(&self) -> Option<&UploadedImage> {
        let name = self.active.as_deref()?;
        self.uploads.iter().find(|u| u.filename == name)
    }

    pub fn apply_all(&self) -> bool {
        self.apply_all
    }

    /// Load base images from disk, one at a time. Files that fail intake are
    /// reported and skipped; the rest still land in the session. The first
    /// accepted image becomes active if none is yet.
    pub fn accept_files(&mut self, paths: &[&Path]) -> Result<usize> {
        let mut accepted = 0;
        for path in paths {
            match intake::accept_file(path) {
                Ok(upload) => {
                    if self.uploads.iter().any(|u| u.filename == upload.filename) {
                        eprintln!("skipping duplicate upload '{}'", upload.filename);
                        continue;
                    }
                    let name = upload.filename.clone();
                    self.uploads.push(upload);
                    accepted += 1;
                    if self.active.is_none() {
                        self.set_active_image(&name)?;
                    }
                }
                Err(err) => eprintln!("skipping '{}': {err:#}", path.display()),
            }
        }
        if accepted == 0 && !paths.is_empty() {
            bail!("none of the {} given files could be loaded", paths.len());
        }
        Ok(accepted)
    }

    /// Switch the active base image. With per-image scope the current stack
    /// is parked under the outgoing image and the incoming image's stack is
    /// attached; with apply-all the single shared stack stays in place.
    pub fn set_active_image(&mut self, filename: &str) -> Result<()> {
        if !self.uploads.iter().any(|u| u.filename == filename) {
            bail!("no uploaded image named '{filename}'");
        }
        if self.active.as_deref() == Some(filename) {
            return Ok(());
        }

        if !self.apply_all {
            if let Some(outgoing) = self.active.take() {
                let parked = self.compositor.detach_layers();
                self.parked_layers.insert(outgoing, parked);
            }
            let incoming = self.parked_layers.remove(filename).unwrap_or_default();
            self.compositor.attach_layers(incoming);
        }
        self.active = Some(filename.to_string());
        Ok(())
    }

    /// Toggle between one shared stack and per-image stacks. Turning
    /// apply-all on discards every parked stack; the active image's layers
    /// become the shared set.
    pub fn set_apply_all(&mut self, apply_all: bool) {
        if self.apply_all == apply_all {
            return;
        }
        self.apply_all = apply_all;
        if apply_all {
            self.parked_layers.clear();
        }
    }

    /// Drop an uploaded image and its parked layers. Removing the active
    /// image activates the first remaining upload, or empties the canvas.
    pub fn remove_image(&mut self, filename: &str) -> Result<()> {
        let Some(index) = self.uploads.iter().position(|u| u.filename == filename) else {
            bail!("no uploaded image named '{filename}'");
        };
        self.uploads.remove(index);
        self.parked_layers.remove(filename);

        if self.active.as_deref() == Some(filename) {
            self.active = None;
            if !self.apply_all {
                self.compositor.detach_layers();
            }
            if let Some(next) = self.uploads.first().map(|u| u.filename.clone()) {
                self.set_active_image(&next)?;
            }
        }
        Ok(())
    }

    /// Claim the single export slot. A second export while one is running is
    /// rejected rather than queued.
    pub fn begin_export(&mut self) -> Result<()> {
        if self.export_in_flight {
            bail!("an export is already in progress");
        }
        self.export_in_flight = true;
        Ok(())
    }

    pub fn finish_export(&mut self) {
        self.export_in_flight = false;
    }
}
