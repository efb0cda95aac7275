use anyhow::{bail, Result};

use crate::autofit::{
    fit_text_to_box, overflow_ratio, prescale_for_family_swap, seed_font_size_for_lock, FIT_MAX,
    FIT_MAX_RESIZE, FIT_MIN, OVERFLOW_REFIT_RATIO,
};
use crate::geometry::{
    LayerGeometry, Rect, ResizeHandle, Vec2, MIN_LAYER_HEIGHT, MIN_LAYER_WIDTH,
};
use crate::measure::{ApproxMeasurer, TextMeasurer};
use crate::schema::{
    ImageStyle, LayerId, LayerKind, TextStyle, MAX_FONT_SIZE, MIN_FONT_SIZE, TEXT_PLACEHOLDER,
};
use crate::style::RendererCaps;

/// Default box for a freshly added text layer, in CSS pixels.
const NEW_TEXT_BOX: (f32, f32) = (200.0, 40.0);
/// Default box for a freshly added image layer.
const NEW_IMAGE_BOX: (f32, f32) = (200.0, 120.0);

#[derive(Debug, Clone)]
pub enum LayerBody {
    Text { text: String, style: TextStyle },
    Image { filename: String, data_url: String, style: ImageStyle },
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub id: LayerId,
    pub geometry: LayerGeometry,
    pub body: LayerBody,
}

impl Layer {
    pub fn kind(&self) -> LayerKind {
        match self.body {
            LayerBody::Text { .. } => LayerKind::Text,
            LayerBody::Image { .. } => LayerKind::Image,
        }
    }

    /// Label shown in the layer list: the first line of text content or the
    /// image filename, falling back to a numbered placeholder.
    pub fn label(&self, ordinal: usize) -> String {
        match &self.body {
            LayerBody::Text { text, .. } => {
                let first = text
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty() && *l != TEXT_PLACEHOLDER);
                match first {
                    Some(line) => line.to_string(),
                    None => format!("Text {ordinal}"),
                }
            }
            LayerBody::Image { filename, .. } => {
                if filename.is_empty() {
                    format!("Image {ordinal}")
                } else {
                    filename.clone()
                }
            }
        }
    }
}

/// A single edit applied to the layer stack. Selection-relative commands
/// (drag, resize, style edits) act on the selected layer and fail when
/// nothing is selected.
#[derive(Debug, Clone)]
pub enum Command {
    AddText { text: Option<String> },
    AddImage { filename: String, data_url: String },
    Select(LayerId),
    MoveUp,
    MoveDown,
    Remove,
    RemoveAll,
    Drag { dx: f32, dy: f32 },
    Resize { handle: ResizeHandle, dx: f32, dy: f32 },
    /// Place the selected layer at an explicit box, e.g. from a session
    /// document. The box is clipped to the canvas like any other edit.
    Place(Rect),
    SetText(String),
    SetFontFamily(String),
    SetFontSize(f32),
    SetLockToBox(bool),
    SetTextStyle(TextStyle),
    SetImageStyle(ImageStyle),
}

/// The layer stack for one base image plus the canvas it is edited against.
/// Layers are ordered bottom to top; index in the stack is the z-order.
pub struct Compositor {
    canvas: Rect,
    layers: Vec<Layer>,
    selected: Option<LayerId>,
    next_id: u32,
    pub caps: RendererCaps,
    measurer: Box<dyn TextMeasurer>,
}

impl Compositor {
    pub fn new(canvas: Rect, caps: RendererCaps, measurer: Box<dyn TextMeasurer>) -> Self {
        Self {
            canvas,
            layers: Vec::new(),
            selected: None,
            next_id: 1,
            caps,
            measurer,
        }
    }

    pub fn with_default_measurer(canvas: Rect) -> Self {
        Self::new(canvas, RendererCaps::default(), Box::new(ApproxMeasurer))
    }

    pub fn canvas(&self) -> Rect {
        self.canvas
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn selected_id(&self) -> Option<LayerId> {
        self.selected
    }

    pub fn selected_layer(&self) -> Option<&Layer> {
        let id = self.selected?;
        self.layers.iter().find(|l| l.id == id)
    }

    /// Detach the whole stack, e.g. when the active base image changes.
    /// Layer identity is preserved; a later attach brings the same layers
    /// back untouched.
    pub fn detach_layers(&mut self) -> Vec<Layer> {
        self.selected = None;
        std::mem::take(&mut self.layers)
    }

    pub fn attach_layers(&mut self, layers: Vec<Layer>) {
        self.layers = layers;
        self.selected = self.layers.last().map(|l| l.id);
        self.reconcile();
    }

    pub fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::AddText { text } => {
                let geometry =
                    LayerGeometry::centered_in(self.canvas, NEW_TEXT_BOX.0, NEW_TEXT_BOX.1);
                let body = LayerBody::Text {
                    text: text.unwrap_or_else(|| TEXT_PLACEHOLDER.to_string()),
                    style: TextStyle::default(),
                };
                let id = self.push_layer(geometry, body);
                self.fit_locked(id, FIT_MIN, FIT_MAX);
            }
            Command::AddImage { filename, data_url } => {
                let geometry =
                    LayerGeometry::centered_in(self.canvas, NEW_IMAGE_BOX.0, NEW_IMAGE_BOX.1);
                let body = LayerBody::Image {
                    filename,
                    data_url,
                    style: ImageStyle::default(),
                };
                self.push_layer(geometry, body);
            }
            Command::Select(id) => {
                if !self.layers.iter().any(|l| l.id == id) {
                    bail!("no layer with id {id}");
                }
                self.selected = Some(id);
            }
            Command::MoveUp => {
                let index = self.selected_index()?;
                if index + 1 < self.layers.len() {
                    self.layers.swap(index, index + 1);
                }
            }
            Command::MoveDown => {
                let index = self.selected_index()?;
                if index > 0 {
                    self.layers.swap(index, index - 1);
                }
            }
            Command::Remove => {
                let index = self.selected_index()?;
                self.layers.remove(index);
                // Reselect the adjacent layer: the one that slid into the
                // removed slot, else the new topmost.
                self.selected = self
                    .layers
                    .get(index)
                    .or_else(|| self.layers.last())
                    .map(|l| l.id);
            }
            Command::RemoveAll => {
                self.layers.clear();
                self.selected = None;
            }
            Command::Drag { dx, dy } => {
                let canvas = self.canvas;
                let index = self.selected_index()?;
                self.layers[index].geometry.drag_within(dx, dy, canvas);
            }
            Command::Place(rect) => {
                let index = self.selected_index()?;
                let size_x = rect.w.max(MIN_LAYER_WIDTH);
                let size_y = rect.h.max(MIN_LAYER_HEIGHT);
                self.layers[index].geometry = LayerGeometry::new(
                    Vec2 { x: rect.x, y: rect.y },
                    Vec2 { x: size_x, y: size_y },
                );
                let id = self.layers[index].id;
                self.fit_locked(id, FIT_MIN, FIT_MAX_RESIZE);
            }
            Command::Resize { handle, dx, dy } => {
                let canvas = self.canvas;
                let index = self.selected_index()?;
                self.layers[index]
                    .geometry
                    .resize_within(handle, dx, dy, canvas);
                let id = self.layers[index].id;
                // While resizing, locked text may grow well past the usual
                // cap so it can fill a large box.
                self.fit_locked(id, FIT_MIN, FIT_MAX_RESIZE);
            }
            Command::SetText(text) => {
                let index = self.selected_index()?;
                let id = self.layers[index].id;
                match &mut self.layers[index].body {
                    LayerBody::Text { text: slot, .. } => *slot = text,
                    LayerBody::Image { .. } => bail!("selected layer is not a text layer"),
                }
                self.fit_locked(id, FIT_MIN, FIT_MAX);
            }
            Command::SetFontFamily(family) => {
                self.swap_font_family(family)?;
            }
            Command::SetFontSize(size) => {
                let index = self.selected_index()?;
                match &mut self.layers[index].body {
                    LayerBody::Text { style, .. } => {
                        style.font_size = size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
                    }
                    LayerBody::Image { .. } => bail!("selected layer is not a text layer"),
                }
            }
            Command::SetLockToBox(lock) => {
                let index = self.selected_index()?;
                let id = self.layers[index].id;
                let box_h = self.layers[index].geometry.size.y;
                match &mut self.layers[index].body {
                    LayerBody::Text { style, .. } => {
                        style.lock_to_box = lock;
                        if lock {
                            style.font_size = seed_font_size_for_lock(
                                style.font_size,
                                box_h,
                                FIT_MIN,
                                FIT_MAX,
                            );
                        }
                    }
                    LayerBody::Image { .. } => bail!("selected layer is not a text layer"),
                }
                if lock {
                    self.fit_locked(id, FIT_MIN, FIT_MAX);
                }
            }
            Command::SetTextStyle(new_style) => {
                new_style.validate()?;
                let index = self.selected_index()?;
                let id = self.layers[index].id;
                match &mut self.layers[index].body {
                    LayerBody::Text { style, .. } => *style = new_style,
                    LayerBody::Image { .. } => bail!("selected layer is not a text layer"),
                }
                self.fit_locked(id, FIT_MIN, FIT_MAX);
            }
            Command::SetImageStyle(new_style) => {
                new_style.validate()?;
                let index = self.selected_index()?;
                match &mut self.layers[index].body {
                    LayerBody::Image { style, .. } => *style = new_style,
                    LayerBody::Text { .. } => bail!("selected layer is not an image layer"),
                }
            }
        }
        self.reconcile();
        Ok(())
    }

    /// Bring every layer back into a consistent state: geometry clipped to
    /// the canvas and locked text shrunk if it overflows its box. Runs after
    /// every command so no edit can leave the stack inconsistent.
    fn reconcile(&mut self) {
        for index in 0..self.layers.len() {
            let canvas = self.canvas;
            self.layers[index].geometry.drag_within(0.0, 0.0, canvas);

            let rect = self.layers[index].geometry.screen_rect();
            if let LayerBody::Text { text, style } = &mut self.layers[index].body {
                if style.lock_to_box {
                    let ratio = overflow_ratio(
                        self.measurer.as_ref(),
                        text,
                        style,
                        style.font_size,
                        rect.w,
                        rect.h,
                    );
                    if ratio > 1.0 {
                        style.font_size = fit_text_to_box(
                            self.measurer.as_ref(),
                            text,
                            style,
                            style.font_size,
                            rect.w,
                            rect.h,
                            MIN_FONT_SIZE,
                            style.font_size,
                        );
                    }
                }
            }
        }
    }

    /// Swap the selected text layer's font family, compensating the size so
    /// the text keeps its visual width, then refit only when the result
    /// overflows the box badly.
    fn swap_font_family(&mut self, family: String) -> Result<()> {
        let index = self.selected_index()?;
        let rect = self.layers[index].geometry.screen_rect();
        let LayerBody::Text { text, style } = &mut self.layers[index].body else {
            bail!("selected layer is not a text layer");
        };

        let old_style = style.clone();
        style.font_family = family;
        let text_copy = text.clone();
        style.font_size = prescale_for_family_swap(
            self.measurer.as_ref(),
            &text_copy,
            &old_style,
            style,
            old_style.font_size,
        );

        if style.lock_to_box {
            let ratio = overflow_ratio(
                self.measurer.as_ref(),
                &text_copy,
                style,
                style.font_size,
                rect.w,
                rect.h,
            );
            if ratio > OVERFLOW_REFIT_RATIO {
                style.font_size = fit_text_to_box(
                    self.measurer.as_ref(),
                    &text_copy,
                    style,
                    style.font_size,
                    rect.w,
                    rect.h,
                    FIT_MIN,
                    FIT_MAX,
                );
            }
        }
        Ok(())
    }

    fn fit_locked(&mut self, id: LayerId, min: f32, max: f32) {
        let Some(index) = self.layers.iter().position(|l| l.id == id) else {
            return;
        };
        let rect = self.layers[index].geometry.screen_rect();
        if let LayerBody::Text { text, style } = &mut self.layers[index].body {
            if style.lock_to_box {
                style.font_size = fit_text_to_box(
                    self.measurer.as_ref(),
                    text,
                    style,
                    style.font_size,
                    rect.w,
                    rect.h,
                    min,
                    max,
                );
            }
        }
    }

    fn push_layer(&mut self, geometry: LayerGeometry, body: LayerBody) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        self.layers.push(Layer { id, geometry, body });
        self.selected = Some(id);
        id
    }

    fn selected_index(&self) -> Result<usize> {
        let Some(id) = self.selected else {
            bail!("no layer selected");
        };
        match self.layers.iter().position(|l| l.id == id) {
            Some(index) => Ok(index),
            None => bail!("selected layer {id} no longer exists"),
        }
    }
}
