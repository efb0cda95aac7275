use serde::Deserialize;

/// Minimum on-screen layer size enforced during resize, in CSS pixels.
pub const MIN_LAYER_WIDTH: f32 = 60.0;
pub const MIN_LAYER_HEIGHT: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    #[serde(rename = "width")]
    pub w: f32,
    #[serde(rename = "height")]
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }
}

/// On-screen placement of a layer: the authored box plus the drag translation
/// accumulated on top of it. Kept separate so drags never rewrite the box
/// origin, mirroring how the canvas editor tracks them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerGeometry {
    pub origin: Vec2,
    pub size: Vec2,
    pub translation: Vec2,
}

impl LayerGeometry {
    pub fn new(origin: Vec2, size: Vec2) -> Self {
        Self {
            origin,
            size,
            translation: Vec2::default(),
        }
    }

    /// A box of the given size centered in the canvas.
    pub fn centered_in(canvas: Rect, width: f32, height: f32) -> Self {
        Self::new(
            Vec2 {
                x: canvas.x + (canvas.w - width) * 0.5,
                y: canvas.y + (canvas.h - height) * 0.5,
            },
            Vec2 {
                x: width,
                y: height,
            },
        )
    }

    /// Effective on-screen rectangle (origin + translation).
    pub fn screen_rect(&self) -> Rect {
        Rect {
            x: self.origin.x + self.translation.x,
            y: self.origin.y + self.translation.y,
            w: self.size.x,
            h: self.size.y,
        }
    }

    /// Apply a drag delta, clipped so the layer stays inside the canvas.
    pub fn drag_within(&mut self, dx: f32, dy: f32, canvas: Rect) {
        self.translation.x += dx;
        self.translation.y += dy;
        self.clamp_translation(canvas);
    }

    /// Apply a resize delta from one of the eight grab handles. The minimum
    /// size is enforced and the resulting rect is clipped to the canvas.
    pub fn resize_within(&mut self, handle: ResizeHandle, dx: f32, dy: f32, canvas: Rect) {
        let rect = self.screen_rect();
        let (mut left, mut top) = (rect.x, rect.y);
        let (mut right, mut bottom) = (rect.right(), rect.bottom());

        // A canvas smaller than the minimum box would invert the bounds.
        if handle.moves_left_edge() {
            let hi = right - MIN_LAYER_WIDTH;
            left = (left + dx).clamp(canvas.x.min(hi), hi.max(canvas.x));
        }
        if handle.moves_right_edge() {
            let lo = left + MIN_LAYER_WIDTH;
            right = (right + dx).clamp(lo, canvas.right().max(lo));
        }
        if handle.moves_top_edge() {
            let hi = bottom - MIN_LAYER_HEIGHT;
            top = (top + dy).clamp(canvas.y.min(hi), hi.max(canvas.y));
        }
        if handle.moves_bottom_edge() {
            let lo = top + MIN_LAYER_HEIGHT;
            bottom = (bottom + dy).clamp(lo, canvas.bottom().max(lo));
        }

        self.size = Vec2 {
            x: right - left,
            y: bottom - top,
        };
        self.origin = Vec2 {
            x: left - self.translation.x,
            y: top - self.translation.y,
        };
    }

    fn clamp_translation(&mut self, canvas: Rect) {
        let min_x = canvas.x - self.origin.x;
        let max_x = canvas.right() - self.size.x - self.origin.x;
        let min_y = canvas.y - self.origin.y;
        let max_y = canvas.bottom() - self.size.y - self.origin.y;
        // A layer larger than the canvas pins to the top-left edge.
        self.translation.x = self.translation.x.clamp(min_x, max_x.max(min_x));
        self.translation.y = self.translation.y.clamp(min_y, max_y.max(min_y));
    }
}

/// The eight resize handles: four corners plus four edge midpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeHandle {
    TopLeft,
    Top,
    TopRight,
    Left,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl ResizeHandle {
    fn moves_left_edge(self) -> bool {
        matches!(self, Self::TopLeft | Self::Left | Self::BottomLeft)
    }

    fn moves_right_edge(self) -> bool {
        matches!(self, Self::TopRight | Self::Right | Self::BottomRight)
    }

    fn moves_top_edge(self) -> bool {
        matches!(self, Self::TopLeft | Self::Top | Self::TopRight)
    }

    fn moves_bottom_edge(self) -> bool {
        matches!(self, Self::BottomLeft | Self::Bottom | Self::BottomRight)
    }
}

/// A layer bounding box converted to the base image's natural pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NaturalRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Convert an on-screen rect to natural pixels: scale each axis by the ratio
/// of natural to displayed dimension, then round to integer pixels.
pub fn to_natural_pixels(layer: Rect, canvas: Rect, nat_w: u32, nat_h: u32) -> NaturalRect {
    let disp_w = if canvas.w > 0.0 { canvas.w } else { 1.0 };
    let disp_h = if canvas.h > 0.0 { canvas.h } else { 1.0 };
    let sx = nat_w as f32 / disp_w;
    let sy = nat_h as f32 / disp_h;
    NaturalRect {
        x: ((layer.x - canvas.x) * sx).round() as i32,
        y: ((layer.y - canvas.y) * sy).round() as i32,
        width: (layer.w * sx).round() as i32,
        height: (layer.h * sy).round() as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> Rect {
        Rect::new(0.0, 0.0, 600.0, 400.0)
    }

    #[test]
    fn drag_is_clipped_to_canvas() {
        let mut geom = LayerGeometry::centered_in(canvas(), 200.0, 40.0);
        geom.drag_within(10_000.0, 10_000.0, canvas());
        let rect = geom.screen_rect();
        assert_eq!(rect.right(), 600.0);
        assert_eq!(rect.bottom(), 400.0);

        geom.drag_within(-20_000.0, -20_000.0, canvas());
        let rect = geom.screen_rect();
        assert_eq!(rect.x, 0.0);
        assert_eq!(rect.y, 0.0);
    }

    #[test]
    fn resize_enforces_minimum_size() {
        let mut geom = LayerGeometry::centered_in(canvas(), 200.0, 120.0);
        geom.resize_within(ResizeHandle::BottomRight, -500.0, -500.0, canvas());
        assert_eq!(geom.size.x, MIN_LAYER_WIDTH);
        assert_eq!(geom.size.y, MIN_LAYER_HEIGHT);
    }

    #[test]
    fn resize_from_left_edge_keeps_right_edge_fixed() {
        let mut geom = LayerGeometry::centered_in(canvas(), 200.0, 120.0);
        let before = geom.screen_rect();
        geom.resize_within(ResizeHandle::Left, -50.0, 0.0, canvas());
        let after = geom.screen_rect();
        assert_eq!(after.right(), before.right());
        assert_eq!(after.w, before.w + 50.0);
        assert_eq!(after.h, before.h);
    }

    #[test]
    fn resize_is_clipped_to_canvas() {
        let mut geom = LayerGeometry::centered_in(canvas(), 200.0, 120.0);
        geom.resize_within(ResizeHandle::BottomRight, 5_000.0, 5_000.0, canvas());
        let rect = geom.screen_rect();
        assert!(rect.right() <= 600.0);
        assert!(rect.bottom() <= 400.0);
    }

    #[test]
    fn resize_survives_a_canvas_smaller_than_the_minimum_box() {
        let tiny = Rect::new(0.0, 0.0, 40.0, 20.0);
        let mut geom = LayerGeometry::centered_in(tiny, 60.0, 30.0);
        for handle in [
            ResizeHandle::TopLeft,
            ResizeHandle::Top,
            ResizeHandle::TopRight,
            ResizeHandle::Left,
            ResizeHandle::Right,
            ResizeHandle::BottomLeft,
            ResizeHandle::Bottom,
            ResizeHandle::BottomRight,
        ] {
            geom.resize_within(handle, -100.0, -100.0, tiny);
            geom.resize_within(handle, 100.0, 100.0, tiny);
        }
        let rect = geom.screen_rect();
        assert!(rect.w.is_finite() && rect.w > 0.0);
        assert!(rect.h.is_finite() && rect.h > 0.0);
    }

    #[test]
    fn natural_mapping_is_scale_consistent() {
        let layer = Rect::new(200.0, 180.0, 200.0, 40.0);
        let mapped = to_natural_pixels(layer, canvas(), 3000, 2000);
        assert_eq!(mapped.x, 1000);
        assert_eq!(mapped.y, 900);
        assert_eq!(mapped.width, 1000);
        assert_eq!(mapped.height, 200);
    }

    #[test]
    fn natural_mapping_rounds_to_integer_pixels() {
        let layer = Rect::new(10.3, 10.7, 33.3, 33.3);
        let mapped = to_natural_pixels(layer, Rect::new(0.0, 0.0, 100.0, 100.0), 300, 300);
        assert_eq!(mapped.x, 31);
        assert_eq!(mapped.y, 32);
        assert_eq!(mapped.width, 100);
        assert_eq!(mapped.height, 100);
    }
}
