//! The browser host's render callback contract.
//!
//! The embedded browser drives a [`RenderHandler`] from its own threads. Only
//! the view geometry queries and [`on_accelerated_paint`] carry behavior in
//! this crate; the remaining callbacks default to no-ops.
//!
//! [`on_accelerated_paint`]: RenderHandler::on_accelerated_paint

use gpu_interop::SharedTextureHandle;

/// Which surface a paint event is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaintElementType {
    /// The main view.
    View,
    /// A popup widget (select dropdowns and similar).
    Popup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Character range of an IME composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Range {
    pub from: i32,
    pub to: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenInfo {
    pub device_scale_factor: f32,
}

/// Result of a view-to-screen point query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
    /// `false` tells the browser the mapping is not supported.
    pub handled: bool,
}

/// Frame delivered by the accelerated paint callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceleratedPaintInfo {
    /// Valid only for the duration of the callback.
    pub shared_texture_handle: SharedTextureHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorType {
    #[default]
    Pointer,
    Cross,
    Hand,
    IBeam,
    Wait,
    Help,
    Move,
    NotAllowed,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextInputMode {
    #[default]
    Default,
    None,
    Text,
    Tel,
    Url,
    Email,
    Numeric,
    Decimal,
    Search,
}

/// Allowed drag-and-drop operations, as a bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DragOperations(pub u32);

impl DragOperations {
    pub const NONE: Self = Self(0);
    pub const COPY: Self = Self(1);
    pub const LINK: Self = Self(2);
    pub const MOVE: Self = Self(16);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Callbacks the browser host invokes on its render handler.
pub trait RenderHandler: Send + Sync {
    /// Size of the view in pixels, queried before each frame is rendered.
    fn view_rect(&self) -> Rect;

    fn screen_info(&self) -> Option<ScreenInfo>;

    /// Map a view coordinate to screen coordinates.
    fn screen_point(&self, view_x: i32, view_y: i32) -> ScreenPoint;

    /// A GPU frame is ready in a shared texture.
    fn on_accelerated_paint(
        &self,
        kind: PaintElementType,
        dirty: Rect,
        info: &AcceleratedPaintInfo,
    );

    /// Software paint. Not used with shared textures.
    fn on_paint(
        &self,
        _kind: PaintElementType,
        _dirty: Rect,
        _buffer: &[u8],
        _width: u32,
        _height: u32,
    ) {
    }

    fn on_cursor_change(&self, _cursor: CursorType) {}

    fn on_ime_composition_range_changed(&self, _selected: Range, _character_bounds: &[Rect]) {}

    fn on_popup_show(&self, _show: bool) {}

    fn on_popup_size(&self, _rect: Rect) {}

    fn on_virtual_keyboard_requested(&self, _mode: TextInputMode) {}

    /// Return `true` to take over a drag operation.
    fn start_dragging(&self, _allowed: DragOperations, _x: i32, _y: i32) -> bool {
        false
    }

    fn update_drag_cursor(&self, _operation: DragOperations) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_mask_contains() {
        let mask = DragOperations(DragOperations::COPY.0 | DragOperations::MOVE.0);
        assert!(mask.contains(DragOperations::COPY));
        assert!(mask.contains(DragOperations::NONE));
        assert!(!mask.contains(DragOperations::LINK));
    }
}
