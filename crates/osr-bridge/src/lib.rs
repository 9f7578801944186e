//! Rendering bridge for an embedded offscreen browser.
//!
//! The browser renders on its own GPU device and hands each finished frame
//! over as a shared texture handle. This crate copies those frames,
//! GPU-synchronized, into a texture owned by the application's device.
//!
//! # Overview
//!
//! - [`RenderBridge`] owns the per-binding GPU objects and implements the
//!   paint path and the bind/rebind operation.
//! - [`RenderHandler`] is the browser host's callback contract; the bridge
//!   implements it.
//! - [`OffscreenBrowser`] creates a windowless browser through a
//!   [`BrowserHost`] and wires the bridge in as its render handler.
//! - [`FailureLatch`] and [`FailureNotifier`] turn GPU failures on the paint
//!   path into a sticky disabled state plus a single notification.
//! - [`BridgeConfig`] and [`logging::init`] cover configuration and tracing
//!   setup.
//!
//! The GPU side is abstracted by [`gpu_interop::DeviceContext`]; use
//! [`Dx11RenderBridge`] on Windows.

pub mod bridge;
pub mod browser;
pub mod config;
pub mod error;
pub mod handler;
pub mod latch;
pub mod logging;
pub mod notify;

// Re-export primary types at crate root for convenience.
pub use bridge::{BridgeStats, RenderBridge};
pub use browser::{BrowserHost, BrowserSettings, OffscreenBrowser, WindowInfo};
pub use config::BridgeConfig;
pub use error::{BindError, PaintError};
pub use handler::{
    AcceleratedPaintInfo, CursorType, DragOperations, PaintElementType, Range, Rect,
    RenderHandler, ScreenInfo, ScreenPoint, TextInputMode,
};
pub use latch::{FailureLatch, RenderState};
pub use notify::{FailureNotifier, LogNotifier};

pub use gpu_interop::{SharedHandleKind, SharedTextureHandle};

/// Render bridge over a caller-owned D3D11 device.
#[cfg(target_os = "windows")]
pub type Dx11RenderBridge = RenderBridge<gpu_interop::dx11::Dx11Context>;
