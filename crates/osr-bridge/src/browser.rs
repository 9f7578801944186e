//! [`OffscreenBrowser`]: a windowless browser whose frames land in a caller
//! texture.
//!
//! The browser engine itself is an external collaborator reached through
//! [`BrowserHost`]. This type creates the browser with shared-texture
//! rendering turned on, installs a [`RenderBridge`] as its render handler and
//! detaches it again on dispose.

use std::sync::Arc;

use anyhow::{Context, Result};
use gpu_interop::DeviceContext;
use tracing::debug;

use crate::bridge::RenderBridge;
use crate::config::BridgeConfig;
use crate::error::BindError;
use crate::handler::RenderHandler;
use crate::notify::{FailureNotifier, LogNotifier};

/// Window parameters for a windowless browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub width: u32,
    pub height: u32,
    pub windowless_rendering: bool,
    /// Deliver frames as shared GPU textures instead of pixel buffers.
    pub shared_texture: bool,
}

impl WindowInfo {
    pub fn windowless(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            windowless_rendering: true,
            shared_texture: true,
        }
    }
}

/// Per-browser settings passed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSettings {
    pub default_encoding: String,
    pub windowless_frame_rate: u32,
}

impl From<&BridgeConfig> for BrowserSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            default_encoding: config.default_encoding.clone(),
            windowless_frame_rate: config.windowless_frame_rate,
        }
    }
}

/// The embedding browser engine.
pub trait BrowserHost: Send + Sync {
    /// Create a browser at `address` that renders through `handler`.
    fn create_browser(
        &self,
        address: &str,
        window: &WindowInfo,
        settings: &BrowserSettings,
        handler: Arc<dyn RenderHandler>,
    ) -> Result<()>;

    /// Stop invoking the render handler installed by `create_browser`.
    fn detach_render_handler(&self);
}

/// A windowless browser rendering into a caller-owned texture.
pub struct OffscreenBrowser<D: DeviceContext, H: BrowserHost> {
    host: H,
    bridge: Arc<RenderBridge<D>>,
    disposed: bool,
}

impl<D: DeviceContext, H: BrowserHost> OffscreenBrowser<D, H> {
    /// Create the browser with failures reported to the log.
    pub fn new(
        host: H,
        address: &str,
        width: u32,
        height: u32,
        config: BridgeConfig,
    ) -> Result<Self> {
        Self::with_notifier(host, address, width, height, config, LogNotifier)
    }

    pub fn with_notifier(
        host: H,
        address: &str,
        width: u32,
        height: u32,
        config: BridgeConfig,
        notifier: impl FailureNotifier + 'static,
    ) -> Result<Self> {
        let window = WindowInfo::windowless(width, height);
        let settings = BrowserSettings::from(&config);
        let bridge =
            Arc::new(RenderBridge::with_notifier(config, notifier)?.with_view_size(width, height));

        host.create_browser(address, &window, &settings, bridge.clone())
            .with_context(|| format!("failed to create offscreen browser for {address}"))?;
        debug!(address, width, height, "offscreen browser created");

        Ok(Self {
            host,
            bridge,
            disposed: false,
        })
    }

    /// (Re)bind the destination device and texture. See [`RenderBridge::bind`].
    pub fn bind(&self, device: D, texture: D::Texture) -> Result<(), BindError> {
        self.bridge.bind(device, texture)
    }

    pub fn bridge(&self) -> &Arc<RenderBridge<D>> {
        &self.bridge
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Detach the render handler from the host and release the bridge's GPU
    /// objects. The caller's device and texture stay alive. Also runs on drop.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.host.detach_render_handler();
        self.bridge.dispose();
        debug!("offscreen browser disposed");
    }
}

impl<D: DeviceContext, H: BrowserHost> Drop for OffscreenBrowser<D, H> {
    fn drop(&mut self) {
        self.dispose();
    }
}
