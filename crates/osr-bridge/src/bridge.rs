//! [`RenderBridge`]: copies browser frames into the caller's texture.
//!
//! The browser host delivers each frame as a shared texture handle from its
//! render thread. The bridge opens it on a lazily created source device,
//! copies it into the bound destination texture on the destination device's
//! immediate context, and spins on an event fence until the GPU confirms the
//! copy before returning.
//!
//! Any GPU failure on that path trips a [`FailureLatch`]: the failure is
//! logged, reported once through the [`FailureNotifier`], and every later
//! frame is dropped until the next [`bind`](RenderBridge::bind).
//!
//! All binding state sits behind one mutex. A `bind` or `dispose` issued
//! while a frame is being copied waits for that copy to finish, so the
//! device, texture and fence are never swapped under an in-flight copy.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use gpu_interop::{wait_for_fence, DeviceContext, SharedTextureHandle, SharedTextureOpener};
use tracing::{debug, error, info, trace};

use crate::config::BridgeConfig;
use crate::error::{BindError, PaintError};
use crate::handler::{
    AcceleratedPaintInfo, PaintElementType, Rect, RenderHandler, ScreenInfo, ScreenPoint,
};
use crate::latch::{FailureLatch, RenderState};
use crate::notify::{FailureNotifier, LogNotifier};

/// Snapshot of bridge counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Frames copied and confirmed by the GPU.
    pub frames_copied: u64,
    /// Paint events dropped without GPU work (non-view kind, unbound,
    /// disabled or disposed).
    pub frames_ignored: u64,
    /// Paint events that failed on the GPU.
    pub failures: u64,
    /// Successful binds.
    pub binds: u64,
}

#[derive(Default)]
struct Counters {
    frames_copied: AtomicU64,
    frames_ignored: AtomicU64,
    failures: AtomicU64,
    binds: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Everything tied to one destination device. Replaced as a unit on bind.
struct Binding<D: DeviceContext> {
    device: D,
    texture: D::Texture,
    fence: D::Fence,
    /// Created on the first frame, reused until the next bind.
    source: Option<D::Opener>,
}

impl<D: DeviceContext> Binding<D> {
    /// Copy the shared texture behind `handle` into the destination texture
    /// and wait until the GPU has executed the copy.
    fn copy_frame(
        &mut self,
        handle: SharedTextureHandle,
        timeout: Option<Duration>,
    ) -> Result<u32, PaintError> {
        let source = match &mut self.source {
            Some(source) => source,
            slot @ None => {
                let source = self.device.create_opener().map_err(PaintError::SourceDevice)?;
                debug!("source device created");
                slot.insert(source)
            }
        };

        // The view lives until the copy is confirmed, then goes with the handle.
        let view = source
            .open_shared(handle)
            .map_err(PaintError::OpenSharedTexture)?;
        self.device
            .copy_resource(&view, &self.texture)
            .map_err(PaintError::Copy)?;
        self.device.end_fence(&self.fence);
        self.device.flush();

        wait_for_fence(&self.device, &self.fence, timeout).map_err(PaintError::Fence)
    }
}

struct BridgeState<D: DeviceContext> {
    binding: Option<Binding<D>>,
    disposed: bool,
}

// ---------------------------------------------------------------------------
// RenderBridge
// ---------------------------------------------------------------------------

/// Moves finished browser frames from the browser's device into a
/// caller-supplied texture on the caller's device.
pub struct RenderBridge<D: DeviceContext> {
    config: BridgeConfig,
    latch: FailureLatch,
    notifier: Box<dyn FailureNotifier>,
    state: Mutex<BridgeState<D>>,
    view_width: AtomicU32,
    view_height: AtomicU32,
    counters: Counters,
}

impl<D: DeviceContext> RenderBridge<D> {
    /// Create an unbound bridge that reports failures to the log.
    pub fn new(config: BridgeConfig) -> anyhow::Result<Self> {
        Self::with_notifier(config, LogNotifier)
    }

    /// Create an unbound bridge. Fails if `config` does not validate.
    pub fn with_notifier(
        config: BridgeConfig,
        notifier: impl FailureNotifier + 'static,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            latch: FailureLatch::new(),
            notifier: Box::new(notifier),
            state: Mutex::new(BridgeState {
                binding: None,
                disposed: false,
            }),
            view_width: AtomicU32::new(0),
            view_height: AtomicU32::new(0),
            counters: Counters::default(),
        })
    }

    /// Size reported by [`view_rect`](RenderHandler::view_rect) until the
    /// first bind.
    pub fn with_view_size(self, width: u32, height: u32) -> Self {
        self.set_view_size(width, height);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// (Re)bind to a destination device and texture.
    ///
    /// Creates a new fence on `device`, then drops the previous source device
    /// and fence, re-enables rendering and turns on the device's multithread
    /// protection (if configured and supported). The source device is created
    /// on the first frame after this call.
    ///
    /// If the fence cannot be created the previous binding and render state
    /// are left as they were and `device` is not touched.
    ///
    /// Waits for an in-flight paint to finish. Must be called before any
    /// frame can be ingested, and again whenever the device or the
    /// destination texture is recreated.
    pub fn bind(&self, device: D, texture: D::Texture) -> Result<(), BindError> {
        let mut state = self.lock_state();
        if state.disposed {
            return Err(BindError::Disposed);
        }

        let fence = device.create_fence().map_err(BindError::CreateFence)?;

        state.binding = None;
        self.latch.reset();

        let multithread_protected =
            self.config.multithread_protection && device.enable_multithread_protection();
        let (width, height) = device.texture_size(&texture);

        state.binding = Some(Binding {
            device,
            texture,
            fence,
            source: None,
        });
        self.set_view_size(width, height);
        Counters::bump(&self.counters.binds);
        info!(width, height, multithread_protected, "render bridge bound");
        Ok(())
    }

    /// Release the bridge's GPU objects and ignore every later callback.
    ///
    /// The caller's device and texture are only dereferenced, never
    /// destroyed. Idempotent.
    pub fn dispose(&self) {
        let mut state = self.lock_state();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.binding = None;
        debug!("render bridge disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.lock_state().disposed
    }

    pub fn is_bound(&self) -> bool {
        self.lock_state().binding.is_some()
    }

    pub fn rendering_enabled(&self) -> bool {
        self.latch.is_enabled()
    }

    pub fn render_state(&self) -> RenderState {
        self.latch.state()
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            frames_copied: self.counters.frames_copied.load(Ordering::Relaxed),
            frames_ignored: self.counters.frames_ignored.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            binds: self.counters.binds.load(Ordering::Relaxed),
        }
    }

    /// Ingest one accelerated frame. Never fails towards the caller.
    pub fn paint(&self, kind: PaintElementType, handle: SharedTextureHandle) {
        if kind != PaintElementType::View {
            trace!(?kind, "ignoring paint for non-view element");
            return self.ignore();
        }
        if !self.latch.is_enabled() {
            return self.ignore();
        }

        let mut state = self.lock_state();
        if state.disposed || !self.latch.is_enabled() {
            return self.ignore();
        }
        let Some(binding) = state.binding.as_mut() else {
            trace!("ignoring paint before first bind");
            return self.ignore();
        };

        match binding.copy_frame(handle, self.config.fence_timeout()) {
            Ok(polls) => {
                Counters::bump(&self.counters.frames_copied);
                trace!(?handle, polls, "frame copied");
            }
            Err(err) => {
                // Tripped under the lock so a bind queued behind this paint
                // re-enables rendering after it, not before.
                Counters::bump(&self.counters.failures);
                let tripped = self.latch.trip();
                drop(state);
                if tripped {
                    self.report(&err);
                }
            }
        }
    }

    fn report(&self, err: &PaintError) {
        error!(
            stage = err.stage(),
            "{err}; rendering disabled until the next bind"
        );
        self.notifier.notify(err);
    }

    fn ignore(&self) {
        Counters::bump(&self.counters.frames_ignored);
    }

    fn set_view_size(&self, width: u32, height: u32) {
        self.view_width.store(width, Ordering::Relaxed);
        self.view_height.store(height, Ordering::Relaxed);
    }

    fn lock_state(&self) -> MutexGuard<'_, BridgeState<D>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: DeviceContext> RenderHandler for RenderBridge<D> {
    fn view_rect(&self) -> Rect {
        let width = self.view_width.load(Ordering::Relaxed);
        let height = self.view_height.load(Ordering::Relaxed);
        Rect::new(
            0,
            0,
            i32::try_from(width).unwrap_or(i32::MAX),
            i32::try_from(height).unwrap_or(i32::MAX),
        )
    }

    fn screen_info(&self) -> Option<ScreenInfo> {
        Some(ScreenInfo {
            device_scale_factor: self.config.device_scale_factor,
        })
    }

    fn screen_point(&self, view_x: i32, view_y: i32) -> ScreenPoint {
        ScreenPoint {
            x: view_x,
            y: view_y,
            handled: false,
        }
    }

    fn on_accelerated_paint(
        &self,
        kind: PaintElementType,
        _dirty: Rect,
        info: &AcceleratedPaintInfo,
    ) {
        // Always a full-frame copy; the dirty rect is not used.
        self.paint(kind, info.shared_texture_handle);
    }
}
