//! Software device backend.
//!
//! A [`SoftGpu`] plays the role of a physical adapter: textures shared on it
//! are addressable by [`SharedTextureHandle`] from any [`SoftDevice`] created
//! on it. Copies are recorded on the device and executed at
//! [`flush`](DeviceContext::flush); fences signal a configurable number of
//! polls after the flush that submitted them. Every GPU stage can be made to
//! fail once through [`SoftGpu::inject_fault`].
//!
//! Used for headless hosts and for exercising bridge logic without a GPU.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::{DeviceContext, SharedHandleKind, SharedTextureHandle, SharedTextureOpener};

/// First handle value handed out by [`SoftGpu::share`]. Kernel handles are
/// multiples of four, so are ours.
const FIRST_HANDLE: usize = 0x100;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A GPU stage that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoftFault {
    CreateOpener,
    CreateFence,
    OpenShared,
    Copy,
    PollFence,
}

/// Observable GPU traffic on one [`SoftGpu`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SoftCounters {
    pub openers_created: u64,
    pub fences_created: u64,
    pub shared_opened: u64,
    pub copies_executed: u64,
    pub flushes: u64,
}

/// A CPU texture. Clones share storage, the way COM references do.
#[derive(Clone)]
pub struct SoftTexture {
    width: u32,
    height: u32,
    pixels: Arc<Mutex<Vec<u32>>>,
}

impl SoftTexture {
    /// Create a texture cleared to zero.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0)
    }

    /// Create a texture with every pixel set to `color`.
    pub fn filled(width: u32, height: u32, color: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: Arc::new(Mutex::new(vec![color; len])),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fill(&self, color: u32) {
        lock(&self.pixels).fill(color);
    }

    /// Snapshot of the pixel data.
    pub fn pixels(&self) -> Vec<u32> {
        lock(&self.pixels).clone()
    }

    /// Whether two textures refer to the same storage.
    pub fn same_storage(&self, other: &SoftTexture) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }

    fn copy_from(&self, src: &SoftTexture) {
        if self.same_storage(src) {
            return;
        }
        let data = src.pixels();
        lock(&self.pixels).copy_from_slice(&data);
    }
}

impl std::fmt::Debug for SoftTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftTexture")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// SoftGpu
// ---------------------------------------------------------------------------

struct SharedSurface {
    texture: SoftTexture,
    kind: SharedHandleKind,
}

struct AdapterState {
    next_handle: usize,
    next_device: u64,
    shared: HashMap<usize, SharedSurface>,
    faults: Vec<SoftFault>,
    counters: SoftCounters,
}

/// A software adapter. Clones refer to the same adapter.
#[derive(Clone)]
pub struct SoftGpu {
    inner: Arc<Mutex<AdapterState>>,
}

impl Default for SoftGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftGpu {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(AdapterState {
                next_handle: FIRST_HANDLE,
                next_device: 1,
                shared: HashMap::new(),
                faults: Vec::new(),
                counters: SoftCounters::default(),
            })),
        }
    }

    /// Create a device on this adapter.
    pub fn create_device(&self) -> SoftDevice {
        let id = {
            let mut state = lock(&self.inner);
            let id = state.next_device;
            state.next_device += 1;
            id
        };
        debug!(device = id, "soft device created");
        SoftDevice {
            gpu: self.clone(),
            id,
            state: Arc::new(Mutex::new(DeviceState {
                multithread_protected: false,
                fence_latency: 0,
                pending: Vec::new(),
            })),
        }
    }

    /// Share `texture` and return an NT handle to it.
    pub fn share(&self, texture: &SoftTexture) -> SharedTextureHandle {
        self.share_as(texture, SharedHandleKind::Nt)
    }

    /// Share `texture` and return a handle of the given kind.
    pub fn share_as(&self, texture: &SoftTexture, kind: SharedHandleKind) -> SharedTextureHandle {
        let mut state = lock(&self.inner);
        let raw = state.next_handle;
        state.next_handle += 4;
        state.shared.insert(
            raw,
            SharedSurface {
                texture: texture.clone(),
                kind,
            },
        );
        SharedTextureHandle::new(raw, kind)
    }

    /// Close a shared handle. Opening it afterwards fails.
    pub fn release(&self, handle: SharedTextureHandle) {
        lock(&self.inner).shared.remove(&handle.raw());
    }

    /// Make the next operation of the given stage fail.
    pub fn inject_fault(&self, fault: SoftFault) {
        lock(&self.inner).faults.push(fault);
    }

    pub fn counters(&self) -> SoftCounters {
        lock(&self.inner).counters
    }

    /// Consume a pending fault for `stage`, if any.
    fn take_fault(&self, stage: SoftFault) -> Result<()> {
        let mut state = lock(&self.inner);
        if let Some(pos) = state.faults.iter().position(|f| *f == stage) {
            state.faults.remove(pos);
            bail!("injected {stage:?} fault");
        }
        Ok(())
    }

    fn count(&self, f: impl FnOnce(&mut SoftCounters)) {
        f(&mut lock(&self.inner).counters);
    }
}

// ---------------------------------------------------------------------------
// SoftSourceDevice
// ---------------------------------------------------------------------------

/// Source device on a [`SoftGpu`], opens shared surfaces by handle.
pub struct SoftSourceDevice {
    gpu: SoftGpu,
}

impl SharedTextureOpener for SoftSourceDevice {
    type View = SoftTexture;

    fn open_shared(&self, handle: SharedTextureHandle) -> Result<SoftTexture> {
        self.gpu.take_fault(SoftFault::OpenShared)?;
        if handle.is_null() {
            bail!("cannot open null shared handle");
        }
        let mut state = lock(&self.gpu.inner);
        let texture = match state.shared.get(&handle.raw()) {
            Some(surface) if surface.kind == handle.kind() => surface.texture.clone(),
            Some(surface) => bail!(
                "{handle:?} refers to a {:?} handle, cannot open as {:?}",
                surface.kind,
                handle.kind()
            ),
            None => bail!("{handle:?} is not a valid shared handle"),
        };
        state.counters.shared_opened += 1;
        Ok(texture)
    }
}

// ---------------------------------------------------------------------------
// SoftDevice
// ---------------------------------------------------------------------------

enum Command {
    Copy { src: SoftTexture, dst: SoftTexture },
    EndFence(Arc<Mutex<FenceState>>),
}

struct DeviceState {
    multithread_protected: bool,
    fence_latency: u32,
    pending: Vec<Command>,
}

#[derive(Default)]
struct FenceState {
    submitted: bool,
    remaining_polls: u32,
}

/// Event fence on a [`SoftDevice`].
pub struct SoftFence {
    device: u64,
    state: Arc<Mutex<FenceState>>,
}

/// A software device with a deferred immediate context. Clones refer to the
/// same device.
#[derive(Clone)]
pub struct SoftDevice {
    gpu: SoftGpu,
    id: u64,
    state: Arc<Mutex<DeviceState>>,
}

impl SoftDevice {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn gpu(&self) -> &SoftGpu {
        &self.gpu
    }

    /// Number of polls a submitted fence reports unsignaled before it signals.
    pub fn set_fence_latency(&self, polls: u32) {
        lock(&self.state).fence_latency = polls;
    }

    pub fn is_multithread_protected(&self) -> bool {
        lock(&self.state).multithread_protected
    }

    /// Commands recorded but not yet flushed.
    pub fn pending_commands(&self) -> usize {
        lock(&self.state).pending.len()
    }
}

impl DeviceContext for SoftDevice {
    type Texture = SoftTexture;
    type Fence = SoftFence;
    type Opener = SoftSourceDevice;

    fn create_opener(&self) -> Result<SoftSourceDevice> {
        self.gpu.take_fault(SoftFault::CreateOpener)?;
        self.gpu.count(|c| c.openers_created += 1);
        debug!(device = self.id, "soft source device created");
        Ok(SoftSourceDevice {
            gpu: self.gpu.clone(),
        })
    }

    fn create_fence(&self) -> Result<SoftFence> {
        self.gpu.take_fault(SoftFault::CreateFence)?;
        self.gpu.count(|c| c.fences_created += 1);
        Ok(SoftFence {
            device: self.id,
            state: Arc::new(Mutex::new(FenceState::default())),
        })
    }

    fn enable_multithread_protection(&self) -> bool {
        lock(&self.state).multithread_protected = true;
        true
    }

    fn texture_size(&self, texture: &SoftTexture) -> (u32, u32) {
        (texture.width, texture.height)
    }

    fn copy_resource(&self, src: &SoftTexture, dst: &SoftTexture) -> Result<()> {
        self.gpu.take_fault(SoftFault::Copy)?;
        if (src.width, src.height) != (dst.width, dst.height) {
            bail!(
                "copy size mismatch: source {}x{}, destination {}x{}",
                src.width,
                src.height,
                dst.width,
                dst.height
            );
        }
        lock(&self.state).pending.push(Command::Copy {
            src: src.clone(),
            dst: dst.clone(),
        });
        Ok(())
    }

    fn end_fence(&self, fence: &SoftFence) {
        if fence.device != self.id {
            warn!(
                fence_device = fence.device,
                device = self.id,
                "fence ended on a foreign device, ignored"
            );
            return;
        }
        *lock(&fence.state) = FenceState::default();
        lock(&self.state)
            .pending
            .push(Command::EndFence(fence.state.clone()));
    }

    fn flush(&self) {
        let (commands, latency) = {
            let mut state = lock(&self.state);
            (std::mem::take(&mut state.pending), state.fence_latency)
        };
        let mut copies = 0;
        for command in commands {
            match command {
                Command::Copy { src, dst } => {
                    dst.copy_from(&src);
                    copies += 1;
                }
                Command::EndFence(fence) => {
                    let mut fence = lock(&fence);
                    fence.submitted = true;
                    fence.remaining_polls = latency;
                }
            }
        }
        self.gpu.count(|c| {
            c.flushes += 1;
            c.copies_executed += copies;
        });
    }

    fn poll_fence(&self, fence: &SoftFence) -> Result<bool> {
        self.gpu.take_fault(SoftFault::PollFence)?;
        if fence.device != self.id {
            bail!(
                "fence belongs to device {}, polled on device {}",
                fence.device,
                self.id
            );
        }
        let mut fence = lock(&fence.state);
        if !fence.submitted {
            return Ok(false);
        }
        if fence.remaining_polls > 0 {
            fence.remaining_polls -= 1;
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_executes_at_flush() {
        let gpu = SoftGpu::new();
        let device = gpu.create_device();
        let src = SoftTexture::filled(4, 4, 0xff00ff00);
        let dst = SoftTexture::new(4, 4);
        let handle = gpu.share(&src);

        let opener = device.create_opener().unwrap();
        let view = opener.open_shared(handle).unwrap();
        device.copy_resource(&view, &dst).unwrap();
        assert_eq!(dst.pixels(), vec![0; 16]);
        assert_eq!(device.pending_commands(), 1);

        device.flush();
        assert_eq!(dst.pixels(), vec![0xff00ff00; 16]);
        assert_eq!(gpu.counters().copies_executed, 1);
    }

    #[test]
    fn devices_share_their_adapter() {
        let gpu = SoftGpu::new();
        let a = gpu.create_device();
        let b = gpu.create_device();
        assert_ne!(a.id(), b.id());

        // The browser keeps drawing into the same shared surface.
        let surface = SoftTexture::new(2, 2);
        let handle = a.gpu().share(&surface);
        let view = b.create_opener().unwrap().open_shared(handle).unwrap();
        let dst = SoftTexture::new(2, 2);

        surface.fill(7);
        b.copy_resource(&view, &dst).unwrap();
        b.flush();
        assert_eq!(dst.pixels(), vec![7; 4]);

        surface.fill(9);
        b.copy_resource(&view, &dst).unwrap();
        b.flush();
        assert_eq!(dst.pixels(), vec![9; 4]);
        assert_eq!(gpu.counters().shared_opened, 1);
    }

    #[test]
    fn released_and_unknown_handles_fail_to_open() {
        let gpu = SoftGpu::new();
        let opener = gpu.create_device().create_opener().unwrap();
        let handle = gpu.share(&SoftTexture::new(2, 2));
        gpu.release(handle);

        assert!(opener.open_shared(handle).is_err());
        assert!(opener.open_shared(SharedTextureHandle::nt(0)).is_err());
        assert!(opener.open_shared(SharedTextureHandle::nt(0xdead0)).is_err());
    }

    #[test]
    fn handle_kind_must_match() {
        let gpu = SoftGpu::new();
        let opener = gpu.create_device().create_opener().unwrap();
        let handle = gpu.share_as(&SoftTexture::new(2, 2), SharedHandleKind::Legacy);

        assert!(opener.open_shared(handle).is_ok());
        assert!(opener
            .open_shared(SharedTextureHandle::nt(handle.raw()))
            .is_err());
    }

    #[test]
    fn copy_rejects_size_mismatch() {
        let gpu = SoftGpu::new();
        let device = gpu.create_device();
        let err = device
            .copy_resource(&SoftTexture::new(2, 2), &SoftTexture::new(4, 4))
            .unwrap_err();
        assert!(err.to_string().contains("size mismatch"));
    }

    #[test]
    fn faults_are_one_shot() {
        let gpu = SoftGpu::new();
        let device = gpu.create_device();
        gpu.inject_fault(SoftFault::CreateFence);

        assert!(device.create_fence().is_err());
        assert!(device.create_fence().is_ok());
        assert_eq!(gpu.counters().fences_created, 1);
    }

    #[test]
    fn fence_from_another_device_is_rejected() {
        let gpu = SoftGpu::new();
        let a = gpu.create_device();
        let b = gpu.create_device();
        let fence = a.create_fence().unwrap();

        b.end_fence(&fence);
        assert_eq!(b.pending_commands(), 0);
        assert!(b.poll_fence(&fence).is_err());
    }

    #[test]
    fn fence_signals_only_after_submission() {
        let gpu = SoftGpu::new();
        let device = gpu.create_device();
        device.set_fence_latency(1);
        let fence = device.create_fence().unwrap();

        assert!(!device.poll_fence(&fence).unwrap());
        device.end_fence(&fence);
        assert!(!device.poll_fence(&fence).unwrap());
        device.flush();
        assert!(!device.poll_fence(&fence).unwrap());
        assert!(device.poll_fence(&fence).unwrap());
    }
}
