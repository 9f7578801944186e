//! [`DeviceContext`] over a caller-owned D3D11 device.
//!
//! Shared textures are opened on a separate source device created on the
//! destination device's adapter, then copied on the destination's immediate
//! context and fenced with a `D3D11_QUERY_EVENT`.

use std::ffi::c_void;

use anyhow::{anyhow, Context as _, Result};
use tracing::{debug, warn};
use windows::core::Interface;
use windows::Win32::Foundation::{HANDLE, HMODULE};
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::{IDXGIAdapter, IDXGIDevice};

use super::device::create_event_query;
use crate::{DeviceContext, SharedHandleKind, SharedTextureHandle, SharedTextureOpener};

// ---------------------------------------------------------------------------
// Dx11Texture / Dx11Fence
// ---------------------------------------------------------------------------

/// Destination texture owned by the caller.
#[derive(Clone)]
pub struct Dx11Texture(ID3D11Texture2D);

// SAFETY: the texture is only touched from the bridge's paint path, under the
// bridge mutex, on a device with multithread protection enabled.
unsafe impl Send for Dx11Texture {}

impl Dx11Texture {
    pub fn new(texture: ID3D11Texture2D) -> Self {
        Self(texture)
    }

    pub fn raw(&self) -> &ID3D11Texture2D {
        &self.0
    }
}

/// Event query used as the copy-completion fence.
pub struct Dx11Fence(ID3D11Query);

// SAFETY: see `Dx11Texture`.
unsafe impl Send for Dx11Fence {}

// ---------------------------------------------------------------------------
// Dx11SourceDevice
// ---------------------------------------------------------------------------

/// Device used only to open shared resources.
pub struct Dx11SourceDevice {
    device: ID3D11Device1,
}

// SAFETY: the source device is owned by a single bridge binding and used from
// its paint path only.
unsafe impl Send for Dx11SourceDevice {}

impl Dx11SourceDevice {
    /// Create a source device on `adapter`, or on the default hardware adapter
    /// when `adapter` is `None`.
    fn create(adapter: Option<&IDXGIAdapter>) -> Result<Self> {
        // An explicit adapter requires D3D_DRIVER_TYPE_UNKNOWN.
        let driver_type = if adapter.is_some() {
            D3D_DRIVER_TYPE_UNKNOWN
        } else {
            D3D_DRIVER_TYPE_HARDWARE
        };

        let mut device: Option<ID3D11Device> = None;
        unsafe {
            D3D11CreateDevice(
                adapter,
                driver_type,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device as *mut _),
                None,
                None,
            )
        }
        .context("D3D11CreateDevice failed for source device")?;

        let device = device.ok_or_else(|| anyhow!("D3D11CreateDevice returned no device"))?;
        let device = device
            .cast::<ID3D11Device1>()
            .context("source device does not expose ID3D11Device1")?;
        Ok(Self { device })
    }
}

impl SharedTextureOpener for Dx11SourceDevice {
    type View = ID3D11Texture2D;

    fn open_shared(&self, handle: SharedTextureHandle) -> Result<ID3D11Texture2D> {
        if handle.is_null() {
            return Err(anyhow!("cannot open null shared handle"));
        }
        let raw = HANDLE(handle.raw() as *mut c_void);
        let texture = unsafe {
            match handle.kind() {
                SharedHandleKind::Nt => self.device.OpenSharedResource1::<ID3D11Texture2D>(raw),
                SharedHandleKind::Legacy => self.device.OpenSharedResource::<ID3D11Texture2D>(raw),
            }
        };
        texture.with_context(|| format!("failed to open {handle:?}"))
    }
}

// ---------------------------------------------------------------------------
// Dx11Context
// ---------------------------------------------------------------------------

/// A borrowed D3D11 device and its immediate context.
///
/// Holds cloned COM references; dropping it releases those references but
/// never destroys the caller's device.
#[derive(Clone)]
pub struct Dx11Context {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
}

// SAFETY: the bridge enables ID3D11Multithread protection on bind, which
// serializes immediate-context access between the browser's render thread and
// the application's thread.
unsafe impl Send for Dx11Context {}

impl Dx11Context {
    /// Wrap a caller-owned device, using its immediate context.
    pub fn new(device: &ID3D11Device) -> Result<Self> {
        let context = unsafe { device.GetImmediateContext() }
            .context("failed to get immediate context")?;
        Ok(Self::from_parts(device.clone(), context))
    }

    pub(crate) fn from_parts(device: ID3D11Device, context: ID3D11DeviceContext) -> Self {
        Self { device, context }
    }

    /// Borrow the underlying `ID3D11Device`.
    pub fn device(&self) -> &ID3D11Device {
        &self.device
    }

    /// Borrow the immediate context.
    pub fn context(&self) -> &ID3D11DeviceContext {
        &self.context
    }

    fn adapter(&self) -> Result<IDXGIAdapter> {
        let dxgi = self
            .device
            .cast::<IDXGIDevice>()
            .context("device does not expose IDXGIDevice")?;
        unsafe { dxgi.GetAdapter() }.context("IDXGIDevice::GetAdapter failed")
    }

    fn multithread(&self) -> Option<ID3D11Multithread> {
        self.context
            .cast::<ID3D11Multithread>()
            .or_else(|_| self.device.cast::<ID3D11Multithread>())
            .ok()
    }

    /// Attach the device-removed reason, if any, to a failed GPU call.
    fn device_error(&self, err: windows::core::Error, what: &str) -> anyhow::Error {
        match unsafe { self.device.GetDeviceRemovedReason() } {
            Err(reason) => anyhow!("{what}: {err} (device removed: {reason})"),
            Ok(()) => anyhow!("{what}: {err}"),
        }
    }
}

impl DeviceContext for Dx11Context {
    type Texture = Dx11Texture;
    type Fence = Dx11Fence;
    type Opener = Dx11SourceDevice;

    fn create_opener(&self) -> Result<Dx11SourceDevice> {
        match self.adapter() {
            Ok(adapter) => match Dx11SourceDevice::create(Some(&adapter)) {
                Ok(source) => {
                    debug!("D3D11 source device created on destination adapter");
                    return Ok(source);
                }
                Err(err) => warn!("source device on destination adapter failed: {err:#}"),
            },
            Err(err) => warn!("cannot resolve destination adapter: {err:#}"),
        }
        let source = Dx11SourceDevice::create(None)?;
        debug!("D3D11 source device created on default hardware adapter");
        Ok(source)
    }

    fn create_fence(&self) -> Result<Dx11Fence> {
        create_event_query(&self.device)
            .map(Dx11Fence)
            .ok_or_else(|| anyhow!("failed to create D3D11 event query"))
    }

    fn enable_multithread_protection(&self) -> bool {
        match self.multithread() {
            Some(mt) => {
                let previous = unsafe { mt.SetMultithreadProtected(true) };
                debug!(
                    previously_protected = previous.as_bool(),
                    "D3D11 multithread protection enabled"
                );
                true
            }
            None => false,
        }
    }

    fn texture_size(&self, texture: &Dx11Texture) -> (u32, u32) {
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.0.GetDesc(&mut desc) };
        (desc.Width, desc.Height)
    }

    fn copy_resource(&self, src: &ID3D11Texture2D, dst: &Dx11Texture) -> Result<()> {
        // CopyResource reports nothing; a removed device is the only failure
        // we can observe here.
        unsafe {
            self.context.CopyResource(&dst.0, src);
            self.device
                .GetDeviceRemovedReason()
                .map_err(|err| anyhow!("CopyResource on removed device: {err}"))
        }
    }

    fn end_fence(&self, fence: &Dx11Fence) {
        unsafe { self.context.End(&fence.0) };
    }

    fn flush(&self) {
        unsafe { self.context.Flush() };
    }

    fn poll_fence(&self, fence: &Dx11Fence) -> Result<bool> {
        // For D3D11_QUERY_EVENT, GetData writes a BOOL: TRUE when the GPU is done.
        // S_FALSE (not ready) maps to Ok(()) and leaves the buffer untouched,
        // so the zero-init stays 0.
        let mut done: u32 = 0;
        unsafe {
            self.context.GetData(
                &fence.0,
                Some(&mut done as *mut u32 as *mut c_void),
                std::mem::size_of::<u32>() as u32,
                D3D11_ASYNC_GETDATA_DONOTFLUSH.0 as u32,
            )
        }
        .map_err(|err| self.device_error(err, "GetData on event query failed"))?;
        Ok(done != 0)
    }
}
