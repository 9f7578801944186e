//! Standalone D3D11 device.
//!
//! Holds a D3D11 device and its immediate context for hosts that do not
//! bring their own. Most embedders already have a compositor device and wrap
//! it directly with [`Dx11Context::new`](super::Dx11Context::new).

use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use tracing::{debug, error};

use super::{Dx11Context, Dx11Texture};

/// A D3D11 device with an immediate context.
///
/// Created via [`Dx11Device::new()`] which tries hardware acceleration first
/// and falls back to WARP. The device is created without
/// `D3D11_CREATE_DEVICE_SINGLETHREADED` so that multithread protection can be
/// turned on when it is bound to a bridge.
pub struct Dx11Device {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
}

impl Dx11Device {
    /// Create a new D3D11 device using hardware acceleration, falling back to
    /// WARP if hardware is unavailable (e.g. CI/headless environments).
    ///
    /// Returns `None` if D3D11 is unavailable with any driver type.
    pub fn new() -> Option<Self> {
        let mut device = None;
        let mut context = None;

        // Try HARDWARE first, fall back to WARP for CI/headless
        let driver_types = [D3D_DRIVER_TYPE_HARDWARE, D3D_DRIVER_TYPE_WARP];
        let mut created = false;

        for &driver_type in &driver_types {
            let hr = unsafe {
                D3D11CreateDevice(
                    None,
                    driver_type,
                    HMODULE::default(),
                    D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                    Some(&[D3D_FEATURE_LEVEL_11_0]),
                    D3D11_SDK_VERSION,
                    Some(&mut device as *mut _),
                    None,
                    Some(&mut context as *mut _),
                )
            };
            if hr.is_ok() {
                debug!("D3D11 device created with driver type {:?}", driver_type);
                created = true;
                break;
            }
        }

        if !created {
            error!("Failed to create D3D11 device with any driver type");
            return None;
        }

        Some(Self {
            device: device?,
            context: context?,
        })
    }

    /// Borrow the underlying `ID3D11Device`.
    pub fn device(&self) -> &ID3D11Device {
        &self.device
    }

    /// Borrow the immediate device context.
    pub fn context(&self) -> &ID3D11DeviceContext {
        &self.context
    }

    /// A bridge-facing handle to this device (cloned COM references).
    pub fn device_context(&self) -> Dx11Context {
        Dx11Context::from_parts(self.device.clone(), self.context.clone())
    }

    /// Create a BGRA render target texture.
    ///
    /// With `shared` the texture is created with `D3D11_RESOURCE_MISC_SHARED`
    /// so a legacy shared handle can be obtained through `IDXGIResource`.
    pub fn create_texture(&self, width: u32, height: u32, shared: bool) -> Option<Dx11Texture> {
        let desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: (D3D11_BIND_SHADER_RESOURCE.0 | D3D11_BIND_RENDER_TARGET.0) as u32,
            CPUAccessFlags: 0,
            MiscFlags: if shared {
                D3D11_RESOURCE_MISC_SHARED.0 as u32
            } else {
                0
            },
        };

        let mut texture = None;
        unsafe {
            self.device
                .CreateTexture2D(&desc, None, Some(&mut texture as *mut _))
        }
        .ok()?;
        texture.map(Dx11Texture::new)
    }
}

/// Create a `D3D11_QUERY_EVENT` for GPU synchronization.
pub fn create_event_query(device: &ID3D11Device) -> Option<ID3D11Query> {
    let desc = D3D11_QUERY_DESC {
        Query: D3D11_QUERY_EVENT,
        ..Default::default()
    };
    let mut query = None;
    unsafe { device.CreateQuery(&desc, Some(&mut query as *mut _)) }.ok()?;
    query
}
