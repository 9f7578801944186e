//! D3D11 implementation (Windows shared handles).

pub mod context;
pub mod device;

pub use context::{Dx11Context, Dx11Fence, Dx11SourceDevice, Dx11Texture};
pub use device::{create_event_query, Dx11Device};
