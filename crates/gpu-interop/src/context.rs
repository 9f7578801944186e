//! Common interface for cross-device texture copies.

use std::fmt;

use anyhow::Result;

/// How a [`SharedTextureHandle`] has to be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SharedHandleKind {
    /// NT handle (`CreateSharedHandle`), opened with `OpenSharedResource1`.
    #[default]
    Nt,
    /// Legacy KMT handle (`GetSharedHandle`), opened with `OpenSharedResource`.
    Legacy,
}

/// Opaque per-frame handle to GPU memory written by another device.
///
/// The handle is only borrowed for the duration of one paint event; nothing
/// in this crate keeps it past the call that received it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SharedTextureHandle {
    raw: usize,
    kind: SharedHandleKind,
}

impl SharedTextureHandle {
    pub const fn new(raw: usize, kind: SharedHandleKind) -> Self {
        Self { raw, kind }
    }

    /// NT handle, the kind delivered by current browser runtimes.
    pub const fn nt(raw: usize) -> Self {
        Self::new(raw, SharedHandleKind::Nt)
    }

    pub const fn legacy(raw: usize) -> Self {
        Self::new(raw, SharedHandleKind::Legacy)
    }

    pub fn raw(&self) -> usize {
        self.raw
    }

    pub fn kind(&self) -> SharedHandleKind {
        self.kind
    }

    /// A null handle can never be opened.
    pub fn is_null(&self) -> bool {
        self.raw == 0
    }
}

impl fmt::Debug for SharedTextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedTextureHandle({:#x}, {:?})", self.raw, self.kind)
    }
}

/// Opens shared resources by handle.
///
/// Implemented by the source device: a device created on the same adapter as
/// the destination, used for nothing but opening shared textures. The
/// returned view must not outlive the handle's validity.
pub trait SharedTextureOpener: Send {
    /// Texture view produced by [`open_shared`](Self::open_shared).
    type View;

    fn open_shared(&self, handle: SharedTextureHandle) -> Result<Self::View>;
}

/// A caller-owned destination device and its immediate context.
///
/// The implementation only borrows the device (reference counted for COM
/// backends); it never destroys it.
pub trait DeviceContext: Send + 'static {
    /// Destination texture type.
    type Texture: Send;
    /// GPU event fence bound to this device.
    type Fence: Send;
    /// Source device used to open shared resources.
    type Opener: SharedTextureOpener;

    /// Create a source device compatible with this device's adapter.
    fn create_opener(&self) -> Result<Self::Opener>;

    /// Create an event fence bound to this device.
    fn create_fence(&self) -> Result<Self::Fence>;

    /// Turn on the API's internal cross-thread serialization.
    ///
    /// Returns `false` if the device does not support it.
    fn enable_multithread_protection(&self) -> bool;

    /// Width and height of `texture` in pixels.
    fn texture_size(&self, texture: &Self::Texture) -> (u32, u32);

    /// Record a full copy of `src` into `dst` on the immediate context.
    fn copy_resource(
        &self,
        src: &<Self::Opener as SharedTextureOpener>::View,
        dst: &Self::Texture,
    ) -> Result<()>;

    /// Record the end marker of `fence` after previously recorded commands.
    fn end_fence(&self, fence: &Self::Fence);

    /// Submit recorded commands to the GPU.
    fn flush(&self);

    /// Non-blocking completion check. Must not flush the pipeline.
    fn poll_fence(&self, fence: &Self::Fence) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_constructors_set_kind() {
        assert_eq!(SharedTextureHandle::nt(5).kind(), SharedHandleKind::Nt);
        assert_eq!(
            SharedTextureHandle::legacy(5).kind(),
            SharedHandleKind::Legacy
        );
        assert!(SharedTextureHandle::nt(0).is_null());
        assert!(!SharedTextureHandle::nt(0x40).is_null());
    }

    #[test]
    fn handle_debug_is_hex() {
        let handle = SharedTextureHandle::legacy(0x1f0);
        assert_eq!(
            format!("{handle:?}"),
            "SharedTextureHandle(0x1f0, Legacy)"
        );
    }
}
