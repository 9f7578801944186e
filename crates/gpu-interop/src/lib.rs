//! Cross-device shared texture plumbing.
//!
//! This crate defines the [`DeviceContext`] and [`SharedTextureOpener`]
//! traits, the common interface for opening a texture produced by another
//! device (usually another process) and copying it into a texture owned by
//! the caller's device. On Windows this is backed by Direct3D 11 shared
//! handles. The [`soft`] backend implements the same traits on the CPU and
//! runs everywhere.

pub mod context;
pub use context::{DeviceContext, SharedHandleKind, SharedTextureHandle, SharedTextureOpener};

pub mod fence;
pub use fence::wait_for_fence;

// Platform-specific implementations.

#[cfg(target_os = "windows")]
pub mod dx11;

pub mod soft;
