//! One-way rendering latch.

use std::sync::atomic::{AtomicBool, Ordering};

/// Whether the bridge may issue copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Enabled,
    Disabled,
}

/// Records an unrecoverable GPU failure.
///
/// Starts [`Enabled`](RenderState::Enabled). [`trip`](Self::trip) moves it to
/// [`Disabled`](RenderState::Disabled); only [`reset`](Self::reset), called by
/// a rebind, moves it back. Reads are lock-free so the paint path can drop
/// frames without touching the bridge mutex.
#[derive(Debug)]
pub struct FailureLatch {
    enabled: AtomicBool,
}

impl Default for FailureLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureLatch {
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
        }
    }

    pub fn state(&self) -> RenderState {
        if self.is_enabled() {
            RenderState::Enabled
        } else {
            RenderState::Disabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Disable rendering. Returns `true` only for the call that made the
    /// Enabled -> Disabled transition, so a failure streak is reported once.
    pub fn trip(&self) -> bool {
        self.enabled
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn reset(&self) {
        self.enabled.store(true, Ordering::Release);
    }
}
