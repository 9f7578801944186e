//! Error types for binding and frame ingestion.

use thiserror::Error;

/// Failure to (re)bind the bridge to a destination device.
///
/// Returned to the caller of [`RenderBridge::bind`](crate::RenderBridge::bind),
/// who owns device creation and can retry or pick another device.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("render bridge has been disposed")]
    Disposed,

    #[error("failed to create copy fence on destination device: {0:#}")]
    CreateFence(anyhow::Error),
}

/// Unrecoverable GPU failure while ingesting a frame.
///
/// Never returned to the browser host. It trips the failure latch and is
/// handed to the [`FailureNotifier`](crate::FailureNotifier) once.
#[derive(Debug, Error)]
pub enum PaintError {
    #[error("failed to create source device: {0:#}")]
    SourceDevice(anyhow::Error),

    #[error("failed to open shared texture: {0:#}")]
    OpenSharedTexture(anyhow::Error),

    #[error("failed to copy frame into destination texture: {0:#}")]
    Copy(anyhow::Error),

    #[error("failed waiting for frame copy to complete: {0:#}")]
    Fence(anyhow::Error),
}

impl PaintError {
    /// Short name of the stage that failed, for log fields.
    pub fn stage(&self) -> &'static str {
        match self {
            PaintError::SourceDevice(_) => "source_device",
            PaintError::OpenSharedTexture(_) => "open_shared",
            PaintError::Copy(_) => "copy",
            PaintError::Fence(_) => "fence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn display_includes_cause() {
        let err = PaintError::OpenSharedTexture(anyhow!("bad handle"));
        assert_eq!(err.to_string(), "failed to open shared texture: bad handle");
        assert_eq!(err.stage(), "open_shared");
    }
}
