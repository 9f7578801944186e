//! User-visible failure notification.

use tracing::error;

use crate::PaintError;

/// Side channel for unrecoverable paint failures.
///
/// Called once per failure streak, on the browser's render thread, after the
/// failure latch has been tripped. Hosts typically show a dialog or toast.
/// Implementations must not call back into the bridge.
pub trait FailureNotifier: Send + Sync {
    fn notify(&self, error: &PaintError);
}

impl<F> FailureNotifier for F
where
    F: Fn(&PaintError) + Send + Sync,
{
    fn notify(&self, error: &PaintError) {
        self(error)
    }
}

/// Default notifier: a log event marked for the user.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl FailureNotifier for LogNotifier {
    fn notify(&self, error: &PaintError) {
        error!(
            target: "osr_bridge::user",
            stage = error.stage(),
            "Failed to render offscreen browser: {error}"
        );
    }
}
