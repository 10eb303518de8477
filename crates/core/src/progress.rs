//! Progress reporting capability.
//!
//! The conversation loop reports long waits (model requests, tool runs)
//! through an injected sink instead of drawing to the terminal itself.

/// Start/update/stop progress reporting.
pub trait ProgressSink: Send + Sync {
    /// Begin showing progress with the given message.
    fn start(&self, message: &str);

    /// Change the message of a running indicator.
    fn update(&self, message: &str);

    /// Stop and clear the indicator. Calling it while stopped is a no-op.
    fn stop(&self);
}

/// A sink that shows nothing. Used in tests and with `--no-spinner`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn start(&self, _message: &str) {}
    fn update(&self, _message: &str) {}
    fn stop(&self) {}
}
