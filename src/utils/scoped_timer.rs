use tokio::time::Instant;
use tracing::debug;

/// Logs, under the `timing` target, how long an operation took once the
/// guard goes out of scope.
#[derive(Debug)]
pub struct ScopedTimer {
    start: Instant,
    operation: &'static str,
    subject: String,
}

impl ScopedTimer {
    pub fn new(
        operation: &'static str,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            start: Instant::now(),
            operation,
            subject: subject.into(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        debug!(
            target: "timing",
            operation = self.operation,
            subject = %self.subject,
            elapsed_ms = self.elapsed_ms() as u64,
            "operation finished"
        );
    }
}
