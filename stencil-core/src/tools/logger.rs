//! Logging namespace forwarded to the host.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

/// Sink for messages emitted by setup code.
pub trait HostLogger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);

    fn debug(&self, message: &str) {
        self.info(message);
    }

    fn error(&self, message: &str) {
        self.warn(message);
    }
}

/// Default host logger writing through `tracing` under the `stencil::setup` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHostLogger;

impl HostLogger for TracingHostLogger {
    fn info(&self, message: &str) {
        info!(target: "stencil::setup", "{message}");
    }

    fn warn(&self, message: &str) {
        warn!(target: "stencil::setup", "{message}");
    }

    fn debug(&self, message: &str) {
        debug!(target: "stencil::setup", "{message}");
    }

    fn error(&self, message: &str) {
        error!(target: "stencil::setup", "{message}");
    }
}

#[derive(Clone)]
pub struct LoggerTools {
    host: Arc<dyn HostLogger>,
}

impl std::fmt::Debug for LoggerTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerTools").finish_non_exhaustive()
    }
}

impl LoggerTools {
    pub(crate) fn new(host: Arc<dyn HostLogger>) -> Self {
        Self { host }
    }

    pub fn info(&self, message: &str) {
        self.host.info(message);
    }

    pub fn warn(&self, message: &str) {
        self.host.warn(message);
    }

    pub fn debug(&self, message: &str) {
        self.host.debug(message);
    }

    pub fn error(&self, message: &str) {
        self.host.error(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<String>>,
    }

    impl HostLogger for Recorder {
        fn info(&self, message: &str) {
            self.lines.lock().push(format!("info:{message}"));
        }

        fn warn(&self, message: &str) {
            self.lines.lock().push(format!("warn:{message}"));
        }
    }

    #[test]
    fn debug_and_error_fall_back_to_required_methods() {
        let recorder = Arc::new(Recorder::default());
        let tools = LoggerTools::new(recorder.clone());
        tools.debug("d");
        tools.error("e");
        assert_eq!(*recorder.lines.lock(), vec!["info:d", "warn:e"]);
    }
}
