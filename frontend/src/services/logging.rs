use shared::{DebugConfig, LoggerAdapter};

/// Logger that writes to the browser console
#[derive(Clone)]
pub struct ConsoleLogger {
    debug: DebugConfig,
    component: &'static str,
}

impl ConsoleLogger {
    pub fn new(component: &'static str, debug: DebugConfig) -> Self {
        Self { debug, component }
    }

    fn line(&self, message: &str) -> String {
        format!("[{}] {}", self.component, message)
    }
}

impl LoggerAdapter for ConsoleLogger {
    fn debug(&self, message: &str) {
        if self.debug.enabled {
            gloo::console::debug!(self.line(message));
        }
    }

    fn info(&self, message: &str) {
        gloo::console::log!(self.line(message));
    }

    fn warn(&self, message: &str) {
        gloo::console::warn!(self.line(message));
    }

    fn error(&self, message: &str) {
        gloo::console::error!(self.line(message));
    }
}
