//! Host logging hook
//!
//! Non-fatal conditions (correlation failures, unknown slots, resolver misses)
//! are routed through a `Logger` that the host passes in. The default logger
//! swallows everything, so a host that wants visibility must install one.

use std::fmt;
use std::sync::Arc;

type LogFn = dyn Fn(&str) + Send + Sync;

/// Cloneable handle to the host's log function
#[derive(Clone, Default)]
pub struct Logger {
    hook: Option<Arc<LogFn>>,
}

impl Logger {
    /// Logger that drops every message
    pub fn noop() -> Self {
        Self { hook: None }
    }

    /// Wrap an arbitrary function
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            hook: Some(Arc::new(func)),
        }
    }

    /// Forward messages to `tracing` under the `qttest` target.
    /// Messages starting with "ERROR" are emitted at warn level.
    pub fn tracing() -> Self {
        Self::new(|message| {
            if message.starts_with("ERROR") {
                tracing::warn!(target: "qttest", "{}", message);
            } else {
                tracing::info!(target: "qttest", "{}", message);
            }
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.hook.is_some()
    }

    pub fn log(&self, message: impl AsRef<str>) {
        if let Some(hook) = &self.hook {
            hook(message.as_ref());
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Logger that collects messages in memory, for tests and for hosts that
/// want to show the log after the fact.
pub fn collecting() -> (Logger, Arc<std::sync::Mutex<Vec<String>>>) {
    let sink = Arc::new(std::sync::Mutex::new(Vec::new()));
    let writer = Arc::clone(&sink);
    let logger = Logger::new(move |message| {
        if let Ok(mut lines) = writer.lock() {
            lines.push(message.to_string());
        }
    });
    (logger, sink)
}
