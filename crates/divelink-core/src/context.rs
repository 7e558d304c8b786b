//! Library context: log routing and cooperative cancellation.
//!
//! One `Context` is created by the application and shared (`Arc`) with
//! every device session it opens.

use std::fmt;

use crate::array::to_hex;

/// Log verbosity, ordered from quietest to noisiest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    None,
    Error,
    Warning,
    Info,
    Debug,
    All,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::None => write!(f, "NONE"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::All => write!(f, "ALL"),
        }
    }
}

pub type LogFn = Box<dyn Fn(LogLevel, &str) + Send + Sync>;
pub type CancelFn = Box<dyn Fn() -> bool + Send + Sync>;

pub struct Context {
    loglevel: LogLevel,
    logfunc: Option<LogFn>,
    cancel: Option<CancelFn>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            loglevel: LogLevel::Warning,
            logfunc: None,
            cancel: None,
        }
    }

    pub fn with_loglevel(mut self, loglevel: LogLevel) -> Self {
        self.loglevel = loglevel;
        self
    }

    /// Route messages to `logfunc` instead of `tracing`.
    pub fn with_logfunc(
        mut self,
        logfunc: impl Fn(LogLevel, &str) + Send + Sync + 'static,
    ) -> Self {
        self.logfunc = Some(Box::new(logfunc));
        self
    }

    /// Install a predicate polled by long-running operations.
    pub fn with_cancel(mut self, cancel: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.cancel = Some(Box::new(cancel));
        self
    }

    pub fn loglevel(&self) -> LogLevel {
        self.loglevel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|cancel| cancel())
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if level == LogLevel::None || level > self.loglevel {
            return;
        }

        if let Some(logfunc) = &self.logfunc {
            logfunc(level, message);
            return;
        }

        match level {
            LogLevel::Error => tracing::error!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::All | LogLevel::None => tracing::trace!("{}", message),
        }
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Log `data` as hex, prefixed with `prefix`.
    pub fn hexdump(&self, level: LogLevel, prefix: &str, data: &[u8]) {
        if level == LogLevel::None || level > self.loglevel {
            return;
        }
        let line = format!("{}: size={}, data={}", prefix, data.len(), to_hex(data));
        self.log(level, &line);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("loglevel", &self.loglevel)
            .field("logfunc", &self.logfunc.is_some())
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    fn capture(loglevel: LogLevel) -> (Context, Arc<Mutex<Vec<(LogLevel, String)>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let context = Context::new()
            .with_loglevel(loglevel)
            .with_logfunc(move |level, msg| {
                sink.lock().unwrap().push((level, msg.to_string()));
            });
        (context, lines)
    }

    #[test]
    fn test_log_level_gating() {
        let (context, lines) = capture(LogLevel::Warning);
        context.error("boom");
        context.log(LogLevel::Warning, "careful");
        context.log(LogLevel::Info, "chatty");
        context.log(LogLevel::None, "never");

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], (LogLevel::Error, "boom".to_string()));
        assert_eq!(lines[1], (LogLevel::Warning, "careful".to_string()));
    }

    #[test]
    fn test_hexdump_format() {
        let (context, lines) = capture(LogLevel::Debug);
        context.hexdump(LogLevel::Debug, "Handshake", &[0x33, 0x01, 0xFF]);
        context.hexdump(LogLevel::All, "Hidden", &[0x00]);

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].1, "Handshake: size=3, data=3301FF");
    }

    #[test]
    fn test_cancel_predicate() {
        assert!(!Context::new().is_cancelled());

        let flag = Arc::new(AtomicBool::new(false));
        let f = flag.clone();
        let context = Context::new().with_cancel(move || f.load(Ordering::SeqCst));
        assert!(!context.is_cancelled());

        flag.store(true, Ordering::SeqCst);
        assert!(context.is_cancelled());
    }
}
