//! Routes `tracing` events into collectd's log
//!
//! Plugins build a [`CollectdLayer`] with [`CollectdLoggerBuilder`] and log
//! with the usual `tracing` macros. Each plugin shared object carries its
//! own copy of the `tracing` globals, so plugins do not interfere with one
//! another's filters.

use std::cell::RefCell;
use std::ffi::CString;
use std::fmt::{self, Write};
use std::os::raw::{c_char, c_int};

use cdshim_sys::{plugin_log, LOG_DEBUG, LOG_ERR, LOG_INFO, LOG_NOTICE, LOG_WARNING};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::{Directive, EnvFilter, LevelFilter};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use crate::errors::FfiError;
use crate::plugins::PluginManager;

/// The levels collectd exposes to log messages
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u32)]
pub enum LogLevel {
    Error = LOG_ERR,
    Warning = LOG_WARNING,
    Notice = LOG_NOTICE,
    Info = LOG_INFO,
    Debug = LOG_DEBUG,
}

impl LogLevel {
    /// Converts a collectd severity, `None` when collectd sent something unknown
    pub fn from_severity(severity: c_int) -> Option<LogLevel> {
        match u32::try_from(severity).ok()? {
            LOG_ERR => Some(LogLevel::Error),
            LOG_WARNING => Some(LogLevel::Warning),
            LOG_NOTICE => Some(LogLevel::Notice),
            LOG_INFO => Some(LogLevel::Info),
            LOG_DEBUG => Some(LogLevel::Debug),
            _ => None,
        }
    }

    fn severity(self) -> c_int {
        self as u32 as c_int
    }
}

impl From<&Level> for LogLevel {
    fn from(lvl: &Level) -> Self {
        match *lvl {
            Level::ERROR => LogLevel::Error,
            Level::WARN => LogLevel::Warning,
            Level::INFO => LogLevel::Info,
            Level::DEBUG | Level::TRACE => LogLevel::Debug,
        }
    }
}

/// Builds the layer that forwards `tracing` events to collectd
///
/// ```ignore
/// CollectdLoggerBuilder::new()
///     .prefix_plugin::<MyManager>()
///     .filter_level(LevelFilter::INFO)
///     .try_init()?;
/// ```
pub struct CollectdLoggerBuilder {
    level: LevelFilter,
    directives: Vec<Directive>,
    plugin: Option<&'static str>,
}

impl Default for CollectdLoggerBuilder {
    fn default() -> Self {
        CollectdLoggerBuilder {
            level: LevelFilter::ERROR,
            directives: Vec::new(),
            plugin: None,
        }
    }
}

impl CollectdLoggerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefixes every message with the plugin's name
    pub fn prefix_plugin<T: PluginManager>(&mut self) -> &mut Self {
        self.plugin = Some(T::name());
        self
    }

    /// Level for events no other directive matches
    pub fn filter_level(&mut self, level: LevelFilter) -> &mut Self {
        self.level = level;
        self
    }

    pub fn filter_module(&mut self, module: &str, level: LevelFilter) -> &mut Self {
        self.parse(&format!("{module}={level}"))
    }

    /// Adds comma separated `EnvFilter` directives, malformed ones are skipped
    pub fn parse(&mut self, filters: &str) -> &mut Self {
        self.directives.extend(
            filters
                .split(',')
                .filter(|d| !d.trim().is_empty())
                .filter_map(|d| d.trim().parse::<Directive>().ok()),
        );
        self
    }

    pub fn build_filter(&self) -> EnvFilter {
        self.directives.iter().cloned().fold(
            EnvFilter::builder()
                .with_default_directive(self.level.into())
                .parse_lossy(""),
            |filter, directive| filter.add_directive(directive),
        )
    }

    pub fn build_layer(&self) -> CollectdLayer {
        CollectdLayer {
            plugin: self.plugin,
        }
    }

    /// Installs the filtered layer as the global subscriber
    ///
    /// # Errors
    ///
    /// Fails when a global subscriber is already installed.
    pub fn try_init(&mut self) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(self.build_layer().with_filter(self.build_filter()))
            .try_init()
    }
}

/// Layer that formats each event on one line and hands it to `plugin_log`
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectdLayer {
    plugin: Option<&'static str>,
}

struct MessageVisitor<'a> {
    buf: &'a mut String,
}

impl Visit for MessageVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.buf.push_str(value);
        } else {
            let _ = write!(self.buf, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.buf, "{value:?}");
        } else {
            let _ = write!(self.buf, " {}={:?}", field.name(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for CollectdLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        // One buffer per thread
        thread_local!(static LOG_BUF: RefCell<String> = RefCell::new(String::new()));

        let meta = event.metadata();
        LOG_BUF.with(|cell| {
            let mut buf = match cell.try_borrow_mut() {
                Ok(buf) => buf,
                Err(_) => return,
            };
            buf.clear();

            if let Some(plugin) = self.plugin {
                let _ = write!(buf, "{plugin}: ");
            }
            let _ = write!(buf, "{}: ", meta.module_path().unwrap_or(meta.target()));
            event.record(&mut MessageVisitor { buf: &mut buf });

            collectd_log(LogLevel::from(meta.level()), &buf);
        });
    }
}

/// Logs an error with a description and all of its causes on one line. An
/// active `tracing` subscriber is preferred, otherwise the message goes
/// straight to collectd.
pub fn log_err(desc: &str, err: &FfiError) {
    let msg = format!("{} error: {}", desc, err.causes().join("; "));

    if tracing::enabled!(Level::ERROR) {
        tracing::error!("{}", msg);
    } else {
        collectd_log(LogLevel::Error, &msg);
    }
}

/// Sends a message straight to collectd, bypassing any `tracing` filters.
/// Null characters are dropped from the message.
pub fn collectd_log(lvl: LogLevel, message: &str) {
    let cs = CString::new(message).unwrap_or_else(|e| {
        let mut bytes = e.into_vec();
        bytes.retain(|b| *b != 0);
        CString::new(bytes).unwrap_or_default()
    });

    unsafe {
        plugin_log(
            lvl.severity(),
            b"%s\0".as_ptr() as *const c_char,
            cs.as_ptr(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdshim_sys::stub;

    #[test]
    fn test_severity_round_trip() {
        for lvl in [
            LogLevel::Error,
            LogLevel::Warning,
            LogLevel::Notice,
            LogLevel::Info,
            LogLevel::Debug,
        ] {
            assert_eq!(LogLevel::from_severity(lvl.severity()), Some(lvl));
        }
        assert_eq!(LogLevel::from_severity(42), None);
        assert_eq!(LogLevel::from_severity(-1), None);
    }

    #[test]
    fn test_collectd_log_strips_nulls() {
        stub::reset();
        collectd_log(LogLevel::Notice, "a\0b");
        let logs = stub::logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "ab");
        assert_eq!(logs[0].level, LOG_NOTICE as c_int);
    }

    #[test]
    fn test_log_err_without_subscriber() {
        stub::reset();
        log_err("read", &FfiError::Panic);
        let logs = stub::logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "read error: plugin panicked");
        assert_eq!(logs[0].level, LOG_ERR as c_int);
    }

    #[test]
    fn test_layer_formats_and_filters() {
        stub::reset();
        let builder = CollectdLoggerBuilder {
            level: LevelFilter::INFO,
            directives: Vec::new(),
            plugin: Some("myplugin"),
        };
        let subscriber = tracing_subscriber::registry()
            .with(builder.build_layer().with_filter(builder.build_filter()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("hidden");
            tracing::warn!(port = 2003, "connection refused");
        });

        let logs = stub::logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, LOG_WARNING as c_int);
        assert_eq!(
            logs[0].message,
            "myplugin: cdshim::api::logger::tests: connection refused port=2003"
        );
    }

    #[test]
    fn test_module_directive() {
        let mut builder = CollectdLoggerBuilder::new();
        builder
            .filter_module("cdshim::api", LevelFilter::DEBUG)
            .parse("other=warn,,");
        assert_eq!(builder.directives.len(), 2);
    }
}
