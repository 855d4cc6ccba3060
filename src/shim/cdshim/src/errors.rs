//! Error types shared by the safe API and the plugin callbacks

use std::error::Error as StdError;
use std::os::raw::c_int;
use std::str::Utf8Error;

use thiserror::Error;

/// Errors converting Rust text into collectd's fixed size text fields
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArrayError {
    #[error("null encountered (pos: {0}) in string: {1}")]
    NullPresent(usize, String),

    #[error("length of {0} is too long")]
    TooLong(usize),
}

/// Errors submitting values to collectd
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("error converting field: {0}")]
    Field(&'static str, #[source] ArrayError),

    #[error("too many values to submit: {0}")]
    TooManyValues(usize),

    #[error("plugin_dispatch_values returned an error: {0}")]
    Dispatch(c_int),
}

/// Errors decoding a value list received from collectd
#[derive(Error, Debug)]
pub enum ReceiveError {
    #[error("plugin: {0} did not have a valid utf8 {1}")]
    Utf8(String, &'static str, #[source] Utf8Error),

    #[error("plugin: {0} submitted unknown data source type {1}")]
    DataSourceType(String, c_int),

    #[error("plugin: {0} submitted unreadable metadata key {1}: {2}")]
    Metadata(String, String, &'static str),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unable to retrieve rate (see collectd logs for additional details)")]
pub struct CacheRateError;

/// Errors reading collectd's configuration tree
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config item did not have valid utf8: {0}")]
    Key(#[source] Utf8Error),

    #[error("config value did not have valid utf8")]
    StringDecode(#[source] Utf8Error),

    #[error("unknown config value type: {0}")]
    UnknownType(c_int),
}

/// If a plugin advertises a capability but does not implement the matching
/// `Plugin` method, this error is returned
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("function is not implemented")]
pub struct NotImplemented;

/// Errors raised while collectd calls into a plugin
#[derive(Error, Debug)]
pub enum FfiError {
    #[error("plugin encountered an error")]
    Plugin(anyhow::Error),

    #[error("plugin panicked")]
    Panic,

    #[error("panic hook: {0}")]
    PanicHook(String),

    #[error("unknown severity: {0}")]
    UnknownSeverity(c_int),

    #[error("already seen a config section, group configuration under nodes instead")]
    MultipleConfig,

    #[error("plugin name {0:?} contains a null character")]
    Name(String),

    #[error("collectd rejected {0} registration with status {1}")]
    Registration(&'static str, c_int),

    #[error("invalid utf8 in {0}")]
    Utf8(&'static str, #[source] Utf8Error),

    #[error("unexpected collectd behavior")]
    Collectd(#[source] Box<dyn StdError + Send + Sync>),
}

impl FfiError {
    /// Description of the error followed by every underlying cause
    pub fn causes(&self) -> Vec<String> {
        let mut out = vec![self.to_string()];
        match self {
            FfiError::Plugin(e) => out.extend(e.chain().map(|c| c.to_string())),
            _ => {
                let mut cause = self.source();
                while let Some(c) = cause {
                    out.push(c.to_string());
                    cause = c.source();
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_plugin_error_causes() {
        let err: anyhow::Result<()> = Err(anyhow::anyhow!("socket closed"));
        let err = err.context("writing line").unwrap_err();
        let causes = FfiError::Plugin(err).causes();
        assert_eq!(
            causes,
            vec!["plugin encountered an error", "writing line", "socket closed"]
        );
    }

    #[test]
    fn test_source_causes() {
        let err = SubmitError::Field("host", ArrayError::TooLong(300));
        let causes = FfiError::Collectd(Box::new(err)).causes();
        assert_eq!(
            causes,
            vec![
                "unexpected collectd behavior",
                "error converting field: host",
                "length of 300 is too long"
            ]
        );
    }
}
