//! Safe bindings for writing collectd plugins in Rust.
//!
//! A plugin crate implements [`PluginManager`] and [`Plugin`], then exports
//! itself with [`collectd_plugin!`]. The exported `module_register` symbol
//! wires configuration, init, read, write, log, flush and shutdown through
//! to the traits, catching errors and panics so they end up in collectd's
//! log instead of unwinding across the FFI boundary.
//!
//! ```ignore
//! use cdshim::{collectd_plugin, Plugin, PluginCapabilities, PluginManager, PluginRegistration};
//! use cdshim::{ConfigItem, Value, ValueListBuilder};
//!
//! struct Uptime;
//!
//! impl PluginManager for Uptime {
//!     fn name() -> &'static str {
//!         "uptime"
//!     }
//!
//!     fn plugins(_config: Option<&[ConfigItem<'_>]>) -> anyhow::Result<PluginRegistration> {
//!         Ok(PluginRegistration::Single(Box::new(Uptime)))
//!     }
//! }
//!
//! impl Plugin for Uptime {
//!     fn capabilities(&self) -> PluginCapabilities {
//!         PluginCapabilities::READ
//!     }
//!
//!     fn read_values(&self) -> anyhow::Result<()> {
//!         let values = [Value::Gauge(42.0)];
//!         ValueListBuilder::new(Self::name(), "uptime").values(&values).submit()?;
//!         Ok(())
//!     }
//! }
//!
//! collectd_plugin!(Uptime);
//! ```

pub use cdshim_sys as bindings;

pub mod api;
pub mod de;
pub mod errors;
#[doc(hidden)]
pub mod internal;
mod plugins;

pub use crate::api::{
    collectd_log, empty_to_none, from_array, get_default_interval, log_err, CdTime,
    CollectdLayer, CollectdLoggerBuilder, ConfigItem, ConfigValue, LogLevel, MetaValue, Value,
    ValueList, ValueListBuilder, ValueReport,
};
pub use crate::errors::{
    ArrayError, CacheRateError, ConfigError, FfiError, NotImplemented, ReceiveError, SubmitError,
};
pub use crate::plugins::{
    Plugin, PluginCapabilities, PluginManager, PluginManagerCapabilities, PluginRegistration,
};
