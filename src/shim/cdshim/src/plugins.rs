//! Traits a plugin implements and the macro that exports it to collectd

use std::time::Duration;

use anyhow::Result;
use bitflags::bitflags;

use crate::api::{ConfigItem, LogLevel, ValueList};
use crate::errors::NotImplemented;

bitflags! {
    /// Callbacks a plugin wants registered with collectd
    #[derive(Default)]
    pub struct PluginCapabilities: u32 {
        const READ =   0b0000_0001;
        const LOG =    0b0000_0010;
        const WRITE =  0b0000_0100;
        const FLUSH =  0b0000_1000;
    }
}

bitflags! {
    /// Process wide hooks a plugin manager wants called
    #[derive(Default)]
    pub struct PluginManagerCapabilities: u32 {
        const INIT = 0b0000_0001;
    }
}

impl PluginCapabilities {
    pub fn has_read(self) -> bool {
        self.intersects(PluginCapabilities::READ)
    }

    pub fn has_log(self) -> bool {
        self.intersects(PluginCapabilities::LOG)
    }

    pub fn has_write(self) -> bool {
        self.intersects(PluginCapabilities::WRITE)
    }

    pub fn has_flush(self) -> bool {
        self.intersects(PluginCapabilities::FLUSH)
    }
}

/// How many plugin instances a manager hands to collectd
pub enum PluginRegistration {
    /// Registered under the manager's name
    Single(Box<dyn Plugin>),

    /// Registered as `<manager name>/<id>` each
    Multiple(Vec<(String, Box<dyn Plugin>)>),
}

/// Entry point collectd sees for a shared object. Builds the plugin
/// instances from the configuration block.
pub trait PluginManager {
    /// Name of the plugin, must match the `LoadPlugin` and `<Plugin>` names
    fn name() -> &'static str;

    fn capabilities() -> PluginManagerCapabilities {
        PluginManagerCapabilities::default()
    }

    /// Called once with the children of the plugin's config block, or with
    /// `None` at init time when collectd's config had no block
    fn plugins(config: Option<&[ConfigItem<'_>]>) -> Result<PluginRegistration>;

    /// Called at collectd init when `INIT` is advertised
    fn initialize() -> Result<()> {
        Err(NotImplemented.into())
    }

    /// Called when collectd shuts down
    fn shutdown() -> Result<()> {
        Ok(())
    }
}

/// A plugin instance. collectd may call into it from several threads at
/// once, so mutable state belongs behind a lock.
pub trait Plugin: Send + Sync {
    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::default()
    }

    /// Receives every message logged in collectd
    fn log(&self, _lvl: LogLevel, _msg: &str) -> Result<()> {
        Err(NotImplemented.into())
    }

    /// Collects values and submits them with `ValueListBuilder`
    fn read_values(&self) -> Result<()> {
        Err(NotImplemented.into())
    }

    /// Receives every value list collectd dispatches
    fn write_values(&self, _list: ValueList<'_>) -> Result<()> {
        Err(NotImplemented.into())
    }

    /// Flushes values older than `timeout`, only those matching
    /// `identifier` when one is given
    fn flush(&self, _timeout: Option<Duration>, _identifier: Option<&str>) -> Result<()> {
        Err(NotImplemented.into())
    }
}

/// Exports a `PluginManager` as a collectd plugin by generating the
/// `module_register` symbol collectd looks for
///
/// ```ignore
/// collectd_plugin!(MyManager);
/// ```
#[macro_export]
macro_rules! collectd_plugin {
    ($type:ty) => {
        // Whether collectd handed us a config block yet
        static CONFIG_SEEN: ::std::sync::atomic::AtomicBool =
            ::std::sync::atomic::AtomicBool::new(false);

        #[no_mangle]
        pub extern "C" fn module_register() {
            $crate::internal::register_panic_handler();
            $crate::internal::module_register::<$type>(
                collectd_plugin_complex_config,
                collectd_plugin_init,
                collectd_plugin_shutdown,
            );
        }

        extern "C" fn collectd_plugin_complex_config(
            config: *mut $crate::bindings::oconfig_item_t,
        ) -> ::std::os::raw::c_int {
            unsafe { $crate::internal::plugin_complex_config::<$type>(&CONFIG_SEEN, config) }
        }

        extern "C" fn collectd_plugin_init() -> ::std::os::raw::c_int {
            $crate::internal::plugin_init::<$type>(&CONFIG_SEEN)
        }

        extern "C" fn collectd_plugin_shutdown() -> ::std::os::raw::c_int {
            $crate::internal::plugin_shutdown::<$type>()
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;

    impl Plugin for Quiet {}

    #[test]
    fn test_plugin_capabilities() {
        let capabilities = PluginCapabilities::READ | PluginCapabilities::WRITE;
        assert!(capabilities.has_read());
        assert!(capabilities.has_write());
        assert!(!capabilities.has_log());

        let capabilities = PluginCapabilities::FLUSH;
        assert!(!capabilities.has_read());
        assert!(capabilities.has_flush());
    }

    #[test]
    fn test_defaults_are_not_implemented() {
        let plugin = Quiet;
        assert!(plugin.capabilities().is_empty());
        let err = plugin.read_values().unwrap_err();
        assert!(err.downcast_ref::<NotImplemented>().is_some());
        assert!(plugin.flush(None, None).is_err());
    }
}
