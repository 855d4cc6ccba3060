//! Plumbing behind `collectd_plugin!`. Public only so the macro can reach
//! it from the plugin crate; nothing here is meant to be called directly.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{self, catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cdshim_sys::{
    cdtime_t, data_set_t, oconfig_item_t, plugin_register_complex_config,
    plugin_register_complex_read, plugin_register_flush, plugin_register_init,
    plugin_register_log, plugin_register_shutdown, plugin_register_write, user_data_t,
    value_list_t,
};
use tracing::{debug, warn};

use crate::api::{empty_to_none, get_default_interval, log_err, CdTime, ConfigItem, LogLevel, ValueList};
use crate::errors::FfiError;
use crate::plugins::{Plugin, PluginManager, PluginManagerCapabilities, PluginRegistration};

type BoxedPlugin = Box<dyn Plugin>;

/// Runs a plugin callback, turning errors and panics into `FfiError`
fn guarded<T, F>(f: F) -> Result<T, FfiError>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    catch_unwind(AssertUnwindSafe(f))
        .map_err(|_| FfiError::Panic)
        .and_then(|res| res.map_err(FfiError::Plugin))
}

fn status(desc: &str, res: Result<(), FfiError>) -> c_int {
    match res {
        Ok(()) => 0,
        Err(ref e) => {
            log_err(desc, e);
            -1
        }
    }
}

unsafe fn plugin_of<'a>(dt: *mut user_data_t) -> Option<&'a dyn Plugin> {
    let dt = dt.as_ref()?;
    let plugin = (dt.data as *const BoxedPlugin).as_ref()?;
    Some(plugin.as_ref())
}

fn missing_user_data() -> FfiError {
    FfiError::Collectd("collectd passed no user data".into())
}

extern "C" fn plugin_read(dt: *mut user_data_t) -> c_int {
    let res = match unsafe { plugin_of(dt) } {
        Some(plugin) => guarded(|| plugin.read_values()),
        None => Err(missing_user_data()),
    };
    status("read", res)
}

extern "C" fn plugin_log(severity: c_int, message: *const c_char, dt: *mut user_data_t) {
    if message.is_null() {
        return;
    }

    let plugin = match unsafe { plugin_of(dt) } {
        Some(plugin) => plugin,
        None => return,
    };

    // An illegible byte shouldn't cost the whole message
    let msg = unsafe { CStr::from_ptr(message) }.to_string_lossy();
    let res = LogLevel::from_severity(severity)
        .ok_or(FfiError::UnknownSeverity(severity))
        .and_then(|lvl| guarded(|| plugin.log(lvl, &msg)));

    if let Err(ref e) = res {
        log_err("logging", e);
    }
}

extern "C" fn plugin_write(
    ds: *const data_set_t,
    vl: *const value_list_t,
    dt: *mut user_data_t,
) -> c_int {
    let plugin = match unsafe { plugin_of(dt) } {
        Some(plugin) => plugin,
        None => return status("writing", Err(missing_user_data())),
    };

    let res = match unsafe { (ds.as_ref(), vl.as_ref()) } {
        (Some(ds), Some(vl)) => ValueList::from(ds, vl)
            .map_err(|e| FfiError::Collectd(Box::new(e)))
            .and_then(|list| guarded(|| plugin.write_values(list))),
        _ => Err(FfiError::Collectd("collectd passed no value list".into())),
    };
    status("writing", res)
}

extern "C" fn plugin_flush(timeout: cdtime_t, identifier: *const c_char, dt: *mut user_data_t) -> c_int {
    let plugin = match unsafe { plugin_of(dt) } {
        Some(plugin) => plugin,
        None => return status("flush", Err(missing_user_data())),
    };

    let timeout: Option<Duration> = if timeout == 0 {
        None
    } else {
        Some(CdTime::from(timeout).into())
    };

    let ident = if identifier.is_null() {
        Ok(None)
    } else {
        unsafe { CStr::from_ptr(identifier) }
            .to_str()
            .map(empty_to_none)
            .map_err(|e| FfiError::Utf8("flush identifier", e))
    };

    let res = ident.and_then(|id| guarded(|| plugin.flush(timeout, id)));
    status("flush", res)
}

unsafe extern "C" fn plugin_free_user_data(raw: *mut c_void) {
    if !raw.is_null() {
        drop(Box::from_raw(raw as *mut BoxedPlugin));
    }
}

/// Registers every callback the plugin advertises. collectd frees user data
/// once per accepted registration, so only the first accepted registration
/// carries the free function. When collectd accepts none of them the plugin
/// is dropped here. The first rejection is reported after every callback was
/// attempted.
fn plugin_registration(name: &str, plugin: BoxedPlugin) -> Result<(), FfiError> {
    let capabilities = plugin.capabilities();
    let s = CString::new(name).map_err(|_| FfiError::Name(name.to_string()))?;

    if capabilities.is_empty() {
        warn!("plugin {} advertises no capabilities, nothing to register", name);
        return Ok(());
    }

    let plugin_ptr = Box::into_raw(Box::new(plugin)) as *mut c_void;
    let mut free_func = Some(plugin_free_user_data as unsafe extern "C" fn(*mut c_void));
    let mut rejected = None;
    let mut register = |kind: &'static str, f: &dyn Fn(&mut user_data_t) -> c_int| {
        let mut data = user_data_t {
            data: plugin_ptr,
            free_func,
        };
        match f(&mut data) {
            0 => free_func = None,
            rc => {
                warn!("collectd rejected {} callback of {}: {}", kind, name, rc);
                rejected.get_or_insert(FfiError::Registration(kind, rc));
            }
        }
    };

    debug!("registering {} with {:?}", name, capabilities);
    if capabilities.has_read() {
        register("read", &|data| unsafe {
            plugin_register_complex_read(
                ptr::null(),
                s.as_ptr(),
                Some(plugin_read),
                get_default_interval(),
                data,
            )
        });
    }

    if capabilities.has_write() {
        register("write", &|data| unsafe {
            plugin_register_write(s.as_ptr(), Some(plugin_write), data)
        });
    }

    if capabilities.has_log() {
        register("log", &|data| unsafe {
            plugin_register_log(s.as_ptr(), Some(plugin_log), data)
        });
    }

    if capabilities.has_flush() {
        register("flush", &|data| unsafe {
            plugin_register_flush(s.as_ptr(), Some(plugin_flush), data)
        });
    }

    if free_func.is_some() {
        unsafe { plugin_free_user_data(plugin_ptr) };
    }

    rejected.map_or(Ok(()), Err)
}

fn register_all_plugins<T: PluginManager>(config: Option<&[ConfigItem<'_>]>) -> c_int {
    let res = guarded(|| T::plugins(config)).and_then(|registration| match registration {
        PluginRegistration::Single(pl) => plugin_registration(T::name(), pl),
        PluginRegistration::Multiple(v) => v.into_iter().try_for_each(|(id, pl)| {
            let name = format!("{}/{}", T::name(), id);
            plugin_registration(&name, pl)
        }),
    });

    status("collectd config", res)
}

/// Registers the config, init and shutdown callbacks under the manager's name
pub fn module_register<T: PluginManager>(
    config: extern "C" fn(*mut oconfig_item_t) -> c_int,
    init: extern "C" fn() -> c_int,
    shutdown: extern "C" fn() -> c_int,
) {
    let name = match CString::new(T::name()) {
        Ok(name) => name,
        Err(_) => {
            log_err("module register", &FfiError::Name(T::name().to_string()));
            return;
        }
    };

    let config: unsafe extern "C" fn(*mut oconfig_item_t) -> c_int = config;
    let init: unsafe extern "C" fn() -> c_int = init;
    let shutdown: unsafe extern "C" fn() -> c_int = shutdown;

    unsafe {
        plugin_register_complex_config(name.as_ptr(), Some(config));
        plugin_register_init(name.as_ptr(), Some(init));
        plugin_register_shutdown(name.as_ptr(), Some(shutdown));
    }
}

pub fn plugin_init<T: PluginManager>(config_seen: &AtomicBool) -> c_int {
    let mut result = if !config_seen.swap(true, Ordering::SeqCst) {
        register_all_plugins::<T>(None)
    } else {
        0
    };

    if T::capabilities().intersects(PluginManagerCapabilities::INIT) {
        let res = guarded(T::initialize);
        if res.is_err() {
            result = -1;
        }
        status("init", res);
    }

    result
}

pub fn plugin_shutdown<T: PluginManager>() -> c_int {
    status("shutdown", guarded(T::shutdown))
}

/// # Safety
///
/// `config` must be null or point to collectd's config block for this plugin.
pub unsafe fn plugin_complex_config<T: PluginManager>(
    config_seen: &AtomicBool,
    config: *mut oconfig_item_t,
) -> c_int {
    // Multiple sections should be grouped under nodes instead
    if config_seen.swap(true, Ordering::SeqCst) {
        log_err("config", &FfiError::MultipleConfig);
        return -1;
    }

    let config = match config.as_ref() {
        Some(config) => config,
        None => return register_all_plugins::<T>(None),
    };

    match ConfigItem::from_raw(config) {
        Ok(config) => register_all_plugins::<T>(Some(&config.children)),
        Err(e) => {
            log_err("collectd config conversion", &FfiError::Collectd(Box::new(e)));
            -1
        }
    }
}

/// Routes panic messages into collectd's log, then on to the previous hook
pub fn register_panic_handler() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_err("panic hook", &FfiError::PanicHook(info.to_string()));
        previous(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::PluginCapabilities;
    use cdshim_sys::stub::{self, Callback};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct Counting {
        capabilities: PluginCapabilities,
        reads: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Plugin for Counting {
        fn capabilities(&self) -> PluginCapabilities {
            self.capabilities
        }

        fn read_values(&self) -> anyhow::Result<()> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("sensor offline");
            }
            Ok(())
        }

        fn flush(&self, timeout: Option<Duration>, identifier: Option<&str>) -> anyhow::Result<()> {
            anyhow::ensure!(timeout.is_none(), "unexpected timeout");
            anyhow::ensure!(identifier.is_none(), "unexpected identifier");
            Ok(())
        }
    }

    fn counting(capabilities: PluginCapabilities, fail: bool) -> (BoxedPlugin, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let plugin = Counting {
            capabilities,
            reads: reads.clone(),
            fail,
        };
        (Box::new(plugin), reads)
    }

    struct RejectedManager;

    impl PluginManager for RejectedManager {
        fn name() -> &'static str {
            "rejected"
        }

        fn plugins(_config: Option<&[ConfigItem<'_>]>) -> anyhow::Result<PluginRegistration> {
            let (plugin, _) = counting(PluginCapabilities::READ, false);
            Ok(PluginRegistration::Single(plugin))
        }
    }

    fn invoke_read(callback: &Callback) -> c_int {
        match *callback {
            Callback::Read {
                callback: Some(cb),
                mut user_data,
            } => unsafe { cb(&mut user_data) },
            _ => panic!("not a read callback: {callback:?}"),
        }
    }

    #[test]
    fn test_free_func_only_on_first_registration() {
        stub::reset();
        let caps = PluginCapabilities::READ | PluginCapabilities::FLUSH | PluginCapabilities::LOG;
        let (plugin, _) = counting(caps, false);
        plugin_registration("counting", plugin).unwrap();

        let regs = stub::registrations();
        assert_eq!(regs.len(), 3);
        let with_free = regs
            .iter()
            .filter(|r| r.callback.user_data().and_then(|d| d.free_func).is_some())
            .count();
        assert_eq!(with_free, 1);
        assert_eq!(stub::release_user_data(), 1);
    }

    #[test]
    fn test_free_func_moves_past_rejected_registration() {
        stub::reset();
        stub::reject_registrations("read", -2);
        let (plugin, reads) = counting(PluginCapabilities::READ | PluginCapabilities::FLUSH, false);

        let err = plugin_registration("counting", plugin).unwrap_err();
        assert!(matches!(err, FfiError::Registration("read", -2)));

        let regs = stub::registrations();
        assert_eq!(regs.len(), 1);
        assert_eq!(regs[0].callback.kind(), "flush");
        assert!(regs[0].callback.user_data().and_then(|d| d.free_func).is_some());
        assert_eq!(stub::release_user_data(), 1);
        assert_eq!(Arc::strong_count(&reads), 1);
    }

    #[test]
    fn test_all_registrations_rejected_drops_plugin() {
        stub::reset();
        stub::reject_registrations("read", -1);
        stub::reject_registrations("log", -3);
        let (plugin, reads) = counting(PluginCapabilities::READ | PluginCapabilities::LOG, false);

        let err = plugin_registration("counting", plugin).unwrap_err();
        assert!(matches!(err, FfiError::Registration("read", -1)));
        assert!(stub::registrations().is_empty());
        assert_eq!(Arc::strong_count(&reads), 1);
    }

    #[test]
    fn test_rejected_registration_fails_config() {
        stub::reset();
        stub::reject_registrations("read", -1);
        assert_eq!(register_all_plugins::<RejectedManager>(None), -1);
        assert!(stub::logs()
            .iter()
            .any(|l| l.message.contains("collectd rejected read registration with status -1")));
    }

    #[test]
    fn test_read_callback_runs_plugin() {
        stub::reset();
        let (plugin, reads) = counting(PluginCapabilities::READ, false);
        plugin_registration("counting", plugin).unwrap();

        let regs = stub::registrations_of("read");
        assert_eq!(regs[0].name, "counting");
        assert_eq!(invoke_read(&regs[0].callback), 0);
        assert_eq!(invoke_read(&regs[0].callback), 0);
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        stub::release_user_data();
    }

    #[test]
    fn test_read_error_is_logged() {
        stub::reset();
        let (plugin, _) = counting(PluginCapabilities::READ, true);
        plugin_registration("counting", plugin).unwrap();

        let regs = stub::registrations_of("read");
        assert_eq!(invoke_read(&regs[0].callback), -1);
        let logs = stub::logs();
        assert_eq!(
            logs.last().map(|l| l.message.as_str()),
            Some("read error: plugin encountered an error; sensor offline")
        );
        stub::release_user_data();
    }

    #[test]
    fn test_flush_zero_timeout_and_empty_identifier() {
        stub::reset();
        let (plugin, _) = counting(PluginCapabilities::FLUSH, false);
        plugin_registration("counting", plugin).unwrap();

        let regs = stub::registrations_of("flush");
        let status = match regs[0].callback {
            Callback::Flush {
                callback: Some(cb),
                mut user_data,
            } => unsafe { cb(0, b"\0".as_ptr() as *const c_char, &mut user_data) },
            _ => unreachable!(),
        };
        assert_eq!(status, 0);
        stub::release_user_data();
    }

    #[test]
    fn test_guarded_catches_panics() {
        let res: Result<(), FfiError> = guarded(|| panic!("boom"));
        assert!(matches!(res, Err(FfiError::Panic)));
    }

    #[test]
    fn test_no_capabilities_registers_nothing() {
        stub::reset();
        let (plugin, _) = counting(PluginCapabilities::empty(), false);
        plugin_registration("idle", plugin).unwrap();
        assert!(stub::registrations().is_empty());
    }

    #[test]
    fn test_name_with_null_is_rejected() {
        let (plugin, _) = counting(PluginCapabilities::READ, false);
        let err = plugin_registration("bad\0name", plugin).unwrap_err();
        assert!(matches!(err, FfiError::Name(_)));
    }
}
