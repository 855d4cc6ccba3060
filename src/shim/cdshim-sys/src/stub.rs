//! In-process stand-in for the collectd daemon
//!
//! Enabled with the `stub` feature. Every exported function has the same
//! signature as its daemon counterpart, so code above this crate compiles
//! unchanged. Calls are recorded per thread; each test thread sees only
//! its own registrations, dispatches and log lines.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::mem;
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::slice;

use crate::types::*;
use crate::ARR_LENGTH;

const STUB_HOSTNAME: &[u8] = b"localhost";

const fn stub_hostname() -> [c_char; ARR_LENGTH] {
    let mut name = [0 as c_char; ARR_LENGTH];
    let mut i = 0;
    while i < STUB_HOSTNAME.len() {
        name[i] = STUB_HOSTNAME[i] as c_char;
        i += 1;
    }
    name
}

#[no_mangle]
pub static mut hostname_g: [c_char; ARR_LENGTH] = stub_hostname();

/// A callback handed to one of the `plugin_register_*` functions
#[derive(Debug, Clone, Copy)]
pub enum Callback {
    ComplexConfig(plugin_complex_config_cb),
    Init(plugin_init_cb),
    Shutdown(plugin_shutdown_cb),
    Read {
        callback: plugin_read_cb,
        user_data: user_data_t,
    },
    Write {
        callback: plugin_write_cb,
        user_data: user_data_t,
    },
    Flush {
        callback: plugin_flush_cb,
        user_data: user_data_t,
    },
    Log {
        callback: plugin_log_cb,
        user_data: user_data_t,
    },
}

impl Callback {
    pub fn kind(&self) -> &'static str {
        match self {
            Callback::ComplexConfig(_) => "config",
            Callback::Init(_) => "init",
            Callback::Shutdown(_) => "shutdown",
            Callback::Read { .. } => "read",
            Callback::Write { .. } => "write",
            Callback::Flush { .. } => "flush",
            Callback::Log { .. } => "log",
        }
    }

    pub fn user_data(&self) -> Option<user_data_t> {
        match *self {
            Callback::Read { user_data, .. }
            | Callback::Write { user_data, .. }
            | Callback::Flush { user_data, .. }
            | Callback::Log { user_data, .. } => Some(user_data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub callback: Callback,
}

/// A metadata value as stored by the stub
#[derive(Debug, Clone, PartialEq)]
pub enum MetaEntry {
    String(String),
    SignedInt(i64),
    UnsignedInt(u64),
    Double(f64),
    Boolean(bool),
}

impl MetaEntry {
    fn type_code(&self) -> c_int {
        let code = match self {
            MetaEntry::String(_) => MD_TYPE_STRING,
            MetaEntry::SignedInt(_) => MD_TYPE_SIGNED_INT,
            MetaEntry::UnsignedInt(_) => MD_TYPE_UNSIGNED_INT,
            MetaEntry::Double(_) => MD_TYPE_DOUBLE,
            MetaEntry::Boolean(_) => MD_TYPE_BOOLEAN,
        };
        code as c_int
    }
}

/// Snapshot of a value list passed to `plugin_dispatch_values`
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedValues {
    pub plugin: String,
    pub plugin_instance: String,
    pub type_: String,
    pub type_instance: String,
    pub host: String,
    pub time: cdtime_t,
    pub interval: cdtime_t,
    /// The raw 64 bits of every `value_t`
    pub raw_values: Vec<u64>,
    pub meta: Vec<(String, MetaEntry)>,
}

impl DispatchedValues {
    pub fn gauges(&self) -> Vec<f64> {
        self.raw_values.iter().map(|x| f64::from_bits(*x)).collect()
    }

    pub fn derives(&self) -> Vec<i64> {
        self.raw_values.iter().map(|x| *x as i64).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: c_int,
    pub message: String,
}

#[derive(Default)]
struct StubState {
    registrations: Vec<Registration>,
    dispatched: Vec<DispatchedValues>,
    logs: Vec<LogRecord>,
    dispatch_status: c_int,
    rates: Option<Vec<gauge_t>>,
    live_meta: usize,
    rejected: Vec<(&'static str, c_int)>,
}

thread_local! {
    static STATE: RefCell<StubState> = RefCell::new(StubState::default());
}

fn with_state<T>(f: impl FnOnce(&mut StubState) -> T) -> T {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

/// Forgets everything recorded on this thread
pub fn reset() {
    with_state(|state| *state = StubState::default());
}

pub fn registrations() -> Vec<Registration> {
    with_state(|state| state.registrations.clone())
}

/// Registrations of one callback kind (`"read"`, `"write"`, ...)
pub fn registrations_of(kind: &str) -> Vec<Registration> {
    with_state(|state| {
        state
            .registrations
            .iter()
            .filter(|r| r.callback.kind() == kind)
            .cloned()
            .collect()
    })
}

pub fn dispatched() -> Vec<DispatchedValues> {
    with_state(|state| state.dispatched.clone())
}

pub fn logs() -> Vec<LogRecord> {
    with_state(|state| state.logs.clone())
}

/// Status returned by subsequent `plugin_dispatch_values` calls
pub fn set_dispatch_status(status: c_int) {
    with_state(|state| state.dispatch_status = status);
}

/// Makes subsequent registrations of one callback kind fail with `status`.
/// Rejected callbacks are not recorded, the daemon keeps nothing of them.
pub fn reject_registrations(kind: &'static str, status: c_int) {
    with_state(|state| state.rejected.push((kind, status)));
}

/// Rates returned by subsequent `uc_get_rate` calls, `None` fails the lookup
pub fn set_rates(rates: Option<Vec<gauge_t>>) {
    with_state(|state| state.rates = rates);
}

/// Number of metadata objects created and not yet destroyed
pub fn live_meta_data() -> usize {
    with_state(|state| state.live_meta)
}

/// Tears down registrations like the daemon does on shutdown: every user
/// data that carries a free function is released once. Returns how many
/// free functions ran.
pub fn release_user_data() -> usize {
    let registrations = with_state(|state| mem::take(&mut state.registrations));
    let mut freed = 0;
    for registration in registrations {
        if let Some(user_data) = registration.callback.user_data() {
            if let Some(free) = user_data.free_func {
                unsafe { free(user_data.data) };
                freed += 1;
            }
        }
    }
    freed
}

unsafe fn name_of(name: *const c_char) -> String {
    if name.is_null() {
        return String::new();
    }
    CStr::from_ptr(name).to_string_lossy().into_owned()
}

unsafe fn copy_user_data(user_data: user_data_ptr) -> user_data_t {
    if user_data.is_null() {
        user_data_t {
            data: ptr::null_mut(),
            free_func: None,
        }
    } else {
        *user_data
    }
}

unsafe fn register(name: *const c_char, callback: Callback) -> c_int {
    let name = name_of(name);
    with_state(|state| {
        let rejected = state.rejected.iter().find(|(kind, _)| *kind == callback.kind());
        match rejected {
            Some(&(_, status)) => status,
            None => {
                state.registrations.push(Registration { name, callback });
                0
            }
        }
    })
}

pub unsafe extern "C" fn plugin_register_complex_config(
    type_: *const c_char,
    callback: plugin_complex_config_cb,
) -> c_int {
    register(type_, Callback::ComplexConfig(callback))
}

pub unsafe extern "C" fn plugin_register_init(
    name: *const c_char,
    callback: plugin_init_cb,
) -> c_int {
    register(name, Callback::Init(callback))
}

pub unsafe extern "C" fn plugin_register_shutdown(
    name: *const c_char,
    callback: plugin_shutdown_cb,
) -> c_int {
    register(name, Callback::Shutdown(callback))
}

pub unsafe extern "C" fn plugin_register_complex_read(
    _group: *const c_char,
    name: *const c_char,
    callback: plugin_read_cb,
    _interval: read_interval_t,
    user_data: user_data_ptr,
) -> c_int {
    let user_data = copy_user_data(user_data);
    register(name, Callback::Read { callback, user_data })
}

pub unsafe extern "C" fn plugin_register_write(
    name: *const c_char,
    callback: plugin_write_cb,
    user_data: user_data_ptr,
) -> c_int {
    let user_data = copy_user_data(user_data);
    register(name, Callback::Write { callback, user_data })
}

pub unsafe extern "C" fn plugin_register_flush(
    name: *const c_char,
    callback: plugin_flush_cb,
    user_data: user_data_ptr,
) -> c_int {
    let user_data = copy_user_data(user_data);
    register(name, Callback::Flush { callback, user_data })
}

pub unsafe extern "C" fn plugin_register_log(
    name: *const c_char,
    callback: plugin_log_cb,
    user_data: user_data_ptr,
) -> c_int {
    let user_data = copy_user_data(user_data);
    register(name, Callback::Log { callback, user_data })
}

unsafe fn text(field: &[c_char; ARR_LENGTH]) -> String {
    CStr::from_ptr(field.as_ptr()).to_string_lossy().into_owned()
}

pub unsafe extern "C" fn plugin_dispatch_values(vl: *const value_list_t) -> c_int {
    let vl = &*vl;
    let len = vl.values_len as usize;
    let raw_values = if vl.values.is_null() || len == 0 {
        Vec::new()
    } else {
        slice::from_raw_parts(vl.values, len)
            .iter()
            .map(|v| v.counter)
            .collect()
    };

    let meta = if vl.meta.is_null() {
        Vec::new()
    } else {
        let stub = &*(vl.meta as *const StubMeta);
        stub.entries
            .iter()
            .map(|(k, v)| (k.to_string_lossy().into_owned(), v.clone()))
            .collect()
    };

    let dispatched = DispatchedValues {
        plugin: text(&vl.plugin),
        plugin_instance: text(&vl.plugin_instance),
        type_: text(&vl.type_),
        type_instance: text(&vl.type_instance),
        host: text(&vl.host),
        time: vl.time,
        interval: vl.interval,
        raw_values,
        meta,
    };

    with_state(|state| {
        state.dispatched.push(dispatched);
        state.dispatch_status
    })
}

/// Callers always log through a `"%s"` format, the stub records the argument
pub unsafe extern "C" fn plugin_log(level: c_int, format: *const c_char, message: *const c_char) {
    let message = if message.is_null() {
        name_of(format)
    } else {
        name_of(message)
    };
    with_state(|state| state.logs.push(LogRecord { level, message }));
}

pub unsafe extern "C" fn uc_get_rate(
    _ds: *const data_set_t,
    vl: *const value_list_t,
) -> *mut gauge_t {
    let rates = match with_state(|state| state.rates.clone()) {
        Some(rates) => rates,
        None => return ptr::null_mut(),
    };

    let len = rates.len().max((*vl).values_len as usize).max(1);
    let out = libc::calloc(len, mem::size_of::<gauge_t>()) as *mut gauge_t;
    if out.is_null() {
        return out;
    }
    ptr::copy_nonoverlapping(rates.as_ptr(), out, rates.len());
    out
}

#[derive(Default)]
struct StubMeta {
    entries: Vec<(CString, MetaEntry)>,
}

unsafe fn stub_meta<'a>(md: *mut meta_data_t) -> Option<&'a mut StubMeta> {
    (md as *mut StubMeta).as_mut()
}

unsafe fn meta_add(md: *mut meta_data_t, key: *const c_char, entry: MetaEntry) -> c_int {
    let meta = match stub_meta(md) {
        Some(meta) if !key.is_null() => meta,
        _ => return -1,
    };
    let key = CStr::from_ptr(key).to_owned();
    match meta.entries.iter_mut().find(|(k, _)| *k == key) {
        Some(existing) => existing.1 = entry,
        None => meta.entries.push((key, entry)),
    }
    0
}

unsafe fn meta_get(md: *mut meta_data_t, key: *const c_char) -> Option<MetaEntry> {
    let meta = stub_meta(md)?;
    if key.is_null() {
        return None;
    }
    let key = CStr::from_ptr(key);
    meta.entries
        .iter()
        .find(|(k, _)| k.as_c_str() == key)
        .map(|(_, v)| v.clone())
}

pub unsafe extern "C" fn meta_data_create() -> *mut meta_data_t {
    with_state(|state| state.live_meta += 1);
    Box::into_raw(Box::<StubMeta>::default()) as *mut meta_data_t
}

pub unsafe extern "C" fn meta_data_destroy(md: *mut meta_data_t) {
    if md.is_null() {
        return;
    }
    drop(Box::from_raw(md as *mut StubMeta));
    with_state(|state| state.live_meta = state.live_meta.saturating_sub(1));
}

pub unsafe extern "C" fn meta_data_toc(md: *mut meta_data_t, toc: *mut *mut *mut c_char) -> c_int {
    let meta = match stub_meta(md) {
        Some(meta) if !toc.is_null() => meta,
        _ => return -1,
    };
    let count = meta.entries.len();
    if count == 0 {
        return 0;
    }

    let keys = libc::calloc(count, mem::size_of::<*mut c_char>()) as *mut *mut c_char;
    if keys.is_null() {
        return -1;
    }
    for (i, (key, _)) in meta.entries.iter().enumerate() {
        *keys.add(i) = libc::strdup(key.as_ptr());
    }
    *toc = keys;
    count as c_int
}

pub unsafe extern "C" fn meta_data_type(md: *mut meta_data_t, key: *const c_char) -> c_int {
    meta_get(md, key).map(|e| e.type_code()).unwrap_or(0)
}

pub unsafe extern "C" fn meta_data_add_string(
    md: *mut meta_data_t,
    key: *const c_char,
    value: *const c_char,
) -> c_int {
    if value.is_null() {
        return -1;
    }
    let value = CStr::from_ptr(value).to_string_lossy().into_owned();
    meta_add(md, key, MetaEntry::String(value))
}

pub unsafe extern "C" fn meta_data_add_signed_int(
    md: *mut meta_data_t,
    key: *const c_char,
    value: i64,
) -> c_int {
    meta_add(md, key, MetaEntry::SignedInt(value))
}

pub unsafe extern "C" fn meta_data_add_unsigned_int(
    md: *mut meta_data_t,
    key: *const c_char,
    value: u64,
) -> c_int {
    meta_add(md, key, MetaEntry::UnsignedInt(value))
}

pub unsafe extern "C" fn meta_data_add_double(
    md: *mut meta_data_t,
    key: *const c_char,
    value: f64,
) -> c_int {
    meta_add(md, key, MetaEntry::Double(value))
}

pub unsafe extern "C" fn meta_data_add_boolean(
    md: *mut meta_data_t,
    key: *const c_char,
    value: bool,
) -> c_int {
    meta_add(md, key, MetaEntry::Boolean(value))
}

const ENOENT: c_int = -2;

pub unsafe extern "C" fn meta_data_get_string(
    md: *mut meta_data_t,
    key: *const c_char,
    value: *mut *mut c_char,
) -> c_int {
    match meta_get(md, key) {
        Some(MetaEntry::String(s)) => match CString::new(s) {
            Ok(s) => {
                *value = libc::strdup(s.as_ptr());
                0
            }
            Err(_) => -1,
        },
        Some(_) => -1,
        None => ENOENT,
    }
}

pub unsafe extern "C" fn meta_data_get_signed_int(
    md: *mut meta_data_t,
    key: *const c_char,
    value: *mut i64,
) -> c_int {
    match meta_get(md, key) {
        Some(MetaEntry::SignedInt(x)) => {
            *value = x;
            0
        }
        Some(_) => -1,
        None => ENOENT,
    }
}

pub unsafe extern "C" fn meta_data_get_unsigned_int(
    md: *mut meta_data_t,
    key: *const c_char,
    value: *mut u64,
) -> c_int {
    match meta_get(md, key) {
        Some(MetaEntry::UnsignedInt(x)) => {
            *value = x;
            0
        }
        Some(_) => -1,
        None => ENOENT,
    }
}

pub unsafe extern "C" fn meta_data_get_double(
    md: *mut meta_data_t,
    key: *const c_char,
    value: *mut f64,
) -> c_int {
    match meta_get(md, key) {
        Some(MetaEntry::Double(x)) => {
            *value = x;
            0
        }
        Some(_) => -1,
        None => ENOENT,
    }
}

pub unsafe extern "C" fn meta_data_get_boolean(
    md: *mut meta_data_t,
    key: *const c_char,
    value: *mut bool,
) -> c_int {
    match meta_get(md, key) {
        Some(MetaEntry::Boolean(x)) => {
            *value = x;
            0
        }
        Some(_) => -1,
        None => ENOENT,
    }
}
