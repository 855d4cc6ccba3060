//! Safe wrappers over the values, value lists and metadata exchanged with collectd

pub use self::cdtime::{collectd_to_nanos, nanos_to_collectd, CdTime};
pub use self::logger::{collectd_log, log_err, CollectdLayer, CollectdLoggerBuilder, LogLevel};
pub use self::oconfig::{ConfigItem, ConfigValue};

use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::fmt;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::slice;
use std::str::Utf8Error;
use std::time::{Duration, SystemTime};

use cdshim_sys::{
    data_set_t, meta_data_add_boolean, meta_data_add_double, meta_data_add_signed_int,
    meta_data_add_string, meta_data_add_unsigned_int, meta_data_create, meta_data_destroy,
    meta_data_get_boolean, meta_data_get_double, meta_data_get_signed_int, meta_data_get_string,
    meta_data_get_unsigned_int, meta_data_t, meta_data_toc, meta_data_type,
    plugin_dispatch_values, uc_get_rate, value_list_t, value_t, ARR_LENGTH, DS_TYPE_ABSOLUTE,
    DS_TYPE_COUNTER, DS_TYPE_DERIVE, DS_TYPE_GAUGE, MD_TYPE_BOOLEAN, MD_TYPE_DOUBLE,
    MD_TYPE_SIGNED_INT, MD_TYPE_STRING, MD_TYPE_UNSIGNED_INT,
};
use serde::Serialize;

use crate::errors::{ArrayError, CacheRateError, ReceiveError, SubmitError};

mod cdtime;
mod logger;
mod oconfig;

/// The value of a metadata entry attached to a value list
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    String(String),
    SignedInt(i64),
    UnsignedInt(u64),
    Double(f64),
    Boolean(bool),
}

/// A single reported measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Continuously incrementing counter that only decreases on overflow
    Counter(u64),

    /// Stored as-is, may increase as well as decrease
    Gauge(f64),

    /// Stores the derivative of the observed values
    Derive(i64),

    /// Counter that is reset upon reading
    Absolute(u64),
}

impl Value {
    /// ```
    /// # use cdshim::Value;
    /// assert!(Value::Gauge(f64::NAN).is_nan());
    /// assert!(!Value::Gauge(0.0).is_nan());
    /// assert!(!Value::Derive(0).is_nan());
    /// ```
    pub fn is_nan(&self) -> bool {
        matches!(*self, Value::Gauge(x) if x.is_nan())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Value::Counter(x) | Value::Absolute(x) => write!(f, "{x}"),
            Value::Gauge(x) => write!(f, "{x}"),
            Value::Derive(x) => write!(f, "{x}"),
        }
    }
}

impl From<Value> for value_t {
    fn from(x: Value) -> Self {
        match x {
            Value::Counter(x) => value_t { counter: x },
            Value::Gauge(x) => value_t { gauge: x },
            Value::Derive(x) => value_t { derive: x },
            Value::Absolute(x) => value_t { absolute: x },
        }
    }
}

/// Name and value of a reported metric
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct ValueReport<'a> {
    /// Data source name, often just "value" for single value types
    pub name: &'a str,
    pub value: Value,
    pub min: f64,
    pub max: f64,
}

/// Values and metadata collectd hands to write plugins
#[derive(Debug, PartialEq, Clone)]
pub struct ValueList<'a> {
    pub values: Vec<ValueReport<'a>>,

    /// The plugin that submitted the values
    pub plugin: &'a str,

    /// Distinguishes entities of one plugin, e.g. each cpu core
    pub plugin_instance: Option<&'a str>,

    /// Type from types.db, determines how many values there are and how
    /// they are interpreted
    pub type_: &'a str,

    /// Separates values of the same type, e.g. "free" and "used" memory
    pub type_instance: Option<&'a str>,

    pub host: &'a str,
    pub time: SystemTime,
    pub interval: Duration,
    pub meta: HashMap<String, MetaValue>,

    // Needed again when rates are requested
    original_list: *const value_list_t,
    original_set: *const data_set_t,
}

impl<'a> ValueList<'a> {
    /// Rates of every non-gauge value, looked up in collectd's cache. Gauges
    /// are passed through, so the result can replace `values` outright.
    pub fn rates(&self) -> Result<Cow<'_, Vec<ValueReport<'a>>>, CacheRateError> {
        let all_gauges = self
            .values
            .iter()
            .all(|x| matches!(x.value, Value::Gauge(_)));

        if all_gauges {
            return Ok(Cow::Borrowed(&self.values));
        }

        let ptr = unsafe { uc_get_rate(self.original_set, self.original_list) };
        if ptr.is_null() {
            return Err(CacheRateError);
        }

        let rates = unsafe { slice::from_raw_parts(ptr, self.values.len()) };
        let values = rates
            .iter()
            .zip(self.values.iter())
            .map(|(rate, report)| match report.value {
                Value::Gauge(_) => *report,
                _ => ValueReport {
                    value: Value::Gauge(*rate),
                    ..*report
                },
            })
            .collect();

        // uc_get_rate hands ownership of the array to the caller
        unsafe { libc::free(ptr as *mut c_void) };
        Ok(Cow::Owned(values))
    }

    pub fn from<'b>(
        set: &'b data_set_t,
        list: &'b value_list_t,
    ) -> Result<ValueList<'b>, ReceiveError> {
        let p = from_array(&list.plugin)
            .map_err(|e| ReceiveError::Utf8(String::new(), "plugin name", e))?;

        let raw_values = unsafe { raw_slice(list.values, length(list.values_len)) };
        let sources = unsafe { raw_slice(set.ds, length(set.ds_num)) };

        let values = raw_values
            .iter()
            .zip(sources)
            .map(|(val, source)| {
                let value = unsafe {
                    match source.type_ {
                        t if t == DS_TYPE_GAUGE as c_int => Value::Gauge(val.gauge),
                        t if t == DS_TYPE_COUNTER as c_int => Value::Counter(val.counter),
                        t if t == DS_TYPE_DERIVE as c_int => Value::Derive(val.derive),
                        t if t == DS_TYPE_ABSOLUTE as c_int => Value::Absolute(val.absolute),
                        t => return Err(ReceiveError::DataSourceType(p.to_string(), t)),
                    }
                };

                let name = from_array(&source.name)
                    .map_err(|e| ReceiveError::Utf8(p.to_string(), "data source name", e))?;

                Ok(ValueReport {
                    name,
                    value,
                    min: source.min,
                    max: source.max,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let field = |arr: &'b [c_char; ARR_LENGTH], name: &'static str| {
            from_array(arr).map_err(|e| ReceiveError::Utf8(p.to_string(), name, e))
        };

        let plugin_instance = field(&list.plugin_instance, "plugin_instance").map(empty_to_none)?;
        let type_ = field(&list.type_, "type")?;
        let type_instance = field(&list.type_instance, "type_instance").map(empty_to_none)?;
        let host = field(&list.host, "host")?;
        let meta = from_meta_data(p, list.meta)?;

        Ok(ValueList {
            values,
            plugin_instance,
            plugin: p,
            type_,
            type_instance,
            host,
            time: CdTime::from(list.time).into(),
            interval: CdTime::from(list.interval).into(),
            meta,
            original_list: list,
            original_set: set,
        })
    }
}

unsafe fn raw_slice<'a, T>(ptr: *const T, len: usize) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(ptr, len)
    }
}

/// Length fields changed width in 5.7
fn length<T: TryInto<usize>>(len: T) -> usize {
    len.try_into().unwrap_or(0)
}

#[derive(Debug, PartialEq, Clone)]
struct SubmitValueList<'a> {
    values: &'a [Value],
    plugin_instance: Option<&'a str>,
    plugin: &'a str,
    type_: &'a str,
    type_instance: Option<&'a str>,
    host: Option<&'a str>,
    time: Option<SystemTime>,
    interval: Option<Duration>,
    meta: HashMap<&'a str, MetaValue>,
}

/// Creates a value list to report values to collectd
#[derive(Debug, PartialEq, Clone)]
pub struct ValueListBuilder<'a> {
    list: SubmitValueList<'a>,
}

impl<'a> ValueListBuilder<'a> {
    /// `plugin` is usually the `PluginManager` name and `type_` a type
    /// from types.db
    pub fn new<T: Into<&'a str>, U: Into<&'a str>>(plugin: T, type_: U) -> ValueListBuilder<'a> {
        ValueListBuilder {
            list: SubmitValueList {
                values: &[],
                plugin_instance: None,
                plugin: plugin.into(),
                type_: type_.into(),
                type_instance: None,
                host: None,
                time: None,
                interval: None,
                meta: HashMap::new(),
            },
        }
    }

    pub fn values(mut self, values: &'a [Value]) -> ValueListBuilder<'a> {
        self.list.values = values;
        self
    }

    pub fn plugin_instance<T: Into<&'a str>>(mut self, plugin_instance: T) -> ValueListBuilder<'a> {
        self.list.plugin_instance = Some(plugin_instance.into());
        self
    }

    pub fn type_instance<T: Into<&'a str>>(mut self, type_instance: T) -> ValueListBuilder<'a> {
        self.list.type_instance = Some(type_instance.into());
        self
    }

    /// Attributes the values to another host than this machine
    pub fn host<T: Into<&'a str>>(mut self, host: T) -> ValueListBuilder<'a> {
        self.list.host = Some(host.into());
        self
    }

    /// Collection time, defaults to when collectd receives the values
    pub fn time(mut self, t: SystemTime) -> ValueListBuilder<'a> {
        self.list.time = Some(t);
        self
    }

    /// Interval new values are expected in, defaults to the plugin's interval
    pub fn interval(mut self, interval: Duration) -> ValueListBuilder<'a> {
        self.list.interval = Some(interval);
        self
    }

    /// Adds a metadata entry, the last value for a key wins
    pub fn metadata(mut self, key: &'a str, value: MetaValue) -> ValueListBuilder<'a> {
        self.list.meta.insert(key, value);
        self
    }

    /// Submits the values to collectd
    pub fn submit(self) -> Result<(), SubmitError> {
        let mut v: Vec<value_t> = self.list.values.iter().map(|&x| x.into()).collect();

        let text = |s: Option<&str>, name: &'static str| match s {
            Some(s) => to_array_res(s).map_err(|e| SubmitError::Field(name, e)),
            None => Ok([0 as c_char; ARR_LENGTH]),
        };

        let plugin_instance = text(self.list.plugin_instance, "plugin_instance")?;
        let type_instance = text(self.list.type_instance, "type_instance")?;
        let plugin = text(Some(self.list.plugin), "plugin")?;
        let type_ = text(Some(self.list.type_), "type")?;

        // Pre-5.7 daemons expect the global hostname, later ones fill in
        // an empty host themselves
        let host = match self.list.host {
            Some(h) => to_array_res(h).map_err(|e| SubmitError::Field("host", e))?,
            None => cdshim_sys::default_host(),
        };

        let values_len = v
            .len()
            .try_into()
            .map_err(|_| SubmitError::TooManyValues(v.len()))?;

        let meta = to_meta_data(&self.list.meta)?;

        let list = value_list_t {
            values: v.as_mut_ptr(),
            values_len,
            plugin_instance,
            plugin,
            type_,
            type_instance,
            host,
            time: self.list.time.map(CdTime::from).unwrap_or_default().into(),
            interval: self.list.interval.map(CdTime::from).unwrap_or_default().into(),
            meta,
        };

        let status = unsafe { plugin_dispatch_values(&list) };

        // collectd copies the metadata during dispatch
        if !meta.is_null() {
            unsafe { meta_data_destroy(meta) };
        }

        match status {
            0 => Ok(()),
            i => Err(SubmitError::Dispatch(i)),
        }
    }
}

fn to_meta_data(meta: &HashMap<&str, MetaValue>) -> Result<*mut meta_data_t, SubmitError> {
    if meta.is_empty() {
        return Ok(ptr::null_mut());
    }

    let md = unsafe { meta_data_create() };
    match add_meta_data(meta, md) {
        Ok(()) => Ok(md),
        Err(e) => {
            unsafe { meta_data_destroy(md) };
            Err(e)
        }
    }
}

fn add_meta_data(meta: &HashMap<&str, MetaValue>, md: *mut meta_data_t) -> Result<(), SubmitError> {
    let c_string = |s: &str, name: &'static str| {
        CString::new(s).map_err(|e| {
            SubmitError::Field(name, ArrayError::NullPresent(e.nul_position(), s.to_string()))
        })
    };

    for (key, value) in meta {
        let c_key = c_string(*key, "meta key")?;
        unsafe {
            match value {
                MetaValue::String(s) => {
                    let c_value = c_string(s, "meta value")?;
                    meta_data_add_string(md, c_key.as_ptr(), c_value.as_ptr());
                }
                MetaValue::SignedInt(i) => {
                    meta_data_add_signed_int(md, c_key.as_ptr(), *i);
                }
                MetaValue::UnsignedInt(u) => {
                    meta_data_add_unsigned_int(md, c_key.as_ptr(), *u);
                }
                MetaValue::Double(d) => {
                    meta_data_add_double(md, c_key.as_ptr(), *d);
                }
                MetaValue::Boolean(b) => {
                    meta_data_add_boolean(md, c_key.as_ptr(), *b);
                }
            }
        }
    }
    Ok(())
}

fn from_meta_data(p: &str, meta: *mut meta_data_t) -> Result<HashMap<String, MetaValue>, ReceiveError> {
    if meta.is_null() {
        return Ok(HashMap::new());
    }

    let mut c_toc: *mut *mut c_char = ptr::null_mut();
    let count = unsafe { meta_data_toc(meta, &mut c_toc) };
    let count = usize::try_from(count).map_err(|_| {
        ReceiveError::Metadata(p.to_string(), "toc".to_string(), "invalid parameters to meta_data_toc")
    })?;
    if count == 0 || c_toc.is_null() {
        return Ok(HashMap::new());
    }

    let toc = unsafe { slice::from_raw_parts(c_toc, count) };
    let result = from_meta_data_with_toc(p, meta, toc);

    // Keys and the toc itself are owned by the caller
    for c_key in toc {
        unsafe { libc::free(*c_key as *mut c_void) };
    }
    unsafe { libc::free(c_toc as *mut c_void) };

    result
}

fn from_meta_data_with_toc(
    p: &str,
    meta: *mut meta_data_t,
    toc: &[*mut c_char],
) -> Result<HashMap<String, MetaValue>, ReceiveError> {
    let mut out = HashMap::with_capacity(toc.len());
    for c_key_ptr in toc {
        let c_key = unsafe { CStr::from_ptr(*c_key_ptr) };
        let key = c_key
            .to_str()
            .map_err(|e| ReceiveError::Utf8(p.to_string(), "metadata key", e))?
            .to_string();

        let unreadable = |key: &str| {
            ReceiveError::Metadata(p.to_string(), key.to_string(), "unable to read value")
        };

        let value_type = unsafe { meta_data_type(meta, c_key.as_ptr()) };
        let value = match u32::try_from(value_type).unwrap_or(0) {
            MD_TYPE_BOOLEAN => {
                let mut v = false;
                if unsafe { meta_data_get_boolean(meta, c_key.as_ptr(), &mut v) } != 0 {
                    return Err(unreadable(&key));
                }
                MetaValue::Boolean(v)
            }
            MD_TYPE_DOUBLE => {
                let mut v = 0.0;
                if unsafe { meta_data_get_double(meta, c_key.as_ptr(), &mut v) } != 0 {
                    return Err(unreadable(&key));
                }
                MetaValue::Double(v)
            }
            MD_TYPE_SIGNED_INT => {
                let mut v = 0i64;
                if unsafe { meta_data_get_signed_int(meta, c_key.as_ptr(), &mut v) } != 0 {
                    return Err(unreadable(&key));
                }
                MetaValue::SignedInt(v)
            }
            MD_TYPE_UNSIGNED_INT => {
                let mut v = 0u64;
                if unsafe { meta_data_get_unsigned_int(meta, c_key.as_ptr(), &mut v) } != 0 {
                    return Err(unreadable(&key));
                }
                MetaValue::UnsignedInt(v)
            }
            MD_TYPE_STRING => {
                let mut c_value: *mut c_char = ptr::null_mut();
                if unsafe { meta_data_get_string(meta, c_key.as_ptr(), &mut c_value) } != 0
                    || c_value.is_null()
                {
                    return Err(unreadable(&key));
                }
                // The string is a copy the caller has to free
                let value = unsafe { CStr::from_ptr(c_value) }
                    .to_str()
                    .map(str::to_string)
                    .map_err(|e| ReceiveError::Utf8(p.to_string(), "metadata value", e));
                unsafe { libc::free(c_value as *mut c_void) };
                MetaValue::String(value?)
            }
            _ => {
                return Err(ReceiveError::Metadata(
                    p.to_string(),
                    key,
                    "unknown metadata type",
                ))
            }
        };
        out.insert(key, value);
    }
    Ok(out)
}

/// Converts a string into one of collectd's fixed size text fields. The
/// length must leave room for the trailing null.
fn to_array_res(s: &str) -> Result<[c_char; ARR_LENGTH], ArrayError> {
    if s.len() >= ARR_LENGTH {
        return Err(ArrayError::TooLong(s.len()));
    }

    let bytes = s.as_bytes();
    if let Some(ind) = bytes.iter().position(|b| *b == 0) {
        return Err(ArrayError::NullPresent(ind, s.to_string()));
    }

    let mut arr = [0 as c_char; ARR_LENGTH];
    for (dst, src) in arr.iter_mut().zip(bytes) {
        *dst = *src as c_char;
    }
    Ok(arr)
}

/// Turns a fixed size text field into a string slice, if possible. A field
/// without a terminating null is read in full.
pub fn from_array(s: &[c_char; ARR_LENGTH]) -> Result<&str, Utf8Error> {
    let bytes = unsafe { slice::from_raw_parts(s.as_ptr() as *const u8, ARR_LENGTH) };
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(ARR_LENGTH);
    std::str::from_utf8(&bytes[..end])
}

pub fn empty_to_none(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Interval to register read callbacks with, the daemon's global interval
pub use cdshim_sys::default_read_interval as get_default_interval;

#[cfg(test)]
mod tests {
    use super::*;
    use cdshim_sys::{data_source_t, stub};

    fn text(s: &str) -> [c_char; ARR_LENGTH] {
        to_array_res(s).unwrap()
    }

    #[test]
    fn test_empty_to_none() {
        assert_eq!(None, empty_to_none(""));
        assert_eq!(Some("hi"), empty_to_none("hi"));
    }

    #[test]
    fn test_from_array() {
        let mut name: [c_char; ARR_LENGTH] = [0; ARR_LENGTH];
        name[0] = b'h' as c_char;
        name[1] = b'i' as c_char;
        assert_eq!(Ok("hi"), from_array(&name));
    }

    #[test]
    fn test_from_array_unterminated() {
        let name = [b'a' as c_char; ARR_LENGTH];
        assert_eq!(from_array(&name).unwrap().len(), ARR_LENGTH);
    }

    #[test]
    fn test_to_array() {
        let actual = to_array_res("Hi").unwrap();
        assert_eq!(&actual[..3], &[b'H' as c_char, b'i' as c_char, 0]);
    }

    #[test]
    fn test_to_array_res_nul() {
        assert_eq!(
            to_array_res("hi\0"),
            Err(ArrayError::NullPresent(2, "hi\0".to_string()))
        );
    }

    #[test]
    fn test_to_array_res_too_long() {
        let exact = "x".repeat(ARR_LENGTH);
        assert_eq!(to_array_res(&exact), Err(ArrayError::TooLong(ARR_LENGTH)));
        assert!(to_array_res(&exact[1..]).is_ok());
    }

    #[test]
    fn test_value_display_and_nan() {
        assert_eq!(Value::Gauge(1.5).to_string(), "1.5");
        assert_eq!(Value::Derive(-3).to_string(), "-3");
        assert_eq!(Value::Counter(7).to_string(), "7");
        assert!(Value::Gauge(f64::NAN).is_nan());
    }

    #[test]
    fn test_value_serializes_as_number() {
        let values = [
            Value::Counter(10),
            Value::Gauge(1.5),
            Value::Derive(-5),
            Value::Absolute(15),
        ];
        assert_eq!(serde_json::to_string(&values).unwrap(), "[10,1.5,-5,15]");
    }

    #[test]
    fn test_submit() {
        stub::reset();
        let values = vec![Value::Gauge(15.0), Value::Gauge(10.0), Value::Gauge(12.0)];
        ValueListBuilder::new("my-plugin", "load")
            .values(&values)
            .type_instance("relative")
            .interval(Duration::from_secs(10))
            .submit()
            .unwrap();

        let sent = stub::dispatched();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].plugin, "my-plugin");
        assert_eq!(sent[0].type_, "load");
        assert_eq!(sent[0].type_instance, "relative");
        assert_eq!(sent[0].plugin_instance, "");
        assert_eq!(sent[0].gauges(), vec![15.0, 10.0, 12.0]);
        assert_eq!(sent[0].interval, nanos_to_collectd(10_000_000_000));
        assert_eq!(sent[0].time, 0);
    }

    #[test]
    fn test_submit_metadata_is_released() {
        stub::reset();
        let values = [Value::Derive(4)];
        ValueListBuilder::new("my-plugin", "requests")
            .values(&values)
            .metadata("region", MetaValue::String("eu".to_string()))
            .metadata("retries", MetaValue::UnsignedInt(2))
            .submit()
            .unwrap();

        let sent = stub::dispatched();
        assert_eq!(sent[0].derives(), vec![4]);
        assert_eq!(sent[0].meta.len(), 2);
        assert_eq!(stub::live_meta_data(), 0);
    }

    #[test]
    fn test_submit_bad_field() {
        stub::reset();
        let long = "x".repeat(ARR_LENGTH + 1);
        let err = ValueListBuilder::new("my-plugin", "load")
            .host(long.as_str())
            .submit()
            .unwrap_err();
        assert!(matches!(err, SubmitError::Field("host", ArrayError::TooLong(_))));
        assert!(stub::dispatched().is_empty());
    }

    #[test]
    fn test_submit_bad_meta_key_destroys_meta() {
        stub::reset();
        let err = ValueListBuilder::new("my-plugin", "load")
            .metadata("bad\0key", MetaValue::Boolean(true))
            .submit()
            .unwrap_err();
        assert!(matches!(err, SubmitError::Field("meta key", _)));
        assert_eq!(stub::live_meta_data(), 0);
    }

    #[test]
    fn test_submit_dispatch_failure() {
        stub::reset();
        stub::set_dispatch_status(-1);
        let err = ValueListBuilder::new("my-plugin", "load").submit().unwrap_err();
        assert!(matches!(err, SubmitError::Dispatch(-1)));
        stub::set_dispatch_status(0);
    }

    struct Received {
        _sources: Vec<data_source_t>,
        _values: Vec<value_t>,
        set: data_set_t,
        list: value_list_t,
    }

    fn received(kinds: &[(u32, value_t)]) -> Received {
        let mut sources: Vec<data_source_t> = kinds
            .iter()
            .enumerate()
            .map(|(i, (kind, _))| data_source_t {
                name: text(&format!("ds{i}")),
                type_: *kind as c_int,
                min: 0.0,
                max: 100.0,
            })
            .collect();
        let mut values: Vec<value_t> = kinds.iter().map(|(_, v)| *v).collect();

        let set = data_set_t {
            type_: text("if_octets"),
            ds_num: length_of(sources.len()),
            ds: sources.as_mut_ptr(),
        };
        let list = value_list_t {
            values: values.as_mut_ptr(),
            values_len: length_of(values.len()),
            time: nanos_to_collectd(1_000_000_000),
            interval: nanos_to_collectd(10_000_000_000),
            host: text("ho"),
            plugin: text("hi"),
            plugin_instance: text("eth0"),
            type_: text("if_octets"),
            type_instance: text(""),
            meta: ptr::null_mut(),
        };

        Received {
            _sources: sources,
            _values: values,
            set,
            list,
        }
    }

    fn length_of<T: TryFrom<usize>>(n: usize) -> T {
        T::try_from(n).unwrap_or_else(|_| panic!("length {n} out of range"))
    }

    #[test]
    fn test_recv_value_list_conversion() {
        let r = received(&[(DS_TYPE_GAUGE, value_t { gauge: 3.0 })]);
        let actual = ValueList::from(&r.set, &r.list).unwrap();
        assert_eq!(
            actual,
            ValueList {
                values: vec![ValueReport {
                    name: "ds0",
                    value: Value::Gauge(3.0),
                    min: 0.0,
                    max: 100.0,
                }],
                plugin_instance: Some("eth0"),
                plugin: "hi",
                type_: "if_octets",
                type_instance: None,
                host: "ho",
                time: SystemTime::UNIX_EPOCH + Duration::from_secs(1),
                interval: Duration::from_secs(10),
                original_list: &r.list,
                original_set: &r.set,
                meta: HashMap::new(),
            }
        );
    }

    #[test]
    fn test_recv_unknown_data_source() {
        let r = received(&[(9, value_t { gauge: 3.0 })]);
        let err = ValueList::from(&r.set, &r.list).unwrap_err();
        assert!(matches!(err, ReceiveError::DataSourceType(_, 9)));
    }

    #[test]
    fn test_recv_metadata() {
        stub::reset();
        let mut r = received(&[(DS_TYPE_GAUGE, value_t { gauge: 3.0 })]);
        let md = unsafe { meta_data_create() };
        let key = CString::new("zone").unwrap();
        let val = CString::new("a").unwrap();
        let flag = CString::new("fresh").unwrap();
        unsafe {
            meta_data_add_string(md, key.as_ptr(), val.as_ptr());
            meta_data_add_boolean(md, flag.as_ptr(), true);
        }
        r.list.meta = md;

        let actual = ValueList::from(&r.set, &r.list).unwrap();
        assert_eq!(actual.meta.get("zone"), Some(&MetaValue::String("a".to_string())));
        assert_eq!(actual.meta.get("fresh"), Some(&MetaValue::Boolean(true)));
        unsafe { meta_data_destroy(md) };
    }

    #[test]
    fn test_rates_all_gauges_skip_cache() {
        stub::reset();
        stub::set_rates(None);
        let r = received(&[(DS_TYPE_GAUGE, value_t { gauge: 3.0 })]);
        let list = ValueList::from(&r.set, &r.list).unwrap();
        assert!(matches!(list.rates(), Ok(Cow::Borrowed(_))));
    }

    #[test]
    fn test_rates_from_cache() {
        stub::reset();
        stub::set_rates(Some(vec![99.0, 1.5]));
        let r = received(&[
            (DS_TYPE_GAUGE, value_t { gauge: 3.0 }),
            (DS_TYPE_DERIVE, value_t { derive: 40 }),
        ]);
        let list = ValueList::from(&r.set, &r.list).unwrap();
        let rates = list.rates().unwrap();
        assert_eq!(rates[0].value, Value::Gauge(3.0));
        assert_eq!(rates[1].value, Value::Gauge(1.5));
        assert_eq!(rates[1].name, "ds1");
    }

    #[test]
    fn test_rates_cache_miss() {
        stub::reset();
        stub::set_rates(None);
        let r = received(&[(DS_TYPE_COUNTER, value_t { counter: 3 })]);
        let list = ValueList::from(&r.set, &r.list).unwrap();
        assert_eq!(list.rates().unwrap_err(), CacheRateError);
    }
}
