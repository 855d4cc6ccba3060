//! Built-in declarations of the collectd plugin structs and constants, laid
//! out the way bindgen renders them from `wrapper.h`.

use std::os::raw::{c_char, c_int, c_void};

use crate::ARR_LENGTH;

pub type cdtime_t = u64;
pub type gauge_t = f64;
pub type derive_t = i64;
pub type counter_t = u64;
pub type absolute_t = u64;

/// Width of `value_list_t::values_len` and `data_set_t::ds_num`
#[cfg(collectd57)]
pub type value_count_t = usize;
#[cfg(not(collectd57))]
pub type value_count_t = c_int;

/// Interval argument of `plugin_register_complex_read`
#[cfg(collectd57)]
pub type read_interval_t = cdtime_t;
#[cfg(not(collectd57))]
pub type read_interval_t = *const libc::timespec;

/// 5.7 made the user data of every registration const
#[cfg(collectd57)]
pub type user_data_ptr = *const user_data_t;
#[cfg(not(collectd57))]
pub type user_data_ptr = *mut user_data_t;

pub const DATA_MAX_NAME_LEN: u32 = ARR_LENGTH as u32;

pub const DS_TYPE_COUNTER: u32 = 0;
pub const DS_TYPE_GAUGE: u32 = 1;
pub const DS_TYPE_DERIVE: u32 = 2;
pub const DS_TYPE_ABSOLUTE: u32 = 3;

pub const LOG_ERR: u32 = 3;
pub const LOG_WARNING: u32 = 4;
pub const LOG_NOTICE: u32 = 5;
pub const LOG_INFO: u32 = 6;
pub const LOG_DEBUG: u32 = 7;

pub const OCONFIG_TYPE_STRING: u32 = 0;
pub const OCONFIG_TYPE_NUMBER: u32 = 1;
pub const OCONFIG_TYPE_BOOLEAN: u32 = 2;

pub const MD_TYPE_STRING: u32 = 1;
pub const MD_TYPE_SIGNED_INT: u32 = 2;
pub const MD_TYPE_UNSIGNED_INT: u32 = 3;
pub const MD_TYPE_DOUBLE: u32 = 4;
pub const MD_TYPE_BOOLEAN: u32 = 5;

#[repr(C)]
#[derive(Copy, Clone)]
pub union value_u {
    pub counter: counter_t,
    pub gauge: gauge_t,
    pub derive: derive_t,
    pub absolute: absolute_t,
}
pub type value_t = value_u;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct data_source_s {
    pub name: [c_char; ARR_LENGTH],
    pub type_: c_int,
    pub min: f64,
    pub max: f64,
}
pub type data_source_t = data_source_s;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct data_set_s {
    pub type_: [c_char; ARR_LENGTH],
    pub ds_num: value_count_t,
    pub ds: *mut data_source_t,
}
pub type data_set_t = data_set_s;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct meta_data_s {
    _unused: [u8; 0],
}
pub type meta_data_t = meta_data_s;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct value_list_s {
    pub values: *mut value_t,
    pub values_len: value_count_t,
    pub time: cdtime_t,
    pub interval: cdtime_t,
    pub host: [c_char; ARR_LENGTH],
    pub plugin: [c_char; ARR_LENGTH],
    pub plugin_instance: [c_char; ARR_LENGTH],
    pub type_: [c_char; ARR_LENGTH],
    pub type_instance: [c_char; ARR_LENGTH],
    pub meta: *mut meta_data_t,
}
pub type value_list_t = value_list_s;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct user_data_s {
    pub data: *mut c_void,
    pub free_func: Option<unsafe extern "C" fn(arg1: *mut c_void)>,
}
pub type user_data_t = user_data_s;

#[repr(C)]
#[derive(Copy, Clone)]
pub union oconfig_value_s__bindgen_ty_1 {
    pub string: *mut c_char,
    pub number: f64,
    pub boolean: c_int,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct oconfig_value_s {
    pub value: oconfig_value_s__bindgen_ty_1,
    pub type_: c_int,
}
pub type oconfig_value_t = oconfig_value_s;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct oconfig_item_s {
    pub key: *mut c_char,
    pub values: *mut oconfig_value_t,
    pub values_num: c_int,
    pub parent: *mut oconfig_item_s,
    pub children: *mut oconfig_item_s,
    pub children_num: c_int,
}
pub type oconfig_item_t = oconfig_item_s;

pub type plugin_init_cb = Option<unsafe extern "C" fn() -> c_int>;
pub type plugin_shutdown_cb = Option<unsafe extern "C" fn() -> c_int>;
pub type plugin_complex_config_cb = Option<unsafe extern "C" fn(arg1: *mut oconfig_item_t) -> c_int>;
pub type plugin_read_cb = Option<unsafe extern "C" fn(arg1: *mut user_data_t) -> c_int>;
pub type plugin_write_cb = Option<
    unsafe extern "C" fn(
        arg1: *const data_set_t,
        arg2: *const value_list_t,
        arg3: *mut user_data_t,
    ) -> c_int,
>;
pub type plugin_flush_cb = Option<
    unsafe extern "C" fn(timeout: cdtime_t, identifier: *const c_char, arg3: *mut user_data_t) -> c_int,
>;
pub type plugin_log_cb =
    Option<unsafe extern "C" fn(severity: c_int, message: *const c_char, arg3: *mut user_data_t)>;
