//! Functions exported by the collectd daemon. The symbols resolve when the
//! daemon loads the plugin, nothing is linked at build time.

use std::os::raw::{c_char, c_int};

use crate::types::*;

extern "C" {
    pub fn plugin_register_complex_config(
        type_: *const c_char,
        callback: plugin_complex_config_cb,
    ) -> c_int;

    pub fn plugin_register_init(name: *const c_char, callback: plugin_init_cb) -> c_int;

    pub fn plugin_register_shutdown(name: *const c_char, callback: plugin_shutdown_cb) -> c_int;

    pub fn plugin_register_complex_read(
        group: *const c_char,
        name: *const c_char,
        callback: plugin_read_cb,
        interval: read_interval_t,
        user_data: user_data_ptr,
    ) -> c_int;

    pub fn plugin_register_write(
        name: *const c_char,
        callback: plugin_write_cb,
        user_data: user_data_ptr,
    ) -> c_int;

    pub fn plugin_register_flush(
        name: *const c_char,
        callback: plugin_flush_cb,
        user_data: user_data_ptr,
    ) -> c_int;

    pub fn plugin_register_log(
        name: *const c_char,
        callback: plugin_log_cb,
        user_data: user_data_ptr,
    ) -> c_int;

    pub fn plugin_dispatch_values(vl: *const value_list_t) -> c_int;

    pub fn plugin_log(level: c_int, format: *const c_char, ...);

    pub fn uc_get_rate(ds: *const data_set_t, vl: *const value_list_t) -> *mut gauge_t;

    pub fn meta_data_create() -> *mut meta_data_t;
    pub fn meta_data_destroy(md: *mut meta_data_t);
    pub fn meta_data_toc(md: *mut meta_data_t, toc: *mut *mut *mut c_char) -> c_int;
    pub fn meta_data_type(md: *mut meta_data_t, key: *const c_char) -> c_int;

    pub fn meta_data_add_string(
        md: *mut meta_data_t,
        key: *const c_char,
        value: *const c_char,
    ) -> c_int;
    pub fn meta_data_add_signed_int(md: *mut meta_data_t, key: *const c_char, value: i64) -> c_int;
    pub fn meta_data_add_unsigned_int(
        md: *mut meta_data_t,
        key: *const c_char,
        value: u64,
    ) -> c_int;
    pub fn meta_data_add_double(md: *mut meta_data_t, key: *const c_char, value: f64) -> c_int;
    pub fn meta_data_add_boolean(md: *mut meta_data_t, key: *const c_char, value: bool) -> c_int;

    pub fn meta_data_get_string(
        md: *mut meta_data_t,
        key: *const c_char,
        value: *mut *mut c_char,
    ) -> c_int;
    pub fn meta_data_get_signed_int(
        md: *mut meta_data_t,
        key: *const c_char,
        value: *mut i64,
    ) -> c_int;
    pub fn meta_data_get_unsigned_int(
        md: *mut meta_data_t,
        key: *const c_char,
        value: *mut u64,
    ) -> c_int;
    pub fn meta_data_get_double(
        md: *mut meta_data_t,
        key: *const c_char,
        value: *mut f64,
    ) -> c_int;
    pub fn meta_data_get_boolean(
        md: *mut meta_data_t,
        key: *const c_char,
        value: *mut bool,
    ) -> c_int;
}
