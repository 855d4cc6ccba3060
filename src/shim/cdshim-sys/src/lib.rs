//! Raw collectd plugin ABI
//!
//! Declarations of the daemon structs, constants and functions a plugin
//! links against. By default they come from the built-in `types` module;
//! with the `bindgen` feature they are generated from `wrapper.h` against
//! the installed (or source tree) headers. The `stub` feature swaps the
//! daemon functions for an in-process recorder used by tests.
//!
//! Which headers are included is decided at build time, see [`layout`].

#![allow(non_upper_case_globals, non_camel_case_types, non_snake_case)]
#![allow(clippy::missing_safety_doc)]

use std::os::raw::c_char;

pub mod abi;
pub mod layout;

pub use abi::AbiVersion;
pub use layout::{HeaderLayout, LayoutFlags};

/// Length of every fixed text field (`DATA_MAX_NAME_LEN`)
#[cfg(collectd57)]
pub const ARR_LENGTH: usize = 128;
#[cfg(not(collectd57))]
pub const ARR_LENGTH: usize = 64;

#[cfg(cdshim_bindgen)]
mod bindings {
    include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
}
#[cfg(cdshim_bindgen)]
pub use bindings::*;

#[cfg(not(cdshim_bindgen))]
mod types;
#[cfg(not(cdshim_bindgen))]
pub use types::*;

#[cfg(not(any(cdshim_bindgen, feature = "stub")))]
mod functions;
#[cfg(not(any(cdshim_bindgen, feature = "stub")))]
pub use functions::*;

#[cfg(feature = "stub")]
pub mod stub;
#[cfg(feature = "stub")]
pub use stub::{
    hostname_g, meta_data_add_boolean, meta_data_add_double, meta_data_add_signed_int,
    meta_data_add_string, meta_data_add_unsigned_int, meta_data_create, meta_data_destroy,
    meta_data_get_boolean, meta_data_get_double, meta_data_get_signed_int,
    meta_data_get_string, meta_data_get_unsigned_int, meta_data_toc, meta_data_type,
    plugin_dispatch_values, plugin_log, plugin_register_complex_config,
    plugin_register_complex_read, plugin_register_flush, plugin_register_init,
    plugin_register_log, plugin_register_shutdown, plugin_register_write, uc_get_rate,
};

// Before 5.7 the plugin fills in the host itself from the daemon's global
#[cfg(all(not(feature = "stub"), not(collectd57)))]
extern "C" {
    pub static mut hostname_g: [c_char; ARR_LENGTH];
}

/// Interval to pass to `plugin_register_complex_read` so the daemon uses
/// its global interval
#[cfg(collectd57)]
pub fn default_read_interval() -> u64 {
    0
}

#[cfg(not(collectd57))]
pub fn default_read_interval<T>() -> *const T {
    std::ptr::null()
}

/// Host a value list starts out with. Empty from 5.7 on (the daemon fills
/// it in), the global hostname before that.
#[cfg(collectd57)]
pub fn default_host() -> [c_char; ARR_LENGTH] {
    [0; ARR_LENGTH]
}

#[cfg(not(collectd57))]
pub fn default_host() -> [c_char; ARR_LENGTH] {
    unsafe { std::ptr::addr_of!(hostname_g).read() }
}

/// Header layout this crate was built against
pub fn header_layout() -> HeaderLayout {
    env!("CDSHIM_HEADER_LAYOUT")
        .parse()
        .unwrap_or(HeaderLayout::Packaged)
}

/// ABI generation this crate was built against
pub fn abi_version() -> AbiVersion {
    AbiVersion::parse(env!("CDSHIM_ABI_VERSION")).unwrap_or(AbiVersion::V57)
}
