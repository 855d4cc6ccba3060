use std::ffi::CStr;
use std::os::raw::c_int;
use std::slice;

use cdshim_sys::{
    oconfig_item_t, oconfig_value_t, OCONFIG_TYPE_BOOLEAN, OCONFIG_TYPE_NUMBER,
    OCONFIG_TYPE_STRING,
};

use crate::errors::ConfigError;

/// A single value of a collectd configuration line
#[derive(Debug, PartialEq, Clone)]
pub enum ConfigValue<'a> {
    Number(f64),
    Boolean(bool),
    String(&'a str),
}

/// A collectd configuration line or block. `<Node "a">Port 80</Node>` is an
/// item keyed `Node` with the value `"a"` and one child keyed `Port`.
#[derive(Debug, PartialEq, Clone)]
pub struct ConfigItem<'a> {
    pub key: &'a str,
    pub values: Vec<ConfigValue<'a>>,
    pub children: Vec<ConfigItem<'a>>,
}

unsafe fn items<'a, T>(ptr: *const T, len: c_int) -> &'a [T] {
    match usize::try_from(len) {
        Ok(len) if len > 0 && !ptr.is_null() => slice::from_raw_parts(ptr, len),
        _ => &[],
    }
}

impl<'a> ConfigValue<'a> {
    /// # Safety
    ///
    /// `value` must come from collectd's configuration tree.
    pub unsafe fn from_raw(value: &'a oconfig_value_t) -> Result<ConfigValue<'a>, ConfigError> {
        match value.type_ {
            t if t == OCONFIG_TYPE_STRING as c_int => {
                let s = value.value.string;
                if s.is_null() {
                    return Ok(ConfigValue::String(""));
                }
                CStr::from_ptr(s)
                    .to_str()
                    .map(ConfigValue::String)
                    .map_err(ConfigError::StringDecode)
            }
            t if t == OCONFIG_TYPE_NUMBER as c_int => Ok(ConfigValue::Number(value.value.number)),
            t if t == OCONFIG_TYPE_BOOLEAN as c_int => {
                Ok(ConfigValue::Boolean(value.value.boolean != 0))
            }
            t => Err(ConfigError::UnknownType(t)),
        }
    }
}

impl<'a> ConfigItem<'a> {
    /// # Safety
    ///
    /// `item` must come from collectd's configuration tree.
    pub unsafe fn from_raw(item: &'a oconfig_item_t) -> Result<ConfigItem<'a>, ConfigError> {
        let key = if item.key.is_null() {
            ""
        } else {
            CStr::from_ptr(item.key).to_str().map_err(ConfigError::Key)?
        };

        let values = items(item.values, item.values_num)
            .iter()
            .map(|v| ConfigValue::from_raw(v))
            .collect::<Result<Vec<_>, _>>()?;

        let children = items(item.children, item.children_num)
            .iter()
            .map(|c| ConfigItem::from_raw(c))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ConfigItem {
            key,
            values,
            children,
        })
    }
}
