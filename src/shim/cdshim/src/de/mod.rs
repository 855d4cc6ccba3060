//! Deserializes a collectd `<Plugin>` block into a plugin's config struct
//!
//! ```text
//! <Plugin write_graphite_rust>
//!     <Node>
//!         Name "localhost.1"
//!         Address "127.0.0.1:2003"
//!     </Node>
//! </Plugin>
//! ```
//!
//! Every occurrence of a key is gathered under that key, children become
//! nested objects. A key with a single value maps onto a scalar field,
//! repeated keys or keys with several values map onto a `Vec`.

mod errors;
mod level;

pub use self::errors::DeError;

use serde::de::{
    self, Deserialize, DeserializeSeed, Deserializer, IntoDeserializer, MapAccess, SeqAccess,
    Visitor,
};
use serde::forward_to_deserialize_any;

use crate::api::{ConfigItem, ConfigValue};

pub type DeResult<T> = Result<T, DeError>;

/// Configuration tree with values and children merged under their key
#[derive(Debug, PartialEq, Clone)]
pub enum DeConfig<'a> {
    Number(f64),
    Boolean(bool),
    String(&'a str),
    Object(Vec<(&'a str, Vec<DeConfig<'a>>)>),
}

/// Groups items by key in order of first appearance
pub fn from_config<'a>(items: &'a [ConfigItem<'a>]) -> Vec<(&'a str, Vec<DeConfig<'a>>)> {
    let mut props: Vec<(&'a str, Vec<DeConfig<'a>>)> = Vec::new();
    for item in items {
        let idx = match props.iter().position(|(k, _)| *k == item.key) {
            Some(idx) => idx,
            None => {
                props.push((item.key, Vec::new()));
                props.len() - 1
            }
        };

        let entry = &mut props[idx].1;
        entry.extend(item.values.iter().map(value_to_config));
        if !item.children.is_empty() {
            entry.push(DeConfig::Object(from_config(&item.children)));
        }
    }
    props
}

fn value_to_config<'a>(v: &ConfigValue<'a>) -> DeConfig<'a> {
    match *v {
        ConfigValue::Number(x) => DeConfig::Number(x),
        ConfigValue::Boolean(x) => DeConfig::Boolean(x),
        ConfigValue::String(x) => DeConfig::String(x),
    }
}

/// Deserializes `T` from the children of a plugin's config block
pub fn from_collectd<'a, T>(items: &'a [ConfigItem<'a>]) -> DeResult<T>
where
    T: Deserialize<'a>,
{
    let props = from_config(items);
    T::deserialize(ObjectDeserializer { entries: &props })
}

/// A set of keys, each with all of their values
struct ObjectDeserializer<'a, 'de> {
    entries: &'a [(&'de str, Vec<DeConfig<'de>>)],
}

impl<'a, 'de> de::Deserializer<'de> for ObjectDeserializer<'a, 'de> {
    type Error = DeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        visitor.visit_map(Entries {
            entries: self.entries.iter(),
            current: None,
        })
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> DeResult<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct enum identifier
    }
}

struct Entries<'a, 'de> {
    entries: std::slice::Iter<'a, (&'de str, Vec<DeConfig<'de>>)>,
    current: Option<&'a (&'de str, Vec<DeConfig<'de>>)>,
}

impl<'a, 'de> MapAccess<'de> for Entries<'a, 'de> {
    type Error = DeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> DeResult<Option<K::Value>> {
        match self.entries.next() {
            Some(entry) => {
                self.current = Some(entry);
                let key: de::value::BorrowedStrDeserializer<'de, DeError> =
                    de::value::BorrowedStrDeserializer::new(entry.0);
                seed.deserialize(key).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> DeResult<V::Value> {
        let (key, values) = self
            .current
            .take()
            .ok_or_else(|| <DeError as de::Error>::custom("value requested before key"))?;

        seed.deserialize(ValuesDeserializer { values })
            .map_err(|e| e.at(key))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

/// Every value found under a single key
struct ValuesDeserializer<'a, 'de> {
    values: &'a [DeConfig<'de>],
}

impl<'a, 'de> ValuesDeserializer<'a, 'de> {
    fn single(&self) -> DeResult<ValueDeserializer<'a, 'de>> {
        match self.values {
            [value] => Ok(ValueDeserializer { value }),
            _ => Err(DeError::ExpectSingleValue),
        }
    }
}

macro_rules! single_value {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
                self.single()?.$method(visitor)
            }
        )*
    };
}

impl<'a, 'de> de::Deserializer<'de> for ValuesDeserializer<'a, 'de> {
    type Error = DeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        match self.values {
            [value] => ValueDeserializer { value }.deserialize_any(visitor),
            _ => self.deserialize_seq(visitor),
        }
    }

    single_value! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64 deserialize_f32
        deserialize_f64 deserialize_char deserialize_str deserialize_string
        deserialize_identifier
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        if self.values.is_empty() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        visitor.visit_seq(Values {
            values: self.values.iter(),
        })
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> DeResult<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> DeResult<V::Value> {
        self.single()?.deserialize_struct(name, fields, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        self.single()?.deserialize_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> DeResult<V::Value> {
        self.single()?.deserialize_enum(name, variants, visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> DeResult<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        i128 u128 bytes byte_buf unit unit_struct tuple_struct
    }
}

struct Values<'a, 'de> {
    values: std::slice::Iter<'a, DeConfig<'de>>,
}

impl<'a, 'de> SeqAccess<'de> for Values<'a, 'de> {
    type Error = DeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> DeResult<Option<T::Value>> {
        match self.values.next() {
            Some(value) => seed.deserialize(ValueDeserializer { value }).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.values.len())
    }
}

/// One value: a scalar or a nested block
struct ValueDeserializer<'a, 'de> {
    value: &'a DeConfig<'de>,
}

macro_rules! integer {
    ($($method:ident => $visit:ident: $ty:ty,)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
                let x = self.number()?;
                if x.fract() != 0.0 || x < <$ty>::MIN as f64 || x > <$ty>::MAX as f64 {
                    return Err(DeError::ExpectInteger(x));
                }
                visitor.$visit(x as $ty)
            }
        )*
    };
}

impl<'a, 'de> ValueDeserializer<'a, 'de> {
    fn number(&self) -> DeResult<f64> {
        match *self.value {
            DeConfig::Number(x) => Ok(x),
            _ => Err(DeError::ExpectNumber),
        }
    }

    fn string(&self) -> DeResult<&'de str> {
        match *self.value {
            DeConfig::String(x) => Ok(x),
            _ => Err(DeError::ExpectString),
        }
    }
}

impl<'a, 'de> de::Deserializer<'de> for ValueDeserializer<'a, 'de> {
    type Error = DeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        match *self.value {
            DeConfig::Number(x) => visitor.visit_f64(x),
            DeConfig::Boolean(x) => visitor.visit_bool(x),
            DeConfig::String(x) => visitor.visit_borrowed_str(x),
            DeConfig::Object(ref entries) => ObjectDeserializer { entries }.deserialize_any(visitor),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        match *self.value {
            DeConfig::Boolean(x) => visitor.visit_bool(x),
            _ => Err(DeError::ExpectBoolean),
        }
    }

    integer! {
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        visitor.visit_f32(self.number()? as f32)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        visitor.visit_f64(self.number()?)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        let s = self.string()?;
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(DeError::ExpectChar(s.to_string())),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        visitor.visit_borrowed_str(self.string()?)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> DeResult<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> DeResult<V::Value> {
        self.deserialize_map(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        match *self.value {
            DeConfig::Object(ref entries) => ObjectDeserializer { entries }.deserialize_any(visitor),
            _ => Err(DeError::ExpectObject),
        }
    }

    /// Only unit variants, named by a string value
    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> DeResult<V::Value> {
        let variant: de::value::StrDeserializer<'_, DeError> = self.string()?.into_deserializer();
        visitor.visit_enum(variant)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> DeResult<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_seq<V: Visitor<'de>>(self, _visitor: V) -> DeResult<V::Value> {
        Err(DeError::DataTypeNotSupported)
    }

    forward_to_deserialize_any! {
        i128 u128 bytes byte_buf unit unit_struct tuple tuple_struct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::LogLevel;
    use serde::Deserialize;

    fn item<'a>(key: &'a str, values: Vec<ConfigValue<'a>>) -> ConfigItem<'a> {
        ConfigItem {
            key,
            values,
            children: vec![],
        }
    }

    fn block<'a>(key: &'a str, children: Vec<ConfigItem<'a>>) -> ConfigItem<'a> {
        ConfigItem {
            key,
            values: vec![],
            children,
        }
    }

    #[test]
    fn test_serde_simple_bool() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct MyStruct {
            my_bool: bool,
        }

        let items = vec![item("my_bool", vec![ConfigValue::Boolean(true)])];
        let actual = from_collectd(&items).unwrap();
        assert_eq!(MyStruct { my_bool: true }, actual);
    }

    #[test]
    fn test_serde_empty_bool() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct MyStruct {
            my_bool: Option<bool>,
        }

        let actual = from_collectd(&[]).unwrap();
        assert_eq!(MyStruct { my_bool: None }, actual);
    }

    #[test]
    fn test_serde_numbers() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct MyStruct {
            my_int: i8,
            my_float: f32,
        }

        let items = vec![
            item("my_int", vec![ConfigValue::Number(-1.0)]),
            item("my_float", vec![ConfigValue::Number(0.5)]),
        ];
        let actual = from_collectd(&items).unwrap();
        assert_eq!(
            MyStruct {
                my_int: -1,
                my_float: 0.5
            },
            actual
        );
    }

    #[test]
    fn test_serde_integer_rejects_fraction_and_range() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct MyStruct {
            my_int: u8,
        }

        for x in [1.5, 256.0, -1.0] {
            let items = vec![item("my_int", vec![ConfigValue::Number(x)])];
            let err = from_collectd::<MyStruct>(&items).unwrap_err();
            assert_eq!(err.root(), &DeError::ExpectInteger(x));
            assert!(err.to_string().starts_with("my_int: "));
        }
    }

    #[test]
    fn test_serde_str_borrows() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct MyStruct<'a> {
            my_string: &'a str,
            owned: String,
        }

        let items = vec![
            item("my_string", vec![ConfigValue::String("HEY")]),
            item("owned", vec![ConfigValue::String("there")]),
        ];
        let actual: MyStruct<'_> = from_collectd(&items).unwrap();
        assert_eq!(
            MyStruct {
                my_string: "HEY",
                owned: "there".to_string()
            },
            actual
        );
    }

    #[test]
    fn test_serde_vec_from_values_and_repeats() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct MyStruct {
            my_bool: Vec<bool>,
            my_num: Vec<u16>,
        }

        let items = vec![
            item("my_bool", vec![ConfigValue::Boolean(true), ConfigValue::Boolean(false)]),
            item("my_num", vec![ConfigValue::Number(1.0)]),
            item("my_bool", vec![ConfigValue::Boolean(true)]),
        ];
        let actual = from_collectd(&items).unwrap();
        assert_eq!(
            MyStruct {
                my_bool: vec![true, false, true],
                my_num: vec![1],
            },
            actual
        );
    }

    #[test]
    fn test_serde_single_value_required() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct MyStruct {
            my_bool: bool,
        }

        let items = vec![
            item("my_bool", vec![ConfigValue::Boolean(true)]),
            item("my_bool", vec![ConfigValue::Boolean(false)]),
        ];
        let err = from_collectd::<MyStruct>(&items).unwrap_err();
        assert_eq!(err.root(), &DeError::ExpectSingleValue);
    }

    #[test]
    fn test_serde_options() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct MyStruct {
            my_bool: Option<bool>,
            my_string: Option<String>,
        }

        let items = vec![item("my_bool", vec![ConfigValue::Boolean(true)])];
        let actual = from_collectd(&items).unwrap();
        assert_eq!(
            MyStruct {
                my_bool: Some(true),
                my_string: None,
            },
            actual
        );
    }

    #[test]
    fn test_serde_log_level() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct MyStruct {
            warn: LogLevel,
            warning: LogLevel,
            err: LogLevel,
            error: LogLevel,
            debug: LogLevel,
            info: LogLevel,
            notice: LogLevel,
        }

        let items = vec![
            item("warn", vec![ConfigValue::String("warn")]),
            item("warning", vec![ConfigValue::String("warning")]),
            item("err", vec![ConfigValue::String("err")]),
            item("error", vec![ConfigValue::String("error")]),
            item("debug", vec![ConfigValue::String("debug")]),
            item("info", vec![ConfigValue::String("INFO")]),
            item("notice", vec![ConfigValue::String("Notice")]),
        ];
        let actual = from_collectd(&items).unwrap();
        assert_eq!(
            MyStruct {
                warn: LogLevel::Warning,
                warning: LogLevel::Warning,
                err: LogLevel::Error,
                error: LogLevel::Error,
                debug: LogLevel::Debug,
                info: LogLevel::Info,
                notice: LogLevel::Notice,
            },
            actual
        );
    }

    #[test]
    fn test_serde_char() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct MyStruct {
            my_char: char,
        }

        let items = vec![item("my_char", vec![ConfigValue::String("/")])];
        assert_eq!(MyStruct { my_char: '/' }, from_collectd(&items).unwrap());

        let items = vec![item("my_char", vec![ConfigValue::String("//")])];
        let err = from_collectd::<MyStruct>(&items).unwrap_err();
        assert_eq!(err.root(), &DeError::ExpectChar("//".to_string()));
    }

    #[test]
    fn test_serde_ignore() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct MyStruct {
            my_char: char,
        }

        let items = vec![
            item("my_char", vec![ConfigValue::String("/")]),
            item("my_boat", vec![ConfigValue::String("/")]),
            block("my_block", vec![item("a", vec![ConfigValue::Number(1.0)])]),
        ];
        assert_eq!(MyStruct { my_char: '/' }, from_collectd(&items).unwrap());
    }

    #[test]
    fn test_serde_deny_unknown() {
        #[derive(Deserialize, PartialEq, Debug)]
        #[serde(deny_unknown_fields)]
        struct MyStruct {
            my_char: char,
        }

        let items = vec![
            item("my_char", vec![ConfigValue::String("/")]),
            item("my_boat", vec![ConfigValue::String("/")]),
        ];
        assert!(from_collectd::<MyStruct>(&items).is_err());
    }

    #[test]
    fn test_serde_nested() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct MyPort {
            port: u16,
        }

        #[derive(Deserialize, PartialEq, Debug)]
        struct MyStruct {
            ports: Vec<MyPort>,
        }

        let items = vec![
            block("ports", vec![item("port", vec![ConfigValue::Number(2003.0)])]),
            block("ports", vec![item("port", vec![ConfigValue::Number(2004.0)])]),
        ];
        let actual = from_collectd(&items).unwrap();
        assert_eq!(
            MyStruct {
                ports: vec![MyPort { port: 2003 }, MyPort { port: 2004 }],
            },
            actual
        );
    }

    #[test]
    fn test_serde_nested_single_struct() {
        #[derive(Deserialize, PartialEq, Debug)]
        #[serde(rename_all = "PascalCase")]
        struct Address {
            host: String,
            port: u16,
        }

        #[derive(Deserialize, PartialEq, Debug)]
        #[serde(rename_all = "PascalCase")]
        struct MyStruct {
            address: Address,
        }

        let items = vec![block(
            "Address",
            vec![
                item("Port", vec![ConfigValue::Number(80.0)]),
                item("Host", vec![ConfigValue::String("localhost")]),
            ],
        )];
        let actual = from_collectd(&items).unwrap();
        assert_eq!(
            MyStruct {
                address: Address {
                    host: "localhost".to_string(),
                    port: 80,
                },
            },
            actual
        );
    }

    #[test]
    fn test_serde_struct_needs_object() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct Inner {
            a: bool,
        }

        #[derive(Deserialize, PartialEq, Debug)]
        struct MyStruct {
            inner: Inner,
        }

        let items = vec![item("inner", vec![ConfigValue::Boolean(true)])];
        let err = from_collectd::<MyStruct>(&items).unwrap_err();
        assert_eq!(err.root(), &DeError::ExpectObject);
    }

    #[test]
    fn test_serde_new_type() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct MyNew(String);

        #[derive(Deserialize, PartialEq, Debug)]
        struct MyStruct {
            it: MyNew,
        }

        let items = vec![item("it", vec![ConfigValue::String("INFO")])];
        let actual = from_collectd(&items).unwrap();
        assert_eq!(
            MyStruct {
                it: MyNew("INFO".to_string())
            },
            actual
        );
    }

    #[test]
    fn test_serde_unit_enum() {
        #[derive(Deserialize, PartialEq, Debug)]
        enum Protocol {
            Tcp,
            Udp,
        }

        #[derive(Deserialize, PartialEq, Debug)]
        #[serde(rename_all = "PascalCase")]
        struct MyStruct {
            protocol: Protocol,
            fallback: Vec<Protocol>,
        }

        let items = vec![
            item("Protocol", vec![ConfigValue::String("Udp")]),
            item("Fallback", vec![ConfigValue::String("Tcp"), ConfigValue::String("Udp")]),
        ];
        let actual = from_collectd(&items).unwrap();
        assert_eq!(
            MyStruct {
                protocol: Protocol::Udp,
                fallback: vec![Protocol::Tcp, Protocol::Udp],
            },
            actual
        );
    }

    #[test]
    fn test_from_config_keeps_order_and_merges() {
        let items = vec![
            item("b", vec![ConfigValue::Number(1.0)]),
            ConfigItem {
                key: "a",
                values: vec![ConfigValue::String("x")],
                children: vec![item("c", vec![ConfigValue::Boolean(false)])],
            },
            item("b", vec![ConfigValue::Number(2.0)]),
        ];
        assert_eq!(
            from_config(&items),
            vec![
                ("b", vec![DeConfig::Number(1.0), DeConfig::Number(2.0)]),
                (
                    "a",
                    vec![
                        DeConfig::String("x"),
                        DeConfig::Object(vec![("c", vec![DeConfig::Boolean(false)])]),
                    ]
                ),
            ]
        );
    }
}
