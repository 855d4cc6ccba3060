//! ABI generation selection
//!
//! collectd changed a handful of struct layouts in 5.7 (text field length,
//! length fields, read interval type). Shared with `build.rs`, std only.

use std::fmt;

use crate::layout::HeaderLayout;

pub const ENV_COLLECTD_VERSION: &str = "COLLECTD_VERSION";

/// Feature flags, in the order they are checked
const FEATURES: [(&str, AbiVersion); 3] = [
    ("CARGO_FEATURE_COLLECTD_57", AbiVersion::V57),
    ("CARGO_FEATURE_COLLECTD_55", AbiVersion::V55),
    ("CARGO_FEATURE_COLLECTD_54", AbiVersion::V54),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AbiVersion {
    V54,
    V55,
    V57,
}

impl AbiVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            AbiVersion::V54 => "5.4",
            AbiVersion::V55 => "5.5",
            AbiVersion::V57 => "5.7",
        }
    }

    /// Parses `major.minor[.patch]`. 5.6 shares the 5.5 ABI, everything from
    /// 5.7 on shares the 5.7 ABI.
    pub fn parse(version: &str) -> Option<AbiVersion> {
        let mut parts = version.trim().split('.');
        let major: u32 = parts.next()?.parse().ok()?;
        let minor: u32 = parts.next()?.parse().ok()?;

        match (major, minor) {
            (5, 4) => Some(AbiVersion::V54),
            (5, 5) | (5, 6) => Some(AbiVersion::V55),
            (5, m) if m >= 7 => Some(AbiVersion::V57),
            _ => None,
        }
    }

    /// Features win over `COLLECTD_VERSION`; without either the layout
    /// decides (a 5.4 core layout implies the 5.4 ABI).
    pub fn resolve<F>(lookup: F, layout: HeaderLayout) -> Result<AbiVersion, UnknownVersion>
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = |key: &str| lookup(key).filter(|v| !v.is_empty()).is_some();
        if let Some((_, abi)) = FEATURES.iter().find(|(key, _)| enabled(key)) {
            return Ok(*abi);
        }

        match lookup(ENV_COLLECTD_VERSION).filter(|v| !v.is_empty()) {
            Some(v) => AbiVersion::parse(&v).ok_or(UnknownVersion(v)),
            None if layout == HeaderLayout::Core54 => Ok(AbiVersion::V54),
            None => Ok(AbiVersion::V57),
        }
    }

    /// Length of the fixed text fields (`DATA_MAX_NAME_LEN`)
    pub fn name_len(self) -> usize {
        match self {
            AbiVersion::V57 => 128,
            AbiVersion::V54 | AbiVersion::V55 => 64,
        }
    }
}

impl fmt::Display for AbiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVersion(pub String);

impl fmt::Display for UnknownVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported collectd version: {}", self.0)
    }
}

impl std::error::Error for UnknownVersion {}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_parse_versions() {
        assert_eq!(AbiVersion::parse("5.4"), Some(AbiVersion::V54));
        assert_eq!(AbiVersion::parse("5.6.2"), Some(AbiVersion::V55));
        assert_eq!(AbiVersion::parse("5.12"), Some(AbiVersion::V57));
        assert_eq!(AbiVersion::parse("4.10"), None);
        assert_eq!(AbiVersion::parse("latest"), None);
    }

    #[test]
    fn test_feature_beats_env() {
        let vars = [
            ("CARGO_FEATURE_COLLECTD_55", "1"),
            (ENV_COLLECTD_VERSION, "5.8"),
        ];
        let abi = AbiVersion::resolve(lookup(&vars), HeaderLayout::Packaged).unwrap();
        assert_eq!(abi, AbiVersion::V55);
    }

    #[test]
    fn test_layout_default() {
        let none: [(&str, &str); 0] = [];
        assert_eq!(
            AbiVersion::resolve(lookup(&none), HeaderLayout::Core54),
            Ok(AbiVersion::V54)
        );
        assert_eq!(
            AbiVersion::resolve(lookup(&none), HeaderLayout::Packaged),
            Ok(AbiVersion::V57)
        );
    }

    #[test]
    fn test_unknown_env_version() {
        let vars = [(ENV_COLLECTD_VERSION, "six")];
        let err = AbiVersion::resolve(lookup(&vars), HeaderLayout::Packaged).unwrap_err();
        assert_eq!(err, UnknownVersion("six".to_string()));
    }

    #[test]
    fn test_name_len() {
        assert_eq!(AbiVersion::V54.name_len(), 64);
        assert_eq!(AbiVersion::V57.name_len(), 128);
    }
}
