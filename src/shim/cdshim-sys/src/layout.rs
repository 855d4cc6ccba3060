//! Header path resolution
//!
//! Maps the build flags to exactly one set of collectd plugin headers. This
//! file is shared verbatim with `build.rs`, so it only depends on std.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Points at a local collectd source checkout (primary flag)
pub const ENV_COLLECTD_PATH: &str = "COLLECTD_PATH";

/// Cargo exposes the `collectd-54` feature to build scripts under this name
pub const ENV_FEATURE_COLLECTD_54: &str = "CARGO_FEATURE_COLLECTD_54";

/// Accepted as an alias of the `collectd-54` feature (version flag)
pub const ENV_COLLECTD_54: &str = "COLLECTD_54";

/// The three external facilities a plugin compiles against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facility {
    /// `oconfig.h`: structured configuration items
    OptionParsing,
    /// `plugin.h`: callback registration, dispatch and logging
    PluginRegistration,
    /// `utils_cache.h`: recently collected values and rates
    MetricsCache,
}

impl Facility {
    pub const ALL: [Facility; 3] = [
        Facility::OptionParsing,
        Facility::PluginRegistration,
        Facility::MetricsCache,
    ];

    pub fn header_name(self) -> &'static str {
        match self {
            Facility::OptionParsing => "oconfig.h",
            Facility::PluginRegistration => "plugin.h",
            Facility::MetricsCache => "utils_cache.h",
        }
    }
}

/// Where the collectd headers live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderLayout {
    /// A collectd source tree pointed to by `COLLECTD_PATH`
    SourceTree,
    /// The installed 5.4 core layout
    Core54,
    /// The layout shipped by distribution packages
    Packaged,
}

const SOURCE_TREE_INCLUDES: [&str; 3] = [
    "liboconfig/oconfig.h",
    "daemon/plugin.h",
    "daemon/utils_cache.h",
];

// oconfig.h is pulled in by plugin.h on 5.4 installs
const CORE54_INCLUDES: [&str; 2] = ["collectd/core/plugin.h", "collectd/core/utils_cache.h"];

const PACKAGED_INCLUDES: [&str; 3] = [
    "collectd/liboconfig/oconfig.h",
    "collectd/core/daemon/plugin.h",
    "collectd/core/daemon/utils_cache.h",
];

impl HeaderLayout {
    pub const ALL: [HeaderLayout; 3] = [
        HeaderLayout::SourceTree,
        HeaderLayout::Core54,
        HeaderLayout::Packaged,
    ];

    /// Stable name, used for cfg values and CLI output
    pub fn as_str(self) -> &'static str {
        match self {
            HeaderLayout::SourceTree => "source-tree",
            HeaderLayout::Core54 => "core54",
            HeaderLayout::Packaged => "packaged",
        }
    }

    /// The include directives of this layout, in inclusion order
    pub fn includes(self) -> &'static [&'static str] {
        match self {
            HeaderLayout::SourceTree => &SOURCE_TREE_INCLUDES,
            HeaderLayout::Core54 => &CORE54_INCLUDES,
            HeaderLayout::Packaged => &PACKAGED_INCLUDES,
        }
    }

    /// The include that provides a facility. `None` when the facility is only
    /// reachable through another header.
    pub fn header(self, facility: Facility) -> Option<&'static str> {
        self.includes()
            .iter()
            .copied()
            .find(|include| include.ends_with(facility.header_name()))
    }

    /// Preprocessor define that activates this layout's branch in `wrapper.h`
    pub fn define(self) -> Option<&'static str> {
        match self {
            HeaderLayout::SourceTree => Some("COLLECTD_PATH"),
            HeaderLayout::Core54 => Some("COLLECTD_54"),
            HeaderLayout::Packaged => None,
        }
    }

    /// Extra search directories, on top of the compiler's system paths
    pub fn include_dirs(self, flags: &LayoutFlags) -> Vec<PathBuf> {
        match (self, flags.collectd_path.as_deref()) {
            (HeaderLayout::SourceTree, Some(root)) => {
                vec![root.join("src"), root.join("src").join("daemon")]
            }
            _ => Vec::new(),
        }
    }

    /// The header a compiler sees once the conditionals of `wrapper.h` are
    /// evaluated for this layout
    pub fn wrapper_source(self) -> String {
        let mut out = format!("/* collectd plugin headers: {} layout */\n", self.as_str());
        for include in self.includes() {
            out.push_str("#include <");
            out.push_str(include);
            out.push_str(">\n");
        }
        out
    }

    /// Finds every include of this layout under the first root that has it.
    pub fn locate(self, roots: &[PathBuf]) -> Result<Vec<PathBuf>, MissingHeader> {
        let mut found = Vec::with_capacity(self.includes().len());
        for include in self.includes() {
            let hit = roots
                .iter()
                .map(|root| root.join(include))
                .find(|candidate| candidate.is_file());

            match hit {
                Some(path) => found.push(path),
                None => {
                    return Err(MissingHeader {
                        include: (*include).to_string(),
                        searched: roots.to_vec(),
                    })
                }
            }
        }
        Ok(found)
    }
}

impl fmt::Display for HeaderLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeaderLayout {
    type Err = UnknownLayout;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HeaderLayout::ALL
            .iter()
            .copied()
            .find(|layout| layout.as_str() == s)
            .ok_or_else(|| UnknownLayout(s.to_string()))
    }
}

/// A layout name that is none of `source-tree`, `core54`, `packaged`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLayout(pub String);

impl fmt::Display for UnknownLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown header layout: {}", self.0)
    }
}

impl std::error::Error for UnknownLayout {}

/// An include that was not found under any search root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingHeader {
    pub include: String,
    pub searched: Vec<PathBuf>,
}

impl fmt::Display for MissingHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "header <{}> not found in", self.include)?;
        if self.searched.is_empty() {
            return f.write_str(" any search root (none given)");
        }
        for (i, root) in self.searched.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", sep, root.display())?;
        }
        Ok(())
    }
}

impl std::error::Error for MissingHeader {}

/// The build flags the resolver understands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutFlags {
    pub collectd_path: Option<PathBuf>,
    pub collectd_54: bool,
}

impl LayoutFlags {
    pub fn new(collectd_path: Option<PathBuf>, collectd_54: bool) -> Self {
        Self {
            collectd_path,
            collectd_54,
        }
    }

    /// Reads the flags through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |key: &str| lookup(key).filter(|v| !v.is_empty());

        Self {
            collectd_path: set(ENV_COLLECTD_PATH).map(PathBuf::from),
            collectd_54: set(ENV_FEATURE_COLLECTD_54).is_some()
                || set(ENV_COLLECTD_54).is_some(),
        }
    }

    /// Reads the flags from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// The primary path flag takes precedence over the version flag.
    pub fn resolve(&self) -> HeaderLayout {
        if self.collectd_path.is_some() {
            HeaderLayout::SourceTree
        } else if self.collectd_54 {
            HeaderLayout::Core54
        } else {
            HeaderLayout::Packaged
        }
    }

    /// Both flags are set and the version flag is ignored
    pub fn shadowed(&self) -> bool {
        self.collectd_path.is_some() && self.collectd_54
    }

    pub fn source_root(&self) -> Option<&Path> {
        self.collectd_path.as_deref()
    }
}
