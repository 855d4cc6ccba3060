//! Layout resolution as the build script would see it, and its rendering

use std::path::PathBuf;

use anyhow::Result;
use cdshim_sys::abi::ENV_COLLECTD_VERSION;
use cdshim_sys::{AbiVersion, HeaderLayout, LayoutFlags};
use serde::Serialize;

use crate::config::{OutputFormat, ProbeConfig};

/// Flags given on the command line, highest precedence
#[derive(Debug, Clone, Default)]
pub struct FlagOverrides {
    pub collectd_path: Option<PathBuf>,
    pub collectd_54: bool,
    pub collectd_version: Option<String>,
}

/// Layers environment, config file and command line, in that order
pub fn layered_flags(env: LayoutFlags, config: &ProbeConfig, cli: &FlagOverrides) -> LayoutFlags {
    let collectd_path = cli
        .collectd_path
        .clone()
        .or_else(|| config.headers.collectd_path.clone())
        .or(env.collectd_path);

    LayoutFlags::new(
        collectd_path,
        cli.collectd_54 || config.headers.collectd_54 || env.collectd_54,
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub layout: String,
    pub abi_version: String,
    pub name_len: usize,
    pub shadowed: bool,
    pub define: Option<String>,
    pub includes: Vec<String>,
    pub include_dirs: Vec<PathBuf>,
}

impl Resolution {
    /// Resolves the header layout and ABI. `lookup` reads the environment,
    /// the version falls back to it after the command line and config file.
    pub fn resolve<F>(
        flags: &LayoutFlags,
        config: &ProbeConfig,
        cli: &FlagOverrides,
        lookup: F,
    ) -> Result<Resolution>
    where
        F: Fn(&str) -> Option<String>,
    {
        let layout = flags.resolve();
        let version = cli
            .collectd_version
            .clone()
            .or_else(|| config.abi.version.clone());

        let abi = AbiVersion::resolve(
            |key| match (key, &version) {
                (ENV_COLLECTD_VERSION, Some(v)) => Some(v.clone()),
                _ => lookup(key),
            },
            layout,
        )?;

        Ok(Resolution {
            layout: layout.as_str().to_string(),
            abi_version: abi.as_str().to_string(),
            name_len: abi.name_len(),
            shadowed: flags.shadowed(),
            define: layout.define().map(str::to_string),
            includes: layout.includes().iter().map(|s| s.to_string()).collect(),
            include_dirs: layout.include_dirs(flags),
        })
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(self)?,
            OutputFormat::Cflags => self.cflags(),
            OutputFormat::Text => self.text(),
        })
    }

    fn cflags(&self) -> String {
        let mut flags: Vec<String> = Vec::new();
        if let Some(define) = &self.define {
            flags.push(format!("-D{define}"));
        }
        flags.extend(self.include_dirs.iter().map(|d| format!("-I{}", d.display())));
        flags.join(" ")
    }

    fn text(&self) -> String {
        let mut out = format!("layout:      {}\n", self.layout);
        out.push_str(&format!(
            "abi:         {} (name length {})\n",
            self.abi_version, self.name_len
        ));
        out.push_str(&format!(
            "define:      {}\n",
            self.define.as_deref().unwrap_or("(none)")
        ));
        for include in &self.includes {
            out.push_str(&format!("include:     <{include}>\n"));
        }
        for dir in &self.include_dirs {
            out.push_str(&format!("search dir:  {}\n", dir.display()));
        }
        if self.shadowed {
            out.push_str("warning:     collectd-54 is shadowed by COLLECTD_PATH\n");
        }
        out
    }
}

/// Roots `check` searches: the layout's own directories, then the
/// configured roots, then those given on the command line
pub fn search_roots(
    layout: HeaderLayout,
    flags: &LayoutFlags,
    config: &ProbeConfig,
    extra: &[PathBuf],
) -> Vec<PathBuf> {
    let mut roots = layout.include_dirs(flags);
    for root in config.headers.search_roots.iter().chain(extra) {
        if !roots.contains(root) {
            roots.push(root.clone());
        }
    }
    roots
}
