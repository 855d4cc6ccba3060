//! collectd write plugin speaking graphite's plaintext protocol
//!
//! ```text
//! LoadPlugin write_graphite
//! <Plugin write_graphite>
//!     <Node>
//!         Name "local"
//!         Address "127.0.0.1:2003"
//!         Prefix "collectd"
//!         StoreRates true
//!     </Node>
//! </Plugin>
//! ```
//!
//! Each value becomes one `<path> <value> <timestamp>` line. Connections are
//! opened on first write and dropped after a failed write, the next write
//! reconnects.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::io::{self, BufWriter, Write};
use std::net::TcpStream;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use cdshim::{
    collectd_plugin, ConfigItem, Plugin, PluginCapabilities, PluginManager, PluginRegistration,
    Value, ValueList, ValueReport,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct GraphiteConfig {
    #[serde(default)]
    node: Vec<NodeConfig>,
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct NodeConfig {
    name: String,
    address: String,
    prefix: Option<String>,
    #[serde(default = "store_rates_default")]
    store_rates: bool,
}

fn store_rates_default() -> bool {
    true
}

struct GraphiteManager;

impl PluginManager for GraphiteManager {
    fn name() -> &'static str {
        "write_graphite"
    }

    fn plugins(config: Option<&[ConfigItem<'_>]>) -> Result<PluginRegistration> {
        let config: GraphiteConfig = match config {
            Some(items) => cdshim::de::from_collectd(items)?,
            None => GraphiteConfig::default(),
        };

        if config.node.is_empty() {
            warn!("no <Node> configured, nothing will be written");
        }

        let plugins = config
            .node
            .into_iter()
            .map(|node| {
                info!("writing {} to {}", node.name, node.address);
                let address = node.address.clone();
                let plugin: Box<dyn Plugin> = Box::new(GraphitePlugin::new(
                    node.prefix.as_deref().unwrap_or(""),
                    node.store_rates,
                    move || {
                        TcpStream::connect(&address).map(BufWriter::new)
                    },
                ));
                (node.name, plugin)
            })
            .collect();

        Ok(PluginRegistration::Multiple(plugins))
    }
}

type Connect<W> = Box<dyn Fn() -> io::Result<W> + Send + Sync>;

struct GraphitePlugin<W> {
    prefix: String,
    store_rates: bool,
    connect: Connect<W>,
    conn: Mutex<Option<W>>,
}

impl<W: Write + Send> GraphitePlugin<W> {
    fn new<F>(prefix: &str, store_rates: bool, connect: F) -> Self
    where
        F: Fn() -> io::Result<W> + Send + Sync + 'static,
    {
        let mut prefix = sanitize_prefix(prefix);
        if !prefix.is_empty() {
            prefix.push('.');
        }

        GraphitePlugin {
            prefix,
            store_rates,
            connect: Box::new(connect),
            conn: Mutex::new(None),
        }
    }

    fn send(&self, lines: &str) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("graphite connection lock poisoned"))?;

        if conn.is_none() {
            *conn = Some((self.connect)().context("connecting to graphite")?);
            debug!("connected to graphite");
        }

        let res = match conn.as_mut() {
            Some(w) => w.write_all(lines.as_bytes()).and_then(|_| w.flush()),
            None => Ok(()),
        };

        if res.is_err() {
            *conn = None;
        }
        res.context("writing to graphite")
    }
}

impl<W: Write + Send> Plugin for GraphitePlugin<W> {
    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::WRITE | PluginCapabilities::FLUSH
    }

    fn write_values(&self, list: ValueList<'_>) -> Result<()> {
        let reports = if self.store_rates {
            list.rates()?
        } else {
            Cow::Borrowed(&list.values)
        };

        let path = MetricPath::from(&list);
        let lines = format_lines(&self.prefix, &path, &reports, list.time);
        if lines.is_empty() {
            return Ok(());
        }
        self.send(&lines)
    }

    fn flush(&self, _timeout: Option<Duration>, _identifier: Option<&str>) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("graphite connection lock poisoned"))?;

        if let Some(w) = conn.as_mut() {
            if let Err(e) = w.flush() {
                *conn = None;
                return Err(e).context("flushing graphite connection");
            }
        }
        Ok(())
    }
}

/// Identifies a value list, every part is sanitized when formatted
struct MetricPath<'a> {
    host: &'a str,
    plugin: &'a str,
    plugin_instance: Option<&'a str>,
    type_: &'a str,
    type_instance: Option<&'a str>,
}

impl<'a> From<&ValueList<'a>> for MetricPath<'a> {
    fn from(list: &ValueList<'a>) -> Self {
        MetricPath {
            host: list.host,
            plugin: list.plugin,
            plugin_instance: list.plugin_instance,
            type_: list.type_,
            type_instance: list.type_instance,
        }
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c == '.' || c.is_whitespace() || c.is_control() {
                '-'
            } else {
                c
            }
        })
        .collect()
}

/// Dots separate path components, so the prefix keeps them
fn sanitize_prefix(prefix: &str) -> String {
    prefix
        .split('.')
        .filter(|s| !s.is_empty())
        .map(sanitize)
        .collect::<Vec<_>>()
        .join(".")
}

fn push_part(out: &mut String, name: &str, instance: Option<&str>) {
    out.push_str(&sanitize(name));
    if let Some(instance) = instance {
        out.push('-');
        out.push_str(&sanitize(instance));
    }
}

fn graphite_value(value: Value) -> Option<String> {
    match value {
        Value::Gauge(x) if !x.is_finite() => None,
        v => Some(v.to_string()),
    }
}

/// One line per value; non-finite gauges are skipped since graphite can't
/// store them
fn format_lines(
    prefix: &str,
    path: &MetricPath<'_>,
    reports: &[ValueReport<'_>],
    time: SystemTime,
) -> String {
    let ts = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let mut base = String::from(prefix);
    base.push_str(&sanitize(path.host));
    base.push('.');
    push_part(&mut base, path.plugin, path.plugin_instance);
    base.push('.');
    push_part(&mut base, path.type_, path.type_instance);

    let mut out = String::new();
    for report in reports {
        let value = match graphite_value(report.value) {
            Some(v) => v,
            None => continue,
        };

        out.push_str(&base);
        if reports.len() > 1 {
            out.push('.');
            out.push_str(&sanitize(report.name));
        }
        // Writing to a String can't fail
        let _ = writeln!(out, " {value} {ts}");
    }
    out
}

collectd_plugin!(GraphiteManager);
