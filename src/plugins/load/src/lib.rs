//! collectd plugin reporting the 1, 5 and 15 minute load averages
//!
//! ```text
//! LoadPlugin load
//! <Plugin load>
//!     ReportRelative true
//! </Plugin>
//! ```

use anyhow::{Context, Result};
use cdshim::{
    collectd_plugin, CollectdLoggerBuilder, ConfigItem, Plugin, PluginCapabilities,
    PluginManager, PluginManagerCapabilities, PluginRegistration, Value, ValueListBuilder,
};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing::debug;

#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct LoadConfig {
    /// Divide the averages by the number of online CPUs
    #[serde(default)]
    report_relative: bool,
}

struct LoadManager;

impl PluginManager for LoadManager {
    fn name() -> &'static str {
        "load"
    }

    fn capabilities() -> PluginManagerCapabilities {
        PluginManagerCapabilities::INIT
    }

    fn plugins(config: Option<&[ConfigItem<'_>]>) -> Result<PluginRegistration> {
        let config: LoadConfig = match config {
            Some(items) => cdshim::de::from_collectd(items)?,
            None => LoadConfig::default(),
        };

        debug!("load config: {:?}", config);
        Ok(PluginRegistration::Single(Box::new(LoadPlugin {
            relative: config.report_relative,
        })))
    }

    fn initialize() -> Result<()> {
        CollectdLoggerBuilder::new()
            .prefix_plugin::<Self>()
            .filter_level(LevelFilter::INFO)
            .try_init()
            .context("logger already installed")
    }
}

struct LoadPlugin {
    relative: bool,
}

fn load_averages() -> Result<[f64; 3]> {
    let mut loads = [0.0f64; 3];
    let n = unsafe { libc::getloadavg(loads.as_mut_ptr(), 3) };
    anyhow::ensure!(n == 3, "getloadavg returned {} of 3 samples", n);
    Ok(loads)
}

fn online_cpus() -> Result<usize> {
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    match usize::try_from(n) {
        Ok(n) if n > 0 => Ok(n),
        _ => anyhow::bail!("unable to determine the number of online cpus"),
    }
}

/// Load averages per CPU
fn per_cpu(loads: [f64; 3], cpus: usize) -> [f64; 3] {
    let cpus = cpus as f64;
    loads.map(|l| l / cpus)
}

impl Plugin for LoadPlugin {
    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::READ
    }

    fn read_values(&self) -> Result<()> {
        let mut loads = load_averages()?;
        if self.relative {
            loads = per_cpu(loads, online_cpus()?);
        }

        let values = loads.map(Value::Gauge);
        let mut builder = ValueListBuilder::new(LoadManager::name(), "load").values(&values);
        if self.relative {
            builder = builder.plugin_instance("relative");
        }

        builder.submit()?;
        Ok(())
    }
}

collectd_plugin!(LoadManager);
