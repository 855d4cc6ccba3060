//! cdshim-probe - inspects the collectd header layout cdshim compiles against
//!
//! Resolves the layout and ABI the build script would pick for the current
//! flags, renders the flattened wrapper header and checks that the headers
//! exist on disk.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use cdshim_sys::LayoutFlags;
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod report;

use config::{ConfigManager, OutputFormat, ProbeConfig};
use report::{layered_flags, search_roots, FlagOverrides, Resolution};

/// cdshim-probe - collectd header layout inspector
#[derive(Parser)]
#[command(name = "cdshim-probe")]
#[command(about = "Reports which collectd headers cdshim builds against")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "cdshim.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved layout, includes and compiler flags
    Resolve(ResolveArgs),
    /// Print the wrapper header for the resolved layout
    Wrapper(LayoutArgs),
    /// Look for the layout's headers on disk
    Check(CheckArgs),
    /// Validate configuration
    Validate,
    /// Generate default configuration
    Config(ConfigArgs),
}

#[derive(Args, Clone, Default)]
struct LayoutArgs {
    /// collectd source checkout (overrides COLLECTD_PATH)
    #[arg(long)]
    collectd_path: Option<PathBuf>,

    /// Use the collectd 5.4 core layout
    #[arg(long = "collectd-54")]
    collectd_54: bool,

    /// collectd version to resolve the ABI for (overrides COLLECTD_VERSION)
    #[arg(long)]
    collectd_version: Option<String>,
}

#[derive(Args)]
struct ResolveArgs {
    #[command(flatten)]
    layout: LayoutArgs,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,
}

#[derive(Args)]
struct CheckArgs {
    #[command(flatten)]
    layout: LayoutArgs,

    /// Additional root to search, may be repeated
    #[arg(short, long)]
    root: Vec<PathBuf>,
}

#[derive(Args)]
struct ConfigArgs {
    /// Output file for generated config
    #[arg(short, long, default_value = "cdshim.toml")]
    output: PathBuf,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,
}

impl From<&LayoutArgs> for FlagOverrides {
    fn from(args: &LayoutArgs) -> Self {
        FlagOverrides {
            collectd_path: args.collectd_path.clone(),
            collectd_54: args.collectd_54,
            collectd_version: args.collectd_version.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = load_config(&cli).await?;
    init_tracing(&cli, &config);

    match cli.command {
        Commands::Resolve(ref args) => resolve(args, &config),
        Commands::Wrapper(ref args) => wrapper(args, &config),
        Commands::Check(ref args) => check(args, &config),
        Commands::Validate => validate_config(&cli.config).await,
        Commands::Config(ref args) => generate_config(args).await,
    }
}

/// Loads the config file when present. Defaults otherwise.
async fn load_config(cli: &Cli) -> Result<ProbeConfig> {
    let mut config_manager = ConfigManager::new();

    if matches!(cli.command, Commands::Resolve(_) | Commands::Wrapper(_) | Commands::Check(_))
        && cli.config.exists()
    {
        config_manager
            .load_from_file(&cli.config)
            .await
            .with_context(|| "Failed to load configuration")?;
    }

    Ok(config_manager.get_config().await)
}

fn resolution(args: &LayoutArgs, config: &ProbeConfig) -> Result<(LayoutFlags, Resolution)> {
    let overrides = FlagOverrides::from(args);
    let flags = layered_flags(LayoutFlags::from_env(), config, &overrides);
    if flags.shadowed() {
        warn!("collectd-54 is set along with a collectd path, using the source tree");
    }

    let resolution = Resolution::resolve(&flags, config, &overrides, |key| {
        std::env::var(key).ok()
    })?;
    debug!("resolved {:?}", resolution);
    Ok((flags, resolution))
}

fn resolve(args: &ResolveArgs, config: &ProbeConfig) -> Result<ExitCode> {
    let (_, resolution) = resolution(&args.layout, config)?;
    let format = args.format.unwrap_or(config.output.format);
    println!("{}", resolution.render(format)?);
    Ok(ExitCode::SUCCESS)
}

fn wrapper(args: &LayoutArgs, config: &ProbeConfig) -> Result<ExitCode> {
    let (flags, _) = resolution(args, config)?;
    print!("{}", flags.resolve().wrapper_source());
    Ok(ExitCode::SUCCESS)
}

fn check(args: &CheckArgs, config: &ProbeConfig) -> Result<ExitCode> {
    let (flags, resolution) = resolution(&args.layout, config)?;
    let layout = flags.resolve();
    let roots = search_roots(layout, &flags, config, &args.root);
    info!("Checking {} layout under {} roots", resolution.layout, roots.len());

    match layout.locate(&roots) {
        Ok(found) => {
            for path in found {
                println!("found: {}", path.display());
            }
            println!("✓ All {} headers found", resolution.includes.len());
            Ok(ExitCode::SUCCESS)
        }
        Err(missing) => {
            eprintln!("✗ {missing}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Validate configuration file
async fn validate_config(path: &Path) -> Result<ExitCode> {
    info!("Validating configuration: {}", path.display());

    let mut config_manager = ConfigManager::new();
    config_manager.load_from_file(path).await?;

    let config = config_manager.get_config().await;
    ConfigManager::validate(&config)?;

    println!("✓ Configuration is valid");
    Ok(ExitCode::SUCCESS)
}

/// Generate default configuration file
async fn generate_config(args: &ConfigArgs) -> Result<ExitCode> {
    if args.output.exists() && !args.force {
        anyhow::bail!(
            "Configuration file already exists: {}",
            args.output.display()
        );
    }

    let config_manager = ConfigManager::new();
    config_manager.save_to_file(&args.output).await?;

    info!("Generated configuration file: {}", args.output.display());
    Ok(ExitCode::SUCCESS)
}

/// Initialize tracing/logging. RUST_LOG wins over the config file.
fn init_tracing(cli: &Cli, config: &ProbeConfig) {
    let level = if cli.debug {
        "debug"
    } else {
        config.logging.level.as_str()
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
