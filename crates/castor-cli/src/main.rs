use std::path::PathBuf;

use castor_config::MountConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "castorfs", version, about = "CASTOR namespace as a FUSE filesystem")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Mount options, e.g. castor_root=/castor/cern.ch,castor_readonly
    #[arg(short = 'o', value_name = "OPTS", global = true)]
    options: Vec<String>,

    /// Log every filesystem operation
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the namespace (blocks until unmounted)
    Mount {
        /// Mount point path
        mountpoint: PathBuf,
    },
    /// Show the virtual extended attribute catalog
    Attrs,
    /// Show effective configuration
    Config,
}

/// Find the configuration file to use.
fn find_config() -> Option<PathBuf> {
    // 1. CASTORFS_CONFIG environment variable
    if let Ok(path) = std::env::var("CASTORFS_CONFIG") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. castorfs.yaml in current directory
    let cwd_config = PathBuf::from("castorfs.yaml");
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    None
}

/// Config file (if any), then `-o` options, then `-d`, then defaults.
fn load_config(cli: &Cli) -> Result<MountConfig, Box<dyn std::error::Error>> {
    let mut config = match cli.config.clone().or_else(find_config) {
        Some(path) => MountConfig::from_file(&path)?,
        None => MountConfig::default(),
    };
    config.apply_mount_options(&cli.options)?;
    if cli.debug {
        config.debug = true;
    }

    let config = config.effective();
    config.validate_or_err()?;
    Ok(config)
}

/// `RUST_LOG` wins; otherwise `debug` with the debug flag and `info` without.
fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Attrs = cli.command {
        return commands::attrs::run();
    }

    let config = load_config(&cli)?;
    init_tracing(config.debug);

    match cli.command {
        Commands::Mount { mountpoint } => {
            commands::mount::run(config, commands::mount::MountArgs { mountpoint })?;
        }
        Commands::Config => {
            commands::config::run(&config)?;
        }
        Commands::Attrs => {}
    }

    Ok(())
}
