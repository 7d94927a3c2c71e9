//! Texnouz EVSE - CLI service
//!
//! Headless reservation and remote charging engine suitable for deployment
//! as a systemd service, Docker container, or standalone process.
//!
//! ```sh
//! # Run with default config (~/.config/texnouz-evse/config.toml)
//! evse-service
//!
//! # Custom config path
//! evse-service --config /etc/texnouz-evse/config.toml
//!
//! # Validate config without starting
//! evse-service --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use texnouz_evse::config::AppConfig;
use texnouz_evse::server::{init_tracing, ServerHandle, ServerOptions};

/// Texnouz EVSE - reservation and remote charging engine.
#[derive(Parser, Debug)]
#[command(
    name = "evse-service",
    version,
    about = "Reservation and remote start/stop engine for EV charging pools",
    long_about = "Texnouz EVSE - manages reservations, remote charging sessions \
                  and authorization for charging pools, stations and EVSEs.\n\n\
                  Default config: ~/.config/texnouz-evse/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "EVSE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Override the default reservation duration in seconds.
    #[arg(long)]
    reservation_secs: Option<u64>,

    /// Validate the configuration file and exit without starting the service.
    #[arg(long)]
    check: bool,

    /// Write the default configuration to the config path and exit.
    #[arg(long, conflicts_with = "check")]
    init: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(texnouz_evse::default_config_path);

    if cli.init {
        AppConfig::default().save(&config_path)?;
        println!("Default configuration written to {}", config_path.display());
        return Ok(());
    }

    // ── Load configuration ─────────────────────────────────────
    let (mut config, load_error) = match AppConfig::load(&config_path) {
        Ok(cfg) => (cfg, None),
        Err(e) if cli.check => {
            eprintln!("❌ Invalid configuration {}: {}", config_path.display(), e);
            std::process::exit(1);
        }
        Err(e) => (AppConfig::default(), Some(e)),
    };

    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(secs) = cli.reservation_secs {
        config.reservations.default_duration_secs = secs;
    }

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        if let Err(e) = config.validate() {
            eprintln!("❌ Invalid configuration {}: {}", config_path.display(), e);
            std::process::exit(1);
        }
        let stations: usize = config.pools.iter().map(|p| p.stations.len()).sum();
        let evses: usize = config
            .pools
            .iter()
            .flat_map(|p| p.stations.iter())
            .map(|s| s.evses.len())
            .sum();
        println!("✅ Configuration is valid");
        println!("   Config file  : {}", config_path.display());
        println!("   Provider     : {}", config.provider.id);
        println!(
            "   Topology     : {} pools, {} stations, {} EVSEs",
            config.pools.len(),
            stations,
            evses
        );
        println!("   Tokens       : {}", config.tokens.len());
        println!("   Reservation  : {}s", config.reservations.default_duration_secs);
        println!("   Log level    : {}", config.logging.level);
        return Ok(());
    }

    // Init tracing first so subsequent logs are formatted properly
    init_tracing(&config);
    match load_error {
        None => info!("Configuration loaded from {}", config_path.display()),
        Some(e) => {
            error!("Failed to load config from {}: {}", config_path.display(), e);
            error!("Using default configuration.");
        }
    }

    // ── Start service ──────────────────────────────────────────
    let handle = ServerHandle::start(ServerOptions::from(config)).await?;

    // Install OS signal handlers (SIGTERM, SIGINT)
    handle.install_signal_handler();

    info!("🚀 Press Ctrl+C to shutdown gracefully.");

    // Wait for shutdown signal, then clean up
    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}
