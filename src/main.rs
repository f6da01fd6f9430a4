//! Cluster Spots CLI - Show DX cluster spots on a SmartSDR panadapter.

use anyhow::{Context, Result};
use clap::Parser;
use cluster_spots::{
    cluster::{ClusterConfig, ClusterConnection},
    config::{Config, parse_duration},
    console::{Console, ConsoleLog, spawn_stdin_reader},
    pipeline::{LOGIN_DELAY, Pipeline, PipelineSettings},
    radio::FlexClient,
    shutdown::wait_for_interrupt,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Cluster Spots - Bridge DX cluster spots onto a SmartSDR panadapter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Radio address, or :discover: with optional key=value filters
    #[arg(long, env = "CLUSTER_SPOTS_RADIO")]
    radio: Option<String>,

    /// Station name announced to the radio
    #[arg(long)]
    station: Option<String>,

    /// Callsign to log in to the cluster with
    #[arg(short, long, env = "CLUSTER_SPOTS_CALLSIGN")]
    callsign: Option<String>,

    /// Cluster server as host:port
    #[arg(short, long, env = "CLUSTER_SPOTS_SERVER")]
    server: Option<String>,

    /// Spot lifetime on the radio (e.g. 300, 5m, 1m30s)
    #[arg(short, long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Remove spots whose comment says QRT
    #[arg(long)]
    qrt: Option<bool>,

    /// Keep one spot per callsign per band instead of per frequency
    #[arg(long)]
    one_per_band: Option<bool>,

    /// Filter command sent to the cluster after login
    #[arg(short, long)]
    filter: Option<String>,

    /// Connection timeout in seconds
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

impl Args {
    /// Apply command-line overrides on top of the file configuration.
    fn merge_into(self, mut config: Config) -> Config {
        if let Some(radio) = self.radio {
            config.radio = radio;
        }
        if let Some(station) = self.station {
            config.station = station;
        }
        if self.callsign.is_some() {
            config.callsign = self.callsign;
        }
        if self.server.is_some() {
            config.server = self.server;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(qrt) = self.qrt {
            config.qrt = qrt;
        }
        if let Some(one_per_band) = self.one_per_band {
            config.one_per_band = one_per_band;
        }
        if self.filter.is_some() {
            config.filter = self.filter;
        }
        if let Some(connect_timeout) = self.connect_timeout {
            config.connect_timeout = connect_timeout;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        if self.no_color {
            config.color = false;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file_config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let config = args.merge_into(file_config);

    let console = Arc::new(Console::stdout(config.color));

    // Initialize logging. Records go to stderr through the console so the
    // prompt is redrawn after each one.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(config.color && std::io::stderr().is_terminal())
        .with_writer(ConsoleLog::new(Arc::clone(&console)))
        .init();

    config.validate()?;
    let server = config.server.clone().unwrap_or_default();

    info!("Cluster Spots starting...");
    info!("Radio: {}", config.radio);
    info!("Server: {}", server);

    let radio = Arc::new(
        FlexClient::dial(&config.radio, &config.station, config.connect_timeout()).await?,
    );

    let cluster_config =
        ClusterConfig::new(&server).with_connect_timeout(config.connect_timeout());
    let cluster = ClusterConnection::connect(&cluster_config).await?;

    let input = spawn_stdin_reader().context("Failed to start console input")?;

    let interrupt = async {
        if let Err(e) = wait_for_interrupt().await {
            warn!("Cannot listen for interrupts: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let settings = PipelineSettings {
        registry: config.registry_settings(),
        callsign: config.callsign.clone(),
        filter: config.filter.clone(),
        login_delay: LOGIN_DELAY,
    };

    Pipeline::new(radio, console, settings)
        .run(cluster, input, interrupt)
        .await
}
