mod cli;
mod client;
mod config;
mod monitor;
mod server;
mod session;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, CtlAction};
use crate::client::ControlClient;
use crate::config::{Config, ServerConfig};
use crate::monitor::{Monitor, TriggerSet};
use crate::server::AppState;
use crate::session::chrome::{ChromeLauncher, ChromeSession};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chatwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => serve(&cli.config, bind).await,
        Commands::Run {
            bind,
            start_delay_secs,
        } => run(&cli.config, bind, start_delay_secs).await,
        Commands::Watch { no_wait } => watch(&cli.config, no_wait).await,
        Commands::Ctl { action, url } => ctl(&url, action).await,
        Commands::Check { sample } => check(&cli.config, sample.as_deref()),
    }
}

fn load_config(path: &Path) -> Result<Config> {
    info!("Loading configuration from: {}", path.display());
    let config = Config::load(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Triggers: {:?}", config.triggers);
    info!("  Reply: {}", config.reply_text);
    info!("  Chat: {}", config.chat.url);
    info!("  Poll interval: {}ms", config.monitor.poll_interval_ms);
    Ok(config)
}

/// Server settings from the config file. The file is re-read on every
/// `/start`, so a broken file here only costs the custom bind address.
fn server_settings(path: &Path) -> ServerConfig {
    match Config::load(path) {
        Ok(config) => config.server,
        Err(e) => {
            warn!(
                "{}: {}; using default server settings until it is fixed",
                path.display(),
                e
            );
            ServerConfig::default()
        }
    }
}

async fn serve(config_path: &Path, bind: Option<SocketAddr>) -> Result<()> {
    let settings = server_settings(config_path);
    let monitor = Monitor::new();
    let state = AppState::new(
        monitor.clone(),
        config_path.to_path_buf(),
        Arc::new(ChromeLauncher),
    );

    let listener = server::bind(bind.unwrap_or(settings.bind)).await?;
    server::serve(listener, state, shutdown_signal()).await?;

    stop_monitor(&monitor).await;
    Ok(())
}

async fn run(
    config_path: &Path,
    bind: Option<SocketAddr>,
    start_delay_secs: Option<u64>,
) -> Result<()> {
    let settings = server_settings(config_path);
    let monitor = Monitor::new();
    let state = AppState::new(
        monitor.clone(),
        config_path.to_path_buf(),
        Arc::new(ChromeLauncher),
    );

    let listener = server::bind(bind.unwrap_or(settings.bind)).await?;
    let mut addr = listener
        .local_addr()
        .context("Listener has no local address")?;
    if addr.ip().is_unspecified() {
        addr.set_ip(Ipv4Addr::LOCALHOST.into());
    }
    let server = tokio::spawn(server::serve(listener, state, shutdown_signal()));

    let client = ControlClient::new(format!("http://{addr}"));
    client.wait_until_ready(10, Duration::from_secs(1)).await?;

    let delay = start_delay_secs.unwrap_or(settings.start_delay_secs);
    info!("Starting monitoring in {}s...", delay);
    tokio::time::sleep(Duration::from_secs(delay)).await;

    match client.start().await {
        Ok(response) if !response.is_error() => {
            info!("Monitoring started; press Ctrl-C to stop the server")
        }
        Ok(response) => error!(
            "Start failed: {}",
            response.message.unwrap_or_else(|| "no details".to_string())
        ),
        Err(e) => error!("Could not reach the control server: {:#}", e),
    }

    server.await.context("Server task failed")??;
    stop_monitor(&monitor).await;
    Ok(())
}

async fn watch(config_path: &Path, no_wait: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let session = ChromeSession::open(&config.chat)
        .await
        .context("Browser setup failed")?;

    if !no_wait {
        println!("\nLog in in the browser window and open the channel to watch.");
        println!("Press Enter once you are logged in and positioned in the channel...");
        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .context("Failed to read from stdin")?;
    }

    let monitor = Monitor::new();
    monitor.start(&config, Box::new(session)).await?;
    info!("Monitoring; press Ctrl-C to stop");

    shutdown_signal().await;
    stop_monitor(&monitor).await;
    Ok(())
}

async fn ctl(url: &str, action: CtlAction) -> Result<()> {
    let client = ControlClient::new(url);
    let response = match action {
        CtlAction::Start => client.start().await?,
        CtlAction::Stop => client.stop().await?,
        CtlAction::Status => client.status().await?,
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.is_error() {
        bail!(
            "{}",
            response
                .message
                .unwrap_or_else(|| "request failed".to_string())
        );
    }
    Ok(())
}

fn check(config_path: &Path, sample: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    match sample {
        Some(text) => match TriggerSet::new(&config.triggers).first_match(text) {
            Some(trigger) => println!(
                "Would reply \"{}\" (matched trigger \"{}\")",
                config.reply_text, trigger
            ),
            None => println!("No trigger matches; no reply would be sent"),
        },
        None => println!("Configuration OK"),
    }
    Ok(())
}

async fn stop_monitor(monitor: &Monitor) {
    if monitor.stop().await.is_ok() {
        info!("Waiting for the monitor to finish its current cycle...");
    }
    monitor.join().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
