//! # ssegw
//!
//! Headless gateway listener: connects, subscribes to the requested
//! channels and prints every received event as one JSON line on stdout
//! until Ctrl-C.

#![deny(unsafe_code)]

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::{info, warn};

use ssegw_client::{ConnectConfig, ConnectionManager, EventCallback, SubscribeRequest};
use ssegw_core::Filter;
use ssegw_core::logging::{LogFormat, init_subscriber};
use ssegw_settings::{ClientSettings, apply_env_overrides, load_settings_from_path};

/// SSE gateway client.
#[derive(Parser, Debug)]
#[command(name = "ssegw", about = "SSE gateway client", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level filter (overridden by `RUST_LOG`).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Compact)]
    log_format: LogFormatArg,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to channels and print events as JSON lines.
    Listen(ListenArgs),
}

#[derive(Args, Debug)]
struct ListenArgs {
    /// Gateway server base URL (overrides settings).
    #[arg(long)]
    server: Option<String>,

    /// Logical client id.
    #[arg(long, default_value = "ssegw-cli")]
    client_id: String,

    /// Channel to subscribe to. Repeatable.
    #[arg(long = "channel", required = true)]
    channels: Vec<String>,

    /// Event filter as `key=value`, applied to every channel. Repeatable.
    #[arg(long = "filter", value_parser = parse_filter_pair)]
    filters: Vec<(String, String)>,

    /// JSON settings file, deep-merged over defaults.
    #[arg(long)]
    settings: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormatArg {
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Compact => Self::Compact,
            LogFormatArg::Json => Self::Json,
        }
    }
}

fn parse_filter_pair(raw: &str) -> Result<(String, String)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected key=value, got '{raw}'");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("filter key must not be empty");
    }
    Ok((key.to_owned(), value.to_owned()))
}

fn build_filter(pairs: &[(String, String)]) -> Option<Filter> {
    if pairs.is_empty() {
        return None;
    }
    Some(
        pairs
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

fn load_settings(path: Option<&PathBuf>) -> Result<ClientSettings> {
    match path {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => {
            let mut settings = ClientSettings::headless();
            apply_env_overrides(&mut settings);
            Ok(settings)
        }
    }
}

async fn listen(args: ListenArgs) -> Result<()> {
    let mut settings = load_settings(args.settings.as_ref())?;
    if let Some(server) = args.server {
        settings.server_url = Some(server);
    }
    if settings.server_url.is_none() {
        bail!("no gateway server URL; pass --server or set SSEGW_SERVER_URL");
    }

    let manager = ConnectionManager::with_reqwest(settings);
    let connection = manager
        .connect(ConnectConfig::from(args.client_id.as_str()).on_connect(|session| {
            info!(dispatcher_id = ?session.dispatcher_id, "gateway session established");
        }))
        .await
        .context("failed to connect to gateway")?;
    if !connection.is_connected() {
        bail!("connection is inert; see the warnings above");
    }

    let printer = EventCallback::new(|event| {
        let line = serde_json::to_string(&event).unwrap_or_default();
        let mut stdout = std::io::stdout().lock();
        if writeln!(stdout, "{line}").is_err() {
            warn!("stdout closed; dropping event");
        }
    });
    let filter = build_filter(&args.filters);
    for channel in &args.channels {
        let mut request = SubscribeRequest::new(channel.as_str(), printer.clone());
        if let Some(filter) = &filter {
            request = request.with_filter(filter.clone());
        }
        let channel_name = channel.clone();
        let _ = connection
            .subscribe(request.on_subscribed(move || info!(channel = %channel_name, "subscribed")))
            .with_context(|| format!("failed to subscribe to '{channel}'"))?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl-C")?;
    info!("shutting down");
    connection.disconnect();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_subscriber(&cli.log_level, cli.log_format.into());
    match cli.command {
        Command::Listen(args) => listen(args).await,
    }
}
