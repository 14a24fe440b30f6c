use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use plughost::http::{dispatch, HttpRequest};
use plughost::plugins::INTROSPECTION_PATH;
use plughost::{Config, HostContext, HostVersion, PluginIntrospection, PluginTracker};

#[derive(Parser)]
#[command(name = "plughost")]
#[command(about = "Plugin host for long-running monitoring services", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load all plugins and keep them running until Ctrl-C
    Run {
        /// Configuration file (defaults to ~/.plughost/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Load all plugins, print the introspection listing and exit
    List {
        /// Configuration file (defaults to ~/.plughost/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging. PLUGHOST_LOG_FORMAT=json switches to one JSON object per line.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("PLUGHOST_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) | None => {
            println!(
                "plughost {} (plugin API {})",
                env!("CARGO_PKG_VERSION"),
                plughost::plugins::PLUGIN_API_VERSION
            );
        }
        Some(Commands::Run { config }) => {
            let (_host, tracker) = start(config).await?;
            info!(plugins = tracker.plugin_count(), "Host running, press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutting down");
            tracker.shutdown_plugins().await?;
        }
        Some(Commands::List { config }) => {
            let (_host, tracker) = start(config).await?;
            let endpoint = PluginIntrospection::new(tracker.clone());
            let response = dispatch(&endpoint, &HttpRequest::get(INTROSPECTION_PATH)).await;
            println!("{}", String::from_utf8_lossy(&response.body));
            tracker.shutdown_plugins().await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(&path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    Ok(config)
}

/// Build the host and take every plugin through scan, activate and finalize.
async fn start(
    config_path: Option<PathBuf>,
) -> anyhow::Result<(Arc<HostContext>, Arc<PluginTracker>)> {
    let config = load_config(config_path)?;
    let host = Arc::new(HostContext::new(HostVersion::current()));
    let tracker = PluginTracker::create(&host, config.plugins);

    tracker.scan_plugins()?;
    tracker.activate_plugins()?;

    if let Err(e) = tracker.finalize_plugins() {
        error!(error = %e, "Plugin finalize failed");
        tracker.shutdown_plugins().await?;
        return Err(e).context("Plugin finalize failed");
    }

    if host.is_fatal() {
        tracker.shutdown_plugins().await?;
        bail!("A fatal condition was raised while loading plugins");
    }

    Ok((host, tracker))
}
