mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sbs_relay::config::{ConfigFile, DumpConfig, PublishConfig, PublishOverrides, StoreConfig, StoreOverrides};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Instrument, error};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(
    name = "sbs-relay",
    version,
    about = "Relay a BaseStation SBS1 feed to NATS and store it in hourly files"
)]
struct Cli {
    /// TOML config file (default: $SBS_RELAY_CONFIG, then ./sbs-relay.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serve Prometheus metrics on this port
    #[arg(long, global = true)]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read the SBS1 feed and publish compressed batches of compact lines
    Publish {
        /// Feed hostname (default: localhost)
        #[arg(long)]
        feed_host: Option<String>,
        /// Feed port (default: 30003)
        #[arg(long)]
        feed_port: Option<u16>,
        /// Batch window in seconds (default: 3)
        #[arg(long)]
        batch_window: Option<u64>,
        /// NATS server URL
        #[arg(long)]
        nats_url: Option<String>,
        /// NATS subject to publish to
        #[arg(long)]
        subject: Option<String>,
    },
    /// Subscribe to batches and append them to hourly rotating files
    Store {
        /// NATS server URL
        #[arg(long)]
        nats_url: Option<String>,
        /// NATS subject to subscribe to
        #[arg(long)]
        subject: Option<String>,
        /// Directory for the hourly files (default: ./data)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// File name prefix (default: fr)
        #[arg(long)]
        file_prefix: Option<String>,
    },
    /// Subscribe to batches and print them to stdout
    Dump {
        /// NATS server URL
        #[arg(long)]
        nats_url: Option<String>,
        /// NATS subject to subscribe to
        #[arg(long)]
        subject: Option<String>,
        /// Print one JSON object per record instead of the compact lines
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    sbs_relay::log_format::init_tracing();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let file = ConfigFile::load_resolved(cli.config.as_deref())?;

    if let Some(port) = cli.metrics_port.or(file.metrics_port) {
        let handle = sbs_relay::metrics::init_metrics()?;
        tokio::spawn(
            async move {
                if let Err(e) = sbs_relay::metrics::start_metrics_server(port, handle).await {
                    error!("{:#}", e);
                }
            }
            .instrument(tracing::info_span!("metrics_server")),
        );
    }

    match cli.command {
        Commands::Publish {
            feed_host,
            feed_port,
            batch_window,
            nats_url,
            subject,
        } => {
            let config = PublishConfig::resolve(
                &file,
                PublishOverrides {
                    feed_host,
                    feed_port,
                    batch_window_secs: batch_window,
                    nats_url,
                    subject,
                },
            )?;
            commands::handle_publish(config).await
        }
        Commands::Store {
            nats_url,
            subject,
            output_dir,
            file_prefix,
        } => {
            let config = StoreConfig::resolve(
                &file,
                StoreOverrides {
                    nats_url,
                    subject,
                    output_dir,
                    file_prefix,
                },
            )?;
            commands::handle_store(config).await
        }
        Commands::Dump {
            nats_url,
            subject,
            json,
        } => {
            let config = DumpConfig::resolve(&file, nats_url, subject, json)?;
            commands::handle_dump(config).await
        }
    }
}
