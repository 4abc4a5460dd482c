//! Binary entrypoint for the greenhouse-ingest CLI.
//!
//! Commands:
//! - `start [--bind <addr>]` - run the ingestion server
//! - `init` - write a starter `config.toml`
//! - `status` - print configuration summary and reading log size as JSON
//! - `smoketest --addr <host:port> [--count <n>] [--start-seq <s>]` - send signed test frames
//!
//! See the library crate docs for module-level details: `greenhouse_ingest::`.
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use greenhouse_ingest::auth::FrameAuthenticator;
use greenhouse_ingest::config::Config;
use greenhouse_ingest::protocol::SensorPacket;
use greenhouse_ingest::server::IngestServer;
use greenhouse_ingest::storage;

#[derive(Parser)]
#[command(name = "greenhouse-ingest")]
#[command(about = "Authenticated TCP ingestion server for greenhouse sensor nodes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the ingestion server
    Start {
        /// Listen address, overrides server.host/server.port (e.g. 0.0.0.0:1234)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Write a default configuration file
    Init,
    /// Show configuration and reading log summary
    Status,
    /// Send signed synthetic readings to a running server
    #[command(name = "smoketest")]
    SmokeTest {
        /// Server address
        #[arg(short, long)]
        addr: String,
        /// Number of frames to send
        #[arg(short = 'n', long, default_value_t = 5)]
        count: u32,
        /// Sequence number of the first frame
        #[arg(short, long, default_value_t = 0)]
        start_seq: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_missing = tokio::fs::metadata(&cli.config).await.is_err();
    let config = match cli.command {
        Commands::Init => None,
        _ if config_missing => Some(Config::default()),
        _ => Some(Config::load(&cli.config).await?),
    };
    init_logging(&config, cli.verbose);
    if config.is_some() && config_missing {
        warn!("Config file {} not found, using defaults", cli.config);
    }

    match cli.command {
        Commands::Start { bind } => {
            let config = config.unwrap_or_default();
            info!("Starting greenhouse-ingest v{}", env!("CARGO_PKG_VERSION"));
            let server = IngestServer::from_config(&config, bind.as_deref()).await?;
            server.run().await?;
        }
        Commands::Init => {
            info!("Initializing new configuration");
            if !config_missing {
                warn!("{} already exists; leaving it untouched", cli.config);
                return Ok(());
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let config = config.unwrap_or_default();
            let (_, source) = config.auth.resolve_secret()?;
            let csv_path = std::path::Path::new(&config.storage.csv_path);
            let records = storage::count_records(csv_path)?;
            let payload = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "bind": config.server.bind_addr(),
                "idle_timeout_secs": config.server.idle_timeout_secs,
                "max_tracked_clients": config.server.max_tracked_clients,
                "secret_source": source.to_string(),
                "csv_path": config.storage.csv_path,
                "csv_exists": csv_path.exists(),
                "timestamp_zone": config.storage.timestamp_zone,
                "records": records,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::SmokeTest {
            addr,
            count,
            start_seq,
        } => {
            let config = config.unwrap_or_default();
            let (secret, source) = config.auth.resolve_secret()?;
            info!("Smoke test against {} using secret from {}", addr, source);
            let authenticator = FrameAuthenticator::new(secret);

            let mut stream = TcpStream::connect(&addr)
                .await
                .with_context(|| format!("Failed to connect to {}", addr))?;
            for i in 0..count {
                let sequence = start_seq.wrapping_add(i);
                let packet = SensorPacket::new(
                    sequence,
                    22,
                    55,
                    1.8,
                    420.0,
                    chrono::Utc::now().timestamp(),
                );
                stream
                    .write_all(&authenticator.seal(&packet).to_bytes())
                    .await?;
                info!("Sent frame seq={}", sequence);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            stream.shutdown().await?;

            let payload = serde_json::json!({
                "status": "sent",
                "addr": addr,
                "frames": count,
                "first_sequence": start_seq,
            });
            println!("{}", payload);
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .map(|c| c.logging.level_filter())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let file = config.as_ref().and_then(|c| c.logging.file.clone()).and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| eprintln!("Cannot open log file {}: {}", path, e))
            .ok()
    });
    let security_path = config.as_ref().and_then(|c| c.logging.security_file.clone());
    let file = file.map(|f| std::sync::Arc::new(std::sync::Mutex::new(f)));

    // With a log file and no terminal, skip the console copy to avoid duplicates.
    let to_console = file.is_none() || atty::is(atty::Stream::Stdout);

    builder.format(move |fmt, record| {
        let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let line = format!("{} [{}] {}", ts, record.level(), record.args());

        if let Some(ref file) = file {
            if let Ok(mut guard) = file.lock() {
                let _ = writeln!(guard, "{}", line);
            }
        }

        if record.target() == "security" {
            if let Some(ref sec_path) = security_path {
                if let Ok(mut sf) = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(sec_path)
                {
                    let _ = writeln!(sf, "{}", line);
                }
            }
        }

        if to_console {
            writeln!(fmt, "{}", line)
        } else {
            Ok(())
        }
    });
    let _ = builder.try_init();
}
