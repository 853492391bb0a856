//! COURIER Protocol CLI
//!
//! Container-Oriented Unified Routing & Interchange for Endpoint Relay

use courier_cli::config::Config;
use courier_cli::progress::{format_bytes, TransferProgress};

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use courier_bridge::{Bridge, BridgeConfig};
use courier_compress::{Compressor, DeflateCompressor};
use courier_core::Container;
use courier_crypto::{AesGcmCrypto, Crypto};
use courier_scheduler::{Scheduler, WorkerPool, WorkerPoolConfig};
use courier_server::{Server, ServerCallbacks, ServerConfig};
use courier_session::file_transfer::FileRecord;
use courier_session::session::{Callbacks, Session, SessionConfig};
use courier_session::{FrameCodes, SessionKind};

/// COURIER - typed containers over a framed TCP session
#[derive(Parser)]
#[command(name = "courier")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/courier/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a server that accepts sessions and routes containers between
    /// them, optionally bridging to an upstream main server.
    Serve {
        /// Address to listen on (overrides the config file)
        #[arg(long)]
        bind: Option<String>,

        /// Upstream main-server address. When set, runs as a middle-tier
        /// bridge instead of a plain routing server.
        #[arg(long)]
        bridge_upstream: Option<String>,

        /// Connection key used against the upstream main server (bridge
        /// mode only). Defaults to the downstream connection key.
        #[arg(long)]
        bridge_connection_key: Option<String>,
    },

    /// Connect to a server and send a single file.
    Send {
        /// File to send
        #[arg(required = true)]
        file: String,

        /// Recipient target id
        #[arg(required = true)]
        target_id: String,

        /// Server address to connect to
        #[arg(long, required = true)]
        server: String,

        /// Recipient target sub-id
        #[arg(long, default_value = "0")]
        target_sub_id: String,
    },

    /// Generate a fresh AES-256-GCM key/iv pair for pre-sharing out of band.
    Keygen,

    /// Print the effective configuration.
    Status,

    /// Print the default configuration file path.
    ConfigPath,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { "info" })
        .init();

    if let Commands::ConfigPath = &cli.command {
        println!("{}", Config::default_path().display());
        return Ok(());
    }

    let config_path = PathBuf::from(shellexpand_home(&cli.config));
    let config = if config_path.exists() {
        Config::load(&config_path)?
    } else if config_path == Config::default_path() {
        Config::load_or_default()?
    } else {
        Config::load(&config_path)?
    };
    config.validate()?;

    match cli.command {
        Commands::Serve {
            bind,
            bridge_upstream,
            bridge_connection_key,
        } => serve(bind, bridge_upstream, bridge_connection_key, &config).await?,
        Commands::Send {
            file,
            target_id,
            server,
            target_sub_id,
        } => send_file(PathBuf::from(file), target_id, target_sub_id, server, &config).await?,
        Commands::Keygen => generate_key()?,
        Commands::Status => show_status(&config)?,
        Commands::ConfigPath => unreachable!("handled above"),
    }

    Ok(())
}

fn shellexpand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    path.to_string()
}

fn scheduler(config: &Config) -> Arc<dyn Scheduler> {
    Arc::new(WorkerPool::new(WorkerPoolConfig {
        worker_count: config.scheduler.worker_count,
        queue_capacity: config.scheduler.queue_capacity,
    }))
}

fn compressor() -> Arc<dyn Compressor> {
    Arc::new(DeflateCompressor)
}

fn crypto() -> Arc<dyn Crypto> {
    Arc::new(AesGcmCrypto)
}

/// Runs a plain routing server, or — when `bridge_upstream` is set — a
/// middle-tier bridge forwarding to that upstream address.
async fn serve(
    bind: Option<String>,
    bridge_upstream: Option<String>,
    bridge_connection_key: Option<String>,
    config: &Config,
) -> anyhow::Result<()> {
    let listen_addr: SocketAddr = bind.as_deref().unwrap_or(&config.network.listen_addr).parse()?;

    if let Some(upstream) = bridge_upstream {
        let upstream_addr: SocketAddr = upstream.parse()?;
        tracing::info!(%listen_addr, %upstream_addr, "starting bridge");

        let bridge = Bridge::start(
            BridgeConfig {
                listen_addr,
                downstream_connection_key: config.session.connection_key.clone(),
                downstream_session_limit_count: config.network.session_limit_count,
                upstream_addr,
                upstream_connection_key: bridge_connection_key.unwrap_or_else(|| config.session.connection_key.clone()),
                bridge_id: "courier-bridge".into(),
                compress_mode: config.session.compress_mode,
                encrypt_mode: config.session.encrypt_mode,
                frame_codes: FrameCodes::default(),
            },
            scheduler(config),
            compressor(),
            crypto(),
        )
        .await?;

        println!("Bridge listening on {listen_addr}, forwarding to {upstream_addr}");
        println!("Press Ctrl+C to stop");
        tokio::signal::ctrl_c().await?;
        bridge.downstream().stop();
        return Ok(());
    }

    tracing::info!(%listen_addr, "starting server");
    let output_dir = config.transfer.output_dir.clone();

    let callbacks = ServerCallbacks {
        on_message: Arc::new(|container: Container| {
            tracing::info!(
                source = %container.source_id(),
                message_type = %container.message_type(),
                "received message"
            );
        }),
        on_file_saved: Arc::new(move |notification| {
            if notification.saved_path.is_empty() {
                tracing::warn!(indication_id = %notification.indication_id, "file transfer failed");
            } else {
                println!("Saved file to {} (under {})", notification.saved_path, output_dir.display());
            }
        }),
        on_binary: Arc::new(|_frame| {}),
    };

    let server = Server::new(
        ServerConfig {
            listen_addr,
            server_id: "courier-server".into(),
            connection_key: config.session.connection_key.clone(),
            session_limit_count: config.network.session_limit_count,
            compress_mode: config.session.compress_mode,
            encrypt_mode: config.session.encrypt_mode,
            auto_echo: config.session.auto_echo,
            auto_echo_interval_seconds: config.session.auto_echo_interval_seconds,
            frame_codes: FrameCodes::default(),
        },
        scheduler(config),
        compressor(),
        crypto(),
        callbacks,
    );

    println!("Server listening on {listen_addr}");
    println!("Press Ctrl+C to stop");
    let running = Arc::clone(&server);
    tokio::spawn(async move {
        if let Err(error) = running.run().await {
            tracing::error!(%error, "server stopped");
        }
    });
    tokio::signal::ctrl_c().await?;
    server.stop();
    Ok(())
}

/// Connects to `server` as a message-line client and sends `file` as a
/// single whole-file transfer (§4.3.5) addressed to `target_id`.
async fn send_file(
    file: PathBuf,
    target_id: String,
    target_sub_id: String,
    server: String,
    config: &Config,
) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("File not found: {:?}", file);
    }
    let server_addr: SocketAddr = server.parse()?;
    let file_bytes = tokio::fs::read(&file).await?;
    let file_size = file_bytes.len() as u64;
    let filename = file.file_name().and_then(|n| n.to_str()).unwrap_or("unknown").to_string();

    println!("File: {}", file.display());
    println!("Size: {}", format_bytes(file_size));
    println!("Recipient: {target_id}/{target_sub_id}");

    let progress = TransferProgress::new(file_size, &filename);

    let callbacks = Callbacks {
        on_connection: Arc::new(|_| {}),
        on_message: Arc::new(|_| {}),
        on_file_saved: Arc::new(|_| {}),
        on_binary: Arc::new(|_| {}),
    };

    let session = Session::connect(
        server_addr,
        SessionConfig {
            source_id: "courier-send".into(),
            source_sub_id: "0".into(),
            connection_key: config.session.connection_key.clone(),
            session_type: SessionKind::MessageLine,
            compress_mode: config.session.compress_mode,
            encrypt_mode: config.session.encrypt_mode,
            auto_echo: false,
            auto_echo_interval_seconds: 0,
            bridge_mode: false,
            snipping_targets: vec![],
            frame_codes: FrameCodes::default(),
        },
        scheduler(config),
        compressor(),
        crypto(),
        callbacks,
    )
    .await?;

    session
        .send_file(FileRecord {
            indication_id: filename.clone(),
            source_id: "courier-send".into(),
            source_sub_id: "0".into(),
            target_id,
            target_sub_id,
            source_path: file.to_string_lossy().into_owned(),
            target_path: filename,
            file_bytes,
        })
        .await?;

    progress.finish_with_message("Transfer sent".to_string());
    Ok(())
}

/// Generates and prints a fresh AES-256-GCM key/iv pair, for operators who
/// want to pre-share a session key out of band.
fn generate_key() -> anyhow::Result<()> {
    let crypto = AesGcmCrypto;
    let (key, iv) = crypto.create_key()?;
    println!("key: {}", hex::encode(key));
    println!("iv:  {}", hex::encode(iv));
    Ok(())
}

/// Prints the effective configuration.
fn show_status(config: &Config) -> anyhow::Result<()> {
    println!("COURIER Protocol Status");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Network:");
    println!("  Listen: {}", config.network.listen_addr);
    println!("  Session limit: {}", config.network.session_limit_count);
    println!();
    println!("Session:");
    println!("  Compress mode: {}", config.session.compress_mode);
    println!("  Encrypt mode: {}", config.session.encrypt_mode);
    println!("  Auto echo: {}", config.session.auto_echo);
    println!();
    println!("Scheduler:");
    println!("  Workers: {}", config.scheduler.worker_count);
    println!("  Queue capacity: {}", config.scheduler.queue_capacity);
    Ok(())
}
