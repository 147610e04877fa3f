use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hostmount_csi::config::{DEFAULT_BASE_DIR, DEFAULT_OVERLAY_ROOT, DEFAULT_PROTECTED_PATH};
use hostmount_csi::transport::client::CsiClient;
use hostmount_csi::transport::server::CsiServer;
use hostmount_csi::transport::{load_client_tls, load_server_tls};
use hostmount_csi::{DriverConfig, HostMountDriver};

#[derive(Parser, Debug)]
#[command(name = "hostmount-csi", version, about = "RK8s host path CSI node plugin")]
struct Cli {
    /// Log line format
    #[arg(long, global = true, env = "HOSTMOUNT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the node plugin.
    Serve(ServeArgs),
    /// Ask a running plugin whether it is healthy.
    Probe(ProbeArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// QUIC listen address
    #[arg(long, env = "HOSTMOUNT_LISTEN", default_value = "0.0.0.0:7443")]
    listen: SocketAddr,

    /// PEM certificate chain presented to clients
    #[arg(long)]
    cert: PathBuf,

    /// PEM private key for `--cert`
    #[arg(long)]
    key: PathBuf,

    /// Identifier of this node, reported by GetNodeInfo
    #[arg(long, env = "NODE_ID")]
    node_id: String,

    /// Shared read-only lower layer of `apm` volumes
    #[arg(long, default_value = DEFAULT_BASE_DIR)]
    base_dir: PathBuf,

    /// Root of the per-volume overlay directories
    #[arg(long, default_value = DEFAULT_OVERLAY_ROOT)]
    overlay_root: PathBuf,

    /// Path the plugin must never create
    #[arg(long, default_value = DEFAULT_PROTECTED_PATH)]
    protected_path: PathBuf,
}

#[derive(Args, Debug)]
struct ProbeArgs {
    /// Address of the plugin
    #[arg(long, default_value = "127.0.0.1:7443")]
    addr: SocketAddr,

    /// Name expected in the plugin's certificate
    #[arg(long, default_value = "localhost")]
    server_name: String,

    /// PEM CA certificate(s) trusted for the plugin
    #[arg(long)]
    ca: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A panic on the blocking pool must take the whole plugin down.
    std::panic::set_hook(Box::new(|panic_info| {
        error!(%panic_info, "hostmount-csi panicked");
        eprintln!("[PANIC] hostmount-csi: {panic_info}");
        std::process::exit(1);
    }));

    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Probe(args) => probe(args).await,
    }
}

/// Install the global subscriber; `RUST_LOG` overrides the `info` default.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);
    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(e) = result {
        eprintln!("failed to initialize tracing: {e}");
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = DriverConfig {
        base_dir: args.base_dir,
        overlay_root: args.overlay_root,
        protected_path: args.protected_path,
        ..DriverConfig::default()
    };
    let tls = load_server_tls(&args.cert, &args.key).context("loading server certificate")?;
    let driver = Arc::new(HostMountDriver::new(config, args.node_id.clone()));
    let server = CsiServer::new(args.listen, tls, driver).context("starting QUIC endpoint")?;

    info!(node_id = %args.node_id, listen = %args.listen, "hostmount-csi started");

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        res = server.serve() => res.context("serving CSI requests")?,
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = tokio::signal::ctrl_c() => info!("received interrupt, shutting down"),
    }

    let endpoint = server.endpoint();
    endpoint.close(quinn::VarInt::from_u32(0), b"plugin shutdown");
    endpoint.wait_idle().await;
    Ok(())
}

async fn probe(args: ProbeArgs) -> Result<()> {
    let tls = load_client_tls(&args.ca).context("loading CA certificate")?;
    let client = CsiClient::connect(args.addr, &args.server_name, tls)
        .await
        .with_context(|| format!("connecting to {}", args.addr))?;
    let healthy = client.probe().await.context("probe request")?;
    client.close();

    if !healthy {
        bail!("plugin at {} reports unhealthy", args.addr);
    }
    info!(addr = %args.addr, "plugin is healthy");
    Ok(())
}
