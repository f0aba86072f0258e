use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use log::info;

use tftp_lite::config::{AppConfig, ClientSection, ServerSection};
use tftp_lite::tftp::client::{self, ClientConfig};
use tftp_lite::tftp::core::{DEFAULT_TIMEOUT, MAX_RETRY};
use tftp_lite::tftp::server::{self, Config};

const DEFAULT_PORT: u16 = 69;

#[derive(Debug, Parser)]
#[command(name = "tftp-lite", version, about = "Lock-step TFTP client and server")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download a file from a TFTP server
    Get(GetArgs),
    /// Serve a file (or a directory of files) over TFTP
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
struct GetArgs {
    /// Name of the file on the server
    file: String,

    /// Server host name or IP address
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Where to save the file (defaults to the remote base name)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Wait per attempt, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Retransmissions before giving up
    #[arg(long)]
    retries: Option<u32>,
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// File to serve, or directory whose files are served by name
    path: Option<PathBuf>,

    /// Address to bind
    #[arg(short, long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Stop after the first transfer
    #[arg(long)]
    once: bool,

    /// Wait per attempt, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Retransmissions of one block before giving up
    #[arg(long)]
    retries: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let cli = Cli::parse();
    let app = AppConfig::load_optional(cli.config.as_deref())?;

    match cli.command {
        Command::Get(args) => get(args, app.client).await,
        Command::Serve(args) => serve(args, app.server).await,
    }
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .init();
}

async fn get(args: GetArgs, section: ClientSection) -> Result<()> {
    let host = args.host.or(section.host).ok_or_else(|| {
        anyhow!("Server host not specified. Please use --host or the config file.")
    })?;
    let port = args.port.or(section.port).unwrap_or(DEFAULT_PORT);
    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .or(section.timeout)
        .unwrap_or(DEFAULT_TIMEOUT);
    let max_retry = args.retries.or(section.max_retry).unwrap_or(MAX_RETRY);

    let server = resolve(&host, port).await?;
    let config = ClientConfig::new(server.ip(), server.port())
        .with_timeout(timeout)
        .with_max_retry(max_retry);

    let output = args.output.unwrap_or_else(|| default_output(&args.file));
    client::run(config, &args.file, &output).await
}

async fn serve(args: ServeArgs, section: ServerSection) -> Result<()> {
    let path = args
        .path
        .or(section.path)
        .ok_or_else(|| anyhow!("Nothing to serve. Please give a PATH or set it in the config file."))?;
    let bind = args
        .bind
        .or(section.bind)
        .unwrap_or_else(|| "0.0.0.0".to_string());
    let ip: IpAddr = bind
        .parse()
        .with_context(|| format!("Invalid IP address '{}'", bind))?;
    let port = args.port.or(section.port).unwrap_or(DEFAULT_PORT);
    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .or(section.timeout)
        .unwrap_or(DEFAULT_TIMEOUT);
    let max_retry = args.retries.or(section.max_retry).unwrap_or(MAX_RETRY);

    let config = Config::new(ip, port, path)
        .with_timeout(timeout)
        .with_max_retry(max_retry);

    info!("Press Ctrl+C to stop");
    server::run(config, args.once).await
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("Failed to resolve {}", host))?
        .next()
        .ok_or_else(|| anyhow!("No address found for {}", host))
}

fn default_output(remote_file: &str) -> PathBuf {
    Path::new(remote_file)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download.bin"))
}
