//! gust - LAN throughput testing with broadcast discovery

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gust::client::{Client, ClientConfig};
use gust::config::Config;
use gust::protocol::DISCOVERY_PORT;
use gust::serve::{Server, ServerConfig};
use gust::stats::output_json;

/// Initialize logging with optional file output
fn init_logging(log_file: Option<&str>, log_level: Option<&str>) -> anyhow::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let level = log_level.unwrap_or("info");
    let env_filter =
        EnvFilter::from_default_env().add_directive(format!("gust={}", level).parse()?);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .without_time();

    if let Some(file_path) = log_file {
        // Expand tilde to home directory
        let expanded_path = if file_path.starts_with("~/") {
            dirs::home_dir()
                .map(|home| home.join(&file_path[2..]))
                .unwrap_or_else(|| PathBuf::from(file_path))
        } else {
            PathBuf::from(file_path)
        };

        // Ensure parent directory exists
        if let Some(parent) = expanded_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Create non-blocking file appender with daily rotation
        let file_appender = tracing_appender::rolling::daily(
            expanded_path
                .parent()
                .unwrap_or_else(|| std::path::Path::new(".")),
            expanded_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("gust.log")),
        );
        let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

        // Keep guard alive for the duration of the program
        std::mem::forget(_guard);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "gust")]
#[command(author, version, about = "LAN throughput testing with broadcast discovery")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Bytes to request per transfer (e.g., 500K, 100M, 1G)
    #[arg(short = 's', long, default_value = "100M", value_parser = parse_file_size)]
    size: u64,

    /// Number of parallel TCP transfers
    #[arg(long, default_value_t = 1)]
    tcp: usize,

    /// Number of parallel UDP transfers
    #[arg(long, default_value_t = 1)]
    udp: usize,

    /// Exit after the first test cycle
    #[arg(long)]
    once: bool,

    /// JSON output
    #[arg(long)]
    json: bool,

    /// How long to wait for an offer each cycle
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    timeout: Duration,

    /// Discovery port to listen on
    #[arg(short, long, default_value_t = DISCOVERY_PORT, env = "GUST_PORT")]
    port: u16,

    /// Log file path (e.g., "~/.config/gust/gust.log")
    #[arg(long, env = "GUST_LOG_FILE")]
    log_file: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "GUST_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start server mode
    Serve {
        /// Discovery port to broadcast offers to
        #[arg(short, long, default_value_t = DISCOVERY_PORT, env = "GUST_PORT")]
        port: u16,

        /// Time between offer broadcasts
        #[arg(long, default_value = "1s", value_parser = parse_duration)]
        interval: Duration,

        /// Payload bytes per UDP segment
        #[arg(long, default_value_t = gust::udp::DEFAULT_PAYLOAD_SIZE, value_parser = parse_nonzero_size)]
        udp_payload: usize,

        /// Write size for TCP transfers
        #[arg(long, default_value_t = gust::tcp::DEFAULT_CHUNK_SIZE, value_parser = parse_nonzero_size)]
        tcp_chunk: usize,

        /// Log file path (e.g., "~/.config/gust/gust.log")
        #[arg(long, env = "GUST_LOG_FILE")]
        log_file: Option<String>,

        /// Log level (error, warn, info, debug, trace)
        #[arg(long, env = "GUST_LOG_LEVEL")]
        log_level: Option<String>,
    },

    /// Listen for one gust server offer and print it
    Discover {
        /// Discovery timeout
        #[arg(long, default_value = "10s", value_parser = parse_duration)]
        timeout: Duration,

        /// Discovery port to listen on
        #[arg(short, long, default_value_t = DISCOVERY_PORT, env = "GUST_PORT")]
        port: u16,
    },
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

fn parse_nonzero_size(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_file_size(s: &str) -> Result<u64, String> {
    let s = s.to_uppercase();
    let (num, suffix) = if s.ends_with('G') {
        (s.trim_end_matches('G'), 1024 * 1024 * 1024u64)
    } else if s.ends_with('M') {
        (s.trim_end_matches('M'), 1024 * 1024u64)
    } else if s.ends_with('K') {
        (s.trim_end_matches('K'), 1024u64)
    } else {
        (s.as_str(), 1u64)
    };

    num.parse::<u64>()
        .map(|n| n * suffix)
        .map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config file (falls back to defaults if not found)
    let file_config = Config::load().unwrap_or_default();

    // Logging settings depend on mode; resolve them before installing the
    // subscriber since the registry can only be initialized once.
    let (log_file, log_level) = match &cli.command {
        Some(Commands::Serve {
            log_file,
            log_level,
            ..
        }) => (
            log_file
                .clone()
                .or_else(|| file_config.server.log_file.clone()),
            log_level
                .clone()
                .or_else(|| file_config.server.log_level.clone()),
        ),
        _ => (
            cli.log_file
                .clone()
                .or_else(|| file_config.client.log_file.clone()),
            cli.log_level
                .clone()
                .or_else(|| file_config.client.log_level.clone()),
        ),
    };
    init_logging(log_file.as_deref(), log_level.as_deref())?;

    match cli.command {
        Some(Commands::Serve {
            port,
            interval,
            udp_payload,
            tcp_chunk,
            ..
        }) => {
            // Use CLI values, falling back to config file, then defaults
            let discovery_port = if port != DISCOVERY_PORT {
                port
            } else {
                file_config.server.port.unwrap_or(DISCOVERY_PORT)
            };

            let broadcast_interval = if interval != Duration::from_secs(1) {
                interval
            } else {
                file_config
                    .server
                    .interval_secs
                    .map(Duration::from_secs)
                    .unwrap_or(interval)
            };

            let udp_payload_size = if udp_payload != gust::udp::DEFAULT_PAYLOAD_SIZE {
                udp_payload
            } else {
                file_config.server.udp_payload.unwrap_or(udp_payload)
            };

            let tcp_chunk_size = if tcp_chunk != gust::tcp::DEFAULT_CHUNK_SIZE {
                tcp_chunk
            } else {
                file_config.server.tcp_chunk.unwrap_or(tcp_chunk)
            };

            let config = ServerConfig {
                discovery_port,
                broadcast_interval,
                udp_payload_size,
                tcp_chunk_size,
                ..ServerConfig::default()
            };

            let server = Arc::new(Server::new(config));
            let handle = Arc::clone(&server);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutting down");
                    handle.shutdown();
                }
            });

            server.run().await?;
        }

        Some(Commands::Discover { timeout, port }) => {
            println!("Searching for gust servers...\n");

            match gust::discover::discover(port, timeout).await? {
                Some(server) => println!("Found server: {}", server),
                None => println!("No gust servers found."),
            }
        }

        None => {
            // Client mode: apply config file defaults where CLI didn't override
            let file_size = if cli.size != 100 * 1024 * 1024 {
                cli.size
            } else {
                file_config
                    .client
                    .file_size
                    .as_ref()
                    .and_then(|s| parse_file_size(s).ok())
                    .unwrap_or(cli.size)
            };

            let tcp_connections = if cli.tcp != 1 {
                cli.tcp
            } else {
                file_config.client.tcp_connections.unwrap_or(cli.tcp)
            };

            let udp_connections = if cli.udp != 1 {
                cli.udp
            } else {
                file_config.client.udp_connections.unwrap_or(cli.udp)
            };

            let discovery_port = if cli.port != DISCOVERY_PORT {
                cli.port
            } else {
                file_config.client.port.unwrap_or(cli.port)
            };

            let discovery_timeout = if cli.timeout != Duration::from_secs(10) {
                cli.timeout
            } else {
                file_config
                    .client
                    .timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(cli.timeout)
            };

            let json_output = cli.json || file_config.client.json_output.unwrap_or(false);
            let once = cli.once || file_config.client.once.unwrap_or(false);

            let config = ClientConfig {
                discovery_port,
                discovery_timeout,
                file_size,
                tcp_connections,
                udp_connections,
            };
            run_client(config, once, json_output).await?;
        }
    }

    Ok(())
}

/// Run discovery and transfer cycles until interrupted, or once with --once.
async fn run_client(config: ClientConfig, once: bool, json_output: bool) -> Result<()> {
    let client = Client::new(config);

    println!("Client started, listening for offer requests...");
    loop {
        let Some(server) = client.discover().await? else {
            if once {
                println!("No server found.");
                break;
            }
            println!("No server found, still listening...");
            continue;
        };

        println!("Server found: {}", server);

        let reports = client.run_transfers(&server).await;
        if json_output {
            println!("{}", output_json(&reports));
        } else {
            for report in &reports {
                println!("{}", report);
            }
        }

        if once {
            break;
        }
        println!("All transfers complete, listening to offer requests");
    }

    Ok(())
}
