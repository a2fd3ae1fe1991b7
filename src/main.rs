//! gredis server entry point.
//!
//! Parses flags, replays the append-only log into a fresh store, then serves
//! RESP clients until Ctrl+C.

use anyhow::Context;
use gredis::aof::{AofConfig, AppendOnlyLog, FsyncPolicy};
use gredis::commands::CommandHandler;
use gredis::connection::{handle_connection, ConnectionStats};
use gredis::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Append-only log location
    aof_path: PathBuf,
    fsync: FsyncPolicy,
    sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: gredis::DEFAULT_HOST.to_string(),
            port: gredis::DEFAULT_PORT,
            aof_path: PathBuf::from(gredis::DEFAULT_AOF_PATH),
            fsync: FsyncPolicy::default(),
            sweep_interval: ExpiryConfig::default().interval,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let mut args = std::env::args().skip(1);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => config.host = value_for(&mut args, &arg),
                "--port" | "-p" => {
                    config.port = parse_or_exit(&value_for(&mut args, &arg), "port number")
                }
                "--aof" => config.aof_path = PathBuf::from(value_for(&mut args, &arg)),
                "--appendfsync" => {
                    config.fsync = value_for(&mut args, &arg).parse().unwrap_or_else(|e| {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    })
                }
                "--sweep-interval-ms" => {
                    let ms: u64 = parse_or_exit(&value_for(&mut args, &arg), "sweep interval");
                    if ms == 0 {
                        eprintln!("Error: --sweep-interval-ms must be greater than zero");
                        std::process::exit(1);
                    }
                    config.sweep_interval = Duration::from_millis(ms);
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("gredis version {}", gredis::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", arg);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn value_for(args: &mut impl Iterator<Item = String>, flag: &str) -> String {
    args.next().unwrap_or_else(|| {
        eprintln!("Error: {} requires a value", flag);
        std::process::exit(1);
    })
}

fn parse_or_exit<T: std::str::FromStr>(raw: &str, what: &str) -> T {
    raw.parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid {}: {}", what, raw);
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
gredis - An in-memory key-value server with an append-only log

USAGE:
    gredis [OPTIONS]

OPTIONS:
    -h, --host <HOST>               Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>               Port to listen on (default: 6252)
        --aof <PATH>                Append-only log file (default: appendonly.aof)
        --appendfsync <always|no>   Sync the log after every write (default: no)
        --sweep-interval-ms <MS>    Time between expiry sweeps (default: 1000)
    -v, --version                   Print version information
        --help                      Print this help message

LOGGING:
    Set RUST_LOG to change verbosity, e.g. RUST_LOG=gredis=debug

CONNECTING:
    $ redis-cli -p 6252
    127.0.0.1:6252> SET name Ariz 0
    OK
    127.0.0.1:6252> GET name
    "Ariz"
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
gredis v{}
──────────────────────────────────────────────
Listening on   {}
Append log     {} (fsync: {:?})
Use Ctrl+C to shutdown gracefully.
"#,
        gredis::VERSION,
        config.bind_address(),
        config.aof_path.display(),
        config.fsync,
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Shared across all connections
    let storage = Arc::new(StorageEngine::new());
    let handler = CommandHandler::new(Arc::clone(&storage));

    let aof = AppendOnlyLog::open_with(&config.aof_path, AofConfig { fsync: config.fsync })
        .await
        .context("failed to open append-only log")?;

    // Clients must not see the store until the log has been fully replayed.
    let replayed = aof
        .replay(|record| {
            let reply = handler.execute(record);
            if reply.is_error() {
                warn!(reply = %reply, "Replayed command was rejected");
            }
        })
        .await
        .with_context(|| format!("failed to replay {}", config.aof_path.display()))?;
    info!(records = replayed, keys = storage.len(), "Restored state from append-only log");

    let aof = Arc::new(aof);

    let sweeper = ExpirySweeper::start(
        Arc::clone(&storage),
        ExpiryConfig {
            interval: config.sweep_interval,
        },
    );

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    print_banner(&config);
    info!("Listening on {}", config.bind_address());

    tokio::select! {
        _ = accept_loop(listener, handler, Arc::clone(&aof), Arc::clone(&stats)) => {}
        result = signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            info!("Shutdown signal received, stopping server...");
        }
    }

    sweeper.shutdown().await;
    if let Err(e) = aof.sync().await {
        error!(error = %e, "Failed to sync append-only log on shutdown");
    }

    let storage_stats = storage.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        aof_write_errors = stats.aof_write_errors.load(Ordering::Relaxed),
        keys = storage_stats.keys,
        hashes = storage_stats.hashes,
        expired = storage_stats.expired,
        "Server shutdown complete"
    );
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    handler: CommandHandler,
    aof: Arc<AppendOnlyLog>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(
                    stream,
                    addr,
                    handler.clone(),
                    Some(Arc::clone(&aof)),
                    Arc::clone(&stats),
                ));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
