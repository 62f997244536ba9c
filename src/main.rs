//! lrucached - A Small Memcached-Compatible Cache Server
//!
//! This is the main entry point for the lrucached server.
//! It parses the command line, sets up logging, binds the listener, and
//! serves connections until interrupted.

use lrucached::{CliAction, Config, Server, VERSION};
use std::process;
use std::sync::atomic::Ordering;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!(
        r#"
lrucached - A Small Memcached-Compatible Cache Server

USAGE:
    lrucached [OPTIONS]

OPTIONS:
    -h, --host <HOST>              Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>              Port to listen on (default: 11211)
        --backlog <N>              Listen backlog (default: 1024)
    -c, --capacity <N>             Maximum cached entries (default: 1024)
        --chunk-size <BYTES>       Bytes read from a socket at once (default: 1024)
        --idle-timeout <SECS>      Close connections idle this long (default: 5)
        --max-value-size <BYTES>   Largest storable value (default: 1048576)
        --verbose                  Log at debug level
    -v, --version                  Print version information
        --help                     Print this help message

EXAMPLES:
    lrucached                      # Start on 127.0.0.1:11211
    lrucached --port 11300         # Start on port 11300
    lrucached -c 100000            # Keep up to 100000 entries

CONNECTING:
    Any memcached text-protocol client works:
    $ printf 'set name 0 0 4\r\nAriz\r\nget name\r\n' | nc 127.0.0.1 11211
    STORED
    VALUE name 0 4
    Ariz
    END
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
lrucached v{} - Memcached-Compatible LRU Cache
──────────────────────────────────────────────
Address:   {}
Capacity:  {} entries

Use Ctrl+C to stop.
"#,
        VERSION,
        config.bind_address(),
        config.capacity
    );
}

/// Installs the fmt subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let default_level = if config.verbose { "debug" } else { "info" };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            print_help();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("lrucached version {}", VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            process::exit(1);
        }
    };

    init_tracing(&config)?;
    print_banner(&config);

    let server = match Server::bind(&config).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to start server");
            process::exit(e.exit_code());
        }
    };
    let storage = server.storage();
    let stats = server.stats();

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = server.run() => {}
        _ = shutdown => {}
    }

    let cache = storage.stats();
    info!(
        entries = cache.entries,
        capacity = cache.capacity,
        get_hits = cache.get_hits,
        get_misses = cache.get_misses,
        sets = cache.sets,
        evictions = cache.evictions,
        "Cache statistics"
    );
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        active = stats.active_connections.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(Ordering::Relaxed),
        "Connection statistics"
    );

    info!("Server shutdown complete");
    Ok(())
}
