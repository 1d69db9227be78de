//! pollkv - A Single-Threaded In-Memory Key-Value Server
//!
//! This is the main entry point for the pollkv server.
//! It parses the command line, sets up logging and runs the event loop.

use anyhow::{bail, Context};
use pollkv::server::{Server, ShutdownHandle};
use std::net::{SocketAddr, ToSocketAddrs};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: pollkv::DEFAULT_HOST.to_string(),
            port: pollkv::DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments.
    ///
    /// `--help` and `--version` print and exit; anything unrecognised is an
    /// error.
    fn from_args() -> anyhow::Result<Self> {
        Self::parse(std::env::args().skip(1))
    }

    fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut config = Config::default();
        let mut args = args.into_iter();

        while let Some(flag) = args.next() {
            let mut value = || {
                args.next()
                    .with_context(|| format!("{} requires a value", flag))
            };
            match flag.as_str() {
                "--host" | "-h" => config.host = value()?,
                "--port" | "-p" => {
                    config.port = value()?.parse().context("invalid port number")?
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("pollkv version {}", pollkv::VERSION);
                    std::process::exit(0);
                }
                _ => bail!("unknown argument: {} (see --help)", flag),
            }
        }

        Ok(config)
    }

    /// Resolves the bind address
    fn bind_address(&self) -> anyhow::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))?
            .next()
            .with_context(|| format!("{} did not resolve to an address", self.host))
    }
}

fn print_help() {
    println!(
        r#"
pollkv - A Single-Threaded In-Memory Key-Value Server

USAGE:
    pollkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: 0.0.0.0)
    -p, --port <PORT>    Port to listen on (default: 1234)
    -v, --version        Print version information
        --help           Print this help message

EXAMPLES:
    pollkv                         # Start on 0.0.0.0:1234
    pollkv --port 4321             # Start on port 4321
    pollkv --host 127.0.0.1        # Listen on loopback only

LOGGING:
    Set RUST_LOG to change verbosity, e.g. RUST_LOG=pollkv=debug

BENCHMARKING:
    $ pollkv-bench --port 1234 --clients 100 --requests 1000
"#
    );
}

fn print_banner(addr: SocketAddr) {
    println!(
        r#"
pollkv v{} - Single-Threaded In-Memory Key-Value Server
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        pollkv::VERSION,
        addr
    );
}

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args()?;

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let addr = config.bind_address()?;

    // Bind the listening socket
    let mut server =
        Server::bind(addr).with_context(|| format!("failed to bind {}", addr))?;

    print_banner(server.local_addr());
    info!("Storage engine initialized");

    // Set up graceful shutdown
    spawn_signal_listener(server.shutdown_handle());

    server.run().context("event loop failed")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Stops the event loop on Ctrl+C.
///
/// The event loop is synchronous, so the signal is awaited on a small
/// runtime of its own.
fn spawn_signal_listener(shutdown: ShutdownHandle) {
    std::thread::spawn(move || -> anyhow::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(tokio::signal::ctrl_c())?;
        info!("Shutdown signal received, stopping server...");
        shutdown.shutdown()?;
        Ok(())
    });
}
