//! pollkv-bench - Load generator for a running pollkv server
//!
//! Opens a number of concurrent connections. Each one performs `set` then
//! `get` round-trips on its own keys, checks every value it reads back, and
//! the totals are reported as requests per second.

use anyhow::{bail, Context};
use pollkv::client::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Benchmark configuration
struct Config {
    host: String,
    port: u16,
    /// Concurrent connections
    clients: usize,
    /// set/get pairs per connection
    requests: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: pollkv::DEFAULT_PORT,
            clients: 100,
            requests: 1000,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> anyhow::Result<Self> {
        let mut config = Config::default();
        let mut args = std::env::args().skip(1);

        while let Some(arg) = args.next() {
            let mut value = || {
                args.next()
                    .with_context(|| format!("{} requires a value", arg))
            };
            match arg.as_str() {
                "--host" | "-h" => config.host = value()?,
                "--port" | "-p" => config.port = value()?.parse().context("invalid port number")?,
                "--clients" | "-c" => {
                    config.clients = value()?.parse().context("invalid client count")?
                }
                "--requests" | "-n" => {
                    config.requests = value()?.parse().context("invalid request count")?
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                _ => bail!("unknown argument: {}", arg),
            }
        }

        if config.clients == 0 {
            bail!("--clients must be at least 1");
        }
        Ok(config)
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
pollkv-bench - Load generator for pollkv

USAGE:
    pollkv-bench [OPTIONS]

OPTIONS:
    -h, --host <HOST>        Server host (default: 127.0.0.1)
    -p, --port <PORT>        Server port (default: 1234)
    -c, --clients <N>        Concurrent connections (default: 100)
    -n, --requests <N>       set/get pairs per connection (default: 1000)
        --help               Print this help message
"#
    );
}

/// One connection's share of the load.
async fn run_client(address: String, id: usize, requests: usize) -> anyhow::Result<Duration> {
    let mut client = Client::connect(&address)
        .await
        .with_context(|| format!("client {} failed to connect to {}", id, address))?;

    let start = Instant::now();
    for i in 0..requests {
        let key = format!("bench:{}:{}", id, i);
        let value = format!("value:{}", i);

        client.set(&key, &value).await?;
        match client.get(&key).await? {
            Some(got) if got == value.as_bytes() => {}
            other => bail!("client {}: {} read back {:?}", id, key, other),
        }
    }

    let elapsed = start.elapsed();
    debug!(client = id, ?elapsed, "Client finished");
    Ok(elapsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!(
        server = %config.address(),
        clients = config.clients,
        requests = config.requests,
        "Starting benchmark"
    );

    let start = Instant::now();
    let tasks: Vec<_> = (0..config.clients)
        .map(|id| tokio::spawn(run_client(config.address(), id, config.requests)))
        .collect();

    let mut slowest = Duration::ZERO;
    for task in tasks {
        let elapsed = task.await.context("client task panicked")??;
        slowest = slowest.max(elapsed);
    }
    let elapsed = start.elapsed();

    // Every pair is two requests.
    let total = config.clients * config.requests * 2;
    let secs = elapsed.as_secs_f64();

    println!();
    println!("  Requests:   {}", total);
    println!("  Clients:    {}", config.clients);
    println!("  Elapsed:    {:.3}s", secs);
    println!("  Slowest:    {:.3}s", slowest.as_secs_f64());
    println!("  Throughput: {:.0} req/s", total as f64 / secs);
    println!();

    Ok(())
}
