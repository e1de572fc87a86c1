use std::sync::{Arc, Mutex};

use asciicached::clock::SystemClock;
use asciicached::store::Store;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// An in-memory cache speaking the memcached ASCII protocol.
#[derive(Parser, Debug)]
#[command(name = "asciicached", version, about)]
struct Config {
    /// Address to bind the listening socket to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the listening socket to.
    #[arg(long, default_value_t = 11211)]
    port: u16,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Config {
    fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter().into()))
        .init();

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "asciicached listening");

    let store = Arc::new(Mutex::new(Store::new()));
    let clock = Arc::new(SystemClock);

    asciicached::server::serve(listener, store, clock).await;
    Ok(())
}
