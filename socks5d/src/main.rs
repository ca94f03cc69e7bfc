#[macro_use]
extern crate human_panic;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use log::LevelFilter;
use socks5d::{self, ServerConfig};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[derive(Parser)]
#[clap(
    name = "socks5d",
    version = env!("CARGO_PKG_VERSION"),
    about = "A minimal SOCKS5 server that can switch its outgoing IP"
)]
struct Args {
    /// Prints debug information verbosely
    #[clap(short, long)]
    debug: bool,

    /// Host (IP) to listen on
    #[clap(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[clap(short, long, env = "PORT", default_value = "11080")]
    port: u16,

    /// Username clients must present, optional
    #[clap(short, long, env = "USERNAME", default_value = "")]
    username: String,

    /// Password clients must present, optional
    #[clap(short = 'P', long, env = "PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    /// External IP to bind outgoing connections on
    #[clap(short, long, env = "EIP", default_value = "0.0.0.0")]
    eip: IpAddr,

    /// Concurrent connections limit (0=unlimited)
    #[clap(long, env = "CONN_LIMIT", default_value = "0")]
    connections_limit: usize,

    /// Seconds a client may take per handshake step (0=no limit)
    #[clap(long, env = "HANDSHAKE_TIMEOUT", default_value = "0")]
    handshake_timeout: u64,

    /// Seconds to resolve and connect to a destination (0=no limit)
    #[clap(long, env = "CONNECT_TIMEOUT", default_value = "0")]
    connect_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let mut logger = env_logger::builder();
    logger.format_module_path(false);

    if args.debug {
        logger.filter_level(LevelFilter::Debug).init();
    } else {
        logger.filter_level(LevelFilter::Info).init();

        setup_panic!(Metadata {
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
            authors: env!("CARGO_PKG_AUTHORS").replace(":", ", ").into(),
            homepage: env!("CARGO_PKG_HOMEPAGE").into(),
        });
    }

    let config = ServerConfig::new(
        SocketAddr::new(args.host, args.port),
        args.eip,
        args.username,
        args.password,
    )
    .with_connections_limit(Some(args.connections_limit))
    .with_handshake_timeout(seconds(args.handshake_timeout))
    .with_connect_timeout(seconds(args.connect_timeout));

    socks5d::run_server(config)
        .await
        .context("SOCKS5 server stopped")
}

fn seconds(value: u64) -> Option<Duration> {
    if value == 0 {
        None
    } else {
        Some(Duration::from_secs(value))
    }
}
