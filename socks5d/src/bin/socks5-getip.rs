use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use log::LevelFilter;
use socks5d::{Credentials, Socks5Client};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Asks a public-IP page, through the proxy, which address the proxy goes out from.
#[derive(Parser)]
#[clap(name = "socks5-getip", version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Address of the SOCKS5 proxy
    #[clap(long, env = "PROXY", default_value = "127.0.0.1:11080")]
    proxy: String,

    /// Username for the proxy, optional
    #[clap(short, long, env = "USERNAME")]
    username: Option<String>,

    /// Password for the proxy, optional
    #[clap(short = 'P', long, env = "PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    /// Host serving the plain-text IP page
    #[clap(long, default_value = "members.3322.org")]
    host: String,

    /// Port of the IP page
    #[clap(long, default_value = "80")]
    port: u16,

    /// Path of the IP page
    #[clap(long, default_value = "/dyndns/getip")]
    path: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    env_logger::builder()
        .format_module_path(false)
        .filter_level(LevelFilter::Info)
        .init();

    let password = args.password;
    let credentials = args.username.map(|u| Credentials::new(u, password));
    let client = Socks5Client::new(args.proxy, credentials).await?;

    let destination = format!("{}:{}", args.host, args.port);
    let (mut outgoing, _) = client.connect(destination).await?;

    let request = format!(
        "GET {} HTTP/1.0\r\nHost: {}\r\nUser-Agent: socks5-getip\r\nConnection: close\r\n\r\n",
        args.path, args.host
    );
    outgoing.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    outgoing.read_to_end(&mut response).await?;

    let response = String::from_utf8_lossy(&response);
    let body = match response.split_once("\r\n\r\n") {
        Some((head, body)) => {
            ensure_ok(head)?;
            body
        }
        None => anyhow::bail!("Malformed HTTP response."),
    };

    log::info!("My public IP is \"{}\"", body.trim());

    Ok(())
}

fn ensure_ok(head: &str) -> Result<()> {
    let status = head.lines().next().unwrap_or_default();
    anyhow::ensure!(
        status.split_whitespace().nth(1) == Some("200"),
        "IP page answered: {}",
        status
    );

    Ok(())
}
