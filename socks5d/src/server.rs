use crate::config::ServerConfig;
use crate::error::{Result, SocksError};
use crate::{Socks5Handler, SocksHandler};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

/// Accepts clients and runs one session task per connection.
pub struct SocksServer {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    handler: Arc<Socks5Handler>,
    semaphore: Option<Arc<Semaphore>>,
}

impl SocksServer {
    ///
    ///
    ///
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let addr = config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| SocksError::ListenerBindFailed { addr, source })?;

        let semaphore = config.connections_limit.map(|l| Arc::new(Semaphore::new(l)));
        let config = Arc::new(config);
        let handler = Arc::new(Socks5Handler::new(Arc::clone(&config)));

        Ok(SocksServer {
            listener,
            config,
            handler,
            semaphore,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts forever. Accept errors are logged and skipped.
    pub async fn run(self) -> Result<()> {
        info!(
            "Listening on {}, outgoing from {}",
            self.local_addr()?,
            self.config.bind_ip
        );

        loop {
            let (incoming, remote) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("{}", SocksError::ListenerAcceptFailed(e));
                    continue;
                }
            };

            // Drop unsent data when the session ends.
            if let Err(e) = incoming.set_linger(Some(Duration::from_secs(0))) {
                warn!("Could not set linger on connection from {}: {}", remote, e);
            }

            let handler = Arc::clone(&self.handler);
            let semaphore = self.semaphore.clone();

            tokio::spawn(process(incoming, remote, handler, semaphore));
        }
    }
}

/// Binds the configured address and serves until the listener fails.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    SocksServer::bind(config).await?.run().await
}

///
///
///
async fn process(
    incoming: TcpStream,
    remote: SocketAddr,
    handler: Arc<Socks5Handler>,
    semaphore: Option<Arc<Semaphore>>,
) {
    let mut incoming = incoming;
    info!("Accepted connection from {}", remote);

    let result = if let Some(semaphore) = semaphore {
        match semaphore.try_acquire() {
            Ok(_permit) => handler.accept_request(&mut incoming).await,
            Err(_) => {
                debug!("Connections limit reached, refusing {}", remote);
                handler.refuse_request(&mut incoming).await
            }
        }
    } else {
        handler.accept_request(&mut incoming).await
    };

    if let Err(e) = result {
        warn!("Session with {} ended: {}", remote, e);
    }
}
