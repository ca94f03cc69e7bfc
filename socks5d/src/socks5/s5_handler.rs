use crate::config::ServerConfig;
use crate::constants::*;
use crate::error::{Result, SocksError};
use crate::socks5::{self, Greeting, Socks5Reply};
use crate::util::{connect_from, resolve_addr};
use crate::{relay, SocksHandler};
use async_trait::async_trait;
use bytes::BytesMut;
use itertools::Itertools;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time;

/// Drives one client connection through greeting, authentication,
/// connect request and dial, in that order. Any failure ends the session.
#[derive(Clone)]
pub struct Socks5Handler {
    config: Arc<ServerConfig>,
}

impl Socks5Handler {
    ///
    ///
    ///
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Socks5Handler { config }
    }

    /// No-auth wins over username/password. Username/password is offered
    /// whenever the client asks for it, even if no password is configured.
    pub fn select_method(
        &self,
        greeting: &Greeting,
    ) -> u8 {
        if self.config.allow_no_auth && greeting.offers(SOCKS_AUTH_NOT_REQUIRED) {
            SOCKS_AUTH_NOT_REQUIRED
        } else if greeting.offers(SOCKS_AUTH_USERNAME_PASSWORD) {
            SOCKS_AUTH_USERNAME_PASSWORD
        } else {
            SOCKS_AUTH_NO_ACCEPTABLE_METHODS
        }
    }

    async fn negotiate(
        &self,
        source: &mut TcpStream,
        buffer: &mut BytesMut,
    ) -> Result<()> {
        let greeting = self
            .handshake("greeting", socks5::read_greeting(source, buffer))
            .await?;

        // Anything but SOCKS5 is dropped without a reply.
        if greeting.version != SOCKS_VER_5 {
            return Err(SocksError::UnsupportedVersion(greeting.version));
        }

        let method = self.select_method(&greeting);
        debug!(
            "Client offers [{}], use authentication method: {:#04x}",
            greeting.methods.iter().map(|m| format!("{:#04x}", m)).join(", "),
            method
        );

        let response = socks5::encode_method_selection(method);
        self.handshake("method selection", write_frame(source, &response))
            .await?;

        match method {
            SOCKS_AUTH_USERNAME_PASSWORD => self.authenticate(source, buffer).await,
            SOCKS_AUTH_NO_ACCEPTABLE_METHODS => Err(SocksError::NoAcceptableMethod),
            _ => Ok(()),
        }
    }

    async fn authenticate(
        &self,
        source: &mut TcpStream,
        buffer: &mut BytesMut,
    ) -> Result<()> {
        let credentials = match self
            .handshake("authentication", socks5::read_auth_request(source, buffer))
            .await
        {
            Ok(credentials) => Some(credentials),
            Err(SocksError::MalformedFrame(reason)) => {
                debug!("Rejecting malformed auth request: {}", reason);
                None
            }
            Err(e) => return Err(e),
        };

        let expected = &self.config.credentials;
        let status = credentials.map_or(false, |c| expected.matches(&c.username, &c.password));

        let response = socks5::encode_auth_status(status);
        self.handshake("authentication status", write_frame(source, &response))
            .await?;

        if status {
            Ok(())
        } else {
            Err(SocksError::AuthRejected)
        }
    }

    async fn connect(
        &self,
        source: &mut TcpStream,
        buffer: &mut BytesMut,
    ) -> Result<TcpStream> {
        let request = match self
            .handshake("connect request", socks5::read_connect_request(source, buffer))
            .await
        {
            Ok(request) => request,
            Err(
                e @ SocksError::MalformedFrame(_)
                | e @ SocksError::UnsupportedVersion(_)
                | e @ SocksError::UnsupportedCommand(_)
                | e @ SocksError::UnsupportedAddressType(_),
            ) => return Err(self.fail(source, e).await),
            Err(e) => return Err(e),
        };

        let bind_ip = self.config.bind_ip;
        let dial = async {
            let address = resolve_addr(&request.destination, bind_ip).await?;
            debug!("Connecting to {} ({}) from {}", request.destination, address, bind_ip);

            connect_from(bind_ip, address).await
        };

        let destination = match within(self.config.connect_timeout, "connect", dial).await {
            Ok(destination) => destination,
            Err(e) => return Err(self.fail(source, e).await),
        };

        // Notify source that the connection has been set up.
        let binding = match destination.local_addr() {
            Ok(binding) => binding,
            Err(e) => return Err(self.fail(source, e.into()).await),
        };
        self.handshake(
            "connect reply",
            socks5::write_reply(source, Socks5Reply::Success, binding),
        )
        .await?;

        Ok(destination)
    }

    /// Best-effort error reply, the session ends either way.
    async fn fail(
        &self,
        source: &mut TcpStream,
        error: SocksError,
    ) -> SocksError {
        let reply = error.reply();
        let unbound = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));

        if let Err(e) = self
            .handshake("error reply", socks5::write_reply(source, reply, unbound))
            .await
        {
            debug!("Could not send {:?} reply: {}", reply, e);
        }

        error
    }

    async fn handshake<F, T>(
        &self,
        phase: &'static str,
        future: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        within(self.config.handshake_timeout, phase, future).await
    }
}

#[async_trait]
impl SocksHandler for Socks5Handler {
    ///
    ///
    ///
    async fn accept_request(
        &self,
        source: &mut TcpStream,
    ) -> Result<()> {
        let mut destination = self.setup(source).await?;

        // Start bidirectional copy, after this the connection closes.
        let (upstream, downstream) = relay::relay(source, &mut destination).await?;
        debug!("Relay finished, {} bytes up, {} bytes down", upstream, downstream);

        Ok(())
    }

    ///
    ///
    ///
    async fn refuse_request(
        &self,
        source: &mut TcpStream,
    ) -> Result<()> {
        let mut buffer = BytesMut::with_capacity(FRAME_BUFFER_SIZE);
        self.handshake("greeting", socks5::read_greeting(source, &mut buffer))
            .await?;

        // Notify source that no method will be accepted.
        let response = socks5::encode_method_selection(SOCKS_AUTH_NO_ACCEPTABLE_METHODS);
        self.handshake("method selection", write_frame(source, &response))
            .await?;

        Ok(())
    }

    ///
    ///
    ///
    async fn setup(
        &self,
        source: &mut TcpStream,
    ) -> Result<TcpStream> {
        let mut buffer = BytesMut::with_capacity(FRAME_BUFFER_SIZE);

        self.negotiate(source, &mut buffer).await?;
        self.connect(source, &mut buffer).await
    }
}

async fn write_frame(
    stream: &mut TcpStream,
    frame: &[u8],
) -> Result<()> {
    stream.write_all(frame).await?;
    stream.flush().await?;

    Ok(())
}

async fn within<F, T>(
    limit: Option<Duration>,
    phase: &'static str,
    future: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => time::timeout(limit, future)
            .await
            .map_err(|_| SocksError::Timeout { phase })?,
        None => future.await,
    }
}
