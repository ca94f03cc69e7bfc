use crate::Credentials;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Server settings, fixed once the server starts.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Source IP for outbound connections, unspecified lets the OS choose.
    pub bind_ip: IpAddr,
    pub credentials: Credentials,
    pub allow_no_auth: bool,
    pub handshake_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub connections_limit: Option<usize>,
}

impl ServerConfig {
    /// Unauthenticated access is only allowed when no username is configured.
    pub fn new<S: Into<Vec<u8>>>(
        listen_addr: SocketAddr,
        bind_ip: IpAddr,
        username: S,
        password: S,
    ) -> Self {
        let credentials = Credentials::new(username, password);
        let allow_no_auth = credentials.username.is_empty();

        ServerConfig {
            listen_addr,
            bind_ip,
            credentials,
            allow_no_auth,
            handshake_timeout: None,
            connect_timeout: None,
            connections_limit: None,
        }
    }

    ///
    ///
    ///
    pub fn with_handshake_timeout(
        mut self,
        timeout: Option<Duration>,
    ) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    ///
    ///
    ///
    pub fn with_connect_timeout(
        mut self,
        timeout: Option<Duration>,
    ) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `None` (or zero) leaves the number of concurrent sessions unbounded.
    pub fn with_connections_limit(
        mut self,
        limit: Option<usize>,
    ) -> Self {
        self.connections_limit = limit.filter(|l| *l > 0);
        self
    }
}
