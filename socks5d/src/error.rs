use crate::socks5::Socks5Reply;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SocksError>;

/// Everything that can end a session, or the server itself.
#[derive(Debug, Error)]
pub enum SocksError {
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    #[error("unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    #[error("unsupported command: {0}")]
    UnsupportedCommand(u8),

    #[error("unsupported address type: {0}")]
    UnsupportedAddressType(u8),

    #[error("client offered no acceptable authentication method")]
    NoAcceptableMethod,

    #[error("username/password authentication failed")]
    AuthRejected,

    #[error("could not resolve {host}: {reason}")]
    ResolutionFailed { host: String, reason: String },

    #[error("could not connect to {destination}: {source}")]
    DialFailed { destination: SocketAddr, source: io::Error },

    #[error("{phase} timed out")]
    Timeout { phase: &'static str },

    #[error("failed to accept connection: {0}")]
    ListenerAcceptFailed(#[source] io::Error),

    #[error("failed to bind listener on {addr}: {source}")]
    ListenerBindFailed { addr: SocketAddr, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SocksError {
    ///
    ///
    ///
    pub fn resolution(
        host: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        SocksError::ResolutionFailed {
            host: host.into(),
            reason: reason.to_string(),
        }
    }

    /// The REP code a client is told when this error ends the connect phase.
    pub fn reply(&self) -> Socks5Reply {
        match self {
            SocksError::UnsupportedCommand(_) => Socks5Reply::CommandNotSupported,
            SocksError::UnsupportedAddressType(_) => Socks5Reply::AddressTypeNotSupported,
            SocksError::ResolutionFailed { .. } => Socks5Reply::HostUnreachable,
            _ => Socks5Reply::GeneralFailure,
        }
    }
}
