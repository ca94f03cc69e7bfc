use crate::constants::*;
use anyhow::Result;
use std::convert::TryFrom;
use std::fmt;
use std::net::{IpAddr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Destination of a CONNECT request, as it appears on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum Address {
    Ipv4(SocketAddrV4),
    Domainname { host: String, port: u16 },
    Ipv6(SocketAddrV6),
}

impl Address {
    ///
    ///
    ///
    pub fn new<S: Into<String>>(
        host: S,
        port: u16,
    ) -> Self {
        let host = host.into();

        if let Ok(host) = host.parse::<IpAddr>() {
            SocketAddr::new(host, port).into()
        } else {
            Address::Domainname { host, port }
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Address::Ipv4(addr) => addr.port(),
            Address::Domainname { port, .. } => *port,
            Address::Ipv6(addr) => addr.port(),
        }
    }

    pub fn address_type(&self) -> u8 {
        match self {
            Address::Ipv4(_) => SOCKS_ATYP_IPV4,
            Address::Domainname { .. } => SOCKS_ATYP_DOMAINNAME,
            Address::Ipv6(_) => SOCKS_ATYP_IPV6,
        }
    }

    /// Encodes as `ATYP ADDR PORT`. Fails for domain names longer than 255 bytes.
    pub fn as_socks_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![self.address_type()];

        match self {
            Address::Ipv4(addr) => bytes.extend(addr.ip().octets().iter()),
            Address::Ipv6(addr) => bytes.extend(addr.ip().octets().iter()),
            Address::Domainname { host, .. } => {
                ensure!(
                    host.len() <= u8::MAX as usize,
                    "Domain name MUST NOT be larger than 255 bytes, got {}.",
                    host.len()
                );

                bytes.push(host.len() as u8);
                bytes.extend(host.as_bytes());
            }
        }

        bytes.extend(self.port().to_be_bytes().iter());
        Ok(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Address::Ipv4(addr) => write!(f, "{}", addr),
            Address::Domainname { host, port } => write!(f, "{}:{}", host, port),
            Address::Ipv6(addr) => write!(f, "{}", addr),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(addr) => Address::Ipv4(addr),
            SocketAddr::V6(addr) => Address::Ipv6(addr),
        }
    }
}

impl TryFrom<String> for Address {
    type Error = anyhow::Error;

    fn try_from(addr: String) -> Result<Self> {
        Address::try_from(addr.as_str())
    }
}

impl TryFrom<&str> for Address {
    type Error = anyhow::Error;

    fn try_from(addr: &str) -> Result<Self> {
        if let Ok(addr) = addr.parse::<SocketAddr>() {
            return Ok(addr.into());
        }

        if let Some((host, port)) = addr.rsplit_once(':') {
            Ok(Address::new(host, port.parse()?))
        } else {
            bail!("Address doesn't seperate host and port by ':'.")
        }
    }
}
