use crate::error::{Result, SocksError};
use crate::Address;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{self, TcpSocket, TcpStream};

/// Turns a destination into a single socket address.
///
/// Domain names are looked up and the first record whose family matches
/// `bind_ip` wins; when none does, the first record is used as-is.
pub async fn resolve_addr(
    destination: &Address,
    bind_ip: IpAddr,
) -> Result<SocketAddr> {
    let (host, port) = match destination {
        Address::Ipv4(addr) => return Ok(SocketAddr::V4(*addr)),
        Address::Ipv6(addr) => return Ok(SocketAddr::V6(*addr)),
        Address::Domainname { host, port } => (host, *port),
    };

    let addresses: Vec<SocketAddr> = net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| SocksError::resolution(host.as_str(), e))?
        .collect();

    let preferred = addresses
        .iter()
        .find(|a| a.is_ipv4() == bind_ip.is_ipv4())
        .or_else(|| addresses.first());

    match preferred {
        Some(addr) => Ok(*addr),
        None => Err(SocksError::resolution(
            host.as_str(),
            "domain name didn't resolve to an IP address",
        )),
    }
}

/// Connects to `destination` from `bind_ip` on an OS-assigned port.
///
/// The returned stream has linger set to zero, dropping it resets the connection.
pub async fn connect_from(
    bind_ip: IpAddr,
    destination: SocketAddr,
) -> Result<TcpStream> {
    let dial = async {
        let socket = match destination {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };

        socket.set_linger(Some(Duration::from_secs(0)))?;
        socket.bind(SocketAddr::new(source_ip(bind_ip, destination), 0))?;
        socket.connect(destination).await
    };

    dial.await
        .map_err(|source| SocksError::DialFailed { destination, source })
}

/// An unspecified bind address follows the destination's family.
fn source_ip(
    bind_ip: IpAddr,
    destination: SocketAddr,
) -> IpAddr {
    if !bind_ip.is_unspecified() {
        return bind_ip;
    }

    match destination {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}
