use crate::constants::*;
use crate::error::{Result, SocksError};
use crate::{Address, Credentials};
use bytes::{BufMut, Bytes, BytesMut};
use num_traits::FromPrimitive;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

mod s5_client;
mod s5_handler;

pub use s5_client::Socks5Client;
pub use s5_handler::Socks5Handler;

#[repr(u8)]
#[derive(Clone, Copy, Debug, FromPrimitive, PartialEq)]
pub enum Socks5Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, FromPrimitive, PartialEq)]
pub enum Socks5Reply {
    Success = 0x00,
    GeneralFailure = 0x01,
    ConnectionNotAllowed = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TTLExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

/// Client greeting: `VER NMETHODS METHODS`.
#[derive(Clone, Debug, PartialEq)]
pub struct Greeting {
    pub version: u8,
    pub methods: Vec<u8>,
}

impl Greeting {
    pub fn offers(
        &self,
        method: u8,
    ) -> bool {
        self.methods.contains(&method)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Socks5Request {
    pub command: Socks5Command,
    pub destination: Address,
}

impl Socks5Request {
    ///
    ///
    ///
    pub fn new(
        command: Socks5Command,
        destination: Address,
    ) -> Self {
        Socks5Request { command, destination }
    }

    ///
    ///
    ///
    pub fn into_socks_bytes(self) -> anyhow::Result<Vec<u8>> {
        let mut data = vec![SOCKS_VER_5, self.command as u8, SOCKS_RSV];
        data.extend(self.destination.as_socks_bytes()?);

        Ok(data)
    }
}

/// Parses a greeting. The version is returned as-is, the caller decides what to do with it.
pub fn decode_greeting(bytes: &[u8]) -> Result<Greeting> {
    if bytes.len() < 2 {
        return Err(SocksError::MalformedFrame("greeting shorter than 2 bytes"));
    }

    let nmethods = bytes[1] as usize;
    let methods = bytes
        .get(2..2 + nmethods)
        .ok_or(SocksError::MalformedFrame("greeting declares more methods than it carries"))?;

    Ok(Greeting {
        version: bytes[0],
        methods: methods.to_vec(),
    })
}

pub fn encode_method_selection(method: u8) -> [u8; 2] {
    [SOCKS_VER_5, method]
}

/// Parses an RFC 1929 request: `VER ULEN UNAME PLEN PASSWD`.
pub fn decode_auth_request(bytes: &[u8]) -> Result<Credentials> {
    if bytes.len() < 2 {
        return Err(SocksError::MalformedFrame("auth request shorter than 2 bytes"));
    }
    if bytes[0] != SOCKS_AUTH_VER {
        return Err(SocksError::MalformedFrame("auth request has wrong version"));
    }

    let ulen = bytes[1] as usize;
    let username = bytes
        .get(2..2 + ulen)
        .ok_or(SocksError::MalformedFrame("username overruns auth request"))?;

    let plen = *bytes
        .get(2 + ulen)
        .ok_or(SocksError::MalformedFrame("auth request is missing password length"))? as usize;
    let password = bytes
        .get(3 + ulen..3 + ulen + plen)
        .ok_or(SocksError::MalformedFrame("password overruns auth request"))?;

    Ok(Credentials::new(username, password))
}

pub fn encode_auth_status(ok: bool) -> [u8; 2] {
    let status = if ok { SOCKS_AUTH_SUCCESS } else { SOCKS_AUTH_FAILED };

    [SOCKS_AUTH_VER, status]
}

/// Parses `VER CMD RSV ATYP DST.ADDR DST.PORT`, checked in that order.
pub fn decode_connect_request(bytes: &[u8]) -> Result<Socks5Request> {
    if bytes.len() < 4 {
        return Err(SocksError::MalformedFrame("connect request shorter than 4 bytes"));
    }
    if bytes[0] != SOCKS_VER_5 {
        return Err(SocksError::UnsupportedVersion(bytes[0]));
    }

    if bytes[1] != SOCKS_CMD_CONNECT {
        return Err(SocksError::UnsupportedCommand(bytes[1]));
    }

    let destination = decode_address(bytes[3], &bytes[4..])?;

    Ok(Socks5Request::new(Socks5Command::Connect, destination))
}

/// Parses `DST.ADDR DST.PORT` for the given address type.
pub fn decode_address(
    address_type: u8,
    bytes: &[u8],
) -> Result<Address> {
    let short = || SocksError::MalformedFrame("address overruns frame");

    match address_type {
        SOCKS_ATYP_IPV4 => {
            let b = bytes.get(..6).ok_or_else(short)?;
            let ip = [b[0], b[1], b[2], b[3]];

            Ok(Address::Ipv4(SocketAddrV4::new(ip.into(), port(&b[4..]))))
        }
        SOCKS_ATYP_IPV6 => {
            let b = bytes.get(..18).ok_or_else(short)?;
            let mut ip = [0; 16];
            ip.copy_from_slice(&b[..16]);

            Ok(Address::Ipv6(SocketAddrV6::new(ip.into(), port(&b[16..]), 0, 0)))
        }
        SOCKS_ATYP_DOMAINNAME => {
            let len = *bytes.first().ok_or_else(short)? as usize;
            let b = bytes.get(1..1 + len + 2).ok_or_else(short)?;

            let host = std::str::from_utf8(&b[..len])
                .map_err(|_| SocksError::MalformedFrame("domain name is not valid UTF-8"))?;

            Ok(Address::Domainname {
                host: host.to_string(),
                port: port(&b[len..]),
            })
        }
        atyp => Err(SocksError::UnsupportedAddressType(atyp)),
    }
}

fn port(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

/// Builds `VER REP RSV ATYP BND.ADDR BND.PORT`.
///
/// Only a successful reply carries `binding`, any other reply carries 0.0.0.0:0.
pub fn encode_connect_reply(
    reply: Socks5Reply,
    binding: SocketAddr,
) -> Bytes {
    let binding = if reply == Socks5Reply::Success {
        binding
    } else {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    };

    let mut frame = BytesMut::with_capacity(22);
    frame.put_u8(SOCKS_VER_5);
    frame.put_u8(reply as u8);
    frame.put_u8(SOCKS_RSV);

    match binding {
        SocketAddr::V4(addr) => {
            frame.put_u8(SOCKS_ATYP_IPV4);
            frame.put_slice(&addr.ip().octets());
        }
        SocketAddr::V6(addr) => {
            frame.put_u8(SOCKS_ATYP_IPV6);
            frame.put_slice(&addr.ip().octets());
        }
    }

    frame.put_u16(binding.port());
    frame.freeze()
}

/// Appends exactly `len` bytes from `stream` to `buffer`.
async fn read_into<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
    len: usize,
) -> io::Result<()>
where
    S: AsyncRead + Unpin,
{
    let start = buffer.len();
    buffer.resize(start + len, 0);
    stream.read_exact(&mut buffer[start..]).await?;

    Ok(())
}

/// Reads one greeting. Methods are only read when the version is 5.
pub async fn read_greeting<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
) -> Result<Greeting>
where
    S: AsyncRead + Unpin,
{
    buffer.clear();
    read_into(stream, buffer, 2).await?;

    if buffer[0] != SOCKS_VER_5 {
        return Ok(Greeting {
            version: buffer[0],
            methods: vec![],
        });
    }

    let nmethods = buffer[1] as usize;
    read_into(stream, buffer, nmethods).await?;

    decode_greeting(buffer)
}

///
///
///
pub async fn read_auth_request<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
) -> Result<Credentials>
where
    S: AsyncRead + Unpin,
{
    buffer.clear();
    read_into(stream, buffer, 2).await?;

    if buffer[0] == SOCKS_AUTH_VER {
        let ulen = buffer[1] as usize;
        read_into(stream, buffer, ulen + 1).await?;

        let plen = buffer[2 + ulen] as usize;
        read_into(stream, buffer, plen).await?;
    }

    decode_auth_request(buffer)
}

/// Reads one connect request. The address is only read when the header is acceptable.
pub async fn read_connect_request<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
) -> Result<Socks5Request>
where
    S: AsyncRead + Unpin,
{
    buffer.clear();
    read_into(stream, buffer, 4).await?;

    if buffer[0] == SOCKS_VER_5 {
        match buffer[3] {
            SOCKS_ATYP_IPV4 => read_into(stream, buffer, 4 + 2).await?,
            SOCKS_ATYP_IPV6 => read_into(stream, buffer, 16 + 2).await?,
            SOCKS_ATYP_DOMAINNAME => {
                read_into(stream, buffer, 1).await?;

                let len = buffer[4] as usize;
                read_into(stream, buffer, len + 2).await?;
            }
            _ => {}
        }
    }

    decode_connect_request(buffer)
}

///
///
///
pub async fn write_reply<S>(
    stream: &mut S,
    reply: Socks5Reply,
    binding: SocketAddr,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let reply = encode_connect_reply(reply, binding);

    stream.write_all(&reply).await?;
    stream.flush().await?;

    Ok(())
}

/// Reads the server's reply to a CONNECT and returns the bound address.
pub async fn read_reply<S>(stream: &mut S) -> anyhow::Result<Address>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(FRAME_BUFFER_SIZE);
    read_into(stream, &mut buffer, 4).await?;

    ensure!(
        buffer[0] == SOCKS_VER_5,
        "Proxy uses a different SOCKS version: {}.",
        buffer[0]
    );

    let reply_code = buffer[1];
    if reply_code != SOCKS_REP_SUCCEEDED {
        match Socks5Reply::from_u8(reply_code) {
            Some(reply) => bail!("CONNECT operation failed: {:?}.", reply),
            None => bail!("CONNECT operation failed: {}.", reply_code),
        }
    }

    let address_type = buffer[3];
    match address_type {
        SOCKS_ATYP_IPV4 => read_into(stream, &mut buffer, 4 + 2).await?,
        SOCKS_ATYP_IPV6 => read_into(stream, &mut buffer, 16 + 2).await?,
        SOCKS_ATYP_DOMAINNAME => {
            read_into(stream, &mut buffer, 1).await?;

            let len = buffer[4] as usize;
            read_into(stream, &mut buffer, len + 2).await?;
        }
        atyp => bail!("Proxy replied with unknown address type: {}.", atyp),
    }

    let binding = decode_address(address_type, &buffer[4..])?;

    Ok(binding)
}
