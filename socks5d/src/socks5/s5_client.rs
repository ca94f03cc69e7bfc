use crate::socks5::{self, Socks5Command, Socks5Request};
use crate::{constants::*, Address, Credentials};
use anyhow::Result;
use std::convert::TryInto;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{self, TcpStream};

#[derive(Clone)]
pub struct Socks5Client {
    proxy_addr: SocketAddr,
    credentials: Option<Credentials>,
}

impl Socks5Client {
    ///
    ///
    ///
    pub async fn new<A: Into<String>>(
        proxy_addr: A,
        credentials: Option<Credentials>,
    ) -> Result<Self> {
        let proxy_addr: String = proxy_addr.into();
        let proxy_addr = match net::lookup_host(&proxy_addr).await?.next() {
            Some(proxy_addr) => proxy_addr,
            None => bail!("Proxy address {} didn't resolve to an IP address.", proxy_addr),
        };

        Ok(Socks5Client {
            proxy_addr,
            credentials,
        })
    }

    /// Opens a tunnel to `destination` through the proxy.
    ///
    /// Returns the tunnelled stream and the address the proxy bound for it.
    ///
    /// [rfc1928] https://tools.ietf.org/html/rfc1928
    pub async fn connect<A>(
        &self,
        destination: A,
    ) -> Result<(TcpStream, Address)>
    where
        A: TryInto<Address, Error = anyhow::Error>,
    {
        if let Some(Credentials { username, password }) = &self.credentials {
            ensure!(username.len() <= 255, "Username MUST NOT be larger than 255 bytes.");
            ensure!(password.len() <= 255, "Password MUST NOT be larger than 255 bytes.");
        }

        let destination: Address = destination.try_into()?;
        let request = Socks5Request::new(Socks5Command::Connect, destination).into_socks_bytes()?;

        let mut stream = TcpStream::connect(&self.proxy_addr).await?;

        if let Some(credentials) = self.select_method(&mut stream).await? {
            self.authenticate(&mut stream, credentials).await?;
        }

        stream.write_all(&request).await?;
        let binding = socks5::read_reply(&mut stream).await?;

        Ok((stream, binding))
    }

    /// Offers no-auth, plus username/password when credentials are set.
    ///
    /// Returns the credentials to authenticate with when the proxy picks username/password.
    async fn select_method(
        &self,
        stream: &mut TcpStream,
    ) -> Result<Option<&Credentials>> {
        let greeting: &[u8] = match self.credentials {
            Some(_) => &[SOCKS_VER_5, 0x02, SOCKS_AUTH_NOT_REQUIRED, SOCKS_AUTH_USERNAME_PASSWORD],
            None => &[SOCKS_VER_5, 0x01, SOCKS_AUTH_NOT_REQUIRED],
        };
        stream.write_all(greeting).await?;

        let mut selection = [0; 2];
        stream.read_exact(&mut selection).await?;

        let [version, method] = selection;
        ensure!(version == SOCKS_VER_5, "Proxy answered with SOCKS version {}.", version);

        match (method, &self.credentials) {
            (SOCKS_AUTH_NOT_REQUIRED, _) => Ok(None),
            (SOCKS_AUTH_USERNAME_PASSWORD, Some(credentials)) => Ok(Some(credentials)),
            (SOCKS_AUTH_USERNAME_PASSWORD, None) => {
                bail!("Proxy demands username/password, but no credentials are set.")
            }
            (SOCKS_AUTH_NO_ACCEPTABLE_METHODS, _) => bail!("Proxy accepted none of the offered methods."),
            (method, _) => bail!("Proxy selected a method that wasn't offered: {}.", method),
        }
    }

    ///
    ///
    ///
    /// [rfc1929] https://tools.ietf.org/html/rfc1929
    async fn authenticate(
        &self,
        stream: &mut TcpStream,
        credentials: &Credentials,
    ) -> Result<()> {
        let mut request = vec![SOCKS_AUTH_VER];
        request.extend(credentials.as_socks_bytes());
        stream.write_all(&request).await?;

        let mut status = [0; 2];
        stream.read_exact(&mut status).await?;

        match status {
            [SOCKS_AUTH_VER, SOCKS_AUTH_SUCCESS] => Ok(()),
            [SOCKS_AUTH_VER, _] => bail!("Proxy rejected the credentials."),
            [version, _] => bail!("Proxy answered with authentication version {}.", version),
        }
    }
}
