use crate::error::Result;
use async_trait::async_trait;
use tokio::net::TcpStream;

#[async_trait]
pub trait SocksHandler {
    /// Runs the full session: handshake, dial, then relay until done.
    async fn accept_request(
        &self,
        source: &mut TcpStream,
    ) -> Result<()>;

    /// Turns the client away without dialing anything.
    async fn refuse_request(
        &self,
        source: &mut TcpStream,
    ) -> Result<()>;

    /// Runs the handshake and returns the connected destination.
    async fn setup(
        &self,
        source: &mut TcpStream,
    ) -> Result<TcpStream>;
}
