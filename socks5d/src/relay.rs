use tokio::io::{self, AsyncRead, AsyncWrite};

/// Copies bytes both ways between `client` and `destination`.
///
/// End-of-stream on one side half-closes the other side and the opposite
/// direction keeps flowing. Returns once both directions are done, or as
/// soon as either fails. Returns `(client -> destination, destination -> client)`
/// byte counts.
pub async fn relay<A, B>(
    client: &mut A,
    destination: &mut B,
) -> io::Result<(u64, u64)>
where
    A: AsyncRead + AsyncWrite + Unpin + ?Sized,
    B: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    io::copy_bidirectional(client, destination).await
}
