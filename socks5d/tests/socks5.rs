use socks5d::{Credentials, ServerConfig, Socks5Client, SocksError, SocksServer};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

const PATIENCE: Duration = Duration::from_secs(5);

fn config(
    username: &str,
    password: &str,
) -> ServerConfig {
    ServerConfig::new(
        "127.0.0.1:0".parse().unwrap(),
        "127.0.0.1".parse().unwrap(),
        username,
        password,
    )
}

async fn start(config: ServerConfig) -> SocketAddr {
    let server = SocksServer::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    addr
}

/// Echo server that reports the peer address of every connection it accepts.
async fn echo_server() -> (SocketAddr, mpsc::UnboundedReceiver<SocketAddr>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (peers, accepted) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut stream, peer)) = listener.accept().await {
            let _ = peers.send(peer);
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    (addr, accepted)
}

async fn exchange(
    stream: &mut TcpStream,
    request: &[u8],
    response_len: usize,
) -> Vec<u8> {
    stream.write_all(request).await.unwrap();

    let mut response = vec![0; response_len];
    timeout(PATIENCE, stream.read_exact(&mut response))
        .await
        .expect("server did not answer in time")
        .unwrap();

    response
}

async fn assert_closed(stream: &mut TcpStream) {
    let mut rest = [0; 16];
    let read = timeout(PATIENCE, stream.read(&mut rest))
        .await
        .expect("server did not close the connection");

    assert!(matches!(read, Ok(0) | Err(_)), "unexpected data: {:?}", read);
}

fn connect_ipv4(addr: SocketAddr) -> Vec<u8> {
    let addr = match addr {
        SocketAddr::V4(addr) => addr,
        SocketAddr::V6(_) => unreachable!(),
    };

    let mut request = vec![0x05, 0x01, 0x00, 0x01];
    request.extend(&addr.ip().octets());
    request.extend(&addr.port().to_be_bytes());

    request
}

#[tokio::test]
async fn no_auth_connect_reports_outbound_binding() {
    let proxy = start(config("", "")).await;
    let (destination, mut accepted) = echo_server().await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    assert_eq!(exchange(&mut client, &[0x05, 0x01, 0x00], 2).await, [0x05, 0x00]);

    let reply = exchange(&mut client, &connect_ipv4(destination), 10).await;
    assert_eq!(&reply[..4], &[0x05, 0x00, 0x00, 0x01]);

    let peer = timeout(PATIENCE, accepted.recv()).await.unwrap().unwrap();
    let binding = SocketAddr::from(([reply[4], reply[5], reply[6], reply[7]], u16::from_be_bytes([reply[8], reply[9]])));
    assert_eq!(binding, peer);

    assert_eq!(exchange(&mut client, b"hello, world", 12).await, b"hello, world");
}

#[tokio::test]
async fn client_library_tunnels_with_credentials() {
    let proxy = start(config("a", "b")).await;
    let (destination, _accepted) = echo_server().await;

    let client = Socks5Client::new(proxy.to_string(), Some(Credentials::new("a", "b")))
        .await
        .unwrap();
    let (mut outgoing, binding) = client.connect(destination.to_string()).await.unwrap();

    assert_eq!(binding.to_string().split(':').next(), Some("127.0.0.1"));
    assert_eq!(exchange(&mut outgoing, b"tunnel", 6).await, b"tunnel");
}

#[tokio::test]
async fn wrong_password_is_rejected_before_connect() {
    let proxy = start(config("a", "b")).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    assert_eq!(exchange(&mut client, &[0x05, 0x01, 0x02], 2).await, [0x05, 0x02]);

    let status = exchange(&mut client, &[0x01, 0x01, b'a', 0x01, b'c'], 2).await;
    assert_eq!(status, [0x01, 0x01]);

    assert_closed(&mut client).await;
}

#[tokio::test]
async fn foreign_auth_version_is_rejected() {
    let proxy = start(config("a", "b")).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    assert_eq!(exchange(&mut client, &[0x05, 0x01, 0x02], 2).await, [0x05, 0x02]);

    // Only the version and username length are read before rejecting.
    let status = exchange(&mut client, &[0x05, 0x01], 2).await;
    assert_eq!(status, [0x01, 0x01]);

    assert_closed(&mut client).await;
}

#[tokio::test]
async fn username_password_is_challenged_without_configured_username() {
    let proxy = start(config("", "")).await;
    let (destination, _accepted) = echo_server().await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    assert_eq!(exchange(&mut client, &[0x05, 0x01, 0x02], 2).await, [0x05, 0x02]);

    // Empty credentials match the empty configuration.
    assert_eq!(exchange(&mut client, &[0x01, 0x00, 0x00], 2).await, [0x01, 0x00]);

    let reply = exchange(&mut client, &connect_ipv4(destination), 10).await;
    assert_eq!(reply[1], 0x00);
}

#[tokio::test]
async fn no_acceptable_method_closes() {
    let proxy = start(config("a", "b")).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    assert_eq!(exchange(&mut client, &[0x05, 0x01, 0x00], 2).await, [0x05, 0xFF]);

    assert_closed(&mut client).await;
}

#[tokio::test]
async fn foreign_version_is_dropped_silently() {
    let proxy = start(config("", "")).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[0x04, 0x01, 0x00]).await.unwrap();

    assert_closed(&mut client).await;
}

#[tokio::test]
async fn bind_command_is_not_supported_and_not_dialed() {
    let proxy = start(config("", "")).await;
    let (destination, mut accepted) = echo_server().await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    exchange(&mut client, &[0x05, 0x01, 0x00], 2).await;

    let mut request = connect_ipv4(destination);
    request[1] = 0x02;

    let reply = exchange(&mut client, &request, 10).await;
    assert_eq!(reply, [0x05, 0x07, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);

    assert_closed(&mut client).await;
    assert!(timeout(Duration::from_millis(200), accepted.recv()).await.is_err());
}

#[tokio::test]
async fn foreign_version_in_connect_request_is_a_general_failure() {
    let proxy = start(config("", "")).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    exchange(&mut client, &[0x05, 0x01, 0x00], 2).await;

    // The address is never read once the version is wrong.
    let reply = exchange(&mut client, &[0x04, 0x01, 0x00, 0x01], 10).await;
    assert_eq!(reply, [0x05, 0x01, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);

    assert_closed(&mut client).await;
}

#[tokio::test]
async fn unknown_address_type_is_not_supported() {
    let proxy = start(config("", "")).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    exchange(&mut client, &[0x05, 0x01, 0x00], 2).await;

    let reply = exchange(&mut client, &[0x05, 0x01, 0x00, 0x09], 10).await;
    assert_eq!(reply, [0x05, 0x08, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
}

#[tokio::test]
async fn refused_destination_is_a_general_failure() {
    let proxy = start(config("", "")).await;

    // Grab a free port, then free it again so nothing listens there.
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();

    let mut client = TcpStream::connect(proxy).await.unwrap();
    exchange(&mut client, &[0x05, 0x01, 0x00], 2).await;

    let reply = exchange(&mut client, &connect_ipv4(unused), 10).await;
    assert_eq!(reply, [0x05, 0x01, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
}

#[tokio::test]
async fn slow_destination_times_out_as_general_failure() {
    let proxy = start(config("", "").with_connect_timeout(Some(Duration::from_millis(100)))).await;

    // Not routable, so the dial hangs until the connect timeout fires.
    let unroutable: SocketAddr = "10.255.255.1:81".parse().unwrap();

    let mut client = TcpStream::connect(proxy).await.unwrap();
    exchange(&mut client, &[0x05, 0x01, 0x00], 2).await;

    let reply = exchange(&mut client, &connect_ipv4(unroutable), 10).await;
    assert_eq!(reply, [0x05, 0x01, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);

    assert_closed(&mut client).await;
}

#[tokio::test]
async fn domain_names_are_resolved() {
    let proxy = start(config("", "")).await;
    let (destination, _accepted) = echo_server().await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    exchange(&mut client, &[0x05, 0x01, 0x00], 2).await;

    let mut request = vec![0x05, 0x01, 0x00, 0x03, 9];
    request.extend(b"localhost");
    request.extend(&destination.port().to_be_bytes());

    let reply = exchange(&mut client, &request, 10).await;
    assert_eq!(&reply[..4], &[0x05, 0x00, 0x00, 0x01]);
    assert_eq!(exchange(&mut client, b"via name", 8).await, b"via name");
}

#[tokio::test]
async fn response_arrives_after_client_half_close() {
    let proxy = start(config("", "")).await;

    // Answers only once the request has been read to the end.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let destination = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        stream.read_to_end(&mut request).await.unwrap();
        stream.write_all(&request.to_ascii_uppercase()).await.unwrap();
    });

    let client = Socks5Client::new(proxy.to_string(), None).await.unwrap();
    let (mut outgoing, _) = client.connect(destination.to_string()).await.unwrap();

    outgoing.write_all(b"shout").await.unwrap();
    outgoing.shutdown().await.unwrap();

    let mut response = Vec::new();
    timeout(PATIENCE, outgoing.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response, b"SHOUT");
}

#[tokio::test]
async fn connections_over_the_limit_are_refused() {
    let proxy = start(config("", "").with_connections_limit(Some(1))).await;
    let (destination, _accepted) = echo_server().await;

    // The first session holds the only permit while it relays.
    let mut first = TcpStream::connect(proxy).await.unwrap();
    exchange(&mut first, &[0x05, 0x01, 0x00], 2).await;
    let reply = exchange(&mut first, &connect_ipv4(destination), 10).await;
    assert_eq!(reply[1], 0x00);

    let mut second = TcpStream::connect(proxy).await.unwrap();
    assert_eq!(exchange(&mut second, &[0x05, 0x01, 0x00], 2).await, [0x05, 0xFF]);

    assert_eq!(exchange(&mut first, b"still here", 10).await, b"still here");
}

#[tokio::test]
async fn silent_clients_time_out() {
    let proxy = start(config("", "").with_handshake_timeout(Some(Duration::from_millis(100)))).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    assert_closed(&mut client).await;
}

#[tokio::test]
async fn busy_listen_address_fails_to_bind() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = config("", "");
    config.listen_addr = taken.local_addr().unwrap();

    let result = SocksServer::bind(config).await;
    assert!(matches!(result, Err(SocksError::ListenerBindFailed { .. })));
}
