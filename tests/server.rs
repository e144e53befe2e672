use respd::commands::{BuiltinHandler, CommandError, CommandHandler, Request};
use respd::config::ServerConfig;
use respd::connection::ConnectionStats;
use respd::protocol::RespValue;
use respd::server::Server;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};

async fn start(handler: Arc<dyn CommandHandler>) -> (SocketAddr, Arc<ConnectionStats>) {
    let config = ServerConfig {
        port: 0,
        ..ServerConfig::default()
    };

    let server = Server::bind(config, handler).await.unwrap();
    let addr = server.local_addr().unwrap();
    let stats = server.stats();
    tokio::spawn(server.run());

    (addr, stats)
}

async fn connect() -> (TcpStream, Arc<ConnectionStats>) {
    let (addr, stats) = start(Arc::new(BuiltinHandler::new())).await;
    (TcpStream::connect(addr).await.unwrap(), stats)
}

/// Sends `request` and reads exactly `expected.len()` bytes back.
async fn roundtrip(stream: &mut TcpStream, request: &[u8], expected: &[u8]) {
    stream.write_all(request).await.unwrap();

    let mut reply = vec![0; expected.len()];
    timeout(Duration::from_secs(5), stream.read_exact(&mut reply))
        .await
        .expect("reply timed out")
        .unwrap();

    assert_eq!(
        String::from_utf8_lossy(&reply),
        String::from_utf8_lossy(expected)
    );
}

#[tokio::test]
async fn ping() {
    let (mut stream, _) = connect().await;
    roundtrip(&mut stream, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
}

#[tokio::test]
async fn ping_is_case_insensitive() {
    let (mut stream, _) = connect().await;
    roundtrip(&mut stream, b"*1\r\n$4\r\nping\r\n", b"+PONG\r\n").await;
}

#[tokio::test]
async fn unknown_command_keeps_connection_open() {
    let (mut stream, _) = connect().await;

    roundtrip(
        &mut stream,
        b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n",
        b"-ERR unknown command 'GET', with args beginning with: 'k' \r\n",
    )
    .await;

    roundtrip(&mut stream, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
}

#[tokio::test]
async fn pipelined_requests_are_answered_in_order() {
    let (mut stream, stats) = connect().await;

    roundtrip(
        &mut stream,
        b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n*1\r\n$4\r\nPING\r\n",
        b"+PONG\r\n$2\r\nhi\r\n+PONG\r\n",
    )
    .await;

    assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 3);
}

#[tokio::test]
async fn request_split_across_writes() {
    let (mut stream, _) = connect().await;

    stream.write_all(b"*2\r\n$4\r\nEC").await.unwrap();
    stream.flush().await.unwrap();
    sleep(Duration::from_millis(20)).await;

    roundtrip(&mut stream, b"HO\r\n$3\r\nabc\r\n", b"$3\r\nabc\r\n").await;
}

#[tokio::test]
async fn malformed_input_gets_error_then_close() {
    let (mut stream, stats) = connect().await;

    stream.write_all(b"@oops\r\n").await.unwrap();

    let mut reply = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut reply))
        .await
        .expect("server did not close the connection")
        .unwrap();

    let reply = String::from_utf8(reply).unwrap();
    assert!(reply.starts_with("-ERR Protocol error"), "{reply}");
    assert!(reply.ends_with("\r\n"));
    assert_eq!(stats.protocol_errors.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn clean_disconnect_releases_the_connection() {
    let (mut stream, stats) = connect().await;
    roundtrip(&mut stream, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
    drop(stream);

    timeout(Duration::from_secs(5), async {
        while stats.active_connections.load(Ordering::Relaxed) != 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session was not released");

    assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn concurrent_clients() {
    let (addr, stats) = start(Arc::new(BuiltinHandler::new())).await;

    let clients: Vec<_> = (0..16)
        .map(|i| {
            tokio::spawn(async move {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                let payload = format!("client-{i:02}");
                let request = format!("*2\r\n$4\r\nECHO\r\n$9\r\n{payload}\r\n");
                let expected = format!("$9\r\n{payload}\r\n");

                for _ in 0..10 {
                    roundtrip(&mut stream, request.as_bytes(), expected.as_bytes()).await;
                }
            })
        })
        .collect();

    for client in clients {
        client.await.unwrap();
    }

    assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 16);
    assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 160);
}

/// Counts its arguments, and defers to the built-in commands for the rest.
struct CountHandler;

impl CommandHandler for CountHandler {
    fn handle(&self, request: Request) -> Result<RespValue, CommandError> {
        if request.is("COUNT") {
            return Ok(RespValue::integer(request.args.len() as i64));
        }
        BuiltinHandler::new().handle(request)
    }
}

#[tokio::test]
async fn custom_handler() {
    let (addr, _) = start(Arc::new(CountHandler)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    roundtrip(
        &mut stream,
        b"*3\r\n$5\r\ncount\r\n$1\r\na\r\n$1\r\nb\r\n",
        b":2\r\n",
    )
    .await;
    roundtrip(
        &mut stream,
        b"*2\r\n$4\r\nECHO\r\n$5\r\nhello\r\n",
        b"$5\r\nhello\r\n",
    )
    .await;
}
