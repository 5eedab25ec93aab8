//! End-to-end tests over real TCP connections.

use linebox_core::config::{ConfigBuilder, SessionMode};
use linebox_core::ResourceLimits;
use linebox_gateway::{Gateway, GatewayConfig};
use linebox_integration_tests::{host, read_all, request, request_and_close, TestServer};
use linebox_sandbox::fixtures;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_echo_hello() {
    let server = TestServer::start(fixtures::ECHO).await;

    assert_eq!(request(server.addr, b"hello\n").await, b"hello");
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reverse_abc() {
    let server = TestServer::start(fixtures::REVERSE).await;

    assert_eq!(request(server.addr, b"abc\n").await, b"cba");
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_get_their_own_output() {
    let server = TestServer::start(fixtures::ECHO).await;

    let clients: Vec<_> = (0..32)
        .map(|i| {
            let addr = server.addr;
            tokio::spawn(async move {
                let line = format!("client-{}", i);
                let output = request(addr, format!("{}\n", line).as_bytes()).await;
                (line, output)
            })
        })
        .collect();

    for client in clients {
        let (line, output) = client.await.unwrap();
        assert_eq!(output, line.as_bytes());
    }
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fresh_instance_per_connection() {
    let server = TestServer::start(fixtures::COUNTER).await;

    for _ in 0..3 {
        assert_eq!(request(server.addr, b"tick\n").await, b"1");
    }
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_trap_closes_only_that_connection() {
    let server = TestServer::start(fixtures::ECHO_OR_TRAP).await;

    assert!(request(server.addr, b"!boom\n").await.is_empty());
    assert!(server.is_serving());
    assert_eq!(request(server.addr, b"after\n").await, b"after");
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_partial_output_is_never_sent() {
    let server = TestServer::start(fixtures::WRITE_THEN_TRAP).await;

    assert!(request(server.addr, b"x\n").await.is_empty());
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_runaway_instance_is_stopped() {
    let server = TestServer::start_with(
        fixtures::LOOP_FOREVER,
        ResourceLimits::new().with_timeout_ms(100),
        SessionMode::OneShot,
    )
    .await;

    let started = Instant::now();
    assert!(request(server.addr, b"spin\n").await.is_empty());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(server.is_serving());
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_oversized_output_closes_without_response() {
    let server = TestServer::start_with(
        fixtures::ECHO,
        ResourceLimits::new().with_output(4),
        SessionMode::OneShot,
    )
    .await;

    assert!(request(server.addr, b"hello world\n").await.is_empty());
    assert_eq!(request(server.addr, b"tiny\n").await, b"tiny");
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_idle_client_does_not_block_others() {
    let server = TestServer::start(fixtures::ECHO).await;

    // Connected but silent; holds a session open.
    let idle = TcpStream::connect(server.addr).await.unwrap();
    assert_eq!(request(server.addr, b"busy\n").await, b"busy");

    drop(idle);
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_shot_answers_first_line_only() {
    let server = TestServer::start(fixtures::ECHO).await;

    assert_eq!(request(server.addr, b"first\nsecond\n").await, b"first");
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sequential_mode_answers_each_line() {
    let server = TestServer::start_with(
        fixtures::REVERSE,
        ResourceLimits::default(),
        SessionMode::Sequential,
    )
    .await;

    let output = request_and_close(server.addr, b"abc\r\n\nxyz\n").await;
    assert_eq!(output, b"cbazyx");
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unterminated_line_is_served_on_close() {
    let server = TestServer::start(fixtures::REVERSE).await;

    assert_eq!(request_and_close(server.addr, b"tail").await, b"liat");
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_drains_open_session() {
    let server = TestServer::start(fixtures::ECHO).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();
    for _ in 0..200 {
        if server.gateway.active_sessions() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.gateway.active_sessions(), 1);

    let stopping = tokio::spawn(server.shutdown());
    client.write_all(b"last\n").await.unwrap();
    assert_eq!(read_all(&mut client).await, b"last");

    stopping.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_gateway_built_from_config() {
    let config = ConfigBuilder::new()
        .bind("127.0.0.1:0")
        .max_sessions(2)
        .build();

    let gateway = Gateway::new(
        GatewayConfig::from_config(&config).unwrap(),
        host(fixtures::REVERSE),
    );
    assert_eq!(gateway.config().max_sessions, 2);

    let server = TestServer::serve(gateway).await;
    assert_eq!(request(server.addr, b"linebox\n").await, b"xobenil");
    server.shutdown().await.unwrap();
}
