//! Shared helpers for end-to-end tests.
//!
//! A [`TestServer`] runs a real gateway on an ephemeral loopback port, serving
//! one of the WebAssembly text fixtures from `linebox-sandbox`.

use linebox_core::config::{ConfigBuilder, SessionMode};
use linebox_core::ResourceLimits;
use linebox_gateway::{Gateway, GatewayConfig, GatewayError};
use linebox_sandbox::{fixtures, ModuleHost};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Longest a client waits for the server to close its connection.
pub const CLIENT_DEADLINE: Duration = Duration::from_secs(10);

/// A gateway serving on `127.0.0.1:<ephemeral>`.
pub struct TestServer {
    pub addr: SocketAddr,
    pub gateway: Gateway,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), GatewayError>>,
}

impl TestServer {
    /// Serve `wat` one line per connection with default limits.
    pub async fn start(wat: &str) -> Self {
        Self::start_with(wat, ResourceLimits::default(), SessionMode::OneShot).await
    }

    /// Serve `wat` with the given limits and session mode.
    pub async fn start_with(wat: &str, limits: ResourceLimits, mode: SessionMode) -> Self {
        let config = ConfigBuilder::new()
            .bind("127.0.0.1:0")
            .session_mode(mode)
            .read_timeout_secs(5)
            .limits(limits)
            .build();

        let host = fixtures::host_with(wat, config.sandbox.limits.clone());
        let gateway = Gateway::new(
            GatewayConfig::from_config(&config).expect("valid gateway config"),
            Arc::new(host),
        );
        Self::serve(gateway).await
    }

    /// Serve an already configured gateway.
    pub async fn serve(gateway: Gateway) -> Self {
        let listener = gateway.bind().await.expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let (stop, stopped) = oneshot::channel::<()>();

        let server = gateway.clone();
        let handle = tokio::spawn(async move {
            server
                .serve_with_shutdown(listener, async {
                    let _ = stopped.await;
                })
                .await
        });

        Self {
            addr,
            gateway,
            stop: Some(stop),
            handle,
        }
    }

    /// Whether the accept loop is still running.
    pub fn is_serving(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop accepting, wait for in-flight sessions, and return the loop's result.
    pub async fn shutdown(mut self) -> Result<(), GatewayError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.await.expect("gateway task panicked")
    }
}

/// Compile a fixture into a shareable host.
pub fn host(wat: &str) -> Arc<ModuleHost> {
    Arc::new(fixtures::host(wat))
}

/// Send `input`, then read until the server closes the connection.
pub async fn request(addr: SocketAddr, input: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(input).await.expect("write request");
    read_all(&mut stream).await
}

/// Send `input`, close the write side, then read until the server closes.
pub async fn request_and_close(addr: SocketAddr, input: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(input).await.expect("write request");
    stream.shutdown().await.expect("half-close");
    read_all(&mut stream).await
}

/// Read until end of stream, failing the test after [`CLIENT_DEADLINE`].
pub async fn read_all(stream: &mut TcpStream) -> Vec<u8> {
    let mut output = Vec::new();
    tokio::time::timeout(CLIENT_DEADLINE, stream.read_to_end(&mut output))
        .await
        .expect("server did not close the connection")
        .expect("read response");
    output
}
