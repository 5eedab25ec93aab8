//! Per-connection session handling.

use crate::error::GatewayError;
use crate::framing::LineReader;
use crate::Result;
use linebox_core::config::{ServerConfig, SessionMode};
use linebox_core::{InstanceNamer, SessionId};
use linebox_sandbox::ModuleHost;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tracing::debug;

/// Options shared by every session of a gateway.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// One unit per connection, or every line in order.
    pub mode: SessionMode,

    /// Maximum wait for the next line.
    pub read_timeout: Duration,

    /// Longest accepted line, newline excluded.
    pub max_line_bytes: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for SessionOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            mode: config.session_mode,
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            max_line_bytes: config.max_line_bytes,
        }
    }
}

/// What a session did before it closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Units of work executed and answered.
    pub units: u64,
}

/// Server side of one connection.
///
/// Generic over the stream so any transport that delivers bytes can be served.
#[derive(Debug)]
pub struct Session<S> {
    id: SessionId,
    peer: SocketAddr,
    stream: S,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a session for an accepted stream.
    pub fn new(id: SessionId, peer: SocketAddr, stream: S) -> Self {
        Self { id, peer, stream }
    }

    /// Session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Serve the connection until it is done, then close it.
    ///
    /// Output is written only after the instance that produced it completes.
    /// When an instance fails nothing is written for it and the connection is
    /// closed; the error is returned for the caller to log.
    pub async fn run(self, host: &ModuleHost, options: &SessionOptions) -> Result<SessionSummary> {
        let (reader, mut writer) = tokio::io::split(self.stream);
        let mut lines = LineReader::new(BufReader::new(reader), options.max_line_bytes);
        let mut namer = InstanceNamer::new(self.id);

        let result = serve_units(&mut lines, &mut writer, &mut namer, host, options).await;

        if let Err(e) = writer.shutdown().await {
            debug!(error = %e, "Failed to shut down connection");
        }

        result.map(|()| SessionSummary {
            units: namer.issued(),
        })
    }
}

async fn serve_units<R, W>(
    lines: &mut LineReader<R>,
    writer: &mut W,
    namer: &mut InstanceNamer,
    host: &ModuleHost,
    options: &SessionOptions,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let line = match timeout(options.read_timeout, lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => return Ok(()),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(GatewayError::ReadTimeout(options.read_timeout)),
        };

        if line.is_empty() {
            continue;
        }

        let name = namer.next_name();
        debug!(instance = %name, bytes = line.len(), "Running unit");

        let output = host
            .execute(name.clone(), line)
            .await
            .map_err(|source| GatewayError::Sandbox {
                instance: name,
                source,
            })?;

        writer.write_all(&output.stdout).await?;
        writer.flush().await?;

        debug!(
            instance = %output.name,
            bytes = output.stdout.len(),
            duration_ms = output.duration_ms,
            "Unit answered"
        );

        if options.mode == SessionMode::OneShot {
            return Ok(());
        }
    }
}
