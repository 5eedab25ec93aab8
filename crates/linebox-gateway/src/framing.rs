//! Newline framing.

use crate::error::GatewayError;
use crate::Result;
use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Splits a byte stream into lines.
///
/// Lines end at `\n`; a trailing `\r` is dropped. A final fragment without a
/// newline is returned as a line when it is non-empty. Every line is copied into
/// its own buffer.
pub struct LineReader<R> {
    inner: R,
    max_line_bytes: usize,
    buf: Vec<u8>,
    eof: bool,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    /// Create a reader accepting lines of at most `max_line_bytes`, newline excluded.
    pub fn new(inner: R, max_line_bytes: usize) -> Self {
        Self {
            inner,
            max_line_bytes,
            buf: Vec::new(),
            eof: false,
        }
    }

    /// Read the next line. Returns `None` at end of stream.
    pub async fn next_line(&mut self) -> Result<Option<Bytes>> {
        if self.eof {
            return Ok(None);
        }

        self.buf.clear();
        // Room for the terminating newline.
        let limit = (self.max_line_bytes as u64).saturating_add(1);
        let n = (&mut self.inner)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .await?;

        if n == 0 {
            self.eof = true;
            return Ok(None);
        }

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        } else if self.buf.len() > self.max_line_bytes {
            return Err(GatewayError::LineTooLong(self.max_line_bytes));
        } else {
            // Short read without a newline: the stream ended mid-line.
            self.eof = true;
            if self.buf.is_empty() {
                return Ok(None);
            }
        }

        Ok(Some(Bytes::copy_from_slice(&self.buf)))
    }
}
