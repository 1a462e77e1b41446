use std::fmt::Write;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};

use crate::error::{ConnectionError, ConnectionResult};

/// Most bytes a single read hands to the session. Longer lines arrive in pieces.
pub(crate) const MAX_LINE: usize = 8 * 1024;

/// A line-oriented, buffered view of the client's socket.
pub struct Connection<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> {
    stream: BufStream<Stream>,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Connection<Stream> {
    pub fn new(stream: Stream) -> Self {
        Self {
            stream: BufStream::new(stream),
        }
    }

    /// Write one reply line, terminated with CRLF, and flush it.
    #[tracing::instrument(level = "trace", skip_all)]
    pub(crate) async fn send<S: core::fmt::Display + Send + Sync>(
        &mut self,
        response: &S,
    ) -> ConnectionResult<usize> {
        // Replies are short, so format on the stack
        let mut buffer = arrayvec::ArrayString::<512>::new();
        write!(&mut buffer, "{response}\r\n")?;

        self.stream.write_all(buffer.as_bytes()).await?;
        self.stream.flush().await?;

        Ok(buffer.len())
    }

    /// Append the next line, terminator included, to `line`, reading at most `limit`
    /// bytes.
    ///
    /// Returns `0` once the peer has closed its side. A final line without a
    /// terminator is still returned as-is. A line longer than `limit` is cut: the piece
    /// returned fills `limit` without ending in `\n`, and the next call continues it.
    #[tracing::instrument(level = "trace", skip_all)]
    pub(crate) async fn receive_line(
        &mut self,
        line: &mut Vec<u8>,
        limit: usize,
    ) -> ConnectionResult<usize> {
        (&mut self.stream)
            .take(u64::try_from(limit).unwrap_or(u64::MAX))
            .read_until(b'\n', line)
            .await
            .map_err(ConnectionError::from)
    }
}
