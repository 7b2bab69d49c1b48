use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Duration, timeout};
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::Result;
use crate::protocol::{Decoded, Frame, OpCode, decode, encode};

/// Result of one [`FrameStream::pull_frame`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull {
    /// A complete frame was decoded and its bytes consumed.
    Frame(Frame),
    /// Nothing complete yet; call again later.
    NoData,
    /// The byte source reached EOF or failed, and no whole frame is buffered.
    Closed,
}

/// Reassembles frames from a duplex byte stream.
pub struct FrameStream<T> {
    io: T,
    read_buf: BytesMut,
    read_chunk: usize,
    max_frame_size: usize,
    poll_interval: Duration,
    eof: bool,
}

impl<T> FrameStream<T> {
    /// Wrap a stream with an empty reassembly buffer.
    #[must_use]
    pub fn new(io: T, config: &Config) -> Self {
        Self::with_leftover(io, config, BytesMut::new())
    }

    /// Wrap a stream whose first bytes were already read, e.g. by the
    /// handshake.
    #[must_use]
    pub fn with_leftover(io: T, config: &Config, leftover: BytesMut) -> Self {
        let mut read_buf = BytesMut::with_capacity(config.read_buffer_size.max(leftover.len()));
        read_buf.extend_from_slice(&leftover);
        Self {
            io,
            read_buf,
            read_chunk: config.read_buffer_size.max(64),
            max_frame_size: config.limits.max_frame_size,
            poll_interval: config.poll_interval,
            eof: false,
        }
    }

    /// Number of bytes waiting in the reassembly buffer.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    /// Whether the byte source has signalled EOF or an error.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    #[must_use]
    pub fn get_ref(&self) -> &T {
        &self.io
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> FrameStream<T> {
    /// Take whatever bytes are available right now, then try to decode one
    /// frame.
    ///
    /// A read waits at most the configured poll interval. Dropping the
    /// returned future loses no bytes.
    ///
    /// # Errors
    ///
    /// Returns the codec error if the buffered header is malformed or the
    /// announced payload exceeds the frame limit.
    pub async fn pull_frame(&mut self) -> Result<Pull> {
        if !self.eof {
            self.fill().await;
        }

        match decode(&self.read_buf, self.max_frame_size)? {
            Decoded::Frame(frame, consumed) => {
                self.read_buf.advance(consumed);
                trace!(opcode = %frame.opcode, len = frame.payload().len(), "frame decoded");
                Ok(Pull::Frame(frame))
            }
            Decoded::Incomplete { .. } if self.eof => Ok(Pull::Closed),
            Decoded::Incomplete { .. } => Ok(Pull::NoData),
        }
    }

    async fn fill(&mut self) {
        self.read_buf.reserve(self.read_chunk);
        match timeout(self.poll_interval, self.io.read_buf(&mut self.read_buf)).await {
            Ok(Ok(0)) => {
                debug!(buffered = self.read_buf.len(), "stream reached EOF");
                self.eof = true;
            }
            Ok(Ok(n)) => trace!(bytes = n, buffered = self.read_buf.len(), "bytes received"),
            Ok(Err(e)) => {
                debug!(error = %e, "stream read failed");
                self.eof = true;
            }
            Err(_) => {}
        }
    }

    /// Encode and write one unfragmented, masked frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the write or flush fails.
    pub async fn write_frame(&mut self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        let bytes = encode(opcode, payload);
        self.io.write_all(&bytes).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Shut down the write half of the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}
