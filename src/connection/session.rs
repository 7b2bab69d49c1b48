use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::codec::{FrameStream, Pull};
use crate::config::Config;
use crate::connection::ConnectionState;
use crate::error::{Error, Result};
use crate::message::{CloseCode, Message};
use crate::protocol::{ClientHandshake, Frame, HandshakeParams, OpCode};

/// Outcome of one [`Session::recv`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A complete text or binary message.
    Message(Message),
    /// Nothing available right now.
    None,
    /// The session is closed; build a new one.
    Closed,
}

/// A client WebSocket session over an established byte stream.
///
/// Control frames are handled internally: pings are answered, pongs are
/// dropped, and a close frame is echoed before the transport is released.
/// Fragmented messages are refused with close code 1003.
pub struct Session<T> {
    stream: FrameStream<T>,
    state: ConnectionState,
}

impl<T> Session<T> {
    /// Wrap a stream on which the handshake has already completed.
    #[must_use]
    pub fn from_stream(stream: FrameStream<T>) -> Self {
        Self {
            stream,
            state: ConnectionState::Open,
        }
    }

    /// Get the current session state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the session is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Borrow the underlying transport.
    #[must_use]
    pub fn get_ref(&self) -> &T {
        self.stream.get_ref()
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Session<T> {
    /// Run the opening handshake over `io` and start a session on it.
    ///
    /// # Errors
    ///
    /// Returns the handshake error; `io` is dropped in that case.
    pub async fn handshake(mut io: T, params: HandshakeParams, config: &Config) -> Result<Self> {
        let handshake = ClientHandshake::new(params);
        let leftover = handshake
            .perform(&mut io, &config.limits, config.verify_accept)
            .await?;
        Ok(Self::from_stream(FrameStream::with_leftover(io, config, leftover)))
    }

    /// Send one message as exactly one frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionClosed` if the session is not open or the
    /// write fails; in the latter case the session is marked closed.
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed(None));
        }

        if let Err(e) = self
            .stream
            .write_frame(message.opcode(), message.as_bytes())
            .await
        {
            warn!(error = %e, "send failed, closing session");
            self.state = ConnectionState::Closed;
            return Err(Error::ConnectionClosed(None));
        }
        Ok(())
    }

    /// Try to receive one application message.
    ///
    /// # Errors
    ///
    /// Protocol violations close the session (1009 for oversized frames,
    /// 1003 for fragments, 1007 for bad UTF-8, 1002 otherwise) and are
    /// returned so the caller can report them.
    pub async fn recv(&mut self) -> Result<Received> {
        if !self.state.is_active() {
            return Ok(Received::Closed);
        }

        loop {
            let frame = match self.stream.pull_frame().await {
                Ok(Pull::Frame(frame)) => frame,
                Ok(Pull::NoData) => return Ok(Received::None),
                Ok(Pull::Closed) => {
                    debug!("transport closed by peer");
                    self.state = ConnectionState::Closed;
                    return Ok(Received::Closed);
                }
                Err(e) => {
                    let code = match e {
                        Error::FrameTooLarge { .. } => CloseCode::MessageTooBig,
                        _ => CloseCode::ProtocolError,
                    };
                    self.fail(code).await;
                    return Err(e);
                }
            };

            match frame.opcode {
                OpCode::Ping => {
                    let pong = frame.into_payload();
                    if let Err(e) = self.stream.write_frame(OpCode::Pong, &pong).await {
                        debug!(error = %e, "pong write failed");
                        self.state = ConnectionState::Closed;
                        return Ok(Received::Closed);
                    }
                }
                OpCode::Pong => {}
                OpCode::Close => {
                    let code = frame.close_code();
                    debug!(?code, "close frame received");
                    self.echo_close(code).await;
                    return Ok(Received::Closed);
                }
                OpCode::Continuation => {
                    self.fail(CloseCode::UnsupportedData).await;
                    return Err(Error::UnsupportedContinuation);
                }
                OpCode::Text | OpCode::Binary if !frame.fin => {
                    self.fail(CloseCode::UnsupportedData).await;
                    return Err(Error::UnsupportedContinuation);
                }
                OpCode::Text => {
                    return match String::from_utf8(frame.into_payload()) {
                        Ok(text) => Ok(Received::Message(Message::Text(text))),
                        Err(_) => {
                            self.fail(CloseCode::InvalidPayload).await;
                            Err(Error::InvalidUtf8)
                        }
                    };
                }
                OpCode::Binary => {
                    return Ok(Received::Message(Message::Binary(frame.into_payload())));
                }
            }
        }
    }

    /// Write a close frame, mark the session closed and release the
    /// transport. Closing a session that is not open does nothing.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCloseCode` for codes that may not be sent.
    pub async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }
        if !code.is_sendable() {
            return Err(Error::InvalidCloseCode(code.as_u16()));
        }

        debug!(%code, reason, "closing session");
        self.state = ConnectionState::Closing;
        self.write_close(Frame::close(Some(code.as_u16()), reason))
            .await;
        Ok(())
    }

    async fn fail(&mut self, code: CloseCode) {
        warn!(%code, "protocol violation, closing session");
        if self.state == ConnectionState::Open {
            self.state = ConnectionState::Closing;
            self.write_close(Frame::close(Some(code.as_u16()), "")).await;
        }
        self.state = ConnectionState::Closed;
    }

    async fn echo_close(&mut self, code: Option<u16>) {
        if self.state == ConnectionState::Open {
            self.state = ConnectionState::Closing;
            let echoed = code
                .map(CloseCode::from_u16)
                .filter(CloseCode::is_sendable)
                .map(|c| c.as_u16());
            self.write_close(Frame::close(echoed, "")).await;
        }
        self.state = ConnectionState::Closed;
    }

    /// Best effort: the peer may already be gone.
    async fn write_close(&mut self, frame: Frame) {
        if let Err(e) = self
            .stream
            .write_frame(OpCode::Close, frame.payload())
            .await
        {
            debug!(error = %e, "close frame not delivered");
        }
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "transport shutdown failed");
        }
        self.state = ConnectionState::Closed;
    }
}
