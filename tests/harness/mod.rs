//! Test harness: in-memory streams, a scripted server end and a connector
//! whose attempts the test controls.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use lockwire::protocol::{Decoded, Frame, OpCode, decode, encode_with_mask};
use lockwire::transport::Connector;
use lockwire::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

/// Byte source that hands out one queued chunk per read.
///
/// Reads are pending while the queue is empty; `None` in the queue is EOF.
/// Everything written is captured in a shared buffer.
#[derive(Debug, Default)]
pub struct ChunkedStream {
    chunks: VecDeque<Option<Vec<u8>>>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl ChunkedStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `data` split into pieces of `size` bytes.
    pub fn with_chunks(data: &[u8], size: usize) -> Self {
        let mut stream = Self::new();
        for chunk in data.chunks(size.max(1)) {
            stream.push(chunk);
        }
        stream
    }

    pub fn push(&mut self, data: &[u8]) {
        self.chunks.push_back(Some(data.to_vec()));
    }

    pub fn push_eof(&mut self) {
        self.chunks.push_back(None);
    }

    /// Handle to the bytes written so far.
    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }
}

impl AsyncRead for ChunkedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.chunks.pop_front() {
            Some(Some(chunk)) => {
                buf.put_slice(&chunk);
                Poll::Ready(Ok(()))
            }
            Some(None) => Poll::Ready(Ok(())),
            None => Poll::Pending,
        }
    }
}

impl AsyncWrite for ChunkedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.written.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Decode every complete frame in `bytes`.
pub fn frames_in(bytes: &[u8]) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut rest = bytes;
    while let Ok(Decoded::Frame(frame, used)) = decode(rest, usize::MAX) {
        frames.push(frame);
        rest = &rest[used..];
    }
    frames
}

/// Server end of a duplex pipe.
pub struct FakeServer {
    io: DuplexStream,
    buf: Vec<u8>,
}

impl FakeServer {
    pub fn new(io: DuplexStream) -> Self {
        Self {
            io,
            buf: Vec::new(),
        }
    }

    /// Read the upgrade request and answer with `status`.
    /// Returns the request text.
    pub async fn answer(&mut self, status: &str) -> String {
        let mut chunk = [0u8; 512];
        loop {
            if let Some(end) = self.buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let request: Vec<u8> = self.buf.drain(..end + 4).collect();
                let reply = format!("{status}\r\n\r\n");
                self.io.write_all(reply.as_bytes()).await.unwrap();
                return String::from_utf8(request).unwrap();
            }
            let n = self.io.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client hung up during handshake");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Accept the upgrade.
    pub async fn accept(&mut self) -> String {
        self.answer("HTTP/1.1 101 Switching Protocols").await
    }

    /// Send one unmasked frame.
    pub async fn send(&mut self, opcode: OpCode, payload: &[u8]) {
        self.io
            .write_all(&encode_with_mask(opcode, payload, None))
            .await
            .unwrap();
    }

    /// Write bytes as-is.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.io.write_all(bytes).await.unwrap();
    }

    pub async fn send_text(&mut self, text: &str) {
        self.send(OpCode::Text, text.as_bytes()).await;
    }

    /// Next frame from the client; `None` on EOF.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Decoded::Frame(frame, used) = decode(&self.buf, usize::MAX).unwrap() {
                self.buf.drain(..used);
                return Some(frame);
            }
            let n = self.io.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Next text frame's payload, skipping control frames.
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            let frame = self.next_frame().await?;
            if frame.opcode == OpCode::Text {
                return Some(String::from_utf8(frame.into_payload()).unwrap());
            }
        }
    }

    pub fn into_inner(self) -> DuplexStream {
        self.io
    }
}

/// Connector whose every attempt is scripted by the test: each item sent on
/// the channel is the outcome of one `connect` call.
pub struct ScriptedConnector {
    outcomes: mpsc::UnboundedReceiver<Result<DuplexStream>>,
}

pub type Script = mpsc::UnboundedSender<Result<DuplexStream>>;

impl ScriptedConnector {
    pub fn new() -> (Self, Script) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { outcomes: rx }, tx)
    }
}

impl Connector for ScriptedConnector {
    type Stream = DuplexStream;

    async fn connect(&mut self) -> Result<DuplexStream> {
        self.outcomes
            .recv()
            .await
            .unwrap_or_else(|| Err(Error::Io("script exhausted".into())))
    }
}

/// Script `n` refused connections.
pub fn refuse(script: &Script, n: usize) {
    for _ in 0..n {
        script
            .send(Err(Error::Io("connection refused".into())))
            .unwrap();
    }
}

/// Script one successful connection whose server end answers the upgrade.
pub fn spawn_server(script: &Script) -> tokio::task::JoinHandle<FakeServer> {
    let (client, server) = tokio::io::duplex(1 << 20);
    script.send(Ok(client)).unwrap();
    tokio::spawn(async move {
        let mut server = FakeServer::new(server);
        server.accept().await;
        server
    })
}
