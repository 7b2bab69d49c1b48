//! Raw transport capability and the reconnecting transport manager.
//!
//! [`TransportManager`] never gives up: every failed connect or handshake is
//! logged, counted and retried. A device without network spins here until
//! the network comes back.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connection::Session;
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::protocol::HandshakeParams;
use crate::queue::OutboundQueue;

/// Opens a fresh byte stream to the server.
#[allow(async_fn_in_trait)]
pub trait Connector {
    /// The duplex stream the session runs over.
    type Stream: AsyncRead + AsyncWrite + Unpin;

    /// Open one connection. Failures are retried by the caller.
    async fn connect(&mut self) -> Result<Self::Stream>;
}

/// TCP stream, optionally wrapped in TLS.
pub enum MaybeTlsStream {
    Plain(TcpStream),
    #[cfg(feature = "tls-rustls")]
    Tls(Box<crate::tls::TlsStream<TcpStream>>),
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Connects over TCP, with TLS when `tls` is set.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    tls: bool,
    #[cfg(feature = "tls-rustls")]
    tls_connector: crate::tls::TlsConnector,
}

impl TcpConnector {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
            #[cfg(feature = "tls-rustls")]
            tls_connector: crate::tls::TlsConnector::default(),
        }
    }
}

impl Connector for TcpConnector {
    type Stream = MaybeTlsStream;

    async fn connect(&mut self) -> Result<MaybeTlsStream> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
        tcp.set_nodelay(true)?;
        if !self.tls {
            return Ok(MaybeTlsStream::Plain(tcp));
        }

        #[cfg(feature = "tls-rustls")]
        {
            let tls = self.tls_connector.connect(&self.host, tcp).await?;
            Ok(MaybeTlsStream::Tls(Box::new(tls)))
        }
        #[cfg(not(feature = "tls-rustls"))]
        {
            drop(tcp);
            Err(Error::Tls("built without TLS support".into()))
        }
    }
}

/// Owns connection establishment and the retry policy.
pub struct TransportManager<C: Connector> {
    connector: C,
    params: HandshakeParams,
    config: Config,
    failed_attempts: u64,
    connects: u64,
}

impl<C: Connector> TransportManager<C> {
    #[must_use]
    pub fn new(connector: C, params: HandshakeParams, config: Config) -> Self {
        Self {
            connector,
            params,
            config,
            failed_attempts: 0,
            connects: 0,
        }
    }

    /// Failed connect or handshake attempts since creation.
    #[must_use]
    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts
    }

    /// Successful connects since creation.
    #[must_use]
    pub fn connects(&self) -> u64 {
        self.connects
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connect and handshake, retrying until it works.
    pub async fn connect(&mut self) -> Session<C::Stream> {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            debug!(attempt, host = %self.params.host, port = self.params.port, "handshake attempt");
            match self.attempt().await {
                Ok(session) => {
                    self.connects += 1;
                    info!(attempt, host = %self.params.host, "connected");
                    return session;
                }
                Err(e) => {
                    self.failed_attempts += 1;
                    warn!(attempt, error = %e, kind = ?e.kind(), "handshake failed");
                    if self.config.reconnect_delay.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(self.config.reconnect_delay).await;
                    }
                }
            }
        }
    }

    /// Like [`connect`](Self::connect), then enqueue a `ConnectionChange`
    /// notice for the server.
    pub async fn reconnect(&mut self, queue: &mut OutboundQueue) -> Session<C::Stream> {
        let session = self.connect().await;
        self.announce_reconnect(queue);
        session
    }

    /// Queue the `ConnectionChange` notice for a session opened with
    /// [`connect`](Self::connect) after an outage.
    pub fn announce_reconnect(&self, queue: &mut OutboundQueue) {
        info!(connects = self.connects, failed = self.failed_attempts, "reconnected");
        if let Err(e) = queue.push_envelope(&Envelope::connection_change("reconnected")) {
            warn!(error = %e, "could not queue reconnect notice");
        }
    }

    async fn attempt(&mut self) -> Result<Session<C::Stream>> {
        let connector = &mut self.connector;
        let params = self.params.clone();
        let config = &self.config;
        let attempt = async move {
            let io = connector.connect().await?;
            Session::handshake(io, params, config).await
        };
        match timeout(self.config.handshake_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(Error::InvalidHandshake(format!(
                "timed out after {:?}",
                self.config.handshake_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

    fn params() -> HandshakeParams {
        HandshakeParams {
            host: "locks.example.com".into(),
            port: 443,
            path: "/connect/dev-1".into(),
            user: "dev-1".into(),
            password: "pw".into(),
        }
    }

    /// Fails `failures` times, then hands out a duplex stream whose server
    /// end answers the upgrade request.
    struct FlakyConnector {
        failures: usize,
        status: &'static str,
    }

    impl Connector for FlakyConnector {
        type Stream = DuplexStream;

        async fn connect(&mut self) -> Result<DuplexStream> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(Error::Io("connection refused".into()));
            }
            let (client, mut server) = duplex(4096);
            let status = self.status;
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1024];
                let mut seen = Vec::new();
                while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = server.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    seen.extend_from_slice(&buf[..n]);
                }
                let reply = format!("{status}\r\nUpgrade: websocket\r\n\r\n");
                let _ = server.write_all(reply.as_bytes()).await;
                // Keep the server end alive for the session.
                let _ = server.read(&mut buf).await;
            });
            Ok(client)
        }
    }

    #[tokio::test]
    async fn test_connect_retries_until_success() {
        let connector = FlakyConnector {
            failures: 5,
            status: "HTTP/1.1 101 Switching Protocols",
        };
        let mut manager = TransportManager::new(connector, params(), Config::default());

        let session = manager.connect().await;
        assert!(session.is_open());
        assert_eq!(manager.failed_attempts(), 5);
        assert_eq!(manager.connects(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_queues_exactly_one_notice() {
        let connector = FlakyConnector {
            failures: 3,
            status: "HTTP/1.1 101 Switching Protocols",
        };
        let mut manager = TransportManager::new(connector, params(), Config::default());
        let mut queue = OutboundQueue::default();

        let session = manager.reconnect(&mut queue).await;
        assert!(session.is_open());
        assert_eq!(queue.len(), 1);

        let notice = Envelope::from_json(&queue.pop_next().unwrap()).unwrap();
        assert_eq!(notice.kind, "ConnectionChange");
        assert_eq!(notice.data["status"], "reconnected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_delay_between_attempts() {
        let connector = FlakyConnector {
            failures: 2,
            status: "HTTP/1.1 101 Switching Protocols",
        };
        let config = Config::default().with_reconnect_delay(Duration::from_secs(5));
        let mut manager = TransportManager::new(connector, params(), config);

        let start = tokio::time::Instant::now();
        let _session = manager.connect().await;
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[test]
    fn test_tcp_connector_new() {
        let connector = TcpConnector::new("locks.example.com", 443, true);
        assert_eq!(connector.port, 443);
        assert!(connector.tls);
    }
}
