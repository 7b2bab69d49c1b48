//! Client side of the WebSocket opening handshake (RFC 6455 Section 4).
//!
//! The request carries Basic credentials and a fresh random key. The response
//! only needs a `HTTP/1.1 101` status line; the remaining headers are parsed
//! but not required, and the accept value is checked only when asked to.

use crate::config::Limits;
use crate::error::{Error, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::BytesMut;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Parse HTTP headers from an iterator of lines into a case-insensitive HashMap.
fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }
    headers
}

/// Reject header values that would split the request.
fn validate_header_value(header_name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHandshake(format!(
            "{header_name} contains CR or LF characters"
        )));
    }
    Ok(())
}

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use lockwire::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a Sec-WebSocket-Key: 16 random bytes, base64 encoded.
#[must_use]
pub fn generate_key() -> String {
    let mut nonce = [0u8; 16];
    if getrandom::getrandom(&mut nonce).is_err() {
        for chunk in nonce.chunks_exact_mut(4) {
            chunk.copy_from_slice(&crate::protocol::mask::random_mask());
        }
    }
    BASE64.encode(nonce)
}

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeParams {
    /// Server host name, used for `Host` and `Origin`.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Request path, e.g. `/connect/<uid>`.
    pub path: String,
    /// Basic auth user.
    pub user: String,
    /// Basic auth password.
    pub password: String,
}

/// Parsed server response to the upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The full status line.
    pub status_line: String,
    /// The Sec-WebSocket-Accept value, if the server sent one.
    pub accept: Option<String>,
}

impl HandshakeResponse {
    /// Parse the response head (everything before the blank line).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the data is not UTF-8, is empty,
    /// or the status line does not start with `HTTP/1.1 101`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;

        let mut lines = text.lines();
        let status_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;

        if !status_line.starts_with("HTTP/1.1 101") {
            return Err(Error::InvalidHandshake(format!(
                "Expected 101 status, got: {status_line}"
            )));
        }

        let headers = parse_headers(lines);
        Ok(Self {
            status_line: status_line.to_string(),
            accept: headers.get("sec-websocket-accept").cloned(),
        })
    }
}

/// A single client handshake attempt.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    params: HandshakeParams,
    key: String,
}

impl ClientHandshake {
    /// Prepare a handshake with a freshly generated key.
    #[must_use]
    pub fn new(params: HandshakeParams) -> Self {
        Self {
            params,
            key: generate_key(),
        }
    }

    /// The Sec-WebSocket-Key sent with this attempt.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Build the HTTP upgrade request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if any parameter contains CR or LF.
    pub fn request(&self) -> Result<Vec<u8>> {
        let p = &self.params;
        validate_header_value("path", &p.path)?;
        validate_header_value("host", &p.host)?;
        validate_header_value("user", &p.user)?;
        validate_header_value("password", &p.password)?;

        let credentials = BASE64.encode(format!("{}:{}", p.user, p.password));
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(format!("GET {} HTTP/1.1\r\n", p.path).as_bytes());
        buf.extend_from_slice(format!("Host: {}:{}\r\n", p.host, p.port).as_bytes());
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Key: {}\r\n", self.key).as_bytes());
        buf.extend_from_slice(b"Sec-WebSocket-Version: 13\r\n");
        buf.extend_from_slice(format!("Origin: http://{}:{}\r\n", p.host, p.port).as_bytes());
        buf.extend_from_slice(format!("Authorization: Basic {credentials}\r\n").as_bytes());
        buf.extend_from_slice(b"\r\n");
        Ok(buf)
    }

    /// Run the handshake over `stream`.
    ///
    /// Returns any bytes the server sent after the response head; they
    /// belong to the first frames and must seed the reassembly buffer.
    ///
    /// # Errors
    ///
    /// - [`Error::HandshakeTooLarge`] if the response head exceeds the limit
    /// - [`Error::InvalidHandshake`] on a bad status line, an early EOF, or a
    ///   wrong accept value when `verify_accept` is set
    /// - [`Error::Io`] on transport failure
    pub async fn perform<S>(
        &self,
        stream: &mut S,
        limits: &Limits,
        verify_accept: bool,
    ) -> Result<BytesMut>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = self.request()?;
        stream.write_all(&request).await?;
        stream.flush().await?;

        let mut buf = BytesMut::with_capacity(512);
        let head_len = loop {
            if let Some(pos) = find_terminator(&buf) {
                break pos + HEADER_TERMINATOR.len();
            }
            limits.check_handshake_size(buf.len())?;
            if stream.read_buf(&mut buf).await? == 0 {
                return Err(Error::InvalidHandshake(
                    "Connection closed during handshake".into(),
                ));
            }
        };
        limits.check_handshake_size(head_len)?;

        let head = buf.split_to(head_len);
        let response = HandshakeResponse::parse(&head)?;
        debug!(status = %response.status_line, leftover = buf.len(), "handshake response");

        if verify_accept {
            let expected = compute_accept_key(&self.key);
            match response.accept.as_deref() {
                Some(accept) if accept == expected => {}
                Some(accept) => {
                    return Err(Error::InvalidHandshake(format!(
                        "Sec-WebSocket-Accept mismatch: {accept}"
                    )));
                }
                None => {
                    return Err(Error::InvalidHandshake(
                        "Missing Sec-WebSocket-Accept header".into(),
                    ));
                }
            }
        }

        Ok(buf)
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}
