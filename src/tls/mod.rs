//! TLS support for secure WebSocket (wss://) connections.
//!
//! Client side only, backed by rustls with the bundled web-pki root set.

mod rustls_impl;

pub use rustls_impl::{TlsConnector, TlsStream, client_config};
