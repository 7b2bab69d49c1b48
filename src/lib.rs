//! # lockwire - firmware core for a network-attached lock controller
//!
//! The controller keeps an authenticated WebSocket session to a control
//! server, reports door and lock state, and actuates the lock on command.
//! It survives network loss and local faults indefinitely.
//!
//! ## Layers
//!
//! - [`protocol`]: frame codec (RFC 6455 client subset) and the opening handshake
//! - [`codec`]: reassembly of frames from a byte stream with arbitrary splits
//! - [`connection`]: message-level session with automatic control frames
//! - [`transport`]: connectors and the never-give-up reconnect policy
//! - [`envelope`], [`queue`], [`dispatch`]: the JSON command protocol
//! - [`device`]: lock pulse-drive and door debounce over `embedded-hal` pins
//! - [`app`]: the main loop tying it all together
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lockwire::app::{App, AppOptions};
//! use lockwire::settings::DeviceConfig;
//!
//! let settings = DeviceConfig::load("/config.json")?;
//! let mut app = App::start(
//!     AppOptions::from_settings(&settings),
//!     settings.handshake_params(),
//!     connector,
//!     || build_device(&settings),
//!     system,
//!     fetcher,
//! )
//! .await?;
//! app.run().await;
//! ```

pub mod app;
pub mod codec;
pub mod config;
pub mod connection;
pub mod device;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod message;
pub mod platform;
pub mod protocol;
pub mod queue;
pub mod settings;
pub mod transport;

#[cfg(feature = "tls-rustls")]
pub mod tls;

pub use config::{Config, Limits};
pub use connection::{ConnectionState, Received, Session};
pub use envelope::Envelope;
pub use error::{Error, ErrorKind, Result};
pub use message::{CloseCode, Message};
pub use protocol::{OpCode, WS_GUID, compute_accept_key};
