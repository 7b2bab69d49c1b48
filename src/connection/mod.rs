//! WebSocket session management.
//!
//! A [`Session`] is created per successful handshake and discarded when it
//! closes:
//!
//! 1. **Open** - handshake done, messages flow
//! 2. **Closing** - our close frame is being written
//! 3. **Closed** - transport released; reconnect builds a new session
//!
//! ## Example
//!
//! ```rust,ignore
//! use lockwire::{Config, Message, Session};
//!
//! let mut session = Session::handshake(stream, params, &Config::default()).await?;
//! session.send(&Message::text("Hello")).await?;
//! if let Received::Message(msg) = session.recv().await? {
//!     println!("Received: {msg:?}");
//! }
//! session.close(CloseCode::Normal, "done").await?;
//! ```

mod session;
mod state;

pub use session::{Received, Session};
pub use state::ConnectionState;
