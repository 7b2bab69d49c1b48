//! Application message envelope exchanged once a session is open.
//!
//! # Format
//!
//! ```json
//! {
//!   "state": "request",
//!   "type": "RemoteChangeResourceStatus",
//!   "uid": "9f2c...e1",
//!   "data": { "status": "open" }
//! }
//! ```
//!
//! Every exchange carries a uid; a reply echoes the uid of its request.
//! Correlation is the server's business.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::Result;

/// `state` of a message initiated by its sender.
pub const REQUEST: &str = "request";
/// `state` of an answer to a request.
pub const REPLY: &str = "reply";

/// Line terminator appended to every outbound envelope on the wire.
pub const WIRE_TERMINATOR: &str = "\r\n";

/// One application-level message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// `"request"` or `"reply"`. Other values parse but match no handler.
    pub state: String,

    /// Message type, e.g. `"DoorStatus"`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Hex identifier shared by a request and its reply.
    pub uid: String,

    /// Structured payload. Missing means an empty object.
    #[serde(default = "empty_data")]
    pub data: Value,
}

fn empty_data() -> Value {
    Value::Object(Map::new())
}

/// Generate a fresh uid: 16 random bytes as lowercase hex.
#[must_use]
pub fn new_uid() -> String {
    let mut raw = [0u8; 16];
    if getrandom::getrandom(&mut raw).is_err() {
        for chunk in raw.chunks_exact_mut(4) {
            chunk.copy_from_slice(&crate::protocol::random_mask());
        }
    }
    hex::encode(raw)
}

impl Envelope {
    /// Creates a new request with an auto-generated uid.
    #[must_use]
    pub fn request(kind: impl Into<String>, data: Value) -> Self {
        Self {
            state: REQUEST.to_string(),
            kind: kind.into(),
            uid: new_uid(),
            data,
        }
    }

    /// Creates the reply to `request`, echoing its type and uid.
    #[must_use]
    pub fn reply_to(request: &Envelope, data: Value) -> Self {
        Self {
            state: REPLY.to_string(),
            kind: request.kind.clone(),
            uid: request.uid.clone(),
            data,
        }
    }

    /// Parse an inbound message.
    ///
    /// Trailing whitespace, including the line terminator, is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Envelope`](crate::Error::Envelope) on malformed JSON
    /// or a missing `state`, `type` or `uid`.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw.trim_end())?)
    }

    /// Serialise to compact JSON, without the wire terminator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Envelope`](crate::Error::Envelope) if serialisation fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether this is a request.
    #[must_use]
    pub fn is_request(&self) -> bool {
        self.state == REQUEST
    }

    /// Whether this is a reply.
    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.state == REPLY
    }

    // ------------------------------------------------------------------
    // System-generated requests
    // ------------------------------------------------------------------

    /// Connection lifecycle notice, e.g. `"reconnected"`.
    #[must_use]
    pub fn connection_change(status: &str) -> Self {
        Self::request("ConnectionChange", json!({ "status": status }))
    }

    /// Lock status event.
    #[must_use]
    pub fn resource_status_change(status: &str, resource_uid: &str) -> Self {
        Self::request(
            "ResourceStatusChange",
            json!({ "status": status, "resource_uid": resource_uid }),
        )
    }

    /// Door status event; `true` means open.
    #[must_use]
    pub fn door_status(open: bool) -> Self {
        Self::request("DoorStatus", json!({ "status": open }))
    }

    /// Fault telemetry.
    #[must_use]
    pub fn exception(error: &str) -> Self {
        Self::request("Exception", json!({ "error": error }))
    }

    /// Startup announcement with platform and network details.
    #[must_use]
    pub fn boot_notification(info: &BootInfo) -> Self {
        Self::request(
            "BootNotification",
            serde_json::to_value(info).unwrap_or_else(|_| empty_data()),
        )
    }
}

/// Platform and network details sent once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootInfo {
    pub sysname: String,
    pub nodename: String,
    pub release: String,
    pub version: String,
    pub machine: String,
    pub ip: String,
    pub subnet: String,
    pub gateway: String,
    pub dns: String,
}
