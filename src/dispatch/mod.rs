//! Inbound envelope routing.
//!
//! Every inbound text message is parsed as an [`Envelope`] and routed by the
//! pair `(type, state)`. The pair maps onto a closed set of [`HandlerKey`]s;
//! anything that does not map, or maps to a key with no registered handler,
//! is dropped without a reply.

mod handlers;

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

pub use handlers::{ChangeResourceStatus, FirmwareUpdate, Reboot};

use crate::device::LockControl;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::platform::{ArtifactFetcher, RebootSchedule};
use crate::queue::OutboundQueue;

/// Commands the controller knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    RemoteChangeResourceStatusRequest,
    RebootRequest,
    FirmwareUpdateRequest,
}

impl HandlerKey {
    pub const ALL: [HandlerKey; 3] = [
        HandlerKey::RemoteChangeResourceStatusRequest,
        HandlerKey::RebootRequest,
        HandlerKey::FirmwareUpdateRequest,
    ];

    /// Resolve `type` + `state` with the state's first letter capitalised,
    /// e.g. `("Reboot", "request")` is `RebootRequest`.
    #[must_use]
    pub fn from_parts(kind: &str, state: &str) -> Option<Self> {
        let name = format!("{kind}{}", capitalize(state));
        Self::ALL.into_iter().find(|key| key.name() == name)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            HandlerKey::RemoteChangeResourceStatusRequest => "RemoteChangeResourceStatusRequest",
            HandlerKey::RebootRequest => "RebootRequest",
            HandlerKey::FirmwareUpdateRequest => "FirmwareUpdateRequest",
        }
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// What a handler may touch while it runs.
pub struct DispatchContext<'a> {
    pub device: &'a mut dyn LockControl,
    pub outbound: &'a mut OutboundQueue,
    pub reboot: &'a mut RebootSchedule,
    pub updater: &'a mut dyn ArtifactFetcher,
}

/// One command. Returns the reply to send, if any.
pub trait CommandHandler {
    /// Handle `request`.
    ///
    /// # Errors
    ///
    /// Any error is reported as fault telemetry by the caller; no reply is
    /// sent for a failed command.
    fn handle(&self, request: &Envelope, ctx: &mut DispatchContext<'_>)
    -> Result<Option<Envelope>>;
}

/// Outcome of routing one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// A handler ran; `replied` is whether it queued a reply.
    Handled { key: HandlerKey, replied: bool },
    /// No handler for this `(type, state)`.
    Ignored,
}

/// Handler table keyed by [`HandlerKey`].
#[derive(Default)]
pub struct Router {
    handlers: HashMap<HandlerKey, Box<dyn CommandHandler>>,
}

impl Router {
    /// An empty router that ignores everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A router with every built-in command registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut router = Self::new();
        router.register(
            HandlerKey::RemoteChangeResourceStatusRequest,
            ChangeResourceStatus,
        );
        router.register(HandlerKey::RebootRequest, Reboot);
        router.register(HandlerKey::FirmwareUpdateRequest, FirmwareUpdate);
        router
    }

    /// Register `handler` for `key`, replacing any previous one.
    pub fn register(&mut self, key: HandlerKey, handler: impl CommandHandler + 'static) {
        self.handlers.insert(key, Box::new(handler));
    }

    #[must_use]
    pub fn handles(&self, key: HandlerKey) -> bool {
        self.handlers.contains_key(&key)
    }

    /// Parse `raw`, run the matching handler and queue its reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Envelope`](crate::Error::Envelope) for malformed
    /// input, or whatever the handler failed with.
    pub fn dispatch(&self, raw: &str, ctx: &mut DispatchContext<'_>) -> Result<Dispatched> {
        let envelope = Envelope::from_json(raw)?;
        let Some((key, handler)) = HandlerKey::from_parts(&envelope.kind, &envelope.state)
            .and_then(|key| self.handlers.get(&key).map(|h| (key, h)))
        else {
            debug!(kind = %envelope.kind, state = %envelope.state, uid = %envelope.uid, "no handler, ignoring");
            return Ok(Dispatched::Ignored);
        };

        debug!(%key, uid = %envelope.uid, "dispatching");
        let reply = handler.handle(&envelope, ctx)?;
        let replied = reply.is_some();
        if let Some(reply) = reply {
            ctx.outbound.push_envelope(&reply)?;
        }
        Ok(Dispatched::Handled { key, replied })
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().map(|k| k.name()).collect();
        keys.sort_unstable();
        f.debug_struct("Router").field("handlers", &keys).finish()
    }
}
