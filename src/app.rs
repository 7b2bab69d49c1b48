//! The controller's main loop.
//!
//! One [`App::tick`] is one iteration: make sure a session is open, send at
//! most one queued envelope, try one receive, dispatch it, then service the
//! device timers. Faults never escape a tick. Transport hiccups are retried
//! on the next pass, and everything else is queued for the server as an
//! `Exception` envelope.
//!
//! Device timers and the reboot deadline do not depend on the network. While
//! a reconnect is pending they keep being serviced every
//! [`AppOptions::service_interval`].

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::connection::{Received, Session};
use crate::device::Controller;
use crate::dispatch::{DispatchContext, Dispatched, Router};
use crate::envelope::{Envelope, WIRE_TERMINATOR};
use crate::error::{Error, Result};
use crate::message::{CloseCode, Message};
use crate::platform::{ArtifactFetcher, RebootSchedule, SystemControl};
use crate::protocol::HandshakeParams;
use crate::queue::{DrainOrder, OutboundQueue};
use crate::settings::DeviceConfig;
use crate::transport::{Connector, TransportManager};

/// Default period for servicing the device while the session is down.
pub const DEFAULT_SERVICE_INTERVAL: Duration = Duration::from_millis(10);

/// Why [`App::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// A reboot command completed and the platform reset was requested.
    Reboot,
}

/// Main-loop tuning.
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Session limits and timing.
    pub session: Config,
    /// Log raw inbound and outbound payloads.
    pub debug: bool,
    pub drain_order: DrainOrder,
    pub queue_limit: Option<usize>,
    /// Period of the door comparator; `None` disables it.
    pub door_check_interval: Option<Duration>,
    /// How often device timers and the reboot deadline are checked while
    /// reconnecting.
    pub service_interval: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            session: Config::default(),
            debug: false,
            drain_order: DrainOrder::default(),
            queue_limit: None,
            door_check_interval: None,
            service_interval: DEFAULT_SERVICE_INTERVAL,
        }
    }
}

impl AppOptions {
    /// Options from the device config file.
    #[must_use]
    pub fn from_settings(settings: &DeviceConfig) -> Self {
        Self {
            debug: settings.debug(),
            drain_order: settings.outbound_drain_order(),
            queue_limit: settings.outbound_queue_limit(),
            door_check_interval: settings.door_check_interval(),
            ..Self::default()
        }
    }
}

/// The part of the controller that runs with or without a session.
struct Local<D, S, F> {
    device: D,
    outbound: OutboundQueue,
    reboot: RebootSchedule,
    system: S,
    updater: F,
    door_check: Option<(Duration, Instant)>,
}

impl<D, S, F> Local<D, S, F>
where
    D: Controller,
    S: SystemControl,
{
    /// Finish expired timers and run the door comparator when it is due.
    fn service(&mut self) {
        if let Err(e) = self.service_device() {
            self.contain(e);
        }
    }

    fn service_device(&mut self) -> Result<()> {
        let polled = self.device.poll(&mut self.outbound);

        if let Some((every, next)) = self.door_check.as_mut() {
            let now = Instant::now();
            if now >= *next {
                *next = now + *every;
                self.device.check_door(&mut self.outbound)?;
            }
        }
        polled
    }

    fn reboot_due(&self) -> bool {
        self.reboot.is_due(Instant::now())
    }

    fn reset(&mut self) -> Shutdown {
        info!(pending = self.outbound.len(), "rebooting");
        self.system.reset();
        Shutdown::Reboot
    }

    /// Keep a fault inside the loop.
    fn contain(&mut self, err: Error) {
        if err.is_recoverable() {
            debug!(error = %err, kind = ?err.kind(), "transient transport condition");
            return;
        }
        error!(error = %err, kind = ?err.kind(), "fault contained, reporting");
        if let Err(e) = self
            .outbound
            .push_envelope(&Envelope::exception(&err.to_string()))
        {
            warn!(error = %e, "could not queue fault report");
        }
    }
}

/// Everything the main loop owns.
pub struct App<C: Connector, D, S, F> {
    transport: TransportManager<C>,
    session: Option<Session<C::Stream>>,
    router: Router,
    local: Local<D, S, F>,
    debug: bool,
    service_interval: Duration,
}

impl<C, D, S, F> App<C, D, S, F>
where
    C: Connector,
    D: Controller,
    S: SystemControl,
    F: ArtifactFetcher,
{
    /// Bring the controller up.
    ///
    /// Initialisation runs in a fixed order: transport session, then the
    /// device (via `init_device`), then the command router. A boot
    /// notification is queued once everything is in place.
    ///
    /// # Errors
    ///
    /// Returns whatever `init_device` fails with. Connecting never fails; it
    /// retries until the server answers.
    pub async fn start<I>(
        options: AppOptions,
        params: HandshakeParams,
        connector: C,
        init_device: I,
        system: S,
        updater: F,
    ) -> Result<Self>
    where
        I: FnOnce() -> Result<D>,
    {
        let mut outbound = OutboundQueue::new(options.drain_order);
        if let Some(limit) = options.queue_limit {
            outbound = outbound.with_capacity_limit(limit);
        }

        let mut transport = TransportManager::new(connector, params, options.session);
        let session = transport.connect().await;
        let device = init_device()?;
        let router = Router::with_defaults();

        outbound.push_envelope(&Envelope::boot_notification(&system.boot_info()))?;
        info!(order = ?options.drain_order, debug = options.debug, "controller started");

        Ok(Self {
            transport,
            session: Some(session),
            router,
            local: Local {
                device,
                outbound,
                reboot: RebootSchedule::default(),
                system,
                updater,
                door_check: options
                    .door_check_interval
                    .map(|every| (every, Instant::now() + every)),
            },
            debug: options.debug,
            service_interval: options.service_interval.max(Duration::from_millis(1)),
        })
    }

    #[must_use]
    pub fn device(&self) -> &D {
        &self.local.device
    }

    #[must_use]
    pub fn outbound(&self) -> &OutboundQueue {
        &self.local.outbound
    }

    #[must_use]
    pub fn transport(&self) -> &TransportManager<C> {
        &self.transport
    }

    #[must_use]
    pub fn system(&self) -> &S {
        &self.local.system
    }

    /// Whether a session is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_open)
    }

    /// Run until a reboot completes.
    pub async fn run(&mut self) -> Shutdown {
        loop {
            if let Some(shutdown) = self.tick().await {
                return shutdown;
            }
            tokio::task::yield_now().await;
        }
    }

    /// One main-loop iteration.
    pub async fn tick(&mut self) -> Option<Shutdown> {
        if !self.is_connected() {
            if let Some(shutdown) = self.reconnect().await {
                return Some(shutdown);
            }
        }
        if let Err(e) = self.exchange().await {
            self.local.contain(e);
        }
        self.local.service();

        if self.local.reboot_due() {
            if let Some(session) = self.session.as_mut() {
                if let Err(e) = session.close(CloseCode::GoingAway, "reboot").await {
                    debug!(error = %e, "session not closed before reboot");
                }
            }
            return Some(self.local.reset());
        }
        None
    }

    /// Re-establish the session, servicing the device between attempts.
    ///
    /// Returns early if the reboot deadline passes while the server is
    /// unreachable.
    async fn reconnect(&mut self) -> Option<Shutdown> {
        self.session = None;
        info!(pending = self.local.outbound.len(), "session closed, reconnecting");

        let local = &mut self.local;
        let session = {
            let connect = self.transport.connect();
            tokio::pin!(connect);
            let mut service = interval(self.service_interval);
            service.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    session = &mut connect => break session,
                    _ = service.tick() => {
                        local.service();
                        if local.reboot_due() {
                            return Some(local.reset());
                        }
                    }
                }
            }
        };

        self.transport.announce_reconnect(&mut self.local.outbound);
        self.session = Some(session);
        None
    }

    /// Send one queued item, then receive and dispatch one message.
    async fn exchange(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(Error::ConnectionClosed(None));
        };
        let local = &mut self.local;

        if let Some(item) = local.outbound.pop_next() {
            if self.debug {
                debug!(">> {item}");
            }
            let wire = format!("{item}{WIRE_TERMINATOR}");
            if let Err(e) = session.send(&Message::text(wire)).await {
                local.outbound.restore(item);
                return Err(e);
            }
        }

        let text = match session.recv().await? {
            Received::Message(Message::Text(text)) => text,
            Received::Message(Message::Binary(bytes)) => {
                String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?
            }
            Received::None => return Ok(()),
            Received::Closed => {
                info!("session closed by server");
                return Ok(());
            }
        };
        if self.debug {
            debug!("<< {}", text.trim_end());
        }

        let mut ctx = DispatchContext {
            device: &mut local.device,
            outbound: &mut local.outbound,
            reboot: &mut local.reboot,
            updater: &mut local.updater,
        };
        match self.router.dispatch(&text, &mut ctx)? {
            Dispatched::Handled { key, replied } => debug!(%key, replied, "handled"),
            Dispatched::Ignored => {}
        }
        Ok(())
    }
}
