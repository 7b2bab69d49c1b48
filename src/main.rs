//! Host build of the lock controller.
//!
//! Runs the real protocol stack against the configured server with simulated
//! pins. Typing `open` or `closed` on stdin moves the simulated door contact
//! and raises its edge interrupt.

use std::process::ExitCode;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use lockwire::app::{App, AppOptions, Shutdown};
use lockwire::device::sim::{SimPin, TokioTimer};
use lockwire::device::{Device, DoorInterrupt};
use lockwire::platform::{HostSystem, RefusingFetcher};
use lockwire::settings::{DEFAULT_PATH, DeviceConfig};
use lockwire::transport::TcpConnector;

fn init_tracing(debug: bool) {
    let fallback = if debug { "lockwire=debug,info" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Feed door levels typed on stdin into the simulated contact.
async fn door_console(pin: SimPin, irq: DoorInterrupt<TokioTimer>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "open" => pin.set(true),
            "closed" => pin.set(false),
            other => {
                warn!(input = other, "expected `open` or `closed`");
                continue;
            }
        }
        irq.on_edge();
    }
}

async fn run(settings: DeviceConfig) -> lockwire::Result<Shutdown> {
    // Hardware.
    let open_pin = SimPin::new(false);
    let close_pin = SimPin::new(false);
    let door_pin = SimPin::new(false);
    info!(
        open = settings.lock_open_pin(),
        close = settings.lock_close_pin(),
        door = settings.door_status_pin(),
        power = settings.power_status_pin(),
        "simulating pins"
    );

    // Network.
    let connector = TcpConnector::new(
        settings.websocket_hostname(),
        settings.websocket_port(),
        settings.websocket_tls(),
    );

    let device_pin = door_pin.clone();
    let resource_uid = settings.resource_uid().to_string();
    let pulse = settings.lock_pulse();
    let settle = settings.door_settle();
    let mut app = App::start(
        AppOptions::from_settings(&settings),
        settings.handshake_params(),
        connector,
        move || {
            Device::builder(resource_uid)
                .pulse(pulse)
                .settle(settle)
                .build(
                    open_pin,
                    close_pin,
                    device_pin,
                    TokioTimer::current(),
                    TokioTimer::current(),
                )
        },
        HostSystem::new(),
        RefusingFetcher,
    )
    .await?;

    tokio::spawn(door_console(door_pin, app.device().door_interrupt()));
    Ok(app.run().await)
}

fn main() -> ExitCode {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_PATH.to_string());
    let settings = DeviceConfig::load(&path);
    init_tracing(settings.as_ref().is_ok_and(DeviceConfig::debug));

    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            error!(path = %path, error = %e, "cannot load config");
            return ExitCode::FAILURE;
        }
    };
    info!(client = settings.client_uid(), host = settings.websocket_hostname(), "starting");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "cannot build runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(settings)) {
        Ok(Shutdown::Reboot) => {
            info!("reset complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "controller failed to start");
            ExitCode::FAILURE
        }
    }
}
