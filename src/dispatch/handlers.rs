//! Built-in command handlers.

use serde_json::json;
use tracing::info;

use crate::dispatch::{CommandHandler, DispatchContext};
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::platform::REBOOT_DELAY;

fn str_field<'a>(request: &'a Envelope, field: &str) -> Result<&'a str> {
    request
        .data
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Envelope(format!("{}: missing data.{field}", request.kind)))
}

/// `RemoteChangeResourceStatus`: `"open"` opens, any other status closes.
///
/// Always replies with empty data, whether or not the lock moved.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeResourceStatus;

impl CommandHandler for ChangeResourceStatus {
    fn handle(
        &self,
        request: &Envelope,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<Option<Envelope>> {
        let status = str_field(request, "status")?;
        if status == "open" {
            ctx.device.open_lock(ctx.outbound)?;
        } else {
            ctx.device.close_lock(ctx.outbound)?;
        }
        Ok(Some(Envelope::reply_to(request, json!({}))))
    }
}

/// `Reboot`: reply now, reset after [`REBOOT_DELAY`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Reboot;

impl CommandHandler for Reboot {
    fn handle(
        &self,
        request: &Envelope,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<Option<Envelope>> {
        ctx.reboot.schedule(REBOOT_DELAY);
        Ok(Some(Envelope::reply_to(request, json!({}))))
    }
}

/// `FirmwareUpdate`: stage `data.version` for the next boot.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirmwareUpdate;

impl CommandHandler for FirmwareUpdate {
    fn handle(
        &self,
        request: &Envelope,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<Option<Envelope>> {
        let version = str_field(request, "version")?;
        info!(version, "staging firmware update");
        let staged = ctx.updater.stage(version)?;
        info!(version, staged, "firmware update staged");
        Ok(Some(Envelope::reply_to(request, json!({ "staged": staged }))))
    }
}
