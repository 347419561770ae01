//! Status queries and the two-phase scan.

use log::{debug, warn};

use crate::Result;
use crate::api::models::{EventKind, Hotspot, WpaStatus};
use crate::core::control::ControlChannel;
use crate::core::parse::{parse_scan_results, parse_status};
use crate::types::constants::command;

/// Fetches and parses the daemon's `STATUS` reply.
pub(crate) async fn status(channel: &ControlChannel) -> Result<WpaStatus> {
    let reply = channel.command::<&str>(command::STATUS, &[]).await?;
    Ok(parse_status(&reply))
}

/// Fetches the results the daemon currently holds, without scanning.
pub(crate) async fn scan_results(channel: &ControlChannel) -> Result<Vec<Hotspot>> {
    let reply = channel.command::<&str>(command::SCAN_RESULTS, &[]).await?;
    let hotspots = parse_scan_results(&reply);
    debug!("Parsed {} scan results", hotspots.len());
    Ok(hotspots)
}

/// Requests a scan and returns the fresh results.
///
/// `SCAN` is only acknowledged by its reply; completion is reported by the
/// scan-results event. If that event does not arrive within the configured
/// scan timeout, the results currently held by the daemon are returned.
pub(crate) async fn scan(channel: &ControlChannel) -> Result<Vec<Hotspot>> {
    let timeout = channel.config().timeouts.scan;

    match channel
        .command_until(command::SCAN, EventKind::ScanResults, timeout)
        .await?
    {
        Some(_) => debug!("Scan completed on {}", channel.iface()),
        None => warn!(
            "No scan completion on {} after {timeout:?}, using current results",
            channel.iface()
        ),
    }

    scan_results(channel).await
}
