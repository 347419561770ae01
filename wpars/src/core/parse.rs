//! Parsers for control protocol replies and event lines.
//!
//! The daemon's listings come from a live process and may be truncated or
//! contain rows this crate does not understand. Every parser here drops
//! such rows and keeps going; none of them fail.

use log::{debug, warn};
use std::collections::HashMap;

use crate::api::models::{ControlEvent, EventKind, Hotspot, NetworkProfile, WpaStatus};
use crate::types::constants::limits;

/// Interactive prompt printed by `wpa_cli`.
const PROMPT: &str = ">";

/// Returns the length of the `<N>` event marker at the start of `line`.
///
/// The daemon prefixes every unsolicited message with its log level in
/// angle brackets; replies never start that way.
pub(crate) fn event_marker_len(line: &str) -> Option<usize> {
    let rest = line.strip_prefix('<')?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || rest.as_bytes().get(digits) != Some(&b'>') {
        return None;
    }
    Some(digits + 2)
}

/// Returns `true` if `line` is an unsolicited event rather than a reply.
pub(crate) fn is_event(line: &str) -> bool {
    event_marker_len(line).is_some()
}

/// Parses an event line into a `ControlEvent`.
///
/// The first whitespace-delimited token after the marker is the tag
/// (upper-cased). Remaining tokens of the form `key=value` become
/// arguments; tokens without exactly one `=` are ignored.
pub(crate) fn parse_event(line: &str) -> Option<ControlEvent> {
    let raw = line.trim();
    let body = &raw[event_marker_len(raw)?..];

    let mut tokens = body.split([' ', '\t']).filter(|t| !t.is_empty());
    let tag = tokens.next()?.to_ascii_uppercase();

    let args: HashMap<String, String> = tokens
        .filter_map(|token| {
            let mut parts = token.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => Some((key.to_string(), value.to_string())),
                _ => None,
            }
        })
        .collect();

    let kind = EventKind::from_tag(&tag);
    Some(ControlEvent {
        tag,
        kind,
        args,
        raw: raw.to_string(),
    })
}

/// Splits a chunk of monitor output into meaningful lines.
///
/// Lines are trimmed; empty lines and the bare prompt are discarded.
pub(crate) fn monitor_lines(chunk: &str) -> impl Iterator<Item = &str> {
    chunk
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != PROMPT)
}

/// Parses a `STATUS` reply.
///
/// Lines of three characters or fewer are noise. Each remaining line is
/// split at its first `=`.
pub(crate) fn parse_status(reply: &str) -> WpaStatus {
    let fields = reply
        .lines()
        .filter(|line| line.len() > limits::MIN_STATUS_LINE)
        .filter_map(|line| match line.split_once('=') {
            Some((key, value)) => Some((key.trim().to_string(), value.trim().to_string())),
            None => {
                debug!("Ignoring status line without '=': {line}");
                None
            }
        })
        .collect();

    WpaStatus { fields }
}

/// Parses a `SCAN_RESULTS` table.
///
/// The first line is a header and is discarded. Each row is
/// `bssid \t frequency \t signal \t flags \t ssid`. Rows with fewer than
/// four fields, or whose numeric fields do not parse, are dropped. A row
/// without the SSID field is a hidden network.
pub(crate) fn parse_scan_results(reply: &str) -> Vec<Hotspot> {
    reply
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let record: Vec<&str> = line.split('\t').collect();
            if record.len() < 4 {
                warn!("Dropping short scan result row: {line:?}");
                return None;
            }

            let frequency = record[1].trim().parse().ok();
            let signal = record[2].trim().parse().ok();
            match (frequency, signal) {
                (Some(frequency), Some(signal)) => Some(Hotspot {
                    bssid: record[0].trim().to_string(),
                    frequency,
                    signal,
                    flags: record[3].trim().to_string(),
                    ssid: record.get(4).map(|s| s.trim()).unwrap_or_default().to_string(),
                }),
                _ => {
                    warn!("Dropping malformed scan result row: {line:?}");
                    None
                }
            }
        })
        .collect()
}

/// Parses a `LIST_NETWORKS` table.
///
/// The first line is a header and is discarded. Each row is
/// `id \t ssid \t bssid \t flags`; the flag column may be missing. Rows
/// with fewer than three fields or a non-numeric id are dropped.
pub(crate) fn parse_network_list(reply: &str) -> Vec<NetworkProfile> {
    reply
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let record: Vec<&str> = line.split('\t').map(str::trim).collect();
            if record.len() < 3 {
                warn!("Dropping short network row: {line:?}");
                return None;
            }

            let Ok(id) = record[0].parse() else {
                warn!("Dropping network row with bad id: {line:?}");
                return None;
            };

            Some(NetworkProfile {
                id,
                ssid: record[1].to_string(),
                bssid: record[2].to_string(),
                flags: record.get(3).copied().unwrap_or_default().to_string(),
            })
        })
        .collect()
}
