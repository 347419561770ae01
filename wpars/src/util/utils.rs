//! Utility functions for control protocol values and Wi-Fi data.
//!
//! Provides helpers for quoting setting values, converting between Wi-Fi
//! data representations (frequency to channel, dBm to quality and bars),
//! and bounding futures with a runtime-agnostic timeout.

use futures::{FutureExt, select};
use futures_timer::Delay;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use crate::types::constants::{frequency, signal_strength};

/// Wraps a string-valued setting in the literal double quotes the
/// configuration store requires.
pub(crate) fn quote(value: &str) -> String {
    format!("\"{value}\"")
}

/// Joins a command verb and its arguments with single spaces.
pub(crate) fn join_command<S: AsRef<str>>(name: &str, args: &[S]) -> String {
    let mut cmd = name.to_string();
    for arg in args {
        cmd.push(' ');
        cmd.push_str(arg.as_ref());
    }
    cmd
}

/// Converts a Wi-Fi frequency in MHz to a channel number.
///
/// Supports 2.4GHz (channels 1-14), 5GHz, and 6GHz bands.
/// Returns `None` for frequencies outside known Wi-Fi bands.
pub(crate) fn channel_from_freq(mhz: u32) -> Option<u16> {
    match mhz {
        frequency::BAND_2_4_START..=frequency::BAND_2_4_END => {
            Some(((mhz - frequency::BAND_2_4_START) / frequency::CHANNEL_SPACING + 1) as u16)
        }
        frequency::BAND_2_4_CH14 => Some(14),
        frequency::BAND_5_START..=frequency::BAND_5_END => {
            Some(((mhz - 5000) / frequency::CHANNEL_SPACING) as u16)
        }
        frequency::BAND_6_START..=frequency::BAND_6_END => {
            Some(((mhz - frequency::BAND_6_START) / frequency::CHANNEL_SPACING + 1) as u16)
        }
        _ => None,
    }
}

/// Converts a signal level in dBm to a quality percentage.
///
/// Linear between -100 dBm (0%) and -50 dBm (100%).
pub(crate) fn quality_from_dbm(dbm: i32) -> u8 {
    dbm.saturating_add(100).saturating_mul(2).clamp(0, 100) as u8
}

/// Converts signal strength (0-100) to a visual bar representation.
///
/// Returns a 4-character string using Unicode block characters:
/// - 0-24%:   `▂___` (1 bar)
/// - 25-49%:  `▂▄__` (2 bars)
/// - 50-74%:  `▂▄▆_` (3 bars)
/// - 75-100%: `▂▄▆█` (4 bars)
pub(crate) fn bars_from_strength(s: u8) -> &'static str {
    match s {
        0..=signal_strength::BAR_1_MAX => "▂___",
        signal_strength::BAR_2_MIN..=signal_strength::BAR_2_MAX => "▂▄__",
        signal_strength::BAR_3_MIN..=signal_strength::BAR_3_MAX => "▂▄▆_",
        _ => "▂▄▆█",
    }
}

/// Runs `fut` to completion or until `duration` elapses.
///
/// Returns `None` on timeout. The timer does not depend on a particular
/// async runtime.
pub(crate) async fn with_timeout<F: Future>(duration: Duration, fut: F) -> Option<F::Output> {
    let mut delay = pin!(Delay::new(duration).fuse());
    let mut fut = pin!(fut.fuse());

    select! {
        out = fut => Some(out),
        _ = delay => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote("home"), "\"home\"");
        assert_eq!(quote(""), "\"\"");
        assert_eq!(quote("two words"), "\"two words\"");
    }

    #[test]
    fn test_join_command() {
        assert_eq!(join_command::<&str>("STATUS", &[]), "STATUS");
        assert_eq!(
            join_command("SET_NETWORK", &["0", "ssid", "\"home\""]),
            "SET_NETWORK 0 ssid \"home\""
        );
    }

    #[test]
    fn test_channel_from_freq_2_4ghz() {
        assert_eq!(channel_from_freq(2412), Some(1));
        assert_eq!(channel_from_freq(2437), Some(6));
        assert_eq!(channel_from_freq(2472), Some(13));
        assert_eq!(channel_from_freq(2484), Some(14));
    }

    #[test]
    fn test_channel_from_freq_5ghz() {
        assert_eq!(channel_from_freq(5180), Some(36));
        assert_eq!(channel_from_freq(5500), Some(100));
    }

    #[test]
    fn test_channel_from_freq_invalid() {
        assert_eq!(channel_from_freq(1000), None);
        assert_eq!(channel_from_freq(9999), None);
    }

    #[test]
    fn test_quality_from_dbm() {
        assert_eq!(quality_from_dbm(-30), 100);
        assert_eq!(quality_from_dbm(-50), 100);
        assert_eq!(quality_from_dbm(-75), 50);
        assert_eq!(quality_from_dbm(-100), 0);
        assert_eq!(quality_from_dbm(-120), 0);
        assert_eq!(quality_from_dbm(i32::MAX), 100);
        assert_eq!(quality_from_dbm(i32::MIN), 0);
    }

    #[test]
    fn test_bars_from_strength() {
        assert_eq!(bars_from_strength(0), "▂___");
        assert_eq!(bars_from_strength(25), "▂▄__");
        assert_eq!(bars_from_strength(50), "▂▄▆_");
        assert_eq!(bars_from_strength(100), "▂▄▆█");
    }

    #[tokio::test]
    async fn test_with_timeout() {
        assert_eq!(with_timeout(Duration::from_secs(1), async { 7 }).await, Some(7));
        let never = futures::future::pending::<()>();
        assert_eq!(with_timeout(Duration::from_millis(10), never).await, None);
    }
}
