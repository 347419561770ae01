//! Constants for the wpa_supplicant control protocol.
//!
//! Command verbs, event tags and reply sentinels used on the control socket,
//! plus the default filesystem locations and timeouts.

/// Control protocol command verbs.
pub mod command {
    pub const ATTACH: &str = "ATTACH";
    pub const DETACH: &str = "DETACH";
    pub const PING: &str = "PING";
    pub const STATUS: &str = "STATUS";
    pub const SCAN: &str = "SCAN";
    pub const SCAN_RESULTS: &str = "SCAN_RESULTS";
    pub const ADD_NETWORK: &str = "ADD_NETWORK";
    pub const LIST_NETWORKS: &str = "LIST_NETWORKS";
    pub const SET_NETWORK: &str = "SET_NETWORK";
    pub const GET_NETWORK: &str = "GET_NETWORK";
    pub const ENABLE_NETWORK: &str = "ENABLE_NETWORK";
    pub const DISABLE_NETWORK: &str = "DISABLE_NETWORK";
    pub const SELECT_NETWORK: &str = "SELECT_NETWORK";
    pub const REMOVE_NETWORK: &str = "REMOVE_NETWORK";
    pub const SAVE_CONFIG: &str = "SAVE_CONFIG";
    pub const DISCONNECT: &str = "DISCONNECT";
    pub const RECONNECT: &str = "RECONNECT";
    pub const REASSOCIATE: &str = "REASSOCIATE";
    pub const RECONFIGURE: &str = "RECONFIGURE";
}

/// Literal replies the daemon sends inline.
pub mod reply {
    pub const OK: &str = "OK";
    pub const FAIL: &str = "FAIL";
    pub const PONG: &str = "PONG";
}

/// Unsolicited control event tags.
pub mod event_tag {
    pub const SCAN_STARTED: &str = "CTRL-EVENT-SCAN-STARTED";
    pub const SCAN_RESULTS: &str = "CTRL-EVENT-SCAN-RESULTS";
    pub const CONNECTED: &str = "CTRL-EVENT-CONNECTED";
    pub const DISCONNECTED: &str = "CTRL-EVENT-DISCONNECTED";
    pub const SSID_TEMP_DISABLED: &str = "CTRL-EVENT-SSID-TEMP-DISABLED";
    pub const TERMINATING: &str = "CTRL-EVENT-TERMINATING";
}

/// Markers in the access point helper's output.
pub mod ap_marker {
    /// Printed once the access point is up.
    pub const ENABLED: &str = "AP-ENABLED";

    /// Printed when shutdown cleanup has finished.
    pub const DONE: &str = "done";
}

/// Network profile setting keys.
pub mod setting {
    pub const SSID: &str = "ssid";
    pub const PSK: &str = "psk";
    pub const KEY_MGMT: &str = "key_mgmt";
    pub const WEP_TX_KEYIDX: &str = "wep_tx_keyidx";
    pub const WEP_KEY0: &str = "wep_key0";
    pub const SCAN_SSID: &str = "scan_ssid";

    pub const KEY_MGMT_WPA_PSK: &str = "WPA-PSK";
    pub const KEY_MGMT_NONE: &str = "NONE";
}

/// Default locations and names.
pub mod defaults {
    /// Interface used when none is given.
    pub const IFACE: &str = "wlan0";

    /// Directory holding the daemon's per-interface control sockets.
    pub const CTRL_DIR: &str = "/var/run/wpa_supplicant";

    /// Prefix of the client-side socket file bound for replies.
    pub const LOCAL_SOCKET_PREFIX: &str = "wpa_ctrl_";

    /// Interactive client used by the event monitor.
    pub const WPA_CLI: &str = "wpa_cli";

    /// Access point helper script.
    pub const CREATE_AP: &str = "create_ap";

    /// Access point name used when none is given.
    pub const AP_NAME: &str = "MY_WIFI";

    /// Gateway address handed to the access point helper.
    pub const AP_GATEWAY: &str = "10.1.1.1";
}

/// Wire-level limits.
pub mod limits {
    /// Largest datagram accepted from the control socket.
    pub const MAX_DATAGRAM: usize = 8192;

    /// Status lines this short or shorter carry no `key=value` pair.
    pub const MIN_STATUS_LINE: usize = 3;

    /// Send attempts made while the socket reports congestion.
    pub const CONGESTION_RETRIES: usize = 3;

    /// Capacity of the event broadcast channels.
    pub const EVENT_CHANNEL_SIZE: usize = 64;
}

/// Timeout constants.
///
/// These bound every wait on the daemon or the access point helper so
/// that no caller is left suspended indefinitely.
pub mod timeouts {
    use std::time::Duration;

    /// Maximum time to wait for the reply to a single command (10 seconds).
    const REPLY_TIMEOUT_SECS: u64 = 10;

    /// Maximum time to wait for `CTRL-EVENT-SCAN-RESULTS` after `SCAN` (5 seconds).
    const SCAN_TIMEOUT_SECS: u64 = 5;

    /// Maximum time to wait for the access point helper to report `done` (5 seconds).
    const AP_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

    /// Pause between send attempts while the socket is congested.
    const CONGESTION_BACKOFF_MS: u64 = 50;

    /// Returns the command reply timeout.
    pub fn reply_timeout() -> Duration {
        Duration::from_secs(REPLY_TIMEOUT_SECS)
    }

    /// Returns the scan completion timeout.
    pub fn scan_timeout() -> Duration {
        Duration::from_secs(SCAN_TIMEOUT_SECS)
    }

    /// Returns the access point graceful shutdown timeout.
    pub fn ap_shutdown_timeout() -> Duration {
        Duration::from_secs(AP_SHUTDOWN_TIMEOUT_SECS)
    }

    /// Returns the congestion back-off delay.
    pub fn congestion_backoff() -> Duration {
        Duration::from_millis(CONGESTION_BACKOFF_MS)
    }
}

/// Signal strength thresholds for bar display
pub mod signal_strength {
    pub const BAR_1_MAX: u8 = 24;
    pub const BAR_2_MIN: u8 = BAR_1_MAX + 1;
    pub const BAR_2_MAX: u8 = 49;
    pub const BAR_3_MIN: u8 = BAR_2_MAX + 1;
    pub const BAR_3_MAX: u8 = 74;
}

/// WiFi frequency constants (MHz)
pub mod frequency {
    pub const BAND_2_4_START: u32 = 2412;
    pub const BAND_2_4_END: u32 = 2472;
    pub const BAND_2_4_CH14: u32 = 2484;
    pub const BAND_5_START: u32 = 5150;
    pub const BAND_5_END: u32 = 5925;
    pub const BAND_6_START: u32 = 5955;
    pub const BAND_6_END: u32 = 7115;
    pub const CHANNEL_SPACING: u32 = 5;
}
