use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::constants::{defaults, event_tag, reply, timeouts};
use crate::util::utils::{bars_from_strength, channel_from_freq, quality_from_dbm};

/// A visible access point, as reported by `SCAN_RESULTS`.
///
/// Hotspots are produced fresh by every scan and carry no identity beyond
/// their BSSID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotspot {
    /// Hardware address of the access point.
    pub bssid: String,
    /// Operating frequency in MHz.
    pub frequency: u32,
    /// Signal level in dBm.
    pub signal: i32,
    /// Capability flags, e.g. `[WPA2-PSK-CCMP][ESS]`.
    pub flags: String,
    /// Network name. Empty for hidden networks.
    pub ssid: String,
}

impl Hotspot {
    /// Returns the Wi-Fi channel number derived from the frequency.
    pub fn channel(&self) -> Option<u16> {
        channel_from_freq(self.frequency)
    }

    /// Returns the signal quality as a percentage (0-100).
    pub fn quality(&self) -> u8 {
        quality_from_dbm(self.signal)
    }

    /// Returns a four-character bar rendering of the signal quality.
    pub fn bars(&self) -> &'static str {
        bars_from_strength(self.quality())
    }

    /// Returns `true` if the capability flags advertise any encryption.
    pub fn secured(&self) -> bool {
        self.flags.contains("WPA") || self.flags.contains("WEP") || self.flags.contains("RSN")
    }
}

bitflags! {
    /// State flags of a stored network profile.
    ///
    /// Decoded from the bracketed flag column of `LIST_NETWORKS`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProfileFlags: u8 {
        /// The profile is the one currently in use.
        const CURRENT = 1 << 0;
        /// The profile is disabled.
        const DISABLED = 1 << 1;
        /// The profile is temporarily disabled after repeated failures.
        const TEMP_DISABLED = 1 << 2;
        /// The profile is a persistent P2P group.
        const P2P_PERSISTENT = 1 << 3;
    }
}

impl ProfileFlags {
    /// Parses a flag column such as `[CURRENT][DISABLED]`.
    ///
    /// Unknown flags are ignored.
    pub fn parse(raw: &str) -> Self {
        raw.split(['[', ']'])
            .filter(|token| !token.is_empty())
            .fold(Self::empty(), |flags, token| {
                flags
                    | match token {
                        "CURRENT" => Self::CURRENT,
                        "DISABLED" => Self::DISABLED,
                        "TEMP-DISABLED" => Self::TEMP_DISABLED,
                        "P2P-PERSISTENT" => Self::P2P_PERSISTENT,
                        _ => Self::empty(),
                    }
            })
    }
}

/// An entry in the daemon's network configuration store.
///
/// The `id` is assigned by the daemon and stays stable until the profile is
/// removed. SSIDs are not unique: several profiles may share one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// Numeric profile id.
    pub id: u32,
    /// Network name.
    pub ssid: String,
    /// BSSID column, `any` unless the profile is pinned to one access point.
    pub bssid: String,
    /// Raw flag column, e.g. `[CURRENT]`.
    pub flags: String,
}

impl NetworkProfile {
    /// Returns the decoded profile flags.
    pub fn profile_flags(&self) -> ProfileFlags {
        ProfileFlags::parse(&self.flags)
    }

    /// Returns `true` if this profile is currently selected.
    pub fn is_current(&self) -> bool {
        self.profile_flags().contains(ProfileFlags::CURRENT)
    }

    /// Returns `true` if this profile is disabled.
    pub fn is_disabled(&self) -> bool {
        self.profile_flags().contains(ProfileFlags::DISABLED)
    }
}

/// Operating mode of the wireless interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Client of an access point (or idle).
    Station,
    /// Operating as an access point.
    Ap,
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Station => write!(f, "station"),
            Self::Ap => write!(f, "ap"),
        }
    }
}

/// Parsed reply of the `STATUS` command.
///
/// Holds every `key=value` pair the daemon reported. Typed accessors cover
/// the commonly used keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WpaStatus {
    /// All reported fields.
    pub fields: BTreeMap<String, String>,
}

impl WpaStatus {
    /// Returns the raw value of a field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Returns the supplicant state, e.g. `COMPLETED`.
    pub fn wpa_state(&self) -> Option<&str> {
        self.get("wpa_state")
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.get("ip_address").filter(|ip| !ip.is_empty())
    }

    pub fn ssid(&self) -> Option<&str> {
        self.get("ssid")
    }

    pub fn bssid(&self) -> Option<&str> {
        self.get("bssid")
    }

    pub fn key_mgmt(&self) -> Option<&str> {
        self.get("key_mgmt")
    }

    /// Returns the id of the active network profile.
    pub fn id(&self) -> Option<u32> {
        self.get("id").and_then(|id| id.parse().ok())
    }

    /// Returns the operating frequency in MHz.
    pub fn frequency(&self) -> Option<u32> {
        self.get("freq").and_then(|freq| freq.parse().ok())
    }

    /// Returns `true` if the state is `connected` or `completed` (any case).
    pub fn is_connected(&self) -> bool {
        self.wpa_state()
            .map(|state| {
                state.eq_ignore_ascii_case("connected") || state.eq_ignore_ascii_case("completed")
            })
            .unwrap_or(false)
    }

    /// Infers the operating mode.
    ///
    /// This is a heuristic, not a query: a `disconnected` supplicant that
    /// still holds an IP address is taken to be serving as an access point.
    /// Everything else is reported as station mode.
    pub fn mode(&self) -> Mode {
        let disconnected = self
            .wpa_state()
            .map(|state| state.eq_ignore_ascii_case("disconnected"))
            .unwrap_or(false);

        if disconnected && self.ip_address().is_some() {
            Mode::Ap
        } else {
            Mode::Station
        }
    }
}

/// Named control events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A scan has started.
    ScanStarted,
    /// Scan results are ready to be fetched.
    ScanResults,
    /// The interface associated and authenticated.
    Connected,
    /// The interface lost its association.
    Disconnected,
    /// A network was temporarily disabled, usually after a wrong key.
    InvalidKey,
    /// The daemon is shutting down.
    Terminating,
}

/// Tag to event lookup table.
const EVENT_TABLE: [(&str, EventKind); 6] = [
    (event_tag::SCAN_STARTED, EventKind::ScanStarted),
    (event_tag::SCAN_RESULTS, EventKind::ScanResults),
    (event_tag::CONNECTED, EventKind::Connected),
    (event_tag::DISCONNECTED, EventKind::Disconnected),
    (event_tag::SSID_TEMP_DISABLED, EventKind::InvalidKey),
    (event_tag::TERMINATING, EventKind::Terminating),
];

impl EventKind {
    /// Looks up the event for an upper-case control tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        EVENT_TABLE
            .iter()
            .find(|(known, _)| *known == tag)
            .map(|(_, kind)| *kind)
    }

    /// Returns the control tag this event is raised for.
    pub fn tag(self) -> &'static str {
        EVENT_TABLE
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(tag, _)| *tag)
            .unwrap_or_default()
    }

    /// Returns the subscription name of this event.
    pub fn name(self) -> &'static str {
        match self {
            Self::ScanStarted => "scanning",
            Self::ScanResults => "scanned",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::InvalidKey => "invalidkey",
            Self::Terminating => "terminating",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An unsolicited notification from the daemon.
///
/// Lives only for the dispatch cycle that produced it; subscribers receive
/// their own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEvent {
    /// Upper-cased tag, e.g. `CTRL-EVENT-CONNECTED`.
    pub tag: String,
    /// Named event, if the tag is one of the known ones.
    pub kind: Option<EventKind>,
    /// `key=value` arguments that followed the tag.
    pub args: HashMap<String, String>,
    /// The line as received, marker included.
    pub raw: String,
}

impl ControlEvent {
    /// Returns an argument value.
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }

    /// Returns `true` if this is the given named event.
    pub fn is(&self, kind: EventKind) -> bool {
        self.kind == Some(kind)
    }

    /// Returns the subscription name, `control` for unknown tags.
    pub fn name(&self) -> &'static str {
        self.kind.map(EventKind::name).unwrap_or("control")
    }
}

/// Notifications raised by the control channel.
#[derive(Debug, Clone)]
pub enum WpaEvent {
    /// The channel is open and attached.
    Open,
    /// An unsolicited control event.
    Control(ControlEvent),
    /// A transport-level error. Any in-flight command has been failed.
    Error(String),
    /// The socket refused a write; the write is being retried.
    Congestion,
    /// The channel was closed.
    Closed,
}

impl WpaEvent {
    /// Returns the subscription name of this notification.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Control(event) => event.name(),
            Self::Error(_) => "error",
            Self::Congestion => "congestion",
            Self::Closed => "close",
        }
    }

    /// Returns the control event, if this is one.
    pub fn as_control(&self) -> Option<&ControlEvent> {
        match self {
            Self::Control(event) => Some(event),
            _ => None,
        }
    }
}

/// Notifications raised by the event monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A trimmed, non-prompt output line.
    Data(String),
    /// A parsed control event.
    Control(ControlEvent),
    /// Error output of the watch process, or a failure to read it.
    Error(String),
    /// The watch process exited. Always the last notification.
    Closed(Option<i32>),
}

impl MonitorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Data(_) => "data",
            Self::Control(event) => event.name(),
            Self::Error(_) => "error",
            Self::Closed(_) => "close",
        }
    }
}

/// Lifecycle state of a supervised access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApState {
    /// Spawned, not yet reported ready.
    Created,
    /// The helper reported the access point enabled.
    Started,
    /// A shutdown signal was sent; waiting for confirmation.
    Closing,
    /// Shut down (confirmed or forced).
    Closed,
}

impl Display for ApState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Notifications raised by the access point supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApEvent {
    /// A chunk of helper stdout, verbatim.
    Stdout(String),
    /// A chunk of helper stderr, verbatim.
    Stderr(String),
    /// The access point is up.
    Started,
    /// The access point shut down.
    Close,
    /// Reading the helper's output failed.
    Error(String),
}

impl ApEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stdout(_) => "stdout",
            Self::Stderr(_) => "stderr",
            Self::Started => "started",
            Self::Close => "close",
            Self::Error(_) => "error",
        }
    }
}

/// Identifies a stored network profile by id or by SSID.
///
/// SSID references resolve to the first matching profile in
/// `LIST_NETWORKS` order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkRef {
    Id(u32),
    Ssid(String),
}

impl From<u32> for NetworkRef {
    fn from(id: u32) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for NetworkRef {
    fn from(ssid: &str) -> Self {
        Self::Ssid(ssid.to_string())
    }
}

impl From<String> for NetworkRef {
    fn from(ssid: String) -> Self {
        Self::Ssid(ssid)
    }
}

impl From<&String> for NetworkRef {
    fn from(ssid: &String) -> Self {
        Self::Ssid(ssid.clone())
    }
}

impl Display for NetworkRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::Ssid(ssid) => write!(f, "'{ssid}'"),
        }
    }
}

/// Inline reply of a profile-management command.
///
/// `Fail` mirrors the daemon's own `FAIL` sentinel and is returned both when
/// the daemon rejects the command and when an SSID reference matches no
/// stored profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok(String),
    Fail,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail)
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok(text) => write!(f, "{text}"),
            Self::Fail => write!(f, "{}", reply::FAIL),
        }
    }
}

/// Authentication requested by the caller of `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthKind {
    /// WPA/WPA2 personal.
    Wpa,
    /// Legacy WEP.
    ///
    /// Only takes effect without a password: a non-empty password always
    /// configures WPA-PSK. With no password the profile is written with an
    /// empty `wep_key0`, which wpa_supplicant rejects, so `connect` then
    /// fails with `WpaError::CommandFailed` at that setting.
    Wep,
}

/// Options for `connect`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Requested authentication. `None` lets the password decide.
    pub auth: Option<AuthKind>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the requested authentication.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthKind) -> Self {
        self.auth = Some(auth);
        self
    }
}

/// Options for creating an access point.
///
/// Internet sharing is disabled unless `iface_sharing` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApOptions {
    /// Access point name, used when `create` is given an empty name.
    pub name: Option<String>,
    /// Wireless interface to run the access point on.
    pub iface: String,
    /// Gateway address of the access point network.
    pub gateway: String,
    /// Interface whose internet connection is shared.
    pub iface_sharing: Option<String>,
    /// WPA passphrase. Open network when `None`.
    pub password: Option<String>,
    /// Path of the access point helper.
    pub helper: PathBuf,
}

impl Default for ApOptions {
    /// Returns the default access point options.
    ///
    /// Defaults:
    /// - `iface`: `wlan0`
    /// - `gateway`: `10.1.1.1`
    /// - `helper`: `create_ap`
    fn default() -> Self {
        Self {
            name: None,
            iface: defaults::IFACE.to_string(),
            gateway: defaults::AP_GATEWAY.to_string(),
            iface_sharing: None,
            password: None,
            helper: PathBuf::from(defaults::CREATE_AP),
        }
    }
}

impl ApOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_iface(mut self, iface: impl Into<String>) -> Self {
        self.iface = iface.into();
        self
    }

    #[must_use]
    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = gateway.into();
        self
    }

    /// Shares the internet connection of `iface` through the access point.
    #[must_use]
    pub fn with_sharing(mut self, iface: impl Into<String>) -> Self {
        self.iface_sharing = Some(iface.into());
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_helper(mut self, helper: impl Into<PathBuf>) -> Self {
        self.helper = helper.into();
        self
    }
}

/// Timeout configuration for control channel and access point operations.
///
/// # Example
///
/// ```rust
/// use wpars::TimeoutConfig;
/// use std::time::Duration;
///
/// let config = TimeoutConfig::new()
///     .with_scan_timeout(Duration::from_secs(10))
///     .with_reply_timeout(Duration::from_secs(3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Time to wait for the reply to one command.
    pub reply: Duration,
    /// Time to wait for scan results after `SCAN` was acknowledged.
    pub scan: Duration,
    /// Time to wait for the access point helper to confirm shutdown.
    pub ap_shutdown: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            reply: timeouts::reply_timeout(),
            scan: timeouts::scan_timeout(),
            ap_shutdown: timeouts::ap_shutdown_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply = timeout;
        self
    }

    #[must_use]
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan = timeout;
        self
    }

    #[must_use]
    pub fn with_ap_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.ap_shutdown = timeout;
        self
    }
}

/// Configuration of a control channel.
///
/// The client binds its own socket at `local_dir/wpa_ctrl_<client_id>` to
/// receive replies. When no `client_id` is given a fresh UUID is used, so
/// several channels in one process never collide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Wireless interface name.
    pub iface: String,
    /// Directory holding the daemon's control sockets.
    pub ctrl_dir: PathBuf,
    /// Directory for the client-side socket.
    pub local_dir: PathBuf,
    /// Unique suffix of the client-side socket.
    pub client_id: Option<String>,
    /// Operation timeouts.
    pub timeouts: TimeoutConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self::new(defaults::IFACE)
    }
}

impl ControlConfig {
    pub fn new(iface: impl Into<String>) -> Self {
        Self {
            iface: iface.into(),
            ctrl_dir: PathBuf::from(defaults::CTRL_DIR),
            local_dir: std::env::temp_dir(),
            client_id: None,
            timeouts: TimeoutConfig::default(),
        }
    }

    #[must_use]
    pub fn with_ctrl_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ctrl_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Returns the path of the daemon's control socket for this interface.
    pub fn ctrl_path(&self) -> PathBuf {
        self.ctrl_dir.join(&self.iface)
    }

    /// Returns the path of the client-side socket for the given id.
    pub fn local_path(&self, client_id: &str) -> PathBuf {
        self.local_dir
            .join(format!("{}{client_id}", defaults::LOCAL_SOCKET_PREFIX))
    }
}

/// Errors that can occur while talking to the supplicant or supervising an
/// access point.
#[derive(Debug, Error)]
pub enum WpaError {
    /// An I/O error on a socket, pipe or file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The control transport failed while a command was in flight.
    #[error("control transport error: {0}")]
    Transport(String),

    /// A command was issued before `open()`.
    #[error("control channel is not open")]
    NotOpen,

    /// The channel closed while the caller was waiting on it.
    #[error("control channel closed")]
    ChannelClosed,

    /// The daemon answered `FAIL`.
    #[error("command failed: {command}")]
    CommandFailed { command: String },

    /// The daemon answered something the operation cannot interpret.
    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: String },

    /// No reply arrived within the configured timeout.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// The socket kept refusing writes.
    #[error("control socket congested")]
    Congested,

    /// The access point helper does not exist.
    #[error("access point helper not found at {0}")]
    HelperNotFound(PathBuf),

    /// An external process could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Signalling a supervised process failed.
    #[error("failed to signal process: {0}")]
    Signal(#[from] nix::errno::Errno),

    /// A caller-supplied value cannot be sent to the daemon.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
