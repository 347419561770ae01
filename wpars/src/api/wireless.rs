use std::time::Duration;
use tokio::sync::broadcast;

use crate::Result;
use crate::api::models::{
    ApOptions, ConnectOptions, ControlConfig, ControlEvent, EventKind, Hotspot, Mode,
    NetworkProfile, NetworkRef, Reply, WpaError, WpaEvent, WpaStatus,
};
use crate::core::access_point::AccessPoint;
use crate::core::control::{ControlChannel, expect_ok};
use crate::core::scan;
use crate::core::transaction::{self, ProfileStore};
use crate::types::constants::{command, reply};
use crate::util::utils::quote;

/// High-level interface to a wireless interface managed by wpa_supplicant.
///
/// This is the main entry point of the crate. It drives the supplicant
/// through its control socket and exposes the socket's unsolicited events
/// as a broadcast stream.
///
/// # Creating an Instance
///
/// ```no_run
/// use wpars::Wireless;
///
/// # async fn example() -> wpars::Result<()> {
/// let wifi = Wireless::new("wlan0");
/// wifi.open().await?;
/// # Ok(())
/// # }
/// ```
///
/// # Capabilities
///
/// - **Status**: Current association state, SSID, address and mode
/// - **Scanning**: Trigger a scan and wait for its results
/// - **Profiles**: Add, configure, enable, select and remove stored networks
/// - **Events**: Subscribe to scan, connection and error notifications
/// - **Access Point**: Launch and supervise an access point helper
///
/// # Examples
///
/// ## Scan and Connect
///
/// ```no_run
/// use wpars::{ConnectOptions, Wireless};
///
/// # async fn example() -> wpars::Result<()> {
/// let wifi = Wireless::new("wlan0");
/// wifi.open().await?;
///
/// for hotspot in wifi.scan().await? {
///     println!("{} {} {}", hotspot.ssid, hotspot.signal, hotspot.bars());
/// }
///
/// let id = wifi
///     .connect("MyNetwork", Some("password"), ConnectOptions::default())
///     .await?;
/// println!("Using profile {id}");
/// # Ok(())
/// # }
/// ```
///
/// ## Removing a Profile
///
/// ```no_run
/// use wpars::{Reply, Wireless};
///
/// # async fn example() -> wpars::Result<()> {
/// let wifi = Wireless::new("wlan0");
/// wifi.open().await?;
///
/// if wifi.remove_network("OldNetwork").await? == Reply::Fail {
///     println!("No such profile");
/// }
/// # Ok(())
/// # }
/// ```
///
/// # Thread Safety
///
/// `Wireless` is `Clone` and can be shared across async tasks. Clones share
/// one control channel; their commands are queued and answered in order.
#[derive(Debug, Clone)]
pub struct Wireless {
    channel: ControlChannel,
}

impl Wireless {
    /// Creates a client for `iface` with the default socket locations.
    pub fn new(iface: impl Into<String>) -> Self {
        Self::with_config(ControlConfig::new(iface))
    }

    /// Creates a client with a custom configuration.
    pub fn with_config(config: ControlConfig) -> Self {
        Self {
            channel: ControlChannel::new(config),
        }
    }

    /// Returns the underlying control channel.
    pub fn channel(&self) -> &ControlChannel {
        &self.channel
    }

    /// Opens the control socket and attaches to the event stream.
    ///
    /// Safe to call repeatedly; concurrent calls share one attempt.
    pub async fn open(&self) -> Result<()> {
        self.channel.open().await
    }

    /// Closes the control socket. Does nothing if already closed.
    pub async fn close(&self) {
        self.channel.close().await
    }

    pub async fn is_open(&self) -> bool {
        self.channel.is_open().await
    }

    /// Subscribes to control channel notifications.
    ///
    /// Use [`WpaEvent::name`] to match on the subscription names
    /// (`scanning`, `scanned`, `connected`, `disconnected`, `invalidkey`,
    /// `terminating`, `control`, `error`, `congestion`, `open`, `close`).
    pub fn events(&self) -> broadcast::Receiver<WpaEvent> {
        self.channel.events()
    }

    /// Waits up to `timeout` for the next event of the given kind.
    pub async fn wait_for(&self, kind: EventKind, timeout: Duration) -> Result<Option<ControlEvent>> {
        self.channel.wait_for(kind, timeout).await
    }

    /// Sends a raw command and returns its reply.
    pub async fn command<S: AsRef<str>>(&self, name: &str, args: &[S]) -> Result<String> {
        self.channel.command(name, args).await
    }

    /// Returns the parsed `STATUS` reply.
    pub async fn status(&self) -> Result<WpaStatus> {
        scan::status(&self.channel).await
    }

    /// Returns `true` if the interface is associated.
    pub async fn connected(&self) -> Result<bool> {
        Ok(self.status().await?.is_connected())
    }

    /// Returns the operating mode, inferred from the status.
    ///
    /// See [`WpaStatus::mode`] for the heuristic.
    pub async fn mode(&self) -> Result<Mode> {
        Ok(self.status().await?.mode())
    }

    /// Scans and returns the visible hotspots.
    ///
    /// Waits for the scan-results event, bounded by the configured scan
    /// timeout, before fetching. On timeout the results the daemon already
    /// holds are returned.
    pub async fn scan(&self) -> Result<Vec<Hotspot>> {
        scan::scan(&self.channel).await
    }

    /// Returns the last scan results without scanning.
    pub async fn scan_results(&self) -> Result<Vec<Hotspot>> {
        scan::scan_results(&self.channel).await
    }

    /// Lists stored network profiles.
    pub async fn list_networks(&self) -> Result<Vec<NetworkProfile>> {
        self.channel.list_networks().await
    }

    /// Returns the first stored profile with the given SSID.
    pub async fn find_network_by_ssid(&self, ssid: &str) -> Result<Option<NetworkProfile>> {
        transaction::find_by_ssid(&self.channel, ssid).await
    }

    /// Allocates a new, disabled profile and returns its id.
    pub async fn add_network(&self) -> Result<u32> {
        self.channel.add_network().await
    }

    /// Sets a profile field to a raw value.
    ///
    /// String fields such as `ssid` and `psk` must be quoted; use
    /// [`set_network_string`](Self::set_network_string) for those.
    pub async fn set_network(&self, id: u32, key: &str, value: &str) -> Result<()> {
        let reply = ProfileStore::set_network(&self.channel, id, key, value).await?;
        expect_ok(command::SET_NETWORK, reply)
    }

    /// Sets a string-valued profile field, quoting the value.
    pub async fn set_network_string(&self, id: u32, key: &str, value: &str) -> Result<()> {
        self.set_network(id, key, &quote(value)).await
    }

    /// Reads one profile field. String values come back quoted.
    pub async fn get_network(&self, id: u32, key: &str) -> Result<String> {
        let id = id.to_string();
        self.channel
            .command(command::GET_NETWORK, &[id.as_str(), key])
            .await
    }

    /// Adds or updates the profile for `ssid`, then enables, selects and
    /// saves it. Returns the profile id.
    ///
    /// A non-empty `password` configures WPA-PSK; otherwise the network is
    /// open. Steps run in order and are not rolled back: if one fails, the
    /// profile is left as far as it got.
    pub async fn connect(
        &self,
        ssid: &str,
        password: Option<&str>,
        options: ConnectOptions,
    ) -> Result<u32> {
        transaction::connect(&self.channel, ssid, password, &options).await
    }

    /// Enables a stored profile. Returns `Reply::Fail` if no profile matches
    /// or the daemon refuses.
    pub async fn enable_network(&self, target: impl Into<NetworkRef>) -> Result<Reply> {
        transaction::profile_command(&self.channel, command::ENABLE_NETWORK, target.into()).await
    }

    /// Disables a stored profile. Returns `Reply::Fail` if no profile
    /// matches or the daemon refuses.
    pub async fn disable_network(&self, target: impl Into<NetworkRef>) -> Result<Reply> {
        transaction::profile_command(&self.channel, command::DISABLE_NETWORK, target.into()).await
    }

    /// Selects a stored profile, disabling the others.
    pub async fn select_network(&self, target: impl Into<NetworkRef>) -> Result<Reply> {
        transaction::profile_command(&self.channel, command::SELECT_NETWORK, target.into()).await
    }

    /// Removes a stored profile. Returns `Reply::Fail` if no profile
    /// matches or the daemon refuses.
    pub async fn remove_network(&self, target: impl Into<NetworkRef>) -> Result<Reply> {
        transaction::profile_command(&self.channel, command::REMOVE_NETWORK, target.into()).await
    }

    /// Disconnects and stays disconnected until `reconnect`.
    pub async fn disconnect(&self) -> Result<()> {
        self.simple(command::DISCONNECT).await
    }

    pub async fn reconnect(&self) -> Result<()> {
        self.simple(command::RECONNECT).await
    }

    pub async fn reassociate(&self) -> Result<()> {
        self.simple(command::REASSOCIATE).await
    }

    /// Reloads the configuration file.
    pub async fn reconfigure(&self) -> Result<()> {
        self.simple(command::RECONFIGURE).await
    }

    /// Persists the stored profiles.
    pub async fn save_config(&self) -> Result<()> {
        self.simple(command::SAVE_CONFIG).await
    }

    /// Checks that the daemon answers.
    pub async fn ping(&self) -> Result<()> {
        let pong = self.channel.command::<&str>(command::PING, &[]).await?;
        if pong == reply::PONG {
            Ok(())
        } else {
            Err(WpaError::UnexpectedReply {
                command: command::PING.to_string(),
                reply: pong,
            })
        }
    }

    /// Launches an access point with the given name.
    ///
    /// An empty `name` falls back to `options.name`, then to `MY_WIFI`.
    /// Its `close` waits at most the `ap_shutdown` timeout of this client's
    /// [`TimeoutConfig`](crate::TimeoutConfig). Must be called from within a
    /// tokio runtime.
    pub fn create_access_point(&self, name: &str, options: ApOptions) -> Result<AccessPoint> {
        let timeout = self.channel.config().timeouts.ap_shutdown;
        Ok(AccessPoint::create(name, options)?.with_shutdown_timeout(timeout))
    }

    async fn simple(&self, cmd: &str) -> Result<()> {
        let reply = self.channel.command::<&str>(cmd, &[]).await?;
        expect_ok(cmd, reply)
    }
}
