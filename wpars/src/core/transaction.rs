//! Network configuration transaction and profile management.
//!
//! `connect` adds or updates a stored profile and activates it:
//! 1. Look up a stored profile by SSID (first match), or allocate a new id
//! 2. Build the settings for the requested authentication
//! 3. Apply each setting with `SET_NETWORK`, quoting string values
//! 4. Enable and select the profile, then persist the store
//!
//! Steps run in order and the first failure aborts the rest. There is no
//! rollback: a failure part-way leaves the profile partially configured.

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::Result;
use crate::api::models::{AuthKind, ConnectOptions, NetworkProfile, NetworkRef, Reply, WpaError};
use crate::core::control::ControlChannel;
use crate::core::parse::parse_network_list;
use crate::types::constants::{command, setting};
use crate::util::utils::quote;

/// The supplicant's network configuration store, as seen by the
/// transaction.
#[async_trait]
pub(crate) trait ProfileStore: Send + Sync {
    async fn list_networks(&self) -> Result<Vec<NetworkProfile>>;

    /// Allocates a new, empty profile and returns its id.
    async fn add_network(&self) -> Result<u32>;

    async fn set_network(&self, id: u32, key: &str, value: &str) -> Result<String>;

    /// Runs a single-id command such as `ENABLE_NETWORK <id>`.
    async fn network_command(&self, verb: &str, id: u32) -> Result<String>;

    async fn save_config(&self) -> Result<String>;
}

#[async_trait]
impl ProfileStore for ControlChannel {
    async fn list_networks(&self) -> Result<Vec<NetworkProfile>> {
        let reply = self.command::<&str>(command::LIST_NETWORKS, &[]).await?;
        Ok(parse_network_list(&reply))
    }

    async fn add_network(&self) -> Result<u32> {
        let reply = self.command::<&str>(command::ADD_NETWORK, &[]).await?;
        reply
            .trim()
            .parse()
            .map_err(|_| WpaError::UnexpectedReply {
                command: command::ADD_NETWORK.to_string(),
                reply,
            })
    }

    async fn set_network(&self, id: u32, key: &str, value: &str) -> Result<String> {
        let id = id.to_string();
        self.command(command::SET_NETWORK, &[id.as_str(), key, value])
            .await
    }

    async fn network_command(&self, verb: &str, id: u32) -> Result<String> {
        self.command(verb, &[id.to_string()]).await
    }

    async fn save_config(&self) -> Result<String> {
        self.command::<&str>(command::SAVE_CONFIG, &[]).await
    }
}

/// A profile setting value and how it must be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SettingValue {
    /// String field; wrapped in double quotes on the wire.
    Text(String),
    /// Keyword or number; written as is.
    Raw(String),
}

impl SettingValue {
    pub(crate) fn encode(&self) -> Result<String> {
        match self {
            Self::Text(text) => {
                if text.contains(['"', '\n', '\r']) {
                    return Err(WpaError::InvalidArgument(
                        "quoted values may not contain '\"' or line breaks".into(),
                    ));
                }
                Ok(quote(text))
            }
            Self::Raw(raw) => Ok(raw.clone()),
        }
    }
}

/// Builds the ordered settings for a profile.
///
/// A non-empty password selects WPA-PSK with the password as pre-shared
/// key. Without one the profile uses no key management, and a WEP request
/// adds key index 0 with the (empty) password in key slot 0. `scan_ssid`
/// is always set so hidden networks are found.
pub(crate) fn build_settings(
    ssid: &str,
    password: Option<&str>,
    opts: &ConnectOptions,
) -> Vec<(&'static str, SettingValue)> {
    let password = password.filter(|p| !p.is_empty());
    let mut settings = vec![(setting::SSID, SettingValue::Text(ssid.to_string()))];

    match password {
        Some(psk) => {
            settings.push((setting::PSK, SettingValue::Text(psk.to_string())));
            settings.push((
                setting::KEY_MGMT,
                SettingValue::Raw(setting::KEY_MGMT_WPA_PSK.into()),
            ));
        }
        None => {
            settings.push((
                setting::KEY_MGMT,
                SettingValue::Raw(setting::KEY_MGMT_NONE.into()),
            ));
            if opts.auth == Some(AuthKind::Wep) {
                settings.push((setting::WEP_TX_KEYIDX, SettingValue::Raw("0".into())));
                settings.push((setting::WEP_KEY0, SettingValue::Text(String::new())));
            }
        }
    }

    settings.push((setting::SCAN_SSID, SettingValue::Raw("1".into())));
    settings
}

/// Returns the first stored profile with the given SSID.
pub(crate) async fn find_by_ssid<S>(store: &S, ssid: &str) -> Result<Option<NetworkProfile>>
where
    S: ProfileStore + ?Sized,
{
    let networks = store.list_networks().await?;
    Ok(networks.into_iter().find(|n| n.ssid == ssid))
}

/// Resolves a profile reference to a numeric id.
///
/// Ids pass through unchecked; SSIDs resolve to the first match.
pub(crate) async fn resolve<S>(store: &S, target: &NetworkRef) -> Result<Option<u32>>
where
    S: ProfileStore + ?Sized,
{
    match target {
        NetworkRef::Id(id) => Ok(Some(*id)),
        NetworkRef::Ssid(ssid) => Ok(find_by_ssid(store, ssid).await?.map(|n| n.id)),
    }
}

/// Runs a profile-management command against a resolved reference.
///
/// A lookup miss or a `FAIL` reply yields `Reply::Fail`; only transport
/// and timeout errors are returned as `Err`.
pub(crate) async fn profile_command<S>(store: &S, verb: &str, target: NetworkRef) -> Result<Reply>
where
    S: ProfileStore + ?Sized,
{
    let Some(id) = resolve(store, &target).await? else {
        warn!("{verb}: no stored profile matches {target}");
        return Ok(Reply::Fail);
    };

    match store.network_command(verb, id).await {
        Ok(reply) => Ok(Reply::Ok(reply)),
        Err(WpaError::CommandFailed { command }) => {
            debug!("{command} rejected by the daemon");
            Ok(Reply::Fail)
        }
        Err(e) => Err(e),
    }
}

/// Adds or updates the profile for `ssid`, then enables, selects and saves it.
///
/// Returns the profile id.
pub(crate) async fn connect<S>(
    store: &S,
    ssid: &str,
    password: Option<&str>,
    opts: &ConnectOptions,
) -> Result<u32>
where
    S: ProfileStore + ?Sized,
{
    let settings = build_settings(ssid, password, opts);
    let encoded = settings
        .iter()
        .map(|(key, value)| value.encode().map(|v| (*key, v)))
        .collect::<Result<Vec<_>>>()?;

    let id = match find_by_ssid(store, ssid).await? {
        Some(existing) => {
            debug!("Updating stored profile {} for '{ssid}'", existing.id);
            existing.id
        }
        None => {
            let id = store.add_network().await?;
            debug!("Allocated profile {id} for '{ssid}'");
            id
        }
    };

    for (key, value) in &encoded {
        store.set_network(id, key, value).await?;
    }

    store.network_command(command::ENABLE_NETWORK, id).await?;
    store.network_command(command::SELECT_NETWORK, id).await?;
    store.save_config().await?;

    info!("Profile {id} for '{ssid}' configured and selected");
    Ok(id)
}
