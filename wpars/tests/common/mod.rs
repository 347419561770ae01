//! A scripted stand-in for wpa_supplicant's control socket.
//!
//! Binds a datagram socket named after the interface inside a temporary
//! directory and answers the commands this crate sends, keeping a small
//! in-memory profile store.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::UnixDatagram;
use tokio::task::JoinHandle;
use wpars::{ControlConfig, TimeoutConfig};

pub const IFACE: &str = "wlan0";
pub const BSS_ADDED: &str = "<2>CTRL-EVENT-BSS-ADDED 0 00:11:22:33:44:55";

pub const SCAN_TABLE: &str = "bssid / frequency / signal level / flags / ssid\n\
    00:11:22:33:44:55\t2412\t-45\t[WPA2-PSK-CCMP][ESS]\thome\n\
    66:77:88:99:aa:bb\t5180\t-70\t[ESS]\tcafe guest\n\
    aa:bb:cc:dd:ee:ff\t2437\n";

/// What the daemon does in answer to one command.
pub enum Out {
    Send(String),
    Later(Duration, String),
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub id: u32,
    pub ssid: String,
    pub enabled: bool,
    pub settings: Vec<(String, String)>,
}

/// In-memory daemon state.
#[derive(Debug)]
pub struct Daemon {
    pub profiles: Vec<Profile>,
    pub next_id: u32,
    pub current: Option<u32>,
    pub connected: bool,
    pub ip_address: Option<String>,
    /// Whether `SCAN` is followed by a scan-results event.
    pub scan_completes: bool,
    pub scan_delay: Duration,
    /// Whether every reply is preceded by an unrelated event.
    pub interleave: bool,
    pub received: Vec<String>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self {
            profiles: Vec::new(),
            next_id: 0,
            current: None,
            connected: false,
            ip_address: None,
            scan_completes: true,
            scan_delay: Duration::from_millis(50),
            interleave: false,
            received: Vec::new(),
        }
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

impl Daemon {
    pub fn add_profile(&mut self, ssid: &str) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.profiles.push(Profile {
            id,
            ssid: ssid.to_string(),
            enabled: true,
            settings: Vec::new(),
        });
        id
    }

    fn profile(&mut self, id: &str) -> Option<&mut Profile> {
        let id: u32 = id.parse().ok()?;
        self.profiles.iter_mut().find(|p| p.id == id)
    }

    fn status(&self) -> String {
        if self.connected {
            let profile = self.current.and_then(|id| self.profiles.iter().find(|p| p.id == id));
            let (id, ssid) = profile.map(|p| (p.id, p.ssid.as_str())).unwrap_or((0, ""));
            format!(
                "bssid=00:11:22:33:44:55\nfreq=2412\nssid={ssid}\nid={id}\nmode=station\n\
                 key_mgmt=WPA2-PSK\nwpa_state=COMPLETED\nip_address=192.168.1.20\n"
            )
        } else {
            let mut status = String::from("wpa_state=DISCONNECTED\n");
            if let Some(ip) = &self.ip_address {
                status.push_str(&format!("ip_address={ip}\n"));
            }
            status
        }
    }

    fn list_networks(&self) -> String {
        let mut table = String::from("network id / ssid / bssid / flags\n");
        for p in &self.profiles {
            let flags = if self.connected && self.current == Some(p.id) {
                "[CURRENT]"
            } else if !p.enabled {
                "[DISABLED]"
            } else {
                ""
            };
            table.push_str(&format!("{}\t{}\tany\t{flags}\n", p.id, p.ssid));
        }
        table
    }

    pub fn handle(&mut self, cmd: &str) -> Vec<Out> {
        self.received.push(cmd.to_string());

        let mut out = Vec::new();
        if self.interleave {
            out.push(Out::Send(BSS_ADDED.to_string()));
        }

        let words: Vec<&str> = cmd.splitn(4, ' ').collect();
        let ok = || "OK\n".to_string();
        let fail = || "FAIL\n".to_string();

        let reply = match words.as_slice() {
            ["ATTACH"] | ["DETACH"] | ["SAVE_CONFIG"] | ["RECONFIGURE"] | ["RECONNECT"]
            | ["REASSOCIATE"] => Some(ok()),
            ["PING"] => Some("PONG\n".to_string()),
            ["STATUS"] => Some(self.status()),
            ["SCAN"] => {
                if self.scan_completes {
                    out.push(Out::Later(
                        self.scan_delay,
                        "<3>CTRL-EVENT-SCAN-RESULTS ".to_string(),
                    ));
                }
                Some(ok())
            }
            ["SCAN_RESULTS"] => Some(SCAN_TABLE.to_string()),
            ["LIST_NETWORKS"] => Some(self.list_networks()),
            ["ADD_NETWORK"] => {
                let id = self.next_id;
                self.next_id += 1;
                self.profiles.push(Profile {
                    id,
                    ssid: String::new(),
                    enabled: false,
                    settings: Vec::new(),
                });
                Some(format!("{id}\n"))
            }
            ["SET_NETWORK", id, key, value] => match self.profile(id) {
                Some(profile) => {
                    if *key == "ssid" {
                        profile.ssid = unquote(value).to_string();
                    }
                    profile.settings.push((key.to_string(), value.to_string()));
                    Some(ok())
                }
                None => Some(fail()),
            },
            ["GET_NETWORK", id, key] => {
                let value = self.profile(id).and_then(|p| {
                    p.settings
                        .iter()
                        .rev()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| v.clone())
                });
                Some(value.unwrap_or_else(fail))
            }
            ["ENABLE_NETWORK", id] | ["DISABLE_NETWORK", id] => {
                let enable = words[0] == "ENABLE_NETWORK";
                match self.profile(id) {
                    Some(profile) => {
                        profile.enabled = enable;
                        Some(ok())
                    }
                    None => Some(fail()),
                }
            }
            ["SELECT_NETWORK", id] => match self.profile(id).map(|p| p.id) {
                Some(id) => {
                    self.current = Some(id);
                    self.connected = true;
                    out.push(Out::Later(
                        Duration::from_millis(20),
                        format!(
                            "<3>CTRL-EVENT-CONNECTED - Connection to 00:11:22:33:44:55 completed [id={id} id_str=]"
                        ),
                    ));
                    Some(ok())
                }
                None => Some(fail()),
            },
            ["REMOVE_NETWORK", id] => match id.parse::<u32>() {
                Ok(id) if self.profiles.iter().any(|p| p.id == id) => {
                    self.profiles.retain(|p| p.id != id);
                    Some(ok())
                }
                _ => Some(fail()),
            },
            ["DISCONNECT"] => {
                self.connected = false;
                out.push(Out::Later(
                    Duration::from_millis(20),
                    "<3>CTRL-EVENT-DISCONNECTED bssid=00:11:22:33:44:55 reason=3 locally_generated=1"
                        .to_string(),
                ));
                Some(ok())
            }
            // Never answered; used to hold a command in flight.
            ["STALL"] => None,
            _ => Some("UNKNOWN COMMAND\n".to_string()),
        };

        if let Some(reply) = reply {
            out.insert(usize::from(self.interleave), Out::Send(reply));
        }
        out
    }
}

pub struct FakeSupplicant {
    pub dir: TempDir,
    pub state: Arc<Mutex<Daemon>>,
    socket: Arc<UnixDatagram>,
    client: Arc<Mutex<Option<PathBuf>>>,
    task: JoinHandle<()>,
}

impl FakeSupplicant {
    pub fn start() -> Self {
        Self::start_with(Daemon::default())
    }

    pub fn start_with(daemon: Daemon) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = Arc::new(UnixDatagram::bind(dir.path().join(IFACE)).unwrap());
        let state = Arc::new(Mutex::new(daemon));
        let client = Arc::new(Mutex::new(None));

        let task = tokio::spawn(serve(socket.clone(), state.clone(), client.clone()));
        Self {
            dir,
            state,
            socket,
            client,
            task,
        }
    }

    /// Channel configuration pointing at this daemon.
    pub fn config(&self) -> ControlConfig {
        ControlConfig::new(IFACE)
            .with_ctrl_dir(self.dir.path())
            .with_local_dir(self.dir.path())
            .with_timeouts(
                TimeoutConfig::new()
                    .with_reply_timeout(Duration::from_secs(2))
                    .with_scan_timeout(Duration::from_secs(2)),
            )
    }

    pub fn received(&self) -> Vec<String> {
        self.state.lock().unwrap().received.clone()
    }

    pub fn count(&self, cmd: &str) -> usize {
        self.received().iter().filter(|c| *c == cmd).count()
    }

    /// Sends an unsolicited message to the last client that spoke.
    pub async fn push(&self, msg: &str) {
        let client = self.client.lock().unwrap().clone();
        if let Some(path) = client {
            self.socket.send_to(msg.as_bytes(), path).await.unwrap();
        }
    }

    /// Names of the files left in the socket directory.
    pub fn socket_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl Drop for FakeSupplicant {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    socket: Arc<UnixDatagram>,
    state: Arc<Mutex<Daemon>>,
    client: Arc<Mutex<Option<PathBuf>>>,
) {
    let mut buf = vec![0u8; 4096];
    loop {
        let Ok((n, addr)) = socket.recv_from(&mut buf).await else {
            break;
        };
        let Some(path) = addr.as_pathname().map(Path::to_path_buf) else {
            continue;
        };
        *client.lock().unwrap() = Some(path.clone());

        let cmd = String::from_utf8_lossy(&buf[..n]).into_owned();
        let out = state.lock().unwrap().handle(&cmd);

        for item in out {
            match item {
                Out::Send(msg) => {
                    let _ = socket.send_to(msg.as_bytes(), &path).await;
                }
                Out::Later(delay, msg) => {
                    let socket = socket.clone();
                    let path = path.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = socket.send_to(msg.as_bytes(), &path).await;
                    });
                }
            }
        }
    }
}
