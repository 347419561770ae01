//! Control channel client for the supplicant's control socket.
//!
//! One datagram socket carries two kinds of traffic: replies to the
//! commands this client sends, and unsolicited events the daemon pushes
//! once the client has attached. The daemon guarantees that the next
//! non-event message is the reply to the last command, so the client
//!
//! - allows exactly one command in flight, queueing concurrent callers, and
//! - runs a single reader task that inspects every inbound datagram once
//!   and routes it either to the pending reply slot or to the event path.
//!
//! Event lines are recognised by their `<N>` level marker and never satisfy
//! a pending command. Operations whose real completion is reported by an
//! event (`SCAN` is the canonical one) park a waiter for that event before
//! sending the command, so the dispatch path can wake them.

use futures_timer::Delay;
use log::{debug, error, info, warn};
use nix::errno::Errno;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::UnixDatagram;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::Result;
use crate::api::models::{ControlConfig, ControlEvent, EventKind, WpaError, WpaEvent};
use crate::core::parse;
use crate::types::constants::{command, limits, reply, setting, timeouts};
use crate::util::utils::{join_command, with_timeout};

type ReplySender = oneshot::Sender<Result<String>>;

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Routes inbound messages to the pending reply slot or the event path.
///
/// Shared between the channel and its reader task. Survives reopening.
struct Router {
    pending: StdMutex<Option<ReplySender>>,
    waiters: StdMutex<Vec<(EventKind, oneshot::Sender<ControlEvent>)>>,
    events: broadcast::Sender<WpaEvent>,
}

impl Router {
    fn new() -> Self {
        let (events, _) = broadcast::channel(limits::EVENT_CHANNEL_SIZE);
        Self {
            pending: StdMutex::new(None),
            waiters: StdMutex::new(Vec::new()),
            events,
        }
    }

    fn route(&self, msg: &str) {
        if parse::is_event(msg) {
            match parse::parse_event(msg) {
                Some(event) => self.dispatch_event(event),
                None => debug!("Ignoring event without a tag: {msg:?}"),
            }
        } else {
            self.deliver_reply(msg.trim().to_string());
        }
    }

    fn dispatch_event(&self, event: ControlEvent) {
        debug!("Control event: {} ({})", event.tag, event.name());

        if let Some(kind) = event.kind {
            let ready: Vec<_> = {
                let mut waiters = lock(&self.waiters);
                let (ready, parked) = waiters.drain(..).partition(|(k, _)| *k == kind);
                *waiters = parked;
                ready
            };
            for (_, tx) in ready {
                let _ = tx.send(event.clone());
            }
        }

        self.notify(WpaEvent::Control(event));
    }

    fn deliver_reply(&self, reply: String) {
        match lock(&self.pending).take() {
            Some(tx) => {
                if tx.send(Ok(reply)).is_err() {
                    debug!("Reply arrived after its caller gave up");
                }
            }
            None => debug!("Dropping reply with no command outstanding: {reply:?}"),
        }
    }

    fn set_pending(&self, tx: ReplySender) {
        if lock(&self.pending).replace(tx).is_some() {
            warn!("Replaced a pending reply slot that was never resolved");
        }
    }

    fn clear_pending(&self) {
        lock(&self.pending).take();
    }

    fn fail_pending(&self, err: WpaError) {
        if let Some(tx) = lock(&self.pending).take() {
            let _ = tx.send(Err(err));
        }
    }

    fn park(&self, kind: EventKind) -> oneshot::Receiver<ControlEvent> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = lock(&self.waiters);
        waiters.retain(|(_, tx)| !tx.is_closed());
        waiters.push((kind, tx));
        rx
    }

    fn drop_waiters(&self) {
        lock(&self.waiters).clear();
    }

    fn notify(&self, event: WpaEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

/// An open, attached socket pair.
struct Link {
    socket: Arc<UnixDatagram>,
    local_path: PathBuf,
    reader: JoinHandle<()>,
    closed: Arc<AtomicBool>,
    released: AtomicBool,
}

impl Link {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stops the reader and removes the socket file. Only the first call
    /// touches the file, which a later link may have bound again.
    fn release(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.reader.abort();
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        match std::fs::remove_file(&self.local_path) {
            Ok(()) => debug!("Removed client socket {}", self.local_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove client socket {}: {e}",
                self.local_path.display()
            ),
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.release();
    }
}

/// Reads datagrams until the socket fails, routing each one.
async fn read_loop(socket: Arc<UnixDatagram>, router: Arc<Router>, closed: Arc<AtomicBool>) {
    let mut buf = vec![0u8; limits::MAX_DATAGRAM];
    loop {
        match socket.recv(&mut buf).await {
            Ok(n) => {
                let msg = String::from_utf8_lossy(&buf[..n]);
                router.route(&msg);
            }
            Err(e) => {
                error!("Control socket receive failed: {e}");
                closed.store(true, Ordering::SeqCst);
                router.fail_pending(WpaError::Transport(e.to_string()));
                router.drop_waiters();
                router.notify(WpaEvent::Error(e.to_string()));
                break;
            }
        }
    }
}

fn is_congestion(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == Some(Errno::ENOBUFS as i32)
        || e.raw_os_error() == Some(Errno::EAGAIN as i32)
}

/// Returns `true` if `key` holds a secret whose value must not be logged.
fn is_secret(key: &str) -> bool {
    key == setting::PSK || key.starts_with("wep_key") || key == "password"
}

/// Describes a command for logs and errors without leaking secrets.
fn describe(cmd: &str) -> String {
    let words: Vec<&str> = cmd.split(' ').collect();
    match words.as_slice() {
        [command::SET_NETWORK, id, key, ..] if is_secret(key) => {
            format!("{} {id} {key} <redacted>", command::SET_NETWORK)
        }
        _ => cmd.to_string(),
    }
}

/// Fails with `UnexpectedReply` unless the reply is `OK`.
pub(crate) fn expect_ok(cmd: &str, reply: String) -> Result<()> {
    if reply == reply::OK {
        Ok(())
    } else {
        Err(WpaError::UnexpectedReply {
            command: describe(cmd),
            reply,
        })
    }
}

struct Inner {
    config: ControlConfig,
    client_id: String,
    link: Mutex<Option<Arc<Link>>>,
    request_lock: Mutex<()>,
    router: Arc<Router>,
}

/// Client of one interface's control socket.
///
/// Cloning is cheap; clones share the socket, the command queue and the
/// event stream.
///
/// # Example
///
/// ```no_run
/// use wpars::{ControlChannel, ControlConfig};
///
/// # async fn example() -> wpars::Result<()> {
/// let channel = ControlChannel::new(ControlConfig::new("wlan0"));
/// channel.open().await?;
/// let pong = channel.command::<&str>("PING", &[]).await?;
/// assert_eq!(pong, "PONG");
/// channel.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ControlChannel {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel")
            .field("iface", &self.inner.config.iface)
            .field("client_id", &self.inner.client_id)
            .finish()
    }
}

impl ControlChannel {
    /// Creates a closed channel. Nothing touches the filesystem until `open()`.
    pub fn new(config: ControlConfig) -> Self {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        Self {
            inner: Arc::new(Inner {
                config,
                client_id,
                link: Mutex::new(None),
                request_lock: Mutex::new(()),
                router: Arc::new(Router::new()),
            }),
        }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.inner.config
    }

    /// Interface this channel controls.
    pub fn iface(&self) -> &str {
        &self.inner.config.iface
    }

    /// Subscribes to channel notifications.
    pub fn events(&self) -> broadcast::Receiver<WpaEvent> {
        self.inner.router.events.subscribe()
    }

    /// Returns `true` while the channel is open and its transport healthy.
    pub async fn is_open(&self) -> bool {
        self.inner
            .link
            .lock()
            .await
            .as_ref()
            .is_some_and(|link| !link.is_closed())
    }

    /// Connects to the daemon and attaches to its event stream.
    ///
    /// Idempotent: returns immediately if already open. A caller arriving
    /// while another open is in progress waits for that attempt instead of
    /// binding a second socket.
    pub async fn open(&self) -> Result<()> {
        let mut slot = self.inner.link.lock().await;
        if let Some(link) = slot.as_ref() {
            if !link.is_closed() {
                return Ok(());
            }
            debug!("Replacing failed control link");
            if let Some(failed) = slot.take() {
                failed.release();
            }
        }

        let ctrl_path = self.inner.config.ctrl_path();
        let local_path = self.inner.config.local_path(&self.inner.client_id);
        debug!(
            "Opening control channel {} -> {}",
            local_path.display(),
            ctrl_path.display()
        );

        match std::fs::remove_file(&local_path) {
            Ok(()) => warn!("Removed stale client socket {}", local_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let socket = UnixDatagram::bind(&local_path)?;
        let closed = Arc::new(AtomicBool::new(false));
        let socket = Arc::new(socket);
        let reader = tokio::spawn(read_loop(
            socket.clone(),
            self.inner.router.clone(),
            closed.clone(),
        ));
        let link = Arc::new(Link {
            socket,
            local_path,
            reader,
            closed,
            released: AtomicBool::new(false),
        });

        // Dropping `link` on any failure below removes the socket file.
        link.socket.connect(&ctrl_path)?;
        let attached = self.request(&link, command::ATTACH).await?;
        expect_ok(command::ATTACH, attached)?;

        *slot = Some(link);
        info!("Control channel open on {}", self.inner.config.iface);
        self.inner.router.notify(WpaEvent::Open);
        Ok(())
    }

    /// Closes the channel and removes the client socket file.
    ///
    /// A command still waiting for its reply fails with `ChannelClosed`, as
    /// do parked event waiters. Closing a closed channel does nothing.
    pub async fn close(&self) {
        let Some(link) = self.inner.link.lock().await.take() else {
            debug!("Control channel already closed");
            return;
        };

        if !link.is_closed() {
            // Best effort; the reply is never read.
            let _ = link.socket.try_send(command::DETACH.as_bytes());
        }

        link.release();
        self.inner.router.fail_pending(WpaError::ChannelClosed);
        self.inner.router.drop_waiters();

        info!("Control channel closed on {}", self.inner.config.iface);
        self.inner.router.notify(WpaEvent::Closed);
    }

    /// Sends `name` with whitespace-joined `args` and returns the reply.
    ///
    /// Concurrent callers are queued; replies are matched in order.
    ///
    /// # Errors
    ///
    /// Returns `WpaError::CommandFailed` if the daemon answers `FAIL`,
    /// `WpaError::NotOpen` before `open()`, and transport or timeout errors
    /// otherwise.
    pub async fn command<S: AsRef<str>>(&self, name: &str, args: &[S]) -> Result<String> {
        let cmd = join_command(name, args);
        let link = self.link().await?;
        let reply = self.request(&link, &cmd).await?;

        if reply == reply::FAIL {
            return Err(WpaError::CommandFailed {
                command: describe(&cmd),
            });
        }
        Ok(reply)
    }

    /// Sends a command acknowledged with `OK` whose completion is reported
    /// by the event `kind`, and waits up to `timeout` for that event.
    ///
    /// The waiter is parked before the command is written, so a completion
    /// event arriving right after the acknowledgement is not missed.
    /// Returns `None` if the event did not arrive in time.
    pub async fn command_until(
        &self,
        cmd: &str,
        kind: EventKind,
        timeout: Duration,
    ) -> Result<Option<ControlEvent>> {
        let link = self.link().await?;
        let waiter = self.inner.router.park(kind);

        let ack = self.request(&link, cmd).await?;
        if ack == reply::FAIL {
            return Err(WpaError::CommandFailed {
                command: describe(cmd),
            });
        }
        expect_ok(cmd, ack)?;

        match with_timeout(timeout, waiter).await {
            Some(Ok(event)) => Ok(Some(event)),
            Some(Err(_)) => Err(WpaError::ChannelClosed),
            None => Ok(None),
        }
    }

    /// Waits up to `timeout` for the next event of the given kind.
    ///
    /// Returns `None` on timeout.
    pub async fn wait_for(&self, kind: EventKind, timeout: Duration) -> Result<Option<ControlEvent>> {
        self.link().await?;
        let waiter = self.inner.router.park(kind);

        match with_timeout(timeout, waiter).await {
            Some(Ok(event)) => Ok(Some(event)),
            Some(Err(_)) => Err(WpaError::ChannelClosed),
            None => Ok(None),
        }
    }

    async fn link(&self) -> Result<Arc<Link>> {
        match self.inner.link.lock().await.as_ref() {
            Some(link) if link.is_closed() => Err(WpaError::ChannelClosed),
            Some(link) => Ok(link.clone()),
            None => Err(WpaError::NotOpen),
        }
    }

    /// Writes one command and waits for its reply. Holds the command turn
    /// for the whole exchange.
    async fn request(&self, link: &Link, cmd: &str) -> Result<String> {
        let _turn = self.inner.request_lock.lock().await;
        let router = &self.inner.router;

        let (tx, rx) = oneshot::channel();
        router.set_pending(tx);
        if link.is_closed() {
            router.clear_pending();
            return Err(WpaError::ChannelClosed);
        }

        debug!("<<< {}", describe(cmd));
        if let Err(e) = self.send(link, cmd).await {
            router.clear_pending();
            return Err(e);
        }

        match with_timeout(self.inner.config.timeouts.reply, rx).await {
            Some(Ok(result)) => {
                let reply = result?;
                debug!(">>> {reply}");
                Ok(reply)
            }
            Some(Err(_)) => Err(WpaError::ChannelClosed),
            None => {
                router.clear_pending();
                warn!(
                    "No reply to {} after {:?}",
                    describe(cmd),
                    self.inner.config.timeouts.reply
                );
                Err(WpaError::Timeout(describe(cmd)))
            }
        }
    }

    async fn send(&self, link: &Link, cmd: &str) -> Result<()> {
        let mut attempts = 0;
        loop {
            match link.socket.send(cmd.as_bytes()).await {
                Ok(_) => return Ok(()),
                Err(e) if is_congestion(&e) => {
                    attempts += 1;
                    if attempts > limits::CONGESTION_RETRIES {
                        error!("Control socket still congested after {attempts} attempts");
                        return Err(WpaError::Congested);
                    }
                    warn!("Control socket congested ({e}), retrying");
                    self.inner.router.notify(WpaEvent::Congestion);
                    Delay::new(timeouts::congestion_backoff()).await;
                }
                Err(e) => {
                    error!("Control socket send failed: {e}");
                    // The daemon is gone; the next open() replaces this link.
                    link.closed.store(true, Ordering::SeqCst);
                    self.inner.router.drop_waiters();
                    self.inner.router.notify(WpaEvent::Error(e.to_string()));
                    return Err(WpaError::Transport(e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_hides_setting_values() {
        assert_eq!(
            describe("SET_NETWORK 0 psk \"secret\""),
            "SET_NETWORK 0 psk <redacted>"
        );
        assert_eq!(
            describe("SET_NETWORK 0 ssid \"home\""),
            "SET_NETWORK 0 ssid \"home\""
        );
        assert_eq!(describe("STATUS"), "STATUS");
        assert_eq!(describe("ENABLE_NETWORK 3"), "ENABLE_NETWORK 3");
    }

    #[test]
    fn expect_ok_accepts_only_ok() {
        assert!(expect_ok("SCAN", "OK".into()).is_ok());
        assert!(matches!(
            expect_ok("SCAN", "FAIL-BUSY".into()),
            Err(WpaError::UnexpectedReply { .. })
        ));
    }

    #[test]
    fn secrets_are_recognised() {
        assert!(is_secret("psk"));
        assert!(is_secret("wep_key0"));
        assert!(!is_secret("ssid"));
    }

    #[test]
    fn router_separates_replies_from_events() {
        let router = Router::new();
        let mut events = router.events.subscribe();

        let (tx, mut rx) = oneshot::channel();
        router.set_pending(tx);

        router.route("<3>CTRL-EVENT-SCAN-STARTED ");
        assert!(rx.try_recv().is_err(), "event must not satisfy a reply");

        router.route("OK\n");
        assert_eq!(rx.try_recv().unwrap().unwrap(), "OK");

        match events.try_recv().unwrap() {
            WpaEvent::Control(event) => assert_eq!(event.kind, Some(EventKind::ScanStarted)),
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[test]
    fn router_wakes_matching_waiters_only() {
        let router = Router::new();
        let mut scanned = router.park(EventKind::ScanResults);
        let mut connected = router.park(EventKind::Connected);

        router.route("<3>CTRL-EVENT-SCAN-RESULTS ");

        assert!(scanned.try_recv().is_ok());
        assert!(connected.try_recv().is_err());
        assert_eq!(lock(&router.waiters).len(), 1);
    }

    #[test]
    fn router_fails_pending_on_error() {
        let router = Router::new();
        let (tx, mut rx) = oneshot::channel();
        router.set_pending(tx);

        router.fail_pending(WpaError::ChannelClosed);
        assert!(matches!(rx.try_recv().unwrap(), Err(WpaError::ChannelClosed)));
    }

    #[tokio::test]
    async fn released_link_leaves_rebound_socket_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wpa_ctrl_test");
        let link = Link {
            socket: Arc::new(UnixDatagram::bind(&path).unwrap()),
            local_path: path.clone(),
            reader: tokio::spawn(async {}),
            closed: Arc::new(AtomicBool::new(false)),
            released: AtomicBool::new(false),
        };

        link.release();
        assert!(!path.exists());

        let _rebound = UnixDatagram::bind(&path).unwrap();
        drop(link);
        assert!(path.exists());
    }

    #[test]
    fn router_drops_unsolicited_reply() {
        let router = Router::new();
        router.route("OK");
        assert!(lock(&router.pending).is_none());
    }
}
