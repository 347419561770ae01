//! Access point helper supervision.
//!
//! Launches the `create_ap` helper and tracks its lifecycle from its
//! output:
//!
//! ```text
//! created ──AP-ENABLED──▶ started ──close()──▶ closing ──done──▶ closed
//!    └──────────────close()──────────────────────┘
//! ```
//!
//! `close()` signals the helper once and waits a bounded time for its
//! `done` marker. When the wait expires the supervisor reports `closed`
//! anyway; the helper may still be exiting in the background. The helper
//! exiting on its own also ends in `closed`.

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, watch};

use crate::Result;
use crate::api::models::{ApEvent, ApOptions, ApState, WpaError};
use crate::types::constants::{ap_marker, defaults, limits, timeouts};
use crate::util::utils::with_timeout;

const READ_CHUNK: usize = 4096;

/// State shared with the output readers.
struct ApShared {
    state: watch::Sender<ApState>,
    events: broadcast::Sender<ApEvent>,
    started: AtomicBool,
    exited: AtomicBool,
}

impl ApShared {
    fn emit(&self, event: ApEvent) {
        let _ = self.events.send(event);
    }

    /// Moves to `to` if the state machine allows it. Returns `true` on a
    /// change.
    fn transition(&self, to: ApState) -> bool {
        self.state.send_if_modified(|state| {
            let allowed = match (*state, to) {
                (ApState::Created, ApState::Started) => true,
                (ApState::Created | ApState::Started, ApState::Closing) => true,
                (from, ApState::Closed) => from != ApState::Closed,
                _ => false,
            };
            if allowed {
                debug!("Access point {state} -> {to}");
                *state = to;
            }
            allowed
        })
    }

    fn mark_closed(&self) {
        if self.transition(ApState::Closed) {
            self.started.store(false, Ordering::SeqCst);
            info!("Access point closed");
            self.emit(ApEvent::Close);
        }
    }

    fn on_status_line(&self, line: &str) {
        if line.contains(ap_marker::ENABLED) && self.transition(ApState::Started) {
            self.started.store(true, Ordering::SeqCst);
            info!("Access point enabled");
            self.emit(ApEvent::Started);
        }
        if *self.state.borrow() == ApState::Closing && line.contains(ap_marker::DONE) {
            self.mark_closed();
        }
    }
}

/// A supervised access point helper process.
///
/// # Example
///
/// ```no_run
/// use nix::sys::signal::Signal;
/// use wpars::{AccessPoint, ApEvent, ApOptions};
///
/// # async fn example() -> wpars::Result<()> {
/// let ap = AccessPoint::create("MyHotspot", ApOptions::new().with_password("secret123"))?;
/// let mut events = ap.events();
///
/// while let Ok(event) = events.recv().await {
///     if event == ApEvent::Started {
///         break;
///     }
/// }
///
/// ap.close(Signal::SIGINT).await?;
/// # Ok(())
/// # }
/// ```
pub struct AccessPoint {
    name: String,
    pid: Option<u32>,
    shutdown: Duration,
    shared: Arc<ApShared>,
    first: Mutex<Option<broadcast::Receiver<ApEvent>>>,
}

impl std::fmt::Debug for AccessPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessPoint")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("state", &self.state())
            .finish()
    }
}

impl AccessPoint {
    /// Signal `close` is normally called with.
    pub const DEFAULT_CLOSE_SIGNAL: Signal = Signal::SIGINT;

    /// Launches the access point helper.
    ///
    /// An empty `name` falls back to `options.name`, then to `MY_WIFI`.
    /// Internet sharing is disabled unless `options.iface_sharing` is set.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `WpaError::HelperNotFound` if the helper does not exist and
    /// `WpaError::Spawn` if it cannot be started.
    pub fn create(name: &str, options: ApOptions) -> Result<Self> {
        let helper = locate(&options.helper)
            .ok_or_else(|| WpaError::HelperNotFound(options.helper.clone()))?;
        let name = resolve_name(name, &options);
        let args = helper_args(&name, &options);

        debug!(
            "Launching {} for access point '{name}' on {}",
            helper.display(),
            options.iface
        );

        let mut command = Command::new(&helper);
        command.args(&args);
        Self::launch(name, command)
    }

    /// Supervises an arbitrary command in place of the helper.
    ///
    /// Its stdout and stderr are piped and interpreted like the helper's.
    pub fn spawn(command: Command) -> Result<Self> {
        let name = command.as_std().get_program().to_string_lossy().into_owned();
        Self::launch(name, command)
    }

    fn launch(name: String, mut command: Command) -> Result<Self> {
        let program = command.as_std().get_program().to_string_lossy().into_owned();
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| WpaError::Spawn { program, source })?;

        let pid = child.id();
        let (events, first) = broadcast::channel(limits::EVENT_CHANNEL_SIZE);
        let (state, _) = watch::channel(ApState::Created);
        let shared = Arc::new(ApShared {
            state,
            events,
            started: AtomicBool::new(false),
            exited: AtomicBool::new(false),
        });

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        tokio::spawn(supervise(child, stdout, stderr, shared.clone()));

        info!("Access point '{name}' created (pid {pid:?})");
        Ok(Self {
            name,
            pid,
            shutdown: timeouts::ap_shutdown_timeout(),
            shared,
            first: Mutex::new(Some(first)),
        })
    }

    /// Sets how long `close` waits for the helper to confirm shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown = timeout;
        self
    }

    /// How long `close` waits for the helper to confirm shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ApState {
        *self.shared.state.borrow()
    }

    /// Watches state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ApState> {
        self.shared.state.subscribe()
    }

    /// Returns `true` once the helper has reported the access point up,
    /// until it closes.
    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    /// Returns `true` while a shutdown is requested but not confirmed.
    pub fn is_closing(&self) -> bool {
        self.state() == ApState::Closing
    }

    /// Returns `true` if started and not closing.
    pub fn is_active(&self) -> bool {
        self.is_started() && !self.is_closing()
    }

    /// Subscribes to supervisor notifications.
    ///
    /// The first subscriber also receives everything since the helper was
    /// launched.
    pub fn events(&self) -> broadcast::Receiver<ApEvent> {
        self.first
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(|| self.shared.events.subscribe())
    }

    /// Shuts the access point down.
    ///
    /// Sends `signal` to the helper once and waits for it to report `done`,
    /// at most the shutdown timeout. On expiry the state is forced to
    /// `closed`. Returns immediately if the helper has already exited or a
    /// shutdown is already under way.
    ///
    /// # Errors
    ///
    /// Returns `WpaError::Signal` if the helper could not be signalled.
    pub async fn close(&self, signal: Signal) -> Result<()> {
        match self.state() {
            ApState::Closed => return Ok(()),
            ApState::Closing => {
                debug!("Access point '{}' is already closing", self.name);
                return Ok(());
            }
            ApState::Created | ApState::Started => {}
        }

        let pid = match self.pid {
            Some(pid) if !self.shared.exited.load(Ordering::SeqCst) => pid,
            _ => {
                self.shared.mark_closed();
                return Ok(());
            }
        };

        if !self.shared.transition(ApState::Closing) {
            return Ok(());
        }

        let mut state = self.shared.state.subscribe();
        info!("Closing access point '{}' with {signal}", self.name);
        match kill(Pid::from_raw(pid as i32), signal) {
            Ok(()) => {}
            Err(Errno::ESRCH) => {
                debug!("Access point helper already gone");
                self.shared.mark_closed();
                return Ok(());
            }
            Err(e) => {
                warn!("Failed to signal access point helper: {e}");
                self.shared.mark_closed();
                return Err(e.into());
            }
        }

        let confirmed = with_timeout(self.shutdown, state.wait_for(|s| *s == ApState::Closed))
            .await
            .is_some_and(|r| r.is_ok());
        if !confirmed {
            warn!(
                "Access point '{}' did not confirm shutdown within {:?}, forcing closed",
                self.name, self.shutdown
            );
            self.shared.mark_closed();
        }
        Ok(())
    }
}

async fn supervise(
    mut child: Child,
    stdout: Option<impl AsyncRead + Unpin + Send + 'static>,
    stderr: Option<impl AsyncRead + Unpin + Send + 'static>,
    shared: Arc<ApShared>,
) {
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = stdout {
        readers.push(tokio::spawn(read_output(stdout, shared.clone(), false)));
    }
    if let Some(stderr) = stderr {
        readers.push(tokio::spawn(read_output(stderr, shared.clone(), true)));
    }

    let status = child.wait().await;
    for reader in readers {
        let _ = reader.await;
    }
    shared.exited.store(true, Ordering::SeqCst);

    match status {
        Ok(status) => debug!("Access point helper exited: {status}"),
        Err(e) => shared.emit(ApEvent::Error(e.to_string())),
    }
    shared.mark_closed();
}

/// Forwards raw output chunks; stdout lines also drive the state machine.
async fn read_output<R>(mut stream: R, shared: Arc<ApShared>, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let mut partial = String::new();

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                shared.emit(ApEvent::Error(e.to_string()));
                break;
            }
        };

        let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
        if is_stderr {
            shared.emit(ApEvent::Stderr(chunk));
            continue;
        }

        shared.emit(ApEvent::Stdout(chunk.clone()));
        partial.push_str(&chunk);
        while let Some(end) = partial.find('\n') {
            let line: String = partial.drain(..=end).collect();
            shared.on_status_line(&line);
        }
    }

    if !partial.is_empty() {
        shared.on_status_line(&partial);
    }
}

fn resolve_name(name: &str, options: &ApOptions) -> String {
    if !name.is_empty() {
        return name.to_string();
    }
    options
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or(defaults::AP_NAME)
        .to_string()
}

/// Builds the helper's arguments: options first, then positionals
/// `iface [sharing-iface] name [password]`.
fn helper_args(name: &str, options: &ApOptions) -> Vec<String> {
    let mut opts = Vec::new();
    let mut args = vec![options.iface.clone()];

    if !options.gateway.is_empty() {
        opts.push("-g".to_string());
        opts.push(options.gateway.clone());
    }

    match options.iface_sharing.as_deref().filter(|s| !s.is_empty()) {
        Some(sharing) => args.push(sharing.to_string()),
        None => opts.push("-n".to_string()),
    }

    args.push(name.to_string());
    if let Some(password) = options.password.as_deref().filter(|p| !p.is_empty()) {
        args.push(password.to_string());
    }

    opts.extend(args);
    opts
}

/// Finds the helper: paths are checked directly, bare names on `PATH`.
fn locate(helper: &Path) -> Option<PathBuf> {
    if helper.components().count() > 1 {
        return helper.is_file().then(|| helper.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(helper))
        .find(|candidate| candidate.is_file())
}
