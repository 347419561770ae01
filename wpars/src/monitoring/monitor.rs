//! Persistent event monitor backed by `wpa_cli`.
//!
//! The control channel only sees events while it is open and attached. The
//! monitor instead keeps an interactive `wpa_cli` running and parses its
//! output continuously, so events are observed with no commands in flight.
//!
//! A monitor is single-use: once the watch process exits, a final
//! [`MonitorEvent::Closed`] is sent, the event channel is dropped and a new
//! monitor has to be spawned.

use log::{debug, info, warn};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::Result;
use crate::api::models::{MonitorEvent, WpaError};
use crate::core::parse::{monitor_lines, parse_event};
use crate::types::constants::{defaults, limits};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared with the supervising task.
struct Shared {
    events: Mutex<Option<broadcast::Sender<MonitorEvent>>>,
    closed: AtomicBool,
}

/// Watches a supplicant interface through a `wpa_cli` process.
///
/// # Example
///
/// ```no_run
/// use wpars::{Monitor, MonitorEvent};
///
/// # async fn example() -> wpars::Result<()> {
/// let monitor = Monitor::spawn("wlan0")?;
/// let mut events = monitor.events();
///
/// while let Ok(event) = events.recv().await {
///     match event {
///         MonitorEvent::Control(ev) => println!("{}: {:?}", ev.name(), ev.args),
///         MonitorEvent::Closed(code) => println!("wpa_cli exited: {code:?}"),
///         _ => {}
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Monitor {
    program: String,
    pid: Option<u32>,
    shared: Arc<Shared>,
    first: Mutex<Option<broadcast::Receiver<MonitorEvent>>>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("program", &self.program)
            .field("pid", &self.pid)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Monitor {
    /// Starts `wpa_cli -i <iface>` and begins watching its output.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(iface: &str) -> Result<Self> {
        Self::with_command(defaults::WPA_CLI, ["-i", iface])
    }

    /// Starts an arbitrary watch process in place of `wpa_cli`.
    pub fn with_command<I, S>(program: &str, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| WpaError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let pid = child.id();
        info!("Monitor started: {program} (pid {pid:?})");

        let (events, first) = broadcast::channel(limits::EVENT_CHANNEL_SIZE);
        let (stop_tx, stop_rx) = oneshot::channel();
        let shared = Arc::new(Shared {
            events: Mutex::new(Some(events.clone())),
            closed: AtomicBool::new(false),
        });
        let task = tokio::spawn(supervise(child, events, shared.clone(), stop_rx));

        Ok(Self {
            program: program.to_string(),
            pid,
            shared,
            first: Mutex::new(Some(first)),
            stop: Mutex::new(Some(stop_tx)),
            task: Mutex::new(Some(task)),
        })
    }

    /// Subscribes to monitor notifications.
    ///
    /// The first subscriber also receives everything buffered since the
    /// process started. After the monitor has closed, the returned receiver
    /// yields nothing.
    pub fn events(&self) -> broadcast::Receiver<MonitorEvent> {
        if let Some(first) = lock(&self.first).take() {
            return first;
        }
        match lock(&self.shared.events).as_ref() {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Process id of the watch process, if it was still known at spawn.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns `true` once the watch process has exited.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Stops the watch process and waits for the final notification.
    ///
    /// Closing a closed monitor does nothing.
    pub async fn close(&self) {
        if let Some(stop) = lock(&self.stop).take() {
            let _ = stop.send(());
        }
        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Monitor task ended abnormally: {e}");
            }
        }
    }
}

async fn supervise(
    mut child: Child,
    events: broadcast::Sender<MonitorEvent>,
    shared: Arc<Shared>,
    mut stop: oneshot::Receiver<()>,
) {
    // Interactive wpa_cli exits on EOF, so stdin stays open until the end.
    let _stdin = child.stdin.take();

    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward(stdout, events.clone(), false)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward(stderr, events.clone(), true)));
    }

    let (status, stopped) = tokio::select! {
        status = child.wait() => (status, false),
        _ = &mut stop => {
            debug!("Stopping monitor process");
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill monitor process: {e}");
            }
            (child.wait().await, true)
        }
    };

    // Descendants of a killed process may keep its pipes open.
    for reader in readers {
        if stopped {
            reader.abort();
        }
        let _ = reader.await;
    }

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            let _ = events.send(MonitorEvent::Error(e.to_string()));
            None
        }
    };
    info!("Monitor process exited with code {code:?}");

    shared.closed.store(true, Ordering::SeqCst);
    let _ = events.send(MonitorEvent::Closed(code));
    lock(&shared.events).take();
}

/// Forwards one output stream line by line.
async fn forward<R>(stream: R, events: broadcast::Sender<MonitorEvent>, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let chunk = String::from_utf8_lossy(&buf);
                for line in monitor_lines(&chunk) {
                    if is_stderr {
                        let _ = events.send(MonitorEvent::Error(line.to_string()));
                        continue;
                    }
                    let _ = events.send(MonitorEvent::Data(line.to_string()));
                    if let Some(event) = parse_event(line) {
                        let _ = events.send(MonitorEvent::Control(event));
                    }
                }
            }
            Err(e) => {
                let _ = events.send(MonitorEvent::Error(e.to_string()));
                break;
            }
        }
    }
}
