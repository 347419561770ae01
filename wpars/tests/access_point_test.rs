//! Tests for the access point supervisor, with `sh` scripts standing in
//! for `create_ap`.

use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::sync::broadcast::Receiver;
use wpars::{AccessPoint, ApEvent, ApOptions, ApState, WpaError};

fn script(body: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(body);
    command
}

async fn wait_for(events: &mut Receiver<ApEvent>, wanted: &ApEvent) -> Vec<ApEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for access point event")
            .expect("event channel closed");
        let found = &event == wanted;
        seen.push(event);
        if found {
            return seen;
        }
    }
}

fn closes(events: &mut Receiver<ApEvent>) -> usize {
    let mut count = 0;
    while let Ok(event) = events.try_recv() {
        if event == ApEvent::Close {
            count += 1;
        }
    }
    count
}

const GRACEFUL: &str = r#"trap 'echo "Doing cleanup.. done"; exit 0' INT
echo "Config dir: /tmp/create_ap.wlan0.conf"
echo "wlan0: AP-ENABLED"
while true; do sleep 0.1; done"#;

#[tokio::test]
async fn test_missing_helper() {
    let options = ApOptions::new().with_helper("/nonexistent/create_ap");
    let err = AccessPoint::create("Lab", options).unwrap_err();
    assert!(matches!(err, WpaError::HelperNotFound(_)));
}

#[tokio::test]
async fn test_graceful_lifecycle() {
    let ap = AccessPoint::spawn(script(GRACEFUL)).unwrap();
    assert!(ap.pid().is_some());
    let mut events = ap.events();

    let seen = wait_for(&mut events, &ApEvent::Started).await;
    assert!(seen.iter().any(|e| matches!(e, ApEvent::Stdout(out) if out.contains("AP-ENABLED"))));
    assert_eq!(ap.state(), ApState::Started);
    assert!(ap.is_started());
    assert!(ap.is_active());

    ap.close(Signal::SIGINT).await.unwrap();
    assert_eq!(ap.state(), ApState::Closed);
    assert!(!ap.is_active());
    assert!(!ap.is_started());

    let seen = wait_for(&mut events, &ApEvent::Close).await;
    assert!(seen.iter().any(|e| matches!(e, ApEvent::Stdout(out) if out.contains("done"))));

    // Second close sends nothing and reports nothing.
    ap.close(Signal::SIGINT).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(closes(&mut events), 0);
}

#[tokio::test]
async fn test_forced_close_after_timeout() {
    let body = r#"trap '' INT
echo "wlan0: AP-ENABLED"
while true; do sleep 0.1; done"#;
    let ap = AccessPoint::spawn(script(body))
        .unwrap()
        .with_shutdown_timeout(Duration::from_millis(300));
    let mut events = ap.events();
    wait_for(&mut events, &ApEvent::Started).await;

    let started = Instant::now();
    ap.close(AccessPoint::DEFAULT_CLOSE_SIGNAL).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(290));
    assert_eq!(ap.state(), ApState::Closed);
    wait_for(&mut events, &ApEvent::Close).await;

    let pid = ap.pid().unwrap();
    kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(closes(&mut events), 0);
}

#[tokio::test]
async fn test_close_before_start_signals_live_helper() {
    let body = r#"trap 'echo done; exit 0' INT
while true; do sleep 0.1; done"#;
    let ap = AccessPoint::spawn(script(body)).unwrap();
    let mut events = ap.events();
    assert_eq!(ap.state(), ApState::Created);

    ap.close(Signal::SIGINT).await.unwrap();
    assert_eq!(ap.state(), ApState::Closed);
    assert!(!ap.is_started());

    let seen = wait_for(&mut events, &ApEvent::Close).await;
    assert!(!seen.contains(&ApEvent::Started));
}

#[tokio::test]
async fn test_close_after_exit_is_immediate() {
    let ap = AccessPoint::spawn(script("echo 'wlan0: Interface busy' >&2; exit 1")).unwrap();
    let mut events = ap.events();

    let seen = wait_for(&mut events, &ApEvent::Close).await;
    assert!(seen.contains(&ApEvent::Stderr("wlan0: Interface busy\n".into())));
    assert_eq!(ap.state(), ApState::Closed);

    let started = Instant::now();
    ap.close(Signal::SIGINT).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(closes(&mut events), 0);
}

#[tokio::test]
async fn test_client_shutdown_timeout_applies() {
    use std::os::unix::fs::PermissionsExt;
    use wpars::{ControlConfig, TimeoutConfig, Wireless};

    let dir = tempfile::tempdir().unwrap();
    let helper = dir.path().join("create_ap");
    std::fs::write(
        &helper,
        "#!/bin/sh\ntrap '' INT\necho \"wlan0: AP-ENABLED\"\nwhile true; do sleep 0.1; done\n",
    )
    .unwrap();
    std::fs::set_permissions(&helper, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = ControlConfig::new("wlan0").with_timeouts(
        TimeoutConfig::new().with_ap_shutdown_timeout(Duration::from_millis(300)),
    );
    let wifi = Wireless::with_config(config);
    let ap = wifi
        .create_access_point("Lab", ApOptions::new().with_helper(&helper))
        .unwrap();
    assert_eq!(ap.shutdown_timeout(), Duration::from_millis(300));

    let mut events = ap.events();
    wait_for(&mut events, &ApEvent::Started).await;

    let started = Instant::now();
    ap.close(Signal::SIGINT).await.unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(290));
    assert!(elapsed < Duration::from_secs(4), "default timeout was used: {elapsed:?}");
    assert_eq!(ap.state(), ApState::Closed);

    kill(Pid::from_raw(ap.pid().unwrap() as i32), Signal::SIGKILL).unwrap();
}
