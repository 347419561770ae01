//! Example connecting to a network and waiting for the association.
//!
//! Usage: `connect <ssid> [password]`. The password may also be given in
//! `WIFI_PASSWORD`.

use std::time::Duration;
use wpars::{ConnectOptions, ControlConfig, EventKind, TimeoutConfig, Wireless};

#[tokio::main]
async fn main() -> wpars::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let ssid = args.next().unwrap_or_else(|| "MyNetwork".to_string());
    let password = args.next().or_else(|| std::env::var("WIFI_PASSWORD").ok());

    // Slow access points may take a while to finish a scan
    let config = ControlConfig::new("wlan0")
        .with_timeouts(TimeoutConfig::new().with_scan_timeout(Duration::from_secs(10)));
    let wifi = Wireless::with_config(config);
    wifi.open().await?;

    let id = wifi
        .connect(&ssid, password.as_deref(), ConnectOptions::default())
        .await?;
    println!("Profile {id} selected, waiting for association...");

    match wifi.wait_for(EventKind::Connected, Duration::from_secs(30)).await? {
        Some(event) => println!("Connected: {}", event.raw),
        None => println!("No connection after 30s"),
    }

    let status = wifi.status().await?;
    println!(
        "state={} ssid={} ip={}",
        status.wpa_state().unwrap_or("?"),
        status.ssid().unwrap_or("-"),
        status.ip_address().unwrap_or("-")
    );

    wifi.close().await;
    Ok(())
}
