//! Prints supplicant events as they happen until `wpa_cli` exits or
//! Ctrl-C is pressed.

use wpars::{Monitor, MonitorEvent};

#[tokio::main]
async fn main() -> wpars::Result<()> {
    env_logger::init();

    let iface = std::env::args().nth(1).unwrap_or_else(|| "wlan0".to_string());
    let monitor = Monitor::spawn(&iface)?;
    let mut events = monitor.events();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(MonitorEvent::Control(ev)) => println!("[{}] {}", ev.name(), ev.raw),
                Ok(MonitorEvent::Error(line)) => eprintln!("wpa_cli: {line}"),
                Ok(MonitorEvent::Closed(code)) => {
                    println!("wpa_cli exited ({code:?})");
                    break;
                }
                Ok(MonitorEvent::Data(_)) => {}
                Err(_) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                monitor.close().await;
                break;
            }
        }
    }

    Ok(())
}
