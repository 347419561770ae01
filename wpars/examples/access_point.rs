//! Runs an access point until Ctrl-C, then shuts it down gracefully.

use wpars::{AccessPoint, ApEvent, ApOptions};

#[tokio::main]
async fn main() -> wpars::Result<()> {
    env_logger::init();

    let mut options = ApOptions::new().with_iface("wlan0");
    if let Ok(password) = std::env::var("AP_PASSWORD") {
        options = options.with_password(password);
    }
    if let Ok(sharing) = std::env::var("AP_SHARE") {
        options = options.with_sharing(sharing);
    }

    let ap = AccessPoint::create("", options)?;
    println!("Launched {} (pid {:?})", ap.name(), ap.pid());
    let mut events = ap.events();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ApEvent::Started) => println!("Access point is up"),
                Ok(ApEvent::Stdout(out)) => print!("{out}"),
                Ok(ApEvent::Stderr(err)) => eprint!("{err}"),
                Ok(ApEvent::Close) | Err(_) => break,
                Ok(ApEvent::Error(e)) => eprintln!("error: {e}"),
            },
            _ = tokio::signal::ctrl_c() => {
                ap.close(AccessPoint::DEFAULT_CLOSE_SIGNAL).await?;
                println!("Access point closed");
                break;
            }
        }
    }

    Ok(())
}
