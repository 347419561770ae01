use wpars::Wireless;

#[tokio::main]
async fn main() -> wpars::Result<()> {
    env_logger::init();

    let iface = std::env::args().nth(1).unwrap_or_else(|| "wlan0".to_string());
    let wifi = Wireless::new(iface);
    wifi.open().await?;

    println!("Scanning for WiFi networks...");
    let hotspots = wifi.scan().await?;

    for hs in hotspots {
        println!(
            "{:30} {:17} ch {:>3} {} {}",
            hs.ssid,
            hs.bssid,
            hs.channel().map(|c| c.to_string()).unwrap_or_default(),
            hs.bars(),
            if hs.secured() { "secured" } else { "open" }
        );
    }

    wifi.close().await;
    Ok(())
}
