use wpars::Wireless;

#[tokio::main]
async fn main() -> wpars::Result<()> {
    env_logger::init();

    let wifi = Wireless::new("wlan0");
    wifi.open().await?;

    for net in wifi.list_networks().await? {
        let marker = if net.is_current() { "*" } else { " " };
        println!("{marker} {:>3} {:30} {}", net.id, net.ssid, net.flags);
    }

    wifi.close().await;
    Ok(())
}
