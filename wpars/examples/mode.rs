use wpars::Wireless;

#[tokio::main]
async fn main() -> wpars::Result<()> {
    env_logger::init();

    let wifi = Wireless::new("wlan0");
    wifi.open().await?;

    println!("connected: {}", wifi.connected().await?);
    println!("mode:      {}", wifi.mode().await?);

    wifi.close().await;
    Ok(())
}
