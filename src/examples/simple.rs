//! Simple example of using proxy-can.

use proxy_can::{ProxyPool, ProxyPoolConfig, ProxyPoolMiddleware, ProxyPreferences, Protocol};
use reqwest_middleware::ClientBuilder;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Initializing proxy pool...");

    let config = ProxyPoolConfig::builder()
        // free proxy lists, JSON or one `scheme://ip:port` per line
        .sources(vec![
            "https://cdn.jsdelivr.net/gh/proxifly/free-proxy-list@main/proxies/all/data.json",
            "https://cdn.jsdelivr.net/gh/dpangestuw/Free-Proxy@main/socks5_proxies.txt",
        ])
        .data_file("proxy_data.json")
        .preferences(ProxyPreferences::any().protocols([Protocol::Http, Protocol::Socks5]))
        .check_timeout(Duration::from_secs(5))
        .check_url("https://httpbin.org/ip")
        .max_proxies(Some(20))
        .retry_count(2)
        .build()?;

    let pool = ProxyPool::new(config).await?;

    // hand out a proxy directly and report how it went
    let proxy = pool.get_proxy().await?;
    println!("Got proxy {}", proxy.address);
    pool.feedback(true);

    let client = ClientBuilder::new(reqwest::Client::new())
        .with(ProxyPoolMiddleware::from_pool(pool))
        .build();

    println!("Sending request...");
    let response = client.get("https://httpbin.org/ip").send().await?;

    println!("Status: {}", response.status());
    println!("Response: {}", response.text().await?);

    Ok(())
}
