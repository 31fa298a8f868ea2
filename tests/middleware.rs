use proxy_can::{Protocol, ProxyAddress, ProxyPool, ProxyPoolConfig, ProxyPoolMiddleware, ProxyRecord};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Local HTTP proxy answering the n-th connection with `statuses[n]`,
/// repeating the last status once the list runs out.
async fn spawn_stub_proxy(statuses: Vec<u16>) -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let status = statuses.get(n).or(statuses.last()).copied().unwrap_or(200);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                loop {
                    match socket.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => return,
                        Ok(k) => read += k,
                    }
                    if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") || read == buf.len() {
                        break;
                    }
                }
                let response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (port, connections)
}

async fn pool_with(ports: &[u16], retry_count: usize) -> Arc<ProxyPool> {
    let config = ProxyPoolConfig::builder()
        .auto_fetch(false)
        .retry_count(retry_count)
        .check_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let pool = ProxyPool::builder(config).build().await.unwrap();
    let records = ports
        .iter()
        .map(|port| ProxyRecord::new(ProxyAddress::new(Protocol::Http, "127.0.0.1", *port).unwrap()))
        .collect();
    pool.add_proxies(records).unwrap();
    pool
}

fn client(pool: Arc<ProxyPool>) -> ClientWithMiddleware {
    ClientBuilder::new(reqwest::Client::new())
        .with(ProxyPoolMiddleware::from_pool(pool))
        .build()
}

#[tokio::test]
async fn test_server_error_is_retried_and_reported() {
    let (port, connections) = spawn_stub_proxy(vec![500, 200]).await;
    let pool = pool_with(&[port], 3).await;

    let response = client(pool.clone())
        .get("http://example.invalid/")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(connections.load(Ordering::SeqCst), 2);

    let records = pool.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].times_failed, 1);
    assert_eq!(records[0].times_succeeded, 1);
    assert_eq!(records[0].times_failed_in_row, 0);
}

#[tokio::test]
async fn test_retries_stop_at_retry_count() {
    let (port, connections) = spawn_stub_proxy(vec![503]).await;
    let pool = pool_with(&[port], 1).await;

    let response = client(pool.clone())
        .get("http://example.invalid/")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    assert_eq!(connections.load(Ordering::SeqCst), 2);

    let records = pool.snapshot();
    assert_eq!(records[0].times_failed, 2);
    assert_eq!(records[0].times_failed_in_row, 2);
    assert_eq!(records[0].times_succeeded, 0);
}

#[tokio::test]
async fn test_empty_pool_is_a_middleware_error() {
    let pool = pool_with(&[], 3).await;

    let result = client(pool).get("http://example.invalid/").send().await;
    assert!(matches!(result, Err(reqwest_middleware::Error::Middleware(_))));
}
