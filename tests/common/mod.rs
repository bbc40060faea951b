//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use domain_gate::config::ProxyConfig;
use domain_gate::{HttpServer, Shutdown};

/// Request head as seen by a mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Canned response from a mock server.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
    pub cache_control: Option<String>,
}

impl MockResponse {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            cache_control: None,
        }
    }

    pub fn max_age(mut self, secs: i64) -> Self {
        self.cache_control = Some(format!("public, max-age={}", secs));
        self
    }
}

async fn read_head(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf).to_string();
    let mut lines = head.split("\r\n");
    let target = lines.next()?.split_whitespace().nth(1)?.to_string();
    let headers = lines
        .take_while(|l| !l.is_empty())
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    Some(RecordedRequest { target, headers })
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        418 => "I'm a teapot",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Start a programmable mock server on an ephemeral port.
///
/// Every request head is also sent on the returned channel.
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, mpsc::UnboundedReceiver<RecordedRequest>)
where
    F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let Some(request) = read_head(&mut socket).await else { return };
                let _ = tx.send(request.clone());
                let response = f(request).await;

                let mut raw = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                    response.status,
                    status_text(response.status),
                    response.body.len()
                );
                if let Some(cc) = &response.cache_control {
                    raw.push_str(&format!("Cache-Control: {}\r\n", cc));
                }
                raw.push_str("\r\n");
                raw.push_str(&response.body);

                let _ = socket.write_all(raw.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

/// Lookup service that always gives the same answer.
pub async fn start_lookup_service(response: MockResponse) -> (SocketAddr, mpsc::UnboundedReceiver<RecordedRequest>) {
    start_programmable_backend(move |_| {
        let response = response.clone();
        async move { response }
    })
    .await
}

/// Upstream that echoes the received `x-domain-id` header (or "none").
pub async fn start_echo_upstream() -> SocketAddr {
    let (addr, _) = start_programmable_backend(|req| async move {
        MockResponse::new(200, req.header("x-domain-id").unwrap_or("none"))
    })
    .await;
    addr
}

/// Start the gateway in front of `upstream`, resolving through `lookup_url`.
pub async fn start_gateway(lookup_url: &str, upstream: SocketAddr, default_ttl_secs: u64) -> (SocketAddr, Shutdown) {
    let mut config = ProxyConfig::default();
    config.upstream.address = upstream.to_string();
    config.lookup.service_url = lookup_url.to_string();
    config.lookup.url_path = "/api/domain".to_string();
    config.lookup.default_ttl_secs = default_ttl_secs;
    config.observability.metrics_enabled = false;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (_updates_tx, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        // Keep the sender alive so the reload loop keeps waiting.
        let _updates_tx = _updates_tx;
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}

/// Client that neither follows redirects nor pools connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
