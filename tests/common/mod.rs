//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};
use tokio_tungstenite::tungstenite::Message;

use view_proxy::lifecycle::Shutdown;
use view_proxy::session::ConnectionRegistry;
use view_proxy::{HttpServer, ProxyConfig};

/// A request as seen by the mock HTTP backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    /// Header names lowercased.
    pub headers: HashMap<String, String>,
}

/// Canned response from the mock HTTP backend.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

pub type RequestLog = Arc<Mutex<Vec<RecordedRequest>>>;

/// Start a programmable mock HTTP backend on an ephemeral port.
pub async fn start_http_backend<F>(respond: F) -> (SocketAddr, RequestLog)
where
    F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let respond = Arc::new(respond);

    let task_log = Arc::clone(&log);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let respond = Arc::clone(&respond);
            let log = Arc::clone(&task_log);
            tokio::spawn(async move {
                let Some(request) = read_request_head(&mut socket).await else {
                    return;
                };
                let response = respond(&request);
                log.lock().unwrap().push(request);

                let mut raw = format!("HTTP/1.1 {} Mock\r\n", response.status);
                for (name, value) in &response.headers {
                    raw.push_str(&format!("{name}: {value}\r\n"));
                }
                raw.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.body.len(),
                    response.body
                ));
                let _ = socket.write_all(raw.as_bytes()).await;
                let _ = socket.shutdown().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }
    });

    (addr, log)
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) -> Option<RecordedRequest> {
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
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    Some(RecordedRequest {
        method,
        target,
        headers,
    })
}

/// What the mock WebSocket backend saw during the handshake.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub uri: String,
    /// Header names lowercased.
    pub headers: HashMap<String, String>,
}

/// Mock WebSocket backend that echoes data frames.
///
/// A text frame `close:<code>:<reason>` makes it close the connection with
/// that code and reason instead.
pub struct WsBackend {
    pub addr: SocketAddr,
    pub handshakes: Arc<Mutex<Vec<Handshake>>>,
    /// Close frames received from the proxy.
    pub closes: Arc<Mutex<Vec<(u16, String)>>>,
}

pub async fn start_ws_backend() -> WsBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handshakes = Arc::new(Mutex::new(Vec::new()));
    let closes = Arc::new(Mutex::new(Vec::new()));

    let task_handshakes = Arc::clone(&handshakes);
    let task_closes = Arc::clone(&closes);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let handshakes = Arc::clone(&task_handshakes);
            let closes = Arc::clone(&task_closes);
            tokio::spawn(async move {
                let callback = move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
                    let headers: HashMap<String, String> = request
                        .headers()
                        .iter()
                        .map(|(name, value)| {
                            (name.as_str().to_string(), value.to_str().unwrap_or_default().to_string())
                        })
                        .collect();
                    if let Some(offered) = headers.get("sec-websocket-protocol") {
                        let chosen = offered.split(',').next().unwrap_or_default().trim();
                        response
                            .headers_mut()
                            .insert("sec-websocket-protocol", HeaderValue::from_str(chosen).unwrap());
                    }
                    handshakes.lock().unwrap().push(Handshake {
                        uri: request.uri().to_string(),
                        headers,
                    });
                    Ok(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(socket, callback).await else {
                    return;
                };

                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Text(text) if text.as_str().starts_with("close:") => {
                            let mut parts = text.as_str().splitn(3, ':').skip(1);
                            let code: u16 = parts.next().unwrap_or("1000").parse().unwrap_or(1000);
                            let reason = parts.next().unwrap_or_default().to_string();
                            let _ = ws
                                .close(Some(CloseFrame {
                                    code: CloseCode::from(code),
                                    reason: reason.into(),
                                }))
                                .await;
                        }
                        Message::Text(_) | Message::Binary(_) => {
                            if ws.send(message).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(frame) => {
                            if let Some(frame) = frame {
                                closes
                                    .lock()
                                    .unwrap()
                                    .push((u16::from(frame.code), frame.reason.as_str().to_string()));
                            }
                            // tungstenite queues the reply; the next read flushes it
                        }
                        _ => {}
                    }
                }
            });
        }
    });

    WsBackend {
        addr,
        handshakes,
        closes,
    }
}

/// Backend that accepts TCP connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// A port with nothing listening on it.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// A running proxy.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub registry: Arc<ConnectionRegistry>,
}

impl TestProxy {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Wait until every bridged session has been removed.
    pub async fn wait_for_no_sessions(&self) -> bool {
        for _ in 0..100 {
            if self.registry.is_empty() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }
}

/// Start the proxy on an ephemeral port with the given properties.
pub async fn start_proxy(properties: &[(&str, &str)]) -> TestProxy {
    let mut config = ProxyConfig::default();
    config.observability.metrics_enabled = false;
    for (key, value) in properties {
        config.properties.insert(key.to_string(), value.to_string());
    }

    let server = HttpServer::new(config).unwrap();
    let registry = Arc::clone(server.registry());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestProxy {
        addr,
        shutdown,
        registry,
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
