//! Test doubles: an event recorder and minimal local HTTP servers.

use crate::events::{EventSink, ScanEvent, ScanSummary};
use crate::job::{JobKind, ScanStatus};
use crate::progress::ProgressSnapshot;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Sink that keeps every event in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ScanEvent>>,
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ScanEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(ScanEvent::name).collect()
    }

    pub fn statuses(&self, of: JobKind) -> Vec<ScanStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ScanEvent::Status { kind, status } if kind == of => Some(status),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self, of: JobKind) -> Vec<ProgressSnapshot> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ScanEvent::Progress { kind, snapshot } if kind == of => Some(snapshot),
                _ => None,
            })
            .collect()
    }

    pub fn summary(&self, of: JobKind) -> Option<ScanSummary> {
        self.events().into_iter().find_map(|e| match e {
            ScanEvent::Complete { kind, summary } if kind == of => Some(summary),
            _ => None,
        })
    }

    pub fn found_ports(&self) -> Vec<u16> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ScanEvent::PortFound(result) => Some(result.port.as_u16()),
                _ => None,
            })
            .collect()
    }

    pub fn found_paths(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ScanEvent::PathFound(result) => Some(result.path),
                _ => None,
            })
            .collect()
    }
}

/// Serve fixed statuses per path; anything else is a 404.
pub async fn spawn_http_server(routes: &[(&str, u16)]) -> SocketAddr {
    let routes: HashMap<String, u16> = routes
        .iter()
        .map(|(path, status)| (path.to_string(), *status))
        .collect();
    serve(Arc::new(move |path: &str| routes.get(path).copied().unwrap_or(404)), Duration::ZERO).await
}

/// Like [`spawn_http_server`], also counting the requests served.
pub async fn spawn_counted_http_server(routes: &[(&str, u16)]) -> (SocketAddr, Arc<AtomicUsize>) {
    let routes: HashMap<String, u16> = routes
        .iter()
        .map(|(path, status)| (path.to_string(), *status))
        .collect();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let router = move |path: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
        routes.get(path).copied().unwrap_or(404)
    };
    (serve(Arc::new(router), Duration::ZERO).await, hits)
}

/// Accept every connection and reset it at once. Returns the accept count.
pub async fn spawn_reset_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            // Zero linger turns the close into an RST
            #[allow(deprecated)]
            let _ = socket.set_linger(Some(Duration::ZERO));
            drop(socket);
        }
    });

    (addr, accepted)
}

/// Write `response` verbatim after reading each request head.
pub async fn spawn_raw_http_server(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_request_head(&mut socket).await.is_some() {
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });
        }
    });

    addr
}

/// Answer 200 to every request after `delay`.
pub async fn spawn_slow_http_server(delay: Duration) -> SocketAddr {
    serve(Arc::new(|_: &str| 200), delay).await
}

type Router = Arc<dyn Fn(&str) -> u16 + Send + Sync>;

async fn serve(router: Router, delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                respond(socket, router, delay).await;
            });
        }
    });

    addr
}

async fn read_request_head(socket: &mut TcpStream) -> Option<Vec<u8>> {
    let mut request = Vec::new();
    let mut buffer = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buffer).await {
            Ok(n) if n > 0 => request.extend_from_slice(&buffer[..n]),
            _ => return None,
        }
    }
    Some(request)
}

async fn respond(mut socket: TcpStream, router: Router, delay: Duration) {
    let Some(request) = read_request_head(&mut socket).await else {
        return;
    };

    let head = String::from_utf8_lossy(&request);
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    let status = router(&path);

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let reason = match status {
        200 => "OK",
        301 => "Moved Permanently",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    };
    let location = if (300..400).contains(&status) {
        "Location: /\r\n"
    } else {
        ""
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html\r\nContent-Length: 2\r\n{}Connection: close\r\n\r\nok",
        status, reason, location
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}
