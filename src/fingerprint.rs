//! Best-effort service fingerprinting for open TCP ports.
//!
//! The port probe only depends on the [`Fingerprinter`] trait; signature
//! databases can be plugged in behind it. [`BannerFingerprinter`] is the
//! built-in implementation: it reads the initial banner (sending an HTTP
//! request first on well-known web ports) and classifies it against a fixed,
//! ordered set of case-insensitive substring rules.

use crate::scanner::UNKNOWN;
use crate::types::Port;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};

/// Maximum bytes to read for a banner.
const MAX_BANNER_SIZE: usize = 1024;

/// Displayed banners are cut to this many bytes.
const MAX_DISPLAY_BANNER: usize = 256;

/// Request sent to well-known web ports, which never speak first.
const HTTP_PROBE: &[u8] = b"GET / HTTP/1.0\r\n\r\n";

/// Ordered classification rules: (needle, service, protocol).
const RULES: &[(&str, &str, &str)] = &[
    ("ssh", "SSH", "SSH"),
    ("ftp", "FTP", "FTP"),
    ("http", "HTTP", "HTTP/1.1"),
    ("smtp", "SMTP", "SMTP"),
    ("mysql", "MySQL", "MySQL"),
    ("redis", "Redis", "Redis"),
    ("mongodb", "MongoDB", "MongoDB"),
    ("postgresql", "PostgreSQL", "PostgreSQL"),
];

/// Operating system hints found in banners and `Server` headers.
const OS_HINTS: &[(&str, &str)] = &[
    ("ubuntu", "Ubuntu Linux"),
    ("debian", "Debian Linux"),
    ("centos", "CentOS Linux"),
    ("red hat", "Red Hat Linux"),
    ("freebsd", "FreeBSD"),
    ("win64", "Windows"),
    ("win32", "Windows"),
    ("windows", "Windows"),
];

/// What a fingerprinter could tell about a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMatch {
    pub service: String,
    pub protocol: String,
    pub product: Option<String>,
    pub version: Option<String>,
    pub banner: Option<String>,
    pub tls: Option<bool>,
    pub device_type: Option<String>,
    pub os: Option<String>,
}

impl ServiceMatch {
    /// Nothing identified.
    pub fn unknown() -> Self {
        Self {
            service: UNKNOWN.to_string(),
            protocol: UNKNOWN.to_string(),
            product: None,
            version: None,
            banner: None,
            tls: None,
            device_type: None,
            os: None,
        }
    }
}

/// Service identification capability consumed by the port probe.
///
/// Implementations must never fail: anything they cannot identify is
/// reported as [`ServiceMatch::unknown`].
#[async_trait]
pub trait Fingerprinter: Send + Sync {
    /// Identify the service behind an already-connected stream.
    async fn identify(&self, stream: TcpStream, port: Port) -> ServiceMatch;
}

/// Banner-reading fingerprinter with substring classification.
#[derive(Debug, Clone)]
pub struct BannerFingerprinter {
    read_timeout: Duration,
}

impl BannerFingerprinter {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl Default for BannerFingerprinter {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Fingerprinter for BannerFingerprinter {
    async fn identify(&self, mut stream: TcpStream, port: Port) -> ServiceMatch {
        let deadline = Instant::now() + self.read_timeout;

        if is_http_port(port.as_u16()) && stream.write_all(HTTP_PROBE).await.is_err() {
            return ServiceMatch::unknown();
        }

        let reply = read_reply(&mut stream, deadline).await;
        if reply.is_empty() {
            return ServiceMatch::unknown();
        }
        classify(&reply)
    }
}

/// Read until the peer stops talking, the buffer fills, or the deadline passes.
async fn read_reply(stream: &mut TcpStream, deadline: Instant) -> Vec<u8> {
    let mut reply = Vec::with_capacity(MAX_BANNER_SIZE);
    let mut buffer = [0u8; MAX_BANNER_SIZE];

    while reply.len() < MAX_BANNER_SIZE {
        match timeout_at(deadline, stream.read(&mut buffer)).await {
            Ok(Ok(n)) if n > 0 => {
                let take = n.min(MAX_BANNER_SIZE - reply.len());
                reply.extend_from_slice(&buffer[..take]);
                // A full line is all a line-oriented banner offers; HTTP
                // replies are read through the end of their headers.
                if is_complete(&reply) {
                    break;
                }
            }
            _ => break,
        }
    }

    reply
}

fn is_complete(reply: &[u8]) -> bool {
    if reply.starts_with(b"HTTP/") {
        reply.windows(4).any(|w| w == b"\r\n\r\n") || reply.windows(2).any(|w| w == b"\n\n")
    } else {
        reply.contains(&b'\n')
    }
}

/// Classify a raw reply.
pub fn classify(reply: &[u8]) -> ServiceMatch {
    let mut found = ServiceMatch::unknown();

    if is_tls_record(reply) {
        found.tls = Some(true);
        return found;
    }

    let text = String::from_utf8_lossy(reply);
    let first_line = text.lines().next().unwrap_or_default();
    let banner = sanitize_banner(first_line.as_bytes());
    if banner.is_empty() {
        return found;
    }

    let lowered = banner.to_lowercase();
    if let Some((_, service, protocol)) = RULES.iter().find(|(needle, _, _)| lowered.contains(needle))
    {
        found.service = service.to_string();
        found.protocol = protocol.to_string();
    }

    let details = match found.service.as_str() {
        "SSH" => parse_ssh_banner(&banner),
        "HTTP" => server_header(&text).map(|value| parse_server_header(&value)),
        _ => None,
    };
    if let Some((product, version, os)) = details {
        found.product = product;
        found.version = version;
        found.os = os;
    }
    if found.os.is_none() {
        found.os = os_hint(&lowered);
    }

    found.banner = Some(banner);
    found
}

type Details = (Option<String>, Option<String>, Option<String>);

/// `SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.1` -> (OpenSSH, 8.9p1, Ubuntu Linux)
fn parse_ssh_banner(banner: &str) -> Option<Details> {
    let rest = banner.splitn(3, '-').nth(2)?;
    let (software, comments) = rest.split_once(' ').unwrap_or((rest, ""));
    let (product, version) = match software.split_once('_') {
        Some((p, v)) => (p, Some(v.to_string())),
        None => (software, None),
    };
    Some((
        non_empty(product),
        version,
        os_hint(&comments.to_lowercase()),
    ))
}

fn server_header(text: &str) -> Option<String> {
    text.lines()
        .skip(1)
        .take_while(|line| !line.trim().is_empty())
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("server")
                .then(|| value.trim().to_string())
        })
}

/// `Apache/2.4.41 (Ubuntu)` -> (Apache, 2.4.41, Ubuntu Linux)
fn parse_server_header(value: &str) -> Details {
    let token = value.split_whitespace().next().unwrap_or_default();
    let (product, version) = match token.split_once('/') {
        Some((p, v)) => (p, non_empty(v)),
        None => (token, None),
    };
    (non_empty(product), version, os_hint(&value.to_lowercase()))
}

fn os_hint(lowered: &str) -> Option<String> {
    OS_HINTS
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, os)| os.to_string())
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// TLS alert or handshake record header.
fn is_tls_record(reply: &[u8]) -> bool {
    matches!(reply, [0x15 | 0x16, 0x03, ..])
}

/// Check if a port is commonly used for HTTP services.
pub fn is_http_port(port: u16) -> bool {
    matches!(
        port,
        80 | 443 | 8000 | 8008 | 8080 | 8081 | 8082 | 8083 | 8443 | 8888 | 9000 | 9090
    )
}

/// Sanitize banner by removing non-printable characters and limiting length.
fn sanitize_banner(data: &[u8]) -> String {
    let s: String = data
        .iter()
        .take(MAX_DISPLAY_BANNER)
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else if b == b'\r' || b == b'\n' || b == b'\t' {
                ' '
            } else {
                '.'
            }
        })
        .collect();

    // Collapse multiple spaces and trim
    let mut result = String::with_capacity(s.len());
    let mut prev_space = false;
    for c in s.chars() {
        if c == ' ' {
            if !prev_space {
                result.push(c);
            }
            prev_space = true;
        } else {
            result.push(c);
            prev_space = false;
        }
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_classify_ssh_banner() {
        let found = classify(b"SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.1\r\n");
        assert_eq!(found.service, "SSH");
        assert_eq!(found.protocol, "SSH");
        assert_eq!(found.product.as_deref(), Some("OpenSSH"));
        assert_eq!(found.version.as_deref(), Some("8.9p1"));
        assert_eq!(found.os.as_deref(), Some("Ubuntu Linux"));
        assert_eq!(
            found.banner.as_deref(),
            Some("SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.1")
        );
    }

    #[test]
    fn test_classify_http_reply_uses_server_header() {
        let reply = b"HTTP/1.1 200 OK\r\nServer: Apache/2.4.41 (Ubuntu)\r\nContent-Length: 0\r\n\r\n";
        let found = classify(reply);
        assert_eq!(found.service, "HTTP");
        assert_eq!(found.protocol, "HTTP/1.1");
        assert_eq!(found.product.as_deref(), Some("Apache"));
        assert_eq!(found.version.as_deref(), Some("2.4.41"));
        assert_eq!(found.os.as_deref(), Some("Ubuntu Linux"));
    }

    #[test]
    fn test_classify_is_case_insensitive_and_ordered() {
        assert_eq!(classify(b"220 ProFTPD Server ready\r\n").service, "FTP");
        assert_eq!(classify(b"220 mail ESMTP Postfix\r\n").service, "SMTP");
        assert_eq!(classify(b"-ERR unknown command, redis\r\n").service, "Redis");
        // "ssh" wins over "http" when both appear
        assert_eq!(classify(b"ssh over http tunnel\n").service, "SSH");
    }

    #[test]
    fn test_classify_unknown_banner() {
        let found = classify(b"\x00\x01Hello\x02World\x03\n");
        assert_eq!(found.service, "unknown");
        assert_eq!(found.protocol, "unknown");
        assert_eq!(found.banner.as_deref(), Some("..Hello.World."));
    }

    #[test]
    fn test_classify_tls_record() {
        let found = classify(&[0x15, 0x03, 0x03, 0x00, 0x02, 0x02, 0x46]);
        assert_eq!(found.tls, Some(true));
        assert_eq!(found.service, "unknown");
        assert!(found.banner.is_none());
    }

    #[test]
    fn test_is_http_port() {
        assert!(is_http_port(80));
        assert!(is_http_port(8080));
        assert!(!is_http_port(22));
    }

    #[tokio::test]
    async fn test_identify_reads_banner_from_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"SSH-2.0-dropbear_2022.83\r\n").await.unwrap();
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let found = BannerFingerprinter::new(Duration::from_secs(2))
            .identify(stream, Port::new(addr.port()).unwrap())
            .await;
        assert_eq!(found.service, "SSH");
        assert_eq!(found.product.as_deref(), Some("dropbear"));
        assert_eq!(found.version.as_deref(), Some("2022.83"));
    }

    #[tokio::test]
    async fn test_identify_silent_service_is_unknown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let found = BannerFingerprinter::new(Duration::from_millis(100))
            .identify(stream, Port::new(addr.port()).unwrap())
            .await;
        assert_eq!(found, ServiceMatch::unknown());
    }
}
