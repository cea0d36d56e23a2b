#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use pinpost_core::Listener;
use pinpost_domain::{NetworkError, NetworkResponse};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

pub const ROOT_PEM: &str = include_str!("fixtures/root.pem");
pub const ROGUE_PEM: &str = include_str!("fixtures/rogue.pem");
pub const SERVER_PEM: &str = include_str!("fixtures/server.pem");
pub const SERVER_KEY: &str = include_str!("fixtures/server.key");
pub const CHAINED_SERVER_PEM: &str = include_str!("fixtures/chained_server.pem");
pub const CHAINED_SERVER_KEY: &str = include_str!("fixtures/chained_server.key");
pub const INTERMEDIATE_PINNED_PEM: &str = include_str!("fixtures/intermediate_pinned.pem");
pub const INTERMEDIATE_IMPOSTOR_PEM: &str = include_str!("fixtures/intermediate_impostor.pem");

pub const ROOT_PIN: &str = "498jflVPDH2S0fIwgcONZwt9BDq+6R5YAOkV2qOfg+M=";
pub const ROGUE_PIN: &str = "pwrqA5K/AAlseNR7/GbGvOZoqeY/vwpEq5emmuqpnBw=";
pub const SERVER_PIN: &str = "KxsIOrNW6vPlpa55gwxdGmA22MMZuVyu2/qiJTf4Zp4=";
/// Intermediate issued by the rogue root.
pub const INTERMEDIATE_PINNED_PIN: &str = "8wxlPz2DuFU53B3JeUcQ4ckWznf9PJmoGgvKIUg+fvE=";
/// Same subject as the pinned intermediate, issued by the test root; it
/// signed `chained_server.pem`.
pub const INTERMEDIATE_IMPOSTOR_PIN: &str = "t4T8JdDNFS9IXxi2BUEBUISzEM/DPJgiESkZLE4LRg8=";

pub const TLS_RESPONSE_BODY: &str = r#"{"meta":{"session_id":"sess-tls"},"object":{"ok":true}}"#;

/// In-process HTTPS server, by default presenting the `localhost` leaf signed
/// by the test root. Answers every request with [`TLS_RESPONSE_BODY`].
pub struct TlsTestServer {
    pub port: u16,
    handshakes: Arc<AtomicUsize>,
    received: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl TlsTestServer {
    pub async fn start() -> Self {
        Self::start_presenting(SERVER_PEM, SERVER_KEY).await
    }

    /// Serve `chain_pem` (leaf first, then any intermediates) with `key_pem`.
    pub async fn start_presenting(chain_pem: &str, key_pem: &str) -> Self {
        let acceptor = TlsAcceptor::from(Arc::new(server_config(chain_pem, key_pem)));
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let port = listener.local_addr().expect("local addr").port();
        let handshakes = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(AtomicBool::new(false));

        let task = {
            let handshakes = Arc::clone(&handshakes);
            let received = Arc::clone(&received);
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else { break };
                    handshakes.fetch_add(1, Ordering::SeqCst);
                    let acceptor = acceptor.clone();
                    let received = Arc::clone(&received);
                    tokio::spawn(async move {
                        let Ok(mut tls) = acceptor.accept(stream).await else { return };
                        let Some(request_len) = read_request(&mut tls).await else { return };
                        if request_len > 0 {
                            received.store(true, Ordering::SeqCst);
                        }
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            TLS_RESPONSE_BODY.len(),
                            TLS_RESPONSE_BODY
                        );
                        let _ = tls.write_all(response.as_bytes()).await;
                        let _ = tls.shutdown().await;
                    });
                }
            })
        };

        Self { port, handshakes, received, task }
    }

    pub fn url(&self) -> String {
        format!("https://127.0.0.1:{}", self.port)
    }

    /// TCP connections accepted (one per TLS handshake attempt).
    pub fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    /// Whether any application data arrived over an established session.
    pub fn received_request(&self) -> bool {
        self.received.load(Ordering::SeqCst)
    }
}

impl Drop for TlsTestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn server_config(chain_pem: &str, key_pem: &str) -> ServerConfig {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut chain_pem.as_bytes())
        .collect::<Result<_, _>>()
        .expect("server certificate");
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_pem.as_bytes())
        .expect("server key")
        .expect("server key present");

    ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .expect("protocol versions")
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .expect("server config")
}

/// Read one HTTP/1.1 request (headers plus `Content-Length` body).
async fn read_request<S: AsyncReadExt + Unpin>(stream: &mut S) -> Option<usize> {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return Some(buf.len());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Some(buf.len())
}

/// Forwards task outcomes into a channel.
pub struct ChannelListener(pub mpsc::UnboundedSender<Result<NetworkResponse, NetworkError>>);

impl ChannelListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Result<NetworkResponse, NetworkError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self(tx)), rx)
    }
}

impl Listener<NetworkResponse> for ChannelListener {
    fn on_complete(&self, response: NetworkResponse) {
        let _ = self.0.send(Ok(response));
    }

    fn on_error(&self, error: NetworkError) {
        let _ = self.0.send(Err(error));
    }
}
