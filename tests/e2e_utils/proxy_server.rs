#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use connect_proxy::adapters::{tls, CertReloader, ConnectionTracker, ListenerSettings, TcpConnector, TunnelListener};
use connect_proxy::domain::{BufferPool, TunnelService};
use connect_proxy::ports::TrackingPort;

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// In-process proxy on an ephemeral loopback port.
pub struct TestProxyServer {
    addr: SocketAddr,
    tracker: Arc<ConnectionTracker>,
    pool: BufferPool,
    _server_handle: JoinHandle<()>,
}

impl TestProxyServer {
    fn service(pool: BufferPool) -> (Arc<TunnelService>, Arc<ConnectionTracker>) {
        let tracker = Arc::new(ConnectionTracker::new());
        let tracker_port: Arc<dyn TrackingPort> = tracker.clone();
        let service = Arc::new(TunnelService::new(
            Arc::new(TcpConnector::new()),
            tracker_port,
            pool,
            "connect-proxy",
        ));
        (service, tracker)
    }

    /// Plain listener: HTTP/1.x and HTTP/2 with prior knowledge.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let pool = BufferPool::new(8);
        let (service, tracker) = Self::service(pool.clone());

        let tunnels = Arc::new(TunnelListener::new(service, ListenerSettings::default()));
        let server_handle = tokio::spawn(tunnels.serve(listener));

        Ok(Self {
            addr,
            tracker,
            pool,
            _server_handle: server_handle,
        })
    }

    /// TLS listener using the certificate in `tests/fixtures`.
    pub async fn start_tls(h2: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let pool = BufferPool::new(8);
        let (service, tracker) = Self::service(pool.clone());

        let reloader = Arc::new(CertReloader::load(
            fixture("localhost.pem"),
            fixture("localhost-key.pem"),
        )?);
        let acceptor = TlsAcceptor::from(Arc::new(tls::server_config(reloader, h2)?));

        let tunnels = Arc::new(TunnelListener::new(service, ListenerSettings::default()));
        let server_handle = tokio::spawn(tunnels.serve_tls(listener, acceptor));

        Ok(Self {
            addr,
            tracker,
            pool,
            _server_handle: server_handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

/// Reads an HTTP/1 response head byte by byte, leaving whatever follows unread.
pub async fn read_response_head<R>(reader: &mut R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed inside the response head",
            ));
        }
        head.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}
