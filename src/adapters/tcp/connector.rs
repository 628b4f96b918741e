use async_trait::async_trait;
use std::io;
use tokio::net::TcpStream;
use tracing::debug;

use crate::ports::{ConnectorPort, TunnelIo};

/// Dials destinations directly over TCP.
///
/// One attempt per call. Name resolution and connect timeouts are left to the
/// operating system.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectorPort for TcpConnector {
    async fn connect(&self, authority: &str) -> io::Result<Box<dyn TunnelIo>> {
        let stream = TcpStream::connect(authority).await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%authority, error = %e, "could not set TCP_NODELAY");
        }
        debug!(%authority, peer = ?stream.peer_addr().ok(), "dialed");
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connects_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"hi").await.unwrap();
        });

        let mut stream = TcpConnector::new().connect(&addr.to_string()).await.unwrap();
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
        assert!(stream.capabilities().close_write);
        assert!(!stream.capabilities().flush);
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(TcpConnector::new().connect(&addr.to_string()).await.is_err());
    }
}
