//! Accept loops feeding connections to the HTTP/1 and HTTP/2 front-ends.

use hyper::body::Bytes;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

use super::http1_server::{self, Http1Settings};
use super::hyper_server::HyperTunnelAdapter;
use super::tcp::Prefixed;
use super::tls::ALPN_H2;
use crate::domain::TunnelService;
use crate::ports::TunnelIo;

/// Connection preface every HTTP/2 client sends first.
pub const H2_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

#[derive(Debug, Clone)]
pub struct ListenerSettings {
    /// Accept HTTP/2 with prior knowledge on the plain listener.
    pub h2c: bool,
    pub http1: Http1Settings,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            h2c: true,
            http1: Http1Settings::default(),
        }
    }
}

pub struct TunnelListener {
    service: Arc<TunnelService>,
    h2: Arc<HyperTunnelAdapter>,
    settings: ListenerSettings,
}

impl TunnelListener {
    pub fn new(service: Arc<TunnelService>, settings: ListenerSettings) -> Self {
        let h2 = Arc::new(HyperTunnelAdapter::new(service.clone()));
        Self { service, h2, settings }
    }

    /// Plain TCP: HTTP/1.x, or HTTP/2 when the client opens with the preface.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!("Listening on http://{}", addr);
        }
        loop {
            let stream = match accept(&listener).await {
                Some(stream) => stream,
                None => continue,
            };
            let this = self.clone();
            tokio::spawn(async move {
                this.serve_plain(stream).await;
            });
        }
    }

    /// TLS: the protocol comes from ALPN.
    pub async fn serve_tls(self: Arc<Self>, listener: TcpListener, acceptor: TlsAcceptor) {
        if let Ok(addr) = listener.local_addr() {
            info!("Listening on https://{}", addr);
        }
        loop {
            let stream = match accept(&listener).await {
                Some(stream) => stream,
                None => continue,
            };
            let this = self.clone();
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let tls = match acceptor.accept(stream).await {
                    Ok(tls) => tls,
                    Err(e) => {
                        debug!(error = %e, "TLS handshake failed");
                        return;
                    }
                };
                let h2 = tls.get_ref().1.alpn_protocol() == Some(ALPN_H2);
                if h2 {
                    this.h2.clone().serve_connection(tls).await;
                } else {
                    this.serve_http1(Box::new(tls)).await;
                }
            });
        }
    }

    async fn serve_plain(&self, mut stream: TcpStream) {
        if !self.settings.h2c {
            return self.serve_http1(Box::new(stream)).await;
        }
        let prefix = match sniff_h2_preface(&mut stream).await {
            Ok(prefix) => prefix,
            Err(e) => {
                debug!(error = %e, "connection failed before the first request");
                return;
            }
        };
        let h2 = prefix == H2_PREFACE;
        let stream = Prefixed::new(prefix, stream);
        if h2 {
            self.h2.clone().serve_connection(stream).await;
        } else {
            self.serve_http1(Box::new(stream)).await;
        }
    }

    async fn serve_http1(&self, io: Box<dyn TunnelIo>) {
        http1_server::serve_connection(self.service.clone(), io, self.settings.http1.clone()).await;
    }
}

async fn accept(listener: &TcpListener) -> Option<TcpStream> {
    match listener.accept().await {
        Ok((stream, _)) => {
            if let Err(e) = stream.set_nodelay(true) {
                debug!(error = %e, "could not set TCP_NODELAY");
            }
            Some(stream)
        }
        Err(e) => {
            // Usually out of file descriptors; give the system a moment.
            error!("accept failed: {}", e);
            tokio::time::sleep(Duration::from_millis(50)).await;
            None
        }
    }
}

/// Reads until the bytes stop matching the HTTP/2 preface, the whole preface arrived,
/// or the peer stops sending. The bytes read are returned for replay.
pub async fn sniff_h2_preface<R>(reader: &mut R) -> io::Result<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; H2_PREFACE.len()];
    let mut filled = 0;
    while filled < H2_PREFACE.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
        if buf[..filled] != H2_PREFACE[..filled] {
            break;
        }
    }
    buf.truncate(filled);
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_sniff_full_preface() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(H2_PREFACE).await.unwrap();
        client.write_all(b"\x00\x00\x00").await.unwrap();

        let prefix = sniff_h2_preface(&mut server).await.unwrap();
        assert_eq!(&prefix[..], H2_PREFACE);
    }

    #[tokio::test]
    async fn test_sniff_stops_on_http1() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"CONNECT a:1 HTTP/1.1\r\n\r\n").await.unwrap();

        let prefix = sniff_h2_preface(&mut server).await.unwrap();
        assert!(!prefix.is_empty());
        assert_ne!(&prefix[..], H2_PREFACE);
        assert!(b"CONNECT a:1 HTTP/1.1\r\n\r\n".starts_with(&prefix));
    }

    #[tokio::test]
    async fn test_sniff_short_stream() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"PRI").await.unwrap();
        drop(client);

        let prefix = sniff_h2_preface(&mut server).await.unwrap();
        assert_eq!(&prefix[..], b"PRI");
    }
}
