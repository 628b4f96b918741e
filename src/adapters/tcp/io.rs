//! Stream types that can carry a tunnel, and what their write sides support.

use hyper::body::Bytes;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::ports::{TunnelIo, WriteCapabilities};

impl TunnelIo for TcpStream {
    fn capabilities(&self) -> WriteCapabilities {
        WriteCapabilities::RAW_SOCKET
    }
}

// Plaintext sits in the rustls session until flushed, so small writes need an explicit
// flush to reach the peer.
impl<IO> TunnelIo for tokio_rustls::server::TlsStream<IO>
where
    IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    fn capabilities(&self) -> WriteCapabilities {
        WriteCapabilities::STREAM
    }
}

/// A stream whose first bytes were already read, replayed before the rest.
#[derive(Debug)]
pub struct Prefixed<T> {
    prefix: Bytes,
    inner: T,
}

impl<T> Prefixed<T> {
    pub fn new(prefix: Bytes, inner: T) -> Self {
        Self { prefix, inner }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for Prefixed<T> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if !self.prefix.is_empty() {
            let n = self.prefix.len().min(buf.remaining());
            let chunk = self.prefix.split_to(n);
            buf.put_slice(&chunk);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Prefixed<T> {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl<T: TunnelIo> TunnelIo for Prefixed<T> {
    fn capabilities(&self) -> WriteCapabilities {
        self.inner.capabilities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_prefix_is_read_first() {
        let (inner, mut peer) = duplex(64);
        let mut stream = Prefixed::new(Bytes::from_static(b"PRI "), inner);

        peer.write_all(b"rest").await.unwrap();
        drop(peer);

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"PRI rest");
    }

    #[tokio::test]
    async fn test_prefix_respects_small_reads() {
        let (inner, _peer) = duplex(64);
        let mut stream = Prefixed::new(Bytes::from_static(b"abcdef"), inner);

        let mut buf = [0u8; 4];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"abcd");
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ef");
    }

    #[test]
    fn test_capabilities_pass_through() {
        let (inner, _peer) = duplex(8);
        let stream = Prefixed::new(Bytes::new(), inner);
        assert_eq!(stream.capabilities(), WriteCapabilities::RAW_SOCKET);
    }
}
