use crate::domain::{HijackError, StatusCode};
use async_trait::async_trait;
use hyper::body::Bytes;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite};

/// Optional behaviours of a write side, checked per writer at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCapabilities {
    /// Small writes are held back until flushed, so the relay flushes after every write.
    pub flush: bool,
    /// `shutdown` signals end of output while the read side stays open.
    pub close_write: bool,
}

impl WriteCapabilities {
    pub const RAW_SOCKET: WriteCapabilities = WriteCapabilities {
        flush: false,
        close_write: true,
    };

    pub const STREAM: WriteCapabilities = WriteCapabilities {
        flush: true,
        close_write: true,
    };
}

/// A bidirectional byte stream that can carry one side of a tunnel.
pub trait TunnelIo: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    fn capabilities(&self) -> WriteCapabilities {
        WriteCapabilities::default()
    }
}

impl TunnelIo for Box<dyn TunnelIo> {
    fn capabilities(&self) -> WriteCapabilities {
        (**self).capabilities()
    }
}

impl TunnelIo for tokio::io::DuplexStream {
    fn capabilities(&self) -> WriteCapabilities {
        WriteCapabilities::RAW_SOCKET
    }
}

pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write side of a tunnel endpoint, tagged with what it can do beyond `write`.
pub struct RelayWriter {
    inner: Box<dyn AsyncWrite + Send + Unpin>,
    capabilities: WriteCapabilities,
}

impl RelayWriter {
    pub fn new<W>(inner: W, capabilities: WriteCapabilities) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Box::new(inner),
            capabilities,
        }
    }

    pub fn capabilities(&self) -> WriteCapabilities {
        self.capabilities
    }
}

impl AsyncWrite for RelayWriter {
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

/// The client end of a tunnel, as seen by the relay.
pub struct ClientSide {
    pub reader: BoxReader,
    pub writer: RelayWriter,
}

impl ClientSide {
    pub fn new<R>(reader: R, writer: RelayWriter) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer,
        }
    }

    /// Uses one stream as both reader and writer.
    pub fn from_io<T: TunnelIo>(io: T) -> Self {
        let capabilities = io.capabilities();
        let (reader, writer) = tokio::io::split(io);
        Self::new(reader, RelayWriter::new(writer, capabilities))
    }
}

/// A connection taken over from the HTTP layer.
pub struct Hijacked {
    pub conn: Box<dyn TunnelIo>,
    /// Bytes the HTTP layer had already read past the request head.
    pub buffered: Bytes,
}

/// The response side of one inbound request, plus access to its body streams.
///
/// HTTP/1 connections can additionally be hijacked; other transports keep the
/// default implementation, which refuses.
#[async_trait]
pub trait ClientExchange: Send {
    /// Sends a complete response with a short plain-text body.
    async fn write_error(&mut self, status: StatusCode, message: &str) -> io::Result<()>;

    /// Sends the response head. Body bytes may follow through [`take_body_stream`].
    ///
    /// [`take_body_stream`]: ClientExchange::take_body_stream
    async fn write_head(&mut self, status: StatusCode) -> io::Result<()>;

    /// Pushes the response head (and any buffered body bytes) to the client.
    async fn flush(&mut self) -> io::Result<()>;

    /// Request body as reader, response body as writer. Available once, after the head.
    fn take_body_stream(&mut self) -> io::Result<ClientSide>;

    fn hijack(&mut self) -> std::result::Result<Hijacked, HijackError> {
        Err(HijackError::NotSupported)
    }
}
