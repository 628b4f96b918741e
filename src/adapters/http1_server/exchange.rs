use async_trait::async_trait;
use hyper::body::Bytes;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};

use crate::adapters::tcp::Prefixed;
use crate::domain::{HijackError, ProtocolVersion, StatusCode};
use crate::ports::{ClientExchange, ClientSide, Hijacked, TunnelIo};

pub(super) type Conn = BufReader<Box<dyn TunnelIo>>;

/// One request on an HTTP/1 connection.
///
/// Responses are written straight onto the socket. The connection can be hijacked,
/// after which nothing else may be written through the exchange.
pub struct Http1Exchange {
    conn: Option<Conn>,
    version: ProtocolVersion,
    keep_alive: bool,
    server_name: String,
    pending: Vec<u8>,
}

impl Http1Exchange {
    pub(super) fn new(conn: Conn, version: ProtocolVersion, keep_alive: bool, server_name: String) -> Self {
        Self {
            conn: Some(conn),
            version,
            keep_alive,
            server_name,
            pending: Vec::new(),
        }
    }

    /// Gives the connection back for the next request, unless it was taken over or must
    /// be closed.
    pub(super) fn into_reusable(self) -> Option<Conn> {
        if self.keep_alive {
            self.conn
        } else {
            None
        }
    }

    fn conn_mut(&mut self) -> io::Result<&mut Conn> {
        self.conn
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection was hijacked"))
    }
}

fn status_line(version: ProtocolVersion, status: StatusCode) -> String {
    let proto = if version == ProtocolVersion::Http10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    };
    format!(
        "{} {} {}\r\n",
        proto,
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )
}

/// Writes a complete plain-text response, in the shape Go's `http.Error` produces.
pub(super) async fn write_plain_response<W>(
    writer: &mut W,
    version: ProtocolVersion,
    status: StatusCode,
    message: &str,
    keep_alive: bool,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let body = format!("{}\n", message);
    let mut response = status_line(version, status);
    response.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    response.push_str("X-Content-Type-Options: nosniff\r\n");
    response.push_str(&format!("Content-Length: {}\r\n", body.len()));
    if !keep_alive {
        response.push_str("Connection: close\r\n");
    }
    response.push_str("\r\n");
    response.push_str(&body);

    writer.write_all(response.as_bytes()).await?;
    writer.flush().await
}

#[async_trait]
impl ClientExchange for Http1Exchange {
    async fn write_error(&mut self, status: StatusCode, message: &str) -> io::Result<()> {
        let version = self.version;
        let keep_alive = self.keep_alive;
        let conn = self.conn_mut()?;
        write_plain_response(conn.get_mut(), version, status, message, keep_alive).await
    }

    async fn write_head(&mut self, status: StatusCode) -> io::Result<()> {
        let mut head = status_line(self.version, status);
        head.push_str(&format!("Server: {}\r\n\r\n", self.server_name));
        self.pending.extend_from_slice(head.as_bytes());
        // A response without a length ends with the connection.
        self.keep_alive = false;
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        let pending = std::mem::take(&mut self.pending);
        let conn = self.conn_mut()?.get_mut();
        conn.write_all(&pending).await?;
        conn.flush().await
    }

    fn take_body_stream(&mut self) -> io::Result<ClientSide> {
        if !self.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::Other, "response head not flushed"));
        }
        let conn = self
            .conn
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "body stream already taken"))?;
        let buffered = Bytes::copy_from_slice(conn.buffer());
        Ok(ClientSide::from_io(Prefixed::new(buffered, conn.into_inner())))
    }

    fn hijack(&mut self) -> Result<Hijacked, HijackError> {
        let conn = self.conn.take().ok_or(HijackError::AlreadyHijacked)?;
        let buffered = Bytes::copy_from_slice(conn.buffer());
        Ok(Hijacked {
            conn: conn.into_inner(),
            buffered,
        })
    }
}
