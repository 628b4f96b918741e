//! Turning an accepted CONNECT into a pair of raw byte streams.

use std::fmt;
use tracing::debug;

use super::{DestinationConnection, ProtocolVersion, Result, StatusCode, TunnelError};
use crate::ports::{ClientExchange, ClientSide};

/// How the client side of a tunnel is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// HTTP/1.x: take the connection away from the HTTP layer and talk raw bytes.
    Hijack,
    /// HTTP/2 and later: keep the stream, relay through request and response bodies.
    Stream,
}

impl Handshake {
    pub fn for_version(version: ProtocolVersion) -> Self {
        if version.major() == 1 {
            Handshake::Hijack
        } else {
            Handshake::Stream
        }
    }

    pub async fn run(
        self,
        exchange: &mut dyn ClientExchange,
        destination: &mut DestinationConnection,
        server_name: &str,
    ) -> Result<ClientSide> {
        match self {
            Handshake::Hijack => hijack_handshake(exchange, destination, server_name).await,
            Handshake::Stream => stream_handshake(exchange).await,
        }
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handshake::Hijack => f.write_str("hijack"),
            Handshake::Stream => f.write_str("stream"),
        }
    }
}

/// Raw status line sent on a hijacked connection.
pub fn connection_established(server_name: &str) -> String {
    format!("HTTP/1.1 200 Connection Established\r\nServer: {}\r\n\r\n", server_name)
}

/// Takes over the HTTP/1 connection.
///
/// Bytes the client pipelined behind the request head go to the destination before
/// anything else, then the 200 is written straight onto the socket.
pub async fn hijack_handshake(
    exchange: &mut dyn ClientExchange,
    destination: &mut DestinationConnection,
    server_name: &str,
) -> Result<ClientSide> {
    use tokio::io::AsyncWriteExt;

    let hijacked = exchange.hijack()?;
    let mut conn = hijacked.conn;

    if !hijacked.buffered.is_empty() {
        debug!(
            authority = destination.authority(),
            bytes = hijacked.buffered.len(),
            "forwarding pipelined bytes"
        );
        destination
            .forward(&hijacked.buffered)
            .await
            .map_err(|e| TunnelError::HandshakeFailed(format!("forwarding buffered bytes: {}", e)))?;
    }

    conn.write_all(connection_established(server_name).as_bytes())
        .await
        .map_err(|e| TunnelError::HandshakeFailed(format!("writing 200: {}", e)))?;
    conn.flush()
        .await
        .map_err(|e| TunnelError::HandshakeFailed(format!("flushing 200: {}", e)))?;

    Ok(ClientSide::from_io(conn))
}

/// Answers 200 on the request's own stream and hands back its bodies.
pub async fn stream_handshake(exchange: &mut dyn ClientExchange) -> Result<ClientSide> {
    exchange
        .write_head(StatusCode::OK)
        .await
        .map_err(|e| TunnelError::HandshakeFailed(format!("writing 200: {}", e)))?;
    exchange
        .flush()
        .await
        .map_err(|e| TunnelError::HandshakeFailed(format!("flushing 200: {}", e)))?;
    exchange
        .take_body_stream()
        .map_err(|e| TunnelError::HandshakeFailed(format!("body stream: {}", e)))
}
