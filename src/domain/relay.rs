//! Duplex byte relay between a destination and a client.
//!
//! client→destination runs on a spawned task; destination→client runs inline and
//! decides when [`relay`] returns. At that point the spawned direction is aborted and
//! both destination halves are dropped before returning, which closes the socket. Bytes
//! the client was still sending at that moment are discarded.

use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use super::pool::BufferPool;
use crate::ports::{BoxReader, ClientSide, RelayWriter, TunnelIo};

/// The live connection to the tunnel target. Dropping it closes the socket.
pub struct DestinationConnection {
    authority: String,
    stream: Box<dyn TunnelIo>,
}

impl DestinationConnection {
    pub fn new(authority: impl Into<String>, stream: Box<dyn TunnelIo>) -> Self {
        Self {
            authority: authority.into(),
            stream,
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Writes bytes to the destination ahead of the relay.
    pub async fn forward(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    fn into_halves(self) -> (BoxReader, RelayWriter) {
        let capabilities = self.stream.capabilities();
        let (reader, writer) = tokio::io::split(self.stream);
        (Box::new(reader), RelayWriter::new(writer, capabilities))
    }
}

impl fmt::Debug for DestinationConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConnection")
            .field("authority", &self.authority)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ClientToTarget,
    TargetToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToTarget => f.write_str("client->target"),
            Direction::TargetToClient => f.write_str("target->client"),
        }
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Relays until the destination→client direction ends, returning the bytes it copied.
pub async fn relay(destination: DestinationConnection, client: ClientSide, pool: BufferPool) -> io::Result<u64> {
    let authority = destination.authority.clone();
    let (target_reader, target_writer) = destination.into_halves();
    let ClientSide {
        reader: client_reader,
        writer: client_writer,
    } = client;

    let upstream = tokio::spawn(stream(
        client_reader,
        target_writer,
        pool.clone(),
        Direction::ClientToTarget,
        authority.clone(),
    ));
    let guard = AbortOnDrop(upstream.abort_handle());

    let result = stream(target_reader, client_writer, pool, Direction::TargetToClient, authority).await;

    // Wait for the aborted task to drop its halves so the destination is closed on return.
    drop(guard);
    let _ = upstream.await;
    result
}

async fn stream(
    mut reader: BoxReader,
    mut writer: RelayWriter,
    pool: BufferPool,
    direction: Direction,
    authority: String,
) -> io::Result<u64> {
    let capabilities = writer.capabilities();
    let result = {
        let mut buf = pool.lease();
        flushing_copy(&mut reader, &mut writer, capabilities.flush, &mut buf).await
    };

    if capabilities.close_write {
        if let Err(e) = writer.shutdown().await {
            trace!(%authority, %direction, error = %e, "half-close failed");
        }
    }

    match &result {
        Ok(bytes) => debug!(%authority, %direction, bytes, "stream finished"),
        Err(e) => debug!(%authority, %direction, error = %e, "stream aborted"),
    }
    result
}

/// Copies `reader` into `writer` until EOF.
///
/// With `flush` set the writer is flushed after every chunk; otherwise only once at
/// the end, like a plain buffered copy.
pub async fn flushing_copy<R, W>(reader: &mut R, writer: &mut W, flush: bool, buf: &mut [u8]) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written: u64 = 0;
    loop {
        let n = reader.read(buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        written += n as u64;
        if flush {
            writer.flush().await?;
        }
    }
    if !flush {
        writer.flush().await?;
    }
    Ok(written)
}
