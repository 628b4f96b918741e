use super::tunnel::TunnelIo;
use async_trait::async_trait;
use std::io;

/// Port for opening the destination side of a tunnel
#[async_trait]
pub trait ConnectorPort: Send + Sync {
    /// Connect to `authority` (`host:port`) exactly once, without retries
    async fn connect(&self, authority: &str) -> io::Result<Box<dyn TunnelIo>>;
}
