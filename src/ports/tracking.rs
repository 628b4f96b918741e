use crate::domain::{ConnectionInfo, Result};
use async_trait::async_trait;
use uuid::Uuid;

/// Port for tracking active tunnels
#[async_trait]
pub trait TrackingPort: Send + Sync {
    /// Register a new tunnel
    async fn track_connection(&self, info: ConnectionInfo) -> Result<()>;

    /// Mark a tunnel as closed
    async fn close_connection(&self, id: Uuid) -> Result<()>;

    /// Get all tunnels that are still open
    async fn get_active_connections(&self) -> Result<Vec<ConnectionInfo>>;
}
