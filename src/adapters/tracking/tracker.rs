use crate::domain::{ConnectionInfo, Result};
use crate::ports::TrackingPort;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::info;
use uuid::Uuid;

/// How long a closed tunnel stays listed before the cleanup task forgets it.
const CLOSED_RETENTION: Duration = Duration::from_secs(4);

/// Logs every tunnel and keeps the list of open ones
pub struct ConnectionTracker {
    connections: Arc<RwLock<Vec<ConnectionInfo>>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Start background cleanup task
    pub fn start_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let connections = self.connections.clone();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(250));

            loop {
                ticker.tick().await;
                purge_closed(&mut *connections.write().await, Instant::now());
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }
}

fn purge_closed(conns: &mut Vec<ConnectionInfo>, now: Instant) {
    conns.retain(|conn| match conn.closed_at {
        Some(closed_at) => now.duration_since(closed_at) < CLOSED_RETENTION,
        None => true,
    });
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingPort for ConnectionTracker {
    async fn track_connection(&self, info: ConnectionInfo) -> Result<()> {
        info!("{} {} ({})", info.method, info.target, info.protocol);

        let mut conns = self.connections.write().await;
        conns.push(info);

        Ok(())
    }

    async fn close_connection(&self, id: Uuid) -> Result<()> {
        let mut conns = self.connections.write().await;

        if let Some(conn) = conns.iter_mut().find(|c| c.id == id) {
            conn.close();
        }

        Ok(())
    }

    async fn get_active_connections(&self) -> Result<Vec<ConnectionInfo>> {
        let conns = self.connections.read().await;
        Ok(conns.iter().filter(|c| c.closed_at.is_none()).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tunnel(target: &str) -> ConnectionInfo {
        ConnectionInfo::new("CONNECT".to_string(), target.to_string(), "HTTP/1.1".to_string())
    }

    #[tokio::test]
    async fn test_track_and_close() {
        let tracker = ConnectionTracker::new();
        let first = tunnel("a.example:443");
        let second = tunnel("b.example:443");
        let first_id = first.id;

        tracker.track_connection(first).await.unwrap();
        tracker.track_connection(second).await.unwrap();
        assert_eq!(tracker.get_active_connections().await.unwrap().len(), 2);

        tracker.close_connection(first_id).await.unwrap();
        let active = tracker.get_active_connections().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].target, "b.example:443");
        // closed entries linger until the cleanup task runs
        assert_eq!(tracker.len().await, 2);
    }

    #[tokio::test]
    async fn test_close_unknown_id_is_ignored() {
        let tracker = ConnectionTracker::new();
        tracker.close_connection(Uuid::new_v4()).await.unwrap();
        assert!(tracker.get_active_connections().await.unwrap().is_empty());
    }

    #[test]
    fn test_purge_keeps_open_and_recent() {
        let open = tunnel("open:1");
        let mut recent = tunnel("recent:1");
        let mut stale = tunnel("stale:1");
        let start = Instant::now();
        stale.closed_at = Some(start);
        recent.closed_at = Some(start + Duration::from_secs(8));

        let mut conns = vec![open, recent, stale];
        purge_closed(&mut conns, start + Duration::from_secs(10));

        let targets: Vec<_> = conns.iter().map(|c| c.target.as_str()).collect();
        assert_eq!(targets, vec!["open:1", "recent:1"]);
    }
}
