use std::sync::Arc;
use tracing::{debug, info, warn};

use super::relay::{relay, DestinationConnection};
use super::{
    BufferPool, ConnectionInfo, Handshake, Method, Result, StatusCode, TunnelError, TunnelRequest, TunnelState,
};
use crate::ports::{ClientExchange, ClientSide, ConnectorPort, TrackingPort};

pub const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method not allowed";
pub const DIAL_FAILED_MESSAGE: &str = "Failed to connect to the destination host";

#[derive(Clone)]
pub struct TunnelService {
    connector: Arc<dyn ConnectorPort>,
    tracker: Arc<dyn TrackingPort>,
    pool: BufferPool,
    server_name: String,
}

impl TunnelService {
    pub fn new(
        connector: Arc<dyn ConnectorPort>,
        tracker: Arc<dyn TrackingPort>,
        pool: BufferPool,
        server_name: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            tracker,
            pool,
            server_name: server_name.into(),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Handles one inbound request end to end.
    ///
    /// Rejections are answered through `exchange` before the error is returned. On
    /// success the result is the number of bytes relayed from the destination to the
    /// client.
    pub async fn handle(&self, request: TunnelRequest, exchange: &mut dyn ClientExchange) -> Result<u64> {
        if request.method != Method::CONNECT {
            if let Err(e) = exchange
                .write_error(StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED_MESSAGE)
                .await
            {
                debug!(error = %e, "failed to write 405");
            }
            return Err(TunnelError::MethodNotAllowed(request.method.to_string()));
        }

        let mut tunnel = Tunnel::new(&request);

        let stream = match self.connector.connect(&request.authority).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(authority = %request.authority, error = %e, "dial failed");
                if let Err(e) = exchange
                    .write_error(StatusCode::SERVICE_UNAVAILABLE, DIAL_FAILED_MESSAGE)
                    .await
                {
                    debug!(error = %e, "failed to write 503");
                }
                tunnel.advance(TunnelState::Closed);
                return Err(TunnelError::DialFailed(format!("{}: {}", request.authority, e)));
            }
        };
        let mut destination = DestinationConnection::new(request.authority.clone(), stream);
        tunnel.advance(TunnelState::Dialed);

        let conn_info = ConnectionInfo::new(
            request.method.to_string(),
            request.authority.clone(),
            request.version.to_string(),
        );
        let conn_id = conn_info.id;
        self.tracker.track_connection(conn_info).await?;

        let result = self.establish(&request, &mut tunnel, exchange, &mut destination).await;
        let result = match result {
            Ok(client) => {
                tunnel.advance(TunnelState::Relaying);
                relay(destination, client, self.pool.clone())
                    .await
                    .map_err(|e| TunnelError::RelayFailed(e.to_string()))
            }
            Err(e) => {
                info!(authority = %request.authority, error = %e, "handshake failed");
                drop(destination);
                Err(e)
            }
        };

        tunnel.advance(TunnelState::Closed);
        self.tracker.close_connection(conn_id).await?;
        result
    }

    async fn establish(
        &self,
        request: &TunnelRequest,
        tunnel: &mut Tunnel,
        exchange: &mut dyn ClientExchange,
        destination: &mut DestinationConnection,
    ) -> Result<ClientSide> {
        let handshake = Handshake::for_version(request.version);
        tunnel.advance(TunnelState::HandshakeSelected);
        debug!(authority = %request.authority, %handshake, version = %request.version, "handshake selected");

        let client = handshake.run(exchange, destination, &self.server_name).await?;
        tunnel.advance(TunnelState::HandshakeComplete);
        Ok(client)
    }
}

/// Per-request state, logged on every transition.
struct Tunnel {
    authority: String,
    state: TunnelState,
}

impl Tunnel {
    fn new(request: &TunnelRequest) -> Self {
        Self {
            authority: request.authority.clone(),
            state: TunnelState::Validated,
        }
    }

    fn advance(&mut self, next: TunnelState) {
        debug_assert!(self.state.can_advance_to(next), "{} -> {}", self.state, next);
        debug!(authority = %self.authority, from = %self.state, to = %next, "tunnel state");
        self.state = next;
    }
}
