//! HTTP/1.x front-end with connection hijacking.
//!
//! hyper's HTTP/1 server only hands out a connection after a `101`/`2xx` upgrade and
//! keeps what it read ahead to itself, so requests are read here directly.

mod exchange;
mod head;

pub use exchange::Http1Exchange;
pub use head::{read_request_head, BodyFraming, HeadError, RequestHead, DEFAULT_MAX_HEAD_BYTES};

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::domain::{ProtocolVersion, StatusCode, TunnelRequest, TunnelService};
use crate::ports::TunnelIo;
use exchange::{write_plain_response, Conn};

const LINGER: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct Http1Settings {
    pub max_head_bytes: usize,
}

impl Default for Http1Settings {
    fn default() -> Self {
        Self {
            max_head_bytes: DEFAULT_MAX_HEAD_BYTES,
        }
    }
}

/// Serves requests on one connection until it is closed, hijacked, or cannot be reused.
pub async fn serve_connection(service: Arc<TunnelService>, io: Box<dyn TunnelIo>, settings: Http1Settings) {
    let mut conn: Conn = BufReader::new(io);

    loop {
        let raw = match read_request_head(&mut conn, settings.max_head_bytes).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                reject(&mut conn, &e).await;
                return;
            }
        };

        let head = match RequestHead::parse(&raw) {
            Ok(head) => head,
            Err(e) => {
                reject(&mut conn, &e).await;
                return;
            }
        };

        let authority = match head.authority() {
            Some(authority) => authority,
            None => {
                reject(&mut conn, &HeadError::Malformed("missing host".to_string())).await;
                return;
            }
        };

        let framing = head.body_framing();
        let keep_alive = head.keep_alive() && framing != BodyFraming::Unframed;
        let version = head.version();
        let request = TunnelRequest::new(head.method, authority, version);

        let mut exchange = Http1Exchange::new(conn, version, keep_alive, service.server_name().to_string());
        if let Err(e) = service.handle(request, &mut exchange).await {
            debug!(error = %e, "request finished with error");
        }

        conn = match exchange.into_reusable() {
            Some(conn) => conn,
            None => return,
        };

        if let BodyFraming::Length(len) = framing {
            if len > 0 && !discard_body(&mut conn, len).await {
                return;
            }
        }
    }
}

async fn discard_body(conn: &mut Conn, len: u64) -> bool {
    match tokio::io::copy(&mut (&mut *conn).take(len), &mut tokio::io::sink()).await {
        Ok(n) => n == len,
        Err(e) => {
            debug!(error = %e, "failed to discard request body");
            false
        }
    }
}

async fn reject(conn: &mut Conn, err: &HeadError) {
    let (status, message) = match err {
        HeadError::TooLarge => (
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            "Request Header Fields Too Large",
        ),
        HeadError::Malformed(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
        HeadError::Io(e) => {
            debug!(error = %e, "connection failed while reading request");
            return;
        }
    };
    debug!(error = %err, status = status.as_u16(), "rejecting request");
    if let Err(e) = write_plain_response(conn.get_mut(), ProtocolVersion::Http11, status, message, false).await {
        debug!(error = %e, "failed to write rejection");
        return;
    }
    linger(conn).await;
}

/// Closes our side, then drains what the client is still sending for a short while.
/// Closing with unread input would reset the connection and could discard the response
/// before the client reads it.
async fn linger(conn: &mut Conn) {
    if conn.get_mut().shutdown().await.is_err() {
        return;
    }
    let _ = tokio::time::timeout(LINGER, tokio::io::copy(conn, &mut tokio::io::sink())).await;
}
