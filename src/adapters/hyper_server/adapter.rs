use hyper::body::Incoming;
use hyper::header::HOST;
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tracing::{debug, error};

use super::exchange::{text_response, Body, HyperStreamExchange};
use crate::domain::{ProtocolVersion, StatusCode, TunnelRequest, TunnelService};

/// Serves tunnels over HTTP/2 connections driven by hyper.
pub struct HyperTunnelAdapter {
    service: Arc<TunnelService>,
}

impl HyperTunnelAdapter {
    pub fn new(service: Arc<TunnelService>) -> Self {
        Self { service }
    }

    pub async fn handle(&self, mut req: Request<Incoming>) -> Response<Body> {
        let authority = match request_authority(&req) {
            Some(authority) => authority,
            None => return text_response(StatusCode::BAD_REQUEST, "Bad Request"),
        };
        let request = TunnelRequest::new(req.method().clone(), authority, ProtocolVersion::from_http(req.version()));

        let on_upgrade = hyper::upgrade::on(&mut req);
        let (respond, response) = oneshot::channel();
        let mut exchange = HyperStreamExchange::new(respond, on_upgrade, self.service.server_name());

        // The tunnel outlives this future: hyper only sends the head once we return it.
        let service = self.service.clone();
        tokio::spawn(async move {
            if let Err(e) = service.handle(request, &mut exchange).await {
                debug!(error = %e, "request finished with error");
            }
        });

        response.await.unwrap_or_else(|_| {
            error!("tunnel handler returned without a response");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        })
    }

    /// Serves one connection that already speaks HTTP/2.
    pub async fn serve_connection<I>(self: Arc<Self>, io: I)
    where
        I: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let adapter = self;
        let service_fn = service_fn(move |req| {
            let adapter = adapter.clone();
            async move { Ok::<_, hyper::Error>(adapter.handle(req).await) }
        });

        if let Err(err) = http2::Builder::new(TokioExecutor::new())
            .serve_connection(TokioIo::new(io), service_fn)
            .await
        {
            debug!("HTTP/2 connection ended: {}", err);
        }
    }
}

/// CONNECT carries the target as the `:authority` pseudo-header; plain requests fall
/// back to `Host`.
fn request_authority(req: &Request<Incoming>) -> Option<String> {
    if let Some(authority) = req.uri().authority() {
        return Some(authority.to_string());
    }
    req.headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
