use async_trait::async_trait;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE, SERVER, X_CONTENT_TYPE_OPTIONS};
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper::Response;
use hyper_util::rt::TokioIo;
use std::io;
use tokio::sync::oneshot;

use crate::domain::StatusCode;
use crate::ports::{ClientExchange, ClientSide, TunnelIo, WriteCapabilities};

pub(super) type Body = BoxBody<Bytes, hyper::Error>;

// Body bytes of an HTTP/2 stream go out as DATA frames when flushed.
impl TunnelIo for TokioIo<Upgraded> {
    fn capabilities(&self) -> WriteCapabilities {
        WriteCapabilities::STREAM
    }
}

pub(super) fn empty() -> Body {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

pub(super) fn text_response(status: StatusCode, message: &str) -> Response<Body> {
    let body = Full::new(Bytes::from(format!("{}\n", message)))
        .map_err(|never| match never {})
        .boxed();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}

/// A request served by hyper (HTTP/2), seen from the tunnel service.
///
/// The response head travels back to hyper's service future through a oneshot; the
/// tunnel bytes then flow over the upgraded stream hyper hands out once the head is
/// on the wire.
pub struct HyperStreamExchange {
    respond: Option<oneshot::Sender<Response<Body>>>,
    on_upgrade: Option<OnUpgrade>,
    head: Option<StatusCode>,
    upgraded: Option<TokioIo<Upgraded>>,
    server_name: HeaderValue,
}

impl HyperStreamExchange {
    pub fn new(respond: oneshot::Sender<Response<Body>>, on_upgrade: OnUpgrade, server_name: &str) -> Self {
        Self {
            respond: Some(respond),
            on_upgrade: Some(on_upgrade),
            head: None,
            upgraded: None,
            server_name: HeaderValue::from_str(server_name).unwrap_or_else(|_| HeaderValue::from_static("proxy")),
        }
    }

    fn send(&mut self, response: Response<Body>) -> io::Result<()> {
        let respond = self
            .respond
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "response already sent"))?;
        respond
            .send(response)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
    }
}

#[async_trait]
impl ClientExchange for HyperStreamExchange {
    async fn write_error(&mut self, status: StatusCode, message: &str) -> io::Result<()> {
        self.send(text_response(status, message))
    }

    async fn write_head(&mut self, status: StatusCode) -> io::Result<()> {
        if self.respond.is_none() || self.head.is_some() {
            return Err(io::Error::new(io::ErrorKind::Other, "response already sent"));
        }
        self.head = Some(status);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        let status = match self.head.take() {
            Some(status) => status,
            None => return Ok(()),
        };

        let mut response = Response::new(empty());
        *response.status_mut() = status;
        response.headers_mut().insert(SERVER, self.server_name.clone());
        self.send(response)?;

        if !status.is_success() {
            return Ok(());
        }
        // Resolves once hyper has written the HEADERS frame.
        let on_upgrade = self
            .on_upgrade
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stream already taken"))?;
        let upgraded = on_upgrade
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("stream upgrade failed: {}", e)))?;
        self.upgraded = Some(TokioIo::new(upgraded));
        Ok(())
    }

    fn take_body_stream(&mut self) -> io::Result<ClientSide> {
        self.upgraded
            .take()
            .map(ClientSide::from_io)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "response head not flushed"))
    }
}
