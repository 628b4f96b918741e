//! Reading and parsing HTTP/1 request heads.

use http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::Method;
use std::fmt;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::domain::ProtocolVersion;

pub const DEFAULT_MAX_HEAD_BYTES: usize = 64 * 1024;

const MAX_HEADERS: usize = 100;

#[derive(Debug)]
pub enum HeadError {
    /// The head did not end within the configured limit.
    TooLarge,
    Malformed(String),
    Io(io::Error),
}

impl fmt::Display for HeadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadError::TooLarge => write!(f, "request head too large"),
            HeadError::Malformed(msg) => write!(f, "malformed request head: {}", msg),
            HeadError::Io(e) => write!(f, "reading request head: {}", e),
        }
    }
}

impl std::error::Error for HeadError {}

impl From<io::Error> for HeadError {
    fn from(err: io::Error) -> Self {
        HeadError::Io(err)
    }
}

/// Reads one request head, up to and including the blank line.
///
/// Empty lines before the request line are skipped. Returns `None` when the peer closes
/// the connection before sending anything. Bytes after the head stay in `reader`.
pub async fn read_request_head<R>(reader: &mut R, max_bytes: usize) -> Result<Option<Vec<u8>>, HeadError>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = Vec::with_capacity(1024);
    let mut consumed = 0usize;
    let mut line = Vec::with_capacity(256);

    loop {
        if consumed >= max_bytes {
            return Err(HeadError::TooLarge);
        }
        line.clear();
        let limit = (max_bytes - consumed) as u64;
        let n = (&mut *reader).take(limit).read_until(b'\n', &mut line).await?;
        if n == 0 {
            if head.is_empty() {
                return Ok(None);
            }
            return Err(HeadError::Malformed("connection closed inside the head".to_string()));
        }
        consumed += n;

        if !line.ends_with(b"\n") {
            // Either the limit cut the line or EOF arrived mid-line.
            if consumed >= max_bytes {
                return Err(HeadError::TooLarge);
            }
            return Err(HeadError::Malformed("connection closed inside the head".to_string()));
        }

        let blank = line == b"\r\n" || line == b"\n";
        if blank && head.is_empty() {
            continue;
        }
        head.extend_from_slice(&line);
        if blank {
            return Ok(Some(head));
        }
    }
}

/// The parts of a request head the tunnel front-end needs.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub target: String,
    /// Minor version of HTTP/1.x.
    pub minor_version: u8,
    pub headers: HeaderMap,
}

/// How the request body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    Length(u64),
    /// Chunked or unparsable lengths. The connection cannot be reused afterwards.
    Unframed,
}

impl RequestHead {
    pub fn parse(raw: &[u8]) -> Result<Self, HeadError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        match req.parse(raw) {
            Ok(httparse::Status::Complete(_)) => {}
            Ok(httparse::Status::Partial) => return Err(HeadError::Malformed("incomplete head".to_string())),
            Err(httparse::Error::TooManyHeaders) => return Err(HeadError::TooLarge),
            Err(e) => return Err(HeadError::Malformed(e.to_string())),
        }

        let method = req
            .method
            .ok_or_else(|| HeadError::Malformed("missing method".to_string()))
            .and_then(|m| Method::from_bytes(m.as_bytes()).map_err(|e| HeadError::Malformed(e.to_string())))?;
        let target = req
            .path
            .ok_or_else(|| HeadError::Malformed("missing request target".to_string()))?
            .to_string();
        let minor_version = req
            .version
            .ok_or_else(|| HeadError::Malformed("missing version".to_string()))?;

        let mut map = HeaderMap::with_capacity(req.headers.len());
        for header in req.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|e| HeadError::Malformed(e.to_string()))?;
            let value = HeaderValue::from_bytes(header.value).map_err(|e| HeadError::Malformed(e.to_string()))?;
            map.append(name, value);
        }

        Ok(Self {
            method,
            target,
            minor_version,
            headers: map,
        })
    }

    pub fn version(&self) -> ProtocolVersion {
        if self.minor_version == 0 {
            ProtocolVersion::Http10
        } else {
            ProtocolVersion::Http11
        }
    }

    /// The `host:port` to dial: the request target in authority or absolute form,
    /// otherwise the `Host` header.
    pub fn authority(&self) -> Option<String> {
        if !self.target.starts_with('/') && self.target != "*" {
            if let Ok(uri) = self.target.parse::<http::Uri>() {
                if let Some(authority) = uri.authority() {
                    return Some(authority.to_string());
                }
            }
        }
        self.headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn connection_has(&self, token: &str) -> bool {
        self.headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    /// Whether the client expects the connection to stay open after the response.
    pub fn keep_alive(&self) -> bool {
        if self.connection_has("close") {
            return false;
        }
        self.minor_version >= 1 || self.connection_has("keep-alive")
    }

    pub fn body_framing(&self) -> BodyFraming {
        if self.headers.contains_key(TRANSFER_ENCODING) {
            return BodyFraming::Unframed;
        }
        let mut lengths = self.headers.get_all(CONTENT_LENGTH).iter();
        match (lengths.next(), lengths.next()) {
            (None, _) => BodyFraming::Length(0),
            (Some(value), None) => value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(BodyFraming::Length)
                .unwrap_or(BodyFraming::Unframed),
            (Some(_), Some(_)) => BodyFraming::Unframed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, BufReader};

    async fn read(input: &[u8], max: usize) -> (Result<Option<Vec<u8>>, HeadError>, Vec<u8>) {
        let mut reader = BufReader::new(input);
        let head = read_request_head(&mut reader, max).await;
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        (head, rest)
    }

    #[tokio::test]
    async fn test_head_stops_at_blank_line() {
        let (head, rest) = read(b"CONNECT a:1 HTTP/1.1\r\nHost: a:1\r\n\r\nHELLO", 1024).await;
        assert_eq!(head.unwrap().unwrap(), b"CONNECT a:1 HTTP/1.1\r\nHost: a:1\r\n\r\n");
        assert_eq!(rest, b"HELLO");
    }

    #[tokio::test]
    async fn test_leading_blank_lines_are_skipped() {
        let (head, _) = read(b"\r\n\r\nCONNECT a:1 HTTP/1.1\r\n\r\n", 1024).await;
        assert_eq!(head.unwrap().unwrap(), b"CONNECT a:1 HTTP/1.1\r\n\r\n");
    }

    #[tokio::test]
    async fn test_eof_before_anything_is_not_an_error() {
        let (head, _) = read(b"", 1024).await;
        assert!(head.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_inside_head_is_malformed() {
        let (head, _) = read(b"CONNECT a:1 HTTP/1.1\r\nHost: a", 1024).await;
        assert!(matches!(head, Err(HeadError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_oversized_head() {
        let mut input = b"CONNECT a:1 HTTP/1.1\r\n".to_vec();
        input.extend_from_slice(format!("X-Pad: {}\r\n\r\n", "p".repeat(200)).as_bytes());
        let (head, _) = read(&input, 64).await;
        assert!(matches!(head, Err(HeadError::TooLarge)));
    }

    #[test]
    fn test_parse_connect() {
        let head = RequestHead::parse(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n").unwrap();
        assert_eq!(head.method, Method::CONNECT);
        assert_eq!(head.authority().as_deref(), Some("example.com:443"));
        assert_eq!(head.version(), ProtocolVersion::Http11);
        assert!(head.keep_alive());
        assert_eq!(head.body_framing(), BodyFraming::Length(0));
    }

    #[test]
    fn test_origin_form_uses_host_header() {
        let head = RequestHead::parse(b"GET /index.html HTTP/1.0\r\nHost: example.com\r\n\r\n").unwrap();
        assert_eq!(head.authority().as_deref(), Some("example.com"));
        assert_eq!(head.version(), ProtocolVersion::Http10);
        assert!(!head.keep_alive());
    }

    #[test]
    fn test_connection_tokens() {
        let head = RequestHead::parse(b"GET / HTTP/1.1\r\nHost: a\r\nConnection: Upgrade, close\r\n\r\n").unwrap();
        assert!(!head.keep_alive());

        let head = RequestHead::parse(b"GET / HTTP/1.0\r\nHost: a\r\nConnection: keep-alive\r\n\r\n").unwrap();
        assert!(head.keep_alive());
    }

    #[test]
    fn test_body_framing() {
        let head = RequestHead::parse(b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\n").unwrap();
        assert_eq!(head.body_framing(), BodyFraming::Length(5));

        let head = RequestHead::parse(b"POST / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\n").unwrap();
        assert_eq!(head.body_framing(), BodyFraming::Unframed);

        let head = RequestHead::parse(b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: nope\r\n\r\n").unwrap();
        assert_eq!(head.body_framing(), BodyFraming::Unframed);
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            RequestHead::parse(b"\x00\x01 nonsense\r\n\r\n"),
            Err(HeadError::Malformed(_))
        ));
    }
}
