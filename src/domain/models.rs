pub use http::{Method, StatusCode};
use std::fmt;

/// HTTP version negotiated for the connection carrying a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    Http10,
    Http11,
    Http2,
    Http3,
}

impl ProtocolVersion {
    pub fn major(&self) -> u8 {
        match self {
            ProtocolVersion::Http10 | ProtocolVersion::Http11 => 1,
            ProtocolVersion::Http2 => 2,
            ProtocolVersion::Http3 => 3,
        }
    }

    pub fn from_http(version: http::Version) -> Self {
        match version {
            http::Version::HTTP_09 | http::Version::HTTP_10 => ProtocolVersion::Http10,
            http::Version::HTTP_2 => ProtocolVersion::Http2,
            http::Version::HTTP_3 => ProtocolVersion::Http3,
            _ => ProtocolVersion::Http11,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::Http10 => write!(f, "HTTP/1.0"),
            ProtocolVersion::Http11 => write!(f, "HTTP/1.1"),
            ProtocolVersion::Http2 => write!(f, "HTTP/2"),
            ProtocolVersion::Http3 => write!(f, "HTTP/3"),
        }
    }
}

/// The metadata of one inbound request. The byte streams travel separately, through
/// the [`ClientExchange`](crate::ports::ClientExchange) handed to the service.
#[derive(Debug, Clone)]
pub struct TunnelRequest {
    pub method: Method,
    /// `host:port`, dialed verbatim.
    pub authority: String,
    pub version: ProtocolVersion,
}

impl TunnelRequest {
    pub fn new(method: Method, authority: impl Into<String>, version: ProtocolVersion) -> Self {
        Self {
            method,
            authority: authority.into(),
            version,
        }
    }

    pub fn connect(authority: impl Into<String>, version: ProtocolVersion) -> Self {
        Self::new(Method::CONNECT, authority, version)
    }
}

/// Lifecycle of a single tunnel request.
///
/// States only move forward; `Closed` is terminal and reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TunnelState {
    Validated,
    Dialed,
    HandshakeSelected,
    HandshakeComplete,
    Relaying,
    Closed,
}

impl TunnelState {
    pub fn can_advance_to(self, next: TunnelState) -> bool {
        match next {
            TunnelState::Closed => self != TunnelState::Closed,
            _ => next as u8 == self as u8 + 1,
        }
    }
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TunnelState::Validated => "validated",
            TunnelState::Dialed => "dialed",
            TunnelState::HandshakeSelected => "handshake-selected",
            TunnelState::HandshakeComplete => "handshake-complete",
            TunnelState::Relaying => "relaying",
            TunnelState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: uuid::Uuid,
    pub method: String,
    pub target: String,
    pub protocol: String,
    pub opened_at: std::time::Instant,
    pub closed_at: Option<std::time::Instant>,
}

impl ConnectionInfo {
    pub fn new(method: String, target: String, protocol: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            method,
            target,
            protocol,
            opened_at: std::time::Instant::now(),
            closed_at: None,
        }
    }

    pub fn close(&mut self) {
        self.closed_at = Some(std::time::Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major_version_split() {
        assert_eq!(ProtocolVersion::Http10.major(), 1);
        assert_eq!(ProtocolVersion::Http11.major(), 1);
        assert_eq!(ProtocolVersion::Http2.major(), 2);
        assert_eq!(ProtocolVersion::Http3.major(), 3);
        assert_eq!(ProtocolVersion::from_http(http::Version::HTTP_2), ProtocolVersion::Http2);
        assert_eq!(ProtocolVersion::from_http(http::Version::HTTP_11), ProtocolVersion::Http11);
    }

    #[test]
    fn test_state_only_moves_forward() {
        assert!(TunnelState::Validated.can_advance_to(TunnelState::Dialed));
        assert!(TunnelState::Dialed.can_advance_to(TunnelState::HandshakeSelected));
        assert!(TunnelState::Relaying.can_advance_to(TunnelState::Closed));
        assert!(TunnelState::Validated.can_advance_to(TunnelState::Closed));

        assert!(!TunnelState::Dialed.can_advance_to(TunnelState::Validated));
        assert!(!TunnelState::Validated.can_advance_to(TunnelState::Relaying));
        assert!(!TunnelState::Closed.can_advance_to(TunnelState::Closed));
    }
}
