use http::StatusCode;
use std::fmt;

#[derive(Debug, Clone)]
pub enum TunnelError {
    MethodNotAllowed(String),
    DialFailed(String),
    HandshakeFailed(String),
    RelayFailed(String),
    InvalidRequest(String),
}

impl TunnelError {
    /// Status reported to the client for this failure, if any was sent.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TunnelError::MethodNotAllowed(_) => Some(StatusCode::METHOD_NOT_ALLOWED),
            TunnelError::DialFailed(_) => Some(StatusCode::SERVICE_UNAVAILABLE),
            TunnelError::InvalidRequest(_) => Some(StatusCode::BAD_REQUEST),
            TunnelError::HandshakeFailed(_) | TunnelError::RelayFailed(_) => None,
        }
    }
}

impl fmt::Display for TunnelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelError::MethodNotAllowed(method) => write!(f, "Method not allowed: {}", method),
            TunnelError::DialFailed(msg) => write!(f, "Dial failed: {}", msg),
            TunnelError::HandshakeFailed(msg) => write!(f, "Handshake failed: {}", msg),
            TunnelError::RelayFailed(msg) => write!(f, "Relay failed: {}", msg),
            TunnelError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
        }
    }
}

impl std::error::Error for TunnelError {}

/// Why a connection could not be taken over from the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HijackError {
    AlreadyHijacked,
    NotSupported,
}

impl fmt::Display for HijackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HijackError::AlreadyHijacked => write!(f, "connection already hijacked"),
            HijackError::NotSupported => write!(f, "transport does not support hijacking"),
        }
    }
}

impl std::error::Error for HijackError {}

impl From<HijackError> for TunnelError {
    fn from(err: HijackError) -> Self {
        TunnelError::HandshakeFailed(format!("hijack failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, TunnelError>;
