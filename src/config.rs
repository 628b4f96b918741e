use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::adapters::http1_server::DEFAULT_MAX_HEAD_BYTES;
use crate::domain::pool::DEFAULT_MAX_IDLE;

pub const DEFAULT_SERVER_NAME: &str = "connect-proxy";

/// Settings read from the optional configuration file. Command line flags and their
/// environment variables take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Plain listener, `:3000` style or `host:port`
    pub listen: String,
    /// TLS listener, disabled when unset
    pub https_listen: Option<String>,
    pub cert: PathBuf,
    pub key: PathBuf,
    /// Offer h2 over ALPN on the TLS listener
    pub h2: bool,
    /// Accept HTTP/2 with prior knowledge on the plain listener
    pub h2c: bool,
    pub server_name: String,
    /// Idle copy buffers kept for reuse
    pub pool_idle: usize,
    pub max_head_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: ":3000".to_string(),
            https_listen: None,
            cert: PathBuf::from("localhost.pem"),
            key: PathBuf::from("localhost-key.pem"),
            h2: false,
            h2c: true,
            server_name: DEFAULT_SERVER_NAME.to_string(),
            pool_idle: DEFAULT_MAX_IDLE,
            max_head_bytes: DEFAULT_MAX_HEAD_BYTES,
        }
    }
}

impl ProxyConfig {
    pub fn load(path: Option<&PathBuf>) -> Result<Self, confy::ConfyError> {
        match path {
            Some(path) => confy::load_path(path),
            None => Ok(Self::default()),
        }
    }
}

/// Turns `:3000`, `3000` and `host:port` into something `TcpListener::bind` accepts.
pub fn normalize_listen_addr(addr: &str) -> String {
    let addr = addr.trim();
    if let Some(port) = addr.strip_prefix(':') {
        return format!("0.0.0.0:{}", port);
    }
    if !addr.is_empty() && addr.bytes().all(|b| b.is_ascii_digit()) {
        return format!("0.0.0.0:{}", addr);
    }
    addr.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_listen_addr() {
        assert_eq!(normalize_listen_addr(":3000"), "0.0.0.0:3000");
        assert_eq!(normalize_listen_addr("8443"), "0.0.0.0:8443");
        assert_eq!(normalize_listen_addr("127.0.0.1:3000"), "127.0.0.1:3000");
        assert_eq!(normalize_listen_addr("[::1]:3000"), "[::1]:3000");
        assert_eq!(normalize_listen_addr(" :80 "), "0.0.0.0:80");
    }

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.listen, ":3000");
        assert_eq!(config.https_listen, None);
        assert_eq!(config.cert, PathBuf::from("localhost.pem"));
        assert_eq!(config.key, PathBuf::from("localhost-key.pem"));
        assert!(!config.h2);
        assert!(config.h2c);
    }

    #[test]
    fn test_load_without_file() {
        assert_eq!(ProxyConfig::load(None).unwrap(), ProxyConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("connect-proxy-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "listen = \"127.0.0.1:9000\"\nh2 = true\n").unwrap();

        let config = ProxyConfig::load(Some(&path)).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert!(config.h2);
        // unset keys keep their defaults
        assert_eq!(config.server_name, DEFAULT_SERVER_NAME);

        std::fs::remove_file(&path).unwrap();
    }
}
