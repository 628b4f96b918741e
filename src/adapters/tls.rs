//! TLS termination for the HTTPS listener, with certificates reloaded from disk.

use log::{error, info, warn};
use notify_debouncer_mini::new_debouncer;
use notify_debouncer_mini::notify::RecursiveMode;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

pub const ALPN_H2: &[u8] = b"h2";
pub const ALPN_HTTP11: &[u8] = b"http/1.1";

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

pub fn load_certs(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(invalid_data(format!("no certificate found in {}", path.display())));
    }
    Ok(certs)
}

pub fn load_private_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| invalid_data(format!("no private key found in {}", path.display())))
}

pub fn load_certified_key(cert: &Path, key: &Path) -> io::Result<CertifiedKey> {
    let certs = load_certs(cert)?;
    let key = load_private_key(key)?;
    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
        .map_err(|e| invalid_data(format!("unsupported private key: {}", e)))?;
    Ok(CertifiedKey::new(certs, signing_key))
}

/// Serves the certificate found at `cert`/`key`, re-reading both when they change.
///
/// A failed reload keeps the previous certificate.
#[derive(Debug)]
pub struct CertReloader {
    cert: PathBuf,
    key: PathBuf,
    current: RwLock<Arc<CertifiedKey>>,
}

impl CertReloader {
    pub fn load(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> io::Result<Self> {
        let cert = cert.into();
        let key = key.into();
        let current = load_certified_key(&cert, &key)?;
        Ok(Self {
            cert,
            key,
            current: RwLock::new(Arc::new(current)),
        })
    }

    pub fn current(&self) -> Arc<CertifiedKey> {
        match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn reload(&self) -> io::Result<()> {
        let fresh = Arc::new(load_certified_key(&self.cert, &self.key)?);
        match self.current.write() {
            Ok(mut current) => *current = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
        Ok(())
    }

    fn is_watched(&self, path: &Path) -> bool {
        let name = path.file_name();
        name.is_some() && (name == self.cert.file_name() || name == self.key.file_name())
    }

    fn watch_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = [&self.cert, &self.key]
            .iter()
            .map(|p| match p.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            })
            .collect();
        dirs.dedup();
        dirs
    }

    /// Watches the certificate and key files and reloads on change.
    pub fn watch(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let reloader = self.clone();

        tokio::task::spawn_blocking(move || {
            let (tx, rx) = std::sync::mpsc::channel();
            let mut debouncer = match new_debouncer(Duration::from_secs(1), tx) {
                Ok(d) => d,
                Err(e) => {
                    error!("Failed to create certificate watcher: {}", e);
                    return;
                }
            };

            for dir in reloader.watch_dirs() {
                if let Err(e) = debouncer.watcher().watch(&dir, RecursiveMode::NonRecursive) {
                    error!("Failed to watch {}: {}", dir.display(), e);
                    return;
                }
            }

            for result in rx {
                match result {
                    Ok(events) => {
                        if !events.iter().any(|event| reloader.is_watched(&event.path)) {
                            continue;
                        }
                        match reloader.reload() {
                            Ok(()) => info!("Reloaded certificate from {}", reloader.cert.display()),
                            Err(e) => warn!("Keeping previous certificate, reload failed: {}", e),
                        }
                    }
                    Err(error) => warn!("Certificate watch error: {:?}", error),
                }
            }
        })
    }
}

impl ResolvesServerCert for CertReloader {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.current())
    }
}

/// ALPN offers `http/1.1`, preceded by `h2` when HTTP/2 is enabled.
pub fn alpn_protocols(enable_h2: bool) -> Vec<Vec<u8>> {
    if enable_h2 {
        vec![ALPN_H2.to_vec(), ALPN_HTTP11.to_vec()]
    } else {
        vec![ALPN_HTTP11.to_vec()]
    }
}

pub fn server_config(resolver: Arc<CertReloader>, enable_h2: bool) -> io::Result<ServerConfig> {
    let mut config = ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| invalid_data(format!("TLS configuration: {}", e)))?
        .with_no_client_auth()
        .with_cert_resolver(resolver);
    config.alpn_protocols = alpn_protocols(enable_h2);
    Ok(config)
}
