use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

use connect_proxy::adapters::http1_server::Http1Settings;
use connect_proxy::adapters::{tls, CertReloader, ConnectionTracker, ListenerSettings, TcpConnector, TunnelListener};
use connect_proxy::config::{normalize_listen_addr, ProxyConfig};
use connect_proxy::domain::{BufferPool, TunnelService};
use connect_proxy::ports::TrackingPort;

#[derive(Parser, Debug)]
#[clap(version = env!("CONNECT_PROXY_VERSION"), author = env!("CARGO_PKG_AUTHORS"))]
pub struct Opts {
    /// Configuration file
    #[clap(long, short = 'c')]
    config: Option<PathBuf>,

    /// listen on this network address
    #[clap(long, short = 'l', env = "PORT")]
    listen: Option<String>,

    /// also serve TLS on this network address
    #[clap(long, env = "HTTPS_PORT")]
    https_listen: Option<String>,

    /// TLS certificate (PEM)
    #[clap(long, env = "CERT")]
    cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[clap(long, env = "KEY")]
    key: Option<PathBuf>,

    /// offer HTTP/2 over ALPN on the TLS listener
    #[clap(long, env = "H2", value_parser = parse_flag)]
    h2: Option<bool>,

    /// accept HTTP/2 with prior knowledge on the plain listener
    #[clap(long)]
    h2c: Option<bool>,

    /// value of the Server header
    #[clap(long)]
    server_name: Option<String>,

    /// idle copy buffers kept for reuse
    #[clap(long)]
    pool_idle: Option<usize>,

    /// largest accepted HTTP/1 request head, in bytes
    #[clap(long)]
    max_head_bytes: Option<usize>,
}

/// Any non-empty value other than an explicit "false"/"0" turns a flag on.
fn parse_flag(value: &str) -> Result<bool, String> {
    let value = value.trim();
    Ok(!(value.is_empty() || value.eq_ignore_ascii_case("false") || value == "0"))
}

impl Opts {
    fn apply(self, mut config: ProxyConfig) -> ProxyConfig {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if self.https_listen.is_some() {
            config.https_listen = self.https_listen;
        }
        if let Some(cert) = self.cert {
            config.cert = cert;
        }
        if let Some(key) = self.key {
            config.key = key;
        }
        if let Some(h2) = self.h2 {
            config.h2 = h2;
        }
        if let Some(h2c) = self.h2c {
            config.h2c = h2c;
        }
        if let Some(server_name) = self.server_name {
            config.server_name = server_name;
        }
        if let Some(pool_idle) = self.pool_idle {
            config.pool_idle = pool_idle;
        }
        if let Some(max_head_bytes) = self.max_head_bytes {
            config.max_head_bytes = max_head_bytes;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("connect_proxy=info")),
        )
        .init();

    let mut opts = Opts::parse();
    let config = ProxyConfig::load(opts.config.take().as_ref())?;
    let config = opts.apply(config);

    match rlimit::increase_nofile_limit(u64::MAX) {
        Ok(limit) => info!("open file limit: {}", limit),
        Err(e) => warn!("could not raise the open file limit: {}", e),
    }

    let tracker = Arc::new(ConnectionTracker::new());
    tracker.start_cleanup();
    let tracker_port: Arc<dyn TrackingPort> = tracker.clone();

    let service = Arc::new(TunnelService::new(
        Arc::new(TcpConnector::new()),
        tracker_port,
        BufferPool::new(config.pool_idle),
        config.server_name.clone(),
    ));

    let settings = ListenerSettings {
        h2c: config.h2c,
        http1: Http1Settings {
            max_head_bytes: config.max_head_bytes,
        },
    };
    let listener = Arc::new(TunnelListener::new(service, settings));

    if let Some(https_listen) = &config.https_listen {
        let reloader = Arc::new(CertReloader::load(&config.cert, &config.key)?);
        let _watcher = reloader.watch();
        let acceptor = TlsAcceptor::from(Arc::new(tls::server_config(reloader, config.h2)?));
        let tcp = TcpListener::bind(normalize_listen_addr(https_listen)).await?;
        tokio::spawn(listener.clone().serve_tls(tcp, acceptor));
    }

    let tcp = TcpListener::bind(normalize_listen_addr(&config.listen)).await?;
    tokio::select! {
        _ = listener.serve(tcp) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
