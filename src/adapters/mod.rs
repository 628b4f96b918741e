pub mod http1_server;
pub mod hyper_server;
pub mod listener;
pub mod tcp;
pub mod tls;
pub mod tracking;

pub use http1_server::{Http1Exchange, Http1Settings};
pub use hyper_server::{HyperStreamExchange, HyperTunnelAdapter};
pub use listener::{ListenerSettings, TunnelListener};
pub use tcp::{Prefixed, TcpConnector};
pub use tls::CertReloader;
pub use tracking::*;
