pub mod errors;
pub mod handshake;
pub mod models;
pub mod pool;
pub mod relay;
pub mod service;

pub use errors::*;
pub use handshake::Handshake;
pub use models::*;
pub use pool::{BufferPool, PooledBuffer};
pub use relay::{flushing_copy, relay, DestinationConnection};
pub use service::TunnelService;
