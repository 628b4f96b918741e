pub mod connector;
pub mod tracking;
pub mod tunnel;

pub use connector::ConnectorPort;
pub use tracking::TrackingPort;
pub use tunnel::{BoxReader, ClientExchange, ClientSide, Hijacked, RelayWriter, TunnelIo, WriteCapabilities};
