mod connector;
mod io;

pub use connector::TcpConnector;
pub use io::Prefixed;
