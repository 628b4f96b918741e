mod adapter;
mod exchange;

pub use adapter::HyperTunnelAdapter;
pub use exchange::HyperStreamExchange;
