//! An HTTP CONNECT tunnel endpoint.
//!
//! `domain` holds the tunnel engine (validation, dialing, handshakes, relay), `ports`
//! the traits it is driven through, and `adapters` the TCP, TLS, HTTP/1 and HTTP/2
//! front-ends.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
