#![cfg(test)]
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod echo_server;
pub mod proxy_server;

pub use echo_server::EchoServer;
pub use proxy_server::{fixture, read_response_head, TestProxyServer};
