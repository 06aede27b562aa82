//! netrelay library
//!
//! A minimal TCP relay: dial out and wire the connection to stdin/stdout or a
//! device file, or listen and relay inbound connections to stdin/stdout or a
//! spawned handler command.

pub mod acceptor;
pub mod config;
pub mod relay;
pub mod resolver;
pub mod timeout;

pub use acceptor::Acceptor;
pub use config::{Config, Mode};

/// Common error type for the relay tool
pub type Result<T> = anyhow::Result<T>;
