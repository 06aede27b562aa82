//! Runtime configuration
//!
//! The configuration is built once from parsed arguments and handed by
//! reference into the acceptor and the relay. There is no ambient state and
//! no configuration file.

mod types;

pub use types::{Config, Mode};
