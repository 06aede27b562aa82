//! Bidirectional data relay

mod engine;
mod session;

pub use engine::{pump, RelayLimits, RelayOutcome};
pub use session::RelaySession;
