//! Relay session accounting

use std::time::{Duration, Instant};

use tracing::info;

use super::RelayOutcome;

/// Byte counters and timing for one relay session.
#[derive(Debug)]
pub struct RelaySession {
    start_time: Instant,
    bytes_out: u64,
    bytes_in: u64,
}

impl RelaySession {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            bytes_out: 0,
            bytes_in: 0,
        }
    }

    /// Record a transfer local -> remote.
    pub fn record_out(&mut self, n: usize) {
        self.bytes_out += n as u64;
    }

    /// Record a transfer remote -> local.
    pub fn record_in(&mut self, n: usize) {
        self.bytes_in += n as u64;
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn log_complete(&self, outcome: RelayOutcome) {
        info!(
            "relay finished ({:?}): {} bytes out, {} bytes in over {:?}",
            outcome,
            self.bytes_out,
            self.bytes_in,
            self.duration()
        );
    }
}

impl Default for RelaySession {
    fn default() -> Self {
        Self::new()
    }
}
