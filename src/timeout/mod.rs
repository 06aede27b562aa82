//! Explicit deadline handling
//!
//! Neither the relay nor the acceptor ever polls a clock: a [`Deadline`] is
//! armed with a duration and awaited inside a `tokio::select!`. A disarmed
//! deadline never fires. The connect phase uses [`bounded`] instead, because
//! expiry there is a hard failure rather than a graceful termination.

use std::future::{pending, Future};
use std::time::Duration;

use anyhow::anyhow;
use tokio::time::{sleep_until, Instant};

use crate::Result;

/// A one-shot, re-armable deadline. A `None` limit means "no timeout": such a
/// deadline can never be armed and its expiry never resolves.
#[derive(Debug)]
pub struct Deadline {
    limit: Option<Duration>,
    fires_at: Option<Instant>,
}

impl Deadline {
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            limit,
            fires_at: None,
        }
    }

    /// Schedule expiry `limit` from now, replacing any pending expiry.
    /// No-op when no limit is configured.
    pub fn arm(&mut self) {
        if let Some(limit) = self.limit {
            self.fires_at = Some(Instant::now() + limit);
        }
    }

    /// Cancel any pending expiry.
    pub fn disarm(&mut self) {
        self.fires_at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.fires_at.is_some()
    }

    /// Resolves when the armed deadline passes; pends forever while disarmed.
    pub async fn expired(&self) {
        match self.fires_at {
            Some(at) => sleep_until(at).await,
            None => pending().await,
        }
    }
}

/// Race `fut` against the connect-phase time limit. Expiry before the future
/// resolves means no connection exists yet, which is the error path.
pub async fn bounded<F, T>(limit: Option<Duration>, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("{what} timed out after {:?}", limit)),
        },
        None => fut.await,
    }
}
