//! Relay Engine
//!
//! Pumps bytes between the local side (stdin/stdout or a device) and the
//! remote side (socket or handler stdio) until both read directions reach
//! end-of-stream or a deadline fires. A deadline ending an established relay
//! is a successful termination, not an error; only non-EOF read/write
//! failures are fatal.

use std::time::Duration;

use anyhow::Context;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::timeout::Deadline;
use crate::Result;

use super::session::RelaySession;

const BUFFER_SIZE: usize = 8 * 1024;

/// Why the relay stopped. Every variant is a successful termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Both read directions reached end-of-stream.
    Closed,
    /// No traffic in either direction for the idle limit.
    IdleExpired,
    /// The quit delay after local end-of-stream elapsed.
    QuitExpired,
}

/// Deadlines governing an established connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayLimits {
    /// Terminate after this long with no data in either direction.
    pub idle_timeout: Option<Duration>,
    /// Terminate this long after local end-of-stream, regardless of remote
    /// activity.
    pub quit_delay: Option<Duration>,
}

/// Move bytes in both directions until termination.
///
/// The four streams are listed separately because the local side can be a
/// pipe pair or a device while the remote side is a duplex socket. Both
/// directions are serviced from the single `select!` below; suspension only
/// happens there.
pub async fn pump<LR, LW, RR, RW>(
    local_read: &mut LR,
    local_write: &mut LW,
    remote_read: &mut RR,
    remote_write: &mut RW,
    limits: RelayLimits,
) -> Result<(RelayOutcome, RelaySession)>
where
    LR: AsyncRead + Unpin,
    LW: AsyncWrite + Unpin,
    RR: AsyncRead + Unpin,
    RW: AsyncWrite + Unpin,
{
    let mut session = RelaySession::new();
    let mut local_open = true;
    let mut remote_open = true;

    let mut idle = Deadline::new(limits.idle_timeout);
    idle.arm();
    // Armed only once local input reaches end-of-stream.
    let mut quit = Deadline::new(limits.quit_delay);

    let mut local_buf = BytesMut::zeroed(BUFFER_SIZE);
    let mut remote_buf = BytesMut::zeroed(BUFFER_SIZE);

    while local_open || remote_open {
        tokio::select! {
            read = local_read.read(&mut local_buf), if local_open => {
                let n = read.context("read from local stream")?;
                if n == 0 {
                    debug!("local input closed");
                    local_open = false;
                    quit.arm();
                } else {
                    remote_write
                        .write_all(&local_buf[..n])
                        .await
                        .context("write to remote stream")?;
                    remote_write.flush().await.context("flush remote stream")?;
                    session.record_out(n);
                    idle.arm();
                }
            }
            read = remote_read.read(&mut remote_buf), if remote_open => {
                let n = read.context("read from remote stream")?;
                if n == 0 {
                    debug!("remote input closed");
                    remote_open = false;
                } else {
                    local_write
                        .write_all(&remote_buf[..n])
                        .await
                        .context("write to local stream")?;
                    local_write.flush().await.context("flush local stream")?;
                    session.record_in(n);
                    idle.arm();
                }
            }
            _ = idle.expired(), if idle.is_armed() => {
                return Ok((RelayOutcome::IdleExpired, session));
            }
            _ = quit.expired(), if quit.is_armed() => {
                return Ok((RelayOutcome::QuitExpired, session));
            }
        }
    }

    Ok((RelayOutcome::Closed, session))
}
