//! Detached continuation for ephemeral-port listening
//!
//! When no local port was given and a handler command is configured, the
//! caller only needs the printed port line: the accept loop continues in a
//! detached copy of this executable and the original invocation returns
//! immediately. The continuation inherits the listening socket itself on
//! fd 0, so the announced port stays connectable across the handoff.

use std::os::fd::{FromRawFd, OwnedFd};
use std::process::{Command, Stdio};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::{Config, Mode};
use crate::Result;

/// Rebuild the continuation command line. The socket rides on fd 0 and
/// backgrounding implies a handler command, so only the mode and the command
/// still matter: the bind options are already decided, the relay deadlines
/// never apply to handler sessions, and the accept wait in the continuation
/// is unbounded, like the detached original's.
fn continuation_args(config: &Config) -> Vec<String> {
    let mut args = Vec::new();
    match config.mode {
        Mode::ListenLoop => args.push("-L".to_string()),
        _ => args.push("-l".to_string()),
    }
    args.push("--inherited-listener".to_string());
    args.extend(config.command.iter().cloned());
    args
}

/// Spawn the continuation process and return immediately. The listening
/// socket is handed over as the child's fd 0.
pub fn spawn_continuation(config: &Config, listener: TcpListener) -> Result<()> {
    let exe = std::env::current_exe().context("locate current executable")?;
    let listener = listener
        .into_std()
        .context("detach listener from the runtime")?;
    listener
        .set_nonblocking(false)
        .context("clear nonblocking on listener")?;

    let child = Command::new(&exe)
        .args(continuation_args(config))
        .stdin(Stdio::from(OwnedFd::from(listener)))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("spawn background listener")?;
    info!("listening continues in background (pid {})", child.id());
    Ok(())
}

/// Take over the listening socket handed down on fd 0 by
/// [`spawn_continuation`].
pub fn inherited_listener() -> Result<TcpListener> {
    // SAFETY: fd 0 is the listening socket the parent wired onto our stdin;
    // nothing else in this process touches stdin once the flag is set.
    let listener = unsafe { std::net::TcpListener::from_raw_fd(0) };
    listener
        .set_nonblocking(true)
        .context("set nonblocking on inherited listener")?;
    TcpListener::from_std(listener).context("register inherited listener")
}
