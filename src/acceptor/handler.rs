//! Handler process dispatch
//!
//! An accepted connection can be handed to an external command whose
//! standard streams are rewired to the socket. Spawning consumes the parent's
//! descriptor copies, so nothing leaks into later loop iterations.

use std::os::fd::OwnedFd;
use std::process::{ExitStatus, Stdio};

use anyhow::Context;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::Result;

/// Build the handler command with stdin and stdout duplicated onto the
/// connection. Persistent mode wires stderr to the connection as well.
fn wire(command: &[String], stream: TcpStream, with_stderr: bool) -> Result<Command> {
    let stream = stream
        .into_std()
        .context("detach connection from the runtime")?;
    // The handler does ordinary blocking I/O on these descriptors.
    stream
        .set_nonblocking(false)
        .context("clear nonblocking on connection")?;

    let mut cmd = Command::new(&command[0]);
    cmd.args(&command[1..]);
    cmd.stdin(Stdio::from(OwnedFd::from(
        stream.try_clone().context("duplicate connection")?,
    )));
    if with_stderr {
        cmd.stderr(Stdio::from(OwnedFd::from(
            stream.try_clone().context("duplicate connection")?,
        )));
    }
    cmd.stdout(Stdio::from(OwnedFd::from(stream)));
    Ok(cmd)
}

/// Spawn the handler wired to the connection and wait for it (single-listen).
pub async fn spawn_and_wait(command: &[String], stream: TcpStream) -> Result<ExitStatus> {
    let mut child = wire(command, stream, false)?
        .spawn()
        .with_context(|| format!("spawn handler '{}'", command[0]))?;
    info!("handler '{}' started (pid {:?})", command[0], child.id());
    let status = child.wait().await.context("wait for handler")?;
    debug!("handler exited: {status}");
    Ok(status)
}

/// Spawn the handler wired to the connection, stderr included, and let it run
/// on its own (persistent-listen). The session's fate is the handler's; only
/// the spawn itself can fail here.
pub fn spawn_detached(command: &[String], stream: TcpStream) -> Result<()> {
    let mut child = wire(command, stream, true)?
        .spawn()
        .with_context(|| format!("spawn handler '{}'", command[0]))?;
    info!("handler '{}' started (pid {:?})", command[0], child.id());

    // Reap in the background so the accept loop never blocks on a session.
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => debug!("handler exited: {status}"),
            Err(err) => warn!("failed to reap handler: {err}"),
        }
    });
    Ok(())
}
