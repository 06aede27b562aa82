//! Configuration Types

use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;

use crate::relay::RelayLimits;
use crate::Result;

/// Which of the mutually exclusive transports/roles was selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Connect out to a host and port and relay stdin/stdout.
    Dial { host: String, port: String },
    /// Open a bidirectional device file in place of a socket.
    Device { path: PathBuf },
    /// Accept exactly one incoming connection.
    ListenOnce,
    /// Accept incoming connections until killed.
    ListenLoop,
}

impl Mode {
    /// Pick the mode from the flag set and the positional arguments.
    ///
    /// The positional slot means HOST PORT when dialing and the handler
    /// command when listening, so the count check depends on the selected
    /// mode and cannot be expressed declaratively. Returns the mode together
    /// with the handler command (empty outside listen modes).
    pub fn select(
        device: Option<PathBuf>,
        listen_once: bool,
        listen_loop: bool,
        mut args: Vec<String>,
    ) -> Result<(Mode, Vec<String>)> {
        if let Some(path) = device {
            if listen_once || listen_loop {
                bail!("a device file cannot be combined with -l/-L");
            }
            if !args.is_empty() {
                bail!("bad argument count: a device file takes no positional arguments");
            }
            return Ok((Mode::Device { path }, Vec::new()));
        }
        if listen_loop {
            return Ok((Mode::ListenLoop, args));
        }
        if listen_once {
            return Ok((Mode::ListenOnce, args));
        }
        if args.len() != 2 {
            bail!("bad argument count: dialing takes exactly HOST PORT");
        }
        let port = args.pop().unwrap_or_default();
        let host = args.pop().unwrap_or_default();
        Ok((Mode::Dial { host, port }, Vec::new()))
    }
}

/// Main configuration structure, constructed once from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    /// Local address to bind (source side of a dial, or the listen address).
    pub source_addr: Option<String>,
    /// Local port to bind; listening picks an ephemeral port when unset.
    pub source_port: Option<u16>,
    /// Time allowed to establish (dial) or receive (listen) a connection.
    pub connect_timeout: Option<Duration>,
    /// Time allowed with no data in either direction once connected.
    pub idle_timeout: Option<Duration>,
    /// Grace period after EOF on local input before terminating.
    pub quit_delay: Option<Duration>,
    /// Handler command plus arguments (listen modes only).
    pub command: Vec<String>,
    /// The listening socket was inherited on fd 0 from a backgrounding
    /// parent; skip bind and port reporting.
    pub inherited_listener: bool,
}

impl Config {
    pub fn new(mode: Mode, command: Vec<String>) -> Self {
        Self {
            mode,
            source_addr: None,
            source_port: None,
            connect_timeout: None,
            idle_timeout: None,
            quit_delay: None,
            command,
            inherited_listener: false,
        }
    }

    /// Validate cross-field argument combinations.
    pub fn validate(&self) -> Result<()> {
        if self.source_port == Some(0) {
            bail!("local port must be in 1..=65535");
        }
        match self.mode {
            Mode::Dial { .. } | Mode::Device { .. } => {
                if !self.command.is_empty() {
                    bail!("a handler command requires -l or -L");
                }
            }
            Mode::ListenOnce | Mode::ListenLoop => {}
        }
        Ok(())
    }

    /// The deadlines governing an established connection.
    pub fn limits(&self) -> RelayLimits {
        RelayLimits {
            idle_timeout: self.idle_timeout,
            quit_delay: self.quit_delay,
        }
    }
}
