//! Connection setup and dispatch
//!
//! Owns the dial path and the listening socket. Accepted (or dialed)
//! connections are handed to the relay, or to a spawned handler command in
//! listen modes. Socket setup failures are fatal; a session ending through a
//! post-connect deadline is not.

pub mod background;
pub mod handler;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::process::ExitStatus;

use anyhow::Context;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::info;

use crate::config::{Config, Mode};
use crate::relay;
use crate::resolver;
use crate::timeout;
use crate::Result;

const LISTEN_BACKLOG: u32 = 5;

/// Dispatches connections according to the configured mode.
pub struct Acceptor {
    config: Config,
}

impl Acceptor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Resolve the target and connect, bounded by the connect deadline.
    /// The deadline covers resolution as well as the TCP handshake.
    pub async fn dial(&self, host: &str, service: &str) -> Result<TcpStream> {
        timeout::bounded(self.config.connect_timeout, "connect", async {
            let target = resolver::resolve(host, service).await?;
            let socket = self.socket(false).await?;
            let stream = socket
                .connect(SocketAddr::V4(target))
                .await
                .with_context(|| format!("connect to {target}"))?;
            info!("connected to {target}");
            Ok(stream)
        })
        .await
    }

    /// Bind the listening socket, defaulting to 0.0.0.0 on an ephemeral port.
    pub async fn bind(&self) -> Result<TcpListener> {
        let socket = self.socket(true).await?;
        let listener = socket.listen(LISTEN_BACKLOG).context("listen")?;
        info!(
            "listening on {}",
            listener.local_addr().context("local address")?
        );
        Ok(listener)
    }

    /// Accept and dispatch connections until done.
    ///
    /// Single-listen serves one connection and returns; with a handler
    /// command the handler's exit status is returned for the caller to
    /// surface. Persistent mode loops forever: handlers are detached so the
    /// loop never blocks on a session, while the relay (no handler) runs
    /// sessions sequentially and keeps accepting after each one ends.
    pub async fn accept_loop(&self, listener: TcpListener) -> Result<Option<ExitStatus>> {
        let persistent = matches!(self.config.mode, Mode::ListenLoop);
        // The connect deadline covers the wait for the first connection only;
        // `take` disarms it once a connection exists.
        let mut connect_limit = self.config.connect_timeout;

        loop {
            let (stream, peer) = timeout::bounded(connect_limit.take(), "accept", async {
                listener.accept().await.context("accept")
            })
            .await?;
            info!("accepted connection from {peer}");

            if self.config.command.is_empty() {
                let (mut remote_read, mut remote_write) = stream.into_split();
                let mut stdin = tokio::io::stdin();
                let mut stdout = tokio::io::stdout();
                let (outcome, session) = relay::pump(
                    &mut stdin,
                    &mut stdout,
                    &mut remote_read,
                    &mut remote_write,
                    self.config.limits(),
                )
                .await?;
                session.log_complete(outcome);
                if !persistent {
                    return Ok(None);
                }
            } else if persistent {
                handler::spawn_detached(&self.config.command, stream)?;
            } else {
                let status = handler::spawn_and_wait(&self.config.command, stream).await?;
                return Ok(Some(status));
            }
        }
    }

    /// Build an IPv4 socket, binding it when listening or when a source
    /// address or port was configured.
    async fn socket(&self, listen: bool) -> Result<TcpSocket> {
        let socket = TcpSocket::new_v4().context("create socket")?;
        socket.set_reuseaddr(true).context("set SO_REUSEADDR")?;
        if listen || self.config.source_addr.is_some() || self.config.source_port.is_some() {
            let ip = match &self.config.source_addr {
                Some(host) => resolver::resolve_host(host).await?,
                None => Ipv4Addr::UNSPECIFIED,
            };
            let addr = SocketAddrV4::new(ip, self.config.source_port.unwrap_or(0));
            socket
                .bind(SocketAddr::V4(addr))
                .with_context(|| format!("bind {addr}"))?;
        }
        Ok(socket)
    }
}
