//! netrelay - Minimal TCP relay
//!
//! Forwards stdin/stdout (or a device file) to a TCP peer, or accepts TCP
//! connections and relays them to stdin/stdout or to a freshly spawned
//! handler command.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netrelay::acceptor::{background, Acceptor};
use netrelay::relay;
use netrelay::{Config, Mode};

/// CLI arguments for netrelay
#[derive(Parser, Debug)]
#[command(name = "netrelay")]
#[command(about = "Minimal TCP relay between stdio, device files, sockets and handler commands")]
#[command(version)]
#[command(long_about = "
netrelay [OPTIONS] {HOST PORT | -f PATH | -l [COMMAND...] | -L [COMMAND...]}

Dial HOST PORT and wire the connection to stdin/stdout, use a device file in
place of the network, or listen for connections. A command after -l or -L is
spawned per connection with its standard streams bound to the connection;
without one, accepted connections are relayed to stdin/stdout. Listening
without -p binds an ephemeral port and prints it on stdout first.

Post-connect timeouts (-W, -q) end the relay successfully; only a
connect-phase timeout (-w) is an error.
")]
pub struct CliArgs {
    /// Use a device file (e.g. /dev/ttyS0) instead of the network
    #[arg(short = 'f', long = "file", value_name = "PATH",
          conflicts_with_all = ["listen", "listen_loop"])]
    pub file: Option<PathBuf>,

    /// Listen for one incoming connection
    #[arg(short = 'l', long = "listen", conflicts_with = "listen_loop")]
    pub listen: bool,

    /// Listen for incoming connections repeatedly (server mode)
    #[arg(short = 'L', long = "listen-loop")]
    pub listen_loop: bool,

    /// Local port to bind
    #[arg(short = 'p', long = "port", value_name = "PORT",
          value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Local source address to bind
    #[arg(short = 's', long = "source", value_name = "ADDR")]
    pub source: Option<String>,

    /// Seconds allowed to establish a connection (0 = no timeout)
    #[arg(short = 'w', long = "connect-timeout", value_name = "SECONDS",
          value_parser = parse_seconds)]
    pub connect_timeout: Option<Duration>,

    /// Seconds allowed with no data on an established connection (0 = no timeout)
    #[arg(short = 'W', long = "idle-timeout", value_name = "SECONDS",
          value_parser = parse_seconds)]
    pub idle_timeout: Option<Duration>,

    /// Seconds to linger after EOF on stdin, even if the remote side is still open
    #[arg(short = 'q', long = "quit-delay", value_name = "SECONDS",
          value_parser = parse_seconds)]
    pub quit_delay: Option<Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", help = "Log level")]
    pub log_level: String,

    /// Enable verbose logging
    #[arg(short = 'v', long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Take over a listening socket inherited on fd 0 (internal, set by the
    /// backgrounding handoff)
    #[arg(long = "inherited-listener", hide = true)]
    pub inherited_listener: bool,

    /// HOST PORT to dial, or the handler COMMAND with arguments for -l/-L
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

/// Accept both bare seconds ("5") and suffixed durations ("5s", "500ms").
fn parse_seconds(value: &str) -> Result<Duration, String> {
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value).map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    init_tracing(&args);

    // Exit explicitly on both paths: a pending blocking stdin read keeps the
    // runtime from shutting down on drop, which would turn a graceful idle or
    // quit termination into a hang.
    match run(args).await {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            eprintln!("netrelay: {err:#}");
            std::process::exit(1);
        }
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let (mode, command) = Mode::select(
        args.file.clone(),
        args.listen,
        args.listen_loop,
        args.args.clone(),
    )?;
    let config = Config {
        mode,
        source_addr: args.source.clone(),
        source_port: args.port,
        connect_timeout: active(args.connect_timeout),
        idle_timeout: active(args.idle_timeout),
        quit_delay: active(args.quit_delay),
        command,
        inherited_listener: args.inherited_listener,
    };
    config.validate()?;

    serve(config).await
}

/// A zero timeout means "no timeout".
fn active(limit: Option<Duration>) -> Option<Duration> {
    limit.filter(|limit| !limit.is_zero())
}

async fn serve(config: Config) -> Result<()> {
    match config.mode.clone() {
        Mode::Dial { host, port } => {
            let acceptor = Acceptor::new(config.clone());
            let stream = acceptor.dial(&host, &port).await?;
            let (mut remote_read, mut remote_write) = stream.into_split();
            let mut stdin = tokio::io::stdin();
            let mut stdout = tokio::io::stdout();
            let (outcome, session) = relay::pump(
                &mut stdin,
                &mut stdout,
                &mut remote_read,
                &mut remote_write,
                config.limits(),
            )
            .await?;
            session.log_complete(outcome);
            Ok(())
        }
        Mode::Device { path } => {
            let device = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .with_context(|| format!("open device {}", path.display()))?;
            let mut device_read = tokio::fs::File::from_std(
                device.try_clone().context("duplicate device handle")?,
            );
            let mut device_write = tokio::fs::File::from_std(device);
            let mut stdin = tokio::io::stdin();
            let mut stdout = tokio::io::stdout();
            let (outcome, session) = relay::pump(
                &mut stdin,
                &mut stdout,
                &mut device_read,
                &mut device_write,
                config.limits(),
            )
            .await?;
            session.log_complete(outcome);
            Ok(())
        }
        Mode::ListenOnce | Mode::ListenLoop => {
            let acceptor = Acceptor::new(config.clone());
            let listener = if config.inherited_listener {
                background::inherited_listener()?
            } else {
                acceptor.bind().await?
            };
            let port = listener
                .local_addr()
                .context("listener local address")?
                .port();

            if config.source_port.is_none() && !config.inherited_listener {
                // Wrapper scripts read the chosen port before connecting.
                println!("{port}");
                std::io::stdout().flush().context("flush port line")?;

                if !config.command.is_empty() {
                    // The continuation takes over this very socket, so the
                    // printed port stays live across the handoff.
                    background::spawn_continuation(&config, listener)?;
                    return Ok(());
                }
            }

            if let Some(status) = acceptor.accept_loop(listener).await? {
                // Single-listen handler: surface the handler's own status.
                if !status.success() {
                    std::process::exit(status.code().unwrap_or(1));
                }
            }
            Ok(())
        }
    }
}

/// Initialize tracing/logging. Diagnostics go to stderr because stdout
/// carries relayed data and the bound-port line.
fn init_tracing(args: &CliArgs) {
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(env_filter)
        .init();
}
