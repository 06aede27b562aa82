//! IPv4 name and service resolution
//!
//! The transport is IPv4 TCP only, so lookups filter out every other address
//! family. Service names come from the system services database; std's
//! address parsing only accepts numeric ports, so the name-to-port step is
//! done here before the host lookup.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use tokio::net::lookup_host;
use tracing::debug;

use crate::Result;

const SERVICES_DB: &str = "/etc/services";

/// Resolve a host and a service (numeric port or TCP service name) to an
/// IPv4 socket address.
pub async fn resolve(host: &str, service: &str) -> Result<SocketAddrV4> {
    let port = match service.parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => port as u16,
        Ok(_) => bail!("bad port '{service}'"),
        Err(_) => lookup_service(Path::new(SERVICES_DB), service)?,
    };

    // Literal x.x.x.x needs no lookup at all.
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(SocketAddrV4::new(ip, port));
    }
    let ip = lookup_ipv4(host, port).await?;
    Ok(SocketAddrV4::new(ip, port))
}

/// Resolve a bind-side host with no service component.
pub async fn resolve_host(host: &str) -> Result<Ipv4Addr> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    lookup_ipv4(host, 0).await
}

async fn lookup_ipv4(host: &str, port: u16) -> Result<Ipv4Addr> {
    let addrs = lookup_host((host, port))
        .await
        .with_context(|| format!("no host '{host}'"))?;
    for addr in addrs {
        if let SocketAddr::V4(v4) = addr {
            debug!("resolved {host} to {}", v4.ip());
            return Ok(*v4.ip());
        }
    }
    Err(anyhow!("no IPv4 address for '{host}'"))
}

/// Look up a TCP service name in the services database, the same mapping
/// getservbyname consults.
fn lookup_service(db_path: &Path, name: &str) -> Result<u16> {
    let db = std::fs::read_to_string(db_path)
        .with_context(|| format!("read services database {}", db_path.display()))?;
    let port = service_port(&db, name)
        .ok_or_else(|| anyhow!("unknown TCP service '{name}'"))?;
    debug!("resolved service {name} to port {port}");
    Ok(port)
}

/// Scan services-database text for `name  port/tcp  aliases...` entries.
fn service_port(db: &str, name: &str) -> Option<u16> {
    for line in db.lines() {
        let line = line.split('#').next().unwrap_or("");
        let mut fields = line.split_whitespace();
        let Some(service) = fields.next() else { continue };
        let Some(port_proto) = fields.next() else { continue };
        let Some((port, proto)) = port_proto.split_once('/') else {
            continue;
        };
        if proto != "tcp" {
            continue;
        }
        let Ok(port) = port.parse::<u16>() else { continue };
        if service == name || fields.any(|alias| alias == name) {
            return Some(port);
        }
    }
    None
}
