//! Channel endpoint addressing
//!
//! A [`SocketAddress`] is what a port is configured with: direction, target
//! IPv4 address and port, plus the multicast interface, TTL and the local
//! port used by output sockets. Two addresses identify the same channel
//! when direction, ip and port match; the remaining fields only tune the
//! socket.

use crate::{Result, TransportError};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use types::Direction;

pub const DEFAULT_TTL: u32 = 1;

#[derive(Debug, Clone)]
pub struct SocketAddress {
    direction: Direction,
    ip: Ipv4Addr,
    port: u16,
    interface: Option<Ipv4Addr>,
    ttl: u32,
    outgoing_port: u16,
}

impl SocketAddress {
    pub fn new(direction: Direction, ip: Ipv4Addr, port: u16) -> Self {
        Self {
            direction,
            ip,
            port,
            interface: None,
            ttl: DEFAULT_TTL,
            outgoing_port: 0,
        }
    }

    /// Parse `"a.b.c.d:port"` for the given direction
    pub fn parse(direction: Direction, endpoint: &str) -> Result<Self> {
        let (ip, port) = parse_endpoint(endpoint)?;
        Ok(Self::new(direction, ip, port))
    }

    pub fn with_interface(mut self, interface: Option<Ipv4Addr>) -> Self {
        self.interface = interface;
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Local port for output sockets. Inputs cannot pin one.
    pub fn with_outgoing_port(mut self, outgoing_port: u16) -> Result<Self> {
        if self.direction == Direction::Input && outgoing_port != 0 {
            return Err(TransportError::configuration(
                format!(
                    "Input address {}:{} cannot have an outgoing port ({})",
                    self.ip, self.port, outgoing_port
                ),
                Some("outgoing_port"),
            ));
        }
        self.outgoing_port = outgoing_port;
        Ok(self)
    }

    /// Same tuning (interface, TTL, outgoing port), different target
    pub fn retarget(&self, ip: Ipv4Addr, port: u16) -> Self {
        Self {
            ip,
            port,
            ..self.clone()
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn interface(&self) -> Option<Ipv4Addr> {
        self.interface
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn outgoing_port(&self) -> u16 {
        self.outgoing_port
    }

    pub fn is_multicast(&self) -> bool {
        self.ip.is_multicast()
    }

    pub fn target(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl PartialEq for SocketAddress {
    fn eq(&self, other: &Self) -> bool {
        self.direction == other.direction && self.ip == other.ip && self.port == other.port
    }
}

impl Eq for SocketAddress {}

impl Hash for SocketAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.direction.hash(state);
        self.ip.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} address {}:{}", self.direction, self.ip, self.port)?;
        if let Some(interface) = self.interface {
            write!(f, " on interface {}", interface)?;
        }
        if self.ttl != DEFAULT_TTL {
            write!(f, " with TTL {}", self.ttl)?;
        }
        if self.outgoing_port != 0 {
            write!(f, " output port {}", self.outgoing_port)?;
        }
        Ok(())
    }
}

/// Split `"ip:port"` into its parts
pub fn parse_endpoint(endpoint: &str) -> Result<(Ipv4Addr, u16)> {
    let (ip, port) = endpoint.trim().rsplit_once(':').ok_or_else(|| {
        TransportError::configuration(
            format!("Address '{}' is not of the form ip:port", endpoint),
            Some("address"),
        )
    })?;
    let ip = ip.parse::<Ipv4Addr>().map_err(|_| {
        TransportError::configuration(
            format!("Invalid IPv4 address '{}' in '{}'", ip, endpoint),
            Some("address"),
        )
    })?;
    let port = port.parse::<u16>().map_err(|_| {
        TransportError::configuration(
            format!("Invalid port '{}' in '{}'", port, endpoint),
            Some("address"),
        )
    })?;
    Ok((ip, port))
}
