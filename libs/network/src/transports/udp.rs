//! UDP datagram sockets
//!
//! One socket per channel. Multicast groups are joined on the configured
//! interface; a channel whose address is not in 224.0.0.0/4 gets a plain
//! unicast socket instead. Sockets are built with `socket2` so that
//! `SO_REUSEADDR` is set before bind, then handed to `std::net::UdpSocket`
//! for I/O.

use crate::address::SocketAddress;
use crate::socket::Socket;
use crate::{Result, TransportError};
use socket2::{Domain, Protocol, SockAddr, Type};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::os::fd::{AsFd, BorrowedFd};
use tracing::{debug, info};
use types::Direction;

/// Datagram socket bound to one channel address
#[derive(Debug)]
pub struct DatagramSocket {
    socket: UdpSocket,
    address: SocketAddress,
    destination: SocketAddr,
}

impl DatagramSocket {
    /// Open the socket described by `address`, input or output
    pub fn open(address: &SocketAddress) -> Result<Self> {
        match address.direction() {
            Direction::Input => Self::open_input(address),
            Direction::Output => Self::open_output(address),
        }
    }

    /// Boxed constructor usable as a pool socket opener
    pub fn open_boxed(address: &SocketAddress) -> Result<Box<dyn Socket>> {
        Ok(Box::new(Self::open(address)?))
    }

    fn open_input(address: &SocketAddress) -> Result<Self> {
        let raw = new_reusable_socket(address)?;

        let bind_ip = if address.is_multicast() {
            Ipv4Addr::UNSPECIFIED
        } else {
            address.ip()
        };
        bind(&raw, address, SocketAddrV4::new(bind_ip, address.port()))?;

        let socket: UdpSocket = raw.into();
        if address.is_multicast() {
            let interface = address.interface().unwrap_or(Ipv4Addr::UNSPECIFIED);
            socket
                .join_multicast_v4(&address.ip(), &interface)
                .map_err(|e| {
                    TransportError::network_with_source(
                        format!("{}: failed to join multicast group", address),
                        e,
                    )
                })?;
        }
        socket.set_nonblocking(true).map_err(|e| {
            TransportError::network_with_source(format!("{}: set_nonblocking failed", address), e)
        })?;

        info!("Listening on {}", address);
        Ok(Self {
            destination: address.target(),
            socket,
            address: address.clone(),
        })
    }

    fn open_output(address: &SocketAddress) -> Result<Self> {
        let raw = new_reusable_socket(address)?;

        if address.is_multicast() {
            if let Some(interface) = address.interface() {
                raw.set_multicast_if_v4(&interface).map_err(|e| {
                    TransportError::network_with_source(
                        format!("{}: failed to select multicast interface", address),
                        e,
                    )
                })?;
            }
        }

        let local_ip = address.interface().unwrap_or(Ipv4Addr::UNSPECIFIED);
        bind(&raw, address, SocketAddrV4::new(local_ip, address.outgoing_port()))?;

        let socket: UdpSocket = raw.into();
        let configured = if address.is_multicast() {
            socket
                .set_multicast_ttl_v4(address.ttl())
                .and_then(|_| socket.set_multicast_loop_v4(true))
        } else {
            socket.set_ttl(address.ttl())
        };
        configured.map_err(|e| {
            TransportError::network_with_source(format!("{}: failed to set TTL", address), e)
        })?;

        info!("Emitting on {}", address);
        Ok(Self {
            destination: address.target(),
            socket,
            address: address.clone(),
        })
    }

    /// Actual local endpoint (useful when bound to port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

fn new_reusable_socket(address: &SocketAddress) -> Result<socket2::Socket> {
    let raw = socket2::Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(|e| {
        TransportError::network_with_source(format!("{}: socket creation failed", address), e)
    })?;
    raw.set_reuse_address(true).map_err(|e| {
        TransportError::network_with_source(format!("{}: failed to set SO_REUSEADDR", address), e)
    })?;
    Ok(raw)
}

fn bind(raw: &socket2::Socket, address: &SocketAddress, local: SocketAddrV4) -> Result<()> {
    raw.bind(&SockAddr::from(local)).map_err(|e| {
        TransportError::network_with_source(format!("{}: failed to bind {}", address, local), e)
    })
}

impl Socket for DatagramSocket {
    fn address(&self) -> Option<&SocketAddress> {
        Some(&self.address)
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.address.direction() == Direction::Input {
            return Err(TransportError::configuration(
                format!("{}: cannot send on an input socket", self.address),
                Some("direction"),
            ));
        }

        let sent = self.socket.send_to(payload, self.destination).map_err(|e| {
            TransportError::network_with_source(format!("{}: send failed", self.address), e)
        })?;
        if sent != payload.len() {
            return Err(TransportError::network(format!(
                "{}: short send ({} of {} bytes)",
                self.address,
                sent,
                payload.len()
            )));
        }
        debug!(socket = %self.address, bytes = sent, "datagram sent");
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if self.address.direction() == Direction::Output {
            return Err(TransportError::configuration(
                format!("{}: cannot receive on an output socket", self.address),
                Some("direction"),
            ));
        }

        match self.socket.recv(buffer) {
            Ok(size) => {
                debug!(socket = %self.address, bytes = size, "datagram received");
                Ok(size)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(TransportError::network_with_source(
                format!("{}: receive failed", self.address),
                e,
            )),
        }
    }

    fn set_blocking(&mut self, blocking: bool) -> Result<()> {
        Ok(self.socket.set_nonblocking(!blocking)?)
    }

    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.socket.as_fd())
    }
}
