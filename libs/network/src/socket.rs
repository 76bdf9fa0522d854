//! The socket capability shared by every transport
//!
//! Ports never own a concrete socket type. They see `dyn Socket` through the
//! pool, which lets the pool swap a live socket for a [`VoidSocket`] (or a
//! redirected one) without the port noticing.

use crate::address::SocketAddress;
use crate::Result;
use std::os::fd::BorrowedFd;
use tracing::trace;

pub trait Socket: Send {
    /// Configured endpoint, `None` for sockets without one
    fn address(&self) -> Option<&SocketAddress>;

    /// Transmit one datagram, or one complete frame on a stream
    fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Read whatever is pending into `buffer`. `Ok(0)` means nothing was ready.
    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Read exactly one framed packet, `Ok(0)` if a whole packet is not yet
    /// available. Datagram sockets are already framed.
    fn receive_packet(&mut self, buffer: &mut [u8]) -> Result<usize> {
        self.receive(buffer)
    }

    fn set_blocking(&mut self, blocking: bool) -> Result<()>;

    /// Descriptor to poll for readability; `None` is never ready
    fn poll_fd(&self) -> Option<BorrowedFd<'_>>;

    fn describe(&self) -> String {
        match self.address() {
            Some(address) => address.to_string(),
            None => "unbound socket".to_string(),
        }
    }
}

/// Socket that drops everything it is asked to send and never has input
#[derive(Debug, Default)]
pub struct VoidSocket {
    address: Option<SocketAddress>,
}

impl VoidSocket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Void socket standing in for a stopped channel
    pub fn replacing(address: SocketAddress) -> Self {
        Self {
            address: Some(address),
        }
    }
}

impl Socket for VoidSocket {
    fn address(&self) -> Option<&SocketAddress> {
        self.address.as_ref()
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        trace!(bytes = payload.len(), "void socket dropped payload");
        Ok(())
    }

    fn receive(&mut self, _buffer: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn set_blocking(&mut self, _blocking: bool) -> Result<()> {
        Ok(())
    }

    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        None
    }

    fn describe(&self) -> String {
        match &self.address {
            Some(address) => format!("void socket for {}", address),
            None => "void socket".to_string(),
        }
    }
}
