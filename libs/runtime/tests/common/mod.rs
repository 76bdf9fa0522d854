//! Shared fixtures for runtime integration tests

#![allow(dead_code)]

use network::{Result as TransportResult, Socket, SocketAddress, TransportError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, UdpSocket};
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::Arc;
use types::Direction;

/// What a [`RecordingSocket`] saw, shared with the test body
#[derive(Debug, Default)]
pub struct Wire {
    pub sent: Vec<Vec<u8>>,
    pub inbound: VecDeque<Vec<u8>>,
}

/// Output socket that keeps every datagram it is asked to send
pub struct RecordingSocket {
    address: SocketAddress,
    wire: Arc<Mutex<Wire>>,
}

impl RecordingSocket {
    pub fn output(port: u16) -> (Box<dyn Socket>, Arc<Mutex<Wire>>) {
        let address = SocketAddress::new(Direction::Output, Ipv4Addr::new(239, 7, 0, 1), port);
        let wire = Arc::new(Mutex::new(Wire::default()));
        let socket = Self {
            address,
            wire: Arc::clone(&wire),
        };
        (Box::new(socket), wire)
    }
}

impl Socket for RecordingSocket {
    fn address(&self) -> Option<&SocketAddress> {
        Some(&self.address)
    }

    fn send(&mut self, payload: &[u8]) -> TransportResult<()> {
        self.wire.lock().sent.push(payload.to_vec());
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        let Some(datagram) = self.wire.lock().inbound.pop_front() else {
            return Ok(0);
        };
        let n = datagram.len().min(buffer.len());
        buffer[..n].copy_from_slice(&datagram[..n]);
        Ok(n)
    }

    fn set_blocking(&mut self, _blocking: bool) -> TransportResult<()> {
        Ok(())
    }

    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        None
    }
}

/// Datagram with an all-zero frame header in front of `payload`
pub fn framed(payload: &[u8]) -> Vec<u8> {
    let mut datagram = vec![0u8; codec::HEADER_SIZE];
    datagram.extend_from_slice(payload);
    datagram
}

/// Unicast loopback address for an input port
pub fn loopback_input(port: u16) -> SocketAddress {
    SocketAddress::new(Direction::Input, Ipv4Addr::LOCALHOST, port)
}

/// Send one datagram to a loopback input port
pub fn inject(port: u16, datagram: &[u8]) {
    let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    sender.send_to(datagram, (Ipv4Addr::LOCALHOST, port)).unwrap();
}

/// Loopback input socket whose first receive fails after consuming the
/// pending datagram
pub struct FaultySocket {
    address: SocketAddress,
    socket: UdpSocket,
    failed: bool,
}

impl FaultySocket {
    pub fn bind() -> (Box<dyn Socket>, u16) {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        socket.set_nonblocking(true).unwrap();
        let port = socket.local_addr().unwrap().port();
        let faulty = Self {
            address: loopback_input(port),
            socket,
            failed: false,
        };
        (Box::new(faulty), port)
    }
}

impl Socket for FaultySocket {
    fn address(&self) -> Option<&SocketAddress> {
        Some(&self.address)
    }

    fn send(&mut self, _payload: &[u8]) -> TransportResult<()> {
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        let received = match self.socket.recv(buffer) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => 0,
            Err(e) => return Err(TransportError::network(e.to_string())),
        };
        if !self.failed {
            self.failed = true;
            return Err(TransportError::network("receive failed"));
        }
        Ok(received)
    }

    fn set_blocking(&mut self, blocking: bool) -> TransportResult<()> {
        self.socket
            .set_nonblocking(!blocking)
            .map_err(|e| TransportError::network(e.to_string()))
    }

    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.socket.as_fd())
    }
}
