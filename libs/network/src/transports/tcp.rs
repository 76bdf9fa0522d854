//! TCP message socket for the instrumentation channel
//!
//! The stream carries `[command_id:u32][payload_size:u32][payload]` frames.
//! [`TcpMessageSocket::receive_packet`] only consumes a frame once all of it
//! sits in the kernel buffer; partial frames are left there and picked up on
//! a later poll.

use crate::address::SocketAddress;
use crate::socket::Socket;
use crate::{Result, TransportError};
use codec::CommandHeader;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsFd, BorrowedFd};
use tracing::{debug, info};

#[derive(Debug)]
pub struct TcpMessageSocket {
    stream: TcpStream,
    address: SocketAddress,
}

impl TcpMessageSocket {
    /// Connect to the controller at `address` and switch to non-blocking mode
    pub fn connect(address: &SocketAddress) -> Result<Self> {
        let target = address.target();
        let stream = TcpStream::connect(target).map_err(|e| {
            TransportError::connection_with_source(
                format!("{}: connect failed", address),
                Some(target),
                e,
            )
        })?;
        Self::from_stream(stream, address.clone())
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream, address: SocketAddress) -> Result<Self> {
        stream.set_nodelay(true).map_err(|e| {
            TransportError::network_with_source(format!("{}: failed to set TCP_NODELAY", address), e)
        })?;
        stream.set_nonblocking(true)?;
        info!("Connected to {}", address);
        Ok(Self { stream, address })
    }

    /// Peek the frame header. `None` while fewer than 8 bytes are buffered.
    fn try_read_header(&mut self) -> Result<Option<CommandHeader>> {
        let mut raw = [0u8; CommandHeader::SIZE];
        let peeked = self.peek(&mut raw)?;
        if peeked < CommandHeader::SIZE {
            return Ok(None);
        }
        Ok(Some(CommandHeader::parse(&raw)?))
    }

    /// Consume the whole frame once it is fully buffered
    fn try_read_payload(&mut self, frame_size: usize, buffer: &mut [u8]) -> Result<usize> {
        let frame = &mut buffer[..frame_size];
        if self.peek(frame)? < frame_size {
            return Ok(0);
        }
        self.stream.read_exact(frame).map_err(|e| {
            TransportError::network_with_source(format!("{}: read failed", self.address), e)
        })?;
        debug!(socket = %self.address, bytes = frame_size, "instrumentation frame received");
        Ok(frame_size)
    }

    fn peek(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.stream.peek(buffer) {
            Ok(0) if !buffer.is_empty() => Err(TransportError::connection(
                format!("{}: connection closed by peer", self.address),
                Some(self.address.target()),
            )),
            Ok(size) => Ok(size),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(TransportError::network_with_source(
                format!("{}: peek failed", self.address),
                e,
            )),
        }
    }
}

impl Socket for TcpMessageSocket {
    fn address(&self) -> Option<&SocketAddress> {
        Some(&self.address)
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.stream.write_all(payload).map_err(|e| {
            TransportError::network_with_source(format!("{}: write failed", self.address), e)
        })?;
        debug!(socket = %self.address, bytes = payload.len(), "instrumentation frame sent");
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.stream.read(buffer) {
            Ok(size) => Ok(size),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(TransportError::network_with_source(
                format!("{}: read failed", self.address),
                e,
            )),
        }
    }

    fn receive_packet(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let Some(header) = self.try_read_header()? else {
            return Ok(0);
        };

        let frame_size = header.frame_size();
        if frame_size > buffer.len() {
            return Err(TransportError::protocol(format!(
                "{}: frame of {} bytes (command {}) does not fit the {} byte receive buffer",
                self.address,
                frame_size,
                header.command_id,
                buffer.len()
            )));
        }

        self.try_read_payload(frame_size, buffer)
    }

    fn set_blocking(&mut self, blocking: bool) -> Result<()> {
        Ok(self.stream.set_nonblocking(!blocking)?)
    }

    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.stream.as_fd())
    }
}
