//! Ports
//!
//! A port owns one socket slot of the pool, the byte buffer ("fifo") that
//! holds the frame header plus the payload, and the messages mapped onto
//! that payload. Receiving scatters an incoming datagram into the
//! messages; sending gathers them back, stamps a fresh header and
//! transmits.
//!
//! | Kind            | Messages keyed by     | Scheduling  |
//! |-----------------|-----------------------|-------------|
//! | analogue / NAD  | byte offset           | periodic    |
//! | discrete        | byte offset           | on change   |
//! | AFDX sampling   | single message        | periodic    |
//! | AFDX queuing    | single message        | on push     |
//! | A429            | label number and SDI  | periodic    |
//! | CAN             | CAN id                | periodic    |

pub mod a429;
pub mod afdx;
pub mod can;
pub mod schedule;
pub mod signal;

pub use a429::A429Port;
pub use afdx::{AfdxQueuingPort, AfdxSamplingPort};
pub use can::CanPort;
pub use schedule::Schedule;
pub use signal::SignalPort;

use crate::error::{EngineError, Result};
use crate::message::{Message, MessageInfo};
use codec::a429::Sdi;
use codec::{HeaderEncoder, HeaderFlags, HEADER_SIZE};
use network::Socket;
use types::{Direction, Mode, NadType, PortId, PortKind, SocketId};

/// Times stamped into outgoing headers and used for validity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamps {
    /// Simulation time, advanced by `progress`
    pub sim_time_us: u64,
    /// Wall clock captured at the start of `send_all`
    pub posix_time_us: u64,
}

/// Everything needed to create a port
#[derive(Debug, Clone)]
pub struct PortSpec {
    pub channel: String,
    pub kind: PortKind,
    pub direction: Direction,
    /// Payload bytes after the header, for offset-mapped ports
    pub payload_size: usize,
    pub period_us: u64,
    pub header: HeaderFlags,
}

impl PortSpec {
    pub fn new(channel: impl Into<String>, kind: PortKind, direction: Direction) -> Self {
        Self {
            channel: channel.into(),
            kind,
            direction,
            payload_size: 0,
            period_us: 0,
            header: HeaderFlags::NONE,
        }
    }

    pub fn with_payload_size(mut self, payload_size: usize) -> Self {
        self.payload_size = payload_size;
        self
    }

    pub fn with_period_us(mut self, period_us: u64) -> Self {
        self.period_us = period_us;
        self
    }

    pub fn with_header(mut self, header: HeaderFlags) -> Self {
        self.header = header;
        self
    }
}

/// A message to map onto a port
#[derive(Debug, Clone)]
pub struct MessageSpec {
    pub name: String,
    pub period_us: u64,
    pub validity_duration_us: u64,
    pub shape: MessageShape,
}

/// Per-kind placement and encoding of a message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageShape {
    Analogue {
        offset: usize,
        scale: f32,
        gain: f32,
        init: Option<f32>,
    },
    Discrete {
        offset: usize,
        true_state: u8,
        false_state: u8,
        init: Option<bool>,
    },
    Nad {
        offset: usize,
        size: usize,
        nad_type: NadType,
        dims: Vec<u32>,
    },
    AfdxSampling {
        size: usize,
        init: Option<Vec<u8>>,
    },
    AfdxQueuing {
        size: usize,
        depth: usize,
    },
    A429 {
        /// Octal label number, e.g. `"203"`
        label: String,
        sdi: Sdi,
        mode: Mode,
        depth: usize,
        init: Option<Vec<u8>>,
    },
    Can {
        can_id: u32,
        size: usize,
        init: Option<Vec<u8>>,
    },
}

impl MessageSpec {
    pub fn new(name: impl Into<String>, shape: MessageShape) -> Self {
        Self {
            name: name.into(),
            period_us: 0,
            validity_duration_us: 0,
            shape,
        }
    }

    pub fn with_validity_duration_us(mut self, validity_duration_us: u64) -> Self {
        self.validity_duration_us = validity_duration_us;
        self
    }

    pub fn with_period_us(mut self, period_us: u64) -> Self {
        self.period_us = period_us;
        self
    }
}

/// State shared by every port kind
#[derive(Debug)]
pub struct PortCore {
    id: PortId,
    channel: String,
    kind: PortKind,
    direction: Direction,
    socket: SocketId,
    header: HeaderEncoder,
    fifo: Vec<u8>,
    queued: bool,
    schedule: Schedule,
}

impl PortCore {
    pub fn new(id: PortId, spec: &PortSpec, socket: SocketId, prod_id: u16) -> Self {
        Self {
            id,
            channel: spec.channel.clone(),
            kind: spec.kind,
            direction: spec.direction,
            socket,
            header: HeaderEncoder::new(prod_id, spec.header),
            fifo: vec![0; HEADER_SIZE + spec.payload_size],
            queued: false,
            schedule: Schedule::new(spec.period_us),
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn kind(&self) -> PortKind {
        self.kind
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn socket(&self) -> SocketId {
        self.socket
    }

    pub fn header(&self) -> &HeaderEncoder {
        &self.header
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }

    pub(crate) fn set_queued(&mut self, queued: bool) {
        self.queued = queued;
    }

    /// Bytes after the header
    pub fn payload_size(&self) -> usize {
        self.fifo.len() - HEADER_SIZE
    }

    /// Stamp a fresh header at the start of the fifo
    fn stamp(&mut self, times: Timestamps) -> Result<()> {
        self.header
            .encode(&mut self.fifo, times.posix_time_us, times.sim_time_us)?;
        Ok(())
    }

    fn info(&self, name: &str) -> MessageInfo {
        MessageInfo::new(name, self.kind.protocol(), self.direction, Mode::Sampling)
    }

    fn mismatch(&self, spec: &MessageSpec) -> EngineError {
        EngineError::initialization(format!(
            "Message {} cannot be mapped on {} port {}",
            spec.name, self.kind, self.channel
        ))
    }
}

#[derive(Debug)]
pub enum Port {
    Signal(SignalPort),
    AfdxSampling(AfdxSamplingPort),
    AfdxQueuing(AfdxQueuingPort),
    A429(A429Port),
    Can(CanPort),
}

impl Port {
    pub fn new(id: PortId, spec: &PortSpec, socket: SocketId, prod_id: u16) -> Self {
        let core = PortCore::new(id, spec, socket, prod_id);
        match spec.kind {
            PortKind::Analogue | PortKind::Discrete | PortKind::Nad => {
                Port::Signal(SignalPort::new(core))
            }
            PortKind::AfdxSampling => Port::AfdxSampling(AfdxSamplingPort::new(core)),
            PortKind::AfdxQueuing => Port::AfdxQueuing(AfdxQueuingPort::new(core)),
            PortKind::A429 => Port::A429(A429Port::new(core)),
            PortKind::Can => Port::Can(CanPort::new(core)),
        }
    }

    pub fn core(&self) -> &PortCore {
        match self {
            Port::Signal(port) => &port.core,
            Port::AfdxSampling(port) => &port.core,
            Port::AfdxQueuing(port) => &port.core,
            Port::A429(port) => &port.core,
            Port::Can(port) => &port.core,
        }
    }

    pub fn core_mut(&mut self) -> &mut PortCore {
        match self {
            Port::Signal(port) => &mut port.core,
            Port::AfdxSampling(port) => &mut port.core,
            Port::AfdxQueuing(port) => &mut port.core,
            Port::A429(port) => &mut port.core,
            Port::Can(port) => &mut port.core,
        }
    }

    pub fn id(&self) -> PortId {
        self.core().id
    }

    pub fn channel(&self) -> &str {
        self.core().channel()
    }

    pub fn direction(&self) -> Direction {
        self.core().direction
    }

    pub fn socket(&self) -> SocketId {
        self.core().socket
    }

    pub fn is_periodic_output(&self) -> bool {
        self.core().kind.is_periodic() && self.core().direction == Direction::Output
    }

    pub fn messages(&self) -> &[Message] {
        match self {
            Port::Signal(port) => &port.messages,
            Port::AfdxSampling(port) => &port.messages,
            Port::AfdxQueuing(port) => &port.messages,
            Port::A429(port) => &port.messages,
            Port::Can(port) => &port.messages,
        }
    }

    pub fn messages_mut(&mut self) -> &mut [Message] {
        match self {
            Port::Signal(port) => &mut port.messages,
            Port::AfdxSampling(port) => &mut port.messages,
            Port::AfdxQueuing(port) => &mut port.messages,
            Port::A429(port) => &mut port.messages,
            Port::Can(port) => &mut port.messages,
        }
    }

    pub fn message(&self, slot: u32) -> Option<&Message> {
        self.messages().get(slot as usize)
    }

    pub fn message_mut(&mut self, slot: u32) -> Option<&mut Message> {
        self.messages_mut().get_mut(slot as usize)
    }

    /// Map a message. Returns its slot; registering an equivalent message
    /// twice returns the existing slot.
    pub fn register(&mut self, spec: MessageSpec) -> Result<u32> {
        let slot = match self {
            Port::Signal(port) => port.register(spec)?,
            Port::AfdxSampling(port) => port.register(spec)?,
            Port::AfdxQueuing(port) => port.register(spec)?,
            Port::A429(port) => port.register(spec)?,
            Port::Can(port) => port.register(spec)?,
        };
        u32::try_from(slot).map_err(|_| EngineError::initialization("Too many messages on one port"))
    }

    /// Drain the socket into the messages. Returns the datagrams read.
    pub fn receive(&mut self, socket: &mut dyn Socket, now_us: u64) -> Result<usize> {
        match self {
            Port::Signal(port) => port.receive(socket, now_us),
            Port::AfdxSampling(port) => port.receive(socket, now_us),
            Port::AfdxQueuing(port) => port.receive(socket),
            Port::A429(port) => port.receive(socket, now_us),
            Port::Can(port) => port.receive(socket, now_us),
        }
    }

    /// Transmit now. Returns the datagrams sent.
    pub fn send(&mut self, socket: &mut dyn Socket, times: Timestamps) -> Result<usize> {
        match self {
            Port::Signal(port) => port.send(socket, times),
            Port::AfdxSampling(port) => port.send(socket, times),
            Port::AfdxQueuing(port) => port.send(socket, times),
            Port::A429(port) => port.send(socket, times),
            Port::Can(port) => port.send(socket, times),
        }
    }

    /// Transmit if the send period allows it
    pub fn send_periodic(&mut self, socket: &mut dyn Socket, times: Timestamps) -> Result<usize> {
        if !self.core_mut().schedule.due(times.sim_time_us) {
            return Ok(0);
        }
        self.send(socket, times)
    }

    /// Reset every message and rearm the period. Returns true when the port
    /// has to be queued for an on-change send.
    pub fn reset_messages(&mut self) -> bool {
        self.core_mut().schedule.rearm();
        let mut modified = false;
        for message in self.messages_mut() {
            modified |= message.reset();
        }
        modified && self.direction() == Direction::Output
    }

    pub fn describe(&self) -> String {
        let core = self.core();
        format!(
            "{} {} port {} ({} messages)",
            core.direction,
            core.kind,
            core.channel,
            self.messages().len()
        )
    }
}
