//! Message state machines
//!
//! A [`Message`] pairs the attributes every message has (name, protocol,
//! direction, mode) with a per-protocol [`MessageBody`]. Messages live
//! inside their port; the context reaches them through a
//! `types::MessageHandle`.
//!
//! Bodies report failures as a [`Rejection`] without knowing their own
//! name; [`Message`] turns those into named [`EngineError`]s.

pub mod analogue;
pub mod discrete;
pub mod nad;
pub mod queuing;
pub mod sampling;
pub mod validity;

pub use analogue::AnalogueMessage;
pub use discrete::DiscreteMessage;
pub use nad::NadMessage;
pub use queuing::QueuingMessage;
pub use sampling::SamplingMessage;
pub use validity::Freshness;

use crate::error::{EngineError, Result};
use tracing::{debug, error};
use types::{Direction, Mode, Protocol, Validity};

/// Outcome of a read: the user-format bytes and their validity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub data: Vec<u8>,
    pub validity: Validity,
}

impl Reading {
    pub fn empty(validity: Validity) -> Self {
        Self {
            data: Vec::new(),
            validity,
        }
    }
}

/// Why a body refused an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Size { expected: usize, actual: usize },
    Full { depth: usize },
    Unsupported(&'static str),
}

/// Attributes fixed at creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    pub name: String,
    pub protocol: Protocol,
    pub direction: Direction,
    pub mode: Mode,
    /// Bus-level name (A429 label, CAN id) when it differs from `name`
    pub bus_name: Option<String>,
    /// Nominal production period, informational
    pub period_us: u64,
}

impl MessageInfo {
    pub fn new(name: impl Into<String>, protocol: Protocol, direction: Direction, mode: Mode) -> Self {
        Self {
            name: name.into(),
            protocol,
            direction,
            mode,
            bus_name: None,
            period_us: 0,
        }
    }

    pub fn with_bus_name(mut self, bus_name: impl Into<String>) -> Self {
        self.bus_name = Some(bus_name.into());
        self
    }

    pub fn with_period_us(mut self, period_us: u64) -> Self {
        self.period_us = period_us;
        self
    }
}

#[derive(Debug, Clone)]
pub enum MessageBody {
    Analogue(AnalogueMessage),
    Discrete(DiscreteMessage),
    Nad(NadMessage),
    Sampling(SamplingMessage),
    Queuing(QueuingMessage),
}

#[derive(Debug, Clone)]
pub struct Message {
    info: MessageInfo,
    body: MessageBody,
}

impl Message {
    pub fn new(info: MessageInfo, body: MessageBody) -> Self {
        Self { info, body }
    }

    pub fn info(&self) -> &MessageInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn protocol(&self) -> Protocol {
        self.info.protocol
    }

    pub fn direction(&self) -> Direction {
        self.info.direction
    }

    pub fn mode(&self) -> Mode {
        self.info.mode
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut MessageBody {
        &mut self.body
    }

    fn reject(&self, rejection: Rejection) -> EngineError {
        match rejection {
            Rejection::Size { expected, actual } => {
                EngineError::invalid_size(&self.info.name, expected, actual)
            }
            Rejection::Full { depth } => EngineError::queue_full(&self.info.name, depth),
            Rejection::Unsupported(reason) => {
                EngineError::configuration(format!("Message {}: {}", self.info.name, reason))
            }
        }
    }

    fn not_for(&self, operation: &str) -> EngineError {
        EngineError::configuration(format!(
            "Cannot {} {} {} message {}",
            operation, self.info.protocol, self.info.mode, self.info.name
        ))
    }

    /// Writes and pushes need an output, pops an input. Reads are allowed in
    /// both directions so an application can look back at what it sent.
    fn expect_direction(&self, direction: Direction, operation: &str) -> Result<()> {
        if self.info.direction == direction {
            return Ok(());
        }
        Err(EngineError::configuration(format!(
            "Cannot {} {} message {}",
            operation, self.info.direction, self.info.name
        )))
    }

    /// Size the application exchanges in one read/write/push/pop
    pub fn max_size(&self) -> usize {
        match &self.body {
            MessageBody::Analogue(_) => AnalogueMessage::USER_SIZE,
            MessageBody::Discrete(discrete) => discrete.user_size(),
            MessageBody::Nad(nad) => nad.size(),
            MessageBody::Sampling(sampling) => sampling.size(),
            MessageBody::Queuing(queuing) => queuing.entry_size(),
        }
    }

    /// Verify the application's view of the message, logging the first
    /// mismatch. Discrete user size and A429 pop limit are adopted here.
    pub fn check(
        &mut self,
        protocol: Protocol,
        max_size: usize,
        depth: usize,
        direction: Direction,
    ) -> bool {
        let name = self.info.name.clone();
        if protocol != self.info.protocol {
            error!(
                "Message {} is a {} message, not a {} one",
                name, self.info.protocol, protocol
            );
            return false;
        }
        if direction != self.info.direction {
            error!(
                "Message {} is an {} message, not an {} one",
                name, self.info.direction, direction
            );
            return false;
        }

        let expected_size = self.max_size();
        let accepted = match &mut self.body {
            MessageBody::Discrete(discrete) => {
                depth == 1 && discrete.set_user_size(max_size).is_ok()
            }
            MessageBody::Queuing(queuing) => {
                max_size == queuing.entry_size() && queuing.set_batch(depth).is_ok()
            }
            _ => depth == 1 && max_size == expected_size,
        };
        if !accepted {
            error!(
                "Message {} does not accept max size {} with depth {} (configured size {})",
                name, max_size, depth, expected_size
            );
            return false;
        }
        debug!(message = %name, max_size, depth, "message checked");
        true
    }

    /// Write a sampling value. Returns true when the owning port has to be
    /// queued for an on-change send.
    pub fn write(&mut self, data: &[u8], now_us: u64) -> Result<bool> {
        if self.is_queuing() {
            return Err(self.not_for("write to"));
        }
        self.expect_direction(Direction::Output, "write to")?;
        let outcome = match &mut self.body {
            MessageBody::Analogue(analogue) => analogue.write(data, now_us).map(|_| false),
            MessageBody::Discrete(discrete) => discrete.write(data, now_us),
            MessageBody::Nad(nad) => nad.write(data).map(|_| false),
            MessageBody::Sampling(sampling) => sampling.write(data, now_us).map(|_| false),
            MessageBody::Queuing(_) => Ok(false),
        };
        outcome.map_err(|rejection| self.reject(rejection))
    }

    pub fn read(&self, now_us: u64) -> Result<Reading> {
        match &self.body {
            MessageBody::Analogue(analogue) => Ok(analogue.read(now_us)),
            MessageBody::Discrete(discrete) => Ok(discrete.read(now_us)),
            MessageBody::Nad(nad) => Ok(nad.read()),
            MessageBody::Sampling(sampling) => Ok(sampling.read(now_us)),
            MessageBody::Queuing(_) => Err(self.not_for("read from")),
        }
    }

    fn is_queuing(&self) -> bool {
        matches!(self.body, MessageBody::Queuing(_))
    }

    fn queue_mut(&mut self, operation: &str) -> Result<&mut QueuingMessage> {
        if !self.is_queuing() {
            return Err(self.not_for(operation));
        }
        match &mut self.body {
            MessageBody::Queuing(queuing) => Ok(queuing),
            _ => Err(EngineError::configuration("queuing body expected")),
        }
    }

    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        self.expect_direction(Direction::Output, "push to")?;
        let outcome = self.queue_mut("push to")?.push(data);
        outcome.map_err(|rejection| self.reject(rejection))
    }

    pub fn pop(&mut self) -> Result<Vec<u8>> {
        self.expect_direction(Direction::Input, "pop from")?;
        Ok(self.queue_mut("pop from")?.pop())
    }

    pub fn pending(&self) -> Result<usize> {
        match &self.body {
            MessageBody::Queuing(queuing) => Ok(queuing.pending()),
            _ => Err(self.not_for("count entries of")),
        }
    }

    /// Returns true when the owning port has to be queued
    pub fn reset(&mut self) -> bool {
        match &mut self.body {
            MessageBody::Analogue(analogue) => analogue.reset(),
            MessageBody::Discrete(discrete) => return discrete.reset(),
            MessageBody::Nad(nad) => nad.reset(),
            MessageBody::Sampling(sampling) => sampling.reset(),
            MessageBody::Queuing(queuing) => queuing.reset(),
        }
        false
    }

    /// NAD and queuing messages have no validity window
    fn has_freshness(&self) -> bool {
        !matches!(self.body, MessageBody::Nad(_) | MessageBody::Queuing(_))
    }

    fn freshness_mut(&mut self) -> Option<&mut Freshness> {
        match &mut self.body {
            MessageBody::Analogue(analogue) => Some(analogue.freshness_mut()),
            MessageBody::Discrete(discrete) => Some(discrete.freshness_mut()),
            MessageBody::Sampling(sampling) => Some(sampling.freshness_mut()),
            MessageBody::Nad(_) | MessageBody::Queuing(_) => None,
        }
    }

    pub fn invalidate(&mut self) -> Result<()> {
        if !self.has_freshness() {
            return Err(self.not_for("invalidate"));
        }
        if let Some(freshness) = self.freshness_mut() {
            freshness.invalidate();
        }
        Ok(())
    }

    pub fn set_validity_duration(&mut self, duration_us: u64) -> Result<()> {
        if !self.has_freshness() {
            return Err(self.not_for("set a validity duration on"));
        }
        if let Some(freshness) = self.freshness_mut() {
            freshness.set_duration_us(duration_us);
        }
        Ok(())
    }

    pub fn validity_duration(&self) -> Result<u64> {
        match &self.body {
            MessageBody::Analogue(analogue) => Ok(analogue.freshness().duration_us()),
            MessageBody::Discrete(discrete) => Ok(discrete.freshness().duration_us()),
            MessageBody::Sampling(sampling) => Ok(sampling.freshness().duration_us()),
            MessageBody::Nad(_) | MessageBody::Queuing(_) => {
                Err(self.not_for("get the validity duration of"))
            }
        }
    }
}
