//! Offset-mapped signal ports (analogue, discrete, NAD)
//!
//! Every message owns a fixed byte range of the payload. The same range
//! may be requested several times (under different local names) as long
//! as the encoding parameters agree; partially overlapping ranges are
//! refused.

use super::{MessageShape, MessageSpec, PortCore, Timestamps};
use crate::error::{EngineError, Result};
use crate::message::{AnalogueMessage, DiscreteMessage, Message, MessageBody, NadMessage};
use codec::{ANALOGUE_WIRE_SIZE, DISCRETE_WIRE_SIZE, HEADER_SIZE};
use network::Socket;
use std::collections::BTreeMap;
use tracing::{debug, trace};
use types::PortKind;

#[derive(Debug)]
pub struct SignalPort {
    pub(crate) core: PortCore,
    pub(crate) messages: Vec<Message>,
    /// payload offset -> message slot
    offsets: BTreeMap<usize, usize>,
}

fn wire_size(message: &Message) -> usize {
    match message.body() {
        MessageBody::Analogue(_) => ANALOGUE_WIRE_SIZE,
        MessageBody::Discrete(_) => DISCRETE_WIRE_SIZE,
        MessageBody::Nad(nad) => nad.size(),
        MessageBody::Sampling(sampling) => sampling.size(),
        MessageBody::Queuing(queuing) => queuing.entry_size(),
    }
}

impl SignalPort {
    pub fn new(core: PortCore) -> Self {
        Self {
            core,
            messages: Vec::new(),
            offsets: BTreeMap::new(),
        }
    }

    pub fn offset_of(&self, slot: usize) -> Option<usize> {
        self.offsets
            .iter()
            .find(|(_, &s)| s == slot)
            .map(|(&offset, _)| offset)
    }

    pub fn register(&mut self, spec: MessageSpec) -> Result<usize> {
        let (offset, size) = match (&spec.shape, self.core.kind) {
            (MessageShape::Analogue { offset, .. }, PortKind::Analogue) => {
                (*offset, ANALOGUE_WIRE_SIZE)
            }
            (MessageShape::Discrete { offset, .. }, PortKind::Discrete) => {
                (*offset, DISCRETE_WIRE_SIZE)
            }
            (MessageShape::Nad { offset, size, .. }, PortKind::Nad) => (*offset, *size),
            _ => return Err(self.core.mismatch(&spec)),
        };

        if let Some(&slot) = self.offsets.get(&offset) {
            self.check_same(slot, &spec)?;
            debug!(
                "Signal {} shares offset {} of port {}",
                spec.name, offset, self.core.channel
            );
            return Ok(slot);
        }

        let payload_size = self.core.payload_size();
        if size == 0 || offset + size > payload_size {
            return Err(EngineError::initialization(format!(
                "Offset {} of signal {} is too big for port fifo size {}",
                offset, spec.name, payload_size
            )));
        }
        for (&other, &slot) in &self.offsets {
            let other_size = wire_size(&self.messages[slot]);
            if offset < other + other_size && other < offset + size {
                return Err(EngineError::initialization(format!(
                    "Signal {} at offset {} overlaps signal {} at offset {}",
                    spec.name,
                    offset,
                    self.messages[slot].name(),
                    other
                )));
            }
        }

        let info = self.core.info(&spec.name).with_period_us(spec.period_us);
        let body = match spec.shape {
            MessageShape::Analogue {
                scale, gain, init, ..
            } => {
                let analogue = AnalogueMessage::new(scale, gain, spec.validity_duration_us);
                MessageBody::Analogue(match init {
                    Some(value) => analogue.with_init(value),
                    None => analogue,
                })
            }
            MessageShape::Discrete {
                true_state,
                false_state,
                init,
                ..
            } => {
                let discrete =
                    DiscreteMessage::new(true_state, false_state, spec.validity_duration_us);
                MessageBody::Discrete(match init {
                    Some(value) => discrete.with_init(value),
                    None => discrete,
                })
            }
            MessageShape::Nad {
                size,
                nad_type,
                dims,
                ..
            } => MessageBody::Nad(NadMessage::new(size).with_layout(nad_type, dims)),
            _ => return Err(EngineError::initialization("unreachable signal shape")),
        };

        let slot = self.messages.len();
        self.messages.push(Message::new(info, body));
        self.offsets.insert(offset, slot);
        Ok(slot)
    }

    fn check_same(&self, slot: usize, spec: &MessageSpec) -> Result<()> {
        let consistent = match (self.messages[slot].body(), &spec.shape) {
            (MessageBody::Analogue(analogue), MessageShape::Analogue { scale, gain, .. }) => {
                analogue.same_mapping(*scale, *gain)
            }
            (
                MessageBody::Discrete(discrete),
                MessageShape::Discrete {
                    true_state,
                    false_state,
                    ..
                },
            ) => discrete.same_states(*true_state, *false_state),
            (MessageBody::Nad(nad), MessageShape::Nad { size, .. }) => nad.size() == *size,
            _ => false,
        };
        if consistent {
            Ok(())
        } else {
            Err(EngineError::initialization(format!(
                "Signal {} redefines {} with a different encoding",
                spec.name,
                self.messages[slot].name()
            )))
        }
    }

    pub fn receive(&mut self, socket: &mut dyn Socket, now_us: u64) -> Result<usize> {
        let mut datagrams = 0;
        loop {
            let received = socket.receive(&mut self.core.fifo)?;
            if received == 0 {
                break;
            }
            datagrams += 1;
            if received < HEADER_SIZE {
                debug!(port = %self.core.channel, bytes = received, "runt datagram dropped");
                continue;
            }

            let payload = &self.core.fifo[HEADER_SIZE..received];
            for (&offset, &slot) in &self.offsets {
                let message = &mut self.messages[slot];
                let end = offset + wire_size(message);
                if end > payload.len() {
                    continue;
                }
                let wire = &payload[offset..end];
                match message.body_mut() {
                    MessageBody::Analogue(analogue) => analogue.receive(wire, now_us),
                    MessageBody::Discrete(discrete) => discrete.receive(wire[0], now_us),
                    MessageBody::Nad(nad) => nad.receive(wire),
                    _ => {}
                }
            }
            trace!(port = %self.core.channel, bytes = received, "signals received");
        }
        Ok(datagrams)
    }

    pub fn send(&mut self, socket: &mut dyn Socket, times: Timestamps) -> Result<usize> {
        self.core.stamp(times)?;
        let payload = &mut self.core.fifo[HEADER_SIZE..];
        for (&offset, &slot) in &self.offsets {
            match self.messages[slot].body() {
                MessageBody::Analogue(analogue) => {
                    payload[offset..offset + ANALOGUE_WIRE_SIZE].copy_from_slice(&analogue.wire())
                }
                MessageBody::Discrete(discrete) => payload[offset] = discrete.wire(),
                MessageBody::Nad(nad) => {
                    payload[offset..offset + nad.size()].copy_from_slice(nad.bytes())
                }
                _ => {}
            }
        }
        socket.send(&self.core.fifo)?;
        trace!(port = %self.core.channel, bytes = self.core.fifo.len(), "signals sent");
        Ok(1)
    }
}
