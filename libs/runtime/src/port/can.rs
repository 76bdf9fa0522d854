//! CAN bus ports
//!
//! A datagram payload is a sequence of 14-byte frames. Each message owns
//! one CAN id; unknown ids are skipped on receive.

use super::{MessageShape, MessageSpec, PortCore, Timestamps};
use crate::error::{EngineError, Result};
use crate::message::{Message, MessageBody, SamplingMessage};
use codec::{can, CAN_DATA_SIZE, CAN_FRAME_SIZE, HEADER_SIZE, MAX_DATAGRAM_SIZE};
use network::Socket;
use std::collections::BTreeMap;
use tracing::{trace, warn};
use types::Direction;

#[derive(Debug)]
pub struct CanPort {
    pub(crate) core: PortCore,
    pub(crate) messages: Vec<Message>,
    /// CAN id -> message slot
    ids: BTreeMap<u32, usize>,
}

impl CanPort {
    pub fn new(mut core: PortCore) -> Self {
        if core.direction == Direction::Input {
            core.fifo.resize(MAX_DATAGRAM_SIZE, 0);
        }
        Self {
            core,
            messages: Vec::new(),
            ids: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, spec: MessageSpec) -> Result<usize> {
        let MessageShape::Can { can_id, size, init } = spec.shape.clone() else {
            return Err(self.core.mismatch(&spec));
        };
        if size == 0 || size > CAN_DATA_SIZE {
            return Err(EngineError::initialization(format!(
                "CAN message {} has size {}, expected 1 to {}",
                spec.name, size, CAN_DATA_SIZE
            )));
        }

        if let Some(&slot) = self.ids.get(&can_id) {
            if self.messages[slot].max_size() != size {
                return Err(EngineError::initialization(format!(
                    "CAN id {:#x} of port {} redefined with size {}",
                    can_id, self.core.channel, size
                )));
            }
            return Ok(slot);
        }

        let sampling = SamplingMessage::new(size, spec.validity_duration_us);
        let body = MessageBody::Sampling(match init {
            Some(bytes) => sampling.with_init(bytes),
            None => sampling,
        });
        let info = self
            .core
            .info(&spec.name)
            .with_bus_name(format!("{:#x}", can_id))
            .with_period_us(spec.period_us);

        let slot = self.messages.len();
        self.messages.push(Message::new(info, body));
        self.ids.insert(can_id, slot);
        Ok(slot)
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
                continue;
            }

            let payload = &self.core.fifo[HEADER_SIZE..received];
            for slot in payload.chunks_exact(CAN_FRAME_SIZE) {
                let frame = match can::read_frame(slot) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(port = %self.core.channel, error = %e, "bad CAN frame skipped");
                        continue;
                    }
                };
                let Some(&index) = self.ids.get(&frame.id) else {
                    continue;
                };
                let message = &mut self.messages[index];
                let expected = message.max_size();
                let accepted = match message.body_mut() {
                    MessageBody::Sampling(sampling) => sampling.receive(frame.data, now_us),
                    _ => false,
                };
                if !accepted {
                    warn!(
                        "CAN message {}: {} bytes received, {} expected",
                        message.name(),
                        frame.data.len(),
                        expected
                    );
                }
            }
            trace!(port = %self.core.channel, bytes = received, "CAN frames received");
        }
        Ok(datagrams)
    }

    pub fn send(&mut self, socket: &mut dyn Socket, times: Timestamps) -> Result<usize> {
        let mut frames: Vec<u8> = Vec::new();
        for (&id, &slot) in &self.ids {
            let MessageBody::Sampling(sampling) = self.messages[slot].body() else {
                continue;
            };
            let Some(data) = sampling.payload() else {
                continue;
            };
            let start = frames.len();
            frames.resize(start + CAN_FRAME_SIZE, 0);
            can::write_frame(&mut frames[start..], id, data)?;
        }
        if frames.is_empty() {
            return Ok(0);
        }

        let end = HEADER_SIZE + frames.len();
        if self.core.fifo.len() < end {
            self.core.fifo.resize(end, 0);
        }
        self.core.fifo[HEADER_SIZE..end].copy_from_slice(&frames);
        self.core.stamp(times)?;
        socket.send(&self.core.fifo[..end])?;
        trace!(
            port = %self.core.channel,
            frames = frames.len() / CAN_FRAME_SIZE,
            "CAN frames sent"
        );
        Ok(1)
    }
}
