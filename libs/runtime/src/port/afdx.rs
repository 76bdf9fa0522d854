//! AFDX virtual-link ports
//!
//! Both kinds carry exactly one message; the datagram payload is the
//! message payload. A sampling port forwards the latest value, a queuing
//! port one datagram per entry.

use super::{MessageShape, MessageSpec, PortCore, Timestamps};
use crate::error::{EngineError, Result};
use crate::message::{Message, MessageBody, QueuingMessage, SamplingMessage};
use codec::HEADER_SIZE;
use network::Socket;
use tracing::{debug, warn};
use types::Mode;

#[derive(Debug)]
pub struct AfdxSamplingPort {
    pub(crate) core: PortCore,
    pub(crate) messages: Vec<Message>,
}

impl AfdxSamplingPort {
    pub fn new(core: PortCore) -> Self {
        Self {
            core,
            messages: Vec::with_capacity(1),
        }
    }

    pub fn register(&mut self, spec: MessageSpec) -> Result<usize> {
        let MessageShape::AfdxSampling { size, init } = spec.shape else {
            return Err(self.core.mismatch(&spec));
        };

        if let Some(existing) = self.messages.first() {
            if existing.max_size() != size {
                return Err(EngineError::initialization(format!(
                    "Multiple fifo sizes defined for AFDX port {} ({} and {})",
                    self.core.channel,
                    existing.max_size(),
                    size
                )));
            }
            return Ok(0);
        }

        let sampling = SamplingMessage::new(size, spec.validity_duration_us);
        let body = MessageBody::Sampling(match init {
            Some(bytes) => sampling.with_init(bytes),
            None => sampling,
        });
        let info = self.core.info(&spec.name).with_period_us(spec.period_us);
        self.messages.push(Message::new(info, body));
        self.core.fifo.resize(HEADER_SIZE + size, 0);
        Ok(0)
    }

    pub fn receive(&mut self, socket: &mut dyn Socket, now_us: u64) -> Result<usize> {
        let mut datagrams = 0;
        loop {
            let received = socket.receive(&mut self.core.fifo)?;
            if received == 0 {
                break;
            }
            datagrams += 1;
            let Some(message) = self.messages.first_mut() else {
                continue;
            };
            if received <= HEADER_SIZE {
                continue;
            }
            let payload = &self.core.fifo[HEADER_SIZE..received];
            if let MessageBody::Sampling(sampling) = message.body_mut() {
                if !sampling.receive(payload, now_us) {
                    warn!(
                        "AFDX message {}: {} bytes received, {} expected",
                        message.name(),
                        payload.len(),
                        message.max_size()
                    );
                    continue;
                }
            }
            debug!(message = %message.name(), bytes = payload.len(), "AFDX sample received");
        }
        Ok(datagrams)
    }

    pub fn send(&mut self, socket: &mut dyn Socket, times: Timestamps) -> Result<usize> {
        let Some(message) = self.messages.first() else {
            return Ok(0);
        };
        let MessageBody::Sampling(sampling) = message.body() else {
            return Ok(0);
        };
        let Some(payload) = sampling.payload() else {
            return Ok(0);
        };

        let end = HEADER_SIZE + payload.len();
        self.core.fifo[HEADER_SIZE..end].copy_from_slice(payload);
        self.core.stamp(times)?;
        socket.send(&self.core.fifo[..end])?;
        debug!(message = %message.name(), bytes = payload.len(), "AFDX sample sent");
        Ok(1)
    }
}

#[derive(Debug)]
pub struct AfdxQueuingPort {
    pub(crate) core: PortCore,
    pub(crate) messages: Vec<Message>,
}

impl AfdxQueuingPort {
    pub fn new(core: PortCore) -> Self {
        Self {
            core,
            messages: Vec::with_capacity(1),
        }
    }

    pub fn register(&mut self, spec: MessageSpec) -> Result<usize> {
        let MessageShape::AfdxQueuing { size, depth } = spec.shape else {
            return Err(self.core.mismatch(&spec));
        };

        if let Some(existing) = self.messages.first() {
            let same_depth = matches!(
                existing.body(),
                MessageBody::Queuing(queuing) if queuing.depth() == depth
            );
            if existing.max_size() != size || !same_depth {
                return Err(EngineError::initialization(format!(
                    "AFDX queuing port {} redefined with size {} and depth {}",
                    self.core.channel, size, depth
                )));
            }
            return Ok(0);
        }

        let mut info = self.core.info(&spec.name).with_period_us(spec.period_us);
        info.mode = Mode::Queuing;
        let body = MessageBody::Queuing(QueuingMessage::afdx(size, depth, self.core.direction));
        self.messages.push(Message::new(info, body));
        self.core.fifo.resize(HEADER_SIZE + size, 0);
        Ok(0)
    }

    pub fn receive(&mut self, socket: &mut dyn Socket) -> Result<usize> {
        let mut datagrams = 0;
        loop {
            let received = socket.receive(&mut self.core.fifo)?;
            if received == 0 {
                break;
            }
            datagrams += 1;
            let Some(message) = self.messages.first_mut() else {
                continue;
            };
            if received <= HEADER_SIZE {
                continue;
            }
            let payload = &self.core.fifo[HEADER_SIZE..received];
            let name = message.name().to_string();
            if let MessageBody::Queuing(queuing) = message.body_mut() {
                if payload.len() != queuing.entry_size() {
                    warn!(
                        "AFDX message {}: {} bytes received, {} expected",
                        name,
                        payload.len(),
                        queuing.entry_size()
                    );
                } else if !queuing.receive(payload) {
                    warn!(
                        "AFDX message {}: queue full ({} entries), lost data",
                        name,
                        queuing.capacity()
                    );
                }
            }
        }
        Ok(datagrams)
    }

    /// One datagram per pending entry
    pub fn send(&mut self, socket: &mut dyn Socket, times: Timestamps) -> Result<usize> {
        let Some(message) = self.messages.first_mut() else {
            return Ok(0);
        };
        let MessageBody::Queuing(queuing) = message.body_mut() else {
            return Ok(0);
        };

        let mut sent = 0;
        let entries: Vec<Vec<u8>> = queuing.drain().collect();
        for entry in entries {
            let end = HEADER_SIZE + entry.len();
            self.core.fifo[HEADER_SIZE..end].copy_from_slice(&entry);
            self.core.stamp(times)?;
            socket.send(&self.core.fifo[..end])?;
            sent += 1;
        }
        if sent > 0 {
            debug!(port = %self.core.channel, entries = sent, "AFDX queue flushed");
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{framed, MemorySocket};
    use super::super::{Port, PortSpec};
    use super::*;
    use codec::{FrameHeader, HeaderFlags};
    use types::{Direction, PortId, PortKind, SocketId, Validity};

    fn port(kind: PortKind, direction: Direction) -> Port {
        let spec = PortSpec::new("VL_12", kind, direction).with_header(HeaderFlags {
            seq_num: true,
            ..HeaderFlags::NONE
        });
        Port::new(PortId::new(1), &spec, SocketId::new(1), 3)
    }

    #[test]
    fn test_sampling_sends_only_with_data_or_init() {
        let mut port = port(PortKind::AfdxSampling, Direction::Output);
        let slot = port
            .register(MessageSpec::new(
                "FUEL",
                MessageShape::AfdxSampling { size: 4, init: None },
            ))
            .unwrap();

        let mut socket = MemorySocket::default();
        assert_eq!(port.send(&mut socket, Timestamps::default()).unwrap(), 0);

        port.message_mut(slot).unwrap().write(&[1, 2, 3, 4], 0).unwrap();
        assert_eq!(port.send(&mut socket, Timestamps::default()).unwrap(), 1);
        assert_eq!(socket.sent[0], framed_with_seq(1, &[1, 2, 3, 4]));

        // the value is not consumed by a send
        assert_eq!(port.send(&mut socket, Timestamps::default()).unwrap(), 1);
    }

    fn framed_with_seq(seq: u16, payload: &[u8]) -> Vec<u8> {
        let mut datagram = framed(payload);
        FrameHeader {
            prod_id: 3,
            seq_num: seq,
            ..FrameHeader::default()
        }
        .write_to(&mut datagram)
        .unwrap();
        datagram
    }

    #[test]
    fn test_sampling_size_conflict() {
        let mut port = port(PortKind::AfdxSampling, Direction::Input);
        let spec = |size| MessageSpec::new("FUEL", MessageShape::AfdxSampling { size, init: None });
        port.register(spec(4)).unwrap();
        assert_eq!(port.register(spec(4)).unwrap(), 0);
        assert!(port.register(spec(8)).is_err());
    }

    #[test]
    fn test_sampling_receive_checks_size() {
        let mut port = port(PortKind::AfdxSampling, Direction::Input);
        port.register(MessageSpec::new(
            "FUEL",
            MessageShape::AfdxSampling {
                size: 2,
                init: Some(vec![9, 9]),
            },
        ))
        .unwrap();

        let mut socket = MemorySocket::with_inbound(vec![framed(&[1]), framed(&[4, 5])]);
        assert_eq!(port.receive(&mut socket, 0).unwrap(), 2);
        let reading = port.message(0).unwrap().read(0).unwrap();
        assert_eq!(reading.data, vec![4, 5]);
        assert_eq!(reading.validity, Validity::Valid);
    }

    #[test_log::test]
    fn test_queuing_input_overflow_drops() {
        let mut port = port(PortKind::AfdxQueuing, Direction::Input);
        port.register(MessageSpec::new(
            "ROUTE",
            MessageShape::AfdxQueuing { size: 1, depth: 1 },
        ))
        .unwrap();

        let inbound = (0..6u8).map(|i| framed(&[i])).collect();
        let mut socket = MemorySocket::with_inbound(inbound);
        assert_eq!(port.receive(&mut socket, 0).unwrap(), 6);

        let message = port.message_mut(0).unwrap();
        assert_eq!(message.pending().unwrap(), 4);
        assert_eq!(message.pop().unwrap(), vec![0]);
    }

    #[test]
    fn test_queuing_sends_one_datagram_per_entry() {
        let mut port = port(PortKind::AfdxQueuing, Direction::Output);
        port.register(MessageSpec::new(
            "ROUTE",
            MessageShape::AfdxQueuing { size: 2, depth: 3 },
        ))
        .unwrap();
        let message = port.message_mut(0).unwrap();
        message.push(&[1, 1]).unwrap();
        message.push(&[2, 2]).unwrap();

        let mut socket = MemorySocket::default();
        assert_eq!(port.send(&mut socket, Timestamps::default()).unwrap(), 2);
        assert_eq!(socket.sent[0], framed_with_seq(1, &[1, 1]));
        assert_eq!(socket.sent[1], framed_with_seq(2, &[2, 2]));
        assert_eq!(port.message(0).unwrap().pending().unwrap(), 0);
    }
}
