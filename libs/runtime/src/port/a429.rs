//! ARINC 429 bus ports
//!
//! A datagram payload is a sequence of 4-byte label words. Messages are
//! keyed by label number and SDI selector:
//!
//! - a specific SDI (`00`..`11`) only receives words carrying those bits
//! - `Extended` receives every word of the label number, SDI bits included
//! - `DontCare` owns the label number alone and receives every word
//!
//! Sampling labels keep the last word; queuing labels buffer words in
//! arrival order.

use super::{MessageShape, MessageSpec, PortCore, Timestamps};
use crate::error::{EngineError, Result};
use crate::message::{Message, MessageBody, QueuingMessage, SamplingMessage};
use codec::a429::{self, Label, Sdi};
use codec::{A429_LABEL_SIZE, HEADER_SIZE, MAX_DATAGRAM_SIZE};
use network::Socket;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};
use types::{Direction, Mode};

#[derive(Debug)]
pub struct A429Port {
    pub(crate) core: PortCore,
    pub(crate) messages: Vec<Message>,
    /// label number -> SDI selector -> message slot
    labels: BTreeMap<u8, BTreeMap<Sdi, usize>>,
    /// message slot -> (label number, SDI selector)
    keys: Vec<(u8, Sdi)>,
}

impl A429Port {
    pub fn new(mut core: PortCore) -> Self {
        if core.direction == Direction::Input {
            core.fifo.resize(MAX_DATAGRAM_SIZE, 0);
        }
        Self {
            core,
            messages: Vec::new(),
            labels: BTreeMap::new(),
            keys: Vec::new(),
        }
    }

    pub fn register(&mut self, spec: MessageSpec) -> Result<usize> {
        let MessageShape::A429 {
            label,
            sdi,
            mode,
            depth,
            init,
        } = &spec.shape
        else {
            return Err(self.core.mismatch(&spec));
        };
        let number = a429::label_number_encode(label)?;

        if let Some(selectors) = self.labels.get(&number) {
            if let Some(&slot) = selectors.get(sdi) {
                let existing = &self.messages[slot];
                let same_depth = match existing.body() {
                    MessageBody::Queuing(queuing) => queuing.depth() == *depth,
                    _ => true,
                };
                if existing.mode() != *mode || !same_depth {
                    return Err(EngineError::initialization(format!(
                        "Label {} of port {} redefined as {} with depth {}",
                        label, self.core.channel, mode, depth
                    )));
                }
                return Ok(slot);
            }
            let conflict = *sdi == Sdi::DontCare || selectors.contains_key(&Sdi::DontCare);
            if conflict {
                return Err(EngineError::initialization(format!(
                    "Label {} of port {} mixes an SDI-less definition with SDI {:?}",
                    label, self.core.channel, sdi
                )));
            }
        }

        let body = match mode {
            Mode::Sampling => {
                let sampling = SamplingMessage::new(A429_LABEL_SIZE, spec.validity_duration_us);
                MessageBody::Sampling(match init {
                    Some(bytes) => sampling.with_init(bytes.clone()),
                    None => sampling,
                })
            }
            Mode::Queuing => {
                if *depth == 0 {
                    return Err(EngineError::initialization(format!(
                        "Queuing label {} of port {} has a zero depth",
                        label, self.core.channel
                    )));
                }
                MessageBody::Queuing(QueuingMessage::a429(*depth, self.core.direction))
            }
        };

        let mut info = self
            .core
            .info(&spec.name)
            .with_bus_name(label.as_str())
            .with_period_us(spec.period_us);
        info.mode = *mode;

        let slot = self.messages.len();
        self.messages.push(Message::new(info, body));
        self.keys.push((number, *sdi));
        self.labels.entry(number).or_default().insert(*sdi, slot);
        Ok(slot)
    }

    /// Slots a received word is delivered to
    fn targets(&self, word: &Label) -> Vec<usize> {
        let Some(selectors) = self.labels.get(&a429::label_number(word)) else {
            return Vec::new();
        };
        if let Some(&slot) = selectors.get(&Sdi::DontCare) {
            return vec![slot];
        }
        [a429::sdi(word), Sdi::Extended]
            .iter()
            .filter_map(|selector| selectors.get(selector).copied())
            .collect()
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
            if payload.len() % A429_LABEL_SIZE != 0 {
                debug!(
                    port = %self.core.channel,
                    bytes = payload.len(),
                    "trailing bytes after the last label ignored"
                );
            }
            for chunk in payload.chunks_exact(A429_LABEL_SIZE) {
                let mut word: Label = [0; A429_LABEL_SIZE];
                word.copy_from_slice(chunk);
                for slot in self.targets(&word) {
                    let message = &mut self.messages[slot];
                    let name = message.name().to_string();
                    match message.body_mut() {
                        MessageBody::Sampling(sampling) => {
                            sampling.receive(&word, now_us);
                        }
                        MessageBody::Queuing(queuing) => {
                            if !queuing.receive(&word) {
                                warn!("A429 label {}: queue full, lost data", name);
                            }
                        }
                        _ => {}
                    }
                }
            }
            trace!(port = %self.core.channel, bytes = received, "labels received");
        }
        Ok(datagrams)
    }

    /// Concatenate every label with something to say into one datagram
    pub fn send(&mut self, socket: &mut dyn Socket, times: Timestamps) -> Result<usize> {
        let mut words: Vec<u8> = Vec::new();
        for (message, &(number, sdi)) in self.messages.iter_mut().zip(&self.keys) {
            match message.body_mut() {
                MessageBody::Sampling(sampling) => {
                    if let Some(payload) = sampling.payload() {
                        let mut word: Label = [0; A429_LABEL_SIZE];
                        word.copy_from_slice(payload);
                        a429::update_label(&mut word, number, sdi);
                        words.extend_from_slice(&word);
                    }
                }
                MessageBody::Queuing(queuing) => {
                    for entry in queuing.drain() {
                        let mut word: Label = [0; A429_LABEL_SIZE];
                        word.copy_from_slice(&entry);
                        a429::update_label(&mut word, number, sdi);
                        words.extend_from_slice(&word);
                    }
                }
                _ => {}
            }
        }
        if words.is_empty() {
            return Ok(0);
        }

        let end = HEADER_SIZE + words.len();
        if self.core.fifo.len() < end {
            self.core.fifo.resize(end, 0);
        }
        self.core.fifo[HEADER_SIZE..end].copy_from_slice(&words);
        self.core.stamp(times)?;
        socket.send(&self.core.fifo[..end])?;
        trace!(
            port = %self.core.channel,
            labels = words.len() / A429_LABEL_SIZE,
            "labels sent"
        );
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{framed, MemorySocket};
    use super::super::{Port, PortSpec};
    use super::*;
    use types::{PortId, PortKind, Protocol, SocketId, Validity};

    fn port(direction: Direction) -> Port {
        let spec = PortSpec::new("A429_BUS_1", PortKind::A429, direction);
        Port::new(PortId::new(2), &spec, SocketId::new(2), 1)
    }

    fn label(name: &str, octal: &str, sdi: Sdi, mode: Mode, depth: usize) -> MessageSpec {
        MessageSpec::new(
            name,
            MessageShape::A429 {
                label: octal.to_string(),
                sdi,
                mode,
                depth,
                init: None,
            },
        )
    }

    fn word(octal: &str, sdi_bits: u8, data: u8) -> Label {
        let mut word = [0, data, sdi_bits, 0];
        let sdi = Sdi::from_bits(sdi_bits);
        a429::update_label(&mut word, a429::label_number_encode(octal).unwrap(), sdi);
        word
    }

    #[test]
    fn test_dont_care_conflicts_with_specific_sdi() {
        let mut port = port(Direction::Input);
        port.register(label("ALT", "203", Sdi::S01, Mode::Sampling, 1))
            .unwrap();
        let err = port
            .register(label("ALT_ANY", "203", Sdi::DontCare, Mode::Sampling, 1))
            .unwrap_err();
        assert!(matches!(err, EngineError::Initialization { .. }));

        let mut port = self::port(Direction::Input);
        port.register(label("SPD", "206", Sdi::DontCare, Mode::Sampling, 1))
            .unwrap();
        assert!(port
            .register(label("SPD_1", "206", Sdi::S10, Mode::Sampling, 1))
            .is_err());
    }

    #[test]
    fn test_same_key_returns_same_slot() {
        let mut port = port(Direction::Input);
        let first = port
            .register(label("ALT", "203", Sdi::S00, Mode::Sampling, 1))
            .unwrap();
        let second = port
            .register(label("ALT_AGAIN", "203", Sdi::S00, Mode::Sampling, 1))
            .unwrap();
        assert_eq!(first, second);
        assert!(port
            .register(label("ALT_Q", "203", Sdi::S00, Mode::Queuing, 4))
            .is_err());

        let message = port.message(first).unwrap();
        assert_eq!(message.protocol(), Protocol::A429);
        assert_eq!(message.info().bus_name.as_deref(), Some("203"));
    }

    #[test]
    fn test_receive_demultiplexes_by_sdi() {
        let mut port = port(Direction::Input);
        let s01 = port
            .register(label("ALT_1", "203", Sdi::S01, Mode::Sampling, 1))
            .unwrap();
        let extended = port
            .register(label("ALT_X", "203", Sdi::Extended, Mode::Sampling, 1))
            .unwrap();
        let queue = port
            .register(label("SPD", "206", Sdi::DontCare, Mode::Queuing, 2))
            .unwrap();

        let mut payload = Vec::new();
        payload.extend_from_slice(&word("203", 2, 0x11));
        payload.extend_from_slice(&word("206", 1, 0x22));
        payload.extend_from_slice(&word("203", 1, 0x33));
        payload.extend_from_slice(&word("206", 3, 0x44));
        payload.extend_from_slice(&word("777", 0, 0x55));
        let mut socket = MemorySocket::with_inbound(vec![framed(&payload)]);
        assert_eq!(port.receive(&mut socket, 5).unwrap(), 1);

        let reading = port.message(s01).unwrap().read(5).unwrap();
        assert_eq!(reading.validity, Validity::Valid);
        assert_eq!(reading.data, word("203", 1, 0x33).to_vec());

        // extended takes both SDI values, the last one wins
        let reading = port.message(extended).unwrap().read(5).unwrap();
        assert_eq!(reading.data, word("203", 1, 0x33).to_vec());

        let queue = port.message_mut(queue).unwrap();
        assert_eq!(queue.pending().unwrap(), 2);
        let popped = queue.pop().unwrap();
        assert_eq!(&popped[..4], &word("206", 1, 0x22));
        assert_eq!(&popped[4..], &word("206", 3, 0x44));
    }

    #[test]
    fn test_send_stamps_number_and_sdi() {
        let mut port = port(Direction::Output);
        let alt = port
            .register(label("ALT", "203", Sdi::S10, Mode::Sampling, 1))
            .unwrap();
        let route = port
            .register(label("ROUTE", "100", Sdi::DontCare, Mode::Queuing, 3))
            .unwrap();

        let mut socket = MemorySocket::default();
        assert_eq!(port.send(&mut socket, Timestamps::default()).unwrap(), 0);

        port.message_mut(alt)
            .unwrap()
            .write(&[0, 0xAB, 0, 0], 0)
            .unwrap();
        let route_message = port.message_mut(route).unwrap();
        assert!(route_message.check(Protocol::A429, 4, 2, Direction::Output));
        route_message.push(&[0, 1, 0, 0, 0, 2, 0, 0]).unwrap();

        assert_eq!(port.send(&mut socket, Timestamps::default()).unwrap(), 1);
        let payload = &socket.sent[0][HEADER_SIZE..];
        assert_eq!(payload.len(), 12);

        let first: Label = payload[..4].try_into().unwrap();
        assert_eq!(a429::label_number_decode(a429::label_number(&first)), "203");
        assert_eq!(a429::sdi(&first), Sdi::S10);
        assert_eq!(first[1], 0xAB);
        assert!(a429::has_odd_parity(&first));

        let queued: Label = payload[4..8].try_into().unwrap();
        assert_eq!(a429::label_number_decode(a429::label_number(&queued)), "100");
        assert_eq!(queued[1], 1);
        assert_eq!(port.message(route).unwrap().pending().unwrap(), 0);

        // sampling labels repeat, queued ones are gone
        assert_eq!(port.send(&mut socket, Timestamps::default()).unwrap(), 1);
        assert_eq!(socket.sent[1].len(), HEADER_SIZE + 4);
    }
}
