//! Analogue signals
//!
//! The application reads and writes native `f32` values; the wire carries
//! `value * scale + gain` as a big-endian IEEE-754 single.

use super::validity::Freshness;
use super::{Reading, Rejection};
use codec::ANALOGUE_WIRE_SIZE;
use types::Validity;

#[derive(Debug, Clone)]
pub struct AnalogueMessage {
    scale: f32,
    gain: f32,
    wire: [u8; ANALOGUE_WIRE_SIZE],
    init_wire: [u8; ANALOGUE_WIRE_SIZE],
    has_init: bool,
    has_data: bool,
    freshness: Freshness,
}

impl AnalogueMessage {
    pub const USER_SIZE: usize = std::mem::size_of::<f32>();

    pub fn new(scale: f32, gain: f32, validity_duration_us: u64) -> Self {
        // without an initial value the wire still carries 0 * scale + gain
        let init_wire = gain.to_be_bytes();
        Self {
            scale,
            gain,
            wire: init_wire,
            init_wire,
            has_init: false,
            has_data: false,
            freshness: Freshness::new(validity_duration_us),
        }
    }

    pub fn with_init(mut self, value: f32) -> Self {
        self.init_wire = self.encode(value);
        self.wire = self.init_wire;
        self.has_init = true;
        self
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Same wire mapping as another registration of the offset
    pub fn same_mapping(&self, scale: f32, gain: f32) -> bool {
        self.scale == scale && self.gain == gain
    }

    fn encode(&self, value: f32) -> [u8; ANALOGUE_WIRE_SIZE] {
        (value * self.scale + self.gain).to_be_bytes()
    }

    fn decode(&self, wire: [u8; ANALOGUE_WIRE_SIZE]) -> f32 {
        (f32::from_be_bytes(wire) - self.gain) / self.scale
    }

    pub fn write(&mut self, data: &[u8], now_us: u64) -> Result<(), Rejection> {
        let bytes: [u8; Self::USER_SIZE] = data.try_into().map_err(|_| Rejection::Size {
            expected: Self::USER_SIZE,
            actual: data.len(),
        })?;
        self.write_value(f32::from_ne_bytes(bytes), now_us);
        Ok(())
    }

    pub fn write_value(&mut self, value: f32, now_us: u64) {
        self.wire = self.encode(value);
        self.has_data = true;
        self.freshness.touch(now_us);
    }

    /// Decoded value and validity, `None` when nothing can be returned
    pub fn value(&self, now_us: u64) -> (Option<f32>, Validity) {
        let validity = self
            .freshness
            .validity(self.has_data, self.has_init, now_us);
        let value = match validity {
            Validity::NeverReceived => None,
            _ => Some(self.decode(self.wire)),
        };
        (value, validity)
    }

    pub fn read(&self, now_us: u64) -> Reading {
        let (value, validity) = self.value(now_us);
        Reading {
            data: value.map(|v| v.to_ne_bytes().to_vec()).unwrap_or_default(),
            validity,
        }
    }

    pub fn reset(&mut self) {
        self.wire = self.init_wire;
        self.has_data = false;
        self.freshness.invalidate();
    }

    pub fn invalidate(&mut self) {
        self.freshness.invalidate();
    }

    pub fn freshness_mut(&mut self) -> &mut Freshness {
        &mut self.freshness
    }

    pub fn freshness(&self) -> &Freshness {
        &self.freshness
    }

    /// Wire bytes gathered into the port payload
    pub fn wire(&self) -> [u8; ANALOGUE_WIRE_SIZE] {
        self.wire
    }

    /// Wire bytes scattered from a received payload
    pub fn receive(&mut self, wire: &[u8], now_us: u64) {
        if let Ok(bytes) = wire.try_into() {
            self.wire = bytes;
            self.has_data = true;
            self.freshness.touch(now_us);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_and_gain_on_the_wire() {
        let mut message = AnalogueMessage::new(2.0, 1.0, 0);
        message.write(&3.0f32.to_ne_bytes(), 0).unwrap();

        assert_eq!(message.wire(), 7.0f32.to_be_bytes());
        let reading = message.read(0);
        assert_eq!(reading.validity, Validity::Valid);
        assert_eq!(reading.data, 3.0f32.to_ne_bytes().to_vec());
    }

    #[test]
    fn test_uninitialized_wire_carries_gain() {
        let message = AnalogueMessage::new(2.0, 1.0, 0);
        assert_eq!(message.wire(), 1.0f32.to_be_bytes());

        let reading = message.read(0);
        assert_eq!(reading.validity, Validity::NeverReceived);
        assert!(reading.data.is_empty());
    }

    #[test]
    fn test_init_value_survives_reset() {
        let mut message = AnalogueMessage::new(10.0, 0.0, 0).with_init(4.5);
        assert_eq!(message.value(0), (Some(4.5), Validity::NeverReceivedButInitialized));

        message.write_value(1.0, 5);
        message.reset();
        assert_eq!(message.wire(), 45.0f32.to_be_bytes());
        assert_eq!(message.value(5), (Some(4.5), Validity::NeverReceivedButInitialized));
    }

    #[test]
    fn test_rejects_wrong_size() {
        let mut message = AnalogueMessage::new(1.0, 0.0, 0);
        assert_eq!(
            message.write(&[0u8; 8], 0),
            Err(Rejection::Size {
                expected: 4,
                actual: 8
            })
        );
    }

    #[test]
    fn test_received_value_expires() {
        let mut message = AnalogueMessage::new(1.0, 0.0, 1_000);
        message.receive(&12.5f32.to_be_bytes(), 100);

        assert_eq!(message.value(1_099), (Some(12.5), Validity::Valid));
        assert_eq!(message.value(1_100), (Some(12.5), Validity::Invalid));
    }
}
