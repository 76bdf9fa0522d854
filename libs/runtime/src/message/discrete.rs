//! Discrete signals
//!
//! A boolean carried as one configurable byte value for true and another
//! for false. The application side sees a 1- or 4-byte buffer whose last
//! byte is the boolean.

use super::validity::Freshness;
use super::{Reading, Rejection};

#[derive(Debug, Clone)]
pub struct DiscreteMessage {
    true_state: u8,
    false_state: u8,
    wire: u8,
    init_wire: u8,
    has_init: bool,
    has_data: bool,
    user_size: usize,
    freshness: Freshness,
}

impl DiscreteMessage {
    pub const USER_SIZES: [usize; 2] = [1, 4];

    pub fn new(true_state: u8, false_state: u8, validity_duration_us: u64) -> Self {
        Self {
            true_state,
            false_state,
            wire: false_state,
            init_wire: false_state,
            has_init: false,
            has_data: false,
            user_size: 1,
            freshness: Freshness::new(validity_duration_us),
        }
    }

    pub fn with_init(mut self, value: bool) -> Self {
        self.init_wire = self.encode(value);
        self.wire = self.init_wire;
        self.has_init = true;
        self
    }

    pub fn same_states(&self, true_state: u8, false_state: u8) -> bool {
        self.true_state == true_state && self.false_state == false_state
    }

    pub fn user_size(&self) -> usize {
        self.user_size
    }

    pub fn set_user_size(&mut self, size: usize) -> Result<(), Rejection> {
        if !Self::USER_SIZES.contains(&size) {
            return Err(Rejection::Size {
                expected: self.user_size,
                actual: size,
            });
        }
        self.user_size = size;
        Ok(())
    }

    fn encode(&self, value: bool) -> u8 {
        if value {
            self.true_state
        } else {
            self.false_state
        }
    }

    /// Returns true when the encoded value changed
    pub fn write(&mut self, data: &[u8], now_us: u64) -> Result<bool, Rejection> {
        if data.len() != self.user_size {
            return Err(Rejection::Size {
                expected: self.user_size,
                actual: data.len(),
            });
        }
        Ok(self.write_value(data.iter().any(|&b| b != 0), now_us))
    }

    /// Returns true when the encoded value changed
    pub fn write_value(&mut self, value: bool, now_us: u64) -> bool {
        let encoded = self.encode(value);
        let changed = encoded != self.wire;
        self.wire = encoded;
        self.has_data = true;
        self.freshness.touch(now_us);
        changed
    }

    pub fn value(&self) -> bool {
        self.wire == self.true_state
    }

    pub fn read(&self, now_us: u64) -> Reading {
        let validity = self
            .freshness
            .validity(self.has_data, self.has_init, now_us);
        if validity == types::Validity::NeverReceived {
            return Reading::empty(validity);
        }

        let mut data = vec![0u8; self.user_size];
        if let Some(last) = data.last_mut() {
            *last = u8::from(self.value());
        }
        Reading { data, validity }
    }

    /// Restore the initial state. The port must resend it, so this always
    /// reports a change.
    pub fn reset(&mut self) -> bool {
        self.wire = self.init_wire;
        self.has_data = false;
        self.freshness.invalidate();
        true
    }

    pub fn invalidate(&mut self) {
        self.freshness.invalidate();
    }

    pub fn freshness(&self) -> &Freshness {
        &self.freshness
    }

    pub fn freshness_mut(&mut self) -> &mut Freshness {
        &mut self.freshness
    }

    pub fn wire(&self) -> u8 {
        self.wire
    }

    pub fn receive(&mut self, wire: u8, now_us: u64) {
        self.wire = wire;
        self.has_data = true;
        self.freshness.touch(now_us);
    }
}
