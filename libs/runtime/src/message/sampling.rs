//! Bus sampling messages (AFDX, A429 labels, CAN frames)
//!
//! Last value wins. The payload is fixed-size; an optional initial payload
//! is returned (and sent) until the first real value arrives.

use super::validity::Freshness;
use super::{Reading, Rejection};
use types::Validity;

#[derive(Debug, Clone)]
pub struct SamplingMessage {
    data: Vec<u8>,
    init: Option<Vec<u8>>,
    has_data: bool,
    freshness: Freshness,
}

impl SamplingMessage {
    pub fn new(size: usize, validity_duration_us: u64) -> Self {
        Self {
            data: vec![0; size],
            init: None,
            has_data: false,
            freshness: Freshness::new(validity_duration_us),
        }
    }

    /// Initial payload, resized to the message size
    pub fn with_init(mut self, mut init: Vec<u8>) -> Self {
        init.resize(self.data.len(), 0);
        self.data.copy_from_slice(&init);
        self.init = Some(init);
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn has_data(&self) -> bool {
        self.has_data
    }

    pub fn write(&mut self, data: &[u8], now_us: u64) -> Result<(), Rejection> {
        if data.len() != self.data.len() {
            return Err(Rejection::Size {
                expected: self.data.len(),
                actual: data.len(),
            });
        }
        self.data.copy_from_slice(data);
        self.has_data = true;
        self.freshness.touch(now_us);
        Ok(())
    }

    pub fn read(&self, now_us: u64) -> Reading {
        let validity = self
            .freshness
            .validity(self.has_data, self.init.is_some(), now_us);
        match validity {
            Validity::NeverReceived => Reading::empty(validity),
            Validity::NeverReceivedButInitialized => Reading {
                data: self.init.clone().unwrap_or_default(),
                validity,
            },
            _ => Reading {
                data: self.data.clone(),
                validity,
            },
        }
    }

    /// Payload to transmit: the last value, else the initial one
    pub fn payload(&self) -> Option<&[u8]> {
        if self.has_data {
            Some(&self.data)
        } else {
            self.init.as_deref()
        }
    }

    /// Mutable access for ports that stamp bus fields into the payload
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn reset(&mut self) {
        match &self.init {
            Some(init) => self.data.copy_from_slice(init),
            None => self.data.fill(0),
        }
        self.has_data = false;
        self.freshness.invalidate();
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

    /// Store a received payload. Returns false when its size is wrong.
    pub fn receive(&mut self, data: &[u8], now_us: u64) -> bool {
        if data.len() != self.data.len() {
            return false;
        }
        self.data.copy_from_slice(data);
        self.has_data = true;
        self.freshness.touch(now_us);
        true
    }
}
