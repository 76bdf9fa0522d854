//! NAD raw blocks
//!
//! Opaque bytes with a binary validity: valid once written or received,
//! never received otherwise. No validity window, no initial value.

use super::{Reading, Rejection};
use types::{NadType, Validity};

#[derive(Debug, Clone)]
pub struct NadMessage {
    data: Vec<u8>,
    valid: bool,
    nad_type: NadType,
    dims: Vec<u32>,
}

impl NadMessage {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
            valid: false,
            nad_type: NadType::Undefined,
            dims: Vec::new(),
        }
    }

    pub fn with_layout(mut self, nad_type: NadType, dims: Vec<u32>) -> Self {
        self.nad_type = nad_type;
        self.dims = dims;
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn nad_type(&self) -> NadType {
        self.nad_type
    }

    pub fn dims(&self) -> &[u32] {
        &self.dims
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), Rejection> {
        if data.len() != self.data.len() {
            return Err(Rejection::Size {
                expected: self.data.len(),
                actual: data.len(),
            });
        }
        self.data.copy_from_slice(data);
        self.valid = true;
        Ok(())
    }

    pub fn read(&self) -> Reading {
        if self.valid {
            Reading {
                data: self.data.clone(),
                validity: Validity::Valid,
            }
        } else {
            Reading::empty(Validity::NeverReceived)
        }
    }

    pub fn reset(&mut self) {
        self.data.fill(0);
        self.valid = false;
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn receive(&mut self, data: &[u8]) {
        if data.len() == self.data.len() {
            self.data.copy_from_slice(data);
            self.valid = true;
        }
    }
}
