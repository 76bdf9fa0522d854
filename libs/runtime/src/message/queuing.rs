//! Bounded FIFO messages (AFDX queuing ports, A429 queuing labels)
//!
//! Entries are fixed-size. AFDX pushes and pops one entry per call; A429
//! pushes and pops several 4-byte labels at once, up to the depth fixed by
//! the last `check`.

use super::Rejection;
use codec::{A429_LABEL_SIZE, QUEUING_INPUT_DEPTH_FACTOR};
use std::collections::VecDeque;
use types::Direction;

#[derive(Debug, Clone)]
pub struct QueuingMessage {
    entry_size: usize,
    depth: usize,
    capacity: usize,
    /// Entries moved by one push or pop call
    batch: usize,
    multi_entry: bool,
    entries: VecDeque<Vec<u8>>,
}

impl QueuingMessage {
    /// Input rings hold several times the depth so a burst arriving between
    /// two pops is kept.
    fn capacity_for(depth: usize, direction: Direction) -> usize {
        match direction {
            Direction::Input => depth * QUEUING_INPUT_DEPTH_FACTOR,
            Direction::Output => depth,
        }
    }

    pub fn afdx(entry_size: usize, depth: usize, direction: Direction) -> Self {
        Self {
            entry_size,
            depth,
            capacity: Self::capacity_for(depth, direction),
            batch: 1,
            multi_entry: false,
            entries: VecDeque::new(),
        }
    }

    pub fn a429(depth: usize, direction: Direction) -> Self {
        Self {
            entry_size: A429_LABEL_SIZE,
            depth,
            capacity: Self::capacity_for(depth, direction),
            batch: depth,
            multi_entry: true,
            entries: VecDeque::new(),
        }
    }

    pub fn entry_size(&self) -> usize {
        self.entry_size
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    pub fn is_multi_entry(&self) -> bool {
        self.multi_entry
    }

    /// Largest byte count one push accepts or one pop returns
    pub fn max_transfer(&self) -> usize {
        self.batch * self.entry_size
    }

    /// Entries per call requested by the application. Only multi-entry
    /// queues accept a value other than their depth.
    pub fn set_batch(&mut self, entries: usize) -> Result<(), Rejection> {
        if self.multi_entry {
            if entries == 0 || entries > self.depth {
                return Err(Rejection::Unsupported("requested depth exceeds the configured one"));
            }
        } else if entries != self.depth {
            return Err(Rejection::Unsupported("requested depth differs from the configured one"));
        }
        self.batch = if self.multi_entry { entries } else { 1 };
        Ok(())
    }

    pub fn push(&mut self, data: &[u8]) -> Result<(), Rejection> {
        if !self.multi_entry {
            if data.len() != self.entry_size {
                return Err(Rejection::Size {
                    expected: self.entry_size,
                    actual: data.len(),
                });
            }
            if self.entries.len() >= self.capacity {
                return Err(Rejection::Full {
                    depth: self.capacity,
                });
            }
            self.entries.push_back(data.to_vec());
            return Ok(());
        }

        if data.len() > self.max_transfer() {
            return Err(Rejection::Unsupported("push larger than the queue depth"));
        }
        if data.len() % self.entry_size != 0 {
            return Err(Rejection::Size {
                expected: data.len().next_multiple_of(self.entry_size),
                actual: data.len(),
            });
        }
        let count = data.len() / self.entry_size;
        if self.entries.len() + count > self.capacity {
            return Err(Rejection::Full {
                depth: self.capacity,
            });
        }
        self.entries
            .extend(data.chunks(self.entry_size).map(<[u8]>::to_vec));
        Ok(())
    }

    /// Oldest entries first, at most one batch, concatenated
    pub fn pop(&mut self) -> Vec<u8> {
        let count = self.batch.min(self.entries.len());
        let mut out = Vec::with_capacity(count * self.entry_size);
        for entry in self.entries.drain(..count) {
            out.extend_from_slice(&entry);
        }
        out
    }

    /// Store one received entry. Returns false when the ring is full and
    /// the entry was dropped.
    pub fn receive(&mut self, entry: &[u8]) -> bool {
        if self.entries.len() >= self.capacity {
            return false;
        }
        self.entries.push_back(entry.to_vec());
        true
    }

    /// Take every pending entry for transmission
    pub fn drain(&mut self) -> impl Iterator<Item = Vec<u8>> + '_ {
        self.entries.drain(..)
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }
}
