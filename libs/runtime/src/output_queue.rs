//! Ports waiting for an on-change send
//!
//! Membership is mirrored by the port's own `queued` flag, so a port sits
//! in the queue at most once between two drains.

use crate::port::Port;
use types::PortId;

#[derive(Debug, Default)]
pub struct OutputQueue {
    order: Vec<PortId>,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `port` unless it already is. Returns true when it was added.
    pub fn push(&mut self, port: &mut Port) -> bool {
        let core = port.core_mut();
        if core.is_queued() {
            return false;
        }
        core.set_queued(true);
        self.order.push(core.id());
        true
    }

    /// Insertion order, leaving the queue empty. Callers clear the ports'
    /// `queued` flag as they send them.
    pub fn take(&mut self) -> Vec<PortId> {
        std::mem::take(&mut self.order)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: PortId) -> bool {
        self.order.contains(&id)
    }
}
