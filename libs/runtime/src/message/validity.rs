//! Validity window bookkeeping shared by sampling-style messages

use types::Validity;

/// Timestamp of a message that was never updated, or was invalidated
pub const NEVER: u64 = u64::MAX;

/// Last update time plus the configured validity duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    duration_us: u64,
    last_update_us: u64,
}

impl Freshness {
    pub fn new(duration_us: u64) -> Self {
        Self {
            duration_us,
            last_update_us: NEVER,
        }
    }

    pub fn duration_us(&self) -> u64 {
        self.duration_us
    }

    /// Takes effect on the next evaluation
    pub fn set_duration_us(&mut self, duration_us: u64) {
        self.duration_us = duration_us;
    }

    pub fn last_update_us(&self) -> u64 {
        self.last_update_us
    }

    pub fn touch(&mut self, now_us: u64) {
        self.last_update_us = now_us;
    }

    pub fn invalidate(&mut self) {
        self.last_update_us = NEVER;
    }

    /// Updated at least once since the last invalidation, and (unless the
    /// duration is 0) less than `duration_us` ago
    pub fn is_fresh(&self, now_us: u64) -> bool {
        if self.last_update_us == NEVER {
            return false;
        }
        self.duration_us == 0 || now_us.saturating_sub(self.last_update_us) < self.duration_us
    }

    /// Validity reported by a read
    pub fn validity(&self, has_data: bool, has_init: bool, now_us: u64) -> Validity {
        match (has_data, has_init) {
            (true, _) if self.is_fresh(now_us) => Validity::Valid,
            (true, _) => Validity::Invalid,
            (false, true) => Validity::NeverReceivedButInitialized,
            (false, false) => Validity::NeverReceived,
        }
    }
}
