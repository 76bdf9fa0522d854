//! Send period gate of periodic output ports

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Schedule {
    period_us: u64,
    next_send_us: u64,
}

impl Schedule {
    pub fn new(period_us: u64) -> Self {
        Self {
            period_us,
            next_send_us: 0,
        }
    }

    pub fn period_us(&self) -> u64 {
        self.period_us
    }

    pub fn next_send_us(&self) -> u64 {
        self.next_send_us
    }

    /// True when a send is due at `now_us`. The next date is aligned on
    /// the following multiple of the period.
    pub fn due(&mut self, now_us: u64) -> bool {
        if self.period_us == 0 {
            return true;
        }
        if self.next_send_us > now_us {
            return false;
        }
        self.next_send_us = (now_us / self.period_us + 1) * self.period_us;
        true
    }

    /// Send on the next opportunity
    pub fn rearm(&mut self) {
        self.next_send_us = 0;
    }
}
