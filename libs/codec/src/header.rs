//! Frame header codec
//!
//! Every data datagram starts with a fixed 20-byte big-endian header:
//!
//! ```text
//! 0        2        4                12               20
//! +--------+--------+----------------+----------------+---------
//! |prod_id |seq_num | qos_timestamp  | data_timestamp | payload
//! +--------+--------+----------------+----------------+---------
//! ```
//!
//! Disabled fields are written as zero. The receive path does not need the
//! header to deliver data; [`FrameHeader::parse`] exists for diagnostics.

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol_constants::{HEADER_SIZE, SEQ_NUM_DISABLED, SEQ_NUM_FIRST};
use byteorder::{BigEndian, ByteOrder};

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    pub prod_id: u16,
    pub seq_num: u16,
    pub qos_timestamp: u64,
    pub data_timestamp: u64,
}

impl FrameHeader {
    pub const SIZE: usize = HEADER_SIZE;

    /// Write the header into the first 20 bytes of `buffer`
    pub fn write_to(&self, buffer: &mut [u8]) -> ProtocolResult<()> {
        if buffer.len() < HEADER_SIZE {
            return Err(ProtocolError::message_too_small(
                HEADER_SIZE,
                buffer.len(),
                "frame header encode",
            ));
        }

        BigEndian::write_u16(&mut buffer[0..2], self.prod_id);
        BigEndian::write_u16(&mut buffer[2..4], self.seq_num);
        BigEndian::write_u64(&mut buffer[4..12], self.qos_timestamp);
        BigEndian::write_u64(&mut buffer[12..20], self.data_timestamp);
        Ok(())
    }

    /// Parse the header from the first 20 bytes of `buffer`
    pub fn parse(buffer: &[u8]) -> ProtocolResult<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(ProtocolError::message_too_small(
                HEADER_SIZE,
                buffer.len(),
                "frame header decode",
            ));
        }

        Ok(Self {
            prod_id: BigEndian::read_u16(&buffer[0..2]),
            seq_num: BigEndian::read_u16(&buffer[2..4]),
            qos_timestamp: BigEndian::read_u64(&buffer[4..12]),
            data_timestamp: BigEndian::read_u64(&buffer[12..20]),
        })
    }
}

/// Which optional header fields a port fills in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderFlags {
    pub seq_num: bool,
    pub qos_timestamp: bool,
    pub data_timestamp: bool,
}

impl HeaderFlags {
    pub const NONE: HeaderFlags = HeaderFlags {
        seq_num: false,
        qos_timestamp: false,
        data_timestamp: false,
    };

    pub const ALL: HeaderFlags = HeaderFlags {
        seq_num: true,
        qos_timestamp: true,
        data_timestamp: true,
    };
}

/// Per-port header state: producer id, enabled fields and rolling sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEncoder {
    prod_id: u16,
    flags: HeaderFlags,
    seq_num: u16,
}

impl HeaderEncoder {
    pub fn new(prod_id: u16, flags: HeaderFlags) -> Self {
        Self {
            prod_id,
            flags,
            seq_num: SEQ_NUM_DISABLED,
        }
    }

    pub fn prod_id(&self) -> u16 {
        self.prod_id
    }

    pub fn flags(&self) -> HeaderFlags {
        self.flags
    }

    /// Last sequence number emitted (0 before the first encode)
    pub fn last_seq_num(&self) -> u16 {
        self.seq_num
    }

    /// Restart the sequence; the next encode emits 1
    pub fn reset_sequence(&mut self) {
        self.seq_num = SEQ_NUM_DISABLED;
    }

    /// Advance the sequence, skipping the reserved value 0 on wrap
    fn next_seq_num(&mut self) -> u16 {
        self.seq_num = match self.seq_num.checked_add(1) {
            Some(next) => next,
            None => SEQ_NUM_FIRST,
        };
        self.seq_num
    }

    /// Build the next header without writing it anywhere
    pub fn next_header(&mut self, posix_timestamp_us: u64, sim_time_us: u64) -> FrameHeader {
        let seq_num = if self.flags.seq_num {
            self.next_seq_num()
        } else {
            SEQ_NUM_DISABLED
        };

        FrameHeader {
            prod_id: self.prod_id,
            seq_num,
            qos_timestamp: if self.flags.qos_timestamp {
                posix_timestamp_us
            } else {
                0
            },
            data_timestamp: if self.flags.data_timestamp {
                sim_time_us
            } else {
                0
            },
        }
    }

    /// Stamp a fresh header into `buffer[0..20)`
    ///
    /// The sequence only advances when the buffer is large enough.
    pub fn encode(
        &mut self,
        buffer: &mut [u8],
        posix_timestamp_us: u64,
        sim_time_us: u64,
    ) -> ProtocolResult<FrameHeader> {
        if buffer.len() < HEADER_SIZE {
            return Err(ProtocolError::message_too_small(
                HEADER_SIZE,
                buffer.len(),
                "frame header encode",
            ));
        }
        let header = self.next_header(posix_timestamp_us, sim_time_us);
        header.write_to(buffer)?;
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_big_endian() {
        let header = FrameHeader {
            prod_id: 0x0102,
            seq_num: 0x0304,
            qos_timestamp: 0x05060708090A0B0C,
            data_timestamp: 0x0D0E0F1011121314,
        };
        let mut buffer = [0u8; HEADER_SIZE];
        header.write_to(&mut buffer).unwrap();

        let expected: Vec<u8> = (1u8..=20).collect();
        assert_eq!(buffer.to_vec(), expected);
        assert_eq!(FrameHeader::parse(&buffer).unwrap(), header);
    }

    #[test]
    fn test_disabled_fields_are_zero() {
        let mut encoder = HeaderEncoder::new(42, HeaderFlags::NONE);
        let mut buffer = [0xFFu8; 32];
        let header = encoder.encode(&mut buffer, 1_000, 2_000).unwrap();

        assert_eq!(header.prod_id, 42);
        assert_eq!(header.seq_num, 0);
        assert_eq!(header.qos_timestamp, 0);
        assert_eq!(header.data_timestamp, 0);
        assert_eq!(&buffer[2..20], &[0u8; 18]);
        // payload area untouched
        assert_eq!(buffer[20], 0xFF);
    }

    #[test]
    fn test_enabled_timestamps_are_copied() {
        let mut encoder = HeaderEncoder::new(7, HeaderFlags::ALL);
        let header = encoder.next_header(1_700_000_000_000_000, 250_000);
        assert_eq!(header.seq_num, 1);
        assert_eq!(header.qos_timestamp, 1_700_000_000_000_000);
        assert_eq!(header.data_timestamp, 250_000);
    }

    #[test]
    fn test_sequence_wraps_to_one() {
        let flags = HeaderFlags {
            seq_num: true,
            ..HeaderFlags::NONE
        };
        let mut encoder = HeaderEncoder::new(1, flags);
        for expected in 1..=u16::MAX {
            assert_eq!(encoder.next_header(0, 0).seq_num, expected);
        }
        assert_eq!(encoder.next_header(0, 0).seq_num, 1);
        assert_eq!(encoder.next_header(0, 0).seq_num, 2);
    }

    #[test]
    fn test_short_buffer_does_not_advance_sequence() {
        let mut encoder = HeaderEncoder::new(1, HeaderFlags::ALL);
        let mut short = [0u8; 10];
        assert!(encoder.encode(&mut short, 0, 0).unwrap_err().is_truncation());
        assert_eq!(encoder.last_seq_num(), 0);
    }

    #[test]
    fn test_reset_sequence_restarts_at_one() {
        let mut encoder = HeaderEncoder::new(1, HeaderFlags::ALL);
        encoder.next_header(0, 0);
        encoder.next_header(0, 0);
        encoder.reset_sequence();
        assert_eq!(encoder.next_header(0, 0).seq_num, 1);
    }
}
