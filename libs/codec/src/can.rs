//! CAN frame packing inside CAN bus datagrams
//!
//! Each frame is 14 bytes: data right-aligned in 8 bytes, then
//! `length:u16` and `id:u32`, big-endian.

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol_constants::{CAN_DATA_SIZE, CAN_FRAME_SIZE, CAN_ID_INDEX, CAN_LENGTH_INDEX};
use byteorder::{BigEndian, ByteOrder};

/// Borrowed view of one decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame<'a> {
    pub id: u32,
    pub data: &'a [u8],
}

/// Write one frame into `slot` (exactly 14 bytes)
pub fn write_frame(slot: &mut [u8], id: u32, data: &[u8]) -> ProtocolResult<()> {
    if slot.len() < CAN_FRAME_SIZE {
        return Err(ProtocolError::message_too_small(
            CAN_FRAME_SIZE,
            slot.len(),
            "CAN frame slot",
        ));
    }
    if data.len() > CAN_DATA_SIZE {
        return Err(ProtocolError::payload_too_large(
            data.len(),
            CAN_DATA_SIZE,
            format!("CAN id {:#x}", id),
        ));
    }

    slot[..CAN_DATA_SIZE].fill(0);
    slot[CAN_DATA_SIZE - data.len()..CAN_DATA_SIZE].copy_from_slice(data);
    BigEndian::write_u16(&mut slot[CAN_LENGTH_INDEX..CAN_ID_INDEX], data.len() as u16);
    BigEndian::write_u32(&mut slot[CAN_ID_INDEX..CAN_FRAME_SIZE], id);
    Ok(())
}

/// Decode one frame from a 14-byte slot
pub fn read_frame(slot: &[u8]) -> ProtocolResult<CanFrame<'_>> {
    if slot.len() < CAN_FRAME_SIZE {
        return Err(ProtocolError::message_too_small(
            CAN_FRAME_SIZE,
            slot.len(),
            "CAN frame",
        ));
    }
    let length = BigEndian::read_u16(&slot[CAN_LENGTH_INDEX..CAN_ID_INDEX]) as usize;
    let id = BigEndian::read_u32(&slot[CAN_ID_INDEX..CAN_FRAME_SIZE]);
    if length > CAN_DATA_SIZE {
        return Err(ProtocolError::payload_too_large(
            length,
            CAN_DATA_SIZE,
            format!("CAN id {:#x} length code", id),
        ));
    }

    Ok(CanFrame {
        id,
        data: &slot[CAN_DATA_SIZE - length..CAN_DATA_SIZE],
    })
}
