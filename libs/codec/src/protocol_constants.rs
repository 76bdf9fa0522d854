//! Protocol-level constants for the skybus wire formats
//!
//! This module contains immutable constants that are part of the wire
//! format. These values MUST remain consistent across every node on the
//! network for protocol compatibility.

/// Size of the frame header that prefixes every data datagram
///
/// Layout (big-endian): `prod_id:u16, seq_num:u16, qos_timestamp:u64,
/// data_timestamp:u64`.
pub const HEADER_SIZE: usize = 20;

/// Sequence number value meaning "sequencing disabled"
///
/// An enabled sequence never emits this value: after 65535 it wraps to 1.
pub const SEQ_NUM_DISABLED: u16 = 0;

/// First sequence number emitted after a wrap
pub const SEQ_NUM_FIRST: u16 = 1;

/// Largest UDP payload we ever try to send or receive
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Instrumentation frame header: `command_id:u32, payload_size:u32`
pub const INSTRUMENTATION_HEADER_SIZE: usize = 8;

/// Receive buffer size of the instrumentation channel (header included)
///
/// A frame declaring a larger payload is a fatal framing error for the
/// channel.
pub const INSTRUMENTATION_MESSAGE_MAX_SIZE: usize = 200;

/// Fixed size of string fields in instrumentation packets, terminator included
pub const REQUEST_MAX_STRING_SIZE: usize = 100;

/// Register command values carried by `F_*_REGISTER` packets
pub const REGISTER: u32 = 1;
pub const UNREGISTER: u32 = 0;

/// Acknowledge status meaning success
pub const ACK_OK: u32 = 0;
/// Generic failure status
pub const ACK_ERROR: u32 = 1;
/// `R_STATE` value: step-by-step requested but not supported
pub const ACK_STEP_UNSUPPORTED: u32 = 2;
/// Second `R_CONFIG` value sent after an apply: component configured
pub const ACK_CONFIGURED: u32 = 2;

/// Wire size of an analogue signal (big-endian IEEE-754 single)
pub const ANALOGUE_WIRE_SIZE: usize = 4;

/// Wire size of a discrete signal slot
pub const DISCRETE_WIRE_SIZE: usize = 1;

/// Size of one ARINC 429 label word
pub const A429_LABEL_SIZE: usize = 4;

/// CAN frame layout inside a CAN bus datagram: `data[8], len:u16, id:u32`
pub const CAN_FRAME_SIZE: usize = 14;
pub const CAN_DATA_SIZE: usize = 8;
pub const CAN_LENGTH_INDEX: usize = 8;
pub const CAN_ID_INDEX: usize = 10;

/// Input queuing rings hold this many times the configured depth so a burst
/// arriving between two pops is not lost.
pub const QUEUING_INPUT_DEPTH_FACTOR: usize = 4;
