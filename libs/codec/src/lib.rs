//! # skybus Codec - Wire Format Rules
//!
//! ## Purpose
//!
//! Encoding and decoding rules for everything skybus puts on a wire: the
//! 20-byte frame header that prefixes every data datagram, the
//! instrumentation control frames exchanged with the simulation controller,
//! and the per-bus payload layouts (ARINC 429 labels, CAN frames).
//!
//! ## Integration Points
//!
//! - **Types**: protocol enums and return codes from the `types` crate
//! - **Network**: sockets use [`CommandHeader`] to frame instrumentation TCP
//!   streams without blocking
//! - **Runtime**: ports stamp headers through [`HeaderEncoder`], the
//!   instrumentation channel speaks [`Request`] / [`Response`]
//!
//! ## Architecture Role
//!
//! ```text
//! runtime (ports, context) ──► codec (this crate) ──► types
//!          │
//!          └──► network (sockets) ──► codec
//! ```
//!
//! The codec is pure: no sockets, no clocks. Callers pass timestamps in.

pub mod a429;
pub mod can;
pub mod error;
pub mod header;
pub mod instrumentation;
pub mod protocol_constants;

pub use error::{ProtocolError, ProtocolResult};
pub use header::{FrameHeader, HeaderEncoder, HeaderFlags};
pub use instrumentation::{
    CommandHeader, CommandId, ConfigAction, ConfigRequest, DataExchangeAction, FailureRequest,
    RegisterPacket, RegistrationKind, Request, Response, StateRequest,
};
pub use protocol_constants::*;
