//! # skybus Types Library
//!
//! Vocabulary shared by every skybus crate: the message protocol tags,
//! directions, modes and validity states that appear on the public driver
//! surface, the numeric return codes exposed to façade layers, and the typed
//! arena handles the engine uses instead of back-pointers.
//!
//! ## Design Philosophy
//!
//! - **Stable numeric values**: every enum carries an explicit `#[repr]`
//!   discriminant so values crossing an FFI or wire boundary never drift
//! - **Typed handles**: ports, sockets and messages are addressed by distinct
//!   index newtypes so a socket slot can never be passed where a port is expected
//! - **No I/O**: this crate has no runtime dependencies beyond `num_enum`,
//!   `thiserror` and (optionally) `serde`
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{Direction, Mode, Protocol, Validity, PortId};
//!
//! let port = PortId::new(3);
//! assert_eq!(port.index(), 3);
//! assert_eq!(u32::from(Validity::NeverReceivedButInitialized), 3);
//! assert!(Protocol::A429.is_bus());
//! assert_eq!(Mode::default(), Mode::Sampling);
//! assert_eq!(Direction::try_from(1u32).unwrap(), Direction::Output);
//! ```

pub mod errors;
pub mod identifiers;
pub mod protocol;

pub use errors::{ReturnCode, UnknownValue};
pub use identifiers::{MessageHandle, PortId, SocketId};
pub use protocol::{Direction, Mode, NadType, PortKind, Protocol, RunState, Validity};
