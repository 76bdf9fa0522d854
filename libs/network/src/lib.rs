//! # skybus Network - Sockets and Socket Pool
//!
//! ## Purpose
//!
//! Everything that touches a file descriptor: UDP sockets for data
//! channels, the TCP message socket of the instrumentation link, the void
//! socket standing in for silenced channels, and the [`SocketPool`] that
//! owns them and waits for input.
//!
//! ## Integration Points
//!
//! - **Codec**: [`TcpMessageSocket`] frames the instrumentation stream with
//!   `codec::CommandHeader`; the pool applies `codec::FailureRequest`s
//! - **Runtime**: ports address their socket by `types::SocketId` and are
//!   called back by [`SocketPool::import`] with the ready socket
//!
//! ## Concurrency
//!
//! None. The pool is driven from the simulation step loop; the only wait is
//! the `poll(2)` inside `import`.

pub mod address;
pub mod error;
pub mod pool;
pub mod socket;
pub mod transports;

pub use address::{parse_endpoint, SocketAddress};
pub use error::{Result, TransportError};
pub use pool::{SocketOpener, SocketPool};
pub use socket::{Socket, VoidSocket};
pub use transports::{DatagramSocket, TcpMessageSocket};
