//! Concrete sockets
//!
//! - [`udp`]: multicast and unicast datagram sockets for data channels
//! - [`tcp`]: framed stream socket for the instrumentation channel

pub mod tcp;
pub mod udp;


pub use tcp::TcpMessageSocket;
pub use udp::DatagramSocket;
