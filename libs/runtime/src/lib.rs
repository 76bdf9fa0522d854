//! # skybus Runtime - Messages, Ports and the Simulation Context
//!
//! ## Purpose
//!
//! The engine a virtual component links against. Messages hold the typed
//! signal state (analogue, discrete, NAD, bus sampling, queuing), ports map
//! them onto datagram payloads, and the [`Context`] ties ports, the socket
//! pool, the output queue and the instrumentation channel to the
//! simulation clock.
//!
//! ## Integration Points
//!
//! - **Config**: [`ContextBuilder`] turns a `skybus_config::ContextConfig`
//!   into a ready context; [`logging::init_tracing`] installs the subscriber
//! - **Codec**: frame headers, A429 words, CAN frames and instrumentation
//!   requests/responses
//! - **Network**: every port owns one slot of the `network::SocketPool`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runtime::ContextBuilder;
//! use skybus_config::ContextConfig;
//! use std::time::Duration;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ContextConfig::load("fcs.toml".as_ref())?;
//! let mut context = ContextBuilder::new(&config).build()?;
//! let altitude = context.handle("ALTITUDE")?;
//!
//! loop {
//!     context.progress(config.period_us)?;
//!     context.import(Duration::from_millis(5))?;
//!     context.write_sampling(altitude, &1200.0f32.to_ne_bytes())?;
//!     context.send_all()?;
//! }
//! # }
//! ```

pub mod builder;
pub mod context;
pub mod error;
pub mod instrumentation;
pub mod logging;
pub mod message;
pub mod output_queue;
pub mod port;

pub use builder::ContextBuilder;
pub use context::{Context, INSTRUMENTATION_PORT};
pub use error::{EngineError, Result};
pub use instrumentation::InstrumentationChannel;
pub use message::{Message, MessageBody, MessageInfo, Reading};
pub use output_queue::OutputQueue;
pub use port::{MessageShape, MessageSpec, Port, PortSpec, Timestamps};
