//! Message-level enumerations
//!
//! Discriminants are part of the external contract (façade return values,
//! instrumentation payloads) and must not be renumbered.

use crate::errors::UnknownValue;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use std::str::FromStr;

/// Physical or logical protocol carried by a message
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Protocol {
    Afdx = 0,
    A429 = 1,
    Can = 2,
    Analogue = 3,
    Discrete = 4,
    Nad = 5,
}

impl Protocol {
    pub const fn name(self) -> &'static str {
        match self {
            Protocol::Afdx => "afdx",
            Protocol::A429 => "a429",
            Protocol::Can => "can",
            Protocol::Analogue => "analogue",
            Protocol::Discrete => "discrete",
            Protocol::Nad => "nad",
        }
    }

    /// Bus protocols carry whole messages rather than offset-mapped signals
    pub const fn is_bus(self) -> bool {
        matches!(self, Protocol::Afdx | Protocol::A429 | Protocol::Can)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "afdx" => Ok(Protocol::Afdx),
            "a429" => Ok(Protocol::A429),
            "can" => Ok(Protocol::Can),
            "analogue" | "analog" => Ok(Protocol::Analogue),
            "discrete" => Ok(Protocol::Discrete),
            "nad" => Ok(Protocol::Nad),
            _ => Err(UnknownValue::new("protocol", s)),
        }
    }
}

/// Direction of a message as seen from the local virtual component
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Direction {
    Input = 0,
    Output = 1,
}

impl Direction {
    pub const fn name(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Direction {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "input" | "in" => Ok(Direction::Input),
            "output" | "out" => Ok(Direction::Output),
            _ => Err(UnknownValue::new("direction", s)),
        }
    }
}

/// Delivery mode: latest value wins, or bounded FIFO
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Mode {
    #[default]
    Sampling = 0,
    Queuing = 1,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Sampling => "sampling",
            Mode::Queuing => "queuing",
        })
    }
}

/// Validity reported alongside every sampling read
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Validity {
    /// Received (or written) and still inside its validity window
    Valid = 0,
    /// Received once, but the validity window elapsed or it was invalidated
    Invalid = 1,
    /// Nothing received and no initial value configured
    NeverReceived = 2,
    /// Nothing received; the configured initial value is returned
    NeverReceivedButInitialized = 3,
}

impl Validity {
    pub const fn is_valid(self) -> bool {
        matches!(self, Validity::Valid)
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Validity::Valid => "valid",
            Validity::Invalid => "invalid",
            Validity::NeverReceived => "never_received",
            Validity::NeverReceivedButInitialized => "never_received_but_initialized",
        })
    }
}

/// Simulation run state, driven by the instrumentation channel
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RunState {
    #[default]
    Run = 0,
    Step = 1,
    Hold = 2,
    Reset = 3,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Run => "run",
            RunState::Step => "step",
            RunState::Hold => "hold",
            RunState::Reset => "reset",
        })
    }
}

/// Shape of a port: which messages it carries and how it is scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PortKind {
    /// Offset-mapped analogue signals
    Analogue,
    /// Offset-mapped discrete signals
    Discrete,
    /// Offset-mapped raw blocks
    Nad,
    /// One AFDX sampling message per datagram
    AfdxSampling,
    /// One AFDX queuing message, one datagram per entry
    AfdxQueuing,
    /// ARINC 429 labels
    A429,
    /// CAN frames
    Can,
}

impl PortKind {
    pub const fn protocol(self) -> Protocol {
        match self {
            PortKind::Analogue => Protocol::Analogue,
            PortKind::Discrete => Protocol::Discrete,
            PortKind::Nad => Protocol::Nad,
            PortKind::AfdxSampling | PortKind::AfdxQueuing => Protocol::Afdx,
            PortKind::A429 => Protocol::A429,
            PortKind::Can => Protocol::Can,
        }
    }

    /// Output ports of a periodic kind are sent by every `send_all`, subject
    /// to their own period. The others only go out through the output queue.
    pub const fn is_periodic(self) -> bool {
        !matches!(self, PortKind::Discrete | PortKind::AfdxQueuing)
    }

    /// Mode forced on every message of the port, `None` when mixed
    pub const fn fixed_mode(self) -> Option<Mode> {
        match self {
            PortKind::AfdxQueuing => Some(Mode::Queuing),
            PortKind::A429 => None,
            _ => Some(Mode::Sampling),
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PortKind::Analogue => "analogue",
            PortKind::Discrete => "discrete",
            PortKind::Nad => "nad",
            PortKind::AfdxSampling => "afdx_sampling",
            PortKind::AfdxQueuing => "afdx_queuing",
            PortKind::A429 => "a429",
            PortKind::Can => "can",
        })
    }
}

/// Element type of a NAD block. Metadata only: the engine moves raw bytes.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NadType {
    #[default]
    Undefined = 0,
    Boolean = 1,
    C08 = 2,
    F32 = 3,
    F64 = 4,
    I16 = 5,
    I32 = 6,
    I64 = 7,
}

impl NadType {
    /// Size in bytes of one element, `None` when undefined
    pub const fn element_size(self) -> Option<usize> {
        match self {
            NadType::Undefined => None,
            NadType::Boolean | NadType::C08 => Some(1),
            NadType::I16 => Some(2),
            NadType::F32 | NadType::I32 => Some(4),
            NadType::F64 | NadType::I64 => Some(8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminants_are_stable() {
        assert_eq!(u32::from(Protocol::Afdx), 0);
        assert_eq!(u32::from(Protocol::Nad), 5);
        assert_eq!(u32::from(Direction::Output), 1);
        assert_eq!(u32::from(Validity::NeverReceived), 2);
        assert_eq!(u32::from(RunState::Reset), 3);
        assert_eq!(u32::from(NadType::I64), 7);
    }

    #[test]
    fn test_try_from_rejects_unknown() {
        assert!(Protocol::try_from(6u32).is_err());
        assert!(Direction::try_from(2u32).is_err());
        assert_eq!(Validity::try_from(1u32).unwrap(), Validity::Invalid);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("A429".parse::<Protocol>().unwrap(), Protocol::A429);
        assert_eq!("analog".parse::<Protocol>().unwrap(), Protocol::Analogue);
        assert_eq!("out".parse::<Direction>().unwrap(), Direction::Output);

        let err = "ethernet".parse::<Protocol>().unwrap_err();
        assert!(err.to_string().contains("ethernet"));
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&Protocol::Analogue).unwrap();
        assert_eq!(json, "\"analogue\"");
        let mode: Mode = serde_json::from_str("\"queuing\"").unwrap();
        assert_eq!(mode, Mode::Queuing);
    }

    #[test]
    fn test_port_kind_scheduling() {
        assert!(PortKind::Analogue.is_periodic());
        assert!(PortKind::A429.is_periodic());
        assert!(!PortKind::Discrete.is_periodic());
        assert!(!PortKind::AfdxQueuing.is_periodic());
        assert_eq!(PortKind::AfdxSampling.protocol(), Protocol::Afdx);
        assert_eq!(PortKind::A429.fixed_mode(), None);

        let kind: PortKind = serde_json::from_str("\"afdx_queuing\"").unwrap();
        assert_eq!(kind, PortKind::AfdxQueuing);
    }

    #[test]
    fn test_nad_element_sizes() {
        assert_eq!(NadType::Undefined.element_size(), None);
        assert_eq!(NadType::I16.element_size(), Some(2));
        assert_eq!(NadType::F64.element_size(), Some(8));
    }
}
