//! Instrumentation control protocol
//!
//! TCP frames exchanged with the simulation controller. Every frame is
//! `command_id:u32, payload_size:u32` followed by `payload_size` bytes, all
//! big-endian. Requests (`F_*`) have odd ids and their responses (`R_*`) the
//! following even id.
//!
//! Registration packets have a fixed layout ending in a 100-byte,
//! NUL-terminated virtual component name preceded by its size
//! (terminator included). Strings inside controller requests are
//! size-prefixed the same way but not padded.

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol_constants::{
    INSTRUMENTATION_HEADER_SIZE, REGISTER, REQUEST_MAX_STRING_SIZE, UNREGISTER,
};
use bytes::{Buf, BufMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use types::{Direction, RunState};

/// Instrumentation command identifiers
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum CommandId {
    FInstrumRegister = 1,
    RInstrumRegister = 2,
    FFailure = 3,
    RFailure = 4,
    FModeRegister = 5,
    RModeRegister = 6,
    FState = 7,
    RState = 8,
    FPowerRegister = 9,
    RPowerRegister = 10,
    FPowerSupply = 11,
    RPowerSupply = 12,
    FSyncRegister = 13,
    RSyncRegister = 14,
    FSynchro = 15,
    RSynchro = 16,
    FConfig = 17,
    RConfig = 18,
}

impl CommandId {
    pub fn is_request(self) -> bool {
        u32::from(self) % 2 == 1
    }

    /// Response id paired with a request id
    pub fn response(self) -> Option<CommandId> {
        if self.is_request() {
            CommandId::try_from(u32::from(self) + 1).ok()
        } else {
            None
        }
    }
}

/// The 8-byte frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub command_id: u32,
    pub payload_size: u32,
}

impl CommandHeader {
    pub const SIZE: usize = INSTRUMENTATION_HEADER_SIZE;

    pub fn parse(buffer: &[u8]) -> ProtocolResult<Self> {
        if buffer.len() < Self::SIZE {
            return Err(ProtocolError::message_too_small(
                Self::SIZE,
                buffer.len(),
                "instrumentation header",
            ));
        }
        let mut cursor = &buffer[..Self::SIZE];
        Ok(Self {
            command_id: cursor.get_u32(),
            payload_size: cursor.get_u32(),
        })
    }

    /// Header plus payload
    pub fn frame_size(&self) -> usize {
        Self::SIZE + self.payload_size as usize
    }

    pub fn command(&self) -> ProtocolResult<CommandId> {
        CommandId::try_from(self.command_id).map_err(|_| ProtocolError::UnknownCommand {
            command_id: self.command_id,
        })
    }
}

fn begin_frame(command: CommandId, payload_size: usize) -> Vec<u8> {
    let mut frame = Vec::with_capacity(INSTRUMENTATION_HEADER_SIZE + payload_size);
    frame.put_u32(command.into());
    frame.put_u32(payload_size as u32);
    frame
}

/// Payload slice of a complete frame, validated against the declared size
fn frame_body(frame: &[u8]) -> ProtocolResult<(CommandHeader, &[u8])> {
    let header = CommandHeader::parse(frame)?;
    let end = header.frame_size();
    if frame.len() < end {
        return Err(ProtocolError::message_too_small(
            end,
            frame.len(),
            format!("instrumentation command {}", header.command_id),
        ));
    }
    Ok((header, &frame[CommandHeader::SIZE..end]))
}

/// Sequential big-endian reader over a command body
struct BodyReader<'a> {
    body: &'a [u8],
    command_id: u32,
}

impl<'a> BodyReader<'a> {
    fn new(header: &CommandHeader, body: &'a [u8]) -> Self {
        Self {
            body,
            command_id: header.command_id,
        }
    }

    fn ensure(&self, size: usize) -> ProtocolResult<()> {
        if self.body.remaining() < size {
            return Err(ProtocolError::message_too_small(
                size,
                self.body.remaining(),
                format!("body of instrumentation command {}", self.command_id),
            ));
        }
        Ok(())
    }

    fn word(&mut self) -> ProtocolResult<u32> {
        self.ensure(4)?;
        Ok(self.body.get_u32())
    }

    fn float(&mut self) -> ProtocolResult<f32> {
        self.word().map(f32::from_bits)
    }

    fn string(&mut self) -> ProtocolResult<String> {
        let size = self.word()? as usize;
        if size > REQUEST_MAX_STRING_SIZE {
            return Err(ProtocolError::invalid_string(format!(
                "{} bytes exceeds the {} byte limit",
                size, REQUEST_MAX_STRING_SIZE
            )));
        }
        self.ensure(size)?;
        let raw = &self.body[..size];
        self.body.advance(size);
        decode_c_string(raw)
    }

    /// Fixed-size `string_size + name[100]` field of registration packets
    fn fixed_string(&mut self) -> ProtocolResult<String> {
        let size = self.word()? as usize;
        self.ensure(REQUEST_MAX_STRING_SIZE)?;
        let raw = &self.body[..size.min(REQUEST_MAX_STRING_SIZE)];
        self.body.advance(REQUEST_MAX_STRING_SIZE);
        decode_c_string(raw)
    }
}

fn decode_c_string(raw: &[u8]) -> ProtocolResult<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    std::str::from_utf8(&raw[..end])
        .map(str::to_owned)
        .map_err(|e| ProtocolError::invalid_string(e.to_string()))
}

/// Longest prefix of `text` that fits `max` bytes on a char boundary
fn truncate_to(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn put_string(frame: &mut Vec<u8>, text: &str) {
    let text = truncate_to(text, REQUEST_MAX_STRING_SIZE - 1);
    frame.put_u32(text.len() as u32 + 1);
    frame.put_slice(text.as_bytes());
    frame.put_u8(0);
}

fn put_fixed_string(frame: &mut Vec<u8>, text: &str) {
    let text = truncate_to(text, REQUEST_MAX_STRING_SIZE - 1);
    frame.put_u32(text.len() as u32 + 1);
    frame.put_slice(text.as_bytes());
    frame.put_bytes(0, REQUEST_MAX_STRING_SIZE - text.len());
}

// ==========================================================================
// Registration
// ==========================================================================

/// The four independent registration handshakes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationKind {
    Instrum,
    Mode,
    Power,
    Sync,
}

impl RegistrationKind {
    pub const ALL: [RegistrationKind; 4] = [
        RegistrationKind::Instrum,
        RegistrationKind::Mode,
        RegistrationKind::Power,
        RegistrationKind::Sync,
    ];

    pub fn request_id(self) -> CommandId {
        match self {
            RegistrationKind::Instrum => CommandId::FInstrumRegister,
            RegistrationKind::Mode => CommandId::FModeRegister,
            RegistrationKind::Power => CommandId::FPowerRegister,
            RegistrationKind::Sync => CommandId::FSyncRegister,
        }
    }

    pub fn response_id(self) -> CommandId {
        match self {
            RegistrationKind::Instrum => CommandId::RInstrumRegister,
            RegistrationKind::Mode => CommandId::RModeRegister,
            RegistrationKind::Power => CommandId::RPowerRegister,
            RegistrationKind::Sync => CommandId::RSyncRegister,
        }
    }

    pub fn from_request_id(command: CommandId) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.request_id() == command)
    }

    pub fn name(self) -> &'static str {
        match self {
            RegistrationKind::Instrum => "instrum",
            RegistrationKind::Mode => "mode",
            RegistrationKind::Power => "power",
            RegistrationKind::Sync => "sync",
        }
    }

    fn payload_size(self) -> usize {
        let extra = match self {
            RegistrationKind::Instrum | RegistrationKind::Power => 0,
            RegistrationKind::Mode | RegistrationKind::Sync => 4,
        };
        4 + extra + 4 + REQUEST_MAX_STRING_SIZE
    }
}

/// `F_*_REGISTER` packet (register or unregister)
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterPacket {
    pub kind: RegistrationKind,
    pub register: bool,
    pub vc_name: String,
    /// Only carried by mode registration
    pub step_by_step: bool,
    /// Only carried by sync registration
    pub application_period_ms: u32,
}

impl RegisterPacket {
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = begin_frame(self.kind.request_id(), self.kind.payload_size());
        let register = if self.register { REGISTER } else { UNREGISTER };

        match self.kind {
            RegistrationKind::Instrum | RegistrationKind::Power => {
                frame.put_u32(register);
            }
            RegistrationKind::Mode => {
                frame.put_u32(register);
                frame.put_u32(u32::from(self.step_by_step));
            }
            RegistrationKind::Sync => {
                frame.put_u32(self.application_period_ms);
                frame.put_u32(register);
            }
        }
        put_fixed_string(&mut frame, &self.vc_name);
        frame
    }

    pub fn parse(frame: &[u8]) -> ProtocolResult<Self> {
        let (header, body) = frame_body(frame)?;
        let kind = RegistrationKind::from_request_id(header.command()?).ok_or(
            ProtocolError::UnknownCommand {
                command_id: header.command_id,
            },
        )?;
        let mut reader = BodyReader::new(&header, body);

        let mut packet = RegisterPacket {
            kind,
            register: false,
            vc_name: String::new(),
            step_by_step: false,
            application_period_ms: 0,
        };
        match kind {
            RegistrationKind::Instrum | RegistrationKind::Power => {
                packet.register = reader.word()? == REGISTER;
            }
            RegistrationKind::Mode => {
                packet.register = reader.word()? == REGISTER;
                packet.step_by_step = reader.word()? != 0;
            }
            RegistrationKind::Sync => {
                packet.application_period_ms = reader.word()?;
                packet.register = reader.word()? == REGISTER;
            }
        }
        packet.vc_name = reader.fixed_string()?;
        Ok(packet)
    }
}

// ==========================================================================
// Controller requests
// ==========================================================================

/// Data-exchange manipulation requested through `F_FAILURE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataExchangeAction {
    /// Silence the channel
    Stop,
    /// Silence every channel sharing the channel's IP and direction
    StopFull,
    /// Restore every channel sharing the channel's IP and direction
    Start,
    /// Re-open the channel on another `ip:port`
    Redirect { address: String },
    /// Undo a redirection
    StopRedirect,
}

impl DataExchangeAction {
    fn sub_id_base(&self) -> u32 {
        match self {
            DataExchangeAction::Stop => 0,
            DataExchangeAction::StopFull => 2,
            DataExchangeAction::Start => 4,
            DataExchangeAction::Redirect { .. } => 6,
            DataExchangeAction::StopRedirect => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRequest {
    pub channel: String,
    pub action: DataExchangeAction,
    /// Emission sub-commands target outputs, reception ones inputs
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateRequest {
    pub state_id: u32,
    pub synchro_mode: u32,
    pub time_ratio: f32,
}

impl StateRequest {
    pub fn run_state(&self) -> Option<RunState> {
        match self.state_id {
            0 => Some(RunState::Reset),
            1 => Some(RunState::Run),
            2 => Some(RunState::Step),
            3 => Some(RunState::Hold),
            _ => None,
        }
    }

    pub fn state_id_of(state: RunState) -> u32 {
        match state {
            RunState::Reset => 0,
            RunState::Run => 1,
            RunState::Step => 2,
            RunState::Hold => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    Load,
    Apply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRequest {
    pub command_id: u32,
    pub configuration: String,
}

impl ConfigRequest {
    pub fn action(&self) -> Option<ConfigAction> {
        match self.command_id {
            0 => Some(ConfigAction::Load),
            1 => Some(ConfigAction::Apply),
            _ => None,
        }
    }
}

/// Requests the controller sends to a virtual component
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Failure(FailureRequest),
    Config(ConfigRequest),
    State(StateRequest),
    Synchro { steps: u32 },
    PowerSupply { command_id: u32 },
}

impl Request {
    pub fn command(&self) -> CommandId {
        match self {
            Request::Failure(_) => CommandId::FFailure,
            Request::Config(_) => CommandId::FConfig,
            Request::State(_) => CommandId::FState,
            Request::Synchro { .. } => CommandId::FSynchro,
            Request::PowerSupply { .. } => CommandId::FPowerSupply,
        }
    }

    /// Decode one complete frame
    pub fn parse(frame: &[u8]) -> ProtocolResult<Self> {
        let (header, body) = frame_body(frame)?;
        let mut reader = BodyReader::new(&header, body);

        match header.command()? {
            CommandId::FFailure => {
                let channel = reader.string()?;
                let sub_id = reader.word()?;
                let direction = if sub_id % 2 == 0 {
                    Direction::Output
                } else {
                    Direction::Input
                };
                let action = match sub_id / 2 {
                    0 => DataExchangeAction::Stop,
                    1 => DataExchangeAction::StopFull,
                    2 => DataExchangeAction::Start,
                    3 => DataExchangeAction::Redirect {
                        address: reader.string()?,
                    },
                    4 => DataExchangeAction::StopRedirect,
                    _ => {
                        return Err(ProtocolError::UnknownSubCommand {
                            command_id: header.command_id,
                            field: "failure command",
                            value: sub_id,
                        })
                    }
                };
                Ok(Request::Failure(FailureRequest {
                    channel,
                    action,
                    direction,
                }))
            }
            CommandId::FConfig => Ok(Request::Config(ConfigRequest {
                command_id: reader.word()?,
                configuration: reader.string()?,
            })),
            CommandId::FState => Ok(Request::State(StateRequest {
                state_id: reader.word()?,
                synchro_mode: reader.word()?,
                time_ratio: reader.float()?,
            })),
            CommandId::FSynchro => Ok(Request::Synchro {
                steps: reader.word()?,
            }),
            CommandId::FPowerSupply => Ok(Request::PowerSupply {
                command_id: reader.word()?,
            }),
            _ => Err(ProtocolError::UnknownCommand {
                command_id: header.command_id,
            }),
        }
    }

    /// Encode as the controller would send it
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(64);
        match self {
            Request::Failure(failure) => {
                put_string(&mut body, &failure.channel);
                let emission_offset = match failure.direction {
                    Direction::Output => 0,
                    Direction::Input => 1,
                };
                body.put_u32(failure.action.sub_id_base() + emission_offset);
                if let DataExchangeAction::Redirect { address } = &failure.action {
                    put_string(&mut body, address);
                }
            }
            Request::Config(config) => {
                body.put_u32(config.command_id);
                put_string(&mut body, &config.configuration);
            }
            Request::State(state) => {
                body.put_u32(state.state_id);
                body.put_u32(state.synchro_mode);
                body.put_u32(state.time_ratio.to_bits());
            }
            Request::Synchro { steps } => body.put_u32(*steps),
            Request::PowerSupply { command_id } => body.put_u32(*command_id),
        }

        let mut frame = begin_frame(self.command(), body.len());
        frame.extend_from_slice(&body);
        frame
    }
}

// ==========================================================================
// Responses
// ==========================================================================

/// Responses a virtual component sends back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Status-only response (`R_*_REGISTER`, `R_FAILURE`, `R_POWERSUPPLY`, `R_SYNCHRO`)
    Ack { command: CommandId, status: u32 },
    Config { ack_id: u32, ack_value: u32 },
    State {
        ack_id: u32,
        ack_value: u32,
        end_status: u32,
    },
}

impl Response {
    pub fn command(&self) -> CommandId {
        match self {
            Response::Ack { command, .. } => *command,
            Response::Config { .. } => CommandId::RConfig,
            Response::State { .. } => CommandId::RState,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Response::Ack { command, status } => {
                let mut frame = begin_frame(command, 4);
                frame.put_u32(status);
                frame
            }
            Response::Config { ack_id, ack_value } => {
                let mut frame = begin_frame(CommandId::RConfig, 8);
                frame.put_u32(ack_id);
                frame.put_u32(ack_value);
                frame
            }
            Response::State {
                ack_id,
                ack_value,
                end_status,
            } => {
                let mut frame = begin_frame(CommandId::RState, 12);
                frame.put_u32(ack_id);
                frame.put_u32(ack_value);
                frame.put_u32(end_status);
                frame
            }
        }
    }

    pub fn parse(frame: &[u8]) -> ProtocolResult<Self> {
        let (header, body) = frame_body(frame)?;
        let mut reader = BodyReader::new(&header, body);

        match header.command()? {
            CommandId::RConfig => Ok(Response::Config {
                ack_id: reader.word()?,
                ack_value: reader.word()?,
            }),
            CommandId::RState => Ok(Response::State {
                ack_id: reader.word()?,
                ack_value: reader.word()?,
                end_status: reader.word()?,
            }),
            command if !command.is_request() => Ok(Response::Ack {
                command,
                status: reader.word()?,
            }),
            command => Err(ProtocolError::UnexpectedCommand {
                expected: command.response().map(u32::from).unwrap_or_default(),
                got: header.command_id,
            }),
        }
    }

    /// Validate a registration acknowledge against the expected kind
    pub fn expect_registration(frame: &[u8], kind: RegistrationKind) -> ProtocolResult<u32> {
        let header = CommandHeader::parse(frame)?;
        let expected = kind.response_id();
        if header.command_id != u32::from(expected) {
            return Err(ProtocolError::UnexpectedCommand {
                expected: expected.into(),
                got: header.command_id,
            });
        }
        match Self::parse(frame)? {
            Response::Ack { status, .. } => Ok(status),
            _ => Err(ProtocolError::UnexpectedCommand {
                expected: expected.into(),
                got: header.command_id,
            }),
        }
    }
}
