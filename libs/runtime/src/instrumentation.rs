//! Instrumentation channel
//!
//! Control link between a virtual component and the simulation controller.
//! The channel registers the component (instrumentation, mode, power and
//! sync kinds, each independent), collects the controller's requests on
//! every `import` and writes the responses. Request handling itself lives
//! in the context, which owns the state the requests act on.

use crate::error::{EngineError, Result};
use codec::{
    ProtocolError, RegisterPacket, RegistrationKind, Request, Response, ACK_OK,
    INSTRUMENTATION_MESSAGE_MAX_SIZE,
};
use network::Socket;
use tracing::{debug, info, warn};
use types::{PortId, SocketId};

#[derive(Debug)]
pub struct InstrumentationChannel {
    id: PortId,
    socket: SocketId,
    vc_name: String,
    step_by_step: bool,
    application_period_ms: u32,
    registered: Vec<RegistrationKind>,
    buffer: Vec<u8>,
}

impl InstrumentationChannel {
    pub fn new(
        id: PortId,
        socket: SocketId,
        vc_name: impl Into<String>,
        step_by_step: bool,
        period_us: u64,
    ) -> Self {
        Self {
            id,
            socket,
            vc_name: vc_name.into(),
            step_by_step,
            application_period_ms: u32::try_from(period_us / 1_000).unwrap_or(u32::MAX),
            registered: Vec::new(),
            buffer: vec![0; INSTRUMENTATION_MESSAGE_MAX_SIZE],
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn socket(&self) -> SocketId {
        self.socket
    }

    pub fn is_registered(&self, kind: RegistrationKind) -> bool {
        self.registered.contains(&kind)
    }

    pub fn registered(&self) -> &[RegistrationKind] {
        &self.registered
    }

    fn packet(&self, kind: RegistrationKind, register: bool) -> RegisterPacket {
        RegisterPacket {
            kind,
            register,
            vc_name: self.vc_name.clone(),
            step_by_step: self.step_by_step,
            application_period_ms: self.application_period_ms,
        }
    }

    /// Register one kind and wait for the controller's acknowledge.
    /// Registering an already registered kind does nothing.
    pub fn register(&mut self, socket: &mut dyn Socket, kind: RegistrationKind) -> Result<()> {
        if self.is_registered(kind) {
            debug!("{} registration already done", kind.name());
            return Ok(());
        }

        socket.send(&self.packet(kind, true).encode())?;
        socket.set_blocking(true)?;
        let received = self.wait_frame(socket);
        socket.set_blocking(false)?;
        let received = received?;

        let status = Response::expect_registration(&self.buffer[..received], kind)?;
        if status != ACK_OK {
            return Err(EngineError::initialization(format!(
                "Controller refused {} registration of {} (status {})",
                kind.name(),
                self.vc_name,
                status
            )));
        }
        self.registered.push(kind);
        info!("{} registered for {}", self.vc_name, kind.name());
        Ok(())
    }

    fn wait_frame(&mut self, socket: &mut dyn Socket) -> Result<usize> {
        loop {
            let received = socket.receive_packet(&mut self.buffer)?;
            if received > 0 {
                return Ok(received);
            }
        }
    }

    /// Send an unregister packet for every registered kind
    pub fn unregister_all(&mut self, socket: &mut dyn Socket) -> Result<()> {
        for kind in std::mem::take(&mut self.registered) {
            socket.send(&self.packet(kind, false).encode())?;
            info!("{} unregistered from {}", self.vc_name, kind.name());
        }
        Ok(())
    }

    /// Decode every complete frame waiting on the link. Frames the
    /// component does not understand are logged and skipped.
    pub fn receive(&mut self, socket: &mut dyn Socket) -> Result<Vec<Request>> {
        let mut requests = Vec::new();
        loop {
            let received = socket.receive_packet(&mut self.buffer)?;
            if received == 0 {
                break;
            }
            match Request::parse(&self.buffer[..received]) {
                Ok(request) => {
                    debug!(command = ?request.command(), "instrumentation request");
                    requests.push(request);
                }
                Err(
                    e @ (ProtocolError::UnknownCommand { .. }
                    | ProtocolError::UnknownSubCommand { .. }),
                ) => warn!("Ignoring instrumentation frame: {}", e),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(requests)
    }

    pub fn reply(&self, socket: &mut dyn Socket, response: Response) -> Result<()> {
        debug!(command = ?response.command(), "instrumentation response");
        socket.send(&response.encode())?;
        Ok(())
    }
}
