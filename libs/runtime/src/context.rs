//! Simulation context
//!
//! The [`Context`] owns everything a virtual component exchanges: ports
//! and their messages, the socket pool, the output queue of on-change ports
//! and the optional instrumentation channel. It also carries the simulation
//! clock and the run state driven by the controller.
//!
//! The embedding application drives it from its own step loop:
//!
//! ```text
//! progress(step) ─► import(timeout) ─► <application work> ─► send_all()
//! ```
//!
//! Messages are addressed by [`MessageHandle`]s obtained once by name.
//! Writes and pushes are only accepted on output messages, reads and pops
//! only on input ones.

use crate::error::{EngineError, Result};
use crate::instrumentation::InstrumentationChannel;
use crate::message::{Message, MessageBody, Reading};
use crate::output_queue::OutputQueue;
use crate::port::{MessageSpec, Port, PortSpec, Timestamps};
use codec::{
    CommandId, ConfigAction, ConfigRequest, RegistrationKind, Request, Response, StateRequest,
    ACK_CONFIGURED, ACK_ERROR, ACK_OK, ACK_STEP_UNSUPPORTED,
};
use network::{Socket, SocketPool};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};
use types::{Direction, MessageHandle, PortId, Protocol, RunState};

/// Port id reserved for the instrumentation link inside the socket pool
pub const INSTRUMENTATION_PORT: PortId = PortId::new(u32::MAX);

/// Accepted range of the controller's time ratio
pub const TIME_RATIO_RANGE: (f32, f32) = (1.0e-3, 1.0e3);

/// Non-positive or non-finite ratios fall back to real time, the rest are
/// clamped into [`TIME_RATIO_RANGE`]
fn sanitize_time_ratio(ratio: f32) -> f32 {
    let (min, max) = TIME_RATIO_RANGE;
    if !ratio.is_finite() || ratio <= 0.0 {
        warn!("Invalid time ratio {}, using 1.0 instead", ratio);
        return 1.0;
    }
    if !(min..=max).contains(&ratio) {
        warn!("Time ratio {} out of range, clamped to [{}, {}]", ratio, min, max);
    }
    ratio.clamp(min, max)
}

pub struct Context {
    vc_name: String,
    prod_id: u16,
    period_us: u64,
    step_by_step: bool,

    time_us: u64,
    posix_time_us: u64,
    run_state: RunState,
    time_ratio: f32,
    autonomous_realtime: bool,
    powered: bool,
    steps_requested: u32,
    time_before_notify_us: u64,

    ports: Vec<Port>,
    /// Periodic output ports, invoked on every `send_all`
    periodic: Vec<PortId>,
    queue: OutputQueue,
    pool: SocketPool,
    names: HashMap<String, MessageHandle>,
    instrumentation: Option<InstrumentationChannel>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("vc_name", &self.vc_name)
            .field("time_us", &self.time_us)
            .field("run_state", &self.run_state)
            .field("ports", &self.ports.len())
            .field("messages", &self.names.len())
            .finish()
    }
}

fn posix_now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

impl Context {
    pub fn new(vc_name: impl Into<String>, prod_id: u16, period_us: u64) -> Self {
        Self::with_pool(vc_name, prod_id, period_us, SocketPool::new())
    }

    pub fn with_pool(
        vc_name: impl Into<String>,
        prod_id: u16,
        period_us: u64,
        pool: SocketPool,
    ) -> Self {
        Self {
            vc_name: vc_name.into(),
            prod_id,
            period_us,
            step_by_step: true,
            time_us: 0,
            posix_time_us: 0,
            run_state: RunState::Run,
            time_ratio: 1.0,
            autonomous_realtime: true,
            powered: true,
            steps_requested: 0,
            time_before_notify_us: 0,
            ports: Vec::new(),
            periodic: Vec::new(),
            queue: OutputQueue::new(),
            pool,
            names: HashMap::new(),
            instrumentation: None,
        }
    }

    pub fn set_step_by_step(&mut self, enabled: bool) {
        self.step_by_step = enabled;
    }

    // ----------------------------------------------------------------------
    // Construction
    // ----------------------------------------------------------------------

    /// Create a port on `socket`. The socket joins the pool under the port's
    /// channel name.
    pub fn add_port(&mut self, spec: &PortSpec, socket: Box<dyn Socket>) -> Result<PortId> {
        let id = PortId::next_for(self.ports.len());
        let socket_id = self.pool.add(socket, spec.channel.as_str(), id)?;
        let port = Port::new(id, spec, socket_id, self.prod_id);
        if port.is_periodic_output() {
            self.periodic.push(id);
        }
        info!("Created {}", port.describe());
        self.ports.push(port);
        Ok(id)
    }

    /// Map a message onto `port` and make it reachable as `local_name`
    pub fn register(
        &mut self,
        port: PortId,
        local_name: &str,
        spec: MessageSpec,
    ) -> Result<MessageHandle> {
        let target = self.ports.get_mut(port.index()).ok_or_else(|| {
            EngineError::initialization(format!("Cannot register {} on unknown {}", local_name, port))
        })?;
        let handle = MessageHandle::new(port, target.register(spec)?);

        match self.names.get(local_name) {
            Some(existing) if *existing != handle => Err(EngineError::initialization(format!(
                "Message name {} already used by {}",
                local_name, existing
            ))),
            Some(_) => Ok(handle),
            None => {
                debug!(message = %local_name, %handle, "message registered");
                self.names.insert(local_name.to_string(), handle);
                Ok(handle)
            }
        }
    }

    /// Connect the instrumentation link. Registration is a separate step,
    /// see [`Context::register_instrumentation`].
    pub fn attach_instrumentation(&mut self, socket: Box<dyn Socket>) -> Result<()> {
        if self.instrumentation.is_some() {
            return Err(EngineError::initialization(
                "Instrumentation channel already attached",
            ));
        }
        let socket = self.pool.add_control(socket, INSTRUMENTATION_PORT)?;
        self.instrumentation = Some(InstrumentationChannel::new(
            INSTRUMENTATION_PORT,
            socket,
            self.vc_name.clone(),
            self.step_by_step,
            self.period_us,
        ));
        Ok(())
    }

    /// Run the registration handshakes, blocking for each acknowledge
    pub fn register_instrumentation(&mut self, kinds: &[RegistrationKind]) -> Result<()> {
        let Some(channel) = self.instrumentation.as_mut() else {
            return Err(EngineError::configuration("No instrumentation channel"));
        };
        let socket = self
            .pool
            .socket_mut(channel.socket())
            .ok_or_else(|| EngineError::initialization("Instrumentation socket missing"))?;
        for &kind in kinds {
            channel.register(socket, kind)?;
        }
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Accessors
    // ----------------------------------------------------------------------

    pub fn vc_name(&self) -> &str {
        &self.vc_name
    }

    pub fn prod_id(&self) -> u16 {
        self.prod_id
    }

    pub fn period_us(&self) -> u64 {
        self.period_us
    }

    pub fn is_step_by_step_enabled(&self) -> bool {
        self.step_by_step
    }

    pub fn time_us(&self) -> u64 {
        self.time_us
    }

    /// Wall clock captured by the last `send_all`
    pub fn posix_time_us(&self) -> u64 {
        self.posix_time_us
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn time_ratio(&self) -> f32 {
        self.time_ratio
    }

    pub fn is_autonomous_realtime(&self) -> bool {
        self.autonomous_realtime
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Steps requested by the controller since the last call
    pub fn get_synchro_steps_request(&mut self) -> u32 {
        std::mem::take(&mut self.steps_requested)
    }

    /// Simulated time left before the pending `R_SYNCHRO`
    pub fn time_before_notify_us(&self) -> u64 {
        self.time_before_notify_us
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.get(id.index())
    }

    pub fn pool(&self) -> &SocketPool {
        &self.pool
    }

    pub fn instrumentation(&self) -> Option<&InstrumentationChannel> {
        self.instrumentation.as_ref()
    }

    pub fn queued_ports(&self) -> usize {
        self.queue.len()
    }

    // ----------------------------------------------------------------------
    // Messages
    // ----------------------------------------------------------------------

    pub fn handle(&self, name: &str) -> Result<MessageHandle> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::not_found(name))
    }

    /// Look a message up by name and check the application's view of it
    pub fn get_message(
        &mut self,
        name: &str,
        protocol: Protocol,
        max_size: usize,
        depth: usize,
        direction: Direction,
    ) -> Result<MessageHandle> {
        let handle = self.handle(name)?;
        if !self.message_mut(handle)?.check(protocol, max_size, depth, direction) {
            return Err(EngineError::configuration(format!(
                "Message {} does not match {} {} size {} depth {}",
                name, direction, protocol, max_size, depth
            )));
        }
        Ok(handle)
    }

    pub fn message(&self, handle: MessageHandle) -> Result<&Message> {
        self.ports
            .get(handle.port.index())
            .and_then(|port| port.message(handle.slot))
            .ok_or_else(|| EngineError::not_found(handle.to_string()))
    }

    fn message_mut(&mut self, handle: MessageHandle) -> Result<&mut Message> {
        self.ports
            .get_mut(handle.port.index())
            .and_then(|port| port.message_mut(handle.slot))
            .ok_or_else(|| EngineError::not_found(handle.to_string()))
    }

    fn write_checked(
        &mut self,
        handle: MessageHandle,
        data: &[u8],
        nad: bool,
    ) -> Result<()> {
        let now = self.time_us;
        let (port, slot) = locate(&mut self.ports, handle, Direction::Output, "write to")?;
        let message = port
            .message_mut(slot)
            .ok_or_else(|| EngineError::not_found(handle.to_string()))?;
        if nad != matches!(message.body(), MessageBody::Nad(_)) {
            return Err(EngineError::configuration(format!(
                "{} is a {} message",
                message.name(),
                message.protocol()
            )));
        }
        if message.write(data, now)? {
            self.queue.push(port);
        }
        Ok(())
    }

    fn read_checked(&mut self, handle: MessageHandle, nad: bool) -> Result<Reading> {
        let now = self.time_us;
        let (port, slot) = locate(&mut self.ports, handle, Direction::Input, "read from")?;
        let message = port
            .message(slot)
            .ok_or_else(|| EngineError::not_found(handle.to_string()))?;
        if nad != matches!(message.body(), MessageBody::Nad(_)) {
            return Err(EngineError::configuration(format!(
                "{} is a {} message",
                message.name(),
                message.protocol()
            )));
        }
        message.read(now)
    }

    /// Write a sampling value (analogue, discrete, AFDX, A429 or CAN)
    pub fn write_sampling(&mut self, handle: MessageHandle, data: &[u8]) -> Result<()> {
        self.write_checked(handle, data, false)
    }

    pub fn read_sampling(&mut self, handle: MessageHandle) -> Result<Reading> {
        self.read_checked(handle, false)
    }

    pub fn write_nad(&mut self, handle: MessageHandle, data: &[u8]) -> Result<()> {
        self.write_checked(handle, data, true)
    }

    pub fn read_nad(&mut self, handle: MessageHandle) -> Result<Reading> {
        self.read_checked(handle, true)
    }

    /// Append entries to an output queue; the port is sent on the next
    /// `send_all`
    pub fn push_queuing(&mut self, handle: MessageHandle, data: &[u8]) -> Result<()> {
        let (port, slot) = locate(&mut self.ports, handle, Direction::Output, "push to")?;
        port.message_mut(slot)
            .ok_or_else(|| EngineError::not_found(handle.to_string()))?
            .push(data)?;
        self.queue.push(port);
        Ok(())
    }

    pub fn pop_queuing(&mut self, handle: MessageHandle) -> Result<Vec<u8>> {
        let (port, slot) = locate(&mut self.ports, handle, Direction::Input, "pop from")?;
        port.message_mut(slot)
            .ok_or_else(|| EngineError::not_found(handle.to_string()))?
            .pop()
    }

    pub fn queuing_pending(&self, handle: MessageHandle) -> Result<usize> {
        self.message(handle)?.pending()
    }

    pub fn validity_duration(&self, handle: MessageHandle) -> Result<u64> {
        self.message(handle)?.validity_duration()
    }

    pub fn set_validity_duration(&mut self, handle: MessageHandle, duration_us: u64) -> Result<()> {
        self.message_mut(handle)?.set_validity_duration(duration_us)
    }

    pub fn invalidate(&mut self, handle: MessageHandle) -> Result<()> {
        self.message_mut(handle)?.invalidate()
    }

    /// Reset one message; a modified output is sent on the next `send_all`
    pub fn reset_message(&mut self, handle: MessageHandle) -> Result<()> {
        let port = self
            .ports
            .get_mut(handle.port.index())
            .ok_or_else(|| EngineError::not_found(handle.to_string()))?;
        let message = port
            .message_mut(handle.slot)
            .ok_or_else(|| EngineError::not_found(handle.to_string()))?;
        if message.reset() && message.direction() == Direction::Output {
            self.queue.push(port);
        }
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Step loop
    // ----------------------------------------------------------------------

    /// Advance simulated time. Acknowledges a pending `F_SYNCHRO` once the
    /// requested steps have elapsed.
    pub fn progress(&mut self, duration_us: u64) -> Result<()> {
        self.time_us = self.time_us.saturating_add(duration_us);
        if self.time_before_notify_us == 0 {
            return Ok(());
        }
        if self.time_before_notify_us > duration_us {
            self.time_before_notify_us -= duration_us;
            return Ok(());
        }

        self.time_before_notify_us = 0;
        self.steps_requested = 0;
        debug!("Sending R_SYNCHRO acknowledge");
        self.reply(Response::Ack {
            command: CommandId::RSynchro,
            status: ACK_OK,
        })
    }

    /// Wait up to `timeout` for input, receive it, then handle the
    /// controller requests that arrived. Returns the sockets serviced.
    pub fn import(&mut self, timeout: Duration) -> Result<usize> {
        let now = self.time_us;
        let ports = &mut self.ports;
        let instrumentation = &mut self.instrumentation;
        let mut requests = Vec::new();

        let imported = self.pool.import(timeout, |port, socket| -> Result<()> {
            if let Some(channel) = instrumentation.as_mut().filter(|c| c.id() == port) {
                requests.extend(channel.receive(socket)?);
                return Ok(());
            }
            let target = ports.get_mut(port.index()).ok_or_else(|| {
                EngineError::initialization(format!("Socket bound to unknown {}", port))
            })?;
            target.receive(socket, now)?;
            Ok(())
        });

        // requests already read off the link are handled even when a data
        // socket failed in the same round
        let mut outcome = imported;
        for request in requests {
            if let Err(e) = self.handle_request(request) {
                error!("Instrumentation request failed: {}", e);
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }
        outcome
    }

    /// Send every queued port, then every periodic port whose period
    /// elapsed. All ports are attempted; the first error is returned.
    pub fn send_all(&mut self) -> Result<usize> {
        self.posix_time_us = posix_now_us();
        let times = Timestamps {
            sim_time_us: self.time_us,
            posix_time_us: self.posix_time_us,
        };
        let mut sent = 0;
        let mut first_error = None;

        for id in self.queue.take() {
            let Some(port) = self.ports.get_mut(id.index()) else {
                continue;
            };
            port.core_mut().set_queued(false);
            match send_port(&mut self.pool, port, times, false) {
                Ok(count) => sent += count,
                Err(e) => {
                    error!("Send on {} failed: {}", port.channel(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        for id in &self.periodic {
            let Some(port) = self.ports.get_mut(id.index()) else {
                continue;
            };
            match send_port(&mut self.pool, port, times, true) {
                Ok(count) => sent += count,
                Err(e) => {
                    error!("Send on {} failed: {}", port.channel(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(sent),
        }
    }

    /// Reset time and every message. Periodic ports become due at once,
    /// modified on-change outputs are queued.
    pub fn reset_all(&mut self) {
        self.time_us = 0;
        self.time_before_notify_us = 0;
        for port in &mut self.ports {
            if port.reset_messages() {
                self.queue.push(port);
            }
        }
        info!("Context {} reset", self.vc_name);
    }

    /// Invalidate every message that supports it
    pub fn invalidate_all(&mut self) {
        for port in &mut self.ports {
            for message in port.messages_mut() {
                if let Err(e) = message.invalidate() {
                    debug!("{}", e);
                }
            }
        }
    }

    /// Put every stopped or redirected channel back on its configured
    /// address
    pub fn restore_channels(&mut self) {
        self.pool.stop_all_instrumentations();
    }

    // ----------------------------------------------------------------------
    // Controller requests
    // ----------------------------------------------------------------------

    fn reply(&mut self, response: Response) -> Result<()> {
        let Some(channel) = &self.instrumentation else {
            debug!(command = ?response.command(), "no instrumentation channel, response dropped");
            return Ok(());
        };
        let socket = self
            .pool
            .socket_mut(channel.socket())
            .ok_or_else(|| EngineError::initialization("Instrumentation socket missing"))?;
        channel.reply(socket, response)
    }

    fn handle_request(&mut self, request: Request) -> Result<()> {
        match request {
            Request::State(state) => self.on_state(state),
            Request::Synchro { steps } => self.on_synchro(steps),
            Request::PowerSupply { command_id } => self.on_power_supply(command_id),
            Request::Config(config) => self.on_config(config),
            Request::Failure(failure) => {
                let applied = self.pool.apply_failure(&failure);
                self.reply(Response::Ack {
                    command: CommandId::RFailure,
                    status: if applied { ACK_OK } else { ACK_ERROR },
                })
            }
        }
    }

    fn on_state(&mut self, request: StateRequest) -> Result<()> {
        let ack_value = match request.run_state() {
            None => {
                error!("Unknown state command id {}", request.state_id);
                ACK_ERROR
            }
            Some(state) => {
                debug!("state: {}", state);
                self.run_state = state;
                if state != RunState::Step {
                    self.autonomous_realtime = true;
                    ACK_OK
                } else if self.step_by_step {
                    debug!("time controlled through F_SYNCHRO");
                    self.autonomous_realtime = false;
                    ACK_OK
                } else {
                    error!("F_STATE: step by step mode not supported");
                    ACK_STEP_UNSUPPORTED
                }
            }
        };

        if ack_value == ACK_OK {
            self.time_ratio = sanitize_time_ratio(request.time_ratio);
        }

        self.reply(Response::State {
            ack_id: request.state_id,
            ack_value,
            end_status: u32::from(request.run_state() == Some(RunState::Reset)),
        })
    }

    fn on_synchro(&mut self, steps: u32) -> Result<()> {
        if !self.step_by_step {
            error!("F_SYNCHRO received but step by step mode is disabled");
            return self.reply(Response::Ack {
                command: CommandId::RSynchro,
                status: ACK_ERROR,
            });
        }

        debug!("F_SYNCHRO: {} steps", steps);
        self.steps_requested = steps;
        self.time_before_notify_us = u64::from(steps) * self.period_us;
        if self.time_before_notify_us == 0 {
            return self.reply(Response::Ack {
                command: CommandId::RSynchro,
                status: ACK_OK,
            });
        }
        Ok(())
    }

    fn on_power_supply(&mut self, command_id: u32) -> Result<()> {
        let status = match command_id {
            0 => {
                self.powered = false;
                ACK_OK
            }
            1 => {
                self.powered = true;
                ACK_OK
            }
            other => {
                error!("Unknown power supply command {}", other);
                ACK_ERROR
            }
        };
        info!("Power supply {}", if self.powered { "on" } else { "off" });
        self.reply(Response::Ack {
            command: CommandId::RPowerSupply,
            status,
        })
    }

    fn on_config(&mut self, request: ConfigRequest) -> Result<()> {
        let ack_id = request.command_id;
        match request.action() {
            None => {
                error!("Unknown config command {}", ack_id);
                self.reply(Response::Config {
                    ack_id,
                    ack_value: ACK_ERROR,
                })
            }
            Some(ConfigAction::Load) => {
                info!("Configuration {} loaded", request.configuration);
                self.reply(Response::Config {
                    ack_id,
                    ack_value: ACK_OK,
                })
            }
            Some(ConfigAction::Apply) => {
                info!("Configuration {} applied", request.configuration);
                self.reply(Response::Config {
                    ack_id,
                    ack_value: ACK_OK,
                })?;
                self.reply(Response::Config {
                    ack_id,
                    ack_value: ACK_CONFIGURED,
                })
            }
        }
    }
}

/// Port and slot of `handle`, checking the message direction
fn locate<'a>(
    ports: &'a mut [Port],
    handle: MessageHandle,
    direction: Direction,
    operation: &str,
) -> Result<(&'a mut Port, u32)> {
    let port = ports
        .get_mut(handle.port.index())
        .ok_or_else(|| EngineError::not_found(handle.to_string()))?;
    let message = port
        .message(handle.slot)
        .ok_or_else(|| EngineError::not_found(handle.to_string()))?;
    if message.direction() != direction {
        return Err(EngineError::configuration(format!(
            "Cannot {} {} message {}",
            operation,
            message.direction(),
            message.name()
        )));
    }
    Ok((port, handle.slot))
}

fn send_port(
    pool: &mut SocketPool,
    port: &mut Port,
    times: Timestamps,
    periodic: bool,
) -> Result<usize> {
    let socket = pool.socket_mut(port.socket()).ok_or_else(|| {
        EngineError::initialization(format!("{} has no socket", port.describe()))
    })?;
    if periodic {
        port.send_periodic(socket, times)
    } else {
        port.send(socket, times)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let Some(channel) = self.instrumentation.as_mut() else {
            return;
        };
        let Some(socket) = self.pool.socket_mut(channel.socket()) else {
            return;
        };
        if let Err(e) = channel.unregister_all(socket) {
            warn!("Unregistration of {} failed: {}", self.vc_name, e);
        }
    }
}
