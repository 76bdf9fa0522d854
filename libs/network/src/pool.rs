//! Socket pool
//!
//! Owns every socket of a context. Ports refer to their socket by
//! [`SocketId`]; the pool records which port each socket feeds so that
//! [`SocketPool::import`] can hand ready input sockets back to the right
//! port. The pool also implements the data-exchange controls driven by the
//! instrumentation channel: silencing, restarting and redirecting channels
//! by name.

use crate::address::{parse_endpoint, SocketAddress};
use crate::socket::{Socket, VoidSocket};
use crate::transports::DatagramSocket;
use crate::{Result, TransportError};
use codec::{DataExchangeAction, FailureRequest};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use types::{Direction, PortId, SocketId};

/// Creates the socket for an address when a channel is (re)started
pub type SocketOpener = fn(&SocketAddress) -> Result<Box<dyn Socket>>;

struct PoolEntry {
    socket: Box<dyn Socket>,
    /// Address from the configuration, kept across stop/redirect
    configured: SocketAddress,
    /// `None` for sockets outside data-exchange control
    channel: Option<String>,
    port: PortId,
}

pub struct SocketPool {
    entries: Vec<PoolEntry>,
    by_address: HashMap<SocketAddress, SocketId>,
    by_channel: HashMap<String, SocketId>,
    opener: SocketOpener,
}

impl Default for SocketPool {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketPool {
    pub fn new() -> Self {
        Self::with_opener(DatagramSocket::open_boxed)
    }

    pub fn with_opener(opener: SocketOpener) -> Self {
        Self {
            entries: Vec::new(),
            by_address: HashMap::new(),
            by_channel: HashMap::new(),
            opener,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, address: &SocketAddress) -> bool {
        self.by_address.contains_key(address)
    }

    pub fn find(&self, address: &SocketAddress) -> Option<SocketId> {
        self.by_address.get(address).copied()
    }

    /// Register a data channel socket feeding (or fed by) `port`
    pub fn add(
        &mut self,
        socket: Box<dyn Socket>,
        channel: impl Into<String>,
        port: PortId,
    ) -> Result<SocketId> {
        self.insert(socket, Some(channel.into()), port)
    }

    /// Register a socket that is polled by `import` but never touched by the
    /// data-exchange controls (the instrumentation link)
    pub fn add_control(&mut self, socket: Box<dyn Socket>, port: PortId) -> Result<SocketId> {
        self.insert(socket, None, port)
    }

    fn insert(
        &mut self,
        socket: Box<dyn Socket>,
        channel: Option<String>,
        port: PortId,
    ) -> Result<SocketId> {
        let address = socket.address().cloned().ok_or_else(|| {
            TransportError::configuration(
                format!("{} is not bound to an address", socket.describe()),
                Some("address"),
            )
        })?;
        if self.by_address.contains_key(&address) {
            return Err(TransportError::configuration(
                format!("{} already exists in the socket pool", address),
                Some("address"),
            ));
        }

        let id = SocketId::next_for(self.entries.len());
        self.by_address.insert(address.clone(), id);
        if let Some(name) = &channel {
            // first registration of a channel name wins
            self.by_channel.entry(name.clone()).or_insert(id);
        }
        debug!(socket = %id, %port, "registered {}", address);
        self.entries.push(PoolEntry {
            socket,
            configured: address,
            channel,
            port,
        });
        Ok(id)
    }

    pub fn socket(&self, id: SocketId) -> Option<&dyn Socket> {
        self.entries.get(id.index()).map(|entry| entry.socket.as_ref())
    }

    pub fn socket_mut(&mut self, id: SocketId) -> Option<&mut (dyn Socket + 'static)> {
        self.entries
            .get_mut(id.index())
            .map(|entry| entry.socket.as_mut())
    }

    pub fn port_of(&self, id: SocketId) -> Option<PortId> {
        self.entries.get(id.index()).map(|entry| entry.port)
    }

    pub fn channel_of(&self, id: SocketId) -> Option<&str> {
        self.entries
            .get(id.index())
            .and_then(|entry| entry.channel.as_deref())
    }

    pub fn configured_address(&self, id: SocketId) -> Option<&SocketAddress> {
        self.entries.get(id.index()).map(|entry| &entry.configured)
    }

    pub fn has_inputs(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.configured.direction() == Direction::Input)
    }

    /// Read available input. Waits up to `timeout` for a first socket to be
    /// ready, then keeps draining ready sockets without waiting until none is
    /// left or `timeout` has elapsed. `on_ready` is called once per ready
    /// socket and round; the return value is the number of calls.
    pub fn import<E, F>(&mut self, timeout: Duration, mut on_ready: F) -> std::result::Result<usize, E>
    where
        E: From<TransportError>,
        F: FnMut(PortId, &mut dyn Socket) -> std::result::Result<(), E>,
    {
        if !self.has_inputs() {
            return Ok(0);
        }

        let started = Instant::now();
        let mut handled = 0;
        let mut ready = self.poll_ready(poll_timeout(timeout))?;

        while !ready.is_empty() {
            for index in ready {
                let entry = &mut self.entries[index];
                on_ready(entry.port, entry.socket.as_mut())?;
                handled += 1;
            }
            if started.elapsed() >= timeout {
                break;
            }
            ready = self.poll_ready(PollTimeout::ZERO)?;
        }

        Ok(handled)
    }

    /// Indices of input entries whose descriptor is readable
    fn poll_ready(&self, timeout: PollTimeout) -> Result<Vec<usize>> {
        let mut indices = Vec::new();
        let mut fds = Vec::new();
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.configured.direction() != Direction::Input {
                continue;
            }
            if let Some(fd) = entry.socket.poll_fd() {
                indices.push(index);
                fds.push(PollFd::new(fd, PollFlags::POLLIN));
            }
        }
        if fds.is_empty() {
            return Ok(Vec::new());
        }

        match poll(&mut fds, timeout) {
            Ok(0) | Err(Errno::EINTR) => return Ok(Vec::new()),
            Ok(_) => {}
            Err(e) => return Err(TransportError::network_with_source("poll failed", e)),
        }

        let readable = PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP;
        Ok(fds
            .iter()
            .zip(indices)
            .filter(|(fd, _)| fd.revents().is_some_and(|events| events.intersects(readable)))
            .map(|(_, index)| index)
            .collect())
    }

    // ----------------------------------------------------------------------
    // Data-exchange control
    // ----------------------------------------------------------------------

    /// Apply an `F_FAILURE` request. Returns false when it could not be done.
    pub fn apply_failure(&mut self, request: &FailureRequest) -> bool {
        match &request.action {
            DataExchangeAction::Stop => self.data_exchange_stop(&request.channel),
            DataExchangeAction::StopFull => self.data_exchange_stop_full(&request.channel),
            DataExchangeAction::Start => self.data_exchange_start(&request.channel),
            DataExchangeAction::Redirect { address } => {
                self.data_exchange_redirect_start(&request.channel, request.direction, address)
            }
            DataExchangeAction::StopRedirect => self.data_exchange_redirect_stop(&request.channel),
        }
    }

    /// Stop listening/emitting on one channel
    pub fn data_exchange_stop(&mut self, channel: &str) -> bool {
        let Some(id) = self.channel_id(channel) else {
            return false;
        };
        info!("Stop channel {}", channel);
        self.replace(id.index(), None)
    }

    /// Stop every channel sharing this channel's IP and direction
    pub fn data_exchange_stop_full(&mut self, channel: &str) -> bool {
        self.start_or_stop_full(channel, false)
    }

    /// (Re)start every channel sharing this channel's IP and direction
    pub fn data_exchange_start(&mut self, channel: &str) -> bool {
        self.start_or_stop_full(channel, true)
    }

    /// Re-open a channel on `endpoint` (`"ip:port"`), keeping its direction
    /// and socket tuning
    pub fn data_exchange_redirect_start(
        &mut self,
        channel: &str,
        direction: Direction,
        endpoint: &str,
    ) -> bool {
        let Some(id) = self.channel_id(channel) else {
            return false;
        };
        let configured = &self.entries[id.index()].configured;
        if configured.direction() != direction {
            error!(
                "Cannot redirect {} to another direction ({})",
                configured, direction
            );
            return false;
        }
        let (ip, port) = match parse_endpoint(endpoint) {
            Ok(target) => target,
            Err(e) => {
                error!("Redirect of channel {} failed: {}", channel, e);
                return false;
            }
        };

        let target = configured.retarget(ip, port);
        info!("Redirect channel {} to {}", channel, target);
        self.replace(id.index(), Some(&target))
    }

    /// Return a redirected channel to its configured address
    pub fn data_exchange_redirect_stop(&mut self, channel: &str) -> bool {
        let Some(id) = self.channel_id(channel) else {
            return false;
        };
        info!("Stop redirect channel {}", channel);
        let configured = self.entries[id.index()].configured.clone();
        self.replace(id.index(), Some(&configured))
    }

    /// Put every data channel back on its configured address
    pub fn stop_all_instrumentations(&mut self) {
        for index in 0..self.entries.len() {
            if self.entries[index].channel.is_none() {
                continue;
            }
            let configured = self.entries[index].configured.clone();
            self.replace(index, Some(&configured));
        }
    }

    fn channel_id(&self, channel: &str) -> Option<SocketId> {
        let id = self.by_channel.get(channel).copied();
        if id.is_none() {
            error!("Unknown channel name: {}", channel);
        }
        id
    }

    fn start_or_stop_full(&mut self, channel: &str, start: bool) -> bool {
        let Some(id) = self.channel_id(channel) else {
            return false;
        };
        let key = &self.entries[id.index()].configured;
        let (direction, ip): (Direction, Ipv4Addr) = (key.direction(), key.ip());
        info!(
            "{} every {} channel on {}",
            if start { "Restart" } else { "Stop" },
            direction,
            ip
        );

        let siblings: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| {
                entry.channel.is_some()
                    && entry.configured.direction() == direction
                    && entry.configured.ip() == ip
            })
            .map(|(index, _)| index)
            .collect();

        let mut all_applied = true;
        for index in siblings {
            let target = start.then(|| self.entries[index].configured.clone());
            all_applied &= self.replace(index, target.as_ref());
        }
        all_applied
    }

    /// Swap the socket of entry `index`: a fresh one on `target`, or a void
    /// one. The old socket is closed first so its address can be rebound.
    fn replace(&mut self, index: usize, target: Option<&SocketAddress>) -> bool {
        let entry = &mut self.entries[index];
        entry.socket = Box::new(VoidSocket::replacing(entry.configured.clone()));

        if let Some(address) = target {
            match (self.opener)(address) {
                Ok(socket) => entry.socket = socket,
                Err(e) => {
                    error!("Cannot open {}: {}", address, e);
                    return false;
                }
            }
        }
        debug!(slot = index, "now using {}", entry.socket.describe());
        true
    }
}

/// Millisecond poll timeout, rounded up and clamped
fn poll_timeout(timeout: Duration) -> PollTimeout {
    let millis = timeout.as_micros().div_ceil(1000);
    PollTimeout::from(u16::try_from(millis).unwrap_or(u16::MAX))
}
