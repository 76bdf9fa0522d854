//! Context construction from a [`ContextConfig`]
//!
//! Opens one socket per configured port, maps every message under its
//! local name, then connects and registers the instrumentation link when
//! one is configured. Socket creation goes through replaceable openers so
//! a context can be built without touching the network.

use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::port::{MessageShape, MessageSpec, PortSpec};
use codec::a429::Sdi;
use codec::{HeaderFlags, RegistrationKind};
use network::{DatagramSocket, Socket, SocketAddress, SocketOpener, SocketPool, TcpMessageSocket};
use skybus_config::{ContextConfig, HeaderConfig, MessageConfig, PortConfig, RegisterKind};
use tracing::{debug, info};
use types::{Direction, PortKind};

fn connect_instrumentation(address: &SocketAddress) -> network::Result<Box<dyn Socket>> {
    Ok(Box::new(TcpMessageSocket::connect(address)?))
}

fn config_error(error: anyhow::Error) -> EngineError {
    EngineError::configuration(format!("{:#}", error))
}

pub struct ContextBuilder<'a> {
    config: &'a ContextConfig,
    opener: SocketOpener,
    connector: SocketOpener,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(config: &'a ContextConfig) -> Self {
        Self {
            config,
            opener: DatagramSocket::open_boxed,
            connector: connect_instrumentation,
        }
    }

    /// Replace the data socket factory, also used when channels restart
    pub fn with_opener(mut self, opener: SocketOpener) -> Self {
        self.opener = opener;
        self
    }

    /// Replace the instrumentation link factory
    pub fn with_connector(mut self, connector: SocketOpener) -> Self {
        self.connector = connector;
        self
    }

    pub fn build(self) -> Result<Context> {
        let config = self.config;
        let mut context = Context::with_pool(
            config.vc_name.clone(),
            config.prod_id,
            config.period_us,
            SocketPool::with_opener(self.opener),
        );
        context.set_step_by_step(config.step_by_step);

        for port in &config.ports {
            self.add_port(&mut context, port)?;
        }

        if let Some(instrumentation) = &config.instrumentation {
            let address = SocketAddress::parse(Direction::Input, &instrumentation.address)?;
            context.attach_instrumentation((self.connector)(&address)?)?;
            let kinds: Vec<RegistrationKind> = instrumentation
                .register
                .iter()
                .map(|kind| registration_kind(*kind))
                .collect();
            context.register_instrumentation(&kinds)?;
        }

        info!(
            vc_name = %config.vc_name,
            ports = context.ports().len(),
            "context built"
        );
        Ok(context)
    }

    fn add_port(&self, context: &mut Context, port: &PortConfig) -> Result<()> {
        let socket = (self.opener)(&port_address(port)?)?;
        let id = context.add_port(&port_spec(port), socket)?;
        for message in &port.messages {
            context.register(id, message.local_name(), message_spec(port, message))?;
        }
        debug!(channel = %port.channel, messages = port.messages.len(), "port configured");
        Ok(())
    }
}

pub fn port_address(port: &PortConfig) -> Result<SocketAddress> {
    let endpoint = port.endpoint().map_err(config_error)?;
    let interface = port.interface_addr().map_err(config_error)?;
    let address = SocketAddress::new(port.direction, *endpoint.ip(), endpoint.port())
        .with_interface(interface)
        .with_ttl(port.ttl)
        .with_outgoing_port(port.outgoing_port)?;
    Ok(address)
}

pub fn port_spec(port: &PortConfig) -> PortSpec {
    let required = port
        .messages
        .iter()
        .map(|message| message.offset + port.wire_size_of(message))
        .max()
        .unwrap_or(0);
    PortSpec::new(port.channel.clone(), port.kind, port.direction)
        .with_payload_size(port.fifo_size.unwrap_or(required))
        .with_period_us(port.period_us)
        .with_header(header_flags(port.header))
}

fn header_flags(header: HeaderConfig) -> HeaderFlags {
    HeaderFlags {
        seq_num: header.seq_num,
        qos_timestamp: header.qos_timestamp,
        data_timestamp: header.data_timestamp,
    }
}

pub fn message_spec(port: &PortConfig, message: &MessageConfig) -> MessageSpec {
    let shape = match port.kind {
        PortKind::Analogue => MessageShape::Analogue {
            offset: message.offset,
            scale: message.scale,
            gain: message.gain,
            init: message.init_value,
        },
        PortKind::Discrete => MessageShape::Discrete {
            offset: message.offset,
            true_state: message.true_state,
            false_state: message.false_state,
            init: message.init_state,
        },
        PortKind::Nad => MessageShape::Nad {
            offset: message.offset,
            size: message.size,
            nad_type: message.nad_type,
            dims: message.dims.clone(),
        },
        PortKind::AfdxSampling => MessageShape::AfdxSampling {
            size: message.size,
            init: message.init_bytes.clone(),
        },
        PortKind::AfdxQueuing => MessageShape::AfdxQueuing {
            size: message.size,
            depth: message.depth,
        },
        PortKind::A429 => MessageShape::A429 {
            label: message.label.clone().unwrap_or_default(),
            sdi: message.sdi.as_deref().map_or(Sdi::DontCare, Sdi::parse),
            mode: port.mode_of(message),
            depth: message.depth,
            init: message.init_bytes.clone(),
        },
        PortKind::Can => MessageShape::Can {
            can_id: message.can_id.unwrap_or_default(),
            size: message.size,
            init: message.init_bytes.clone(),
        },
    };
    MessageSpec::new(message.name.clone(), shape)
        .with_period_us(message.period_us)
        .with_validity_duration_us(message.validity_duration_us)
}

pub fn registration_kind(kind: RegisterKind) -> RegistrationKind {
    match kind {
        RegisterKind::Instrum => RegistrationKind::Instrum,
        RegisterKind::Mode => RegistrationKind::Mode,
        RegisterKind::Power => RegistrationKind::Power,
        RegisterKind::Sync => RegistrationKind::Sync,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use network::VoidSocket;
    use types::{Mode, Protocol};

    fn void_opener(address: &SocketAddress) -> network::Result<Box<dyn Socket>> {
        Ok(Box::new(VoidSocket::replacing(address.clone())))
    }

    const AVIONICS: &str = r#"
vc_name = "FCS_1"
prod_id = 3
period_us = 20000
step_by_step = false

[[ports]]
channel = "ADC_1"
address = "239.1.0.1:4000"
direction = "output"
kind = "analogue"

[ports.header]
seq_num = true

[[ports.messages]]
name = "ALTITUDE"
local_name = "alt"
offset = 0

[[ports.messages]]
name = "SPEED"
offset = 8

[[ports]]
channel = "IRS_BUS"
address = "239.1.0.2:4001"
direction = "input"
kind = "a429"

[[ports.messages]]
name = "HEADING"
label = "314"
sdi = "01"

[[ports.messages]]
name = "FAULTS"
label = "350"
mode = "queuing"
depth = 4
"#;

    #[test]
    fn test_builds_ports_and_names() {
        let config = ContextConfig::from_toml_str(AVIONICS).unwrap();
        let context = ContextBuilder::new(&config)
            .with_opener(void_opener)
            .build()
            .unwrap();

        assert_eq!(context.vc_name(), "FCS_1");
        assert!(!context.is_step_by_step_enabled());
        assert_eq!(context.ports().len(), 2);
        assert_eq!(context.pool().len(), 2);
        assert!(context.instrumentation().is_none());

        let adc = &context.ports()[0];
        assert_eq!(adc.core().payload_size(), 12);
        assert!(adc.core().header().flags().seq_num);

        let alt = context.handle("alt").unwrap();
        assert_eq!(context.message(alt).unwrap().name(), "ALTITUDE");
        assert!(context.handle("ALTITUDE").is_err());
        assert!(context.handle("SPEED").is_ok());

        let faults = context.handle("FAULTS").unwrap();
        let info = context.message(faults).unwrap().info();
        assert_eq!(info.protocol, Protocol::A429);
        assert_eq!(info.mode, Mode::Queuing);
    }

    #[test]
    fn test_message_shapes() {
        let config = ContextConfig::from_toml_str(AVIONICS).unwrap();
        let irs = &config.ports[1];
        let heading = message_spec(irs, &irs.messages[0]);
        assert_eq!(
            heading.shape,
            MessageShape::A429 {
                label: "314".to_string(),
                sdi: Sdi::S01,
                mode: Mode::Sampling,
                depth: 1,
                init: None,
            }
        );
        let faults = message_spec(irs, &irs.messages[1]);
        assert!(matches!(
            faults.shape,
            MessageShape::A429 {
                sdi: Sdi::DontCare,
                mode: Mode::Queuing,
                depth: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_address_is_rejected() {
        let mut config = ContextConfig::from_toml_str(AVIONICS).unwrap();
        let mut twin = config.ports[0].clone();
        twin.channel = "ADC_2".to_string();
        config.ports.push(twin);

        let err = ContextBuilder::new(&config)
            .with_opener(void_opener)
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)), "{}", err);
    }

    #[test]
    fn test_registration_kinds_map_one_to_one() {
        assert_eq!(registration_kind(RegisterKind::Sync), RegistrationKind::Sync);
        assert_eq!(registration_kind(RegisterKind::Power), RegistrationKind::Power);
    }
}
