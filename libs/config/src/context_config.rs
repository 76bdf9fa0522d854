//! Context Configuration Module
//!
//! Describes one virtual component: its identity, its time base, the
//! optional instrumentation link, and every port with the messages mapped
//! onto it. Loaded from TOML with `SKYBUS_*` environment overrides.

use anyhow::{bail, ensure, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use tracing::{debug, info, warn};
use types::{Direction, Mode, NadType, PortKind};

/// Prefix of environment variables overriding file values
pub const ENV_PREFIX: &str = "SKYBUS";

/// Largest payload of a CAN frame
const CAN_MAX_DATA: usize = 8;

/// Main context configuration structure
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ContextConfig {
    /// Virtual component name announced on the instrumentation link
    pub vc_name: String,

    /// Producer id stamped in every frame header
    #[serde(default)]
    pub prod_id: u16,

    /// Application period in microseconds
    #[serde(default = "default_period_us")]
    pub period_us: u64,

    #[serde(default = "default_true")]
    pub step_by_step: bool,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub instrumentation: Option<InstrumentationConfig>,

    #[serde(default)]
    pub ports: Vec<PortConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default filter directive, `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// TCP link to the simulation controller
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InstrumentationConfig {
    /// Controller endpoint, `ip:port`
    pub address: String,

    /// Handshakes performed at start-up
    #[serde(default = "default_register_kinds")]
    pub register: Vec<RegisterKind>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RegisterKind {
    Instrum,
    Mode,
    Power,
    Sync,
}

/// Which optional frame header fields a port fills in
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderConfig {
    #[serde(default)]
    pub seq_num: bool,
    #[serde(default)]
    pub qos_timestamp: bool,
    #[serde(default)]
    pub data_timestamp: bool,
}

/// One socket and the messages it carries
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PortConfig {
    /// Channel name used by data-exchange control requests
    pub channel: String,

    /// Target (output) or listening (input) endpoint, `ip:port`
    pub address: String,

    /// Local interface for multicast traffic
    #[serde(default)]
    pub interface: Option<String>,

    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Local port of output sockets, 0 for ephemeral
    #[serde(default)]
    pub outgoing_port: u16,

    pub direction: Direction,
    pub kind: PortKind,

    /// Payload bytes after the frame header. Derived from the messages
    /// when absent.
    #[serde(default)]
    pub fifo_size: Option<usize>,

    /// Send period of periodic output ports, 0 sends on every cycle
    #[serde(default)]
    pub period_us: u64,

    #[serde(default)]
    pub header: HeaderConfig,

    #[serde(default)]
    pub messages: Vec<MessageConfig>,
}

/// One message mapped onto a port. Only the fields relevant to the
/// port kind are looked at.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MessageConfig {
    pub name: String,

    /// Name the application uses, defaults to `name`
    #[serde(default)]
    pub local_name: Option<String>,

    /// Byte offset inside the port payload (signal ports)
    #[serde(default)]
    pub offset: usize,

    /// Payload size in bytes (NAD, AFDX, CAN)
    #[serde(default)]
    pub size: usize,

    /// Forced by the port kind except on A429 ports
    #[serde(default)]
    pub mode: Option<Mode>,

    /// Queue depth (queuing messages)
    #[serde(default = "default_depth")]
    pub depth: usize,

    /// Nominal message period, informational
    #[serde(default)]
    pub period_us: u64,

    #[serde(default)]
    pub validity_duration_us: u64,

    // Analogue
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub gain: f32,
    #[serde(default)]
    pub init_value: Option<f32>,

    // Discrete
    #[serde(default = "default_true_state")]
    pub true_state: u8,
    #[serde(default)]
    pub false_state: u8,
    #[serde(default)]
    pub init_state: Option<bool>,

    /// Initial payload of bus sampling messages
    #[serde(default)]
    pub init_bytes: Option<Vec<u8>>,

    // A429
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub sdi: Option<String>,

    // CAN
    #[serde(default)]
    pub can_id: Option<u32>,

    // NAD metadata
    #[serde(default)]
    pub nad_type: NadType,
    #[serde(default)]
    pub dims: Vec<u32>,
}

fn default_period_us() -> u64 {
    100_000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_register_kinds() -> Vec<RegisterKind> {
    vec![
        RegisterKind::Instrum,
        RegisterKind::Mode,
        RegisterKind::Power,
        RegisterKind::Sync,
    ]
}

fn default_ttl() -> u32 {
    1
}

fn default_depth() -> usize {
    1
}

fn default_scale() -> f32 {
    1.0
}

fn default_true_state() -> u8 {
    1
}

impl ContextConfig {
    /// Load configuration from a file with `SKYBUS_*` environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file, overriding top-level values with
    /// `<prefix>_<KEY>` environment variables (`__` separates nested keys)
    pub fn load_with_env_prefix(path: &Path, prefix: &str) -> Result<Self> {
        info!("Loading context configuration: {:?}", path);

        let settings = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to build configuration from {:?}", path))?;

        let mut config: ContextConfig = settings
            .try_deserialize()
            .context("Failed to deserialize context configuration")?;
        config.finish()?;
        Ok(config)
    }

    /// Parse configuration from TOML text, without environment overrides
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: ContextConfig =
            toml::from_str(text).context("Failed to parse context configuration")?;
        config.finish()?;
        Ok(config)
    }

    fn finish(&mut self) -> Result<()> {
        self.expand_env_vars()?;
        self.validate()?;
        debug!(
            vc_name = %self.vc_name,
            ports = self.ports.len(),
            "context configuration ready"
        );
        Ok(())
    }

    /// Expand `$VAR` / `${VAR}` in endpoint strings
    pub fn expand_env_vars(&mut self) -> Result<()> {
        if let Some(instrumentation) = &mut self.instrumentation {
            instrumentation.address = shellexpand::env(&instrumentation.address)
                .context("Failed to expand instrumentation address")?
                .into_owned();
        }

        for port in &mut self.ports {
            port.address = shellexpand::env(&port.address)
                .with_context(|| format!("Failed to expand address of channel {}", port.channel))?
                .into_owned();

            if let Some(interface) = &port.interface {
                let expanded = shellexpand::env(interface).with_context(|| {
                    format!("Failed to expand interface of channel {}", port.channel)
                })?;
                port.interface = Some(expanded.into_owned());
            }
        }

        Ok(())
    }

    /// Check everything that can be checked without opening a socket
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.vc_name.is_empty(), "vc_name must not be empty");
        ensure!(self.period_us > 0, "period_us must be greater than zero");

        if let Some(instrumentation) = &self.instrumentation {
            parse_endpoint(&instrumentation.address)
                .context("Invalid instrumentation address")?;
        }

        let mut channels = HashSet::new();
        for port in &self.ports {
            port.validate()
                .with_context(|| format!("Invalid port '{}'", port.channel))?;
            if !channels.insert((port.channel.as_str(), port.direction)) {
                warn!(
                    "Channel {} declared twice as {}, data-exchange control only reaches the first",
                    port.channel, port.direction
                );
            }
        }

        Ok(())
    }

    pub fn port(&self, channel: &str) -> Option<&PortConfig> {
        self.ports.iter().find(|port| port.channel == channel)
    }
}

impl PortConfig {
    pub fn endpoint(&self) -> Result<SocketAddrV4> {
        parse_endpoint(&self.address)
    }

    pub fn interface_addr(&self) -> Result<Option<Ipv4Addr>> {
        self.interface
            .as_deref()
            .map(|text| {
                text.trim()
                    .parse::<Ipv4Addr>()
                    .with_context(|| format!("Invalid interface address '{}'", text))
            })
            .transpose()
    }

    /// Effective mode of a message on this port
    pub fn mode_of(&self, message: &MessageConfig) -> Mode {
        self.kind
            .fixed_mode()
            .or(message.mode)
            .unwrap_or(Mode::Sampling)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.channel.is_empty(), "channel name must not be empty");
        self.endpoint()?;
        self.interface_addr()?;
        if self.direction == Direction::Input && self.outgoing_port != 0 {
            bail!("input ports cannot set an outgoing port");
        }

        match self.kind {
            PortKind::AfdxSampling | PortKind::AfdxQueuing => ensure!(
                self.messages.len() == 1,
                "{} ports carry exactly one message, found {}",
                self.kind,
                self.messages.len()
            ),
            _ => ensure!(!self.messages.is_empty(), "port has no message"),
        }

        let mut required = 0usize;
        for message in &self.messages {
            self.validate_message(message)
                .with_context(|| format!("Invalid message '{}'", message.name))?;
            required = required.max(message.offset + self.wire_size_of(message));
        }

        if let Some(fifo_size) = self.fifo_size {
            if matches!(self.kind, PortKind::Analogue | PortKind::Discrete | PortKind::Nad) {
                ensure!(
                    fifo_size >= required,
                    "fifo_size {} is smaller than the {} bytes the messages need",
                    fifo_size,
                    required
                );
            }
        }

        Ok(())
    }

    /// Bytes a message occupies in the payload of a signal port
    pub fn wire_size_of(&self, message: &MessageConfig) -> usize {
        match self.kind {
            PortKind::Analogue => 4,
            PortKind::Discrete => 1,
            _ => message.size,
        }
    }

    fn validate_message(&self, message: &MessageConfig) -> Result<()> {
        ensure!(!message.name.is_empty(), "message name must not be empty");
        if let (Some(fixed), Some(requested)) = (self.kind.fixed_mode(), message.mode) {
            ensure!(
                fixed == requested,
                "{} ports only carry {} messages",
                self.kind,
                fixed
            );
        }

        let mode = self.mode_of(message);
        if mode == Mode::Queuing {
            ensure!(message.depth > 0, "queuing depth must be greater than zero");
        }

        match self.kind {
            PortKind::Analogue => {
                ensure!(
                    message.scale.is_finite() && message.scale != 0.0,
                    "scale must be finite and non-zero"
                );
                ensure!(message.gain.is_finite(), "gain must be finite");
            }
            PortKind::Discrete => ensure!(
                message.true_state != message.false_state,
                "true_state and false_state must differ"
            ),
            PortKind::Nad => {
                ensure!(message.size > 0, "NAD size must be greater than zero");
                ensure!(
                    message.init_bytes.is_none(),
                    "NAD messages do not support initial values"
                );
                ensure!(
                    message.validity_duration_us == 0,
                    "NAD messages do not support a validity duration"
                );
            }
            PortKind::AfdxSampling | PortKind::AfdxQueuing => {
                ensure!(message.size > 0, "AFDX size must be greater than zero");
            }
            PortKind::A429 => {
                let label = message
                    .label
                    .as_deref()
                    .context("A429 messages need a label")?;
                let number = u16::from_str_radix(label.trim(), 8)
                    .with_context(|| format!("label '{}' is not octal", label))?;
                ensure!(number <= 0o377, "label '{}' is greater than 377", label);
            }
            PortKind::Can => {
                ensure!(message.can_id.is_some(), "CAN messages need a can_id");
                ensure!(
                    (1..=CAN_MAX_DATA).contains(&message.size),
                    "CAN size must be between 1 and {}",
                    CAN_MAX_DATA
                );
            }
        }

        if let Some(init) = &message.init_bytes {
            if mode == Mode::Sampling && self.kind != PortKind::A429 {
                ensure!(
                    init.len() == message.size,
                    "init_bytes holds {} bytes, message size is {}",
                    init.len(),
                    message.size
                );
            }
        }

        Ok(())
    }
}

impl MessageConfig {
    pub fn local_name(&self) -> &str {
        self.local_name.as_deref().unwrap_or(&self.name)
    }
}

fn parse_endpoint(text: &str) -> Result<SocketAddrV4> {
    text.trim()
        .parse::<SocketAddrV4>()
        .with_context(|| format!("Address '{}' is not of the form ip:port", text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const EFIS: &str = r#"
vc_name = "EFIS_CAPT"
prod_id = 7
period_us = 50000

[logging]
level = "debug"
format = "json"

[instrumentation]
address = "127.0.0.1:5000"
register = ["instrum", "sync"]

[[ports]]
channel = "ADC_1"
address = "239.0.0.1:4000"
interface = "127.0.0.1"
direction = "output"
kind = "analogue"
period_us = 100000

[ports.header]
seq_num = true
data_timestamp = true

[[ports.messages]]
name = "ALTITUDE"
local_name = "alt"
offset = 0
scale = 2.0
gain = 1.0

[[ports.messages]]
name = "SPEED"
offset = 4

[[ports]]
channel = "FMS_ROUTE"
address = "239.0.0.2:4001"
direction = "input"
kind = "afdx_queuing"

[[ports.messages]]
name = "ROUTE"
size = 32
depth = 8
"#;

    #[test]
    fn test_parse_full_context() {
        let config = ContextConfig::from_toml_str(EFIS).unwrap();

        assert_eq!(config.vc_name, "EFIS_CAPT");
        assert_eq!(config.prod_id, 7);
        assert!(config.step_by_step);
        assert_eq!(config.logging.format, LogFormat::Json);
        let instrumentation = config.instrumentation.as_ref().unwrap();
        assert_eq!(
            instrumentation.register,
            vec![RegisterKind::Instrum, RegisterKind::Sync]
        );

        let adc = config.port("ADC_1").unwrap();
        assert!(adc.header.seq_num && adc.header.data_timestamp && !adc.header.qos_timestamp);
        assert_eq!(adc.interface_addr().unwrap(), Some(Ipv4Addr::LOCALHOST));
        assert_eq!(adc.messages[0].local_name(), "alt");
        assert_eq!(adc.messages[1].local_name(), "SPEED");
        assert_eq!(adc.messages[1].scale, 1.0);

        let route = config.port("FMS_ROUTE").unwrap();
        assert_eq!(route.mode_of(&route.messages[0]), Mode::Queuing);
        assert_eq!(route.messages[0].depth, 8);
    }

    #[test]
    fn test_defaults() {
        let config = ContextConfig::from_toml_str(
            r#"
vc_name = "MINIMAL"
"#,
        )
        .unwrap();

        assert_eq!(config.period_us, 100_000);
        assert_eq!(config.prod_id, 0);
        assert_eq!(config.logging.level, "info");
        assert!(config.instrumentation.is_none());
        assert!(config.ports.is_empty());
    }

    fn port_with(kind: &str, message: &str) -> String {
        format!(
            r#"
vc_name = "VC"

[[ports]]
channel = "CH"
address = "239.0.0.1:4000"
direction = "output"
kind = "{}"

[[ports.messages]]
{}
"#,
            kind, message
        )
    }

    #[test]
    fn test_rejects_bad_messages() {
        let cases = [
            ("analogue", "name = \"A\"\nscale = 0.0"),
            ("discrete", "name = \"D\"\ntrue_state = 3\nfalse_state = 3"),
            ("nad", "name = \"N\""),
            ("nad", "name = \"N\"\nsize = 4\nvalidity_duration_us = 10"),
            ("can", "name = \"C\"\nsize = 9\ncan_id = 256"),
            ("can", "name = \"C\"\nsize = 2"),
            ("a429", "name = \"L\"\nlabel = \"389\""),
            ("a429", "name = \"L\"\nlabel = \"400\""),
            ("afdx_sampling", "name = \"S\"\nsize = 4\ninit_bytes = [1, 2]"),
            ("afdx_queuing", "name = \"Q\"\nsize = 4\nmode = \"sampling\""),
        ];

        for (kind, message) in cases {
            let result = ContextConfig::from_toml_str(&port_with(kind, message));
            assert!(result.is_err(), "{} / {} should be rejected", kind, message);
        }
    }

    #[test]
    fn test_error_chain_names_the_port() {
        let err = ContextConfig::from_toml_str(&port_with("analogue", "name = \"A\"\nscale = 0.0"))
            .unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.contains("Invalid port 'CH'"), "{}", chain);
        assert!(chain.contains("Invalid message 'A'"), "{}", chain);
    }

    #[test]
    fn test_rejects_outgoing_port_on_input() {
        let text = r#"
vc_name = "VC"

[[ports]]
channel = "IN"
address = "239.0.0.1:4000"
outgoing_port = 5000
direction = "input"
kind = "nad"

[[ports.messages]]
name = "BLOCK"
size = 8
"#;
        assert!(ContextConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn test_fifo_size_must_cover_messages() {
        let text = r#"
vc_name = "VC"

[[ports]]
channel = "ADC"
address = "239.0.0.1:4000"
direction = "output"
kind = "analogue"
fifo_size = 6

[[ports.messages]]
name = "A"
offset = 4
"#;
        let err = ContextConfig::from_toml_str(text).unwrap_err();
        assert!(format!("{:#}", err).contains("fifo_size 6"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("efis.toml");
        fs::write(&path, EFIS).unwrap();

        let config = ContextConfig::load_with_env_prefix(&path, "SKYBUS_TEST_LOAD").unwrap();
        assert_eq!(config.vc_name, "EFIS_CAPT");
        assert_eq!(config.ports.len(), 2);
        assert_eq!(config.ports[1].direction, Direction::Input);
        assert_eq!(config.ports[1].kind, PortKind::AfdxQueuing);
    }

    #[test]
    fn test_environment_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("efis.toml");
        fs::write(&path, EFIS).unwrap();

        std::env::set_var("SKYBUS_TEST_ENV_PROD_ID", "42");
        std::env::set_var("SKYBUS_TEST_ENV_LOGGING__LEVEL", "trace");
        let config = ContextConfig::load_with_env_prefix(&path, "SKYBUS_TEST_ENV").unwrap();

        assert_eq!(config.prod_id, 42);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_missing_file_fails_with_context() {
        let dir = tempdir().unwrap();
        let err = ContextConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to build configuration"));
    }

    #[test]
    fn test_expands_environment_in_addresses() {
        std::env::set_var("SKYBUS_TEST_GROUP", "239.9.9.9");
        let text = r#"
vc_name = "VC"

[[ports]]
channel = "CH"
address = "${SKYBUS_TEST_GROUP}:4000"
direction = "input"
kind = "nad"

[[ports.messages]]
name = "BLOCK"
size = 8
"#;
        let config = ContextConfig::from_toml_str(text).unwrap();
        assert_eq!(config.ports[0].address, "239.9.9.9:4000");
    }
}
