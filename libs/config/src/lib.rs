//! # skybus Context Configuration
//!
//! Serde model of a virtual component context and its loader. A context
//! file names the component, its application period and producer id, the
//! optional instrumentation link, and every port with its messages.
//!
//! ## Usage
//!
//! ```rust
//! use skybus_config::ContextConfig;
//!
//! let config = ContextConfig::from_toml_str(r#"
//! vc_name = "EFIS_CAPT"
//! period_us = 100000
//!
//! [[ports]]
//! channel = "ADC_1"
//! address = "239.0.0.1:4000"
//! direction = "output"
//! kind = "analogue"
//!
//! [[ports.messages]]
//! name = "ALTITUDE"
//! scale = 2.0
//! gain = 1.0
//! "#).unwrap();
//!
//! assert_eq!(config.ports[0].messages[0].local_name(), "ALTITUDE");
//! ```
//!
//! Files loaded with [`ContextConfig::load`] may be overridden from the
//! environment: `SKYBUS_PROD_ID=12`, `SKYBUS_LOGGING__LEVEL=debug`.

pub mod context_config;

pub use context_config::{
    ContextConfig, HeaderConfig, InstrumentationConfig, LogFormat, LoggingConfig, MessageConfig,
    PortConfig, RegisterKind, ENV_PREFIX,
};
