//! # BBS-FW Core Library
//!
//! Link layer of the BBS-FW motor controller configuration tool.

#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Serial protocol communication with BBS-FW controllers
//! - Versioned configuration record codec and validation
//! - Event log decoding
//! - JSON configuration files
//!
//! ## Supported controllers
//!
//! - Bafang BBSHD
//! - Bafang BBS01/BBS02
//! - Tongsheng TSDZ2
//!
//! ## Example
//!
//! ```rust,no_run
//! use bbsfw_core::protocol::{Connection, ConnectionConfig};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), bbsfw_core::protocol::ProtocolError> {
//! let connection = Connection::new(ConnectionConfig::default());
//! if connection.connect("/dev/ttyUSB0", Duration::from_secs(10)).await? {
//!     let result = connection.read_configuration(Duration::from_secs(5)).await?;
//!     if let Some(config) = result.completed() {
//!         println!("Max current: {} A", config.max_current_amps);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod eventlog;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{AssistFlags, AssistLevel, Configuration, ValidationError};
    pub use crate::device::{ControllerType, DeviceInfo};
    pub use crate::eventlog::{EventLogEntry, LogLevel};
    pub use crate::protocol::{
        Connection, ConnectionConfig, ConnectionEvent, ConnectionObserver, ConnectionState,
        ProtocolError, RequestResult,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
