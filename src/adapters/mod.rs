//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter       | Implements       | Connects to            |
//! |---------------|------------------|------------------------|
//! | `json_config` | ConfigPort       | JSON text or file      |
//! | `log_sink`    | Encoder          | `log` facade           |
//! | `registry`    | DeviceRegistry   | In-memory pump table   |

pub mod json_config;
pub mod log_sink;
pub mod registry;
