//! # Observability Infrastructure
//!
//! Structured logging for the server. Metrics and trace export are not carried.

pub mod logging;

pub use logging::{init_logging, log_config_info};
