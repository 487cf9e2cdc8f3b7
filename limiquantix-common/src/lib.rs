//! # limiquantix Common
//!
//! Shared utilities for the limiquantix node tools.
//!
//! ## Logging
//!
//! ```rust,ignore
//! use limiquantix_common::{init_logging, LogFormat};
//!
//! init_logging("info", LogFormat::Text)?;
//! tracing::info!(port_id = "abcd1234", "VIF plugged");
//! ```

pub mod logging;

pub use logging::{init_logging, parse_filter, LogFormat};
