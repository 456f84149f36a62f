//! Client configuration
//!
//! This module defines configuration types and default values:
//! - `client_config`: Configuration structures
//! - `defaults`: Default configuration values

pub mod client_config;
pub mod defaults;

pub use client_config::{ClientConfig, ConfigError, ReconnectConfig};
