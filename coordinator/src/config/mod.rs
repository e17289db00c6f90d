//! Configuration management for the coordinator: loading the TOML config file.
//!
//! This module provides a unified interface to the configuration data types and the loader.

mod loader;
mod types;

pub use loader::*;
pub use types::*;
