//! # Storage Layer Configuration
//!
//! Compile-time constants live in [`constants`]; runtime knobs that a host
//! may tune per engine live in [`EngineConfig`].
//!
//! ## Module Organization
//!
//! - [`constants`]: numeric configuration values with dependency documentation
//! - [`engine`]: `EngineConfig` and its builder

pub mod constants;
pub mod engine;

pub use constants::*;
pub use engine::{EngineConfig, EngineConfigBuilder};
