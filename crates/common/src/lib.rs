//! ReefShader Common Utilities
//!
//! Shared infrastructure for all ReefShader crates:
//! - Error types and result aliases
//! - Display pacing and position formatting for playback
//! - Tracing/logging initialization
//! - Application configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
