//! Configuration management for Glideway.
//!
//! Provides XDG-compliant settings discovery and the engine tunables.

mod settings;

pub use settings::{EngineSettings, Paths};
