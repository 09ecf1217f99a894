//! # Core Module
//!
//! Shared configuration records used across the crate.

pub mod config;

pub use config::{Config, ConfigError, RendererConfig};
