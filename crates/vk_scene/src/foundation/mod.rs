//! Foundation module - Core utilities and types
//!
//! - Math types and operations
//! - Memory layout helpers
//! - Logging utilities

pub mod math;
pub mod memory;
pub mod logging;
