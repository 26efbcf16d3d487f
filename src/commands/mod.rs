//! Command implementations for the CLI
//!
//! - start: Start the collector server
//! - config: Configuration display and validation

pub mod config;
pub mod start;
