//! CLI module
//!
//! This module contains all CLI-specific functionality including:
//! - Configuration (CLIConfig)
//! - Command implementations
//! - Terminal colors and utility functions

pub mod colors;
pub mod commands;
pub mod config;
pub mod utils;
