//! # pcm-relay common library
//!
//! Shared code for the pcm-relay crates:
//! - Error types
//! - TOML bootstrap configuration and config file resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
