//! # NodeKeeper Core
//!
//! Core configuration, validation, and disk helpers for `NodeKeeper`.
//!
//! This crate provides:
//! - Configuration loading and validation (JSON5 format, env overrides)
//! - Input validation and sanitization
//! - Atomic and create-only writes for the state files shared with the
//!   supervisor, plus signal files

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod disk;
pub mod validation;

pub use config::{Config, ConfigError};
pub use disk::{DiskError, FileMode, Signal};
pub use validation::ValidationError;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{AuthSettings, Config, CredentialBackend, PathsConfig, ServicesConfig};
    pub use crate::disk::{DiskError, FileMode, Signal};
    pub use crate::validation::ValidationError;
}
