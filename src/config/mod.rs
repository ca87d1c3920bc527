//! Configuration module for ki-identity-browser.
//!
//! This module provides configuration management for the service, including:
//! - Loading settings from files (TOML/JSON)
//! - Environment variable overrides
//! - CLI argument parsing
//! - Per-account start configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use ki_identity_browser::config::IdentitySettings;
//!
//! // Load from a specific file
//! let settings = IdentitySettings::from_file("identity.toml").unwrap();
//!
//! // Override with environment variables
//! let settings = settings.merge_with_env();
//! ```

mod account;
mod settings;

pub use account::{AccountConfig, AccountEntry, AccountsFile, ProxyConfig, ProxyType, ViewportConfig};
pub use settings::{CliArgs, ConfigError, IdentitySettings};
