//! # KI-Identity Browser
//!
//! Per-account isolated browsing contexts, each bound to a deterministic,
//! internally consistent fingerprint identity.
//!
//! ## Features
//!
//! - **Seeded Fingerprints**: the same seed always yields the same profile
//! - **Consistency Scoring**: penalty-based quality reports with entropy estimates
//! - **Injection Engine**: navigator, screen, WebGL, canvas, audio, font and timezone overrides
//! - **Context Lifecycle**: partitioned storage, per-account proxies, re-injection on every document
//! - **REST API**: HTTP endpoints plus a WebSocket stream of lifecycle events
//! - **Flexible Configuration**: TOML/JSON files, environment variables, CLI arguments
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ki_identity_browser::{
//!     config::{AccountConfig, IdentitySettings},
//!     context::{ContextLifecycleManager, MockWindowing},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = ContextLifecycleManager::new(
//!         Arc::new(MockWindowing::new()),
//!         IdentitySettings::default(),
//!     );
//!
//!     let handle = manager.start("account-1", AccountConfig::default()).await?;
//!     println!("account-1 runs in {}", handle);
//!
//!     manager.stop("account-1").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`fingerprint`]: Profile types, seeded generator, consistency validator
//! - [`injection`]: Execution-context seam, override engine, bootstrap script
//! - [`context`]: Windowing collaborator trait, lifecycle manager, events
//! - [`api`]: REST API server and WebSocket handlers
//! - [`config`]: Configuration loading and per-account settings
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        KI-Identity                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐            │
//! │  │ Fingerprint │──▶│  Injection  │◀──│   Context   │◀── API     │
//! │  │  Generator  │   │   Engine    │   │  Lifecycle  │            │
//! │  └─────────────┘   └─────────────┘   └──────┬──────┘            │
//! │                                             │                   │
//! │                                   ┌─────────┴─────────┐         │
//! │                                   │    Windowing      │         │
//! │                                   │   Collaborator    │         │
//! │                                   └───────────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//!
//! Configuration follows a precedence chain:
//! 1. Default values
//! 2. Configuration file (TOML/JSON)
//! 3. Environment variables (`KI_IDENTITY_*`)
//! 4. CLI arguments
//!
//! See [`config::IdentitySettings`] for all available options.

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Full version string with name
pub const FULL_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Module Exports
// ============================================================================

/// Fingerprint profiles, seeded generation and consistency validation.
pub mod fingerprint;

/// Override installation into page execution contexts.
pub mod injection;

/// Per-account isolated contexts and their lifecycle.
pub mod context;

/// REST API server and WebSocket handlers.
pub mod api;

/// Configuration management for loading settings from files, env, and CLI.
pub mod config;

// ============================================================================
// Re-exports for Convenience
// ============================================================================

// Fingerprint types
pub use fingerprint::{
    generate, user_agent_for, validate, ConsistencyValidator, FingerprintGenerator,
    FingerprintProfile, GenerationError, QualityReport, ValidationWarning,
};

// Injection types
pub use injection::{ExecutionContext, InjectionEngine, InjectionFailure, InjectionReport, SimulatedPage};

// Context types
pub use context::{
    ContextHandle, ContextLifecycleManager, ContextState, LifecycleError, LifecycleEvent,
    MockWindowing, WindowingCollaborator,
};

// API types
pub use api::{ApiServer, AppState, WebSocketHandler};

// Config types
pub use config::{AccountConfig, CliArgs, ConfigError, IdentitySettings, ProxyConfig, ProxyType};

// ============================================================================
// Prelude Module
// ============================================================================

/// Prelude module for convenient imports.
///
/// ```rust
/// use ki_identity_browser::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{AccountConfig, IdentitySettings};
    pub use crate::context::{ContextLifecycleManager, ContextState, WindowingCollaborator};
    pub use crate::fingerprint::{FingerprintGenerator, FingerprintProfile};
    pub use crate::injection::{ExecutionContext, InjectionEngine};
    pub use crate::{FULL_VERSION, NAME, VERSION};
}
