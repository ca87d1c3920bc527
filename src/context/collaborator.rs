//! Windowing/session collaborator boundary.
//!
//! The lifecycle manager does not create native windows itself. It asks a
//! [`WindowingCollaborator`] for isolated contexts and registers a
//! [`DocumentObserver`] that the collaborator must call at document creation,
//! before any script of that document runs.

use crate::config::ViewportConfig;
use crate::injection::ExecutionContext;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Opaque handle to one isolated browsing context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextHandle(String);

impl ContextHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callbacks a collaborator invokes for one context.
pub trait DocumentObserver: Send + Sync {
    /// A new document's execution context exists and none of its scripts have run yet.
    fn on_document_created(&self, ctx: &dyn ExecutionContext);

    /// A navigation finished, successfully or not.
    fn on_load_finished(&self, result: std::result::Result<(), String>);

    /// The native context went away without the manager asking.
    fn on_context_closed(&self);
}

/// Trait defining the windowing interface the lifecycle manager depends on.
#[async_trait]
pub trait WindowingCollaborator: Send + Sync {
    /// Create a context whose storage lives in its own partition.
    async fn create_isolated_context(
        &self,
        partition_key: &str,
        viewport: &ViewportConfig,
    ) -> Result<ContextHandle>;

    /// Route the context's traffic through a proxy rules string.
    async fn set_egress_proxy(&self, handle: &ContextHandle, rules: &str) -> Result<()>;

    /// Set the user agent string.
    async fn set_identification_string(&self, handle: &ContextHandle, value: &str) -> Result<()>;

    /// Register the observer for every future document of this context.
    async fn on_document_load(
        &self,
        handle: &ContextHandle,
        observer: Arc<dyn DocumentObserver>,
    ) -> Result<()>;

    /// Start a navigation. Completion is reported through the observer.
    async fn navigate(&self, handle: &ContextHandle, url: &str) -> Result<()>;

    /// Close the native context and release its resources.
    async fn close(&self, handle: &ContextHandle) -> Result<()>;
}
