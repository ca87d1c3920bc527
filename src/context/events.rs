//! Lifecycle events broadcast to control-plane subscribers.

use serde::{Deserialize, Serialize};

/// Events emitted by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LifecycleEvent {
    /// A native context was created and its first navigation started
    ContextStarting {
        account_id: String,
        context_id: String,
    },

    /// The first document finished loading
    ContextRunning {
        account_id: String,
        context_id: String,
    },

    /// The context was closed and its record evicted
    ContextStopped { account_id: String },

    /// Creation or loading failed
    ContextFailed { account_id: String, reason: String },

    /// The account's profile was replaced
    ProfileUpdated { account_id: String },

    /// The bound profile scored below the configured threshold
    LowQuality {
        account_id: String,
        score: u8,
        issues: Vec<String>,
    },

    /// A document of the context received its overrides
    DocumentInstrumented {
        account_id: String,
        context_id: String,
        applied: usize,
        failed: usize,
    },
}

impl LifecycleEvent {
    pub fn account_id(&self) -> &str {
        match self {
            LifecycleEvent::ContextStarting { account_id, .. }
            | LifecycleEvent::ContextRunning { account_id, .. }
            | LifecycleEvent::ContextStopped { account_id }
            | LifecycleEvent::ContextFailed { account_id, .. }
            | LifecycleEvent::ProfileUpdated { account_id }
            | LifecycleEvent::LowQuality { account_id, .. }
            | LifecycleEvent::DocumentInstrumented { account_id, .. } => account_id,
        }
    }
}
