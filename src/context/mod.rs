//! Per-account isolated contexts.
//!
//! Every account gets its own storage partition, its own egress route and its own
//! fingerprint profile. The [`ContextLifecycleManager`] binds them together and
//! re-applies the profile to every document the context creates.
//!
//! Native windows are out of reach of this crate. They are reached through the
//! [`WindowingCollaborator`] trait; [`MockWindowing`] implements it in memory.

pub mod collaborator;
pub mod events;
pub mod manager;
pub mod mock;

pub use collaborator::{ContextHandle, DocumentObserver, WindowingCollaborator};
pub use events::LifecycleEvent;
pub use manager::{ContextInfo, ContextLifecycleManager, ContextState, LifecycleError};
pub use mock::MockWindowing;
