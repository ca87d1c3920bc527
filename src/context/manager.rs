//! Context lifecycle management.
//!
//! [`ContextLifecycleManager`] owns the mapping from accounts to profiles and to
//! isolated browsing contexts. Per account it drives
//! `idle -> starting -> running -> stopped`, with `error` reachable from
//! `starting` and `running`.
//!
//! Operations on one account are serialized by a per-account async lock. The lock
//! is released before `start` waits for the first load, so `stop` can always
//! tear down a context that never finishes loading. Different accounts only share
//! the profile and context maps, which are updated one entry at a time.

use super::collaborator::{ContextHandle, DocumentObserver, WindowingCollaborator};
use super::events::LifecycleEvent;
use crate::config::{AccountConfig, ConfigError, IdentitySettings, ProxyConfig, ViewportConfig};
use crate::fingerprint::{
    user_agent_for, ConsistencyValidator, FingerprintGenerator, FingerprintProfile,
    GenerationError, QualityReport,
};
use crate::injection::{ExecutionContext, InjectionEngine};
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 256;

// ============================================================================
// State and errors
// ============================================================================

/// Lifecycle state of one account's context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum ContextState {
    Idle,
    Starting,
    Running,
    Stopped,
    Error(String),
}

impl ContextState {
    /// Starting or running; a second `start` reuses the context.
    pub fn is_active(&self) -> bool {
        matches!(self, ContextState::Starting | ContextState::Running)
    }
}

impl Default for ContextState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for ContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextState::Idle => write!(f, "Idle"),
            ContextState::Starting => write!(f, "Starting"),
            ContextState::Running => write!(f, "Running"),
            ContextState::Stopped => write!(f, "Stopped"),
            ContextState::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// Errors returned by lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to create context for account {account_id}: {reason}")]
    ContextCreationFailure { account_id: String, reason: String },

    #[error("Initial load failed for account {account_id}: {reason}")]
    LoadFailed { account_id: String, reason: String },

    #[error("Start of account {account_id} was cancelled")]
    Cancelled { account_id: String },

    #[error("Failed to close context for account {account_id}: {reason}")]
    CloseFailed { account_id: String, reason: String },

    #[error(transparent)]
    InvalidProfile(#[from] GenerationError),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoadStatus {
    Pending,
    Loaded,
    Failed(String),
    Cancelled,
}

/// Snapshot of one live context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextInfo {
    pub account_id: String,
    pub context_id: ContextHandle,
    pub state: ContextState,
    pub partition: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub documents_loaded: u64,
}

// ============================================================================
// Records
// ============================================================================

struct ContextRecord {
    account_id: String,
    handle: ContextHandle,
    partition: String,
    user_agent: String,
    created_at: DateTime<Utc>,
    state: RwLock<ContextState>,
    /// Read at every document creation, so updates apply from the next load on.
    profile: RwLock<FingerprintProfile>,
    documents_loaded: AtomicU64,
    load_status: watch::Sender<LoadStatus>,
}

impl ContextRecord {
    fn state(&self) -> ContextState {
        self.state.read().clone()
    }

    fn set_state(&self, state: ContextState) {
        *self.state.write() = state;
    }

    /// Starting -> Running. Returns whether the transition happened.
    fn promote(&self) -> bool {
        let mut state = self.state.write();
        if *state == ContextState::Starting {
            *state = ContextState::Running;
            true
        } else {
            false
        }
    }

    fn cancel_pending_load(&self) {
        self.load_status.send_if_modified(|status| {
            if *status == LoadStatus::Pending {
                *status = LoadStatus::Cancelled;
                true
            } else {
                false
            }
        });
    }

    fn info(&self) -> ContextInfo {
        ContextInfo {
            account_id: self.account_id.clone(),
            context_id: self.handle.clone(),
            state: self.state(),
            partition: self.partition.clone(),
            user_agent: self.user_agent.clone(),
            created_at: self.created_at,
            documents_loaded: self.documents_loaded.load(Ordering::SeqCst),
        }
    }
}

struct Inner {
    collaborator: Arc<dyn WindowingCollaborator>,
    settings: IdentitySettings,
    generator: FingerprintGenerator,
    validator: ConsistencyValidator,
    engine: InjectionEngine,
    profiles: RwLock<HashMap<String, FingerprintProfile>>,
    contexts: RwLock<HashMap<String, Arc<ContextRecord>>>,
    /// Terminal state of accounts whose record has been evicted.
    last_states: RwLock<HashMap<String, ContextState>>,
    account_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl Inner {
    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Remove `record` if it is still the account's current one.
    ///
    /// The final state is set before the record leaves the map, so a load
    /// finishing concurrently can no longer promote it.
    fn evict(&self, record: &Arc<ContextRecord>, final_state: ContextState) -> bool {
        let mut contexts = self.contexts.write();
        match contexts.get(&record.account_id) {
            Some(current) if Arc::ptr_eq(current, record) => {
                record.set_state(final_state.clone());
                record.cancel_pending_load();
                self.last_states
                    .write()
                    .insert(record.account_id.clone(), final_state);
                contexts.remove(&record.account_id);
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
// Document observer
// ============================================================================

/// Binds one context record to its collaborator callbacks.
struct InjectionObserver {
    record: Weak<ContextRecord>,
    inner: Weak<Inner>,
}

impl InjectionObserver {
    fn upgrade(&self) -> Option<(Arc<ContextRecord>, Arc<Inner>)> {
        Some((self.record.upgrade()?, self.inner.upgrade()?))
    }
}

impl DocumentObserver for InjectionObserver {
    fn on_document_created(&self, ctx: &dyn ExecutionContext) {
        let Some((record, inner)) = self.upgrade() else {
            return;
        };

        let profile = record.profile.read().clone();
        let report = inner.engine.apply(&profile, ctx);
        if report.skipped {
            return;
        }

        record.documents_loaded.fetch_add(1, Ordering::SeqCst);
        inner.emit(LifecycleEvent::DocumentInstrumented {
            account_id: record.account_id.clone(),
            context_id: report.context_id,
            applied: report.applied.len(),
            failed: report.failed.len(),
        });
    }

    fn on_load_finished(&self, result: Result<(), String>) {
        let Some((record, inner)) = self.upgrade() else {
            return;
        };

        match result {
            Ok(()) => {
                if record.promote() {
                    info!(account = %record.account_id, context = %record.handle, "Context running");
                    inner.emit(LifecycleEvent::ContextRunning {
                        account_id: record.account_id.clone(),
                        context_id: record.handle.to_string(),
                    });
                    record.load_status.send_if_modified(|status| {
                        if *status == LoadStatus::Pending {
                            *status = LoadStatus::Loaded;
                            true
                        } else {
                            false
                        }
                    });
                }
            }
            Err(reason) => {
                if record.state().is_active() {
                    warn!(account = %record.account_id, "Load failed: {}", reason);
                    record.set_state(ContextState::Error(reason.clone()));
                    inner.emit(LifecycleEvent::ContextFailed {
                        account_id: record.account_id.clone(),
                        reason: reason.clone(),
                    });
                    record.load_status.send_if_modified(|status| {
                        if *status == LoadStatus::Pending {
                            *status = LoadStatus::Failed(reason);
                            true
                        } else {
                            false
                        }
                    });
                }
            }
        }
    }

    fn on_context_closed(&self) {
        let Some((record, inner)) = self.upgrade() else {
            return;
        };

        if inner.evict(&record, ContextState::Stopped) {
            info!(account = %record.account_id, "Context closed externally");
            inner.emit(LifecycleEvent::ContextStopped {
                account_id: record.account_id.clone(),
            });
        }
        record.cancel_pending_load();
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Owns accounts, their profiles and their isolated contexts.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct ContextLifecycleManager {
    inner: Arc<Inner>,
}

impl ContextLifecycleManager {
    pub fn new(collaborator: Arc<dyn WindowingCollaborator>, settings: IdentitySettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                collaborator,
                settings,
                generator: FingerprintGenerator::new(),
                validator: ConsistencyValidator::new(),
                engine: InjectionEngine::new(),
                profiles: RwLock::new(HashMap::new()),
                contexts: RwLock::new(HashMap::new()),
                last_states: RwLock::new(HashMap::new()),
                account_locks: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    pub fn settings(&self) -> &IdentitySettings {
        &self.inner.settings
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    /// Start (or reuse) the isolated context of an account.
    ///
    /// Resolves after the first successful load. A second call while the account
    /// is running returns the existing handle; while it is starting, the call waits
    /// for the same first load. Neither creates another native context.
    pub async fn start(
        &self,
        account_id: &str,
        config: AccountConfig,
    ) -> Result<ContextHandle, LifecycleError> {
        config.validate()?;

        let lock = self.account_lock(account_id);
        let guard = lock.lock().await;

        if let Some(record) = self.record(account_id) {
            let state = record.state();
            if state == ContextState::Running {
                debug!(account = account_id, "Context already running, reusing handle");
                return Ok(record.handle.clone());
            }
            if state == ContextState::Starting {
                debug!(account = account_id, "Context still starting, waiting for first load");
                let load_rx = record.load_status.subscribe();
                let handle = record.handle.clone();
                drop(record);
                drop(guard);
                return Self::await_first_load(account_id, handle, load_rx).await;
            }
            // Leftover from a failed run; replace it.
            self.inner.evict(&record, state);
            if let Err(e) = self.inner.collaborator.close(&record.handle).await {
                debug!(account = account_id, "Closing stale context failed: {:#}", e);
            }
        }

        let profile = self.resolve_profile(account_id, &config)?;
        self.check_quality(account_id, &profile);

        let settings = &self.inner.settings;
        let partition = settings.partition_for(account_id);
        let user_agent = config
            .user_agent_override
            .clone()
            .unwrap_or_else(|| user_agent_for(&profile.navigator.platform, &settings.chrome_version));
        let viewport = config
            .viewport
            .clone()
            .unwrap_or_else(|| ViewportConfig::from_screen(&profile.screen));
        let proxy = config.proxy.clone().or_else(|| settings.default_proxy.clone());
        let url = config
            .start_url
            .clone()
            .unwrap_or_else(|| settings.start_url.clone());

        let handle = match self
            .inner
            .collaborator
            .create_isolated_context(&partition, &viewport)
            .await
        {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail_start(account_id, format!("{:#}", e))),
        };

        let (load_tx, load_rx) = watch::channel(LoadStatus::Pending);
        let record = Arc::new(ContextRecord {
            account_id: account_id.to_string(),
            handle: handle.clone(),
            partition,
            user_agent,
            created_at: Utc::now(),
            state: RwLock::new(ContextState::Starting),
            profile: RwLock::new(profile),
            documents_loaded: AtomicU64::new(0),
            load_status: load_tx,
        });
        self.inner
            .contexts
            .write()
            .insert(account_id.to_string(), record.clone());
        self.inner.last_states.write().remove(account_id);

        if let Err(e) = self.configure(&record, proxy.as_ref()).await {
            return Err(self.abort_start(&record, e).await);
        }

        info!(account = account_id, context = %handle, partition = %record.partition, "Context starting");
        self.inner.emit(LifecycleEvent::ContextStarting {
            account_id: account_id.to_string(),
            context_id: handle.to_string(),
        });

        if let Err(e) = self
            .inner
            .collaborator
            .navigate(&handle, &url)
            .await
            .with_context(|| format!("navigating to {}", url))
        {
            return Err(self.abort_start(&record, e).await);
        }

        drop(record);
        drop(guard);

        Self::await_first_load(account_id, handle, load_rx).await
    }

    /// Wait, without holding the account lock, until the first load resolves.
    /// A dropped sender means the record was evicted.
    async fn await_first_load(
        account_id: &str,
        handle: ContextHandle,
        mut load_rx: watch::Receiver<LoadStatus>,
    ) -> Result<ContextHandle, LifecycleError> {
        let status = match load_rx
            .wait_for(|status| *status != LoadStatus::Pending)
            .await
        {
            Ok(status) => (*status).clone(),
            Err(_) => LoadStatus::Cancelled,
        };

        match status {
            LoadStatus::Loaded => Ok(handle),
            LoadStatus::Failed(reason) => Err(LifecycleError::LoadFailed {
                account_id: account_id.to_string(),
                reason,
            }),
            LoadStatus::Cancelled | LoadStatus::Pending => Err(LifecycleError::Cancelled {
                account_id: account_id.to_string(),
            }),
        }
    }

    /// Close the account's context and evict its record. The profile stays cached.
    ///
    /// A no-op for accounts without a context.
    pub async fn stop(&self, account_id: &str) -> Result<(), LifecycleError> {
        let lock = self.account_lock(account_id);
        let result = {
            let _guard = lock.lock().await;
            self.stop_locked(account_id).await
        };
        drop(lock);
        self.release_account_lock(account_id);
        result
    }

    async fn stop_locked(&self, account_id: &str) -> Result<(), LifecycleError> {
        let Some(record) = self.record(account_id) else {
            debug!(account = account_id, "Stop on account without context, nothing to do");
            return Ok(());
        };

        self.inner.evict(&record, ContextState::Stopped);

        let closed = self.inner.collaborator.close(&record.handle).await;
        info!(account = account_id, context = %record.handle, "Context stopped");
        self.inner.emit(LifecycleEvent::ContextStopped {
            account_id: account_id.to_string(),
        });

        closed.map_err(|e| LifecycleError::CloseFailed {
            account_id: account_id.to_string(),
            reason: format!("{:#}", e),
        })
    }

    /// Stop every account that has a context.
    pub async fn stop_all(&self) {
        let accounts: Vec<String> = self.inner.contexts.read().keys().cloned().collect();
        for account_id in accounts {
            if let Err(e) = self.stop(&account_id).await {
                warn!(account = %account_id, "Stop during shutdown failed: {}", e);
            }
        }
    }

    /// Replace the account's profile. A live context picks it up at its next document.
    pub async fn update_profile(
        &self,
        account_id: &str,
        profile: FingerprintProfile,
    ) -> Result<(), LifecycleError> {
        profile.check_shape()?;

        let lock = self.account_lock(account_id);
        let _guard = lock.lock().await;

        self.check_quality(account_id, &profile);
        self.inner
            .profiles
            .write()
            .insert(account_id.to_string(), profile.clone());
        if let Some(record) = self.record(account_id) {
            *record.profile.write() = profile;
            debug!(account = account_id, "Profile replaced, applies from next document");
        }

        self.inner.emit(LifecycleEvent::ProfileUpdated {
            account_id: account_id.to_string(),
        });
        Ok(())
    }

    /// Drop the cached profile so the next start regenerates it.
    pub fn forget_profile(&self, account_id: &str) -> Option<FingerprintProfile> {
        let forgotten = self.inner.profiles.write().remove(account_id);
        self.release_account_lock(account_id);
        forgotten
    }

    pub fn state(&self, account_id: &str) -> ContextState {
        if let Some(record) = self.record(account_id) {
            return record.state();
        }
        self.inner
            .last_states
            .read()
            .get(account_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn handle(&self, account_id: &str) -> Option<ContextHandle> {
        self.record(account_id).map(|r| r.handle.clone())
    }

    /// Cached profile of an account, whether or not it is running.
    pub fn profile(&self, account_id: &str) -> Option<FingerprintProfile> {
        self.inner.profiles.read().get(account_id).cloned()
    }

    pub fn quality(&self, account_id: &str) -> Option<QualityReport> {
        self.profile(account_id)
            .map(|p| self.inner.validator.validate(&p))
    }

    /// Bootstrap script for the account's cached profile.
    pub fn bootstrap_script(&self, account_id: &str) -> Option<String> {
        self.profile(account_id)
            .map(|p| self.inner.engine.bootstrap_script(&p))
    }

    /// Every live context, sorted by account id.
    pub fn contexts(&self) -> Vec<ContextInfo> {
        let mut infos: Vec<ContextInfo> = self
            .inner
            .contexts
            .read()
            .values()
            .map(|r| r.info())
            .collect();
        infos.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        infos
    }

    pub fn context(&self, account_id: &str) -> Option<ContextInfo> {
        self.record(account_id).map(|r| r.info())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn record(&self, account_id: &str) -> Option<Arc<ContextRecord>> {
        self.inner.contexts.read().get(account_id).cloned()
    }

    fn account_lock(&self, account_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .account_locks
            .lock()
            .entry(account_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the account's lock entry once nobody holds or awaits it.
    fn release_account_lock(&self, account_id: &str) {
        let mut locks = self.inner.account_locks.lock();
        if locks
            .get(account_id)
            .map_or(false, |lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(account_id);
        }
    }

    /// Supplied profile wins, then the cache, then a profile seeded by the account id.
    fn resolve_profile(
        &self,
        account_id: &str,
        config: &AccountConfig,
    ) -> Result<FingerprintProfile, LifecycleError> {
        if let Some(ref supplied) = config.fingerprint {
            supplied.check_shape()?;
            self.inner
                .profiles
                .write()
                .insert(account_id.to_string(), supplied.clone());
            return Ok(supplied.clone());
        }

        let cached = self.inner.profiles.read().get(account_id).cloned();
        if let Some(profile) = cached {
            debug!(account = account_id, "Reusing cached profile");
            return Ok(profile);
        }

        let generated = self.inner.generator.generate(Some(account_id));
        debug!(account = account_id, platform = %generated.navigator.platform, "Generated profile");
        self.inner
            .profiles
            .write()
            .insert(account_id.to_string(), generated.clone());
        Ok(generated)
    }

    /// Advisory only; never blocks.
    fn check_quality(&self, account_id: &str, profile: &FingerprintProfile) {
        let report = self.inner.validator.validate(profile);
        if report.score < self.inner.settings.low_quality_threshold {
            warn!(
                account = account_id,
                score = report.score,
                issues = ?report.issues,
                "Fingerprint quality below threshold"
            );
            self.inner.emit(LifecycleEvent::LowQuality {
                account_id: account_id.to_string(),
                score: report.score,
                issues: report.issues,
            });
        }
    }

    async fn configure(
        &self,
        record: &Arc<ContextRecord>,
        proxy: Option<&ProxyConfig>,
    ) -> anyhow::Result<()> {
        let collaborator = &self.inner.collaborator;
        if let Some(proxy) = proxy {
            collaborator
                .set_egress_proxy(&record.handle, &proxy.to_url())
                .await
                .context("setting egress proxy")?;
        }
        collaborator
            .set_identification_string(&record.handle, &record.user_agent)
            .await
            .context("setting user agent")?;

        let observer = Arc::new(InjectionObserver {
            record: Arc::downgrade(record),
            inner: Arc::downgrade(&self.inner),
        });
        collaborator
            .on_document_load(&record.handle, observer)
            .await
            .context("registering document observer")?;
        Ok(())
    }

    async fn abort_start(&self, record: &Arc<ContextRecord>, cause: anyhow::Error) -> LifecycleError {
        self.inner.contexts.write().remove(&record.account_id);
        if let Err(e) = self.inner.collaborator.close(&record.handle).await {
            debug!(account = %record.account_id, "Closing half-configured context failed: {:#}", e);
        }
        self.fail_start(&record.account_id, format!("{:#}", cause))
    }

    fn fail_start(&self, account_id: &str, reason: String) -> LifecycleError {
        error!(account = account_id, "Context creation failed: {}", reason);
        self.inner
            .last_states
            .write()
            .insert(account_id.to_string(), ContextState::Error(reason.clone()));
        self.inner.emit(LifecycleEvent::ContextFailed {
            account_id: account_id.to_string(),
            reason: reason.clone(),
        });
        LifecycleError::ContextCreationFailure {
            account_id: account_id.to_string(),
            reason,
        }
    }
}
