//! Mock windowing collaborator.
//!
//! Simulates isolated contexts without launching a browser, making it suitable
//! for unit tests and for running the control plane headless. Each navigation
//! creates a fresh [`SimulatedPage`] and calls the registered observer before the
//! page is considered scriptable.

use super::collaborator::{ContextHandle, DocumentObserver, WindowingCollaborator};
use crate::config::ViewportConfig;
use crate::injection::SimulatedPage;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

struct MockContext {
    partition: String,
    viewport: ViewportConfig,
    proxy_rules: Option<String>,
    identification: Option<String>,
    observer: Option<Arc<dyn DocumentObserver>>,
    pages: Vec<Arc<SimulatedPage>>,
}

/// Mock windowing implementation for testing purposes.
pub struct MockWindowing {
    contexts: Arc<RwLock<HashMap<ContextHandle, MockContext>>>,
    /// Cookie jars keyed by storage partition, shared by every context on that partition.
    jars: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
    created: AtomicUsize,
    fail_creation: AtomicBool,
    hold_loads: AtomicBool,
}

impl Default for MockWindowing {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWindowing {
    pub fn new() -> Self {
        Self {
            contexts: Arc::new(RwLock::new(HashMap::new())),
            jars: Arc::new(RwLock::new(HashMap::new())),
            created: AtomicUsize::new(0),
            fail_creation: AtomicBool::new(false),
            hold_loads: AtomicBool::new(false),
        }
    }

    /// Make every following `create_isolated_context` fail.
    pub fn set_fail_creation(&self, fail: bool) {
        self.fail_creation.store(fail, Ordering::SeqCst);
    }

    /// Keep navigations pending until `simulate_load_finished` is called.
    pub fn set_hold_loads(&self, hold: bool) {
        self.hold_loads.store(hold, Ordering::SeqCst);
    }

    /// Number of native contexts ever created.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Number of contexts currently open.
    pub async fn open_count(&self) -> usize {
        self.contexts.read().await.len()
    }

    pub async fn is_open(&self, handle: &ContextHandle) -> bool {
        self.contexts.read().await.contains_key(handle)
    }

    pub async fn partition(&self, handle: &ContextHandle) -> Option<String> {
        self.contexts
            .read()
            .await
            .get(handle)
            .map(|c| c.partition.clone())
    }

    pub async fn viewport(&self, handle: &ContextHandle) -> Option<ViewportConfig> {
        self.contexts
            .read()
            .await
            .get(handle)
            .map(|c| c.viewport.clone())
    }

    pub async fn proxy_rules(&self, handle: &ContextHandle) -> Option<String> {
        self.contexts
            .read()
            .await
            .get(handle)
            .and_then(|c| c.proxy_rules.clone())
    }

    pub async fn identification_string(&self, handle: &ContextHandle) -> Option<String> {
        self.contexts
            .read()
            .await
            .get(handle)
            .and_then(|c| c.identification.clone())
    }

    /// The document currently shown in a context.
    pub async fn current_page(&self, handle: &ContextHandle) -> Option<Arc<SimulatedPage>> {
        self.contexts
            .read()
            .await
            .get(handle)
            .and_then(|c| c.pages.last().cloned())
    }

    /// Every document the context has created, oldest first.
    pub async fn pages(&self, handle: &ContextHandle) -> Vec<Arc<SimulatedPage>> {
        self.contexts
            .read()
            .await
            .get(handle)
            .map(|c| c.pages.clone())
            .unwrap_or_default()
    }

    /// Write a cookie from inside a context.
    pub async fn set_cookie(&self, handle: &ContextHandle, name: &str, value: &str) -> Result<()> {
        let partition = self
            .partition(handle)
            .await
            .ok_or_else(|| anyhow!("Context not found: {}", handle))?;
        self.jars
            .write()
            .await
            .entry(partition)
            .or_default()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Cookies visible from inside a context.
    pub async fn cookies(&self, handle: &ContextHandle) -> Result<HashMap<String, String>> {
        let partition = self
            .partition(handle)
            .await
            .ok_or_else(|| anyhow!("Context not found: {}", handle))?;
        Ok(self
            .jars
            .read()
            .await
            .get(&partition)
            .cloned()
            .unwrap_or_default())
    }

    /// Report completion of a held navigation.
    pub async fn simulate_load_finished(
        &self,
        handle: &ContextHandle,
        result: std::result::Result<(), String>,
    ) -> Result<()> {
        let observer = self.observer(handle).await?;
        if let Some(observer) = observer {
            observer.on_load_finished(result);
        }
        Ok(())
    }

    /// Simulates the user closing the window.
    pub async fn simulate_user_close(&self, handle: &ContextHandle) -> Result<()> {
        let removed = self
            .contexts
            .write()
            .await
            .remove(handle)
            .ok_or_else(|| anyhow!("Context not found: {}", handle))?;
        if let Some(observer) = removed.observer {
            observer.on_context_closed();
        }
        Ok(())
    }

    async fn observer(&self, handle: &ContextHandle) -> Result<Option<Arc<dyn DocumentObserver>>> {
        let contexts = self.contexts.read().await;
        let context = contexts
            .get(handle)
            .ok_or_else(|| anyhow!("Context not found: {}", handle))?;
        Ok(context.observer.clone())
    }
}

#[async_trait]
impl WindowingCollaborator for MockWindowing {
    async fn create_isolated_context(
        &self,
        partition_key: &str,
        viewport: &ViewportConfig,
    ) -> Result<ContextHandle> {
        if self.fail_creation.load(Ordering::SeqCst) {
            return Err(anyhow!("Native window creation failed"));
        }
        if partition_key.is_empty() {
            return Err(anyhow!("Partition key cannot be empty"));
        }

        let handle = ContextHandle::new(Uuid::new_v4().to_string());
        self.contexts.write().await.insert(
            handle.clone(),
            MockContext {
                partition: partition_key.to_string(),
                viewport: viewport.clone(),
                proxy_rules: None,
                identification: None,
                observer: None,
                pages: Vec::new(),
            },
        );
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    async fn set_egress_proxy(&self, handle: &ContextHandle, rules: &str) -> Result<()> {
        let mut contexts = self.contexts.write().await;
        let context = contexts
            .get_mut(handle)
            .ok_or_else(|| anyhow!("Context not found: {}", handle))?;
        context.proxy_rules = Some(rules.to_string());
        Ok(())
    }

    async fn set_identification_string(&self, handle: &ContextHandle, value: &str) -> Result<()> {
        let mut contexts = self.contexts.write().await;
        let context = contexts
            .get_mut(handle)
            .ok_or_else(|| anyhow!("Context not found: {}", handle))?;
        context.identification = Some(value.to_string());
        Ok(())
    }

    async fn on_document_load(
        &self,
        handle: &ContextHandle,
        observer: Arc<dyn DocumentObserver>,
    ) -> Result<()> {
        let mut contexts = self.contexts.write().await;
        let context = contexts
            .get_mut(handle)
            .ok_or_else(|| anyhow!("Context not found: {}", handle))?;
        context.observer = Some(observer);
        Ok(())
    }

    async fn navigate(&self, handle: &ContextHandle, url: &str) -> Result<()> {
        let page = Arc::new(SimulatedPage::new(url));
        let observer = {
            let mut contexts = self.contexts.write().await;
            let context = contexts
                .get_mut(handle)
                .ok_or_else(|| anyhow!("Context not found: {}", handle))?;
            context.pages.push(page.clone());
            context.observer.clone()
        };

        // Document creation hook runs before the page is handed out or loaded.
        if let Some(observer) = observer {
            observer.on_document_created(page.as_ref());
            if !self.hold_loads.load(Ordering::SeqCst) {
                observer.on_load_finished(Ok(()));
            }
        }
        Ok(())
    }

    async fn close(&self, handle: &ContextHandle) -> Result<()> {
        self.contexts
            .write()
            .await
            .remove(handle)
            .ok_or_else(|| anyhow!("Context not found: {}", handle))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injection::ExecutionContext;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl DocumentObserver for Recorder {
        fn on_document_created(&self, ctx: &dyn ExecutionContext) {
            self.events
                .lock()
                .push(format!("created:{}", ctx.is_instrumented()));
        }

        fn on_load_finished(&self, result: std::result::Result<(), String>) {
            self.events.lock().push(format!("loaded:{}", result.is_ok()));
        }

        fn on_context_closed(&self) {
            self.events.lock().push("closed".to_string());
        }
    }

    #[tokio::test]
    async fn test_create_and_close_context() {
        let windowing = MockWindowing::new();
        let handle = windowing
            .create_isolated_context("persist:account-a", &ViewportConfig::default())
            .await
            .unwrap();

        assert_eq!(windowing.created_count(), 1);
        assert_eq!(
            windowing.partition(&handle).await.as_deref(),
            Some("persist:account-a")
        );

        windowing.close(&handle).await.unwrap();
        assert_eq!(windowing.open_count().await, 0);
        assert!(windowing.close(&handle).await.is_err());
    }

    #[tokio::test]
    async fn test_observer_sees_document_before_load() {
        let windowing = MockWindowing::new();
        let recorder = Arc::new(Recorder::default());
        let handle = windowing
            .create_isolated_context("p", &ViewportConfig::default())
            .await
            .unwrap();
        windowing
            .on_document_load(&handle, recorder.clone())
            .await
            .unwrap();

        windowing.navigate(&handle, "https://example.com").await.unwrap();

        assert_eq!(
            *recorder.events.lock(),
            vec!["created:false".to_string(), "loaded:true".to_string()]
        );
    }

    #[tokio::test]
    async fn test_held_load_and_user_close() {
        let windowing = MockWindowing::new();
        windowing.set_hold_loads(true);
        let recorder = Arc::new(Recorder::default());
        let handle = windowing
            .create_isolated_context("p", &ViewportConfig::default())
            .await
            .unwrap();
        windowing
            .on_document_load(&handle, recorder.clone())
            .await
            .unwrap();

        windowing.navigate(&handle, "https://example.com").await.unwrap();
        assert_eq!(recorder.events.lock().len(), 1);

        windowing
            .simulate_load_finished(&handle, Err("net::ERR_FAILED".to_string()))
            .await
            .unwrap();
        windowing.simulate_user_close(&handle).await.unwrap();

        let events = recorder.events.lock().clone();
        assert_eq!(events[1], "loaded:false");
        assert_eq!(events[2], "closed");
    }

    #[tokio::test]
    async fn test_cookies_are_partitioned() {
        let windowing = MockWindowing::new();
        let a = windowing
            .create_isolated_context("persist:account-a", &ViewportConfig::default())
            .await
            .unwrap();
        let b = windowing
            .create_isolated_context("persist:account-b", &ViewportConfig::default())
            .await
            .unwrap();

        windowing.set_cookie(&a, "sid", "123").await.unwrap();

        assert_eq!(windowing.cookies(&a).await.unwrap().get("sid").map(String::as_str), Some("123"));
        assert!(windowing.cookies(&b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_creation() {
        let windowing = MockWindowing::new();
        windowing.set_fail_creation(true);
        assert!(windowing
            .create_isolated_context("p", &ViewportConfig::default())
            .await
            .is_err());
        assert_eq!(windowing.created_count(), 0);
    }
}
