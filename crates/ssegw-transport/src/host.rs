//! What the embedding host provides beyond the network.
//!
//! Browser-like hosts have tab-scoped storage, a discoverable page root URL
//! and the ability to reload the page. Headless hosts have none of these.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Tab-scoped key/value storage (a browser's session storage).
pub trait TabStorage: Send + Sync {
    /// Read a value.
    fn get_item(&self, key: &str) -> Option<String>;
    /// Write a value.
    fn set_item(&self, key: &str, value: &str);
}

/// In-memory [`TabStorage`]; one instance models one tab.
#[derive(Debug, Default)]
pub struct MemoryTabStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryTabStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TabStorage for MemoryTabStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) {
        let _ = self.items.lock().insert(key.to_owned(), value.to_owned());
    }
}

/// Host capabilities consulted by the connection controller.
pub trait HostEnvironment: Send + Sync {
    /// Tab-scoped storage, if the host has any.
    fn tab_storage(&self) -> Option<Arc<dyn TabStorage>> {
        None
    }

    /// Server root URL discovered from page context.
    fn root_url(&self) -> Option<String> {
        None
    }

    /// Force a full reload of the hosting page.
    fn reload(&self) {}
}

/// Host without storage, page context or reload.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeadlessHost;

impl HostEnvironment for HeadlessHost {}

/// Host with tab-scoped storage and optional page context.
#[derive(Clone, Default)]
pub struct SessionScopedHost {
    storage: Option<Arc<dyn TabStorage>>,
    root_url: Option<String>,
    on_reload: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl SessionScopedHost {
    /// Host backed by `storage`.
    pub fn new(storage: Arc<dyn TabStorage>) -> Self {
        Self {
            storage: Some(storage),
            ..Self::default()
        }
    }

    /// Set the page root URL.
    #[must_use]
    pub fn with_root_url(mut self, url: impl Into<String>) -> Self {
        self.root_url = Some(url.into());
        self
    }

    /// Set the reload hook.
    #[must_use]
    pub fn with_reload(mut self, on_reload: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_reload = Some(Arc::new(on_reload));
        self
    }
}

impl HostEnvironment for SessionScopedHost {
    fn tab_storage(&self) -> Option<Arc<dyn TabStorage>> {
        self.storage.clone()
    }

    fn root_url(&self) -> Option<String> {
        self.root_url.clone()
    }

    fn reload(&self) {
        if let Some(on_reload) = &self.on_reload {
            on_reload();
        }
    }
}
