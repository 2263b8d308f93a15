//! Process-wide connection management.
//!
//! The manager owns what every connection shares (transport, host, task
//! scheduler, default settings) and the registry of live connections by
//! client id. Settings are snapshotted when a connection is created, so
//! [`ConnectionManager::configure`] should be called before connecting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use ssegw_core::{ClientId, SessionInfo};
use ssegw_settings::{ClientSettings, SettingsPatch};
use ssegw_transport::{GatewayTransport, HeadlessHost, HostEnvironment, ReqwestTransport};

use crate::callbacks::OnConnect;
use crate::connection::{Connection, ConnectionInner};
use crate::errors::{ClientError, Result};
use crate::scheduler::{TaskScheduler, TokioScheduler};

/// Prefix of generated client ids.
pub const GENERATED_CLIENT_ID_PREFIX: &str = "sse-client-";

/// Options for creating a connection.
#[derive(Default)]
pub struct ConnectConfig {
    client_id: Option<ClientId>,
    server_url: Option<String>,
    on_connect: Option<OnConnect>,
}

impl ConnectConfig {
    /// Empty options: generated client id, server URL from settings or host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `client_id`.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<ClientId>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Connect to `url` instead of the configured or discovered one.
    #[must_use]
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Fire `f` once with the session info of the first `open` frame.
    #[must_use]
    pub fn on_connect(mut self, f: impl FnOnce(&SessionInfo) + Send + 'static) -> Self {
        self.on_connect = Some(Box::new(f));
        self
    }
}

impl From<&str> for ConnectConfig {
    fn from(client_id: &str) -> Self {
        Self::new().client_id(client_id)
    }
}

impl From<ClientId> for ConnectConfig {
    fn from(client_id: ClientId) -> Self {
        Self::new().client_id(client_id)
    }
}

/// Shared context and live-connection registry.
pub struct ConnectionManager {
    transport: Arc<dyn GatewayTransport>,
    host: Arc<dyn HostEnvironment>,
    scheduler: Arc<dyn TaskScheduler>,
    settings: Mutex<ClientSettings>,
    connections: Mutex<HashMap<ClientId, Weak<ConnectionInner>>>,
    next_client: AtomicU64,
}

impl ConnectionManager {
    /// Manager on `transport` with a headless host and default settings.
    pub fn new(transport: Arc<dyn GatewayTransport>) -> Arc<Self> {
        Self::builder(transport).build()
    }

    /// Manager on the HTTP transport, configured from `settings`.
    pub fn with_reqwest(settings: ClientSettings) -> Arc<Self> {
        let transport = Arc::new(ReqwestTransport::from_settings(&settings));
        Self::builder(transport).settings(settings).build()
    }

    /// Start a builder.
    pub fn builder(transport: Arc<dyn GatewayTransport>) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder {
            transport,
            host: None,
            scheduler: None,
            settings: ClientSettings::default(),
        }
    }

    /// Patch the default settings for connections created afterwards.
    pub fn configure(&self, patch: &SettingsPatch) {
        let mut settings = self.settings.lock();
        settings.apply(patch);
        debug!(settings = ?*settings, "client settings updated");
    }

    /// Current default settings.
    pub fn settings(&self) -> ClientSettings {
        self.settings.lock().clone()
    }

    /// Generate a fresh client id.
    pub fn generate_client_id(&self) -> ClientId {
        let n = self.next_client.fetch_add(1, Ordering::Relaxed) + 1;
        ClientId::new(format!("{GENERATED_CLIENT_ID_PREFIX}{n}"))
    }

    /// Create a connection without connecting it.
    pub fn connection(self: &Arc<Self>, config: impl Into<ConnectConfig>) -> Connection {
        let ConnectConfig {
            client_id,
            server_url,
            on_connect,
        } = config.into();
        let client_id = client_id.unwrap_or_else(|| self.generate_client_id());
        Connection::new(Arc::clone(self), client_id, server_url, on_connect)
    }

    /// Create a connection and connect it.
    ///
    /// Fails with [`ClientError::AlreadyConnected`] if another live
    /// connection uses the same client id.
    pub async fn connect(self: &Arc<Self>, config: impl Into<ConnectConfig>) -> Result<Connection> {
        let connection = self.connection(config);
        connection.connect().await?;
        Ok(connection)
    }

    /// The live connection registered under `client_id`.
    pub fn get(&self, client_id: &ClientId) -> Option<Connection> {
        self.connections
            .lock()
            .get(client_id)
            .and_then(Weak::upgrade)
            .map(Connection::from_inner)
    }

    /// Whether a live connection is registered under `client_id`.
    pub fn is_registered(&self, client_id: &ClientId) -> bool {
        self.connections
            .lock()
            .get(client_id)
            .is_some_and(|c| c.strong_count() > 0)
    }

    /// Number of live registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections
            .lock()
            .values()
            .filter(|c| c.strong_count() > 0)
            .count()
    }

    pub(crate) fn transport(&self) -> Arc<dyn GatewayTransport> {
        Arc::clone(&self.transport)
    }

    pub(crate) fn host(&self) -> Arc<dyn HostEnvironment> {
        Arc::clone(&self.host)
    }

    pub(crate) fn scheduler(&self) -> Arc<dyn TaskScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub(crate) fn register(&self, client_id: &ClientId, connection: &Weak<ConnectionInner>) -> Result<()> {
        let mut connections = self.connections.lock();
        if let Some(existing) = connections.get(client_id) {
            if existing.strong_count() > 0 && !existing.ptr_eq(connection) {
                error!(%client_id, "a connection with this client id already exists; disconnect it first");
                return Err(ClientError::AlreadyConnected {
                    client_id: client_id.clone(),
                });
            }
        }
        let _ = connections.insert(client_id.clone(), connection.clone());
        info!(%client_id, live = connections.len(), "connection registered");
        Ok(())
    }

    /// Remove `client_id` if it is registered to `connection`.
    pub(crate) fn unregister(&self, client_id: &ClientId, connection: &Weak<ConnectionInner>) {
        let mut connections = self.connections.lock();
        if connections.get(client_id).is_some_and(|c| c.ptr_eq(connection)) {
            let _ = connections.remove(client_id);
            debug!(%client_id, live = connections.len(), "connection unregistered");
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("settings", &*self.settings.lock())
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConnectionManager`].
pub struct ConnectionManagerBuilder {
    transport: Arc<dyn GatewayTransport>,
    host: Option<Arc<dyn HostEnvironment>>,
    scheduler: Option<Arc<dyn TaskScheduler>>,
    settings: ClientSettings,
}

impl ConnectionManagerBuilder {
    /// Use `host` instead of a headless one.
    #[must_use]
    pub fn host(mut self, host: Arc<dyn HostEnvironment>) -> Self {
        self.host = Some(host);
        self
    }

    /// Use `scheduler` instead of the tokio one.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Initial default settings.
    #[must_use]
    pub fn settings(mut self, settings: ClientSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the manager.
    pub fn build(self) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager {
            transport: self.transport,
            host: self.host.unwrap_or_else(|| Arc::new(HeadlessHost)),
            scheduler: self.scheduler.unwrap_or_else(|| Arc::new(TokioScheduler)),
            settings: Mutex::new(self.settings),
            connections: Mutex::new(HashMap::new()),
            next_client: AtomicU64::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> Arc<ConnectionManager> {
        ConnectionManager::with_reqwest(ClientSettings::default())
    }

    #[test]
    fn generated_ids_are_sequential() {
        let m = manager();
        assert_eq!(m.generate_client_id().as_str(), "sse-client-1");
        assert_eq!(m.generate_client_id().as_str(), "sse-client-2");
    }

    #[test]
    fn configure_patches_defaults() {
        let m = manager();
        m.configure(&SettingsPatch::default().batch_config_delay_ms(0).send_session_id(true));
        let s = m.settings();
        assert_eq!(s.batch_config_delay_ms, 0);
        assert!(s.send_session_id);
    }

    #[test]
    fn connection_snapshots_settings() {
        let m = manager();
        let before = m.connection("a");
        m.configure(&SettingsPatch::default().batch_config_delay_ms(0));
        let after = m.connection("b");
        assert_eq!(before.settings().batch_config_delay_ms, 100);
        assert_eq!(after.settings().batch_config_delay_ms, 0);
    }

    #[test]
    fn connection_without_id_gets_generated_one() {
        let m = manager();
        let c = m.connection(ConnectConfig::new());
        assert!(c.client_id().as_str().starts_with(GENERATED_CLIENT_ID_PREFIX));
    }

    #[test]
    fn unconnected_connection_is_not_registered() {
        let m = manager();
        let c = m.connection("a");
        assert!(!m.is_registered(c.client_id()));
        assert_eq!(m.connection_count(), 0);
        assert!(m.get(c.client_id()).is_none());
    }
}
