//! Top-level wiring.
//!
//! One [`PalamClient`] exists per process. It owns the single session, store,
//! connection manager and auth manager, and hands out shared handles so the
//! embedding shell never reaches for globals.

use std::sync::Arc;

use crate::auth::AuthSessionManager;
use crate::connection::{ConnectionConfig, ConnectionManager};
use crate::host::HostShell;
use crate::session::{SharedSession, SignalBus};
use crate::store::SyncStore;
use crate::views::{ViewHost, ViewLifecycleManager, ViewRegistry};

/// The assembled admin client.
pub struct PalamClient {
    session: SharedSession,
    store: SyncStore,
    signals: SignalBus,
    connection: Arc<ConnectionManager>,
    auth: Arc<AuthSessionManager>,
    views: Arc<ViewLifecycleManager>,
}

impl PalamClient {
    pub fn new(
        host: Arc<dyn HostShell>,
        view_host: Arc<dyn ViewHost>,
        registry: ViewRegistry,
    ) -> Self {
        Self::with_config(host, view_host, registry, ConnectionConfig::default())
    }

    pub fn with_config(
        host: Arc<dyn HostShell>,
        view_host: Arc<dyn ViewHost>,
        registry: ViewRegistry,
        config: ConnectionConfig,
    ) -> Self {
        let session = SharedSession::new();
        let store = SyncStore::new();
        let signals = SignalBus::new();

        let connection = Arc::new(ConnectionManager::new(
            config,
            session.clone(),
            store.clone(),
            signals.clone(),
        ));
        let auth = Arc::new(AuthSessionManager::new(
            host,
            session.clone(),
            store.clone(),
            Arc::clone(&connection),
            signals.clone(),
        ));
        let views = Arc::new(ViewLifecycleManager::new(
            registry,
            view_host,
            store.clone(),
            session.clone(),
            signals.clone(),
        ));

        Self {
            session,
            store,
            signals,
            connection,
            auth,
            views,
        }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn store(&self) -> &SyncStore {
        &self.store
    }

    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn auth(&self) -> &Arc<AuthSessionManager> {
        &self.auth
    }

    pub fn views(&self) -> &Arc<ViewLifecycleManager> {
        &self.views
    }
}
