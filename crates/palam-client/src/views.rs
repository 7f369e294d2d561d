//! Screen navigation with guaranteed teardown.
//!
//! Each named view owns the subscriptions it registered during its own init;
//! the manager destroys the current view before mounting the next one, so
//! navigating away and back never accumulates listeners.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{ClientError, Result};
use crate::session::{ClientSignal, SharedSession, SignalBus};
use crate::store::SyncStore;

/// Canonical screen names.
pub mod names {
    pub const HOME: &str = "home";
    pub const BROWSERS: &str = "browsers";
    pub const SCREENS: &str = "screens";
    pub const MANAGEMENT: &str = "management";
}

const MSG_VIEW_LOAD_FAILED: &str =
    "S'ha produït un error carregant la vista. Torna a la pantalla d'inici.";

/// Rendering surface the shell provides for the main content region.
#[async_trait]
pub trait ViewHost: Send + Sync {
    /// Fetch the template resource backing a view.
    async fn fetch_template(&self, resource: &str) -> Result<String>;

    /// Inject content into the single main content region.
    fn render(&self, content: &str);

    /// Replace the content region with a generic error screen carrying a
    /// return-to-home affordance.
    fn render_error(&self, message: &str);
}

/// A mounted view. Dropping without `destroy` leaks its subscriptions, so the
/// manager always awaits `destroy` before replacing it.
#[async_trait]
pub trait View: Send + Sync {
    /// Tear down everything the view registered during init.
    async fn destroy(&mut self) -> Result<()>;
}

/// Typed handles a view initializer receives instead of global lookups.
pub struct ViewContext {
    pub store: SyncStore,
    pub session: SharedSession,
    pub signals: SignalBus,
    pub options: Value,
}

/// Async initializer for one view.
///
/// Performs its own `SyncStore::subscribe` calls and returns the mounted
/// view. On error it must dispose any subscriptions it already made; the
/// manager treats a failed init as never mounted.
///
/// Navigation is serialized: the manager holds its navigation lock while the
/// initializer runs, so an initializer must never call
/// [`ViewLifecycleManager::load_view`] itself. Follow-up navigation belongs
/// to the caller, after the load completes.
pub type ViewInitializer =
    Arc<dyn Fn(ViewContext) -> BoxFuture<'static, Result<Box<dyn View>>> + Send + Sync>;

/// Registry entry for one named view.
pub struct ViewSpec {
    /// Template resource handed to [`ViewHost::fetch_template`].
    pub template: String,
    pub init: ViewInitializer,
}

/// Static registry of named views.
#[derive(Default)]
pub struct ViewRegistry {
    entries: HashMap<String, ViewSpec>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, spec: ViewSpec) {
        self.entries.insert(name.into(), spec);
    }

    fn get(&self, name: &str) -> Option<&ViewSpec> {
        self.entries.get(name)
    }
}

struct CurrentView {
    name: String,
    view: Box<dyn View>,
}

/// Swaps screens while guaranteeing the previous one is fully torn down.
pub struct ViewLifecycleManager {
    registry: ViewRegistry,
    host: Arc<dyn ViewHost>,
    store: SyncStore,
    session: SharedSession,
    signals: SignalBus,
    current: Mutex<Option<CurrentView>>,
}

impl ViewLifecycleManager {
    pub fn new(
        registry: ViewRegistry,
        host: Arc<dyn ViewHost>,
        store: SyncStore,
        session: SharedSession,
        signals: SignalBus,
    ) -> Self {
        Self {
            registry,
            host,
            store,
            session,
            signals,
            current: Mutex::new(None),
        }
    }

    /// Name of the currently mounted view, if any.
    pub async fn current_view(&self) -> Option<String> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|current| current.name.clone())
    }

    /// Navigate to a named view.
    ///
    /// The current view is destroyed first; a failing `destroy` is logged and
    /// never blocks navigation. A failed template fetch or initializer leaves
    /// no view mounted and renders the fallback error screen.
    ///
    /// Loads are serialized on an internal lock held for the whole load,
    /// including the template fetch and initializer awaits; calling this from
    /// inside a [`ViewInitializer`] deadlocks.
    pub async fn load_view(&self, name: &str, options: Value) -> Result<()> {
        let mut current = self.current.lock().await;

        if let Some(mut previous) = current.take() {
            if let Err(error) = previous.view.destroy().await {
                warn!("destroy of view {} failed: {error}", previous.name);
            }
        }

        let Some(spec) = self.registry.get(name) else {
            self.host.render_error(MSG_VIEW_LOAD_FAILED);
            return Err(ClientError::View(format!("unknown view: {name}")));
        };

        let template = match self.host.fetch_template(&spec.template).await {
            Ok(template) => template,
            Err(error) => {
                self.host.render_error(MSG_VIEW_LOAD_FAILED);
                return Err(ClientError::View(format!(
                    "template fetch for {name} failed: {error}"
                )));
            }
        };
        self.host.render(&template);

        let context = ViewContext {
            store: self.store.clone(),
            session: self.session.clone(),
            signals: self.signals.clone(),
            options,
        };
        let view = match (spec.init)(context).await {
            Ok(view) => view,
            Err(error) => {
                self.host.render_error(MSG_VIEW_LOAD_FAILED);
                return Err(ClientError::View(format!(
                    "initializer for {name} failed: {error}"
                )));
            }
        };

        *current = Some(CurrentView {
            name: name.to_string(),
            view,
        });
        self.signals.emit(ClientSignal::ViewChanged {
            name: name.to_string(),
        });
        Ok(())
    }
}
