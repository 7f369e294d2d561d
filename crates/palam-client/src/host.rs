//! Host shell collaborator surface.
//!
//! The desktop shell (window bootstrap, menus, auto-update) implements this
//! trait; the core only ever touches the host through it. Every capability is
//! optional: a shell that cannot persist config or open URLs degrades to
//! no-ops, never to a crash.

use std::sync::Mutex;

use serde_json::Value;

use crate::error::Result;

/// Capabilities the core borrows from the embedding shell.
pub trait HostShell: Send + Sync {
    /// Load the persisted client config, `None` when nothing was stored yet.
    fn load_config(&self) -> Result<Option<Value>>;

    /// Persist the client config.
    fn store_config(&self, config: &Value) -> Result<()>;

    /// Shell/application version, when the shell reports one.
    fn version(&self) -> Option<String> {
        None
    }

    /// Forward an error to the shell's log sink. Stack traces go here, never
    /// to the UI.
    fn log_error(&self, _message: &str, _detail: Option<&str>) {}

    /// Open a URL in the system browser.
    fn open_external(&self, _url: &str) {}
}

/// Shell stand-in for environments with no host integration at all.
#[derive(Debug, Default)]
pub struct NullHostShell;

impl HostShell for NullHostShell {
    fn load_config(&self) -> Result<Option<Value>> {
        Ok(None)
    }

    fn store_config(&self, _config: &Value) -> Result<()> {
        Ok(())
    }
}

/// In-memory shell used by tests and headless tooling.
#[derive(Debug, Default)]
pub struct MemoryHostShell {
    config: Mutex<Option<Value>>,
    errors: Mutex<Vec<String>>,
}

impl MemoryHostShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the stored config before handing the shell to the core.
    pub fn with_config(config: Value) -> Self {
        Self {
            config: Mutex::new(Some(config)),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// Errors reported through `log_error`, oldest first.
    pub fn logged_errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl HostShell for MemoryHostShell {
    fn load_config(&self) -> Result<Option<Value>> {
        Ok(self
            .config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    fn store_config(&self, config: &Value) -> Result<()> {
        *self
            .config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(config.clone());
        Ok(())
    }

    fn log_error(&self, message: &str, detail: Option<&str>) {
        let mut errors = self
            .errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match detail {
            Some(detail) => errors.push(format!("{message}: {detail}")),
            None => errors.push(message.to_string()),
        }
    }
}
