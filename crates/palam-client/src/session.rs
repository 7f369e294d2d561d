//! Process-wide session state and lifecycle signals.

use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use crate::credentials::Credentials;

/// Exactly one session exists per process, owned by the client container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub authenticated: bool,
    pub credentials: Option<Credentials>,
}

/// Shared handle to the one session.
#[derive(Clone, Default)]
pub struct SharedSession {
    inner: Arc<RwLock<Session>>,
}

impl SharedSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current session.
    pub fn snapshot(&self) -> Session {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot().authenticated
    }

    /// Mark the session authenticated with the given credentials.
    pub fn authenticate(&self, credentials: Credentials) {
        let mut session = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        session.authenticated = true;
        session.credentials = Some(credentials);
    }

    /// Drop authentication and the token. The username survives inside the
    /// credentials so the login form can pre-fill.
    pub fn invalidate(&self) {
        let mut session = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        session.authenticated = false;
        if let Some(credentials) = session.credentials.as_mut() {
            credentials.token.clear();
        }
    }

    /// Full reset, used on logout.
    pub fn clear(&self) {
        let mut session = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *session = Session::default();
    }
}

/// Lifecycle notifications fanned out to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientSignal {
    /// The socket confirmed the connection; the session is genuinely live.
    Ready,
    /// Explicit logout completed.
    LoggedOut,
    /// Login failed with a user-facing reason. No retry is scheduled.
    AuthError { message: String },
    /// The session died underneath us; the UI must re-prompt for credentials.
    LoginRequired { message: String },
    /// Navigation finished; a new view is current.
    ViewChanged { name: String },
}

/// Broadcast bus for [`ClientSignal`].
#[derive(Clone)]
pub struct SignalBus {
    sender: broadcast::Sender<ClientSignal>,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientSignal> {
        self.sender.subscribe()
    }

    /// Emit a signal. Having no listeners is not an error.
    pub fn emit(&self, signal: ClientSignal) {
        let _ = self.sender.send(signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            server_url: "http://filtre.escola.cat".to_string(),
            username: "admin".to_string(),
            token: "abc123".to_string(),
        }
    }

    #[test]
    fn authenticate_then_invalidate_clears_token_only() {
        let session = SharedSession::new();
        session.authenticate(credentials());
        assert!(session.is_authenticated());

        session.invalidate();
        let snapshot = session.snapshot();
        assert!(!snapshot.authenticated);
        let remaining = snapshot.credentials.expect("credentials survive");
        assert_eq!(remaining.username, "admin");
        assert!(remaining.token.is_empty());
        assert!(!remaining.can_connect());
    }

    #[test]
    fn clear_resets_everything() {
        let session = SharedSession::new();
        session.authenticate(credentials());
        session.clear();
        assert_eq!(session.snapshot(), Session::default());
    }

    #[tokio::test]
    async fn signals_reach_subscribers() {
        let bus = SignalBus::new();
        let mut receiver = bus.subscribe();
        bus.emit(ClientSignal::Ready);
        assert_eq!(receiver.recv().await, Ok(ClientSignal::Ready));
    }

    #[test]
    fn emitting_without_subscribers_is_fine() {
        SignalBus::new().emit(ClientSignal::LoggedOut);
    }
}
