//! Login, token reuse, and logout orchestration.
//!
//! A persisted token is trusted without a network round trip; the server has
//! no validation endpoint, so validity is discovered when the socket
//! authenticates. `ready` therefore fires from the connection layer, not
//! from here.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::connection::ConnectionManager;
use crate::credentials::{
    Credentials, insecure_password_cache, load_persisted, store_persisted,
};
use crate::error::{ClientError, Result};
use crate::host::HostShell;
use crate::session::{ClientSignal, SharedSession, SignalBus};
use crate::store::SyncStore;

/// Fixed login path on the admin API.
pub const LOGIN_PATH: &str = "/api/v1/admin/login";

const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

const MSG_INVALID_SERVER_URL: &str = "L'adreça del servidor no és vàlida.";
const MSG_SERVER_UNREACHABLE: &str = "No s'ha pogut contactar amb el servidor.";
const MSG_BAD_CREDENTIALS: &str = "Usuari o contrasenya incorrectes.";
const MSG_NO_TOKEN: &str = "El servidor no ha retornat cap credencial vàlida.";

#[derive(Serialize)]
struct LoginRequest<'a> {
    user: &'a str,
    #[serde(rename = "clauMd5")]
    clau_md5: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(rename = "authToken", default)]
    auth_token: Option<String>,
}

/// Prefix `http://` when no scheme is given and validate the result.
pub fn normalize_server_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ClientError::Auth(MSG_INVALID_SERVER_URL.to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let url =
        Url::parse(&candidate).map_err(|_| ClientError::Auth(MSG_INVALID_SERVER_URL.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ClientError::Auth(MSG_INVALID_SERVER_URL.to_string()));
    }

    Ok(candidate)
}

/// Lowercase 32-hex MD5 digest, as the server expects for `clauMd5`.
pub fn password_digest(password: &str) -> String {
    hex::encode(Md5::digest(password.as_bytes()))
}

/// Orchestrates the session lifecycle around the login endpoint.
pub struct AuthSessionManager {
    http: reqwest::Client,
    host: Arc<dyn HostShell>,
    session: SharedSession,
    store: SyncStore,
    connection: Arc<ConnectionManager>,
    signals: SignalBus,
    login_generation: AtomicU64,
    probe_generation: AtomicU64,
}

impl AuthSessionManager {
    pub fn new(
        host: Arc<dyn HostShell>,
        session: SharedSession,
        store: SyncStore,
        connection: Arc<ConnectionManager>,
        signals: SignalBus,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            host,
            session,
            store,
            connection,
            signals,
            login_generation: AtomicU64::new(0),
            probe_generation: AtomicU64::new(0),
        }
    }

    /// Resume a persisted session, trusting the stored token optimistically.
    ///
    /// Returns whether a stored session was resumed. `Ready` only fires once
    /// the socket confirms; a revoked token surfaces as a transport-level
    /// auth failure instead.
    pub async fn initialize(&self) -> bool {
        let config = load_persisted(self.host.as_ref());
        let Some(credentials) = config.credentials() else {
            debug!("no persisted session to resume");
            return false;
        };
        if credentials.server_url.is_empty() {
            debug!("persisted token without a server url; not resuming");
            return false;
        }

        self.session.authenticate(credentials.clone());
        if let Err(error) = self
            .connection
            .connect(&credentials.server_url, &credentials)
            .await
        {
            // The connection layer already invalidated the session and
            // prompted for re-login.
            warn!("resume connect failed: {error}");
        }
        true
    }

    /// Authenticate against the login endpoint and open the admin socket.
    ///
    /// A newer login supersedes this one; the superseded result is discarded
    /// silently. `remember_password` opts into the insecure form-refill echo.
    pub async fn login(
        &self,
        server_url: &str,
        username: &str,
        password: &str,
        remember_password: bool,
    ) -> Result<()> {
        let generation = self.login_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let server_url = normalize_server_url(server_url).inspect_err(|error| {
            self.signals.emit(ClientSignal::AuthError {
                message: error.to_string(),
            });
        })?;
        let digest = password_digest(password);

        let response = self
            .http
            .post(format!("{server_url}{LOGIN_PATH}"))
            .timeout(LOGIN_TIMEOUT)
            .json(&LoginRequest {
                user: username,
                clau_md5: &digest,
            })
            .send()
            .await;

        if self.login_generation.load(Ordering::SeqCst) != generation {
            debug!("login superseded; discarding result");
            return Ok(());
        }

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                self.host
                    .log_error("login request failed", Some(&error.to_string()));
                return Err(self.auth_failure(MSG_SERVER_UNREACHABLE));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let message = if status.as_u16() == 401 || status.as_u16() == 403 {
                MSG_BAD_CREDENTIALS.to_string()
            } else {
                format!("Error del servidor ({})", status.as_u16())
            };
            return Err(self.auth_failure(&message));
        }

        let token = match response.json::<LoginResponse>().await {
            Ok(LoginResponse {
                auth_token: Some(token),
            }) if !token.is_empty() => token,
            Ok(_) => return Err(self.auth_failure(MSG_NO_TOKEN)),
            Err(error) => {
                self.host
                    .log_error("login response unreadable", Some(&error.to_string()));
                return Err(self.auth_failure(MSG_NO_TOKEN));
            }
        };

        // The body decode is a second suspension point; a newer login may
        // have completed while this one was still reading. Re-check before
        // touching the session so the stale attempt never wins.
        if self.login_generation.load(Ordering::SeqCst) != generation {
            debug!("login superseded during response decode; discarding result");
            return Ok(());
        }

        let credentials = Credentials {
            server_url: server_url.clone(),
            username: username.to_string(),
            token,
        };
        self.session.authenticate(credentials.clone());
        self.persist_login(&credentials, remember_password.then(|| password));

        if let Err(error) = self.connection.connect(&server_url, &credentials).await {
            // Authentication itself succeeded; connectivity problems surface
            // through the connection layer's signals.
            warn!("post-login connect failed: {error}");
        }
        Ok(())
    }

    /// Reachability probe with empty credentials.
    ///
    /// Any HTTP response, even a 401, proves the server reachable. Returns
    /// `None` when a newer probe superseded this one. Never mutates the
    /// session.
    pub async fn test_connection(&self, server_url: &str) -> Option<bool> {
        let generation = self.probe_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let Ok(server_url) = normalize_server_url(server_url) else {
            return Some(false);
        };

        let response = self
            .http
            .post(format!("{server_url}{LOGIN_PATH}"))
            .timeout(LOGIN_TIMEOUT)
            .json(&LoginRequest {
                user: "",
                clau_md5: "",
            })
            .send()
            .await;

        if self.probe_generation.load(Ordering::SeqCst) != generation {
            debug!("connection probe superseded; discarding result");
            return None;
        }

        Some(response.is_ok())
    }

    /// Clear the session and every persisted secret, then tear the socket
    /// down voluntarily.
    pub async fn logout(&self) {
        self.session.clear();
        self.store.clear();

        let mut config = load_persisted(self.host.as_ref());
        config.strip_secrets();
        if let Err(error) = store_persisted(self.host.as_ref(), &config) {
            warn!("failed to strip persisted secrets: {error}");
        }

        self.connection.disconnect().await;
        self.signals.emit(ClientSignal::LoggedOut);
    }

    fn persist_login(&self, credentials: &Credentials, remembered_password: Option<&str>) {
        let mut config = load_persisted(self.host.as_ref());
        config.server.url = credentials.server_url.clone();
        config.authentication.username = credentials.username.clone();
        config.authentication.token = credentials.token.clone();
        config.authentication.password_enc =
            remembered_password.map(insecure_password_cache::encode);

        if let Err(error) = store_persisted(self.host.as_ref(), &config) {
            // Config trouble is never fatal; the session stays live.
            warn!("failed to persist login: {error}");
        }
    }

    fn auth_failure(&self, message: &str) -> ClientError {
        self.signals.emit(ClientSignal::AuthError {
            message: message.to_string(),
        });
        ClientError::Auth(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionConfig;
    use crate::credentials::PersistedConfig;
    use crate::host::MemoryHostShell;
    use serde_json::json;

    fn manager_with_host(host: Arc<MemoryHostShell>) -> AuthSessionManager {
        let session = SharedSession::new();
        let store = SyncStore::new();
        let signals = SignalBus::new();
        let connection = Arc::new(ConnectionManager::new(
            ConnectionConfig::default(),
            session.clone(),
            store.clone(),
            signals.clone(),
        ));
        AuthSessionManager::new(host, session, store, connection, signals)
    }

    #[test]
    fn normalize_server_url_prefixes_http() {
        struct Case {
            input: &'static str,
            expected: std::result::Result<&'static str, ()>,
        }

        let cases = vec![
            Case {
                input: "filtre.escola.cat",
                expected: Ok("http://filtre.escola.cat"),
            },
            Case {
                input: " filtre.escola.cat:8080/ ",
                expected: Ok("http://filtre.escola.cat:8080"),
            },
            Case {
                input: "https://filtre.escola.cat/",
                expected: Ok("https://filtre.escola.cat"),
            },
            Case {
                input: "",
                expected: Err(()),
            },
            Case {
                input: "ftp://filtre.escola.cat",
                expected: Err(()),
            },
        ];

        for case in cases {
            let actual = normalize_server_url(case.input);
            match case.expected {
                Ok(expected) => {
                    assert_eq!(actual.expect("valid url"), expected, "input: {}", case.input);
                }
                Err(()) => assert!(actual.is_err(), "input: {}", case.input),
            }
        }
    }

    #[test]
    fn password_digest_matches_server_expectation() {
        // Well-known MD5 test vectors.
        assert_eq!(
            password_digest("secret"),
            "5ebe2294ecd0e0f08eab7690d2a6ee69"
        );
        assert_eq!(password_digest(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[tokio::test]
    async fn initialize_without_persisted_token_stays_unauthenticated() {
        let host = Arc::new(MemoryHostShell::new());
        let manager = manager_with_host(Arc::clone(&host));

        assert!(!manager.initialize().await);
        assert!(!manager.session.is_authenticated());
    }

    #[tokio::test]
    async fn logout_strips_secrets_and_clears_everything() {
        let host = Arc::new(MemoryHostShell::with_config(json!({
            "server": {"url": "http://filtre.escola.cat"},
            "authentication": {
                "username": "admin",
                "token": "abc123",
                "password_enc": "c2VjcmV0"
            }
        })));
        let manager = manager_with_host(Arc::clone(&host));
        manager.session.authenticate(Credentials {
            server_url: "http://filtre.escola.cat".to_string(),
            username: "admin".to_string(),
            token: "abc123".to_string(),
        });
        let mut signals = manager.signals.subscribe();

        manager.logout().await;

        assert!(!manager.session.is_authenticated());
        assert_eq!(signals.recv().await, Ok(ClientSignal::LoggedOut));

        let stored: PersistedConfig = serde_json::from_value(
            host.load_config().expect("config readable").expect("config present"),
        )
        .expect("config deserializable");
        assert_eq!(stored.authentication.username, "admin");
        assert!(stored.authentication.token.is_empty());
        assert!(stored.authentication.password_enc.is_none());
    }

    #[tokio::test]
    async fn probe_rejects_invalid_urls_without_network() {
        let host = Arc::new(MemoryHostShell::new());
        let manager = manager_with_host(host);
        assert_eq!(manager.test_connection("").await, Some(false));
    }
}
