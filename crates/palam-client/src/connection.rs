//! Single-socket connection manager for the admin channel.
//!
//! Owns the one live WebSocket: creation, teardown, reconnect on credential
//! change, and translation of transport failures into session signals. The
//! admin channel lives on a fixed `/ws/admin` path, distinct from the cast
//! namespace used by screen sharing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use palam_proto::{ClientEvent, encode_client_event};

use crate::credentials::Credentials;
use crate::error::{ClientError, Result};
use crate::session::{ClientSignal, SharedSession, SignalBus};
use crate::store::SyncStore;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Logical path of the admin channel.
pub const ADMIN_CHANNEL_PATH: &str = "/ws/admin";

/// User-facing message when the server rejects the token.
pub const AUTH_FAILURE_MESSAGE: &str =
    "Sessió caducada: autenticació fallida. Torna a iniciar la sessió.";

/// User-facing message for every other transport failure.
pub const CONNECTIVITY_MESSAGE: &str =
    "S'ha perdut la connexió amb el servidor. Torna a iniciar la sessió.";

/// Free-text heuristic for authentication failures.
///
/// The server reports auth rejections as message text, not structured codes;
/// this match is fragile and language-specific by inheritance.
pub fn is_auth_failure(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("auth") || (lowered.contains("autenticació") && lowered.contains("fallida"))
}

/// Tunables for the connection lifecycle.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bound on one connect attempt; expiry surfaces as a connect error.
    pub connect_timeout: Duration,
    /// Grace period before re-requesting the initial resync when no roster
    /// data has arrived (guards against the resync racing the attach).
    pub resync_grace: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            resync_grace: Duration::from_millis(800),
        }
    }
}

/// Cloneable handle to the live socket, the single source of truth for
/// outbound emission.
#[derive(Clone)]
pub struct SocketHandle {
    id: Uuid,
    outbound: mpsc::UnboundedSender<ClientEvent>,
}

impl SocketHandle {
    pub(crate) fn new(id: Uuid, outbound: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self { id, outbound }
    }

    /// Identity of the underlying socket; used for same-socket no-op checks.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue an outbound event. Returns whether the socket still accepts it.
    pub fn emit(&self, event: &ClientEvent) -> bool {
        self.outbound.send(event.clone()).is_ok()
    }
}

struct ActiveSocket {
    id: Uuid,
    handle: SocketHandle,
    voluntary: Arc<AtomicBool>,
    writer: Arc<Mutex<WsWriter>>,
    send_task: JoinHandle<()>,
    recv_task: JoinHandle<()>,
}

/// Owner of the single live socket.
pub struct ConnectionManager {
    config: ConnectionConfig,
    session: SharedSession,
    store: SyncStore,
    signals: SignalBus,
    pending: AtomicBool,
    current: Mutex<Option<ActiveSocket>>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        session: SharedSession,
        store: SyncStore,
        signals: SignalBus,
    ) -> Self {
        Self {
            config,
            session,
            store,
            signals,
            pending: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }

    /// Whether a socket is currently held.
    pub async fn is_connected(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Open the one admin socket.
    ///
    /// A pending attempt makes this a no-op; otherwise the existing socket is
    /// torn down first, so two immediate calls still end with one live socket.
    pub async fn connect(&self, server_url: &str, credentials: &Credentials) -> Result<()> {
        if !credentials.can_connect() {
            return Err(ClientError::Transport(
                "refusing to connect without a token".to_string(),
            ));
        }

        if self.pending.swap(true, Ordering::SeqCst) {
            debug!("connect ignored: another attempt is pending");
            return Ok(());
        }

        let result = self.connect_inner(server_url, credentials).await;
        self.pending.store(false, Ordering::SeqCst);

        if let Err(error) = &result {
            self.fail_session(&error.to_string());
        }
        result
    }

    /// Reconnect with fresh credentials. Ignored while unauthenticated.
    pub async fn update_credentials(
        &self,
        server_url: &str,
        credentials: &Credentials,
    ) -> Result<()> {
        if !self.session.is_authenticated() {
            debug!("credential update ignored: session not authenticated");
            return Ok(());
        }
        self.connect(server_url, credentials).await
    }

    /// Client-initiated teardown; never prompts for re-login.
    pub async fn disconnect(&self) {
        let active = self.current.lock().await.take();
        if let Some(active) = active {
            self.teardown(active).await;
        }
    }

    async fn connect_inner(&self, server_url: &str, credentials: &Credentials) -> Result<()> {
        // Best-effort teardown of whatever socket is still around.
        let previous = self.current.lock().await.take();
        if let Some(previous) = previous {
            self.teardown(previous).await;
        }

        let url = admin_socket_url(server_url, credentials)?;
        debug!("connecting admin socket to {}", url.host_str().unwrap_or("?"));

        let (stream, _response) = timeout(self.config.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                ClientError::Timeout(format!(
                    "connection timeout after {:?}",
                    self.config.connect_timeout
                ))
            })?
            .map_err(|error| ClientError::WebSocket(error.to_string()))?;

        let (writer, reader) = stream.split();
        let writer = Arc::new(Mutex::new(writer));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let id = Uuid::new_v4();
        let handle = SocketHandle::new(id, outbound_tx);
        let voluntary = Arc::new(AtomicBool::new(false));

        let send_task = tokio::spawn(run_send_loop(Arc::clone(&writer), outbound_rx));
        let recv_task = tokio::spawn(run_recv_loop(
            reader,
            id,
            Arc::clone(&voluntary),
            self.store.clone(),
            self.session.clone(),
            self.signals.clone(),
        ));

        self.store.attach(handle.clone());
        *self.current.lock().await = Some(ActiveSocket {
            id,
            handle,
            voluntary,
            writer,
            send_task,
            recv_task,
        });

        self.store.request_initial_data("connect");
        self.signals.emit(ClientSignal::Ready);

        // The resync request can race the attach on the server side; ask
        // again after a grace period if no roster arrived on THIS socket. A
        // stale roster from a previous connection must not suppress the
        // retry, so the check compares epochs rather than presence.
        let store = self.store.clone();
        let grace = self.config.resync_grace;
        let epoch_at_connect = store.roster_epoch();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if store.roster_epoch() == epoch_at_connect {
                store.request_initial_data("resync-grace");
            }
        });

        Ok(())
    }

    async fn teardown(&self, active: ActiveSocket) {
        active.voluntary.store(true, Ordering::SeqCst);

        let close_result = {
            let mut writer = active.writer.lock().await;
            writer.send(Message::Close(None)).await
        };
        if let Err(error) = close_result {
            debug!("close frame failed during teardown: {error}");
        }

        active.send_task.abort();
        active.recv_task.abort();
        self.store.detach(active.id);
        drop(active.handle);
    }

    /// A dead or rejected socket invalidates the session either way; the
    /// message tells the user which case they are in.
    fn fail_session(&self, error_text: &str) {
        let message = if is_auth_failure(error_text) {
            AUTH_FAILURE_MESSAGE
        } else {
            CONNECTIVITY_MESSAGE
        };
        self.session.invalidate();
        self.signals.emit(ClientSignal::LoginRequired {
            message: message.to_string(),
        });
    }
}

/// Build the admin-channel URL with connect-time identity parameters.
fn admin_socket_url(server_url: &str, credentials: &Credentials) -> Result<Url> {
    let mut url =
        Url::parse(server_url).map_err(|error| ClientError::InvalidUrl(error.to_string()))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme: {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ClientError::InvalidUrl("scheme rejected".to_string()))?;
    url.set_path(ADMIN_CHANNEL_PATH);
    url.query_pairs_mut()
        .clear()
        .append_pair("user", &credentials.username)
        .append_pair("authToken", &credentials.token);

    Ok(url)
}

async fn run_send_loop(
    writer: Arc<Mutex<WsWriter>>,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientEvent>,
) {
    while let Some(event) = outbound_rx.recv().await {
        let text = encode_client_event(&event);
        let result = {
            let mut writer = writer.lock().await;
            writer.send(Message::Text(text.into())).await
        };
        if let Err(error) = result {
            warn!("outbound send failed, stopping send loop: {error}");
            break;
        }
    }
}

async fn run_recv_loop(
    mut reader: futures_util::stream::SplitStream<WsStream>,
    socket_id: Uuid,
    voluntary: Arc<AtomicBool>,
    store: SyncStore,
    session: SharedSession,
    signals: SignalBus,
) {
    let mut failure_text = String::new();

    while let Some(frame) = reader.next().await {
        match frame {
            Ok(Message::Text(text)) => store.ingest_text(text.as_ref()),
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_)) => {}
            Ok(Message::Close(close_frame)) => {
                if let Some(frame) = close_frame {
                    failure_text = frame.reason.to_string();
                }
                break;
            }
            Err(error) => {
                failure_text = error.to_string();
                break;
            }
        }
    }

    store.detach(socket_id);

    // Explicit client-initiated teardown; nothing further to do.
    if voluntary.load(Ordering::SeqCst) {
        return;
    }

    // Server-initiated or transport-level: a fatal session event. This is
    // also the only path that proves an optimistically trusted token bad.
    let message = if is_auth_failure(&failure_text) {
        AUTH_FAILURE_MESSAGE
    } else {
        CONNECTIVITY_MESSAGE
    };
    warn!("admin socket lost: {}", if failure_text.is_empty() { "stream ended" } else { &failure_text });
    session.invalidate();
    signals.emit(ClientSignal::LoginRequired {
        message: message.to_string(),
    });
}
