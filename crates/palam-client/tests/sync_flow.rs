//! End-to-end socket lifecycle against a local WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use palam_client::connection::{AUTH_FAILURE_MESSAGE, CONNECTIVITY_MESSAGE};
use palam_client::{
    ClientSignal, ConnectionConfig, ConnectionManager, Credentials, SharedSession, SignalBus,
    SyncStore,
};

struct Fixture {
    session: SharedSession,
    store: SyncStore,
    signals: SignalBus,
    manager: Arc<ConnectionManager>,
}

fn fixture() -> Fixture {
    let session = SharedSession::new();
    let store = SyncStore::new();
    let signals = SignalBus::new();
    let manager = Arc::new(ConnectionManager::new(
        ConnectionConfig {
            connect_timeout: Duration::from_secs(5),
            resync_grace: Duration::from_millis(100),
        },
        session.clone(),
        store.clone(),
        signals.clone(),
    ));
    Fixture {
        session,
        store,
        signals,
        manager,
    }
}

fn credentials_for(addr: SocketAddr) -> Credentials {
    Credentials {
        server_url: format!("http://{addr}"),
        username: "admin".to_string(),
        token: "tok-integration".to_string(),
    }
}

async fn wait_until(limit: Duration, predicate: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    predicate()
}

/// Accepts connections forever; answers `getInitialData` with a roster push
/// and a machine delta, then stays open until the client hangs up.
async fn serve_initial_data(listener: TcpListener, open_sockets: Arc<AtomicUsize>) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let open_sockets = Arc::clone(&open_sockets);
        tokio::spawn(async move {
            // Nagle + delayed ACK on loopback holds the second push back ~40ms,
            // which outlives the 20ms polling in `wait_until`.
            let _ = stream.set_nodelay(true);
            let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            open_sockets.fetch_add(1, Ordering::SeqCst);
            while let Some(Ok(message)) = socket.next().await {
                match message {
                    Message::Text(text) if text.contains("getInitialData") => {
                        let _ = socket
                            .send(Message::Text(
                                r#"["grupAlumnesList", {"1ESO": ["anna", "pau"]}]"#.into(),
                            ))
                            .await;
                        let _ = socket
                            .send(Message::Text(
                                r#"["updateAlumnesMachine", {"anna": {"ip": "10.0.0.7", "online": true}}]"#.into(),
                            ))
                            .await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            open_sockets.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

#[tokio::test]
async fn connect_requests_resync_and_populates_slices() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(serve_initial_data(listener, Arc::new(AtomicUsize::new(0))));

    let fixture = fixture();
    let mut signals = fixture.signals.subscribe();
    let credentials = credentials_for(addr);

    fixture
        .manager
        .connect(&credentials.server_url, &credentials)
        .await
        .expect("connect");

    let ready = tokio::time::timeout(Duration::from_secs(2), signals.recv())
        .await
        .expect("signal before timeout");
    assert_eq!(ready, Ok(ClientSignal::Ready));

    let store = fixture.store.clone();
    assert!(
        wait_until(Duration::from_secs(2), move || store.has_roster()).await,
        "roster push applied"
    );

    let state = fixture.store.snapshot();
    let roster = state.group_roster.expect("roster");
    assert_eq!(roster["1ESO"], vec!["anna".to_string(), "pau".to_string()]);
    assert!(state.machine_status["anna"].online);
    assert_eq!(state.machine_status["anna"].ip.as_deref(), Some("10.0.0.7"));

    fixture.manager.disconnect().await;
}

#[tokio::test]
async fn server_close_with_auth_reason_forces_relogin() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        // Swallow the resync request, then kick the client out.
        let _ = socket.next().await;
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "autenticació fallida".into(),
            })))
            .await;
    });

    let fixture = fixture();
    let credentials = credentials_for(addr);
    fixture.session.authenticate(credentials.clone());
    let mut signals = fixture.signals.subscribe();

    fixture
        .manager
        .connect(&credentials.server_url, &credentials)
        .await
        .expect("connect");

    assert_eq!(
        tokio::time::timeout(Duration::from_secs(2), signals.recv())
            .await
            .expect("ready before timeout"),
        Ok(ClientSignal::Ready)
    );
    let login_required = tokio::time::timeout(Duration::from_secs(2), signals.recv())
        .await
        .expect("login prompt before timeout")
        .expect("signal");
    assert_eq!(
        login_required,
        ClientSignal::LoginRequired {
            message: AUTH_FAILURE_MESSAGE.to_string()
        }
    );

    let session = fixture.session.clone();
    assert!(
        wait_until(Duration::from_secs(1), move || !session.is_authenticated()).await,
        "session invalidated"
    );
    let remaining = fixture.session.snapshot().credentials.expect("credentials");
    assert!(remaining.token.is_empty(), "token cleared");
    assert_eq!(remaining.username, "admin", "username survives for the form");
}

#[tokio::test]
async fn abrupt_server_loss_reports_connectivity_not_auth() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        let _ = socket.next().await;
        // Drop the TCP stream without a close handshake.
        drop(socket);
    });

    let fixture = fixture();
    let credentials = credentials_for(addr);
    fixture.session.authenticate(credentials.clone());
    let mut signals = fixture.signals.subscribe();

    fixture
        .manager
        .connect(&credentials.server_url, &credentials)
        .await
        .expect("connect");

    assert_eq!(
        tokio::time::timeout(Duration::from_secs(2), signals.recv())
            .await
            .expect("ready before timeout"),
        Ok(ClientSignal::Ready)
    );
    let signal = tokio::time::timeout(Duration::from_secs(2), signals.recv())
        .await
        .expect("signal before timeout")
        .expect("signal");
    assert_eq!(
        signal,
        ClientSignal::LoginRequired {
            message: CONNECTIVITY_MESSAGE.to_string()
        }
    );
}

#[tokio::test]
async fn voluntary_disconnect_is_silent() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(serve_initial_data(listener, Arc::new(AtomicUsize::new(0))));

    let fixture = fixture();
    let credentials = credentials_for(addr);
    fixture.session.authenticate(credentials.clone());
    let mut signals = fixture.signals.subscribe();

    fixture
        .manager
        .connect(&credentials.server_url, &credentials)
        .await
        .expect("connect");
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(2), signals.recv())
            .await
            .expect("ready before timeout"),
        Ok(ClientSignal::Ready)
    );

    fixture.manager.disconnect().await;
    assert!(!fixture.manager.is_connected().await);

    // No re-login prompt and no deauthentication on a client-initiated close.
    let quiet = tokio::time::timeout(Duration::from_millis(300), signals.recv()).await;
    assert!(quiet.is_err(), "no signal after voluntary disconnect");
    assert!(fixture.session.is_authenticated());
}

#[tokio::test]
async fn grace_resync_fires_despite_a_stale_roster_from_the_old_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let second_socket_requests = Arc::new(AtomicUsize::new(0));

    // First session answers the resync with a roster; later sessions stay
    // silent and only count the requests they receive.
    let counter = Arc::clone(&second_socket_requests);
    tokio::spawn(async move {
        let mut session_index = 0usize;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            session_index += 1;
            let first_session = session_index == 1;
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = socket.next().await {
                    match message {
                        Message::Text(text) if text.contains("getInitialData") => {
                            if first_session {
                                let _ = socket
                                    .send(Message::Text(
                                        r#"["grupAlumnesList", {"1ESO": ["anna"]}]"#.into(),
                                    ))
                                    .await;
                            } else {
                                counter.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            });
        }
    });

    let fixture = fixture();
    let credentials = credentials_for(addr);
    fixture.session.authenticate(credentials.clone());

    fixture
        .manager
        .connect(&credentials.server_url, &credentials)
        .await
        .expect("first connect");
    let store = fixture.store.clone();
    assert!(
        wait_until(Duration::from_secs(2), move || store.has_roster()).await,
        "first session delivered the roster"
    );

    // Mid-session reconnect: the store still holds the old roster, but the
    // new socket has delivered nothing, so the grace retry must still fire.
    fixture
        .manager
        .update_credentials(&credentials.server_url, &credentials)
        .await
        .expect("reconnect");

    let counter = Arc::clone(&second_socket_requests);
    assert!(
        wait_until(Duration::from_secs(2), move || {
            counter.load(Ordering::SeqCst) >= 2
        })
        .await,
        "expected the initial request plus the grace retry, saw {}",
        second_socket_requests.load(Ordering::SeqCst)
    );

    fixture.manager.disconnect().await;
}

#[tokio::test]
async fn repeated_connects_end_with_one_live_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let open_sockets = Arc::new(AtomicUsize::new(0));
    tokio::spawn(serve_initial_data(listener, Arc::clone(&open_sockets)));

    let fixture = fixture();
    let credentials = credentials_for(addr);
    fixture.session.authenticate(credentials.clone());

    for _ in 0..3 {
        fixture
            .manager
            .update_credentials(&credentials.server_url, &credentials)
            .await
            .expect("reconnect");
    }

    assert!(fixture.manager.is_connected().await);
    let counter = Arc::clone(&open_sockets);
    assert!(
        wait_until(Duration::from_secs(2), move || {
            counter.load(Ordering::SeqCst) == 1
        })
        .await,
        "exactly one socket stays open, saw {}",
        open_sockets.load(Ordering::SeqCst)
    );

    fixture.manager.disconnect().await;
}
