//! Session and realtime-sync core of the PalamMaster admin client.
//!
//! This crate intentionally exposes a small surface:
//! - credential persistence and the authenticated session
//! - the one admin WebSocket and its lifecycle
//! - the synchronized server-state store views subscribe to
//! - view navigation with guaranteed listener teardown

pub mod auth;
pub mod client;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod host;
pub mod session;
pub mod store;
pub mod views;

pub use auth::AuthSessionManager;
pub use client::PalamClient;
pub use connection::{ConnectionConfig, ConnectionManager, SocketHandle};
pub use credentials::{Credentials, PersistedConfig};
pub use error::{ClientError, Result};
pub use host::{HostShell, MemoryHostShell, NullHostShell};
pub use session::{ClientSignal, Session, SharedSession, SignalBus};
pub use store::{EventCallback, StoreState, SubscriptionHandle, SyncStore};
pub use views::{
    View, ViewContext, ViewHost, ViewInitializer, ViewLifecycleManager, ViewRegistry, ViewSpec,
};
