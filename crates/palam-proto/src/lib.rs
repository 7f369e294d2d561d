//! Wire protocol for the PalamMaster admin channel.
//!
//! This crate intentionally exposes a small surface:
//! - typed payloads for the server-pushed state slices
//! - the JSON array envelope used on the WebSocket text frames
//! - a tolerant parser that drops unknown event kinds

pub mod envelope;
pub mod error;
pub mod events;

pub use envelope::{encode_client_event, parse_admin_event};
pub use error::{ProtoError, Result};
pub use events::{
    ActivityMap, AdminEvent, AdminEventKind, BrowserLastUsage, BrowserTab, ClientEvent,
    GroupRoster, HistoryEntry, HostUsage, MachineMap, MachineStatus, RuleAction, RuleScope,
    SortedHosts, StudentActivity, StudentHistory, TimeWindow, WebRule,
};
