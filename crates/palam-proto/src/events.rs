//! Typed payloads for the admin channel.
//!
//! Field names follow the wire protocol spoken by the filtering server, which
//! uses Catalan identifiers (alumne = student, grup = group, norma = rule).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Group name to student roster mapping. Replaced wholesale on each push.
pub type GroupRoster = BTreeMap<String, Vec<String>>;

/// Per-student live activity snapshot. Replaced wholesale on each push.
pub type ActivityMap = BTreeMap<String, StudentActivity>;

/// Per-student machine status. `alumnesMachine` replaces the whole map,
/// `updateAlumnesMachine` merges key by key.
pub type MachineMap = BTreeMap<String, MachineStatus>;

/// One open browser tab as reported by a student endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserTab {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub incognito: bool,
}

/// Live browser state for a single student.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentActivity {
    #[serde(default)]
    pub tabs: Vec<BrowserTab>,
    /// Name of the browser the snapshot came from, when the endpoint reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
}

/// Whether a rule blocks or allows the matched hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Block,
    Allow,
}

/// What a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    Alumne(String),
    Grup(String),
}

/// Optional weekly time window restricting when a rule is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    /// Days of week, 0 = Monday through 6 = Sunday.
    pub days: Vec<u8>,
    /// Minutes from midnight, inclusive.
    pub start_minute: u16,
    /// Minutes from midnight, exclusive.
    pub end_minute: u16,
}

/// A web filtering rule ("norma").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebRule {
    pub id: String,
    pub action: RuleAction,
    pub scope: RuleScope,
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<TimeWindow>,
}

/// One browsing history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub host: String,
    #[serde(default)]
    pub title: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
}

/// History fragment for one student, scoped to the query that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentHistory {
    pub alumne: String,
    pub historial: Vec<HistoryEntry>,
    #[serde(default)]
    pub query: String,
}

/// Last-usage timestamps per browser for one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserLastUsage {
    pub alumne: String,
    pub last_usage: BTreeMap<String, i64>,
}

/// Aggregated usage for a single host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostUsage {
    pub host: String,
    pub visits: u64,
}

/// Hosts sorted by usage for one student over a day range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortedHosts {
    pub alumne: String,
    pub sorted_historial: Vec<HostUsage>,
    pub days: u32,
}

/// Machine/IP status for one student endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default)]
    pub online: bool,
}

/// Inbound event kinds, keyed by their wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdminEventKind {
    GroupRoster,
    StudentActivity,
    WebRules,
    StudentHistory,
    BrowserLastUsage,
    SortedHosts,
    MachineStatus,
    MachineStatusDelta,
}

impl AdminEventKind {
    /// All inbound kinds, in no particular order.
    pub const ALL: [AdminEventKind; 8] = [
        AdminEventKind::GroupRoster,
        AdminEventKind::StudentActivity,
        AdminEventKind::WebRules,
        AdminEventKind::StudentHistory,
        AdminEventKind::BrowserLastUsage,
        AdminEventKind::SortedHosts,
        AdminEventKind::MachineStatus,
        AdminEventKind::MachineStatusDelta,
    ];

    /// Wire name of the event.
    pub fn wire_name(self) -> &'static str {
        match self {
            AdminEventKind::GroupRoster => "grupAlumnesList",
            AdminEventKind::StudentActivity => "alumnesActivity",
            AdminEventKind::WebRules => "normesWeb",
            AdminEventKind::StudentHistory => "historialWebAlumne",
            AdminEventKind::BrowserLastUsage => "eachBrowserLastUsage",
            AdminEventKind::SortedHosts => "historialHostsSortedByUsage",
            AdminEventKind::MachineStatus => "alumnesMachine",
            AdminEventKind::MachineStatusDelta => "updateAlumnesMachine",
        }
    }

    /// Look up a kind by wire name. Unknown names map to `None`.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.wire_name() == name)
    }
}

/// A fully parsed inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminEvent {
    GroupRoster(GroupRoster),
    StudentActivity(ActivityMap),
    WebRules(Vec<WebRule>),
    StudentHistory(StudentHistory),
    BrowserLastUsage(BrowserLastUsage),
    SortedHosts(SortedHosts),
    MachineStatus(MachineMap),
    MachineStatusDelta(MachineMap),
}

impl AdminEvent {
    /// Kind of this event.
    pub fn kind(&self) -> AdminEventKind {
        match self {
            AdminEvent::GroupRoster(_) => AdminEventKind::GroupRoster,
            AdminEvent::StudentActivity(_) => AdminEventKind::StudentActivity,
            AdminEvent::WebRules(_) => AdminEventKind::WebRules,
            AdminEvent::StudentHistory(_) => AdminEventKind::StudentHistory,
            AdminEvent::BrowserLastUsage(_) => AdminEventKind::BrowserLastUsage,
            AdminEvent::SortedHosts(_) => AdminEventKind::SortedHosts,
            AdminEvent::MachineStatus(_) => AdminEventKind::MachineStatus,
            AdminEvent::MachineStatusDelta(_) => AdminEventKind::MachineStatusDelta,
        }
    }
}

/// Outbound events emitted by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Request a full push of every server-held state slice.
    GetInitialData,
}

impl ClientEvent {
    /// Wire name of the event.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ClientEvent::GetInitialData => "getInitialData",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for kind in AdminEventKind::ALL {
            assert_eq!(AdminEventKind::from_wire_name(kind.wire_name()), Some(kind));
        }
        assert_eq!(AdminEventKind::from_wire_name("castFrame"), None);
    }

    #[test]
    fn student_history_uses_wire_field_names() {
        let history = StudentHistory {
            alumne: "joan".to_string(),
            historial: vec![HistoryEntry {
                host: "example.com".to_string(),
                title: "Example".to_string(),
                timestamp: 1_700_000_000_000,
            }],
            query: "example".to_string(),
        };

        let value = serde_json::to_value(&history).expect("serializable history");
        assert_eq!(value["alumne"], "joan");
        assert_eq!(value["historial"][0]["host"], "example.com");
        assert_eq!(value["query"], "example");
    }

    #[test]
    fn last_usage_is_camel_cased() {
        let usage = BrowserLastUsage {
            alumne: "maria".to_string(),
            last_usage: BTreeMap::from([("firefox".to_string(), 42)]),
        };
        let value = serde_json::to_value(&usage).expect("serializable usage");
        assert_eq!(value["lastUsage"]["firefox"], 42);
    }

    #[test]
    fn machine_status_defaults_to_offline() {
        let status: MachineStatus = serde_json::from_str("{}").expect("empty status");
        assert_eq!(status, MachineStatus { ip: None, online: false });
    }
}
