//! Process-wide synchronized cache of server-pushed state slices.
//!
//! The store owns the last-known value of every slice and a per-event set of
//! view subscribers. Slices are mutated only by inbound socket events; views
//! read snapshots and receive republished events through their callbacks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tracing::{debug, warn};
use uuid::Uuid;

use palam_proto::{
    AdminEvent, AdminEventKind, ActivityMap, ClientEvent, GroupRoster, MachineMap, SortedHosts,
    StudentHistory, WebRule, parse_admin_event,
};

use crate::connection::SocketHandle;
use crate::error::Result;

/// Callback registered by a view for one event kind.
///
/// A failing callback is logged and isolated; it never blocks delivery to the
/// remaining subscribers.
pub type EventCallback = Arc<dyn Fn(&AdminEvent) -> Result<()> + Send + Sync>;

/// Last-known value of every slice.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    /// `None` until the first roster push arrives; the connection layer uses
    /// this to decide whether the initial resync raced the attach.
    pub group_roster: Option<GroupRoster>,
    pub live_activity: ActivityMap,
    pub rules: Vec<WebRule>,
    pub history_by_student: HashMap<String, StudentHistory>,
    pub usage_stats_by_student: HashMap<String, palam_proto::BrowserLastUsage>,
    pub sorted_hosts_by_student: HashMap<String, SortedHosts>,
    pub machine_status: MachineMap,
}

struct Subscriber {
    id: Uuid,
    callback: EventCallback,
}

#[derive(Default)]
struct StoreInner {
    state: RwLock<StoreState>,
    subscribers: RwLock<HashMap<AdminEventKind, Vec<Subscriber>>>,
    attached: Mutex<Option<SocketHandle>>,
    roster_epoch: AtomicU64,
}

/// Disposer returned by [`SyncStore::subscribe`]. Dropping it without calling
/// [`dispose`](SubscriptionHandle::dispose) leaks the registration, so views
/// keep their handles and dispose them in `destroy`.
pub struct SubscriptionHandle {
    inner: Weak<StoreInner>,
    kind: AdminEventKind,
    id: Uuid,
}

impl SubscriptionHandle {
    /// Remove the registration this handle stands for.
    pub fn dispose(self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut subscribers = inner
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(set) = subscribers.get_mut(&self.kind) {
            set.retain(|subscriber| subscriber.id != self.id);
        }
    }
}

/// The one synchronized store of the process.
#[derive(Clone, Default)]
pub struct SyncStore {
    inner: Arc<StoreInner>,
}

impl SyncStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one event kind.
    ///
    /// Registering the identical callback (a clone of the same `Arc`) again
    /// returns a fresh handle but does not create duplicate delivery.
    pub fn subscribe(&self, kind: AdminEventKind, callback: EventCallback) -> SubscriptionHandle {
        let mut subscribers = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let set = subscribers.entry(kind).or_default();

        let id = match set
            .iter()
            .find(|subscriber| Arc::ptr_eq(&subscriber.callback, &callback))
        {
            Some(existing) => existing.id,
            None => {
                let id = Uuid::new_v4();
                set.push(Subscriber { id, callback });
                id
            }
        };

        SubscriptionHandle {
            inner: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Number of live registrations for one event kind.
    pub fn subscriber_count(&self, kind: AdminEventKind) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Total live registrations across every event kind.
    pub fn total_subscribers(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Snapshot of every slice.
    pub fn snapshot(&self) -> StoreState {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Monotonic count of roster pushes applied. A stale roster left over
    /// from an earlier connection keeps `has_roster` true, so callers that
    /// care about arrival since a point in time compare epochs instead.
    pub fn roster_epoch(&self) -> u64 {
        self.inner.roster_epoch.load(Ordering::SeqCst)
    }

    /// Whether any roster push has been applied since the last clear.
    pub fn has_roster(&self) -> bool {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .group_roster
            .is_some()
    }

    /// Attach the live socket, replacing any previous attachment. Re-attaching
    /// the same handle is a no-op.
    pub fn attach(&self, socket: SocketHandle) {
        let mut attached = self
            .inner
            .attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if attached.as_ref().is_some_and(|current| current.id() == socket.id()) {
            return;
        }
        *attached = Some(socket);
    }

    /// Drop the attached socket, if it is still the given one.
    pub fn detach(&self, socket_id: Uuid) {
        let mut attached = self
            .inner
            .attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if attached.as_ref().is_some_and(|current| current.id() == socket_id) {
            *attached = None;
        }
    }

    /// Ask the server for a full push of every slice. Returns whether the
    /// emission was attempted; never errors.
    pub fn request_initial_data(&self, origin: &str) -> bool {
        let attached = self
            .inner
            .attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        match attached {
            Some(socket) => {
                debug!("requesting initial data (origin: {origin})");
                socket.emit(&ClientEvent::GetInitialData)
            }
            None => {
                debug!("initial data requested with no socket attached (origin: {origin})");
                false
            }
        }
    }

    /// Reset every slice to its empty initial value. Used on logout.
    pub fn clear(&self) {
        let mut state = self
            .inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = StoreState::default();
    }

    /// Ingest one inbound text frame: parse, update the slice, republish.
    /// Malformed or unknown frames are logged and dropped without mutation.
    pub(crate) fn ingest_text(&self, text: &str) {
        match parse_admin_event(text) {
            Ok(Some(event)) => self.apply(event),
            Ok(None) => debug!("ignoring event outside the admin vocabulary"),
            Err(error) => warn!("dropping malformed inbound event: {error}"),
        }
    }

    /// Update the slice for one event, then fan it out to subscribers.
    pub(crate) fn apply(&self, event: AdminEvent) {
        self.update_slice(&event);
        self.publish(&event);
    }

    fn update_slice(&self, event: &AdminEvent) {
        let mut state = self
            .inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match event {
            AdminEvent::GroupRoster(roster) => {
                state.group_roster = Some(roster.clone());
                self.inner.roster_epoch.fetch_add(1, Ordering::SeqCst);
            }
            AdminEvent::StudentActivity(activity) => state.live_activity = activity.clone(),
            AdminEvent::WebRules(rules) => state.rules = rules.clone(),
            AdminEvent::StudentHistory(history) => {
                state
                    .history_by_student
                    .insert(history.alumne.clone(), history.clone());
            }
            AdminEvent::BrowserLastUsage(usage) => {
                state
                    .usage_stats_by_student
                    .insert(usage.alumne.clone(), usage.clone());
            }
            AdminEvent::SortedHosts(hosts) => {
                state
                    .sorted_hosts_by_student
                    .insert(hosts.alumne.clone(), hosts.clone());
            }
            AdminEvent::MachineStatus(machines) => state.machine_status = machines.clone(),
            AdminEvent::MachineStatusDelta(delta) => {
                // The delta is the one merge exception; every other flat
                // slice is last-write-wins.
                for (alumne, status) in delta {
                    state.machine_status.insert(alumne.clone(), status.clone());
                }
            }
        }
    }

    fn publish(&self, event: &AdminEvent) {
        let callbacks: Vec<(Uuid, EventCallback)> = {
            let subscribers = self
                .inner
                .subscribers
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            subscribers
                .get(&event.kind())
                .map(|set| {
                    set.iter()
                        .map(|subscriber| (subscriber.id, Arc::clone(&subscriber.callback)))
                        .collect()
                })
                .unwrap_or_default()
        };

        for (id, callback) in callbacks {
            if let Err(error) = callback(event) {
                warn!(
                    "subscriber {id} failed on {}: {error}",
                    event.kind().wire_name()
                );
            }
        }
    }
}
