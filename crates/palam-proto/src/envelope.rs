//! JSON array envelope carried on WebSocket text frames.
//!
//! Every frame is `["<eventName>", <payload>]`. Unknown event names parse to
//! `None` so the ingestion boundary can drop them without failing; malformed
//! payloads for known names are typed errors.

use serde_json::Value;

use crate::error::{ProtoError, Result};
use crate::events::{AdminEvent, AdminEventKind, ClientEvent};

/// Parse one inbound text frame into a typed admin event.
///
/// Returns `Ok(None)` for event names outside the admin channel vocabulary.
pub fn parse_admin_event(text: &str) -> Result<Option<AdminEvent>> {
    let value: Value = serde_json::from_str(text)?;
    let array = value
        .as_array()
        .ok_or_else(|| ProtoError::Envelope("expected JSON array envelope".to_string()))?;
    if array.is_empty() {
        return Ok(None);
    }

    let name = array[0]
        .as_str()
        .ok_or_else(|| ProtoError::Envelope("missing event name".to_string()))?;

    let Some(kind) = AdminEventKind::from_wire_name(name) else {
        return Ok(None);
    };

    if array.len() < 2 {
        return Err(ProtoError::Envelope(format!(
            "missing payload for {name}"
        )));
    }
    let payload = array[1].clone();

    decode_payload(kind, payload).map(Some)
}

fn decode_payload(kind: AdminEventKind, payload: Value) -> Result<AdminEvent> {
    let typed = |error: serde_json::Error| ProtoError::Payload {
        event: kind.wire_name().to_string(),
        detail: error.to_string(),
    };

    let event = match kind {
        AdminEventKind::GroupRoster => {
            AdminEvent::GroupRoster(serde_json::from_value(payload).map_err(typed)?)
        }
        AdminEventKind::StudentActivity => {
            AdminEvent::StudentActivity(serde_json::from_value(payload).map_err(typed)?)
        }
        AdminEventKind::WebRules => {
            AdminEvent::WebRules(serde_json::from_value(payload).map_err(typed)?)
        }
        AdminEventKind::StudentHistory => {
            AdminEvent::StudentHistory(serde_json::from_value(payload).map_err(typed)?)
        }
        AdminEventKind::BrowserLastUsage => {
            AdminEvent::BrowserLastUsage(serde_json::from_value(payload).map_err(typed)?)
        }
        AdminEventKind::SortedHosts => {
            AdminEvent::SortedHosts(serde_json::from_value(payload).map_err(typed)?)
        }
        AdminEventKind::MachineStatus => {
            AdminEvent::MachineStatus(serde_json::from_value(payload).map_err(typed)?)
        }
        AdminEventKind::MachineStatusDelta => {
            AdminEvent::MachineStatusDelta(serde_json::from_value(payload).map_err(typed)?)
        }
    };

    Ok(event)
}

/// Encode an outbound client event as one text frame.
pub fn encode_client_event(event: &ClientEvent) -> String {
    // getInitialData carries no payload; keep the single-element envelope.
    format!("[{}]", serde_json::to_string(event.wire_name()).unwrap_or_default())
}
