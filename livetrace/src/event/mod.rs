pub mod emitter;
pub use emitter::{EventSink, HttpEmitter, MemorySink};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::probe::{Location, Probe};
use crate::snapshot::SnapshotNode;

pub static HOSTNAME: Lazy<String> =
    Lazy::new(|| gethostname::gethostname().to_string_lossy().to_string());

pub const AGENT_NAME: &str = "livetrace";
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    TracepointHit,
    LogpointHit,
    ConditionError,
    SnapshotError,
    RateLimitError,
}

/// Identity of the process and runtime the event came from. The runtime
/// half is supplied by whichever attach adapter embeds the engine.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub host: String,
    pub app_name: String,
    pub agent_version: String,
    pub runtime_name: String,
    pub runtime_version: String,
}

impl ClientInfo {
    pub fn new(app_name: &str, runtime_name: &str, runtime_version: &str) -> Self {
        Self {
            host: HOSTNAME.clone(),
            app_name: app_name.to_owned(),
            agent_version: AGENT_VERSION.to_owned(),
            runtime_name: runtime_name.to_owned(),
            runtime_version: runtime_version.to_owned(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum EventPayload {
    Snapshot(SnapshotPayload),
    Log(LogPayload),
    Error(ErrorPayload),
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SnapshotPayload {
    pub snapshot: SnapshotNode,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LogPayload {
    pub message: String,
    pub message_template: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorPayload {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// The canonical envelope delivered to the sink. Built once per hit and
/// immutable from then on.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub kind: EventKind,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub client: ClientInfo,
    pub location: Location,
    pub probe_id: String,
    pub tags: Vec<String>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(kind: EventKind, probe: &Probe, client: &ClientInfo, payload: EventPayload) -> Self {
        Self {
            kind,
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            client: client.clone(),
            location: probe.location.clone(),
            probe_id: probe.id.clone(),
            tags: probe.tags.clone(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::SampleConfig;
    use crate::snapshot::SnapshotLimits;
    use indexmap::IndexMap;

    fn probe() -> Probe {
        Probe {
            id: "p1".to_owned(),
            location: Location {
                file: "a".to_owned(),
                line: 10,
                unit_name: Some("a".to_owned()),
                member_name: None,
            },
            condition: None,
            message: None,
            tags: vec!["critical".to_owned()],
            enabled: true,
            sample: SampleConfig::default(),
            snapshot: SnapshotLimits::default(),
        }
    }

    #[test]
    fn test_envelope_wire_shape() {
        let client = ClientInfo::new("orders", "cpython", "3.12.1");
        let mut snapshot = IndexMap::new();
        snapshot.insert("arg0".to_owned(), SnapshotNode::Int(2));
        let event = Event::new(
            EventKind::TracepointHit,
            &probe(),
            &client,
            EventPayload::Snapshot(SnapshotPayload {
                snapshot: SnapshotNode::Map(snapshot),
            }),
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "tracepoint-hit");
        assert_eq!(json["probeId"], "p1");
        assert_eq!(json["client"]["appName"], "orders");
        assert_eq!(json["client"]["runtimeName"], "cpython");
        assert_eq!(json["location"]["unitName"], "a");
        assert_eq!(json["tags"][0], "critical");
        assert_eq!(json["payload"]["snapshot"]["arg0"], 2);
        // RFC3339 timestamp
        let ts = json["timestamp"].as_str().unwrap();
        assert!(ts.contains('T'));
        assert!(Uuid::parse_str(json["id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_kind_names() {
        for (kind, name) in [
            (EventKind::TracepointHit, "tracepoint-hit"),
            (EventKind::LogpointHit, "logpoint-hit"),
            (EventKind::ConditionError, "condition-error"),
            (EventKind::SnapshotError, "snapshot-error"),
            (EventKind::RateLimitError, "rate-limit-error"),
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), name);
        }
    }
}
