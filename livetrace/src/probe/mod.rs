pub mod store;
pub use store::ProbeStore;

use serde::{Deserialize, Serialize};

use crate::snapshot::SnapshotLimits;

/// Source position a probe is attached to. `unit_name` is the compiled
/// unit (class, module, script) the attach mechanism indexes by.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub file: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_name: Option<String>,
}

/// Token-bucket sampling limits for one probe.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SampleConfig {
    pub rate_per_second: f64,
    pub burst: f64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            rate_per_second: 10.0,
            burst: 1.0,
        }
    }
}

/// One tracepoint or logpoint definition. A probe with a non-empty
/// `message` is a logpoint; everything else captures a snapshot.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    pub id: String,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub sample: SampleConfig,
    #[serde(default)]
    pub snapshot: SnapshotLimits,
}

fn default_enabled() -> bool {
    true
}

impl Probe {
    pub fn is_logpoint(&self) -> bool {
        matches!(&self.message, Some(m) if !m.is_empty())
    }

    pub fn kind_name(&self) -> &'static str {
        if self.is_logpoint() {
            "logpoint"
        } else {
            "tracepoint"
        }
    }

    pub fn condition_str(&self) -> Option<&str> {
        match &self.condition {
            Some(c) if !c.trim().is_empty() => Some(c),
            _ => None,
        }
    }
}
