use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;

use crate::condition::{self, Scope};
use crate::config::LivetraceConfig;
use crate::event::{
    ClientInfo, ErrorPayload, Event, EventKind, EventPayload, EventSink, HttpEmitter, LogPayload,
    SnapshotPayload,
};
use crate::probe::{Probe, ProbeStore};
use crate::ratelimit::{LimiterStats, RateLimiterSet};
use crate::snapshot::{self, SnapshotLimits, SnapshotNode};
use crate::value::Value;

/// Name and version of the host runtime, supplied by the attach adapter
/// that embeds the engine.
#[derive(Clone, Debug)]
pub struct RuntimeInfo {
    pub name: String,
    pub version: String,
}

impl RuntimeInfo {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: version.to_owned(),
        }
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentStats {
    pub total_hits: u64,
    pub total_rate_limited: u64,
}

/// Mutable state shared by all hits of one agent instance: the global
/// enable switch, the active tag set, and counters. Owned by the agent,
/// never process-global, so independent engines cannot interfere.
struct AgentContext {
    enabled: AtomicBool,
    active_tags: RwLock<HashSet<String>>,
    total_hits: AtomicU64,
    total_rate_limited: AtomicU64,
}

impl AgentContext {
    fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            active_tags: RwLock::new(HashSet::new()),
            total_hits: AtomicU64::new(0),
            total_rate_limited: AtomicU64::new(0),
        }
    }
}

/// The single entry point adapters call when an instrumented location
/// executes. Implemented by [`Agent`]; adapters only ever see this seam.
pub trait HitHandler: Send + Sync {
    fn hit(
        &self,
        probe_id: &str,
        receiver: Option<&Value>,
        args: &[Value],
        locals: &IndexMap<String, Value>,
    );
}

/// Orchestrates the hit pipeline: registry lookup, tag and rate gates,
/// condition evaluation, capture, and emission. Nothing that happens in
/// here may surface into the instrumented host process.
pub struct Agent {
    store: ProbeStore,
    limiters: RateLimiterSet,
    sink: Box<dyn EventSink>,
    client: ClientInfo,
    ctx: AgentContext,
    report_errors: bool,
    sink_url: String,
}

impl Agent {
    pub fn new(config: &LivetraceConfig, runtime: RuntimeInfo) -> Result<Self> {
        let emitter = HttpEmitter::new(&config.sink)?;
        Ok(Self::with_sink(config, runtime, Box::new(emitter)))
    }

    pub fn with_sink(
        config: &LivetraceConfig,
        runtime: RuntimeInfo,
        sink: Box<dyn EventSink>,
    ) -> Self {
        Self {
            store: ProbeStore::new(),
            limiters: RateLimiterSet::new(),
            sink,
            client: ClientInfo::new(&config.agent.app_name, &runtime.name, &runtime.version),
            ctx: AgentContext::new(),
            report_errors: config.agent.report_errors,
            sink_url: config.sink.url.clone(),
        }
    }

    pub fn store(&self) -> &ProbeStore {
        &self.store
    }

    pub fn client(&self) -> &ClientInfo {
        &self.client
    }

    pub fn sink_url(&self) -> &str {
        &self.sink_url
    }

    pub fn upsert_probe(&self, probe: Probe) -> Arc<Probe> {
        self.store.upsert(probe)
    }

    /// Remove a probe and its rate-limiter state. Unknown ids are a no-op.
    pub fn remove_probe(&self, id: &str) {
        self.store.remove(id);
        self.limiters.remove(id);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.ctx.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.ctx.enabled.load(Ordering::SeqCst)
    }

    /// Returns true when the tag was not active before.
    pub fn add_tag(&self, tag: &str) -> bool {
        self.ctx.active_tags.write().insert(tag.to_owned())
    }

    pub fn remove_tag(&self, tag: &str) -> bool {
        self.ctx.active_tags.write().remove(tag)
    }

    pub fn active_tags(&self) -> Vec<String> {
        self.ctx.active_tags.read().iter().cloned().collect()
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats {
            total_hits: self.ctx.total_hits.load(Ordering::SeqCst),
            total_rate_limited: self.ctx.total_rate_limited.load(Ordering::SeqCst),
        }
    }

    pub fn limiter_stats(&self, probe_id: &str) -> Option<LimiterStats> {
        self.limiters.stats(probe_id)
    }

    fn tags_active(&self, probe: &Probe) -> bool {
        if probe.tags.is_empty() {
            return true;
        }
        let active = self.ctx.active_tags.read();
        probe.tags.iter().all(|t| active.contains(t))
    }

    fn hit_pipeline(
        &self,
        probe_id: &str,
        receiver: Option<&Value>,
        args: &[Value],
        locals: &IndexMap<String, Value>,
    ) {
        if !self.is_enabled() {
            return;
        }
        let Some(probe) = self.store.get(probe_id) else {
            return;
        };
        if !probe.enabled || !self.tags_active(&probe) {
            return;
        }

        self.ctx.total_hits.fetch_add(1, Ordering::SeqCst);

        if !self.limiters.consume(
            probe_id,
            probe.sample.rate_per_second,
            probe.sample.burst,
        ) {
            self.ctx.total_rate_limited.fetch_add(1, Ordering::SeqCst);
            return;
        }

        let scope = Scope::new(receiver, args, locals);
        if let Some(cond) = probe.condition_str() {
            match condition::try_eval(cond, &scope) {
                Ok(true) => {}
                Ok(false) => return,
                Err(err) => {
                    if self.report_errors {
                        let event = Event::new(
                            EventKind::ConditionError,
                            &probe,
                            &self.client,
                            EventPayload::Error(ErrorPayload {
                                error: err.to_string(),
                                condition: Some(cond.to_owned()),
                            }),
                        );
                        self.sink.send(&event);
                    }
                    return;
                }
            }
        }

        let (kind, payload) = if probe.is_logpoint() {
            let template = probe.message.as_deref().unwrap_or_default();
            (
                EventKind::LogpointHit,
                EventPayload::Log(LogPayload {
                    message: render_template(template, &scope, &probe.snapshot),
                    message_template: template.to_owned(),
                }),
            )
        } else {
            (
                EventKind::TracepointHit,
                EventPayload::Snapshot(SnapshotPayload {
                    snapshot: snapshot::capture(receiver, args, locals, &probe.snapshot),
                }),
            )
        };

        let event = Event::new(kind, &probe, &self.client, payload);
        // emitter outcome does not gate anything on the hit path
        self.sink.send(&event);
    }
}

impl HitHandler for Agent {
    fn hit(
        &self,
        probe_id: &str,
        receiver: Option<&Value>,
        args: &[Value],
        locals: &IndexMap<String, Value>,
    ) {
        // last line of defense: a bug anywhere in the pipeline must not
        // unwind into the instrumented host
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.hit_pipeline(probe_id, receiver, args, locals)
        }));
        if outcome.is_err() {
            tracing::warn!(probe_id, "probe hit handler panicked, hit dropped");
        }
    }
}

/// Render a logpoint template, substituting `{name}` placeholders from
/// the hit scope. Unresolvable placeholders stay verbatim.
fn render_template(template: &str, scope: &Scope, limits: &SnapshotLimits) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = after[..close].trim();
                match scope.resolve(name) {
                    Ok(value) => out.push_str(&render_value(&value, limits)),
                    Err(_) => {
                        out.push('{');
                        out.push_str(&after[..close]);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn render_value(value: &Value, limits: &SnapshotLimits) -> String {
    match value {
        Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => {
            value.coerce_string()
        }
        composite => {
            let node: SnapshotNode = snapshot::encode_value(composite, limits);
            serde_json::to_string(&node).unwrap_or_else(|_| value.coerce_string())
        }
    }
}
