use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;
use livetrace::agent::{Agent, HitHandler, RuntimeInfo};
use livetrace::control;
use livetrace::value::Value;
use reqwest::blocking::Client;
use serde_json::{json, Value as Json};

use tests::{init_tracing, spawn_sink, test_config};

fn runtime() -> RuntimeInfo {
    RuntimeInfo::new("rust-test", "1.0.0")
}

struct Harness {
    agent: Arc<Agent>,
    sink: Arc<livetrace_sink::SinkState>,
    base: String,
    http: Client,
    _control: control::ControlHandle,
}

fn harness() -> Result<Harness> {
    init_tracing();
    let (sink, sink_addr) = spawn_sink();
    let config = test_config(sink_addr);
    let agent = Arc::new(Agent::new(&config, runtime())?);
    let control = control::spawn(Arc::clone(&agent), &config.control)?;
    Ok(Harness {
        agent,
        sink,
        base: format!("http://{}", control.addr()),
        http: Client::new(),
        _control: control,
    })
}

fn no_locals() -> IndexMap<String, Value> {
    IndexMap::new()
}

#[test]
fn test_tracepoint_end_to_end() -> Result<()> {
    let h = harness()?;

    // create over the control api
    let res = h
        .http
        .post(format!("{}/tracepoints", h.base))
        .json(&json!({"file": "a", "line": 10}))
        .send()?;
    assert_eq!(res.status().as_u16(), 201);
    let created: Json = res.json()?;
    let id = created["id"].as_str().unwrap().to_owned();
    assert_eq!(created["type"], "tracepoint");
    assert_eq!(created["location"]["file"], "a");
    assert_eq!(created["enabled"], true);

    // hit it: one event lands in the sink, synchronously
    let locals = no_locals();
    h.agent.hit(&id, None, &[Value::Int(2), Value::Int(3)], &locals);

    let events = h.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["kind"], "tracepoint-hit");
    assert_eq!(events[0]["probeId"], id.as_str());
    assert_eq!(events[0]["payload"]["snapshot"]["arg0"], 2);
    assert_eq!(events[0]["payload"]["snapshot"]["arg1"], 3);
    assert_eq!(events[0]["client"]["appName"], "livetrace-tests");
    assert_eq!(events[0]["client"]["runtimeName"], "rust-test");

    // delete, then verify the same hit is silent
    let res = h.http.delete(format!("{}/points/{}", h.base, id)).send()?;
    assert_eq!(res.status().as_u16(), 204);

    h.agent.hit(&id, None, &[Value::Int(2), Value::Int(3)], &locals);
    assert_eq!(h.sink.events().len(), 1);

    // idempotent delete of the now-unknown id
    let res = h.http.delete(format!("{}/points/{}", h.base, id)).send()?;
    assert_eq!(res.status().as_u16(), 204);

    Ok(())
}

#[test]
fn test_logpoint_with_tags_end_to_end() -> Result<()> {
    let h = harness()?;

    let res = h
        .http
        .post(format!("{}/logpoints", h.base))
        .json(&json!({
            "file": "b",
            "line": 7,
            "message": "order {arg0} from {locals.user}",
            "tags": ["critical"],
        }))
        .send()?;
    assert_eq!(res.status().as_u16(), 201);
    let created: Json = res.json()?;
    let id = created["id"].as_str().unwrap().to_owned();
    assert_eq!(created["type"], "logpoint");

    let mut locals = IndexMap::new();
    locals.insert("user".to_owned(), Value::from("ada"));

    // tag not active yet: no event
    h.agent.hit(&id, None, &[Value::Int(41)], &locals);
    assert_eq!(h.sink.events().len(), 0);

    let res = h
        .http
        .post(format!("{}/tags/enable", h.base))
        .json(&json!({"tags": ["critical"]}))
        .send()?;
    assert_eq!(res.status().as_u16(), 200);
    let body: Json = res.json()?;
    assert_eq!(body["enabled"], 1);

    h.agent.hit(&id, None, &[Value::Int(41)], &locals);
    let events = h.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["kind"], "logpoint-hit");
    assert_eq!(events[0]["payload"]["message"], "order 41 from ada");
    assert_eq!(
        events[0]["payload"]["messageTemplate"],
        "order {arg0} from {locals.user}"
    );
    assert_eq!(events[0]["tags"][0], "critical");

    let res = h
        .http
        .post(format!("{}/tags/disable", h.base))
        .json(&json!({"tags": ["critical"]}))
        .send()?;
    assert_eq!(res.status().as_u16(), 200);

    h.agent.hit(&id, None, &[Value::Int(41)], &locals);
    assert_eq!(h.sink.events().len(), 1);

    Ok(())
}

#[test]
fn test_control_api_surface() -> Result<()> {
    let h = harness()?;

    // health
    let res = h.http.get(format!("{}/health", h.base)).send()?;
    assert_eq!(res.status().as_u16(), 200);
    let body: Json = res.json()?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["agent"]["name"], "livetrace");
    assert_eq!(body["agent"]["runtimeName"], "rust-test");
    assert_eq!(body["features"]["tracepoints"], true);
    assert_eq!(body["features"]["rateLimit"], true);

    // validation failures
    let res = h
        .http
        .post(format!("{}/tracepoints", h.base))
        .json(&json!({"line": 10}))
        .send()?;
    assert_eq!(res.status().as_u16(), 400);

    let res = h
        .http
        .post(format!("{}/tracepoints", h.base))
        .json(&json!({"file": "a", "line": 0}))
        .send()?;
    assert_eq!(res.status().as_u16(), 400);

    let res = h
        .http
        .post(format!("{}/logpoints", h.base))
        .json(&json!({"file": "a", "line": 3}))
        .send()?;
    assert_eq!(res.status().as_u16(), 400);
    let body: Json = res.json()?;
    assert!(body["error"].as_str().unwrap().contains("message"));

    let res = h
        .http
        .post(format!("{}/tags/enable", h.base))
        .json(&json!({}))
        .send()?;
    assert_eq!(res.status().as_u16(), 400);

    // create a pair of points and filter the listing
    let res = h
        .http
        .post(format!("{}/tracepoints", h.base))
        .json(&json!({"file": "a", "line": 10, "tags": ["t1"]}))
        .send()?;
    let tp: Json = res.json()?;
    let tp_id = tp["id"].as_str().unwrap().to_owned();
    h.http
        .post(format!("{}/logpoints", h.base))
        .json(&json!({"file": "a", "line": 11, "message": "m"}))
        .send()?;

    let res = h.http.get(format!("{}/points", h.base)).send()?;
    let body: Json = res.json()?;
    assert_eq!(body["total"], 2);

    let res = h
        .http
        .get(format!("{}/points?type=logpoint", h.base))
        .send()?;
    let body: Json = res.json()?;
    assert_eq!(body["total"], 1);
    assert_eq!(body["points"][0]["type"], "logpoint");

    let res = h.http.get(format!("{}/points?tag=t1", h.base)).send()?;
    let body: Json = res.json()?;
    assert_eq!(body["total"], 1);
    assert_eq!(body["points"][0]["id"], tp_id.as_str());

    // disable, observe it in the filtered listing, re-enable
    let res = h
        .http
        .post(format!("{}/points/{}/disable", h.base, tp_id))
        .send()?;
    assert_eq!(res.status().as_u16(), 200);
    let body: Json = res.json()?;
    assert_eq!(body["enabled"], false);

    let res = h
        .http
        .get(format!("{}/points?enabled=false", h.base))
        .send()?;
    let body: Json = res.json()?;
    assert_eq!(body["total"], 1);

    let res = h
        .http
        .post(format!("{}/points/{}/enable", h.base, tp_id))
        .send()?;
    assert_eq!(res.status().as_u16(), 200);

    // unknown ids: typed 404 on toggle, idempotent 204 on delete
    let res = h
        .http
        .post(format!("{}/points/ghost/enable", h.base))
        .send()?;
    assert_eq!(res.status().as_u16(), 404);

    let res = h.http.delete(format!("{}/points/ghost", h.base)).send()?;
    assert_eq!(res.status().as_u16(), 204);

    Ok(())
}

#[test]
fn test_rate_limit_and_condition_gates_end_to_end() -> Result<()> {
    let h = harness()?;

    let res = h
        .http
        .post(format!("{}/tracepoints", h.base))
        .json(&json!({
            "file": "c",
            "line": 5,
            "condition": "arg0 > 10",
            // zero refill keeps the arithmetic below exact
            "sample": {"ratePerSecond": 0.0, "burst": 5.0},
        }))
        .send()?;
    let id = res.json::<Json>()?["id"].as_str().unwrap().to_owned();

    let locals = no_locals();
    // condition false: consumes a token but emits nothing
    h.agent.hit(&id, None, &[Value::Int(5)], &locals);
    assert_eq!(h.sink.events().len(), 0);

    // condition true
    h.agent.hit(&id, None, &[Value::Int(50)], &locals);
    assert_eq!(h.sink.events().len(), 1);

    // the burst is 5 and two tokens are already spent
    for _ in 0..10 {
        h.agent.hit(&id, None, &[Value::Int(50)], &locals);
    }
    assert_eq!(h.sink.events().len(), 4);
    assert_eq!(h.agent.stats().total_rate_limited, 7);

    Ok(())
}

#[test]
fn test_sink_rejects_malformed_envelope() -> Result<()> {
    init_tracing();
    let (sink, addr) = spawn_sink();
    let http = Client::new();

    let res = http
        .post(format!("http://{addr}/api/events"))
        .json(&json!({"kind": "tracepoint-hit"}))
        .send()?;
    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(sink.rejected(), 1);
    assert_eq!(sink.accepted(), 0);

    Ok(())
}
