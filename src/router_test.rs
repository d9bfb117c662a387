use super::*;
use std::sync::Mutex;
use std::time::Duration;

use crate::sink::EVENT_MESSAGE;

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().expect("sink mutex should lock").clone()
    }
}

impl EventSink for RecordingSink {
    fn dispatch(&self, event: &str, payload: Value) {
        self.events
            .lock()
            .expect("sink mutex should lock")
            .push((event.to_owned(), payload));
    }
}

fn calls() -> CallCorrelator {
    CallCorrelator::new(Duration::from_secs(30))
}

fn object(value: Value) -> Option<Map<String, Value>> {
    value.as_object().cloned()
}

#[test]
fn success_result_scalar_is_wrapped_and_merged_with_params() {
    let sink = RecordingSink::default();
    let mut calls = calls();
    let id = calls.register("math/onSum", json!({"a": 1, "b": 2}), None);

    route_text(&format!(r#"{{"id":{id},"result":3}}"#), &mut calls, &sink);

    assert_eq!(
        sink.events(),
        vec![("math/onSum".to_owned(), json!({"requestParams": {"a": 1, "b": 2}, "result": 3}))]
    );
    assert!(calls.is_empty());
}

#[test]
fn ok_and_string_results_are_wrapped() {
    let sink = RecordingSink::default();
    let mut calls = calls();
    let ok_id = calls.register("printer/onHome", json!({}), None);
    let str_id = calls.register("printer/onName", json!({}), None);

    route_text(&format!(r#"{{"id":{ok_id},"result":"ok"}}"#), &mut calls, &sink);
    route_text(&format!(r#"{{"id":{str_id},"result":"voron"}}"#), &mut calls, &sink);

    let events = sink.events();
    assert_eq!(events[0].1, json!({"requestParams": {}, "result": "ok"}));
    assert_eq!(events[1].1, json!({"requestParams": {}, "result": "voron"}));
}

#[test]
fn object_result_is_merged_directly_and_wins_collisions() {
    let sink = RecordingSink::default();
    let mut calls = calls();
    let id = calls.register(
        "files/onList",
        json!({"root": "gcodes"}),
        object(json!({"source": "ui", "status": "pending", "requestParams": {"extra": true}})),
    );

    route_text(
        &format!(r#"{{"id":{id},"result":{{"status":"done","files":["a.gcode"]}}}}"#),
        &mut calls,
        &sink,
    );

    assert_eq!(
        sink.events()[0].1,
        json!({
            "source": "ui",
            "status": "done",
            "files": ["a.gcode"],
            "requestParams": {"extra": true, "root": "gcodes"}
        })
    );
}

#[test]
fn nested_objects_are_deep_merged() {
    let mut base = object(json!({"job": {"name": "a", "progress": 0}, "keep": 1})).expect("object");
    let overlay = object(json!({"job": {"progress": 50}, "keep": {"now": "object"}})).expect("object");
    merge_into(&mut base, overlay);
    assert_eq!(
        Value::Object(base),
        json!({"job": {"name": "a", "progress": 50}, "keep": {"now": "object"}})
    );
}

#[test]
fn null_result_contributes_nothing() {
    assert!(normalize_result(Value::Null).is_none());

    let sink = RecordingSink::default();
    let mut calls = calls();
    let id = calls.register("e/on", json!({"x": 1}), object(json!({"tag": "t"})));
    route_text(&format!(r#"{{"id":{id}}}"#), &mut calls, &sink);

    assert_eq!(sink.events()[0].1, json!({"tag": "t", "requestParams": {"x": 1}}));
}

#[test]
fn array_and_bool_results_are_wrapped() {
    assert_eq!(normalize_result(json!([1, 2])), object(json!({"result": [1, 2]})));
    assert_eq!(normalize_result(json!(true)), object(json!({"result": true})));
}

#[test]
fn error_response_dispatches_error_and_params_then_removes_call() {
    let sink = RecordingSink::default();
    let mut calls = calls();
    let id = calls.register("math/onSum", json!({"a": 1}), object(json!({"tag": "t"})));

    let text = format!(r#"{{"id":{id},"error":{{"message":"bad params","code":-32602}}}}"#);
    route_text(&text, &mut calls, &sink);
    route_text(&text, &mut calls, &sink);

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0],
        (
            "math/onSum".to_owned(),
            json!({
                "tag": "t",
                "error": {"message": "bad params", "code": -32602},
                "requestParams": {"a": 1}
            })
        )
    );
    // Duplicate response no longer matches anything.
    assert_eq!(events[1].0, EVENT_MESSAGE);
    assert_eq!(events[1].1["id"], json!(id));
    assert!(calls.is_empty());
}

#[test]
fn unknown_id_is_forwarded_as_message() {
    let sink = RecordingSink::default();
    let mut calls = calls();
    calls.register("e/on", json!({}), None);

    route_text(r#"{"id":4242,"result":1}"#, &mut calls, &sink);

    assert_eq!(sink.events(), vec![(EVENT_MESSAGE.to_owned(), json!({"id": 4242, "result": 1}))]);
    assert_eq!(calls.len(), 1);
}

#[test]
fn unsolicited_event_is_forwarded_raw() {
    let sink = RecordingSink::default();
    let mut calls = calls();

    let text = r#"{"jsonrpc":"2.0","method":"notify_proc_stat_update","params":[{"cpu":3}]}"#;
    route_text(text, &mut calls, &sink);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, EVENT_MESSAGE);
    assert_eq!(events[0].1["method"], json!("notify_proc_stat_update"));
}

#[test]
fn malformed_frame_is_dropped() {
    let sink = RecordingSink::default();
    let mut calls = calls();
    calls.register("e/on", json!({}), None);

    route_text("{\"id\": 1, \"result\"", &mut calls, &sink);

    assert!(sink.events().is_empty());
    assert_eq!(calls.len(), 1);
}

#[test]
fn timeout_dispatches_timeout_error() {
    let sink = RecordingSink::default();
    let mut calls = calls();
    let id = calls.register("e/on", json!({"q": 1}), None);
    let call = calls.remove(id).expect("pending");

    dispatch_timeout(&call, &sink);

    assert_eq!(
        sink.events(),
        vec![(
            "e/on".to_owned(),
            json!({"error": {"message": "request timed out", "code": "timeout"}, "requestParams": {"q": 1}})
        )]
    );
}
