use crate::local_notify::LocalNotify;
use serde::Deserialize;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendEncoding {
    Json,
    Yaml,
    Xml,
    Rss,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregateBackend {
    pub name: String,
    /// `{var}`-templated URL, substituted against request path params
    /// and query values before dispatch.
    pub url_template: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default = "default_encoding")]
    pub encoding: BackendEncoding,
    #[serde(default)]
    pub required: bool,
    /// If set, this backend's decoded object is nested under this key in
    /// the merged document. If unset, its fields are merged into the
    /// root document (later writers win on collisions, in configured order).
    #[serde(default)]
    pub group: Option<String>,
}

fn default_encoding() -> BackendEncoding {
    BackendEncoding::Json
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStrategy {
    /// Default. Any backend failing aborts the whole aggregate: respond
    /// 502 with the list of errors, no partial body.
    Abort,
    /// Any failure is tolerated and surfaced via `_errors` in a 200
    /// body, unless a `required` backend failed — that still aborts.
    Partial,
}

#[derive(Debug, Clone)]
pub struct BackendResult {
    pub name: String,
    pub outcome: Result<Value, String>,
}

/// Substitute `{name}` placeholders in `template` from `vars`. Grounded
/// in the proxy's own zero-allocation upstream-request string building:
/// no templating engine dependency, just a linear scan-and-replace.
pub fn render_template(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i..].find('}') {
                let key = &template[i + 1..i + end];
                if let Some(val) = vars.get(key) {
                    out.push_str(val);
                    i += end + 1;
                    continue;
                }
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn xml_like_to_json(text: &str) -> Result<Value, String> {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    fn parse_element(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<Value, String> {
        let mut obj = serde_json::Map::new();
        let mut text_content = String::new();
        loop {
            match reader.read_event_into(buf) {
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let child = parse_element(reader, buf)?;
                    insert_or_merge(&mut obj, name, child);
                }
                Ok(Event::Empty(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    insert_or_merge(&mut obj, name, Value::Null);
                }
                Ok(Event::Text(t)) => {
                    text_content.push_str(&t.unescape().map_err(|e| e.to_string())?);
                }
                Ok(Event::End(_)) | Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(e.to_string()),
            }
        }
        if obj.is_empty() {
            Ok(Value::String(text_content.trim().to_string()))
        } else {
            Ok(Value::Object(obj))
        }
    }

    fn insert_or_merge(obj: &mut serde_json::Map<String, Value>, key: String, val: Value) {
        match obj.get_mut(&key) {
            Some(Value::Array(arr)) => arr.push(val),
            Some(existing) => {
                let prev = existing.clone();
                obj.insert(key, Value::Array(vec![prev, val]));
            }
            None => {
                obj.insert(key, val);
            }
        }
    }

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    parse_element(&mut reader, &mut buf)
}

/// Decode a backend's raw response body according to its configured
/// encoding, always producing a JSON `Value` for the merge step.
pub fn decode_backend_body(body: &str, encoding: BackendEncoding) -> Result<Value, String> {
    match encoding {
        BackendEncoding::Json => serde_json::from_str(body).map_err(|e| e.to_string()),
        BackendEncoding::Yaml => serde_yaml::from_str::<Value>(body).map_err(|e| e.to_string()),
        BackendEncoding::Xml | BackendEncoding::Rss => xml_like_to_json(body),
    }
}

/// Merge every successful backend's decoded JSON into one document per
/// spec §4.11: a backend with a non-empty `group` is nested under that
/// key; an ungrouped backend's top-level fields are merged into the
/// root, later writers winning on collisions, in configured order.
/// Failed backends are omitted from the document and instead reported
/// via the returned error list (used to populate `_errors`).
pub fn merge_results(results: &[BackendResult], backends: &[AggregateBackend]) -> (Value, Vec<Value>) {
    let mut root = serde_json::Map::new();
    let mut errors = Vec::new();

    for r in results {
        let group = backends.iter().find(|b| b.name == r.name).and_then(|b| b.group.clone());
        match &r.outcome {
            Ok(v) => {
                if let Some(g) = group {
                    root.insert(g, v.clone());
                } else if let Value::Object(fields) = v {
                    for (k, fv) in fields {
                        root.insert(k.clone(), fv.clone());
                    }
                } else {
                    root.insert(r.name.clone(), v.clone());
                }
            }
            Err(e) => {
                errors.push(serde_json::json!({"backend": r.name, "error": e}));
            }
        }
    }
    (Value::Object(root), errors)
}

/// Outcome of applying the configured failure strategy to a completed
/// aggregate fan-out: either a mergeable body (with `partial` set when
/// any non-required backend failed), or a hard abort with the list of
/// backend errors (spec §4.11's `abort` mode, 502).
pub enum AggregateOutcome {
    Ok { body: Value, partial: bool, errors: Vec<Value> },
    Abort { errors: Vec<Value> },
}

/// Build the final aggregate response body from backend results,
/// honoring `strategy`: `abort` fails the whole aggregate if anything
/// failed; `partial` folds failures into a merged body's `_errors`
/// field unless a `required` backend failed, in which case it still
/// aborts.
pub fn build_aggregate_response(results: Vec<BackendResult>, backends: &[AggregateBackend], strategy: FailureStrategy) -> AggregateOutcome {
    let any_required_failed = results.iter().any(|r| {
        r.outcome.is_err() && backends.iter().any(|b| b.name == r.name && b.required)
    });
    let any_failed = results.iter().any(|r| r.outcome.is_err());

    let (merged, errors) = merge_results(&results, backends);

    match strategy {
        FailureStrategy::Abort if any_failed => AggregateOutcome::Abort { errors },
        FailureStrategy::Partial if any_required_failed => AggregateOutcome::Abort { errors },
        _ => AggregateOutcome::Ok { body: merged, partial: any_failed, errors },
    }
}

/// Drive `count` backend fetches to completion, collecting results in a
/// shared slot array. `fetch_one` performs the actual HTTP call (left
/// abstract here so this module stays transport-agnostic and testable
/// without a real network); each call is spawned as an independent
/// `monoio::spawn` local task — there is no `futures::join_all`
/// available (not a workspace dependency), so completion is tracked by
/// hand via a countdown plus a `LocalNotify`, the same "hand-rolled
/// zero-dependency concurrency primitive on the hot path" style as the
/// connection pool and pipeline cache.
pub async fn dispatch_all<F, Fut>(backends: Vec<AggregateBackend>, per_backend_timeout: Duration, fetch_one: F) -> Vec<BackendResult>
where
    F: Fn(AggregateBackend) -> Fut + 'static,
    Fut: std::future::Future<Output = Result<String, String>> + 'static,
{
    let count = backends.len();
    let slots: Rc<RefCell<Vec<Option<BackendResult>>>> = Rc::new(RefCell::new((0..count).map(|_| None).collect()));
    let remaining = Rc::new(std::cell::Cell::new(count));
    let notify = Rc::new(LocalNotify::new());

    for (idx, backend) in backends.into_iter().enumerate() {
        let slots = slots.clone();
        let remaining = remaining.clone();
        let notify = notify.clone();
        let name = backend.name.clone();
        let encoding = backend.encoding;
        let fut = fetch_one(backend);

        monoio::spawn(async move {
            let outcome = match monoio::time::timeout(per_backend_timeout, fut).await {
                Ok(Ok(body)) => decode_backend_body(&body, encoding),
                Ok(Err(e)) => Err(e),
                Err(_) => Err("backend timed out".to_string()),
            };
            slots.borrow_mut()[idx] = Some(BackendResult { name, outcome });
            remaining.set(remaining.get() - 1);
            if remaining.get() == 0 {
                notify.notify_all();
            }
        });
    }

    if count > 0 {
        notify.notified().await;
    }

    let mut results = slots.borrow_mut();
    results.drain(..).map(|r| r.expect("every slot filled before notify fires")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn render_template_substitutes_known_vars() {
        let mut vars = HashMap::new();
        vars.insert("id".to_string(), "42".to_string());
        assert_eq!(render_template("https://svc/items/{id}", &vars), "https://svc/items/42");
    }

    #[test]
    fn render_template_leaves_unknown_placeholder() {
        let vars = HashMap::new();
        assert_eq!(render_template("https://svc/{missing}", &vars), "https://svc/{missing}");
    }

    #[test]
    fn decode_json_backend() {
        let v = decode_backend_body(r#"{"a":1}"#, BackendEncoding::Json).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn decode_yaml_backend() {
        let v = decode_backend_body("a: 1\nb: two\n", BackendEncoding::Yaml).unwrap();
        assert_eq!(v["a"], 1);
        assert_eq!(v["b"], "two");
    }

    #[test]
    fn decode_xml_backend_builds_nested_object() {
        let v = decode_backend_body("<root><item>one</item><item>two</item></root>", BackendEncoding::Xml).unwrap();
        assert!(v["item"].is_array());
        assert_eq!(v["item"][0], "one");
        assert_eq!(v["item"][1], "two");
    }

    fn backend(name: &str, required: bool, group: Option<&str>) -> AggregateBackend {
        AggregateBackend {
            name: name.into(),
            url_template: "x".into(),
            headers: vec![],
            encoding: BackendEncoding::Json,
            required,
            group: group.map(String::from),
        }
    }

    #[test]
    fn merge_results_ungrouped_backend_merges_fields_into_root() {
        let backends = vec![backend("a", false, None), backend("b", false, None)];
        let results = vec![
            BackendResult { name: "a".into(), outcome: Ok(serde_json::json!({"x": 1})) },
            BackendResult { name: "b".into(), outcome: Ok(serde_json::json!({"y": 2})) },
        ];
        let (merged, errors) = merge_results(&results, &backends);
        assert_eq!(merged["x"], 1);
        assert_eq!(merged["y"], 2);
        assert!(errors.is_empty());
    }

    #[test]
    fn merge_results_grouped_backend_nests_under_group_key() {
        let backends = vec![backend("users-svc", false, Some("user")), backend("stats-svc", false, Some("stats"))];
        let results = vec![
            BackendResult { name: "users-svc".into(), outcome: Ok(serde_json::json!({"id": 1})) },
            BackendResult { name: "stats-svc".into(), outcome: Ok(serde_json::json!({"views": 9})) },
        ];
        let (merged, _) = merge_results(&results, &backends);
        assert_eq!(merged["user"]["id"], 1);
        assert_eq!(merged["stats"]["views"], 9);
    }

    #[test]
    fn abort_strategy_fails_on_any_backend_error() {
        let backends = vec![backend("a", false, None)];
        let results = vec![BackendResult { name: "a".into(), outcome: Err("boom".into()) }];
        let outcome = build_aggregate_response(results, &backends, FailureStrategy::Abort);
        assert!(matches!(outcome, AggregateOutcome::Abort { .. }));
    }

    #[test]
    fn partial_strategy_tolerates_non_required_failure() {
        // §8 scenario 4: `stats` not required, fails; `user` succeeds.
        let backends = vec![backend("user", false, Some("user")), backend("stats", false, Some("stats"))];
        let results = vec![
            BackendResult { name: "user".into(), outcome: Ok(serde_json::json!({"id": 1})) },
            BackendResult { name: "stats".into(), outcome: Err("backend down".into()) },
        ];
        match build_aggregate_response(results, &backends, FailureStrategy::Partial) {
            AggregateOutcome::Ok { body, partial, errors } => {
                assert!(partial);
                assert_eq!(body["user"]["id"], 1);
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0]["backend"], "stats");
            }
            AggregateOutcome::Abort { .. } => panic!("non-required failure must not abort under partial strategy"),
        }
    }

    #[test]
    fn partial_strategy_still_aborts_on_required_failure() {
        let backends = vec![backend("a", true, None)];
        let results = vec![BackendResult { name: "a".into(), outcome: Err("boom".into()) }];
        let outcome = build_aggregate_response(results, &backends, FailureStrategy::Partial);
        assert!(matches!(outcome, AggregateOutcome::Abort { .. }));
    }

    #[monoio::test]
    async fn dispatch_all_collects_every_backend_result() {
        let backends = vec![backend("a", false, None), backend("b", false, None)];
        let results = dispatch_all(backends, Duration::from_secs(1), |b| async move {
            Ok(format!(r#"{{"from":"{}"}}"#, b.name))
        })
        .await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.outcome.is_ok()));
    }

    #[monoio::test]
    async fn dispatch_all_times_out_slow_backend() {
        let backends = vec![backend("slow", false, None)];
        let results = dispatch_all(backends, Duration::from_millis(10), |_b| async move {
            monoio::time::sleep(Duration::from_secs(5)).await;
            Ok("{}".to_string())
        })
        .await;
        assert_eq!(results.len(), 1);
        assert!(results[0].outcome.is_err());
    }
}
