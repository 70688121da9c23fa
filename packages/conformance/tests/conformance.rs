//! End-to-end conformance tests for the Conduit dispatch pipeline.
//!
//! Each test builds a service over a [`ScriptedTransporter`], wires it into a
//! [`Dispatcher`] with [`dispatcher_for`], and drives whole actions through
//! `dispatch_one`. The transporter records every exchange it is sent, so the
//! tests can check what reached the backend as well as what came back.
//!
//! Timing tests run on a paused clock (`start_paused = true`), so delays are
//! exact and the suite never sleeps for real.
//!
//! # Coverage
//!
//! | Test | Property |
//! |------|----------|
//! | `specificity_sort_is_antisymmetric_and_stable` | comparator antisymmetry, stable ties |
//! | `id_and_type_take_precedence` | explicit id first, typed before untyped |
//! | `matcher_picks_exact_endpoint` | matcher exactness for `GET` / `member` / `{}` |
//! | `fan_out_keeps_order_with_null_for_notfound` | order preservation, `notfound` slot |
//! | `fan_out_failure_names_requested_ids` | error propagation, no data |
//! | `single_id_array_is_scalar` | `["x"]` equals `"x"` |
//! | `unroutable_action_is_error` | no match gives `error` |
//! | `resolved_exchange_skips_pipeline` | short-circuit, mappers never run |
//! | `members_endpoint_gets_whole_list` | one send for a `members` endpoint |
//! | `refused_multi_id_action_does_not_fan_out` | unauthorized actions never fan out |
//! | `branches_re_resolve_to_member_endpoint` | per-branch endpoint re-resolution |
//! | `branches_carry_correlation_id` | `meta.cid` on every branch |
//! | `dispatch_timeout_cancels_branches` | dispatch timeout answers `timeout` |
//! | `send_timeout_fails_the_branch` | per-send timeout inside a fan-out |
//! | `max_fanout_bounds_concurrency` | `max_fanout` limits branches in flight |
//! | `merge_follows_request_order_not_completion` | slots keep request order when branches finish out of order |
//! | `definitions_file_end_to_end` | definitions loading, `ident` authorizer |

use std::sync::Arc;
use std::time::Duration;

use conduit::{Endpoint, Exchange, Ident, MatchRule, Mapper, Request, Scope, Status};
use conduit_conformance::{dispatcher_for, seeded_backend, CountingMapper, ScriptedTransporter, ENTRY};
use conduit_dispatch::{
    build_registry, parse_definitions, DispatchConfig, Dispatcher, MemoryTransporter, Pipeline,
    RequireIdent, Resources, Service,
};
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn get(id: Option<Vec<&str>>) -> Exchange {
    let request = match id {
        Some(ids) => Request::for_type(ENTRY).with_id(ids),
        None => Request::for_type(ENTRY),
    };
    Exchange::new("GET", request)
}

fn ids_of(service: &Service) -> Vec<String> {
    service
        .endpoints()
        .iter()
        .enumerate()
        .map(|(i, e)| e.label(i))
        .collect()
}

/// A service with one catch-all `GET` endpoint over `backend`.
fn get_service(backend: Arc<ScriptedTransporter>) -> Service {
    Service::new(
        "entries",
        vec![Endpoint::new(MatchRule::new().action("GET")).with_id("get")],
        backend,
    )
}

fn tagged(tag: &str, rule: MatchRule) -> Endpoint {
    let mut options = conduit::Options::new();
    options.insert("tag".into(), json!(tag));
    Endpoint::new(rule).with_options(options)
}

fn tags(service: &Service) -> Vec<&str> {
    service
        .endpoints()
        .iter()
        .map(|e| e.options["tag"].as_str().unwrap_or_default())
        .collect()
}

// ---------------------------------------------------------------------------
// Ordering and matching
// ---------------------------------------------------------------------------

#[test]
fn specificity_sort_is_antisymmetric_and_stable() {
    let endpoints = vec![
        tagged("first", MatchRule::new().action("GET")),
        tagged("second", MatchRule::new().action("SET")),
        tagged("scoped", MatchRule::new().scope(Scope::Member)),
        tagged("third", MatchRule::new().action("DELETE")),
    ];
    for a in &endpoints {
        for b in &endpoints {
            assert_eq!(
                conduit::compare_specificity(a, b),
                conduit::compare_specificity(b, a).reverse()
            );
        }
    }

    let service = Service::new("entries", endpoints.clone(), Arc::new(ScriptedTransporter::new()));
    assert_eq!(tags(&service), ["scoped", "first", "second", "third"]);

    let mut twice = endpoints;
    conduit::sort_endpoints(&mut twice);
    conduit::sort_endpoints(&mut twice);
    let twice: Vec<&str> = twice.iter().map(|e| e.options["tag"].as_str().unwrap_or_default()).collect();
    assert_eq!(twice, ["scoped", "first", "second", "third"]);
}

#[test]
fn id_and_type_take_precedence() {
    let service = Service::new(
        "entries",
        vec![
            Endpoint::new(MatchRule::new()),
            Endpoint::new(MatchRule::new().type_name(ENTRY)),
            Endpoint::new(MatchRule::new().scope(Scope::Member).action("GET")).with_id("pinned"),
        ],
        Arc::new(ScriptedTransporter::new()),
    );
    let order = ids_of(&service);
    assert_eq!(order[0], "pinned");
    assert!(service.endpoints()[1].rule.type_name.is_some());
    assert!(service.endpoints()[2].rule.type_name.is_none());
}

#[test]
fn matcher_picks_exact_endpoint() {
    let service = Service::new(
        "entries",
        vec![
            tagged("get", MatchRule::new().action("GET")),
            tagged("member", MatchRule::new().scope(Scope::Member)),
            tagged("any", MatchRule::new()),
        ],
        Arc::new(ScriptedTransporter::new()),
    );
    let chosen = |ex: Exchange| {
        let ex = service.assign_endpoint(ex);
        ex.endpoint
            .map(|e| e.options["tag"].as_str().unwrap_or_default().to_string())
    };

    assert_eq!(chosen(get(Some(vec!["ent1"]))).as_deref(), Some("member"));
    assert_eq!(chosen(get(None)).as_deref(), Some("get"));
    assert_eq!(chosen(Exchange::new("SET", Request::for_type(ENTRY))).as_deref(), Some("any"));
}

#[tokio::test]
async fn unroutable_action_is_error() {
    let backend = Arc::new(seeded_backend());
    let dispatcher = dispatcher_for(get_service(backend.clone()), DispatchConfig::default());

    let answer = dispatcher
        .dispatch_one(Exchange::new("DELETE", Request::for_type(ENTRY).with_id("ent1")))
        .await;
    assert_eq!(answer.status(), Some(Status::Error));
    assert!(answer.response.error.unwrap().contains("DELETE"));
    assert_eq!(backend.send_count(), 0);

    let answer = dispatcher
        .dispatch_one(Exchange::new("GET", Request::for_type("comment")))
        .await;
    assert_eq!(answer.status(), Some(Status::Error));
}

// ---------------------------------------------------------------------------
// Fan-out and combine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fan_out_keeps_order_with_null_for_notfound() {
    let backend = Arc::new(seeded_backend());
    let dispatcher = dispatcher_for(get_service(backend.clone()), DispatchConfig::default());

    let answer = dispatcher.dispatch_one(get(Some(vec!["ent3", "missing", "ent1"]))).await;
    assert_eq!(answer.status(), Some(Status::Ok));
    assert_eq!(
        answer.response.data,
        Some(json!([{ "id": "ent3", "title": "Three" }, null, { "id": "ent1", "title": "One" }]))
    );
    assert_eq!(backend.send_count(), 3);
}

#[tokio::test]
async fn fan_out_failure_names_requested_ids() {
    let backend = Arc::new(seeded_backend().failing("ent2", Status::BadResponse));
    let dispatcher = dispatcher_for(get_service(backend), DispatchConfig::default());

    let answer = dispatcher.dispatch_one(get(Some(vec!["ent1", "ent2", "ent3"]))).await;
    assert_eq!(answer.status(), Some(Status::Error));
    assert!(answer.response.data.is_none());
    let message = answer.response.error.unwrap();
    assert!(message.contains("[ent1, ent2, ent3]"), "{message}");
    assert!(message.contains("ent2 (badresponse"), "{message}");
    assert!(!message.contains("ent1 ("), "{message}");
}

#[tokio::test]
async fn single_id_array_is_scalar() {
    let backend = Arc::new(seeded_backend());
    let dispatcher = dispatcher_for(get_service(backend.clone()), DispatchConfig::default());

    let scalar = dispatcher
        .dispatch_one(Exchange::new("GET", Request::for_type(ENTRY).with_id("ent2")))
        .await;
    let array = dispatcher.dispatch_one(get(Some(vec!["ent2"]))).await;
    assert_eq!(scalar.response, array.response);
    assert_eq!(array.response.data, Some(json!({ "id": "ent2", "title": "Two" })));

    let sent = backend.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].request.id, sent[1].request.id);
}

#[tokio::test]
async fn members_endpoint_gets_whole_list() {
    let backend = Arc::new(seeded_backend());
    let service = Service::new(
        "entries",
        vec![
            Endpoint::new(MatchRule::new().action("GET").scope(vec![Scope::Member, Scope::Members]))
                .with_id("bulk"),
        ],
        backend.clone(),
    );
    let dispatcher = dispatcher_for(service, DispatchConfig::default());

    let answer = dispatcher.dispatch_one(get(Some(vec!["ent1", "ent2"]))).await;
    assert_eq!(answer.status(), Some(Status::Ok));
    assert_eq!(answer.response.data.unwrap().as_array().map(Vec::len), Some(2));

    let sent = backend.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].request.ids(), ["ent1", "ent2"]);
}

#[tokio::test]
async fn refused_multi_id_action_does_not_fan_out() {
    let backend = Arc::new(seeded_backend());
    let service = get_service(backend.clone()).with_authorizer(Arc::new(RequireIdent::new()));
    let dispatcher = dispatcher_for(service, DispatchConfig::default());

    let answer = dispatcher.dispatch_one(get(Some(vec!["ent1", "ent2"]))).await;
    assert_eq!(answer.status(), Some(Status::NoAccess));
    assert!(!answer.authorized);
    assert_eq!(backend.send_count(), 0);
}

#[tokio::test]
async fn branches_re_resolve_to_member_endpoint() {
    let backend = Arc::new(seeded_backend());
    let service = Service::new(
        "entries",
        vec![
            Endpoint::new(MatchRule::new().action("GET").scope(Scope::Members)).with_id("list"),
            Endpoint::new(MatchRule::new().action("GET")).with_id("any"),
            Endpoint::new(MatchRule::new().action("GET").scope(Scope::Member)).with_id("one"),
        ],
        backend.clone(),
    );

    // `list` accepts members, so no fan-out; a rule without `members` forces it.
    let routed = Pipeline::routing()
        .run(&service, {
            let mut ex = get(Some(vec!["ent1", "ent2"]));
            ex.normalize_id();
            ex
        })
        .await;
    assert_eq!(routed.endpoint.as_ref().and_then(|e| e.id.as_deref()), Some("list"));

    let fanning = Service::new(
        "entries",
        vec![
            Endpoint::new(MatchRule::new().action("GET")).with_id("any"),
            Endpoint::new(MatchRule::new().action("GET").scope(Scope::Member)).with_id("one"),
        ],
        backend.clone(),
    );
    let dispatcher = dispatcher_for(fanning, DispatchConfig::default());
    let answer = dispatcher.dispatch_one(get(Some(vec!["ent1", "ent2"]))).await;
    assert_eq!(answer.status(), Some(Status::Ok));

    let chosen: Vec<Option<String>> = backend
        .sent()
        .iter()
        .map(|ex| ex.endpoint.as_ref().and_then(|e| e.id.clone()))
        .collect();
    // Both `id`-carrying endpoints tie on rule 1; `one` wins on scope.
    assert_eq!(chosen, [Some("one".to_string()), Some("one".to_string())]);
}

#[tokio::test]
async fn branches_carry_correlation_id() {
    let backend = Arc::new(seeded_backend());
    let dispatcher = dispatcher_for(get_service(backend.clone()), DispatchConfig::default());

    let parent = get(Some(vec!["ent1", "ent2"]));
    let parent_id = parent.meta.id.clone();
    let answer = dispatcher.dispatch_one(parent).await;
    assert_eq!(answer.meta.id, parent_id);
    assert!(answer.meta.cid.is_none());

    let sent = backend.sent();
    assert_eq!(sent.len(), 2);
    for branch in &sent {
        assert_eq!(branch.meta.cid.as_deref(), Some(parent_id.as_str()));
        assert_ne!(branch.meta.id, parent_id);
        assert!(branch.authorized);
    }
    assert_ne!(sent[0].meta.id, sent[1].meta.id);
}

// ---------------------------------------------------------------------------
// Short-circuit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resolved_exchange_skips_pipeline() {
    let backend = Arc::new(seeded_backend());
    let to_backend = Arc::new(CountingMapper::new());
    let from_backend = Arc::new(CountingMapper::new());
    let service = Service::new(
        "entries",
        vec![Endpoint::new(MatchRule::new())
            .with_request_mapper(to_backend.clone() as Arc<dyn Mapper>)
            .with_response_mapper(from_backend.clone() as Arc<dyn Mapper>)],
        backend.clone(),
    );

    let resolved = get(Some(vec!["ent1"]))
        .with_ident(Ident::new("johnf"))
        .fail(Status::BadRequest, "answered upstream");
    let out = Pipeline::full().run(&service, resolved.clone()).await;

    assert_eq!(out, resolved);
    assert_eq!(to_backend.calls(), 0);
    assert_eq!(from_backend.calls(), 0);
    assert_eq!(backend.send_count(), 0);

    // The same service maps both ways on an unresolved exchange.
    let out = Pipeline::full().run(&service, get(Some(vec!["ent1"]))).await;
    assert_eq!(out.status(), Some(Status::Ok));
    assert_eq!((to_backend.calls(), from_backend.calls()), (1, 1));
}

// ---------------------------------------------------------------------------
// Timeouts and concurrency
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn dispatch_timeout_cancels_branches() {
    let backend = Arc::new(seeded_backend().delayed("ent2", Duration::from_secs(3600)));
    let config = DispatchConfig {
        dispatch_timeout: Some(Duration::from_millis(200)),
        ..DispatchConfig::default()
    };
    let dispatcher = dispatcher_for(get_service(backend.clone()), config);

    let started = tokio::time::Instant::now();
    let answer = dispatcher.dispatch_one(get(Some(vec!["ent1", "ent2", "ent3"]))).await;
    assert_eq!(answer.status(), Some(Status::Timeout));
    assert!(answer.response.data.is_none());
    assert_eq!(answer.response.error.as_deref(), Some("dispatch timed out after 200 ms"));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn send_timeout_fails_the_branch() {
    let backend = Arc::new(seeded_backend().delayed("ent2", Duration::from_secs(3600)));
    let service = get_service(backend).with_send_timeout(Some(Duration::from_millis(100)));
    let dispatcher = dispatcher_for(service, DispatchConfig::default());

    let answer = dispatcher.dispatch_one(get(Some(vec!["ent1", "ent2"]))).await;
    assert_eq!(answer.status(), Some(Status::Error));
    assert!(answer.response.error.unwrap().contains("ent2 (timeout"));
}

#[tokio::test(start_paused = true)]
async fn max_fanout_bounds_concurrency() {
    let slow = || {
        Arc::new(
            seeded_backend()
                .delayed("ent1", Duration::from_millis(100))
                .delayed("ent2", Duration::from_millis(100))
                .delayed("ent3", Duration::from_millis(100)),
        )
    };
    let ids = || get(Some(vec!["ent1", "ent2", "ent3"]));

    let serial = dispatcher_for(
        get_service(slow()),
        DispatchConfig {
            max_fanout: 1,
            ..DispatchConfig::default()
        },
    );
    let started = tokio::time::Instant::now();
    assert_eq!(serial.dispatch_one(ids()).await.status(), Some(Status::Ok));
    assert!(started.elapsed() >= Duration::from_millis(300));

    let parallel = dispatcher_for(
        get_service(slow()),
        DispatchConfig {
            max_fanout: 0,
            ..DispatchConfig::default()
        },
    );
    let started = tokio::time::Instant::now();
    assert_eq!(parallel.dispatch_one(ids()).await.status(), Some(Status::Ok));
    assert!(started.elapsed() < Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn merge_follows_request_order_not_completion() {
    // ent1 finishes last and ent3 first.
    let backend = Arc::new(
        seeded_backend()
            .delayed("ent1", Duration::from_millis(300))
            .delayed("ent2", Duration::from_millis(100))
            .delayed("missing", Duration::from_millis(200)),
    );
    let config = DispatchConfig {
        max_fanout: 0,
        ..DispatchConfig::default()
    };
    let dispatcher = dispatcher_for(get_service(backend.clone()), config);

    let started = tokio::time::Instant::now();
    let answer = dispatcher
        .dispatch_one(get(Some(vec!["ent1", "missing", "ent2", "ent3"])))
        .await;
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(answer.status(), Some(Status::Ok));
    assert_eq!(
        answer.response.data,
        Some(json!([
            { "id": "ent1", "title": "One" },
            null,
            { "id": "ent2", "title": "Two" },
            { "id": "ent3", "title": "Three" }
        ]))
    );
    assert_eq!(backend.send_count(), 4);
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn definitions_file_end_to_end() {
    let defs = parse_definitions(
        r#"{
            "schemas": { "entry": "entries" },
            "services": [{
                "id": "entries",
                "transporter": "memory",
                "auth": "ident",
                "endpoints": [
                    { "id": "getOne", "match": { "action": "GET", "scope": "member" } },
                    { "match": { "action": "SET" } },
                    { "match": { "action": "GET" } }
                ]
            }]
        }"#,
    )
    .unwrap();

    let store = Arc::new(MemoryTransporter::new());
    store.insert(ENTRY, json!({ "id": "ent1", "title": "One" }));
    let resources = Resources::new().with_transporter("memory", store.clone());
    let config = DispatchConfig::default();
    let registry = build_registry(&defs, &resources, &config).unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry), config);

    let anonymous = dispatcher.dispatch_one(get(Some(vec!["ent1"]))).await;
    assert_eq!(anonymous.status(), Some(Status::NoAccess));

    let set = Exchange::new(
        "SET",
        Request::for_type(ENTRY).with_data(json!({ "id": "ent2", "title": "Two" })),
    )
    .with_ident(Ident::new("johnf"));
    assert_eq!(dispatcher.dispatch_one(set).await.status(), Some(Status::Ok));
    assert_eq!(store.len(ENTRY), 2);

    let both = dispatcher
        .dispatch_one(get(Some(vec!["ent2", "ent1"])).with_ident(Ident::new("johnf")))
        .await;
    assert_eq!(both.status(), Some(Status::Ok));
    assert_eq!(
        both.response.data,
        Some(json!([{ "id": "ent2", "title": "Two" }, { "id": "ent1", "title": "One" }]))
    );
}
