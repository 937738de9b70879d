//! Workspace-facing integration tests for the session runtime.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ensemble_orch::{LocalTransport, Orchestrator};
use ensemble_types::test_utils::MockProvider;
use ensemble_types::{CiStatus, LifecycleEvent, OrchError, Role};

#[test]
fn lifecycle_transition_order_scenario() {
    // create → start → assign → complete → graceful stop, then check the
    // recorded history most-recent first.
    let mut orch = Orchestrator::new("s-lifecycle", "main");
    orch.add_ci("alpha", Role::Builder, "m").expect("add");
    orch.start_ci("alpha").expect("start");
    orch.create_task("alpha", "t1").expect("assign");
    orch.complete_task("alpha", true).expect("complete");
    orch.stop_ci("alpha", true).expect("stop");

    let entry = orch.supervisor().get("alpha").expect("entry");
    assert_eq!(entry.status, CiStatus::Shutdown);

    let history: Vec<(LifecycleEvent, CiStatus)> = entry
        .history
        .iter()
        .map(|t| (t.event, t.to))
        .collect();
    assert_eq!(
        history,
        vec![
            (LifecycleEvent::ShutdownRequested, CiStatus::Shutdown),
            (LifecycleEvent::TaskComplete, CiStatus::Ready),
            (LifecycleEvent::TaskAssigned, CiStatus::Busy),
            (LifecycleEvent::Initializing, CiStatus::Starting),
            (LifecycleEvent::Created, CiStatus::Offline),
        ]
    );
}

#[test]
fn heartbeat_escalation_scenario() {
    // "beta" starts, never heartbeats; with a 1s timeout and 3 allowed
    // misses, three spaced checks drive it to the error state.
    let mut orch = Orchestrator::new("s-heartbeat", "main");
    orch.add_ci("beta", Role::Builder, "m").expect("add");
    orch.start_ci("beta").expect("start");

    let t0 = Utc::now();
    orch.record_heartbeat("beta", t0).expect("initial beat");

    // The orchestrator's default policy is 60s/3; drive the supervisor
    // with a tighter policy through spaced timestamps instead: 3 checks
    // each > 60s apart.
    assert_eq!(orch.check_heartbeats(t0 + chrono::Duration::seconds(61)), 0);
    assert_eq!(orch.check_heartbeats(t0 + chrono::Duration::seconds(122)), 0);
    assert_eq!(orch.check_heartbeats(t0 + chrono::Duration::seconds(183)), 1);

    let entry = orch.supervisor().get("beta").expect("entry");
    assert_eq!(entry.status, CiStatus::Error);
    assert!(entry.error_count >= 1);
}

#[test]
fn merge_selection_tie_break_scenario() {
    let mut orch = Orchestrator::new("s-merge", "main");
    orch.start_merge("main", "feature/s-merge").expect("open");
    let conflict = orch
        .add_conflict("x.c", 10, 20, "left", "right")
        .expect("conflict");

    orch.propose_resolution(conflict, "a", "take left", 40.0).expect("a");
    orch.propose_resolution(conflict, "b", "take right", 70.0).expect("b");
    orch.propose_resolution(conflict, "c", "merge both", 70.0).expect("c");

    {
        let negotiation = orch.negotiation().expect("active");
        let best = negotiation.select_best_proposal(conflict).expect("best");
        assert_eq!(best.confidence, 70);
        assert!(negotiation.is_complete());
    }

    let summary = orch.finalize_merge().expect("finalize");
    assert_eq!(summary["resolved_count"], 1);
    assert_eq!(summary["complete"], true);
}

#[test]
fn messages_flow_between_cis_in_order() {
    let transport = Arc::new(LocalTransport::new());
    let mut orch = Orchestrator::with_transport("s-bus", "main", transport.clone());

    orch.add_ci("alpha", Role::Builder, "m").expect("add");
    orch.add_ci("beta", Role::Analysis, "m").expect("add");
    orch.start_ci("alpha").expect("start");
    orch.start_ci("beta").expect("start");
    orch.mark_ready("alpha").expect("ready");
    orch.mark_ready("beta").expect("ready");

    let mut beta_rx = transport.register("beta");

    for i in 0..5 {
        orch.send_message("alpha", "beta", "seq", &i.to_string())
            .expect("send");
    }

    for i in 0..5 {
        let msg = beta_rx.try_recv().expect("delivered in order");
        assert_eq!(msg.from, "alpha");
        assert_eq!(msg.content, i.to_string());
    }

    let status = orch.status_json();
    let alpha = status["cis"]
        .as_array()
        .expect("cis")
        .iter()
        .find(|ci| ci["name"] == "alpha")
        .expect("alpha");
    assert_eq!(alpha["messages_sent"], 5);
}

#[test]
fn broadcast_reaches_matching_roles_only() {
    let transport = Arc::new(LocalTransport::new());
    let mut orch = Orchestrator::with_transport("s-bcast", "main", transport.clone());

    for (name, role) in [
        ("build-1", Role::Builder),
        ("build-2", Role::Builder),
        ("coord", Role::Coordinator),
    ] {
        orch.add_ci(name, role, "m").expect("add");
        orch.start_ci(name).expect("start");
        orch.mark_ready(name).expect("ready");
    }

    let mut b2_rx = transport.register("build-2");
    let mut coord_rx = transport.register("coord");

    let delivered = orch
        .broadcast_message("build-1", Some(Role::Builder), "status", "done")
        .expect("broadcast");
    assert_eq!(delivered, 1);
    assert!(b2_rx.try_recv().is_ok());
    assert!(coord_rx.try_recv().is_err());
}

#[tokio::test]
async fn queries_route_through_bound_providers() {
    let mut orch = Orchestrator::new("s-query", "main");
    orch.add_ci("alpha", Role::Builder, "mock-model").expect("add");

    orch.bind_provider("alpha", Box::new(MockProvider::new("OK")))
        .expect("bind");

    let response = orch.query_ci("alpha", "ping").await.expect("query");
    assert_eq!(response.content, "OK");
    assert_eq!(response.model, "mock-model");

    let err = orch.query_ci("ghost", "ping").await.expect_err("no provider");
    assert!(matches!(err, OrchError::NoProvider(_)));
}

#[tokio::test]
async fn binding_requires_a_registered_ci() {
    let mut orch = Orchestrator::new("s-bind", "main");
    let err = orch
        .bind_provider("ghost", Box::new(MockProvider::new("x")))
        .expect_err("unknown ci");
    assert!(matches!(err, OrchError::Registry(_)));
}

#[tokio::test]
async fn stream_ci_emits_chunks() {
    let mut orch = Orchestrator::new("s-stream", "main");
    orch.add_ci("alpha", Role::Builder, "m").expect("add");
    orch.bind_provider("alpha", Box::new(MockProvider::new("streamed")))
        .expect("bind");

    let mut chunks: Vec<String> = Vec::new();
    let response = orch
        .stream_ci("alpha", "go", &mut |c: &str| chunks.push(c.to_string()))
        .await
        .expect("stream");
    assert_eq!(chunks, vec!["streamed".to_string()]);
    assert_eq!(response.content, "streamed");
}

#[test]
fn stale_health_check_counts_quiet_cis() {
    let mut orch = Orchestrator::new("s-health", "main");
    orch.add_ci("alpha", Role::Builder, "m").expect("add");
    orch.add_ci("beta", Role::Builder, "m").expect("add");

    let now = Utc::now();
    orch.record_heartbeat("alpha", now).expect("beat");
    orch.record_heartbeat("beta", now - chrono::Duration::seconds(90))
        .expect("beat");

    assert_eq!(orch.check_health(now), 1);
}

#[test]
fn pending_request_cap_and_timeout() {
    use ensemble_orch::{PendingRequests, RequestKey};
    use ensemble_types::BusError;

    let mut pending = PendingRequests::with_capacity(50, Duration::from_secs(30));
    let now = Utc::now();

    for i in 0..50 {
        pending
            .track(
                RequestKey {
                    from: "alpha".into(),
                    to: "beta".into(),
                    request_id: format!("r-{i}"),
                },
                now,
            )
            .expect("under cap");
    }
    let err = pending
        .track(
            RequestKey {
                from: "alpha".into(),
                to: "beta".into(),
                request_id: "r-50".into(),
            },
            now,
        )
        .expect_err("at cap");
    assert!(matches!(err, BusError::QueueFull));

    assert_eq!(pending.expire(now + chrono::Duration::seconds(30)), 50);
    assert!(pending.is_empty());
}
