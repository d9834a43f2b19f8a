//! Telemetry API tests driven through the router with `tower::oneshot`.

use std::sync::{Arc, RwLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::Value;
use tower::ServiceExt;

use ada_harness::alerts::{AlertDraft, AlertSeverity, AlertStore};
use ada_harness::api::{router, ApiState};
use ada_harness::backlog::{Backlog, BacklogStore, Feature, FeatureStatus};
use ada_harness::cost::UsageTotals;
use ada_harness::events::{EventBus, StatusSnapshot};
use ada_harness::logging::{SessionHistory, SessionRecord};
use ada_harness::progress::{ProgressAction, ProgressEntry, ProgressLog};
use ada_harness::session::{AgentKind, SessionOutcome};
use tempfile::TempDir;

fn record(
    id: &str,
    feature: Option<&str>,
    model: &str,
    usage: UsageTotals,
    cost: f64,
) -> SessionRecord {
    SessionRecord {
        session_id: id.to_string(),
        file: format!("{id}.jsonl"),
        agent_kind: AgentKind::Coding,
        feature_id: feature.map(str::to_string),
        model: model.to_string(),
        started_at: Utc::now(),
        ended_at: Utc::now(),
        outcome: SessionOutcome::Success,
        turns: 2,
        usage,
        cost_usd: cost,
        files_changed: vec![],
        commit: None,
        error: None,
        verification: None,
        handoff_notes: None,
    }
}

struct Fixture {
    _dir: TempDir,
    state: ApiState,
    history: SessionHistory,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    let mut backlog = Backlog::new("api-test", root.display().to_string());
    backlog.features.push(Feature::new("f1", "One").with_priority(3));
    let mut done = Feature::new("f0", "Done");
    done.status = FeatureStatus::Completed;
    backlog.features.push(done);
    let backlog_store = BacklogStore::new(root.join("feature-list.json"));
    backlog_store.save(&backlog).unwrap();

    let progress = ProgressLog::new(root.join("claude-progress.txt"));
    progress
        .append(&ProgressEntry::new(
            "s001",
            Some("f1".to_string()),
            ProgressAction::SessionStart,
            "starting out",
        ))
        .unwrap();

    let history = SessionHistory::new(root.join(".ada/state/history.json"));
    let state = ApiState {
        backlog_store,
        history: history.clone(),
        progress,
        alerts: Arc::new(AlertStore::open(root.join(".ada/alerts.json"))),
        status: Arc::new(RwLock::new(StatusSnapshot::default())),
        bus: EventBus::new(),
    };
    Fixture {
        _dir: dir,
        state,
        history,
    }
}

async fn get_json(state: &ApiState, uri: &str) -> (StatusCode, Value) {
    let response = router(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn post_json(state: &ApiState, uri: &str) -> (StatusCode, Value) {
    let response = router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn status_endpoint_reports_counts() {
    let fx = fixture();
    let (status, body) = get_json(&fx.state, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);
    assert!(body["events_dropped"].is_number());
}

#[tokio::test]
async fn backlog_endpoints() {
    let fx = fixture();
    let (status, body) = get_json(&fx.state, "/api/backlog").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counts"]["total"], 2);
    assert_eq!(body["counts"]["completed"], 1);

    let (status, body) = get_json(&fx.state, "/api/backlog/f1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "f1");

    let (status, _) = get_json(&fx.state, "/api/backlog/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cost_aggregation_per_model_and_days_filter() {
    let fx = fixture();
    // Two sessions: (input=1000, output=500, model=m1) and
    // (input=2000, output=200, cache_read=100, model=m2).
    fx.history
        .append(record(
            "s1",
            Some("f0"),
            "m1",
            UsageTotals { input: 1000, output: 500, ..Default::default() },
            0.03,
        ))
        .unwrap();
    fx.history
        .append(record(
            "s2",
            Some("f0"),
            "m2",
            UsageTotals { input: 2000, output: 200, cache_read: 100, ..Default::default() },
            0.04,
        ))
        .unwrap();
    // An old session outside the window.
    let mut old = record("s0", None, "m1", UsageTotals { input: 9999, output: 1, ..Default::default() }, 9.0);
    old.ended_at = Utc::now() - Duration::days(30);
    fx.history.append(old).unwrap();

    let (status, body) = get_json(&fx.state, "/api/sessions/costs?days=7").await;
    assert_eq!(status, StatusCode::OK);

    // Per-model sums equal the inputs.
    assert_eq!(body["per_model"]["m1"]["usage"]["input"], 1000);
    assert_eq!(body["per_model"]["m1"]["usage"]["output"], 500);
    assert_eq!(body["per_model"]["m2"]["usage"]["input"], 2000);
    assert_eq!(body["per_model"]["m2"]["usage"]["cache_read"], 100);

    // Totals equal the sum of per-session values.
    assert_eq!(body["totals"]["input"], 3000);
    assert_eq!(body["totals"]["output"], 700);
    assert_eq!(body["session_count"], 2);
    assert!((body["total_cost_usd"].as_f64().unwrap() - 0.07).abs() < 1e-9);

    // Without the filter the old session counts too.
    let (_, body_all) = get_json(&fx.state, "/api/sessions/costs").await;
    assert_eq!(body_all["session_count"], 3);
    assert!((body_all["total_cost_usd"].as_f64().unwrap() - 9.07).abs() < 1e-9);
}

#[tokio::test]
async fn sessions_pagination_and_filters() {
    let fx = fixture();
    for i in 0..25 {
        let feature = if i % 2 == 0 { Some("f1") } else { Some("f0") };
        let mut r = record(
            &format!("s{i:03}"),
            feature,
            "m1",
            UsageTotals::default(),
            0.0,
        );
        r.started_at = Utc::now() + Duration::seconds(i);
        if i == 3 {
            r.outcome = SessionOutcome::Handoff;
        }
        fx.history.append(r).unwrap();
    }

    let (status, body) = get_json(&fx.state, "/api/sessions?page=1&page_size=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 25);
    assert_eq!(body["sessions"].as_array().unwrap().len(), 10);
    // Newest first.
    assert_eq!(body["sessions"][0]["session_id"], "s024");

    let (_, page3) = get_json(&fx.state, "/api/sessions?page=3&page_size=10").await;
    assert_eq!(page3["sessions"].as_array().unwrap().len(), 5);

    let (_, filtered) = get_json(&fx.state, "/api/sessions?feature_id=f1").await;
    assert_eq!(filtered["total"], 13);

    let (_, by_outcome) = get_json(&fx.state, "/api/sessions?outcome=handoff").await;
    assert_eq!(by_outcome["total"], 1);
    assert_eq!(by_outcome["sessions"][0]["session_id"], "s003");

    let (status, one) = get_json(&fx.state, "/api/sessions/s003").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(one["outcome"], "handoff");

    let (status, _) = get_json(&fx.state, "/api/sessions/snope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn progress_endpoints() {
    let fx = fixture();
    let (status, body) = get_json(&fx.state, "/api/progress?lines=2").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["content"].as_str().is_some());

    let (status, full) = get_json(&fx.state, "/api/progress/full").await;
    assert_eq!(status, StatusCode::OK);
    assert!(full["content"].as_str().unwrap().contains("starting out"));
}

#[tokio::test]
async fn projections_endpoint() {
    let fx = fixture();
    fx.history
        .append(record("s1", Some("f0"), "m1", UsageTotals::default(), 2.0))
        .unwrap();

    let (status, body) = get_json(&fx.state, "/api/projections").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["features_completed"], 1);
    assert_eq!(body["features_remaining"], 1);
    assert!((body["avg_cost_per_feature"].as_f64().unwrap() - 2.0).abs() < 1e-9);
    assert_eq!(body["confidence"], "low");
}

#[tokio::test]
async fn timeline_endpoint() {
    let fx = fixture();
    fx.history
        .append(record("s1", Some("f1"), "m1", UsageTotals::default(), 0.0))
        .unwrap();

    let (status, body) = get_json(&fx.state, "/api/timeline").await;
    assert_eq!(status, StatusCode::OK);
    let features = body["features"].as_array().unwrap();
    assert_eq!(features.len(), 2);
    let f1 = features.iter().find(|f| f["feature_id"] == "f1").unwrap();
    assert_eq!(f1["sessions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn alert_lifecycle_over_http() {
    let fx = fixture();
    let alert = fx
        .state
        .alerts
        .add(AlertDraft::new(
            AlertSeverity::Error,
            "session_failed",
            "Session s001 failed",
            "it broke",
        ))
        .unwrap();

    let (status, body) = get_json(&fx.state, "/api/alerts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alerts"].as_array().unwrap().len(), 1);
    assert_eq!(body["unread_count"], 1);

    let (_, count) = get_json(&fx.state, "/api/alerts/unread/count").await;
    assert_eq!(count, 1);

    let (status, _) = post_json(&fx.state, &format!("/api/alerts/{}/read", alert.id)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, count) = get_json(&fx.state, "/api/alerts/unread/count").await;
    assert_eq!(count, 0);

    let (status, _) = post_json(&fx.state, &format!("/api/alerts/{}/dismiss", alert.id)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = get_json(&fx.state, "/api/alerts").await;
    assert!(body["alerts"].as_array().unwrap().is_empty());
    let (_, body) = get_json(&fx.state, "/api/alerts?include_dismissed=true").await;
    assert_eq!(body["alerts"].as_array().unwrap().len(), 1);

    let (status, _) = post_json(&fx.state, "/api/alerts/ghost/read").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    fx.state
        .alerts
        .add(AlertDraft::new(AlertSeverity::Info, "k", "t", "m"))
        .unwrap();
    let (status, body) = post_json(&fx.state, "/api/alerts/read-all").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marked"], 1);
}
