//! End-to-end exercises of `Pipeline::process_heartbeat_recovery` against a
//! real `SqliteStore` — deliberately never calls `Pipeline::start`, so no
//! scheduler tick or worker pool spins up and no network probe ever fires.
//! The heartbeat path is the one piece of the pipeline that's reachable
//! without a live probe target.

use asura::config::Config;
use asura::db::Db;
use asura::models::MonitorStatus;
use asura::pipeline::Pipeline;
use asura::store::{SqliteStore, Store};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_db_path(name: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("asura_test_pipeline_{name}_{n}_{}.db", std::process::id())).to_string_lossy().to_string()
}

fn build_pipeline(db_name: &str) -> (Arc<Pipeline>, Arc<dyn Store>) {
    let db = Db::new(&temp_db_path(db_name)).unwrap();
    db.conn()
        .execute(
            "INSERT INTO monitors (id, name, monitor_type, target, enabled, failure_threshold, success_threshold)
             VALUES ('m1', 'heartbeat monitor', 'heartbeat', '', 1, 1, 1)",
            [],
        )
        .unwrap();
    db.conn()
        .execute(
            "INSERT INTO heartbeats (monitor_id, token, grace_seconds, status) VALUES ('m1', 'secret-token', 30, 'pending')",
            [],
        )
        .unwrap();

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(db));
    let pipeline = Arc::new(Pipeline::new(Config::from_env(), store.clone()));
    (pipeline, store)
}

#[tokio::test]
async fn first_heartbeat_ping_is_accepted_without_forcing_a_status_transition() {
    // Per the classifier's transition table, a monitor that was never down
    // doesn't flip to `up` just because one result came back `up` — only
    // `down -> up` (at the success threshold) and `* -> down` (at the
    // failure threshold) are transitions. A pending monitor's first ping
    // is recorded but the status stays `pending`.
    let (pipeline, _store) = build_pipeline("ping_ok");
    let status = pipeline.process_heartbeat_recovery("secret-token").await.unwrap();
    assert_eq!(status, MonitorStatus::Pending);
}

#[tokio::test]
async fn heartbeat_ping_with_wrong_token_is_rejected() {
    let (pipeline, _store) = build_pipeline("ping_wrong_token");
    let err = pipeline.process_heartbeat_recovery("not-the-token").await.unwrap_err();
    assert_eq!(err, "token mismatch");
}

#[tokio::test]
async fn heartbeat_ping_with_unknown_token_is_rejected() {
    let (pipeline, _store) = build_pipeline("ping_unknown");
    let err = pipeline.process_heartbeat_recovery("never-seen").await.unwrap_err();
    assert_eq!(err, "unknown token");
}

#[tokio::test]
async fn repeated_pings_open_then_resolve_an_incident_on_a_missed_then_recovered_beat() {
    let (pipeline, store) = build_pipeline("ping_recovery");

    // First ping: monitor starts pending, no transition yet, no incident.
    let status = pipeline.process_heartbeat_recovery("secret-token").await.unwrap();
    assert_eq!(status, MonitorStatus::Pending);

    // Simulate a missed heartbeat by marking it down directly, the way the
    // heartbeat supervisor's sweep would, then recover it with a ping.
    store.update_monitor_after_check("m1", MonitorStatus::Down, 1, 0, "2026-01-01T00:00:00Z").await.unwrap();
    let (incident, created) = store.open_incident_if_none("m1", "missed heartbeat").await.unwrap();
    assert!(created);

    let status = pipeline.process_heartbeat_recovery("secret-token").await.unwrap();
    assert_eq!(status, MonitorStatus::Up);

    // The classifier's recovery event should have resolved the incident
    // that was open going into this ping.
    let (reopened, created_again) = store.open_incident_if_none("m1", "missed heartbeat again").await.unwrap();
    assert!(created_again);
    assert_ne!(reopened.id, incident.id);
}
