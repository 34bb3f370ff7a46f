//! Exercises `SqliteStore` against a real on-disk database, seeded with raw
//! SQL the way an admin surface would insert a monitor — `Store` has no
//! create-monitor operation of its own, that's out of scope here.

use asura::db::Db;
use asura::models::{EventType, HeartbeatStatus, IncidentStatus, MonitorStatus};
use asura::store::{SqliteStore, Store, StoreError};
use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_db_path(name: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("asura_test_{name}_{n}_{}.db", std::process::id())).to_string_lossy().to_string()
}

fn seed_monitor(db: &Db, id: &str, enabled: bool) {
    db.conn()
        .execute(
            "INSERT INTO monitors (id, name, monitor_type, target, enabled) VALUES (?1, ?2, 'http', 'https://example.com', ?3)",
            rusqlite::params![id, id, enabled as i64],
        )
        .unwrap();
}

#[tokio::test]
async fn get_monitor_returns_not_found_for_unknown_id() {
    let db = Db::new(&temp_db_path("get_monitor")).unwrap();
    let store = SqliteStore::new(db);
    let err = store.get_monitor("missing").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound));
}

#[tokio::test]
async fn list_enabled_monitors_excludes_disabled() {
    let db = Db::new(&temp_db_path("list_enabled")).unwrap();
    seed_monitor(&db, "m1", true);
    seed_monitor(&db, "m2", false);
    let store = SqliteStore::new(db);
    let monitors = store.list_enabled_monitors().await.unwrap();
    assert_eq!(monitors.len(), 1);
    assert_eq!(monitors[0].id, "m1");
}

#[tokio::test]
async fn open_incident_if_none_is_idempotent_per_monitor() {
    let db = Db::new(&temp_db_path("open_incident")).unwrap();
    seed_monitor(&db, "m1", true);
    let store = SqliteStore::new(db);

    let (first, created_first) = store.open_incident_if_none("m1", "probe failed").await.unwrap();
    assert!(created_first);
    assert_eq!(first.status, IncidentStatus::Open);

    let (second, created_second) = store.open_incident_if_none("m1", "probe failed again").await.unwrap();
    assert!(!created_second);
    assert_eq!(second.id, first.id);
    // The second call's cause is ignored — the already-open incident's
    // original cause is preserved, it isn't a create.
    assert_eq!(second.cause, "probe failed");
}

#[tokio::test]
async fn resolved_incident_allows_a_new_one_to_open() {
    let db = Db::new(&temp_db_path("resolve_reopen")).unwrap();
    seed_monitor(&db, "m1", true);
    let store = SqliteStore::new(db);

    let (incident, _) = store.open_incident_if_none("m1", "down").await.unwrap();
    store.transition_incident(&incident.id, IncidentStatus::Resolved, Some("system"), "2026-01-01T00:01:00Z").await.unwrap();

    let (reopened, created) = store.open_incident_if_none("m1", "down again").await.unwrap();
    assert!(created);
    assert_ne!(reopened.id, incident.id);
}

#[tokio::test]
async fn update_monitor_after_check_reports_not_found_for_unknown_monitor() {
    let db = Db::new(&temp_db_path("update_unknown")).unwrap();
    let store = SqliteStore::new(db);
    let err = store.update_monitor_after_check("missing", MonitorStatus::Up, 0, 1, "2026-01-01T00:00:00Z").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound));
}

#[tokio::test]
async fn list_enabled_channels_for_event_filters_by_subscribed_event() {
    let db = Db::new(&temp_db_path("channels")).unwrap();
    db.conn()
        .execute(
            "INSERT INTO notification_channels (id, name, channel_type, enabled, settings, events)
             VALUES ('c1', 'chan', 'webhook', 1, '{}', '[\"incident.created\"]')",
            [],
        )
        .unwrap();
    db.conn()
        .execute(
            "INSERT INTO notification_channels (id, name, channel_type, enabled, settings, events)
             VALUES ('c2', 'chan2', 'webhook', 1, '{}', '[\"incident.resolved\"]')",
            [],
        )
        .unwrap();
    let store = SqliteStore::new(db);

    let created = store.list_enabled_channels_for_event(EventType::IncidentCreated).await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].id, "c1");

    let resolved = store.list_enabled_channels_for_event(EventType::IncidentResolved).await.unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].id, "c2");
}

#[tokio::test]
async fn update_heartbeat_reflects_in_list_heartbeat_monitors() {
    let db = Db::new(&temp_db_path("heartbeat_update")).unwrap();
    db.conn()
        .execute(
            "INSERT INTO monitors (id, name, monitor_type, target, enabled) VALUES ('m1', 'm1', 'heartbeat', '', 1)",
            [],
        )
        .unwrap();
    db.conn()
        .execute(
            "INSERT INTO heartbeats (monitor_id, token, grace_seconds, status) VALUES ('m1', 'tok', 30, 'pending')",
            [],
        )
        .unwrap();
    let store = SqliteStore::new(db);

    store.update_heartbeat("m1", HeartbeatStatus::Up, "2026-01-01T00:00:00Z").await.unwrap();
    let monitors = store.list_heartbeat_monitors().await.unwrap();
    assert_eq!(monitors.len(), 1);
    assert_eq!(monitors[0].1.status, HeartbeatStatus::Up);
    assert_eq!(monitors[0].1.last_ping_at.as_deref(), Some("2026-01-01T00:00:00Z"));

    let err = store.update_heartbeat("missing", HeartbeatStatus::Up, "2026-01-01T00:00:00Z").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound));
}
