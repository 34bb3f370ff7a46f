use rusqlite::{Connection, Result};
use std::sync::{Mutex, MutexGuard};

/// Wraps a single SQLite connection behind a mutex, exactly like the
/// teacher's `Db` — single-writer/multiple-readers is acceptable per
/// the service's scale, and WAL mode lets readers proceed during a
/// writer's transaction.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
        let db = Db { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS monitors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                monitor_type TEXT NOT NULL DEFAULT 'http',
                target TEXT NOT NULL DEFAULT '',
                interval_seconds INTEGER NOT NULL DEFAULT 300,
                timeout_seconds INTEGER NOT NULL DEFAULT 10,
                enabled INTEGER NOT NULL DEFAULT 1,
                settings TEXT NOT NULL DEFAULT '{}',
                assertions TEXT NOT NULL DEFAULT '[]',
                track_changes INTEGER NOT NULL DEFAULT 0,
                failure_threshold INTEGER NOT NULL DEFAULT 3,
                success_threshold INTEGER NOT NULL DEFAULT 1,
                upside_down INTEGER NOT NULL DEFAULT 0,
                resend_interval INTEGER NOT NULL DEFAULT 0,
                group_id TEXT,
                proxy_id TEXT REFERENCES proxies(id) ON DELETE SET NULL,
                tags TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'pending',
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                consecutive_successes INTEGER NOT NULL DEFAULT 0,
                last_checked_at TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_monitors_enabled ON monitors(enabled);

            CREATE TABLE IF NOT EXISTS notification_channels (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                channel_type TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                settings TEXT NOT NULL DEFAULT '{}',
                events TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS monitor_channels (
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                channel_id TEXT NOT NULL REFERENCES notification_channels(id) ON DELETE CASCADE,
                PRIMARY KEY (monitor_id, channel_id)
            );

            CREATE TABLE IF NOT EXISTS check_results (
                id TEXT PRIMARY KEY,
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                checked_at TEXT NOT NULL DEFAULT (datetime('now')),
                status TEXT NOT NULL,
                response_time_ms INTEGER NOT NULL,
                status_code INTEGER,
                error_message TEXT,
                cert_expiry TEXT,
                dns_records TEXT,
                content_hash TEXT,
                raw_body_sample TEXT,
                seq INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_check_results_monitor ON check_results(monitor_id, checked_at DESC);
            CREATE INDEX IF NOT EXISTS idx_check_results_seq ON check_results(seq);

            CREATE TABLE IF NOT EXISTS incidents (
                id TEXT PRIMARY KEY,
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                monitor_name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                started_at TEXT NOT NULL DEFAULT (datetime('now')),
                acknowledged_at TEXT,
                acknowledged_by TEXT,
                resolved_at TEXT,
                resolved_by TEXT,
                cause TEXT NOT NULL,
                severity TEXT NOT NULL DEFAULT 'critical',
                seq INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_incidents_monitor ON incidents(monitor_id, started_at DESC);
            -- at most one non-resolved incident per monitor
            CREATE UNIQUE INDEX IF NOT EXISTS idx_incidents_one_open
                ON incidents(monitor_id) WHERE status <> 'resolved';

            CREATE TABLE IF NOT EXISTS incident_events (
                id TEXT PRIMARY KEY,
                incident_id TEXT NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
                event_type TEXT NOT NULL,
                message TEXT NOT NULL,
                at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_incident_events_incident ON incident_events(incident_id, at ASC);

            CREATE TABLE IF NOT EXISTS heartbeats (
                monitor_id TEXT PRIMARY KEY REFERENCES monitors(id) ON DELETE CASCADE,
                token TEXT NOT NULL UNIQUE,
                grace_seconds INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                last_ping_at TEXT
            );

            CREATE TABLE IF NOT EXISTS heartbeat_pings (
                id TEXT PRIMARY KEY,
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                received_at TEXT NOT NULL DEFAULT (datetime('now')),
                source_ip TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_heartbeat_pings_monitor ON heartbeat_pings(monitor_id, received_at DESC);

            CREATE TABLE IF NOT EXISTS maintenance_windows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                recurring TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS maintenance_window_monitors (
                window_id TEXT NOT NULL REFERENCES maintenance_windows(id) ON DELETE CASCADE,
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                PRIMARY KEY (window_id, monitor_id)
            );
            CREATE INDEX IF NOT EXISTS idx_mwm_monitor ON maintenance_window_monitors(monitor_id);

            CREATE TABLE IF NOT EXISTS proxies (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                protocol TEXT NOT NULL DEFAULT 'http',
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                auth_user TEXT,
                auth_pass TEXT,
                enabled INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS content_changes (
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                observed_at TEXT NOT NULL DEFAULT (datetime('now')),
                old_hash TEXT NOT NULL,
                new_hash TEXT NOT NULL,
                diff_summary TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_content_changes_monitor ON content_changes(monitor_id, observed_at DESC);

            CREATE TABLE IF NOT EXISTS notification_history (
                id TEXT PRIMARY KEY,
                channel_id TEXT NOT NULL,
                monitor_id TEXT NOT NULL,
                incident_id TEXT,
                event_type TEXT NOT NULL,
                status TEXT NOT NULL,
                attempt INTEGER NOT NULL DEFAULT 1,
                latency_ms INTEGER,
                error_message TEXT,
                sent_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_notification_history_monitor ON notification_history(monitor_id, sent_at DESC);
            CREATE INDEX IF NOT EXISTS idx_notification_history_dedupe ON notification_history(incident_id, attempt);

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;

        // Backfill seq the same way the teacher backfills cursor columns
        // after ALTER TABLE ADD COLUMN: walk rows in insertion order, assign
        // monotonically increasing sequence numbers.
        Self::backfill_seq(&conn, "check_results")?;
        Self::backfill_seq(&conn, "incidents")?;

        Ok(())
    }

    fn backfill_seq(conn: &Connection, table: &str) -> Result<()> {
        let needs: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE seq IS NULL"),
            [],
            |r| r.get(0),
        )?;
        if needs == 0 {
            return Ok(());
        }
        let order_col = if table == "check_results" { "checked_at" } else { "started_at" };
        let mut stmt = conn.prepare(&format!("SELECT id FROM {table} WHERE seq IS NULL ORDER BY {order_col} ASC, id ASC"))?;
        let ids: Vec<String> = stmt.query_map([], |row| row.get(0))?.filter_map(|r| r.ok()).collect();
        let max_seq: i64 = conn.query_row(&format!("SELECT COALESCE(MAX(seq), 0) FROM {table}"), [], |r| r.get(0))?;
        for (i, id) in ids.iter().enumerate() {
            conn.execute(
                &format!("UPDATE {table} SET seq = ?1 WHERE id = ?2"),
                rusqlite::params![max_seq + (i as i64) + 1, id],
            )?;
        }
        Ok(())
    }
}
