//! Session persistence backed by `rusqlite`: a relational schema with
//! PK/FK relationships, parameter-bound writes, and one transaction per
//! stored session.

use std::path::Path;

use rusqlite::{params, Connection};

use crate::correlator::Session;
use crate::error::Result;

/// Opens (creating if absent) the SQLite database and ensures the schema
/// exists.
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS measurement_sessions (
                session_id TEXT PRIMARY KEY,
                code_version TEXT,
                file_path TEXT NOT NULL,
                language TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                total_joules REAL NOT NULL,
                average_watts REAL NOT NULL,
                peak_watts REAL NOT NULL,
                checkpoint_count INTEGER NOT NULL,
                duration_seconds REAL NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS measurements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES measurement_sessions(session_id),
                source TEXT,
                joules REAL NOT NULL,
                watts REAL NOT NULL,
                temperature REAL,
                timestamp INTEGER NOT NULL,
                checkpoint_id TEXT,
                checkpoint_type TEXT,
                function_name TEXT,
                line_number INTEGER,
                column_number INTEGER,
                context TEXT,
                duration_ms REAL
            );

            CREATE TABLE IF NOT EXISTS function_energy_stats (
                session_id TEXT NOT NULL REFERENCES measurement_sessions(session_id),
                function_name TEXT NOT NULL,
                total_joules REAL NOT NULL,
                avg_joules REAL NOT NULL,
                max_joules REAL NOT NULL,
                min_joules REAL NOT NULL,
                call_count INTEGER NOT NULL,
                PRIMARY KEY (session_id, function_name)
            );

            CREATE TABLE IF NOT EXISTS energy_timeline (
                session_id TEXT NOT NULL REFERENCES measurement_sessions(session_id),
                timestamp_bucket INTEGER NOT NULL,
                avg_watts REAL NOT NULL,
                max_watts REAL NOT NULL,
                total_joules REAL NOT NULL,
                measurement_count INTEGER NOT NULL,
                PRIMARY KEY (session_id, timestamp_bucket)
            );
            ",
        )?;
        Ok(())
    }

    /// Persists a whole session in a single transaction: the session
    /// summary row, one row per checkpoint with energy data, per-function
    /// aggregate stats, and a coarse one-second-bucket timeline.
    pub fn store_session(&mut self, session: &Session, created_at: i64) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO measurement_sessions
                (session_id, code_version, file_path, language, start_time, end_time,
                 total_joules, average_watts, peak_watts, checkpoint_count, duration_seconds, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                session.session_id,
                "1.0",
                session.source_file_path,
                session.language,
                session.start_time_ns as i64,
                session.end_time_ns as i64,
                session.total_energy_joules,
                session.average_power_watts,
                session.peak_power_watts,
                session.checkpoints.len() as i64,
                (session.end_time_ns.saturating_sub(session.start_time_ns)) as f64 / 1e9,
                created_at,
            ],
        )?;

        {
            let mut insert_measurement = tx.prepare(
                "INSERT INTO measurements
                    (session_id, source, joules, watts, temperature, timestamp, checkpoint_id,
                     checkpoint_type, function_name, line_number, column_number, context, duration_ms)
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for checkpoint in &session.checkpoints {
                if !checkpoint.has_energy_data {
                    continue;
                }
                insert_measurement.execute(params![
                    session.session_id,
                    "nemb",
                    checkpoint.energy_consumed_joules,
                    checkpoint.power_consumed_watts,
                    checkpoint.timestamp_ns as i64,
                    checkpoint.checkpoint.id,
                    checkpoint.checkpoint.checkpoint_type.as_key(),
                    checkpoint.checkpoint.name,
                    checkpoint.checkpoint.line as i64,
                    checkpoint.checkpoint.column as i64,
                    checkpoint.checkpoint.context,
                    checkpoint.duration_seconds * 1000.0,
                ])?;
            }
        }

        {
            let mut insert_stats = tx.prepare(
                "INSERT OR REPLACE INTO function_energy_stats
                    (session_id, function_name, total_joules, avg_joules, max_joules, min_joules, call_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (function_name, stats) in function_stats(session) {
                insert_stats.execute(params![
                    session.session_id,
                    function_name,
                    stats.total,
                    stats.total / stats.count as f64,
                    stats.max,
                    stats.min,
                    stats.count as i64,
                ])?;
            }
        }

        {
            let mut insert_timeline = tx.prepare(
                "INSERT OR REPLACE INTO energy_timeline
                    (session_id, timestamp_bucket, avg_watts, max_watts, total_joules, measurement_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (bucket, stats) in timeline_buckets(session) {
                insert_timeline.execute(params![
                    session.session_id,
                    bucket,
                    stats.total_watts / stats.count as f64,
                    stats.max_watts,
                    stats.total_joules,
                    stats.count as i64,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn session_exists(&self, session_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM measurement_sessions WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn session_summary(&self, session_id: &str) -> Result<Option<SessionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, file_path, language, total_joules, average_watts, peak_watts,
                    checkpoint_count, duration_seconds
             FROM measurement_sessions WHERE session_id = ?1",
        )?;
        let mut rows = stmt.query(params![session_id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(SessionSummary {
            session_id: row.get(0)?,
            file_path: row.get(1)?,
            language: row.get(2)?,
            total_joules: row.get(3)?,
            average_watts: row.get(4)?,
            peak_watts: row.get(5)?,
            checkpoint_count: row.get::<_, i64>(6)? as u64,
            duration_seconds: row.get(7)?,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub file_path: String,
    pub language: String,
    pub total_joules: f64,
    pub average_watts: f64,
    pub peak_watts: f64,
    pub checkpoint_count: u64,
    pub duration_seconds: f64,
}

struct FunctionStats {
    total: f64,
    max: f64,
    min: f64,
    count: u64,
}

fn function_stats(session: &Session) -> Vec<(String, FunctionStats)> {
    let mut map: std::collections::HashMap<String, FunctionStats> = std::collections::HashMap::new();
    for checkpoint in session.checkpoints.iter().filter(|c| c.has_energy_data) {
        let entry = map
            .entry(checkpoint.checkpoint.name.clone())
            .or_insert(FunctionStats { total: 0.0, max: f64::MIN, min: f64::MAX, count: 0 });
        entry.total += checkpoint.energy_consumed_joules;
        entry.max = entry.max.max(checkpoint.energy_consumed_joules);
        entry.min = entry.min.min(checkpoint.energy_consumed_joules);
        entry.count += 1;
    }
    map.into_iter().collect()
}

struct TimelineStats {
    total_watts: f64,
    max_watts: f64,
    total_joules: f64,
    count: u64,
}

fn timeline_buckets(session: &Session) -> Vec<(i64, TimelineStats)> {
    let mut buckets: std::collections::HashMap<i64, TimelineStats> = std::collections::HashMap::new();
    for checkpoint in session.checkpoints.iter().filter(|c| c.has_energy_data) {
        let bucket = (checkpoint.timestamp_ns / 1_000_000_000) as i64;
        let entry = buckets
            .entry(bucket)
            .or_insert(TimelineStats { total_watts: 0.0, max_watts: 0.0, total_joules: 0.0, count: 0 });
        entry.total_watts += checkpoint.power_consumed_watts;
        entry.max_watts = entry.max_watts.max(checkpoint.power_consumed_watts);
        entry.total_joules += checkpoint.energy_consumed_joules;
        entry.count += 1;
    }
    buckets.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::{Checkpoint, CheckpointType, TimedCheckpoint};
    use std::collections::HashMap;

    fn sample_session() -> Session {
        Session {
            session_id: "s1".into(),
            source_file_path: "main.py".into(),
            language: "python".into(),
            start_time_ns: 0,
            end_time_ns: 1_000_000_000,
            checkpoints: vec![TimedCheckpoint {
                checkpoint: Checkpoint {
                    id: "c1".into(),
                    checkpoint_type: CheckpointType::FunctionEnter,
                    name: "main".into(),
                    line: 1,
                    column: 0,
                    context: String::new(),
                },
                timestamp_ns: 0,
                energy_before: None,
                energy_after: None,
                energy_consumed_joules: 1.5,
                power_consumed_watts: 3.0,
                duration_seconds: 0.5,
                has_energy_data: true,
                source_lines_covered: Vec::new(),
            }],
            total_energy_joules: 1.5,
            average_power_watts: 3.0,
            peak_power_watts: 3.0,
            line_energy_map: HashMap::new(),
            original_source_lines: Vec::new(),
        }
    }

    #[test]
    fn store_then_read_back_session_summary() {
        let mut store = SessionStore::open_in_memory().unwrap();
        store.store_session(&sample_session(), 1_700_000_000).unwrap();
        let summary = store.session_summary("s1").unwrap().unwrap();
        assert_eq!(summary.checkpoint_count, 1);
        assert!((summary.total_joules - 1.5).abs() < 1e-9);
    }

    #[test]
    fn session_exists_is_false_before_store() {
        let store = SessionStore::open_in_memory().unwrap();
        assert!(!store.session_exists("missing").unwrap());
    }

    #[test]
    fn store_session_is_idempotent_under_replace() {
        let mut store = SessionStore::open_in_memory().unwrap();
        let session = sample_session();
        store.store_session(&session, 1).unwrap();
        store.store_session(&session, 2).unwrap();
        let summary = store.session_summary("s1").unwrap().unwrap();
        assert_eq!(summary.checkpoint_count, 1);
    }
}
