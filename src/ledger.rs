use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::outcome::Side;
use crate::session::{Feedback, UserId};

/// One closed recommendation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub recommendation: Side,
    pub feedback: Feedback,
    pub ts: i64,
}

impl LedgerRecord {
    /// Line used when the record is shown to the reasoning service.
    pub fn describe(&self) -> String {
        format!("recommended {} -> {}", self.recommendation, self.feedback.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub wins: u64,
    pub losses: u64,
}

impl LedgerSummary {
    pub fn total(&self) -> u64 {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.wins as f64 / self.total() as f64
        }
    }
}

/// User registry, activity log, recommendation ledger and reset log.
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("open ledger {}", path))?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                first_seen INTEGER NOT NULL,
                last_seen INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS activity (
                activity_id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                ts INTEGER NOT NULL,
                action TEXT NOT NULL,
                details TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS recommendations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                recommendation TEXT NOT NULL,
                outcome TEXT NOT NULL,
                ts INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS resets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                ts INTEGER NOT NULL,
                last_recommendation_id INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_recommendations_user_ts ON recommendations (user_id, ts);
            CREATE INDEX IF NOT EXISTS idx_resets_user_ts ON resets (user_id, ts);
            COMMIT;",
        )?;
        Ok(())
    }

    /// Register a user or bump `last_seen`.
    pub fn touch_user(&mut self, user_id: UserId, username: &str, ts: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO users (user_id, username, first_seen, last_seen) VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(user_id) DO UPDATE SET last_seen = excluded.last_seen, username = excluded.username",
            params![user_id, username, ts],
        )?;
        Ok(())
    }

    /// `(first_seen, last_seen)` for a registered user.
    pub fn user_seen(&self, user_id: UserId) -> Result<Option<(i64, i64)>> {
        let seen = self
            .conn
            .query_row(
                "SELECT first_seen, last_seen FROM users WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(seen)
    }

    pub fn log_activity(&mut self, user_id: UserId, action: &str, details: &str, ts: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO activity (user_id, ts, action, details) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, ts, action, details],
        )?;
        Ok(())
    }

    pub fn activity_count(&self, user_id: UserId) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM activity WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    pub fn record_recommendation(&mut self, user_id: UserId, record: &LedgerRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO recommendations (user_id, recommendation, outcome, ts) VALUES (?1, ?2, ?3, ?4)",
            params![
                user_id,
                record.recommendation.as_str(),
                record.feedback.as_str(),
                record.ts
            ],
        )?;
        Ok(())
    }

    /// Log a reset boundary. The boundary is the newest recommendation row at
    /// this moment, so scoping never depends on the clock.
    pub fn record_reset(&mut self, user_id: UserId, ts: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO resets (user_id, ts, last_recommendation_id)
             VALUES (?1, ?2, (SELECT COALESCE(MAX(id), 0) FROM recommendations))",
            params![user_id, ts],
        )?;
        Ok(())
    }

    #[cfg(test)]
    fn last_reset(&self, user_id: UserId) -> Result<Option<i64>> {
        let ts: Option<i64> = self.conn.query_row(
            "SELECT MAX(ts) FROM resets WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(ts)
    }

    /// Wins and losses recorded after the user's latest reset, or all of
    /// them when the user never reset.
    pub fn summary_since_reset(&self, user_id: UserId) -> Result<LedgerSummary> {
        let boundary: i64 = self
            .conn
            .query_row(
                "SELECT last_recommendation_id FROM resets WHERE user_id = ?1
                 ORDER BY id DESC LIMIT 1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        let mut stmt = self.conn.prepare(
            "SELECT outcome, COUNT(*) FROM recommendations
             WHERE user_id = ?1 AND id > ?2 GROUP BY outcome",
        )?;
        let rows = stmt.query_map(params![user_id, boundary], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut summary = LedgerSummary::default();
        for row in rows {
            let (outcome, n) = row?;
            match outcome.as_str() {
                "win" => summary.wins += n as u64,
                "loss" => summary.losses += n as u64,
                _ => {}
            }
        }
        Ok(summary)
    }

    /// Most recent `limit` records, oldest first.
    pub fn recent_records(&self, user_id: UserId, limit: usize) -> Result<Vec<LedgerRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT recommendation, outcome, ts FROM recommendations
             WHERE user_id = ?1 ORDER BY ts DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (rec, outcome, ts) = row?;
            let Ok(recommendation) = rec.parse::<Side>() else { continue };
            let feedback = match outcome.as_str() {
                "win" => Feedback::Win,
                "loss" => Feedback::Loss,
                _ => continue,
            };
            records.push(LedgerRecord { recommendation, feedback, ts });
        }
        records.reverse();
        Ok(records)
    }
}
