//! SQLite-backed counter store shared by scheduler processes on one host.
//!
//! Every consumption runs in a `BEGIN IMMEDIATE` transaction, which takes the
//! database write lock before the cap check, so processes holding their own
//! connection to the same file serialize on it. The grants table makes a
//! second consumption with the same idempotency key a no-op.

use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDate, Weekday};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::core::channel::Channel;
use crate::core::error::EngineError;
use crate::core::rate_limiter::{ConsumeOutcome, CounterStore, WindowKey, WindowLimit};
use crate::util::serde::{AttemptId, ResourceId};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS rate_windows (
    resource_id TEXT NOT NULL,
    channel TEXT NOT NULL,
    window_key TEXT NOT NULL,
    ends_on TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (resource_id, channel, window_key)
);
CREATE TABLE IF NOT EXISTS rate_grants (
    attempt_id TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    channel TEXT NOT NULL,
    window_key TEXT NOT NULL,
    ends_on TEXT NOT NULL,
    PRIMARY KEY (attempt_id, resource_id, channel, window_key)
);
CREATE INDEX IF NOT EXISTS idx_rate_windows_ends_on ON rate_windows (ends_on);
CREATE INDEX IF NOT EXISTS idx_rate_grants_ends_on ON rate_grants (ends_on);
";

/// Wait for another process's write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Counter store in a SQLite database file.
pub struct SqliteCounterStore {
    db: Mutex<Connection>,
}

impl SqliteCounterStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let db = Connection::open(path)?;
        db.busy_timeout(BUSY_TIMEOUT)?;
        db.execute_batch(SCHEMA)?;
        tracing::info!("opened rate counters at {}", path.display());
        Ok(Self { db: Mutex::new(db) })
    }

    /// Text form of a window key as stored in `window_key`.
    #[must_use]
    pub fn window_key_text(window: WindowKey) -> String {
        match window {
            WindowKey::Day(day) => format!("d:{day}"),
            WindowKey::Week { year, week } => format!("w:{year}-{week:02}"),
        }
    }
}

/// First day after the window, as an ISO date that sorts as text.
fn ends_on(window: WindowKey) -> String {
    let end = match window {
        WindowKey::Day(day) => day.succ_opt(),
        WindowKey::Week { year, week } => NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
            .and_then(|monday| monday.checked_add_days(chrono::Days::new(7))),
    };
    end.map_or_else(|| NaiveDate::MAX.to_string(), |day| day.to_string())
}

fn count_in(
    db: &Connection,
    resource_id: &ResourceId,
    channel: Channel,
    window: WindowKey,
) -> Result<u32, rusqlite::Error> {
    Ok(db
        .query_row(
            "SELECT count FROM rate_windows WHERE resource_id = ?1 AND channel = ?2 AND window_key = ?3",
            params![
                resource_id.as_str(),
                channel.as_str(),
                SqliteCounterStore::window_key_text(window)
            ],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0))
}

fn has_grant(
    db: &Connection,
    key: AttemptId,
    resource_id: &ResourceId,
    channel: Channel,
    window: WindowKey,
) -> Result<bool, rusqlite::Error> {
    let found: i64 = db.query_row(
        "SELECT COUNT(*) FROM rate_grants
         WHERE attempt_id = ?1 AND resource_id = ?2 AND channel = ?3 AND window_key = ?4",
        params![
            key.to_string(),
            resource_id.as_str(),
            channel.as_str(),
            SqliteCounterStore::window_key_text(window)
        ],
        |row| row.get(0),
    )?;
    Ok(found > 0)
}

fn remaining_in(
    db: &Connection,
    resource_id: &ResourceId,
    channel: Channel,
    limits: &[WindowLimit],
) -> Result<u32, rusqlite::Error> {
    let mut remaining = None;
    for limit in limits {
        let left = limit
            .cap
            .saturating_sub(count_in(db, resource_id, channel, limit.window)?);
        remaining = Some(remaining.map_or(left, |r: u32| r.min(left)));
    }
    Ok(remaining.unwrap_or(0))
}

impl CounterStore for SqliteCounterStore {
    fn try_increment(
        &self,
        resource_id: &ResourceId,
        channel: Channel,
        limits: &[WindowLimit],
        idempotency_key: Option<AttemptId>,
    ) -> Result<ConsumeOutcome, EngineError> {
        let mut db = self.db.lock();
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(key) = idempotency_key {
            let mut seen = !limits.is_empty();
            for limit in limits {
                seen = seen && has_grant(&tx, key, resource_id, channel, limit.window)?;
            }
            if seen {
                return Ok(ConsumeOutcome::Granted {
                    remaining: remaining_in(&tx, resource_id, channel, limits)?,
                });
            }
        }

        for limit in limits {
            if count_in(&tx, resource_id, channel, limit.window)? >= limit.cap {
                return Ok(ConsumeOutcome::exceeded(limit.window));
            }
        }

        for limit in limits {
            let window = Self::window_key_text(limit.window);
            let ends = ends_on(limit.window);
            tx.execute(
                "INSERT INTO rate_windows (resource_id, channel, window_key, ends_on, count)
                 VALUES (?1, ?2, ?3, ?4, 1)
                 ON CONFLICT (resource_id, channel, window_key) DO UPDATE SET count = count + 1",
                params![resource_id.as_str(), channel.as_str(), window, ends],
            )?;
            if let Some(key) = idempotency_key {
                tx.execute(
                    "INSERT OR IGNORE INTO rate_grants
                     (attempt_id, resource_id, channel, window_key, ends_on)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![key.to_string(), resource_id.as_str(), channel.as_str(), window, ends],
                )?;
            }
        }
        let remaining = remaining_in(&tx, resource_id, channel, limits)?;
        tx.commit()?;
        Ok(ConsumeOutcome::Granted { remaining })
    }

    fn count(
        &self,
        resource_id: &ResourceId,
        channel: Channel,
        window: WindowKey,
    ) -> Result<u32, EngineError> {
        let db = self.db.lock();
        Ok(count_in(&db, resource_id, channel, window)?)
    }

    fn release(
        &self,
        resource_id: &ResourceId,
        channel: Channel,
        windows: &[WindowKey],
        key: AttemptId,
    ) -> Result<bool, EngineError> {
        let mut db = self.db.lock();
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut released = false;
        for window in windows {
            let window = Self::window_key_text(*window);
            let removed = tx.execute(
                "DELETE FROM rate_grants
                 WHERE attempt_id = ?1 AND resource_id = ?2 AND channel = ?3 AND window_key = ?4",
                params![key.to_string(), resource_id.as_str(), channel.as_str(), window],
            )?;
            if removed > 0 {
                tx.execute(
                    "UPDATE rate_windows SET count = count - 1
                     WHERE resource_id = ?1 AND channel = ?2 AND window_key = ?3 AND count > 0",
                    params![resource_id.as_str(), channel.as_str(), window],
                )?;
                released = true;
            }
        }
        tx.commit()?;
        Ok(released)
    }

    fn prune_before(&self, day: NaiveDate) -> Result<usize, EngineError> {
        let mut db = self.db.lock();
        let tx = db.transaction()?;
        let cutoff = day.to_string();
        let removed = tx.execute("DELETE FROM rate_windows WHERE ends_on <= ?1", params![cutoff])?;
        tx.execute("DELETE FROM rate_grants WHERE ends_on <= ?1", params![cutoff])?;
        tx.commit()?;
        if removed > 0 {
            tracing::debug!("pruned {} expired rate windows", removed);
        }
        Ok(removed)
    }
}
