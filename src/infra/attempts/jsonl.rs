//! File-backed attempt store using JSON lines.
//!
//! Every insert or update appends the full record; on open the file is replayed
//! and the last record per attempt id wins. `compact` rewrites the file with
//! one line per attempt.

use std::collections::HashMap;
use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::core::attempt_log::{is_claimable, merge_feedback, AttemptStore};
use crate::core::error::EngineError;
use crate::core::model::{Feedback, SendAttempt};
use crate::util::serde::{AttemptId, ResourceId};

/// Durable attempt log in `<dir>/<stream>.jsonl`.
pub struct JsonlAttemptStore {
    path: PathBuf,
    attempts: Mutex<HashMap<AttemptId, SendAttempt>>,
}

impl JsonlAttemptStore {
    /// Open (or create) the log and replay it.
    pub fn open(dir: impl AsRef<Path>, stream: &str) -> Result<Self, EngineError> {
        let dir = dir.as_ref();
        create_dir_all(dir)?;
        let store = Self {
            path: dir.join(format!("{stream}.jsonl")),
            attempts: Mutex::new(HashMap::new()),
        };
        let loaded = store.load_from_disk()?;
        tracing::info!("replayed {} attempts from {}", loaded, store.path.display());
        Ok(store)
    }

    fn load_from_disk(&self) -> Result<usize, EngineError> {
        if !self.path.exists() {
            return Ok(0);
        }
        let file = OpenOptions::new().read(true).open(&self.path)?;
        let mut attempts = self.attempts.lock();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let attempt: SendAttempt = serde_json::from_str(&line)?;
            attempts.insert(attempt.id, attempt);
        }
        Ok(attempts.len())
    }

    fn append_to_disk(&self, attempts: &[&SendAttempt]) -> Result<(), EngineError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for attempt in attempts {
            writeln!(file, "{}", serde_json::to_string(attempt)?)?;
        }
        Ok(())
    }

    /// Rewrite the log with only the latest record of each attempt.
    pub fn compact(&self) -> Result<(), EngineError> {
        let attempts = self.attempts.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        let mut ordered: Vec<&SendAttempt> = attempts.values().collect();
        ordered.sort_by_key(|a| (a.created_at, a.id));
        for attempt in ordered {
            writeln!(file, "{}", serde_json::to_string(attempt)?)?;
        }
        Ok(())
    }

    /// Location of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AttemptStore for JsonlAttemptStore {
    fn insert(&self, attempt: SendAttempt) -> Result<(), EngineError> {
        let mut attempts = self.attempts.lock();
        self.append_to_disk(&[&attempt])?;
        attempts.insert(attempt.id, attempt);
        Ok(())
    }

    fn update(&self, mut attempt: SendAttempt) -> Result<(), EngineError> {
        let mut attempts = self.attempts.lock();
        let Some(stored) = attempts.get(&attempt.id) else {
            return Err(EngineError::Backend(format!("unknown attempt {}", attempt.id)));
        };
        merge_feedback(&mut attempt, stored);
        self.append_to_disk(&[&attempt])?;
        attempts.insert(attempt.id, attempt);
        Ok(())
    }

    fn get(&self, id: AttemptId) -> Result<Option<SendAttempt>, EngineError> {
        Ok(self.attempts.lock().get(&id).cloned())
    }

    fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<SendAttempt>, EngineError> {
        let mut attempts = self.attempts.lock();
        let mut due: Vec<SendAttempt> = attempts
            .values()
            .filter(|a| is_claimable(a, now, lease))
            .cloned()
            .collect();
        due.sort_by_key(|a| (a.scheduled_for, a.id));
        due.truncate(limit);
        for attempt in &mut due {
            attempt.claimed_at = Some(now);
        }
        self.append_to_disk(&due.iter().collect::<Vec<_>>())?;
        for attempt in &due {
            attempts.insert(attempt.id, attempt.clone());
        }
        Ok(due)
    }

    fn dispatched_since(
        &self,
        resource_id: &ResourceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<SendAttempt>, EngineError> {
        Ok(self
            .attempts
            .lock()
            .values()
            .filter(|a| &a.resource_id == resource_id && a.dispatched_at.is_some_and(|at| at >= since))
            .cloned()
            .collect())
    }

    fn add_feedback(&self, id: AttemptId, feedback: Feedback) -> Result<bool, EngineError> {
        let mut attempts = self.attempts.lock();
        let Some(attempt) = attempts.get(&id) else {
            return Ok(false);
        };
        if attempt.feedback.contains(&feedback) {
            return Ok(true);
        }
        let mut updated = attempt.clone();
        updated.feedback.push(feedback);
        self.append_to_disk(&[&updated])?;
        attempts.insert(id, updated);
        Ok(true)
    }
}
