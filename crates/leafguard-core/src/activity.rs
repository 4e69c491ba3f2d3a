//! Operator-facing activity log.
//!
//! A bounded, append-only ring of recent events shown by `/logs`. Oldest
//! entries are evicted first; readers get an owned snapshot.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ActivityConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Warning,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityEntry {
    pub time: DateTime<Utc>,
    pub message: String,
    #[serde(rename = "type")]
    pub level: ActivityLevel,
}

#[derive(Debug)]
pub struct ActivityLog {
    capacity: usize,
    entries: Mutex<VecDeque<ActivityEntry>>,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn from_config(config: &ActivityConfig) -> Self {
        Self::new(config.capacity)
    }

    pub fn append(&self, level: ActivityLevel, message: impl Into<String>, time: DateTime<Utc>) {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(ActivityEntry {
            time,
            message: message.into(),
            level,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.append(ActivityLevel::Info, message, Utc::now());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.append(ActivityLevel::Warning, message, Utc::now());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.append(ActivityLevel::Success, message, Utc::now());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.append(ActivityLevel::Error, message, Utc::now());
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<ActivityEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ActivityEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_capacity() {
        let log = ActivityLog::new(3);
        for i in 0..10 {
            log.info(format!("event {i}"));
        }
        let entries = log.snapshot();
        assert_eq!(entries.len(), 3);
        let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["event 7", "event 8", "event 9"]);
    }

    #[test]
    fn level_serializes_as_type() {
        let log = ActivityLog::new(5);
        log.warning("sensor stale");
        let json = serde_json::to_value(&log.snapshot()[0]).unwrap();
        assert_eq!(json["type"], "warning");
        assert_eq!(json["message"], "sensor stale");
    }
}
