//! Query trace recorder
//!
//! A bounded ring buffer of the most recent statements, their arguments,
//! duration and outcome.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use type_mapping::DbValue;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryTrace {
    pub database: String,
    pub statement: String,
    pub args: Vec<DbValue>,
    pub duration: Duration,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct TraceRecorder {
    capacity: usize,
    entries: Mutex<VecDeque<QueryTrace>>,
}

impl TraceRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, trace: QueryTrace) {
        if self.capacity == 0 {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            while entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(trace);
        }
    }

    /// Oldest first
    pub fn snapshot(&self) -> Vec<QueryTrace> {
        self.entries
            .lock()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(n: usize) -> QueryTrace {
        QueryTrace {
            database: "main".into(),
            statement: format!("SELECT {}", n),
            args: vec![],
            duration: Duration::from_millis(1),
            error: None,
            at: Utc::now(),
        }
    }

    #[test]
    fn test_ring_buffer_keeps_latest() {
        let recorder = TraceRecorder::new(3);
        for n in 0..5 {
            recorder.record(trace(n));
        }
        let statements: Vec<_> = recorder
            .snapshot()
            .into_iter()
            .map(|t| t.statement)
            .collect();
        assert_eq!(statements, vec!["SELECT 2", "SELECT 3", "SELECT 4"]);
    }

    #[test]
    fn test_zero_capacity_records_nothing() {
        let recorder = TraceRecorder::new(0);
        recorder.record(trace(1));
        assert!(recorder.snapshot().is_empty());
    }
}
