//! Bounded per-tool audit history
//!
//! One FIFO sequence of `ExecutionRecord`s per tool id, capped at
//! `max_entries` (oldest evicted first). The number of distinct tool ids is
//! capped as well: recording a new id at capacity drops the history that was
//! written to least recently, so callers cycling through unknown ids cannot
//! grow memory. Appends are serialized behind a mutex, so concurrent
//! executions never interleave partial records. Records land in completion
//! order.

use crate::types::ExecutionRecord;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Default number of records retained per tool
pub const MAX_HISTORY_ENTRIES: usize = 100;

/// Default number of distinct tool ids with retained history
pub const MAX_TRACKED_TOOLS: usize = 256;

#[derive(Debug, Default)]
struct ToolHistory {
    records: VecDeque<ExecutionRecord>,
    last_write: u64,
}

#[derive(Debug, Default)]
struct Histories {
    by_tool: HashMap<String, ToolHistory>,
    writes: u64,
}

/// Audit log shared by all executions of one executor
#[derive(Debug)]
pub struct AuditLog {
    histories: Mutex<Histories>,
    max_entries: usize,
    max_tools: usize,
}

impl AuditLog {
    /// Create audit log with default limits
    pub fn new() -> Self {
        Self::with_limits(MAX_HISTORY_ENTRIES, MAX_TRACKED_TOOLS)
    }

    /// Create audit log retaining `max_entries` records for each of at most
    /// `max_tools` tool ids (both minimum 1)
    pub fn with_limits(max_entries: usize, max_tools: usize) -> Self {
        Self {
            histories: Mutex::new(Histories::default()),
            max_entries: max_entries.max(1),
            max_tools: max_tools.max(1),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn max_tools(&self) -> usize {
        self.max_tools
    }

    // A panic while holding the lock cannot leave a half-written record,
    // so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, Histories> {
        self.histories
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a record, evicting the oldest if at capacity
    pub fn record(&self, record: ExecutionRecord) {
        let mut guard = self.lock();
        let histories = &mut *guard;
        histories.writes += 1;
        let write = histories.writes;

        if !histories.by_tool.contains_key(&record.tool_id)
            && histories.by_tool.len() >= self.max_tools
        {
            let stalest = histories
                .by_tool
                .iter()
                .min_by_key(|(_, h)| h.last_write)
                .map(|(id, _)| id.clone());
            if let Some(stalest) = stalest {
                debug!(tool_id = %stalest, "Evicting audit history");
                histories.by_tool.remove(&stalest);
            }
        }

        let history = histories.by_tool.entry(record.tool_id.clone()).or_default();
        while history.records.len() >= self.max_entries {
            history.records.pop_front();
        }
        history.records.push_back(record);
        history.last_write = write;
    }

    /// Snapshot of a tool's history, oldest first; empty for unknown tools
    pub fn history(&self, tool_id: &str) -> Vec<ExecutionRecord> {
        self.lock()
            .by_tool
            .get(tool_id)
            .map(|h| h.records.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Tool ids with retained history, sorted
    pub fn tool_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().by_tool.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Aggregate statistics over the retained records of a tool
    pub fn stats(&self, tool_id: &str) -> ToolStats {
        let mut stats = ToolStats::default();
        if let Some(history) = self.lock().by_tool.get(tool_id) {
            for record in &history.records {
                if record.is_success() {
                    stats.record_success(record.duration_ms);
                } else {
                    stats.record_failure(record.duration_ms);
                }
            }
        }
        stats
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Tool execution statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolStats {
    /// Total executions
    pub total_executions: u64,

    /// Successful executions
    pub successful_executions: u64,

    /// Failed executions
    pub failed_executions: u64,

    /// Total execution time (ms)
    pub total_duration_ms: u64,
}

impl ToolStats {
    pub fn record_success(&mut self, duration_ms: u64) {
        self.total_executions += 1;
        self.successful_executions += 1;
        self.total_duration_ms += duration_ms;
    }

    pub fn record_failure(&mut self, duration_ms: u64) {
        self.total_executions += 1;
        self.failed_executions += 1;
        self.total_duration_ms += duration_ms;
    }

    /// Calculate average duration
    pub fn average_duration_ms(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.total_executions as f64
        }
    }

    /// Calculate success rate
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.successful_executions as f64 / self.total_executions as f64
        }
    }
}
