//! Append-only interaction history.
//!
//! Every completed pipeline cycle lands here as one record, in processing
//! order. Readers take snapshots; the writer never blocks on them beyond
//! the lock itself.

use std::collections::VecDeque;
use std::sync::Mutex;

/// One analyzed utterance with the labels and advice derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionRecord {
    /// 1-based position in processing order. Never reused, even after
    /// older records have been evicted.
    pub sequence: u64,
    /// Recognized text. Empty for cycles that failed before analysis.
    pub transcript: String,
    /// Sentiment label, e.g. "POSITIVE" or "UNKNOWN".
    pub sentiment: String,
    /// Tone label, e.g. "angry" or "UNKNOWN".
    pub tone: String,
    /// Coaching feedback line, or an "Error: ..." placeholder.
    pub feedback: String,
}

impl InteractionRecord {
    /// True when this record marks a failed cycle rather than a
    /// recognized utterance.
    pub fn is_error(&self) -> bool {
        self.transcript.is_empty()
    }
}

struct HistoryInner {
    records: VecDeque<InteractionRecord>,
    next_sequence: u64,
}

/// Shared in-memory history of interaction records.
///
/// A single pipeline worker appends; the dashboard server reads
/// snapshots concurrently. With a non-zero `limit` the oldest records
/// are evicted once the buffer is full, but sequence numbers keep
/// counting up so gaps in a trimmed history stay visible.
pub struct InteractionHistory {
    inner: Mutex<HistoryInner>,
    limit: usize,
}

impl InteractionHistory {
    /// Create a history retaining at most `limit` records. `limit == 0`
    /// means unbounded.
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Mutex::new(HistoryInner {
                records: VecDeque::new(),
                next_sequence: 1,
            }),
            limit,
        }
    }

    /// Append one record and return it with its assigned sequence number.
    pub fn append(
        &self,
        transcript: String,
        sentiment: String,
        tone: String,
        feedback: String,
    ) -> InteractionRecord {
        let mut inner = self.inner.lock().unwrap();
        let record = InteractionRecord {
            sequence: inner.next_sequence,
            transcript,
            sentiment,
            tone,
            feedback,
        };
        inner.next_sequence += 1;
        inner.records.push_back(record.clone());
        if self.limit > 0 {
            while inner.records.len() > self.limit {
                inner.records.pop_front();
            }
        }
        record
    }

    /// Copy of all currently retained records, oldest first.
    pub fn snapshot(&self) -> Vec<InteractionRecord> {
        let inner = self.inner.lock().unwrap();
        inner.records.iter().cloned().collect()
    }

    /// Number of currently retained records.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
