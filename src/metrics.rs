//! Counters shared between producers and the batch worker.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Monotonic counters plus the most recent error. Counters are written by
/// producers (`dropped_records`) and the worker (everything else); the error
/// slot sits off the hot path behind a mutex.
#[derive(Debug, Default)]
pub(crate) struct SenderMetrics {
    dropped_records: AtomicU64,
    sent_batches: AtomicU64,
    sent_records: AtomicU64,
    upload_dropped_records: AtomicU64,
    last_error: Mutex<Option<LastError>>,
}

#[derive(Debug, Clone)]
struct LastError {
    message: String,
    at: DateTime<Utc>,
}

impl SenderMetrics {
    pub fn record_dropped(&self) {
        self.dropped_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent_batch(&self, records: u64) {
        self.sent_batches.fetch_add(1, Ordering::Relaxed);
        self.sent_records.fetch_add(records, Ordering::Relaxed);
    }

    pub fn record_upload_dropped(&self, records: u64) {
        self.upload_dropped_records.fetch_add(records, Ordering::Relaxed);
    }

    pub fn record_error(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = Some(LastError {
                message: message.into(),
                at: Utc::now(),
            });
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let last_error = self.last_error.lock().ok().and_then(|slot| slot.clone());
        MetricsSnapshot {
            dropped_records: self.dropped_records.load(Ordering::Relaxed),
            sent_batches: self.sent_batches.load(Ordering::Relaxed),
            sent_records: self.sent_records.load(Ordering::Relaxed),
            upload_dropped_records: self.upload_dropped_records.load(Ordering::Relaxed),
            last_error_message: last_error.as_ref().map(|e| e.message.clone()),
            last_error_at: last_error.as_ref().map(|e| e.at),
        }
    }
}

/// Point-in-time view of the sender's counters.
///
/// `dropped_records` counts admission losses (queue full under the drop
/// policy, cancelled offers); records lost to exhausted upload retries are
/// tracked separately in `upload_dropped_records`.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub dropped_records: u64,
    pub sent_batches: u64,
    pub sent_records: u64,
    pub upload_dropped_records: u64,
    pub last_error_message: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = SenderMetrics::default();
        metrics.record_dropped();
        metrics.record_dropped();
        metrics.record_sent_batch(3);
        metrics.record_sent_batch(2);
        metrics.record_upload_dropped(5);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.dropped_records, 2);
        assert_eq!(snapshot.sent_batches, 2);
        assert_eq!(snapshot.sent_records, 5);
        assert_eq!(snapshot.upload_dropped_records, 5);
        assert!(snapshot.last_error_message.is_none());
        assert!(snapshot.last_error_at.is_none());
    }

    #[test]
    fn last_error_is_published_with_timestamp() {
        let metrics = SenderMetrics::default();
        metrics.record_error("boom");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.last_error_message.as_deref(), Some("boom"));
        assert!(snapshot.last_error_at.is_some());
    }

    #[test]
    fn newer_error_replaces_older() {
        let metrics = SenderMetrics::default();
        metrics.record_error("first");
        metrics.record_error("second");
        assert_eq!(
            metrics.snapshot().last_error_message.as_deref(),
            Some("second")
        );
    }
}
