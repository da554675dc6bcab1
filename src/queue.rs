//! Bounded record queue with configurable admission.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};

use crate::metrics::SenderMetrics;

/// Producer half of the record channel. Applies one of three admission
/// policies:
///
/// - drop-on-full: non-suspending, queue-full losses are counted;
/// - bounded wait, then unconditional block: loss-free back-pressure;
/// - unconditional block.
///
/// Empty records are rejected silently: they carry no payload and are not
/// losses. A closed channel (sender already shut down) is also silent; the
/// producer-facing surface never errors.
pub(crate) struct RecordQueue {
    tx: mpsc::Sender<Bytes>,
    drop_when_full: bool,
    offer_timeout: Option<Duration>,
    metrics: Arc<SenderMetrics>,
}

impl RecordQueue {
    pub fn bounded(
        capacity: usize,
        drop_when_full: bool,
        offer_timeout: Option<Duration>,
        metrics: Arc<SenderMetrics>,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                drop_when_full,
                offer_timeout,
                metrics,
            },
            rx,
        )
    }

    /// Admit one record, suspending under the loss-free policies. Cancelling
    /// the returned future while it waits for space counts the record as
    /// dropped.
    pub async fn offer(&self, record: Bytes) {
        if record.is_empty() {
            return;
        }
        if self.drop_when_full {
            self.try_admit(record);
            return;
        }

        let guard = CancelGuard::new(&self.metrics);
        match self.offer_timeout {
            None => {
                let _ = self.tx.send(record).await;
            }
            Some(timeout) => match self.tx.send_timeout(record, timeout).await {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(record)) => {
                    // Still full after the bounded wait: block until space
                    // frees up rather than lose the record.
                    let _ = self.tx.send(record).await;
                }
                Err(SendTimeoutError::Closed(_)) => {}
            },
        }
        guard.defuse();
    }

    /// Never-suspending admission: queue-full records are counted as dropped
    /// regardless of the configured policy. Used on paths that must not park,
    /// such as the tracing layer.
    pub fn try_offer(&self, record: Bytes) {
        if record.is_empty() {
            return;
        }
        self.try_admit(record);
    }

    /// Admission from a non-runtime OS thread. Panics if called from within
    /// an async context; use `offer` there instead.
    pub fn blocking_offer(&self, record: Bytes) {
        if record.is_empty() {
            return;
        }
        if self.drop_when_full {
            self.try_admit(record);
            return;
        }
        // The bounded-wait policy degenerates to the same thing as waiting
        // forever (the timeout falls through to an unconditional block), so
        // both loss-free policies park until space is available.
        let _ = self.tx.blocking_send(record);
    }

    fn try_admit(&self, record: Bytes) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.metrics.record_dropped(),
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// Counts a drop unless defused: the analog of interrupted-while-waiting
/// accounting for cancelled offer futures.
struct CancelGuard<'a> {
    metrics: &'a SenderMetrics,
    armed: bool,
}

impl<'a> CancelGuard<'a> {
    fn new(metrics: &'a SenderMetrics) -> Self {
        Self {
            metrics,
            armed: true,
        }
    }

    fn defuse(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.metrics.record_dropped();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(
        capacity: usize,
        drop_when_full: bool,
        offer_timeout: Option<Duration>,
    ) -> (RecordQueue, mpsc::Receiver<Bytes>, Arc<SenderMetrics>) {
        let metrics = Arc::new(SenderMetrics::default());
        let (queue, rx) =
            RecordQueue::bounded(capacity, drop_when_full, offer_timeout, metrics.clone());
        (queue, rx, metrics)
    }

    #[tokio::test]
    async fn drop_policy_counts_overflow() {
        let (queue, _rx, metrics) = queue(1, true, None);
        queue.offer(Bytes::from_static(b"a")).await;
        queue.offer(Bytes::from_static(b"b")).await;
        queue.offer(Bytes::from_static(b"c")).await;
        assert_eq!(metrics.snapshot().dropped_records, 2);
    }

    #[tokio::test]
    async fn empty_records_are_ignored_not_dropped() {
        let (queue, mut rx, metrics) = queue(4, true, None);
        queue.offer(Bytes::new()).await;
        queue.try_offer(Bytes::new());
        assert_eq!(metrics.snapshot().dropped_records, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn blocking_policy_resumes_when_space_frees() {
        let (queue, mut rx, metrics) = queue(1, false, Some(Duration::from_millis(10)));
        let queue = Arc::new(queue);
        queue.offer(Bytes::from_static(b"a")).await;

        let waiting = Arc::clone(&queue);
        let offer = tokio::spawn(async move {
            waiting.offer(Bytes::from_static(b"b")).await;
        });

        // Give the offer time to hit the timeout and fall into the
        // unconditional wait, then free a slot.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(rx.recv().await.unwrap().as_ref(), b"a");

        offer.await.unwrap();
        assert_eq!(rx.recv().await.unwrap().as_ref(), b"b");
        assert_eq!(metrics.snapshot().dropped_records, 0);
    }

    #[tokio::test]
    async fn wait_forever_policy_never_drops() {
        let (queue, mut rx, metrics) = queue(1, false, None);
        let queue = Arc::new(queue);
        queue.offer(Bytes::from_static(b"a")).await;

        let waiting = Arc::clone(&queue);
        let offer = tokio::spawn(async move {
            waiting.offer(Bytes::from_static(b"b")).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(rx.recv().await.unwrap().as_ref(), b"a");
        offer.await.unwrap();
        assert_eq!(rx.recv().await.unwrap().as_ref(), b"b");
        assert_eq!(metrics.snapshot().dropped_records, 0);
    }

    #[tokio::test]
    async fn cancelled_offer_counts_as_dropped() {
        let (queue, _rx, metrics) = queue(1, false, None);
        queue.offer(Bytes::from_static(b"a")).await;

        let queue = Arc::new(queue);
        let waiting = Arc::clone(&queue);
        let offer = tokio::spawn(async move {
            waiting.offer(Bytes::from_static(b"b")).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        offer.abort();
        let _ = offer.await;

        assert_eq!(metrics.snapshot().dropped_records, 1);
    }

    #[tokio::test]
    async fn closed_channel_is_silent() {
        let (queue, rx, metrics) = queue(1, false, Some(Duration::from_millis(10)));
        drop(rx);
        queue.offer(Bytes::from_static(b"a")).await;
        queue.try_offer(Bytes::from_static(b"b"));
        assert_eq!(metrics.snapshot().dropped_records, 0);
    }

    #[tokio::test]
    async fn try_offer_counts_overflow() {
        let (queue, _rx, metrics) = queue(1, false, None);
        queue.try_offer(Bytes::from_static(b"a"));
        queue.try_offer(Bytes::from_static(b"b"));
        assert_eq!(metrics.snapshot().dropped_records, 1);
    }

    #[test]
    fn blocking_offer_from_plain_thread() {
        let (queue, mut rx, metrics) = queue(4, false, None);

        std::thread::spawn(move || {
            queue.blocking_offer(Bytes::from_static(b"a"));
        })
        .join()
        .unwrap();

        let received = rx.blocking_recv().unwrap();
        assert_eq!(received.as_ref(), b"a");
        assert_eq!(metrics.snapshot().dropped_records, 0);
    }
}
