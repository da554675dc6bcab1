//! The single background consumer that turns queued records into uploads.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::batch::Batch;
use crate::compress;
use crate::config::SenderConfig;
use crate::metrics::SenderMetrics;
use crate::object_key::build_object_key;
use crate::retry::{with_retry, RetryPolicy};
use crate::sender::SharedState;
use crate::uploader::Uploader;

/// Bounded poll so the time trigger cannot starve while the queue is quiet.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub(crate) struct BatchWorker {
    rx: mpsc::Receiver<Bytes>,
    uploader: Arc<dyn Uploader>,
    config: SenderConfig,
    metrics: Arc<SenderMetrics>,
    state: Arc<SharedState>,
    /// A record popped during an opportunistic drain that would have
    /// overflowed the byte bound. The channel has no peek, so it is stashed
    /// here and seeds the next batch instead of being lost.
    carry: Option<Bytes>,
}

impl BatchWorker {
    pub fn new(
        rx: mpsc::Receiver<Bytes>,
        uploader: Arc<dyn Uploader>,
        config: SenderConfig,
        metrics: Arc<SenderMetrics>,
        state: Arc<SharedState>,
    ) -> Self {
        Self {
            rx,
            uploader,
            config,
            metrics,
            state,
            carry: None,
        }
    }

    pub async fn run(mut self) {
        let retry = self.config.retry_policy();
        let flush_interval = self.config.flush_interval();
        // Vec growth is one-time; cap the preallocation for huge configs.
        let mut batch = Batch::with_capacity(self.config.max_batch_count.min(16 * 1024));
        let mut last_flush = Instant::now();

        debug!("batch worker started");

        loop {
            // One record to seed or extend the batch: the stashed overflow
            // first, then the queue. While stopping, drain without waiting so
            // shutdown is not stretched by idle polls.
            let first = if let Some(record) = self.carry.take() {
                Some(record)
            } else if self.state.is_stopping() {
                match self.rx.try_recv() {
                    Ok(record) => Some(record),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                        self.flush(&mut batch, &retry).await;
                        break;
                    }
                }
            } else {
                match tokio::time::timeout(POLL_INTERVAL, self.rx.recv()).await {
                    Ok(Some(record)) => Some(record),
                    Ok(None) => {
                        // Every producer handle is gone; flush what is left
                        // and let the task end.
                        self.flush(&mut batch, &retry).await;
                        break;
                    }
                    Err(_) => None,
                }
            };

            if let Some(record) = first {
                // A first record larger than the byte bound still ships, as a
                // singleton batch: progress beats the strict bound.
                batch.push(record);
            }

            // Opportunistic drain under both bounds.
            while batch.len() < self.config.max_batch_count {
                match self.rx.try_recv() {
                    Ok(record) => {
                        if batch.fits(&record, self.config.max_batch_bytes) {
                            batch.push(record);
                        } else {
                            self.carry = Some(record);
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }

            let time_exceeded = last_flush.elapsed() >= flush_interval;
            let count_exceeded = batch.len() >= self.config.max_batch_count;
            let bytes_exceeded = batch.bytes() >= self.config.max_batch_bytes;

            if !batch.is_empty() && (time_exceeded || count_exceeded || bytes_exceeded) {
                self.flush(&mut batch, &retry).await;
                last_flush = Instant::now();
            }
            // An idle poll with an empty batch does not reset the flush
            // clock: the first record after a quiet period ships promptly.
        }

        debug!("batch worker stopped");
    }

    /// Encode, optionally compress, and upload the batch, then clear it.
    /// Failures land in the metrics surface; nothing propagates.
    async fn flush(&self, batch: &mut Batch, retry: &RetryPolicy) {
        if batch.is_empty() {
            return;
        }

        let record_count = batch.len();
        let raw = batch.encode_ndjson();
        let raw_bytes = raw.len();

        let (body, content_encoding) = if self.config.gzip {
            match compress::gzip(&raw) {
                Ok(compressed) => (compressed, Some("gzip")),
                Err(err) => {
                    warn!(error = %err, "gzip failed, uploading uncompressed");
                    self.metrics.record_error(format!("gzip failed: {}", err));
                    (raw, None)
                }
            }
        } else {
            (raw, None)
        };

        // The key suffix must match what actually ships, so it is built after
        // the compression outcome is known.
        let key = build_object_key(
            &self.config.object_key_prefix,
            &self.config.app_name,
            content_encoding.is_some(),
        );

        debug!(
            key = %key,
            records = record_count,
            raw_bytes,
            body_bytes = body.len(),
            "flushing batch"
        );

        let uploader = &self.uploader;
        let content_type = self.config.content_type.as_str();
        let result = with_retry(retry, || {
            let body = body.clone();
            let key = key.as_str();
            async move {
                uploader
                    .upload(key, body, content_type, content_encoding)
                    .await
            }
        })
        .await;

        match result {
            Ok(()) => {
                self.metrics.record_sent_batch(record_count as u64);
                debug!(key = %key, records = record_count, "batch uploaded");
            }
            Err(err) => {
                error!(
                    key = %key,
                    records = record_count,
                    error = %err,
                    "upload failed after retries, dropping batch"
                );
                self.metrics.record_error(err.to_string());
                self.metrics.record_upload_dropped(record_count as u64);
            }
        }

        batch.clear();
    }
}
