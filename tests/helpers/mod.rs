//! Shared test doubles for the integration tests.

#![allow(dead_code)] // each integration test binary uses a subset

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use logs2oss::Uploader;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded PUT, exactly as the worker handed it over.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub content_encoding: Option<String>,
}

/// In-memory uploader: records every call, optionally failing each one or
/// sleeping per call to simulate a slow store.
#[derive(Default)]
pub struct MockUploader {
    records: Mutex<Vec<UploadRecord>>,
    calls: AtomicU64,
    closes: AtomicU64,
    fail_always: bool,
    latency: Option<Duration>,
}

impl MockUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_always: true,
            ..Self::default()
        })
    }

    pub fn slow(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency: Some(latency),
            ..Self::default()
        })
    }

    pub fn records(&self) -> Vec<UploadRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Total records across all uploads.
    pub fn uploaded_records(&self) -> usize {
        self.records()
            .iter()
            .map(|r| r.body.iter().filter(|&&b| b == b'\n').count())
            .sum()
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Uploader for MockUploader {
    async fn upload(
        &self,
        object_key: &str,
        body: Bytes,
        content_type: &str,
        content_encoding: Option<&str>,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_always {
            bail!("injected upload failure");
        }
        self.records.lock().unwrap().push(UploadRecord {
            key: object_key.to_string(),
            body: body.to_vec(),
            content_type: content_type.to_string(),
            content_encoding: content_encoding.map(str::to_string),
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
