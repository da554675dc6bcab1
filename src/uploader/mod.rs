//! The seam between the batch worker and object storage.

use anyhow::Result;
use bytes::Bytes;

mod oss;

pub use oss::OssUploader;

/// Byte-blob PUT into an object-storage bucket.
///
/// Implementations set `Content-Type` and, when given, `Content-Encoding`,
/// and PUT `body` at `object_key` in their configured bucket. Errors
/// propagate to drive the worker's retry loop. The worker invokes `upload`
/// strictly sequentially; implementations do not need to support concurrent
/// calls.
#[async_trait::async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        object_key: &str,
        body: Bytes,
        content_type: &str,
        content_encoding: Option<&str>,
    ) -> Result<()>;

    /// Release underlying connections. Invoked once after the drain
    /// completes; failures are logged, never propagated.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
