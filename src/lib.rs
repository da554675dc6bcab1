//! In-process log shipper for S3-compatible object storage.
//!
//! Application code (or the bundled [`OssLogLayer`]) offers pre-encoded JSON
//! lines to a [`BatchSender`]; a single background task batches them under
//! count/bytes/time bounds, gzips the NDJSON payload and PUTs it to a bucket
//! with retry and a graceful drain on shutdown. Producers never perform I/O.

mod batch;
mod compress;
pub mod config;
mod layer;
mod metrics;
mod object_key;
mod queue;
mod retry;
mod sender;
mod uploader;
mod worker;

pub use config::{AppenderConfig, OssConfig, SenderConfig};
pub use layer::OssLogLayer;
pub use metrics::MetricsSnapshot;
pub use sender::{BatchSender, SenderState};
pub use uploader::{OssUploader, Uploader};
