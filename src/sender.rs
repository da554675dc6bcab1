//! The public sender handle: admission, lifecycle, metrics.

use anyhow::Result;
use bytes::Bytes;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SenderConfig;
use crate::metrics::{MetricsSnapshot, SenderMetrics};
use crate::queue::RecordQueue;
use crate::uploader::Uploader;
use crate::worker::BatchWorker;

/// Overall budget for the shutdown drain; records still queued when it runs
/// out are lost.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a sender. Transitions are one-way:
/// `Running → Stopping → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Running,
    Stopping,
    Stopped,
}

const STATE_RUNNING: u8 = 0;
const STATE_STOPPING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Atomic state cell shared between the handle and the worker.
#[derive(Debug)]
pub(crate) struct SharedState(AtomicU8);

impl SharedState {
    fn new() -> Self {
        Self(AtomicU8::new(STATE_RUNNING))
    }

    pub fn get(&self) -> SenderState {
        match self.0.load(Ordering::Acquire) {
            STATE_RUNNING => SenderState::Running,
            STATE_STOPPING => SenderState::Stopping,
            _ => SenderState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire) == STATE_RUNNING
    }

    pub fn is_stopping(&self) -> bool {
        self.0.load(Ordering::Acquire) != STATE_RUNNING
    }

    /// Move `Running → Stopping`; returns whether this call won the race.
    fn begin_stop(&self) -> bool {
        self.0
            .compare_exchange(
                STATE_RUNNING,
                STATE_STOPPING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn mark_stopped(&self) {
        self.0.store(STATE_STOPPED, Ordering::Release);
    }
}

/// Handle to a running batch sender. Cheap to clone; all clones feed the same
/// queue and worker. Construction spawns the worker, so a `BatchSender` is
/// `Running` from the moment it exists.
///
/// Dropping every clone without calling [`shutdown`](Self::shutdown) closes
/// the queue; the worker then drains what is buffered and exits on its own,
/// though without the bounded wait that `shutdown` provides.
#[derive(Clone)]
pub struct BatchSender {
    inner: Arc<Inner>,
}

struct Inner {
    queue: RecordQueue,
    metrics: Arc<SenderMetrics>,
    state: Arc<SharedState>,
    uploader: Arc<dyn Uploader>,
    worker: Mutex<Option<JoinHandle<()>>>,
    exit_hook: Mutex<Option<JoinHandle<()>>>,
}

impl BatchSender {
    /// Validate `config`, spawn the worker task and return a running sender.
    /// Must be called within a tokio runtime.
    pub fn start(config: SenderConfig, uploader: Arc<dyn Uploader>) -> Result<Self> {
        config.validate()?;
        let config = config.normalized();

        let metrics = Arc::new(SenderMetrics::default());
        let state = Arc::new(SharedState::new());
        let (queue, rx) = RecordQueue::bounded(
            config.max_queue_size,
            config.drop_when_queue_full,
            config.offer_timeout(),
            Arc::clone(&metrics),
        );

        let install_exit_hook = config.install_exit_hook;
        let worker = BatchWorker::new(
            rx,
            Arc::clone(&uploader),
            config,
            Arc::clone(&metrics),
            Arc::clone(&state),
        );
        let worker_handle = tokio::spawn(worker.run());

        let sender = Self {
            inner: Arc::new(Inner {
                queue,
                metrics,
                state,
                uploader,
                worker: Mutex::new(Some(worker_handle)),
                exit_hook: Mutex::new(None),
            }),
        };

        if install_exit_hook {
            sender.install_exit_hook();
        }

        debug!("batch sender started");
        Ok(sender)
    }

    /// Submit one encoded record. Empty input is a no-op; offers against a
    /// sender that is no longer running are silently discarded. Never errors.
    /// May suspend under the loss-free admission policies.
    pub async fn offer(&self, line: impl Into<Bytes>) {
        if !self.inner.state.is_running() {
            return;
        }
        self.inner.queue.offer(line.into()).await;
    }

    /// Non-suspending offer for paths that must not park (the tracing layer
    /// uses this): a full queue counts the record as dropped regardless of
    /// the configured admission policy.
    pub fn try_offer(&self, line: impl Into<Bytes>) {
        if !self.inner.state.is_running() {
            return;
        }
        self.inner.queue.try_offer(line.into());
    }

    /// Offer from a non-runtime OS thread. Panics if called from within an
    /// async context; use [`offer`](Self::offer) there instead.
    pub fn blocking_offer(&self, line: impl Into<Bytes>) {
        if !self.inner.state.is_running() {
            return;
        }
        self.inner.queue.blocking_offer(line.into());
    }

    pub fn state(&self) -> SenderState {
        self.inner.state.get()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Drain and stop. Waits up to 5 s for the worker to empty the queue and
    /// flush the residual batch, then closes the uploader. Idempotent:
    /// concurrent and repeated calls (including via the exit hook) are
    /// no-ops, and losing the race does not wait for the drain.
    pub async fn shutdown(&self) {
        if !self.inner.state.begin_stop() {
            return;
        }
        debug!("batch sender stopping");

        if let Some(hook) = take_handle(&self.inner.exit_hook) {
            hook.abort();
        }

        if let Some(worker) = take_handle(&self.inner.worker) {
            let abort = worker.abort_handle();
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "worker task failed"),
                Err(_) => {
                    abort.abort();
                    warn!(
                        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                        "drain budget exhausted, remaining records were lost"
                    );
                }
            }
        }

        if let Err(err) = self.inner.uploader.close().await {
            warn!(error = %err, "uploader close failed");
        }

        self.inner.state.mark_stopped();
        debug!("batch sender stopped");
    }

    /// Spawn a task that drains the sender when the process receives ctrl-c.
    /// Fragile under container orchestration, hence togglable in config;
    /// failure to register is tolerated.
    fn install_exit_hook(&self) {
        let sender = self.clone();
        let hook = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    // deregister first: shutdown aborts the registered hook,
                    // and this task must survive to perform the drain
                    drop(take_handle(&sender.inner.exit_hook));
                    info!("shutdown signal received, draining log sender");
                    sender.shutdown().await;
                }
                Err(err) => {
                    warn!(error = %err, "failed to listen for shutdown signal");
                }
            }
        });
        if let Ok(mut slot) = self.inner.exit_hook.lock() {
            *slot = Some(hook);
        }
    }
}

fn take_handle(slot: &Mutex<Option<JoinHandle<()>>>) -> Option<JoinHandle<()>> {
    slot.lock().ok().and_then(|mut guard| guard.take())
}
