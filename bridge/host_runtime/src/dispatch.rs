//! Single-consumer dispatch queue.
//!
//! Every handler invocation and every application-originated mutation is
//! enqueued here and run in arrival order by one worker, the only writer of
//! application state reached through the handler path. Enqueueing is safe from
//! any thread.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::error::{BridgeError, Result};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static ACTIVE_QUEUE: Cell<Option<u64>> = const { Cell::new(None) };
}

type JobFn = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

struct Job {
    label: String,
    run: JobFn,
}

/// Cloneable enqueue side of a [`DispatchQueue`].
#[derive(Clone)]
pub struct DispatchHandle {
    queue_id: u64,
    tx: Sender<Job>,
    cancel_tx: Sender<()>,
    cancelled: Arc<AtomicBool>,
    stopped: Receiver<()>,
    dropped: Arc<AtomicU64>,
    capacity: usize,
}

/// Worker side of the queue. Consumed by [`DispatchQueue::run`].
pub struct DispatchQueue {
    rx: Receiver<Job>,
    cancel_rx: Receiver<()>,
    handle: DispatchHandle,
    _alive: Sender<()>,
}

/// Fatal failure that stopped the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalReport {
    pub label: String,
    pub message: String,
    pub abandoned: usize,
}

impl DispatchQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = channel::bounded(capacity);
        let (cancel_tx, cancel_rx) = channel::bounded(1);
        let (alive_tx, stopped) = channel::bounded(0);

        let handle = DispatchHandle {
            queue_id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            tx,
            cancel_tx,
            cancelled: Arc::new(AtomicBool::new(false)),
            stopped,
            dropped: Arc::new(AtomicU64::new(0)),
            capacity,
        };

        Self {
            rx,
            cancel_rx,
            handle,
            _alive: alive_tx,
        }
    }

    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// Drains entries on the calling thread until cancelled.
    ///
    /// A job returning [`BridgeError::Fatal`] stops the worker and is reported
    /// as the result. Entries still queued when the loop stops are abandoned.
    pub fn run(self) -> Result<()> {
        let _active = ActiveQueueGuard::enter(self.handle.queue_id);
        log::debug!("dispatch worker started (cap={})", self.handle.capacity);

        let outcome = loop {
            if self.handle.is_cancelled() {
                break Ok(());
            }

            crossbeam::select! {
                recv(self.rx) -> job => match job {
                    Ok(job) => {
                        if let Err(report) = run_job(job) {
                            break Err(report);
                        }
                    }
                    Err(_) => break Ok(()),
                },
                recv(self.cancel_rx) -> _ => break Ok(()),
            }
        };

        self.handle.cancelled.store(true, Ordering::Release);
        let abandoned = self.abandon_remaining();

        match outcome {
            Ok(()) => {
                log::debug!("dispatch worker stopped");
                Ok(())
            }
            Err((label, err)) => {
                let report = FatalReport {
                    label,
                    message: err.to_string(),
                    abandoned,
                };
                log::error!(
                    "dispatch worker stopped by fatal error in {}: {} ({} entries abandoned)",
                    report.label,
                    report.message,
                    report.abandoned
                );
                Err(BridgeError::Fatal(format!("{}: {}", report.label, report.message)))
            }
        }
    }

    fn abandon_remaining(&self) -> usize {
        let mut abandoned = 0;
        while let Ok(job) = self.rx.try_recv() {
            log::debug!("abandoning queued dispatch {}", job.label);
            abandoned += 1;
        }

        if abandoned > 0 {
            log::warn!("dispatch worker stopped with {abandoned} queued entries abandoned");
        }
        abandoned
    }
}

impl DispatchHandle {
    /// Enqueues `f`, blocking while the queue is full. On the worker thread a
    /// full queue fails with [`BridgeError::QueueFull`] instead of blocking.
    pub fn enqueue<F>(&self, label: impl Into<String>, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        if self.is_worker_thread() {
            return self.try_enqueue(label, f);
        }

        if self.is_cancelled() {
            return Err(BridgeError::Shutdown);
        }

        let job = Job {
            label: label.into(),
            run: Box::new(f),
        };
        self.tx.send(job).map_err(|_| BridgeError::Shutdown)
    }

    /// Enqueues `f` without blocking; a full queue drops the entry.
    pub fn try_enqueue<F>(&self, label: impl Into<String>, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        if self.is_cancelled() {
            return Err(BridgeError::Shutdown);
        }

        let job = Job {
            label: label.into(),
            run: Box::new(f),
        };

        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped.is_power_of_two() {
                    log::warn!(
                        "dispatch queue full (cap={}); dropped {dropped} entries, latest {}",
                        self.capacity,
                        job.label
                    );
                }
                Err(BridgeError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Disconnected(_job)) => Err(BridgeError::Shutdown),
        }
    }

    /// Runs `f` on the worker and waits for its result.
    pub fn call<F, T>(&self, label: impl Into<String>, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let label = label.into();
        if self.is_worker_thread() {
            return Err(BridgeError::WouldDeadlock { path: label });
        }

        let (reply_tx, reply_rx) = channel::bounded(1);
        self.enqueue(label, move || {
            let _ = reply_tx.send(f());
            Ok(())
        })?;
        self.wait(&reply_rx)?
    }

    /// Waits on `reply`, failing with [`BridgeError::Shutdown`] once the
    /// worker is gone and the reply can no longer arrive.
    pub(crate) fn wait<T>(&self, reply: &Receiver<T>) -> Result<T> {
        crossbeam::select! {
            recv(reply) -> msg => msg.map_err(|_| BridgeError::Shutdown),
            recv(self.stopped) -> _ => reply.try_recv().map_err(|_| BridgeError::Shutdown),
        }
    }

    /// Signals the worker to stop after the entry it is running.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            log::info!("dispatch queue cancelled");
        }
        let _ = self.cancel_tx.try_send(());
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether the calling thread is this queue's worker.
    pub fn is_worker_thread(&self) -> bool {
        ACTIVE_QUEUE.with(|active| active.get() == Some(self.queue_id))
    }

    pub fn queued(&self) -> usize {
        self.tx.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

struct ActiveQueueGuard {
    previous: Option<u64>,
}

impl ActiveQueueGuard {
    fn enter(queue_id: u64) -> Self {
        let previous = ACTIVE_QUEUE.with(|active| active.replace(Some(queue_id)));
        Self { previous }
    }
}

impl Drop for ActiveQueueGuard {
    fn drop(&mut self) {
        ACTIVE_QUEUE.with(|active| active.set(self.previous));
    }
}

fn run_job(job: Job) -> std::result::Result<(), (String, BridgeError)> {
    let Job { label, run } = job;

    match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) if err.is_fatal() => Err((label, err)),
        Ok(Err(err)) => {
            log::warn!("dispatch {label} failed: {err}");
            Ok(())
        }
        Err(panic) => {
            log::error!("dispatch {label} panicked: {}", panic_message(panic.as_ref()));
            Ok(())
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
