//! Native-side bridge: requests from the application to the native runtime.
//!
//! Synchronous requests complete inside [`Transport::call`]. Asynchronous
//! requests are posted with a correlation id and resolved later when the
//! transport hands the matching reply to [`PlatformClient::deliver`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::error::{BridgeError, Result};
use crate::payload::Payload;

/// Correlation id of an asynchronous request.
pub type RequestId = u64;

/// How bytes reach the native runtime.
pub trait Transport: Send + Sync {
    /// Sends a request whose reply is available when the call returns.
    fn call(&self, path: &str, payload: &Payload) -> Result<Payload>;

    /// Sends a request whose reply arrives later through
    /// [`PlatformClient::deliver`].
    fn post(&self, id: RequestId, path: &str, payload: &Payload) -> Result<()>;
}

type Waiter = Sender<Result<Payload>>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkState {
    Open,
    Closed(String),
    ShutDown,
}

struct PendingTable {
    state: LinkState,
    waiters: HashMap<RequestId, Waiter>,
}

impl PendingTable {
    fn check_open(&self) -> Result<()> {
        match &self.state {
            LinkState::Open => Ok(()),
            LinkState::Closed(reason) => Err(BridgeError::TransportTerminal(reason.clone())),
            LinkState::ShutDown => Err(BridgeError::Shutdown),
        }
    }
}

/// Application-facing client for native operations.
pub struct PlatformClient {
    transport: Arc<dyn Transport>,
    pending: Mutex<PendingTable>,
    next_id: AtomicU64,
    timeout: Option<Duration>,
}

impl PlatformClient {
    pub fn new(transport: Arc<dyn Transport>, timeout: Option<Duration>) -> Self {
        Self {
            transport,
            pending: Mutex::new(PendingTable {
                state: LinkState::Open,
                waiters: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    /// Blocks until the native layer replies.
    pub fn request(&self, path: &str, payload: Payload) -> Result<Payload> {
        self.pending.lock().check_open()?;
        log::debug!("native request {path}");
        self.transport.call(path, &payload)
    }

    /// Posts the request with a fresh correlation id and blocks until the
    /// matching reply is delivered, the timeout expires or the link fails.
    pub fn request_with_async_response(&self, path: &str, payload: Payload) -> Result<Payload> {
        self.post_and_wait(path, payload, self.timeout)
    }

    /// Like [`PlatformClient::request_with_async_response`] but never times
    /// out. For replies the native side holds until it is done, such as
    /// `/driver/run`. Still fails when the link closes or shuts down.
    pub fn request_until_reply(&self, path: &str, payload: Payload) -> Result<Payload> {
        self.post_and_wait(path, payload, None)
    }

    fn post_and_wait(
        &self,
        path: &str,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Payload> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        let id = self.register(reply_tx)?;
        log::debug!("native request {path} posted as #{id}");

        if let Err(err) = self.transport.post(id, path, &payload) {
            self.pending.lock().waiters.remove(&id);
            return Err(err);
        }

        let received = match timeout {
            Some(timeout) => reply_rx.recv_timeout(timeout),
            None => reply_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.pending.lock().waiters.remove(&id);
                log::warn!("native request {path} (#{id}) timed out");
                Err(BridgeError::Timeout {
                    path: path.to_string(),
                    after: timeout.unwrap_or_default(),
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(BridgeError::Shutdown),
        }
    }

    /// Resolves the pending request `id`. Unknown ids are a protocol anomaly:
    /// logged and reported to the transport, never fatal.
    pub fn deliver(&self, id: RequestId, result: Result<Payload>) -> Result<()> {
        let waiter = self.pending.lock().waiters.remove(&id);

        match waiter {
            Some(waiter) => {
                if waiter.send(result).is_err() {
                    log::debug!("reply #{id} arrived after its caller gave up");
                }
                Ok(())
            }
            None => {
                log::warn!("protocol anomaly: reply for unknown request #{id} discarded");
                Err(BridgeError::ProtocolAnomaly { id })
            }
        }
    }

    /// Fails every pending request with [`BridgeError::TransportTerminal`] and
    /// rejects new ones.
    pub fn close_transport(&self, reason: &str) {
        self.fail_all(LinkState::Closed(reason.to_string()));
    }

    /// Fails every pending request with [`BridgeError::Shutdown`] and rejects
    /// new ones.
    pub fn shutdown(&self) {
        self.fail_all(LinkState::ShutDown);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().waiters.len()
    }

    pub fn is_open(&self) -> bool {
        self.pending.lock().state == LinkState::Open
    }

    fn register(&self, waiter: Waiter) -> Result<RequestId> {
        let mut pending = self.pending.lock();
        pending.check_open()?;

        let mut id = self.next_id.fetch_add(1, Ordering::Relaxed);
        while id == 0 || pending.waiters.contains_key(&id) {
            id = self.next_id.fetch_add(1, Ordering::Relaxed);
        }

        pending.waiters.insert(id, waiter);
        Ok(id)
    }

    fn fail_all(&self, state: LinkState) {
        let waiters: Vec<Waiter> = {
            let mut pending = self.pending.lock();
            if pending.state != LinkState::Open {
                return;
            }
            pending.state = state.clone();
            pending.waiters.drain().map(|(_id, waiter)| waiter).collect()
        };

        if !waiters.is_empty() {
            log::info!("failing {} pending native requests", waiters.len());
        }

        for waiter in waiters {
            let err = match &state {
                LinkState::Closed(reason) => BridgeError::TransportTerminal(reason.clone()),
                LinkState::ShutDown | LinkState::Open => BridgeError::Shutdown,
            };
            let _ = waiter.send(Err(err));
        }
    }
}
